use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::post,
};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use serde_json::{Value, json};
use std::{
    io::Cursor,
    sync::{Arc, Mutex},
};
use vision_query::{
    Config, FailureKind, GeminiClient, InferenceResult, NormalizedImage, UploadedImage,
    build_instructions, invoke, normalize,
};

struct Seen {
    call: String,
    api_key: Option<String>,
    body: Value,
}

#[derive(Clone)]
struct Stub {
    status: StatusCode,
    reply: Value,
    seen: Arc<Mutex<Vec<Seen>>>,
}

async fn generate_content(
    State(stub): State<Stub>,
    Path(call): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let api_key = headers
        .get("x-goog-api-key")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    stub.seen.lock().unwrap().push(Seen {
        call,
        api_key,
        body,
    });
    (stub.status, Json(stub.reply.clone()))
}

/// Serves a fake Gemini endpoint and returns its API base.
async fn spawn_stub(status: StatusCode, reply: Value) -> (String, Arc<Mutex<Vec<Seen>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/v1beta/models/{call}", post(generate_content))
        .with_state(Stub {
            status,
            reply,
            seen: seen.clone(),
        });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/v1beta"), seen)
}

fn client(api_base: String, api_key: Option<&str>) -> GeminiClient {
    GeminiClient::new(Config {
        api_key: api_key.map(str::to_string),
        model: "gemini-test".to_string(),
        api_base,
    })
}

fn sign_image() -> NormalizedImage {
    let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(20, 10, Rgba([200, 0, 0, 255])));
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png).unwrap();
    normalize(&UploadedImage::new(buffer.into_inner(), "image/png")).unwrap()
}

#[tokio::test]
async fn test_success_forwards_prompt_image_and_key() {
    let (api_base, seen) = spawn_stub(
        StatusCode::OK,
        json!({
            "candidates": [{
                "content": { "parts": [{ "text": "The sign says STOP." }], "role": "model" },
                "finishReason": "STOP"
            }]
        }),
    )
    .await;
    let model = client(api_base, Some("test-key"));
    let prompt = build_instructions("What does this sign say?");
    let image = sign_image();

    let result = invoke(&model, &prompt, Some(&image)).await;

    assert_eq!(
        result,
        InferenceResult::Success("The sign says STOP.".into())
    );

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].call, "gemini-test:generateContent");
    assert_eq!(seen[0].api_key.as_deref(), Some("test-key"));

    let parts = seen[0].body["contents"][0]["parts"].as_array().unwrap();
    assert_eq!(parts[0]["text"], prompt.as_str());
    assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");

    use base64::Engine;
    let png = base64::engine::general_purpose::STANDARD
        .decode(parts[1]["inlineData"]["data"].as_str().unwrap())
        .unwrap();
    let forwarded = image::load_from_memory_with_format(&png, ImageFormat::Png).unwrap();
    assert_eq!((forwarded.width(), forwarded.height()), (20, 10));
}

#[tokio::test]
async fn test_block_reason_is_not_a_failure() {
    let (api_base, _) = spawn_stub(
        StatusCode::OK,
        json!({ "promptFeedback": { "blockReason": "SAFETY" } }),
    )
    .await;
    let model = client(api_base, Some("test-key"));

    let result = invoke(&model, &build_instructions("q"), Some(&sign_image())).await;

    assert_eq!(result, InferenceResult::Blocked("SAFETY".into()));
    assert_eq!(result.to_string(), "Response blocked: SAFETY");
}

#[tokio::test]
async fn test_rejected_key_is_a_credential_failure() {
    let (api_base, _) = spawn_stub(
        StatusCode::FORBIDDEN,
        json!({
            "error": {
                "code": 403,
                "message": "Permission denied",
                "status": "PERMISSION_DENIED"
            }
        }),
    )
    .await;
    let model = client(api_base, Some("bad-key"));

    let result = invoke(&model, &build_instructions("q"), None).await;

    match &result {
        InferenceResult::Failed { kind, message } => {
            assert_eq!(*kind, FailureKind::Credential);
            assert!(message.contains("PERMISSION_DENIED: Permission denied"));
        }
        other => panic!("unexpected result {other:?}"),
    }
    assert!(result.to_string().starts_with("Error generating response"));
}

#[tokio::test]
async fn test_missing_key_makes_no_request() {
    let (api_base, seen) = spawn_stub(StatusCode::OK, json!({})).await;
    let model = client(api_base, None);

    let result = invoke(&model, &build_instructions("q"), Some(&sign_image())).await;

    assert!(matches!(
        result,
        InferenceResult::Failed {
            kind: FailureKind::Credential,
            ..
        }
    ));
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unexpected_body_is_malformed() {
    let (api_base, _) = spawn_stub(StatusCode::OK, json!({ "candidates": "nope" })).await;
    let model = client(api_base, Some("test-key"));

    let result = invoke(&model, &build_instructions("q"), None).await;

    assert!(matches!(
        result,
        InferenceResult::Failed {
            kind: FailureKind::MalformedResponse,
            ..
        }
    ));
}

#[tokio::test]
async fn test_unreachable_service_is_a_network_failure() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let model = client(format!("http://{addr}/v1beta"), Some("test-key"));

    let result = invoke(&model, &build_instructions("q"), None).await;

    assert!(matches!(
        result,
        InferenceResult::Failed {
            kind: FailureKind::Network,
            ..
        }
    ));
}
