//! HTML rendering for the single-page interface.
//!
//! The page is one template (`assets/page.html`) with `{{TOKEN}}`
//! placeholders. Substitution is a single pass, so user text that happens to
//! contain a placeholder is never expanded, and any token without a value is
//! blanked.

use crate::{
    engine::{AnalysisOutcome, InferenceResult, Submission},
    error::AnalyzerBusy,
    normalizer::preview_data_uri,
};

const TEMPLATE: &str = include_str!("assets/page.html");

pub const SUCCESS_BANNER: &str = "Analysis completed!";
const EMPTY_PREVIEW: &str = "Upload an image to see preview here";

/// Which display an outcome is routed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Warning,
    Error,
}

/// A user-facing message with its display level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn busy() -> Self {
        Self {
            level: NoticeLevel::Error,
            message: format!(
                "{}. Please wait for it to finish.",
                capitalize(&AnalyzerBusy.to_string())
            ),
        }
    }

    pub fn is_success(&self) -> bool {
        self.level == NoticeLevel::Success
    }
}

impl From<&AnalysisOutcome> for Notice {
    fn from(outcome: &AnalysisOutcome) -> Self {
        match outcome {
            AnalysisOutcome::Warning(warning) => Notice {
                level: NoticeLevel::Warning,
                message: warning.to_string(),
            },
            AnalysisOutcome::DecodeFailed(error) => Notice {
                level: NoticeLevel::Error,
                message: format!(
                    "Failed to process the uploaded image. Error processing image: {error}"
                ),
            },
            AnalysisOutcome::Completed(InferenceResult::Success(text)) => Notice {
                level: NoticeLevel::Success,
                message: text.clone(),
            },
            AnalysisOutcome::Completed(result) => Notice {
                level: NoticeLevel::Error,
                message: result.to_string(),
            },
        }
    }
}

/// Contents of the preview column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Preview {
    Empty,
    Image { data_uri: String, caption: String },
    Error(String),
}

impl Preview {
    pub fn for_submission(submission: &Submission) -> Self {
        let Some(upload) = &submission.image else {
            return Preview::Empty;
        };
        match preview_data_uri(upload) {
            Ok(data_uri) => Preview::Image {
                data_uri,
                caption: upload
                    .file_name
                    .clone()
                    .unwrap_or_else(|| "Uploaded Image".to_string()),
            },
            Err(e) => Preview::Error(format!("Error displaying image: {e}")),
        }
    }
}

/// Everything needed to draw the page.
#[derive(Clone, Debug)]
pub struct PageView<'a> {
    pub question: &'a str,
    pub notice: Option<Notice>,
    pub preview: Preview,
}

impl<'a> PageView<'a> {
    pub fn empty() -> Self {
        Self {
            question: "",
            notice: None,
            preview: Preview::Empty,
        }
    }

    pub fn for_outcome(submission: &'a Submission, outcome: &AnalysisOutcome) -> Self {
        Self {
            question: &submission.question,
            notice: Some(Notice::from(outcome)),
            preview: Preview::for_submission(submission),
        }
    }
}

pub fn render_page(view: &PageView<'_>) -> String {
    let question = html_escape(view.question);
    let result = view.notice.as_ref().map(render_notice).unwrap_or_default();
    let preview = render_preview(&view.preview);

    substitute(TEMPLATE, |token| match token {
        "QUESTION" => Some(question.as_str()),
        "RESULT" => Some(result.as_str()),
        "PREVIEW" => Some(preview.as_str()),
        _ => None,
    })
}

fn render_notice(notice: &Notice) -> String {
    let message = html_escape(&notice.message);
    match notice.level {
        NoticeLevel::Warning => {
            format!(r#"<div class="notice warning">{message}</div>"#)
        }
        NoticeLevel::Success => format!(
            r#"<hr><h2>AI Analysis:</h2><div class="notice success">{SUCCESS_BANNER}</div><div class="answer">{message}</div>"#
        ),
        NoticeLevel::Error => {
            format!(r#"<hr><h2>AI Analysis:</h2><div class="notice error">{message}</div>"#)
        }
    }
}

fn render_preview(preview: &Preview) -> String {
    match preview {
        Preview::Empty => format!(r#"<div class="notice info">{EMPTY_PREVIEW}</div>"#),
        Preview::Image { data_uri, caption } => {
            let caption = html_escape(caption);
            format!(
                r#"<img src="{}" alt="{caption}"><div class="caption">{caption}</div>"#,
                html_escape(data_uri)
            )
        }
        Preview::Error(message) => {
            let message = html_escape(message);
            format!(r#"<div class="notice error">{message}</div>"#)
        }
    }
}

/// Replaces each `{{TOKEN}}` with the value `lookup` gives for it, or with
/// nothing. Replacement text is never rescanned.
fn substitute<'v>(template: &str, lookup: impl Fn(&str) -> Option<&'v str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                if let Some(value) = lookup(&after[..end]) {
                    out.push_str(value);
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        engine::FailureKind,
        error::{DecodeError, ValidationError},
        normalizer::UploadedImage,
    };

    #[test]
    fn test_success_routes_to_success_display() {
        let outcome = AnalysisOutcome::Completed(InferenceResult::Success("STOP".into()));
        let notice = Notice::from(&outcome);
        assert_eq!(notice.level, NoticeLevel::Success);
        assert_eq!(notice.message, "STOP");
    }

    #[test]
    fn test_blocked_routes_to_error_display() {
        let outcome = AnalysisOutcome::Completed(InferenceResult::Blocked("SAFETY".into()));
        let notice = Notice::from(&outcome);
        assert_eq!(notice.level, NoticeLevel::Error);
        assert!(notice.message.starts_with("Response blocked"));
    }

    #[test]
    fn test_failure_routes_to_error_display() {
        let outcome = AnalysisOutcome::Completed(InferenceResult::Failed {
            kind: FailureKind::Network,
            message: "connection refused".into(),
        });
        let notice = Notice::from(&outcome);
        assert_eq!(notice.level, NoticeLevel::Error);
        assert!(notice.message.starts_with("Error generating response"));
    }

    #[test]
    fn test_warning_and_decode_levels() {
        let warning = Notice::from(&AnalysisOutcome::Warning(ValidationError::MissingImage));
        assert_eq!(warning.level, NoticeLevel::Warning);
        assert_eq!(warning.message, "Please upload an image first.");

        let decode = Notice::from(&AnalysisOutcome::DecodeFailed(DecodeError::Empty));
        assert_eq!(decode.level, NoticeLevel::Error);
        assert!(decode.message.starts_with("Failed to process"));
    }

    #[test]
    fn test_success_text_that_looks_like_an_error_stays_success() {
        let text = "Error: the receipt total is missing".to_string();
        let outcome = AnalysisOutcome::Completed(InferenceResult::Success(text));
        assert!(Notice::from(&outcome).is_success());
    }

    #[test]
    fn test_page_escapes_model_and_user_text() {
        let submission = Submission::new(None, "<script>alert(1)</script>");
        let outcome = AnalysisOutcome::Completed(InferenceResult::Success("<b>bold</b>".into()));

        let html = render_page(&PageView::for_outcome(&submission, &outcome));

        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(html.contains("&lt;b&gt;bold&lt;/b&gt;"));
        assert!(html.contains(SUCCESS_BANNER));
    }

    #[test]
    fn test_placeholders_in_user_text_are_not_expanded() {
        let submission = Submission::new(None, "{{RESULT}}");
        let outcome = AnalysisOutcome::Warning(ValidationError::MissingImage);

        let html = render_page(&PageView::for_outcome(&submission, &outcome));

        assert!(html.contains(">{{RESULT}}</textarea>"));
        assert_eq!(html.matches("Please upload an image first.").count(), 1);
    }

    #[test]
    fn test_empty_page_has_no_placeholders() {
        let html = render_page(&PageView::empty());

        assert!(!html.contains("{{"));
        assert!(html.contains(EMPTY_PREVIEW));
        assert!(!html.contains("AI Analysis"));
    }

    #[test]
    fn test_preview_of_unreadable_upload_shows_error() {
        let submission = Submission::new(
            Some(UploadedImage::new(b"garbage".to_vec(), "image/png")),
            "q",
        );

        match Preview::for_submission(&submission) {
            Preview::Error(message) => assert!(message.starts_with("Error displaying image")),
            other => panic!("unexpected preview {other:?}"),
        }
    }

    #[test]
    fn test_error_notice_uses_error_class() {
        let html = render_notice(&Notice::busy());

        assert!(html.starts_with("<hr><h2>AI Analysis:</h2>"));
        assert!(html.contains(r#"<div class="notice error">An analysis"#));
    }

    #[test]
    fn test_busy_notice() {
        let notice = Notice::busy();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert!(notice.message.starts_with("An analysis is already"));
    }
}
