use argh::FromArgs;
use image::ImageFormat;
use std::{path::PathBuf, process::ExitCode, sync::Arc};
use vision_query::{
    AnalysisEngine, Config, GeminiClient, Submission, UploadedImage,
    render::{Notice, NoticeLevel, SUCCESS_BANNER},
    server,
};

// defaults for the server
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_MAX_UPLOAD_MB: usize = server::DEFAULT_MAX_UPLOAD_BYTES / (1024 * 1024);

#[derive(FromArgs)]
/// Ask a hosted multimodal model questions about images.
struct Args {
    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Serve(ServeCommand),
    Ask(AskCommand),
}

#[derive(FromArgs)]
/// Serve the web interface
#[argh(subcommand, name = "serve")]
struct ServeCommand {
    /// the host to run the server on
    #[argh(option, default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to run the server on
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// the largest accepted upload, in megabytes
    #[argh(option, default = "DEFAULT_MAX_UPLOAD_MB")]
    max_upload_mb: usize,
}

#[derive(FromArgs)]
/// Analyze one image from disk and print the answer
#[argh(subcommand, name = "ask")]
struct AskCommand {
    /// the path to the image
    #[argh(option, short = 'i')]
    image: PathBuf,

    /// the question to ask about the image
    #[argh(option, short = 'q')]
    question: String,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let config = Config::from_env();
    if config.api_key.is_none() {
        log::warn!("GOOGLE_API_KEY is not set, every analysis will fail until it is");
    }
    log::debug!("Configuration: {config:?}");

    match args.command {
        Command::Serve(serve) => {
            run_server(config, serve).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Ask(ask) => run_once(config, ask).await,
    }
}

async fn run_server(
    config: Config,
    args: ServeCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    let model = config.model.clone();
    let engine = Arc::new(AnalysisEngine::new(GeminiClient::new(config)));
    let app = server::router(engine, args.max_upload_mb.saturating_mul(1024 * 1024));

    log::info!("🚀 Starting the server with model {model}");
    log::info!("🔥 Listening on: {addr}");
    log::info!("🔧 Press Ctrl+C to stop the server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn run_once(
    config: Config,
    args: AskCommand,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let bytes = tokio::fs::read(&args.image).await?;
    let mime_type = ImageFormat::from_path(&args.image)
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream");

    let mut upload = UploadedImage::new(bytes, mime_type);
    if let Some(name) = args.image.file_name() {
        upload = upload.with_file_name(name.to_string_lossy());
    }

    let engine = AnalysisEngine::new(GeminiClient::new(config));
    let submission = Submission::new(Some(upload), args.question);
    let notice = engine
        .handle(submission, |_, outcome| Notice::from(outcome))
        .await?;

    let report = Report::for_notice(&notice);
    match report.stream {
        Stream::Stdout => println!("{}", report.text),
        Stream::Stderr => eprintln!("{}", report.text),
    }
    Ok(ExitCode::from(report.status))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// Where an `ask` notice is printed and which status the process exits with.
#[derive(Debug, PartialEq, Eq)]
struct Report {
    stream: Stream,
    text: String,
    status: u8,
}

impl Report {
    fn for_notice(notice: &Notice) -> Self {
        let message = &notice.message;
        match notice.level {
            NoticeLevel::Success => Self {
                stream: Stream::Stdout,
                text: format!("{SUCCESS_BANNER}\n\n{message}"),
                status: 0,
            },
            NoticeLevel::Warning => Self {
                stream: Stream::Stderr,
                text: format!("warning: {message}"),
                status: 2,
            },
            NoticeLevel::Error => Self {
                stream: Stream::Stderr,
                text: format!("error: {message}"),
                status: 1,
            },
        }
    }
}
