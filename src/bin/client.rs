use argh::FromArgs;
use kornia_caption::{
    DOWNLOAD_FILE_NAME,
    config::DEFAULT_PORT,
    messages::{CaptionRequest, CaptionResponse},
};
use std::path::PathBuf;

// defaults for the client
const DEFAULT_HOST: &str = "localhost";

#[derive(FromArgs)]
/// Captioner client: caption an image by url or by uploading a local file
struct ClientArgs {
    /// the host to connect to
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to connect to
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// directory to save the captioned image into, as image.png
    #[argh(option, short = 'o')]
    output_dir: Option<PathBuf>,

    /// command to execute: "url", "upload" or "status"
    #[argh(subcommand)]
    command: ClientCommands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum ClientCommands {
    Url(UrlCommand),
    Upload(UploadCommand),
    Status(StatusCommand),
}

#[derive(FromArgs)]
/// Caption an image the server fetches from a url
#[argh(subcommand, name = "url")]
struct UrlCommand {
    /// the http(s) address of the image
    #[argh(positional)]
    url: String,
}

#[derive(FromArgs)]
/// Caption a local jpeg or png file
#[argh(subcommand, name = "upload")]
struct UploadCommand {
    /// the path to the image
    #[argh(positional)]
    image_path: PathBuf,
}

#[derive(FromArgs)]
/// Check whether the server is busy
#[argh(subcommand, name = "status")]
struct StatusCommand {}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: ClientArgs = argh::from_env();

    let client = reqwest::Client::new();

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    let request = match args.command {
        ClientCommands::Url(command) => CaptionRequest::from_url(command.url),
        ClientCommands::Upload(command) => {
            let bytes = tokio::fs::read(&command.image_path).await?;
            CaptionRequest::from_image_bytes(&bytes)
        }
        ClientCommands::Status(_) => {
            let response = client
                .get(format!("http://{}/status", addr))
                .send()
                .await?;

            let result = response.json::<serde_json::Value>().await?;
            println!("Result: {}", serde_json::to_string_pretty(&result)?);
            return Ok(());
        }
    };

    let response = client
        .post(format!("http://{}/api/caption", addr))
        .json(&request)
        .send()
        .await?;

    let mut result = response.json::<serde_json::Value>().await?;
    if result["status"] != "success" {
        eprintln!("Error: {}", result["message"].as_str().unwrap_or("unknown error"));
        std::process::exit(1);
    }

    let caption: CaptionResponse = serde_json::from_value(result["response"].take())?;
    println!("Generated Caption: {}", caption.caption);
    log::debug!(
        "{}x{} image captioned in {:?}",
        caption.width,
        caption.height,
        caption.duration
    );

    if let Some(dir) = args.output_dir {
        let path = dir.join(DOWNLOAD_FILE_NAME);
        tokio::fs::write(&path, caption.png()?).await?;
        println!("Saved image to {}", path.display());
    }

    Ok(())
}
