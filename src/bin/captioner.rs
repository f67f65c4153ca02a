use argh::FromArgs;
use kornia_caption::{
    CaptionEngine, Captioner, ImageAcquirer,
    blip::BlipCaptioner,
    config::{BlipConfig, BlipVariant, DEFAULT_HOST, DEFAULT_MAX_TOKENS, DEFAULT_PORT},
    server,
};
use std::{path::PathBuf, sync::Arc};

#[derive(FromArgs)]
/// Serve a page and a JSON API that caption images with BLIP.
struct CaptionerArgs {
    /// the host to run the server on
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to run the server on
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// the BLIP checkpoint: base or large
    #[argh(option, default = "BlipVariant::Base")]
    variant: BlipVariant,

    /// hugging face repository to load the checkpoint from
    #[argh(option)]
    model_id: Option<String>,

    /// revision of the hugging face repository
    #[argh(option, default = "String::from(\"main\")")]
    revision: String,

    /// local model.safetensors to use instead of downloading
    #[argh(option)]
    weights: Option<PathBuf>,

    /// local tokenizer.json to use instead of downloading
    #[argh(option)]
    tokenizer: Option<PathBuf>,

    /// run the model on the cpu
    #[argh(switch)]
    cpu: bool,

    /// maximum number of tokens per caption
    #[argh(option, default = "DEFAULT_MAX_TOKENS")]
    max_tokens: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: CaptionerArgs = argh::from_env();

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    let config = BlipConfig {
        variant: args.variant,
        model_id: args.model_id,
        revision: args.revision,
        weights: args.weights,
        tokenizer: args.tokenizer,
        cpu: args.cpu,
        max_tokens: args.max_tokens,
    };
    let model_id = config.repo_id().to_string();

    // loading may download the checkpoint first
    let model = tokio::task::spawn_blocking(move || BlipCaptioner::new(&config)).await??;
    let engine = CaptionEngine::new(model_id, model);
    let captioner = Arc::new(Captioner::new(ImageAcquirer::new(), engine));

    let app = server::router(captioner);

    log::info!("🚀 Starting the server");
    log::info!("🔥 Listening on: {}", addr);
    log::info!("🔧 Press Ctrl+C to stop the server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
