use std::path::PathBuf;

/// Default address the server binds to.
pub const DEFAULT_HOST: &str = "0.0.0.0";
/// Default port shared by the server and the client.
pub const DEFAULT_PORT: u16 = 3000;

/// Default caption length, matching the reference model's generation limit.
pub const DEFAULT_MAX_TOKENS: usize = 20;

/// Which pretrained BLIP checkpoint to load.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlipVariant {
    #[default]
    Base,
    Large,
}

impl BlipVariant {
    /// Hugging Face repository holding the checkpoint.
    pub fn model_id(&self) -> &'static str {
        match self {
            BlipVariant::Base => "Salesforce/blip-image-captioning-base",
            BlipVariant::Large => "Salesforce/blip-image-captioning-large",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BlipVariant::Base => "base",
            BlipVariant::Large => "large",
        }
    }
}

impl std::str::FromStr for BlipVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "base" => Ok(BlipVariant::Base),
            "large" => Ok(BlipVariant::Large),
            other => Err(format!("unknown BLIP variant: {other} (expected base or large)")),
        }
    }
}

/// Where the BLIP weights come from and how captions are generated.
#[derive(Clone, Debug)]
pub struct BlipConfig {
    pub variant: BlipVariant,
    /// Hub repository; defaults to the variant's repository.
    pub model_id: Option<String>,
    pub revision: String,
    /// Local `model.safetensors`, skipping the hub download.
    pub weights: Option<PathBuf>,
    /// Local `tokenizer.json`, skipping the hub download.
    pub tokenizer: Option<PathBuf>,
    /// Run on the CPU even when an accelerator is available.
    pub cpu: bool,
    /// Upper bound on generated tokens per caption.
    pub max_tokens: usize,
}

impl Default for BlipConfig {
    fn default() -> Self {
        Self {
            variant: BlipVariant::default(),
            model_id: None,
            revision: "main".to_string(),
            weights: None,
            tokenizer: None,
            cpu: false,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl BlipConfig {
    /// The repository that weights and tokenizer are fetched from.
    pub fn repo_id(&self) -> &str {
        self.model_id
            .as_deref()
            .unwrap_or_else(|| self.variant.model_id())
    }
}
