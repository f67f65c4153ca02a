//! BLIP image captioning on candle.

use crate::acquire::DecodedImage;
use crate::config::{BlipConfig, BlipVariant};
use crate::model::CaptioningModel;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::{blip, blip_text};
use std::path::PathBuf;
use tokenizers::Tokenizer;

/// Side of the square the vision encoder expects.
pub const IMAGE_SIZE: u32 = 384;

const BOS_TOKEN_ID: u32 = 30522;
const SEP_TOKEN_ID: u32 = 102;

const MEAN: [f32; 3] = [0.48145466, 0.4578275, 0.40821073];
const STD: [f32; 3] = [0.26862954, 0.261_302_6, 0.275_777_1];

#[derive(Debug, thiserror::Error)]
pub enum BlipError {
    #[error(transparent)]
    Candle(#[from] candle_core::Error),

    #[error("failed to download {file}: {source}")]
    Hub {
        file: String,
        #[source]
        source: hf_hub::api::sync::ApiError,
    },

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("invalid image: {0}")]
    Image(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

fn blip_base_config() -> blip::Config {
    let text_config = blip_text::Config {
        vocab_size: 30524,
        hidden_size: 768,
        encoder_hidden_size: 768,
        intermediate_size: 3072,
        projection_dim: 768,
        num_hidden_layers: 12,
        num_attention_heads: 12,
        max_position_embeddings: 512,
        hidden_act: candle_nn::Activation::Gelu,
        layer_norm_eps: 1e-12,
        is_decoder: true,
    };
    let vision_config = blip::VisionConfig {
        hidden_size: 768,
        intermediate_size: 3072,
        projection_dim: 512,
        num_hidden_layers: 12,
        num_attention_heads: 12,
        image_size: IMAGE_SIZE as usize,
        patch_size: 16,
        hidden_act: candle_nn::Activation::Gelu,
        layer_norm_eps: 1e-5,
    };

    blip::Config {
        text_config,
        vision_config,
        projection_dim: 512,
        image_text_hidden_size: 256,
    }
}

fn model_config(variant: BlipVariant) -> blip::Config {
    match variant {
        BlipVariant::Base => blip_base_config(),
        BlipVariant::Large => blip::Config::image_captioning_large(),
    }
}

/// Picks the CUDA device when compiled in and not disabled, the CPU otherwise.
pub fn select_device(cpu: bool) -> candle_core::Result<Device> {
    if cpu {
        Ok(Device::Cpu)
    } else {
        Device::cuda_if_available(0)
    }
}

/// Resizes to the encoder's square input and normalizes into a CHW `f32` tensor.
pub fn preprocess_image(image: &DecodedImage, device: &Device) -> Result<Tensor, BlipError> {
    let rgb = image::RgbImage::from_raw(
        image.width() as u32,
        image.height() as u32,
        image.as_slice().to_vec(),
    )
    .ok_or_else(|| BlipError::Image("pixel buffer does not match image size".to_string()))?;

    let resized = image::imageops::resize(
        &rgb,
        IMAGE_SIZE,
        IMAGE_SIZE,
        image::imageops::FilterType::CatmullRom,
    );

    let size = IMAGE_SIZE as usize;
    let data = Tensor::from_vec(resized.into_raw(), (size, size, 3), &Device::Cpu)?
        .permute((2, 0, 1))?;
    let mean = Tensor::new(&MEAN, &Device::Cpu)?.reshape((3, 1, 1))?;
    let std = Tensor::new(&STD, &Device::Cpu)?.reshape((3, 1, 1))?;

    let normalized = (data.to_dtype(DType::F32)? / 255.)?
        .broadcast_sub(&mean)?
        .broadcast_div(&std)?;

    Ok(normalized.to_device(device)?)
}

/// A loaded BLIP captioning checkpoint.
pub struct BlipCaptioner {
    model: blip::BlipForConditionalGeneration,
    tokenizer: Tokenizer,
    logits_processor: LogitsProcessor,
    device: Device,
    max_tokens: usize,
}

impl BlipCaptioner {
    /// Loads weights and tokenizer, downloading whatever is not given as a local path.
    pub fn new(config: &BlipConfig) -> Result<Self, BlipError> {
        if config.max_tokens == 0 {
            return Err(BlipError::Config("max_tokens must be at least 1".to_string()));
        }

        let (weights, tokenizer) = resolve_files(config)?;
        let device = select_device(config.cpu)?;

        log::info!(
            "Loading BLIP {} from {} on {:?}",
            config.variant.as_str(),
            weights.display(),
            device
        );

        let tokenizer =
            Tokenizer::from_file(&tokenizer).map_err(|e| BlipError::Tokenizer(e.to_string()))?;

        // SAFETY: the weights file is not modified while mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, &device)? };
        let model = blip::BlipForConditionalGeneration::new(&model_config(config.variant), vb)?;

        Ok(Self {
            model,
            tokenizer,
            // greedy decoding: no temperature, no top-p
            logits_processor: LogitsProcessor::new(1337, None, None),
            device,
            max_tokens: config.max_tokens,
        })
    }
}

fn resolve_files(config: &BlipConfig) -> Result<(PathBuf, PathBuf), BlipError> {
    if let (Some(weights), Some(tokenizer)) = (&config.weights, &config.tokenizer) {
        return Ok((weights.clone(), tokenizer.clone()));
    }

    let api = hf_hub::api::sync::Api::new().map_err(|source| BlipError::Hub {
        file: config.repo_id().to_string(),
        source,
    })?;
    let repo = api.repo(hf_hub::Repo::with_revision(
        config.repo_id().to_string(),
        hf_hub::RepoType::Model,
        config.revision.clone(),
    ));
    let get = |file: &str| {
        log::info!("Fetching {file} from {}", config.repo_id());
        repo.get(file).map_err(|source| BlipError::Hub {
            file: file.to_string(),
            source,
        })
    };

    let weights = match &config.weights {
        Some(path) => path.clone(),
        None => get("model.safetensors")?,
    };
    let tokenizer = match &config.tokenizer {
        Some(path) => path.clone(),
        None => get("tokenizer.json")?,
    };

    Ok((weights, tokenizer))
}

impl CaptioningModel for BlipCaptioner {
    type Input = Tensor;
    type Error = BlipError;

    fn preprocess(&self, image: &DecodedImage) -> Result<Tensor, BlipError> {
        preprocess_image(image, &self.device)
    }

    fn generate(&mut self, input: Tensor) -> Result<Vec<u32>, BlipError> {
        let image_embeds = input.unsqueeze(0)?.apply(self.model.vision_model())?;

        // the decoder keeps a kv cache across calls
        self.model.text_decoder().reset_kv_cache();

        let mut token_ids = vec![BOS_TOKEN_ID];
        for index in 0..self.max_tokens {
            let context_size = if index > 0 { 1 } else { token_ids.len() };
            let start_pos = token_ids.len().saturating_sub(context_size);
            let input_ids = Tensor::new(&token_ids[start_pos..], &self.device)?.unsqueeze(0)?;
            let logits = self
                .model
                .text_decoder()
                .forward(&input_ids, &image_embeds)?;
            let logits = logits.squeeze(0)?;
            let logits = logits.get(logits.dim(0)? - 1)?;
            let token = self.logits_processor.sample(&logits)?;
            if token == SEP_TOKEN_ID {
                break;
            }
            token_ids.push(token);
        }

        Ok(token_ids.split_off(1))
    }

    fn decode(&self, tokens: &[u32]) -> Result<String, BlipError> {
        self.tokenizer
            .decode(tokens, true)
            .map_err(|e| BlipError::Tokenizer(e.to_string()))
    }
}
