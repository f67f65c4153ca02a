use crate::acquire::DecodedImage;
use crate::error::CaptionError;

/// A pretrained image captioning model, used as a black box.
///
/// Implementors expose the three stages of caption generation. The crate never looks
/// inside `Input` or the token ids; it only threads them from one stage to the next.
pub trait CaptioningModel {
    /// Model-ready form of an image, e.g. a normalized tensor.
    type Input;
    /// The error type that can be returned by any stage.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Turns a decoded image into model input.
    fn preprocess(&self, image: &DecodedImage) -> Result<Self::Input, Self::Error>;

    /// Generates the caption token sequence.
    fn generate(&mut self, input: Self::Input) -> Result<Vec<u32>, Self::Error>;

    /// Turns generated tokens back into text.
    fn decode(&self, tokens: &[u32]) -> Result<String, Self::Error>;
}

/// The text produced by a captioning model for one image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caption(String);

impl Caption {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for Caption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Runs one image through the model's preprocess, generate and decode stages.
///
/// Any model failure is returned as [`CaptionError::Inference`] with the model's error
/// as its source. There are no retries.
pub fn request_caption<M: CaptioningModel>(
    image: &DecodedImage,
    model: &mut M,
) -> Result<Caption, CaptionError> {
    let input = model.preprocess(image).map_err(CaptionError::inference)?;
    let tokens = model.generate(input).map_err(CaptionError::inference)?;
    log::debug!("Generated {} caption tokens", tokens.len());

    let text = model.decode(&tokens).map_err(CaptionError::inference)?;

    Ok(Caption::new(text.trim()))
}
