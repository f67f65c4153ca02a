use crate::acquire::{DecodedImage, ImageAcquirer, ImageReference, encode_png};
use crate::engine::{CaptionEngine, CaptionEngineState};
use crate::error::CaptionError;
use crate::model::Caption;
use std::time::Duration;

/// File name offered for the downloaded image.
pub const DOWNLOAD_FILE_NAME: &str = "image.png";

/// Everything one request produces: the caption and the image it describes.
pub struct CaptionOutcome {
    pub caption: Caption,
    pub image: DecodedImage,
    /// Time spent inside the model.
    pub duration: Duration,
}

impl CaptionOutcome {
    /// Encodes the image as the downloadable PNG.
    pub fn png(&self) -> Result<Vec<u8>, CaptionError> {
        encode_png(&self.image)
    }
}

/// Acquires an image and captions it, one linear pass per request.
pub struct Captioner {
    acquirer: ImageAcquirer,
    engine: CaptionEngine,
}

impl Captioner {
    pub fn new(acquirer: ImageAcquirer, engine: CaptionEngine) -> Self {
        Self { acquirer, engine }
    }

    pub fn model_id(&self) -> &str {
        self.engine.model_id()
    }

    pub fn state(&self) -> CaptionEngineState {
        self.engine.state()
    }

    pub async fn caption(&self, reference: ImageReference) -> Result<CaptionOutcome, CaptionError> {
        let image = self.acquirer.acquire(reference).await?;
        let response = self.engine.caption(image).await?;

        log::info!(
            "Captioned request {} in {:?}: {}",
            response.id,
            response.duration,
            response.caption
        );

        Ok(CaptionOutcome {
            caption: response.caption,
            image: response.image,
            duration: response.duration,
        })
    }
}
