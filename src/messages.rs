use crate::acquire::ImageReference;
use crate::error::CaptionError;
use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Body of `POST /api/caption`. Exactly one of the fields must be set.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CaptionRequest {
    /// A http(s) address to fetch the image from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// A base64 encoded JPEG or PNG.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl CaptionRequest {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            image: None,
        }
    }

    pub fn from_image_bytes(bytes: &[u8]) -> Self {
        Self {
            url: None,
            image: Some(general_purpose::STANDARD.encode(bytes)),
        }
    }
}

impl TryFrom<CaptionRequest> for ImageReference {
    type Error = CaptionError;

    fn try_from(req: CaptionRequest) -> Result<Self, Self::Error> {
        let url = req.url.filter(|url| !url.trim().is_empty());
        let image = req.image.filter(|image| !image.is_empty());

        match (url, image) {
            (Some(url), None) => Ok(ImageReference::RemoteUrl(url.trim().to_string())),
            (None, Some(image)) => {
                let bytes = general_purpose::STANDARD.decode(image).map_err(|e| {
                    CaptionError::InvalidInput(format!("image is not valid base64: {e}"))
                })?;
                Ok(ImageReference::from_bytes(bytes))
            }
            (Some(_), Some(_)) => Err(CaptionError::InvalidInput(
                "provide either an image url or image data, not both".to_string(),
            )),
            (None, None) => Err(CaptionError::InvalidInput(
                "provide an image url or image data".to_string(),
            )),
        }
    }
}

/// Successful reply of `POST /api/caption`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptionResponse {
    pub caption: String,
    pub width: usize,
    pub height: usize,
    pub duration: Duration,
    /// The captioned image as a base64 encoded PNG, offered as `image.png`.
    pub image: String,
}

impl CaptionResponse {
    /// Decodes the PNG carried in the response.
    pub fn png(&self) -> Result<Vec<u8>, base64::DecodeError> {
        general_purpose::STANDARD.decode(&self.image)
    }
}
