/// Errors surfaced by a single caption request.
///
/// Every variant is scoped to the request that produced it. None of them leave shared
/// state behind, so the next request starts clean.
#[derive(Debug, thiserror::Error)]
pub enum CaptionError {
    /// Neither a recognized URL nor a readable byte stream was provided.
    #[error("invalid image input: {0}")]
    InvalidInput(String),

    /// The remote image could not be retrieved.
    #[error("failed to fetch image from {url}: {reason}")]
    Fetch {
        /// The address that was requested.
        url: String,
        /// Transport, status or body failure.
        reason: String,
    },

    /// The bytes are not a supported (JPEG/PNG) image or are corrupt.
    #[error("failed to decode image: {0}")]
    Decode(String),

    /// The captioning model failed; the model's own error is kept as the source.
    #[error("caption inference failed: {0}")]
    Inference(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// The decoded image could not be encoded for download.
    #[error("failed to encode image: {0}")]
    Encode(String),
}

impl CaptionError {
    /// Wraps a model error without altering it.
    pub fn inference<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CaptionError::Inference(Box::new(err))
    }

    pub(crate) fn fetch(url: &str, reason: impl ToString) -> Self {
        CaptionError::Fetch {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            CaptionError::InvalidInput(_) => "invalid_input",
            CaptionError::Fetch { .. } => "fetch",
            CaptionError::Decode(_) => "decode",
            CaptionError::Inference(_) => "inference",
            CaptionError::Encode(_) => "encode",
        }
    }
}

impl From<image::ImageError> for CaptionError {
    fn from(err: image::ImageError) -> Self {
        CaptionError::Decode(err.to_string())
    }
}
