use crate::error::CaptionError;
use kornia_image::{Image, ImageSize, allocator::CpuAllocator};
use std::io::{Cursor, Read};

/// An RGB raster decoded from the user's image, at its native size.
pub type DecodedImage = Image<u8, 3, CpuAllocator>;

/// How the user pointed at an image.
pub enum ImageReference {
    /// A remote address to GET.
    RemoteUrl(String),
    /// Raw encoded image bytes, e.g. an uploaded file.
    ByteStream(Box<dyn Read + Send>),
}

impl ImageReference {
    /// Wraps an in-memory upload.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        ImageReference::ByteStream(Box::new(Cursor::new(data.into())))
    }

    /// Returns the reference kind as a string, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ImageReference::RemoteUrl(_) => "url",
            ImageReference::ByteStream(_) => "stream",
        }
    }
}

impl std::fmt::Debug for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageReference::RemoteUrl(url) => f.debug_tuple("RemoteUrl").field(url).finish(),
            ImageReference::ByteStream(_) => f.write_str("ByteStream(<data>)"),
        }
    }
}

/// Returns true when `s` starts with a scheme the acquirer fetches (`http://`, `https://`).
pub fn is_remote_url(s: &str) -> bool {
    ["http://", "https://"].iter().any(|scheme| {
        s.get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
    })
}

/// Resolves an [`ImageReference`] into a [`DecodedImage`].
#[derive(Clone, Debug, Default)]
pub struct ImageAcquirer {
    client: reqwest::Client,
}

impl ImageAcquirer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a preconfigured HTTP client for remote images.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Fetches or reads the referenced image and decodes it to RGB.
    ///
    /// A URL costs exactly one outbound GET; a byte stream never touches the network.
    pub async fn acquire(&self, reference: ImageReference) -> Result<DecodedImage, CaptionError> {
        let kind = reference.kind();
        let bytes = match reference {
            ImageReference::RemoteUrl(url) => {
                if !is_remote_url(&url) {
                    return Err(CaptionError::InvalidInput(format!(
                        "not a http(s) url: {url:?}"
                    )));
                }
                self.fetch(&url).await?
            }
            ImageReference::ByteStream(mut stream) => {
                let mut bytes = Vec::new();
                stream.read_to_end(&mut bytes).map_err(|e| {
                    CaptionError::InvalidInput(format!("image stream is not readable: {e}"))
                })?;
                if bytes.is_empty() {
                    return Err(CaptionError::InvalidInput("image stream is empty".to_string()));
                }
                bytes
            }
        };

        let image = decode_image(&bytes)?;
        log::debug!(
            "Acquired image from {kind}: {}x{}",
            image.width(),
            image.height()
        );

        Ok(image)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, CaptionError> {
        let parsed = reqwest::Url::parse(url).map_err(|e| CaptionError::fetch(url, e))?;

        log::debug!("Fetching image from {parsed}");

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| CaptionError::fetch(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CaptionError::fetch(url, format!("server responded {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| CaptionError::fetch(url, e))?;

        Ok(body.to_vec())
    }
}

/// Decodes JPEG or PNG bytes, sniffing the format from the data, into an RGB raster.
pub fn decode_image(bytes: &[u8]) -> Result<DecodedImage, CaptionError> {
    let rgb = image::load_from_memory(bytes)?.to_rgb8();
    let size = ImageSize {
        width: rgb.width() as usize,
        height: rgb.height() as usize,
    };

    Image::new(size, rgb.into_raw(), CpuAllocator).map_err(|e| CaptionError::Decode(e.to_string()))
}

/// Encodes an image as PNG, the format offered for download.
pub fn encode_png(image: &DecodedImage) -> Result<Vec<u8>, CaptionError> {
    let rgb = image::RgbImage::from_raw(
        image.width() as u32,
        image.height() as u32,
        image.as_slice().to_vec(),
    )
    .ok_or_else(|| CaptionError::Encode("pixel buffer does not match image size".to_string()))?;

    let mut png = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| CaptionError::Encode(e.to_string()))?;

    Ok(png)
}
