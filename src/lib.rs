//! Image captioning with a pretrained vision-language model.
//!
//! A request is one linear pass:
//!
//! 1. [`ImageAcquirer`] resolves an [`ImageReference`] (a http(s) URL or a byte stream)
//!    into a [`DecodedImage`].
//! 2. [`CaptionEngine`] hands the image to a [`CaptioningModel`] running on its own
//!    thread, one request at a time, and returns a [`Caption`].
//! 3. The caller shows the caption and the image, and offers the image as a PNG download.
//!
//! [`Captioner`] ties the steps together and [`server::router`] puts a page and a JSON API
//! in front of it. The bundled model is BLIP ([`blip::BlipCaptioner`]), but any type
//! implementing [`CaptioningModel`] can be plugged in.

mod acquire;
mod engine;
mod error;
mod model;
mod pipeline;

pub mod blip;
pub mod config;
pub mod messages;
pub mod server;

pub use acquire::{
    DecodedImage, ImageAcquirer, ImageReference, decode_image, encode_png, is_remote_url,
};
pub use engine::{CaptionEngine, CaptionEngineResponse, CaptionEngineState};
pub use error::CaptionError;
pub use model::{Caption, CaptioningModel, request_caption};
pub use pipeline::{CaptionOutcome, Captioner, DOWNLOAD_FILE_NAME};
