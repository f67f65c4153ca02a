#![allow(dead_code)]

use axum::{Router, http::StatusCode, http::header, response::IntoResponse, routing::get};
use kornia_caption::{
    CaptionEngine, Captioner, CaptioningModel, DecodedImage, ImageAcquirer, server,
};
use std::{io::Cursor, net::SocketAddr, sync::Arc};

#[derive(Debug, thiserror::Error)]
#[error("model crashed")]
pub struct ModelCrashed;

/// Names the dominant color of the image; crashes on all-black images.
pub struct ColorModel;

impl CaptioningModel for ColorModel {
    type Input = [u64; 3];
    type Error = ModelCrashed;

    fn preprocess(&self, image: &DecodedImage) -> Result<Self::Input, ModelCrashed> {
        let mut sums = [0u64; 3];
        for px in image.as_slice().chunks(3) {
            for (sum, v) in sums.iter_mut().zip(px) {
                *sum += *v as u64;
            }
        }
        Ok(sums)
    }

    fn generate(&mut self, sums: Self::Input) -> Result<Vec<u32>, ModelCrashed> {
        if sums == [0, 0, 0] {
            return Err(ModelCrashed);
        }
        let (channel, _) = sums
            .iter()
            .enumerate()
            .max_by_key(|(_, sum)| **sum)
            .ok_or(ModelCrashed)?;
        Ok(vec![channel as u32])
    }

    fn decode(&self, tokens: &[u32]) -> Result<String, ModelCrashed> {
        let color = match tokens.first() {
            Some(0) => "red",
            Some(1) => "green",
            _ => "blue",
        };
        Ok(format!("a {color} square"))
    }
}

pub fn captioner() -> Arc<Captioner> {
    Arc::new(Captioner::new(
        ImageAcquirer::new(),
        CaptionEngine::new("color", ColorModel),
    ))
}

pub fn encode(width: u32, height: u32, rgb: [u8; 3], format: image::ImageFormat) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb(rgb));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
    buf
}

pub fn red_png() -> Vec<u8> {
    encode(10, 10, [255, 0, 0], image::ImageFormat::Png)
}

/// Serves a fixed set of images on an ephemeral local port.
pub async fn serve_images() -> SocketAddr {
    let cat = encode(40, 30, [20, 200, 20], image::ImageFormat::Jpeg);
    let red = red_png();

    let app = Router::new()
        .route(
            "/cat.jpg",
            get(move || {
                let cat = cat.clone();
                async move { ([(header::CONTENT_TYPE, "image/jpeg")], cat) }
            }),
        )
        .route(
            "/red.png",
            get(move || {
                let red = red.clone();
                async move { ([(header::CONTENT_TYPE, "image/png")], red) }
            }),
        )
        .route(
            "/page.html",
            get(|| async { ([(header::CONTENT_TYPE, "text/html")], "<html></html>") }),
        )
        .route(
            "/gone.jpg",
            get(|| async { StatusCode::NOT_FOUND.into_response() }),
        );

    serve(app).await
}

/// Serves the captioning app backed by [`ColorModel`].
pub async fn serve_captioner() -> SocketAddr {
    serve(server::router(captioner())).await
}

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// An address nobody listens on.
pub fn refused_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}
