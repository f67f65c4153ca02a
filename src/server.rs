//! The captioning page and its JSON API.

use crate::acquire::ImageReference;
use crate::error::CaptionError;
use crate::messages::{CaptionRequest, CaptionResponse};
use crate::pipeline::{CaptionOutcome, Captioner, DOWNLOAD_FILE_NAME};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State, rejection::JsonRejection},
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, post},
};
use base64::{Engine as _, engine::general_purpose};
use serde_json::json;
use std::sync::Arc;

/// Largest accepted request body, uploads included.
pub const MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Image Captioning with BLIP</title>
</head>
<body>
<h1>Image Captioning with BLIP</h1>
<p>Provide an image URL or upload an image to generate a caption.</p>
<form action="/caption" method="post" enctype="multipart/form-data">
  <fieldset>
    <legend>Select Image Source</legend>
    <label><input type="radio" name="source" value="url" checked> URL</label>
    <label><input type="radio" name="source" value="upload"> Upload</label>
  </fieldset>
  <p><label>Enter Image URL <input type="url" name="url" size="60"></label></p>
  <p><label>Upload an Image <input type="file" name="image" accept=".jpg,.jpeg,.png,image/jpeg,image/png"></label></p>
  <p><button type="submit">Generate caption</button></p>
</form>
</body>
</html>
"#;

/// Builds the router serving the page, the JSON API and the engine status.
pub fn router(captioner: Arc<Captioner>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/caption", post(post_caption_form))
        .route("/api/caption", post(post_caption))
        .route("/status", get(get_status))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(captioner)
}

/// HTTP status reported for each error kind.
pub fn status_code(err: &CaptionError) -> StatusCode {
    match err {
        CaptionError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        CaptionError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CaptionError::Fetch { .. } => StatusCode::BAD_GATEWAY,
        CaptionError::Inference(_) | CaptionError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn get_status(State(captioner): State<Arc<Captioner>>) -> impl IntoResponse {
    Json(json!({
        "status": captioner.state().as_str(),
        "model": captioner.model_id(),
    }))
}

async fn post_caption(
    State(captioner): State<Arc<Captioner>>,
    payload: Result<Json<CaptionRequest>, JsonRejection>,
) -> impl IntoResponse {
    let result = async {
        let Json(payload) = payload.map_err(|e| {
            CaptionError::InvalidInput(format!("malformed request: {}", e.body_text()))
        })?;
        let reference = ImageReference::try_from(payload)?;
        let outcome = captioner.caption(reference).await?;
        let png = outcome.png()?;
        Ok::<_, CaptionError>(CaptionResponse {
            caption: outcome.caption.into_inner(),
            width: outcome.image.width(),
            height: outcome.image.height(),
            duration: outcome.duration,
            image: general_purpose::STANDARD.encode(png),
        })
    }
    .await;

    match result {
        Ok(response) => (
            StatusCode::OK,
            Json(json!({ "status": "success", "response": response })),
        ),
        Err(e) => {
            log::warn!("Caption request failed: {e}");
            (
                status_code(&e),
                Json(json!({ "status": "error", "kind": e.kind(), "message": e.to_string() })),
            )
        }
    }
}

async fn post_caption_form(
    State(captioner): State<Arc<Captioner>>,
    multipart: Multipart,
) -> impl IntoResponse {
    let result = async {
        let (reference, label) = read_form(multipart).await?;
        let outcome = captioner.caption(reference).await?;
        let page = render_outcome(&outcome, label)?;
        Ok::<_, CaptionError>(page)
    }
    .await;

    match result {
        Ok(page) => (StatusCode::OK, Html(page)),
        Err(e) => {
            log::warn!("Caption request failed: {e}");
            (status_code(&e), Html(render_error(&e)))
        }
    }
}

async fn read_form(
    mut multipart: Multipart,
) -> Result<(ImageReference, &'static str), CaptionError> {
    let invalid = |e: axum::extract::multipart::MultipartError| {
        CaptionError::InvalidInput(format!("malformed form: {e}"))
    };

    let mut source = None;
    let mut url = None;
    let mut image = None;

    while let Some(field) = multipart.next_field().await.map_err(invalid)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("source") => source = Some(field.text().await.map_err(invalid)?),
            Some("url") => url = Some(field.text().await.map_err(invalid)?),
            Some("image") => image = Some(field.bytes().await.map_err(invalid)?),
            _ => {}
        }
    }

    form_reference(source.as_deref(), url, image)
}

/// Picks the image reference out of the submitted form fields.
///
/// The `source` radio decides which field is used. Without it, exactly one of the two
/// fields has to be filled in.
fn form_reference(
    source: Option<&str>,
    url: Option<String>,
    image: Option<Bytes>,
) -> Result<(ImageReference, &'static str), CaptionError> {
    let url = url
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty());
    let image = image.filter(|image| !image.is_empty());

    match (source, url, image) {
        (Some("url"), Some(url), _) | (None, Some(url), None) => {
            Ok((ImageReference::RemoteUrl(url), "Input Image"))
        }
        (Some("upload"), _, Some(image)) | (None, None, Some(image)) => Ok((
            ImageReference::from_bytes(image.to_vec()),
            "Uploaded Image",
        )),
        (Some("url"), None, _) => Err(CaptionError::InvalidInput(
            "enter an image url".to_string(),
        )),
        (Some("upload"), _, None) => Err(CaptionError::InvalidInput(
            "upload an image".to_string(),
        )),
        (Some(other), _, _) => Err(CaptionError::InvalidInput(format!(
            "unknown image source: {other}"
        ))),
        (None, Some(_), Some(_)) => Err(CaptionError::InvalidInput(
            "provide either an image url or an upload, not both".to_string(),
        )),
        (None, None, None) => Err(CaptionError::InvalidInput(
            "provide an image url or upload an image".to_string(),
        )),
    }
}

/// The PNG is embedded once, in the preview; the download link reads it from there.
fn render_outcome(outcome: &CaptionOutcome, label: &str) -> Result<String, CaptionError> {
    let png = general_purpose::STANDARD.encode(outcome.png()?);
    let caption = html_escape::encode_text(outcome.caption.as_str());
    let alt = html_escape::encode_double_quoted_attribute(outcome.caption.as_str());

    Ok(format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Image Captioning with BLIP</title>
</head>
<body>
<h1>Image Captioning with BLIP</h1>
<figure>
  <img id="preview" src="data:image/png;base64,{png}" alt="{alt}" style="max-width: 100%">
  <figcaption>{label}</figcaption>
</figure>
<p class="success">Generated Caption: {caption}</p>
<p><a href="#" download="{DOWNLOAD_FILE_NAME}" onclick="this.href = document.getElementById('preview').src">Download Image</a></p>
<p><a href="/">Caption another image</a></p>
</body>
</html>
"##
    ))
}

fn render_error(err: &CaptionError) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Image Captioning with BLIP</title>
</head>
<body>
<h1>Image Captioning with BLIP</h1>
<p class="error">Error: {}</p>
<p><a href="/">Try again</a></p>
</body>
</html>
"#,
        html_escape::encode_text(&err.to_string())
    )
}
