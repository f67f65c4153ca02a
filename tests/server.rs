use kornia_caption::{
    decode_image,
    messages::{CaptionRequest, CaptionResponse},
};
use reqwest::StatusCode;
use serde_json::Value;

mod common;

async fn post_json(addr: std::net::SocketAddr, req: &CaptionRequest) -> (StatusCode, Value) {
    let response = reqwest::Client::new()
        .post(format!("http://{addr}/api/caption"))
        .json(req)
        .send()
        .await
        .unwrap();
    let status = response.status();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn test_api_caption_upload() {
    let addr = common::serve_captioner().await;

    let req = CaptionRequest::from_image_bytes(&common::red_png());
    let (status, mut body) = post_json(addr, &req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");

    let response: CaptionResponse = serde_json::from_value(body["response"].take()).unwrap();
    assert_eq!(response.caption, "a red square");
    assert_eq!((response.width, response.height), (10, 10));

    let download = decode_image(&response.png().unwrap()).unwrap();
    assert_eq!((download.width(), download.height()), (10, 10));
    assert!(download.as_slice().chunks(3).all(|px| px == [255, 0, 0]));
}

#[tokio::test]
async fn test_api_caption_url() {
    let images = common::serve_images().await;
    let addr = common::serve_captioner().await;

    let req = CaptionRequest::from_url(format!("http://{images}/cat.jpg"));
    let (status, body) = post_json(addr, &req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"]["caption"], "a green square");
    assert_eq!(body["response"]["width"], 40);
    assert_eq!(body["response"]["height"], 30);
}

#[tokio::test]
async fn test_api_caption_unreachable_url() {
    let addr = common::serve_captioner().await;

    let req = CaptionRequest::from_url(format!("http://{}/cat.jpg", common::refused_addr()));
    let (status, body) = post_json(addr, &req).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["status"], "error");
    assert_eq!(body["kind"], "fetch");
    assert!(body.get("response").is_none());
}

#[tokio::test]
async fn test_api_caption_invalid_input() {
    let addr = common::serve_captioner().await;

    let (status, body) = post_json(addr, &CaptionRequest::default()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_input");

    let req = CaptionRequest::from_url("ftp://example.com/cat.jpg");
    let (status, body) = post_json(addr, &req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_input");

    let (status, body) = post_json(addr, &CaptionRequest::from_image_bytes(b"GIF89a")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "decode");
}

#[tokio::test]
async fn test_api_caption_malformed_body() {
    let addr = common::serve_captioner().await;
    let client = reqwest::Client::new();

    let bodies = [
        client
            .post(format!("http://{addr}/api/caption"))
            .json(&serde_json::json!({ "url": 5 })),
        client
            .post(format!("http://{addr}/api/caption"))
            .header("content-type", "application/json")
            .body("{not json"),
        client
            .post(format!("http://{addr}/api/caption"))
            .body(r#"{"url": "http://example.com/cat.jpg"}"#),
    ];

    for request in bodies {
        let response = request.send().await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body: Value = response.json().await.unwrap();
        assert_eq!(body["status"], "error");
        assert_eq!(body["kind"], "invalid_input");
        assert!(body["message"].as_str().unwrap().contains("malformed request"));
    }
}

#[tokio::test]
async fn test_model_failure_does_not_affect_next_request() {
    let addr = common::serve_captioner().await;

    let black = common::encode(4, 4, [0, 0, 0], image::ImageFormat::Png);
    let (status, body) = post_json(addr, &CaptionRequest::from_image_bytes(&black)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["kind"], "inference");
    assert!(body["message"].as_str().unwrap().contains("model crashed"));

    let req = CaptionRequest::from_image_bytes(&common::red_png());
    let (status, body) = post_json(addr, &req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"]["caption"], "a red square");
}

#[tokio::test]
async fn test_page_form_upload() {
    let addr = common::serve_captioner().await;
    let client = reqwest::Client::new();

    let index = client
        .get(format!("http://{addr}/"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(index.contains("Image Captioning with BLIP"));
    assert!(index.contains(r#"name="image""#));

    let form = reqwest::multipart::Form::new()
        .text("source", "upload")
        .text("url", "")
        .part(
            "image",
            reqwest::multipart::Part::bytes(common::red_png())
                .file_name("red.png")
                .mime_str("image/png")
                .unwrap(),
        );
    let response = client
        .post(format!("http://{addr}/caption"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let page = response.text().await.unwrap();
    assert!(page.contains("Generated Caption: a red square"));
    assert!(page.contains(r#"download="image.png""#));
    assert!(page.contains("data:image/png;base64,"));
}

#[tokio::test]
async fn test_page_form_unreachable_url() {
    let addr = common::serve_captioner().await;

    let form = reqwest::multipart::Form::new()
        .text("source", "url")
        .text("url", format!("http://{}/cat.jpg", common::refused_addr()));
    let response = reqwest::Client::new()
        .post(format!("http://{addr}/caption"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let page = response.text().await.unwrap();
    assert!(page.contains("Error: failed to fetch image"));
    assert!(!page.contains("Generated Caption"));
}

#[tokio::test]
async fn test_status() {
    let addr = common::serve_captioner().await;

    let body: Value = reqwest::get(format!("http://{addr}/status"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "idle");
    assert_eq!(body["model"], "color");
}
