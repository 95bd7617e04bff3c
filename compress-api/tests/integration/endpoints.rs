use std::io::{Cursor, Read as _};

use compress_api::api::routes::routes;
use compress_api::config::Settings;
use compress_api::testing::{fixtures, MultipartBuilder};
use test_case::test_case;
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::test::request;

use crate::{context, is_empty, settings_in};

fn archive_entries(body: &Bytes) -> Vec<(String, Vec<u8>)> {
    let mut zip = zip::ZipArchive::new(Cursor::new(body.to_vec())).unwrap();
    (0..zip.len())
        .map(|index| {
            let mut entry = zip.by_index(index).unwrap();
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents).unwrap();
            (entry.name().to_string(), contents)
        })
        .collect()
}

fn json(body: &Bytes) -> serde_json::Value {
    serde_json::from_slice(body).unwrap()
}

async fn post(settings: Settings, body: MultipartBuilder) -> warp::http::Response<Bytes> {
    let filter = routes(context(settings));
    let (content_type, bytes) = body.build();
    request()
        .method("POST")
        .path("/api/compress")
        .header("content-type", content_type)
        .body(bytes)
        .reply(&filter)
        .await
}

#[tokio::test]
async fn five_images_come_back_as_five_pngs() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings_in(dir.path(), &[]);
    let body = MultipartBuilder::new()
        .file("files", "one.png", &fixtures::gradient_png(20, 20))
        .file("files", "two.jpg", &fixtures::gradient_jpeg(24, 16))
        .file("files", "three.PNG", &fixtures::gradient_png(8, 30))
        .file("files", "four", &fixtures::gradient_png(12, 12))
        .file("files", "five.jpeg", &fixtures::gradient_jpeg(16, 16))
        .field("colors", "16")
        .field("dither", "0");

    let response = post(settings, body).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/zip");
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=compressed.zip"
    );
    assert_eq!(response.headers()["access-control-allow-origin"], "*");

    let entries = archive_entries(response.body());
    let names: Vec<_> = entries.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, ["one.png", "two.png", "three.PNG", "four.png", "five.png"]);
    for (name, contents) in &entries {
        let decoded = image::load_from_memory_with_format(contents, image::ImageFormat::Png);
        assert!(decoded.is_ok(), "{name} is not a png");
    }
    assert!(is_empty(dir.path()));
}

#[tokio::test]
async fn corrupt_images_are_left_out() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings_in(dir.path(), &[]);
    let body = MultipartBuilder::new()
        .file("files[]", "good.png", &fixtures::gradient_png(10, 10))
        .file("files[]", "broken.png", fixtures::CORRUPT_IMAGE)
        .file("files[]", "fine.jpg", &fixtures::gradient_jpeg(10, 10));

    let response = post(settings, body).await;

    assert_eq!(response.status(), StatusCode::OK);
    let names: Vec<_> = archive_entries(response.body())
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert_eq!(names, ["good.png", "fine.png"]);
    assert!(is_empty(dir.path()));
}

#[tokio::test]
async fn only_corrupt_images_is_processing_failed() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings_in(dir.path(), &[]);
    let body = MultipartBuilder::new()
        .file("files", "a.png", fixtures::CORRUPT_IMAGE)
        .file("files", "b.png", b"nothing");

    let response = post(settings, body).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json(response.body()), serde_json::json!({ "error": "Processing failed" }));
    assert!(is_empty(dir.path()));
}

#[tokio::test]
async fn form_without_files_is_a_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings_in(dir.path(), &[]);
    let body = MultipartBuilder::new().field("colors", "64");

    let response = post(settings, body).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(response.body()), serde_json::json!({ "error": "No files" }));
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
}

#[tokio::test]
async fn oversized_file_is_an_upload_error() {
    let dir = tempfile::tempdir().unwrap();
    let overrides = [("COMPRESS_API_LIMITS__MAX_FILE_SIZE_BYTES", "64")];
    let settings = settings_in(dir.path(), &overrides);
    let body = MultipartBuilder::new()
        .file("files", "small.png", b"0123456789")
        .file("files", "large.png", &fixtures::gradient_png(64, 64));

    let response = post(settings, body).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json(response.body());
    assert_eq!(body["error"], "Upload error");
    assert!(body["detail"].as_str().unwrap().contains("large.png"));
    assert!(is_empty(dir.path()));
}

#[tokio::test]
async fn oversized_request_is_an_upload_error() {
    let dir = tempfile::tempdir().unwrap();
    let overrides = [
        ("COMPRESS_API_LIMITS__MAX_FILE_SIZE_BYTES", "64"),
        ("COMPRESS_API_LIMITS__MAX_REQUEST_BYTES", "128"),
    ];
    let settings = settings_in(dir.path(), &overrides);
    let body = MultipartBuilder::new().file("files", "big.png", &fixtures::gradient_png(64, 64));

    let response = post(settings, body).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json(response.body())["error"], "Upload error");
    assert!(is_empty(dir.path()));
}

#[test_case("GET"; "get")]
#[test_case("PUT"; "put")]
#[test_case("DELETE"; "delete")]
#[tokio::test]
async fn other_methods_are_not_allowed(method: &str) {
    let dir = tempfile::tempdir().unwrap();
    let filter = routes(context(settings_in(dir.path(), &[])));

    let response = request().method(method).path("/api/compress").reply(&filter).await;

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(json(response.body()), serde_json::json!({ "error": "POST only" }));
    assert_eq!(
        response.headers()["access-control-allow-methods"],
        "POST, OPTIONS"
    );
}

#[tokio::test]
async fn preflight_has_no_body() {
    let dir = tempfile::tempdir().unwrap();
    let filter = routes(context(settings_in(dir.path(), &[])));

    let response = request().method("OPTIONS").path("/api/compress").reply(&filter).await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(response.body().is_empty());
    assert_eq!(
        response.headers()["access-control-expose-headers"],
        "Content-Type, Content-Disposition"
    );
}

#[tokio::test]
async fn unknown_paths_are_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let filter = routes(context(settings_in(dir.path(), &[])));

    let response = request().method("POST").path("/api/unknown").reply(&filter).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json(response.body()), serde_json::json!({ "error": "Not found" }));
}

#[tokio::test]
async fn health_is_available() {
    let dir = tempfile::tempdir().unwrap();
    let filter = routes(context(settings_in(dir.path(), &[])));

    let response = request().method("GET").path("/health").reply(&filter).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json(response.body())["version"], env!("CARGO_PKG_VERSION"));
}
