//! The external backend, driven through the HTTP surface with `cp` standing
//! in for the quantizer.
#![cfg(unix)]

use compress_api::api::routes::routes;
use compress_api::testing::MultipartBuilder;
use warp::http::StatusCode;
use warp::test::request;

use crate::{context, is_empty, settings_in};

#[tokio::test]
async fn derived_outputs_are_archived_and_removed() {
    let dir = tempfile::tempdir().unwrap();
    let overrides = [
        ("COMPRESS_API_COMPRESSION__BACKEND", "external"),
        ("COMPRESS_API_COMPRESSION__EXTERNAL__PROGRAM", "cp"),
        ("COMPRESS_API_COMPRESSION__EXTERNAL__ARGS", "{input},{output}"),
    ];
    let filter = routes(context(settings_in(dir.path(), &overrides)));
    let (content_type, body) = MultipartBuilder::new()
        .file("files", "a.png", b"first")
        .file("files", "b.png", b"second")
        .build();

    let response = request()
        .method("POST")
        .path("/api/compress")
        .header("content-type", content_type)
        .body(body)
        .reply(&filter)
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let archive = zip::ZipArchive::new(std::io::Cursor::new(response.body().to_vec())).unwrap();
    let names: Vec<_> = archive.file_names().collect();
    assert_eq!(names.len(), 2);
    assert!(is_empty(dir.path()));
}

#[tokio::test]
async fn failing_tool_is_processing_failed() {
    let dir = tempfile::tempdir().unwrap();
    let overrides = [
        ("COMPRESS_API_COMPRESSION__BACKEND", "external"),
        ("COMPRESS_API_COMPRESSION__EXTERNAL__PROGRAM", "false"),
        ("COMPRESS_API_COMPRESSION__EXTERNAL__ARGS", "{input}"),
    ];
    let filter = routes(context(settings_in(dir.path(), &overrides)));
    let (content_type, body) = MultipartBuilder::new().file("files", "a.png", b"x").build();

    let response = request()
        .method("POST")
        .path("/api/compress")
        .header("content-type", content_type)
        .body(body)
        .reply(&filter)
        .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(is_empty(dir.path()));
}
