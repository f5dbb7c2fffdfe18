//! Integration tests for the upload flow against a mocked API and storage
//!
//! The API and the storage are served by the same mock server, the API hands
//! out presigned URLs pointing back to it.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    clippy::indexing_slicing,
    clippy::panic
)]

use mockito::{Matcher, Server, ServerGuard};
use reqwest::Client;
use serde_json::json;
use std::{io::Write, sync::Arc, time::Duration};
use tempfile::NamedTempFile;
use zeroup::{
    api::{ApiClient, NewUpload, StorageClient, UploadTicket},
    upload::{
        ProgressAggregator, TransferConfig, UploadError, UploadOrchestrator, upload_single,
    },
};

const CONTENT: &str = "0123456789abcdefghijABCDE";

fn create_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(CONTENT.as_bytes()).expect("Failed to write temp file");
    file.flush().expect("Failed to flush temp file");
    file
}

fn config() -> TransferConfig {
    TransferConfig {
        concurrency: 2,
        max_retries: 2,
        backoff_unit: Duration::from_millis(1),
        ..TransferConfig::default()
    }
}

fn api(server: &ServerGuard) -> ApiClient {
    ApiClient::new(&format!("{}/api/", server.url()), Client::new(), None)
        .with_backoff(Duration::from_millis(1))
}

fn new_upload() -> NewUpload<'static> {
    NewUpload {
        filename: "file.bin",
        file_size: CONTENT.len() as u64,
        bucket_code: "eu",
        content_type: "application/octet-stream",
        note: "",
    }
}

async fn mock_initiate_multipart(server: &mut ServerGuard) -> mockito::Mock {
    let base = server.url();
    server
        .mock("POST", "/api/initiate-upload/")
        .with_status(200)
        .with_body(
            json!({
                "upload_type": "multipart",
                "chunk_size": 10,
                "completion_token": "ct-1",
                "ssec_key": "a2V5",
                "ssec_key_md5": "bWQ1",
                "part_urls": [
                    {"part_number": 3, "url": format!("{base}/storage/obj?partNumber=3")},
                    {"part_number": 1, "url": format!("{base}/storage/obj?partNumber=1")},
                    {"part_number": 2, "url": format!("{base}/storage/obj?partNumber=2")}
                ],
                "download_url": "https://dl.example/1"
            })
            .to_string(),
        )
        .create_async()
        .await
}

async fn mock_part(
    server: &mut ServerGuard,
    part: &str,
    body: &str,
    status: usize,
) -> mockito::Mock {
    server
        .mock("PUT", "/storage/obj")
        .match_query(Matcher::UrlEncoded("partNumber".into(), part.into()))
        .match_header("x-amz-server-side-encryption-customer-algorithm", "AES256")
        .match_header("x-amz-server-side-encryption-customer-key", "a2V5")
        .match_header("x-amz-server-side-encryption-customer-key-md5", "bWQ1")
        .match_body(body)
        .with_status(status)
        .with_header("ETag", format!("\"etag-{part}\"").as_str())
        .create_async()
        .await
}

#[tokio::test]
async fn test_multipart_upload() {
    let mut server = Server::new_async().await;
    let file = create_file();

    let initiate = mock_initiate_multipart(&mut server).await;
    let part1 = mock_part(&mut server, "1", &CONTENT[0..10], 200).await;
    let part2 = mock_part(&mut server, "2", &CONTENT[10..20], 200).await;
    let part3 = mock_part(&mut server, "3", &CONTENT[20..25], 200).await;

    let complete = server
        .mock("POST", "/api/complete-multipart-upload/")
        .match_body(Matcher::PartialJson(json!({
            "completion_token": "ct-1",
            "parts": [
                {"part_number": 1, "etag": "etag-1"},
                {"part_number": 2, "etag": "etag-2"},
                {"part_number": 3, "etag": "etag-3"}
            ]
        })))
        .with_status(200)
        .with_body(r#"{"file_id": "f-25"}"#)
        .create_async()
        .await;

    let api = api(&server);
    let ticket = api.initiate_upload(&new_upload()).await.unwrap();
    assert_eq!(ticket.download_url(), Some("https://dl.example/1"));

    let UploadTicket::Multipart(ticket) = ticket else {
        panic!("expected a multipart ticket");
    };

    let progress = ProgressAggregator::default();

    let uploaded = UploadOrchestrator::new(Arc::new(StorageClient::default()), &api, config())
        .with_progress(progress.clone())
        .upload(file.path(), |size| ticket.descriptor(size))
        .await
        .unwrap();

    assert_eq!(uploaded.file_id.as_deref(), Some("f-25"));
    assert_eq!(uploaded.parts.len(), 3);
    assert_eq!(progress.total(), 25);
    assert!(progress.is_finished());

    initiate.assert_async().await;
    part1.assert_async().await;
    part2.assert_async().await;
    part3.assert_async().await;
    complete.assert_async().await;
}

#[tokio::test]
async fn test_multipart_upload_aborted() {
    let mut server = Server::new_async().await;
    let file = create_file();

    let _initiate = mock_initiate_multipart(&mut server).await;
    let _part1 = mock_part(&mut server, "1", &CONTENT[0..10], 200).await;
    let part2 = server
        .mock("PUT", "/storage/obj")
        .match_query(Matcher::UrlEncoded("partNumber".into(), "2".into()))
        .with_status(500)
        .with_body("<Error><Code>InternalError</Code><Message>try again</Message></Error>")
        .expect(2)
        .create_async()
        .await;
    let _part3 = mock_part(&mut server, "3", &CONTENT[20..25], 200).await;

    let complete = server
        .mock("POST", "/api/complete-multipart-upload/")
        .expect(0)
        .create_async()
        .await;

    let abort = server
        .mock("POST", "/api/abort-multipart-upload/")
        .match_body(Matcher::Json(json!({"completion_token": "ct-1"})))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let api = api(&server);
    let UploadTicket::Multipart(ticket) = api.initiate_upload(&new_upload()).await.unwrap() else {
        panic!("expected a multipart ticket");
    };

    let err = UploadOrchestrator::new(Arc::new(StorageClient::default()), &api, config())
        .upload(file.path(), |size| ticket.descriptor(size))
        .await
        .unwrap_err();

    assert_eq!(err.part_number(), Some(2));
    assert!(err.to_string().contains("InternalError: try again"), "{err}");

    part2.assert_async().await;
    complete.assert_async().await;
    abort.assert_async().await;
}

#[tokio::test]
async fn test_multipart_upload_invalid_ticket() {
    let mut server = Server::new_async().await;
    let file = NamedTempFile::new().unwrap();
    file.as_file().set_len(100).unwrap();

    let _initiate = mock_initiate_multipart(&mut server).await;

    let parts = server
        .mock("PUT", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let api = api(&server);
    let UploadTicket::Multipart(ticket) = api.initiate_upload(&new_upload()).await.unwrap() else {
        panic!("expected a multipart ticket");
    };

    let err = UploadOrchestrator::new(Arc::new(StorageClient::default()), &api, config())
        .upload(file.path(), |size| ticket.descriptor(size))
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::InvalidPlan(_)));
    parts.assert_async().await;
}

#[tokio::test]
async fn test_single_upload() {
    let mut server = Server::new_async().await;
    let file = create_file();

    let initiate = server
        .mock("POST", "/api/initiate-upload/")
        .with_status(200)
        .with_body(
            json!({
                "upload_type": "single",
                "url": format!("{}/storage/obj", server.url()),
                "headers": {"Content-Type": "application/octet-stream"},
                "completion_token": "ct-2"
            })
            .to_string(),
        )
        .create_async()
        .await;

    let put = server
        .mock("PUT", "/storage/obj")
        .match_header("content-type", "application/octet-stream")
        .match_body(CONTENT)
        .with_status(200)
        .with_header("ETag", "\"whole\"")
        .create_async()
        .await;

    let complete = server
        .mock("POST", "/api/complete-single-upload/")
        .match_body(Matcher::Json(json!({"completion_token": "ct-2", "token": null})))
        .with_status(200)
        .with_body(r#"{"file_id": 7}"#)
        .create_async()
        .await;

    let api = api(&server);
    let UploadTicket::Single(ticket) = api.initiate_upload(&new_upload()).await.unwrap() else {
        panic!("expected a single ticket");
    };

    let uploaded = upload_single(
        Arc::new(StorageClient::default()),
        &api,
        file.path(),
        &ticket.url,
        &ticket.headers,
        &ticket.completion_token,
        config(),
        ProgressAggregator::default(),
        tokio_util::sync::CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(uploaded.file_id.as_deref(), Some("7"));
    assert_eq!(uploaded.parts[0].entity_tag, "whole");

    initiate.assert_async().await;
    put.assert_async().await;
    complete.assert_async().await;
}
