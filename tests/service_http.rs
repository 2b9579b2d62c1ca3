// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! HTTP providers against a mock server

use serde_json::json;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use taxis::config::AppConfig;
use taxis::ollama::{OllamaClient, OllamaGenerator, OllamaVision};
use taxis::services::whisper::WhisperClient;
use taxis::services::{ImageLabeler, Services, TextGenerator, Transcriber};
use taxis::TaxisError;

#[tokio::test]
async fn test_text_generation_posts_non_streaming_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({ "model": "llama3.2:3b", "stream": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": "Beach Trip" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OllamaClient::new(&server.uri(), 5).unwrap();
    let generator = OllamaGenerator::new(client, "llama3.2:3b");

    let reply = assert_ok!(generator.generate("name this folder").await);
    assert_eq!(reply, "Beach Trip");
}

#[tokio::test]
async fn test_vision_labels_are_parsed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({ "model": "moondream" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "response": "Sunset, beach, Ocean, palm." })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = OllamaClient::new(&server.uri(), 5).unwrap();
    let vision = OllamaVision::new(client, "moondream", "list labels");

    let labels = assert_ok!(vision.label_image(b"not really a jpeg").await);
    assert_eq!(labels, ["sunset", "beach", "ocean", "palm"]);
}

#[tokio::test]
async fn test_server_error_is_reported() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = OllamaClient::new(&server.uri(), 5).unwrap();
    let generator = OllamaGenerator::new(client, "llama3.2:3b");

    let err = assert_err!(generator.generate("prompt").await);
    assert!(matches!(err, TaxisError::ServiceUnavailable(_)));
}

#[tokio::test]
async fn test_health_check_and_models() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{ "name": "llama3.2:3b" }, { "name": "moondream:latest" }]
        })))
        .mount(&server)
        .await;

    let client = OllamaClient::new(&format!("{}/", server.uri()), 5).unwrap();
    assert_ok!(client.health_check().await);
    assert!(client.model_available("moondream").await.unwrap());
    assert!(!client.model_available("llava").await.unwrap());
}

#[tokio::test]
async fn test_whisper_segments_are_joined() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/audio/transcriptions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "text": "ignored when segments exist",
            "segments": [
                { "text": " Quarterly budget " },
                { "text": "review meeting." }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let whisper = WhisperClient::new(&server.uri(), "whisper-small", 5).unwrap();
    let text = assert_ok!(whisper.transcribe_audio(b"ID3\x04\x00fake mp3").await);
    assert_eq!(text, "Quarterly budget review meeting.");
}

#[tokio::test]
async fn test_whisper_rejection_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/audio/transcriptions"))
        .respond_with(ResponseTemplate::new(422).set_body_string("unsupported format"))
        .mount(&server)
        .await;

    let whisper = WhisperClient::new(&server.uri(), "whisper-small", 5).unwrap();
    let err = assert_err!(whisper.transcribe_audio(b"????").await);
    assert!(err.to_string().contains("422"));
}

#[test]
fn test_bad_service_url_fails_startup() {
    let mut config = AppConfig::default();
    config.services.ollama_url = "not a url".to_string();

    let Err(err) = Services::from_config(&config) else {
        panic!("expected startup to fail");
    };
    assert!(matches!(err, TaxisError::Initialization(_)));
}
