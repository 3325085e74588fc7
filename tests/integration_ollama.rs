#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Ollama HTTP behaviour against a mock server
// Run with: cargo test --test integration_ollama

use docs_rag::DocsError;
use docs_rag::config::{GenerationConfig, OllamaConfig};
use docs_rag::embeddings::{Embedder, OllamaClient};
use docs_rag::generation::{Generator, OllamaGenerator};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ollama_config_for(server: &MockServer, batch_size: u32) -> OllamaConfig {
    let address = server.address();
    OllamaConfig {
        protocol: "http".to_string(),
        host: address.ip().to_string(),
        port: address.port(),
        model: "test-embed".to_string(),
        batch_size,
    }
}

fn test_client(server: &MockServer, batch_size: u32) -> OllamaClient {
    OllamaClient::new(&ollama_config_for(server, batch_size))
        .expect("Failed to create Ollama client")
        .with_timeout(Duration::from_secs(5))
        .with_retry_attempts(2)
        .with_backoff_base(Duration::from_millis(10))
}

async fn mount_version(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/version"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"version": "0.9.0"})))
        .mount(server)
        .await;
}

#[tokio::test]
async fn batch_embeddings_keep_input_order() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"model": "test-embed", "input": ["a", "b"]})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"embeddings": [[1.0, 0.0], [0.0, 1.0]]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"input": ["c"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[0.5, 0.5]]})))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server, 2);
    let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];

    let embeddings = tokio::task::spawn_blocking(move || client.embed(&texts))
        .await
        .expect("blocking task should join")
        .expect("embedding should succeed");

    assert_eq!(
        embeddings,
        vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]]
    );
}

#[tokio::test]
async fn query_embedding() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[0.1, 0.2, 0.3]]})),
        )
        .mount(&server)
        .await;

    let client = test_client(&server, 16);
    let embedding = tokio::task::spawn_blocking(move || client.embed_query("what is a GPIO pin?"))
        .await
        .expect("blocking task should join")
        .expect("query embedding should succeed");

    assert_eq!(embedding, vec![0.1, 0.2, 0.3]);
}

#[tokio::test]
async fn count_mismatch_is_an_embedding_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[1.0]]})))
        .mount(&server)
        .await;

    let client = test_client(&server, 16);
    let texts = vec!["a".to_string(), "b".to_string()];
    let result = tokio::task::spawn_blocking(move || client.embed(&texts))
        .await
        .expect("blocking task should join");

    assert!(matches!(result, Err(DocsError::Embedding(_))));
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server, 16);
    let result = tokio::task::spawn_blocking(move || client.embed(&["x".to_string()]))
        .await
        .expect("blocking task should join");

    assert!(matches!(result, Err(DocsError::Embedding(_))));
}

#[tokio::test]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let client = test_client(&server, 16);
    let result = tokio::task::spawn_blocking(move || client.embed(&["x".to_string()]))
        .await
        .expect("blocking task should join");

    assert!(matches!(result, Err(DocsError::Embedding(_))));
}

#[tokio::test]
async fn health_check_finds_model() {
    let server = MockServer::start().await;
    mount_version(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                {"name": "llama2", "size": 3_825_819_519_u64},
                {"name": "test-embed"}
            ]
        })))
        .mount(&server)
        .await;

    let client = test_client(&server, 16);
    let result = tokio::task::spawn_blocking(move || client.health_check())
        .await
        .expect("blocking task should join");

    assert!(result.is_ok(), "health check should pass: {:?}", result);
}

#[tokio::test]
async fn health_check_reports_missing_model() {
    let server = MockServer::start().await;
    mount_version(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"models": [{"name": "llama2"}]})),
        )
        .mount(&server)
        .await;

    let client = test_client(&server, 16);
    let error = tokio::task::spawn_blocking(move || client.health_check())
        .await
        .expect("blocking task should join")
        .expect_err("test-embed is not installed");

    assert!(format!("{:#}", error).contains("test-embed"));
}

#[tokio::test]
async fn health_check_fails_when_server_is_down() {
    let server = MockServer::start().await;
    let client = test_client(&server, 16);
    drop(server);

    let result = tokio::task::spawn_blocking(move || client.health_check())
        .await
        .expect("blocking task should join");

    assert!(result.is_err());
}

#[tokio::test]
async fn generator_returns_response_text() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({"model": "llama2", "stream": false})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"response": "Use a 10k pull-up."})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let generator = OllamaGenerator::new(
        &ollama_config_for(&server, 16),
        &GenerationConfig::default(),
    )
    .expect("Failed to create generator");

    let answer = tokio::task::spawn_blocking(move || generator.generate("prompt"))
        .await
        .expect("blocking task should join")
        .expect("generation should succeed");

    assert_eq!(answer, "Use a 10k pull-up.");
}

#[tokio::test]
async fn generator_substitutes_missing_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"done": true})))
        .mount(&server)
        .await;

    let generator = OllamaGenerator::new(
        &ollama_config_for(&server, 16),
        &GenerationConfig::default(),
    )
    .expect("Failed to create generator");

    let answer = tokio::task::spawn_blocking(move || generator.generate("prompt"))
        .await
        .expect("blocking task should join")
        .expect("generation should succeed");

    assert_eq!(answer, "No response from LLM");
}

#[tokio::test]
async fn generator_http_failure_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let generator = OllamaGenerator::new(
        &ollama_config_for(&server, 16),
        &GenerationConfig::default(),
    )
    .expect("Failed to create generator");

    let result = tokio::task::spawn_blocking(move || generator.generate("prompt"))
        .await
        .expect("blocking task should join");

    assert!(matches!(result, Err(DocsError::Generation(_))));
}
