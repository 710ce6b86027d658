use super::*;
use crate::config::OllamaConfig;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> OllamaClient {
    let base_url = Url::parse(&server.uri()).expect("mock server uri should parse");
    OllamaClient::new(&OllamaConfig::default())
        .expect("Failed to create client")
        .with_base_url(base_url)
        .with_backoff(Duration::from_millis(1))
}

#[test]
fn client_configuration() {
    let config = OllamaConfig {
        host: "test-host".to_string(),
        port: 1234,
        embedding_model: "test-embed".to_string(),
        generation_model: "test-gen".to_string(),
        batch_size: 128,
        retry_attempts: 4,
        ..OllamaConfig::default()
    };
    let client = OllamaClient::new(&config).expect("Failed to create client");

    assert_eq!(Embedder::model_id(&client), "test-embed");
    assert_eq!(Generator::model_id(&client), "test-gen");
    assert_eq!(client.batch_size, 128);
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.retry_attempts, 4);
}

#[test]
fn client_builder_methods() {
    let client = OllamaClient::new(&OllamaConfig::default())
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(0);

    assert_eq!(client.retry_attempts, 1);
}

#[test]
fn model_names_match_latest_tag() {
    assert!(model_matches("llama3:latest", "llama3"));
    assert!(model_matches("llama3:8b", "llama3:8b"));
    assert!(!model_matches("llama3:8b", "llama3"));
    assert!(!model_matches("nomic-embed-text:latest", "llama3"));
}

#[tokio::test(flavor = "multi_thread")]
async fn embeds_texts_in_batches() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"model": "nomic-embed-text"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[1.0, 0.0], [0.0, 1.0]]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let mut config = OllamaConfig::default();
    config.batch_size = 2;
    let client = OllamaClient::new(&config)
        .expect("Failed to create client")
        .with_base_url(Url::parse(&server.uri()).expect("uri"));

    let texts: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
    let vectors = tokio::task::spawn_blocking(move || client.embed(&texts))
        .await
        .expect("blocking task should join")
        .expect("should embed");

    assert_eq!(vectors.len(), 4);
    assert_eq!(vectors[2], vec![1.0, 0.0]);
}

#[tokio::test(flavor = "multi_thread")]
async fn embedding_count_mismatch_is_service_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[1.0, 0.0]]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let texts = vec!["one".to_string(), "two".to_string()];
    let result = tokio::task::spawn_blocking(move || client.embed(&texts))
        .await
        .expect("blocking task should join");

    assert!(matches!(result, Err(RagError::EmbeddingService(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({"model": "llama3", "stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "Forty-two."
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let answer = tokio::task::spawn_blocking(move || client.generate("What is the answer?"))
        .await
        .expect("blocking task should join")
        .expect("should generate after retries");

    assert_eq!(answer, "Forty-two.");
}

#[tokio::test(flavor = "multi_thread")]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = tokio::task::spawn_blocking(move || client.generate("hello"))
        .await
        .expect("blocking task should join");

    assert!(matches!(result, Err(RagError::Generation(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_completion_is_generation_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "  "})))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = tokio::task::spawn_blocking(move || client.generate("hello"))
        .await
        .expect("blocking task should join");

    assert!(matches!(result, Err(RagError::Generation(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn hanging_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"embeddings": [[1.0, 0.0]]}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"response": "too late"}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let client = client_for(&server)
        .with_timeout(Duration::from_secs(1))
        .with_retry_attempts(1);

    let started = std::time::Instant::now();
    let (embedded, generated) = tokio::task::spawn_blocking(move || {
        (
            client.embed(&["hello".to_string()]),
            client.generate("hello"),
        )
    })
    .await
    .expect("blocking task should join");

    assert!(matches!(embedded, Err(RagError::EmbeddingService(_))));
    assert!(matches!(generated, Err(RagError::Generation(_))));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test(flavor = "multi_thread")]
async fn ping_once_makes_a_single_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).with_retry_attempts(3);
    let result = tokio::task::spawn_blocking(move || client.ping_once())
        .await
        .expect("blocking task should join");

    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn health_check_requires_both_models() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                {"name": "nomic-embed-text:latest", "size": 274302450},
                {"name": "llama3:latest"}
            ]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let healthy = tokio::task::spawn_blocking({
        let client = client.clone();
        move || client.health_check()
    })
    .await
    .expect("blocking task should join");
    assert!(healthy.is_ok());

    let mut config = OllamaConfig::default();
    config.generation_model = "mistral".to_string();
    let missing = OllamaClient::new(&config)
        .expect("Failed to create client")
        .with_base_url(client.base_url().clone());
    let result = tokio::task::spawn_blocking(move || missing.validate_models())
        .await
        .expect("blocking task should join");
    assert!(result.is_err());
}
