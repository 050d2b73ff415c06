//! Provider model listing against a mocked backend.

use reqwest::Client;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mod_sync_core::{ModelCatalog, ModelListError, ProviderCredentials, TranslationProvider};

fn catalog(server: &MockServer) -> ModelCatalog {
    ModelCatalog::new(Client::new(), format!("{}/api", server.uri()))
}

#[tokio::test]
async fn ollama_models_come_from_configured_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/translate/ollama/models"))
        .and(query_param("base_url", "http://10.0.0.5:11434"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": ["llama3:8b", "gemma2", "llama3:8b", " "]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let credentials = ProviderCredentials {
        ollama_url: "http://10.0.0.5:11434".into(),
        ..ProviderCredentials::default()
    };
    let models = catalog(&server)
        .list(TranslationProvider::Ollama, &credentials)
        .await
        .unwrap();
    assert_eq!(models, vec!["gemma2", "llama3:8b"]);
}

#[tokio::test]
async fn openai_models_are_listed_with_the_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/translate/openai/models"))
        .and(query_param("api_key", "sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": ["gpt-4o-mini", "gpt-4o"]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let credentials = ProviderCredentials {
        openai_key: "sk-test".into(),
        ..ProviderCredentials::default()
    };
    let models = catalog(&server)
        .list(TranslationProvider::Openai, &credentials)
        .await
        .unwrap();
    assert_eq!(models, vec!["gpt-4o", "gpt-4o-mini"]);
}

#[tokio::test]
async fn missing_models_field_is_an_empty_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/translate/ollama/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let models = catalog(&server)
        .list(TranslationProvider::Ollama, &ProviderCredentials::default())
        .await
        .unwrap();
    assert!(models.is_empty());
}

#[tokio::test]
async fn rejected_key_and_server_errors_are_distinct() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/translate/claude/models"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/translate/ollama/models"))
        .respond_with(
            ResponseTemplate::new(502).set_body_json(json!({"detail": "ollama not running"})),
        )
        .mount(&server)
        .await;

    let credentials = ProviderCredentials {
        claude_key: "sk-ant-old".into(),
        ..ProviderCredentials::default()
    };
    assert!(matches!(
        catalog(&server)
            .list(TranslationProvider::Claude, &credentials)
            .await,
        Err(ModelListError::Unauthorized(_))
    ));
    match catalog(&server)
        .list(TranslationProvider::Ollama, &credentials)
        .await
    {
        Err(ModelListError::Remote { status, detail }) => {
            assert_eq!(status, 502);
            assert_eq!(detail, "ollama not running");
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[tokio::test]
async fn keyed_provider_without_key_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    assert!(matches!(
        catalog(&server)
            .list(TranslationProvider::Gemini, &ProviderCredentials::default())
            .await,
        Err(ModelListError::MissingKey(_))
    ));
}
