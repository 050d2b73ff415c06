use log::debug;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;

use crate::backend::read_error_detail;
use crate::error::ModelListError;
use crate::launcher::{ProviderCredentials, TranslationProvider};
use crate::settings::DEFAULT_OLLAMA_URL;

#[derive(Debug, Default, Deserialize)]
struct ModelListing {
    #[serde(default)]
    models: Option<Vec<String>>,
}

/// Asks the backend which models a provider offers, for the settings dialog.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    client: Client,
    base_url: String,
}

impl ModelCatalog {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn listing_url(
        &self,
        provider: TranslationProvider,
        credentials: &ProviderCredentials,
    ) -> Result<Url, ModelListError> {
        let mut url = Url::parse(&format!(
            "{}/translate/{}/models",
            self.base_url, provider
        ))
        .map_err(|err| ModelListError::InvalidUrl(err.to_string()))?;

        match provider {
            TranslationProvider::Google => {
                return Err(ModelListError::Unsupported(provider.to_string()))
            }
            TranslationProvider::Ollama => {
                let server = credentials.ollama_url.trim();
                let server = if server.is_empty() {
                    DEFAULT_OLLAMA_URL
                } else {
                    server
                };
                url.query_pairs_mut().append_pair("base_url", server);
            }
            _ => {
                let key = credentials.key_for(provider).unwrap_or_default().trim();
                if key.is_empty() {
                    return Err(ModelListError::MissingKey(provider.to_string()));
                }
                url.query_pairs_mut().append_pair("api_key", key);
            }
        }
        Ok(url)
    }

    /// Sorted, de-duplicated model ids. An empty list is a valid answer.
    pub async fn list(
        &self,
        provider: TranslationProvider,
        credentials: &ProviderCredentials,
    ) -> Result<Vec<String>, ModelListError> {
        let url = self.listing_url(provider, credentials)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| ModelListError::Network(err.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ModelListError::Unauthorized(provider.to_string()));
        }
        if !status.is_success() {
            let detail = read_error_detail(response).await;
            return Err(ModelListError::Remote {
                status: status.as_u16(),
                detail,
            });
        }

        let listing = response
            .json::<ModelListing>()
            .await
            .map_err(|err| ModelListError::Network(format!("unreadable model list: {err}")))?;

        let models = dedupe_and_sort(listing.models.unwrap_or_default());
        debug!("{} offers {} models", provider, models.len());
        Ok(models)
    }
}

fn dedupe_and_sort(models: Vec<String>) -> Vec<String> {
    let mut unique: Vec<String> = models
        .into_iter()
        .map(|model| model.trim().to_string())
        .filter(|model| !model.is_empty())
        .collect();
    unique.sort();
    unique.dedup();
    unique
}
