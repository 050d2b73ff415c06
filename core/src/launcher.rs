use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::backend::JobBackend;
use crate::error::LaunchError;
use crate::poller::{EventSink, JobHandle, JobPoller, PollerHandle, PollerOptions};
use crate::settings::LocalSettings;
use crate::wake_lock::ResourceLockManager;

/// Machine translation service the backend should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationProvider {
    #[default]
    Google,
    Openai,
    Claude,
    Gemini,
    Deepseek,
    Ollama,
}

impl TranslationProvider {
    pub fn requires_api_key(self) -> bool {
        matches!(
            self,
            TranslationProvider::Openai
                | TranslationProvider::Claude
                | TranslationProvider::Gemini
                | TranslationProvider::Deepseek
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TranslationProvider::Google => "google",
            TranslationProvider::Openai => "openai",
            TranslationProvider::Claude => "claude",
            TranslationProvider::Gemini => "gemini",
            TranslationProvider::Deepseek => "deepseek",
            TranslationProvider::Ollama => "ollama",
        }
    }
}

impl fmt::Display for TranslationProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TranslationProvider {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "google" => Ok(TranslationProvider::Google),
            "openai" | "gpt" => Ok(TranslationProvider::Openai),
            "claude" => Ok(TranslationProvider::Claude),
            "gemini" => Ok(TranslationProvider::Gemini),
            "deepseek" => Ok(TranslationProvider::Deepseek),
            "ollama" => Ok(TranslationProvider::Ollama),
            other => Err(format!("unsupported provider: {other}")),
        }
    }
}

/// Per-provider credentials and models forwarded to the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCredentials {
    pub openai_key: String,
    pub openai_model: String,
    pub claude_key: String,
    pub claude_model: String,
    pub gemini_key: String,
    pub gemini_model: String,
    pub deepseek_key: String,
    pub ollama_url: String,
    pub ollama_model: String,
}

impl ProviderCredentials {
    pub fn from_settings(settings: &LocalSettings) -> Self {
        Self {
            openai_key: settings.openai_api_key.clone(),
            openai_model: settings.openai_model.clone(),
            claude_key: settings.claude_api_key.clone(),
            claude_model: settings.claude_model.clone(),
            gemini_key: settings.gemini_api_key.clone(),
            gemini_model: settings.gemini_model.clone(),
            deepseek_key: settings.deepseek_api_key.clone(),
            ollama_url: settings.ollama_url.clone(),
            ollama_model: settings.ollama_model.clone(),
        }
    }

    pub fn key_for(&self, provider: TranslationProvider) -> Option<&str> {
        let key = match provider {
            TranslationProvider::Openai => &self.openai_key,
            TranslationProvider::Claude => &self.claude_key,
            TranslationProvider::Gemini => &self.gemini_key,
            TranslationProvider::Deepseek => &self.deepseek_key,
            TranslationProvider::Google | TranslationProvider::Ollama => return None,
        };
        Some(key.as_str())
    }
}

/// The mod a job translates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModTarget {
    pub path: String,
    pub name: String,
    pub id: Option<String>,
}

/// Body of `POST /jobs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub mod_path: String,
    pub mod_name: String,
    pub mod_id: String,
    pub output_path: String,
    pub service: TranslationProvider,
    pub target_lang: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vanilla_path: Option<String>,
    pub settings: ProviderCredentials,
    pub glossary: BTreeMap<String, String>,
    pub auto_shutdown: bool,
}

impl JobRequest {
    /// Assemble a request from the operator's settings.
    pub fn from_settings(
        settings: &LocalSettings,
        target: &ModTarget,
        provider: TranslationProvider,
    ) -> Self {
        Self {
            mod_path: target.path.clone(),
            mod_name: target.name.clone(),
            mod_id: target.id.clone().unwrap_or_else(|| "local".to_string()),
            output_path: settings.documents_path.clone(),
            service: provider,
            target_lang: settings.target_language.clone(),
            vanilla_path: Some(settings.vanilla_path.clone()).filter(|path| !path.is_empty()),
            settings: ProviderCredentials::from_settings(settings),
            glossary: settings.glossary.clone(),
            auto_shutdown: settings.auto_shutdown,
        }
    }

    /// Checks that need no round trip to the backend.
    pub fn validate(&self) -> Result<(), LaunchError> {
        if self.mod_path.trim().is_empty() {
            return Err(LaunchError::InvalidRequest(
                "a source mod path is required".into(),
            ));
        }
        if self.output_path.trim().is_empty() {
            return Err(LaunchError::InvalidRequest(
                "a destination path is required; set the documents path in settings".into(),
            ));
        }
        if self.target_lang.trim().is_empty() {
            return Err(LaunchError::InvalidRequest(
                "a target language is required".into(),
            ));
        }
        if let Some(key) = self.settings.key_for(self.service) {
            if key.trim().is_empty() {
                return Err(LaunchError::InvalidRequest(format!(
                    "an API key for {} is required",
                    self.service
                )));
            }
        }
        Ok(())
    }
}

/// Starts remote jobs and hands each one to its own poller.
///
/// Callers must not launch a second job while one is still active: the wake
/// lock is process-wide and this type does not serialize launches.
#[derive(Clone)]
pub struct JobLauncher {
    backend: Arc<dyn JobBackend>,
    locks: ResourceLockManager,
    sink: Arc<dyn EventSink>,
    options: PollerOptions,
}

impl JobLauncher {
    pub fn new(
        backend: Arc<dyn JobBackend>,
        locks: ResourceLockManager,
        sink: Arc<dyn EventSink>,
        options: PollerOptions,
    ) -> Self {
        Self {
            backend,
            locks,
            sink,
            options,
        }
    }

    pub async fn launch(&self, request: &JobRequest) -> Result<PollerHandle, LaunchError> {
        request.validate()?;

        let task_id = self.backend.submit(request).await?;
        let handle = JobHandle::new(task_id);
        info!(
            "job {} started for {} ({} -> {})",
            handle.id, request.mod_name, request.service, request.target_lang
        );

        let lock = self.locks.acquire();
        if lock.is_none() {
            warn!("could not keep the host awake for job {}", handle.id);
        }

        let poller = JobPoller::new(
            handle,
            Arc::clone(&self.backend),
            Arc::clone(&self.sink),
            self.options,
        )
        .with_lock(lock);

        Ok(poller.spawn())
    }
}
