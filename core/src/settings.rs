use log::{info, warn};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::backend::read_error_detail;
use crate::error::{ReconcileError, SyncError};

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_CLAUDE_MODEL: &str = "claude-3-5-sonnet-20241022";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "gemma2";

/// Settings as the operator edits them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocalSettings {
    pub steam_workshop_path: String,
    pub documents_path: String,
    pub vanilla_path: String,
    pub openai_api_key: String,
    pub openai_model: String,
    pub claude_api_key: String,
    pub claude_model: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub deepseek_api_key: String,
    pub ollama_url: String,
    pub ollama_model: String,
    pub sync_token: String,
    /// Text field contents; empty means "no project".
    pub sync_project_id: String,
    pub enable_sync: bool,
    pub auto_upload_sync: bool,
    pub glossary: BTreeMap<String, String>,
    pub source_language: String,
    pub target_language: String,
    pub theme_mode: String,
    pub auto_shutdown: bool,
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self {
            steam_workshop_path: String::new(),
            documents_path: String::new(),
            vanilla_path: String::new(),
            openai_api_key: String::new(),
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            claude_api_key: String::new(),
            claude_model: DEFAULT_CLAUDE_MODEL.to_string(),
            gemini_api_key: String::new(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            deepseek_api_key: String::new(),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            ollama_model: DEFAULT_OLLAMA_MODEL.to_string(),
            sync_token: String::new(),
            sync_project_id: String::new(),
            enable_sync: false,
            auto_upload_sync: false,
            glossary: BTreeMap::new(),
            source_language: "en".to_string(),
            target_language: "ko".to_string(),
            theme_mode: "dark".to_string(),
            auto_shutdown: false,
        }
    }
}

impl LocalSettings {
    pub fn has_sync_credentials(&self) -> bool {
        !self.sync_token.trim().is_empty()
    }

    /// Project id from the text field. Empty is `Ok(None)`; text that is not a
    /// project id is an error naming what was typed.
    pub fn sync_project(&self) -> Result<Option<u64>, SyncError> {
        parse_project_id(&self.sync_project_id)
            .map_err(|_| SyncError::InvalidProjectId(self.sync_project_id.clone()))
    }

    /// Last settings seen, kept for offline use. Unreadable caches are ignored.
    pub fn read_cache<P: AsRef<Path>>(path: P) -> Option<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).ok()?;
        match serde_json::from_str(&content) {
            Ok(settings) => Some(settings),
            Err(error) => {
                warn!(
                    "ignoring unreadable settings cache {}: {}",
                    path.to_string_lossy(),
                    error
                );
                None
            }
        }
    }

    pub fn write_cache<P: AsRef<Path>>(&self, path: P) -> Result<(), String> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| format!("settings cache directory error: {err}"))?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|err| format!("Failed to serialize settings: {err}"))?;
        fs::write(path, content).map_err(|err| format!("Failed to write settings cache: {err}"))
    }
}

/// Settings as the backend persists them. Every field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    pub steam_workshop_path: Option<String>,
    pub hoi4_documents_path: Option<String>,
    pub vanilla_path: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_model: Option<String>,
    pub claude_api_key: Option<String>,
    pub claude_model: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_model: Option<String>,
    pub deepseek_api_key: Option<String>,
    pub paratranz_token: Option<String>,
    pub paratranz_project_id: Option<i64>,
    pub enable_paratranz: Option<bool>,
    pub auto_upload_paratranz: Option<bool>,
    /// JSON-encoded `{ term: translation }` map.
    pub glossary: Option<String>,
    pub ollama_url: Option<String>,
    pub ollama_model: Option<String>,
    pub source_language: Option<String>,
    pub target_language: Option<String>,
    pub theme_mode: Option<String>,
    pub auto_shutdown: Option<bool>,
}

/// Remote record → local settings. A missing record yields the defaults.
pub fn to_local(remote: Option<&RemoteSettings>) -> LocalSettings {
    let defaults = LocalSettings::default();
    let Some(remote) = remote else {
        return defaults;
    };

    let text = |value: &Option<String>, fallback: &str| -> String {
        value.clone().unwrap_or_else(|| fallback.to_string())
    };

    let glossary = match remote.glossary.as_deref() {
        None => BTreeMap::new(),
        Some(raw) => parse_glossary(raw).unwrap_or_else(|error| {
            warn!("glossary reset to empty: {}", error);
            BTreeMap::new()
        }),
    };

    let sync_project_id = match remote.paratranz_project_id {
        Some(id) if id > 0 => id.to_string(),
        Some(id) => {
            warn!("ignoring non-positive project id {} from backend", id);
            String::new()
        }
        None => String::new(),
    };

    LocalSettings {
        steam_workshop_path: text(&remote.steam_workshop_path, &defaults.steam_workshop_path),
        documents_path: text(&remote.hoi4_documents_path, &defaults.documents_path),
        vanilla_path: text(&remote.vanilla_path, &defaults.vanilla_path),
        openai_api_key: text(&remote.openai_api_key, &defaults.openai_api_key),
        openai_model: text(&remote.openai_model, &defaults.openai_model),
        claude_api_key: text(&remote.claude_api_key, &defaults.claude_api_key),
        claude_model: text(&remote.claude_model, &defaults.claude_model),
        gemini_api_key: text(&remote.gemini_api_key, &defaults.gemini_api_key),
        gemini_model: text(&remote.gemini_model, &defaults.gemini_model),
        deepseek_api_key: text(&remote.deepseek_api_key, &defaults.deepseek_api_key),
        ollama_url: text(&remote.ollama_url, &defaults.ollama_url),
        ollama_model: text(&remote.ollama_model, &defaults.ollama_model),
        sync_token: text(&remote.paratranz_token, &defaults.sync_token),
        sync_project_id,
        enable_sync: remote.enable_paratranz.unwrap_or(defaults.enable_sync),
        auto_upload_sync: remote
            .auto_upload_paratranz
            .unwrap_or(defaults.auto_upload_sync),
        glossary,
        source_language: text(&remote.source_language, &defaults.source_language),
        target_language: text(&remote.target_language, &defaults.target_language),
        theme_mode: text(&remote.theme_mode, &defaults.theme_mode),
        auto_shutdown: remote.auto_shutdown.unwrap_or(defaults.auto_shutdown),
    }
}

/// Local settings → remote record.
pub fn to_remote(local: &LocalSettings) -> Result<RemoteSettings, ReconcileError> {
    let project_id = parse_project_id(&local.sync_project_id)
        .map_err(|_| ReconcileError::InvalidProjectId(local.sync_project_id.clone()))?;
    let glossary = serde_json::to_string(&local.glossary)?;

    let optional = |value: &str| -> Option<String> {
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    };

    Ok(RemoteSettings {
        steam_workshop_path: optional(&local.steam_workshop_path),
        hoi4_documents_path: optional(&local.documents_path),
        vanilla_path: optional(&local.vanilla_path),
        openai_api_key: optional(&local.openai_api_key),
        openai_model: Some(local.openai_model.clone()),
        claude_api_key: optional(&local.claude_api_key),
        claude_model: Some(local.claude_model.clone()),
        gemini_api_key: optional(&local.gemini_api_key),
        gemini_model: Some(local.gemini_model.clone()),
        deepseek_api_key: optional(&local.deepseek_api_key),
        paratranz_token: optional(&local.sync_token),
        paratranz_project_id: project_id.map(|id| id as i64),
        enable_paratranz: Some(local.enable_sync),
        auto_upload_paratranz: Some(local.auto_upload_sync),
        glossary: Some(glossary),
        ollama_url: Some(local.ollama_url.clone()),
        ollama_model: Some(local.ollama_model.clone()),
        source_language: Some(local.source_language.clone()),
        target_language: Some(local.target_language.clone()),
        theme_mode: Some(local.theme_mode.clone()),
        auto_shutdown: Some(local.auto_shutdown),
    })
}

fn parse_glossary(raw: &str) -> Result<BTreeMap<String, String>, ReconcileError> {
    if raw.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    Ok(serde_json::from_str(raw)?)
}

/// Empty → `None`. Anything else must be a canonical positive integer: plain
/// ASCII digits, no sign, no leading zero, no padding.
fn parse_project_id(raw: &str) -> Result<Option<u64>, ()> {
    if raw.is_empty() {
        return Ok(None);
    }
    if raw.starts_with('0') || !raw.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(());
    }
    match raw.parse::<u64>() {
        Ok(id) if id <= i64::MAX as u64 => Ok(Some(id)),
        _ => Err(()),
    }
}

/// Loads and saves settings through `GET/POST /settings`.
#[derive(Debug, Clone)]
pub struct SettingsReconciler {
    client: Client,
    base_url: String,
}

impl SettingsReconciler {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/settings", self.base_url)
    }

    pub async fn load(&self) -> Result<LocalSettings, ReconcileError> {
        let response = self
            .client
            .get(self.endpoint())
            .send()
            .await
            .map_err(|err| ReconcileError::Network(err.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::NO_CONTENT {
            info!("no stored settings on backend; using defaults");
            return Ok(LocalSettings::default());
        }
        if !status.is_success() {
            let detail = read_error_detail(response).await;
            return Err(ReconcileError::Remote {
                status: status.as_u16(),
                detail,
            });
        }

        let remote = response
            .json::<Option<RemoteSettings>>()
            .await
            .map_err(|err| ReconcileError::Network(err.to_string()))?;

        Ok(to_local(remote.as_ref()))
    }

    /// Persist and return what the backend stored.
    pub async fn save(&self, local: &LocalSettings) -> Result<LocalSettings, ReconcileError> {
        let remote = to_remote(local)?;
        let response = self
            .client
            .post(self.endpoint())
            .json(&remote)
            .send()
            .await
            .map_err(|err| ReconcileError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = read_error_detail(response).await;
            return Err(ReconcileError::Remote {
                status: status.as_u16(),
                detail,
            });
        }

        let echoed = response
            .json::<Option<RemoteSettings>>()
            .await
            .map_err(|err| ReconcileError::Network(err.to_string()))?;

        Ok(match echoed {
            Some(record) => to_local(Some(&record)),
            None => local.clone(),
        })
    }
}
