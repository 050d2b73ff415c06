use serde::{Deserialize, Deserializer, Serialize};

/// Lifecycle status of a remote job as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }

    fn from_raw(value: Option<&str>) -> Self {
        match value.map(|raw| raw.trim().to_ascii_lowercase()).as_deref() {
            Some("pending" | "running" | "started") => JobStatus::Running,
            Some("completed" | "complete" | "done") => JobStatus::Completed,
            Some("error" | "failed") => JobStatus::Error,
            _ => JobStatus::Idle,
        }
    }
}

/// Status payload exactly as the backend sends it. Any field may be missing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawStatus {
    pub status: Option<String>,
    #[serde(deserialize_with = "lenient_number")]
    pub percent: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub processed_files: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub total_files: Option<f64>,
    pub current_file: Option<String>,
    #[serde(deserialize_with = "lenient_number")]
    pub current_entry: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub total_entries: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub entries_translated: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub avg_speed: Option<f64>,
    #[serde(alias = "path")]
    pub result_path: Option<String>,
    #[serde(alias = "zip_name")]
    pub result_archive_name: Option<String>,
    pub error: Option<String>,
}

/// Fully-populated progress record for one poll tick.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub status: JobStatus,
    pub percent: u8,
    pub processed_files: u32,
    pub total_files: u32,
    pub current_file: String,
    pub current_entry: u32,
    pub total_entries: u32,
    pub entries_translated: u32,
    pub avg_speed: f64,
    pub result_path: Option<String>,
    pub result_archive_name: Option<String>,
    pub error_message: Option<String>,
}

impl ProgressSnapshot {
    /// Shorthand used by tests and fakes.
    pub fn with_files(status: JobStatus, processed_files: u32, total_files: u32) -> Self {
        Self {
            status,
            processed_files,
            total_files,
            ..Self::default()
        }
    }
}

/// Turn a raw payload into a snapshot, defaulting every missing field.
pub fn normalize(raw: RawStatus) -> ProgressSnapshot {
    ProgressSnapshot {
        status: JobStatus::from_raw(raw.status.as_deref()),
        percent: to_count(raw.percent).min(100) as u8,
        processed_files: to_count(raw.processed_files),
        total_files: to_count(raw.total_files),
        current_file: raw.current_file.unwrap_or_default(),
        current_entry: to_count(raw.current_entry),
        total_entries: to_count(raw.total_entries),
        entries_translated: to_count(raw.entries_translated),
        avg_speed: raw
            .avg_speed
            .filter(|speed| speed.is_finite() && *speed > 0.0)
            .unwrap_or(0.0),
        result_path: non_blank(raw.result_path),
        result_archive_name: non_blank(raw.result_archive_name),
        error_message: non_blank(raw.error),
    }
}

/// Parse a JSON body straight into a snapshot. A body that is not a JSON
/// object at all is a transport-level problem, not a partial payload.
pub fn normalize_json(body: &[u8]) -> Result<ProgressSnapshot, serde_json::Error> {
    let raw: RawStatus = serde_json::from_slice(body)?;
    Ok(normalize(raw))
}

fn to_count(value: Option<f64>) -> u32 {
    match value {
        Some(number) if number.is_finite() && number > 0.0 => {
            number.round().min(u32::MAX as f64) as u32
        }
        _ => 0,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(number)) => number.as_f64(),
        Some(serde_json::Value::String(text)) => text.trim().parse::<f64>().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_payload_defaults_everything() {
        let snapshot = normalize_json(b"{}").unwrap();
        assert_eq!(snapshot, ProgressSnapshot::default());
        assert_eq!(snapshot.status, JobStatus::Idle);
    }

    #[test]
    fn partial_payload_keeps_known_fields() {
        let body = br#"{"status":"running","processed_files":2,"total_files":5,"current_file":"events/l_english.yml"}"#;
        let snapshot = normalize_json(body).unwrap();
        assert_eq!(snapshot.status, JobStatus::Running);
        assert_eq!(snapshot.processed_files, 2);
        assert_eq!(snapshot.total_files, 5);
        assert_eq!(snapshot.current_file, "events/l_english.yml");
        assert_eq!(snapshot.percent, 0);
        assert_eq!(snapshot.result_path, None);
    }

    #[test]
    fn backend_aliases_for_result_fields() {
        let body = br#"{"status":"completed","path":"C:/out/mod_ko","zip_name":"mod_ko"}"#;
        let snapshot = normalize_json(body).unwrap();
        assert_eq!(snapshot.status, JobStatus::Completed);
        assert_eq!(snapshot.result_path.as_deref(), Some("C:/out/mod_ko"));
        assert_eq!(snapshot.result_archive_name.as_deref(), Some("mod_ko"));
    }

    #[test]
    fn odd_numbers_are_clamped() {
        let body = br#"{"percent":140.6,"processed_files":-3,"avg_speed":"2.5","total_entries":null}"#;
        let snapshot = normalize_json(body).unwrap();
        assert_eq!(snapshot.percent, 100);
        assert_eq!(snapshot.processed_files, 0);
        assert_eq!(snapshot.avg_speed, 2.5);
        assert_eq!(snapshot.total_entries, 0);
    }

    #[test]
    fn status_strings_map_onto_lifecycle() {
        assert_eq!(JobStatus::from_raw(Some("pending")), JobStatus::Running);
        assert_eq!(JobStatus::from_raw(Some("Completed")), JobStatus::Completed);
        assert_eq!(JobStatus::from_raw(Some("failed")), JobStatus::Error);
        assert_eq!(JobStatus::from_raw(Some("paused")), JobStatus::Idle);
        assert_eq!(JobStatus::from_raw(None), JobStatus::Idle);
    }

    #[test]
    fn blank_error_detail_is_dropped() {
        let snapshot = normalize_json(br#"{"status":"error","error":"  "}"#).unwrap();
        assert_eq!(snapshot.status, JobStatus::Error);
        assert_eq!(snapshot.error_message, None);
    }
}
