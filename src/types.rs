use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateResponse {
    pub response: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// 日志文件中的一行：`endpoint` + `timestamp` + `prompt`/`response` 之一
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub endpoint: String,
    pub timestamp: i64,
    #[serde(flatten)]
    pub entry: LogEntry,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogEntry {
    Prompt(String),
    Response(String),
}

impl LogRecord {
    pub fn prompt(endpoint: &str, prompt: &str) -> Self {
        Self::now(endpoint, LogEntry::Prompt(prompt.to_string()))
    }

    pub fn response(endpoint: &str, response: &str) -> Self {
        Self::now(endpoint, LogEntry::Response(response.to_string()))
    }

    fn now(endpoint: &str, entry: LogEntry) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            timestamp: unix_now(),
            entry,
        }
    }
}

pub fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn prompt_record_has_flat_fields() {
        let record = LogRecord::prompt("/generate", "hello");
        let value: Value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["endpoint"], "/generate");
        assert_eq!(value["prompt"], "hello");
        assert!(value.get("response").is_none());
        assert!(value["timestamp"].as_i64().unwrap() > 1_600_000_000);
    }

    #[test]
    fn response_record_uses_response_key() {
        let record = LogRecord::response("/generate", "hi there");
        let value: Value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["response"], "hi there");
        assert!(value.get("prompt").is_none());
        assert_eq!(value.as_object().unwrap().len(), 3);
    }

    #[test]
    fn generate_request_requires_prompt() {
        assert!(serde_json::from_str::<GenerateRequest>("{}").is_err());
        assert!(serde_json::from_str::<GenerateRequest>(r#"{"prompt":"x"}"#).is_ok());
    }
}
