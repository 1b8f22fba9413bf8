use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "TCM Twin";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default extraction/diagnosis model.
pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";

/// Default Gemini REST endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Uploads larger than this are rejected before reaching the model.
pub const MAX_DOCUMENT_BYTES: u64 = 15 * 1024 * 1024; // 15MB

/// Default request timeout for one model call.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "tcm_twin=info,warn"
}

/// Get the application data directory (~/TcmTwin/)
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("TcmTwin")
}

/// Per-round ceilings that keep a single model response from being truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_diseases: usize,
    pub max_mappings: usize,
    pub max_thoughts: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_diseases: 15,
            max_mappings: 10,
            max_thoughts: 10,
        }
    }
}

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct TwinConfig {
    pub model: String,
    pub api_base_url: String,
    pub api_key: String,
    pub request_timeout_secs: u64,
    pub batch_limits: BatchLimits,
    pub max_document_bytes: u64,
    pub data_dir: PathBuf,
}

impl Default for TwinConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_key: String::new(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            batch_limits: BatchLimits::default(),
            max_document_bytes: MAX_DOCUMENT_BYTES,
            data_dir: app_data_dir(),
        }
    }
}

impl TwinConfig {
    /// Build from environment variables:
    /// `GEMINI_API_KEY` (required), `TCM_TWIN_MODEL`, `TCM_TWIN_API_BASE`,
    /// `TCM_TWIN_DATA_DIR`, `TCM_TWIN_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        config.api_key = lookup("GEMINI_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        if let Some(model) = lookup("TCM_TWIN_MODEL").filter(|m| !m.trim().is_empty()) {
            config.model = model;
        }
        if let Some(base) = lookup("TCM_TWIN_API_BASE").filter(|b| !b.trim().is_empty()) {
            config.api_base_url = base;
        }
        if let Some(dir) = lookup("TCM_TWIN_DATA_DIR").filter(|d| !d.trim().is_empty()) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("TCM_TWIN_TIMEOUT_SECS") {
            config.request_timeout_secs = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue {
                    key: "TCM_TWIN_TIMEOUT_SECS",
                    value: raw.clone(),
                })?;
        }

        Ok(config)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("GEMINI_API_KEY is not set")]
    MissingApiKey,

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_batch_limits() {
        let limits = BatchLimits::default();
        assert_eq!(limits.max_diseases, 15);
        assert_eq!(limits.max_mappings, 10);
        assert_eq!(limits.max_thoughts, 10);
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let result = TwinConfig::from_lookup(lookup_from(&[]));
        assert_eq!(result.unwrap_err(), ConfigError::MissingApiKey);
    }

    #[test]
    fn env_overrides_defaults() {
        let config = TwinConfig::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "secret"),
            ("TCM_TWIN_MODEL", "gemini-2.5-pro"),
            ("TCM_TWIN_DATA_DIR", "/tmp/twin"),
            ("TCM_TWIN_TIMEOUT_SECS", "45"),
        ]))
        .unwrap();
        assert_eq!(config.api_key, "secret");
        assert_eq!(config.model, "gemini-2.5-pro");
        assert_eq!(config.data_dir, PathBuf::from("/tmp/twin"));
        assert_eq!(config.request_timeout_secs, 45);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
    }

    #[test]
    fn invalid_timeout_is_rejected() {
        let result = TwinConfig::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "secret"),
            ("TCM_TWIN_TIMEOUT_SECS", "soon"),
        ]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn document_ceiling_is_fifteen_megabytes() {
        assert_eq!(MAX_DOCUMENT_BYTES, 15_728_640);
        assert_eq!(TwinConfig::default().max_document_bytes, MAX_DOCUMENT_BYTES);
    }

    #[test]
    fn app_data_dir_ends_with_app_folder() {
        assert!(app_data_dir().ends_with("TcmTwin"));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }
}
