use std::{fs, path::Path};

use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_API_BASE: &str = "http://localhost:8000";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 60_000;
pub const MIN_REQUEST_TIMEOUT_MS: u64 = 250;
pub const DEFAULT_TOP_K: i64 = 4;
pub const TOP_K_MIN: i64 = 1;
pub const TOP_K_MAX: i64 = 10;

const SETTINGS_FILE: &str = "copilot.toml";

/// What to do with a Top-K control value outside `TOP_K_MIN..=TOP_K_MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TopKPolicy {
    #[default]
    Clamp,
    Reject,
    PassThrough,
}

impl TopKPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "clamp" => Some(Self::Clamp),
            "reject" => Some(Self::Reject),
            "pass_through" | "passthrough" | "pass-through" => Some(Self::PassThrough),
            _ => None,
        }
    }

    /// Returns the value to transmit, or `None` when the value must not be sent.
    pub fn apply(self, top_k: i64) -> Option<i64> {
        match self {
            Self::Clamp => Some(top_k.clamp(TOP_K_MIN, TOP_K_MAX)),
            Self::Reject => (TOP_K_MIN..=TOP_K_MAX).contains(&top_k).then_some(top_k),
            Self::PassThrough => Some(top_k),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub api_base: String,
    pub request_timeout_ms: u64,
    /// Whether a failed ingestion still clears the pending selection/input.
    pub clear_on_failure: bool,
    pub top_k_policy: TopKPolicy,
    pub default_top_k: i64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.into(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            clear_on_failure: true,
            top_k_policy: TopKPolicy::Clamp,
            default_top_k: DEFAULT_TOP_K,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    api_base: Option<String>,
    request_timeout_ms: Option<u64>,
    clear_on_failure: Option<bool>,
    top_k_policy: Option<String>,
    default_top_k: Option<i64>,
}

/// Defaults, then `copilot.toml` in the working directory, then environment.
pub fn load_settings() -> ClientSettings {
    load_settings_from(Path::new(SETTINGS_FILE))
}

pub fn load_settings_from(path: &Path) -> ClientSettings {
    let mut settings = ClientSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        settings.apply_file(&raw);
    }
    settings.apply_env(|key| std::env::var(key).ok());

    settings
}

impl ClientSettings {
    fn apply_file(&mut self, raw: &str) {
        let file_cfg = match toml::from_str::<FileSettings>(raw) {
            Ok(cfg) => cfg,
            Err(error) => {
                warn!(%error, "ignoring unreadable settings file");
                return;
            }
        };

        if let Some(v) = file_cfg.api_base {
            self.api_base = v;
        }
        if let Some(v) = file_cfg.request_timeout_ms {
            self.request_timeout_ms = v;
        }
        if let Some(v) = file_cfg.clear_on_failure {
            self.clear_on_failure = v;
        }
        if let Some(v) = file_cfg.top_k_policy {
            self.set_top_k_policy(&v);
        }
        if let Some(v) = file_cfg.default_top_k {
            self.default_top_k = v;
        }
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("COPILOT_API_BASE") {
            self.api_base = v;
        }
        if let Some(v) = lookup("APP__API_BASE") {
            self.api_base = v;
        }

        if let Some(v) = lookup("APP__REQUEST_TIMEOUT_MS") {
            match v.trim().parse::<u64>() {
                Ok(parsed) => self.request_timeout_ms = parsed,
                Err(_) => warn!(value = %v, "ignoring invalid APP__REQUEST_TIMEOUT_MS"),
            }
        }

        if let Some(v) = lookup("APP__CLEAR_ON_FAILURE") {
            match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.clear_on_failure = true,
                "0" | "false" | "no" => self.clear_on_failure = false,
                _ => warn!(value = %v, "ignoring invalid APP__CLEAR_ON_FAILURE"),
            }
        }

        if let Some(v) = lookup("APP__TOP_K_POLICY") {
            self.set_top_k_policy(&v);
        }

        if let Some(v) = lookup("APP__DEFAULT_TOP_K") {
            match v.trim().parse::<i64>() {
                Ok(parsed) => self.default_top_k = parsed,
                Err(_) => warn!(value = %v, "ignoring invalid APP__DEFAULT_TOP_K"),
            }
        }
    }

    fn set_top_k_policy(&mut self, raw: &str) {
        match TopKPolicy::parse(raw) {
            Some(policy) => self.top_k_policy = policy,
            None => warn!(value = %raw, "ignoring unknown top_k_policy"),
        }
    }
}
