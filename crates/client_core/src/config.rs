use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;
use tracing::warn;

const SETTINGS_FILE: &str = "client.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub comfort_debounce_ms: u64,
    pub training_poll_interval_ms: u64,
    pub live_price_refresh_secs: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/api".into(),
            request_timeout_secs: 10,
            comfort_debounce_ms: 500,
            training_poll_interval_ms: 2000,
            live_price_refresh_secs: 300,
        }
    }
}

impl ClientSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn comfort_debounce(&self) -> Duration {
        Duration::from_millis(self.comfort_debounce_ms)
    }

    pub fn training_poll_interval(&self) -> Duration {
        Duration::from_millis(self.training_poll_interval_ms)
    }

    pub fn live_price_refresh(&self) -> Duration {
        Duration::from_secs(self.live_price_refresh_secs)
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    api_base_url: Option<String>,
    request_timeout_secs: Option<u64>,
    comfort_debounce_ms: Option<u64>,
    training_poll_interval_ms: Option<u64>,
    live_price_refresh_secs: Option<u64>,
}

pub fn load_settings() -> ClientSettings {
    let mut settings = ClientSettings::default();

    match read_settings_file(Path::new(SETTINGS_FILE)) {
        Ok(Some(file_cfg)) => apply_file_settings(&mut settings, file_cfg),
        Ok(None) => {}
        Err(error) => warn!(%error, file = SETTINGS_FILE, "ignoring unreadable client settings"),
    }

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    settings
}

fn read_settings_file(path: &Path) -> anyhow::Result<Option<FileSettings>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    let parsed = toml::from_str::<FileSettings>(&raw)
        .with_context(|| format!("failed to parse '{}'", path.display()))?;
    Ok(Some(parsed))
}

fn apply_file_settings(settings: &mut ClientSettings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.api_base_url {
        settings.api_base_url = v;
    }
    set_nonzero(&mut settings.request_timeout_secs, file_cfg.request_timeout_secs);
    set_nonzero(&mut settings.comfort_debounce_ms, file_cfg.comfort_debounce_ms);
    set_nonzero(
        &mut settings.training_poll_interval_ms,
        file_cfg.training_poll_interval_ms,
    );
    set_nonzero(
        &mut settings.live_price_refresh_secs,
        file_cfg.live_price_refresh_secs,
    );
}

fn apply_env_overrides(settings: &mut ClientSettings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("ENERGY_API_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = var("APP__API_BASE_URL") {
        settings.api_base_url = v;
    }

    set_nonzero(
        &mut settings.request_timeout_secs,
        parse_u64(var("APP__REQUEST_TIMEOUT_SECS")),
    );
    set_nonzero(
        &mut settings.comfort_debounce_ms,
        parse_u64(var("APP__COMFORT_DEBOUNCE_MS")),
    );
    set_nonzero(
        &mut settings.training_poll_interval_ms,
        parse_u64(var("APP__TRAINING_POLL_INTERVAL_MS")),
    );
    set_nonzero(
        &mut settings.live_price_refresh_secs,
        parse_u64(var("APP__LIVE_PRICE_REFRESH_SECS")),
    );
}

fn parse_u64(raw: Option<String>) -> Option<u64> {
    raw.and_then(|v| v.trim().parse::<u64>().ok())
}

fn set_nonzero(slot: &mut u64, value: Option<u64>) {
    if let Some(v) = value.filter(|v| *v > 0) {
        *slot = v;
    }
}
