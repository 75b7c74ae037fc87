//! Configuration loading and defaults for prompt-studio.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::form::AdvancedOptions;
use crate::messages::Locale;
use crate::models::AspectRatio;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 180;
pub const DEFAULT_INITIAL_SLOTS: usize = 1;
pub const MAX_INITIAL_SLOTS: usize = 16;

// === Types ===

/// Resolved client configuration, including defaults and environment overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    pub base_url: Option<String>,
    pub csrf_token: Option<String>,
    pub scrape_csrf: Option<bool>,
    pub locale: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub initial_slots: Option<usize>,
    pub download_dir: Option<String>,
    pub aspect_ratio: Option<String>,
    pub guidance_scale: Option<f64>,
    pub inference_steps: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct ConfigFile {
    #[serde(flatten)]
    base: Config,
    profiles: Option<HashMap<String, Config>>,
}

// === Config Loading ===

impl Config {
    /// Load configuration from disk and merge with environment overrides.
    pub fn load(path: Option<PathBuf>, profile: Option<&str>) -> Result<Self> {
        let path = path.map(|path| expand_pathbuf(&path)).or_else(default_config_path);
        let mut config = match path.as_ref() {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                let parsed: ConfigFile = toml::from_str(&contents)
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
                apply_profile(parsed, profile)?
            }
            _ => {
                if let Some(profile) = profile {
                    anyhow::bail!("Profile '{profile}' requested but no config file was found");
                }
                Config::default()
            }
        };

        apply_env_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Validate that configured values are usable.
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = self.base_url.as_deref() {
            let parsed = reqwest::Url::parse(url.trim())
                .with_context(|| format!("Invalid base_url '{url}'"))?;
            if !matches!(parsed.scheme(), "http" | "https") || !parsed.has_host() {
                anyhow::bail!("Invalid base_url '{url}': expected an http:// or https:// URL.");
            }
        }
        if let Some(locale) = self.locale.as_deref() {
            locale.parse::<Locale>().map_err(anyhow::Error::msg)?;
        }
        if let Some(ratio) = self.aspect_ratio.as_deref() {
            ratio.parse::<AspectRatio>().map_err(anyhow::Error::msg)?;
        }
        if let Some(scale) = self.guidance_scale
            && !(1.0..=20.0).contains(&scale)
        {
            anyhow::bail!("Invalid guidance_scale {scale}: expected a value between 1 and 20.");
        }
        if let Some(steps) = self.inference_steps
            && !(1..=100).contains(&steps)
        {
            anyhow::bail!("Invalid inference_steps {steps}: expected a value between 1 and 100.");
        }
        if let Some(slots) = self.initial_slots
            && slots > MAX_INITIAL_SLOTS
        {
            anyhow::bail!("Invalid initial_slots {slots}: at most {MAX_INITIAL_SLOTS} allowed.");
        }
        if self.request_timeout_secs == Some(0) {
            anyhow::bail!("request_timeout_secs must be greater than zero");
        }
        Ok(())
    }

    /// Return the studio base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> String {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string()
    }

    /// Explicitly configured CSRF token, if any.
    #[must_use]
    pub fn csrf_token(&self) -> Option<String> {
        self.csrf_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(ToString::to_string)
    }

    #[must_use]
    pub fn scrape_csrf(&self) -> bool {
        self.scrape_csrf.unwrap_or(true)
    }

    #[must_use]
    pub fn locale(&self) -> Locale {
        self.locale
            .as_deref()
            .and_then(|locale| locale.parse().ok())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    #[must_use]
    pub fn initial_slots(&self) -> usize {
        self.initial_slots
            .unwrap_or(DEFAULT_INITIAL_SLOTS)
            .min(MAX_INITIAL_SLOTS)
    }

    /// Where generated images are saved.
    #[must_use]
    pub fn download_dir(&self) -> PathBuf {
        self.download_dir
            .as_deref()
            .map(expand_path)
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    #[must_use]
    pub fn aspect_ratio(&self) -> AspectRatio {
        self.aspect_ratio
            .as_deref()
            .and_then(|ratio| ratio.parse().ok())
            .unwrap_or_default()
    }

    /// Advanced option controls seeded with the configured defaults.
    #[must_use]
    pub fn advanced_options(&self) -> AdvancedOptions {
        let defaults = AdvancedOptions::default();
        AdvancedOptions::with_defaults(
            self.guidance_scale.unwrap_or(defaults.guidance_scale()),
            self.inference_steps.unwrap_or(defaults.inference_steps()),
        )
    }
}

// === Defaults ===

fn default_config_path() -> Option<PathBuf> {
    env_config_path().or_else(home_config_path)
}

fn home_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".prompt-studio").join("config.toml"))
}

fn env_config_path() -> Option<PathBuf> {
    let path = std::env::var("PROMPT_STUDIO_CONFIG_PATH").ok()?;
    let trimmed = path.trim();
    (!trimmed.is_empty()).then(|| expand_path(trimmed))
}

fn expand_pathbuf(path: &std::path::Path) -> PathBuf {
    match path.to_str() {
        Some(raw) => expand_path(raw),
        None => path.to_path_buf(),
    }
}

fn expand_path(path: &str) -> PathBuf {
    let expanded = shellexpand::tilde(path);
    PathBuf::from(expanded.as_ref())
}

// === Environment Overrides ===

fn apply_env_overrides(config: &mut Config) {
    if let Ok(value) = std::env::var("PROMPT_STUDIO_BASE_URL") {
        config.base_url = Some(value);
    }
    if let Ok(value) = std::env::var("PROMPT_STUDIO_CSRF_TOKEN") {
        config.csrf_token = Some(value);
    }
    if let Ok(value) = std::env::var("PROMPT_STUDIO_LOCALE") {
        config.locale = Some(value);
    }
    if let Ok(value) = std::env::var("PROMPT_STUDIO_DOWNLOAD_DIR") {
        config.download_dir = Some(value);
    }
}

fn apply_profile(config: ConfigFile, profile: Option<&str>) -> Result<Config> {
    let Some(profile_name) = profile else {
        return Ok(config.base);
    };
    let profiles = config.profiles.as_ref();
    match profiles.and_then(|profiles| profiles.get(profile_name)) {
        Some(override_cfg) => Ok(merge_config(config.base, override_cfg.clone())),
        None => {
            let available = profiles
                .map(|profiles| {
                    let mut keys = profiles.keys().cloned().collect::<Vec<_>>();
                    keys.sort();
                    if keys.is_empty() {
                        "none".to_string()
                    } else {
                        keys.join(", ")
                    }
                })
                .unwrap_or_else(|| "none".to_string());
            anyhow::bail!("Profile '{profile_name}' not found. Available profiles: {available}")
        }
    }
}

fn merge_config(base: Config, override_cfg: Config) -> Config {
    Config {
        base_url: override_cfg.base_url.or(base.base_url),
        csrf_token: override_cfg.csrf_token.or(base.csrf_token),
        scrape_csrf: override_cfg.scrape_csrf.or(base.scrape_csrf),
        locale: override_cfg.locale.or(base.locale),
        request_timeout_secs: override_cfg
            .request_timeout_secs
            .or(base.request_timeout_secs),
        initial_slots: override_cfg.initial_slots.or(base.initial_slots),
        download_dir: override_cfg.download_dir.or(base.download_dir),
        aspect_ratio: override_cfg.aspect_ratio.or(base.aspect_ratio),
        guidance_scale: override_cfg.guidance_scale.or(base.guidance_scale),
        inference_steps: override_cfg.inference_steps.or(base.inference_steps),
    }
}
