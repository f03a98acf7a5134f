// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use chatdesk_api::{ClientOptions, DEFAULT_CANDIDATES_PATH, DEFAULT_REPORT_STATS_PATH, RetryPolicy};
use chatdesk_app::TabKind;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APP_NAME: &str = "chatdesk";
const CONFIG_VERSION: i64 = 1;
const DEFAULT_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_LOG_LEVEL: &str = "info";
/// Upper bound for every configured duration.
const MAX_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub api: Api,
    #[serde(default)]
    pub retry: Retry,
    #[serde(default)]
    pub ui: Ui,
    #[serde(default)]
    pub log: Log,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            api: Api::default(),
            retry: Retry::default(),
            ui: Ui::default(),
            log: Log::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Api {
    pub base_url: Option<String>,
    pub timeout: Option<String>,
    pub upload_timeout: Option<String>,
    pub report_stats_path: Option<String>,
    pub candidates_path: Option<String>,
}

impl Default for Api {
    fn default() -> Self {
        Self {
            base_url: Some(DEFAULT_BASE_URL.to_owned()),
            timeout: Some("30s".to_owned()),
            upload_timeout: Some("60s".to_owned()),
            report_stats_path: Some(DEFAULT_REPORT_STATS_PATH.to_owned()),
            candidates_path: Some(DEFAULT_CANDIDATES_PATH.to_owned()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Retry {
    pub max_retries: Option<u32>,
    pub base_delay: Option<String>,
    pub max_delay: Option<String>,
    pub jitter: Option<f64>,
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            max_retries: Some(3),
            base_delay: Some("1s".to_owned()),
            max_delay: Some("10s".to_owned()),
            jitter: Some(0.1),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ui {
    pub poll_interval: Option<String>,
    pub default_tab: Option<String>,
    /// How often the backend host is probed. `"0s"` disables probing.
    pub connectivity_probe: Option<String>,
}

impl Default for Ui {
    fn default() -> Self {
        Self {
            poll_interval: Some("2s".to_owned()),
            default_tab: Some("upload".to_owned()),
            connectivity_probe: Some("5s".to_owned()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Log {
    pub level: Option<String>,
    pub file: Option<String>,
}

impl Default for Log {
    fn default() -> Self {
        Self {
            level: Some(DEFAULT_LOG_LEVEL.to_owned()),
            file: None,
        }
    }
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("CHATDESK_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set CHATDESK_CONFIG_PATH to the config file")
        })?;
        Ok(config_root.join(APP_NAME).join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} has no version; add `version = 1` and place values under [api], [retry], [ui], and [log]",
                    path.display()
                )
            })?;
        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if let Some(base_url) = &self.api.base_url {
            let trimmed = base_url.trim();
            if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
                bail!(
                    "api.base_url in {} must start with http:// or https://, got {:?}",
                    path.display(),
                    base_url
                );
            }
        }

        for (key, value, allow_zero) in [
            ("api.timeout", &self.api.timeout, false),
            ("api.upload_timeout", &self.api.upload_timeout, false),
            ("retry.base_delay", &self.retry.base_delay, false),
            ("retry.max_delay", &self.retry.max_delay, false),
            ("ui.poll_interval", &self.ui.poll_interval, false),
            ("ui.connectivity_probe", &self.ui.connectivity_probe, true),
        ] {
            if let Some(raw) = value {
                let parsed = parse_duration(raw)
                    .with_context(|| format!("{key} in {}", path.display()))?;
                if parsed.is_zero() && !allow_zero {
                    bail!("{key} in {} must be positive, got {raw}", path.display());
                }
                if parsed > MAX_DURATION {
                    bail!("{key} in {} must be at most 24h, got {raw}", path.display());
                }
            }
        }

        if let Some(jitter) = self.retry.jitter
            && !(0.0..=1.0).contains(&jitter)
        {
            bail!(
                "retry.jitter in {} must be between 0 and 1, got {}",
                path.display(),
                jitter
            );
        }
        if self.retry_base_delay()? > self.retry_max_delay()? {
            bail!(
                "retry.base_delay in {} must not exceed retry.max_delay",
                path.display()
            );
        }

        if let Some(tab) = &self.ui.default_tab
            && TabKind::parse(tab).is_none()
        {
            bail!(
                "ui.default_tab in {} must be one of upload, escalation, reports, all_chats; got {:?}",
                path.display(),
                tab
            );
        }

        for (key, value) in [
            ("api.report_stats_path", &self.api.report_stats_path),
            ("api.candidates_path", &self.api.candidates_path),
        ] {
            if let Some(endpoint) = value
                && !endpoint.starts_with('/')
            {
                bail!(
                    "{key} in {} must start with '/', got {:?}",
                    path.display(),
                    endpoint
                );
            }
        }
        Ok(())
    }

    /// `CHATDESK_BASE_URL` wins over `api.base_url`.
    pub fn base_url(&self) -> String {
        if let Ok(value) = env::var("CHATDESK_BASE_URL")
            && !value.trim().is_empty()
        {
            return value.trim().trim_end_matches('/').to_owned();
        }
        self.api
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim()
            .trim_end_matches('/')
            .to_owned()
    }

    pub fn client_options(&self) -> Result<ClientOptions> {
        let defaults = ClientOptions::default();
        Ok(ClientOptions {
            timeout: parse_duration(self.api.timeout.as_deref().unwrap_or("30s"))?,
            upload_timeout: parse_duration(self.api.upload_timeout.as_deref().unwrap_or("60s"))?,
            retry: RetryPolicy {
                max_retries: self.retry.max_retries.unwrap_or(3),
                base_delay: self.retry_base_delay()?,
                max_delay: self.retry_max_delay()?,
                jitter: self.retry.jitter.unwrap_or(0.1),
                ..RetryPolicy::default()
            },
            candidates_path: self
                .api
                .candidates_path
                .clone()
                .unwrap_or(defaults.candidates_path.clone()),
            report_stats_path: self
                .api
                .report_stats_path
                .clone()
                .unwrap_or(defaults.report_stats_path.clone()),
            ..defaults
        })
    }

    fn retry_base_delay(&self) -> Result<Duration> {
        parse_duration(self.retry.base_delay.as_deref().unwrap_or("1s"))
    }

    fn retry_max_delay(&self) -> Result<Duration> {
        parse_duration(self.retry.max_delay.as_deref().unwrap_or("10s"))
    }

    pub fn poll_interval(&self) -> Result<Duration> {
        parse_duration(self.ui.poll_interval.as_deref().unwrap_or("2s"))
    }

    /// `None` when probing is disabled.
    pub fn connectivity_probe(&self) -> Result<Option<Duration>> {
        let interval = parse_duration(self.ui.connectivity_probe.as_deref().unwrap_or("5s"))?;
        Ok((!interval.is_zero()).then_some(interval))
    }

    pub fn default_tab(&self) -> TabKind {
        self.ui
            .default_tab
            .as_deref()
            .and_then(TabKind::parse)
            .unwrap_or(TabKind::Upload)
    }

    pub fn log_level(&self) -> &str {
        self.log.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn log_file(&self) -> Result<PathBuf> {
        if let Some(file) = &self.log.file {
            return Ok(PathBuf::from(file));
        }
        let data_root = dirs::data_dir().ok_or_else(|| {
            anyhow!("cannot resolve data directory; set [log].file in the config")
        })?;
        Ok(data_root.join(APP_NAME).join("chatdesk.log"))
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# chatdesk config\n# Place this file at: {}\n\nversion = 1\n\n[api]\n# CHATDESK_BASE_URL overrides this value\nbase_url = \"{}\"\ntimeout = \"30s\"\nupload_timeout = \"60s\"\nreport_stats_path = \"{}\"\ncandidates_path = \"{}\"\n\n[retry]\nmax_retries = 3\nbase_delay = \"1s\"\nmax_delay = \"10s\"\njitter = 0.1\n\n[ui]\npoll_interval = \"2s\"\ndefault_tab = \"upload\"\n# \"0s\" disables the backend reachability probe\nconnectivity_probe = \"5s\"\n\n[log]\n# CHATDESK_LOG overrides this value\nlevel = \"{}\"\n# file = \"/path/to/chatdesk.log\"\n",
            path.display(),
            DEFAULT_BASE_URL,
            DEFAULT_REPORT_STATS_PATH,
            DEFAULT_CANDIDATES_PATH,
            DEFAULT_LOG_LEVEL,
        )
    }
}

fn parse_duration(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(value) = raw.strip_suffix('m') {
        let mins: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        let secs = mins
            .checked_mul(60)
            .with_context(|| format!("duration {raw:?} is too large"))?;
        return Ok(Duration::from_secs(secs));
    }

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 500ms or 5s)")
}

#[cfg(test)]
mod tests {
    use super::{Config, parse_duration};
    use anyhow::Result;
    use chatdesk_app::TabKind;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    fn write_config(content: &str) -> Result<(tempfile::TempDir, PathBuf)> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        std::fs::write(&path, content)?;
        Ok((temp, path))
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        match ENV_LOCK.get_or_init(|| Mutex::new(())).lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[test]
    fn missing_config_uses_defaults() -> Result<()> {
        let _guard = env_lock();
        let temp = tempfile::tempdir()?;
        let config = Config::load(&temp.path().join("missing.toml"))?;
        assert_eq!(config.version, 1);
        assert_eq!(config.default_tab(), TabKind::Upload);
        assert_eq!(config.poll_interval()?, Duration::from_secs(2));
        assert_eq!(config.connectivity_probe()?, Some(Duration::from_secs(5)));

        let options = config.client_options()?;
        assert_eq!(options.timeout, Duration::from_secs(30));
        assert_eq!(options.upload_timeout, Duration::from_secs(60));
        assert_eq!(options.retry.max_retries, 3);
        assert_eq!(options.upload_retry.max_retries, 0);
        assert_eq!(options.report_stats_path, "/report_stats/");
        Ok(())
    }

    #[test]
    fn unversioned_config_is_rejected_with_actionable_message() -> Result<()> {
        let (_temp, path) = write_config("[api]\nbase_url = \"http://bot.local\"\n")?;
        let error = Config::load(&path).expect_err("unversioned config should fail");
        let message = error.to_string();
        assert!(message.contains("version = 1"));
        assert!(message.contains("[api], [retry], [ui], and [log]"));
        Ok(())
    }

    #[test]
    fn unsupported_config_version_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 2\n")?;
        let error = Config::load(&path).expect_err("v2 config should fail");
        assert!(error.to_string().contains("unsupported config version 2"));
        Ok(())
    }

    #[test]
    fn malformed_config_returns_parse_error() -> Result<()> {
        let (_temp, path) = write_config("{{not toml")?;
        let error = Config::load(&path).expect_err("malformed config should fail");
        assert!(error.to_string().contains("parse TOML config"));
        Ok(())
    }

    #[test]
    fn full_config_parses() -> Result<()> {
        let _guard = env_lock();
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::remove_var("CHATDESK_BASE_URL");
        }
        let (_temp, path) = write_config(
            "version = 1\n[api]\nbase_url = \"https://bot.example.com/\"\ntimeout = \"5s\"\nreport_stats_path = \"/stats/\"\n[retry]\nmax_retries = 1\nbase_delay = \"250ms\"\nmax_delay = \"2s\"\njitter = 0.0\n[ui]\npoll_interval = \"500ms\"\ndefault_tab = \"all_chats\"\nconnectivity_probe = \"0s\"\n[log]\nlevel = \"debug\"\nfile = \"/tmp/chatdesk-test.log\"\n",
        )?;

        let config = Config::load(&path)?;
        assert_eq!(config.base_url(), "https://bot.example.com");
        assert_eq!(config.default_tab(), TabKind::AllChats);
        assert_eq!(config.poll_interval()?, Duration::from_millis(500));
        assert_eq!(config.connectivity_probe()?, None);
        assert_eq!(config.log_level(), "debug");
        assert_eq!(config.log_file()?, PathBuf::from("/tmp/chatdesk-test.log"));

        let options = config.client_options()?;
        assert_eq!(options.timeout, Duration::from_secs(5));
        assert_eq!(options.retry.max_retries, 1);
        assert_eq!(options.retry.base_delay, Duration::from_millis(250));
        assert_eq!(options.report_stats_path, "/stats/");
        assert_eq!(options.candidates_path, "/get_all_candidates/");
        Ok(())
    }

    #[test]
    fn base_url_env_override_wins() -> Result<()> {
        let _guard = env_lock();
        let (_temp, path) = write_config("version = 1\n[api]\nbase_url = \"http://from-config\"\n")?;
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("CHATDESK_BASE_URL", "https://from-env.example/");
        }
        let config = Config::load(&path)?;
        let resolved = config.base_url();
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("CHATDESK_BASE_URL");
        }
        assert_eq!(resolved, "https://from-env.example");
        Ok(())
    }

    #[test]
    fn default_path_honors_env_override() -> Result<()> {
        let _guard = env_lock();
        let temp = tempfile::tempdir()?;
        let override_path = temp.path().join("custom-config.toml");
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("CHATDESK_CONFIG_PATH", &override_path);
        }
        let resolved = Config::default_path()?;
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("CHATDESK_CONFIG_PATH");
        }
        assert_eq!(resolved, override_path);
        Ok(())
    }

    #[test]
    fn invalid_values_name_the_key() -> Result<()> {
        let cases = [
            ("[api]\nbase_url = \"ftp://bot\"\n", "api.base_url"),
            ("[api]\ntimeout = \"0s\"\n", "api.timeout"),
            ("[ui]\npoll_interval = \"soon\"\n", "ui.poll_interval"),
            ("[retry]\njitter = 1.5\n", "retry.jitter"),
            (
                "[retry]\nbase_delay = \"20s\"\nmax_delay = \"10s\"\n",
                "retry.base_delay",
            ),
            ("[ui]\ndefault_tab = \"dashboard\"\n", "ui.default_tab"),
            ("[api]\nreport_stats_path = \"stats\"\n", "api.report_stats_path"),
        ];
        for (body, key) in cases {
            let (_temp, path) = write_config(&format!("version = 1\n{body}"))?;
            let error = Config::load(&path).expect_err("invalid config should fail");
            let message = format!("{error:#}");
            assert!(message.contains(key), "expected {key} in {message}");
        }
        Ok(())
    }

    #[test]
    fn durations_parse_ms_seconds_and_minutes() -> Result<()> {
        assert_eq!(parse_duration("500ms")?, Duration::from_millis(500));
        assert_eq!(parse_duration("5s")?, Duration::from_secs(5));
        assert_eq!(parse_duration("2m")?, Duration::from_secs(120));
        assert!(parse_duration("oops").is_err());
        Ok(())
    }

    #[test]
    fn oversized_durations_are_rejected() -> Result<()> {
        let error = parse_duration(&format!("{}m", u64::MAX)).expect_err("minutes overflow");
        assert!(error.to_string().contains("too large"), "{error}");

        let cases = [
            ("[retry]\nmax_delay = \"18446744073709551615s\"\n", "retry.max_delay"),
            ("[api]\ntimeout = \"1441m\"\n", "api.timeout"),
            ("[ui]\nconnectivity_probe = \"99999999999999999m\"\n", "ui.connectivity_probe"),
        ];
        for (body, key) in cases {
            let (_temp, path) = write_config(&format!("version = 1\n{body}"))?;
            let error = Config::load(&path).expect_err("oversized duration should fail");
            let message = format!("{error:#}");
            assert!(message.contains(key), "expected {key} in {message}");
        }
        Ok(())
    }

    #[test]
    fn example_config_loads_cleanly() -> Result<()> {
        let _guard = env_lock();
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        std::fs::write(&path, Config::example_config(&path))?;
        let config = Config::load(&path)?;
        assert_eq!(config.base_url(), "http://localhost:8000");
        assert_eq!(config.log_level(), "info");
        Ok(())
    }
}
