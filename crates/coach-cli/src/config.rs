// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use coach_llm::AiConfig;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_VERSION: i64 = 1;
const DEFAULT_LISTEN: &str = "127.0.0.1:5000";
const DEFAULT_AI_TIMEOUT: &str = "30s";
const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";
const DEFAULT_SECRET_ENV: &str = "COACH_SECRET_KEY";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub ai: Ai,
    #[serde(default)]
    pub session: Session,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            storage: Storage::default(),
            server: Server::default(),
            ai: Ai::default(),
            session: Session::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Storage {
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    pub listen: Option<String>,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            listen: Some(DEFAULT_LISTEN.to_owned()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ai {
    pub enabled: Option<bool>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub timeout: Option<String>,
    pub api_key_env: Option<String>,
}

impl Default for Ai {
    fn default() -> Self {
        Self {
            enabled: Some(true),
            base_url: Some(coach_llm::DEFAULT_BASE_URL.to_owned()),
            model: Some(coach_llm::DEFAULT_MODEL.to_owned()),
            timeout: Some(DEFAULT_AI_TIMEOUT.to_owned()),
            api_key_env: Some(DEFAULT_API_KEY_ENV.to_owned()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Session {
    pub secret_env: Option<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            secret_env: Some(DEFAULT_SECRET_ENV.to_owned()),
        }
    }
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("COACH_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set COACH_CONFIG_PATH to the config file")
        })?;

        let app_dir = config_root.join(coach_db::APP_NAME);
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("create config directory {}", app_dir.display()))?;
        Ok(app_dir.join("config.toml"))
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
                    "config file {} has no version. Add `version = 1` and keep values under [storage], [server], [ai], and [session]",
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
        if let Some(db_path) = &self.storage.db_path {
            coach_db::validate_db_path(db_path)?;
        }

        if let Some(listen) = &self.server.listen {
            validate_listen(listen)
                .with_context(|| format!("server.listen in {}", path.display()))?;
        }

        if let Some(timeout) = &self.ai.timeout {
            let parsed = parse_duration(timeout)?;
            if parsed <= Duration::ZERO {
                bail!(
                    "ai.timeout in {} must be positive, got {}",
                    path.display(),
                    timeout
                );
            }
        }

        for (key, value) in [
            ("ai.api_key_env", &self.ai.api_key_env),
            ("session.secret_env", &self.session.secret_env),
        ] {
            if let Some(name) = value
                && name.trim().is_empty()
            {
                bail!("{key} in {} must name an environment variable", path.display());
            }
        }

        Ok(())
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.storage.db_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => coach_db::default_db_path(),
        }
    }

    pub fn listen(&self) -> &str {
        self.server.listen.as_deref().unwrap_or(DEFAULT_LISTEN)
    }

    pub fn ai_enabled(&self) -> bool {
        self.ai.enabled.unwrap_or(true)
    }

    pub fn ai_base_url(&self) -> &str {
        self.ai
            .base_url
            .as_deref()
            .unwrap_or(coach_llm::DEFAULT_BASE_URL)
            .trim_end_matches('/')
    }

    pub fn ai_model(&self) -> &str {
        self.ai.model.as_deref().unwrap_or(coach_llm::DEFAULT_MODEL)
    }

    pub fn ai_timeout(&self) -> Result<Duration> {
        parse_duration(self.ai.timeout.as_deref().unwrap_or(DEFAULT_AI_TIMEOUT))
    }

    pub fn api_key_env(&self) -> &str {
        self.ai.api_key_env.as_deref().unwrap_or(DEFAULT_API_KEY_ENV)
    }

    pub fn secret_env(&self) -> &str {
        self.session
            .secret_env
            .as_deref()
            .unwrap_or(DEFAULT_SECRET_ENV)
    }

    pub fn ai_config(&self) -> Result<AiConfig> {
        self.ai_config_from(|name| env::var(name).ok())
    }

    /// Builds the generator settings, reading the credential through `lookup`.
    /// A disabled `[ai]` section never reads it.
    pub fn ai_config_from<F>(&self, lookup: F) -> Result<AiConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = if self.ai_enabled() {
            lookup(self.api_key_env()).filter(|key| !key.trim().is_empty())
        } else {
            None
        };

        Ok(AiConfig {
            api_key,
            base_url: self.ai_base_url().to_owned(),
            model: self.ai_model().to_owned(),
            timeout: self.ai_timeout()?,
        })
    }

    pub fn session_secret(&self) -> Option<String> {
        env::var(self.secret_env())
            .ok()
            .filter(|secret| !secret.is_empty())
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# coach config\n# Place this file at: {}\n\nversion = 1\n\n[storage]\n# Optional. Default is COACH_DB_PATH, then the platform data dir (for example ~/.local/share/coach/coach.db)\n# db_path = \"/absolute/path/to/coach.db\"\n\n[server]\nlisten = \"{}\"\n\n[ai]\nenabled = true\nbase_url = \"{}\"\nmodel = \"{}\"\ntimeout = \"{}\"\n# The API key itself is read from this environment variable.\napi_key_env = \"{}\"\n\n[session]\nsecret_env = \"{}\"\n",
            path.display(),
            DEFAULT_LISTEN,
            coach_llm::DEFAULT_BASE_URL,
            coach_llm::DEFAULT_MODEL,
            DEFAULT_AI_TIMEOUT,
            DEFAULT_API_KEY_ENV,
            DEFAULT_SECRET_ENV,
        )
    }
}

fn validate_listen(listen: &str) -> Result<()> {
    let (host, port) = listen
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("listen address {listen:?} must look like host:port"))?;
    if host.trim().is_empty() {
        bail!("listen address {listen:?} is missing a host");
    }
    port.parse::<u16>()
        .with_context(|| format!("listen address {listen:?} has an invalid port"))?;
    Ok(())
}

pub fn parse_duration(raw: &str) -> Result<Duration> {
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(value) = raw.strip_suffix('m') {
        let mins: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        let Some(secs) = mins.checked_mul(60) else {
            bail!("timeout duration {raw:?} is too large");
        };
        return Ok(Duration::from_secs(secs));
    }

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 500ms or 30s)")
}

#[cfg(test)]
mod tests {
    use super::{Config, parse_duration, validate_listen};
    use anyhow::Result;
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
        let temp = tempfile::tempdir()?;
        let config = Config::load(&temp.path().join("missing.toml"))?;
        assert_eq!(config.version, 1);
        assert_eq!(config.listen(), "127.0.0.1:5000");
        assert!(config.ai_enabled());
        assert_eq!(config.ai_model(), "gemini-1.5-flash");
        assert_eq!(config.ai_timeout()?, Duration::from_secs(30));
        assert_eq!(config.api_key_env(), "GEMINI_API_KEY");
        assert_eq!(config.secret_env(), "COACH_SECRET_KEY");
        Ok(())
    }

    #[test]
    fn unversioned_config_is_rejected_with_actionable_message() -> Result<()> {
        let (_temp, path) = write_config("[ai]\nmodel=\"gemini-1.5-pro\"\n")?;
        let error = Config::load(&path).expect_err("unversioned config should fail");
        let message = error.to_string();
        assert!(message.contains("version = 1"), "got {message}");
        assert!(message.contains("[storage], [server], [ai], and [session]"));
        Ok(())
    }

    #[test]
    fn v1_config_parses() -> Result<()> {
        let (_temp, path) = write_config(
            "version = 1\n[server]\nlisten = \"0.0.0.0:8080\"\n[ai]\nenabled = false\nbase_url = \"http://localhost:9000/v1beta/\"\nmodel = \"gemini-test\"\ntimeout = \"2s\"\napi_key_env = \"MY_KEY\"\n[session]\nsecret_env = \"MY_SECRET\"\n",
        )?;

        let config = Config::load(&path)?;
        assert_eq!(config.listen(), "0.0.0.0:8080");
        assert!(!config.ai_enabled());
        assert_eq!(config.ai_base_url(), "http://localhost:9000/v1beta");
        assert_eq!(config.ai_model(), "gemini-test");
        assert_eq!(config.ai_timeout()?, Duration::from_secs(2));
        assert_eq!(config.api_key_env(), "MY_KEY");
        assert_eq!(config.secret_env(), "MY_SECRET");
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
    fn unsupported_config_version_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 2\n")?;
        let error = Config::load(&path).expect_err("v2 config should fail");
        assert!(error.to_string().contains("unsupported config version 2"));
        Ok(())
    }

    #[test]
    fn ai_config_reads_key_from_named_variable_only_when_enabled() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[ai]\napi_key_env = \"MY_KEY\"\n")?;
        let config = Config::load(&path)?;
        let lookup = |name: &str| (name == "MY_KEY").then(|| "secret".to_owned());

        let enabled = config.ai_config_from(lookup)?;
        assert_eq!(enabled.api_key.as_deref(), Some("secret"));
        assert_eq!(enabled.model, "gemini-1.5-flash");

        let blank = config.ai_config_from(|_| Some("  ".to_owned()))?;
        assert_eq!(blank.api_key, None);

        let (_temp, path) = write_config("version = 1\n[ai]\nenabled = false\n")?;
        let disabled = Config::load(&path)?.ai_config_from(|_| Some("secret".to_owned()))?;
        assert_eq!(disabled.api_key, None);
        Ok(())
    }

    #[test]
    fn default_path_honors_env_override() -> Result<()> {
        let _guard = env_lock();
        let temp = tempfile::tempdir()?;
        let override_path = temp.path().join("custom-config.toml");
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("COACH_CONFIG_PATH", &override_path);
        }
        let resolved = Config::default_path()?;
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("COACH_CONFIG_PATH");
        }
        assert_eq!(resolved, override_path);
        Ok(())
    }

    #[test]
    fn db_path_prefers_storage_config_over_env_override() -> Result<()> {
        let _guard = env_lock();
        let (_temp, path) =
            write_config("version = 1\n[storage]\ndb_path = \"/explicit/from-config.db\"\n")?;
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("COACH_DB_PATH", "/from/env.db");
        }
        let config = Config::load(&path)?;
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("COACH_DB_PATH");
        }
        assert_eq!(config.db_path()?, PathBuf::from("/explicit/from-config.db"));
        Ok(())
    }

    #[test]
    fn db_path_uses_env_override_when_storage_db_path_missing() -> Result<()> {
        let _guard = env_lock();
        let (_temp, path) = write_config("version = 1\n")?;
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("COACH_DB_PATH", "/from/env-only.db");
        }
        let config = Config::load(&path)?;
        let resolved = config.db_path()?;
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("COACH_DB_PATH");
        }
        assert_eq!(resolved, PathBuf::from("/from/env-only.db"));
        Ok(())
    }

    #[test]
    fn db_path_rejects_uri_style_storage_value() -> Result<()> {
        let (_temp, path) =
            write_config("version = 1\n[storage]\ndb_path = \"https://evil.example/coach.db\"\n")?;
        let error = Config::load(&path).expect_err("URI db_path should fail validation");
        let message = error.to_string();
        assert!(message.contains("looks like a URI"), "unexpected message: {message}");
        Ok(())
    }

    #[test]
    fn listen_address_must_have_host_and_port() -> Result<()> {
        validate_listen("127.0.0.1:5000")?;
        validate_listen("localhost:80")?;
        assert!(validate_listen("5000").is_err());
        assert!(validate_listen(":5000").is_err());
        assert!(validate_listen("localhost:http").is_err());

        let (_temp, path) = write_config("version = 1\n[server]\nlisten = \"nowhere\"\n")?;
        let error = Config::load(&path).expect_err("bad listen should fail");
        assert!(format!("{error:#}").contains("host:port"));
        Ok(())
    }

    #[test]
    fn timeout_parses_ms_seconds_and_minutes() -> Result<()> {
        assert_eq!(parse_duration("500ms")?, Duration::from_millis(500));
        assert_eq!(parse_duration("30s")?, Duration::from_secs(30));
        assert_eq!(parse_duration("2m")?, Duration::from_secs(120));
        assert!(parse_duration("oops").is_err());
        Ok(())
    }

    #[test]
    fn timeout_minutes_that_overflow_are_rejected() {
        let error = parse_duration(&format!("{}m", u64::MAX)).expect_err("overflow should fail");
        assert!(error.to_string().contains("too large"));
    }

    #[test]
    fn timeout_rejects_non_positive_values_in_config() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[ai]\ntimeout = \"0s\"\n")?;
        let error = Config::load(&path).expect_err("zero timeout should fail");
        assert!(error.to_string().contains("must be positive"));
        Ok(())
    }

    #[test]
    fn blank_env_names_are_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[session]\nsecret_env = \" \"\n")?;
        let error = Config::load(&path).expect_err("blank env name should fail");
        assert!(error.to_string().contains("session.secret_env"));
        Ok(())
    }

    #[test]
    fn example_config_round_trips_through_load() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        let example = Config::example_config(&path);
        assert!(example.contains("version = 1"));
        for section in ["[storage]", "[server]", "[ai]", "[session]"] {
            assert!(example.contains(section), "missing {section}");
        }
        std::fs::write(&path, &example)?;
        let config = Config::load(&path)?;
        assert_eq!(config.listen(), "127.0.0.1:5000");
        Ok(())
    }
}
