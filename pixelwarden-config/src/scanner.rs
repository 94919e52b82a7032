use anyhow::{Context, anyhow, ensure};
use pixelwarden_core::{EngineConfig, ResultStore};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

pub const CONFIG_PATH_ENV: &str = "PIXELWARDEN_CONFIG_PATH";
pub const CONFIG_JSON_ENV: &str = "PIXELWARDEN_CONFIG_JSON";
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

/// Source that produced the scanner configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ScannerConfigSource {
    #[default]
    Default,
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

/// Where scan results and job state are stored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// SQLite URL, e.g. `sqlite://pixelwarden.db`. The file is created when
    /// missing. `DATABASE_URL` takes precedence when set.
    pub url: String,
    /// Pool size. Workers, progress writes and readers share it, so keep it
    /// at least a couple above the engine's `worker_count`.
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "sqlite://pixelwarden.db".to_string(),
            max_connections: 8,
        }
    }
}

/// Top-level settings for a Pixelwarden deployment.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Worker count, batch size, probe timeout, output caps and the media
    /// extension allow-list.
    pub engine: EngineConfig,
    pub database: DatabaseSettings,
}

impl ScannerConfig {
    /// Load configuration using environment variables.
    /// Evaluation order:
    /// 1) `$PIXELWARDEN_CONFIG_PATH` (TOML or JSON file),
    /// 2) `$PIXELWARDEN_CONFIG_JSON` (inline JSON),
    /// 3) the first default file that exists (`pixelwarden.toml`, ...),
    /// 4) defaults.
    ///
    /// A `.env` file in the working directory is loaded first, and
    /// `$DATABASE_URL` overrides whatever database URL the chosen source set.
    pub fn load_from_env() -> anyhow::Result<(Self, ScannerConfigSource)> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env file");
        }

        let (mut config, source) = Self::resolve_source()?;
        if let Ok(url) = env::var(DATABASE_URL_ENV)
            && !url.trim().is_empty()
        {
            config.database.url = url.trim().to_string();
        }
        config.validate()?;

        info!(source = ?source, database = %config.database.url, "scanner configuration loaded");
        Ok((config, source))
    }

    fn resolve_source() -> anyhow::Result<(Self, ScannerConfigSource)> {
        if let Ok(path_str) = env::var(CONFIG_PATH_ENV)
            && !path_str.trim().is_empty()
        {
            let path = PathBuf::from(path_str);
            let config = Self::load_from_file(&path)?;
            return Ok((config, ScannerConfigSource::EnvPath(path)));
        }

        if let Ok(raw) = env::var(CONFIG_JSON_ENV)
            && !raw.trim().is_empty()
        {
            let parsed = Self::parse_json(&raw)
                .with_context(|| format!("failed to parse {CONFIG_JSON_ENV}"))?;
            return Ok((parsed, ScannerConfigSource::EnvInline));
        }

        if let Some(path) = Self::find_default_file() {
            let config = Self::load_from_file(&path)?;
            return Ok((config, ScannerConfigSource::File(path)));
        }

        Ok((Self::default(), ScannerConfigSource::Default))
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read scanner config from {}", path.display()))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::parse_json(&contents)
                .with_context(|| format!("invalid scanner config {}", path.display())),
            Some("toml") | Some("tml") => toml::from_str(&contents)
                .map_err(|err| anyhow!("invalid scanner config {}: {}", path.display(), err)),
            _ => Self::parse_from_str(&contents, &path.display().to_string()),
        }
    }

    pub fn parse_from_str(contents: &str, origin: &str) -> anyhow::Result<Self> {
        // TOML first, then JSON.
        toml::from_str(contents).or_else(|toml_err| {
            serde_json::from_str(contents).map_err(|json_err| {
                anyhow!(
                    "failed to parse scanner config {}: toml error: {}; json error: {}",
                    origin,
                    toml_err,
                    json_err
                )
            })
        })
    }

    pub fn parse_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw).map_err(|err| anyhow!("invalid scanner config json: {err}"))
    }

    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        let engine = &self.engine;
        ensure!(engine.worker_count > 0, "engine.worker_count must be at least 1");
        ensure!(engine.batch_size > 0, "engine.batch_size must be at least 1");
        ensure!(
            engine.probe_timeout_secs > 0,
            "engine.probe_timeout_secs must be at least 1"
        );
        ensure!(
            engine.eta_smoothing > 0.0 && engine.eta_smoothing <= 1.0,
            "engine.eta_smoothing must be in (0, 1], got {}",
            engine.eta_smoothing
        );
        ensure!(
            engine.output_limits.max_lines > 0 && engine.output_limits.max_chars > 0,
            "engine.output_limits must allow some output"
        );
        ensure!(
            self.database.url.starts_with("sqlite:"),
            "database.url must be a sqlite URL, got {}",
            self.database.url
        );
        ensure!(
            self.database.max_connections > 0,
            "database.max_connections must be at least 1"
        );
        Ok(())
    }

    /// Opens the configured database and brings its schema up to date.
    pub async fn open_store(&self) -> anyhow::Result<ResultStore> {
        let store = ResultStore::connect(&self.database.url, self.database.max_connections)
            .await
            .with_context(|| format!("failed to open {}", self.database.url))?;
        store
            .migrate()
            .await
            .context("failed to apply database migrations")?;
        Ok(store)
    }

    fn find_default_file() -> Option<PathBuf> {
        const CANDIDATES: &[&str] = &[
            "pixelwarden.toml",
            "pixelwarden.json",
            "config/pixelwarden.toml",
            "config/pixelwarden.json",
        ];

        CANDIDATES
            .iter()
            .map(Path::new)
            .find(|path| path.exists())
            .map(|path| path.to_path_buf())
    }
}
