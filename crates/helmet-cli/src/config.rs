//! Layered configuration: defaults, then an optional TOML file, then
//! `HELMET_*` environment variables.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use helmet_engine::negotiate::{DEFAULT_CANDIDATES, DEFAULT_DEVICE_PATTERNS};
use helmet_engine::{Candidate, EngineConfig};
use helmet_params::EffectParameters;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HelmetConfig {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub audio: AudioSettings,

    #[serde(default)]
    pub effects: EffectParameters,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Static control page served at `/`.
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioSettings {
    /// `[sample_rate, channels, block_size]` triples, best first.
    #[serde(default = "default_candidates")]
    pub candidates: Vec<(u32, u16, u32)>,

    #[serde(default = "default_device_patterns")]
    pub device_patterns: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            index_path: default_index_path(),
        }
    }
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            candidates: default_candidates(),
            device_patterns: default_device_patterns(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_index_path() -> PathBuf {
    PathBuf::from("index.html")
}

fn default_candidates() -> Vec<(u32, u16, u32)> {
    DEFAULT_CANDIDATES
        .iter()
        .map(|c| (c.sample_rate_hz, c.channels, c.block_size_frames))
        .collect()
}

fn default_device_patterns() -> Vec<String> {
    DEFAULT_DEVICE_PATTERNS.iter().map(|p| p.to_string()).collect()
}

impl HelmetConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let mut settings = config::Config::builder();
        if path.exists() {
            settings = settings.add_source(config::File::from(path.to_path_buf()));
        }
        settings = settings.add_source(
            config::Environment::with_prefix("HELMET")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let cfg: HelmetConfig = settings
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.audio.candidates.is_empty() {
            bail!("audio.candidates must list at least one configuration");
        }
        if let Some(bad) = self
            .audio
            .candidates
            .iter()
            .find(|(rate, ch, block)| *rate == 0 || *ch == 0 || *block == 0)
        {
            bail!("audio candidate {bad:?} has a zero field");
        }
        self.effects
            .validate()
            .context("invalid initial effect settings")?;
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            candidates: self
                .audio
                .candidates
                .iter()
                .map(|&(rate, ch, block)| Candidate::new(rate, ch, block))
                .collect(),
            device_patterns: self.audio.device_patterns.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = HelmetConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.server.port, 8000);
        assert_eq!(cfg.engine_config().candidates.len(), DEFAULT_CANDIDATES.len());
    }

    #[test]
    fn rejects_bad_candidates_and_effects() {
        let mut cfg = HelmetConfig::default();
        cfg.audio.candidates = vec![(44_100, 0, 1024)];
        assert!(cfg.validate().is_err());

        let mut cfg = HelmetConfig::default();
        cfg.audio.candidates.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = HelmetConfig::default();
        cfg.effects.volume = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = HelmetConfig::load(Path::new("/nonexistent/helmet.toml")).unwrap();
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.effects, EffectParameters::default());
    }

    #[test]
    fn environment_overrides_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("helmet.toml");
        std::fs::write(&path, "[server]\nport = 8100\nhost = \"127.0.0.1\"\n").unwrap();

        std::env::set_var("HELMET_SERVER__PORT", "9100");
        let loaded = HelmetConfig::load(&path);
        std::env::remove_var("HELMET_SERVER__PORT");

        let cfg = loaded.unwrap();
        assert_eq!(cfg.server.port, 9100);
        assert_eq!(cfg.server.host, "127.0.0.1");
    }
}
