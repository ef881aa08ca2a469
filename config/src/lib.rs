#[macro_use]
extern crate tracing;

mod app_config;
mod args;
mod join_config;

pub use app_config::{
    get_config_dir,
    get_data_dir,
    AppConfig,
};
pub use args::Args;
use color_eyre::Result;
use eyre::Context as _;
pub use join_config::JoinConfig;
use serde::{
    Deserialize,
    Serialize,
};
use std::path::Path;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(flatten, skip_serializing)]
    pub app_config: AppConfig,
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default = "enabled")]
    pub audio_enabled: bool,
    #[serde(default = "enabled")]
    pub video_enabled: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub whiteboard: WhiteboardConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhiteboardConfig {
    pub debounce_ms: u64,
    pub grace_ms: u64,
}

impl Default for WhiteboardConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 150,
            grace_ms: 100,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub peers: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_share_after_secs: Option<u64>,
    pub run_seconds: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            peers: 2,
            screen_share_after_secs: Some(3),
            run_seconds: 30,
        }
    }
}

fn enabled() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

const DEFAULT_CONFIG: &str = include_str!("default-config.yaml");

impl Default for Config {
    fn default() -> Self {
        serde_yml::from_str(DEFAULT_CONFIG).expect("Failed to parse default config")
    }
}

impl Config {
    pub fn new(args: Args) -> Result<Self, config::ConfigError> {
        let data_dir = get_data_dir();
        let config_dir = get_config_dir();
        let mut builder = config::Config::builder()
            .set_default("data_dir", data_dir.display().to_string())?
            .set_default("config_dir", config_dir.display().to_string())?;

        builder = builder.add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Yaml));

        let config_files = [("config.yaml", config::FileFormat::Yaml)];

        for (file, format) in &config_files {
            let source = config::File::from(config_dir.join(file))
                .format(*format)
                .required(false);
            builder = builder.add_source(source);
        }

        builder = builder.add_source(args);

        let cfg: Self = builder.build()?.try_deserialize()?;

        Ok(cfg)
    }

    pub fn data_dir(&self) -> &Path {
        &self.app_config.data_dir
    }

    /// Writes the values that differ from the defaults to `config.yaml`.
    #[instrument(level = "debug", skip(self))]
    pub fn save(&self) -> Result<()> {
        let content = self.changed_from_default()?;
        std::fs::create_dir_all(&self.app_config.config_dir).context("Failed to create config directory")?;
        let path = self.app_config.config_dir.join("config.yaml");
        debug!(?path, "Saving configuration");
        std::fs::write(&path, content).wrap_err_with(|| format!("Failed to write config to {:?}", path))
    }

    fn changed_from_default(&self) -> Result<String> {
        let current = serde_yml::to_value(self).context("Failed to serialize config")?;
        let default = serde_yml::to_value(Self::default()).context("Failed to serialize default config")?;

        let mut changed = serde_yml::Mapping::new();
        if let (serde_yml::Value::Mapping(current), serde_yml::Value::Mapping(default)) = (current, default) {
            for (key, value) in current {
                if default.get(&key) != Some(&value) {
                    changed.insert(key, value);
                }
            }
        }
        serde_yml::to_string(&changed).context("Failed to serialize config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_config_parses() {
        let config = Config::default();
        assert_eq!(config.channel, "test-channel");
        assert!(config.audio_enabled);
        assert!(config.video_enabled);
        assert_eq!(config.whiteboard, WhiteboardConfig::default());
        assert_eq!(config.simulation.peers, 2);
    }

    #[test]
    fn only_changed_values_are_saved() {
        let config = Config {
            channel: "biology".to_string(),
            video_enabled: false,
            ..Config::default()
        };
        let saved = config.changed_from_default().unwrap();
        let saved: serde_yml::Mapping = serde_yml::from_str(&saved).unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved.get("channel"), Some(&serde_yml::Value::from("biology")));
        assert_eq!(saved.get("video_enabled"), Some(&serde_yml::Value::from(false)));
    }
}
