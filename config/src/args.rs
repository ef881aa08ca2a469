use clap::Parser;

/// Classroom session simulator
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version = version(), about, long_about = None)]
pub struct Args {
    /// Application id handed to the transport on join.
    #[clap(long, value_name = "APP_ID")]
    pub app_id: Option<String>,

    /// Channel to join.
    #[clap(long, value_name = "CHANNEL")]
    pub channel: Option<String>,

    /// Optional access token for the channel.
    #[clap(long, value_name = "TOKEN")]
    pub token: Option<String>,

    /// Start with the microphone on or off.
    #[clap(long, value_name = "BOOL")]
    pub mic: Option<bool>,

    /// Start with the camera on or off.
    #[clap(long, value_name = "BOOL")]
    pub camera: Option<bool>,

    /// Number of simulated remote peers.
    #[clap(long, value_name = "N")]
    pub peers: Option<usize>,

    /// Seconds after which the first peer starts sharing its screen.
    #[clap(long = "screen-share-after", value_name = "SECS")]
    pub screen_share_after_secs: Option<u64>,

    /// How long the simulation runs before everybody leaves.
    #[clap(long = "run-seconds", value_name = "SECS")]
    pub run_seconds: Option<u64>,

    /// Default tracing filter, `RUST_LOG` takes precedence.
    #[clap(long = "log-level", value_name = "FILTER")]
    pub log_level: Option<String>,

    /// Persist the effective configuration to the config directory.
    #[clap(long, action)]
    pub save: bool,
}

mod config_ext {
    use super::*;
    use config::{
        Map,
        Source,
        Value,
    };
    use std::collections::HashMap;

    impl Source for Args {
        fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
            Box::new((*self).clone())
        }

        fn collect(&self) -> Result<Map<String, Value>, config::ConfigError> {
            let mut cache = HashMap::<String, Value>::new();
            if let Some(app_id) = &self.app_id {
                cache.insert("app_id".to_string(), app_id.clone().into());
            }
            if let Some(channel) = &self.channel {
                cache.insert("channel".to_string(), channel.clone().into());
            }
            if let Some(token) = &self.token {
                cache.insert("token".to_string(), token.clone().into());
            }
            if let Some(mic) = self.mic {
                cache.insert("audio_enabled".to_string(), mic.into());
            }
            if let Some(camera) = self.camera {
                cache.insert("video_enabled".to_string(), camera.into());
            }
            if let Some(peers) = self.peers {
                cache.insert("simulation.peers".to_string(), (peers as u64).into());
            }
            if let Some(secs) = self.screen_share_after_secs {
                cache.insert("simulation.screen_share_after_secs".to_string(), secs.into());
            }
            if let Some(secs) = self.run_seconds {
                cache.insert("simulation.run_seconds".to_string(), secs.into());
            }
            if let Some(level) = &self.log_level {
                cache.insert("log_level".to_string(), level.clone().into());
            }
            Ok(cache)
        }
    }
}

pub fn version() -> String {
    let author = clap::crate_authors!();
    let config_dir_path = crate::get_config_dir().display().to_string();
    let data_dir_path = crate::get_data_dir().display().to_string();

    format!(
        "\
Authors: {author}

Config directory: {config_dir_path}
Data directory: {data_dir_path}"
    )
}
