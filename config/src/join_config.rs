use eyre::{
    bail,
    Result,
};
use serde::{
    Deserialize,
    Serialize,
};

/// Everything a session screen needs to join a channel.
///
/// Built once on the pre-join screen and handed to the session as an
/// immutable value. Initial mic/camera state travels with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinConfig {
    pub app_id: String,
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub mic_on: bool,
    pub camera_on: bool,
}

impl JoinConfig {
    pub fn new(config: &super::Config) -> Result<Self> {
        Self::for_channel(config, &config.channel)
    }

    /// Same settings as `config`, but for another channel.
    pub fn for_channel(config: &super::Config, channel: &str) -> Result<Self> {
        let app_id = config.app_id.trim();
        let channel = channel.trim();
        if app_id.is_empty() {
            bail!("No app id provided");
        }
        if channel.is_empty() {
            bail!("No channel provided");
        }
        Ok(Self {
            app_id: app_id.to_string(),
            channel: channel.to_string(),
            token: config
                .token
                .as_deref()
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(ToString::to_string),
            mic_on: config.audio_enabled,
            camera_on: config.video_enabled,
        })
    }

    pub fn with_media(mut self, mic_on: bool, camera_on: bool) -> Self {
        self.mic_on = mic_on;
        self.camera_on = camera_on;
        self
    }

    /// Route path of the session screen for this channel.
    pub fn session_path(&self) -> String {
        format!("/video-call/channel/{}", self.channel)
    }
}
