//! Picks the remote participant whose video is a shared screen.
//!
//! Transports do not tell camera and screen tracks apart reliably, so this
//! matches on track metadata. It is a heuristic: a camera whose label happens
//! to contain "screen" is classified as a screen share.

use crate::{
    participant::{
        RemoteParticipant,
        RemoteVideoTrack,
    },
    registry::ParticipantRegistry,
};
use strum::Display;

/// Which piece of metadata gave the screen share away, in the order they are
/// checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ScreenShareRule {
    TrackId,
    TrackLabel,
    TrackCapability,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenShare<'a> {
    pub participant: &'a RemoteParticipant,
    pub rule: ScreenShareRule,
}

/// First participant, in registry order, with a screen-share video track.
pub fn classify(registry: &ParticipantRegistry) -> Option<ScreenShare<'_>> {
    registry.iter().find_map(|participant| {
        let track = participant.video_track.as_ref()?;
        match_rule(track).map(|rule| ScreenShare { participant, rule })
    })
}

pub fn match_rule(track: &RemoteVideoTrack) -> Option<ScreenShareRule> {
    if mentions_screen(&track.id) {
        return Some(ScreenShareRule::TrackId);
    }
    if track.label.as_deref().is_some_and(mentions_screen) {
        return Some(ScreenShareRule::TrackLabel);
    }
    if track.is_screen_track == Some(true) || track.device_label.as_deref().is_some_and(mentions_screen) {
        return Some(ScreenShareRule::TrackCapability);
    }
    None
}

fn mentions_screen(value: &str) -> bool {
    value.to_lowercase().contains("screen")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn camera(id: &str) -> RemoteParticipant {
        RemoteParticipant::new(id).with_audio().with_video(
            RemoteVideoTrack::new(format!("track-{id}"))
                .with_label("Integrated Camera")
                .with_device_label("Integrated Camera (04f2:b6dd)"),
        )
    }

    fn registry(participants: impl IntoIterator<Item = RemoteParticipant>) -> ParticipantRegistry {
        participants.into_iter().collect()
    }

    #[test]
    fn cameras_only_is_no_screen_share() {
        let registry = registry([camera("ada"), camera("bob"), RemoteParticipant::new("eve")]);
        assert_eq!(classify(&registry), None);
        assert_eq!(classify(&ParticipantRegistry::new()), None);
    }

    #[test]
    fn track_id_wins_regardless_of_label() {
        for id in ["screen-7", "SCREEN_share", "track-ScReEn"] {
            let sharer = RemoteParticipant::new("bob").with_video(RemoteVideoTrack::new(id).with_label("Integrated Camera"));
            let registry = registry([camera("ada"), sharer]);

            let share = classify(&registry).expect("screen share");
            assert_eq!(share.participant.id.as_str(), "bob");
            assert_eq!(share.rule, ScreenShareRule::TrackId);
        }
    }

    #[test]
    fn rules_are_checked_in_order() {
        let by_label = RemoteVideoTrack::new("track-1").with_label("Screen 1");
        assert_eq!(match_rule(&by_label), Some(ScreenShareRule::TrackLabel));

        let by_flag = RemoteVideoTrack::new("track-2").with_screen_flag(true);
        assert_eq!(match_rule(&by_flag), Some(ScreenShareRule::TrackCapability));

        let by_device = RemoteVideoTrack::new("track-3").with_device_label("screen:0:0");
        assert_eq!(match_rule(&by_device), Some(ScreenShareRule::TrackCapability));

        let not_flagged = RemoteVideoTrack::new("track-4").with_screen_flag(false);
        assert_eq!(match_rule(&not_flagged), None);
    }

    #[test]
    fn first_sharer_in_registry_order_is_selected() {
        let first = RemoteParticipant::new("bob").with_video(RemoteVideoTrack::new("track-b").with_label("Screen 1"));
        let second = RemoteParticipant::new("eve").with_video(RemoteVideoTrack::new("screen-e"));
        let registry = registry([camera("ada"), first, second]);

        let share = classify(&registry).expect("screen share");
        assert_eq!(share.participant.id.as_str(), "bob");
    }

    #[test]
    fn participant_without_video_track_is_skipped() {
        let mut silent = RemoteParticipant::new("eve");
        silent.has_video = true;
        assert_eq!(classify(&registry([silent])), None);
    }
}
