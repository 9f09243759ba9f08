use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Shared SFX volume constants (0.0..=1.0), scaled by the player's audio
/// settings before playback.
pub const KNEAD_SFX_VOLUME: f32 = 0.45;
pub const COUNTDOWN_SFX_VOLUME: f32 = 0.35;
pub const ROUND_OVER_SFX_VOLUME: f32 = 0.5;

/// How long the "kneading" sprite stays up after a counted tap.
pub const FEEDBACK_PULSE: Duration = Duration::from_millis(150);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Cue {
    Knead,
    /// One beep per countdown number shown.
    CountdownBeep,
    RoundOver,
}

impl Cue {
    pub fn base_volume(self) -> f32 {
        match self {
            Cue::Knead => KNEAD_SFX_VOLUME,
            Cue::CountdownBeep => COUNTDOWN_SFX_VOLUME,
            Cue::RoundOver => ROUND_OVER_SFX_VOLUME,
        }
    }

    /// Playback volume after master/sfx gain and mute are applied.
    pub fn volume(self, sfx_gain: f32) -> f32 {
        (self.base_volume() * sfx_gain).clamp(0.0, 1.0)
    }
}
