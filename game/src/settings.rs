use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::leaderboard::DEFAULT_TOP_N;
use crate::session::{COUNTDOWN_START, DEFAULT_ROUND_SECONDS};
use crate::sfx::FEEDBACK_PULSE;

pub const DEFAULT_AUTO_SWITCH: Duration = Duration::from_secs(7);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(3000);

const MAX_ROUND_SECONDS: u32 = 600;
const MAX_LEADERBOARD_SIZE: usize = 100;
const MIN_DURATION: Duration = Duration::from_millis(1);
const HTTP_SCHEME: &str = "http://";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GameRules {
    #[serde(rename = "auto_switch_ms", with = "crate::serde_duration")]
    pub auto_switch: Duration,
    pub countdown_from: u32,
    pub round_seconds: u32,
    #[serde(rename = "feedback_pulse_ms", with = "crate::serde_duration")]
    pub feedback_pulse: Duration,
    pub leaderboard_size: usize,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            auto_switch: DEFAULT_AUTO_SWITCH,
            countdown_from: COUNTDOWN_START,
            round_seconds: DEFAULT_ROUND_SECONDS,
            feedback_pulse: FEEDBACK_PULSE,
            leaderboard_size: DEFAULT_TOP_N,
        }
    }
}

impl GameRules {
    pub fn clamp(mut self) -> Self {
        self.auto_switch = self.auto_switch.max(MIN_DURATION);
        self.countdown_from = self.countdown_from.max(1);
        self.round_seconds = self.round_seconds.clamp(1, MAX_ROUND_SECONDS);
        self.feedback_pulse = self.feedback_pulse.max(MIN_DURATION);
        self.leaderboard_size = self.leaderboard_size.clamp(1, MAX_LEADERBOARD_SIZE);
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioSettings {
    pub master_volume: f32,
    pub sfx_volume: f32,
    pub mute_all: bool,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            master_volume: 1.0,
            sfx_volume: 1.0,
            mute_all: false,
        }
    }
}

impl AudioSettings {
    pub fn clamp(mut self) -> Self {
        self.master_volume = self.master_volume.clamp(0.0, 1.0);
        self.sfx_volume = self.sfx_volume.clamp(0.0, 1.0);
        self
    }

    pub fn effective_sfx_gain(self) -> f32 {
        if self.mute_all {
            0.0
        } else {
            self.master_volume * self.sfx_volume
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LeaderboardSettings {
    /// Base URL of the leaderboard service. `None` keeps scores in memory.
    pub url: Option<String>,
    #[serde(rename = "timeout_ms", with = "crate::serde_duration")]
    pub timeout: Duration,
}

impl Default for LeaderboardSettings {
    fn default() -> Self {
        Self {
            url: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KioskSettings {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub rules: GameRules,
    #[serde(default)]
    pub audio: AudioSettings,
    #[serde(default)]
    pub leaderboard: LeaderboardSettings,
}

impl Default for KioskSettings {
    fn default() -> Self {
        Self {
            version: default_version(),
            rules: GameRules::default(),
            audio: AudioSettings::default(),
            leaderboard: LeaderboardSettings::default(),
        }
    }
}

impl KioskSettings {
    pub fn sanitized(mut self) -> Self {
        self.version = default_version();
        self.rules = self.rules.clamp();
        self.audio = self.audio.clamp();
        self.leaderboard.timeout = self.leaderboard.timeout.max(MIN_DURATION);
        self.leaderboard.url = self
            .leaderboard
            .url
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .filter(|url| {
                let plain_http = url
                    .get(..HTTP_SCHEME.len())
                    .is_some_and(|scheme| scheme.eq_ignore_ascii_case(HTTP_SCHEME));
                if !plain_http {
                    tracing::warn!(%url, "leaderboard url must be plain http://; keeping scores in memory");
                }
                plain_http
            });
        self
    }
}

fn default_version() -> u32 {
    1
}

#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var_os(key))
    }

    fn from_vars<F>(mut get_env: F) -> Self
    where
        F: FnMut(&str) -> Option<OsString>,
    {
        if let Some(explicit) = get_env("KNEAD_SETTINGS_PATH") {
            return Self::new(explicit);
        }

        let base = get_env("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| {
                get_env("HOME").map(|home| {
                    let mut p = PathBuf::from(home);
                    p.push(".config");
                    p
                })
            })
            .unwrap_or_else(|| PathBuf::from("."));

        let mut path = base;
        path.push("knead-kiosk");
        path.push("settings.json");
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> KioskSettings {
        let Ok(bytes) = fs::read(&self.path) else {
            return KioskSettings::default();
        };
        match serde_json::from_slice::<KioskSettings>(&bytes) {
            Ok(settings) => settings.sanitized(),
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "ignoring malformed settings file"
                );
                KioskSettings::default()
            }
        }
    }

    /// Writes the sanitized form of `settings`, creating parent directories,
    /// so the file on disk always loads back unchanged.
    pub fn save(&self, settings: &KioskSettings) -> io::Result<KioskSettings> {
        let settings = settings.clone().sanitized();
        let mut text = serde_json::to_string_pretty(&settings).map_err(io::Error::other)?;
        text.push('\n');

        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir)?,
            _ => {}
        }
        fs::write(&self.path, text)?;
        tracing::info!(path = %self.path.display(), "settings written");
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_effective_gain_respects_mute() {
        let mut audio = AudioSettings::default();
        assert!((audio.effective_sfx_gain() - 1.0).abs() < 1e-6);

        audio.sfx_volume = 0.5;
        assert!((audio.effective_sfx_gain() - 0.5).abs() < 1e-6);

        audio.mute_all = true;
        assert_eq!(audio.effective_sfx_gain(), 0.0);
    }

    #[test]
    fn sanitized_clamps_rules_audio_and_url() {
        let settings = KioskSettings {
            version: 42,
            rules: GameRules {
                countdown_from: 0,
                round_seconds: 10_000,
                leaderboard_size: 0,
                feedback_pulse: Duration::ZERO,
                ..GameRules::default()
            },
            audio: AudioSettings {
                master_volume: 3.0,
                sfx_volume: -1.0,
                mute_all: false,
            },
            leaderboard: LeaderboardSettings {
                url: Some(" http://scores.local:4100/ ".to_string()),
                timeout: Duration::ZERO,
            },
        }
        .sanitized();

        assert_eq!(settings.version, 1);
        assert_eq!(settings.rules.countdown_from, 1);
        assert_eq!(settings.rules.round_seconds, 600);
        assert_eq!(settings.rules.leaderboard_size, 1);
        assert_eq!(settings.rules.feedback_pulse, Duration::from_millis(1));
        assert_eq!(settings.audio.master_volume, 1.0);
        assert_eq!(settings.audio.sfx_volume, 0.0);
        assert_eq!(
            settings.leaderboard.url.as_deref(),
            Some("http://scores.local:4100")
        );
        assert_eq!(settings.leaderboard.timeout, Duration::from_millis(1));
    }

    #[test]
    fn blank_url_means_in_memory_store() {
        let mut settings = KioskSettings::default();
        settings.leaderboard.url = Some("   ".to_string());
        assert_eq!(settings.sanitized().leaderboard.url, None);
    }

    #[test]
    fn serde_defaults_fill_missing_fields() {
        let parsed: KioskSettings =
            serde_json::from_str(r#"{"version":1,"rules":{"round_seconds":20}}"#)
                .expect("settings JSON should parse");
        assert_eq!(parsed.rules.round_seconds, 20);
        assert_eq!(parsed.rules.auto_switch, DEFAULT_AUTO_SWITCH);
        assert_eq!(parsed.rules.countdown_from, 3);
        assert_eq!(parsed.audio, AudioSettings::default());
        assert_eq!(parsed.leaderboard, LeaderboardSettings::default());
    }

    fn temp_settings_path(tag: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        std::env::temp_dir()
            .join(format!("knead_kiosk_settings_{tag}_{nanos}"))
            .join("settings.json")
    }

    fn store_with(tag: &str, contents: &str) -> SettingsStore {
        let path = temp_settings_path(tag);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        SettingsStore::new(path)
    }

    #[test]
    fn missing_file_loads_defaults() {
        let store = SettingsStore::new(temp_settings_path("missing"));
        assert_eq!(store.load(), KioskSettings::default());
    }

    #[test]
    fn malformed_file_loads_defaults() {
        let store = store_with("malformed", "{ \"rules\": { \"round_seconds\": ");
        assert_eq!(store.load(), KioskSettings::default());

        let store = store_with("wrong_type", r#"{"rules":{"round_seconds":"ten"}}"#);
        assert_eq!(store.load(), KioskSettings::default());
    }

    #[test]
    fn partial_file_keeps_given_fields_and_defaults_the_rest() {
        let store = store_with(
            "partial",
            r#"{"rules":{"auto_switch_ms":5000},"audio":{"mute_all":true}}"#,
        );
        let settings = store.load();
        assert_eq!(settings.rules.auto_switch, Duration::from_millis(5000));
        assert_eq!(settings.rules.round_seconds, DEFAULT_ROUND_SECONDS);
        assert_eq!(settings.rules.feedback_pulse, FEEDBACK_PULSE);
        assert!(settings.audio.mute_all);
        assert_eq!(settings.audio.master_volume, 1.0);
        assert_eq!(settings.leaderboard, LeaderboardSettings::default());
    }

    #[test]
    fn out_of_range_file_is_clamped_on_load() {
        let store = store_with(
            "clamped",
            r#"{"version":9,"rules":{"round_seconds":10000,"countdown_from":0},
                "audio":{"master_volume":4.5},
                "leaderboard":{"url":"https://scores.example.com","timeout_ms":0}}"#,
        );
        let settings = store.load();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.rules.round_seconds, MAX_ROUND_SECONDS);
        assert_eq!(settings.rules.countdown_from, 1);
        assert_eq!(settings.audio.master_volume, 1.0);
        assert_eq!(settings.leaderboard.url, None);
        assert_eq!(settings.leaderboard.timeout, MIN_DURATION);
    }

    #[test]
    fn saved_settings_load_back_sanitized() {
        let store = SettingsStore::new(temp_settings_path("round_trip"));
        let mut settings = KioskSettings::default();
        settings.rules.round_seconds = 15;
        settings.rules.leaderboard_size = 0;
        settings.audio.sfx_volume = 0.25;
        settings.leaderboard.url = Some("http://scores.local:4100/".to_string());

        let written = store.save(&settings).unwrap();
        assert_eq!(written.rules.leaderboard_size, 1);
        assert_eq!(store.load(), written);
        assert_eq!(
            store.load().leaderboard.url.as_deref(),
            Some("http://scores.local:4100")
        );
    }

    #[test]
    fn settings_path_prefers_explicit_override() {
        let store = SettingsStore::from_vars(|key| match key {
            "KNEAD_SETTINGS_PATH" => Some("/srv/kiosk/custom.json".into()),
            "XDG_CONFIG_HOME" => Some("/xdg".into()),
            _ => None,
        });
        assert_eq!(store.path(), Path::new("/srv/kiosk/custom.json"));
    }

    #[test]
    fn settings_path_falls_back_to_xdg_then_home() {
        let store = SettingsStore::from_vars(|key| match key {
            "XDG_CONFIG_HOME" => Some("/xdg".into()),
            "HOME" => Some("/home/kiosk".into()),
            _ => None,
        });
        assert_eq!(store.path(), Path::new("/xdg/knead-kiosk/settings.json"));

        let store = SettingsStore::from_vars(|key| match key {
            "HOME" => Some("/home/kiosk".into()),
            _ => None,
        });
        assert_eq!(
            store.path(),
            Path::new("/home/kiosk/.config/knead-kiosk/settings.json")
        );
    }

    #[test]
    fn only_plain_http_leaderboard_urls_are_kept() {
        for (url, kept) in [
            ("http://scores.local:4100", true),
            ("HTTP://scores.local", true),
            ("https://scores.example.com", false),
            ("scores.local:4100", false),
            ("ftp://scores", false),
        ] {
            let mut settings = KioskSettings::default();
            settings.leaderboard.url = Some(url.to_string());
            assert_eq!(
                settings.sanitized().leaderboard.url.is_some(),
                kept,
                "url {url:?}"
            );
        }
    }

    #[test]
    fn durations_are_stored_as_milliseconds() {
        let json = serde_json::to_value(GameRules::default()).unwrap();
        assert_eq!(json["auto_switch_ms"], 7000);
        assert_eq!(json["feedback_pulse_ms"], 150);
    }
}
