use std::time::Duration;

use chrono::Utc;
use engine::timer::{Fired, TimerService};
use rand::Rng;
use rand::rngs::StdRng;
use serde::Serialize;

use crate::entry::{EntryForm, ValidationError};
use crate::leaderboard::{GatewayError, LeaderboardCache, LeaderboardEntry, ScoreSubmission};
use crate::nickname::NicknameGenerator;
use crate::scene::{Scene, SceneContext, SceneEffect, SceneEvent, SceneKind, SubmissionStatus};
use crate::session::SessionId;
use crate::settings::{AudioSettings, GameRules, KioskSettings};
use crate::sfx::Cue;

/// One pending timer per purpose at most.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerPurpose {
    AutoSwitch,
    CountdownTick,
    PlayTick,
    FeedbackPulse,
}

impl TimerPurpose {
    pub fn valid_in(self, scene: SceneKind) -> bool {
        match self {
            TimerPurpose::AutoSwitch => scene.is_attract(),
            TimerPurpose::CountdownTick => scene == SceneKind::Countdown,
            TimerPurpose::PlayTick | TimerPurpose::FeedbackPulse => scene == SceneKind::Play,
        }
    }

    fn event(self) -> Option<SceneEvent> {
        match self {
            TimerPurpose::AutoSwitch => Some(SceneEvent::AutoSwitchElapsed),
            TimerPurpose::CountdownTick => Some(SceneEvent::CountdownTick),
            TimerPurpose::PlayTick => Some(SceneEvent::PlayTick),
            // The pulse only drives the pose; its expiry is not a scene event.
            TimerPurpose::FeedbackPulse => None,
        }
    }
}

/// What the kiosk asks of the outside world after handling an input.
#[derive(Debug, Clone, PartialEq)]
pub enum KioskOutput {
    SceneChanged {
        from: SceneKind,
        to: SceneKind,
    },
    Feedback {
        knead_count: u32,
        volume: f32,
    },
    /// A sound the audio layer should play, volume already scaled.
    Cue {
        cue: Cue,
        volume: f32,
    },
    Rejected(ValidationError),
    /// Insert the score, then refresh the top list regardless of the outcome.
    Submit {
        session: SessionId,
        submission: ScoreSubmission,
        refresh_limit: usize,
    },
    Refresh {
        limit: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Pose {
    Idle,
    Kneading,
}

/// Everything the rendering layer needs for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KioskSnapshot {
    pub scene: SceneKind,
    pub entry_form: Option<EntryForm>,
    pub entry_error: Option<String>,
    pub countdown: Option<u32>,
    pub knead_count: Option<u32>,
    pub seconds_remaining: Option<u32>,
    pub gauge: Option<f32>,
    pub pose: Pose,
    pub submission: Option<SubmissionStatus>,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub elapsed_ms: u64,
}

/// The scene machine plus the timers and caches it drives.
///
/// Time is virtual: callers move it forward with [`Kiosk::advance`] or
/// [`Kiosk::advance_to`], so the whole flow is deterministic under test. Every
/// method returns the outputs the caller must act on, in order.
#[derive(Debug)]
pub struct Kiosk<R = StdRng> {
    scene: Scene,
    rules: GameRules,
    sfx_gain: f32,
    timers: TimerService<TimerPurpose>,
    leaderboard: LeaderboardCache,
    nicknames: NicknameGenerator<R>,
    next_session: u64,
}

impl Kiosk<StdRng> {
    pub fn from_settings(settings: &KioskSettings) -> Self {
        Self::new(
            settings.rules,
            settings.audio,
            NicknameGenerator::from_entropy(),
        )
    }
}

impl<R: Rng> Kiosk<R> {
    pub fn new(rules: GameRules, audio: AudioSettings, nicknames: NicknameGenerator<R>) -> Self {
        let rules = rules.clamp();
        let mut timers = TimerService::new();
        timers.after(TimerPurpose::AutoSwitch, rules.auto_switch);

        Self {
            scene: Scene::Start,
            rules,
            sfx_gain: audio.clamp().effective_sfx_gain(),
            timers,
            leaderboard: LeaderboardCache::default(),
            nicknames,
            next_session: 1,
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn leaderboard(&self) -> &LeaderboardCache {
        &self.leaderboard
    }

    pub fn timers(&self) -> &TimerService<TimerPurpose> {
        &self.timers
    }

    pub fn now(&self) -> Duration {
        self.timers.now()
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.next_deadline()
    }

    /// A tap or click anywhere.
    pub fn interact(&mut self) -> Vec<KioskOutput> {
        let mut out = Vec::new();
        self.apply(SceneEvent::Interact, &mut out);
        out
    }

    pub fn submit_form(&mut self, form: EntryForm) -> Vec<KioskOutput> {
        let mut out = Vec::new();
        self.apply(SceneEvent::SubmitForm(form), &mut out);
        out
    }

    pub fn advance(&mut self, dt: Duration) -> Vec<KioskOutput> {
        self.advance_to(self.timers.now().saturating_add(dt))
    }

    /// Fires every timer due up to `until`, one at a time and in deadline
    /// order, so each firing sees the state left by the previous one.
    pub fn advance_to(&mut self, until: Duration) -> Vec<KioskOutput> {
        let mut out = Vec::new();
        while let Some(fired) = self.timers.pop_due(until) {
            self.on_timer(fired, &mut out);
        }
        self.timers.settle(until);
        out
    }

    /// Hands the finished round to the leaderboard. Only the first call per
    /// session produces a submission; later calls (or calls outside the
    /// Result scene) return `None`.
    pub fn ensure_submitted(&mut self) -> Option<KioskOutput> {
        let Scene::Result {
            player, session, ..
        } = &mut self.scene
        else {
            return None;
        };
        if !session.mark_submitted() {
            return None;
        }

        let submission = ScoreSubmission {
            name: player.name().to_string(),
            phone: player.phone().to_string(),
            email: player.email().to_string(),
            score: session.knead_count(),
            nickname: self.nicknames.generate(),
            submitted_at: Utc::now(),
        };
        tracing::info!(
            session = session.id().0,
            score = submission.score,
            nickname = %submission.nickname,
            "submitting score"
        );

        Some(KioskOutput::Submit {
            session: session.id(),
            submission,
            refresh_limit: self.rules.leaderboard_size,
        })
    }

    /// Outcome of a score insert. Only updates the Result scene if it still
    /// shows that same session.
    pub fn on_insert_result(&mut self, session: SessionId, result: Result<(), GatewayError>) {
        if let Err(err) = &result {
            tracing::warn!(session = session.0, error = %err, "score insert failed");
        }

        if let Scene::Result {
            session: shown,
            submission,
            ..
        } = &mut self.scene
        {
            if shown.id() == session {
                *submission = match result {
                    Ok(()) => SubmissionStatus::Stored,
                    Err(err) => SubmissionStatus::Failed {
                        reason: err.to_string(),
                    },
                };
            }
        }
    }

    /// Outcome of a top-N fetch. Touches the cache only, never the scene.
    /// Returns `true` if the cached list was replaced.
    pub fn on_leaderboard(&mut self, fetched: Result<Vec<LeaderboardEntry>, GatewayError>) -> bool {
        let applied = self.leaderboard.apply(fetched);
        if applied {
            tracing::debug!(
                entries = self.leaderboard.entries().len(),
                "leaderboard refreshed"
            );
        }
        applied
    }

    pub fn snapshot(&self) -> KioskSnapshot {
        let session = self.scene.session();
        let pose = if self.timers.is_armed(TimerPurpose::FeedbackPulse) {
            Pose::Kneading
        } else {
            Pose::Idle
        };

        KioskSnapshot {
            scene: self.scene.kind(),
            entry_form: self.scene.entry_form().cloned(),
            entry_error: self.scene.entry_error().map(|e| e.to_string()),
            countdown: self.scene.countdown().map(|c| c.ticks_remaining()),
            knead_count: session.map(|s| s.knead_count()),
            seconds_remaining: session.map(|s| s.seconds_remaining()),
            gauge: session.map(|s| s.gauge_fraction()),
            pose,
            submission: self.scene.submission().cloned(),
            leaderboard: self.leaderboard.entries().to_vec(),
            elapsed_ms: u64::try_from(self.timers.now().as_millis()).unwrap_or(u64::MAX),
        }
    }

    fn on_timer(&mut self, fired: Fired<TimerPurpose>, out: &mut Vec<KioskOutput>) {
        let scene = self.scene.kind();
        if !fired.purpose.valid_in(scene) {
            // Scene changes cancel invalid timers, so this means a bug upstream.
            tracing::error!(purpose = ?fired.purpose, ?scene, "stale timer fired; ignoring");
            debug_assert!(false, "{:?} fired in {:?}", fired.purpose, scene);
            return;
        }
        if let Some(event) = fired.purpose.event() {
            self.apply(event, out);
        }
    }

    fn apply(&mut self, event: SceneEvent, out: &mut Vec<KioskOutput>) {
        let from = self.scene.kind();
        let countdown_tick = event == SceneEvent::CountdownTick;
        let ctx = SceneContext {
            countdown_from: self.rules.countdown_from,
            round_seconds: self.rules.round_seconds,
            next_session: SessionId(self.next_session),
        };

        let (scene, effect) = std::mem::take(&mut self.scene).handle(event, &ctx);
        self.scene = scene;

        let to = self.scene.kind();
        if from != to {
            self.enter(from, to, out);
        } else if countdown_tick && to == SceneKind::Countdown {
            out.push(self.cue(Cue::CountdownBeep));
        }

        match effect {
            SceneEffect::None => {}
            SceneEffect::Feedback(feedback) => {
                self.timers
                    .after(TimerPurpose::FeedbackPulse, self.rules.feedback_pulse);
                out.push(KioskOutput::Feedback {
                    knead_count: feedback.knead_count,
                    volume: Cue::Knead.volume(self.sfx_gain),
                });
            }
            SceneEffect::Rejected(error) => {
                tracing::debug!(%error, "entry form rejected");
                out.push(KioskOutput::Rejected(error));
            }
            SceneEffect::SubmitScore => {
                if let Some(submit) = self.ensure_submitted() {
                    out.push(submit);
                }
            }
        }
    }

    fn cue(&self, cue: Cue) -> KioskOutput {
        KioskOutput::Cue {
            cue,
            volume: cue.volume(self.sfx_gain),
        }
    }

    fn enter(&mut self, from: SceneKind, to: SceneKind, out: &mut Vec<KioskOutput>) {
        let cancelled = self.timers.retain(|purpose| purpose.valid_in(to));

        match to {
            SceneKind::Start | SceneKind::Leaderboard => {
                self.timers
                    .after(TimerPurpose::AutoSwitch, self.rules.auto_switch);
            }
            SceneKind::Countdown => {
                self.next_session += 1;
                self.timers.every_second(TimerPurpose::CountdownTick);
            }
            SceneKind::Play => {
                self.timers.every_second(TimerPurpose::PlayTick);
                tracing::info!("round started");
            }
            SceneKind::Result => {
                let score = self.scene.session().map(|s| s.knead_count());
                tracing::info!(?score, "round over");
            }
            SceneKind::Entry => {}
        }

        tracing::debug!(?from, ?to, ?cancelled, "scene changed");
        out.push(KioskOutput::SceneChanged { from, to });

        match to {
            SceneKind::Countdown => out.push(self.cue(Cue::CountdownBeep)),
            SceneKind::Result => out.push(self.cue(Cue::RoundOver)),
            _ => {}
        }

        if to == SceneKind::Leaderboard {
            out.push(KioskOutput::Refresh {
                limit: self.rules.leaderboard_size,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kiosk() -> Kiosk {
        Kiosk::new(
            GameRules::default(),
            AudioSettings::default(),
            NicknameGenerator::seeded(3),
        )
    }

    fn play(kiosk: &mut Kiosk) {
        kiosk.interact();
        kiosk.submit_form(EntryForm::new("Ada", "555-0100", "ada@example.com", true));
        kiosk.advance(Duration::from_secs(3));
        assert_eq!(kiosk.scene().kind(), SceneKind::Play);
    }

    #[test]
    fn starts_on_start_with_auto_switch_armed() {
        let k = kiosk();
        assert_eq!(k.scene().kind(), SceneKind::Start);
        assert!(k.timers().is_armed(TimerPurpose::AutoSwitch));
        assert_eq!(k.next_deadline(), Some(Duration::from_secs(7)));
    }

    #[test]
    fn timer_purposes_are_scene_scoped() {
        assert!(TimerPurpose::AutoSwitch.valid_in(SceneKind::Leaderboard));
        assert!(!TimerPurpose::AutoSwitch.valid_in(SceneKind::Entry));
        assert!(!TimerPurpose::PlayTick.valid_in(SceneKind::Countdown));
        assert!(!TimerPurpose::CountdownTick.valid_in(SceneKind::Play));
        assert!(!TimerPurpose::FeedbackPulse.valid_in(SceneKind::Result));
    }

    #[test]
    fn feedback_pulse_sets_pose_until_it_expires() {
        let mut k = kiosk();
        play(&mut k);

        let out = k.interact();
        assert!(matches!(
            out.as_slice(),
            [KioskOutput::Feedback { knead_count: 1, .. }]
        ));
        assert_eq!(k.snapshot().pose, Pose::Kneading);

        k.advance(Duration::from_millis(149));
        assert_eq!(k.snapshot().pose, Pose::Kneading);
        k.advance(Duration::from_millis(1));
        assert_eq!(k.snapshot().pose, Pose::Idle);
    }

    #[test]
    fn muted_audio_zeroes_feedback_volume() {
        let mut k = Kiosk::new(
            GameRules::default(),
            AudioSettings {
                mute_all: true,
                ..AudioSettings::default()
            },
            NicknameGenerator::seeded(3),
        );
        play(&mut k);
        match k.interact().as_slice() {
            [KioskOutput::Feedback { volume, .. }] => assert_eq!(*volume, 0.0),
            other => panic!("expected feedback, got {other:?}"),
        }
    }

    fn cues(outputs: &[KioskOutput]) -> Vec<Cue> {
        outputs
            .iter()
            .filter_map(|o| match o {
                KioskOutput::Cue { cue, .. } => Some(*cue),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn countdown_beeps_once_per_number_then_round_over_plays_once() {
        let mut k = kiosk();
        k.interact();
        let mut out = k.submit_form(EntryForm::new("Ada", "555-0100", "ada@example.com", true));
        out.extend(k.advance(Duration::from_secs(3)));
        assert_eq!(cues(&out), vec![Cue::CountdownBeep; 3]);

        let out = k.advance(Duration::from_secs(10));
        assert_eq!(cues(&out), vec![Cue::RoundOver]);
        let Some(KioskOutput::Cue { volume, .. }) =
            out.iter().find(|o| matches!(o, KioskOutput::Cue { .. }))
        else {
            panic!("expected a round-over cue");
        };
        assert_eq!(*volume, Cue::RoundOver.base_volume());
    }

    #[test]
    fn from_settings_applies_rules_and_audio() {
        let mut settings = KioskSettings::default();
        settings.rules.auto_switch = Duration::from_secs(3);
        settings.rules.round_seconds = 20;
        settings.audio.mute_all = true;
        let mut k = Kiosk::from_settings(&settings);
        assert_eq!(k.next_deadline(), Some(Duration::from_secs(3)));

        play(&mut k);
        assert_eq!(k.snapshot().seconds_remaining, Some(20));
        assert!(matches!(
            k.interact().as_slice(),
            [KioskOutput::Feedback { volume, .. }] if *volume == 0.0
        ));
    }

    #[test]
    fn ensure_submitted_is_none_outside_result() {
        let mut k = kiosk();
        assert_eq!(k.ensure_submitted(), None);
        play(&mut k);
        assert_eq!(k.ensure_submitted(), None);
    }
}
