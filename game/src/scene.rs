use serde::{Deserialize, Serialize};

use crate::entry::{EntryForm, Player, ValidationError};
use crate::session::{CountdownState, Session, SessionId, TapFeedback};

/// Which scene is showing, without its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SceneKind {
    Start,
    Leaderboard,
    Entry,
    Countdown,
    Play,
    Result,
}

impl SceneKind {
    /// Scenes that idle-alternate with each other.
    pub fn is_attract(self) -> bool {
        matches!(self, SceneKind::Start | SceneKind::Leaderboard)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SubmissionStatus {
    Pending,
    Stored,
    Failed { reason: String },
}

/// The kiosk's top-level mode. Scene-scoped data only exists inside the
/// variant that owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scene", rename_all = "camelCase")]
pub enum Scene {
    Start,
    Leaderboard,
    Entry {
        form: EntryForm,
        error: Option<ValidationError>,
    },
    Countdown {
        player: Player,
        countdown: CountdownState,
        session: Session,
    },
    Play {
        player: Player,
        session: Session,
    },
    Result {
        player: Player,
        session: Session,
        submission: SubmissionStatus,
    },
}

impl Default for Scene {
    fn default() -> Self {
        Self::Start
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SceneEvent {
    /// A tap/click anywhere on screen.
    Interact,
    SubmitForm(EntryForm),
    AutoSwitchElapsed,
    CountdownTick,
    PlayTick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneEffect {
    None,
    Feedback(TapFeedback),
    Rejected(ValidationError),
    /// The round just ended; its score must be submitted once.
    SubmitScore,
}

/// Inputs the transition function needs but does not own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneContext {
    pub countdown_from: u32,
    pub round_seconds: u32,
    /// Id for the session created if this event starts a countdown.
    pub next_session: SessionId,
}

impl Scene {
    pub fn entry() -> Self {
        Scene::Entry {
            form: EntryForm::default(),
            error: None,
        }
    }

    /// Pure transition function for the kiosk scene machine.
    ///
    /// Timers and gateway calls are the caller's job; this only reports what
    /// happened via `SceneEffect`.
    pub fn handle(self, event: SceneEvent, ctx: &SceneContext) -> (Scene, SceneEffect) {
        match (self, event) {
            (Scene::Start | Scene::Leaderboard | Scene::Result { .. }, SceneEvent::Interact) => {
                (Scene::entry(), SceneEffect::None)
            }

            (Scene::Start, SceneEvent::AutoSwitchElapsed) => {
                (Scene::Leaderboard, SceneEffect::None)
            }
            (Scene::Leaderboard, SceneEvent::AutoSwitchElapsed) => {
                (Scene::Start, SceneEffect::None)
            }

            (Scene::Entry { .. }, SceneEvent::SubmitForm(form)) => match form.validate() {
                Ok(player) => (
                    Scene::Countdown {
                        player,
                        countdown: CountdownState::new(ctx.countdown_from),
                        session: Session::new(ctx.next_session, ctx.round_seconds),
                    },
                    SceneEffect::None,
                ),
                Err(error) => (
                    Scene::Entry {
                        form,
                        error: Some(error),
                    },
                    SceneEffect::Rejected(error),
                ),
            },

            (
                Scene::Countdown {
                    player,
                    mut countdown,
                    mut session,
                },
                SceneEvent::CountdownTick,
            ) => {
                if countdown.tick() {
                    session.activate();
                    (Scene::Play { player, session }, SceneEffect::None)
                } else {
                    (
                        Scene::Countdown {
                            player,
                            countdown,
                            session,
                        },
                        SceneEffect::None,
                    )
                }
            }

            (Scene::Play { player, mut session }, SceneEvent::Interact) => {
                let effect = match session.register_tap() {
                    Some(feedback) => SceneEffect::Feedback(feedback),
                    None => SceneEffect::None,
                };
                (Scene::Play { player, session }, effect)
            }
            (Scene::Play { player, mut session }, SceneEvent::PlayTick) => {
                if session.tick() {
                    (
                        Scene::Result {
                            player,
                            session,
                            submission: SubmissionStatus::Pending,
                        },
                        SceneEffect::SubmitScore,
                    )
                } else {
                    (Scene::Play { player, session }, SceneEffect::None)
                }
            }

            // Ignore irrelevant events in the current state.
            (state, _) => (state, SceneEffect::None),
        }
    }

    pub fn kind(&self) -> SceneKind {
        match self {
            Scene::Start => SceneKind::Start,
            Scene::Leaderboard => SceneKind::Leaderboard,
            Scene::Entry { .. } => SceneKind::Entry,
            Scene::Countdown { .. } => SceneKind::Countdown,
            Scene::Play { .. } => SceneKind::Play,
            Scene::Result { .. } => SceneKind::Result,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            Scene::Countdown { session, .. }
            | Scene::Play { session, .. }
            | Scene::Result { session, .. } => Some(session),
            _ => None,
        }
    }

    pub fn countdown(&self) -> Option<&CountdownState> {
        match self {
            Scene::Countdown { countdown, .. } => Some(countdown),
            _ => None,
        }
    }

    pub fn entry_form(&self) -> Option<&EntryForm> {
        match self {
            Scene::Entry { form, .. } => Some(form),
            _ => None,
        }
    }

    pub fn entry_error(&self) -> Option<ValidationError> {
        match self {
            Scene::Entry { error, .. } => *error,
            _ => None,
        }
    }

    pub fn submission(&self) -> Option<&SubmissionStatus> {
        match self {
            Scene::Result { submission, .. } => Some(submission),
            _ => None,
        }
    }
}
