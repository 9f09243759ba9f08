use serde::{Deserialize, Serialize};

pub const COUNTDOWN_START: u32 = 3;
pub const DEFAULT_ROUND_SECONDS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

/// One playthrough: how many kneads and how long is left.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    id: SessionId,
    knead_count: u32,
    seconds_remaining: u32,
    round_seconds: u32,
    is_active: bool,
    submitted: bool,
}

/// What a counted tap reports back to the caller for feedback (sound/sprite).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapFeedback {
    pub knead_count: u32,
}

impl Session {
    pub fn new(id: SessionId, round_seconds: u32) -> Self {
        Self {
            id,
            knead_count: 0,
            seconds_remaining: round_seconds,
            round_seconds,
            is_active: false,
            submitted: false,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn knead_count(&self) -> u32 {
        self.knead_count
    }

    pub fn seconds_remaining(&self) -> u32 {
        self.seconds_remaining
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted
    }

    /// Fraction of the round still left, for the time gauge.
    pub fn gauge_fraction(&self) -> f32 {
        if self.round_seconds == 0 {
            return 0.0;
        }
        self.seconds_remaining as f32 / self.round_seconds as f32
    }

    pub fn activate(&mut self) {
        self.is_active = true;
    }

    /// Counts a tap. No-op (returns `None`) unless the session is active.
    pub fn register_tap(&mut self) -> Option<TapFeedback> {
        if !self.is_active {
            return None;
        }
        self.knead_count = self.knead_count.saturating_add(1);
        Some(TapFeedback {
            knead_count: self.knead_count,
        })
    }

    /// One second elapsed. Returns `true` on the tick that ends the round, at
    /// which point the session is frozen.
    pub fn tick(&mut self) -> bool {
        if !self.is_active {
            return false;
        }
        self.seconds_remaining = self.seconds_remaining.saturating_sub(1);
        if self.seconds_remaining == 0 {
            self.is_active = false;
            return true;
        }
        false
    }

    /// Marks the score as handed to the leaderboard. Returns `false` when it
    /// already was, so callers can submit at most once per session.
    pub fn mark_submitted(&mut self) -> bool {
        if self.submitted {
            return false;
        }
        self.submitted = true;
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountdownState {
    ticks_remaining: u32,
}

impl Default for CountdownState {
    fn default() -> Self {
        Self::new(COUNTDOWN_START)
    }
}

impl CountdownState {
    pub fn new(start_value: u32) -> Self {
        Self {
            ticks_remaining: start_value,
        }
    }

    pub fn ticks_remaining(&self) -> u32 {
        self.ticks_remaining
    }

    /// Returns `true` on the tick that reaches zero.
    pub fn tick(&mut self) -> bool {
        self.ticks_remaining = self.ticks_remaining.saturating_sub(1);
        self.ticks_remaining == 0
    }
}
