use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

pub const EMOJI_PALETTE: [&str; 10] = ["🍞", "🥐", "🥖", "🥨", "🥯", "🧁", "🍩", "🥞", "🧇", "🥧"];

pub const WORD_PALETTE: [&str; 12] = [
    "Quokka",
    "Baker",
    "Dough",
    "Crumb",
    "Sourdough",
    "Brioche",
    "Pretzel",
    "Bagel",
    "Focaccia",
    "Ciabatta",
    "Muffin",
    "Scone",
];

pub const NUMBER_MIN: u16 = 1000;
pub const NUMBER_MAX: u16 = 9999;

/// Anonymized display names for leaderboard rows: `"<emoji> <word> #<number>"`.
///
/// Every call draws a fresh name; nothing ties it to the player.
#[derive(Debug, Clone)]
pub struct NicknameGenerator<R = StdRng> {
    rng: R,
}

impl NicknameGenerator<StdRng> {
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> NicknameGenerator<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    pub fn generate(&mut self) -> String {
        let emoji = EMOJI_PALETTE.choose(&mut self.rng).copied().unwrap_or("🍞");
        let word = WORD_PALETTE.choose(&mut self.rng).copied().unwrap_or("Baker");
        let number = self.rng.gen_range(NUMBER_MIN..=NUMBER_MAX);
        format!("{emoji} {word} #{number}")
    }
}
