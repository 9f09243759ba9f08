pub mod timer;

pub use timer::{Cadence, Fired, TimerHandle, TimerService};
