pub mod entry;
pub mod http_gateway;
pub mod kiosk;
pub mod leaderboard;
pub mod leaderboard_api;
pub mod logging;
pub mod nickname;
pub mod runtime;
pub mod scene;
pub mod serde_duration;
pub mod session;
pub mod settings;
pub mod sfx;
