use std::{env, net::SocketAddr};

use anyhow::{Context, Result};

use kneading::leaderboard::MemoryLeaderboard;
use kneading::leaderboard_api::router;
use kneading::logging::init_tracing;

const DEFAULT_ADDR: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
    4100,
);

fn resolve_leaderboard_addr<F>(mut get_env: F) -> SocketAddr
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(addr) = get_env("KNEAD_LEADERBOARD_ADDR").and_then(|v| v.parse().ok()) {
        return addr;
    }

    if let Some(port) = get_env("KNEAD_LEADERBOARD_PORT").and_then(|v| v.parse::<u16>().ok()) {
        return SocketAddr::from(([127, 0, 0, 1], port));
    }

    DEFAULT_ADDR
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("info");

    let app = router(MemoryLeaderboard::new());
    let addr = resolve_leaderboard_addr(|k| env::var(k).ok());
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind leaderboard service on {addr}"))?;
    tracing::info!("leaderboard service listening on http://{addr}");

    axum::serve(listener, app)
        .await
        .context("leaderboard service stopped unexpectedly")?;
    Ok(())
}
