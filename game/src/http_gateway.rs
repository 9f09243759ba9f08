use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{ACCEPT, CONTENT_TYPE};
use hyper::{Method, Request};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;

use crate::leaderboard::{GatewayError, LeaderboardEntry, LeaderboardGateway, ScoreSubmission};
use crate::settings::DEFAULT_REQUEST_TIMEOUT;

pub const LEADERBOARD_PATH: &str = "/api/leaderboard";

/// Leaderboard gateway speaking JSON over HTTP/1.
#[derive(Debug, Clone)]
pub struct HttpLeaderboard {
    base_url: String,
    timeout: Duration,
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HttpLeaderboard {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, query: Option<String>) -> String {
        match query {
            Some(query) => format!("{}{LEADERBOARD_PATH}?{query}", self.base_url),
            None => format!("{}{LEADERBOARD_PATH}", self.base_url),
        }
    }

    async fn send(
        &self,
        method: Method,
        uri: String,
        body: Option<Vec<u8>>,
    ) -> Result<Bytes, GatewayError> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(ACCEPT, "application/json");
        if body.is_some() {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        let request = builder
            .body(Full::new(Bytes::from(body.unwrap_or_default())))
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let exchange = async {
            let response = self
                .client
                .request(request)
                .await
                .map_err(|e| GatewayError::Transport(e.to_string()))?;
            let status = response.status();
            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| GatewayError::Transport(e.to_string()))?
                .to_bytes();
            Ok::<_, GatewayError>((status, body))
        };

        let (status, body) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| GatewayError::Timeout)??;

        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).trim().to_string(),
            });
        }
        Ok(body)
    }
}

impl LeaderboardGateway for HttpLeaderboard {
    async fn fetch_top(&self, n: usize) -> Result<Vec<LeaderboardEntry>, GatewayError> {
        let body = self
            .send(Method::GET, self.endpoint(Some(format!("limit={n}"))), None)
            .await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn insert(&self, submission: ScoreSubmission) -> Result<(), GatewayError> {
        let payload = serde_json::to_vec(&submission)?;
        self.send(Method::POST, self.endpoint(None), Some(payload))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_dropped() {
        let gateway = HttpLeaderboard::new("http://127.0.0.1:4100/");
        assert_eq!(gateway.base_url(), "http://127.0.0.1:4100");
        assert_eq!(
            gateway.endpoint(Some("limit=5".to_string())),
            "http://127.0.0.1:4100/api/leaderboard?limit=5"
        );
        assert_eq!(gateway.endpoint(None), "http://127.0.0.1:4100/api/leaderboard");
    }

    #[tokio::test]
    async fn unreachable_service_is_a_transport_error() {
        // Port 9 (discard) is reserved; nothing listens there in CI.
        let gateway = HttpLeaderboard::new("http://127.0.0.1:9")
            .with_timeout(Duration::from_secs(2));
        let err = gateway.fetch_top(5).await.unwrap_err();
        assert!(
            matches!(err, GatewayError::Transport(_) | GatewayError::Timeout),
            "unexpected error: {err}"
        );
    }
}
