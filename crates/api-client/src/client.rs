use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::cookie::{CookieStore, Jar};
use serde::Serialize;

use gatehouse_api::*;

/// Typed HTTP client for the gatehouse API.
///
/// Each client owns a cookie jar, so it behaves like one browser: a
/// successful [`ApiClient::login`] stores the `session_id` cookie and later
/// calls send it back. Use separate clients for separate users.
pub struct ApiClient {
    client: reqwest::Client,
    jar: Arc<Jar>,
    base_url: String,
}

impl ApiClient {
    /// Create a new client with the given base URL and timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .cookie_provider(jar.clone())
            .build()?;
        Ok(Self {
            client,
            jar,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Access the underlying `reqwest::Client` (shares the cookie jar).
    pub fn reqwest_client(&self) -> &reqwest::Client {
        &self.client
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    fn cookie_url(&self) -> Result<reqwest::Url> {
        reqwest::Url::parse(&self.base_url)
            .with_context(|| format!("invalid base URL {}", self.base_url))
    }

    /// Current `session_id` cookie value, if the jar holds one.
    pub fn session_token(&self) -> Option<String> {
        let url = self.cookie_url().ok()?;
        let header = self.jar.cookies(&url)?;
        header
            .to_str()
            .ok()?
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == SESSION_COOKIE_NAME)
            .map(|(_, value)| value.to_string())
            .filter(|value| !value.is_empty())
    }

    /// Put an arbitrary `session_id` into the jar, e.g. a stale token.
    pub fn set_session_token(&self, token: &str) -> Result<()> {
        let url = self.cookie_url()?;
        self.jar
            .add_cookie_str(&format!("{SESSION_COOKIE_NAME}={token}; Path=/"), &url);
        Ok(())
    }

    // ── Health ────────────────────────────────────────────────────────────

    pub async fn health(&self) -> Result<HealthResponse> {
        let resp = self.client.get(self.url("/health")).send().await?;
        parse_response(resp).await
    }

    // ── Auth ──────────────────────────────────────────────────────────────

    pub async fn register(&self, req: &RegisterRequest) -> Result<MessageResponse> {
        let resp = self.post_json_raw("/auth/register", req).await?;
        parse_response(resp).await
    }

    pub async fn login(&self, req: &LoginRequest) -> Result<LoginResponse> {
        let resp = self.post_json_raw("/auth/login", req).await?;
        parse_response(resp).await
    }

    /// `Ok(None)` when the server sees no live session.
    pub async fn me(&self) -> Result<Option<UserInfo>> {
        let resp = self.get_raw("/auth/me").await?;
        let body: MeResponse = parse_response(resp).await?;
        Ok(body.user)
    }

    pub async fn logout(&self) -> Result<MessageResponse> {
        let resp = self.client.post(self.url("/auth/logout")).send().await?;
        parse_response(resp).await
    }

    // ── Raw helpers (for E2E / advanced usage) ────────────────────────────

    /// GET returning the raw response.
    pub async fn get_raw(&self, path: &str) -> Result<reqwest::Response> {
        Ok(self.client.get(self.url(path)).send().await?)
    }

    /// POST with JSON body returning the raw response.
    pub async fn post_json_raw<T: Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response> {
        Ok(self.client.post(self.url(path)).json(body).send().await?)
    }
}

/// Parse an HTTP response: return the deserialized body on 2xx,
/// or an error containing the status and body text.
async fn parse_response<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("{status}: {body}");
    }
    Ok(resp.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_nested_under_api() {
        let api = ApiClient::new("http://localhost:3000/", Duration::from_secs(5)).unwrap();
        assert_eq!(api.base_url(), "http://localhost:3000");
        assert_eq!(api.url("/auth/me"), "http://localhost:3000/api/auth/me");
    }

    #[test]
    fn session_token_round_trips_through_the_jar() {
        let api = ApiClient::new("http://localhost:3000", Duration::from_secs(5)).unwrap();
        assert_eq!(api.session_token(), None);

        api.set_session_token("abc").unwrap();
        assert_eq!(api.session_token().as_deref(), Some("abc"));
    }
}
