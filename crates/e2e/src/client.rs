use std::time::Duration;

use anyhow::{Result, anyhow};
use uuid::Uuid;

use gatehouse_api::{LoginRequest, LoginResponse, RegisterRequest};
use gatehouse_api_client::ApiClient;

const TIMEOUT: Duration = Duration::from_secs(30);

/// Holds connection info for a test run.
pub struct TestContext {
    pub api: ApiClient,
}

/// A registered test user with credentials.
#[derive(Debug, Clone)]
pub struct TestUser {
    pub email: String,
    pub password: String,
}

impl TestUser {
    pub fn login_request(&self) -> LoginRequest {
        LoginRequest {
            email: self.email.clone(),
            password: self.password.clone(),
        }
    }
}

impl TestContext {
    pub fn new(base_url: String) -> Result<Self> {
        Ok(Self {
            api: ApiClient::new(&base_url, TIMEOUT)?,
        })
    }

    /// A client with its own, empty cookie jar.
    pub fn fresh_client(&self) -> Result<ApiClient> {
        ApiClient::new(self.api.base_url(), TIMEOUT)
    }

    /// Build a full API URL from a path like `/health`.
    pub fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.api.base_url(), path)
    }

    pub fn unique_email(&self) -> String {
        format!("test-{}@e2e.local", Uuid::new_v4())
    }

    /// Register a fresh user with a unique email and no invite code.
    pub async fn register_user(&self) -> Result<TestUser> {
        let user = TestUser {
            email: self.unique_email(),
            password: "testpass99".to_string(),
        };

        let resp = self
            .api
            .post_json_raw(
                "/auth/register",
                &RegisterRequest {
                    email: user.email.clone(),
                    password: user.password.clone(),
                    invite_code: None,
                },
            )
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("register failed ({status}): {body}"));
        }
        Ok(user)
    }

    /// Register a fresh user and log in with a dedicated client.
    pub async fn login_user(&self) -> Result<(ApiClient, TestUser, LoginResponse)> {
        let user = self.register_user().await?;
        let client = self.fresh_client()?;
        let login = client.login(&user.login_request()).await?;
        Ok((client, user, login))
    }
}
