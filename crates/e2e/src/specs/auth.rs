use anyhow::{Result, ensure};
use serde_json::json;
use tokio::task::JoinSet;

use gatehouse_api::{LoginRequest, RegisterRequest};

use crate::client::TestContext;

/// POST /api/auth/register without a code → 201.
pub async fn register_without_invite_code(ctx: &TestContext) -> Result<()> {
    let resp = ctx
        .api
        .post_json_raw(
            "/auth/register",
            &RegisterRequest {
                email: ctx.unique_email(),
                password: "testpass99".into(),
                invite_code: None,
            },
        )
        .await?;
    ensure!(resp.status() == 201, "expected 201, got {}", resp.status());
    let body: serde_json::Value = resp.json().await?;
    ensure!(
        body == json!({"message": "Register success"}),
        "unexpected body {body}"
    );
    Ok(())
}

/// Same email → 409.
pub async fn register_duplicate_email(ctx: &TestContext) -> Result<()> {
    let user = ctx.register_user().await?;
    let resp = ctx
        .api
        .post_json_raw(
            "/auth/register",
            &RegisterRequest {
                email: user.email.clone(),
                password: "another-pass".into(),
                invite_code: None,
            },
        )
        .await?;
    ensure!(resp.status() == 409, "expected 409, got {}", resp.status());
    let body: serde_json::Value = resp.json().await?;
    ensure!(body["error"] == "email already exists", "unexpected body {body}");

    // The first password still works.
    ctx.fresh_client()?.login(&user.login_request()).await?;
    Ok(())
}

/// Unknown code → 400, and the email stays free.
pub async fn register_unknown_invite_code(ctx: &TestContext) -> Result<()> {
    let email = ctx.unique_email();
    let resp = ctx
        .api
        .post_json_raw(
            "/auth/register",
            &RegisterRequest {
                email: email.clone(),
                password: "testpass99".into(),
                invite_code: Some(format!("NOPE-{}", uuid::Uuid::new_v4())),
            },
        )
        .await?;
    ensure!(resp.status() == 400, "expected 400, got {}", resp.status());
    let body: serde_json::Value = resp.json().await?;
    ensure!(body["error"] == "invalid invite code", "unexpected body {body}");

    let resp = ctx
        .api
        .post_json_raw(
            "/auth/register",
            &RegisterRequest {
                email,
                password: "testpass99".into(),
                invite_code: Some("   ".into()),
            },
        )
        .await?;
    ensure!(
        resp.status() == 201,
        "blank code should fall back to the default, got {}",
        resp.status()
    );
    Ok(())
}

/// Bad email, empty password, malformed JSON → 400.
pub async fn register_invalid_input(ctx: &TestContext) -> Result<()> {
    for body in [
        json!({"email": "no-at-sign", "password": "testpass99"}),
        json!({"email": ctx.unique_email(), "password": ""}),
        json!({"email": ctx.unique_email()}),
    ] {
        let resp = ctx.api.post_json_raw("/auth/register", &body).await?;
        ensure!(
            resp.status() == 400,
            "expected 400 for {body}, got {}",
            resp.status()
        );
        let err: serde_json::Value = resp.json().await?;
        ensure!(err["error"].is_string(), "expected error message for {body}");
    }
    Ok(())
}

/// Parallel registrations without a code all succeed.
pub async fn register_concurrently_with_default_code(ctx: &TestContext) -> Result<()> {
    let mut set = JoinSet::new();
    for _ in 0..5 {
        let client = ctx.fresh_client()?;
        let email = ctx.unique_email();
        set.spawn(async move {
            client
                .register(&RegisterRequest {
                    email,
                    password: "testpass99".into(),
                    invite_code: None,
                })
                .await
        });
    }
    while let Some(result) = set.join_next().await {
        result??;
    }
    Ok(())
}

/// Successful login returns the user and an HttpOnly session cookie.
pub async fn login_sets_session_cookie(ctx: &TestContext) -> Result<()> {
    let user = ctx.register_user().await?;
    let resp = ctx
        .fresh_client()?
        .post_json_raw("/auth/login", &user.login_request())
        .await?;
    ensure!(resp.status() == 200, "expected 200, got {}", resp.status());

    let cookie = resp
        .headers()
        .get(reqwest::header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("missing Set-Cookie"))?;
    ensure!(cookie.starts_with("session_id="), "unexpected cookie {cookie}");
    for attr in ["HttpOnly", "SameSite=Lax", "Path=/", "Max-Age="] {
        ensure!(cookie.contains(attr), "cookie lacks {attr}: {cookie}");
    }
    ensure!(!cookie.contains("Max-Age=0;"), "login cookie must not expire");

    let body: serde_json::Value = resp.json().await?;
    ensure!(body["message"] == "Login success", "unexpected body {body}");
    ensure!(body["email"] == user.email.as_str(), "unexpected body {body}");
    ensure!(body["user_id"].is_i64(), "expected integer user_id");
    ensure!(body.get("session_id").is_none(), "token must not be in the body");
    Ok(())
}

/// Unknown email and wrong password both give the same 401.
pub async fn login_failures_are_indistinguishable(ctx: &TestContext) -> Result<()> {
    let user = ctx.register_user().await?;

    let wrong_password = ctx
        .api
        .post_json_raw(
            "/auth/login",
            &LoginRequest {
                email: user.email.clone(),
                password: "not-the-password".into(),
            },
        )
        .await?;
    let unknown_email = ctx
        .api
        .post_json_raw(
            "/auth/login",
            &LoginRequest {
                email: ctx.unique_email(),
                password: user.password.clone(),
            },
        )
        .await?;

    ensure!(
        wrong_password.status() == 401,
        "expected 401, got {}",
        wrong_password.status()
    );
    ensure!(
        unknown_email.status() == 401,
        "expected 401, got {}",
        unknown_email.status()
    );
    ensure!(
        wrong_password.headers().get(reqwest::header::SET_COOKIE).is_none(),
        "failed login must not set a cookie"
    );

    let a: serde_json::Value = wrong_password.json().await?;
    let b: serde_json::Value = unknown_email.json().await?;
    ensure!(a == b, "bodies differ: {a} vs {b}");
    Ok(())
}

pub async fn login_invalid_input(ctx: &TestContext) -> Result<()> {
    let resp = ctx
        .api
        .post_json_raw("/auth/login", &json!({"email": "", "password": "x"}))
        .await?;
    ensure!(resp.status() == 400, "expected 400, got {}", resp.status());
    Ok(())
}
