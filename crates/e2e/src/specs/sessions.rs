use anyhow::{Result, ensure};

use crate::client::TestContext;

/// No cookie → `{"user": null}`.
pub async fn me_anonymous(ctx: &TestContext) -> Result<()> {
    let resp = ctx.fresh_client()?.get_raw("/auth/me").await?;
    ensure!(resp.status() == 200, "expected 200, got {}", resp.status());
    let body: serde_json::Value = resp.json().await?;
    ensure!(
        body == serde_json::json!({"user": null}),
        "unexpected body {body}"
    );
    Ok(())
}

pub async fn me_with_unknown_token(ctx: &TestContext) -> Result<()> {
    let client = ctx.fresh_client()?;
    client.set_session_token(&"0".repeat(64))?;
    ensure!(client.me().await?.is_none(), "unknown token must be anonymous");
    Ok(())
}

pub async fn me_after_login(ctx: &TestContext) -> Result<()> {
    let (client, user, login) = ctx.login_user().await?;
    ensure!(client.session_token().is_some(), "cookie jar should hold a session");

    for _ in 0..2 {
        let me = client
            .me()
            .await?
            .ok_or_else(|| anyhow::anyhow!("expected a user"))?;
        ensure!(me.user_id == login.user_id, "user id mismatch");
        ensure!(me.email == user.email, "email mismatch");
    }
    Ok(())
}

/// Logout deletes the session server-side, not just the cookie.
pub async fn logout_revokes_token(ctx: &TestContext) -> Result<()> {
    let (client, _user, _login) = ctx.login_user().await?;
    let token = client
        .session_token()
        .ok_or_else(|| anyhow::anyhow!("expected a session cookie"))?;

    let resp = client
        .reqwest_client()
        .post(ctx.url("/auth/logout"))
        .send()
        .await?;
    ensure!(resp.status() == 200, "expected 200, got {}", resp.status());
    let cookie = resp
        .headers()
        .get(reqwest::header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    ensure!(cookie.contains("Max-Age=0"), "expected removal cookie, got {cookie}");
    let body: serde_json::Value = resp.json().await?;
    ensure!(body["message"] == "Logout success", "unexpected body {body}");
    ensure!(client.session_token().is_none(), "jar should be cleared");

    // Replaying the old token is anonymous.
    let replay = ctx.fresh_client()?;
    replay.set_session_token(&token)?;
    ensure!(replay.me().await?.is_none(), "revoked token still resolves");

    // Logging out again still succeeds.
    replay.logout().await?;
    Ok(())
}

pub async fn logout_without_session(ctx: &TestContext) -> Result<()> {
    let body = ctx.fresh_client()?.logout().await?;
    ensure!(body.message == "Logout success", "unexpected message {}", body.message);
    Ok(())
}
