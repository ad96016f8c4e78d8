use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json,
    extract::{FromRequestParts, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header, request::Parts},
    response::{AppendHeaders, IntoResponse},
};

use gatehouse_api::service::{validate_email, validate_password};
use gatehouse_api::session::SessionCookie;
use gatehouse_api::{
    LoginRequest, LoginResponse, MeResponse, MessageResponse, RegisterRequest,
    SESSION_COOKIE_NAME,
};

use crate::error::ApiErr;
use crate::{Registration, Sessions};

// ---------------------------------------------------------------------------
// Session cookie extractor
// ---------------------------------------------------------------------------

/// The `session_id` cookie, if the request carries a non-empty one.
pub struct SessionToken(pub Option<String>);

impl SessionToken {
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl<S> FromRequestParts<S> for SessionToken
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(session_cookie(&parts.headers)))
    }
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE_NAME)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn set_cookie(cookie: &SessionCookie) -> AppendHeaders<[(header::HeaderName, String); 1]> {
    AppendHeaders([(header::SET_COOKIE, cookie.to_header_value())])
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiErr> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| ApiErr::bad_request(e.body_text()))
}

// ---------------------------------------------------------------------------
// Register
// ---------------------------------------------------------------------------

/// POST /api/auth/register
pub async fn register(
    State(registration): State<Arc<Registration>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiErr> {
    let req = json_body(payload)?;
    let email = validate_email(&req.email)?;
    validate_password(&req.password)?;

    registration
        .register(&email, &req.password, req.invite_code.as_deref())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("Register success")),
    ))
}

// ---------------------------------------------------------------------------
// Login / Me / Logout
// ---------------------------------------------------------------------------

/// POST /api/auth/login
pub async fn login(
    State(sessions): State<Arc<Sessions>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiErr> {
    let req = json_body(payload)?;
    let email = validate_email(&req.email)?;
    validate_password(&req.password)?;

    let outcome = sessions.login(&email, &req.password).await?;

    Ok((
        set_cookie(&outcome.cookie),
        Json(LoginResponse {
            message: "Login success".into(),
            user_id: outcome.user_id,
            email: outcome.email,
        }),
    ))
}

/// GET /api/auth/me
pub async fn me(
    State(sessions): State<Arc<Sessions>>,
    token: SessionToken,
) -> Result<Json<MeResponse>, ApiErr> {
    let user = sessions.whoami(token.as_deref()).await?;
    Ok(Json(MeResponse { user }))
}

/// POST /api/auth/logout
pub async fn logout(
    State(sessions): State<Arc<Sessions>>,
    token: SessionToken,
) -> impl IntoResponse {
    let cookie = sessions.logout(token.as_deref()).await;
    (
        set_cookie(&cookie),
        Json(MessageResponse::new("Logout success")),
    )
}
