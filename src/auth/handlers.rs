use axum::{
    extract::State,
    http::{header, HeaderName, StatusCode},
    response::AppendHeaders,
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, instrument, warn};

use crate::{
    auth::{
        dto::{
            EmailMessage, LoginRequest, Message, ProfileResponse, RegisterRequest, ResetRequest,
            ResetTokenResponse, UpdatePasswordRequest,
        },
        errors::AuthError,
        extractors::{SessionUser, SESSION_COOKIE},
    },
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(register))
        .route("/sessions", post(login).delete(logout))
        .route("/profile", get(profile))
        .route("/reset_password", post(reset_password).put(update_password))
}

fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn session_cookie_header(value: &str) -> (HeaderName, String) {
    (
        header::SET_COOKIE,
        format!("{SESSION_COOKIE}={value}; Path=/; HttpOnly; SameSite=Lax"),
    )
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<Json<EmailMessage>, (StatusCode, String)> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "invalid email".into()));
    }

    match state.auth.register(&payload.email, &payload.password).await {
        Ok(user) => Ok(Json(EmailMessage {
            email: user.email,
            message: "user created".into(),
        })),
        Err(AuthError::AlreadyRegistered) => {
            warn!(email = %payload.email, "email already registered");
            Err((StatusCode::CONFLICT, "email already registered".into()))
        }
        Err(e) => {
            error!(error = %e, "register failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<(AppendHeaders<[(HeaderName, String); 1]>, Json<EmailMessage>), (StatusCode, String)> {
    payload.email = payload.email.trim().to_lowercase();

    match state
        .auth
        .create_session(&payload.email, &payload.password)
        .await
    {
        Ok(session_id) => Ok((
            AppendHeaders([session_cookie_header(&session_id)]),
            Json(EmailMessage {
                email: payload.email,
                message: "logged in".into(),
            }),
        )),
        Err(AuthError::InvalidCredentials) => {
            warn!(email = %payload.email, "login rejected");
            Err((StatusCode::UNAUTHORIZED, "invalid credentials".into()))
        }
        Err(e) => {
            error!(error = %e, "login failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

#[instrument(skip_all)]
pub async fn profile(SessionUser(user): SessionUser) -> Json<ProfileResponse> {
    Json(ProfileResponse { email: user.email })
}

#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    SessionUser(user): SessionUser,
) -> Result<(AppendHeaders<[(HeaderName, String); 1]>, Json<Message>), (StatusCode, String)> {
    match state.auth.destroy_session(user.id).await {
        Ok(()) => {
            // Expire the cookie client-side as well.
            let expired = (
                header::SET_COOKIE,
                format!("{SESSION_COOKIE}=; Path=/; HttpOnly; Max-Age=0"),
            );
            Ok((
                AppendHeaders([expired]),
                Json(Message {
                    message: "logged out".into(),
                }),
            ))
        }
        Err(e) => {
            error!(error = %e, user_id = %user.id, "logout failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(mut payload): Json<ResetRequest>,
) -> Result<Json<ResetTokenResponse>, (StatusCode, String)> {
    payload.email = payload.email.trim().to_lowercase();

    match state.auth.reset_password_token(&payload.email).await {
        Ok(token) => Ok(Json(ResetTokenResponse {
            email: payload.email,
            reset_token: token,
        })),
        Err(AuthError::NotFound) => {
            warn!(email = %payload.email, "reset requested for unknown email");
            Err((StatusCode::NOT_FOUND, "no such user".into()))
        }
        Err(e) => {
            error!(error = %e, "reset request failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

#[instrument(skip(state, payload))]
pub async fn update_password(
    State(state): State<AppState>,
    Json(mut payload): Json<UpdatePasswordRequest>,
) -> Result<Json<EmailMessage>, (StatusCode, String)> {
    payload.email = payload.email.trim().to_lowercase();

    match state
        .auth
        .update_password(&payload.reset_token, &payload.new_password)
        .await
    {
        Ok(()) => Ok(Json(EmailMessage {
            email: payload.email,
            message: "Password updated".into(),
        })),
        Err(AuthError::InvalidResetToken) => {
            warn!(email = %payload.email, "invalid reset token");
            Err((StatusCode::BAD_REQUEST, "invalid reset token".into()))
        }
        Err(e) => {
            error!(error = %e, "password update failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}
