use std::sync::LazyLock;

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use regex::Regex;
use tracing::{error, info, warn};
use uuid::Uuid;

use mersal_auth::SESSION_COOKIE;
use mersal_auth::password::{hash_password, verify_password};
use mersal_types::api::{LoginRequest, MessageResponse, SignupRequest, UpdateProfileRequest};
use mersal_types::models::{SessionUser, User};

use crate::email::welcome_email;
use crate::error::ApiError;
use crate::{AppState, AppStateInner, with_db};

const MIN_PASSWORD_LEN: usize = 8;

pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let full_name = req.full_name.trim().to_string();
    let email = req.email.trim().to_lowercase();
    if full_name.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest("All fields are required"));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest("Password must be at least 8 characters long"));
    }
    if !is_valid_email(&email) {
        return Err(ApiError::BadRequest("Invalid email address"));
    }

    let lookup = email.clone();
    if with_db(&state, move |db| db.get_user_by_email(&lookup)).await?.is_some() {
        return Err(ApiError::BadRequest("User already exists"));
    }

    let password = req.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::Internal(e.into()))?
        .map_err(|e| {
            error!("password hashing failed: {}", e);
            ApiError::Internal(anyhow::anyhow!("password hashing failed: {e}"))
        })?;

    let user = User {
        id: Uuid::new_v4(),
        full_name,
        email,
        profile_pic: None,
    };
    let (id, name, email) = (user.id.to_string(), user.full_name.clone(), user.email.clone());
    // The lookup above is only a fast path; a concurrent signup can still win the insert.
    if !with_db(&state, move |db| db.create_user(&id, &name, &email, &password_hash)).await? {
        return Err(ApiError::BadRequest("User already exists"));
    }

    let jar = jar.add(session_cookie(&state, user.id)?);
    info!("{} ({}) signed up", user.full_name, user.id);

    // Fire and forget: a mail failure must not fail the signup
    match welcome_email(&user.email, &user.full_name, &state.client_url) {
        Ok(email) => {
            let mailer = state.mailer.clone();
            tokio::spawn(async move {
                if let Err(e) = mailer.send(email).await {
                    warn!("welcome email failed: {:#}", e);
                }
            });
        }
        Err(e) => warn!("welcome email skipped: {:#}", e),
    }

    Ok((StatusCode::CREATED, jar, Json(user)))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_lowercase();
    if email.is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest("All fields are required"));
    }

    let row = with_db(&state, move |db| db.get_user_by_email(&email))
        .await?
        .ok_or(ApiError::BadRequest("Invalid credentials"))?;

    let password = req.password;
    let stored_hash = row.password.clone();
    let matches = tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;
    if !matches {
        return Err(ApiError::BadRequest("Invalid credentials"));
    }

    let user = User::try_from(row).map_err(ApiError::Internal)?;
    let jar = jar.add(session_cookie(&state, user.id)?);
    info!("{} ({}) logged in", user.full_name, user.id);

    Ok((jar, Json(user)))
}

pub async fn logout(
    jar: CookieJar,
    Extension(user): Extension<SessionUser>,
) -> impl IntoResponse {
    info!("{} ({}) logged out", user.full_name, user.id);
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, Json(MessageResponse::new("Logged out successfully")))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<User>, ApiError> {
    let image = req
        .profile_pic
        .filter(|pic| !pic.is_empty())
        .ok_or(ApiError::BadRequest("Profile pic is required"))?;

    let url = state.media.upload_image(&image).await.map_err(|e| {
        error!("{} profile upload for {} failed: {:#}", state.media.id(), user.id, e);
        ApiError::Upload(e)
    })?;

    let id = user.id.to_string();
    let stored_url = url.clone();
    let updated = with_db(&state, move |db| db.update_profile_pic(&id, &stored_url)).await?;
    if !updated {
        return Err(ApiError::Auth(mersal_gateway::AuthError::UnknownUser));
    }

    Ok(Json(User {
        profile_pic: Some(url),
        ..user
    }))
}

pub async fn check_auth(Extension(user): Extension<SessionUser>) -> Json<User> {
    Json(user)
}

fn session_cookie(state: &AppStateInner, user_id: Uuid) -> Result<Cookie<'static>, ApiError> {
    let token = state.tokens.issue(user_id).map_err(|e| {
        error!("failed to issue session token: {}", e);
        ApiError::Internal(e.into())
    })?;

    Ok(Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(state.secure_cookies)
        .max_age(time::Duration::seconds(state.tokens.ttl().num_seconds()))
        .build())
}

/// `local@domain.tld`, no whitespace, exactly one `@`.
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}
