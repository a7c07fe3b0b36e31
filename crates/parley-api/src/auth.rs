use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};

use parley_types::api::{LoginRequest, RegisterRequest, TokenResponse, UserResponse};

use crate::credentials::CredentialStore;
use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::state::{AppState, blocking};

const MAX_USERNAME_CHARS: usize = 64;

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_registration(&req)?;

    let db = state.clone();
    let user = blocking(move || {
        CredentialStore::new(&db.db).register(&req.username, &req.email, &req.password)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let db = state.clone();
    let user = blocking(move || {
        CredentialStore::new(&db.db).authenticate(&req.username, &req.password)
    })
    .await?;

    let token = state.sessions.issue(&user.username)?;

    Ok(Json(TokenResponse::bearer(token)))
}

pub async fn me(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Json<UserResponse> {
    Json(UserResponse::from(user))
}

fn validate_registration(req: &RegisterRequest) -> Result<(), ApiError> {
    let username_len = req.username.chars().count();
    if req.username.trim().is_empty() || username_len > MAX_USERNAME_CHARS {
        return Err(ApiError::InvalidArgument(format!(
            "Username must be 1 to {} characters",
            MAX_USERNAME_CHARS
        )));
    }
    if !req.email.contains('@') {
        return Err(ApiError::InvalidArgument("Email address is not valid".into()));
    }
    if req.password.is_empty() {
        return Err(ApiError::InvalidArgument("Password must not be empty".into()));
    }
    Ok(())
}
