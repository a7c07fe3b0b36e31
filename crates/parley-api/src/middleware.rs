use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
    typed_header::TypedHeaderRejection,
};

use parley_types::models::User;

use crate::credentials::CredentialStore;
use crate::error::ApiError;
use crate::session::INVALID_TOKEN;
use crate::state::{AppState, blocking};

/// The account behind the request's bearer token.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Resolve the bearer token to a user and attach it as [`CurrentUser`].
/// Token checks are local; only the username lookup touches the store.
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let TypedHeader(Authorization(bearer)) =
        bearer.map_err(|_| ApiError::Unauthenticated(INVALID_TOKEN))?;

    let username = state.sessions.resolve(bearer.token())?;

    let db = state.clone();
    let user = blocking(move || CredentialStore::new(&db.db).resolve_user(&username)).await?;

    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}
