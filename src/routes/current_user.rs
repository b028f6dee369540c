use std::sync::Arc;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::db::{User, UserRepository};
use crate::error::AppError;
use crate::AppState;

/// Header carrying the id of the user authenticated by the upstream layer.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The calling user, loaded from the account store.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                tracing::debug!("Missing or invalid {} header", USER_ID_HEADER);
                AppError::Unauthorized
            })?;

        let user = UserRepository::find_by_id(&state.db, user_id)
            .await?
            .ok_or_else(|| {
                tracing::debug!("Unknown user id {}", user_id);
                AppError::Unauthorized
            })?;

        Ok(CurrentUser(user))
    }
}
