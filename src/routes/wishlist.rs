use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};

use crate::error::AppResult;
use crate::routes::current_user::CurrentUser;
use crate::services::wishlist::{AddWishlistItem, WishlistEntryView};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(list_wishlist).post(add_to_wishlist))
}

/// Save an offer to the caller's wishlist.
async fn add_to_wishlist(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(item): Json<AddWishlistItem>,
) -> AppResult<(StatusCode, Json<WishlistEntryView>)> {
    let entry = state.wishlist.add(&user.id, item).await?;
    let now = state.clock.now();
    Ok((
        StatusCode::CREATED,
        Json(WishlistEntryView::from_entry(entry, &now)),
    ))
}

/// The caller's wishlist with remaining time per entry.
async fn list_wishlist(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<WishlistEntryView>>> {
    let views = state.wishlist.list_for_display(&user.id).await?;
    Ok(Json(views))
}
