use axum::{debug_handler, extract::{Path, State}, Json};
use serde::Serialize;
use tower_sessions::Session;

use crate::{
    chat::ChatError,
    identity::UserId,
    profiles::{Profiles, UserProfile},
    session::current_user,
    store::SharedStore,
    AppResult,
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PublicProfile {
    user_id: UserId,
    display_name: String,
    state: Option<String>,
    user_type: Option<String>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn me(
    State(store): State<SharedStore>,
    session: Session,
) -> AppResult<Json<UserProfile>> {
    let user = current_user(&session).await?.ok_or(ChatError::Unauthenticated)?;
    let profile = Profiles::new(store)
        .get(&user)
        .await?
        .ok_or_else(|| ChatError::NotFound(format!("profile of {user}")))?;
    Ok(Json(profile))
}

/// What other users may see: no contact details.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn profile(
    Path(user_id): Path<String>,
    State(store): State<SharedStore>,
) -> AppResult<Json<PublicProfile>> {
    let user = UserId::new(user_id)?;
    let profile = Profiles::new(store)
        .get(&user)
        .await?
        .ok_or_else(|| ChatError::NotFound(format!("profile of {user}")))?;

    Ok(Json(PublicProfile {
        display_name: profile.display_name(),
        state: profile.state,
        user_type: profile.user_type,
        user_id: user,
    }))
}
