use axum::{debug_handler, extract::Query, response::Redirect};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{session, AppResult};

#[derive(Deserialize)]
pub(crate) struct LogoutQuery {
    pub(crate) return_url: Option<String>,
}

#[debug_handler]
pub(crate) async fn logout(
    Query(LogoutQuery { return_url }): Query<LogoutQuery>,
    session: Session
) -> AppResult<Redirect> {
    if let Some(user) = session::current_user(&session).await? {
        tracing::info!(%user, "signed out");
    }
    session.flush().await?;
    Ok(Redirect::to(&session::local_return_url(return_url)))
}
