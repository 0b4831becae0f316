//! JSON API consumed by the single-page frontend.

mod chats;
mod profiles;
mod ws;

use axum::{routing::{get, post}, Router};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me", get(profiles::me))
        .route("/p/{user_id}", get(profiles::profile))

        .route("/c", get(chats::list))
        .route("/c/with/{user_id}", post(chats::resolve))
        .route("/c/{chat_id}/title", get(chats::title))
        .route("/c/{chat_id}/messages", post(chats::send))
        .route("/c/{chat_id}/ws", get(ws::chat_ws))

        .route("/w/{wall_id}/enquire", post(chats::enquire))
}
