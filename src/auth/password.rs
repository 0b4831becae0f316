use axum::{debug_handler, extract::State, Json};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{chat::ChatError, store::SharedStore, AppResult, AppState};

use super::{signed_in, Clients, Credentials, SignedIn};

#[derive(Deserialize)]
pub(crate) struct PasswordLogin {
    email: String,
    password: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn password_login(
    State(store): State<SharedStore>,
    State(clients): State<Clients>,
    session: Session,
    Json(PasswordLogin { email, password }): Json<PasswordLogin>,
) -> AppResult<Json<SignedIn>> {
    let response = reqwest::Client::new()
        .post(&clients.firebase_passwordurl)
        .json(&Credentials {
            email: &email,
            password: &password,
            return_secure_token: true,
        })
        .send()
        .await?;

    if response.status().is_client_error() {
        tracing::info!(%email, status = %response.status(), "password sign-in rejected");
        return Err(ChatError::Unauthenticated)?;
    }
    let body: serde_json::Value = response.error_for_status()?.json().await?;

    let user_id = signed_in(&store, &session, &body).await?;
    tracing::info!(user = %user_id, "signed in with password");
    Ok(Json(SignedIn { user_id }))
}
