//! Sign-in through the identity toolkit, by OAuth provider or password.
//!
//! The session only ever stores the toolkit's user id; everything else about
//! the user lives in their profile document.

mod clients;
mod lockin;
mod login;
mod logout;
mod password;
mod signup;

use axum::{routing::{get, post}, Router};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tower_sessions::Session;

pub use clients::{ClientProvider, Clients};

use crate::{identity::UserId, profiles::Profiles, session, store::SharedStore, AppResult, AppState, GetField};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup::sign_up))
        .route("/login/password", post(password::password_login))
        .route("/login/{provider}", get(login::login))
        .route("/lockin/{provider}", get(lockin::lockin))
        .route("/logout", get(logout::logout))
}

/// The identity toolkit turned a request down for a reason the user can fix.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Rejected(String),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignedIn {
    user_id: UserId,
}

/// Records a successful toolkit sign-in `body` in the session and makes sure
/// the user has a profile.
async fn signed_in(store: &SharedStore, session: &Session, body: &Value) -> AppResult<UserId> {
    let user = UserId::new(body.get_str_field("localId")?)?;
    let name = body.get("displayName").and_then(Value::as_str).filter(|name| !name.is_empty());
    let email = body.get("email").and_then(Value::as_str);

    Profiles::new(store.clone()).ensure(&user, name, email).await?;
    session::sign_in(session, &user).await?;
    Ok(user)
}
