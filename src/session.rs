use tower_sessions::Session;

use crate::{identity::UserId, AppResult};

pub const USER_ID: &str = "user_id";
pub const CSRF_STATE: &str = "csrf_state";
pub const PKCE_VERIFIER: &str = "pkce_verifier";
pub const RETURN_URL: &str = "return_url";

/// The signed-in user of this session, if any.
pub async fn current_user(session: &Session) -> AppResult<Option<UserId>> {
    let Some(user_id) = session.get::<String>(USER_ID).await? else {
        return Ok(None);
    };
    Ok(UserId::new(user_id).ok())
}

/// `url` if it stays on this site, otherwise `/`.
pub fn local_return_url(url: Option<String>) -> String {
    match url {
        Some(url) if url.starts_with('/') && !url.starts_with("//") && !url.contains('\\') => url,
        _ => "/".to_owned(),
    }
}

pub async fn sign_in(session: &Session, user: &UserId) -> AppResult<()> {
    // new session id on privilege change
    session.cycle_id().await?;
    session.insert(USER_ID, user.as_str()).await?;
    Ok(())
}
