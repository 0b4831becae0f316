use axum::{debug_handler, extract::State, Json};
use serde::Deserialize;
use serde_json::Value;
use tower_sessions::Session;

use crate::{
    identity::UserId,
    profiles::{Profiles, UserProfile},
    session,
    store::SharedStore,
    AppResult, AppState, GetField,
};

use super::{AuthError, Clients, Credentials, SignedIn};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignUp {
    email: String,
    password: String,
    full_name: Option<String>,
    mobile: Option<String>,
    state: Option<String>,
    user_type: Option<String>,
}

impl SignUp {
    fn profile(&self) -> UserProfile {
        let filled = |value: &Option<String>| {
            value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_owned)
        };

        UserProfile {
            full_name: filled(&self.full_name),
            email: Some(self.email.trim().to_owned()),
            mobile: filled(&self.mobile),
            state: filled(&self.state),
            user_type: filled(&self.user_type),
        }
    }
}

/// User-facing reason for a rejected sign-up, from the toolkit's error body.
fn rejection(body: &Value) -> String {
    let code = body
        .get("error")
        .and_then(|err| err.get("message"))
        .and_then(Value::as_str)
        .unwrap_or_default();

    match code.split([' ', ':']).next().unwrap_or_default() {
        "EMAIL_EXISTS" => "an account with this email already exists",
        "INVALID_EMAIL" => "invalid email address",
        "WEAK_PASSWORD" => "password should be at least 6 characters",
        "MISSING_PASSWORD" => "password is required",
        _ => "sign-up was rejected",
    }
    .to_owned()
}

/// Creates an email/password account, then its profile, and signs it in.
#[debug_handler(state = AppState)]
pub(crate) async fn sign_up(
    State(store): State<SharedStore>,
    State(clients): State<Clients>,
    session: Session,
    Json(form): Json<SignUp>,
) -> AppResult<Json<SignedIn>> {
    let response = reqwest::Client::new()
        .post(&clients.firebase_signupurl)
        .json(&Credentials {
            email: form.email.trim(),
            password: &form.password,
            return_secure_token: true,
        })
        .send()
        .await?;

    if response.status().is_client_error() {
        let body: Value = response.json().await.unwrap_or_default();
        let reason = rejection(&body);
        tracing::info!(email = %form.email, %reason, "sign-up rejected");
        return Err(AuthError::Rejected(reason))?;
    }
    let body: Value = response.error_for_status()?.json().await?;

    let user_id = UserId::new(body.get_str_field("localId")?)?;
    Profiles::new(store).create(&user_id, form.profile()).await?;
    session::sign_in(&session, &user_id).await?;

    tracing::info!(user = %user_id, "signed up");
    Ok(Json(SignedIn { user_id }))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn profile_keeps_filled_fields_only() {
        let form: SignUp = serde_json::from_value(json!({
            "email": " anjali@example.com ",
            "password": "hunter22",
            "fullName": "Anjali Nair",
            "mobile": "919876543210",
            "state": " ",
            "userType": "advertiser",
        }))
        .unwrap();

        assert_eq!(
            form.profile(),
            UserProfile {
                full_name: Some("Anjali Nair".into()),
                email: Some("anjali@example.com".into()),
                mobile: Some("919876543210".into()),
                state: None,
                user_type: Some("advertiser".into()),
            }
        );
    }

    #[test]
    fn rejections_read_the_toolkit_code() {
        let body = |message: &str| json!({ "error": { "code": 400, "message": message } });

        assert_eq!(rejection(&body("EMAIL_EXISTS")), "an account with this email already exists");
        assert_eq!(
            rejection(&body("WEAK_PASSWORD : Password should be at least 6 characters")),
            "password should be at least 6 characters"
        );
        assert_eq!(rejection(&body("OPERATION_NOT_ALLOWED")), "sign-up was rejected");
        assert_eq!(rejection(&Value::Null), "sign-up was rejected");
    }
}
