pub mod auth;
pub mod chat;
pub mod config;
pub mod http;
pub mod identity;
pub mod profiles;
pub mod session;
pub mod store;

use axum::{extract::FromRef, http::StatusCode, response::{IntoResponse, Response}, Json};
use oauth2::reqwest;
use serde_json::{json, Value};

use chat::ChatError;
use store::{SharedStore, StoreError};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub store: SharedStore,
    pub clients: auth::Clients,
}

pub trait GetField {
    fn get_str_field(&self, field: &str) -> AppResult<String>;
    fn get_obj_field(&self, field: &str) -> AppResult<&Value>;
}

impl GetField for serde_json::Value {
    fn get_str_field(&self, field: &str) -> AppResult<String> {
        Ok(
            self.get(field)
            .ok_or(format!("expected {field} in {self}"))?
            .as_str()
            .ok_or(format!("expected {field} in {self} to be string"))?
            .to_owned()
        )
    }

    fn get_obj_field(&self, field: &str) -> AppResult<&Value> {
        self.get(field)
        .ok_or(format!("expected {field} in {self}").into())
    }
}

pub type AppResult<T> = Result<T, AppError>;
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    fn status(&self) -> StatusCode {
        if self.0.is::<auth::AuthError>() {
            return StatusCode::BAD_REQUEST;
        }
        let Some(err) = self.0.downcast_ref::<ChatError>() else {
            return StatusCode::INTERNAL_SERVER_ERROR;
        };
        match err {
            ChatError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ChatError::NotParticipant(..) => StatusCode::FORBIDDEN,
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatError::InvalidParticipant(_) | ChatError::EmptyMessage => StatusCode::BAD_REQUEST,
            ChatError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            ChatError::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        // server-side detail (upstream urls, api keys) stays in the log
        let error = match status {
            StatusCode::SERVICE_UNAVAILABLE => "temporarily unavailable".to_owned(),
            status if status.is_server_error() => "internal error".to_owned(),
            _ => self.0.to_string(),
        };
        if status.is_server_error() {
            tracing::error!(err = ?self.0, "request failed");
        }
        (status, Json(json!({ "error": error }))).into_response()
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        Self(anyhow::Error::msg(err))
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        Self(anyhow::Error::msg(err.to_owned()))
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(ChatError);
apperr_impl!(auth::AuthError);
apperr_impl!(serde_json::Error);
apperr_impl!(tower_sessions::session::Error);
apperr_impl!(axum::Error);
apperr_impl!(reqwest::Error);
apperr_impl!(std::io::Error);

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        Self(anyhow::Error::from(ChatError::from(err)))
    }
}

impl<E: core::error::Error + Send + Sync + 'static, R: oauth2::ErrorResponse + Send + Sync + 'static> From<oauth2::RequestTokenError<E, R>> for AppError {
    fn from(err: oauth2::RequestTokenError<E, R>) -> Self {
        Self(anyhow::Error::from(err))
    }
}
