use thiserror::Error;

use crate::{
    chat::ChatId,
    identity::UserId,
    store::StoreError,
};

pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("not signed in")]
    Unauthenticated,

    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid participant {0:?}")]
    InvalidParticipant(String),

    #[error("{0} is not a participant of {1}")]
    NotParticipant(UserId, ChatId),

    #[error("message text is empty")]
    EmptyMessage,

    #[error("temporarily unavailable: {0}")]
    Transient(String),

    #[error("{0}")]
    Unknown(String),
}

impl From<StoreError> for ChatError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ChatError::NotFound(what),
            StoreError::Transient(reason) => ChatError::Transient(reason),
            StoreError::Unknown(reason) => ChatError::Unknown(reason),
            StoreError::Malformed(err) => ChatError::Unknown(err.to_string()),
        }
    }
}
