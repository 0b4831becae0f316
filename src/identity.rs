use std::fmt;

use serde::{Deserialize, Serialize};

use crate::chat::{ChatError, ChatResult};

/// Identifier issued by the identity provider.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> ChatResult<Self> {
        let id = id.into();
        if id.is_empty() || id.contains('/') {
            return Err(ChatError::InvalidParticipant(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who is making the call. `None` means nobody is signed in.
pub trait Identity: Send + Sync {
    fn current_user(&self) -> Option<UserId>;
}

impl Identity for UserId {
    fn current_user(&self) -> Option<UserId> {
        Some(self.clone())
    }
}

impl Identity for Option<UserId> {
    fn current_user(&self) -> Option<UserId> {
        self.clone()
    }
}
