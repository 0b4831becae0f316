use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};

use crate::{
    identity::UserId,
    store::{Document, StoreResult},
};

use super::{ChatError, ChatResult};

const SEPARATOR: char = '_';

/// Conversation identifier: the sorted participant pair joined by `_`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(String);

impl ChatId {
    /// Same id for `(a, b)` and `(b, a)`, distinct for every other pair.
    ///
    /// Participants must differ and must not contain the separator, otherwise
    /// `("a_b", "c")` and `("a", "b_c")` would share an id.
    pub fn for_pair(a: &UserId, b: &UserId) -> ChatResult<ChatId> {
        if a == b {
            return Err(ChatError::InvalidParticipant(a.to_string()));
        }
        if let Some(bad) = [a, b].into_iter().find(|id| id.as_str().contains(SEPARATOR)) {
            return Err(ChatError::InvalidParticipant(bad.to_string()));
        }

        let (low, high) = sorted_pair(a, b);
        Ok(ChatId(format!("{low}{SEPARATOR}{high}")))
    }

    /// An id taken from a caller; it is not checked against the pair scheme.
    pub fn new(id: impl Into<String>) -> ChatResult<ChatId> {
        let id = id.into();
        if id.is_empty() || id.contains('/') {
            return Err(ChatError::NotFound(format!("chat {id:?}")));
        }
        Ok(ChatId(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub(crate) fn sorted_pair<'a>(a: &'a UserId, b: &'a UserId) -> (&'a UserId, &'a UserId) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Stored at `chats/{id}`. Participants never change after creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub participants: Vec<UserId>,
    #[serde(default)]
    pub titles: HashMap<UserId, String>,
    #[serde(default)]
    pub created_at: Option<i64>,
}

impl Conversation {
    pub fn includes(&self, user: &UserId) -> bool {
        self.participants.contains(user)
    }

    pub fn counterpart(&self, user: &UserId) -> Option<&UserId> {
        self.participants.iter().find(|p| *p != user)
    }
}

/// Stored under `chats/{id}/messages`. `timestamp` is assigned by the store in
/// microseconds since the Unix epoch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default)]
    pub id: String,
    pub sender_id: UserId,
    pub text: String,
    pub timestamp: i64,
}

impl Message {
    pub(crate) fn from_document(doc: Document) -> StoreResult<Message> {
        let mut message: Message = doc.decode()?;
        message.id = doc.id;
        Ok(message)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FeedEvent {
    /// Everything in the conversation when the feed attached.
    Snapshot(Vec<Message>),
    /// Messages committed since the previous event, oldest first.
    Appended(Vec<Message>),
}

impl FeedEvent {
    pub fn messages(&self) -> &[Message] {
        match self {
            FeedEvent::Snapshot(messages) | FeedEvent::Appended(messages) => messages,
        }
    }
}
