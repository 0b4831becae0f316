//! Two-party conversations between wall owners and advertisers.

mod channel;
mod directory;
mod enquiry;
mod error;
mod resolver;
mod types;

pub use channel::{Channel, Feed, Listener};
pub use directory::{ChatSummary, Directory};
pub use enquiry::{walls, Enquiry, Wall};
pub use error::{ChatError, ChatResult};
pub use resolver::Resolver;
pub use types::{ChatId, Conversation, FeedEvent, Message};

use crate::store::{CollectionPath, DocPath, DocumentStore};

pub fn chats() -> CollectionPath {
    CollectionPath::new("chats")
}

pub fn chat_path(chat: &ChatId) -> DocPath {
    chats().doc(chat.as_str())
}

pub fn messages_path(chat: &ChatId) -> CollectionPath {
    chat_path(chat).collection("messages")
}

pub(crate) async fn load_conversation(store: &dyn DocumentStore, chat: &ChatId) -> ChatResult<Conversation> {
    let doc = store
        .get(&chat_path(chat))
        .await?
        .ok_or_else(|| ChatError::NotFound(format!("chat {chat}")))?;
    Ok(doc.decode()?)
}
