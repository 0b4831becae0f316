use serde_json::json;

use crate::{
    identity::{Identity, UserId},
    store::{server_timestamp, SharedStore},
};

use super::{chat_path, types::sorted_pair, ChatError, ChatId, ChatResult};

/// Finds or creates the conversation between the caller and someone else.
pub struct Resolver<I> {
    store: SharedStore,
    identity: I,
}

impl<I: Identity> Resolver<I> {
    pub fn new(store: SharedStore, identity: I) -> Self {
        Self { store, identity }
    }

    /// Returns the pair's chat id, creating the conversation on first contact.
    ///
    /// Creation is a conditional write, so two first contacts racing from
    /// either side still leave exactly one conversation.
    pub async fn resolve(&self, counterpart: &UserId) -> ChatResult<ChatId> {
        let me = self.identity.current_user().ok_or(ChatError::Unauthenticated)?;
        let chat = ChatId::for_pair(&me, counterpart)?;
        let path = chat_path(&chat);

        if self.store.get(&path).await?.is_some() {
            tracing::debug!(%chat, "conversation exists");
            return Ok(chat);
        }

        let (low, high) = sorted_pair(&me, counterpart);
        let created = self
            .store
            .create(
                &path,
                json!({
                    "participants": [low, high],
                    "createdAt": server_timestamp(),
                }),
            )
            .await?;

        if created {
            tracing::info!(%chat, user = %me, "conversation created");
        } else {
            tracing::debug!(%chat, "conversation created concurrently");
        }
        Ok(chat)
    }
}
