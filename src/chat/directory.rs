use std::collections::HashMap;

use serde::Serialize;

use crate::{
    identity::UserId,
    profiles::{Profiles, UNKNOWN_USER},
    store::{Filter, Query, SharedStore},
};

use super::{chats, load_conversation, ChatId, ChatResult, Conversation};

/// One row of a user's conversation list.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub id: ChatId,
    pub counterpart: Option<UserId>,
    pub title: String,
    pub created_at: Option<i64>,
}

/// Point-in-time listing of the conversations a user takes part in.
pub struct Directory {
    store: SharedStore,
    profiles: Profiles,
}

impl Directory {
    pub fn new(store: SharedStore) -> Self {
        Self {
            profiles: Profiles::new(store.clone()),
            store,
        }
    }

    /// Newest conversations first. Titles degrade to a placeholder instead of
    /// failing the listing.
    pub async fn list(&self, user: &UserId) -> ChatResult<Vec<ChatSummary>> {
        let query = Query::all().filter(Filter::ArrayContains("participants".into(), serde_json::json!(user)));
        let docs = self.store.query(&chats(), &query).await?;
        tracing::debug!(%user, count = docs.len(), "listing conversations");

        let mut names = HashMap::new();
        let mut summaries = Vec::with_capacity(docs.len());
        for doc in docs {
            let conversation: Conversation = match doc.decode() {
                Ok(conversation) => conversation,
                Err(err) => {
                    tracing::warn!(chat = %doc.id, %err, "skipping malformed conversation");
                    continue;
                }
            };
            let title = self.title_for(&conversation, user, &mut names).await;
            summaries.push(ChatSummary {
                id: ChatId::new(doc.id)?,
                counterpart: conversation.counterpart(user).cloned(),
                title,
                created_at: conversation.created_at,
            });
        }

        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(summaries)
    }

    pub async fn title(&self, chat: &ChatId, user: &UserId) -> ChatResult<String> {
        let conversation = load_conversation(self.store.as_ref(), chat).await?;
        Ok(self.title_for(&conversation, user, &mut HashMap::new()).await)
    }

    /// Counterpart's display name, then the stored per-user title, then
    /// [`UNKNOWN_USER`]. `names` holds lookups already made in this call.
    async fn title_for(
        &self,
        conversation: &Conversation,
        user: &UserId,
        names: &mut HashMap<UserId, Option<String>>,
    ) -> String {
        let name = match conversation.counterpart(user) {
            Some(other) => match names.get(other) {
                Some(name) => name.clone(),
                None => {
                    let name = match self.profiles.name(other).await {
                        Ok(name) => name,
                        Err(err) => {
                            tracing::warn!(user = %other, %err, "profile lookup failed");
                            None
                        }
                    };
                    names.insert(other.clone(), name.clone());
                    name
                }
            },
            None => None,
        };

        name.or_else(|| conversation.titles.get(user).cloned())
            .unwrap_or_else(|| UNKNOWN_USER.to_owned())
    }
}
