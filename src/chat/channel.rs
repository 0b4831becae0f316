use std::{
    collections::HashSet,
    pin::Pin,
    sync::{Arc, Mutex, PoisonError},
    task::{ready, Context, Poll},
};

use futures_util::{Stream, StreamExt};
use serde_json::json;
use tokio::task::JoinHandle;

use crate::{
    identity::{Identity, UserId},
    store::{server_timestamp, Direction, Document, Query, SharedStore, StoreResult, Subscription},
};

use super::{load_conversation, messages_path, ChatError, ChatId, ChatResult, FeedEvent, Message};

/// Sends messages into a conversation and follows it live.
pub struct Channel<I> {
    store: SharedStore,
    identity: I,
}

impl<I: Identity> Channel<I> {
    pub fn new(store: SharedStore, identity: I) -> Self {
        Self { store, identity }
    }

    /// Appends `text` from the signed-in user. The store stamps the time.
    ///
    /// Nothing is retried; on error the caller still owns `text` and can
    /// resubmit it.
    pub async fn append(&self, chat: &ChatId, text: &str) -> ChatResult<Message> {
        let sender = self.identity.current_user().ok_or(ChatError::Unauthenticated)?;
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        self.participant(chat, &sender).await?;

        let doc = self
            .store
            .add(
                &messages_path(chat),
                json!({
                    "senderId": sender,
                    "text": text,
                    "timestamp": server_timestamp(),
                }),
            )
            .await?;

        tracing::info!(%chat, %sender, message = %doc.id, "message appended");
        Ok(Message::from_document(doc)?)
    }

    /// Live feed of the conversation, oldest message first.
    pub async fn subscribe(&self, chat: &ChatId) -> ChatResult<Feed> {
        let user = self.identity.current_user().ok_or(ChatError::Unauthenticated)?;
        self.participant(chat, &user).await?;

        let query = Query::all().order_by("timestamp", Direction::Asc);
        let subscription = self.store.subscribe(&messages_path(chat), &query).await?;

        tracing::info!(%chat, %user, "feed attached");
        Ok(Feed {
            chat: chat.clone(),
            subscription,
            seen: HashSet::new(),
            started: false,
        })
    }

    /// Runs `observer` for every feed event on a background task until the
    /// returned [`Listener`] is detached or the feed ends.
    pub async fn listen<F>(&self, chat: &ChatId, observer: F) -> ChatResult<Listener>
    where
        F: FnMut(ChatResult<FeedEvent>) + Send + 'static,
    {
        let mut feed = self.subscribe(chat).await?;
        let observer: Observer = Box::new(observer);
        let observer = Arc::new(Mutex::new(Some(observer)));

        let slot = observer.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = feed.next().await {
                let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
                let Some(observer) = guard.as_mut() else {
                    break;
                };
                observer(event);
            }
        });

        Ok(Listener { observer, task })
    }

    async fn participant(&self, chat: &ChatId, user: &UserId) -> ChatResult<()> {
        let conversation = load_conversation(self.store.as_ref(), chat).await?;
        if !conversation.includes(user) {
            return Err(ChatError::NotParticipant(user.clone(), chat.clone()));
        }
        Ok(())
    }
}

/// Ordered message feed of one conversation.
///
/// The first item is a [`FeedEvent::Snapshot`], possibly empty; later items
/// are [`FeedEvent::Appended`] deltas. A store failure is yielded once and
/// ends the feed. A feed cannot be restarted; subscribe again instead.
pub struct Feed {
    chat: ChatId,
    subscription: Subscription,
    seen: HashSet<String>,
    started: bool,
}

impl Feed {
    /// Stops the feed and releases its listener.
    pub fn detach(self) {
        drop(self)
    }

    fn absorb(&mut self, docs: Vec<Document>) -> StoreResult<Option<FeedEvent>> {
        let messages = docs
            .into_iter()
            .map(Message::from_document)
            .collect::<StoreResult<Vec<_>>>()?;

        if !self.started {
            self.started = true;
            self.seen.extend(messages.iter().map(|m| m.id.clone()));
            return Ok(Some(FeedEvent::Snapshot(messages)));
        }

        let fresh: Vec<_> = messages
            .into_iter()
            .filter(|m| self.seen.insert(m.id.clone()))
            .collect();
        Ok((!fresh.is_empty()).then_some(FeedEvent::Appended(fresh)))
    }
}

impl Stream for Feed {
    type Item = ChatResult<FeedEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let docs = match ready!(self.subscription.poll_next_unpin(cx)) {
                None => return Poll::Ready(None),
                Some(Err(err)) => {
                    tracing::warn!(chat = %self.chat, %err, "feed closed by store error");
                    return Poll::Ready(Some(Err(err.into())));
                }
                Some(Ok(docs)) => docs,
            };

            match self.absorb(docs) {
                Ok(Some(event)) => return Poll::Ready(Some(Ok(event))),
                Ok(None) => continue,
                Err(err) => return Poll::Ready(Some(Err(err.into()))),
            }
        }
    }
}

impl Drop for Feed {
    fn drop(&mut self) {
        tracing::info!(chat = %self.chat, "feed detached");
    }
}

type Observer = Box<dyn FnMut(ChatResult<FeedEvent>) + Send>;

/// Handle to a running [`Channel::listen`] observer.
pub struct Listener {
    observer: Arc<Mutex<Option<Observer>>>,
    task: JoinHandle<()>,
}

impl Listener {
    /// Once this returns the observer has been dropped and will not run again.
    ///
    /// Must not be called from inside the observer itself.
    pub fn detach(self) {
        drop(self)
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        // waits out an in-flight callback
        self.observer.lock().unwrap_or_else(PoisonError::into_inner).take();
        self.task.abort();
    }
}
