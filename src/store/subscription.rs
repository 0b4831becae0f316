use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures_util::{future::BoxFuture, Stream};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};

use super::{CollectionPath, Document, StoreResult};

/// Live query over one collection.
///
/// Yields the full result set once on attach and again after every committed
/// write to the collection. An error is yielded once and ends the stream.
/// Dropping the subscription (or calling [`Subscription::detach`]) stops the
/// background listener; nothing is delivered afterwards.
pub struct Subscription {
    rx: mpsc::Receiver<StoreResult<Vec<Document>>>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// `changes` must be obtained before calling so writes racing the initial
    /// read still trigger a fresh snapshot.
    pub(crate) fn watch<Q>(
        collection: CollectionPath,
        mut changes: broadcast::Receiver<CollectionPath>,
        read: Q,
    ) -> Self
    where
        Q: Fn() -> BoxFuture<'static, StoreResult<Vec<Document>>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(16);

        let task = tokio::spawn(async move {
            let snapshot = read().await;
            let failed = snapshot.is_err();
            if tx.send(snapshot).await.is_err() || failed {
                return;
            }

            loop {
                match changes.recv().await {
                    Ok(changed) if changed != collection => continue,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }

                let snapshot = read().await;
                let failed = snapshot.is_err();
                if tx.send(snapshot).await.is_err() || failed {
                    break;
                }
            }
            tracing::debug!(%collection, "subscription closed");
        });

        Self { rx, task }
    }

    pub fn detach(self) {
        drop(self)
    }
}

impl Stream for Subscription {
    type Item = StoreResult<Vec<Document>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
        self.rx.close();
    }
}
