use axum::{
    debug_handler,
    extract::{ws::WebSocket, Path, State, WebSocketUpgrade},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tower_sessions::Session;

use crate::{
    chat::{Channel, ChatId, Feed, FeedEvent},
    identity::UserId,
    session::current_user,
    store::SharedStore,
    AppResult,
};

use super::chats::{MessageView, SendMessage};

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Frame {
    Snapshot { messages: Vec<MessageView> },
    Appended { messages: Vec<MessageView> },
    Error { error: String, draft: Option<String> },
}

impl From<FeedEvent> for Frame {
    fn from(event: FeedEvent) -> Self {
        let views = |messages: Vec<_>| messages.into_iter().map(MessageView::from).collect();
        match event {
            FeedEvent::Snapshot(messages) => Frame::Snapshot { messages: views(messages) },
            FeedEvent::Appended(messages) => Frame::Appended { messages: views(messages) },
        }
    }
}

impl Frame {
    fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|err| json!({ "type": "error", "error": err.to_string() }).to_string())
    }
}

/// Live feed of a conversation. Inbound `{"text": ..}` frames are appended;
/// a failed append is answered with an error frame carrying the draft back.
#[debug_handler(state = crate::AppState)]
pub async fn chat_ws(
    Path(chat_id): Path<String>,
    State(store): State<SharedStore>,
    session: Session,

    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let me = current_user(&session).await?;
    let chat = ChatId::new(chat_id)?;

    // subscribe before upgrading so auth and membership errors are plain http
    let channel = Channel::new(store, me);
    let feed = channel.subscribe(&chat).await?;

    Ok(ws.on_upgrade(move |socket| relay(socket, channel, chat, feed)))
}

async fn relay(socket: WebSocket, channel: Channel<Option<UserId>>, chat: ChatId, mut feed: Feed) {
    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<String>(32);

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if sender.send(frame.into()).await.is_err() {
                break;
            }
        }
    });

    let feed_tx = out_tx.clone();
    let feed_task = tokio::spawn(async move {
        while let Some(event) = feed.next().await {
            let frame = match event {
                Ok(event) => Frame::from(event),
                Err(err) => Frame::Error { error: err.to_string(), draft: None },
            };
            if feed_tx.send(frame.encode()).await.is_err() {
                break;
            }
        }
    });

    let recv_chat = chat.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            let Ok(SendMessage { text }) = serde_json::from_slice(&msg.into_data()) else {
                continue
            };

            if let Err(err) = channel.append(&recv_chat, &text).await {
                tracing::info!(chat = %recv_chat, %err, "append over websocket failed");
                let frame = Frame::Error { error: err.to_string(), draft: Some(text) };
                if out_tx.send(frame.encode()).await.is_err() {
                    break;
                }
            }
        }
    });

    // a feed ending on a store error leaves the socket open for sends
    tokio::select! {
        _ = &mut send_task => {}
        _ = &mut recv_task => {}
    }
    send_task.abort();
    feed_task.abort();
    recv_task.abort();
    tracing::debug!(%chat, "websocket closed");
}
