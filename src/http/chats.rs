use axum::{debug_handler, extract::{Path, State}, Json};
use pulldown_cmark::{html, CowStr, Event, Parser};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::{
    chat::{Channel, ChatError, ChatId, ChatSummary, Directory, Enquiry, Message, Resolver},
    identity::UserId,
    session::current_user,
    store::SharedStore,
    AppResult,
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MessageView {
    id: String,
    sender_id: UserId,
    text: String,
    html: String,
    timestamp: i64,
}

impl From<Message> for MessageView {
    fn from(message: Message) -> Self {
        // raw html in a message is shown, not rendered
        let parser = Parser::new(&message.text).map(|event| match event {
            Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(CowStr::from(raw.into_string())),
            _ => event,
        });
        let mut rendered = String::new();
        html::push_html(&mut rendered, parser);

        MessageView {
            id: message.id,
            sender_id: message.sender_id,
            text: message.text,
            html: rendered,
            timestamp: message.timestamp,
        }
    }
}

#[derive(Serialize)]
pub(crate) struct ChatRef {
    id: ChatId,
}

#[derive(Serialize)]
pub(crate) struct Title {
    title: String,
}

#[derive(Deserialize)]
pub(crate) struct SendMessage {
    pub(crate) text: String,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn list(
    State(store): State<SharedStore>,
    session: Session,
) -> AppResult<Json<Vec<ChatSummary>>> {
    let user = current_user(&session).await?.ok_or(ChatError::Unauthenticated)?;
    Ok(Json(Directory::new(store).list(&user).await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn title(
    Path(chat_id): Path<String>,
    State(store): State<SharedStore>,
    session: Session,
) -> AppResult<Json<Title>> {
    let user = current_user(&session).await?.ok_or(ChatError::Unauthenticated)?;
    let chat = ChatId::new(chat_id)?;
    let title = Directory::new(store).title(&chat, &user).await?;
    Ok(Json(Title { title }))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn resolve(
    Path(user_id): Path<String>,
    State(store): State<SharedStore>,
    session: Session,
) -> AppResult<Json<ChatRef>> {
    let me = current_user(&session).await?;
    let counterpart = UserId::new(user_id)?;
    let id = Resolver::new(store, me).resolve(&counterpart).await?;
    Ok(Json(ChatRef { id }))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn send(
    Path(chat_id): Path<String>,
    State(store): State<SharedStore>,
    session: Session,
    Json(SendMessage { text }): Json<SendMessage>,
) -> AppResult<Json<MessageView>> {
    let me = current_user(&session).await?;
    let chat = ChatId::new(chat_id)?;
    let message = Channel::new(store, me).append(&chat, &text).await?;
    Ok(Json(message.into()))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn enquire(
    Path(wall_id): Path<String>,
    State(store): State<SharedStore>,
    session: Session,
) -> AppResult<Json<ChatRef>> {
    let me = current_user(&session).await?;
    let id = Enquiry::new(store, me).enquire(&wall_id).await?;
    Ok(Json(ChatRef { id }))
}
