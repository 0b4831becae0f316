use serde::Deserialize;
use serde_json::Value;

use crate::{
    identity::{Identity, UserId},
    store::{CollectionPath, SharedStore},
};

use super::{Channel, ChatError, ChatId, ChatResult, Resolver};

pub fn walls() -> CollectionPath {
    CollectionPath::new("dewall/database/wall_list")
}

/// The parts of a wall listing an enquiry needs.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Wall {
    pub owner_uid: Option<String>,
    pub city: Option<Value>,
    pub district: Option<Value>,
    pub pincode: Option<Value>,
    pub state: Option<Value>,
    pub locality: Option<Value>,
    pub price: Option<Value>,
}

fn field(value: &Option<Value>) -> String {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_owned(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "N/A".to_owned(),
    }
}

impl Wall {
    pub fn enquiry_text(&self) -> String {
        format!(
            "Wall Details:\n\
             City: {}\n\
             District: {}\n\
             Pincode: {}\n\
             State: {}\n\
             Locality: {}\n\
             Price: ₹{}\n\
             \n\
             Is this wall still available?",
            field(&self.city),
            field(&self.district),
            field(&self.pincode),
            field(&self.state),
            field(&self.locality),
            field(&self.price),
        )
    }
}

/// Opens (or reopens) the chat with a wall's owner and sends the standard
/// enquiry about that wall.
pub struct Enquiry<I> {
    store: SharedStore,
    resolver: Resolver<I>,
    channel: Channel<I>,
}

impl<I: Identity + Clone> Enquiry<I> {
    pub fn new(store: SharedStore, identity: I) -> Self {
        Self {
            resolver: Resolver::new(store.clone(), identity.clone()),
            channel: Channel::new(store.clone(), identity),
            store,
        }
    }

    pub async fn enquire(&self, wall_id: &str) -> ChatResult<ChatId> {
        let missing = || ChatError::NotFound(format!("wall {wall_id}"));

        let doc = self.store.get(&walls().doc(wall_id)).await?.ok_or_else(missing)?;
        let wall: Wall = doc.decode()?;
        let owner = wall
            .owner_uid
            .clone()
            .and_then(|uid| UserId::new(uid).ok())
            .ok_or_else(missing)?;

        let chat = self.resolver.resolve(&owner).await?;
        self.channel.append(&chat, &wall.enquiry_text()).await?;
        tracing::info!(%chat, wall = wall_id, "enquiry sent");
        Ok(chat)
    }
}
