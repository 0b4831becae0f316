use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

use crate::{
    chat::ChatResult,
    identity::UserId,
    store::{CollectionPath, SharedStore, StoreError, StoreResult},
};

pub const UNKNOWN_USER: &str = "Unknown User";

pub fn profiles() -> CollectionPath {
    CollectionPath::new("dewall/user_node/profile")
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(alias = "full_name", skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_type: Option<String>,
}

impl UserProfile {
    /// The profile's name, or [`UNKNOWN_USER`] when it is missing or blank.
    pub fn display_name(&self) -> String {
        self.name().unwrap_or(UNKNOWN_USER).to_owned()
    }

    fn name(&self) -> Option<&str> {
        self.full_name.as_deref().filter(|name| !name.trim().is_empty())
    }
}

#[derive(Clone)]
pub struct Profiles {
    store: SharedStore,
}

impl Profiles {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub async fn get(&self, user: &UserId) -> ChatResult<Option<UserProfile>> {
        Ok(self.fetch(user).await?)
    }

    /// Creates the profile on first sign-in. Returns whether one was created.
    pub async fn ensure(&self, user: &UserId, full_name: Option<&str>, email: Option<&str>) -> ChatResult<bool> {
        let profile = UserProfile {
            full_name: full_name.map(str::to_owned),
            email: email.map(str::to_owned),
            ..Default::default()
        };
        self.create(user, profile).await
    }

    /// Writes `profile` unless the user already has one. A profile without a
    /// name gets a random "Adjective Noun" alias.
    pub async fn create(&self, user: &UserId, mut profile: UserProfile) -> ChatResult<bool> {
        if profile.name().is_none() {
            profile.full_name = Some(random_alias());
        }

        let data = serde_json::to_value(&profile).map_err(StoreError::from)?;
        let created = self.store.create(&profiles().doc(user.as_str()), data).await?;
        if created {
            tracing::info!(%user, name = profile.full_name.as_deref().unwrap_or_default(), "profile created");
        } else {
            tracing::debug!(%user, "profile already exists");
        }
        Ok(created)
    }

    pub(crate) async fn name(&self, user: &UserId) -> StoreResult<Option<String>> {
        Ok(self.fetch(user).await?.as_ref().and_then(UserProfile::name).map(str::to_owned))
    }

    async fn fetch(&self, user: &UserId) -> StoreResult<Option<UserProfile>> {
        match self.store.get(&profiles().doc(user.as_str())).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }
}

fn random_alias() -> String {
    let adjectives = [
        "Quick", "Lazy", "Mysterious", "Jolly", "Brave", "Silent", "Witty", "Fierce",
        "Clever", "Gentle", "Wild", "Calm", "Bold", "Shy", "Proud", "Happy",
        "Eager", "Fancy", "Rusty", "Golden", "Silver", "Bright", "Lucky",
    ];
    let nouns = [
        "Fox", "Bear", "Eagle", "Wolf", "Dragon", "Tiger", "Lion", "Owl", "Rabbit",
        "Falcon", "Hawk", "Shark", "Panda", "Kitten", "Phoenix", "Griffin",
        "Turtle", "Dolphin", "Whale", "Elephant", "Giraffe", "Zebra",
    ];

    let mut rng = rand::rng();
    format!(
        "{} {}",
        adjectives.choose(&mut rng).unwrap_or(&"Quiet"),
        nouns.choose(&mut rng).unwrap_or(&"Wall"),
    )
}
