use std::{sync::Arc, time::Duration};

use dewallads::{
    chat::{chat_path, chats, messages_path, Channel, ChatError, ChatId, Directory, Enquiry, FeedEvent, Resolver},
    identity::UserId,
    profiles::{profiles, UNKNOWN_USER},
    store::{DocumentStore, MemoryStore, SharedStore, SqliteStore},
};
use futures_util::StreamExt;
use serde_json::json;
use tokio::{sync::mpsc, time::timeout};

fn user(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

fn now_micros() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000) as i64
}

async fn with_profiles(store: &MemoryStore) {
    store.set(&profiles().doc("alice"), json!({ "fullName": "Alice Varghese" }), false).await.unwrap();
    store.set(&profiles().doc("bob"), json!({ "fullName": "Bob Menon" }), false).await.unwrap();
}

async fn next_event(feed: &mut (impl futures_util::Stream<Item = Result<FeedEvent, ChatError>> + Unpin)) -> FeedEvent {
    timeout(Duration::from_secs(5), feed.next())
        .await
        .expect("feed stalled")
        .expect("feed ended")
        .expect("feed failed")
}

#[tokio::test]
async fn first_contact_creates_alice_bob() {
    let store = MemoryStore::new();
    let shared: SharedStore = Arc::new(store.clone());

    let chat = Resolver::new(shared.clone(), user("alice")).resolve(&user("bob")).await.unwrap();
    assert_eq!(chat.as_str(), "alice_bob");

    let from_bob = Resolver::new(shared.clone(), user("bob")).resolve(&user("alice")).await.unwrap();
    assert_eq!(from_bob, chat);

    let doc = shared.get(&chat_path(&chat)).await.unwrap().unwrap();
    assert_eq!(doc.data["participants"], json!(["alice", "bob"]));
    assert!(doc.data["createdAt"].as_i64().is_some());
}

#[tokio::test]
async fn second_resolve_is_a_read() {
    let store = MemoryStore::new();
    let resolver = Resolver::new(Arc::new(store.clone()), user("alice"));

    resolver.resolve(&user("bob")).await.unwrap();
    resolver.resolve(&user("bob")).await.unwrap();

    assert_eq!(store.create_calls(), 1);
    assert_eq!(store.writes(), 1);
}

#[tokio::test]
async fn concurrent_first_contact_leaves_one_conversation() {
    for _ in 0..20 {
        let store = MemoryStore::new();
        let alice = Resolver::new(Arc::new(store.clone()), user("alice"));
        let bob = Resolver::new(Arc::new(store.clone()), user("bob"));
        let (to_bob, to_alice) = (user("bob"), user("alice"));

        let (a, b) = tokio::join!(alice.resolve(&to_bob), bob.resolve(&to_alice));
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(store.len(&chats()), 1);
    }
}

#[tokio::test]
async fn concurrent_first_contact_on_sqlite() {
    let store: SharedStore = Arc::new(SqliteStore::in_memory().await.unwrap());
    let alice = Resolver::new(store.clone(), user("alice"));
    let bob = Resolver::new(store.clone(), user("bob"));

    let handles = (0..8).map(|i| {
        let (alice, bob) = (Resolver::new(store.clone(), user("alice")), Resolver::new(store.clone(), user("bob")));
        tokio::spawn(async move {
            if i % 2 == 0 {
                alice.resolve(&user("bob")).await
            } else {
                bob.resolve(&user("alice")).await
            }
        })
    });
    for handle in handles.collect::<Vec<_>>() {
        assert_eq!(handle.await.unwrap().unwrap().as_str(), "alice_bob");
    }
    alice.resolve(&user("bob")).await.unwrap();
    bob.resolve(&user("alice")).await.unwrap();

    let all = store.query(&chats(), &Default::default()).await.unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn resolve_requires_sign_in_and_writes_nothing() {
    let store = MemoryStore::new();
    let result = Resolver::new(Arc::new(store.clone()), None::<UserId>).resolve(&user("bob")).await;

    assert!(matches!(result, Err(ChatError::Unauthenticated)));
    assert_eq!(store.create_calls(), 0);
    assert!(store.is_empty(&chats()));
}

#[tokio::test]
async fn appended_message_shows_up_in_snapshot() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let chat = Resolver::new(store.clone(), user("alice")).resolve(&user("bob")).await.unwrap();
    let channel = Channel::new(store.clone(), user("alice"));

    let issued = now_micros();
    channel.append(&chat, "Is this wall available?").await.unwrap();

    let mut feed = channel.subscribe(&chat).await.unwrap();
    let FeedEvent::Snapshot(messages) = next_event(&mut feed).await else {
        panic!("first event must be a snapshot");
    };
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].text, "Is this wall available?");
    assert_eq!(messages[0].sender_id, user("alice"));
    assert!(messages[0].timestamp >= issued);
}

#[tokio::test]
async fn feed_delivers_both_sides_in_timestamp_order() {
    let store: SharedStore = Arc::new(SqliteStore::in_memory().await.unwrap());
    let chat = Resolver::new(store.clone(), user("alice")).resolve(&user("bob")).await.unwrap();
    let alice = Channel::new(store.clone(), user("alice"));
    let bob = Channel::new(store.clone(), user("bob"));

    let mut feed = bob.subscribe(&chat).await.unwrap();
    assert_eq!(next_event(&mut feed).await, FeedEvent::Snapshot(vec![]));

    let sends = (0..10).map(|i| {
        let (alice, bob, chat) = (&alice, &bob, &chat);
        async move {
            let channel = if i % 2 == 0 { alice } else { bob };
            channel.append(chat, &format!("message {i}")).await.unwrap();
        }
    });
    futures_util::future::join_all(sends).await;

    let mut received = Vec::new();
    while received.len() < 10 {
        match next_event(&mut feed).await {
            FeedEvent::Appended(messages) => received.extend(messages),
            other => panic!("unexpected {other:?}"),
        }
    }

    assert!(received.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    let senders: Vec<_> = received.iter().map(|m| m.sender_id.as_str()).collect();
    assert_eq!(senders.iter().filter(|s| **s == "alice").count(), 5);
    assert_eq!(senders.iter().filter(|s| **s == "bob").count(), 5);

    let mut fresh = bob.subscribe(&chat).await.unwrap();
    let FeedEvent::Snapshot(all) = next_event(&mut fresh).await else {
        panic!("first event must be a snapshot");
    };
    assert_eq!(all, received);
}

#[tokio::test]
async fn detached_listener_hears_nothing_more() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let chat = Resolver::new(store.clone(), user("alice")).resolve(&user("bob")).await.unwrap();
    let channel = Channel::new(store.clone(), user("alice"));
    channel.append(&chat, "Is this wall available?").await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let listener = channel
        .listen(&chat, move |event| {
            let _ = tx.send(event);
        })
        .await
        .unwrap();

    let first = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap().unwrap();
    assert_eq!(first.messages().len(), 1);

    listener.detach();
    channel.append(&chat, "Hello?").await.unwrap();

    // the observer (and its sender) is gone, so the channel drains to None
    assert!(timeout(Duration::from_secs(5), rx.recv()).await.unwrap().is_none());
}

#[tokio::test]
async fn detached_feed_is_released() {
    let store = MemoryStore::new();
    let shared: SharedStore = Arc::new(store.clone());
    let chat = Resolver::new(shared.clone(), user("alice")).resolve(&user("bob")).await.unwrap();
    let channel = Channel::new(shared, user("alice"));

    let mut feed = channel.subscribe(&chat).await.unwrap();
    next_event(&mut feed).await;
    feed.detach();

    channel.append(&chat, "still works").await.unwrap();
    assert_eq!(store.len(&messages_path(&chat)), 1);
}

#[tokio::test]
async fn feed_reports_store_failure_once_then_ends() {
    let store = MemoryStore::new();
    let shared: SharedStore = Arc::new(store.clone());
    let chat = Resolver::new(shared.clone(), user("alice")).resolve(&user("bob")).await.unwrap();
    let channel = Channel::new(shared, user("alice"));
    channel.append(&chat, "Is this wall available?").await.unwrap();

    let mut feed = channel.subscribe(&chat).await.unwrap();
    next_event(&mut feed).await;

    // current-thread runtime: the watcher re-reads only once the feed is polled
    channel.append(&chat, "Hello?").await.unwrap();
    store.set_unavailable(&messages_path(&chat), true);

    let failed = timeout(Duration::from_secs(5), feed.next()).await.unwrap();
    assert!(matches!(failed, Some(Err(ChatError::Transient(_)))), "got {failed:?}");
    assert!(timeout(Duration::from_secs(5), feed.next()).await.unwrap().is_none());
}

#[tokio::test]
async fn append_rules() {
    let store = MemoryStore::new();
    let shared: SharedStore = Arc::new(store.clone());
    let chat = Resolver::new(shared.clone(), user("alice")).resolve(&user("bob")).await.unwrap();

    let anonymous = Channel::new(shared.clone(), None::<UserId>);
    assert!(matches!(anonymous.append(&chat, "hi").await, Err(ChatError::Unauthenticated)));

    let alice = Channel::new(shared.clone(), user("alice"));
    assert!(matches!(alice.append(&chat, "  \n").await, Err(ChatError::EmptyMessage)));

    let carol = Channel::new(shared.clone(), user("carol"));
    assert!(matches!(carol.append(&chat, "hi").await, Err(ChatError::NotParticipant(..))));
    assert!(matches!(carol.subscribe(&chat).await, Err(ChatError::NotParticipant(..))));

    let nowhere = ChatId::new("alice_zed").unwrap();
    assert!(matches!(alice.append(&nowhere, "hi").await, Err(ChatError::NotFound(_))));

    assert!(store.is_empty(&messages_path(&chat)));
}

#[tokio::test]
async fn failed_append_is_reported_and_can_be_resent() {
    let store = MemoryStore::new();
    let shared: SharedStore = Arc::new(store.clone());
    let chat = Resolver::new(shared.clone(), user("alice")).resolve(&user("bob")).await.unwrap();
    let alice = Channel::new(shared, user("alice"));

    let draft = String::from("Is this wall available?");
    store.set_unavailable(&messages_path(&chat), true);
    assert!(matches!(alice.append(&chat, &draft).await, Err(ChatError::Transient(_))));

    store.set_unavailable(&messages_path(&chat), false);
    let sent = alice.append(&chat, &draft).await.unwrap();
    assert_eq!(sent.text, draft);
    assert_eq!(store.len(&messages_path(&chat)), 1);
}

#[tokio::test]
async fn directory_lists_with_counterpart_names() {
    let store = MemoryStore::new();
    with_profiles(&store).await;
    let shared: SharedStore = Arc::new(store.clone());

    let chat = Resolver::new(shared.clone(), user("alice")).resolve(&user("bob")).await.unwrap();
    Channel::new(shared.clone(), user("alice")).append(&chat, "Is this wall available?").await.unwrap();

    let listing = Directory::new(shared.clone()).list(&user("bob")).await.unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].id.as_str(), "alice_bob");
    assert_eq!(listing[0].title, "Alice Varghese");
    assert_eq!(listing[0].counterpart, Some(user("alice")));

    let title = Directory::new(shared).title(&chat, &user("alice")).await.unwrap();
    assert_eq!(title, "Bob Menon");
}

#[tokio::test]
async fn directory_degrades_titles_when_profiles_fail() {
    let store = MemoryStore::new();
    with_profiles(&store).await;
    let shared: SharedStore = Arc::new(store.clone());

    Resolver::new(shared.clone(), user("bob")).resolve(&user("alice")).await.unwrap();
    Resolver::new(shared.clone(), user("bob")).resolve(&user("carol")).await.unwrap();
    store
        .set(&chats().doc("bob_carol"), json!({ "titles": { "bob": "Carol (wall on MG Road)" } }), true)
        .await
        .unwrap();

    store.set_unavailable(&profiles(), true);
    let listing = Directory::new(shared).list(&user("bob")).await.unwrap();

    let titles: Vec<_> = listing.iter().map(|c| (c.id.as_str(), c.title.as_str())).collect();
    assert!(titles.contains(&("alice_bob", UNKNOWN_USER)));
    assert!(titles.contains(&("bob_carol", "Carol (wall on MG Road)")));
}

#[tokio::test]
async fn directory_skips_malformed_conversations() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    Resolver::new(store.clone(), user("alice")).resolve(&user("bob")).await.unwrap();
    store
        .set(
            &chats().doc("bob_carol"),
            json!({ "participants": ["bob", "carol"], "createdAt": { "seconds": 1700000000, "nanoseconds": 0 } }),
            false,
        )
        .await
        .unwrap();

    let listing = Directory::new(store).list(&user("bob")).await.unwrap();
    let ids: Vec<_> = listing.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, ["alice_bob"]);
}

#[tokio::test]
async fn directory_is_newest_first_and_point_in_time() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let bob = Resolver::new(store.clone(), user("bob"));
    bob.resolve(&user("alice")).await.unwrap();
    bob.resolve(&user("carol")).await.unwrap();

    let directory = Directory::new(store.clone());
    let before = directory.list(&user("bob")).await.unwrap();
    let ids: Vec<_> = before.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, ["bob_carol", "alice_bob"]);

    bob.resolve(&user("dave")).await.unwrap();
    assert_eq!(before.len(), 2);
    assert_eq!(directory.list(&user("bob")).await.unwrap().len(), 3);
    assert!(directory.list(&user("carol")).await.unwrap().iter().all(|c| c.id.as_str() == "bob_carol"));
}

#[tokio::test]
async fn enquiry_opens_chat_with_wall_owner() {
    let store = MemoryStore::new();
    let shared: SharedStore = Arc::new(store.clone());
    shared
        .set(
            &dewallads::chat::walls().doc("wall-1"),
            json!({ "owner_uid": "bob", "city": "Kochi", "price": 4500 }),
            false,
        )
        .await
        .unwrap();

    let chat = Enquiry::new(shared.clone(), user("alice")).enquire("wall-1").await.unwrap();
    assert_eq!(chat.as_str(), "alice_bob");

    let mut feed = Channel::new(shared.clone(), user("bob")).subscribe(&chat).await.unwrap();
    let FeedEvent::Snapshot(messages) = next_event(&mut feed).await else {
        panic!("first event must be a snapshot");
    };
    assert_eq!(messages.len(), 1);
    assert!(messages[0].text.contains("City: Kochi"));
    assert!(messages[0].text.contains("Price: ₹4500"));
    assert!(messages[0].text.ends_with("Is this wall still available?"));

    let own = Enquiry::new(shared.clone(), user("bob")).enquire("wall-1").await;
    assert!(matches!(own, Err(ChatError::InvalidParticipant(_))));

    let missing = Enquiry::new(shared, user("alice")).enquire("wall-404").await;
    assert!(matches!(missing, Err(ChatError::NotFound(_))));
}
