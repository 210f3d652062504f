//! End-to-end presence and relay scenarios, driven through `Gateway` the same
//! way a socket connection drives it.

use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use mersal_db::Database;
use mersal_gateway::{Gateway, Presence, Relay, Store};
use mersal_media::MediaHost;
use mersal_types::api::SendMessagePayload;
use mersal_types::events::{ClientCommand, SendOutcome, ServerEvent};
use mersal_types::models::SessionUser;

struct NoMedia;

#[async_trait]
impl MediaHost for NoMedia {
    fn id(&self) -> &'static str {
        "none"
    }

    async fn upload_image(&self, _image: &str) -> Result<String> {
        bail!("uploads disabled in tests")
    }
}

fn setup() -> (Gateway, Store) {
    let db: Store = Arc::new(Database::open_in_memory().unwrap());
    let presence = Presence::new();
    let relay = Relay::new(db.clone(), Arc::new(NoMedia), presence.clone());
    (Gateway::new(presence, relay), db)
}

fn add_user(db: &Store, name: &str) -> SessionUser {
    let id = Uuid::new_v4();
    let email = format!("{name}@example.com");
    db.create_user(&id.to_string(), name, &email, "hash").unwrap();
    SessionUser {
        id,
        full_name: name.to_string(),
        email,
        profile_pic: None,
    }
}

fn send_text(receiver_id: Uuid, text: &str) -> ClientCommand {
    ClientCommand::SendMessage(SendMessagePayload {
        receiver_id: receiver_id.to_string(),
        text: Some(text.to_string()),
        image: None,
    })
}

fn drain_targeted(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

fn drain_broadcast(rx: &mut broadcast::Receiver<ServerEvent>) -> Vec<ServerEvent> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

#[tokio::test]
async fn connect_announces_online_users_to_everyone() {
    let (gateway, db) = setup();
    let alice = add_user(&db, "alice");
    let bob = add_user(&db, "bob");

    let (_a, mut a_streams) = gateway.attach(alice.clone()).await;
    let (_b, mut b_streams) = gateway.attach(bob.clone()).await;

    let mut both = vec![alice.id, bob.id];
    both.sort();

    assert_eq!(
        drain_broadcast(&mut a_streams.broadcast),
        vec![
            ServerEvent::GetOnlineUsers(vec![alice.id]),
            ServerEvent::GetOnlineUsers(both.clone()),
        ]
    );
    assert_eq!(
        drain_broadcast(&mut b_streams.broadcast),
        vec![ServerEvent::GetOnlineUsers(both.clone())]
    );
    assert_eq!(gateway.presence().snapshot().await, both);
}

#[tokio::test]
async fn message_between_online_users_reaches_receiver_and_acks_sender() {
    let (gateway, db) = setup();
    let alice = add_user(&db, "alice");
    let bob = add_user(&db, "bob");
    let carol = add_user(&db, "carol");

    let (a, mut a_streams) = gateway.attach(alice.clone()).await;
    let (_b, mut b_streams) = gateway.attach(bob.clone()).await;
    let (_c, mut c_streams) = gateway.attach(carol.clone()).await;

    gateway.handle_command(&a, send_text(bob.id, "hi")).await;

    let a_events = drain_targeted(&mut a_streams.targeted);
    let [ServerEvent::SendMessageResponse(response)] = a_events.as_slice() else {
        panic!("expected one sendMessageResponse, got {a_events:?}");
    };
    assert!(response.success);
    let SendOutcome::Sent(sent) = &response.info else {
        panic!("expected a message in info");
    };
    assert_eq!(sent.text.as_deref(), Some("hi"));

    assert_eq!(
        drain_targeted(&mut b_streams.targeted),
        vec![ServerEvent::NewMessage(sent.clone())]
    );
    assert!(drain_targeted(&mut c_streams.targeted).is_empty());
    assert_eq!(db.count_messages().unwrap(), 1);
}

#[tokio::test]
async fn message_to_self_fails_and_stores_nothing() {
    let (gateway, db) = setup();
    let alice = add_user(&db, "alice");
    let (a, mut a_streams) = gateway.attach(alice.clone()).await;

    gateway.handle_command(&a, send_text(alice.id, "hi")).await;

    let events = drain_targeted(&mut a_streams.targeted);
    let [ServerEvent::SendMessageResponse(response)] = events.as_slice() else {
        panic!("expected one sendMessageResponse, got {events:?}");
    };
    assert!(!response.success);
    assert_eq!(
        response.info,
        SendOutcome::Failed("You cannot send message to yourself".into())
    );
    assert_eq!(db.count_messages().unwrap(), 0);
}

#[tokio::test]
async fn message_to_disconnected_user_is_stored_but_not_pushed() {
    let (gateway, db) = setup();
    let alice = add_user(&db, "alice");
    let bob = add_user(&db, "bob");

    let (a, mut a_streams) = gateway.attach(alice.clone()).await;
    let (b, mut b_streams) = gateway.attach(bob.clone()).await;
    gateway.detach(&b).await;

    assert_eq!(gateway.presence().snapshot().await, vec![alice.id]);
    let broadcasts = drain_broadcast(&mut a_streams.broadcast);
    assert_eq!(
        broadcasts.last(),
        Some(&ServerEvent::UserDisconnected(bob.id))
    );

    gateway.handle_command(&a, send_text(bob.id, "are you there?")).await;

    let events = drain_targeted(&mut a_streams.targeted);
    let [ServerEvent::SendMessageResponse(response)] = events.as_slice() else {
        panic!("expected one sendMessageResponse, got {events:?}");
    };
    assert!(response.success);
    assert!(drain_targeted(&mut b_streams.targeted).is_empty());
    assert_eq!(db.count_messages().unwrap(), 1);
}

#[tokio::test]
async fn reconnect_keeps_presence_when_old_connection_closes() {
    let (gateway, db) = setup();
    let alice = add_user(&db, "alice");
    let bob = add_user(&db, "bob");

    let (old, _old_streams) = gateway.attach(bob.clone()).await;
    let (new, mut new_streams) = gateway.attach(bob.clone()).await;
    gateway.detach(&old).await;

    assert_eq!(gateway.presence().lookup(bob.id).await, Some(new.conn_id));

    let (a, _a_streams) = gateway.attach(alice.clone()).await;
    gateway.handle_command(&a, send_text(bob.id, "hello again")).await;

    let events = drain_targeted(&mut new_streams.targeted);
    assert!(matches!(events.as_slice(), [ServerEvent::NewMessage(m)] if m.sender_id == alice.id));
}

#[tokio::test]
async fn response_to_vanished_sender_is_dropped_but_message_kept() {
    let (gateway, db) = setup();
    let alice = add_user(&db, "alice");
    let bob = add_user(&db, "bob");

    let (a, a_streams) = gateway.attach(alice.clone()).await;
    drop(a_streams);
    gateway.detach(&a).await;

    gateway.handle_command(&a, send_text(bob.id, "bye")).await;
    assert_eq!(db.count_messages().unwrap(), 1);
}

#[tokio::test]
async fn malformed_send_frames_are_answered() {
    let (gateway, db) = setup();
    let alice = add_user(&db, "alice");
    let (a, mut a_streams) = gateway.attach(alice.clone()).await;

    gateway
        .handle_frame(&a, r#"{"type":"sendMessage","data":{"receiverId":"u2","text":"hi"}}"#)
        .await;
    gateway
        .handle_frame(&a, r#"{"type":"sendMessage","data":{"text":"no receiver"}}"#)
        .await;
    gateway
        .handle_frame(&a, r#"{"type":"sendMessage","data":{"receiverId":"u2","text":5}}"#)
        .await;

    let failures: Vec<SendOutcome> = drain_targeted(&mut a_streams.targeted)
        .into_iter()
        .map(|event| match event {
            ServerEvent::SendMessageResponse(response) if !response.success => response.info,
            other => panic!("expected a failed sendMessageResponse, got {other:?}"),
        })
        .collect();
    assert_eq!(
        failures,
        vec![
            SendOutcome::Failed("Receiver not found".into()),
            SendOutcome::Failed("Receiver not found".into()),
            SendOutcome::Failed("Invalid message payload".into()),
        ]
    );
    assert_eq!(db.count_messages().unwrap(), 0);
}

#[tokio::test]
async fn unknown_frames_get_no_reply() {
    let (gateway, db) = setup();
    let alice = add_user(&db, "alice");
    let (a, mut a_streams) = gateway.attach(alice.clone()).await;

    gateway.handle_frame(&a, r#"{"type":"typing","data":{}}"#).await;
    gateway.handle_frame(&a, "not json").await;

    assert!(drain_targeted(&mut a_streams.targeted).is_empty());
}

#[tokio::test]
async fn well_formed_frame_is_relayed() {
    let (gateway, db) = setup();
    let alice = add_user(&db, "alice");
    let bob = add_user(&db, "bob");
    let (a, mut a_streams) = gateway.attach(alice.clone()).await;
    let (_b, mut b_streams) = gateway.attach(bob.clone()).await;

    let raw = format!(r#"{{"type":"sendMessage","data":{{"receiverId":"{}","text":"hi"}}}}"#, bob.id);
    gateway.handle_frame(&a, &raw).await;

    assert!(matches!(
        drain_targeted(&mut a_streams.targeted).as_slice(),
        [ServerEvent::SendMessageResponse(r)] if r.success
    ));
    assert!(matches!(
        drain_targeted(&mut b_streams.targeted).as_slice(),
        [ServerEvent::NewMessage(m)] if m.sender_id == alice.id
    ));
}
