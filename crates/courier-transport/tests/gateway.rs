//! End-to-end tests against a live server on an ephemeral port.

#![cfg(all(feature = "http", feature = "ws"))]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

use courier_core::{
    AuthGate, Bot, BotEvent, CourierContext, CourierError, CourierResult, EventHub, EventKind,
    HubConfig, Identity, JsonCodec, SessionConfig, SessionKey, SessionManager, StaticBotRegistry,
};
use courier_transport::{HttpAdapter, HttpConfig, TransportSet, WsAdapter, WsConfig, server};

const SECRET: &str = "secret";

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Echo(Identity);

#[async_trait]
impl Bot for Echo {
    fn identity(&self) -> Identity {
        self.0
    }

    async fn execute(&self, command: &str, _: Option<&str>, content: Value) -> CourierResult<Value> {
        match command {
            "unknown" => Err(CourierError::UnsupportedCommand(command.to_string())),
            "hang" => std::future::pending().await,
            _ => Ok(json!({ "command": command, "content": content })),
        }
    }
}

struct Gateway {
    addr: SocketAddr,
    hub: EventHub,
    sessions: Arc<SessionManager>,
    client: reqwest::Client,
    token: CancellationToken,
}

impl Gateway {
    async fn start(cache_capacity: usize) -> Self {
        let bots = Arc::new(StaticBotRegistry::new());
        bots.register(Arc::new(Echo(Identity(1))));
        bots.register(Arc::new(Echo(Identity(2))));

        let sessions = Arc::new(SessionManager::new(SessionConfig::default(), bots));
        let ctx = CourierContext::new(
            sessions.clone(),
            AuthGate::new(Some(SECRET.into()), true),
            Arc::new(JsonCodec),
            false,
        );
        let transports = TransportSet {
            http: Some(Arc::new(HttpAdapter::new(HttpConfig { cache_capacity }))),
            ws: Some(Arc::new(WsAdapter::new(WsConfig::default(), ctx.codec.clone()))),
            ..Default::default()
        };
        let hub = EventHub::new(
            sessions.clone(),
            transports.adapters(),
            ctx.codec.clone(),
            HubConfig::default(),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let token = CancellationToken::new();
        let handle = server::serve(listener, transports.router(&ctx), token.clone()).unwrap();

        Self {
            addr: handle.local_addr(),
            hub,
            sessions,
            client: reqwest::Client::new(),
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    async fn get(&self, path: &str) -> Value {
        self.client
            .get(self.url(path))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    async fn post(&self, path: &str, body: Value) -> Value {
        self.client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    /// Verifies and binds a new session to `qq`.
    async fn session_for(&self, qq: i64) -> String {
        let verified = self.post("/verify", json!({ "verifyKey": SECRET })).await;
        assert_eq!(verified["code"], 0);
        let key = verified["session"].as_str().unwrap().to_string();

        let bound = self.post("/bind", json!({ "sessionKey": key, "qq": qq })).await;
        assert_eq!(bound["code"], 0);
        key
    }

    async fn emit(&self, origin: i64, text: &str) {
        self.hub
            .dispatch(BotEvent::new(origin, EventKind::friend_text(9, text)))
            .await;
    }

    /// Opens a channel and waits for the verification frame.
    async fn connect(&self, channel: &str, session: &str) -> Socket {
        let url = format!(
            "ws://{}/{channel}?verifyKey={SECRET}&sessionKey={session}",
            self.addr
        );
        let (mut socket, _) = connect_async(url).await.unwrap();
        let hello = next_json(&mut socket).await;
        assert_eq!(hello["data"]["code"], 0);
        assert_eq!(hello["data"]["session"], session);
        socket
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn next_message(socket: &mut Socket, wait: Duration) -> Option<Message> {
    match tokio::time::timeout(wait, socket.next()).await {
        Ok(Some(Ok(message))) => Some(message),
        _ => None,
    }
}

async fn next_json(socket: &mut Socket) -> Value {
    match next_message(socket, Duration::from_secs(5)).await {
        Some(Message::Text(text)) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

fn texts(events: &Value) -> Vec<&str> {
    events
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["messageChain"][0]["text"].as_str().unwrap())
        .collect()
}

// ─── HTTP ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_http_poll_keeps_newest_events() {
    let gateway = Gateway::start(3).await;
    let key = gateway.session_for(1).await;

    for i in 1..=5 {
        gateway.emit(1, &i.to_string()).await;
    }

    let count = gateway.get(&format!("/countMessage?sessionKey={key}")).await;
    assert_eq!(count["data"], 3);

    let fetched = gateway
        .get(&format!("/fetchMessage?sessionKey={key}&count=10"))
        .await;
    assert_eq!(fetched["code"], 0);
    assert_eq!(texts(&fetched["data"]), ["3", "4", "5"]);

    let count = gateway.get(&format!("/countMessage?sessionKey={key}")).await;
    assert_eq!(count["data"], 0);
}

#[tokio::test]
async fn test_http_fetch_latest_and_peek() {
    let gateway = Gateway::start(16).await;
    let key = gateway.session_for(1).await;
    for text in ["a", "b", "c"] {
        gateway.emit(1, text).await;
    }

    let peeked = gateway
        .get(&format!("/peekMessage?sessionKey={key}&count=2"))
        .await;
    assert_eq!(texts(&peeked["data"]), ["a", "b"]);

    let latest = gateway
        .get(&format!("/fetchLatestMessage?sessionKey={key}&count=2"))
        .await;
    assert_eq!(texts(&latest["data"]), ["c", "b"]);

    let rest = gateway.get(&format!("/fetchMessage?sessionKey={key}")).await;
    assert_eq!(texts(&rest["data"]), ["a"]);
}

#[tokio::test]
async fn test_http_events_only_reach_bound_sessions() {
    let gateway = Gateway::start(16).await;
    let first = gateway.session_for(1).await;
    let second = gateway.session_for(2).await;

    gateway.emit(1, "for one").await;

    let one = gateway.get(&format!("/countMessage?sessionKey={first}")).await;
    let two = gateway.get(&format!("/countMessage?sessionKey={second}")).await;
    assert_eq!(one["data"], 1);
    assert_eq!(two["data"], 0);
}

#[tokio::test]
async fn test_http_status_codes() {
    let gateway = Gateway::start(16).await;

    let bad_key = gateway.post("/verify", json!({ "verifyKey": "wrong" })).await;
    assert_eq!(bad_key["code"], 1);

    let no_session = gateway.get("/fetchMessage?sessionKey=missing").await;
    assert_eq!(no_session["code"], 3);

    let verified = gateway.post("/verify", json!({ "verifyKey": SECRET })).await;
    let key = verified["session"].as_str().unwrap();
    let unbound = gateway.get(&format!("/fetchMessage?sessionKey={key}")).await;
    assert_eq!(unbound["code"], 4);

    let no_bot = gateway.post("/bind", json!({ "sessionKey": key, "qq": 404 })).await;
    assert_eq!(no_bot["code"], 2);
}

#[tokio::test]
async fn test_http_actions() {
    let gateway = Gateway::start(16).await;
    let key = gateway.session_for(1).await;

    let about = gateway.get("/about").await;
    assert_eq!(about["data"]["version"], env!("CARGO_PKG_VERSION"));

    let info = gateway.get(&format!("/sessionInfo?sessionKey={key}")).await;
    assert_eq!(info["data"]["qq"]["id"], 1);

    let sent = gateway
        .get(&format!("/sendFriendMessage?sessionKey={key}&target=9"))
        .await;
    assert_eq!(sent["data"]["command"], "sendFriendMessage");
    assert_eq!(sent["data"]["content"], json!({ "target": 9 }));

    let posted = gateway
        .post("/recall", json!({ "sessionKey": key, "messageId": 7 }))
        .await;
    assert_eq!(posted["data"]["content"]["messageId"], 7);

    let envelope = gateway
        .post(
            "/",
            json!({ "sessionKey": key, "syncId": "3", "command": "sendFriendMessage", "content": { "target": 9 } }),
        )
        .await;
    assert_eq!(envelope["syncId"], "3");
    assert_eq!(envelope["data"]["command"], "sendFriendMessage");

    // Same validation as WebSocket action frames.
    let empty = gateway.post("/", json!({ "sessionKey": key, "command": "" })).await;
    assert_eq!(empty["code"], 400);

    let unsupported = gateway.get(&format!("/unknown?sessionKey={key}")).await;
    assert_eq!(unsupported["code"], 6);

    let released = gateway
        .post("/release", json!({ "sessionKey": key, "qq": 1 }))
        .await;
    assert_eq!(released["code"], 0);
    let gone = gateway.get(&format!("/sessionInfo?sessionKey={key}")).await;
    assert_eq!(gone["code"], 3);
}

// ─── WebSocket ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_ws_event_reaches_only_its_session() {
    let gateway = Gateway::start(16).await;
    let first = gateway.session_for(1).await;
    let second = gateway.session_for(2).await;
    let mut one = gateway.connect("message", &first).await;
    let mut two = gateway.connect("all", &second).await;

    gateway.emit(1, "hello").await;

    let frame = next_json(&mut one).await;
    assert_eq!(frame["syncId"], "-1");
    assert_eq!(frame["data"]["type"], "FriendMessage");
    assert_eq!(frame["data"]["messageChain"][0]["text"], "hello");

    assert!(next_message(&mut one, Duration::from_millis(200)).await.is_none());
    assert!(next_message(&mut two, Duration::from_millis(200)).await.is_none());
}

#[tokio::test]
async fn test_ws_event_channel_skips_messages() {
    let gateway = Gateway::start(16).await;
    let key = gateway.session_for(1).await;
    let mut events = gateway.connect("event", &key).await;

    gateway.emit(1, "not an event").await;
    gateway
        .hub
        .dispatch(BotEvent::new(1, EventKind::BotReloginEvent { qq: Identity(1) }))
        .await;

    let frame = next_json(&mut events).await;
    assert_eq!(frame["data"]["type"], "BotReloginEvent");
}

#[tokio::test]
async fn test_ws_new_connection_replaces_old() {
    let gateway = Gateway::start(16).await;
    let key = gateway.session_for(1).await;
    let mut old = gateway.connect("message", &key).await;
    let mut new = gateway.connect("message", &key).await;

    match next_message(&mut old, Duration::from_secs(5)).await {
        Some(Message::Close(_)) | None => {}
        other => panic!("expected the old connection to close, got {other:?}"),
    }

    gateway.emit(1, "to new").await;
    let frame = next_json(&mut new).await;
    assert_eq!(frame["data"]["messageChain"][0]["text"], "to new");
}

#[tokio::test]
async fn test_ws_rejects_bad_verify_key() {
    let gateway = Gateway::start(16).await;
    let url = format!("ws://{}/message?verifyKey=wrong&sessionKey=x", gateway.addr);
    let (mut socket, _) = connect_async(url).await.unwrap();

    let frame = next_json(&mut socket).await;
    assert_eq!(frame["data"]["code"], 1);
    match next_message(&mut socket, Duration::from_secs(5)).await {
        Some(Message::Close(_)) | None => {}
        other => panic!("expected a close frame, got {other:?}"),
    }
}

#[tokio::test]
async fn test_ws_action_frames() {
    let gateway = Gateway::start(16).await;
    let key = gateway.session_for(1).await;
    let mut socket = gateway.connect("all", &key).await;

    let request = json!({
        "syncId": "5",
        "command": "sendGroupMessage",
        "content": { "target": 100 },
    });
    socket.send(Message::text(request.to_string())).await.unwrap();
    let reply = next_json(&mut socket).await;
    assert_eq!(reply["syncId"], "5");
    assert_eq!(reply["data"]["command"], "sendGroupMessage");
    assert_eq!(reply["data"]["content"]["target"], 100);

    socket.send(Message::text("not json".to_string())).await.unwrap();
    let reply = next_json(&mut socket).await;
    assert_eq!(reply["data"]["code"], 400);
}

#[tokio::test]
async fn test_ws_temporary_session_closes_with_connection() {
    let gateway = Gateway::start(16).await;
    let url = format!("ws://{}/all?verifyKey={SECRET}&qq=2", gateway.addr);
    let (mut socket, _) = connect_async(url).await.unwrap();
    let hello = next_json(&mut socket).await;
    let key = hello["data"]["session"].as_str().unwrap().to_string();

    let info = gateway.get(&format!("/sessionInfo?sessionKey={key}")).await;
    assert_eq!(info["data"]["qq"]["id"], 2);

    socket.close(None).await.unwrap();
    let mut closed = false;
    for _ in 0..50 {
        let info = gateway.get(&format!("/sessionInfo?sessionKey={key}")).await;
        if info["code"] == 3 {
            closed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(closed, "temporary session outlived its connection");
}

#[tokio::test]
async fn test_ws_frames_arrive_in_emit_order() {
    let gateway = Gateway::start(16).await;
    let key = gateway.session_for(1).await;
    let mut socket = gateway.connect("all", &key).await;

    for text in ["e1", "e2", "e3"] {
        gateway.emit(1, text).await;
    }

    let mut seen = Vec::new();
    for _ in 0..3 {
        let frame = next_json(&mut socket).await;
        seen.push(frame["data"]["messageChain"][0]["text"].as_str().unwrap().to_string());
    }
    assert_eq!(seen, ["e1", "e2", "e3"]);
}

#[tokio::test]
async fn test_ws_pending_action_does_not_block_connection() {
    let gateway = Gateway::start(16).await;
    let key = gateway.session_for(1).await;
    let session = gateway.sessions.lookup(&SessionKey::from(key.as_str())).unwrap();
    let mut socket = gateway.connect("all", &key).await;

    socket
        .send(Message::text(json!({ "syncId": "7", "command": "hang" }).to_string()))
        .await
        .unwrap();

    // Events still flow while the action is outstanding.
    gateway.emit(1, "meanwhile").await;
    let frame = next_json(&mut socket).await;
    assert_eq!(frame["data"]["messageChain"][0]["text"], "meanwhile");

    assert!(gateway.sessions.close_session(session.key()));
    match next_message(&mut socket, Duration::from_secs(2)).await {
        Some(Message::Close(_)) | None => {}
        other => panic!("expected the connection to close, got {other:?}"),
    }

    for _ in 0..100 {
        if session.ref_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(session.ref_count(), 0);
}
