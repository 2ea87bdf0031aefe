//! Mock Bot Demo
//!
//! Runs the gateway in front of in-memory bots. Each bot answers a handful of
//! actions and emits a friend message on a fixed interval, so clients can be
//! tried against a live server without a real bot backend.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package mock-bot -- --bot 10001 --bot 10002 --verify-key secret
//!
//! # then, from a client:
//! curl -X POST localhost:8080/verify -d '{"verifyKey":"secret"}'
//! curl -X POST localhost:8080/bind -d '{"sessionKey":"<key>","qq":10001}'
//! curl 'localhost:8080/fetchMessage?sessionKey=<key>&count=5'
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use courier::prelude::*;
use courier::runtime::ConfigLoader;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "mock-bot", about = "Courier gateway with in-memory bots")]
struct Args {
    /// Configuration file; defaults are searched in the current directory.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bot identities to register.
    #[arg(long = "bot", default_values_t = [10001_i64])]
    bots: Vec<i64>,

    /// Overrides `verify_key`.
    #[arg(long)]
    verify_key: Option<String>,

    /// Overrides `server.port`.
    #[arg(short, long)]
    port: Option<u16>,

    /// Milliseconds between synthetic events; 0 disables them.
    #[arg(long, default_value_t = 5000)]
    interval_ms: u64,
}

// ============================================================================
// In-memory bot
// ============================================================================

struct MockBot {
    identity: Identity,
    next_message_id: AtomicI64,
}

impl MockBot {
    fn new(identity: i64) -> Self {
        Self {
            identity: Identity(identity),
            next_message_id: AtomicI64::new(1),
        }
    }

    fn sent(&self, command: &str, content: &Value) -> Value {
        let message_id = self.next_message_id.fetch_add(1, Ordering::Relaxed);
        info!(
            identity = %self.identity,
            command,
            target = %content.get("target").unwrap_or(&serde_json::Value::Null),
            message_id,
            "Message sent"
        );
        json!({ "code": 0, "msg": "success", "messageId": message_id })
    }
}

#[async_trait]
impl Bot for MockBot {
    fn identity(&self) -> Identity {
        self.identity
    }

    async fn execute(
        &self,
        command: &str,
        _sub_command: Option<&str>,
        content: Value,
    ) -> CourierResult<Value> {
        match command {
            "sendFriendMessage" | "sendGroupMessage" | "sendTempMessage" => {
                Ok(self.sent(command, &content))
            }
            "botProfile" => Ok(json!({
                "nickname": format!("mock-{}", self.identity),
                "level": 1,
            })),
            "friendList" => Ok(json!([
                { "id": 1000, "nickname": "alice", "remark": "" },
                { "id": 1001, "nickname": "bob", "remark": "" },
            ])),
            "groupList" => Ok(json!([
                { "id": 2000, "name": "mock group", "permission": "MEMBER" },
            ])),
            _ => Err(CourierError::UnsupportedCommand(command.to_string())),
        }
    }
}

// ============================================================================
// Event emitter
// ============================================================================

async fn emit_events(events: mpsc::Sender<BotEvent>, bots: Vec<i64>, every: Duration) {
    for &bot in &bots {
        let online = BotEvent::new(bot, EventKind::BotOnlineEvent { qq: Identity(bot) });
        if events.send(online).await.is_err() {
            return;
        }
    }

    let mut interval = tokio::time::interval(every);
    interval.tick().await;
    for tick in 1_u64.. {
        interval.tick().await;
        for &bot in &bots {
            let text = format!("tick {tick} from {bot}");
            let event = BotEvent::new(bot, EventKind::friend_text(1000, text));
            if events.send(event).await.is_err() {
                warn!("Event queue closed, stopping emitter");
                return;
            }
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut loader = ConfigLoader::new().with_current_dir();
    if let Some(path) = &args.config {
        loader = loader.file(path);
    }
    // Merged so validation passes without a key in the file; reapplied after
    // load because files take precedence over merged values.
    if let Some(key) = &args.verify_key {
        loader = loader.merge(CourierConfig {
            verify_key: Some(key.clone()),
            ..Default::default()
        });
    }
    let mut config = loader.load()?;
    if let Some(key) = args.verify_key {
        config.verify_key = Some(key);
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let runtime = CourierRuntime::from_config(&config);
    for &bot in &args.bots {
        runtime.register_bot(Arc::new(MockBot::new(bot)));
    }

    if args.interval_ms > 0 {
        tokio::spawn(emit_events(
            runtime.event_sender(),
            args.bots.clone(),
            Duration::from_millis(args.interval_ms),
        ));
    }

    runtime.run().await?;
    Ok(())
}
