//! Bot seam: the messaging platform behind the gateway.
//!
//! The gateway never talks to the platform directly. It resolves a [`Bot`]
//! from the [`BotRegistry`] and forwards client actions to it; events flow the
//! other way through the [`EventHub`](crate::hub::EventHub).

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::error::CourierResult;
use crate::event::Identity;

/// An online bot account that can execute client actions.
///
/// # API Design
///
/// - `command`: action name as sent by the client (e.g. `sendFriendMessage`)
/// - `sub_command`: optional qualifier (e.g. `get`/`update` for settings)
/// - `content`: the action payload, passed through unchanged
///
/// Implementations return [`CourierError::UnsupportedCommand`](crate::CourierError::UnsupportedCommand)
/// for commands they do not know.
#[async_trait]
pub trait Bot: Send + Sync + 'static {
    /// The account this bot acts as.
    fn identity(&self) -> Identity;

    /// Executes an action and returns its result payload.
    async fn execute(
        &self,
        command: &str,
        sub_command: Option<&str>,
        content: Value,
    ) -> CourierResult<Value>;
}

/// Shared bot handle.
pub type BoxedBot = Arc<dyn Bot>;

/// Lookup of online bots.
pub trait BotRegistry: Send + Sync {
    /// Returns the bot for `identity`, if it is online.
    fn get(&self, identity: Identity) -> Option<BoxedBot>;

    /// Identities of every online bot, in ascending order.
    fn identities(&self) -> Vec<Identity>;

    /// The bot used in single mode.
    fn first(&self) -> Option<BoxedBot> {
        self.identities()
            .into_iter()
            .next()
            .and_then(|id| self.get(id))
    }
}

/// In-memory registry filled by the host.
#[derive(Default)]
pub struct StaticBotRegistry {
    bots: RwLock<BTreeMap<Identity, BoxedBot>>,
}

impl StaticBotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a bot.
    pub fn register(&self, bot: BoxedBot) {
        let identity = bot.identity();
        self.bots.write().insert(identity, bot);
        debug!(identity = %identity, "Bot registered");
    }

    /// Removes a bot, returning it if it was present.
    pub fn unregister(&self, identity: Identity) -> Option<BoxedBot> {
        let removed = self.bots.write().remove(&identity);
        if removed.is_some() {
            debug!(identity = %identity, "Bot unregistered");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.bots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bots.read().is_empty()
    }
}

impl BotRegistry for StaticBotRegistry {
    fn get(&self, identity: Identity) -> Option<BoxedBot> {
        self.bots.read().get(&identity).cloned()
    }

    fn identities(&self) -> Vec<Identity> {
        self.bots.read().keys().copied().collect()
    }

    fn first(&self) -> Option<BoxedBot> {
        self.bots.read().values().next().cloned()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::CourierError;

    /// Bot that echoes the action back.
    pub(crate) struct EchoBot(pub Identity);

    #[async_trait]
    impl Bot for EchoBot {
        fn identity(&self) -> Identity {
            self.0
        }

        async fn execute(
            &self,
            command: &str,
            sub_command: Option<&str>,
            content: Value,
        ) -> CourierResult<Value> {
            if command == "unknown" {
                return Err(CourierError::UnsupportedCommand(command.into()));
            }
            Ok(serde_json::json!({
                "bot": self.0,
                "command": command,
                "subCommand": sub_command,
                "content": content,
            }))
        }
    }

    pub(crate) fn registry_with(ids: &[i64]) -> Arc<StaticBotRegistry> {
        let registry = Arc::new(StaticBotRegistry::new());
        for id in ids {
            registry.register(Arc::new(EchoBot(Identity(*id))));
        }
        registry
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = registry_with(&[30, 10, 20]);
        assert_eq!(registry.len(), 3);
        assert_eq!(
            registry.identities(),
            vec![Identity(10), Identity(20), Identity(30)]
        );
        assert_eq!(registry.first().unwrap().identity(), Identity(10));
        assert!(registry.get(Identity(99)).is_none());

        assert!(registry.unregister(Identity(10)).is_some());
        assert_eq!(registry.first().unwrap().identity(), Identity(20));
    }
}
