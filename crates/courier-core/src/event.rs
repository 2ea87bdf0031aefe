//! Domain events reported by the event source.
//!
//! Events form a closed set distinguished by the `type` discriminator. They
//! carry the identity that produced them but no session affinity of their
//! own: the [`EventHub`](crate::hub::EventHub) decides at delivery time which
//! sessions are interested.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CourierError;

// =============================================================================
// Identity
// =============================================================================

/// Account id of a bot on the messaging platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(pub i64);

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Identity {
    type Err = CourierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(Identity)
            .map_err(|_| CourierError::invalid(format!("'{s}' is not a valid qq")))
    }
}

impl From<i64> for Identity {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

// =============================================================================
// Channels
// =============================================================================

/// Logical push stream a connection subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Chat messages only.
    Message,
    /// Non-message events only.
    Event,
    /// Everything.
    All,
}

impl ChannelKind {
    /// Every channel kind.
    pub const ALL: [ChannelKind; 3] = [Self::Message, Self::Event, Self::All];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Event => "event",
            Self::All => "all",
        }
    }

    /// Returns `true` if events of `category` are pushed on this channel.
    pub fn accepts(&self, category: EventCategory) -> bool {
        match self {
            Self::All => true,
            Self::Message => category == EventCategory::Message,
            Self::Event => category == EventCategory::Event,
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelKind {
    type Err = CourierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "message" => Ok(Self::Message),
            "event" => Ok(Self::Event),
            "all" => Ok(Self::All),
            other => Err(CourierError::invalid(format!("unknown channel '{other}'"))),
        }
    }
}

/// Coarse classification used for channel routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    Message,
    Event,
}

// =============================================================================
// Payload parts
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Friend {
    pub id: i64,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub remark: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub permission: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: i64,
    #[serde(default)]
    pub member_name: String,
    #[serde(default)]
    pub permission: String,
    pub group: Group,
}

/// Where a nudge happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NudgeSubject {
    pub id: i64,
    pub kind: String,
}

// =============================================================================
// Event kinds
// =============================================================================

/// The closed set of events the gateway understands.
///
/// Message chains are kept as raw JSON segments; their layout belongs to the
/// messaging platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum EventKind {
    FriendMessage {
        sender: Friend,
        message_chain: Vec<Value>,
    },
    GroupMessage {
        sender: Member,
        message_chain: Vec<Value>,
    },
    TempMessage {
        sender: Member,
        message_chain: Vec<Value>,
    },
    StrangerMessage {
        sender: Friend,
        message_chain: Vec<Value>,
    },
    BotOnlineEvent {
        qq: Identity,
    },
    BotOfflineEventActive {
        qq: Identity,
    },
    BotReloginEvent {
        qq: Identity,
    },
    NewFriendRequestEvent {
        event_id: i64,
        from_id: i64,
        group_id: i64,
        nick: String,
        message: String,
    },
    MemberJoinEvent {
        member: Member,
        #[serde(default)]
        invitor: Option<Member>,
    },
    GroupRecallEvent {
        author_id: i64,
        message_id: i64,
        time: i64,
        group: Group,
        #[serde(default)]
        operator: Option<Member>,
    },
    NudgeEvent {
        from_id: i64,
        subject: NudgeSubject,
        action: String,
        suffix: String,
        target: i64,
    },
}

impl EventKind {
    /// Every discriminator value of the closed set.
    pub const TYPE_NAMES: &'static [&'static str] = &[
        "FriendMessage",
        "GroupMessage",
        "TempMessage",
        "StrangerMessage",
        "BotOnlineEvent",
        "BotOfflineEventActive",
        "BotReloginEvent",
        "NewFriendRequestEvent",
        "MemberJoinEvent",
        "GroupRecallEvent",
        "NudgeEvent",
    ];

    /// Discriminator written to the `type` field.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::FriendMessage { .. } => "FriendMessage",
            Self::GroupMessage { .. } => "GroupMessage",
            Self::TempMessage { .. } => "TempMessage",
            Self::StrangerMessage { .. } => "StrangerMessage",
            Self::BotOnlineEvent { .. } => "BotOnlineEvent",
            Self::BotOfflineEventActive { .. } => "BotOfflineEventActive",
            Self::BotReloginEvent { .. } => "BotReloginEvent",
            Self::NewFriendRequestEvent { .. } => "NewFriendRequestEvent",
            Self::MemberJoinEvent { .. } => "MemberJoinEvent",
            Self::GroupRecallEvent { .. } => "GroupRecallEvent",
            Self::NudgeEvent { .. } => "NudgeEvent",
        }
    }

    pub fn category(&self) -> EventCategory {
        match self {
            Self::FriendMessage { .. }
            | Self::GroupMessage { .. }
            | Self::TempMessage { .. }
            | Self::StrangerMessage { .. } => EventCategory::Message,
            _ => EventCategory::Event,
        }
    }

    /// Convenience constructor for a plain-text friend message.
    pub fn friend_text(from: i64, text: impl Into<String>) -> Self {
        Self::FriendMessage {
            sender: Friend {
                id: from,
                nickname: String::new(),
                remark: String::new(),
            },
            message_chain: vec![serde_json::json!({ "type": "Plain", "text": text.into() })],
        }
    }
}

// =============================================================================
// Envelope
// =============================================================================

/// One occurrence reported by the event source.
#[derive(Debug, Clone, PartialEq)]
pub struct BotEvent {
    /// Identity of the bot that produced the event.
    pub origin: Identity,
    pub kind: EventKind,
}

impl BotEvent {
    pub fn new(origin: impl Into<Identity>, kind: EventKind) -> Self {
        Self {
            origin: origin.into(),
            kind,
        }
    }

    pub fn category(&self) -> EventCategory {
        self.kind.category()
    }
}
