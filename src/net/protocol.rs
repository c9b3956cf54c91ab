//! Wire protocol message definitions
//! These are the typed messages exchanged between the arena server and robot clients

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::game::world::{Point, World};

/// Length of a client-generated identity (hex characters)
pub const IDENTITY_LEN: usize = 16;

/// Fixed identity the server binds with
pub const SERVER_IDENTITY: &str = "server";

/// Nicks longer than this are truncated on registration
pub const NICK_MAX_CHARS: usize = 32;

/// Opaque token naming one transport endpoint
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The server's own address
    pub fn server() -> Self {
        Self(SERVER_IDENTITY.to_string())
    }

    /// Fresh client identity: the first 16 hex digits of a v4 UUID
    pub fn generate() -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self(hex[..IDENTITY_LEN].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Identity {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// What a registered identity intends to do during the next game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Will {
    /// Gets a robot when the game begins
    #[default]
    Play,
    /// Only receives broadcasts
    Spectate,
}

impl Will {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "play" => Some(Self::Play),
            "spectate" => Some(Self::Spectate),
            _ => None,
        }
    }
}

/// Registry entry broadcast in the roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub nick: String,
    pub will: Will,
}

/// Cut a nick down to [`NICK_MAX_CHARS`] characters
pub fn truncate_nick(nick: &str) -> String {
    nick.chars().take(NICK_MAX_CHARS).collect()
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Registration request
    Hello {
        /// Requested intent; anything but "play"/"spectate" reads as absent
        #[serde(
            default,
            deserialize_with = "lenient_will",
            skip_serializing_if = "Option::is_none"
        )]
        want: Option<Will>,
        #[serde(default, deserialize_with = "lenient_nick")]
        nick: String,
    },

    /// Orders for the turn named by `turn`
    Action {
        #[serde(
            default,
            deserialize_with = "lenient_turn",
            skip_serializing_if = "Option::is_none"
        )]
        turn: Option<u64>,
        #[serde(
            default,
            deserialize_with = "lenient_target",
            skip_serializing_if = "Option::is_none"
        )]
        target: Option<Identity>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        move_to: Option<Point>,
    },
}

impl ClientMsg {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "hello",
            Self::Action { .. } => "action",
        }
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Full registry snapshot, sent after every hello
    Roster {
        players: BTreeMap<Identity, PlayerRecord>,
    },

    /// Situation report for a resolved turn
    Sitrep { world: World, turn: u64 },

    /// Final world once a single robot (or none) remains
    Results { world: World, turn: u64 },

    /// Results are over, registration starts again
    End,
}

impl ServerMsg {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Roster { .. } => "roster",
            Self::Sitrep { .. } => "sitrep",
            Self::Results { .. } => "results",
            Self::End => "end",
        }
    }
}

/// A message family with a fixed set of `type` tags
pub trait Tagged: DeserializeOwned {
    const TYPES: &'static [&'static str];
}

impl Tagged for ClientMsg {
    const TYPES: &'static [&'static str] = &["hello", "action"];
}

impl Tagged for ServerMsg {
    const TYPES: &'static [&'static str] = &["roster", "sitrep", "results", "end"];
}

/// Reasons an inbound payload is discarded before reaching a handler
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message is not a JSON object")]
    NotAnObject,

    #[error("message is missing a string type field")]
    MissingType,

    #[error("no handler for type={0:?}")]
    UnknownType(String),

    #[error("invalid fields for type={kind:?}: {source}")]
    Schema {
        kind: String,
        source: serde_json::Error,
    },
}

/// Validate and decode a payload into a typed message.
///
/// Checks run in order: JSON syntax, object shape, string `type`, known
/// type for this message family, and finally the per-type field schema.
pub fn decode<M: Tagged>(payload: &[u8]) -> Result<M, DecodeError> {
    let value: Value = serde_json::from_slice(payload)?;

    let kind = match &value {
        Value::Object(fields) => match fields.get("type") {
            Some(Value::String(kind)) => kind.clone(),
            _ => return Err(DecodeError::MissingType),
        },
        _ => return Err(DecodeError::NotAnObject),
    };

    if !M::TYPES.contains(&kind.as_str()) {
        return Err(DecodeError::UnknownType(kind));
    }

    serde_json::from_value(value).map_err(|source| DecodeError::Schema { kind, source })
}

/// Encode a message as JSON bytes
pub fn encode<M: Serialize>(msg: &M) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(msg)
}

fn lenient_will<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Will>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(want) => Will::parse(&want),
        _ => None,
    })
}

fn lenient_nick<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(nick) => nick,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn lenient_turn<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    Ok(Value::deserialize(deserializer)?.as_u64())
}

fn lenient_target<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Identity>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(target) => Some(Identity::new(target)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client(value: Value) -> Result<ClientMsg, DecodeError> {
        decode::<ClientMsg>(value.to_string().as_bytes())
    }

    #[test]
    fn test_rejects_malformed_payloads() {
        assert!(matches!(
            decode::<ClientMsg>(b"{not json"),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(client(json!([1, 2])), Err(DecodeError::NotAnObject)));
        assert!(matches!(client(json!({"nick": "a"})), Err(DecodeError::MissingType)));
        assert!(matches!(client(json!({"type": 7})), Err(DecodeError::MissingType)));
    }

    #[test]
    fn test_unknown_type_is_distinct_from_schema_failure() {
        match client(json!({"type": "roster", "players": {}})) {
            Err(DecodeError::UnknownType(kind)) => assert_eq!(kind, "roster"),
            other => panic!("unexpected {other:?}"),
        }

        let result = client(json!({"type": "action", "turn": 1, "move_to": {"x": "far"}}));
        assert!(matches!(result, Err(DecodeError::Schema { .. })));
    }

    #[test]
    fn test_hello_fields_are_lenient() {
        let msg = client(json!({"type": "hello", "want": "dance", "nick": 42})).unwrap();
        assert_eq!(
            msg,
            ClientMsg::Hello {
                want: None,
                nick: "42".to_string()
            }
        );

        let msg = client(json!({"type": "hello", "want": "spectate"})).unwrap();
        assert_eq!(
            msg,
            ClientMsg::Hello {
                want: Some(Will::Spectate),
                nick: String::new()
            }
        );
    }

    #[test]
    fn test_action_ignores_non_string_target() {
        let msg = client(json!({"type": "action", "turn": 3, "target": 99})).unwrap();
        assert_eq!(
            msg,
            ClientMsg::Action {
                turn: Some(3),
                target: None,
                move_to: None
            }
        );

        let msg = client(json!({"type": "action", "turn": "3", "target": "abc"})).unwrap();
        assert_eq!(
            msg,
            ClientMsg::Action {
                turn: None,
                target: Some(Identity::from("abc")),
                move_to: None
            }
        );
    }

    #[test]
    fn test_server_messages_are_tagged() {
        let end = serde_json::to_value(ServerMsg::End).unwrap();
        assert_eq!(end, json!({"type": "end"}));

        let mut players = BTreeMap::new();
        players.insert(
            Identity::from("aaaa"),
            PlayerRecord {
                nick: "ann".to_string(),
                will: Will::Play,
            },
        );
        let roster = serde_json::to_value(ServerMsg::Roster { players }).unwrap();
        assert_eq!(
            roster,
            json!({"type": "roster", "players": {"aaaa": {"nick": "ann", "will": "play"}}})
        );
    }

    #[test]
    fn test_generated_identity_is_hex() {
        let id = Identity::generate();
        assert_eq!(id.as_str().len(), IDENTITY_LEN);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, Identity::generate());
    }

    #[test]
    fn test_truncate_nick_counts_chars() {
        let long = "ä".repeat(40);
        assert_eq!(truncate_nick(&long).chars().count(), NICK_MAX_CHARS);
        assert_eq!(truncate_nick("bob"), "bob");
    }
}
