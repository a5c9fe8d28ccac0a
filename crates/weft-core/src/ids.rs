//! Branded identifiers.
//!
//! Every id is a prefixed UUID v7 string, so ids sort in creation order and a
//! stray id in a log line tells you what kind of entity it names.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh id with this type's prefix.
            #[must_use]
            pub fn new() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::now_v7()))
            }

            /// Wrap an existing id string verbatim.
            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Borrow the underlying string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_owned()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

branded_id!(
    /// Identity of a single conversation message.
    MessageId,
    "msg"
);
branded_id!(
    /// Identity of an agent instance (top-level or pooled sub-agent).
    AgentId,
    "agent"
);
branded_id!(
    /// Identity of an emitted observer event.
    EventId,
    "evt"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes() {
        assert!(MessageId::new().as_str().starts_with("msg_"));
        assert!(AgentId::new().as_str().starts_with("agent_"));
        assert!(EventId::new().as_str().starts_with("evt_"));
    }

    #[test]
    fn ids_are_unique_and_ordered() {
        let ids: Vec<MessageId> = (0..50).map(|_| MessageId::new()).collect();
        for w in ids.windows(2) {
            assert!(w[0] < w[1], "not monotonic: {} >= {}", w[0], w[1]);
        }
    }

    #[test]
    fn from_raw_and_parse_preserve_value() {
        let id = AgentId::from_raw("agent-fixed");
        assert_eq!(id.as_str(), "agent-fixed");
        let parsed: AgentId = "agent-fixed".parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = MessageId::from_raw("msg_1");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""msg_1""#);
    }
}
