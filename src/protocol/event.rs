//! Event message types.
//!
//! Events are frames pushed by the gateway without a matching request.
//! Each one is routed to exactly one [`EventCategory`].
//!
//! # Classification
//!
//! | `post_type` | `message_type` | Category |
//! |-------------|----------------|----------|
//! | `message` | `group` | [`EventCategory::GroupMessage`] |
//! | `message` | `private` | [`EventCategory::PrivateMessage`] |
//! | `notice` | - | [`EventCategory::Notice`] |
//! | `meta_event` | - | [`EventCategory::Meta`] |
//! | *(absent)* | - | [`EventCategory::GatewayStatus`] |
//!
//! Any other `post_type` (e.g. `request`, `message_sent`) is not routed.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde_json::Value;

use super::request::value_as_i64;

// ============================================================================
// Constants
// ============================================================================

/// Gateway return code signalling a rejected access token.
pub const RETCODE_INVALID_TOKEN: i64 = 1403;

// ============================================================================
// EventCategory
// ============================================================================

/// Routing bucket for inbound events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    /// Message posted in a group.
    GroupMessage,
    /// Direct (private) message.
    PrivateMessage,
    /// Notice (recall, member join, poke, ...).
    Notice,
    /// Meta event (lifecycle, heartbeat).
    Meta,
    /// Gateway-specific out-of-band frame without `post_type`.
    GatewayStatus,
}

impl EventCategory {
    /// All categories in declaration order.
    pub const ALL: [Self; 5] = [
        Self::GroupMessage,
        Self::PrivateMessage,
        Self::Notice,
        Self::Meta,
        Self::GatewayStatus,
    ];

    /// Classifies a parsed frame.
    ///
    /// Returns `None` for events this client does not route.
    #[must_use]
    pub fn classify(frame: &Value) -> Option<Self> {
        let Some(post_type) = frame.get("post_type") else {
            return Some(Self::GatewayStatus);
        };

        match post_type.as_str()? {
            "message" => match frame.get("message_type").and_then(Value::as_str)? {
                "group" => Some(Self::GroupMessage),
                "private" => Some(Self::PrivateMessage),
                _ => None,
            },
            "notice" => Some(Self::Notice),
            "meta_event" => Some(Self::Meta),
            _ => None,
        }
    }

    /// Returns the short name used in logs.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GroupMessage => "group",
            Self::PrivateMessage => "private",
            Self::Notice => "notice",
            Self::Meta => "meta",
            Self::GatewayStatus => "gateway",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Event
// ============================================================================

/// An event frame delivered to subscribers.
///
/// Wraps the raw JSON payload; accessors cover the common OneBot fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Category the event was routed to.
    category: EventCategory,
    /// Raw frame payload.
    payload: Value,
}

impl Event {
    /// Creates an event from a classified payload.
    #[inline]
    #[must_use]
    pub fn new(category: EventCategory, payload: Value) -> Self {
        Self { category, payload }
    }

    /// Classifies `payload` and wraps it, or returns `None` if unroutable.
    #[must_use]
    pub fn from_payload(payload: Value) -> Option<Self> {
        EventCategory::classify(&payload).map(|category| Self::new(category, payload))
    }

    /// Returns the routing category.
    #[inline]
    #[must_use]
    pub fn category(&self) -> EventCategory {
        self.category
    }

    /// Returns the raw payload.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Consumes the event, returning the raw payload.
    #[inline]
    #[must_use]
    pub fn into_payload(self) -> Value {
        self.payload
    }

    /// Gets a string field.
    #[inline]
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// Gets an integer field, accepting numeric strings.
    #[inline]
    #[must_use]
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.payload.get(key).and_then(value_as_i64)
    }

    /// `post_type` field.
    #[inline]
    #[must_use]
    pub fn post_type(&self) -> Option<&str> {
        self.get_str("post_type")
    }

    /// `message_type` field.
    #[inline]
    #[must_use]
    pub fn message_type(&self) -> Option<&str> {
        self.get_str("message_type")
    }

    /// `notice_type` field.
    #[inline]
    #[must_use]
    pub fn notice_type(&self) -> Option<&str> {
        self.get_str("notice_type")
    }

    /// `meta_event_type` field.
    #[inline]
    #[must_use]
    pub fn meta_event_type(&self) -> Option<&str> {
        self.get_str("meta_event_type")
    }

    /// `sub_type` field.
    #[inline]
    #[must_use]
    pub fn sub_type(&self) -> Option<&str> {
        self.get_str("sub_type")
    }

    /// Account the event was delivered to.
    #[inline]
    #[must_use]
    pub fn self_id(&self) -> Option<i64> {
        self.get_i64("self_id")
    }

    /// Sender / subject user.
    #[inline]
    #[must_use]
    pub fn user_id(&self) -> Option<i64> {
        self.get_i64("user_id")
    }

    /// Group the event happened in.
    #[inline]
    #[must_use]
    pub fn group_id(&self) -> Option<i64> {
        self.get_i64("group_id")
    }

    /// Message id of a message event.
    #[inline]
    #[must_use]
    pub fn message_id(&self) -> Option<i64> {
        self.get_i64("message_id")
    }

    /// CQ-code rendering of a message event.
    #[inline]
    #[must_use]
    pub fn raw_message(&self) -> Option<&str> {
        self.get_str("raw_message")
    }

    /// Unix timestamp (seconds).
    #[inline]
    #[must_use]
    pub fn time(&self) -> Option<i64> {
        self.get_i64("time")
    }

    /// `true` for the lifecycle meta event sent once the gateway is logged in.
    #[inline]
    #[must_use]
    pub fn is_lifecycle(&self) -> bool {
        self.category == EventCategory::Meta && self.meta_event_type() == Some("lifecycle")
    }

    /// `true` for periodic heartbeat meta events.
    #[inline]
    #[must_use]
    pub fn is_heartbeat(&self) -> bool {
        self.category == EventCategory::Meta && self.meta_event_type() == Some("heartbeat")
    }

    /// `true` for the gateway status frame rejecting the access token.
    #[must_use]
    pub fn is_invalid_credential(&self) -> bool {
        self.category == EventCategory::GatewayStatus
            && self.get_str("status") == Some("failed")
            && self.get_i64("retcode") == Some(RETCODE_INVALID_TOKEN)
    }
}

// ============================================================================
// Tests
// ============================================================================
