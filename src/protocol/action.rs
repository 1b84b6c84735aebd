//! Typed action definitions.
//!
//! Each [`Action`] variant serializes to the `action`/`params` pair of an
//! [`ActionRequest`](super::ActionRequest). Actions not listed here can be
//! sent with [`Client::invoke`](crate::Client::invoke).
//!
//! | Action | Purpose |
//! |--------|---------|
//! | `send_group_msg` | Send a message to a group |
//! | `send_private_msg` | Send a direct message |
//! | `send_poke` | Poke a user, optionally inside a group |
//! | `get_record` | Fetch a voice record, transcoded |
//! | `get_stranger_info` | Look up a user |
//! | `get_group_info` | Look up a group |
//! | `get_msg` | Fetch a message by id |
//! | `get_forward_msg` | Fetch a merged-forward message |
//! | `get_login_info` | Account the gateway is logged in as |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

use super::message::WireSegment;
use super::request::value_as_i64;

// ============================================================================
// Action
// ============================================================================

/// Gateway actions with typed parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", content = "params", rename_all = "snake_case")]
pub enum Action {
    /// Send a message to a group.
    SendGroupMsg {
        /// Target group.
        group_id: i64,
        /// Message segments.
        message: Vec<WireSegment>,
    },

    /// Send a direct message.
    SendPrivateMsg {
        /// Target user.
        user_id: i64,
        /// Message segments.
        message: Vec<WireSegment>,
    },

    /// Poke a user.
    SendPoke {
        /// Account performing the poke (the bot itself).
        user_id: i64,
        /// Group to poke in; `None` pokes in a direct chat.
        #[serde(skip_serializing_if = "Option::is_none")]
        group_id: Option<i64>,
        /// Account being poked.
        target_id: i64,
    },

    /// Fetch a voice record.
    GetRecord {
        /// Record file id from a message event.
        file_id: String,
        /// Output container.
        out_format: RecordFormat,
    },

    /// Look up a user.
    GetStrangerInfo {
        /// User to look up.
        user_id: i64,
    },

    /// Look up a group.
    GetGroupInfo {
        /// Group to look up.
        group_id: i64,
    },

    /// Fetch a message.
    GetMsg {
        /// Message id.
        message_id: i64,
    },

    /// Fetch a merged-forward message.
    GetForwardMsg {
        /// Forward message id.
        message_id: String,
    },

    /// Account the gateway is logged in as.
    GetLoginInfo,
}

impl Action {
    /// Splits the action into its wire name and params object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails, or
    /// [`Error::Protocol`] if the serialized form lacks an action name.
    pub fn to_parts(&self) -> Result<(String, Value)> {
        let Value::Object(mut fields) = serde_json::to_value(self)? else {
            return Err(Error::protocol("action did not serialize to an object"));
        };

        let name = match fields.remove("action") {
            Some(Value::String(name)) => name,
            _ => return Err(Error::protocol("action name missing")),
        };
        let params = fields
            .remove("params")
            .unwrap_or_else(|| Value::Object(Map::new()));

        Ok((name, params))
    }
}

// ============================================================================
// RecordFormat
// ============================================================================

/// Output format for [`Action::GetRecord`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    /// MPEG layer 3.
    #[default]
    Mp3,
    /// Adaptive multi-rate.
    Amr,
    /// Windows media audio.
    Wma,
    /// MPEG-4 audio.
    M4a,
    /// Speex.
    Spx,
    /// Ogg container.
    Ogg,
    /// Waveform audio.
    Wav,
    /// Free lossless audio codec.
    Flac,
}

impl fmt::Display for RecordFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Mp3 => "mp3",
            Self::Amr => "amr",
            Self::Wma => "wma",
            Self::M4a => "m4a",
            Self::Spx => "spx",
            Self::Ogg => "ogg",
            Self::Wav => "wav",
            Self::Flac => "flac",
        };
        f.write_str(name)
    }
}

// ============================================================================
// LoginInfo
// ============================================================================

/// Data returned by `get_login_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginInfo {
    /// Account id as reported (numbers and numeric strings both occur).
    pub user_id: String,
    /// Account nickname.
    pub nickname: String,
}

impl LoginInfo {
    /// Parses the `data` object of a `get_login_info` response.
    #[must_use]
    pub fn from_data(data: &Value) -> Self {
        let user_id = match data.get("user_id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };
        let nickname = data
            .get("nickname")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Self { user_id, nickname }
    }

    /// Returns the account id as an integer, if it is one.
    #[inline]
    #[must_use]
    pub fn user_id_i64(&self) -> Option<i64> {
        value_as_i64(&Value::String(self.user_id.clone()))
    }
}

// ============================================================================
// Tests
// ============================================================================
