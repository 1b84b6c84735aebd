//! Typed action helpers and event subscriptions.
//!
//! Thin wrappers over [`Client::call`] and the event router.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::SubscriptionId;
use crate::protocol::request::value_as_i64;
use crate::protocol::{Action, EventCategory, LoginInfo, MessageChain, RecordFormat};

use super::core::Client;
use super::events::EventHandler;

// ============================================================================
// Client - Messaging
// ============================================================================

impl Client {
    /// Sends a message to a group. Returns the new message id.
    ///
    /// # Errors
    ///
    /// - [`Error::ActionFailed`] if the gateway refuses the message
    /// - [`Error::Protocol`] if the response carries no message id
    /// - Any error from [`invoke`](Self::invoke)
    pub async fn send_group_message(
        &self,
        group_id: i64,
        message: impl Into<MessageChain>,
    ) -> Result<i64> {
        let data = self
            .call(Action::SendGroupMsg {
                group_id,
                message: message.into().to_wire(),
            })
            .await?;

        message_id(&data)
    }

    /// Sends a direct message. Returns the new message id.
    ///
    /// # Errors
    ///
    /// Same as [`send_group_message`](Self::send_group_message).
    pub async fn send_private_message(
        &self,
        user_id: i64,
        message: impl Into<MessageChain>,
    ) -> Result<i64> {
        let data = self
            .call(Action::SendPrivateMsg {
                user_id,
                message: message.into().to_wire(),
            })
            .await?;

        message_id(&data)
    }

    /// Pokes `target_id`, inside `group_id` when given.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ActionFailed`] if the gateway refuses.
    pub async fn send_poke(&self, target_id: i64, group_id: Option<i64>) -> Result<()> {
        self.call(Action::SendPoke {
            user_id: self.self_id(),
            group_id,
            target_id,
        })
        .await?;

        Ok(())
    }
}

// ============================================================================
// Client - Lookups
// ============================================================================

impl Client {
    /// Fetches a voice record converted to `format`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ActionFailed`] if the record cannot be fetched.
    pub async fn get_record(&self, file_id: impl Into<String>, format: RecordFormat) -> Result<Value> {
        self.call(Action::GetRecord {
            file_id: file_id.into(),
            out_format: format,
        })
        .await
    }

    /// Looks up a user.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ActionFailed`] if the user is unknown.
    pub async fn get_user_info(&self, user_id: i64) -> Result<Value> {
        self.call(Action::GetStrangerInfo { user_id }).await
    }

    /// Looks up a group.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ActionFailed`] if the group is unknown.
    pub async fn get_group_info(&self, group_id: i64) -> Result<Value> {
        self.call(Action::GetGroupInfo { group_id }).await
    }

    /// Fetches a message by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ActionFailed`] if the message is gone.
    pub async fn get_msg(&self, message_id: i64) -> Result<Value> {
        self.call(Action::GetMsg { message_id }).await
    }

    /// Fetches a merged-forward message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ActionFailed`] if the message is gone.
    pub async fn get_forward_msg(&self, message_id: impl Into<String>) -> Result<Value> {
        self.call(Action::GetForwardMsg {
            message_id: message_id.into(),
        })
        .await
    }

    /// Returns the account the gateway is logged in as.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ActionFailed`] if the gateway refuses.
    pub async fn get_login_info(&self) -> Result<LoginInfo> {
        let data = self.call(Action::GetLoginInfo).await?;
        Ok(LoginInfo::from_data(&data))
    }
}

// ============================================================================
// Client - Subscriptions
// ============================================================================

impl Client {
    /// Registers `handler` for `category`.
    ///
    /// Handlers may be added or removed at any time, including while
    /// connected.
    pub fn subscribe(&self, category: EventCategory, handler: impl EventHandler) -> SubscriptionId {
        self.inner.router.subscribe(category, Arc::new(handler))
    }

    /// Removes a subscription. Returns `true` if it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.router.unsubscribe(id)
    }

    /// Registers a handler for group messages.
    pub fn on_group_message(&self, handler: impl EventHandler) -> SubscriptionId {
        self.subscribe(EventCategory::GroupMessage, handler)
    }

    /// Registers a handler for direct messages.
    pub fn on_private_message(&self, handler: impl EventHandler) -> SubscriptionId {
        self.subscribe(EventCategory::PrivateMessage, handler)
    }

    /// Registers a handler for notices.
    pub fn on_notice(&self, handler: impl EventHandler) -> SubscriptionId {
        self.subscribe(EventCategory::Notice, handler)
    }

    /// Registers a handler for meta events.
    pub fn on_meta(&self, handler: impl EventHandler) -> SubscriptionId {
        self.subscribe(EventCategory::Meta, handler)
    }

    /// Registers a handler for gateway status frames and unmatched responses.
    pub fn on_gateway_status(&self, handler: impl EventHandler) -> SubscriptionId {
        self.subscribe(EventCategory::GatewayStatus, handler)
    }
}

/// Reads `message_id` from a send response.
fn message_id(data: &Value) -> Result<i64> {
    data.get("message_id")
        .and_then(value_as_i64)
        .ok_or_else(|| Error::protocol("send response carries no message_id"))
}

// ============================================================================
// Tests
// ============================================================================
