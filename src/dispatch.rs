//! Push-mode delivery of synthesized audio
//!
//! The messaging side is an external collaborator behind [`MessageSender`]. This
//! module only decides where a conversation id points and what gets sent.

use async_trait::async_trait;
use bytes::Bytes;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

use crate::audio::AudioAsset;
use crate::error::{Result, TtsBridgeError};

/// `{platform}-{group|private}_{...}_{numeric id}`, e.g. `onebot_v11-group_abc_12345`
static CONVERSATION_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<platform>[^-]+)-(?P<chat>group|private)_(?:.*_)?(?P<id>\d+)$")
        .expect("conversation id pattern is valid")
});

/// Recipient of a push-mode message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationTarget {
    Group { platform: String, group_id: u64 },
    Private { platform: String, user_id: u64 },
}

impl ConversationTarget {
    pub fn parse(conversation_id: &str) -> Result<Self> {
        let caps = CONVERSATION_ID.captures(conversation_id.trim()).ok_or_else(|| {
            TtsBridgeError::Dispatch {
                cause: format!("unrecognized conversation id `{}`", conversation_id),
            }
        })?;

        let platform = caps["platform"].to_string();
        let id: u64 = caps["id"].parse().map_err(|e| TtsBridgeError::Dispatch {
            cause: format!("invalid numeric id in `{}`: {}", conversation_id, e),
        })?;

        Ok(match &caps["chat"] {
            "group" => ConversationTarget::Group { platform, group_id: id },
            _ => ConversationTarget::Private { platform, user_id: id },
        })
    }

    pub fn platform(&self) -> &str {
        match self {
            ConversationTarget::Group { platform, .. } | ConversationTarget::Private { platform, .. } => platform,
        }
    }
}

impl fmt::Display for ConversationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationTarget::Group { platform, group_id } => write!(f, "{} group {}", platform, group_id),
            ConversationTarget::Private { platform, user_id } => write!(f, "{} user {}", platform, user_id),
        }
    }
}

/// What is handed to the messaging collaborator
#[derive(Debug, Clone, PartialEq)]
pub enum AudioPayload {
    Bytes(Bytes),
    Url(String),
}

impl AudioPayload {
    /// Prefer the provider URL when asked and available, otherwise the bytes
    pub fn from_asset(asset: &AudioAsset, prefer_url: bool) -> Self {
        match (&asset.source_url, prefer_url) {
            (Some(url), true) => AudioPayload::Url(url.clone()),
            _ => AudioPayload::Bytes(asset.bytes.clone()),
        }
    }
}

/// Error returned by [`MessageSender`] implementations
pub type SendError = Box<dyn std::error::Error + Send + Sync>;

/// Messaging channel that accepts voice messages
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_group_audio(&self, platform: &str, group_id: u64, audio: AudioPayload) -> std::result::Result<(), SendError>;

    async fn send_private_audio(&self, platform: &str, user_id: u64, audio: AudioPayload) -> std::result::Result<(), SendError>;
}

/// Route `asset` to the conversation named by `conversation_id`
///
/// Failures are reported as `Dispatch` and never retried.
pub async fn push(
    sender: &dyn MessageSender,
    conversation_id: &str,
    asset: &AudioAsset,
    prefer_url: bool,
) -> Result<()> {
    let target = ConversationTarget::parse(conversation_id).map_err(|e| {
        log::error!("Cannot dispatch audio: {}", e);
        e
    })?;
    let payload = AudioPayload::from_asset(asset, prefer_url);
    log::info!("Sending {} bytes of audio to {}", asset.len(), target);

    let result = match &target {
        ConversationTarget::Group { platform, group_id } => sender.send_group_audio(platform, *group_id, payload).await,
        ConversationTarget::Private { platform, user_id } => sender.send_private_audio(platform, *user_id, payload).await,
    };

    result.map_err(|e| {
        log::error!("Failed to send audio to {}: {}", target, e);
        TtsBridgeError::Dispatch { cause: e.to_string() }
    })
}
