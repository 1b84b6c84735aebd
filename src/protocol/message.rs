//! Outgoing message content.
//!
//! A [`MessageChain`] is an ordered list of [`Segment`]s describing one
//! outgoing message. [`MessageChain::to_wire`] converts it to the gateway's
//! array-of-segments form:
//!
//! ```json
//! [
//!   { "type": "reply", "data": { "id": "123" } },
//!   { "type": "text",  "data": { "text": "hello" } }
//! ]
//! ```
//!
//! # Conversion Rules
//!
//! - Only the first [`Segment::Reply`] is kept, and it is always emitted first.
//! - Media given as `data:<mime>;base64,<payload>` is rewritten to
//!   `base64://<payload>`; `base64://` input passes through unchanged.
//!   Unrecognised media encodings produce an empty `file`.
//! - Face ids that are not integers are skipped.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

// ============================================================================
// Constants
// ============================================================================

/// Prefix the gateway expects for inline media.
const BASE64_SCHEME: &str = "base64://";

/// Summary shown by clients for plain images.
const IMAGE_SUMMARY: &str = "[图片]";

/// Summary shown by clients for stickers.
const STICKER_SUMMARY: &str = "[动画表情]";

/// Image data URIs accepted for images and stickers.
static IMAGE_DATA_URI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^data:image/(?:jpg|jpeg|png|gif|bmp|webp|tiff|svg);base64,(.*)")
        .expect("image data URI pattern is valid")
});

/// Any data URI, accepted for voice records.
static ANY_DATA_URI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^data:[^/,]*/[^,]*?;base64,(.*)").expect("data URI pattern is valid")
});

// ============================================================================
// Segment
// ============================================================================

/// Image source: a remote URL or inline base64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// Remote URL (or any `file` value the gateway understands).
    Url(String),
    /// Base64, either bare `base64://...` or a `data:` URI.
    Base64(String),
}

/// One piece of an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Plain text.
    Text {
        /// Text content.
        text: String,
    },

    /// Image.
    Image {
        /// Where the image comes from.
        source: MediaSource,
    },

    /// Mention. A target of `"all"` mentions every group member.
    At {
        /// Mentioned account id.
        target: String,
        /// Display name, used only for previews.
        nickname: Option<String>,
    },

    /// Reference to the message being replied to.
    Reply {
        /// Referenced message id.
        message_id: String,
        /// Quoted content, used only for previews.
        content: Option<String>,
    },

    /// Built-in emoji.
    Face {
        /// Emoji id; must parse as an integer.
        id: String,
    },

    /// Sticker (sent as an image with a sticker summary).
    Sticker {
        /// Sticker id, used only for previews.
        id: String,
        /// Base64 image data.
        data: String,
    },

    /// Voice record.
    Record {
        /// Base64 audio data.
        data: String,
    },
}

impl Segment {
    /// Creates a text segment.
    #[inline]
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Creates an image segment from a URL.
    #[inline]
    #[must_use]
    pub fn image_url(url: impl Into<String>) -> Self {
        Self::Image {
            source: MediaSource::Url(url.into()),
        }
    }

    /// Creates an image segment from base64 data.
    #[inline]
    #[must_use]
    pub fn image_base64(data: impl Into<String>) -> Self {
        Self::Image {
            source: MediaSource::Base64(data.into()),
        }
    }

    /// Creates an image segment from raw bytes.
    #[must_use]
    pub fn image_bytes(bytes: &[u8]) -> Self {
        Self::image_base64(encode_bytes(bytes))
    }

    /// Creates a mention.
    #[inline]
    #[must_use]
    pub fn at(target: impl ToString) -> Self {
        Self::At {
            target: target.to_string(),
            nickname: None,
        }
    }

    /// Creates a mention with a display name.
    #[inline]
    #[must_use]
    pub fn at_named(target: impl ToString, nickname: impl Into<String>) -> Self {
        Self::At {
            target: target.to_string(),
            nickname: Some(nickname.into()),
        }
    }

    /// Creates a mention of every group member.
    #[inline]
    #[must_use]
    pub fn at_all() -> Self {
        Self::at("all")
    }

    /// Creates a reply reference.
    #[inline]
    #[must_use]
    pub fn reply(message_id: impl ToString) -> Self {
        Self::Reply {
            message_id: message_id.to_string(),
            content: None,
        }
    }

    /// Creates a built-in emoji.
    #[inline]
    #[must_use]
    pub fn face(id: impl ToString) -> Self {
        Self::Face { id: id.to_string() }
    }

    /// Creates a sticker from base64 image data.
    #[inline]
    #[must_use]
    pub fn sticker(id: impl ToString, data: impl Into<String>) -> Self {
        Self::Sticker {
            id: id.to_string(),
            data: data.into(),
        }
    }

    /// Creates a voice record from base64 audio data.
    #[inline]
    #[must_use]
    pub fn record(data: impl Into<String>) -> Self {
        Self::Record { data: data.into() }
    }

    /// Creates a voice record from raw bytes.
    #[must_use]
    pub fn record_bytes(bytes: &[u8]) -> Self {
        Self::record(encode_bytes(bytes))
    }

    /// Converts to wire form. Replies are handled by [`MessageChain`].
    fn to_wire(&self) -> Option<WireSegment> {
        let wire = match self {
            Self::Text { text } => WireSegment::Text { text: text.clone() },
            Self::Image { source } => WireSegment::Image {
                file: match source {
                    MediaSource::Url(url) => url.clone(),
                    MediaSource::Base64(data) => normalize_base64(data, &IMAGE_DATA_URI),
                },
                summary: IMAGE_SUMMARY.to_string(),
            },
            Self::At { target, .. } => WireSegment::At { qq: target.clone() },
            Self::Reply { message_id, .. } => WireSegment::Reply {
                id: message_id.clone(),
            },
            Self::Face { id } => match id.trim().parse() {
                Ok(id) => WireSegment::Face { id },
                Err(_) => {
                    debug!(id = %id, "Skipping face with non-numeric id");
                    return None;
                }
            },
            Self::Sticker { data, .. } => WireSegment::Image {
                file: normalize_base64(data, &IMAGE_DATA_URI),
                summary: STICKER_SUMMARY.to_string(),
            },
            Self::Record { data } => WireSegment::Record {
                file: normalize_base64(data, &ANY_DATA_URI),
            },
        };

        Some(wire)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text { text } => f.write_str(text),
            Self::Image { .. } => f.write_str("[Image]"),
            Self::At {
                target,
                nickname: Some(nickname),
            } => write!(f, "[At {nickname}({target})]"),
            Self::At { target, .. } => write!(f, "[At {target}]"),
            Self::Reply { message_id, .. } => write!(f, "[Reply {message_id}]"),
            Self::Face { id } => write!(f, "[Emoji {id}]"),
            Self::Sticker { id, .. } => write!(f, "[Sticker {id}]"),
            Self::Record { .. } => f.write_str("[Record]"),
        }
    }
}

// ============================================================================
// WireSegment
// ============================================================================

/// A segment in the gateway's wire format: `{"type": ..., "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum WireSegment {
    /// `text`
    Text {
        /// Text content.
        text: String,
    },
    /// `image` (also used for stickers)
    Image {
        /// URL or `base64://` payload.
        file: String,
        /// Preview text.
        summary: String,
    },
    /// `at`
    At {
        /// Mentioned account id or `all`.
        qq: String,
    },
    /// `reply`
    Reply {
        /// Referenced message id.
        id: String,
    },
    /// `face`
    Face {
        /// Emoji id.
        id: i64,
    },
    /// `record`
    Record {
        /// `base64://` payload.
        file: String,
    },
}

// ============================================================================
// MessageChain
// ============================================================================

/// Ordered sequence of segments forming one outgoing message.
///
/// # Example
///
/// ```
/// use napcat_client::{MessageChain, Segment};
///
/// let chain = MessageChain::new()
///     .with(Segment::text("pong"))
///     .with(Segment::reply(42));
///
/// let wire = serde_json::to_value(chain.to_wire()).unwrap();
/// assert_eq!(wire[0]["type"], "reply");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageChain {
    segments: Vec<Segment>,
}

impl MessageChain {
    /// Creates an empty chain.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a segment, builder style.
    #[inline]
    #[must_use]
    pub fn with(mut self, segment: Segment) -> Self {
        self.segments.push(segment);
        self
    }

    /// Appends a segment.
    #[inline]
    pub fn push(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    /// Returns the segments in insertion order.
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns the number of segments.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns `true` if the chain has no segments.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Converts the chain to the gateway's wire form.
    #[must_use]
    pub fn to_wire(&self) -> Vec<WireSegment> {
        let mut wire = Vec::with_capacity(self.segments.len());
        let mut has_reply = false;

        for segment in &self.segments {
            if let Segment::Reply { .. } = segment {
                if has_reply {
                    continue;
                }
                has_reply = true;
                if let Some(reply) = segment.to_wire() {
                    wire.insert(0, reply);
                }
                continue;
            }

            if let Some(entry) = segment.to_wire() {
                wire.push(entry);
            }
        }

        wire
    }
}

impl From<Vec<Segment>> for MessageChain {
    fn from(segments: Vec<Segment>) -> Self {
        Self { segments }
    }
}

impl From<Segment> for MessageChain {
    fn from(segment: Segment) -> Self {
        Self {
            segments: vec![segment],
        }
    }
}

impl From<&str> for MessageChain {
    fn from(text: &str) -> Self {
        Segment::text(text).into()
    }
}

impl FromIterator<Segment> for MessageChain {
    fn from_iter<I: IntoIterator<Item = Segment>>(iter: I) -> Self {
        Self {
            segments: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for MessageChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Rewrites base64 media into the gateway's `base64://` form.
fn normalize_base64(data: &str, data_uri: &Regex) -> String {
    if data.starts_with(BASE64_SCHEME) {
        return data.to_string();
    }

    match data_uri.captures(data).and_then(|caps| caps.get(1)) {
        Some(payload) => format!("{BASE64_SCHEME}{}", payload.as_str()),
        None => {
            debug!("Unrecognised media encoding, sending empty file");
            String::new()
        }
    }
}

/// Encodes raw bytes as `base64://...`.
fn encode_bytes(bytes: &[u8]) -> String {
    format!("{BASE64_SCHEME}{}", Base64Standard.encode(bytes))
}

// ============================================================================
// Tests
// ============================================================================
