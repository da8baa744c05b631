//! Conversation message format shared by every provider driver.

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One conversation turn.
///
/// A message carries free text, an inline image, or both (a user turn with a
/// caption). The serialized form is part of the response-cache key, so field
/// names and order are stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub text: Option<String>,
    pub image: Option<ImageContent>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            text: Some(text.into()),
            image: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            text: Some(text.into()),
            image: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            text: Some(text.into()),
            image: None,
        }
    }

    /// A user turn holding only an image.
    pub fn image(image: ImageContent) -> Self {
        Self {
            role: MessageRole::User,
            text: None,
            image: Some(image),
        }
    }

    pub fn contains_image(&self) -> bool {
        self.image.is_some()
    }

    /// Text of the message, empty strings treated as absent.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.is_empty())
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// Inline image: mime type plus base64 payload, both passed to providers verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageContent {
    pub mime_type: String,
    pub base64: String,
}

impl ImageContent {
    pub fn new(mime_type: impl Into<String>, base64: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            base64: base64.into(),
        }
    }

    pub fn from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self::new(
            mime_type,
            base64::engine::general_purpose::STANDARD.encode(bytes),
        )
    }

    /// Read an image file; the mime type is guessed from the extension and
    /// defaults to `image/jpeg`.
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let mime_type = guess_media_type(path).unwrap_or("image/jpeg");
        Ok(Self::from_bytes(&bytes, mime_type))
    }

    /// `data:` URL form used by OpenAI-style image attachments.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }
}

fn guess_media_type(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase();
    let mt = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => return None,
    };
    Some(mt)
}
