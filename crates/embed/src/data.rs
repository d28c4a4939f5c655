use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// Preview of one post: its page metadata plus a rendered image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedData {
    pub meta: PostMeta,
    pub screenshot: Screenshot,
}

/// Metadata scraped from the post page's `<meta>` tags. Missing tags are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PostMeta {
    /// `theme-color`
    pub theme_color: String,
    /// `og:site_name`
    pub site_name: String,
    /// `og:title`
    pub title: String,
    /// `og:description`
    pub description: String,
    /// `article:published_time`
    pub published_time: String,
    /// `article:author`
    pub author_url: String,
    /// `og:url`
    pub url: String,
    /// every `article:tag`
    pub tags: Vec<String>,
    /// `og:image`
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Screenshot {
    pub mime_type: String,
    pub base64: String,
}

impl Screenshot {
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.into(),
            base64: STANDARD.encode(bytes),
        }
    }

    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(self.base64.as_bytes())
    }
}
