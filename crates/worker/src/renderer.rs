//! Post rendering.
//!
//! A [`PostRenderer`] turns an embed identifier into preview data. The
//! bundled [`HttpPostRenderer`] reads the post page's `<meta>` tags and uses
//! the page's own `og:image` as the screenshot; browser-based capture can be
//! plugged in behind the same trait.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::debug;

use linkpeek_embed::{EmbedData, EmbedJobId, PostMeta, Screenshot};

pub const DEFAULT_ORIGIN: &str = "https://cohost.org";

#[async_trait]
pub trait PostRenderer: Send + Sync {
    async fn render(&self, id: &EmbedJobId) -> Result<EmbedData>;
}

/// Renders previews from the post page over plain HTTP (no JavaScript).
#[derive(Debug, Clone)]
pub struct HttpPostRenderer {
    client: reqwest::Client,
    origin: String,
}

impl HttpPostRenderer {
    pub fn new() -> Result<Self> {
        Self::with_origin(DEFAULT_ORIGIN)
    }

    pub fn with_origin(origin: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("linkpeek/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            origin: origin.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn post_url(&self, id: &EmbedJobId) -> String {
        format!("{}/{}", self.origin, id.post_path())
    }

    async fn fetch(&self, url: &str) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("HTTP request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("HTTP {} for {}", status, url);
        }
        Ok(response)
    }
}

#[async_trait]
impl PostRenderer for HttpPostRenderer {
    async fn render(&self, id: &EmbedJobId) -> Result<EmbedData> {
        let url = self.post_url(id);
        if !id.flags().is_empty() {
            debug!(%id, flags = %id.flags(), "render flags have no effect on http rendering");
        }

        debug!(%id, url = %url, "fetching post");
        let html = self
            .fetch(&url)
            .await?
            .text()
            .await
            .context("Failed to read response body")?;
        let meta = extract_meta(&html);

        if meta.image_url.is_empty() {
            anyhow::bail!("post page {url} has no og:image");
        }

        debug!(%id, image = %meta.image_url, "fetching preview image");
        let response = self.fetch(&meta.image_url).await?;
        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .unwrap_or_else(|| "image/png".to_string());
        let bytes = response
            .bytes()
            .await
            .context("Failed to read preview image")?;

        Ok(EmbedData {
            meta,
            screenshot: Screenshot::from_bytes(mime_type, &bytes),
        })
    }
}

/// Read preview metadata from a post page.
pub fn extract_meta(html: &str) -> PostMeta {
    let document = Html::parse_document(html);

    PostMeta {
        theme_color: first(&document, "name", "theme-color"),
        site_name: first(&document, "property", "og:site_name"),
        title: first(&document, "property", "og:title"),
        description: first(&document, "property", "og:description"),
        published_time: first(&document, "property", "article:published_time"),
        author_url: first(&document, "property", "article:author"),
        url: first(&document, "property", "og:url"),
        tags: all(&document, "property", "article:tag"),
        image_url: first(&document, "property", "og:image"),
    }
}

fn all(document: &Html, attr: &str, key: &str) -> Vec<String> {
    let Ok(selector) = Selector::parse(&format!("meta[{attr}=\"{key}\"]")) else {
        return Vec::new();
    };

    document
        .select(&selector)
        .map(|el| el.value().attr("content").unwrap_or_default().to_string())
        .collect()
}

fn first(document: &Html, attr: &str, key: &str) -> String {
    all(document, attr, key).into_iter().next().unwrap_or_default()
}
