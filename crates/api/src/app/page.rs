//! HTML rendering of preview pages.
//!
//! Crawlers read the `<meta>` tags; browsers follow the redirect script to the
//! post itself. With `?debug` the script is replaced by tables showing the
//! request and everything the worker produced.

use std::fmt::Write;

use linkpeek_embed::{EmbedData, EmbedJobId};

/// Absolute URL of the preview image for `id`.
pub fn image_url(base_url: &str, id: &EmbedJobId) -> String {
    format!("{base_url}{}/image", id.embed_path())
}

pub fn render(id: &EmbedJobId, data: &EmbedData, image_url: &str, debug: bool) -> String {
    let meta = &data.meta;
    let mut html = String::with_capacity(2048);

    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    // og:site_name is left out; it mostly repeats the title.
    meta_tag(&mut html, "property", "og:type", "article");
    meta_tag(&mut html, "property", "og:title", &meta.title);
    meta_tag(&mut html, "property", "og:url", &meta.url);
    meta_tag(&mut html, "property", "og:image", image_url);
    meta_tag(&mut html, "name", "twitter:card", "summary_large_image");
    meta_tag(&mut html, "name", "twitter:image", image_url);
    if !meta.theme_color.is_empty() {
        meta_tag(&mut html, "name", "theme-color", &meta.theme_color);
    }
    let _ = writeln!(html, "<title>{}</title>", escape(&meta.title));
    html.push_str("</head>\n<body>\n");

    if debug {
        debug_tables(&mut html, id, data, image_url);
    } else {
        let _ = writeln!(html, "<script>window.location = {};</script>", script_string(&meta.url));
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn meta_tag(html: &mut String, attr: &str, key: &str, content: &str) {
    let _ = writeln!(html, "<meta {attr}=\"{key}\" content=\"{}\">", escape(content));
}

fn debug_tables(html: &mut String, id: &EmbedJobId, data: &EmbedData, image_url: &str) {
    let meta = &data.meta;
    let flags: Vec<String> = id.flags().iter().map(|f| format!("{f:?}")).collect();

    html.push_str("<strong>request</strong>\n<table><tbody>\n");
    list_row(html, "flags", &flags);
    row(html, "projectHandle", &escape(id.project_handle()));
    row(html, "slug", &escape(id.slug()));
    html.push_str("</tbody></table>\n");

    html.push_str("<strong>post meta</strong>\n<table><tbody>\n");
    row(html, "themeColor", &escape(&meta.theme_color));
    row(html, "siteName", &escape(&meta.site_name));
    row(html, "title", &escape(&meta.title));
    row(html, "description", &escape(&meta.description));
    row(html, "publishedTime", &escape(&meta.published_time));
    link_row(html, "authorUrl", &meta.author_url);
    link_row(html, "url", &meta.url);
    list_row(html, "tags", &meta.tags);
    image_rows(html, "imageUrl", &meta.image_url);
    html.push_str("</tbody></table>\n");

    html.push_str("<strong>post screenshot</strong>\n<table><tbody>\n");
    row(html, "base64", &format!("<code>{}</code>", escape(&data.screenshot.base64)));
    row(html, "mimeType", &escape(&data.screenshot.mime_type));
    image_rows(html, "imageUrl", image_url);
    html.push_str("</tbody></table>\n");
}

/// `cell` must already be escaped.
fn row(html: &mut String, name: &str, cell: &str) {
    let _ = writeln!(html, "<tr><th scope=\"row\">{name}</th><td>{cell}</td></tr>");
}

fn link_row(html: &mut String, name: &str, href: &str) {
    let href = escape(href);
    row(html, name, &format!("<a target=\"_blank\" href=\"{href}\">{href}</a>"));
}

fn list_row(html: &mut String, name: &str, items: &[String]) {
    if items.is_empty() {
        row(html, name, "[empty]");
        return;
    }
    let cell: String = items
        .iter()
        .map(|item| format!("<span>{}</span>", escape(item)))
        .collect::<Vec<_>>()
        .join(" ");
    row(html, name, &cell);
}

fn image_rows(html: &mut String, name: &str, src: &str) {
    link_row(html, name, src);
    let src = escape(src);
    row(
        html,
        &format!("[{name}]"),
        &format!("<a target=\"_blank\" href=\"{src}\"><img src=\"{src}\" alt=\"\"></a>"),
    );
}

/// Escape text for HTML element content and double-quoted attributes.
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// JavaScript string literal for `raw` that is safe inside a `<script>` element.
fn script_string(raw: &str) -> String {
    let literal = serde_json::to_string(raw).unwrap_or_else(|_| "\"\"".to_string());
    literal
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}
