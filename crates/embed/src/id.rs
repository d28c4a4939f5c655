//! Embed job identifiers.
//!
//! Tokens look like `{handle}/{slug}` or `{handle}/{slug}/{flags}`, where
//! `flags` is the normalized flag string.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Placeholder used in URLs to say "no flags".
pub const NO_FLAGS: &str = "_";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("unknown flag {0:?}")]
    UnknownFlag(char),

    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} contains invalid character {ch:?}")]
    InvalidCharacter { field: &'static str, ch: char },

    #[error("malformed embed token {0:?}")]
    MalformedToken(String),
}

/// Render option for a preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flag {
    /// Wide screenshot viewport.
    Widescreen,
    LightMode,
}

impl Flag {
    pub fn as_char(&self) -> char {
        match self {
            Flag::Widescreen => 'w',
            Flag::LightMode => 'l',
        }
    }

    /// `Ok(None)` for flags that are accepted but have no effect.
    fn from_char(ch: char) -> Result<Option<Self>, IdError> {
        match ch {
            'w' => Ok(Some(Flag::Widescreen)),
            'l' => Ok(Some(Flag::LightMode)),
            // Dark mode used to be opt-in; it is the default now.
            'd' => Ok(None),
            other => Err(IdError::UnknownFlag(other)),
        }
    }
}

/// A normalized, deduplicated set of flags.
///
/// Ignored flags are dropped during parsing, so two flag strings that render
/// the same preview normalize to the same value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Flags(Vec<Flag>);

impl Flags {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(flags: impl IntoIterator<Item = Flag>) -> Self {
        let mut flags: Vec<Flag> = flags.into_iter().collect();
        flags.sort_by_key(Flag::as_char);
        flags.dedup();
        Self(flags)
    }

    /// Parse a raw flag string from a URL. `""` and `"_"` mean no flags.
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        if raw.is_empty() || raw == NO_FLAGS {
            return Ok(Self::none());
        }

        let mut flags = Vec::new();
        for ch in raw.chars() {
            if let Some(flag) = Flag::from_char(ch)? {
                flags.push(flag);
            }
        }
        Ok(Self::new(flags))
    }

    pub fn contains(&self, flag: Flag) -> bool {
        self.0.contains(&flag)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Flag> + '_ {
        self.0.iter().copied()
    }

    /// Canonical string form; empty when there are no flags.
    pub fn normalized(&self) -> String {
        self.0.iter().map(Flag::as_char).collect()
    }
}

impl core::fmt::Display for Flags {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.normalized())
    }
}

/// The post a preview is requested for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmbedJobId {
    project_handle: String,
    slug: String,
    flags: Flags,
}

impl EmbedJobId {
    pub fn new(project_handle: impl Into<String>, slug: impl Into<String>, flags: Flags) -> Result<Self, IdError> {
        let project_handle = project_handle.into();
        let slug = slug.into();
        validate("project handle", &project_handle)?;
        validate("slug", &slug)?;

        Ok(Self {
            project_handle,
            slug,
            flags,
        })
    }

    /// Parse the path segments of an embed URL.
    pub fn from_url_parts(flags: Option<&str>, project_handle: &str, slug: &str) -> Result<Self, IdError> {
        let flags = Flags::parse(flags.unwrap_or(""))?;
        Self::new(project_handle, slug, flags)
    }

    pub fn project_handle(&self) -> &str {
        &self.project_handle
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn flags(&self) -> &Flags {
        &self.flags
    }

    /// Store token for this identifier.
    pub fn to_token(&self) -> String {
        if self.flags.is_empty() {
            format!("{}/{}", self.project_handle, self.slug)
        } else {
            format!("{}/{}/{}", self.project_handle, self.slug, self.flags)
        }
    }

    pub fn from_token(token: &str) -> Result<Self, IdError> {
        let malformed = || IdError::MalformedToken(token.to_string());

        let mut parts = token.split('/');
        let handle = parts.next().ok_or_else(malformed)?;
        let slug = parts.next().ok_or_else(malformed)?;
        let flags = parts.next();
        if parts.next().is_some() {
            return Err(malformed());
        }

        let flags = match flags {
            // A token always carries the canonical form.
            Some(raw) => {
                let flags = Flags::parse(raw)?;
                if flags.is_empty() || flags.normalized() != raw {
                    return Err(malformed());
                }
                flags
            }
            None => Flags::none(),
        };

        Self::new(handle, slug, flags)
    }

    /// Path of the post page, relative to the site root: `{handle}/post/{slug}`.
    pub fn post_path(&self) -> String {
        format!("{}/post/{}", self.project_handle, self.slug)
    }

    /// Path of this preview on the embed server, flags included.
    pub fn embed_path(&self) -> String {
        if self.flags.is_empty() {
            format!("/{}", self.post_path())
        } else {
            format!("/{}/{}", self.flags, self.post_path())
        }
    }
}

impl core::fmt::Display for EmbedJobId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.to_token())
    }
}

fn validate(field: &'static str, value: &str) -> Result<(), IdError> {
    if value.is_empty() {
        return Err(IdError::Empty { field });
    }

    let bad = value.chars().find(|&ch| {
        !(ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '~' | '%' | '+'))
    });
    match bad {
        Some(ch) => Err(IdError::InvalidCharacter { field, ch }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_are_normalized() {
        assert_eq!(Flags::parse("lwlw").unwrap().normalized(), "lw");
        assert_eq!(Flags::parse("wl").unwrap(), Flags::parse("lw").unwrap());
        assert!(Flags::parse("_").unwrap().is_empty());
        assert!(Flags::parse("").unwrap().is_empty());
    }

    #[test]
    fn ignored_flag_is_accepted_but_dropped() {
        let flags = Flags::parse("dw").unwrap();
        assert_eq!(flags.normalized(), "w");
        assert!(flags.contains(Flag::Widescreen));
        assert!(Flags::parse("d").unwrap().is_empty());
    }

    #[test]
    fn unknown_flag_rejects_the_id() {
        assert_eq!(Flags::parse("wx"), Err(IdError::UnknownFlag('x')));
        assert!(EmbedJobId::from_url_parts(Some("z"), "staff", "1-hi").is_err());
    }

    #[test]
    fn token_includes_flags_only_when_present() {
        let plain = EmbedJobId::from_url_parts(None, "staff", "123-hello").unwrap();
        assert_eq!(plain.to_token(), "staff/123-hello");
        assert_eq!(plain.embed_path(), "/staff/post/123-hello");

        let wide = EmbedJobId::from_url_parts(Some("ww"), "staff", "123-hello").unwrap();
        assert_eq!(wide.to_token(), "staff/123-hello/w");
        assert_eq!(wide.embed_path(), "/w/staff/post/123-hello");
        assert_eq!(EmbedJobId::from_token("staff/123-hello/w").unwrap(), wide);
    }

    #[test]
    fn non_canonical_tokens_are_rejected() {
        for token in ["staff", "staff/1/wl", "staff/1/w/x", "staff//w", "/1", "staff/1/_"] {
            assert!(EmbedJobId::from_token(token).is_err(), "{token}");
        }
    }

    #[test]
    fn segments_reject_reserved_characters() {
        assert!(EmbedJobId::new("st aff", "1", Flags::none()).is_err());
        assert!(EmbedJobId::new("staff", "a:b", Flags::none()).is_err());
        assert!(EmbedJobId::new("staff", "", Flags::none()).is_err());
    }
}
