//! Store keys for job records.
//!
//! A key is `"{namespace}:{token}"`. The token comes from a binding and is
//! embedded verbatim in notification patterns, so it may not contain the key
//! delimiter, whitespace/control characters, or glob metacharacters.

use crate::error::{CodecError, CodecResult};

/// Separator between namespace and token.
pub const KEY_DELIMITER: char = ':';

const GLOB_CHARS: [char; 5] = ['*', '?', '[', ']', '\\'];

/// A validated store key for one job record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    namespace_len: usize,
    key: String,
}

impl JobKey {
    /// Build the key for `token` inside `namespace`.
    pub fn new(namespace: &str, token: &str) -> CodecResult<Self> {
        validate_segment(namespace)?;
        validate_segment(token)?;

        Ok(Self {
            namespace_len: namespace.len(),
            key: format!("{namespace}{KEY_DELIMITER}{token}"),
        })
    }

    /// Parse a raw store key, requiring it to live in `namespace`.
    pub fn parse(namespace: &str, raw: &str) -> CodecResult<Self> {
        let foreign = || CodecError::ForeignKey {
            key: raw.to_string(),
            namespace: namespace.to_string(),
        };

        let token = raw
            .strip_prefix(namespace)
            .and_then(|rest| rest.strip_prefix(KEY_DELIMITER))
            .ok_or_else(foreign)?;

        Self::new(namespace, token)
    }

    /// Prefix shared by every key of `namespace` (used for key-created subscriptions).
    pub fn prefix(namespace: &str) -> String {
        format!("{namespace}{KEY_DELIMITER}")
    }

    pub fn namespace(&self) -> &str {
        &self.key[..self.namespace_len]
    }

    pub fn token(&self) -> &str {
        &self.key[self.namespace_len + KEY_DELIMITER.len_utf8()..]
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl core::fmt::Display for JobKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.key)
    }
}

impl AsRef<str> for JobKey {
    fn as_ref(&self) -> &str {
        &self.key
    }
}

fn validate_segment(segment: &str) -> CodecResult<()> {
    if segment.is_empty() {
        return Err(CodecError::invalid_id("empty key segment"));
    }

    let reserved = segment.chars().find(|&ch| {
        ch == KEY_DELIMITER || ch.is_whitespace() || ch.is_control() || GLOB_CHARS.contains(&ch)
    });

    match reserved {
        Some(ch) => Err(CodecError::ReservedCharacter {
            token: segment.to_string(),
            ch,
        }),
        None => Ok(()),
    }
}
