//! Job type bindings: specialise the generic coordinator to one job domain.

use core::fmt::Debug;

use crate::error::{CodecError, CodecResult};

/// The four conversions (plus a namespace) that bind a job domain to the store.
///
/// Both pairs must round-trip exactly for every value the domain can produce:
/// `deserialize_id(serialize_id(x)) == x` and likewise for payloads. Distinct
/// identifiers must never serialize to the same token, and tokens must not use
/// characters the store reserves (see [`JobKey`](crate::JobKey)).
pub trait JobBinding: Send + Sync + 'static {
    /// Domain identifier of one unit of deduplicated work.
    type Id: Clone + Debug + Send + Sync + 'static;
    /// Domain result of the work, opaque to the coordinator.
    type Payload: Debug + Send + Sync + 'static;

    /// Key namespace for this domain, e.g. `"embed"`.
    fn namespace(&self) -> &str;

    fn serialize_id(&self, id: &Self::Id) -> CodecResult<String>;

    fn deserialize_id(&self, token: &str) -> CodecResult<Self::Id>;

    fn serialize_payload(&self, payload: &Self::Payload) -> CodecResult<String>;

    fn deserialize_payload(&self, raw: &str) -> CodecResult<Self::Payload>;
}

/// Identity binding over plain strings.
///
/// Useful for tests and for domains whose identifiers are already opaque
/// tokens. Empty identifiers are rejected.
#[derive(Debug, Clone)]
pub struct TextBinding {
    namespace: String,
}

impl TextBinding {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }
}

impl JobBinding for TextBinding {
    type Id = String;
    type Payload = String;

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn serialize_id(&self, id: &String) -> CodecResult<String> {
        if id.is_empty() {
            return Err(CodecError::invalid_id("empty identifier"));
        }
        Ok(id.clone())
    }

    fn deserialize_id(&self, token: &str) -> CodecResult<String> {
        if token.is_empty() {
            return Err(CodecError::invalid_id("empty token"));
        }
        Ok(token.to_string())
    }

    fn serialize_payload(&self, payload: &String) -> CodecResult<String> {
        Ok(payload.clone())
    }

    fn deserialize_payload(&self, raw: &str) -> CodecResult<String> {
        Ok(raw.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_binding_rejects_empty_ids() {
        let binding = TextBinding::new("jobs");
        assert!(binding.serialize_id(&String::new()).is_err());
        assert!(binding.deserialize_id("").is_err());
        assert_eq!(binding.serialize_id(&"abc".to_string()).unwrap(), "abc");
    }
}
