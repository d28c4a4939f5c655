use linkpeek_core::{CodecError, CodecResult, JobBinding};

use crate::data::EmbedData;
use crate::id::EmbedJobId;

/// Store namespace for embed jobs.
pub const EMBED_NAMESPACE: &str = "embed";

/// Binds embed previews to the job coordinator: identifiers become
/// `{handle}/{slug}[/{flags}]` tokens and payloads are JSON.
#[derive(Debug, Clone, Default)]
pub struct EmbedBinding;

impl JobBinding for EmbedBinding {
    type Id = EmbedJobId;
    type Payload = EmbedData;

    fn namespace(&self) -> &str {
        EMBED_NAMESPACE
    }

    fn serialize_id(&self, id: &EmbedJobId) -> CodecResult<String> {
        Ok(id.to_token())
    }

    fn deserialize_id(&self, token: &str) -> CodecResult<EmbedJobId> {
        EmbedJobId::from_token(token).map_err(|e| CodecError::invalid_id(e.to_string()))
    }

    fn serialize_payload(&self, payload: &EmbedData) -> CodecResult<String> {
        serde_json::to_string(payload).map_err(|e| CodecError::payload(e.to_string()))
    }

    fn deserialize_payload(&self, raw: &str) -> CodecResult<EmbedData> {
        serde_json::from_str(raw).map_err(|e| CodecError::payload(e.to_string()))
    }
}
