//! Job records: the store-resident state of one job.
//!
//! A record is a flat string-to-string mapping. Its state is read from which
//! fields are present, never from a stored state flag:
//!
//! | field          | present when                         |
//! |----------------|--------------------------------------|
//! | `enqueued_at`  | the record was created (`waiting`)   |
//! | `claimed`      | a consumer won the claim race        |
//! | `payload`      | the job completed                    |
//! | `completed_at` | written alongside `payload`          |

use std::collections::HashMap;

use crate::error::CodecResult;

/// Raw field mapping of one record, as stored.
pub type RecordFields = HashMap<String, String>;

/// Field names of the record layout.
pub mod fields {
    /// Written once, by the conditional create that brings the record into existence.
    pub const ENQUEUED_AT: &str = "enqueued_at";
    /// Presence marks the record as claimed; the value is informational.
    pub const CLAIMED: &str = "claimed";
    /// Serialized domain payload; presence marks the record as complete.
    pub const PAYLOAD: &str = "payload";
    pub const COMPLETED_AT: &str = "completed_at";
}

/// Lifecycle position of a record. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobState {
    Waiting,
    Claimed,
    Complete,
}

impl JobState {
    /// Derive the state from the fields present on a record.
    pub fn of(raw: &RecordFields) -> Self {
        if raw.contains_key(fields::PAYLOAD) {
            JobState::Complete
        } else if raw.contains_key(fields::CLAIMED) {
            JobState::Claimed
        } else {
            JobState::Waiting
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Claimed => "claimed",
            JobState::Complete => "complete",
        }
    }
}

impl core::fmt::Display for JobState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded job record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobRecord<P> {
    /// Enqueued, nobody has claimed it yet.
    Waiting,
    /// A consumer owns the job; no result yet.
    Claimed,
    /// Finished; the payload is immutable from here on.
    Complete(P),
}

impl<P> JobRecord<P> {
    /// Decode a raw record, deserializing the payload only when present.
    pub fn from_fields<F>(raw: &RecordFields, decode: F) -> CodecResult<Self>
    where
        F: FnOnce(&str) -> CodecResult<P>,
    {
        match raw.get(fields::PAYLOAD) {
            Some(payload) => Ok(JobRecord::Complete(decode(payload)?)),
            None if raw.contains_key(fields::CLAIMED) => Ok(JobRecord::Claimed),
            None => Ok(JobRecord::Waiting),
        }
    }

    pub fn state(&self) -> JobState {
        match self {
            JobRecord::Waiting => JobState::Waiting,
            JobRecord::Claimed => JobState::Claimed,
            JobRecord::Complete(_) => JobState::Complete,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, JobRecord::Complete(_))
    }

    pub fn payload(&self) -> Option<&P> {
        match self {
            JobRecord::Complete(payload) => Some(payload),
            _ => None,
        }
    }

    pub fn into_payload(self) -> Option<P> {
        match self {
            JobRecord::Complete(payload) => Some(payload),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;

    fn record(pairs: &[(&str, &str)]) -> RecordFields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn decode(raw: &str) -> CodecResult<String> {
        Ok(raw.to_uppercase())
    }

    #[test]
    fn state_follows_field_presence() {
        assert_eq!(JobState::of(&record(&[])), JobState::Waiting);
        assert_eq!(
            JobState::of(&record(&[(fields::ENQUEUED_AT, "t")])),
            JobState::Waiting
        );
        assert_eq!(
            JobState::of(&record(&[(fields::CLAIMED, "")])),
            JobState::Claimed
        );
        assert_eq!(
            JobState::of(&record(&[(fields::CLAIMED, ""), (fields::PAYLOAD, "p")])),
            JobState::Complete
        );
    }

    #[test]
    fn claimed_value_is_irrelevant() {
        let rec = JobRecord::from_fields(&record(&[(fields::CLAIMED, "")]), decode).unwrap();
        assert_eq!(rec, JobRecord::Claimed);
    }

    #[test]
    fn payload_is_decoded_only_when_complete() {
        let waiting = JobRecord::<String>::from_fields(
            &record(&[(fields::ENQUEUED_AT, "t")]),
            |_| panic!("must not decode"),
        )
        .unwrap();
        assert_eq!(waiting, JobRecord::Waiting);

        let complete = JobRecord::from_fields(&record(&[(fields::PAYLOAD, "done")]), decode).unwrap();
        assert_eq!(complete.payload().map(String::as_str), Some("DONE"));
        assert_eq!(complete.state(), JobState::Complete);
    }

    #[test]
    fn decode_failure_is_reported() {
        let err = JobRecord::<String>::from_fields(&record(&[(fields::PAYLOAD, "x")]), |_| {
            Err(CodecError::payload("bad"))
        })
        .unwrap_err();
        assert_eq!(err, CodecError::Payload("bad".into()));
    }
}
