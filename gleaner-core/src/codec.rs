use thiserror::Error;

use crate::record::MetricRecord;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode metric record: {0}")]
    Encode(String),

    #[error("failed to decode metric record: {0}")]
    Decode(String),
}

/// Serialization seam between the canonical record and the topic's wire bytes.
///
/// The reporter treats the encoded value as opaque; downstream consumers pick
/// the matching decoder for the topic.
pub trait RecordCodec: Send + Sync {
    fn encode(&self, record: &MetricRecord) -> Result<Vec<u8>, CodecError>;
    fn decode(&self, bytes: &[u8]) -> Result<MetricRecord, CodecError>;
}

/// Default JSON codec.
#[derive(Debug, Default, Clone)]
pub struct JsonRecordCodec;

impl RecordCodec for JsonRecordCodec {
    fn encode(&self, record: &MetricRecord) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(record).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<MetricRecord, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
