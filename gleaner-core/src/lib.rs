pub mod codec;
pub mod record;

pub use codec::{CodecError, JsonRecordCodec, RecordCodec};
pub use record::{MetricClass, MetricRecord};
