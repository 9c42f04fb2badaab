mod codec;
mod consumer;
mod log;
mod models;
mod translator;

pub use codec::{decode_envelope, MalformedPayload};
pub use consumer::{CdcConsumer, ConsumerState, MessageOutcome, MessageProcessor};
pub use log::{ChangeLog, KafkaChangeLog, KafkaLogConfig, LogMessage};
pub use models::{
    CanonicalRow, ChangeEnvelope, ChangeOp, MessageKey, OpCode, RowImage, SourceInfo,
};
pub use translator::{translate, DropReason};
