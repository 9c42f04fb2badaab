pub mod cdc;
pub mod generator;
pub mod sink;

pub use cdc::{CdcConsumer, KafkaChangeLog, KafkaLogConfig};
pub use generator::{EventGenerator, GeneratorConfig};
pub use sink::{ClickHouseConfig, ClickHouseSink, Sink, SinkError};
