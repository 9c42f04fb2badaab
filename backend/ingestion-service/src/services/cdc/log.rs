//! Change log sources.

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{Offset, TopicPartitionList};
use std::collections::HashMap;
use tracing::{debug, error, info};

use crate::error::{IngestionError, Result};

/// One record taken from the change log, detached from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Option<Vec<u8>>,
}

/// Ordered, partitioned source of change messages.
///
/// `fetch` must be cancel safe: dropping its future before completion must
/// not lose a message. Positions only advance through `commit`.
#[async_trait]
pub trait ChangeLog: Send {
    /// Wait for the next message. An error means the log is unusable.
    async fn fetch(&mut self) -> Result<LogMessage>;

    /// Mark `message` and everything before it on its partition as consumed.
    fn commit(&mut self, message: &LogMessage) -> Result<()>;

    /// Make every position passed to `commit` durable before the log is dropped.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct KafkaLogConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    pub group_id: String,
}

/// [`ChangeLog`] over a Kafka/Redpanda consumer group.
///
/// Auto-commit is disabled; offsets are committed only when the consumer loop
/// calls [`ChangeLog::commit`]. Those commits are async, so `close` repeats the
/// latest position per partition synchronously.
pub struct KafkaChangeLog {
    consumer: StreamConsumer,
    positions: HashMap<(String, i32), i64>,
}

impl KafkaChangeLog {
    /// Create the consumer and subscribe to the configured topic.
    pub fn connect(config: &KafkaLogConfig) -> Result<Self> {
        if config.topic.trim().is_empty() || config.group_id.trim().is_empty() {
            return Err(IngestionError::Config(
                "CDC change log needs a topic and a consumer group".to_string(),
            ));
        }

        info!(
            brokers = ?config.brokers,
            topic = %config.topic,
            group_id = %config.group_id,
            "Connecting CDC change log"
        );

        let consumer: StreamConsumer = ClientConfig::new()
            .set("group.id", &config.group_id)
            .set("bootstrap.servers", config.brokers.join(","))
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "30000")
            .set("heartbeat.interval.ms", "3000")
            .set("max.poll.interval.ms", "300000")
            .set("fetch.max.bytes", (10 << 20).to_string())
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| {
                error!("Failed to create Kafka consumer: {}", e);
                IngestionError::Kafka(e.to_string())
            })?;

        consumer.subscribe(&[config.topic.as_str()]).map_err(|e| {
            error!("Failed to subscribe to topic: {}", e);
            IngestionError::Kafka(e.to_string())
        })?;

        info!("CDC change log subscribed to topic: {}", config.topic);

        Ok(Self {
            consumer,
            positions: HashMap::new(),
        })
    }

    fn partition_list<'a>(
        positions: impl IntoIterator<Item = (&'a str, i32, i64)>,
    ) -> Result<TopicPartitionList> {
        let mut list = TopicPartitionList::new();
        for (topic, partition, next_offset) in positions {
            list.add_partition_offset(topic, partition, Offset::Offset(next_offset))
                .map_err(|e| IngestionError::Commit(e.to_string()))?;
        }
        Ok(list)
    }
}

#[async_trait]
impl ChangeLog for KafkaChangeLog {
    async fn fetch(&mut self) -> Result<LogMessage> {
        let msg = self
            .consumer
            .recv()
            .await
            .map_err(|e| IngestionError::Fetch(e.to_string()))?;

        Ok(LogMessage {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            key: msg.key().map(<[u8]>::to_vec),
            payload: msg.payload().map(<[u8]>::to_vec),
        })
    }

    fn commit(&mut self, message: &LogMessage) -> Result<()> {
        let next_offset = message.offset + 1;
        self.positions
            .insert((message.topic.clone(), message.partition), next_offset);

        let list =
            Self::partition_list([(message.topic.as_str(), message.partition, next_offset)])?;
        self.consumer
            .commit(&list, CommitMode::Async)
            .map_err(|e| IngestionError::Commit(e.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        if self.positions.is_empty() {
            return Ok(());
        }

        let list = Self::partition_list(
            self.positions
                .iter()
                .map(|((topic, partition), offset)| (topic.as_str(), *partition, *offset)),
        )?;

        // blocks until the group coordinator acknowledges
        self.consumer
            .commit(&list, CommitMode::Sync)
            .map_err(|e| IngestionError::Commit(e.to_string()))?;

        debug!(partitions = self.positions.len(), "Final CDC offsets committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_list_carries_next_offsets() {
        let list = KafkaChangeLog::partition_list([
            ("dbserver1.app.users", 0, 11),
            ("dbserver1.app.users", 3, 42),
        ])
        .unwrap();

        assert_eq!(list.count(), 2);
        let p3 = list.find_partition("dbserver1.app.users", 3).unwrap();
        assert_eq!(p3.offset(), Offset::Offset(42));
    }

    #[test]
    fn test_connect_rejects_missing_topic_or_group() {
        let config = KafkaLogConfig {
            brokers: vec!["localhost:9092".to_string()],
            topic: " ".to_string(),
            group_id: "wal-cdc-ingestor".to_string(),
        };
        assert!(matches!(
            KafkaChangeLog::connect(&config),
            Err(IngestionError::Config(_))
        ));

        let config = KafkaLogConfig {
            topic: "dbserver1.app.users".to_string(),
            group_id: String::new(),
            ..config
        };
        assert!(matches!(
            KafkaChangeLog::connect(&config),
            Err(IngestionError::Config(_))
        ));
    }
}
