use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::codec::decode_envelope;
use super::log::{ChangeLog, LogMessage};
use super::models::OpCode;
use super::translator::{translate, DropReason};
use crate::error::Result;
use crate::logging;
use crate::metrics::{IngestionMetrics, REASON_MALFORMED_PAYLOAD, REASON_SINK};
use crate::services::sink::Sink;

/// Lifecycle of the consumer loop, published through
/// [`CdcConsumer::subscribe_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Running,
    Processing,
    Stopping,
    Stopped,
}

/// What happened to one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Delivered { id: u64, op: OpCode },
    Malformed,
    Dropped(DropReason),
    DeliveryFailed,
}

/// CDC consumer loop.
///
/// Processes one message at a time in fetch order: decode, translate, insert,
/// then commit. Only the fetch is raced against shutdown, so a fetched message
/// is always carried through delivery and commit before the loop stops.
pub struct CdcConsumer<L: ChangeLog> {
    log: L,
    processor: MessageProcessor,
    shutdown: watch::Receiver<bool>,
    state: watch::Sender<ConsumerState>,
}

/// Decode -> translate -> insert for a single message.
pub struct MessageProcessor {
    sink: Arc<dyn Sink>,
    metrics: IngestionMetrics,
}

impl<L: ChangeLog> CdcConsumer<L> {
    pub fn new(
        log: L,
        sink: Arc<dyn Sink>,
        metrics: IngestionMetrics,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            log,
            processor: MessageProcessor::new(sink, metrics),
            shutdown,
            state: watch::channel(ConsumerState::Idle).0,
        }
    }

    pub fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    /// Follow state transitions while [`CdcConsumer::run`] holds the consumer.
    pub fn subscribe_state(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ConsumerState) {
        self.state.send_replace(state);
    }

    pub fn into_log(self) -> L {
        self.log
    }

    /// Run until shutdown is signalled or the log fails.
    ///
    /// Returns `Ok(())` on shutdown and the fetch error otherwise; a failed
    /// log cannot be recovered from inside the loop. The log is closed on
    /// both paths.
    pub async fn run(&mut self) -> Result<()> {
        info!("Starting CDC consumer loop");
        self.set_state(ConsumerState::Running);

        let result = loop {
            if *self.shutdown.borrow() {
                info!("Shutdown signal received, stopping CDC consumer");
                break Ok(());
            }

            let message = tokio::select! {
                biased;

                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        info!("Shutdown signal received, stopping CDC consumer");
                        break Ok(());
                    }
                    continue;
                }

                fetched = self.log.fetch() => match fetched {
                    Ok(message) => message,
                    Err(e) => {
                        error!(error = %e, "CDC change log fetch failed, stopping consumer");
                        break Err(e);
                    }
                },
            };

            self.set_state(ConsumerState::Processing);
            self.processor.metrics.cdc_messages_total.inc();

            let span = info_span!(
                "cdc.message",
                trace_id = tracing::field::Empty,
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
            );
            span.record("trace_id", logging::trace_id(&span).as_str());

            let processor = &self.processor;
            let log = &mut self.log;
            async move {
                let outcome = processor.process(&message).await;
                debug!(?outcome, "CDC message processed");

                if let Err(e) = log.commit(&message) {
                    warn!(error = %e, "Failed to commit CDC offset");
                }
            }
            .instrument(span)
            .await;

            self.set_state(ConsumerState::Running);
        };

        self.set_state(ConsumerState::Stopping);
        info!("CDC consumer stopping");
        if let Err(e) = self.log.close().await {
            warn!(error = %e, "Failed to flush CDC offsets on close");
        }

        self.set_state(ConsumerState::Stopped);
        info!("CDC consumer stopped");
        result
    }
}

impl MessageProcessor {
    pub fn new(sink: Arc<dyn Sink>, metrics: IngestionMetrics) -> Self {
        Self { sink, metrics }
    }

    /// Decode, translate and deliver one message. Never fails: every problem
    /// is logged, counted and turned into an outcome.
    pub async fn process(&self, message: &LogMessage) -> MessageOutcome {
        debug!("Received CDC message");

        let envelope = match message.payload.as_deref().map(decode_envelope) {
            Some(Ok(envelope)) => envelope,
            Some(Err(e)) => {
                warn!(error = %e, "Failed to decode CDC payload, skipping");
                self.metrics.record_cdc_error(REASON_MALFORMED_PAYLOAD);
                return MessageOutcome::Malformed;
            }
            None => {
                warn!("Empty CDC payload, skipping");
                self.metrics.record_cdc_error(REASON_MALFORMED_PAYLOAD);
                return MessageOutcome::Malformed;
            }
        };

        let row = match translate(envelope, message.key.as_deref()) {
            Ok(row) => row,
            Err(reason) => {
                warn!(reason = reason.label(), "Dropping CDC message: {}", reason);
                self.metrics.record_cdc_error(reason.label());
                return MessageOutcome::Dropped(reason);
            }
        };

        let (id, op) = (row.id, row.op);
        if id == 0 {
            warn!(op = u8::from(op), "CDC row has no identifier, inserting with id=0");
        }
        debug!(id, op = u8::from(op), "CDC envelope translated to row");

        match self.sink.insert_row(&row).await {
            Ok(()) => {
                info!(id, op = u8::from(op), "CDC row inserted");
                MessageOutcome::Delivered { id, op }
            }
            Err(e) => {
                error!(id, op = u8::from(op), error = %e, "Failed to insert CDC row");
                self.metrics.record_cdc_error(REASON_SINK);
                MessageOutcome::DeliveryFailed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SyntheticEvent;
    use crate::services::cdc::CanonicalRow;
    use crate::services::sink::SinkError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        rows: Mutex<Vec<CanonicalRow>>,
        reject: bool,
    }

    #[async_trait]
    impl Sink for RecordingSink {
        async fn insert_row(&self, row: &CanonicalRow) -> std::result::Result<(), SinkError> {
            if self.reject {
                return Err(SinkError::Rejected {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            self.rows.lock().unwrap().push(row.clone());
            Ok(())
        }

        async fn insert_event(&self, _event: &SyntheticEvent) -> std::result::Result<(), SinkError> {
            Ok(())
        }
    }

    fn message(payload: Option<&[u8]>, key: Option<&[u8]>) -> LogMessage {
        LogMessage {
            topic: "dbserver1.app.users".to_string(),
            partition: 0,
            offset: 0,
            key: key.map(<[u8]>::to_vec),
            payload: payload.map(<[u8]>::to_vec),
        }
    }

    #[tokio::test]
    async fn test_create_is_delivered() {
        let sink = Arc::new(RecordingSink::default());
        let metrics = IngestionMetrics::new().unwrap();
        let processor = MessageProcessor::new(sink.clone(), metrics.clone());

        let outcome = processor
            .process(&message(
                Some(br#"{"op":"c","after":{"id":7,"name":"Ann","email":"a@x.com"},"source":{"lsn":100}}"#),
                None,
            ))
            .await;

        assert_eq!(
            outcome,
            MessageOutcome::Delivered {
                id: 7,
                op: OpCode::Create
            }
        );
        let rows = sink.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].lsn, 100);
    }

    #[tokio::test]
    async fn test_delete_uses_message_key() {
        let sink = Arc::new(RecordingSink::default());
        let processor = MessageProcessor::new(sink.clone(), IngestionMetrics::new().unwrap());

        let outcome = processor
            .process(&message(Some(br#"{"op":"d","before":null}"#), Some(br#"{"id":21}"#)))
            .await;

        assert_eq!(
            outcome,
            MessageOutcome::Delivered {
                id: 21,
                op: OpCode::Delete
            }
        );
        assert!(sink.rows.lock().unwrap()[0].is_deleted());
    }

    #[tokio::test]
    async fn test_unknown_op_never_reaches_sink() {
        let sink = Arc::new(RecordingSink::default());
        let metrics = IngestionMetrics::new().unwrap();
        let processor = MessageProcessor::new(sink.clone(), metrics.clone());

        let outcome = processor.process(&message(Some(br#"{"op":"x"}"#), None)).await;

        assert_eq!(
            outcome,
            MessageOutcome::Dropped(DropReason::UnknownOp("x".to_string()))
        );
        let outcome = processor
            .process(&message(Some(br#"{"op":"D","before":{"id":4}}"#), Some(br#"{"id":4}"#)))
            .await;
        assert_eq!(
            outcome,
            MessageOutcome::Dropped(DropReason::UnknownOp("D".to_string()))
        );

        assert!(sink.rows.lock().unwrap().is_empty());
        assert_eq!(metrics.cdc_errors("unknown_op"), 2);
    }

    #[tokio::test]
    async fn test_malformed_and_empty_payloads_are_skipped() {
        let sink = Arc::new(RecordingSink::default());
        let metrics = IngestionMetrics::new().unwrap();
        let processor = MessageProcessor::new(sink.clone(), metrics.clone());

        assert_eq!(
            processor.process(&message(Some(b"\x00\x01garbage"), None)).await,
            MessageOutcome::Malformed
        );
        assert_eq!(
            processor.process(&message(None, Some(br#"{"id":1}"#))).await,
            MessageOutcome::Malformed
        );
        assert!(sink.rows.lock().unwrap().is_empty());
        assert_eq!(metrics.cdc_errors(REASON_MALFORMED_PAYLOAD), 2);
    }

    #[tokio::test]
    async fn test_sink_failure_is_counted_not_raised() {
        let sink = Arc::new(RecordingSink {
            reject: true,
            ..Default::default()
        });
        let metrics = IngestionMetrics::new().unwrap();
        let processor = MessageProcessor::new(sink, metrics.clone());

        let outcome = processor
            .process(&message(Some(br#"{"op":"u","after":{"id":1}}"#), None))
            .await;

        assert_eq!(outcome, MessageOutcome::DeliveryFailed);
        assert_eq!(metrics.cdc_errors(REASON_SINK), 1);
    }
}
