//! In-memory change log and recording sink shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use ingestion_service::models::SyntheticEvent;
use ingestion_service::services::cdc::{CanonicalRow, ChangeLog, LogMessage};
use ingestion_service::services::{Sink, SinkError};
use ingestion_service::{IngestionError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TOPIC: &str = "dbserver1.app.users";

#[derive(Default)]
struct BrokerState {
    messages: Vec<LogMessage>,
    /// Next offset to hand out to a fresh reader
    committed: i64,
    fail_when_exhausted: bool,
    journal: Vec<String>,
}

/// Single-partition log whose committed position survives reader restarts.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A broker whose readers fail once they run out of messages.
    pub fn failing_when_exhausted() -> Self {
        let broker = Self::default();
        broker.state.lock().unwrap().fail_when_exhausted = true;
        broker
    }

    pub fn publish(&self, key: Option<&[u8]>, payload: Option<&[u8]>) {
        let mut state = self.state.lock().unwrap();
        let offset = state.messages.len() as i64;
        state.messages.push(LogMessage {
            topic: TOPIC.to_string(),
            partition: 0,
            offset,
            key: key.map(<[u8]>::to_vec),
            payload: payload.map(<[u8]>::to_vec),
        });
    }

    pub fn committed(&self) -> i64 {
        self.state.lock().unwrap().committed
    }

    /// Ordered record of inserts and commits.
    pub fn journal(&self) -> Vec<String> {
        self.state.lock().unwrap().journal.clone()
    }

    fn record(&self, entry: String) {
        self.state.lock().unwrap().journal.push(entry);
    }

    /// Join the group: reading resumes at the committed position.
    pub fn reader(&self) -> MemoryLog {
        MemoryLog {
            broker: self.clone(),
            cursor: self.committed(),
        }
    }

    pub async fn wait_for_commit(&self, offset: i64) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.committed() < offset {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("commit position never reached");
    }
}

pub struct MemoryLog {
    broker: MemoryBroker,
    cursor: i64,
}

#[async_trait]
impl ChangeLog for MemoryLog {
    async fn fetch(&mut self) -> Result<LogMessage> {
        let next = {
            let state = self.broker.state.lock().unwrap();
            match state.messages.get(self.cursor as usize) {
                Some(message) => Some(message.clone()),
                None if state.fail_when_exhausted => {
                    return Err(IngestionError::Fetch("broker connection lost".to_string()))
                }
                None => None,
            }
        };

        match next {
            Some(message) => {
                self.cursor += 1;
                Ok(message)
            }
            None => std::future::pending().await,
        }
    }

    fn commit(&mut self, message: &LogMessage) -> Result<()> {
        self.broker.record(format!("commit:{}", message.offset));
        let mut state = self.broker.state.lock().unwrap();
        state.committed = state.committed.max(message.offset + 1);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.broker.record("close".to_string());
        Ok(())
    }
}

/// Sink that keeps every row it is given.
#[derive(Default)]
pub struct RecordingSink {
    rows: Mutex<Vec<CanonicalRow>>,
    events: Mutex<Vec<SyntheticEvent>>,
    journal: Option<MemoryBroker>,
    /// Never return after storing this many rows, like a process dying mid-flight.
    hang_after: Option<usize>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn journaling(broker: &MemoryBroker) -> Self {
        Self {
            journal: Some(broker.clone()),
            ..Default::default()
        }
    }

    pub fn hanging_after(rows: usize) -> Self {
        Self {
            hang_after: Some(rows),
            ..Default::default()
        }
    }

    pub fn rows(&self) -> Vec<CanonicalRow> {
        self.rows.lock().unwrap().clone()
    }

    pub async fn wait_for_rows(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.rows.lock().unwrap().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("sink never received the expected rows");
    }
}

#[async_trait]
impl Sink for RecordingSink {
    async fn insert_row(&self, row: &CanonicalRow) -> std::result::Result<(), SinkError> {
        if let Some(broker) = &self.journal {
            broker.record(format!("insert:{}", row.id));
        }

        let stored = {
            let mut rows = self.rows.lock().unwrap();
            rows.push(row.clone());
            rows.len()
        };

        if self.hang_after.is_some_and(|limit| stored >= limit) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn insert_event(&self, event: &SyntheticEvent) -> std::result::Result<(), SinkError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Current state per id as the sink resolves it at query time: the row with
/// the greatest (`_lsn`, `_op`) wins.
pub fn resolve_current(rows: &[CanonicalRow]) -> HashMap<u64, CanonicalRow> {
    let mut current: HashMap<u64, CanonicalRow> = HashMap::new();
    for row in rows {
        let newer = current
            .get(&row.id)
            .map_or(true, |seen| (row.lsn, row.op) > (seen.lsn, seen.op));
        if newer {
            current.insert(row.id, row.clone());
        }
    }
    current
}
