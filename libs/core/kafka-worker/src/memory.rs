//! In-process broker
//!
//! Partitioned, append-only topics with per-group committed offsets. Used
//! for local runs (`KAFKA_BROKERS=memory`) and for exercising the worker
//! without a cluster. Faults can be injected to drive retry paths.
//!
//! Development only: there is no retention, so every record stays in memory
//! for the life of the process.

use crate::consumer::RecordSource;
use crate::error::StreamError;
use crate::producer::{DeliveryAck, RecordSink};
use crate::record::ConsumedRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

const DEFAULT_PARTITIONS: i32 = 3;

#[derive(Debug, Clone)]
struct StoredRecord {
    key: String,
    payload: Vec<u8>,
    timestamp: DateTime<Utc>,
}

#[derive(Default)]
struct BrokerState {
    /// topic -> partitions -> records (offset = index)
    topics: HashMap<String, Vec<Vec<StoredRecord>>>,
    /// (group, topic, partition) -> next offset to read
    committed: HashMap<(String, String, i32), i64>,
    fail_sends: u32,
    fail_subscribes: u32,
    fail_polls: u32,
    fatal_poll: bool,
    fail_close: bool,
}

impl BrokerState {
    fn partitions_mut(&mut self, topic: &str, count: i32) -> &mut Vec<Vec<StoredRecord>> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| vec![Vec::new(); count as usize])
    }
}

/// Shared handle to an in-process broker. Cloning shares the same topics.
#[derive(Clone)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    appended: Arc<Notify>,
    partitions: i32,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::with_partitions(DEFAULT_PARTITIONS)
    }

    pub fn with_partitions(partitions: i32) -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState::default())),
            appended: Arc::new(Notify::new()),
            partitions: partitions.max(1),
        }
    }

    /// Partition a key lands on
    pub fn partition_for(&self, key: &str) -> i32 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.partitions as u64) as i32
    }

    /// New group member. Members of one group share committed offsets.
    pub fn consumer(&self, group_id: impl Into<String>) -> MemoryConsumer {
        MemoryConsumer {
            broker: self.clone(),
            group_id: group_id.into(),
            inner: Mutex::new(ConsumerState::default()),
        }
    }

    /// Fail the next `count` sends with a transient error
    pub async fn fail_next_sends(&self, count: u32) {
        self.state.lock().await.fail_sends = count;
    }

    /// Fail the next `count` subscribe calls as if no broker was reachable
    pub async fn fail_next_subscribes(&self, count: u32) {
        self.state.lock().await.fail_subscribes = count;
    }

    /// Fail the next `count` polls with a transient consume error
    pub async fn fail_next_polls(&self, count: u32) {
        self.state.lock().await.fail_polls = count;
    }

    /// Make the next close fail
    pub async fn fail_next_close(&self) {
        self.state.lock().await.fail_close = true;
    }

    /// Make the next poll report a fatal client error
    pub async fn inject_fatal(&self) {
        self.state.lock().await.fatal_poll = true;
        self.appended.notify_waiters();
    }

    /// Number of records stored in a topic across partitions
    pub async fn record_count(&self, topic: &str) -> usize {
        self.state
            .lock()
            .await
            .topics
            .get(topic)
            .map(|parts| parts.iter().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Keys in a partition, in offset order
    pub async fn keys(&self, topic: &str, partition: i32) -> Vec<String> {
        self.state
            .lock()
            .await
            .topics
            .get(topic)
            .and_then(|parts| parts.get(partition as usize))
            .map(|records| records.iter().map(|r| r.key.clone()).collect())
            .unwrap_or_default()
    }

    /// Next offset `group_id` will read from after a restart, if it committed anything
    pub async fn committed_offset(&self, group_id: &str, topic: &str, partition: i32) -> Option<i64> {
        self.state
            .lock()
            .await
            .committed
            .get(&(group_id.to_string(), topic.to_string(), partition))
            .copied()
    }

    /// Append a raw payload, bypassing fault injection. Used to plant
    /// undecodable records.
    pub async fn append_raw(&self, topic: &str, key: &str, payload: &[u8]) -> DeliveryAck {
        let partition = self.partition_for(key);
        let offset = {
            let mut state = self.state.lock().await;
            let records = &mut state.partitions_mut(topic, self.partitions)[partition as usize];
            records.push(StoredRecord {
                key: key.to_string(),
                payload: payload.to_vec(),
                timestamp: Utc::now(),
            });
            (records.len() - 1) as i64
        };
        self.appended.notify_waiters();

        DeliveryAck {
            topic: topic.to_string(),
            partition,
            offset,
        }
    }
}

#[async_trait]
impl RecordSink for MemoryBroker {
    async fn send(&self, topic: &str, key: &str, payload: &[u8]) -> Result<DeliveryAck, StreamError> {
        {
            let mut state = self.state.lock().await;
            if state.fail_sends > 0 {
                state.fail_sends -= 1;
                return Err(StreamError::Unavailable("memory broker send failure".to_string()));
            }
        }

        let ack = self.append_raw(topic, key, payload).await;
        debug!(topic = %ack.topic, partition = ack.partition, offset = ack.offset, "Appended record");
        Ok(ack)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[derive(Default)]
struct ConsumerState {
    topics: Vec<String>,
    /// (topic, partition) -> next offset to read
    positions: HashMap<(String, i32), i64>,
    subscribed: bool,
}

/// Group member of a [`MemoryBroker`]
pub struct MemoryConsumer {
    broker: MemoryBroker,
    group_id: String,
    inner: Mutex<ConsumerState>,
}

impl MemoryConsumer {
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    async fn next_record(&self) -> Result<Option<ConsumedRecord>, StreamError> {
        let mut state = self.broker.state.lock().await;

        if state.fatal_poll {
            state.fatal_poll = false;
            return Err(StreamError::Fatal("memory broker fatal error".to_string()));
        }
        if state.fail_polls > 0 {
            state.fail_polls -= 1;
            return Err(StreamError::Unavailable("memory broker poll failure".to_string()));
        }

        let mut inner = self.inner.lock().await;
        if !inner.subscribed {
            return Ok(None);
        }

        for topic in inner.topics.clone() {
            let Some(partitions) = state.topics.get(&topic) else {
                continue;
            };
            for (index, records) in partitions.iter().enumerate() {
                let partition = index as i32;
                let committed = state
                    .committed
                    .get(&(self.group_id.clone(), topic.clone(), partition))
                    .copied()
                    .unwrap_or(0);
                let position = inner
                    .positions
                    .entry((topic.clone(), partition))
                    .or_insert(committed);

                if let Some(stored) = records.get(*position as usize) {
                    let record = ConsumedRecord {
                        topic: topic.clone(),
                        partition,
                        offset: *position,
                        key: Some(stored.key.clone().into_bytes()),
                        payload: Some(stored.payload.clone()),
                        timestamp: Some(stored.timestamp),
                    };
                    *position += 1;
                    return Ok(Some(record));
                }
            }
        }

        Ok(None)
    }
}

#[async_trait]
impl RecordSource for MemoryConsumer {
    async fn subscribe(&self, topics: &[String]) -> Result<(), StreamError> {
        {
            let mut state = self.broker.state.lock().await;
            if state.fail_subscribes > 0 {
                state.fail_subscribes -= 1;
                return Err(StreamError::Subscription {
                    topics: topics.to_vec(),
                    reason: "memory broker unavailable".to_string(),
                });
            }
        }

        let mut inner = self.inner.lock().await;
        inner.topics = topics.to_vec();
        // Resume from committed offsets, as a rebalance would.
        inner.positions.clear();
        inner.subscribed = true;
        Ok(())
    }

    async fn poll(&self, timeout: Duration) -> Result<Option<ConsumedRecord>, StreamError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let appended = self.broker.appended.notified();
            tokio::pin!(appended);
            appended.as_mut().enable();

            if let Some(record) = self.next_record().await? {
                return Ok(Some(record));
            }

            if tokio::time::timeout_at(deadline, appended).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn commit(&self, record: &ConsumedRecord) -> Result<(), StreamError> {
        let mut state = self.broker.state.lock().await;
        let next = record.offset + 1;
        let entry = state
            .committed
            .entry((self.group_id.clone(), record.topic.clone(), record.partition))
            .or_insert(0);
        *entry = (*entry).max(next);
        Ok(())
    }

    async fn close(&self) -> Result<(), StreamError> {
        // Same lock order as next_record: broker state, then consumer
        let mut state = self.broker.state.lock().await;
        let mut inner = self.inner.lock().await;
        inner.subscribed = false;
        inner.topics.clear();
        inner.positions.clear();

        if std::mem::take(&mut state.fail_close) {
            return Err(StreamError::Unavailable("memory broker close failure".to_string()));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
