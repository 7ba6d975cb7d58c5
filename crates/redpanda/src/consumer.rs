//! Redpanda subscription for reading tag sightings.
//!
//! Uses rskafka for Kafka-compatible message consumption:
//! - One reader task per partition, long-polling with configurable byte
//!   bounds and wait time
//! - Each reader hands its records over in offset order through a shared
//!   bounded channel, so the read loop sees one merged stream
//! - Next offsets are tracked in memory for the life of the subscription
//!
//! rskafka has no group coordinator and no offset commits. The consumer
//! group id identifies the worker pool in logs; the partitions read are
//! every partition of the topic unless configuration narrows them.

use crate::config::{RedpandaConfig, StartOffset};
use crate::subscription::{Subscriber, Subscription};
use async_trait::async_trait;
use ingest_core::{Error, RawMessage, Result};
use rskafka::client::{
    partition::{OffsetAt, PartitionClient, UnknownTopicHandling},
    ClientBuilder, Credentials, SaslConfig,
};
use rskafka::record::RecordAndOffset;
use std::collections::VecDeque;
use std::ops::Range;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace};

/// Creates a TLS configuration for Redpanda Cloud.
fn create_tls_config() -> Arc<rustls::ClientConfig> {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Arc::new(config)
}

/// Builds an rskafka client, adding TLS and SASL when credentials are set.
pub(crate) async fn connect(
    config: &RedpandaConfig,
) -> std::result::Result<rskafka::client::Client, String> {
    let mut builder = ClientBuilder::new(vec![config.broker_string()]);

    if let Some((username, password)) = config.credentials() {
        builder = builder
            .tls_config(create_tls_config())
            .sasl_config(SaslConfig::ScramSha256(Credentials::new(
                username.to_string(),
                password.to_string(),
            )));
    }

    builder.build().await.map_err(|e| e.to_string())
}

fn start_at(start: StartOffset) -> OffsetAt {
    match start {
        StartOffset::Earliest => OffsetAt::Earliest,
        StartOffset::Latest => OffsetAt::Latest,
    }
}

/// Where a partition reader gets its records from.
#[async_trait]
pub(crate) trait RecordSource: Send + Sync + 'static {
    /// Returns records starting at `offset` and the partition high watermark.
    async fn fetch(
        &self,
        offset: i64,
        bytes: Range<i32>,
        max_wait_ms: i32,
    ) -> std::result::Result<(Vec<RecordAndOffset>, i64), String>;
}

#[async_trait]
impl RecordSource for PartitionClient {
    async fn fetch(
        &self,
        offset: i64,
        bytes: Range<i32>,
        max_wait_ms: i32,
    ) -> std::result::Result<(Vec<RecordAndOffset>, i64), String> {
        self.fetch_records(offset, bytes, max_wait_ms)
            .await
            .map_err(|e| e.to_string())
    }
}

/// Opens [`RedpandaSubscription`]s against the configured brokers.
#[derive(Debug, Clone)]
pub struct RedpandaSubscriber {
    config: RedpandaConfig,
}

impl RedpandaSubscriber {
    pub fn new(config: RedpandaConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RedpandaConfig {
        &self.config
    }
}

#[async_trait]
impl Subscriber for RedpandaSubscriber {
    async fn subscribe(&self, topic: &str, group_id: &str) -> Result<Box<dyn Subscription>> {
        let consumer = &self.config.consumer;
        let fail = |msg: String| Error::subscribe(topic, group_id, msg);

        info!(
            topic = %topic,
            group_id = %group_id,
            brokers = %self.config.broker_string(),
            "Subscribing to Redpanda"
        );

        let client = connect(&self.config)
            .await
            .map_err(|e| fail(format!("failed to connect to Redpanda: {e}")))?;

        let topics = client
            .list_topics()
            .await
            .map_err(|e| fail(format!("failed to list topics: {e}")))?;
        let available = topics
            .into_iter()
            .find(|t| t.name == topic)
            .map(|t| t.partitions)
            .ok_or_else(|| fail("topic does not exist".to_string()))?;
        let partitions = consumer
            .select_partitions(&available)
            .map_err(|p| fail(format!("topic has no partition {p}")))?;
        if partitions.is_empty() {
            return Err(fail("topic has no partitions".to_string()));
        }

        let mut readers = Vec::with_capacity(partitions.len());
        for partition in partitions {
            let partition_client = client
                .partition_client(topic.to_string(), partition, UnknownTopicHandling::Error)
                .await
                .map_err(|e| {
                    fail(format!("failed to get client for partition {partition}: {e}"))
                })?;

            let offset = partition_client
                .get_offset(start_at(consumer.start_offset))
                .await
                .map_err(|e| {
                    fail(format!("failed to get start offset of partition {partition}: {e}"))
                })?;

            info!(
                topic = %topic,
                partition = partition,
                offset = offset,
                "Partition reader initialized at offset"
            );

            readers.push(PartitionReader {
                source: partition_client,
                buffer: RecordBuffer::new(partition, offset),
                bytes: consumer.fetch_bytes(),
                max_wait_ms: consumer.max_wait_ms,
            });
        }

        Ok(Box::new(RedpandaSubscription::start(readers, consumer.buffer_capacity)))
    }
}

/// Records fetched but not yet handed to the read loop.
#[derive(Debug)]
pub(crate) struct RecordBuffer {
    partition: i32,
    next_offset: i64,
    pending: VecDeque<RawMessage>,
}

impl RecordBuffer {
    pub(crate) fn new(partition: i32, next_offset: i64) -> Self {
        Self {
            partition,
            next_offset,
            pending: VecDeque::new(),
        }
    }

    pub(crate) fn next_offset(&self) -> i64 {
        self.next_offset
    }

    /// Queues a fetched batch. Records below the tracked offset are dropped;
    /// a fetch may return them when it starts mid compressed batch.
    pub(crate) fn extend(&mut self, mut records: Vec<RecordAndOffset>) {
        records.sort_by_key(|r| r.offset);

        for record in records {
            if record.offset < self.next_offset {
                trace!(offset = record.offset, "Skipping already consumed record");
                continue;
            }
            self.next_offset = record.offset + 1;
            self.pending.push_back(RawMessage::new(
                self.partition,
                record.offset,
                record.record.value.unwrap_or_default(),
            ));
        }
    }

    pub(crate) fn pop(&mut self) -> Option<RawMessage> {
        self.pending.pop_front()
    }
}

/// Fetch loop for a single partition.
pub(crate) struct PartitionReader<S> {
    source: S,
    buffer: RecordBuffer,
    bytes: Range<i32>,
    max_wait_ms: i32,
}

impl<S: RecordSource> PartitionReader<S> {
    #[cfg(test)]
    pub(crate) fn new(source: S, partition: i32, offset: i64, max_wait_ms: i32) -> Self {
        Self {
            source,
            buffer: RecordBuffer::new(partition, offset),
            bytes: 1..1_000_000,
            max_wait_ms,
        }
    }

    fn partition(&self) -> i32 {
        self.buffer.partition
    }

    /// Fetches and forwards records until shut down, the receiver goes
    /// away, or a fetch fails. A fetch failure is forwarded before exiting.
    async fn run(mut self, tx: mpsc::Sender<Result<RawMessage>>, shutdown: CancellationToken) {
        let partition = self.partition();

        loop {
            while let Some(message) = self.buffer.pop() {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    sent = tx.send(Ok(message)) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }

            let offset = self.buffer.next_offset();
            let fetched = tokio::select! {
                _ = shutdown.cancelled() => return,
                result = self.source.fetch(offset, self.bytes.clone(), self.max_wait_ms) => result,
            };

            match fetched {
                Ok((records, high_watermark)) => {
                    debug!(
                        partition = partition,
                        records = records.len(),
                        offset = offset,
                        high_watermark = high_watermark,
                        "Fetched records from Redpanda"
                    );
                    self.buffer.extend(records);
                }
                Err(e) => {
                    error!(partition = partition, offset = offset, error = %e, "Fetch error");
                    let failure = Error::fetch(format!(
                        "failed to fetch partition {partition} at offset {offset}: {e}"
                    ));
                    if tx.send(Err(failure)).await.is_err() {
                        debug!(partition = partition, "Subscription closed before fetch error");
                    }
                    return;
                }
            }
        }
    }
}

/// Subscription over the selected partitions of the sighting topic.
///
/// Messages of one partition arrive in offset order; partitions are
/// interleaved in whatever order their fetches complete.
pub struct RedpandaSubscription {
    partitions: Vec<i32>,
    rx: mpsc::Receiver<Result<RawMessage>>,
    shutdown: CancellationToken,
    readers: TaskTracker,
}

impl RedpandaSubscription {
    pub(crate) fn start<S: RecordSource>(readers: Vec<PartitionReader<S>>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        let partitions = readers.iter().map(|r| r.partition()).collect();

        for reader in readers {
            tracker.spawn(reader.run(tx.clone(), shutdown.clone()));
        }
        tracker.close();

        Self {
            partitions,
            rx,
            shutdown,
            readers: tracker,
        }
    }

    /// Partitions this subscription reads.
    pub fn partitions(&self) -> &[i32] {
        &self.partitions
    }
}

#[async_trait]
impl Subscription for RedpandaSubscription {
    async fn read_next(&mut self, cancel: &CancellationToken) -> Result<RawMessage> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            next = self.rx.recv() => match next {
                Some(result) => result,
                None => Err(Error::fetch("subscription is closed")),
            },
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Ok(());
        }

        self.shutdown.cancel();
        self.rx.close();
        self.readers.wait().await;

        info!(partitions = ?self.partitions, "Redpanda subscription closed");
        Ok(())
    }
}
