//! Delivery pipeline for outbound notifications.
//!
//! The pipeline owns one logical gateway connection and an unbounded FIFO
//! queue. While connected, a periodic timer drains up to
//! [`FLUSH_BATCH_LIMIT`] notifications per tick and writes their frames in
//! order. Any transport error tears the connection down; the pipeline then
//! reconnects forever with a capped, doubling backoff. The queue survives
//! reconnects, but notifications already drained for the failing batch are
//! lost: delivery is at-most-once by contract.
//!
//! Bytes the gateway sends back (asynchronous error frames) are hex-logged
//! at debug level and otherwise ignored.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::MissedTickBehavior;
use xaps_types::Notification;

use crate::config::DeliveryConfig;
use crate::transport::{GatewayConnector, GatewayStream};

/// Maximum notifications written per flush tick.
pub const FLUSH_BATCH_LIMIT: usize = 25;

/// Lifecycle of the outbound connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection; a reconnect is pending.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Connected; the flush timer is running.
    Connected,
}

/// Operational counters for the pipeline.
///
/// Monotonically increasing, reset only on restart.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// Notifications accepted into the queue.
    pub queued: AtomicU64,
    /// Frames written to the gateway.
    pub sent: AtomicU64,
    /// Notifications dropped (encode failure or mid-batch loss).
    pub dropped: AtomicU64,
    /// Successful connections to the gateway.
    pub connects: AtomicU64,
}

/// The delivery pipeline: queue, connection state machine and flush loop.
#[derive(Debug, Default)]
pub struct DeliveryPipeline {
    queue: Mutex<VecDeque<Notification>>,
    state: Mutex<ConnectionState>,
    metrics: PipelineMetrics,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Disconnected
    }
}

/// Lock a mutex, recovering from poisoning (state stays usable).
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl DeliveryPipeline {
    /// Create an empty, disconnected pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a notification to the queue.
    ///
    /// Never blocks and never fails; the queue is unbounded. That is a
    /// known production risk: a gateway outage long enough to matter grows
    /// the queue without limit.
    pub fn enqueue(&self, notification: Notification) {
        let len = {
            let mut queue = lock(&self.queue);
            queue.push_back(notification);
            queue.len()
        };
        self.metrics.queued.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Queued notification ({} outstanding)", len);
    }

    /// Number of notifications waiting for delivery.
    pub fn queue_len(&self) -> usize {
        lock(&self.queue).len()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    /// Operational counters.
    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    fn set_state(&self, state: ConnectionState) {
        *lock(&self.state) = state;
    }

    /// Drive the connection forever: connect, pump, reconnect on failure.
    ///
    /// There is no terminal failure state; the backoff delay doubles on
    /// repeated failures up to the configured ceiling and resets once a
    /// connection is established.
    pub async fn run(
        self: std::sync::Arc<Self>,
        connector: std::sync::Arc<dyn GatewayConnector>,
        config: DeliveryConfig,
    ) {
        let flush_interval = Duration::from_millis(config.flush_interval_ms.max(1));
        let mut backoff = Backoff::new(
            Duration::from_millis(config.reconnect_initial_ms.max(1)),
            Duration::from_millis(config.reconnect_max_ms.max(config.reconnect_initial_ms).max(1)),
        );

        loop {
            self.set_state(ConnectionState::Connecting);
            tracing::info!("Connecting to gateway at {}", connector.endpoint());

            match connector.connect().await {
                Ok(stream) => {
                    backoff.reset();
                    self.metrics.connects.fetch_add(1, Ordering::Relaxed);
                    self.set_state(ConnectionState::Connected);
                    tracing::info!(
                        "Connected to gateway at {} ({} queued)",
                        connector.endpoint(),
                        self.queue_len()
                    );

                    if let Err(e) = self.pump(stream, flush_interval).await {
                        tracing::warn!("Gateway connection lost: {}", e);
                    }
                    self.set_state(ConnectionState::Disconnected);
                }
                Err(e) => {
                    self.set_state(ConnectionState::Disconnected);
                    tracing::warn!("Gateway connection failed: {}", e);
                }
            }

            let delay = backoff.advance();
            tracing::info!("Reconnecting in {:?}", delay);
            tokio::time::sleep(delay).await;
        }
    }

    /// Run one connection until it fails: flush on every tick, drain and
    /// log whatever the gateway sends back.
    async fn pump(
        &self,
        stream: Box<dyn GatewayStream>,
        flush_interval: Duration,
    ) -> std::io::Result<()> {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let mut ticker = tokio::time::interval(flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut inbound = [0u8; 512];

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.flush_batch(&mut writer).await?;
                }
                read = reader.read(&mut inbound) => match read {
                    Ok(0) => {
                        return Err(std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            "gateway closed the connection",
                        ));
                    }
                    // Error-response frames are observed, never decoded.
                    Ok(n) => {
                        tracing::debug!("Gateway sent {} bytes: {}", n, hex::encode(&inbound[..n]));
                    }
                    Err(e) => return Err(e),
                },
            }
        }
    }

    /// Write up to [`FLUSH_BATCH_LIMIT`] queued frames, oldest first.
    ///
    /// Notifications are removed from the queue before writing; on a write
    /// failure the drained remainder is not re-queued (at-most-once), while
    /// everything never drained stays queued for the next connection. A
    /// notification that fails to encode is dropped on its own and does not
    /// affect the rest of the batch.
    pub(crate) async fn flush_batch<W>(&self, writer: &mut W) -> std::io::Result<usize>
    where
        W: AsyncWrite + Unpin,
    {
        let batch: Vec<Notification> = {
            let mut queue = lock(&self.queue);
            let n = queue.len().min(FLUSH_BATCH_LIMIT);
            queue.drain(..n).collect()
        };
        if batch.is_empty() {
            return Ok(0);
        }

        tracing::debug!("Flushing batch of {}", batch.len());
        let mut sent = 0;
        for notification in batch {
            let frame = match notification.encode() {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!(
                        "Dropping notification for token {:?}: {}",
                        notification.device_token,
                        e
                    );
                    self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            };

            writer.write_all(&frame).await?;
            self.metrics.sent.fetch_add(1, Ordering::Relaxed);
            sent += 1;
        }
        writer.flush().await?;
        Ok(sent)
    }
}

/// Doubling reconnect delay with a ceiling.
#[derive(Debug)]
struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            next: initial,
        }
    }

    /// Return the current delay and double the next one, capped at max.
    fn advance(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.next = self.initial;
    }
}
