//! Producer client
//!
//! Publishes records and correlates each one with the broker's ack. Every
//! send gets a fresh correlation token and a single-slot waiter; the reader
//! task completes the waiter when the matching ack arrives. Waits are bounded
//! by `ack_timeout_ms`, and the waiter is removed on every exit path so a late
//! ack can never match anything.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

use crate::broker::message::{MessageId, Properties, Record, RecordKind};
use crate::client::connection::{self, BrokerLink};
use crate::config::ClientSettings;
use crate::transport::codec::{self, RecordCodec};
use crate::utils::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Success,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendResult {
    pub status: SendStatus,
    /// Broker-assigned id; present only on success.
    pub msg_id: Option<MessageId>,
}

impl SendResult {
    fn success(msg_id: Option<MessageId>) -> Self {
        Self {
            status: SendStatus::Success,
            msg_id,
        }
    }

    fn fail() -> Self {
        Self {
            status: SendStatus::Fail,
            msg_id: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == SendStatus::Success
    }
}

#[derive(Debug, Default)]
struct AckWaiters {
    closed: bool,
    pending: HashMap<u64, oneshot::Sender<SendResult>>,
}

type SharedWaiters = Arc<Mutex<AckWaiters>>;

/// A publish that has been queued and is waiting for its ack.
struct PendingAck {
    token: u64,
    topic: String,
    rx: oneshot::Receiver<SendResult>,
}

fn lock(waiters: &Mutex<AckWaiters>) -> MutexGuard<'_, AckWaiters> {
    waiters.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct ProducerInner {
    outbound: mpsc::UnboundedSender<String>,
    waiters: SharedWaiters,
    next_token: AtomicU64,
    ack_timeout: Duration,
    max_frame_len: usize,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Drop for ProducerInner {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// Cheap to clone; all clones share one connection.
#[derive(Debug, Clone)]
pub struct Producer {
    inner: Arc<ProducerInner>,
}

impl Producer {
    pub async fn connect(settings: &ClientSettings) -> Result<Self, ClientError> {
        let BrokerLink {
            outbound,
            inbound,
            writer,
        } = connection::connect(settings).await?;

        let waiters = SharedWaiters::default();
        let reader = tokio::spawn(read_acks(inbound, waiters.clone()));
        info!("Producer connected to {}", settings.broker_addr());

        Ok(Self {
            inner: Arc::new(ProducerInner {
                outbound,
                waiters,
                next_token: AtomicU64::new(1),
                ack_timeout: settings.ack_timeout(),
                max_frame_len: settings.max_frame_len,
                reader,
                writer,
            }),
        })
    }

    /// Publish and wait for the broker's ack, at most `ack_timeout_ms`.
    /// Every failure (transport, oversize frame, timeout) resolves to `Fail`.
    pub async fn send(
        &self,
        topic: impl Into<String>,
        body: impl Into<Vec<u8>>,
        properties: Properties,
    ) -> SendResult {
        match self.enqueue(topic.into(), body.into(), properties) {
            Some(pending) => self.await_ack(pending).await,
            None => SendResult::fail(),
        }
    }

    /// Publish without waiting. The frame is queued before this returns, so
    /// consecutive calls reach the broker in call order. `callback` runs
    /// exactly once, from a spawned task, with the same result `send` would
    /// have returned.
    pub fn send_async<F>(
        &self,
        topic: impl Into<String>,
        body: impl Into<Vec<u8>>,
        properties: Properties,
        callback: F,
    ) where
        F: FnOnce(SendResult) + Send + 'static,
    {
        let pending = self.enqueue(topic.into(), body.into(), properties);
        let producer = self.clone();
        tokio::spawn(async move {
            let result = match pending {
                Some(pending) => producer.await_ack(pending).await,
                None => SendResult::fail(),
            };
            callback(result);
        });
    }

    /// Close the connection. Sends still waiting, on this handle or any
    /// clone, resolve to `Fail` and later sends fail immediately.
    pub fn stop(self) {
        self.inner.reader.abort();
        self.inner.writer.abort();
        fail_all(&self.inner.waiters);
        info!("Producer stopped");
    }

    /// Encode the publish, register its waiter and queue the frame.
    fn enqueue(&self, topic: String, body: Vec<u8>, properties: Properties) -> Option<PendingAck> {
        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        let record = Record::publish(topic, body, properties).with_correlation(Some(token));

        let frame = match codec::encode_bounded(&record, self.inner.max_frame_len) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Refusing to publish to {}: {e}", record.topic);
                return None;
            }
        };

        let (tx, rx) = oneshot::channel();
        {
            let mut waiters = lock(&self.inner.waiters);
            if waiters.closed {
                return None;
            }
            waiters.pending.insert(token, tx);
        }

        if self.inner.outbound.send(frame).is_err() {
            self.forget(token);
            return None;
        }

        Some(PendingAck {
            token,
            topic: record.topic,
            rx,
        })
    }

    async fn await_ack(&self, pending: PendingAck) -> SendResult {
        match timeout(self.inner.ack_timeout, pending.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => SendResult::fail(),
            Err(_) => {
                self.forget(pending.token);
                warn!(
                    "No ack for publish to {} within {}ms",
                    pending.topic,
                    self.inner.ack_timeout.as_millis()
                );
                SendResult::fail()
            }
        }
    }

    /// True until the broker connection is observed closed.
    pub fn is_connected(&self) -> bool {
        !lock(&self.inner.waiters).closed && !self.inner.outbound.is_closed()
    }

    /// Number of sends currently waiting for an ack.
    pub fn in_flight(&self) -> usize {
        lock(&self.inner.waiters).pending.len()
    }

    fn forget(&self, token: u64) {
        lock(&self.inner.waiters).pending.remove(&token);
    }
}

async fn read_acks(mut inbound: FramedRead<OwnedReadHalf, RecordCodec>, waiters: SharedWaiters) {
    while let Some(frame) = inbound.next().await {
        match frame {
            Ok(record) if record.kind == RecordKind::Ack => {
                let Some(token) = record.correlation_id else {
                    debug!("Ignoring ack without correlation id");
                    continue;
                };
                match lock(&waiters).pending.remove(&token) {
                    Some(waiter) => {
                        let _ = waiter.send(SendResult::success(record.msg_id));
                    }
                    None => debug!("Late ack for correlation {token}"),
                }
            }
            Ok(record) => debug!("Producer ignoring {:?} record", record.kind),
            Err(e) => {
                warn!("Producer connection error: {e}");
                break;
            }
        }
    }

    fail_all(&waiters);
    info!("Producer connection closed");
}

/// Connection gone: fail everything still waiting and refuse new sends.
fn fail_all(waiters: &Mutex<AckWaiters>) {
    let mut waiters = lock(waiters);
    waiters.closed = true;
    for (_, waiter) in waiters.pending.drain() {
        let _ = waiter.send(SendResult::fail());
    }
}
