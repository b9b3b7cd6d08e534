//! Consumer client
//!
//! Connects, performs the subscribe handshake, then acks every pushed record
//! before handing it to the listener. Acking first means a listener that
//! fails midway still counts as delivered from the broker's point of view.

use futures::StreamExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

use crate::broker::message::{Record, RecordKind, Subscription};
use crate::client::connection::{self, BrokerLink};
use crate::config::ClientSettings;
use crate::transport::codec::{self, RecordCodec};
use crate::utils::ClientError;

/// Receives every record pushed to a consumer.
pub trait MessageListener: Send + Sync + 'static {
    fn on_message(&self, record: Record);
}

impl<F> MessageListener for F
where
    F: Fn(Record) + Send + Sync + 'static,
{
    fn on_message(&self, record: Record) {
        self(record)
    }
}

#[derive(Debug)]
pub struct Consumer {
    subscription: Subscription,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Consumer {
    /// Subscribe to `topic` with a `"k=v"` filter expression (`""` matches
    /// everything). Returns once the broker has acknowledged the handshake.
    pub async fn subscribe<L: MessageListener>(
        settings: &ClientSettings,
        topic: &str,
        filter: &str,
        listener: L,
    ) -> Result<Self, ClientError> {
        let subscription = Subscription::parse(topic, filter)?;
        let BrokerLink {
            outbound,
            mut inbound,
            writer,
        } = connection::connect(settings).await?;

        let frame = codec::encode_bounded(&Record::subscribe(&subscription), settings.max_frame_len)?;
        outbound.send(frame).map_err(|_| ClientError::Closed)?;

        let handshake = match timeout(settings.ack_timeout(), inbound.next()).await {
            Ok(handshake) => handshake,
            Err(_) => {
                writer.abort();
                return Err(ClientError::HandshakeTimeout {
                    timeout_ms: settings.ack_timeout_ms,
                });
            }
        };
        match handshake {
            Some(Ok(record)) if record.kind == RecordKind::Ack && record.msg_id.is_none() => {}
            Some(Ok(record)) => {
                writer.abort();
                return Err(ClientError::Handshake(format!(
                    "expected handshake ack, got {:?}",
                    record.kind
                )));
            }
            Some(Err(e)) => {
                writer.abort();
                return Err(e.into());
            }
            None => {
                writer.abort();
                return Err(ClientError::Closed);
            }
        }

        info!(
            "Subscribed to {} with filter {:?}",
            subscription.topic, subscription.filter
        );
        let reader = tokio::spawn(consume(inbound, outbound, listener));

        Ok(Self {
            subscription,
            reader,
            writer,
        })
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// True while the push loop is still running.
    pub fn is_active(&self) -> bool {
        !self.reader.is_finished()
    }

    /// Close the connection. Messages pushed but not yet acked are settled
    /// by the broker's disconnect policy.
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

async fn consume<L: MessageListener>(
    mut inbound: FramedRead<OwnedReadHalf, RecordCodec>,
    outbound: mpsc::UnboundedSender<String>,
    listener: L,
) {
    while let Some(frame) = inbound.next().await {
        let record = match frame {
            Ok(record) => record,
            Err(e) => {
                warn!("Consumer connection error: {e}");
                break;
            }
        };

        if record.kind != RecordKind::Publish {
            debug!("Consumer ignoring {:?} record", record.kind);
            continue;
        }

        match record.msg_id {
            Some(msg_id) => {
                let ack = match codec::encode(&Record::ack(Some(msg_id))) {
                    Ok(ack) => ack,
                    Err(e) => {
                        warn!("Failed to encode ack for {msg_id}: {e}");
                        break;
                    }
                };
                if outbound.send(ack).is_err() {
                    warn!("Connection closed before ack for {msg_id}");
                    break;
                }
                debug!("Acked {msg_id}");
            }
            None => warn!("Pushed record without msgId on {}", record.topic),
        }

        listener.on_message(record);
    }
    info!("Consumer connection closed");
}
