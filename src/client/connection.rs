//! Broker link shared by the producer and the consumer.
//!
//! A link is a connected socket split in two: the read half wrapped in a
//! `FramedRead` that the owner drives, and a writer task that drains an
//! unbounded channel of pre-encoded frames into the write half.

use futures::SinkExt;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, warn};

use crate::config::ClientSettings;
use crate::transport::codec::RecordCodec;
use crate::utils::ClientError;

pub(crate) struct BrokerLink {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: FramedRead<OwnedReadHalf, RecordCodec>,
    pub writer: JoinHandle<()>,
}

pub(crate) async fn connect(settings: &ClientSettings) -> Result<BrokerLink, ClientError> {
    let addr = settings.broker_addr();
    debug!("Connecting to broker at {addr}");

    let stream = timeout(settings.connect_timeout(), TcpStream::connect(&addr))
        .await
        .map_err(|_| ClientError::ConnectTimeout {
            addr: addr.clone(),
            timeout_ms: settings.connect_timeout_ms,
        })?
        .map_err(|source| ClientError::Connect {
            addr: addr.clone(),
            source,
        })?;

    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not set TCP_NODELAY for {addr}: {e}");
    }

    let (read_half, write_half) = stream.into_split();
    let inbound = FramedRead::new(read_half, RecordCodec::new(settings.max_frame_len));
    let mut sink = FramedWrite::new(write_half, RecordCodec::new(settings.max_frame_len));

    let (outbound, mut rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = sink.send(frame).await {
                warn!("Failed to send frame to {addr}: {e}");
                break;
            }
        }
    });

    Ok(BrokerLink {
        outbound,
        inbound,
        writer,
    })
}
