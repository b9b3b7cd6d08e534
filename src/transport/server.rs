//! TCP transport
//!
//! Accepts broker connections and turns each inbound frame into a broker
//! operation. Responsibilities:
//! - Register every accepted connection with the `Broker` before reading
//! - Spawn a writer task per connection that drains its outbound channel
//! - Decode frames and hand each record to the broker under its lock
//! - Close the connection on the first codec, protocol or persistence error
//!   and run the broker's disconnect cleanup exactly once

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, warn};

use crate::broker::{Broker, ConnectionId};
use crate::config::Settings;
use crate::transport::codec::RecordCodec;

/// Limits applied to every accepted connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionLimits {
    pub max_connections: usize,
    pub max_frame_len: usize,
}

impl From<&Settings> for ConnectionLimits {
    fn from(settings: &Settings) -> Self {
        Self {
            max_connections: settings.broker.max_connections,
            max_frame_len: settings.broker.max_frame_len,
        }
    }
}

pub(crate) fn lock(broker: &Mutex<Broker>) -> MutexGuard<'_, Broker> {
    broker.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Bind to the configured address and serve until the listener fails.
pub async fn start_server(broker: Arc<Mutex<Broker>>, settings: Settings) -> io::Result<()> {
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr).await?;
    serve(listener, broker, ConnectionLimits::from(&settings)).await
}

/// Accept connections from an already bound listener.
pub async fn serve(
    listener: TcpListener,
    broker: Arc<Mutex<Broker>>,
    limits: ConnectionLimits,
) -> io::Result<()> {
    info!("Broker listening on {}", listener.local_addr()?);
    let active = Arc::new(AtomicUsize::new(0));

    loop {
        let (stream, peer) = listener.accept().await?;

        // counted here rather than at registration so a burst of accepts
        // cannot overshoot the limit
        if active.load(Ordering::SeqCst) >= limits.max_connections {
            warn!("Refusing {peer}: connection limit of {} reached", limits.max_connections);
            drop(stream);
            continue;
        }
        let slot = ConnectionSlot::claim(&active);

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY for {peer}: {e}");
        }

        let broker = broker.clone();
        tokio::spawn(async move {
            handle_connection(stream, broker, limits.max_frame_len).await;
            drop(slot);
        });
    }
}

/// One unit of the live connection count, returned when dropped.
struct ConnectionSlot(Arc<AtomicUsize>);

impl ConnectionSlot {
    fn claim(active: &Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self(active.clone())
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn handle_connection(stream: TcpStream, broker: Arc<Mutex<Broker>>, max_frame_len: usize) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown peer".to_string());
    let (read_half, write_half) = stream.into_split();
    let mut frames = FramedRead::new(read_half, RecordCodec::new(max_frame_len));
    let mut sink = FramedWrite::new(write_half, RecordCodec::new(max_frame_len));

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let conn_id = ConnectionId::new();
    lock(&broker).register_connection(conn_id, tx);
    info!("{conn_id} connected from {peer}");

    // broker → client; ends once the registry drops the sender, or on the
    // first failed write
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = sink.send(frame).await {
                warn!("Failed to send frame to {conn_id}: {e}");
                break;
            }
        }
    });

    let mut writer_done = false;
    loop {
        let frame = tokio::select! {
            frame = frames.next() => frame,
            // the sender is still registered, so the writer only stops early
            // when the peer can no longer be written to
            res = &mut writer => {
                writer_done = true;
                if let Err(e) = res {
                    debug!("Writer task for {conn_id} ended abnormally: {e}");
                }
                warn!("Closing {conn_id}: outbound side failed");
                break;
            }
        };

        let record = match frame {
            Some(Ok(record)) => record,
            Some(Err(e)) => {
                warn!("Closing {conn_id}: {e}");
                break;
            }
            None => break,
        };

        let result = lock(&broker).handle_record(&conn_id, record);
        if let Err(e) = result {
            error!("Closing {conn_id}: {e}");
            break;
        }
    }

    lock(&broker).cleanup_connection(&conn_id);
    drop(frames);
    if !writer_done {
        if let Err(e) = writer.await {
            debug!("Writer task for {conn_id} ended abnormally: {e}");
        }
    }
    info!("{conn_id} disconnected");
}
