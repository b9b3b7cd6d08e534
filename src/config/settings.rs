use std::time::Duration;

use serde::Deserialize;

use crate::transport::codec::DEFAULT_MAX_FRAME_LEN;

/// Top-level configuration settings for the application.
///
/// Includes settings for the broker's listener, the broker itself and the
/// producer/consumer clients.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub broker: BrokerSettings,
    pub client: ClientSettings,
}

/// Address the broker listens on.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// What happens to in-flight messages still pending toward a subscriber
/// when that subscriber disconnects.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DisconnectPolicy {
    /// Stop expecting the departed subscriber's ack; messages that are
    /// otherwise fully acked complete immediately.
    #[default]
    Release,
    /// Leave the counters alone; such messages stay in flight forever.
    Retain,
}

/// Broker limits and durable log location.
#[derive(Debug, Deserialize, Clone)]
pub struct BrokerSettings {
    pub max_connections: usize,
    pub max_frame_len: usize,
    pub log_dir: String,
    pub log_file: String,
    pub disconnect_policy: DisconnectPolicy,
}

/// Where producers and consumers connect and how long they wait.
#[derive(Debug, Deserialize, Clone)]
pub struct ClientSettings {
    pub broker_host: String,
    pub broker_port: u16,
    pub connect_timeout_ms: u64,
    pub ack_timeout_ms: u64,
    pub max_frame_len: usize,
}

impl ClientSettings {
    pub fn broker_addr(&self) -> String {
        format!("{}:{}", self.broker_host, self.broker_port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub client: Option<PartialClientSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialBrokerSettings {
    pub max_connections: Option<usize>,
    pub max_frame_len: Option<usize>,
    pub log_dir: Option<String>,
    pub log_file: Option<String>,
    pub disconnect_policy: Option<DisconnectPolicy>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialClientSettings {
    pub broker_host: Option<String>,
    pub broker_port: Option<u16>,
    pub connect_timeout_ms: Option<u64>,
    pub ack_timeout_ms: Option<u64>,
    pub max_frame_len: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 9999,
            },
            broker: BrokerSettings {
                max_connections: 1000,
                max_frame_len: DEFAULT_MAX_FRAME_LEN,
                log_dir: "store".to_string(),
                log_file: "broker.log".to_string(),
                disconnect_policy: DisconnectPolicy::Release,
            },
            client: ClientSettings::default(),
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 9999,
            connect_timeout_ms: 3000,
            ack_timeout_ms: 3000,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl PartialSettings {
    /// Overlay whatever was provided on top of the defaults.
    pub fn merge(self, default: Settings) -> Settings {
        let server = self.server.unwrap_or_default();
        let broker = self.broker.unwrap_or_default();
        let client = self.client.unwrap_or_default();

        Settings {
            server: ServerSettings {
                host: server.host.unwrap_or(default.server.host),
                port: server.port.unwrap_or(default.server.port),
            },
            broker: BrokerSettings {
                max_connections: broker
                    .max_connections
                    .unwrap_or(default.broker.max_connections),
                max_frame_len: broker.max_frame_len.unwrap_or(default.broker.max_frame_len),
                log_dir: broker.log_dir.unwrap_or(default.broker.log_dir),
                log_file: broker.log_file.unwrap_or(default.broker.log_file),
                disconnect_policy: broker
                    .disconnect_policy
                    .unwrap_or(default.broker.disconnect_policy),
            },
            client: ClientSettings {
                broker_host: client.broker_host.unwrap_or(default.client.broker_host),
                broker_port: client.broker_port.unwrap_or(default.client.broker_port),
                connect_timeout_ms: client
                    .connect_timeout_ms
                    .unwrap_or(default.client.connect_timeout_ms),
                ack_timeout_ms: client
                    .ack_timeout_ms
                    .unwrap_or(default.client.ack_timeout_ms),
                max_frame_len: client.max_frame_len.unwrap_or(default.client.max_frame_len),
            },
        }
    }
}
