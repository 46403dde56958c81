//! Redis pub/sub backplane adapter.
//!
//! Two connections per process: a `ConnectionManager` for publishing (it
//! re-establishes itself after transient failures) and a dedicated pub/sub
//! connection owned by a background subscriber task. The subscriber task
//! reconnects forever with capped exponential backoff; a process that never
//! reaches Redis keeps serving its own connections in degraded mode.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::{mpsc, RwLock};
use tokio::time;
use tracing::{debug, info, warn};

use surge_core::{Backplane, BackplaneError, BackplaneStatus, EventEnvelope, RoomName};

use crate::backoff::ExponentialBackoff;
use crate::message::{BackplaneMessage, InboundEvent};

/// Capacity of the inbound event queue handed to the caller.
const INBOUND_QUEUE_CAPACITY: usize = 4096;

/// Redis backplane configuration.
#[derive(Debug, Clone)]
pub struct BackplaneConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    /// Logical database index.
    pub db: i64,
    /// The shared pub/sub channel all processes publish to.
    pub channel: String,
    /// Per-request timeout for publishes.
    pub request_timeout: Duration,
    /// Reconnect backoff base delay.
    pub backoff_base: Duration,
    /// Reconnect backoff cap.
    pub backoff_cap: Duration,
}

impl Default for BackplaneConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            db: 0,
            channel: "surge:events".to_string(),
            request_timeout: Duration::from_secs(5),
            backoff_base: Duration::from_millis(100),
            backoff_cap: Duration::from_secs(3),
        }
    }
}

impl BackplaneConfig {
    /// Build the Redis connection URL.
    #[must_use]
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

fn status_from_u8(value: u8) -> BackplaneStatus {
    match value {
        1 => BackplaneStatus::Connecting,
        2 => BackplaneStatus::Ready,
        3 => BackplaneStatus::Reconnecting,
        _ => BackplaneStatus::Disconnected,
    }
}

fn status_to_u8(status: BackplaneStatus) -> u8 {
    match status {
        BackplaneStatus::Disconnected => 0,
        BackplaneStatus::Connecting => 1,
        BackplaneStatus::Ready => 2,
        BackplaneStatus::Reconnecting => 3,
    }
}

/// The Redis-backed [`Backplane`] implementation.
pub struct RedisBackplane {
    /// Unique id of this process on the backplane; used to drop echoes.
    origin: String,
    channel: String,
    request_timeout: Duration,
    publisher: RwLock<Option<ConnectionManager>>,
    status: AtomicU8,
}

impl RedisBackplane {
    /// Connect to Redis and start the subscriber task.
    ///
    /// Never fails: if Redis is unreachable the returned backplane starts in
    /// degraded mode and background tasks keep retrying with backoff. The
    /// returned receiver yields events published by peer processes.
    pub async fn connect(config: BackplaneConfig) -> (Arc<Self>, mpsc::Receiver<InboundEvent>) {
        let origin = format!(
            "surge-{}-{:08x}",
            std::process::id(),
            rand::random::<u32>()
        );

        let backplane = Arc::new(Self {
            origin: origin.clone(),
            channel: config.channel.clone(),
            request_timeout: config.request_timeout,
            publisher: RwLock::new(None),
            status: AtomicU8::new(status_to_u8(BackplaneStatus::Connecting)),
        });

        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_CAPACITY);

        match redis::Client::open(config.url()) {
            Ok(client) => {
                tokio::spawn(publisher_task(
                    backplane.clone(),
                    client.clone(),
                    config.clone(),
                ));
                tokio::spawn(subscriber_task(backplane.clone(), client, config, inbound_tx));
            }
            Err(e) => {
                // Malformed connection parameters; stay in degraded mode.
                warn!(error = %e, "Backplane disabled: invalid Redis connection config");
                backplane.set_status(BackplaneStatus::Disconnected);
            }
        }

        (backplane, inbound_rx)
    }

    /// This process's instance id on the backplane.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    fn set_status(&self, status: BackplaneStatus) {
        self.status.store(status_to_u8(status), Ordering::Relaxed);
    }
}

#[async_trait]
impl Backplane for RedisBackplane {
    async fn publish(&self, room: &RoomName, envelope: &EventEnvelope) -> Result<(), BackplaneError> {
        let message = BackplaneMessage {
            origin: self.origin.clone(),
            room: room.to_string(),
            envelope: envelope.clone(),
        };
        let payload = serde_json::to_string(&message)?;

        let mut conn = {
            let guard = self.publisher.read().await;
            guard.clone().ok_or(BackplaneError::Unavailable)?
        };

        let publish = async {
            let _: i64 = conn
                .publish(&self.channel, payload)
                .await
                .map_err(|e| BackplaneError::Transport(e.to_string()))?;
            Ok::<(), BackplaneError>(())
        };

        time::timeout(self.request_timeout, publish)
            .await
            .map_err(|_| BackplaneError::Timeout)?
    }

    fn status(&self) -> BackplaneStatus {
        status_from_u8(self.status.load(Ordering::Relaxed))
    }
}

/// Establish the publish connection, retrying forever. `ConnectionManager`
/// handles its own reconnection once established.
async fn publisher_task(backplane: Arc<RedisBackplane>, client: redis::Client, config: BackplaneConfig) {
    let mut backoff = ExponentialBackoff::new(config.backoff_base, config.backoff_cap);

    loop {
        match ConnectionManager::new(client.clone()).await {
            Ok(manager) => {
                *backplane.publisher.write().await = Some(manager);
                info!("Backplane publish connection established");
                return;
            }
            Err(e) => {
                let delay = backoff.next_delay();
                warn!(
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "Backplane publish connection failed; running in degraded single-instance mode"
                );
                time::sleep(delay).await;
            }
        }
    }
}

/// Own the pub/sub connection and pump decoded peer events to the caller.
/// Reconnects forever; exits only when the caller drops the receiver.
async fn subscriber_task(
    backplane: Arc<RedisBackplane>,
    client: redis::Client,
    config: BackplaneConfig,
    inbound_tx: mpsc::Sender<InboundEvent>,
) {
    let mut backoff = ExponentialBackoff::new(config.backoff_base, config.backoff_cap);
    let mut first_attempt = true;

    loop {
        if !first_attempt {
            backplane.set_status(BackplaneStatus::Reconnecting);
        }
        first_attempt = false;

        let mut pubsub = match client.get_async_pubsub().await {
            Ok(pubsub) => pubsub,
            Err(e) => {
                let delay = backoff.next_delay();
                warn!(error = %e, retry_in_ms = delay.as_millis() as u64, "Backplane subscribe connection failed");
                time::sleep(delay).await;
                continue;
            }
        };

        if let Err(e) = pubsub.subscribe(&config.channel).await {
            let delay = backoff.next_delay();
            warn!(error = %e, retry_in_ms = delay.as_millis() as u64, "Backplane channel subscribe failed");
            time::sleep(delay).await;
            continue;
        }

        backoff.reset();
        backplane.set_status(BackplaneStatus::Ready);
        info!(channel = %config.channel, "Backplane subscribed");

        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            let payload: String = match msg.get_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(error = %e, "Backplane message with non-text payload");
                    continue;
                }
            };

            let message: BackplaneMessage = match serde_json::from_str(&payload) {
                Ok(message) => message,
                Err(e) => {
                    warn!(error = %e, "Malformed backplane message");
                    continue;
                }
            };

            // Local delivery already ran on the originating process.
            if message.origin == backplane.origin {
                continue;
            }

            let room: RoomName = match message.room.parse() {
                Ok(room) => room,
                Err(e) => {
                    warn!(room = %message.room, error = %e, "Backplane message with invalid room");
                    continue;
                }
            };

            debug!(room = %room, event = %message.envelope.kind, "Backplane event received");

            if inbound_tx
                .send(InboundEvent {
                    room,
                    envelope: message.envelope,
                })
                .await
                .is_err()
            {
                // Receiver dropped: the server is shutting down.
                return;
            }
        }

        warn!("Backplane subscription lost; reconnecting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building() {
        let config = BackplaneConfig::default();
        assert_eq!(config.url(), "redis://127.0.0.1:6379/0");

        let config = BackplaneConfig {
            host: "cache.internal".to_string(),
            port: 6380,
            password: Some("hunter2".to_string()),
            db: 3,
            ..BackplaneConfig::default()
        };
        assert_eq!(config.url(), "redis://:hunter2@cache.internal:6380/3");
    }

    #[test]
    fn test_status_mapping_roundtrip() {
        for status in [
            BackplaneStatus::Disconnected,
            BackplaneStatus::Connecting,
            BackplaneStatus::Ready,
            BackplaneStatus::Reconnecting,
        ] {
            assert_eq!(status_from_u8(status_to_u8(status)), status);
        }
    }

    #[tokio::test]
    async fn test_connect_is_infallible_with_unique_origin() {
        // No Redis needs to be reachable: connect returns immediately and the
        // background tasks keep retrying on their own.
        let (a, _inbound_a) = RedisBackplane::connect(BackplaneConfig::default()).await;
        let (b, _inbound_b) = RedisBackplane::connect(BackplaneConfig::default()).await;

        assert!(a.origin().starts_with("surge-"));
        assert_ne!(a.origin(), b.origin());
    }

    #[test]
    fn test_default_timings() {
        let config = BackplaneConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.backoff_base, Duration::from_millis(100));
        assert_eq!(config.backoff_cap, Duration::from_secs(3));
    }
}
