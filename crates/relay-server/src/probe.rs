//! Health probe.
//!
//! Publishes a `network_info` status message whenever the registry's
//! membership changes (and optionally on a fixed interval). The message
//! carries the reachability of an external URL and the current number
//! of connections. An unreachable URL is reported as `disconnected`;
//! it is never an error.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use relay_core::{Publisher, RelayError, Registry};
use relay_protocol::{encode_status, NetworkInfo, NetworkStatus, ProtocolError, StatusMessage};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Why a status report was not published.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to encode status message: {0}")]
    Encode(#[from] ProtocolError),

    #[error("failed to publish status message: {0}")]
    Publish(#[from] RelayError),
}

#[async_trait]
pub trait Reachability: Send + Sync {
    async fn check(&self) -> NetworkStatus;
}

/// Reachable if a GET on `url` gets any HTTP response in time.
pub struct HttpReachability {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpReachability {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        HttpReachability {
            client: reqwest::Client::new(),
            url: url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Reachability for HttpReachability {
    async fn check(&self) -> NetworkStatus {
        match self.client.get(&self.url).timeout(self.timeout).send().await {
            Ok(resp) => {
                debug!(url = %self.url, status = %resp.status(), "probe target reachable");
                NetworkStatus::Connected
            }
            Err(e) => {
                debug!(url = %self.url, error = %e, "probe target unreachable");
                NetworkStatus::Disconnected
            }
        }
    }
}

pub struct HealthProbe<R> {
    reachability: R,
    registry: Arc<Registry>,
    publisher: Publisher,
    members: watch::Receiver<usize>,
    interval: Option<Duration>,
}

impl<R: Reachability> HealthProbe<R> {
    pub fn new(reachability: R, registry: Arc<Registry>, publisher: Publisher) -> Self {
        // Subscribe now so changes made before `run` starts are not missed.
        let members = registry.subscribe();
        HealthProbe {
            reachability,
            registry,
            publisher,
            members,
            interval: None,
        }
    }

    pub fn with_interval(mut self, interval: Option<Duration>) -> Self {
        self.interval = interval;
        self
    }

    /// Check reachability and publish one status report.
    pub async fn report_once(&self) -> Result<NetworkInfo, ProbeError> {
        let network_status = self.reachability.check().await;
        // Read after the check so the count is as fresh as possible.
        let info = NetworkInfo {
            network_status,
            connections: self.registry.len(),
        };

        let msg = encode_status(&StatusMessage::NetworkInfo(info.clone()))?;
        self.publisher.publish(msg).await?;
        Ok(info)
    }

    /// Report on every membership change (and every interval tick, if
    /// set) until the broadcast queue closes. Changes that happen while a
    /// check is in flight collapse into a single follow-up report.
    pub async fn run(mut self) {
        let mut ticker = self.interval.map(|period| {
            let mut t = tokio::time::interval(period);
            t.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            t
        });

        loop {
            tokio::select! {
                changed = self.members.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.members.borrow_and_update();
                }
                _ = tick(&mut ticker) => {}
            }

            match self.report_once().await {
                Ok(info) => debug!(
                    status = ?info.network_status,
                    connections = info.connections,
                    "network info published"
                ),
                Err(ProbeError::Publish(RelayError::QueueClosed)) => break,
                Err(e) => warn!(error = %e, "network info not reported"),
            }
        }

        info!("Health probe stopped");
    }
}

async fn tick(ticker: &mut Option<tokio::time::Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use relay_core::{BroadcastQueue, Connection, FrameSink, Message};
    use relay_protocol::decode_status;

    use super::*;

    struct Fixed(NetworkStatus);

    #[async_trait]
    impl Reachability for Fixed {
        async fn check(&self) -> NetworkStatus {
            self.0
        }
    }

    struct NullSink;

    #[async_trait]
    impl FrameSink for NullSink {
        async fn send(&mut self, _msg: Message) -> Result<(), RelayError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), RelayError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn report_once_publishes_network_info() {
        let registry = Arc::new(Registry::new());
        registry.add(Connection::new(NullSink, None));
        let (publisher, mut consumer) = BroadcastQueue::unbounded();

        let probe = HealthProbe::new(Fixed(NetworkStatus::Connected), Arc::clone(&registry), publisher);
        probe.report_once().await.unwrap();

        let msg = consumer.consume().await.unwrap();
        assert_eq!(
            msg.as_text().unwrap(),
            r#"{"type":"network_info","data":{"networkStatus":"connected","connections":1}}"#
        );
    }

    #[tokio::test]
    async fn unreachable_target_is_data_not_error() {
        let registry = Arc::new(Registry::new());
        let (publisher, mut consumer) = BroadcastQueue::unbounded();

        let probe = HealthProbe::new(
            HttpReachability::new("http://127.0.0.1:1/", Duration::from_millis(500)),
            registry,
            publisher,
        );
        let info = probe.report_once().await.unwrap();
        assert_eq!(info.network_status, NetworkStatus::Disconnected);

        let msg = consumer.consume().await.unwrap();
        let StatusMessage::NetworkInfo(decoded) = decode_status(&msg).unwrap();
        assert_eq!(decoded.network_status, NetworkStatus::Disconnected);
        assert_eq!(decoded.connections, 0);
    }

    #[tokio::test]
    async fn report_after_queue_closed_is_publish_error() {
        let registry = Arc::new(Registry::new());
        let (publisher, consumer) = BroadcastQueue::unbounded();
        drop(consumer);

        let probe = HealthProbe::new(Fixed(NetworkStatus::Connected), registry, publisher);
        let err = probe.report_once().await.unwrap_err();
        assert!(matches!(err, ProbeError::Publish(RelayError::QueueClosed)));
    }

    #[test]
    fn encode_failure_is_not_a_transport_error() {
        let err = ProbeError::from(ProtocolError::NotText);
        assert!(matches!(err, ProbeError::Encode(ProtocolError::NotText)));
        assert!(err.to_string().starts_with("failed to encode status message"));
    }

    #[tokio::test]
    async fn run_stops_when_queue_closes() {
        let registry = Arc::new(Registry::new());
        let (publisher, consumer) = BroadcastQueue::unbounded();
        drop(consumer);
        let probe = HealthProbe::new(Fixed(NetworkStatus::Connected), Arc::clone(&registry), publisher);
        let task = tokio::spawn(probe.run());

        registry.add(Connection::new(NullSink, None));
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("probe kept running after the queue closed")
            .unwrap();
    }

    #[tokio::test]
    async fn run_reports_membership_changes() {
        let registry = Arc::new(Registry::new());
        let (publisher, mut consumer) = BroadcastQueue::unbounded();
        let probe = HealthProbe::new(Fixed(NetworkStatus::Connected), Arc::clone(&registry), publisher);
        let task = tokio::spawn(probe.run());

        let conn = Connection::new(NullSink, None);
        registry.add(Arc::clone(&conn));
        let StatusMessage::NetworkInfo(up) = decode_status(&consumer.consume().await.unwrap()).unwrap();
        assert_eq!(up.connections, 1);

        registry.remove(conn.id());
        let StatusMessage::NetworkInfo(down) = decode_status(&consumer.consume().await.unwrap()).unwrap();
        assert_eq!(down.connections, 0);

        task.abort();
    }
}
