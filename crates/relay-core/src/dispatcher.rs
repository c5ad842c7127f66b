//! Central dispatcher loop.
//!
//! One instance per process. It drains the broadcast queue and writes
//! each message to every connection in a registry snapshot:
//! - writes for one message run concurrently, each bounded by the write
//!   timeout;
//! - all writes for message N finish (or fail) before message N+1 is taken;
//! - a failed write closes and deregisters that connection only.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::connection::ConnectionHandle;
use crate::error::RelayError;
use crate::message::Message;
use crate::queue::Consumer;
use crate::registry::Registry;

pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of delivering one message.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

pub struct Dispatcher {
    consumer: Consumer,
    registry: Arc<Registry>,
    write_timeout: Duration,
}

impl Dispatcher {
    pub fn new(consumer: Consumer, registry: Arc<Registry>) -> Self {
        Dispatcher {
            consumer,
            registry,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    /// Run until every publisher has been dropped.
    pub async fn run(mut self) {
        while let Some(msg) = self.consumer.consume().await {
            let report = self.dispatch(&msg).await;
            debug!(
                bytes = msg.len(),
                delivered = report.delivered,
                failed = report.failed,
                "broadcast complete"
            );
        }

        info!("Dispatcher shutting down (broadcast queue closed)");
    }

    /// Deliver one message to the current registry snapshot.
    pub async fn dispatch(&self, msg: &Message) -> DispatchReport {
        let targets = self.registry.snapshot();
        let results = join_all(targets.iter().map(|conn| self.write_one(conn, msg.clone()))).await;

        let mut report = DispatchReport::default();
        for ok in results {
            if ok {
                report.delivered += 1;
            } else {
                report.failed += 1;
            }
        }
        report
    }

    async fn write_one(&self, conn: &ConnectionHandle, msg: Message) -> bool {
        let result = match tokio::time::timeout(self.write_timeout, conn.send(msg)).await {
            Ok(res) => res,
            Err(_) => Err(RelayError::Timeout(self.write_timeout)),
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(conn = %conn.id(), error = %e, "write failed, dropping connection");
                self.registry.remove(conn.id());
                conn.close().await;
                false
            }
        }
    }
}
