//! Broadcast engine: fan one record out to every other connection.

use std::sync::Arc;

use darkcomm_shared::{ChatMessage, CodecError, encode_record};
use futures_util::future::join_all;

use crate::registry::{ConnectionId, ConnectionRegistry};

/// Outcome of one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Recipients the record was written to
    pub delivered: usize,
    /// Recipients whose write failed; they are no longer registered
    pub dropped: Vec<ConnectionId>,
}

/// Delivers records to every registered connection except their origin.
///
/// Delivery is best effort and at most once: a failed write is not retried,
/// the recipient is removed and closed, and the remaining fan-out goes on.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Broadcast `record` to every connection except `origin`.
    ///
    /// The record is encoded once. Writes to different recipients run
    /// concurrently; the call returns after every write has finished.
    pub async fn broadcast(
        &self,
        record: &ChatMessage,
        origin: ConnectionId,
    ) -> Result<BroadcastReport, CodecError> {
        let payload = encode_record(record)?;
        let recipients = self.registry.snapshot_except(origin).await;

        let results = join_all(recipients.iter().map(|peer| {
            let payload = &payload;
            async move { (peer, peer.send(payload).await) }
        }))
        .await;

        let mut report = BroadcastReport::default();
        for (peer, result) in results {
            let Err(e) = result else {
                report.delivered += 1;
                continue;
            };

            match self.registry.remove(peer.id()).await {
                Some(removed) => {
                    tracing::warn!(
                        "Failed to deliver to {} ({}), dropping connection {}: {}",
                        removed.username.as_deref().unwrap_or("Unknown"),
                        peer.addr(),
                        peer.id(),
                        e
                    );
                }
                None => {
                    // Removed concurrently by its own receive loop
                    tracing::debug!(
                        "Write to already removed connection {} failed: {}",
                        peer.id(),
                        e
                    );
                }
            }
            peer.close().await;
            report.dropped.push(peer.id());
        }

        tracing::debug!(
            "Broadcast from {} delivered to {} peer(s), dropped {}",
            origin,
            report.delivered,
            report.dropped.len()
        );
        Ok(report)
    }
}
