//! Rate-limited bulk dispatch loop.
//!
//! Sequential over recipients on purpose: parallel delivery would trip the
//! platform's rate limits and anti-abuse detection. Each recipient is
//! isolated; a failure is counted and logged, never propagated.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::phone::PhoneNumber;
use crate::transport::{MessageTransport, SendOptions};

use super::jitter::JitterPolicy;

/// Called after every recipient with `(completed, total)`.
pub type ProgressSink = Box<dyn Fn(usize, usize) + Send + Sync>;

/// Aggregate outcome of one dispatch run. Exactly one counter increments
/// per recipient, so the three always sum to the recipient count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub success: usize,
    pub failed: usize,
    pub unreachable: usize,
}

impl DispatchReport {
    pub fn total(&self) -> usize {
        self.success + self.failed + self.unreachable
    }
}

/// Throttled sequential delivery engine.
pub struct DispatchEngine {
    transport: Arc<dyn MessageTransport>,
    jitter: JitterPolicy,
    stop: Arc<AtomicBool>,
}

impl DispatchEngine {
    pub fn new(transport: Arc<dyn MessageTransport>, jitter: JitterPolicy) -> Self {
        Self {
            transport,
            jitter,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for a future "stop broadcast" control path. Nothing sets it
    /// today; when set, the loop stops before the next recipient and the
    /// remaining recipients are left uncounted.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Deliver every payload to every recipient, in order, with jittered
    /// gaps. The recipient and payload lists are immutable snapshots taken
    /// by the caller; nothing here touches live session state.
    pub async fn dispatch_bulk(
        &self,
        recipients: &[PhoneNumber],
        payloads: &[String],
        progress: Option<ProgressSink>,
    ) -> DispatchReport {
        let total = recipients.len();
        let mut report = DispatchReport::default();

        tracing::info!(
            recipients = total,
            payloads = payloads.len(),
            "Bulk dispatch started"
        );

        for (index, recipient) in recipients.iter().enumerate() {
            if self.stop.load(Ordering::Relaxed) {
                tracing::warn!(
                    completed = index,
                    remaining = total - index,
                    "Bulk dispatch stopped"
                );
                break;
            }

            if index > 0 {
                tokio::time::sleep(self.jitter.recipient_gap.sample()).await;
            }

            // Optional reachability check: fail open on an inconclusive or
            // errored check, skip only on a definitive "not reachable".
            let reachable = match self.transport.check_exists(recipient.as_str()).await {
                Some(Ok(exists)) => exists,
                Some(Err(e)) => {
                    tracing::warn!(
                        recipient = %recipient,
                        error = %e,
                        "Existence check failed, assuming reachable"
                    );
                    true
                }
                None => true,
            };

            if !reachable {
                report.unreachable += 1;
                tracing::info!(recipient = %recipient, "Recipient not reachable, skipped");
                if let Some(ref sink) = progress {
                    sink(index + 1, total);
                }
                continue;
            }

            let mut delivered_all = true;
            for (payload_index, payload) in payloads.iter().enumerate() {
                if payload_index > 0 {
                    tokio::time::sleep(self.jitter.payload_gap.sample()).await;
                }

                if let Err(e) = self
                    .transport
                    .send_message(recipient.as_str(), payload, &SendOptions::default())
                    .await
                {
                    tracing::error!(
                        recipient = %recipient,
                        payload = payload_index,
                        error = %e,
                        "Delivery failed, skipping remaining payloads for this recipient"
                    );
                    delivered_all = false;
                    break;
                }
            }

            if delivered_all {
                report.success += 1;
            } else {
                report.failed += 1;
            }

            if let Some(ref sink) = progress {
                sink(index + 1, total);
            }
        }

        tracing::info!(
            success = report.success,
            failed = report.failed,
            unreachable = report.unreachable,
            "Bulk dispatch finished"
        );
        report
    }
}

// ── Tests ───────────────────────────────────────────────────────────
