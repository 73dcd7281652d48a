use std::fmt;
use std::sync::Arc;

use tickd_domain::ElectionStore;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

/// Direct handle for appending lines to the job's log buffer, used by the
/// runner itself for failure notes.
pub struct JobLogHandle {
    tx: mpsc::UnboundedSender<String>,
}

impl JobLogHandle {
    pub fn append(&self, line: impl Into<String>) {
        // The forwarder only goes away once all senders are dropped.
        let _ = self.tx.send(line.into());
    }
}

/// Tracing layer that turns every event emitted during a worker invocation
/// into one buffered log line.
pub struct CaptureLayer {
    tx: mpsc::UnboundedSender<String>,
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut message = String::new();
        event.record(&mut MessageVisitor {
            message: &mut message,
        });
        if message.is_empty() {
            return;
        }
        let meta = event.metadata();
        let _ = self.tx.send(format!("{} {}: {message}", meta.level(), meta.target()));
    }
}

struct MessageVisitor<'a> {
    message: &'a mut String,
}

impl Visit for MessageVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            use fmt::Write;
            let _ = write!(self.message, "{value:?}");
        }
    }
}

/// Wire up the per-job log pipeline: a handle and a capture layer feeding
/// one channel, and a forwarder task appending each line to the shared
/// store under `key` as it arrives, so the buffer is visible from other
/// processes while the run is still going.
pub fn attach(
    store: Arc<dyn ElectionStore>,
    key: String,
) -> (JobLogHandle, CaptureLayer, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let forwarder = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            if let Err(e) = store.append(&key, &line).await {
                tracing::warn!(%key, error = %e, "failed to append job log line");
            }
        }
    });

    (JobLogHandle { tx: tx.clone() }, CaptureLayer { tx }, forwarder)
}
