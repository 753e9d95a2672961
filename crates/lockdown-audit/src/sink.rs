use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::AuditError;
use crate::event::AuditEvent;

/// How many events the channel between DNS tasks and the writer can hold
/// before a producer starts dropping its own events.
pub const CHANNEL_CAPACITY: usize = 100_000;

const BATCH_LIMIT: usize = 4_096;
const BATCH_TIMEOUT: Duration = Duration::from_millis(50);

/// The producer-facing handle. Cloning shares the same underlying channel,
/// so every DNS task can hold its own handle without coordination.
#[derive(Clone)]
pub struct AuditSink {
    tx: mpsc::Sender<AuditEvent>,
}

impl AuditSink {
    /// Opens `path` in append mode and spawns the writer task.
    ///
    /// The returned [`JoinHandle`] completes once every [`AuditSink`] clone
    /// has been dropped and the writer has flushed whatever was left in the
    /// channel.
    pub async fn spawn(path: impl AsRef<Path>) -> Result<(Self, JoinHandle<()>), AuditError> {
        Self::spawn_with_capacity(path, CHANNEL_CAPACITY).await
    }

    pub async fn spawn_with_capacity(
        path: impl AsRef<Path>,
        capacity: usize,
    ) -> Result<(Self, JoinHandle<()>), AuditError> {
        let path = path.as_ref();

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|source| AuditError::OpenFailed {
                path: path.display().to_string(),
                source,
            })?;

        let (tx, rx) = mpsc::channel(capacity);
        let handle = tokio::spawn(run(rx, file));

        Ok((Self { tx }, handle))
    }

    /// Enqueues an audit event. Never blocks: if the channel is full, the
    /// event is silently dropped rather than stalling the caller's DNS task.
    pub fn log(&self, client_ip: impl Into<String>, domain: impl Into<String>, allowed: bool) {
        let event = AuditEvent::new(now_nanos(), client_ip, domain, allowed);

        let _ = self.tx.try_send(event);
    }
}

fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

async fn run(mut rx: mpsc::Receiver<AuditEvent>, mut file: tokio::fs::File) {
    loop {
        let mut batch = Vec::with_capacity(BATCH_LIMIT);

        match rx.recv().await {
            Some(event) => batch.push(event),
            None => return,
        }

        let mut closed = false;
        let sleep = tokio::time::sleep(BATCH_TIMEOUT);
        tokio::pin!(sleep);

        while batch.len() < BATCH_LIMIT {
            tokio::select! {
                biased;
                maybe = rx.recv() => {
                    match maybe {
                        Some(event) => batch.push(event),
                        None => {
                            closed = true;
                            break;
                        }
                    }
                }
                _ = &mut sleep => break,
            }
        }

        if let Err(e) = write_batch(&mut file, &batch).await {
            tracing::error!(error = %e, batch_len = batch.len(), "failed to write audit batch");
        }

        if closed {
            return;
        }
    }
}

async fn write_batch(file: &mut tokio::fs::File, batch: &[AuditEvent]) -> std::io::Result<()> {
    let mut buf = String::new();
    for event in batch {
        buf.push_str(&event.to_line());
    }

    file.write_all(buf.as_bytes()).await
}
