use super::types::RecordedEvent;
use anyhow::Result;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

enum Message {
    Event(Box<RecordedEvent>),
    Flush(oneshot::Sender<()>),
}

/// Handle to a background task appending events to a JSONL file.
///
/// Clones share the same writer; the task exits once every clone is dropped.
#[derive(Clone)]
pub struct RecordingLogger {
    sender: mpsc::UnboundedSender<Message>,
}

impl RecordingLogger {
    /// Must be called from within a tokio runtime.
    pub fn new(log_file_path: PathBuf) -> Result<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            if let Err(e) = Self::writer_task(log_file_path, receiver).await {
                error!("Recording logger failed: {}", e);
            }
        });

        Ok(Self { sender })
    }

    pub fn record(&self, event: RecordedEvent) {
        if self.sender.send(Message::Event(Box::new(event))).is_err() {
            error!("Failed to send event to recording logger: receiver dropped");
        }
    }

    /// Wait until every event recorded before this call is on disk.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.sender.send(Message::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }

    async fn writer_task(
        log_file_path: PathBuf,
        mut receiver: mpsc::UnboundedReceiver<Message>,
    ) -> Result<()> {
        if let Some(parent) = log_file_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file_path)
            .await?;

        info!("Recording function traffic to: {}", log_file_path.display());

        while let Some(message) = receiver.recv().await {
            let event = match message {
                Message::Event(event) => event,
                Message::Flush(ack) => {
                    let _ = ack.send(());
                    continue;
                }
            };
            let mut line = match serde_json::to_string(&event) {
                Ok(line) => line,
                Err(e) => {
                    error!("Failed to serialize event: {}", e);
                    continue;
                }
            };
            line.push('\n');

            if let Err(e) = file.write_all(line.as_bytes()).await {
                error!("Failed to write event to recording: {}", e);
                continue;
            }
            if let Err(e) = file.flush().await {
                error!("Failed to flush recording file: {}", e);
            }
        }

        info!("Recording writer task shutting down");

        Ok(())
    }
}
