//! Input device subsystem.
//!
//! Owns the joystick character device and feeds decoded [`RawEvent`]s to the
//! engine in read order. Open/read failures are never fatal: the reader
//! marks the device disconnected and the reconnect poll retries the open.

pub mod decoder;

use crate::device::decoder::{decode_record, RawEvent, RECORD_LEN};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Failed to open device {0}: {1}")]
    OpenError(String, std::io::Error),

    #[error("Failed to read from device: {0}")]
    ReadError(std::io::Error),
}

enum ReadOutcome {
    /// Device went away; reconnect poll takes over.
    Lost,
    /// Cancellation requested or engine gone; stop the task.
    Shutdown,
}

/// Handle for the spawned device reader task.
pub struct DeviceHandle {
    cancel: CancellationToken,
}

impl DeviceHandle {
    /// Spawns the reader task. The task opens the device, forwards decoded
    /// records over `event_sender`, and re-attempts the open every
    /// `reconnect_tick` while the device is unavailable.
    pub fn spawn(
        path: PathBuf,
        reconnect_tick: Duration,
        event_sender: mpsc::Sender<RawEvent>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        tokio::spawn(async move {
            run_device_loop(path, reconnect_tick, event_sender, task_cancel).await;
            info!("Device reader task finished");
        });

        Self { cancel }
    }

    /// Closes the device; cancels any outstanding read.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_device_loop(
    path: PathBuf,
    reconnect_tick: Duration,
    event_sender: mpsc::Sender<RawEvent>,
    cancel: CancellationToken,
) {
    let mut poll = interval(reconnect_tick);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = poll.tick() => {}
        }

        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) => {
                debug!(
                    "{}",
                    DeviceError::OpenError(path.display().to_string(), e)
                );
                continue;
            }
        };

        info!("Device {} ready", path.display());
        match read_records(file, &event_sender, &cancel).await {
            ReadOutcome::Shutdown => return,
            ReadOutcome::Lost => {
                warn!("Device {} disconnected, polling for reconnect", path.display());
                // Skip the tick that elapsed while reading.
                poll.reset();
            }
        }
    }
}

async fn read_records(
    mut file: File,
    event_sender: &mpsc::Sender<RawEvent>,
    cancel: &CancellationToken,
) -> ReadOutcome {
    let mut record = [0u8; RECORD_LEN];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Cancelling outstanding device read");
                return ReadOutcome::Shutdown;
            }
            result = file.read_exact(&mut record) => match result {
                Ok(_) => {
                    let event = decode_record(record);
                    if event_sender.send(event).await.is_err() {
                        error!("Engine event channel closed, stopping device reader");
                        return ReadOutcome::Shutdown;
                    }
                }
                Err(e) => {
                    warn!("{}", DeviceError::ReadError(e));
                    return ReadOutcome::Lost;
                }
            }
        }
    }
}
