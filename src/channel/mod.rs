//! Outbound command channel.
//!
//! A worker task owns a TCP connection to the grbl bridge. The engine talks
//! to it exclusively over channels: [`ChannelRequest`]s go out, raw
//! acknowledgement lines come back. Framing is line-oriented; named commands
//! are serialized as `<name> <port> <args...>`, raw writes (the jog-cancel
//! real-time byte) bypass framing entirely.

use chrono::{DateTime, Local};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// grbl real-time jog-cancel byte.
pub const JOG_CANCEL: &[u8] = &[0x85];

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to connect to {0}: {1}")]
    ConnectError(String, std::io::Error),

    #[error("Failed to write to channel: {0}")]
    WriteError(std::io::Error),
}

/// One outbound request to the machine controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelRequest {
    /// Raw bytes, used for real-time control sequences. Never throttled.
    WriteRaw(Vec<u8>),

    /// Named command with arguments, addressed to a destination port.
    Command { name: String, args: Vec<String> },
}

#[derive(Clone, Debug, Default)]
pub struct ChannelStatus {
    pub lines_sent: usize,
    pub lines_received: usize,
    pub last_activity: Option<DateTime<Local>>,
}

/// Handle for the spawned channel worker.
pub struct ChannelHandle {
    request_sender: mpsc::Sender<ChannelRequest>,
}

impl ChannelHandle {
    /// Spawns the worker. Acknowledgement lines from the bridge are
    /// forwarded verbatim over `ack_sender`.
    pub fn spawn(addr: String, port_id: String, ack_sender: mpsc::Sender<String>) -> Self {
        let (request_sender, request_receiver) = mpsc::channel(100);

        tokio::spawn(async move {
            run_channel_loop(addr, port_id, request_receiver, ack_sender).await;
            info!("Channel worker task finished");
        });

        Self { request_sender }
    }

    pub fn request_sender(&self) -> mpsc::Sender<ChannelRequest> {
        self.request_sender.clone()
    }
}

async fn run_channel_loop(
    addr: String,
    port_id: String,
    mut request_receiver: mpsc::Receiver<ChannelRequest>,
    ack_sender: mpsc::Sender<String>,
) {
    let mut status = ChannelStatus::default();

    loop {
        let stream = match TcpStream::connect(&addr).await {
            Ok(stream) => stream,
            Err(e) => {
                debug!("{}", ChannelError::ConnectError(addr.clone(), e));
                sleep(Duration::from_secs(3)).await;
                continue;
            }
        };

        info!("Command channel connected to {}", addr);
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        loop {
            tokio::select! {
                request = request_receiver.recv() => {
                    let Some(request) = request else {
                        debug!("Engine dropped the request channel, stopping worker");
                        return;
                    };
                    let payload = serialize(&request, &port_id);
                    if let Err(e) = write_half.write_all(&payload).await {
                        warn!("{}", ChannelError::WriteError(e));
                        break;
                    }
                    status.lines_sent += 1;
                    status.last_activity = Some(Local::now());
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        status.lines_received += 1;
                        status.last_activity = Some(Local::now());
                        debug!(
                            "Channel status: {} sent, {} received",
                            status.lines_sent, status.lines_received
                        );
                        if ack_sender.send(line).await.is_err() {
                            debug!("Engine dropped the ack channel, stopping worker");
                            return;
                        }
                    }
                    Ok(None) => {
                        warn!("Command channel closed by peer");
                        break;
                    }
                    Err(e) => {
                        warn!("Command channel read failed: {}", e);
                        break;
                    }
                }
            }
        }

        sleep(Duration::from_secs(3)).await;
    }
}

fn serialize(request: &ChannelRequest, port_id: &str) -> Vec<u8> {
    match request {
        ChannelRequest::WriteRaw(bytes) => bytes.clone(),
        ChannelRequest::Command { name, args } => {
            let mut line = format!("{} {}", name, port_id);
            for arg in args {
                line.push(' ');
                line.push_str(arg);
            }
            line.push('\n');
            line.into_bytes()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_named_command_as_one_line() {
        let request = ChannelRequest::Command {
            name: "gcode".to_string(),
            args: vec!["G91 G0 X0.100 F500.00".to_string()],
        };
        let line = serialize(&request, "/dev/ttyUSB0");
        assert_eq!(
            String::from_utf8(line).unwrap(),
            "gcode /dev/ttyUSB0 G91 G0 X0.100 F500.00\n"
        );
    }

    #[test]
    fn raw_writes_are_not_framed() {
        let line = serialize(&ChannelRequest::WriteRaw(JOG_CANCEL.to_vec()), "port");
        assert_eq!(line, vec![0x85]);
    }
}
