//! Socket-facing task: UDP datagrams or a SLIP-framed TCP stream.
//!
//! Built with a fallible `connect`, then driven as a run loop that selects
//! over the outbound command channel and the socket. There is no reconnect
//! and no queueing while disconnected: once the loop exits, the command
//! channel dies with it and sends fail fast at the caller.

use std::net::SocketAddr;

use anyhow::Context;
use rosc::{OscMessage, OscPacket};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{tcp, TcpStream, UdpSocket};
use tokio::sync::mpsc;

use crate::console::slip::{self, SlipDecoder};
use crate::model::settings::{OscSettings, Protocol};

/// Local UDP port the console is configured to reply to.
pub const UDP_LISTEN_PORT: u16 = 8001;

#[derive(Debug)]
pub enum TransportEvent {
    /// The far side is reachable; initial discovery may begin.
    Ready,
    Message(OscMessage),
    Closed(String),
}

pub struct OscTransport {
    io: TransportIo,
    command_rx: mpsc::Receiver<OscMessage>,
    event_tx: mpsc::Sender<TransportEvent>,
}

enum TransportIo {
    Udp { socket: UdpSocket, remote: SocketAddr },
    Tcp { stream: TcpStream },
}

impl OscTransport {
    /// Open the configured transport. `listen_port` is only used by UDP;
    /// pass [`UDP_LISTEN_PORT`] outside of tests.
    pub async fn connect(
        settings: &OscSettings,
        listen_port: u16,
        event_tx: mpsc::Sender<TransportEvent>,
    ) -> Result<(Self, mpsc::Sender<OscMessage>), anyhow::Error> {
        let remote: SocketAddr = format!("{}:{}", settings.ip_address, settings.port)
            .parse()
            .with_context(|| format!("Invalid console address {}", settings.ip_address))?;

        let io = match settings.protocol {
            Protocol::Udp => {
                let socket = UdpSocket::bind(("0.0.0.0", listen_port))
                    .await
                    .with_context(|| format!("Failed to bind UDP port {listen_port}"))?;
                TransportIo::Udp { socket, remote }
            }
            Protocol::Tcp => {
                let stream = TcpStream::connect(remote)
                    .await
                    .with_context(|| format!("Failed to connect to console at {remote}"))?;
                TransportIo::Tcp { stream }
            }
        };

        let (command_tx, command_rx) = mpsc::channel(64);
        Ok((
            Self {
                io,
                command_rx,
                event_tx,
            },
            command_tx,
        ))
    }

    pub async fn run(mut self) {
        log::info!("Transport loop started.");
        if self.event_tx.send(TransportEvent::Ready).await.is_err() {
            return;
        }
        let reason = match self.io {
            TransportIo::Udp { socket, remote } => {
                run_udp(socket, remote, &mut self.command_rx, &self.event_tx).await
            }
            TransportIo::Tcp { stream } => {
                run_tcp(stream, &mut self.command_rx, &self.event_tx).await
            }
        };
        log::info!("Transport loop finished: {reason}");
        let _ = self.event_tx.send(TransportEvent::Closed(reason)).await;
    }
}

async fn run_udp(
    socket: UdpSocket,
    remote: SocketAddr,
    command_rx: &mut mpsc::Receiver<OscMessage>,
    event_tx: &mpsc::Sender<TransportEvent>,
) -> String {
    let mut buf = vec![0u8; 65536];
    loop {
        tokio::select! {
            cmd = command_rx.recv() => match cmd {
                Some(msg) => match rosc::encoder::encode(&OscPacket::Message(msg)) {
                    Ok(bytes) => {
                        if let Err(e) = socket.send_to(&bytes, remote).await {
                            return format!("send failed: {e}");
                        }
                    }
                    Err(e) => log::error!("Failed to encode outbound OSC: {:?}", e),
                },
                None => return "transport handle dropped".to_string(),
            },
            received = socket.recv_from(&mut buf) => match received {
                Ok((size, _)) => {
                    if !dispatch_payload(&buf[..size], event_tx).await {
                        return "event channel closed".to_string();
                    }
                }
                Err(e) => return format!("receive failed: {e}"),
            },
        }
    }
}

async fn run_tcp(
    stream: TcpStream,
    command_rx: &mut mpsc::Receiver<OscMessage>,
    event_tx: &mpsc::Sender<TransportEvent>,
) -> String {
    let (mut reader, mut writer) = stream.into_split();
    let mut decoder = SlipDecoder::new();
    let mut buf = vec![0u8; 65536];
    loop {
        tokio::select! {
            cmd = command_rx.recv() => match cmd {
                Some(msg) => {
                    if let Some(reason) = write_framed(&mut writer, msg).await {
                        return reason;
                    }
                }
                None => return "transport handle dropped".to_string(),
            },
            read = reader.read(&mut buf) => match read {
                Ok(0) => return "connection closed by console".to_string(),
                Ok(n) => {
                    for frame in decoder.feed(&buf[..n]) {
                        if !dispatch_payload(&frame, event_tx).await {
                            return "event channel closed".to_string();
                        }
                    }
                }
                Err(e) => return format!("read failed: {e}"),
            },
        }
    }
}

async fn write_framed(writer: &mut tcp::OwnedWriteHalf, msg: OscMessage) -> Option<String> {
    let bytes = match rosc::encoder::encode(&OscPacket::Message(msg)) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::error!("Failed to encode outbound OSC: {:?}", e);
            return None;
        }
    };
    match writer.write_all(&slip::encode(&bytes)).await {
        Ok(()) => None,
        Err(e) => Some(format!("write failed: {e}")),
    }
}

/// Decode one wire payload and forward each contained message in order.
/// Returns false when the event channel is gone.
async fn dispatch_payload(payload: &[u8], event_tx: &mpsc::Sender<TransportEvent>) -> bool {
    let packet = match rosc::decoder::decode_udp(payload) {
        Ok((_, packet)) => packet,
        Err(e) => {
            log::debug!("Dropping malformed OSC payload: {:?}", e);
            return true;
        }
    };
    let mut messages = Vec::new();
    flatten(packet, &mut messages);
    for msg in messages {
        if event_tx.send(TransportEvent::Message(msg)).await.is_err() {
            return false;
        }
    }
    true
}

fn flatten(packet: OscPacket, out: &mut Vec<OscMessage>) {
    match packet {
        OscPacket::Message(msg) => out.push(msg),
        OscPacket::Bundle(bundle) => {
            for inner in bundle.content {
                flatten(inner, out);
            }
        }
    }
}
