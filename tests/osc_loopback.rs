//! End-to-end transport checks against a fake console on loopback.

use std::time::Duration;

use rosc::{OscMessage, OscPacket, OscType};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;
use tokio::time::timeout;

use cuemirror::console::protocol::{self, ConsoleEvent, ConsoleRequest};
use cuemirror::console::slip::{self, SlipDecoder};
use cuemirror::console::transport::{OscTransport, TransportEvent};
use cuemirror::model::settings::{OscSettings, Protocol};

fn encode(msg: OscMessage) -> Vec<u8> {
    rosc::encoder::encode(&OscPacket::Message(msg)).expect("encode OSC")
}

async fn next_event(rx: &mut mpsc::Receiver<TransportEvent>) -> TransportEvent {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for transport event")
        .expect("transport event stream closed")
}

#[tokio::test]
async fn udp_request_and_reply_round_trip() {
    let console = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let console_port = console.local_addr().unwrap().port();

    let settings = OscSettings {
        ip_address: "127.0.0.1".to_string(),
        port: console_port,
        osc_version: "1.1".to_string(),
        protocol: Protocol::Udp,
    };

    let (event_tx, mut event_rx) = mpsc::channel(64);
    let (transport, command_tx) = OscTransport::connect(&settings, 0, event_tx)
        .await
        .expect("UDP transport should bind");
    tokio::spawn(transport.run());

    assert!(matches!(next_event(&mut event_rx).await, TransportEvent::Ready));

    command_tx
        .send(ConsoleRequest::CueCount { list: 1 }.to_message())
        .await
        .unwrap();

    let mut buf = [0u8; 1024];
    let (size, reply_to) = timeout(Duration::from_secs(2), console.recv_from(&mut buf))
        .await
        .expect("timed out waiting for request")
        .unwrap();
    let (_, packet) = rosc::decoder::decode_udp(&buf[..size]).unwrap();
    let OscPacket::Message(request) = packet else {
        panic!("expected a plain message");
    };
    assert_eq!(request.addr, "/eos/get/cue/1/count");

    console
        .send_to(
            &encode(OscMessage {
                addr: "/eos/out/get/cue/1/count".to_string(),
                args: vec![OscType::Int(42)],
            }),
            reply_to,
        )
        .await
        .unwrap();

    let TransportEvent::Message(msg) = next_event(&mut event_rx).await else {
        panic!("expected an inbound message");
    };
    assert_eq!(
        protocol::decode(&msg),
        Some(ConsoleEvent::CueCount { list: 1, count: 42 })
    );
}

#[tokio::test]
async fn tcp_slip_framing_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let console_port = listener.local_addr().unwrap().port();

    // Fake console: expect one framed request, answer with two frames in a
    // single segment.
    let console = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut decoder = SlipDecoder::new();
        let mut buf = [0u8; 4096];
        let request = loop {
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "client hung up early");
            if let Some(frame) = decoder.feed(&buf[..n]).into_iter().next() {
                break frame;
            }
        };
        let (_, packet) = rosc::decoder::decode_udp(&request).unwrap();
        let OscPacket::Message(msg) = packet else {
            panic!("expected a plain message");
        };
        assert_eq!(msg.addr, "/eos/get/version");

        let mut segment = slip::encode(&encode(OscMessage {
            addr: "/eos/out/get/version".to_string(),
            args: vec![OscType::String("3.2.1".to_string())],
        }));
        segment.extend_from_slice(&slip::encode(&encode(OscMessage {
            addr: "/eos/out/show/name".to_string(),
            args: vec![OscType::String("Twelfth Night".to_string())],
        })));
        stream.write_all(&segment).await.unwrap();
        // Keep the connection open until the test is done reading.
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let settings = OscSettings {
        ip_address: "127.0.0.1".to_string(),
        port: console_port,
        osc_version: "1.1".to_string(),
        protocol: Protocol::Tcp,
    };

    let (event_tx, mut event_rx) = mpsc::channel(64);
    let (transport, command_tx) = OscTransport::connect(&settings, 0, event_tx)
        .await
        .expect("TCP transport should connect");
    tokio::spawn(transport.run());

    assert!(matches!(next_event(&mut event_rx).await, TransportEvent::Ready));

    command_tx
        .send(ConsoleRequest::Version.to_message())
        .await
        .unwrap();

    let TransportEvent::Message(first) = next_event(&mut event_rx).await else {
        panic!("expected an inbound message");
    };
    assert_eq!(
        protocol::decode(&first),
        Some(ConsoleEvent::Version("3.2.1".to_string()))
    );

    let TransportEvent::Message(second) = next_event(&mut event_rx).await else {
        panic!("expected a second inbound message");
    };
    assert_eq!(
        protocol::decode(&second),
        Some(ConsoleEvent::ShowName("Twelfth Night".to_string()))
    );

    console.abort();
}

#[tokio::test]
async fn tcp_connect_to_closed_port_fails_fast() {
    // Bind then drop to get a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_port = listener.local_addr().unwrap().port();
    drop(listener);

    let settings = OscSettings {
        ip_address: "127.0.0.1".to_string(),
        port: dead_port,
        osc_version: "1.1".to_string(),
        protocol: Protocol::Tcp,
    };
    let (event_tx, _event_rx) = mpsc::channel(8);
    let result = OscTransport::connect(&settings, 0, event_tx).await;
    assert!(result.is_err());
}
