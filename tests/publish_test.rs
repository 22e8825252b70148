// Integration tests for rtmp-publisher
//
// These run the full client against a loopback mock server that speaks
// enough RTMP to accept a publish session: handshake, connect,
// createStream, publish, then media reception.

use bytes::{Bytes, BytesMut};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use rtmp_publisher::amf::AmfValue;
use rtmp_publisher::protocol::chunk::{ChunkDecoder, ChunkEncoder, RawMessage};
use rtmp_publisher::protocol::constants::*;
use rtmp_publisher::protocol::message::{Command, RtmpMessage};
use rtmp_publisher::{ConnectionState, Error, PublisherConfig, RtmpPublisher};

/// One message as seen by the mock server
#[derive(Debug)]
struct Recorded {
    csid: u32,
    message_type: u8,
    timestamp: u32,
    stream_id: u32,
    payload_len: usize,
}

fn control_msg(msg: &RtmpMessage) -> RawMessage {
    let (message_type, payload) = msg.encode();
    RawMessage {
        csid: CSID_PROTOCOL_CONTROL,
        timestamp: 0,
        message_type,
        stream_id: 0,
        payload,
    }
}

fn command_msg(cmd: Command) -> RawMessage {
    let (message_type, payload) = RtmpMessage::Command(cmd).encode();
    RawMessage {
        csid: CSID_COMMAND,
        timestamp: 0,
        message_type,
        stream_id: 0,
        payload,
    }
}

fn connect_result(transaction_id: f64) -> Command {
    Command {
        name: "_result".to_string(),
        transaction_id,
        command_object: AmfValue::Object(vec![
            ("fmsVer".to_string(), AmfValue::String("FMS/3,5,7,7009".into())),
            ("capabilities".to_string(), AmfValue::Number(31.0)),
        ]),
        arguments: vec![AmfValue::Object(vec![
            ("level".to_string(), AmfValue::String("status".into())),
            (
                "code".to_string(),
                AmfValue::String(NC_CONNECT_SUCCESS.into()),
            ),
        ])],
        stream_id: 0,
    }
}

fn create_stream_result(transaction_id: f64, stream_id: f64) -> Command {
    Command {
        name: "_result".to_string(),
        transaction_id,
        command_object: AmfValue::Null,
        arguments: vec![AmfValue::Number(stream_id)],
        stream_id: 0,
    }
}

fn on_status(code: &str) -> Command {
    Command {
        name: "onStatus".to_string(),
        transaction_id: 0.0,
        command_object: AmfValue::Null,
        arguments: vec![AmfValue::Object(vec![
            ("level".to_string(), AmfValue::String("status".into())),
            ("code".to_string(), AmfValue::String(code.into())),
        ])],
        stream_id: 1,
    }
}

/// Serve one publishing client, recording everything it sends.
///
/// Replies to connect with WindowAckSize + a filler data message (to push
/// the client over a small ack window) + `_result`, to createStream with
/// stream id 1, and to publish with `on_status(publish_code)`.
async fn serve_one_client(listener: TcpListener, publish_code: &'static str) -> Vec<Recorded> {
    let (mut socket, _) = listener.accept().await.expect("accept");

    handshake_as_server(&mut socket).await;

    let mut decoder = ChunkDecoder::new();
    let encoder = ChunkEncoder::new();
    let mut read_buf = BytesMut::with_capacity(64 * 1024);
    let mut out = BytesMut::new();
    let mut recorded = Vec::new();

    loop {
        while let Some(raw) = decoder.decode(&mut read_buf).expect("server decode") {
            recorded.push(Recorded {
                csid: raw.csid,
                message_type: raw.message_type,
                timestamp: raw.timestamp,
                stream_id: raw.stream_id,
                payload_len: raw.payload.len(),
            });

            match RtmpMessage::from_raw(&raw).expect("server parse") {
                RtmpMessage::SetChunkSize(size) => decoder.set_chunk_size(size),
                RtmpMessage::Command(cmd) => {
                    out.clear();
                    match cmd.name.as_str() {
                        "connect" => {
                            encoder.encode(&control_msg(&RtmpMessage::WindowAckSize(1000)), &mut out);
                            // Filler data message so the client crosses the
                            // 1000-byte ack window during setup
                            encoder.encode(
                                &RawMessage {
                                    csid: CSID_METADATA,
                                    timestamp: 0,
                                    message_type: MSG_DATA_AMF0,
                                    stream_id: 0,
                                    payload: Bytes::from(vec![0u8; 2000]),
                                },
                                &mut out,
                            );
                            encoder.encode(
                                &command_msg(connect_result(cmd.transaction_id)),
                                &mut out,
                            );
                        }
                        "createStream" => {
                            encoder.encode(
                                &command_msg(create_stream_result(cmd.transaction_id, 1.0)),
                                &mut out,
                            );
                        }
                        "publish" => {
                            encoder.encode(&command_msg(on_status(publish_code)), &mut out);
                        }
                        _ => {}
                    }
                    if !out.is_empty() {
                        socket.write_all(&out).await.expect("server write");
                    }
                }
                _ => {}
            }
        }

        match socket.read_buf(&mut read_buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(_) => break,
        }
    }

    recorded
}

/// Server side of the simple handshake; asserts the client echoes S1
/// verbatim in C2
async fn handshake_as_server(socket: &mut TcpStream) {
    let mut c0c1 = vec![0u8; 1 + HANDSHAKE_SIZE];
    socket.read_exact(&mut c0c1).await.expect("read C0C1");
    assert_eq!(c0c1[0], RTMP_VERSION);

    let s1: Vec<u8> = (0..HANDSHAKE_SIZE).map(|i| (i % 251) as u8).collect();
    let mut response = Vec::with_capacity(1 + HANDSHAKE_SIZE * 2);
    response.push(RTMP_VERSION);
    response.extend_from_slice(&s1);
    response.extend_from_slice(&c0c1[1..]); // S2 = echo of C1
    socket.write_all(&response).await.expect("write S0S1S2");

    let mut c2 = vec![0u8; HANDSHAKE_SIZE];
    socket.read_exact(&mut c2).await.expect("read C2");
    assert_eq!(&c2[..], &s1[..], "C2 must echo S1 verbatim");
}

/// Build an in-memory FLV file from (type, timestamp, payload) triples
fn build_flv(tags: &[(u8, u32, &[u8])]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"FLV");
    out.push(0x01);
    out.push(0x05);
    out.extend_from_slice(&9u32.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes());

    for (tag_type, timestamp, payload) in tags {
        out.push(*tag_type);
        let size = payload.len() as u32;
        out.extend_from_slice(&[
            ((size >> 16) & 0xFF) as u8,
            ((size >> 8) & 0xFF) as u8,
            (size & 0xFF) as u8,
        ]);
        out.extend_from_slice(&[
            ((timestamp >> 16) & 0xFF) as u8,
            ((timestamp >> 8) & 0xFF) as u8,
            (timestamp & 0xFF) as u8,
            ((timestamp >> 24) & 0xFF) as u8,
        ]);
        out.extend_from_slice(&[0, 0, 0]);
        out.extend_from_slice(payload);
        out.extend_from_slice(&(11 + size).to_be_bytes());
    }

    out
}

fn test_config() -> PublisherConfig {
    PublisherConfig {
        connect_timeout: Duration::from_secs(5),
        read_timeout: Duration::from_secs(5),
        write_timeout: Duration::from_secs(5),
        max_retry_count: 0,
        retry_interval: Duration::from_millis(50),
        ..PublisherConfig::default()
    }
}

#[tokio::test]
async fn test_publish_session_reaches_publishing() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(serve_one_client(listener, NS_PUBLISH_START));

    let mut publisher = RtmpPublisher::with_config(test_config());
    let url = format!("rtmp://127.0.0.1:{}/live/s1", addr.port());
    publisher.connect(&url).await.expect("connect should succeed");

    assert_eq!(publisher.state(), ConnectionState::Publishing);
    assert!(publisher.is_connected());
    assert_eq!(publisher.server_stream_id(), Some(1));

    publisher.disconnect().await;
    assert_eq!(publisher.state(), ConnectionState::Disconnected);

    let recorded = server.await.unwrap();

    // The publish sequence arrived on the command chunk stream
    let commands = recorded
        .iter()
        .filter(|r| r.csid == CSID_COMMAND && r.message_type == MSG_COMMAND_AMF0)
        .count();
    assert_eq!(commands, 3, "connect, createStream, publish");

    // The filler pushed the client over the 1000-byte ack window
    let ack = recorded
        .iter()
        .find(|r| r.message_type == MSG_ACKNOWLEDGEMENT)
        .expect("client should acknowledge received bytes");
    assert_eq!(ack.csid, CSID_PROTOCOL_CONTROL);

    // The client re-advertised its chunk size after connect
    assert!(recorded
        .iter()
        .any(|r| r.message_type == MSG_SET_CHUNK_SIZE));
}

#[tokio::test]
async fn test_media_mapping_and_pacing() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(serve_one_client(listener, NS_PUBLISH_START));

    let mut publisher = RtmpPublisher::with_config(test_config());
    let url = format!("rtmp://127.0.0.1:{}/live/s1", addr.port());
    publisher.connect(&url).await.expect("connect should succeed");

    let flv = build_flv(&[
        (18, 0, b"onMetaData"),
        (9, 0, &[0x17, 0x00, 0x00]),
        (9, 500, &[0x27, 0x01]),
        (9, 1500, &[0x27, 0x01]),
    ]);

    let start = Instant::now();
    publisher.publish_stream(&flv[..]).await.expect("push");
    let elapsed = start.elapsed();

    // Three tags spanning 1500 ms of media time must pace to roughly
    // 1500 ms of wall time (generous upper bound for loaded CI machines)
    assert!(
        elapsed >= Duration::from_millis(1350),
        "pushed too fast: {:?}",
        elapsed
    );
    assert!(
        elapsed <= Duration::from_millis(2500),
        "pushed too slow: {:?}",
        elapsed
    );

    let stats = publisher.statistics();
    assert_eq!(stats.video_frames, 3);
    assert_eq!(stats.audio_frames, 0);

    publisher.disconnect().await;
    let recorded = server.await.unwrap();

    // Script tag on csid 6 as AMF0 data, video on csid 5, all on the
    // server-assigned message stream
    let script: Vec<_> = recorded
        .iter()
        .filter(|r| r.message_type == MSG_DATA_AMF0 && r.stream_id == 1)
        .collect();
    assert_eq!(script.len(), 1);
    assert_eq!(script[0].csid, CSID_METADATA);
    assert_eq!(script[0].payload_len, "onMetaData".len());

    let video: Vec<_> = recorded
        .iter()
        .filter(|r| r.message_type == MSG_VIDEO)
        .collect();
    assert_eq!(video.len(), 3);
    assert!(video.iter().all(|r| r.csid == CSID_VIDEO && r.stream_id == 1));

    let timestamps: Vec<u32> = video.iter().map(|r| r.timestamp).collect();
    assert_eq!(timestamps, vec![0, 500, 1500]);
}

#[tokio::test]
async fn test_publish_rejected_on_error_status() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(serve_one_client(listener, "NetStream.Publish.Error"));

    let mut publisher = RtmpPublisher::with_config(test_config());
    let url = format!("rtmp://127.0.0.1:{}/live/s1", addr.port());

    let err = publisher.connect(&url).await.unwrap_err();
    assert!(matches!(err, Error::Publish(_)), "got {:?}", err);
    assert_eq!(publisher.state(), ConnectionState::Error);
    assert!(publisher
        .last_error()
        .map(|e| e.contains("NetStream.Publish.Error"))
        .unwrap_or(false));

    server.abort();
}

#[tokio::test]
async fn test_connect_with_retry_gives_up() {
    let mut config = test_config();
    config.connect_timeout = Duration::from_millis(300);
    config.retry_interval = Duration::from_millis(20);

    let mut publisher = RtmpPublisher::with_config(config);

    // Grab a port and close the listener so nothing is there
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url = format!("rtmp://127.0.0.1:{}/live/s1", addr.port());
    let err = publisher.connect_with_retry(&url, 1).await.unwrap_err();
    assert!(matches!(err, Error::Io(_) | Error::Timeout), "got {:?}", err);
    assert_eq!(publisher.state(), ConnectionState::Error);
}
