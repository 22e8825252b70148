//! RTMP message types and parsing
//!
//! RTMP messages are classified into:
//! - Protocol Control Messages (types 1-6): chunk/flow control
//! - Command Messages (types 17, 20): AMF-encoded commands
//! - Audio/Video/Data Messages (types 8, 9, 18): media payloads
//!
//! The publishing client sends media as raw payloads (FLV tag bodies are
//! forwarded verbatim), so only control and command messages are modelled
//! here; everything else parses as [`RtmpMessage::Unknown`].
//!
//! Reference: RTMP Specification Section 5.4

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::amf::{amf0, Amf0Encoder, Amf3Decoder, AmfValue};
use crate::error::{ProtocolError, Result};
use crate::protocol::chunk::RawMessage;
use crate::protocol::constants::*;

/// Parsed RTMP message
#[derive(Debug, Clone)]
pub enum RtmpMessage {
    /// Set Chunk Size (type 1)
    SetChunkSize(u32),

    /// Abort Message (type 2)
    Abort { csid: u32 },

    /// Acknowledgement (type 3)
    Acknowledgement { sequence: u32 },

    /// User Control Message (type 4)
    UserControl(UserControlEvent),

    /// Window Acknowledgement Size (type 5)
    WindowAckSize(u32),

    /// Set Peer Bandwidth (type 6)
    SetPeerBandwidth { size: u32, limit_type: u8 },

    /// AMF0 (type 20) or AMF3 (type 17) command
    Command(Command),

    /// Any message type the publisher does not act on
    Unknown { type_id: u8, data: Bytes },
}

/// User Control Event
#[derive(Debug, Clone)]
pub enum UserControlEvent {
    StreamBegin(u32),
    StreamEof(u32),
    StreamDry(u32),
    PingRequest(u32),
    PingResponse(u32),
    Unknown { event_type: u16, data: Bytes },
}

/// RTMP command (connect, createStream, publish, _result, onStatus, ...)
#[derive(Debug, Clone)]
pub struct Command {
    /// Command name
    pub name: String,
    /// Transaction ID
    pub transaction_id: f64,
    /// Command object (null for most responses)
    pub command_object: AmfValue,
    /// Additional arguments
    pub arguments: Vec<AmfValue>,
    /// Message stream ID (from the chunk header)
    pub stream_id: u32,
}

impl RtmpMessage {
    /// Parse a message from a reassembled chunk-stream message
    pub fn from_raw(raw: &RawMessage) -> Result<Self> {
        let mut payload = raw.payload.clone();

        match raw.message_type {
            MSG_SET_CHUNK_SIZE => {
                if payload.len() < 4 {
                    return Err(ProtocolError::TruncatedMessage("set chunk size").into());
                }
                // The most significant bit is reserved
                Ok(RtmpMessage::SetChunkSize(payload.get_u32() & 0x7FFF_FFFF))
            }

            MSG_ABORT => {
                if payload.len() < 4 {
                    return Err(ProtocolError::TruncatedMessage("abort").into());
                }
                Ok(RtmpMessage::Abort {
                    csid: payload.get_u32(),
                })
            }

            MSG_ACKNOWLEDGEMENT => {
                if payload.len() < 4 {
                    return Err(ProtocolError::TruncatedMessage("acknowledgement").into());
                }
                Ok(RtmpMessage::Acknowledgement {
                    sequence: payload.get_u32(),
                })
            }

            MSG_USER_CONTROL => parse_user_control(&mut payload),

            MSG_WINDOW_ACK_SIZE => {
                if payload.len() < 4 {
                    return Err(ProtocolError::TruncatedMessage("window ack size").into());
                }
                Ok(RtmpMessage::WindowAckSize(payload.get_u32()))
            }

            MSG_SET_PEER_BANDWIDTH => {
                if payload.len() < 5 {
                    return Err(ProtocolError::TruncatedMessage("set peer bandwidth").into());
                }
                let size = payload.get_u32();
                let limit_type = payload.get_u8();
                Ok(RtmpMessage::SetPeerBandwidth { size, limit_type })
            }

            MSG_COMMAND_AMF0 => Ok(RtmpMessage::Command(parse_command_amf0(
                &mut payload,
                raw.stream_id,
            )?)),

            MSG_COMMAND_AMF3 => Ok(RtmpMessage::Command(parse_command_amf3(
                &mut payload,
                raw.stream_id,
            )?)),

            _ => Ok(RtmpMessage::Unknown {
                type_id: raw.message_type,
                data: payload,
            }),
        }
    }

    /// Encode the message to its type id and chunk payload
    pub fn encode(&self) -> (u8, Bytes) {
        match self {
            RtmpMessage::SetChunkSize(size) => {
                let mut buf = BytesMut::with_capacity(4);
                buf.put_u32(*size);
                (MSG_SET_CHUNK_SIZE, buf.freeze())
            }

            RtmpMessage::Abort { csid } => {
                let mut buf = BytesMut::with_capacity(4);
                buf.put_u32(*csid);
                (MSG_ABORT, buf.freeze())
            }

            RtmpMessage::Acknowledgement { sequence } => {
                let mut buf = BytesMut::with_capacity(4);
                buf.put_u32(*sequence);
                (MSG_ACKNOWLEDGEMENT, buf.freeze())
            }

            RtmpMessage::WindowAckSize(size) => {
                let mut buf = BytesMut::with_capacity(4);
                buf.put_u32(*size);
                (MSG_WINDOW_ACK_SIZE, buf.freeze())
            }

            RtmpMessage::SetPeerBandwidth { size, limit_type } => {
                let mut buf = BytesMut::with_capacity(5);
                buf.put_u32(*size);
                buf.put_u8(*limit_type);
                (MSG_SET_PEER_BANDWIDTH, buf.freeze())
            }

            RtmpMessage::UserControl(event) => {
                let mut buf = BytesMut::with_capacity(10);
                match event {
                    UserControlEvent::StreamBegin(id) => {
                        buf.put_u16(UC_STREAM_BEGIN);
                        buf.put_u32(*id);
                    }
                    UserControlEvent::StreamEof(id) => {
                        buf.put_u16(UC_STREAM_EOF);
                        buf.put_u32(*id);
                    }
                    UserControlEvent::StreamDry(id) => {
                        buf.put_u16(UC_STREAM_DRY);
                        buf.put_u32(*id);
                    }
                    UserControlEvent::PingRequest(ts) => {
                        buf.put_u16(UC_PING_REQUEST);
                        buf.put_u32(*ts);
                    }
                    UserControlEvent::PingResponse(ts) => {
                        buf.put_u16(UC_PING_RESPONSE);
                        buf.put_u32(*ts);
                    }
                    UserControlEvent::Unknown { event_type, data } => {
                        buf.put_u16(*event_type);
                        buf.put_slice(data);
                    }
                }
                (MSG_USER_CONTROL, buf.freeze())
            }

            RtmpMessage::Command(cmd) => (MSG_COMMAND_AMF0, encode_command(cmd)),

            RtmpMessage::Unknown { type_id, data } => (*type_id, data.clone()),
        }
    }
}

/// Parse a User Control message
fn parse_user_control(payload: &mut Bytes) -> Result<RtmpMessage> {
    if payload.len() < 6 {
        return Err(ProtocolError::TruncatedMessage("user control").into());
    }

    let event_type = payload.get_u16();
    let event = match event_type {
        UC_STREAM_BEGIN => UserControlEvent::StreamBegin(payload.get_u32()),
        UC_STREAM_EOF => UserControlEvent::StreamEof(payload.get_u32()),
        UC_STREAM_DRY => UserControlEvent::StreamDry(payload.get_u32()),
        UC_PING_REQUEST => UserControlEvent::PingRequest(payload.get_u32()),
        UC_PING_RESPONSE => UserControlEvent::PingResponse(payload.get_u32()),
        _ => UserControlEvent::Unknown {
            event_type,
            data: payload.clone(),
        },
    };

    Ok(RtmpMessage::UserControl(event))
}

/// Parse an AMF0-encoded command body
fn parse_command_amf0(payload: &mut Bytes, stream_id: u32) -> Result<Command> {
    let name = match amf0::decode_value(payload) {
        AmfValue::String(s) => s,
        other => {
            return Err(ProtocolError::UnexpectedCommand(format!(
                "command name is {:?}",
                other
            ))
            .into())
        }
    };

    let transaction_id = amf0::decode_value(payload).as_number().unwrap_or(0.0);

    let command_object = if payload.has_remaining() {
        amf0::decode_value(payload)
    } else {
        AmfValue::Null
    };

    let mut arguments = Vec::new();
    while payload.has_remaining() {
        arguments.push(amf0::decode_value(payload));
    }

    Ok(Command {
        name,
        transaction_id,
        command_object,
        arguments,
        stream_id,
    })
}

/// Parse an AMF3 command body (type 17)
///
/// A leading 0x00 format byte selects an AMF0-encoded body (the common
/// case on the wire); otherwise the body is decoded with fresh AMF3
/// reference tables.
fn parse_command_amf3(payload: &mut Bytes, stream_id: u32) -> Result<Command> {
    if !payload.is_empty() && payload[0] == 0x00 {
        payload.advance(1);
        return parse_command_amf0(payload, stream_id);
    }

    let mut decoder = Amf3Decoder::new();

    let name = match decoder.decode(payload) {
        AmfValue::String(s) => s,
        other => {
            return Err(ProtocolError::UnexpectedCommand(format!(
                "command name is {:?}",
                other
            ))
            .into())
        }
    };

    let transaction_id = decoder.decode(payload).as_number().unwrap_or(0.0);

    let command_object = if payload.has_remaining() {
        decoder.decode(payload)
    } else {
        AmfValue::Null
    };

    let mut arguments = Vec::new();
    while payload.has_remaining() {
        arguments.push(decoder.decode(payload));
    }

    Ok(Command {
        name,
        transaction_id,
        command_object,
        arguments,
        stream_id,
    })
}

/// Encode a command to AMF0 bytes
fn encode_command(cmd: &Command) -> Bytes {
    let mut encoder = Amf0Encoder::new();
    encoder.encode(&AmfValue::String(cmd.name.clone()));
    encoder.encode(&AmfValue::Number(cmd.transaction_id));
    encoder.encode(&cmd.command_object);
    for arg in &cmd.arguments {
        encoder.encode(arg);
    }
    encoder.finish()
}

impl Command {
    /// Create a command with a null command object
    pub fn new(name: impl Into<String>, transaction_id: f64) -> Self {
        Command {
            name: name.into(),
            transaction_id,
            command_object: AmfValue::Null,
            arguments: Vec::new(),
            stream_id: 0,
        }
    }

    /// Read the `code` property of the first info-object argument
    pub fn status_code(&self) -> Option<&str> {
        self.arguments.iter().find_map(|arg| arg.get_str("code"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(message_type: u8, payload: Bytes) -> RawMessage {
        RawMessage {
            csid: CSID_COMMAND,
            timestamp: 0,
            message_type,
            stream_id: 0,
            payload,
        }
    }

    #[test]
    fn test_connect_command_byte_prefix() {
        let cmd = Command {
            name: CMD_CONNECT.to_string(),
            transaction_id: 1.0,
            command_object: AmfValue::Object(vec![
                ("app".to_string(), AmfValue::String("live".into())),
                (
                    "type".to_string(),
                    AmfValue::String(CONNECT_TYPE_NONPRIVATE.into()),
                ),
                (
                    "flashVer".to_string(),
                    AmfValue::String(FLASH_VERSION.into()),
                ),
                (
                    "tcUrl".to_string(),
                    AmfValue::String("rtmp://127.0.0.1:1935/live".into()),
                ),
            ]),
            arguments: vec![],
            stream_id: 0,
        };

        let (msg_type, payload) = RtmpMessage::Command(cmd).encode();
        assert_eq!(msg_type, MSG_COMMAND_AMF0);

        // "connect" string, transaction id 1.0, object marker
        let expected_prefix: &[u8] = &[
            0x02, 0x00, 0x07, 0x63, 0x6F, 0x6E, 0x6E, 0x65, 0x63, 0x74, // "connect"
            0x00, 0x3F, 0xF0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // 1.0
            0x03, // object
        ];
        assert_eq!(&payload[..expected_prefix.len()], expected_prefix);

        // Terminated by the object-end sentinel
        assert_eq!(&payload[payload.len() - 3..], &[0x00, 0x00, 0x09]);
    }

    #[test]
    fn test_command_roundtrip() {
        let cmd = Command {
            name: "publish".to_string(),
            transaction_id: 3.0,
            command_object: AmfValue::Null,
            arguments: vec![
                AmfValue::String("stream-key".into()),
                AmfValue::String(PUBLISH_MODE_LIVE.into()),
            ],
            stream_id: 1,
        };

        let (msg_type, payload) = RtmpMessage::Command(cmd).encode();
        let mut parsed_from = raw(msg_type, payload);
        parsed_from.stream_id = 1;
        let parsed = RtmpMessage::from_raw(&parsed_from).unwrap();

        match parsed {
            RtmpMessage::Command(c) => {
                assert_eq!(c.name, "publish");
                assert_eq!(c.transaction_id, 3.0);
                assert_eq!(c.command_object, AmfValue::Null);
                assert_eq!(c.arguments.len(), 2);
                assert_eq!(c.arguments[0].as_str(), Some("stream-key"));
                assert_eq!(c.stream_id, 1);
            }
            other => panic!("expected command, got {:?}", other),
        }
    }

    #[test]
    fn test_amf3_command_with_amf0_body() {
        let cmd = Command::new("onStatus", 0.0);
        let (_, amf0_payload) = RtmpMessage::Command(cmd).encode();

        let mut payload = BytesMut::new();
        payload.put_u8(0x00);
        payload.put_slice(&amf0_payload);

        let parsed = RtmpMessage::from_raw(&raw(MSG_COMMAND_AMF3, payload.freeze())).unwrap();
        match parsed {
            RtmpMessage::Command(c) => assert_eq!(c.name, "onStatus"),
            other => panic!("expected command, got {:?}", other),
        }
    }

    #[test]
    fn test_amf3_command_with_amf3_body() {
        let mut encoder = crate::amf::Amf3Encoder::new();
        encoder.encode(&AmfValue::String("_result".into()));
        encoder.encode(&AmfValue::Number(2.0));
        encoder.encode(&AmfValue::Null);
        encoder.encode(&AmfValue::Number(1.0));
        let payload = encoder.finish();

        let parsed = RtmpMessage::from_raw(&raw(MSG_COMMAND_AMF3, payload)).unwrap();
        match parsed {
            RtmpMessage::Command(c) => {
                assert_eq!(c.name, "_result");
                assert_eq!(c.transaction_id, 2.0);
                assert_eq!(c.arguments[0].as_number(), Some(1.0));
            }
            other => panic!("expected command, got {:?}", other),
        }
    }

    #[test]
    fn test_control_message_roundtrips() {
        for msg in [
            RtmpMessage::SetChunkSize(4096),
            RtmpMessage::Acknowledgement { sequence: 2_500_000 },
            RtmpMessage::WindowAckSize(2_500_000),
            RtmpMessage::SetPeerBandwidth {
                size: 2_500_000,
                limit_type: 2,
            },
            RtmpMessage::UserControl(UserControlEvent::PingRequest(0x1234_5678)),
            RtmpMessage::UserControl(UserControlEvent::PingResponse(42)),
            RtmpMessage::UserControl(UserControlEvent::StreamBegin(1)),
        ] {
            let (msg_type, payload) = msg.encode();
            let parsed = RtmpMessage::from_raw(&raw(msg_type, payload)).unwrap();

            match (&msg, &parsed) {
                (RtmpMessage::SetChunkSize(a), RtmpMessage::SetChunkSize(b)) => assert_eq!(a, b),
                (
                    RtmpMessage::Acknowledgement { sequence: a },
                    RtmpMessage::Acknowledgement { sequence: b },
                ) => assert_eq!(a, b),
                (RtmpMessage::WindowAckSize(a), RtmpMessage::WindowAckSize(b)) => assert_eq!(a, b),
                (
                    RtmpMessage::SetPeerBandwidth { size: a, limit_type: la },
                    RtmpMessage::SetPeerBandwidth { size: b, limit_type: lb },
                ) => {
                    assert_eq!(a, b);
                    assert_eq!(la, lb);
                }
                (
                    RtmpMessage::UserControl(UserControlEvent::PingRequest(a)),
                    RtmpMessage::UserControl(UserControlEvent::PingRequest(b)),
                ) => assert_eq!(a, b),
                (
                    RtmpMessage::UserControl(UserControlEvent::PingResponse(a)),
                    RtmpMessage::UserControl(UserControlEvent::PingResponse(b)),
                ) => assert_eq!(a, b),
                (
                    RtmpMessage::UserControl(UserControlEvent::StreamBegin(a)),
                    RtmpMessage::UserControl(UserControlEvent::StreamBegin(b)),
                ) => assert_eq!(a, b),
                (a, b) => panic!("mismatched roundtrip: {:?} vs {:?}", a, b),
            }
        }
    }

    #[test]
    fn test_truncated_control_messages() {
        for (msg_type, len) in [
            (MSG_SET_CHUNK_SIZE, 3),
            (MSG_ACKNOWLEDGEMENT, 2),
            (MSG_WINDOW_ACK_SIZE, 0),
            (MSG_SET_PEER_BANDWIDTH, 4),
            (MSG_USER_CONTROL, 5),
        ] {
            let payload = Bytes::from(vec![0u8; len]);
            let err = RtmpMessage::from_raw(&raw(msg_type, payload)).unwrap_err();
            assert!(err.to_string().contains("Truncated"), "type {}", msg_type);
        }
    }

    #[test]
    fn test_status_code_accessor() {
        let cmd = Command {
            name: CMD_ON_STATUS.to_string(),
            transaction_id: 0.0,
            command_object: AmfValue::Null,
            arguments: vec![AmfValue::Object(vec![
                ("level".to_string(), AmfValue::String("status".into())),
                (
                    "code".to_string(),
                    AmfValue::String(NS_PUBLISH_START.into()),
                ),
            ])],
            stream_id: 1,
        };

        assert_eq!(cmd.status_code(), Some(NS_PUBLISH_START));
        assert_eq!(Command::new("x", 0.0).status_code(), None);
    }

    #[test]
    fn test_unknown_message_passthrough() {
        let parsed = RtmpMessage::from_raw(&raw(MSG_AUDIO, Bytes::from_static(&[0xAF, 0x01])))
            .unwrap();
        match parsed {
            RtmpMessage::Unknown { type_id, data } => {
                assert_eq!(type_id, MSG_AUDIO);
                assert_eq!(&data[..], &[0xAF, 0x01]);
            }
            other => panic!("expected unknown, got {:?}", other),
        }
    }
}
