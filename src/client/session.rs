//! RTMP publish session engine
//!
//! Drives the full publishing lifecycle against a server:
//! handshake -> connect -> createStream -> publish -> timed tag dispatch.
//!
//! The main task owns the read half of the socket exclusively. Writes go
//! through [`MessageSender`], an async-mutex-guarded bundle of the write
//! half and the chunk encoder shared with the heartbeat task, so pings and
//! media tags serialize at message granularity and per-chunk-stream FIFO
//! ordering holds on the wire.
//!
//! The state lock and the statistics lock are plain mutexes held only for
//! the duration of an update, never across I/O.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::amf::AmfValue;
use crate::error::{Error, ProtocolError, Result};
use crate::media::{FlvReader, FlvTagType};
use crate::protocol::chunk::{ChunkDecoder, ChunkEncoder, RawMessage};
use crate::protocol::constants::*;
use crate::protocol::handshake::ClientHandshake;
use crate::protocol::message::{Command, RtmpMessage, UserControlEvent};
use crate::stats::{StatsHandle, Statistics};

use super::config::{PublisherConfig, RtmpUrl};
use super::heartbeat::Heartbeat;

/// Longest single pacing sleep; guards against corrupt FLV timestamps
const MAX_PACING_SLEEP: Duration = Duration::from_secs(5);

/// Connection lifecycle state
///
/// Progression is monotonic except Error, which is terminal until explicit
/// teardown via [`RtmpPublisher::disconnect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Handshaking,
    Connected,
    Publishing,
    Error,
}

struct StateInner {
    state: ConnectionState,
    last_error: Option<String>,
}

/// Connection state and last-error string behind a single lock
#[derive(Clone)]
pub(crate) struct SharedState {
    inner: Arc<Mutex<StateInner>>,
}

impl SharedState {
    fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StateInner {
                state: ConnectionState::Disconnected,
                last_error: None,
            })),
        }
    }

    pub(crate) fn get(&self) -> ConnectionState {
        self.inner.lock().expect("state lock poisoned").state
    }

    fn set(&self, state: ConnectionState) {
        let mut inner = self.inner.lock().expect("state lock poisoned");
        inner.state = state;
        tracing::debug!(state = ?state, "session state");
    }

    pub(crate) fn set_error(&self, message: impl Into<String>) {
        let message = message.into();
        let mut inner = self.inner.lock().expect("state lock poisoned");
        inner.state = ConnectionState::Error;
        tracing::error!(error = %message, "session error");
        inner.last_error = Some(message);
    }

    fn last_error(&self) -> Option<String> {
        self.inner
            .lock()
            .expect("state lock poisoned")
            .last_error
            .clone()
    }

    fn reset(&self) {
        let mut inner = self.inner.lock().expect("state lock poisoned");
        inner.state = ConnectionState::Disconnected;
        inner.last_error = None;
    }
}

/// Mutable protocol variables owned by the session engine
#[derive(Debug)]
struct SessionVars {
    /// Our advertised chunk size
    out_chunk_size: u32,
    /// Inbound threshold for sending Acknowledgement
    window_ack_size: u32,
    /// Total bytes read from the socket
    bytes_received: u64,
    /// Bytes read since the last Acknowledgement
    bytes_since_ack: u64,
    /// Stream id returned by `_result` to createStream
    server_stream_id: u32,
    /// Next command transaction id
    next_transaction_id: f64,
}

impl Default for SessionVars {
    fn default() -> Self {
        Self {
            out_chunk_size: DEFAULT_CHUNK_SIZE,
            window_ack_size: DEFAULT_WINDOW_ACK_SIZE,
            bytes_received: 0,
            bytes_since_ack: 0,
            server_stream_id: 0,
            next_transaction_id: 1.0,
        }
    }
}

impl SessionVars {
    fn next_transaction(&mut self) -> f64 {
        let id = self.next_transaction_id;
        self.next_transaction_id += 1.0;
        id
    }
}

/// Write half of the connection plus the chunk encoder
///
/// Shared behind an async mutex so the heartbeat task and the publish loop
/// serialize their writes.
pub(crate) struct MessageSender {
    writer: BufWriter<OwnedWriteHalf>,
    encoder: ChunkEncoder,
    scratch: BytesMut,
    write_timeout: Duration,
    stats: StatsHandle,
}

impl MessageSender {
    /// Chunk-encode and write a complete message
    pub(crate) async fn send_raw(&mut self, msg: &RawMessage) -> Result<()> {
        self.scratch.clear();
        self.encoder.encode(msg, &mut self.scratch);
        let wire_len = self.scratch.len() as u64;

        let deadline = self.write_timeout;
        let MessageSender {
            writer, scratch, ..
        } = self;
        timeout(deadline, async {
            writer.write_all(scratch).await?;
            writer.flush().await
        })
        .await
        .map_err(|_| Error::Timeout)??;

        self.stats.record_sent(wire_len);
        Ok(())
    }

    /// Encode and send a control or command message
    pub(crate) async fn send_message(
        &mut self,
        msg: &RtmpMessage,
        csid: u32,
        stream_id: u32,
    ) -> Result<()> {
        let (message_type, payload) = msg.encode();
        self.send_raw(&RawMessage {
            csid,
            timestamp: 0,
            message_type,
            stream_id,
            payload,
        })
        .await
    }

    fn set_chunk_size(&mut self, size: u32) {
        self.encoder.set_chunk_size(size);
    }
}

pub(crate) type SharedSender = Arc<tokio::sync::Mutex<MessageSender>>;

/// Live connection resources, owned by the main task
struct Connection {
    reader: BufReader<OwnedReadHalf>,
    read_buf: BytesMut,
    decoder: ChunkDecoder,
    sender: SharedSender,
    vars: SessionVars,
    read_timeout: Duration,
    stats: StatsHandle,
}

impl Connection {
    /// Read until the next command message arrives, dispatching protocol
    /// control messages along the way
    async fn next_command(&mut self) -> Result<Command> {
        loop {
            while let Some(raw) = self.decoder.decode(&mut self.read_buf)? {
                if let Some(cmd) = self.handle_message(RtmpMessage::from_raw(&raw)?).await? {
                    return Ok(cmd);
                }
            }

            self.fill_read_buf().await?;
        }
    }

    /// One socket read into the reassembly buffer, with ack accounting
    async fn fill_read_buf(&mut self) -> Result<()> {
        let n = timeout(self.read_timeout, self.reader.read_buf(&mut self.read_buf))
            .await
            .map_err(|_| Error::Timeout)??;
        if n == 0 {
            return Err(Error::ConnectionClosed);
        }
        self.note_received(n as u64).await
    }

    /// Account for received bytes and emit an Acknowledgement when the
    /// window fills
    async fn note_received(&mut self, n: u64) -> Result<()> {
        self.stats.record_received(n);
        self.vars.bytes_received += n;
        self.vars.bytes_since_ack += n;

        if self.vars.bytes_since_ack >= self.vars.window_ack_size as u64 {
            let sequence = self.vars.bytes_received as u32;
            self.vars.bytes_since_ack = 0;
            tracing::debug!(sequence, "sending acknowledgement");
            self.sender
                .lock()
                .await
                .send_message(
                    &RtmpMessage::Acknowledgement { sequence },
                    CSID_PROTOCOL_CONTROL,
                    0,
                )
                .await?;
        }
        Ok(())
    }

    /// Dispatch one inbound message
    ///
    /// Protocol control messages are handled here; command messages are
    /// returned to the caller, which knows what it is waiting for.
    async fn handle_message(&mut self, msg: RtmpMessage) -> Result<Option<Command>> {
        match msg {
            RtmpMessage::SetChunkSize(size) => {
                if size == 0 || size > MAX_CHUNK_SIZE {
                    return Err(ProtocolError::InvalidChunkSize(size).into());
                }
                tracing::info!(
                    old = self.decoder.chunk_size(),
                    new = size,
                    "server changed chunk size"
                );
                self.decoder.set_chunk_size(size);
                // Re-advertise our own chunk size, unchanged
                let ours = self.vars.out_chunk_size;
                self.sender
                    .lock()
                    .await
                    .send_message(
                        &RtmpMessage::SetChunkSize(ours),
                        CSID_PROTOCOL_CONTROL,
                        0,
                    )
                    .await?;
                Ok(None)
            }

            RtmpMessage::Acknowledgement { sequence } => {
                tracing::debug!(sequence, "server acknowledged");
                Ok(None)
            }

            RtmpMessage::WindowAckSize(size) => {
                tracing::info!(size, "window acknowledgement size");
                self.vars.window_ack_size = size;
                Ok(None)
            }

            RtmpMessage::SetPeerBandwidth { size, limit_type } => {
                tracing::debug!(size, limit_type, "set peer bandwidth");
                Ok(None)
            }

            RtmpMessage::UserControl(event) => {
                match event {
                    UserControlEvent::StreamBegin(id) => tracing::debug!(id, "stream begin"),
                    UserControlEvent::StreamEof(id) => tracing::debug!(id, "stream eof"),
                    UserControlEvent::StreamDry(id) => tracing::debug!(id, "stream dry"),
                    UserControlEvent::PingRequest(ts) => {
                        tracing::debug!(ts, "ping request");
                        self.sender
                            .lock()
                            .await
                            .send_message(
                                &RtmpMessage::UserControl(UserControlEvent::PingResponse(ts)),
                                CSID_PROTOCOL_CONTROL,
                                0,
                            )
                            .await?;
                    }
                    UserControlEvent::PingResponse(ts) => tracing::debug!(ts, "ping response"),
                    UserControlEvent::Unknown { event_type, .. } => {
                        tracing::debug!(event_type, "user control event")
                    }
                }
                Ok(None)
            }

            RtmpMessage::Command(cmd) => Ok(Some(cmd)),

            RtmpMessage::Abort { csid } => {
                tracing::debug!(csid, "abort message");
                Ok(None)
            }

            RtmpMessage::Unknown { type_id, data } => {
                tracing::debug!(type_id, len = data.len(), "ignoring message");
                Ok(None)
            }
        }
    }

    /// Handle a command that arrives while publishing
    fn handle_publish_command(&self, cmd: &Command) -> Result<()> {
        if cmd.name == CMD_ON_STATUS {
            if let Some(code) = cmd.status_code() {
                if code.contains("Error") {
                    return Err(Error::Publish(code.to_string()));
                }
                tracing::info!(code, "status while publishing");
            }
        } else {
            tracing::debug!(name = %cmd.name, "command while publishing");
        }
        Ok(())
    }

    /// Dispatch any messages already sitting in the reassembly buffer
    /// without touching the socket
    async fn drain_buffered(&mut self) -> Result<()> {
        while let Some(raw) = self.decoder.decode(&mut self.read_buf)? {
            if let Some(cmd) = self.handle_message(RtmpMessage::from_raw(&raw)?).await? {
                self.handle_publish_command(&cmd)?;
            }
        }
        Ok(())
    }

    /// Sleep until the pacing target while draining inbound messages
    ///
    /// The wait is capped at [`MAX_PACING_SLEEP`] in one call; a file with
    /// corrupt timestamps degrades to server-side throttling via TCP
    /// backpressure instead of stalling the loop.
    async fn pace_until(&mut self, target: Instant) -> Result<()> {
        let now = Instant::now();
        if now >= target {
            return self.drain_buffered().await;
        }

        let deadline = tokio::time::Instant::from_std(now + (target - now).min(MAX_PACING_SLEEP));

        loop {
            self.drain_buffered().await?;

            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => break,
                res = self.reader.read_buf(&mut self.read_buf) => {
                    let n = res?;
                    if n == 0 {
                        return Err(Error::ConnectionClosed);
                    }
                    self.note_received(n as u64).await?;
                }
            }
        }

        self.drain_buffered().await
    }

    /// Forward a media payload on its chunk stream
    async fn send_media(
        &mut self,
        message_type: u8,
        csid: u32,
        timestamp: u32,
        payload: Bytes,
    ) -> Result<()> {
        let stream_id = self.vars.server_stream_id;
        self.sender
            .lock()
            .await
            .send_raw(&RawMessage {
                csid,
                timestamp,
                message_type,
                stream_id,
                payload,
            })
            .await
    }
}

/// RTMP publishing client
///
/// Owns the socket and session variables from connect-attempt until
/// teardown. A session that hits Error is disposable; reconnect with
/// [`RtmpPublisher::connect`] or [`RtmpPublisher::connect_with_retry`].
pub struct RtmpPublisher {
    config: PublisherConfig,
    state: SharedState,
    stats: StatsHandle,
    url: Option<RtmpUrl>,
    conn: Option<Connection>,
    heartbeat: Option<Heartbeat>,
}

impl RtmpPublisher {
    /// Create a publisher with default configuration
    pub fn new() -> Self {
        Self::with_config(PublisherConfig::default())
    }

    /// Create a publisher with the given configuration
    pub fn with_config(config: PublisherConfig) -> Self {
        let stats = StatsHandle::new(config.enable_statistics);
        Self {
            config,
            state: SharedState::new(),
            stats,
            url: None,
            conn: None,
            heartbeat: None,
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// True while Connected or Publishing
    pub fn is_connected(&self) -> bool {
        matches!(
            self.state.get(),
            ConnectionState::Connected | ConnectionState::Publishing
        )
    }

    /// The last recorded error, if any
    pub fn last_error(&self) -> Option<String> {
        self.state.last_error()
    }

    /// Snapshot of the session statistics
    pub fn statistics(&self) -> Statistics {
        self.stats.snapshot()
    }

    /// Stream id assigned by the server, once createStream has completed
    pub fn server_stream_id(&self) -> Option<u32> {
        self.conn
            .as_ref()
            .map(|c| c.vars.server_stream_id)
            .filter(|id| *id != 0)
    }

    /// Connect, handshake and run the publish sequence
    ///
    /// On success the session is in Publishing state and media can be
    /// pushed. On failure the socket is released and the session is in
    /// Error state with the cause recorded.
    pub async fn connect(&mut self, url: &str) -> Result<()> {
        self.release().await;
        self.stats.reset();
        self.state.reset();

        match self.establish(url).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.conn = None;
                self.state.set_error(e.to_string());
                Err(e)
            }
        }
    }

    /// Connect with up to `max_retries + 1` total attempts
    ///
    /// Each failed attempt fully releases the socket and session variables
    /// before the next one.
    pub async fn connect_with_retry(&mut self, url: &str, max_retries: u32) -> Result<()> {
        let mut last_err = None;

        for attempt in 0..=max_retries {
            tracing::info!(
                attempt = attempt + 1,
                total = max_retries + 1,
                "connection attempt"
            );

            match self.connect(url).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(error = %e, "connection attempt failed");
                    last_err = Some(e);
                }
            }

            if attempt < max_retries {
                tokio::time::sleep(self.config.retry_interval).await;
            }
        }

        Err(last_err
            .unwrap_or_else(|| Error::Internal("connect_with_retry made no attempts".into())))
    }

    async fn establish(&mut self, url: &str) -> Result<()> {
        let url = RtmpUrl::parse(url)?;
        tracing::info!(
            host = %url.host,
            port = url.port,
            app = %url.app,
            stream = %url.stream_key,
            "connecting"
        );

        self.state.set(ConnectionState::Connecting);

        let socket = timeout(self.config.connect_timeout, TcpStream::connect(url.addr()))
            .await
            .map_err(|_| Error::Timeout)??;
        socket.set_nodelay(true)?;

        let (read_half, write_half) = socket.into_split();
        let mut reader = BufReader::with_capacity(64 * 1024, read_half);
        let mut writer = BufWriter::with_capacity(64 * 1024, write_half);

        self.state.set(ConnectionState::Handshaking);
        self.do_handshake(&mut reader, &mut writer).await?;
        self.state.set(ConnectionState::Connected);

        let sender = Arc::new(tokio::sync::Mutex::new(MessageSender {
            writer,
            encoder: ChunkEncoder::new(),
            scratch: BytesMut::with_capacity(8 * 1024),
            write_timeout: self.config.write_timeout,
            stats: self.stats.clone(),
        }));

        self.conn = Some(Connection {
            reader,
            read_buf: BytesMut::with_capacity(64 * 1024),
            decoder: ChunkDecoder::new(),
            sender,
            vars: SessionVars::default(),
            read_timeout: self.config.read_timeout,
            stats: self.stats.clone(),
        });
        self.url = Some(url);

        self.send_connect().await?;
        self.send_create_stream().await?;
        self.send_publish().await?;

        Ok(())
    }

    /// Simple handshake: C0C1 out, S0S1 in, C2 (= S1) out, S2 in
    async fn do_handshake(
        &self,
        reader: &mut BufReader<OwnedReadHalf>,
        writer: &mut BufWriter<OwnedWriteHalf>,
    ) -> Result<()> {
        let mut handshake = ClientHandshake::new();

        let c0c1 = handshake.c0c1()?;
        timeout(self.config.write_timeout, async {
            writer.write_all(&c0c1).await?;
            writer.flush().await
        })
        .await
        .map_err(|_| Error::Timeout)??;

        let mut s0s1 = vec![0u8; 1 + HANDSHAKE_SIZE];
        timeout(self.config.read_timeout, reader.read_exact(&mut s0s1))
            .await
            .map_err(|_| Error::Timeout)??;

        let c2 = handshake.on_s0s1(&s0s1)?;
        timeout(self.config.write_timeout, async {
            writer.write_all(&c2).await?;
            writer.flush().await
        })
        .await
        .map_err(|_| Error::Timeout)??;

        let mut s2 = vec![0u8; HANDSHAKE_SIZE];
        timeout(self.config.read_timeout, reader.read_exact(&mut s2))
            .await
            .map_err(|_| Error::Timeout)??;
        handshake.on_s2(&s2)?;

        tracing::debug!("handshake complete");
        Ok(())
    }

    /// `connect(app)` and its `_result`
    async fn send_connect(&mut self) -> Result<()> {
        let url = self.url.clone().ok_or_else(no_connection)?;
        let conn = self.conn.as_mut().ok_or_else(no_connection)?;
        let transaction_id = conn.vars.next_transaction();

        let cmd = Command {
            name: CMD_CONNECT.to_string(),
            transaction_id,
            command_object: AmfValue::Object(vec![
                ("app".to_string(), AmfValue::String(url.app.clone())),
                (
                    "type".to_string(),
                    AmfValue::String(CONNECT_TYPE_NONPRIVATE.into()),
                ),
                (
                    "flashVer".to_string(),
                    AmfValue::String(FLASH_VERSION.into()),
                ),
                ("tcUrl".to_string(), AmfValue::String(url.tc_url())),
            ]),
            arguments: vec![],
            stream_id: 0,
        };

        conn.sender
            .lock()
            .await
            .send_message(&RtmpMessage::Command(cmd), CSID_COMMAND, 0)
            .await?;

        loop {
            let response = conn.next_command().await?;
            match response.name.as_str() {
                CMD_RESULT if response.transaction_id == transaction_id => {
                    tracing::info!("connect accepted");
                    break;
                }
                CMD_ERROR => {
                    let code = response.status_code().unwrap_or("connect rejected");
                    return Err(Error::Publish(code.to_string()));
                }
                other => tracing::debug!(name = other, "command during connect"),
            }
        }

        // Switch to a larger outbound chunk size now that the server
        // accepted us; advertised first, applied second.
        conn.vars.out_chunk_size = RECOMMENDED_CHUNK_SIZE;
        let mut sender = conn.sender.lock().await;
        sender
            .send_message(
                &RtmpMessage::SetChunkSize(RECOMMENDED_CHUNK_SIZE),
                CSID_PROTOCOL_CONTROL,
                0,
            )
            .await?;
        sender.set_chunk_size(RECOMMENDED_CHUNK_SIZE);

        Ok(())
    }

    /// `createStream` and the `_result` carrying the stream id
    async fn send_create_stream(&mut self) -> Result<()> {
        let conn = self.conn.as_mut().ok_or_else(no_connection)?;
        let transaction_id = conn.vars.next_transaction();

        let cmd = Command::new(CMD_CREATE_STREAM, transaction_id);
        conn.sender
            .lock()
            .await
            .send_message(&RtmpMessage::Command(cmd), CSID_COMMAND, 0)
            .await?;

        loop {
            let response = conn.next_command().await?;
            match response.name.as_str() {
                CMD_RESULT if response.transaction_id == transaction_id => {
                    let stream_id = response
                        .arguments
                        .iter()
                        .find_map(|v| v.as_number())
                        .ok_or(ProtocolError::UnexpectedCommand(
                            "createStream result without stream id".into(),
                        ))?;
                    conn.vars.server_stream_id = stream_id as u32;
                    tracing::info!(stream_id = conn.vars.server_stream_id, "stream created");
                    return Ok(());
                }
                CMD_ERROR => {
                    let code = response.status_code().unwrap_or("createStream rejected");
                    return Err(Error::Publish(code.to_string()));
                }
                other => tracing::debug!(name = other, "command during createStream"),
            }
        }
    }

    /// `publish(stream_key, "live")` and the `onStatus` gate
    ///
    /// The session only advances to Publishing on
    /// `NetStream.Publish.Start`; any code containing "Error" is terminal.
    async fn send_publish(&mut self) -> Result<()> {
        let url = self.url.clone().ok_or_else(no_connection)?;
        let conn = self.conn.as_mut().ok_or_else(no_connection)?;
        let transaction_id = conn.vars.next_transaction();
        let stream_id = conn.vars.server_stream_id;

        let cmd = Command {
            name: CMD_PUBLISH.to_string(),
            transaction_id,
            command_object: AmfValue::Null,
            arguments: vec![
                AmfValue::String(url.stream_key.clone()),
                AmfValue::String(PUBLISH_MODE_LIVE.into()),
            ],
            stream_id,
        };

        conn.sender
            .lock()
            .await
            .send_message(&RtmpMessage::Command(cmd), CSID_COMMAND, stream_id)
            .await?;

        loop {
            let response = conn.next_command().await?;
            match response.name.as_str() {
                CMD_ON_STATUS => {
                    let code = response.status_code().unwrap_or("");
                    if code == NS_PUBLISH_START {
                        tracing::info!(code, "publish started");
                        self.state.set(ConnectionState::Publishing);
                        return Ok(());
                    }
                    if code.contains("Error") {
                        return Err(Error::Publish(code.to_string()));
                    }
                    tracing::debug!(code, "status during publish setup");
                }
                CMD_ERROR => {
                    let code = response.status_code().unwrap_or("publish rejected");
                    return Err(Error::Publish(code.to_string()));
                }
                other => tracing::debug!(name = other, "command during publish"),
            }
        }
    }

    /// Push an FLV file to the server in real time
    pub async fn publish_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let file = tokio::fs::File::open(path.as_ref()).await?;
        self.publish_stream(tokio::io::BufReader::new(file)).await
    }

    /// Push FLV data from any byte source to the server in real time
    ///
    /// Tags are paced against the wall clock relative to the first tag's
    /// timestamp. Returns once the source is exhausted.
    pub async fn publish_stream<R>(&mut self, source: R) -> Result<()>
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        if self.state.get() != ConnectionState::Publishing {
            return Err(Error::Internal(
                "publish_stream called before publish handshake completed".into(),
            ));
        }

        let mut flv = FlvReader::new(source);
        match self.run_publish_loop(&mut flv).await {
            Ok(()) => {
                tracing::info!("flv push complete");
                Ok(())
            }
            Err(e) => {
                self.state.set_error(e.to_string());
                Err(e)
            }
        }
    }

    async fn run_publish_loop<R>(&mut self, flv: &mut FlvReader<R>) -> Result<()>
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        let conn = self.conn.as_mut().ok_or_else(no_connection)?;

        let mut base_timestamp: Option<u32> = None;
        let wall_start = Instant::now();

        while let Some(tag) = flv.next_tag().await? {
            let (message_type, csid) = match tag.tag_type {
                FlvTagType::Audio => (MSG_AUDIO, CSID_AUDIO),
                FlvTagType::Video => (MSG_VIDEO, CSID_VIDEO),
                FlvTagType::Script => (MSG_DATA_AMF0, CSID_METADATA),
                FlvTagType::Other(t) => {
                    tracing::debug!(tag_type = t, "skipping unknown tag");
                    self.stats.record_tag(tag.tag_type);
                    continue;
                }
            };

            let base = *base_timestamp.get_or_insert(tag.timestamp);
            let relative = tag.timestamp.wrapping_sub(base);

            let target = wall_start + Duration::from_millis(relative as u64);
            conn.pace_until(target).await?;

            conn.send_media(message_type, csid, relative, tag.payload)
                .await?;
            self.stats.record_tag(tag.tag_type);
        }

        Ok(())
    }

    /// Start the heartbeat task if enabled and connected
    pub fn start_heartbeat(&mut self) {
        if !self.config.enable_heartbeat || self.heartbeat.is_some() {
            return;
        }

        let Some(conn) = &self.conn else {
            tracing::warn!("start_heartbeat without a connection");
            return;
        };

        self.heartbeat = Some(Heartbeat::spawn(
            Arc::clone(&conn.sender),
            self.state.clone(),
            self.config.heartbeat_interval,
        ));
    }

    /// Stop and join the heartbeat task
    pub async fn stop_heartbeat(&mut self) {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.stop().await;
        }
    }

    /// Tear down the session: stop the heartbeat, close the socket and
    /// return to Disconnected
    pub async fn disconnect(&mut self) {
        self.release().await;
        self.state.reset();
        tracing::info!("disconnected");
    }

    /// Drop connection resources; the heartbeat is joined before the
    /// socket closes
    async fn release(&mut self) {
        self.stop_heartbeat().await;
        self.conn = None;
        self.url = None;
    }
}

impl Default for RtmpPublisher {
    fn default() -> Self {
        Self::new()
    }
}

fn no_connection() -> Error {
    Error::Internal("no active connection".into())
}
