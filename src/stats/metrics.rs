//! Publish session statistics
//!
//! Counters are updated from both the publish loop and the receive
//! dispatcher, so they live behind their own lock, held only for the
//! duration of a numeric update and never across I/O.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::media::FlvTagType;

/// Snapshot of publish session statistics
#[derive(Debug, Clone, Copy)]
pub struct Statistics {
    /// Total bytes written to the socket
    pub bytes_sent: u64,
    /// Total bytes read from the socket
    pub bytes_received: u64,
    /// Messages sent
    pub packets_sent: u64,
    /// Messages received
    pub packets_received: u64,
    /// Audio tags forwarded
    pub audio_frames: u64,
    /// Video tags forwarded
    pub video_frames: u64,
    /// Tags dropped (skipped tag types)
    pub dropped_frames: u64,
    /// Bitrate over the most recent one-second window (bits/sec)
    pub current_bitrate: u32,
    /// Lifetime average bitrate (bits/sec)
    pub avg_bitrate: u32,
    /// When the session started
    pub start_time: Instant,
    /// Last counter update
    pub last_update: Instant,
}

impl Statistics {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            bytes_sent: 0,
            bytes_received: 0,
            packets_sent: 0,
            packets_received: 0,
            audio_frames: 0,
            video_frames: 0,
            dropped_frames: 0,
            current_bitrate: 0,
            avg_bitrate: 0,
            start_time: now,
            last_update: now,
        }
    }

    /// Duration since the session started
    pub fn runtime(&self) -> Duration {
        self.last_update.duration_since(self.start_time)
    }
}

struct StatsInner {
    enabled: bool,
    stats: Statistics,
    /// Start of the rolling bitrate window
    window_start: Instant,
    /// Bytes sent within the current window
    window_bytes: u64,
}

/// Shared, thread-safe statistics handle
#[derive(Clone)]
pub struct StatsHandle {
    inner: Arc<Mutex<StatsInner>>,
}

impl StatsHandle {
    /// Create a handle; a disabled handle turns every update into a no-op
    pub fn new(enabled: bool) -> Self {
        let now = Instant::now();
        Self {
            inner: Arc::new(Mutex::new(StatsInner {
                enabled,
                stats: Statistics::new(),
                window_start: now,
                window_bytes: 0,
            })),
        }
    }

    /// Reset all counters (called when a fresh connection attempt starts)
    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("stats lock poisoned");
        inner.stats = Statistics::new();
        inner.window_start = Instant::now();
        inner.window_bytes = 0;
    }

    /// Record an outbound message of `bytes` wire bytes
    pub fn record_sent(&self, bytes: u64) {
        let mut inner = self.inner.lock().expect("stats lock poisoned");
        if !inner.enabled {
            return;
        }

        inner.stats.bytes_sent += bytes;
        inner.stats.packets_sent += 1;
        inner.window_bytes += bytes;

        let now = Instant::now();
        inner.stats.last_update = now;

        let window = now.duration_since(inner.window_start);
        if window >= Duration::from_secs(1) {
            inner.stats.current_bitrate =
                ((inner.window_bytes * 8) as f64 / window.as_secs_f64()) as u32;

            let runtime = now.duration_since(inner.stats.start_time).as_secs();
            if runtime > 0 {
                inner.stats.avg_bitrate = (inner.stats.bytes_sent * 8 / runtime) as u32;
            }

            inner.window_start = now;
            inner.window_bytes = 0;
        }
    }

    /// Record inbound wire bytes
    pub fn record_received(&self, bytes: u64) {
        let mut inner = self.inner.lock().expect("stats lock poisoned");
        if !inner.enabled {
            return;
        }
        inner.stats.bytes_received += bytes;
        inner.stats.packets_received += 1;
        inner.stats.last_update = Instant::now();
    }

    /// Record a forwarded or skipped FLV tag
    pub fn record_tag(&self, tag_type: FlvTagType) {
        let mut inner = self.inner.lock().expect("stats lock poisoned");
        if !inner.enabled {
            return;
        }
        match tag_type {
            FlvTagType::Audio => inner.stats.audio_frames += 1,
            FlvTagType::Video => inner.stats.video_frames += 1,
            FlvTagType::Script => {}
            FlvTagType::Other(_) => inner.stats.dropped_frames += 1,
        }
        inner.stats.last_update = Instant::now();
    }

    /// Atomic snapshot of the counters
    pub fn snapshot(&self) -> Statistics {
        self.inner.lock().expect("stats lock poisoned").stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = StatsHandle::new(true);

        stats.record_sent(100);
        stats.record_sent(250);
        stats.record_received(64);
        stats.record_tag(FlvTagType::Audio);
        stats.record_tag(FlvTagType::Video);
        stats.record_tag(FlvTagType::Video);
        stats.record_tag(FlvTagType::Other(11));

        let snap = stats.snapshot();
        assert_eq!(snap.bytes_sent, 350);
        assert_eq!(snap.packets_sent, 2);
        assert_eq!(snap.bytes_received, 64);
        assert_eq!(snap.packets_received, 1);
        assert_eq!(snap.audio_frames, 1);
        assert_eq!(snap.video_frames, 2);
        assert_eq!(snap.dropped_frames, 1);
    }

    #[test]
    fn test_disabled_handle_is_noop() {
        let stats = StatsHandle::new(false);

        stats.record_sent(100);
        stats.record_received(100);
        stats.record_tag(FlvTagType::Audio);

        let snap = stats.snapshot();
        assert_eq!(snap.bytes_sent, 0);
        assert_eq!(snap.bytes_received, 0);
        assert_eq!(snap.audio_frames, 0);
    }

    #[test]
    fn test_reset_clears_counters() {
        let stats = StatsHandle::new(true);
        stats.record_sent(500);
        stats.reset();

        let snap = stats.snapshot();
        assert_eq!(snap.bytes_sent, 0);
        assert_eq!(snap.packets_sent, 0);
    }

    #[test]
    fn test_snapshot_is_independent_copy() {
        let stats = StatsHandle::new(true);
        stats.record_sent(10);
        let snap = stats.snapshot();
        stats.record_sent(10);
        assert_eq!(snap.bytes_sent, 10);
        assert_eq!(stats.snapshot().bytes_sent, 20);
    }
}
