use pretty_assertions::assert_eq;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use my1690_core::channel::{BusyLine, Channel};
use my1690_core::dialect::DeviceDialect;
use my1690_core::error::ProtocolError;
use my1690_core::session::{ConnectionState, Session, SessionConfig, VOLUME_MAX};

/// Shared state behind the mock channel, inspectable after the session
/// takes ownership of the channel itself.
#[derive(Default)]
struct MockInner {
    /// One scripted reply per transmitted frame, in order. An empty entry
    /// stands for a command the firmware does not answer.
    replies: VecDeque<Vec<u8>>,
    /// Every frame the session transmitted
    sent: Vec<Vec<u8>>,
    /// Bytes currently available to read
    read_buf: Vec<u8>,
    read_pos: usize,
}

/// Mock channel for testing. Each transmitted frame loads the next
/// scripted reply into the read buffer, replacing whatever stale bytes a
/// previous exchange left behind (the session drains those first).
#[derive(Clone)]
struct MockChannel(Arc<Mutex<MockInner>>);

impl MockChannel {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(MockInner::default())))
    }

    fn push_reply(&self, reply: &[u8]) {
        self.0.lock().unwrap().replies.push_back(reply.to_vec());
    }

    fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.0.lock().unwrap().sent.clone()
    }

    fn last_sent(&self) -> Vec<u8> {
        self.0.lock().unwrap().sent.last().cloned().unwrap_or_default()
    }
}

impl Read for MockChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inner = self.0.lock().unwrap();
        let available = inner.read_buf.len() - inner.read_pos;
        if available == 0 || buf.is_empty() {
            return Ok(0);
        }
        let n = available.min(buf.len());
        let start = inner.read_pos;
        buf[..n].copy_from_slice(&inner.read_buf[start..start + n]);
        inner.read_pos += n;
        Ok(n)
    }
}

impl Write for MockChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.0.lock().unwrap();
        inner.sent.push(buf.to_vec());
        inner.read_buf = inner.replies.pop_front().unwrap_or_default();
        inner.read_pos = 0;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Channel for MockChannel {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        let inner = self.0.lock().unwrap();
        Ok((inner.read_buf.len() - inner.read_pos) as u32)
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        let mut inner = self.0.lock().unwrap();
        inner.read_buf.clear();
        inner.read_pos = 0;
        Ok(())
    }
}

/// Busy line stub backed by a shared flag so tests can flip the level
/// after the session takes ownership of its copy.
#[derive(Clone)]
struct StubBusyLine(Arc<AtomicBool>);

impl StubBusyLine {
    fn new(high: bool) -> Self {
        Self(Arc::new(AtomicBool::new(high)))
    }

    fn set_high(&self, high: bool) {
        self.0.store(high, Ordering::SeqCst);
    }
}

impl BusyLine for StubBusyLine {
    fn is_high(&mut self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Config with timeouts shrunk so starved reads fail in milliseconds.
fn test_config() -> SessionConfig {
    SessionConfig {
        response_timeout_ticks: 3,
        probe_attempts: 2,
        probe_interval_ms: 1,
        ..SessionConfig::default()
    }
}

/// A connected session talking to legacy firmware. The probe never
/// matches a version literal, so the generic decode of `OK0001\r\n`
/// identifies the device; the post-connect stop then polls status (idle)
/// and gets its ack.
fn legacy_session() -> (Session, MockChannel) {
    let mock = MockChannel::new();
    for _ in 0..5 {
        mock.push_reply(b"OK0001\r\n");
    }
    mock.push_reply(b"OK0000\r\n");
    mock.push_reply(b"OK");

    let mut session = Session::new(test_config());
    session
        .connect_channel(Box::new(mock.clone()))
        .expect("legacy connect");
    (session, mock)
}

/// A connected session talking to revised 1.1 firmware: the first version
/// literal matches, and the startup status poll reports idle.
fn revised_session() -> (Session, MockChannel) {
    let mock = MockChannel::new();
    mock.push_reply(b"OK1.1\r\n");
    mock.push_reply(b"0000\n");

    let mut session = Session::new(test_config());
    session
        .connect_channel(Box::new(mock.clone()))
        .expect("revised connect");
    (session, mock)
}

#[test]
fn test_connect_resolves_legacy_dialect() {
    let (session, mock) = legacy_session();
    assert_eq!(session.state(), ConnectionState::Connected);
    assert_eq!(session.dialect(), Some(DeviceDialect::Legacy));
    assert_eq!(session.firmware_version(), Some(1));

    // 5 version probes, 1 status poll, 1 stop
    let frames = mock.sent_frames();
    assert_eq!(frames.len(), 7);
    assert_eq!(frames[0], vec![0x7E, 0x03, 0x24, 0x27, 0xEF]);
    assert_eq!(frames[6], vec![0x7E, 0x03, 0x1E, 0x1D, 0xEF]);
}

#[test]
fn test_connect_resolves_revised_dialect() {
    let (session, mock) = revised_session();
    assert_eq!(session.state(), ConnectionState::Connected);
    assert_eq!(session.dialect(), Some(DeviceDialect::Revised));
    assert_eq!(session.firmware_version(), Some(101));

    // 1 version probe, 1 status poll, no stop while idle
    assert_eq!(mock.sent_frames().len(), 2);
}

#[test]
fn test_connect_matches_bare_revised_literal() {
    // `1.0\r\n` misses the first three candidates and matches the fourth.
    let mock = MockChannel::new();
    for _ in 0..4 {
        mock.push_reply(b"1.0\r\n");
    }
    mock.push_reply(b"0000\n");

    let mut session = Session::new(test_config());
    session
        .connect_channel(Box::new(mock.clone()))
        .expect("bare literal connect");
    assert_eq!(session.dialect(), Some(DeviceDialect::Revised));
    assert_eq!(session.firmware_version(), Some(100));
}

#[test]
fn test_connect_fails_when_player_is_silent() {
    let mock = MockChannel::new();
    let mut session = Session::new(test_config());
    let result = session.connect_channel(Box::new(mock));
    assert!(matches!(result, Err(ProtocolError::ConnectionFailed(_))));
    assert_eq!(session.state(), ConnectionState::Error);
    assert!(session.dialect().is_none());
}

#[test]
fn test_connect_twice_is_rejected() {
    let (mut session, _mock) = legacy_session();
    let other = MockChannel::new();
    let result = session.connect_channel(Box::new(other));
    assert!(matches!(result, Err(ProtocolError::AlreadyConnected)));
    assert_eq!(session.state(), ConnectionState::Connected);
}

#[test]
fn test_disconnect_resets_session() {
    let (mut session, _mock) = legacy_session();
    session.disconnect();
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(session.dialect().is_none());
    assert!(matches!(session.play(), Err(ProtocolError::NotConnected)));
}

#[test]
fn test_play_frame_and_ack() {
    let (mut session, mock) = legacy_session();
    mock.push_reply(b"OK");
    assert!(session.play().unwrap());
    assert_eq!(mock.last_sent(), vec![0x7E, 0x03, 0x11, 0x12, 0xEF]);
}

#[test]
fn test_play_is_unacknowledged_on_revised_firmware() {
    let (mut session, mock) = revised_session();
    mock.push_reply(b"");
    assert!(session.play().unwrap());
    assert_eq!(mock.last_sent(), vec![0x7E, 0x03, 0x11, 0x12, 0xEF]);
}

#[test]
fn test_missing_ack_reports_failure() {
    let (mut session, mock) = legacy_session();
    mock.push_reply(b"");
    assert!(!session.pause().unwrap());
}

#[test]
fn test_play_track_encodes_big_endian_number() {
    let (mut session, mock) = legacy_session();
    mock.push_reply(b"OK");
    assert!(session.play_track(5).unwrap());
    assert_eq!(
        mock.last_sent(),
        vec![0x7E, 0x05, 0x41, 0x00, 0x05, 0x41, 0xEF]
    );
}

#[test]
fn test_get_song_count_decodes_legacy_reply() {
    let (mut session, mock) = legacy_session();
    mock.push_reply(b"OK000d\r\n");
    assert_eq!(session.get_song_count().unwrap(), 13);
}

#[test]
fn test_get_version_uses_short_field_on_revised_firmware() {
    let (mut session, mock) = revised_session();
    mock.push_reply(b"OK00A \n");
    assert_eq!(session.get_version().unwrap(), 10);
}

#[test]
fn test_get_volume_keeps_low_byte() {
    let (mut session, mock) = legacy_session();
    mock.push_reply(b"OK011e\r\n");
    assert_eq!(session.get_volume().unwrap(), 30);
}

#[test]
fn test_set_volume_clamps_to_maximum() {
    let (mut session, mock) = legacy_session();
    mock.push_reply(b"OK");
    assert!(session.set_volume(99).unwrap());
    // payload is the clamped level
    assert_eq!(
        mock.last_sent(),
        vec![0x7E, 0x04, 0x31, VOLUME_MAX, 0x2B, 0xEF]
    );
}

#[test]
fn test_set_volume_verifies_by_readback_on_revised_firmware() {
    let (mut session, mock) = revised_session();
    mock.push_reply(b""); // set-volume goes unanswered
    mock.push_reply(b"OK001E \n"); // readback reports 30
    assert!(session.set_volume(30).unwrap());
}

#[test]
fn test_set_volume_readback_mismatch_reports_failure() {
    let (mut session, mock) = revised_session();
    mock.push_reply(b"");
    mock.push_reply(b"OK000A \n"); // player stuck at 10
    assert!(!session.set_volume(30).unwrap());
}

#[test]
fn test_stop_waits_for_delayed_confirmation_while_playing() {
    let (mut session, mock) = legacy_session();
    mock.push_reply(b"OK0001\r\n"); // status: playing
    mock.push_reply(b"OKSTOP"); // ack plus the delayed confirmation
    assert!(session.stop().unwrap());
}

#[test]
fn test_stop_skips_confirmation_while_idle() {
    let (mut session, mock) = legacy_session();
    mock.push_reply(b"OK0000\r\n"); // status: idle
    mock.push_reply(b"OK");
    assert!(session.stop().unwrap());
}

#[test]
fn test_stop_repolls_status_on_revised_firmware() {
    let (mut session, mock) = revised_session();
    mock.push_reply(b""); // stop goes unanswered
    mock.push_reply(b"0000\n"); // status settles to idle
    assert!(session.stop().unwrap());
}

#[test]
fn test_query_timeout_degrades_to_zero() {
    let (mut session, mock) = legacy_session();
    mock.push_reply(b"");
    assert_eq!(session.get_status().unwrap(), 0);
}

#[test]
fn test_is_connected_checks_live_version() {
    let (mut session, mock) = legacy_session();
    mock.push_reply(b"OK0001\r\n");
    assert!(session.is_connected().unwrap());

    mock.push_reply(b"OK0000\r\n");
    assert!(!session.is_connected().unwrap());
}

#[test]
fn test_stale_bytes_are_drained_before_transmit() {
    let (mut session, mock) = legacy_session();
    // A timed-out exchange leaves a full reply behind; the next command
    // must not read it as its own answer.
    mock.push_reply(b"");
    assert_eq!(session.get_status().unwrap(), 0);
    {
        let mut inner = mock.0.lock().unwrap();
        inner.read_buf = b"OK0063\r\n".to_vec();
        inner.read_pos = 0;
    }
    mock.push_reply(b"OK0002\r\n");
    assert_eq!(session.get_current_track().unwrap(), 2);
}

#[test]
fn test_busy_line_substitutes_for_status_query() {
    // A high line at connect means a track survived the power cycle; the
    // revised startup path must stop it without ever sending the status
    // opcode.
    let mock = MockChannel::new();
    mock.push_reply(b"OK1.1\r\n");
    mock.push_reply(b""); // stop goes unanswered

    let line = StubBusyLine::new(true);
    let mut session = Session::with_busy_line(test_config(), Box::new(line.clone()));
    session
        .connect_channel(Box::new(mock.clone()))
        .expect("busy line connect");

    let frames = mock.sent_frames();
    assert_eq!(frames.len(), 2); // version exchange, then stop
    assert_eq!(frames[1], vec![0x7E, 0x03, 0x1E, 0x1D, 0xEF]);
    assert!(frames.iter().all(|f| f[2] != 0x20));

    line.set_high(false);
    assert!(!session.is_playing().unwrap());
    // Still no status frame on the wire.
    assert_eq!(mock.sent_frames().len(), 2);
}

#[test]
fn test_busy_line_low_skips_startup_stop() {
    let mock = MockChannel::new();
    mock.push_reply(b"OK1.1\r\n");

    let mut session =
        Session::with_busy_line(test_config(), Box::new(StubBusyLine::new(false)));
    session
        .connect_channel(Box::new(mock.clone()))
        .expect("idle connect");

    assert_eq!(session.dialect(), Some(DeviceDialect::Revised));
    assert_eq!(mock.sent_frames().len(), 1); // just the version exchange
    assert!(!session.is_playing().unwrap());
}

#[test]
fn test_set_volume_clamps_and_verifies_on_revised_firmware() {
    let (mut session, mock) = revised_session();
    mock.push_reply(b""); // set-volume goes unanswered
    mock.push_reply(b"OK001E \n"); // readback reports the clamped level
    assert!(session.set_volume(35).unwrap());

    let frames = mock.sent_frames();
    // The transmitted level is the clamp, not the request.
    assert_eq!(
        frames[frames.len() - 2],
        vec![0x7E, 0x04, 0x31, VOLUME_MAX, 0x2B, 0xEF]
    );
}
