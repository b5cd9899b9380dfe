//! Transport Protocol Engine: BAM and RTS/CTS multi-packet assembly.
//!
//! Sessions are keyed by the full `(sa, da, pgn)` triple. A send to
//! `da == 0xFF` always uses BAM; any other destination uses RTS/CTS
//! regardless of payload length.

use std::collections::HashMap;

use crate::error::{J1939Error, Result};

/// TP.CM control byte values.
pub mod control {
    /// Broadcast Announce Message.
    pub const BAM: u8 = 32;
    /// Request To Send.
    pub const RTS: u8 = 16;
    /// Clear To Send.
    pub const CTS: u8 = 17;
    /// End Of Message Acknowledge.
    pub const EOM: u8 = 19;
    /// Abort.
    pub const ABORT: u8 = 255;
}

/// Bytes of payload carried per TP.DT frame.
pub const BYTES_PER_PACKET: usize = 7;
/// Largest payload the Transport Protocol can carry (255 packets * 7 bytes).
pub const MAX_MESSAGE_LEN: usize = 1785;
/// Inactivity timeout for any open session.
pub const INACTIVITY_TIMEOUT_MS: u64 = 1250;
/// Maximum time a sender waits for CTS after RTS before the session dies.
pub const CTS_WAIT_TIMEOUT_MS: u64 = 500;

/// Lifecycle state of a transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpSessionState {
    /// Sender has issued RTS and is waiting for the destination's CTS.
    WaitingCts,
    /// Packets are actively being exchanged.
    Transferring,
    /// Assembly finished and the session has been torn down.
    Complete,
    /// The session was aborted or replaced.
    Aborted,
}

/// Session key: `(source address, destination address, PGN)`. BAM sessions
/// always use `da == 0xFF`.
pub type SessionKey = (u8, u8, u32);

fn pgn_bytes(pgn: u32) -> [u8; 3] {
    [
        (pgn & 0xFF) as u8,
        ((pgn >> 8) & 0xFF) as u8,
        ((pgn >> 16) & 0xFF) as u8,
    ]
}

fn pgn_from_bytes(b0: u8, b1: u8, b2: u8) -> u32 {
    b0 as u32 | (b1 as u32) << 8 | (b2 as u32) << 16
}

/// Split a payload into 7-byte chunks, padding the final chunk with `0xFF`.
fn split_packets(data: &[u8]) -> Vec<[u8; 7]> {
    data.chunks(BYTES_PER_PACKET)
        .map(|chunk| {
            let mut packet = [0xFFu8; 7];
            packet[..chunk.len()].copy_from_slice(chunk);
            packet
        })
        .collect()
}

fn packet_count(len: usize) -> u8 {
    len.div_ceil(BYTES_PER_PACKET) as u8
}

/// Build a TP.CM-BAM connection-management frame.
pub fn build_bam_cm(len: u16, num_packets: u8, pgn: u32) -> [u8; 8] {
    let [p0, p1, p2] = pgn_bytes(pgn);
    let lb = len.to_le_bytes();
    [control::BAM, lb[0], lb[1], num_packets, 0xFF, p0, p1, p2]
}

/// Build a TP.CM-RTS connection-management frame.
pub fn build_rts_cm(len: u16, num_packets: u8, pgn: u32) -> [u8; 8] {
    let [p0, p1, p2] = pgn_bytes(pgn);
    let lb = len.to_le_bytes();
    [control::RTS, lb[0], lb[1], num_packets, 0xFF, p0, p1, p2]
}

/// Build a TP.CM-CTS connection-management frame requesting
/// `num_packets` packets starting at `next_packet` (1-based).
pub fn build_cts_cm(next_packet: u8, num_packets: u8, pgn: u32) -> [u8; 8] {
    let [p0, p1, p2] = pgn_bytes(pgn);
    [control::CTS, num_packets, next_packet, 0xFF, 0xFF, p0, p1, p2]
}

/// Build a TP.CM-EOM (End of Message Acknowledge) frame.
pub fn build_eom_cm(len: u16, num_packets: u8, pgn: u32) -> [u8; 8] {
    let [p0, p1, p2] = pgn_bytes(pgn);
    let lb = len.to_le_bytes();
    [control::EOM, lb[0], lb[1], num_packets, 0xFF, p0, p1, p2]
}

/// Build a TP.CM-ABORT frame.
pub fn build_abort_cm(pgn: u32) -> [u8; 8] {
    let [p0, p1, p2] = pgn_bytes(pgn);
    [control::ABORT, 0xFF, 0xFF, 0xFF, 0xFF, p0, p1, p2]
}

/// Build a TP.DT data-transfer frame for 1-based sequence number `seq`.
pub fn build_dt(seq: u8, chunk: &[u8; 7]) -> [u8; 8] {
    let mut frame = [0u8; 8];
    frame[0] = seq;
    frame[1..8].copy_from_slice(chunk);
    frame
}

/// Result of attaching a TP.DT packet to a reassembly session.
#[derive(Debug, Clone)]
pub enum TpOutcome {
    /// The session is still collecting packets.
    Pending,
    /// Assembly is complete. `reply` carries a frame the caller must emit
    /// (an EOM for RTS/CTS; `None` for BAM, which has no end-of-message ack).
    Complete {
        /// Reassembled message bytes, truncated to the announced length.
        data: Vec<u8>,
        /// Frame to send in reply, if any.
        reply: Option<[u8; 8]>,
    },
}

struct RxSession {
    total_bytes: usize,
    total_packets: u8,
    buffer: Vec<u8>,
    received: Vec<bool>,
    received_count: u8,
    window: Option<(u8, u8)>,
    state: TpSessionState,
    started_at_ms: u64,
    last_activity_ms: u64,
}

struct TxSession {
    packets: Vec<[u8; 7]>,
    total_bytes: usize,
    state: TpSessionState,
    started_at_ms: u64,
    last_activity_ms: u64,
}

/// Introspection snapshot returned by [`TransportEngine::status`].
#[derive(Debug, Clone, Default)]
pub struct TpStatus {
    /// Number of open inbound (reassembly) sessions.
    pub rx_sessions: usize,
    /// Number of open outbound (send/CTS-wait) sessions.
    pub tx_sessions: usize,
}

/// The Transport Protocol Engine: tracks every open BAM/RTS/CTS session
/// and turns incoming TP.CM/TP.DT frames into reassembled messages.
#[derive(Default)]
pub struct TransportEngine {
    rx: HashMap<SessionKey, RxSession>,
    tx: HashMap<SessionKey, TxSession>,
}

impl TransportEngine {
    /// Construct an engine with no open sessions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin an outbound BAM send: returns the CM frame and every DT frame
    /// to emit, paced at least 50 ms apart by the caller (the J1939 Port,
    /// driven by the scheduler). BAM has no flow control, so no session is
    /// retained for the send side.
    pub fn start_bam(&self, pgn: u32, data: &[u8]) -> Result<([u8; 8], Vec<[u8; 8]>)> {
        if data.len() > MAX_MESSAGE_LEN {
            return Err(J1939Error::PayloadTooLarge { len: data.len() });
        }
        let num_packets = packet_count(data.len());
        let cm = build_bam_cm(data.len() as u16, num_packets, pgn);
        let dt_frames = split_packets(data)
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| build_dt((i + 1) as u8, &chunk))
            .collect();
        Ok((cm, dt_frames))
    }

    /// Handle an inbound TP.CM-BAM announcement: opens (or replaces) the
    /// reassembly session keyed `(sa, 0xFF, pgn)`.
    pub fn handle_bam_announcement(
        &mut self,
        sa: u8,
        pgn: u32,
        total_bytes: u16,
        total_packets: u8,
        now_ms: u64,
    ) {
        let key = (sa, 0xFF, pgn);
        self.rx.insert(
            key,
            RxSession {
                total_bytes: total_bytes as usize,
                total_packets,
                buffer: vec![0xFFu8; total_packets as usize * BYTES_PER_PACKET],
                received: vec![false; total_packets as usize],
                received_count: 0,
                window: None,
                state: TpSessionState::Transferring,
                started_at_ms: now_ms,
                last_activity_ms: now_ms,
            },
        );
    }

    /// Attach an inbound BAM TP.DT packet. `seq` is 1-based.
    pub fn add_bam_packet(
        &mut self,
        sa: u8,
        pgn: u32,
        seq: u8,
        chunk: &[u8; 7],
        now_ms: u64,
    ) -> Result<TpOutcome> {
        self.add_packet((sa, 0xFF, pgn), seq, chunk, now_ms, None)
    }

    /// Begin an outbound RTS/CTS send: returns the RTS frame to emit and
    /// opens a `WaitingCts` session. The caller must not emit any DT frames
    /// until [`process_cts`](Self::process_cts) says to.
    pub fn start_rts(&mut self, sa: u8, da: u8, pgn: u32, data: &[u8], now_ms: u64) -> Result<[u8; 8]> {
        if data.len() > MAX_MESSAGE_LEN {
            return Err(J1939Error::PayloadTooLarge { len: data.len() });
        }
        let num_packets = packet_count(data.len());
        let key = (sa, da, pgn);
        self.tx.insert(
            key,
            TxSession {
                packets: split_packets(data),
                total_bytes: data.len(),
                state: TpSessionState::WaitingCts,
                started_at_ms: now_ms,
                last_activity_ms: now_ms,
            },
        );
        Ok(build_rts_cm(data.len() as u16, num_packets, pgn))
    }

    /// Sender-side: a CTS arrived for session `(sa, da, pgn)`, granting the
    /// window `[next_packet, next_packet + num_packets)`. Returns the DT
    /// frames in that window to emit now.
    pub fn process_cts(
        &mut self,
        sa: u8,
        da: u8,
        pgn: u32,
        next_packet: u8,
        num_packets: u8,
        now_ms: u64,
    ) -> Result<Vec<[u8; 8]>> {
        let key = (sa, da, pgn);
        let session = self
            .tx
            .get_mut(&key)
            .ok_or_else(|| J1939Error::tp_violation(format!("CTS for unknown session {key:?}")))?;

        session.state = TpSessionState::Transferring;
        session.last_activity_ms = now_ms;

        let start = next_packet.saturating_sub(1) as usize;
        let end = (start + num_packets as usize).min(session.packets.len());
        let frames = session.packets[start..end]
            .iter()
            .enumerate()
            .map(|(i, chunk)| build_dt((start + i + 1) as u8, chunk))
            .collect();
        Ok(frames)
    }

    /// Sender-side: an EOM arrived, confirming the destination received
    /// every packet. Tears down the tx session.
    pub fn complete_rts(&mut self, sa: u8, da: u8, pgn: u32) {
        if let Some(session) = self.tx.get_mut(&(sa, da, pgn)) {
            session.state = TpSessionState::Complete;
        }
        self.tx.remove(&(sa, da, pgn));
    }

    /// Receiver-side: an RTS arrived addressed to us. Opens a reassembly
    /// session and returns the CTS frame to send back. Grants the full
    /// remaining window by default; pass `window_size` to request a
    /// smaller one (used to exercise partial-window behavior).
    pub fn accept_rts(
        &mut self,
        sa: u8,
        da: u8,
        pgn: u32,
        total_bytes: u16,
        total_packets: u8,
        window_size: Option<u8>,
        now_ms: u64,
    ) -> [u8; 8] {
        let key = (sa, da, pgn);
        let granted = window_size.unwrap_or(total_packets).min(total_packets);
        self.rx.insert(
            key,
            RxSession {
                total_bytes: total_bytes as usize,
                total_packets,
                buffer: vec![0xFFu8; total_packets as usize * BYTES_PER_PACKET],
                received: vec![false; total_packets as usize],
                received_count: 0,
                window: Some((1, granted)),
                state: TpSessionState::Transferring,
                started_at_ms: now_ms,
                last_activity_ms: now_ms,
            },
        );
        build_cts_cm(1, granted, pgn)
    }

    /// Attach an inbound RTS/CTS TP.DT packet. `seq` is 1-based.
    ///
    /// Packets outside the currently granted window are rejected as a
    /// protocol violation rather than silently accepted (testable property
    /// 4: the receiver sees exactly the packets it asked for before the
    /// next CTS).
    pub fn add_rts_packet(
        &mut self,
        sa: u8,
        da: u8,
        pgn: u32,
        seq: u8,
        chunk: &[u8; 7],
        now_ms: u64,
    ) -> Result<TpOutcome> {
        let key = (sa, da, pgn);
        let window = self.rx.get(&key).and_then(|s| s.window);
        self.add_packet(key, seq, chunk, now_ms, window)
    }

    /// Grant the next CTS window for an in-progress RTS/CTS session,
    /// e.g. after a prior window was fully received but more packets
    /// remain. Returns the CTS frame to emit.
    pub fn grant_next_window(
        &mut self,
        sa: u8,
        da: u8,
        pgn: u32,
        next_packet: u8,
        window_size: u8,
        now_ms: u64,
    ) -> Result<[u8; 8]> {
        let key = (sa, da, pgn);
        let session = self
            .rx
            .get_mut(&key)
            .ok_or_else(|| J1939Error::tp_violation(format!("no session to re-window {key:?}")))?;
        session.window = Some((next_packet, window_size));
        session.last_activity_ms = now_ms;
        Ok(build_cts_cm(next_packet, window_size, pgn))
    }

    fn add_packet(
        &mut self,
        key: SessionKey,
        seq: u8,
        chunk: &[u8; 7],
        now_ms: u64,
        window: Option<(u8, u8)>,
    ) -> Result<TpOutcome> {
        let session = self
            .rx
            .get_mut(&key)
            .ok_or_else(|| J1939Error::tp_violation(format!("TP.DT for unknown session {key:?}")))?;

        if let Some((next_packet, num_packets)) = window {
            let lo = next_packet;
            let hi = next_packet.saturating_add(num_packets).saturating_sub(1);
            if seq < lo || seq > hi {
                return Err(J1939Error::tp_violation(format!(
                    "TP.DT seq {seq} outside granted window [{lo},{hi}]"
                )));
            }
        }

        let idx = seq.saturating_sub(1) as usize;
        if idx >= session.total_packets as usize {
            return Err(J1939Error::tp_violation(format!(
                "TP.DT seq {seq} exceeds {} announced packets",
                session.total_packets
            )));
        }

        let offset = idx * BYTES_PER_PACKET;
        session.buffer[offset..offset + BYTES_PER_PACKET].copy_from_slice(chunk);
        if !session.received[idx] {
            session.received[idx] = true;
            session.received_count += 1;
        }
        session.last_activity_ms = now_ms;

        if session.received_count == session.total_packets {
            let mut data = session.buffer.clone();
            data.truncate(session.total_bytes);
            let pgn = key.2;
            let is_bam = key.1 == 0xFF;
            let reply = if is_bam {
                None
            } else {
                Some(build_eom_cm(
                    session.total_bytes as u16,
                    session.total_packets,
                    pgn,
                ))
            };
            self.rx.remove(&key);
            Ok(TpOutcome::Complete { data, reply })
        } else {
            Ok(TpOutcome::Pending)
        }
    }

    /// Find the PGN of whichever open rx session matches `(sa, da)`. TP.DT
    /// frames carry no PGN field of their own; it is known only from the
    /// CM frame that opened the session. When more than one session is
    /// simultaneously open for the same `(sa, da)` pair (not exercised by
    /// any reference ECU here) the first match is used.
    pub fn find_open_rx_pgn(&self, sa: u8, da: u8) -> Option<u32> {
        self.rx.keys().find(|k| k.0 == sa && k.1 == da).map(|k| k.2)
    }

    /// Discard the session for `(sa, da, pgn)` in response to an ABORT.
    pub fn abort(&mut self, sa: u8, da: u8, pgn: u32) {
        self.rx.remove(&(sa, da, pgn));
        self.tx.remove(&(sa, da, pgn));
    }

    /// Evict sessions that have exceeded their deadlines. Intended to be
    /// called by the scheduler at most once per second of simulated time.
    /// Evictions are silent: no error is raised to subscribers.
    pub fn cleanup(&mut self, now_ms: u64) {
        self.rx
            .retain(|_, s| now_ms.saturating_sub(s.last_activity_ms) < INACTIVITY_TIMEOUT_MS);
        self.tx.retain(|_, s| match s.state {
            TpSessionState::WaitingCts => {
                now_ms.saturating_sub(s.started_at_ms) < CTS_WAIT_TIMEOUT_MS
            }
            _ => now_ms.saturating_sub(s.last_activity_ms) < INACTIVITY_TIMEOUT_MS,
        });
    }

    /// Snapshot of how many sessions are currently open.
    pub fn status(&self) -> TpStatus {
        TpStatus {
            rx_sessions: self.rx.len(),
            tx_sessions: self.tx.len(),
        }
    }
}

/// Decode a REQUEST/TP.CM-style 3-byte trailing PGN field, used by both
/// the CM frame layout and the REQUEST PGN payload.
pub fn decode_pgn_field(data: &[u8]) -> Option<u32> {
    if data.len() < 3 {
        return None;
    }
    Some(pgn_from_bytes(data[0], data[1], data[2]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_f_bam_end_to_end() {
        let mut engine = TransportEngine::new();
        let message: Vec<u8> = (0..14).collect();
        let pgn = crate::codec::pgn::DM1;

        let (cm, dt_frames) = engine.start_bam(pgn, &message).unwrap();
        assert_eq!(cm[0], control::BAM);
        assert_eq!(u16::from_le_bytes([cm[1], cm[2]]), 14);
        assert_eq!(cm[3], 2);
        assert_eq!(dt_frames.len(), 2);
        assert_eq!(dt_frames[0][0], 1);
        assert_eq!(dt_frames[1][0], 2);

        engine.handle_bam_announcement(0x00, pgn, 14, 2, 0);
        let outcome1 = engine
            .add_bam_packet(0x00, pgn, 1, dt_frames[0][1..8].try_into().unwrap(), 10)
            .unwrap();
        assert!(matches!(outcome1, TpOutcome::Pending));

        let outcome2 = engine
            .add_bam_packet(0x00, pgn, 2, dt_frames[1][1..8].try_into().unwrap(), 60)
            .unwrap();
        match outcome2 {
            TpOutcome::Complete { data, reply } => {
                assert_eq!(data.len(), 14);
                assert_eq!(data, message);
                assert!(reply.is_none());
            }
            TpOutcome::Pending => panic!("expected completion"),
        }
    }

    #[test]
    fn test_bam_out_of_order_packets() {
        let mut engine = TransportEngine::new();
        let message: Vec<u8> = (0..20).collect();
        let pgn = 0xFECAu32;
        let (_cm, dt_frames) = engine.start_bam(pgn, &message).unwrap();
        assert_eq!(dt_frames.len(), 3);

        engine.handle_bam_announcement(0x10, pgn, 20, 3, 0);
        engine
            .add_bam_packet(0x10, pgn, 3, dt_frames[2][1..8].try_into().unwrap(), 0)
            .unwrap();
        engine
            .add_bam_packet(0x10, pgn, 1, dt_frames[0][1..8].try_into().unwrap(), 0)
            .unwrap();
        let outcome = engine
            .add_bam_packet(0x10, pgn, 2, dt_frames[1][1..8].try_into().unwrap(), 0)
            .unwrap();
        match outcome {
            TpOutcome::Complete { data, .. } => assert_eq!(data, message),
            TpOutcome::Pending => panic!("expected completion"),
        }
    }

    #[test]
    fn test_bam_replaces_active_session() {
        let mut engine = TransportEngine::new();
        engine.handle_bam_announcement(0x00, 0xFECA, 14, 2, 0);
        assert_eq!(engine.status().rx_sessions, 1);
        // A fresh BAM for the same (sa, pgn) discards and replaces.
        engine.handle_bam_announcement(0x00, 0xFECA, 21, 3, 10);
        assert_eq!(engine.status().rx_sessions, 1);
    }

    #[test]
    fn test_rts_cts_window_exact_packets() {
        let mut engine = TransportEngine::new();
        let message: Vec<u8> = (0..35).collect(); // 5 packets
        let pgn = 0xFECAu32;

        let rts = engine.start_rts(0x00, 0xF9, pgn, &message, 0).unwrap();
        assert_eq!(rts[0], control::RTS);

        // Destination grants a 2-packet window.
        let cts = engine.accept_rts(0x00, 0xF9, pgn, 35, 5, Some(2), 5);
        assert_eq!(cts[0], control::CTS);

        let frames = engine.process_cts(0x00, 0xF9, pgn, 1, 2, 10).unwrap();
        assert_eq!(frames.len(), 2);

        // Sending packet 3 before the next CTS must be rejected.
        let rejected = engine.add_rts_packet(
            0x00,
            0xF9,
            pgn,
            3,
            frames[1][1..8].try_into().unwrap(),
            15,
        );
        assert!(rejected.is_err());

        let outcome1 = engine
            .add_rts_packet(0x00, 0xF9, pgn, 1, frames[0][1..8].try_into().unwrap(), 15)
            .unwrap();
        assert!(matches!(outcome1, TpOutcome::Pending));
        let outcome2 = engine
            .add_rts_packet(0x00, 0xF9, pgn, 2, frames[1][1..8].try_into().unwrap(), 15)
            .unwrap();
        assert!(matches!(outcome2, TpOutcome::Pending));

        // Grant the remaining window and finish.
        let cts2 = engine.grant_next_window(0x00, 0xF9, pgn, 3, 3, 20).unwrap();
        assert_eq!(cts2[2], 3);
        let more_frames = engine.process_cts(0x00, 0xF9, pgn, 3, 3, 25).unwrap();
        assert_eq!(more_frames.len(), 3);
        let mut last = TpOutcome::Pending;
        for (i, f) in more_frames.iter().enumerate() {
            last = engine
                .add_rts_packet(0x00, 0xF9, pgn, (3 + i) as u8, f[1..8].try_into().unwrap(), 30)
                .unwrap();
        }
        match last {
            TpOutcome::Complete { data, reply } => {
                assert_eq!(data, message);
                assert!(reply.is_some());
                assert_eq!(reply.unwrap()[0], control::EOM);
            }
            TpOutcome::Pending => panic!("expected completion"),
        }
    }

    #[test]
    fn test_cleanup_evicts_inactive_sessions() {
        let mut engine = TransportEngine::new();
        engine.handle_bam_announcement(0x00, 0xFECA, 14, 2, 0);
        engine.cleanup(1000);
        assert_eq!(engine.status().rx_sessions, 1, "not yet expired");
        engine.cleanup(1251);
        assert_eq!(engine.status().rx_sessions, 0, "should have expired");
    }

    #[test]
    fn test_cleanup_evicts_cts_wait_timeout() {
        let mut engine = TransportEngine::new();
        engine
            .start_rts(0x00, 0xF9, 0xFECA, &vec![0u8; 20], 0)
            .unwrap();
        engine.cleanup(499);
        assert_eq!(engine.status().tx_sessions, 1);
        engine.cleanup(501);
        assert_eq!(engine.status().tx_sessions, 0);
    }

    #[test]
    fn test_abort_discards_session() {
        let mut engine = TransportEngine::new();
        engine.handle_bam_announcement(0x00, 0xFECA, 14, 2, 0);
        engine.abort(0x00, 0xFF, 0xFECA);
        assert_eq!(engine.status().rx_sessions, 0);
    }

    #[test]
    fn test_payload_too_large_rejected() {
        let engine = TransportEngine::new();
        let oversized = vec![0u8; MAX_MESSAGE_LEN + 1];
        assert!(engine.start_bam(0xFECA, &oversized).is_err());
    }
}
