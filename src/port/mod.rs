//! The J1939 Port: wraps a [`CanPort`] with the identifier codec and the
//! Transport Protocol Engine, and fans decoded messages out to subscribers.
//!
//! Subscriber callbacks are handed a [`PortSender`] instead of a mutable
//! borrow of the port: a handler cannot re-enter the port it's dispatched
//! from, it can only enqueue an outbound command the port drains and
//! sends on its own next tick. That keeps dispatch a plain synchronous
//! loop even though sending is async.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::can::CanPort;
use crate::codec::identifier::{self, J1939IdFields};
use crate::codec::pgn;
use crate::error::{J1939Error, Result};
use crate::frame::CanFrame;
use crate::message::J1939Message;
use crate::transport::{self, control, TpOutcome, TransportEngine};

/// Minimum spacing between successive BAM TP.DT frames, in simulated
/// milliseconds. Unlike RTS/CTS, BAM has no flow control from the
/// receiver, so the sender must pace itself.
pub const BAM_PACKET_SPACING_MS: u64 = 50;

/// A handler for decoded messages. Returning `Err` is reported as a
/// [`J1939Error::HandlerFault`] to error subscribers; it never aborts
/// dispatch to the remaining handlers.
pub type PgnHandler = Box<dyn FnMut(&J1939Message, &PortSender) -> Result<()> + Send>;
/// A handler for inbound REQUEST PGNs: `(requested_pgn, requester_sa)`.
pub type RequestHandler = Box<dyn FnMut(u32, u8, &PortSender) -> Result<()> + Send>;
/// A handler for port-level errors.
pub type ErrorHandler = Box<dyn FnMut(&J1939Error) + Send>;
/// A handler for Address Claimed events.
pub type AddressClaimHandler = Box<dyn FnMut(&AddressClaimEvent) + Send>;

/// An Address Claimed (PGN `0xEE00`) frame, decoded into the two cases a
/// subscriber cares about. A claim by this port's own source address is a
/// conflict: some other node on the bus believes it owns the address this
/// port has already claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressClaimEvent {
    /// A peer announced ownership of `sa` with the given NAME.
    Claimed { sa: u8, name: u64 },
    /// A peer announced ownership of `sa`, which this port already claims.
    Conflict { sa: u8, name: u64 },
}

enum OutboundCommand {
    Send { pgn: u32, data: Vec<u8>, da: u8 },
}

/// A cheap, cloneable capability for asking a [`J1939Port`] to send,
/// without holding a borrow of the port itself. Handed to subscriber
/// callbacks, and to ECUs via `bind_j1939_port`.
#[derive(Clone)]
pub struct PortSender {
    tx: mpsc::UnboundedSender<OutboundCommand>,
}

impl PortSender {
    /// Queue a send. Actually sent on the port's next `tick`.
    pub fn send_pgn(&self, pgn: u32, data: impl Into<Vec<u8>>, da: u8) {
        let _ = self.tx.send(OutboundCommand::Send {
            pgn,
            data: data.into(),
            da,
        });
    }

    /// Queue a REQUEST for `pgn` addressed to `da`.
    pub fn request_pgn(&self, pgn: u32, da: u8) {
        let data = crate::codec::spn::encode_request(pgn).to_vec();
        self.send_pgn(crate::codec::pgn::REQUEST, data, da);
    }
}

/// The J1939 Port: one per ECU or plugin, bound to exactly one [`CanPort`].
pub struct J1939Port<C: CanPort> {
    can: C,
    source_address: u8,
    priority: u8,
    tp: TransportEngine,
    specific: HashMap<u32, Vec<(u64, PgnHandler)>>,
    wildcard: Vec<(u64, PgnHandler)>,
    request_handlers: Vec<(u64, RequestHandler)>,
    error_handlers: Vec<(u64, ErrorHandler)>,
    address_claim_handlers: Vec<(u64, AddressClaimHandler)>,
    next_handler_id: u64,
    now_ms: u64,
    inbox: Arc<Mutex<std::collections::VecDeque<CanFrame>>>,
    outbound_tx: mpsc::UnboundedSender<OutboundCommand>,
    outbound_rx: mpsc::UnboundedReceiver<OutboundCommand>,
    bam_jobs: Vec<BamJob>,
}

struct BamJob {
    da: u8,
    frames: std::collections::VecDeque<[u8; 8]>,
    last_sent_ms: Option<u64>,
}

impl<C: CanPort> J1939Port<C> {
    /// Bind a new port to `can`, claiming `source_address`.
    pub fn new(mut can: C, source_address: u8) -> Self {
        let inbox = Arc::new(Mutex::new(std::collections::VecDeque::new()));
        let inbox_clone = inbox.clone();
        can.on_frame(Box::new(move |f: &CanFrame| {
            inbox_clone.lock().unwrap().push_back(f.clone());
        }));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Self {
            can,
            source_address,
            priority: 6,
            tp: TransportEngine::new(),
            specific: HashMap::new(),
            wildcard: Vec::new(),
            request_handlers: Vec::new(),
            error_handlers: Vec::new(),
            address_claim_handlers: Vec::new(),
            next_handler_id: 0,
            now_ms: 0,
            inbox,
            outbound_tx,
            outbound_rx,
            bam_jobs: Vec::new(),
        }
    }

    /// A cloneable sender capability tied to this port's outbound queue.
    pub fn port_sender(&self) -> PortSender {
        PortSender {
            tx: self.outbound_tx.clone(),
        }
    }

    /// This port's claimed source address.
    pub fn source_address(&self) -> u8 {
        self.source_address
    }

    /// Change the claimed source address. Does not re-run address claim
    /// arbitration; callers that need that should drive it at the
    /// Diagnostic/ECU layer.
    pub fn set_source_address(&mut self, sa: u8) {
        self.source_address = sa;
    }

    /// Default priority used for messages this port originates.
    pub fn set_priority(&mut self, priority: u8) {
        self.priority = priority.min(7);
    }

    /// Subscribe to `pgn`, or pass `None` for a wildcard subscription that
    /// sees every message after specific subscribers have run. Returns a
    /// handle for [`off_pgn`](Self::off_pgn).
    pub fn on_pgn(&mut self, pgn: Option<u32>, handler: PgnHandler) -> u64 {
        let id = self.next_handler_id;
        self.next_handler_id += 1;
        match pgn {
            Some(pgn) => self.specific.entry(pgn).or_default().push((id, handler)),
            None => self.wildcard.push((id, handler)),
        }
        id
    }

    /// Remove a previously registered subscriber.
    pub fn off_pgn(&mut self, handler_id: u64) {
        self.specific
            .values_mut()
            .for_each(|v| v.retain(|(id, _)| *id != handler_id));
        self.wildcard.retain(|(id, _)| *id != handler_id);
    }

    /// Subscribe to inbound REQUEST events.
    pub fn on_request(&mut self, handler: RequestHandler) -> u64 {
        let id = self.next_handler_id;
        self.next_handler_id += 1;
        self.request_handlers.push((id, handler));
        id
    }

    /// Subscribe to port-level errors (handler faults, protocol violations).
    pub fn on_error(&mut self, handler: ErrorHandler) -> u64 {
        let id = self.next_handler_id;
        self.next_handler_id += 1;
        self.error_handlers.push((id, handler));
        id
    }

    /// Subscribe to Address Claimed events (claims and conflicts).
    pub fn on_address_claim(&mut self, handler: AddressClaimHandler) -> u64 {
        let id = self.next_handler_id;
        self.next_handler_id += 1;
        self.address_claim_handlers.push((id, handler));
        id
    }

    /// Send `data` as `pgn` to `da` (`0xFF` for broadcast). Payloads over 8
    /// bytes are carried by the Transport Protocol: BAM when `da == 0xFF`,
    /// RTS/CTS otherwise.
    pub async fn send_pgn(&mut self, pgn: u32, data: &[u8], da: u8) -> Result<()> {
        if data.len() > transport::MAX_MESSAGE_LEN {
            return Err(J1939Error::PayloadTooLarge { len: data.len() });
        }
        if data.len() <= 8 {
            let padded = CanFrame::pad_to_8(data);
            self.send_frame(pgn, da, padded).await?;
        } else if da == 0xFF {
            let (cm, dt_frames) = self.tp.start_bam(pgn, data)?;
            self.send_frame(self.tp_cm_pgn(), 0xFF, Bytes::copy_from_slice(&cm))
                .await?;
            self.bam_jobs.push(BamJob {
                da,
                frames: dt_frames.into_iter().collect(),
                last_sent_ms: None,
            });
        } else {
            let rts = self.tp.start_rts(self.source_address, da, pgn, data, self.now_ms)?;
            self.send_frame(self.tp_cm_pgn(), da, Bytes::copy_from_slice(&rts))
                .await?;
        }
        Ok(())
    }

    /// Request `pgn` from `da`.
    pub async fn request_pgn(&mut self, pgn: u32, da: u8) -> Result<()> {
        let data = crate::codec::spn::encode_request(pgn);
        self.send_pgn(crate::codec::pgn::REQUEST, &data, da).await
    }

    fn tp_cm_pgn(&self) -> u32 {
        pgn::TP_CM
    }

    async fn send_frame(&self, pgn: u32, da: u8, data: Bytes) -> Result<()> {
        let id = identifier::build(J1939IdFields {
            priority: self.priority,
            pgn,
            sa: self.source_address,
            da,
        });
        #[cfg(feature = "tracing-support")]
        tracing::trace!(pgn, sa = self.source_address, da, "sending frame");
        self.can.send(CanFrame::new(id, data, self.now_ms)).await
    }

    /// Advance simulated time to `now_ms`, pump the underlying [`CanPort`],
    /// dispatch every frame that arrived, then flush whatever subscriber
    /// callbacks queued via their [`PortSender`].
    pub async fn tick(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
        self.can.poll();
        let frames: Vec<CanFrame> = {
            let mut inbox = self.inbox.lock().unwrap();
            inbox.drain(..).collect()
        };
        for frame in frames {
            self.handle_incoming_frame(frame).await;
        }
        self.pace_bam_sends(now_ms).await;
        self.flush_outbound().await;
    }

    async fn flush_outbound(&mut self) {
        while let Ok(cmd) = self.outbound_rx.try_recv() {
            match cmd {
                OutboundCommand::Send { pgn, data, da } => {
                    if let Err(e) = self.send_pgn(pgn, &data, da).await {
                        self.emit_error(e);
                    }
                }
            }
        }
    }

    async fn pace_bam_sends(&mut self, now_ms: u64) {
        for job in self.bam_jobs.iter_mut() {
            let due = job
                .last_sent_ms
                .map(|t| now_ms.saturating_sub(t) >= BAM_PACKET_SPACING_MS)
                .unwrap_or(true);
            if due {
                if let Some(chunk) = job.frames.pop_front() {
                    let id = identifier::build(J1939IdFields {
                        priority: self.priority,
                        pgn: pgn::TP_DT,
                        sa: self.source_address,
                        da: job.da,
                    });
                    let _ = self
                        .can
                        .send(CanFrame::new(id, Bytes::copy_from_slice(&chunk), now_ms))
                        .await;
                    job.last_sent_ms = Some(now_ms);
                }
            }
        }
        self.bam_jobs.retain(|j| !j.frames.is_empty());
    }

    /// Run [`TransportEngine::cleanup`]. Intended to be called by the
    /// scheduler at most once per simulated second, not every tick.
    pub fn cleanup_tp(&mut self, now_ms: u64) {
        self.tp.cleanup(now_ms);
    }

    /// Snapshot of open Transport Protocol sessions.
    pub fn tp_status(&self) -> transport::TpStatus {
        self.tp.status()
    }

    async fn handle_incoming_frame(&mut self, frame: CanFrame) {
        if !frame.extended {
            return;
        }
        let id = identifier::parse(frame.id);
        match id.pgn {
            pgn::TP_CM => self.handle_tp_cm(id.sa, id.da, &frame.data).await,
            pgn::TP_DT => self.handle_tp_dt(id.sa, id.da, id.priority, &frame.data).await,
            pgn::REQUEST => self.handle_request(id.sa, &frame.data),
            pgn::ADDRESS_CLAIMED => self.handle_address_claimed(id.sa, &frame.data),
            other => {
                let msg = J1939Message {
                    pgn: other,
                    priority: id.priority,
                    sa: id.sa,
                    da: id.da,
                    data: frame.data,
                    timestamp_ms: self.now_ms,
                };
                self.dispatch_message(msg);
            }
        }
    }

    async fn handle_tp_cm(&mut self, sa: u8, da: u8, data: &[u8]) {
        if data.len() < 8 {
            self.emit_error(J1939Error::invalid_frame("TP.CM frame shorter than 8 bytes"));
            return;
        }
        let Some(ctrl_pgn) = transport::decode_pgn_field(&data[5..8]) else {
            self.emit_error(J1939Error::invalid_frame("TP.CM missing PGN field"));
            return;
        };
        match data[0] {
            control::BAM => {
                let len = u16::from_le_bytes([data[1], data[2]]);
                #[cfg(feature = "tracing-support")]
                tracing::debug!(sa, pgn = ctrl_pgn, len, "TP.CM BAM announced");
                self.tp.handle_bam_announcement(sa, ctrl_pgn, len, data[3], self.now_ms);
            }
            control::RTS => {
                if da != self.source_address {
                    return;
                }
                let len = u16::from_le_bytes([data[1], data[2]]);
                let cts = self.tp.accept_rts(sa, self.source_address, ctrl_pgn, len, data[3], None, self.now_ms);
                if let Err(e) = self.send_frame(pgn::TP_CM, sa, Bytes::copy_from_slice(&cts)).await {
                    self.emit_error(e);
                }
            }
            control::CTS => {
                if da != self.source_address {
                    return;
                }
                let num_packets = data[1];
                let next_packet = data[2];
                match self.tp.process_cts(self.source_address, sa, ctrl_pgn, next_packet, num_packets, self.now_ms) {
                    Ok(frames) => {
                        for chunk in frames {
                            if let Err(e) = self.send_frame(pgn::TP_DT, sa, Bytes::copy_from_slice(&chunk)).await {
                                self.emit_error(e);
                            }
                        }
                    }
                    Err(e) => self.emit_error(e),
                }
            }
            control::EOM => {
                if da == self.source_address {
                    self.tp.complete_rts(self.source_address, sa, ctrl_pgn);
                }
            }
            control::ABORT => {
                self.tp.abort(self.source_address, sa, ctrl_pgn);
                self.tp.abort(sa, self.source_address, ctrl_pgn);
            }
            other => self.emit_error(J1939Error::tp_violation(format!("unknown TP.CM control byte {other}"))),
        }
    }

    async fn handle_tp_dt(&mut self, sa: u8, da: u8, priority: u8, data: &[u8]) {
        if data.len() < 8 {
            self.emit_error(J1939Error::invalid_frame("TP.DT frame shorter than 8 bytes"));
            return;
        }
        let seq = data[0];
        let chunk: [u8; 7] = data[1..8].try_into().unwrap();
        let session_da = if da == 0xFF { 0xFF } else { self.source_address };
        if da != 0xFF && da != self.source_address {
            return;
        }
        let Some(pgn) = self.tp.find_open_rx_pgn(sa, session_da) else {
            self.emit_error(J1939Error::tp_violation("TP.DT with no open session"));
            return;
        };
        let outcome = if session_da == 0xFF {
            self.tp.add_bam_packet(sa, pgn, seq, &chunk, self.now_ms)
        } else {
            self.tp.add_rts_packet(sa, self.source_address, pgn, seq, &chunk, self.now_ms)
        };
        match outcome {
            Ok(TpOutcome::Pending) => {}
            Ok(TpOutcome::Complete { data, reply }) => {
                if let Some(reply_frame) = reply {
                    if let Err(e) = self.send_frame(pgn::TP_CM, sa, Bytes::copy_from_slice(&reply_frame)).await {
                        self.emit_error(e);
                    }
                }
                let msg = J1939Message {
                    pgn,
                    priority,
                    sa,
                    da,
                    data: Bytes::from(data),
                    timestamp_ms: self.now_ms,
                };
                self.dispatch_message(msg);
            }
            Err(e) => self.emit_error(e),
        }
    }

    fn handle_request(&mut self, sa: u8, data: &[u8]) {
        let Ok(requested_pgn) = crate::codec::spn::decode_request(data) else {
            self.emit_error(J1939Error::invalid_frame("malformed REQUEST payload"));
            return;
        };
        let sender = self.port_sender();
        for (_, handler) in self.request_handlers.iter_mut() {
            if let Err(e) = handler(requested_pgn, sa, &sender) {
                #[cfg(feature = "tracing-support")]
                tracing::warn!(pgn = requested_pgn, error = %e, "request handler fault");
                self.error_handlers.iter_mut().for_each(|(_, h)| {
                    h(&J1939Error::HandlerFault {
                        pgn: requested_pgn,
                        detail: e.to_string(),
                    })
                });
            }
        }
    }

    fn handle_address_claimed(&mut self, sa: u8, data: &[u8]) {
        if data.len() < 8 {
            self.emit_error(J1939Error::invalid_frame("Address Claimed frame shorter than 8 bytes"));
            return;
        }
        let name = u64::from_le_bytes(data[0..8].try_into().unwrap());
        let event = if sa == self.source_address {
            AddressClaimEvent::Conflict { sa, name }
        } else {
            AddressClaimEvent::Claimed { sa, name }
        };
        #[cfg(feature = "tracing-support")]
        match event {
            AddressClaimEvent::Claimed { sa, name } => tracing::debug!(sa, name, "address claimed"),
            AddressClaimEvent::Conflict { sa, name } => tracing::warn!(sa, name, "address claim conflict"),
        }
        for (_, handler) in self.address_claim_handlers.iter_mut() {
            handler(&event);
        }
    }

    fn dispatch_message(&mut self, msg: J1939Message) {
        let sender = self.port_sender();
        if let Some(subs) = self.specific.get_mut(&msg.pgn) {
            for (_, handler) in subs.iter_mut() {
                if let Err(e) = handler(&msg, &sender) {
                    self.error_handlers.iter_mut().for_each(|(_, h)| {
                        h(&J1939Error::HandlerFault {
                            pgn: msg.pgn,
                            detail: e.to_string(),
                        })
                    });
                }
            }
        }
        for (_, handler) in self.wildcard.iter_mut() {
            if let Err(e) = handler(&msg, &sender) {
                self.error_handlers.iter_mut().for_each(|(_, h)| {
                    h(&J1939Error::HandlerFault {
                        pgn: msg.pgn,
                        detail: e.to_string(),
                    })
                });
            }
        }
    }

    fn emit_error(&mut self, err: J1939Error) {
        #[cfg(feature = "tracing-support")]
        tracing::warn!(error = %err, "frame dropped");
        for (_, handler) in self.error_handlers.iter_mut() {
            handler(&err);
        }
    }
}

/// Test-only: a [`PortSender`] wired to a channel nobody drains, for unit
/// tests of code that needs a sender but never asserts on what it sent.
#[cfg(test)]
pub(crate) fn test_sender() -> PortSender {
    let (tx, _rx) = mpsc::unbounded_channel();
    PortSender { tx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::can::virtual_bus::{VirtualCanBus, VirtualCanPort};
    use std::sync::Mutex as StdMutex;

    async fn port_pair() -> (J1939Port<VirtualCanPort>, J1939Port<VirtualCanPort>) {
        let bus = VirtualCanBus::new("test");
        let a = VirtualCanPort::connect(bus.clone()).await;
        let b = VirtualCanPort::connect(bus.clone()).await;
        (J1939Port::new(a, 0x00), J1939Port::new(b, 0xF9))
    }

    #[tokio::test]
    async fn test_single_frame_dispatch_to_specific_then_wildcard() {
        let (mut tx, mut rx) = port_pair().await;
        let order = Arc::new(StdMutex::new(Vec::new()));
        let o1 = order.clone();
        rx.on_pgn(
            Some(pgn::EEC1),
            Box::new(move |_msg, _s| {
                o1.lock().unwrap().push("specific");
                Ok(())
            }),
        );
        let o2 = order.clone();
        rx.on_pgn(
            None,
            Box::new(move |_msg, _s| {
                o2.lock().unwrap().push("wildcard");
                Ok(())
            }),
        );

        tx.send_pgn(pgn::EEC1, &[0u8; 8], 0xF9).await.unwrap();
        tx.tick(0).await;
        rx.tick(10).await;

        assert_eq!(*order.lock().unwrap(), vec!["specific", "wildcard"]);
    }

    #[tokio::test]
    async fn test_request_event_emitted() {
        let (mut tx, mut rx) = port_pair().await;
        let seen = Arc::new(StdMutex::new(None));
        let seen_clone = seen.clone();
        rx.on_request(Box::new(move |pgn, sa, _sender| {
            *seen_clone.lock().unwrap() = Some((pgn, sa));
            Ok(())
        }));

        tx.request_pgn(pgn::EEC1, 0xF9).await.unwrap();
        tx.tick(0).await;
        rx.tick(10).await;

        assert_eq!(*seen.lock().unwrap(), Some((pgn::EEC1, 0x00)));
    }

    #[tokio::test]
    async fn test_handler_fault_isolated_and_reported() {
        let (mut tx, mut rx) = port_pair().await;
        let called = Arc::new(StdMutex::new(false));
        let called_clone = called.clone();
        rx.on_pgn(
            Some(pgn::EEC1),
            Box::new(|_msg, _s| Err(J1939Error::internal("boom"))),
        );
        rx.on_pgn(
            Some(pgn::EEC1),
            Box::new(move |_msg, _s| {
                *called_clone.lock().unwrap() = true;
                Ok(())
            }),
        );
        let fault = Arc::new(StdMutex::new(false));
        let fault_clone = fault.clone();
        rx.on_error(Box::new(move |e| {
            if matches!(e, J1939Error::HandlerFault { .. }) {
                *fault_clone.lock().unwrap() = true;
            }
        }));

        tx.send_pgn(pgn::EEC1, &[0u8; 8], 0xF9).await.unwrap();
        tx.tick(0).await;
        rx.tick(10).await;

        assert!(*called.lock().unwrap(), "second handler still ran");
        assert!(*fault.lock().unwrap(), "fault reported");
    }

    #[tokio::test]
    async fn test_multi_frame_send_reassembled_via_rts_cts() {
        let (mut tx, mut rx) = port_pair().await;
        let received = Arc::new(StdMutex::new(None));
        let received_clone = received.clone();
        rx.on_pgn(
            Some(pgn::DM1),
            Box::new(move |msg, _s| {
                *received_clone.lock().unwrap() = Some(msg.data.to_vec());
                Ok(())
            }),
        );

        let payload: Vec<u8> = (0..20).collect();
        tx.send_pgn(pgn::DM1, &payload, 0xF9).await.unwrap();

        for t in (0..500).step_by(10) {
            tx.tick(t).await;
            rx.tick(t + 1).await;
        }

        assert_eq!(*received.lock().unwrap(), Some(payload));
    }

    #[tokio::test]
    async fn test_broadcast_over_8_bytes_uses_bam() {
        let (mut tx, mut rx) = port_pair().await;
        let received = Arc::new(StdMutex::new(None));
        let received_clone = received.clone();
        rx.on_pgn(
            Some(pgn::DM1),
            Box::new(move |msg, _s| {
                *received_clone.lock().unwrap() = Some(msg.data.to_vec());
                Ok(())
            }),
        );

        let payload: Vec<u8> = (0..14).collect();
        tx.send_pgn(pgn::DM1, &payload, 0xFF).await.unwrap();

        for t in (0..500).step_by(10) {
            tx.tick(t).await;
            rx.tick(t + 1).await;
        }

        assert_eq!(*received.lock().unwrap(), Some(payload));
    }

    #[tokio::test]
    async fn test_address_claimed_from_peer_is_reported_as_claim() {
        let (mut tx, mut rx) = port_pair().await;
        let seen = Arc::new(StdMutex::new(None));
        let seen_clone = seen.clone();
        rx.on_address_claim(Box::new(move |event| {
            *seen_clone.lock().unwrap() = Some(*event);
        }));

        tx.send_pgn(pgn::ADDRESS_CLAIMED, &0xDEADBEEFu64.to_le_bytes(), 0xFF)
            .await
            .unwrap();
        tx.tick(0).await;
        rx.tick(10).await;

        assert_eq!(
            *seen.lock().unwrap(),
            Some(AddressClaimEvent::Claimed {
                sa: 0x00,
                name: 0xDEADBEEF,
            })
        );
    }

    #[tokio::test]
    async fn test_address_claimed_for_own_address_is_a_conflict() {
        let (mut tx, mut rx) = port_pair().await;
        // Give `tx` the same source address `rx` already holds, so its
        // announcement looks like a conflicting claim from `rx`'s view.
        tx.set_source_address(rx.source_address());
        let seen = Arc::new(StdMutex::new(None));
        let seen_clone = seen.clone();
        rx.on_address_claim(Box::new(move |event| {
            *seen_clone.lock().unwrap() = Some(*event);
        }));

        tx.send_pgn(pgn::ADDRESS_CLAIMED, &1u64.to_le_bytes(), 0xFF)
            .await
            .unwrap();
        tx.tick(0).await;
        rx.tick(10).await;

        assert_eq!(
            *seen.lock().unwrap(),
            Some(AddressClaimEvent::Conflict {
                sa: rx.source_address(),
                name: 1,
            })
        );
    }

    #[tokio::test]
    async fn test_address_claimed_does_not_reach_generic_dispatch() {
        let (mut tx, mut rx) = port_pair().await;
        let called = Arc::new(StdMutex::new(false));
        let called_clone = called.clone();
        rx.on_pgn(
            None,
            Box::new(move |_msg, _s| {
                *called_clone.lock().unwrap() = true;
                Ok(())
            }),
        );

        tx.send_pgn(pgn::ADDRESS_CLAIMED, &1u64.to_le_bytes(), 0xFF)
            .await
            .unwrap();
        tx.tick(0).await;
        rx.tick(10).await;

        assert!(!*called.lock().unwrap(), "Address Claimed must not hit the generic dispatch path");
    }
}
