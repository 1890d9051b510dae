//! The TTL walker.
//!
//! One probe is outstanding at a time: send at the current TTL, block for
//! the reply with a hard wall-clock deadline, record the outcome, then
//! retry, advance the TTL, or stop. Datagrams that fail to parse or fail
//! to correlate are logged and the wait continues until the deadline.
//!
//! The deadline is not an alarm signal: the receive socket's read timeout
//! is recomputed from an `Instant` deadline before every blocking read,
//! so the wait unblocks deterministically whether or not anything
//! arrives, and `EINTR` is retried in place without touching state.

use std::io::ErrorKind;
use std::mem::MaybeUninit;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};

use crate::config::TraceConfig;
use crate::correlate::{correlate, ReplyClass};
use crate::error::{TraceError, TraceResult};
use crate::probe::{
    build_probe, local_source_port, process_ident, OutstandingProbe, ProbeKind, ProbeRecord,
};
use crate::reply;

/// Enough for any reply we care about (ethernet MTU).
const MAX_REPLY_SIZE: usize = 1500;

/// One row of the path: produced once per probe attempt, in strictly
/// increasing TTL order, never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hop {
    pub ttl: u8,
    /// Responder address; `None` on timeout.
    pub addr: Option<Ipv4Addr>,
    /// Round-trip time; `None` on timeout.
    pub rtt: Option<Duration>,
    pub class: ReplyClass,
}

/// Cooperative stop handle. Cloned into whatever wants to interrupt the
/// walk; the walker checks it at every state transition, so a cancelled
/// walk ends within one reply timeout.
#[derive(Debug, Clone, Default)]
pub struct Cancel(Arc<AtomicBool>);

impl Cancel {
    pub fn new() -> Cancel {
        Cancel::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// The walker's view of the wire: send one probe, read one datagram with
/// a bounded wait. The raw-socket implementation lives below; tests
/// script replies through this seam.
pub trait ProbeTransport {
    /// Transmits `packet` to the destination with the given IP TTL.
    /// `dst_port` applies to UDP probes and is ignored for echo probes.
    fn send(&mut self, ttl: u8, dst_port: u16, packet: &[u8]) -> TraceResult<()>;

    /// Waits at most `timeout` for one raw datagram. `Ok(None)` means the
    /// timeout elapsed. Implementations retry `EINTR` internally.
    fn recv(&mut self, timeout: Duration) -> TraceResult<Option<Vec<u8>>>;
}

/// Sockets for one run: a send socket (raw ICMP or UDP, TTL set per hop)
/// and a raw ICMP receive socket. Both are owned exclusively by the
/// walker and closed on drop.
pub struct RawProbeTransport {
    send_socket: Socket,
    recv_socket: Socket,
    target: Ipv4Addr,
    current_ttl: Option<u8>,
}

impl RawProbeTransport {
    pub fn new(target: Ipv4Addr, kind: ProbeKind, src_port: u16) -> TraceResult<RawProbeTransport> {
        let send_socket = match kind {
            ProbeKind::IcmpEcho => Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4)),
            ProbeKind::Udp => Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)),
        }
        .map_err(TraceError::SocketSetup)?;

        if kind == ProbeKind::Udp {
            // binding the source port is what lets the correlator check
            // the quoted udp source port against a known value
            let src = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, src_port);
            send_socket
                .bind(&src.into())
                .map_err(TraceError::SocketSetup)?;
        }

        let recv_socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))
            .map_err(TraceError::SocketSetup)?;

        Ok(RawProbeTransport {
            send_socket,
            recv_socket,
            target,
            current_ttl: None,
        })
    }
}

impl ProbeTransport for RawProbeTransport {
    fn send(&mut self, ttl: u8, dst_port: u16, packet: &[u8]) -> TraceResult<()> {
        if self.current_ttl != Some(ttl) {
            self.send_socket
                .set_ttl(u32::from(ttl))
                .map_err(TraceError::SocketSetup)?;
            self.current_ttl = Some(ttl);
        }

        let dest = SocketAddrV4::new(self.target, dst_port);
        self.send_socket
            .send_to(packet, &dest.into())
            .map_err(TraceError::Send)?;

        Ok(())
    }

    fn recv(&mut self, timeout: Duration) -> TraceResult<Option<Vec<u8>>> {
        if timeout.is_zero() {
            return Ok(None);
        }

        self.recv_socket
            .set_read_timeout(Some(timeout))
            .map_err(TraceError::SocketSetup)?;

        let mut raw = [MaybeUninit::<u8>::uninit(); MAX_REPLY_SIZE];
        loop {
            match self.recv_socket.recv_from(&mut raw) {
                Ok((received, _)) => {
                    let bytes: &[u8] = unsafe {
                        std::slice::from_raw_parts(raw.as_ptr() as *const u8, received)
                    };
                    return Ok(Some(bytes.to_vec()));
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Ok(None)
                }
                Err(err) => return Err(TraceError::Recv(err)),
            }
        }
    }
}

/// Walks the TTL ladder from 1 to `max_ttl`, emitting one [`Hop`] per
/// probe attempt.
pub struct HopProber<T> {
    config: TraceConfig,
    transport: T,
    cancel: Cancel,
    ident: u16,
    src_port: u16,
    seq: u16,
}

impl HopProber<RawProbeTransport> {
    /// Opens the sockets for a real run.
    pub fn new(config: TraceConfig, cancel: Cancel) -> TraceResult<HopProber<RawProbeTransport>> {
        let src_port = local_source_port();
        let kind = kind_of(&config);
        let transport = RawProbeTransport::new(config.target, kind, src_port)?;
        Ok(HopProber::with_transport(config, transport, cancel))
    }
}

fn kind_of(config: &TraceConfig) -> ProbeKind {
    if config.use_icmp_echo {
        ProbeKind::IcmpEcho
    } else {
        ProbeKind::Udp
    }
}

impl<T: ProbeTransport> HopProber<T> {
    pub fn with_transport(config: TraceConfig, transport: T, cancel: Cancel) -> HopProber<T> {
        HopProber {
            config,
            transport,
            cancel,
            ident: process_ident(),
            src_port: local_source_port(),
            seq: 0,
        }
    }

    /// Runs the walk, handing each hop to `emit` as it is recorded.
    /// Returns early (cleanly) when cancelled.
    pub fn walk<F: FnMut(&Hop)>(&mut self, mut emit: F) -> TraceResult<()> {
        'ladder: for ttl in 1..=self.config.max_ttl {
            for _attempt in 0..self.config.retries_per_ttl.max(1) {
                if self.cancel.is_cancelled() {
                    break 'ladder;
                }

                // SENDING
                let (probe, sent_at) = self.send_probe(ttl)?;

                // AWAITING_REPLY
                let hop = match self.await_reply(ttl, &probe, sent_at)? {
                    Some(hop) => hop,
                    None => break 'ladder, // cancelled mid-wait
                };

                // RECORDED
                emit(&hop);

                if hop.class.is_terminal() {
                    break 'ladder; // DONE: destination reached (or unreachable)
                }
            }
        }

        Ok(())
    }

    /// Convenience wrapper collecting the whole path.
    pub fn run(&mut self) -> TraceResult<Vec<Hop>> {
        let mut hops = Vec::new();
        self.walk(|hop| hops.push(*hop))?;
        Ok(hops)
    }

    fn send_probe(&mut self, ttl: u8) -> TraceResult<(OutstandingProbe, Instant)> {
        self.seq = self.seq.wrapping_add(1);
        let kind = kind_of(&self.config);
        let record = ProbeRecord::new(self.seq, u16::from(ttl));
        let dst_port = match kind {
            ProbeKind::Udp => self.config.base_port.wrapping_add(self.seq),
            ProbeKind::IcmpEcho => 0,
        };

        let probe = OutstandingProbe {
            kind,
            ident: self.ident,
            record,
            src_port: self.src_port,
            dst_port,
        };

        let packet = build_probe(kind, self.ident, &record);
        let sent_at = Instant::now();
        self.transport.send(ttl, dst_port, &packet)?;

        Ok((probe, sent_at))
    }

    /// Blocks until the outstanding probe is answered or its deadline
    /// passes. `Ok(None)` only on cancellation.
    fn await_reply(
        &mut self,
        ttl: u8,
        probe: &OutstandingProbe,
        sent_at: Instant,
    ) -> TraceResult<Option<Hop>> {
        let deadline = sent_at + self.config.reply_timeout;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(None);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(Some(Hop {
                    ttl,
                    addr: None,
                    rtt: None,
                    class: ReplyClass::Timeout,
                }));
            }

            let datagram = match self.transport.recv(remaining)? {
                Some(datagram) => datagram,
                None => continue, // timeout surfaces via the deadline check
            };
            let received_at = Instant::now();

            let parsed = match reply::parse(&datagram) {
                Ok(parsed) => parsed,
                Err(err) => {
                    eprintln!("traceroute: ignoring reply ({})", err);
                    continue;
                }
            };

            match correlate(&parsed, probe) {
                Some(class) => {
                    return Ok(Some(Hop {
                        ttl,
                        addr: Some(parsed.source),
                        rtt: Some(received_at.duration_since(sent_at)),
                        class,
                    }));
                }
                None => {
                    eprintln!(
                        "traceroute: reply from {} does not match outstanding probe, still waiting",
                        parsed.source
                    );
                }
            }
        }
    }
}
