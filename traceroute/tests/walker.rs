//! Walker state-machine tests over a scripted transport: each script step
//! is the network's answer to one probe attempt.

use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use traceroute::icmp;
use traceroute::ip::protocol;
use traceroute::probe::local_source_port;
use traceroute::walker::ProbeTransport;
use traceroute::{Cancel, HopProber, ReplyClass, TraceConfig, TraceResult};

const TARGET: Ipv4Addr = Ipv4Addr::new(93, 184, 216, 34);

/// What the network does with one probe attempt.
#[derive(Debug, Clone, Copy)]
enum Step {
    /// Nobody answers; the attempt times out.
    Silence,
    /// A router at `10.0.<ttl>.1` reports time exceeded.
    TtlExceeded,
    /// The destination reports port unreachable.
    UnreachPort,
    /// A router reports host unreachable (code 1).
    UnreachHost,
    /// The destination answers the echo request.
    EchoReply,
    /// A reply arrives whose quoted packet claims protocol TCP; it must
    /// be ignored and the attempt must still time out.
    QuotedTcp,
}

struct ScriptedTransport {
    script: VecDeque<Step>,
    pending: Option<Vec<u8>>,
    sent: Arc<Mutex<Vec<(u8, u16)>>>,
}

impl ScriptedTransport {
    fn new(script: &[Step]) -> (ScriptedTransport, Arc<Mutex<Vec<(u8, u16)>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        (
            ScriptedTransport {
                script: script.iter().copied().collect(),
                pending: None,
                sent: Arc::clone(&sent),
            },
            sent,
        )
    }
}

impl ProbeTransport for ScriptedTransport {
    fn send(&mut self, ttl: u8, dst_port: u16, packet: &[u8]) -> TraceResult<()> {
        self.sent.lock().unwrap().push((ttl, dst_port));

        let step = self.script.pop_front().unwrap_or(Step::Silence);
        self.pending = craft_reply(step, ttl, dst_port, packet);
        Ok(())
    }

    fn recv(&mut self, timeout: Duration) -> TraceResult<Option<Vec<u8>>> {
        match self.pending.take() {
            Some(datagram) => Ok(Some(datagram)),
            None => {
                // a real socket blocks until the timeout elapses
                thread::sleep(timeout);
                Ok(None)
            }
        }
    }
}

fn ipv4(protocol: u8, source: Ipv4Addr, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; 20];
    buf[0] = 0x45;
    buf[8] = 64;
    buf[9] = protocol;
    buf[12..16].clone_from_slice(&source.octets());
    buf.extend_from_slice(payload);
    buf
}

fn icmp_message(msg_type: u8, code: u8, rest: [u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![msg_type, code, 0, 0];
    buf.extend_from_slice(&rest);
    buf.extend_from_slice(payload);
    buf
}

/// The probe as a router would quote it: for UDP probes the quoted IP
/// header + UDP header + payload, for echo probes the quoted IP header +
/// the echo request itself.
fn quoted_probe(dst_port: u16, packet: &[u8]) -> Vec<u8> {
    let is_echo = packet.first() == Some(&icmp::ECHO_REQUEST);
    if is_echo {
        ipv4(protocol::ICMP, Ipv4Addr::UNSPECIFIED, packet)
    } else {
        let mut udp = Vec::new();
        udp.extend_from_slice(&local_source_port().to_be_bytes());
        udp.extend_from_slice(&dst_port.to_be_bytes());
        udp.extend_from_slice(&((8 + packet.len()) as u16).to_be_bytes());
        udp.extend_from_slice(&[0, 0]);
        udp.extend_from_slice(packet);
        ipv4(protocol::UDP, Ipv4Addr::UNSPECIFIED, &udp)
    }
}

fn craft_reply(step: Step, ttl: u8, dst_port: u16, packet: &[u8]) -> Option<Vec<u8>> {
    let router = Ipv4Addr::new(10, 0, ttl, 1);
    match step {
        Step::Silence => None,
        Step::TtlExceeded => {
            let quote = quoted_probe(dst_port, packet);
            let message = icmp_message(icmp::TIME_EXCEEDED, 0, [0; 4], &quote);
            Some(ipv4(protocol::ICMP, router, &message))
        }
        Step::UnreachPort => {
            let quote = quoted_probe(dst_port, packet);
            let message =
                icmp_message(icmp::DEST_UNREACHABLE, icmp::CODE_PORT_UNREACHABLE, [0; 4], &quote);
            Some(ipv4(protocol::ICMP, TARGET, &message))
        }
        Step::UnreachHost => {
            let quote = quoted_probe(dst_port, packet);
            let message = icmp_message(icmp::DEST_UNREACHABLE, 1, [0; 4], &quote);
            Some(ipv4(protocol::ICMP, router, &message))
        }
        Step::EchoReply => {
            // ident + seq echoed from the request, payload included
            let rest = [packet[4], packet[5], packet[6], packet[7]];
            let message = icmp_message(icmp::ECHO_REPLY, 0, rest, &packet[8..]);
            Some(ipv4(protocol::ICMP, TARGET, &message))
        }
        Step::QuotedTcp => {
            let quote = ipv4(protocol::TCP, Ipv4Addr::UNSPECIFIED, &[0u8; 8]);
            let message = icmp_message(icmp::TIME_EXCEEDED, 0, [0; 4], &quote);
            Some(ipv4(protocol::ICMP, router, &message))
        }
    }
}

fn config() -> TraceConfig {
    let mut config = TraceConfig::new(TARGET);
    config.reply_timeout = Duration::from_millis(20);
    config
}

fn prober(config: TraceConfig, script: &[Step]) -> HopProber<ScriptedTransport> {
    let (transport, _) = ScriptedTransport::new(script);
    HopProber::with_transport(config, transport, Cancel::new())
}

#[test]
fn scripted_walk_terminates_on_port_unreachable() {
    let mut prober = prober(
        config(),
        &[Step::Silence, Step::TtlExceeded, Step::TtlExceeded, Step::UnreachPort],
    );
    let hops = prober.run().unwrap();

    assert_eq!(hops.len(), 4);
    assert_eq!(
        hops.iter().map(|hop| hop.ttl).collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );
    assert_eq!(hops[0].class, ReplyClass::Timeout);
    assert_eq!(hops[0].addr, None);
    assert_eq!(hops[0].rtt, None);
    assert_eq!(hops[1].class, ReplyClass::TtlExceeded);
    assert_eq!(hops[1].addr, Some(Ipv4Addr::new(10, 0, 2, 1)));
    assert!(hops[1].rtt.is_some());
    assert_eq!(hops[3].class, ReplyClass::UnreachablePort);
    assert_eq!(hops[3].addr, Some(TARGET));
}

#[test]
fn unreachable_destination_walks_to_max_ttl() {
    // scenario: the destination never answers; every router reports
    // time exceeded except the last few, which stay silent
    let mut script = vec![Step::TtlExceeded; 27];
    script.extend_from_slice(&[Step::Silence, Step::Silence, Step::Silence]);

    let mut prober = prober(config(), &script);
    let hops = prober.run().unwrap();

    assert_eq!(hops.len(), 30);
    assert_eq!(hops.last().unwrap().ttl, 30);
    assert!(matches!(
        hops.last().unwrap().class,
        ReplyClass::Timeout | ReplyClass::TtlExceeded
    ));
    assert!(hops.iter().all(|hop| hop.class != ReplyClass::UnreachablePort));
    // strictly increasing ttl
    assert!(hops.windows(2).all(|pair| pair[0].ttl < pair[1].ttl));
}

#[test]
fn quoted_tcp_keeps_waiting_until_timeout() {
    let mut cfg = config();
    cfg.max_ttl = 1;
    let mut prober = prober(cfg, &[Step::QuotedTcp]);
    let hops = prober.run().unwrap();

    // the reply never reaches the correlator; the attempt times out
    assert_eq!(hops.len(), 1);
    assert_eq!(hops[0].class, ReplyClass::Timeout);
}

#[test]
fn echo_probes_stop_on_echo_reply() {
    let mut cfg = config();
    cfg.use_icmp_echo = true;
    let mut prober = prober(cfg, &[Step::TtlExceeded, Step::EchoReply]);
    let hops = prober.run().unwrap();

    assert_eq!(hops.len(), 2);
    assert_eq!(hops[0].class, ReplyClass::TtlExceeded);
    assert_eq!(hops[1].class, ReplyClass::DestinationHit);
    assert_eq!(hops[1].addr, Some(TARGET));
}

#[test]
fn host_unreachable_is_terminal() {
    let mut prober = prober(config(), &[Step::TtlExceeded, Step::UnreachHost]);
    let hops = prober.run().unwrap();

    assert_eq!(hops.len(), 2);
    assert_eq!(hops[1].class, ReplyClass::UnreachableOther);
}

#[test]
fn retries_stay_on_the_same_ttl_in_attempt_order() {
    let mut cfg = config();
    cfg.max_ttl = 2;
    cfg.retries_per_ttl = 2;
    let mut prober = prober(
        cfg,
        &[Step::Silence, Step::TtlExceeded, Step::TtlExceeded, Step::TtlExceeded],
    );
    let hops = prober.run().unwrap();

    assert_eq!(
        hops.iter().map(|hop| hop.ttl).collect::<Vec<_>>(),
        vec![1, 1, 2, 2]
    );
    assert_eq!(hops[0].class, ReplyClass::Timeout);
    assert_eq!(hops[1].class, ReplyClass::TtlExceeded);
}

#[test]
fn terminal_reply_cuts_remaining_retries() {
    let mut cfg = config();
    cfg.retries_per_ttl = 3;
    let mut prober = prober(cfg, &[Step::UnreachPort]);
    let hops = prober.run().unwrap();

    assert_eq!(hops.len(), 1);
    assert_eq!(hops[0].class, ReplyClass::UnreachablePort);
}

#[test]
fn udp_destination_port_varies_with_sequence() {
    let (transport, sent) = ScriptedTransport::new(&[Step::TtlExceeded, Step::UnreachPort]);
    let mut prober = HopProber::with_transport(config(), transport, Cancel::new());
    prober.run().unwrap();

    let sent = sent.lock().unwrap();
    assert_eq!(sent.as_slice(), &[(1u8, 33434u16 + 1), (2, 33434 + 2)]);
}

#[test]
fn cancelled_walk_sends_nothing() {
    let (transport, sent) = ScriptedTransport::new(&[Step::TtlExceeded]);
    let cancel = Cancel::new();
    cancel.cancel();
    let mut prober = HopProber::with_transport(config(), transport, cancel);

    let hops = prober.run().unwrap();
    assert!(hops.is_empty());
    assert!(sent.lock().unwrap().is_empty());
}
