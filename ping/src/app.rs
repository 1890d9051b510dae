use std::collections::HashMap;
use std::io::ErrorKind;
use std::mem::MaybeUninit;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::mpsc::{self, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::{App, Arg};
use crossterm::style::Stylize;
use rand::random;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;

use traceroute::icmp::{DecodeError, EchoReply, EchoRequest, HEADER_SIZE};
use traceroute::ip::{self, IpV4Packet};
use traceroute::resolve;
use traceroute::TraceError;

/// How long the receiver blocks per read before it re-checks the probe
/// channel and the per-probe deadlines.
const RECV_SLICE: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum PingError {
    #[error("invalid ip packet: {0}")]
    InvalidIpPacket(#[from] ip::Error),
    #[error("invalid icmp packet: {0}")]
    InvalidIcmpPacket(#[from] DecodeError),
    #[error("{0}")]
    Trace(#[from] TraceError),
    #[error("io error: {error}")]
    IoError {
        #[from]
        #[source]
        error: std::io::Error,
    },
}
pub type PingResult<T> = Result<T, PingError>;

/// One echo request in flight, as reported by the sender task.
struct SentProbe {
    seq: u16,
    sent_at: Instant,
}

struct Statistics {
    total_packet_cnt: u32,
    lost_packet_cnt: u32,
    total_time: Duration,
    max_time: Duration,
    min_time: Duration,
}

impl Statistics {
    fn new() -> Statistics {
        Statistics {
            total_packet_cnt: 0,
            lost_packet_cnt: 0,
            total_time: Duration::new(0, 0),
            max_time: Duration::new(0, 0),
            min_time: Duration::new(u64::MAX >> 1, u32::MAX),
        }
    }

    fn record_reply(&mut self, time: Duration) {
        self.total_time += time;
        self.max_time = self.max_time.max(time);
        self.min_time = self.min_time.min(time);
    }
}

pub struct PingApp {
    host: Option<String>,
    addr: Ipv4Addr,
    timeout: Duration,
    interval: Duration,
    ttl: u32,
    size: usize,
    cnt: u32,
}

impl PingApp {
    pub fn from_args() -> PingApp {
        let matches = App::new("ping")
            .arg(
                Arg::new("REMOTE")
                    .takes_value(true)
                    .required(true)
                    .help("Remote ipv4 address or hostname"),
            )
            .arg(
                Arg::new("TIMEOUT")
                    .takes_value(true)
                    .short('t')
                    .long("time-out")
                    .help("Seconds to wait for each reply (default 4)"),
            )
            .arg(
                Arg::new("SIZE")
                    .takes_value(true)
                    .short('n')
                    .long("size")
                    .help("Set the ping data size (bytes)"),
            )
            .arg(
                Arg::new("TTL")
                    .takes_value(true)
                    .short('l')
                    .long("ttl")
                    .help("Set the ttl value"),
            )
            .arg(
                Arg::new("INTERVAL")
                    .takes_value(true)
                    .short('i')
                    .long("interval")
                    .help("Seconds between requests (default 1)"),
            )
            .arg(
                Arg::new("CNT")
                    .takes_value(true)
                    .short('c')
                    .long("cnt")
                    .help("Set ping data packet count"),
            )
            .about("Ping a remote ipv4 host.")
            .version("0.1.0")
            .get_matches();

        let host = matches.value_of("REMOTE").unwrap();
        let (host, addr) = match resolve::look_up_ipv4(host) {
            Ok(resolved) => resolved,
            Err(err) => {
                eprintln!("ping: {}", format!("{}", err).red());
                std::process::exit(1);
            }
        };

        let timeout = matches
            .value_of("TIMEOUT")
            .map(|secs| Duration::from_secs(secs.parse().expect("Invalid time-out value")))
            .unwrap_or(Duration::from_secs(4));
        let interval = matches
            .value_of("INTERVAL")
            .map(|secs| Duration::from_secs(secs.parse().expect("Invalid interval value")))
            .unwrap_or(Duration::from_secs(1));
        let ttl = matches
            .value_of("TTL")
            .map(|ttl| ttl.parse().expect("Invalid ttl value"))
            .unwrap_or(64);
        let size = matches
            .value_of("SIZE")
            .map(|size| size.parse().expect("Invalid size value"))
            .unwrap_or(32);
        let cnt = matches
            .value_of("CNT")
            .map(|cnt| cnt.parse().expect("Invalid cnt value"))
            .unwrap_or(4);

        PingApp {
            host,
            addr,
            timeout,
            interval,
            ttl,
            size,
            cnt,
        }
    }

    pub fn run(&self) -> PingResult<()> {
        let ip = format!("{}", self.addr).blue();
        let size = format!("{}", self.size).blue();

        match self.host {
            Some(ref host) => {
                println!("ping {} [{}] with {} bytes of data: ", host.as_str().green(), ip, size);
            }
            None => println!("ping {} with {} bytes of data: ", ip, size),
        }

        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))
            .map_err(TraceError::SocketSetup)?;
        socket.set_ttl(self.ttl).map_err(TraceError::SocketSetup)?;
        socket
            .set_read_timeout(Some(RECV_SLICE))
            .map_err(TraceError::SocketSetup)?;
        let socket = Arc::new(socket);

        let ident = std::process::id() as u16;
        let mut stats = Statistics::new();
        stats.total_packet_cnt = self.cnt;

        // the sender task owns the sequence counter; probes in flight
        // reach the receiver only through this channel, so neither side
        // shares mutable state with the other. dropping the sender's end
        // tells the receiver no more probes are coming.
        let (probe_tx, probe_rx) = mpsc::channel::<SentProbe>();

        let sender = {
            let socket = Arc::clone(&socket);
            let dest = SocketAddrV4::new(self.addr, 0);
            let (cnt, size, interval) = (self.cnt, self.size, self.interval);

            thread::spawn(move || -> PingResult<()> {
                let mut buffer = vec![0u8; HEADER_SIZE + size];
                for seq in 1..=cnt as u16 {
                    let payload: Vec<u8> = (0..size).map(|_| random()).collect();
                    buffer.fill(0);

                    let request = EchoRequest {
                        ident,
                        seq_cnt: seq,
                        payload: &payload,
                    };
                    request.encode(&mut buffer)?;

                    let sent_at = Instant::now();
                    socket
                        .send_to(&buffer, &dest.into())
                        .map_err(TraceError::Send)?;

                    // receiver gone means we are shutting down early
                    if probe_tx.send(SentProbe { seq, sent_at }).is_err() {
                        break;
                    }

                    if seq as u32 != cnt {
                        thread::sleep(interval);
                    }
                }
                Ok(())
            })
        };

        self.receive_replies(&socket, probe_rx, ident, &mut stats)?;

        sender.join().expect("sender task panicked")?;

        self.print_statistics(&stats);
        Ok(())
    }

    /// Drains the probe channel and the raw socket until the sender is
    /// done and every outstanding probe is answered or expired.
    fn receive_replies(
        &self,
        socket: &Socket,
        probe_rx: mpsc::Receiver<SentProbe>,
        ident: u16,
        stats: &mut Statistics,
    ) -> PingResult<()> {
        let ip = format!("{}", self.addr).blue();
        let size = format!("{}", self.size).blue();

        let mut outstanding: HashMap<u16, Instant> = HashMap::new();
        let mut sender_done = false;

        while !(sender_done && outstanding.is_empty()) {
            loop {
                match probe_rx.try_recv() {
                    Ok(probe) => {
                        outstanding.insert(probe.seq, probe.sent_at);
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        sender_done = true;
                        break;
                    }
                }
            }

            // expire probes whose deadline passed
            let timeout = self.timeout;
            let expired: Vec<u16> = outstanding
                .iter()
                .filter(|(_, sent_at)| sent_at.elapsed() >= timeout)
                .map(|(&seq, _)| seq)
                .collect();
            for seq in expired {
                outstanding.remove(&seq);
                stats.lost_packet_cnt += 1;
                println!("Request timed out: seq={}", format!("{}", seq).red());
            }

            let datagram = match self.read_datagram(socket)? {
                Some(datagram) => datagram,
                None => continue,
            };

            let packet = match IpV4Packet::decode(&datagram) {
                Ok(packet) => packet,
                Err(_) => continue,
            };
            let reply = match EchoReply::decode(packet.data) {
                Ok(reply) => reply,
                // not an echo reply (or not one of ours): keep reading
                Err(_) => continue,
            };

            if reply.ident != ident {
                continue;
            }
            if let Some(sent_at) = outstanding.remove(&reply.seq_cnt) {
                let time = sent_at.elapsed();
                stats.record_reply(time);

                let ttl = format!("{}", packet.ttl).yellow();
                let time = format!("{:?}", time).green();
                println!(
                    "Reply from {}: bytes={} time={} ttl={}",
                    ip, size, time, ttl
                );
            }
        }

        Ok(())
    }

    fn read_datagram(&self, socket: &Socket) -> PingResult<Option<Vec<u8>>> {
        let mut raw = [MaybeUninit::<u8>::uninit(); 2048];
        match socket.recv_from(&mut raw) {
            Ok((received, _)) => {
                let bytes: &[u8] =
                    unsafe { std::slice::from_raw_parts(raw.as_ptr() as *const u8, received) };
                Ok(Some(bytes.to_vec()))
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => Ok(None),
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                Ok(None)
            }
            Err(err) => Err(TraceError::Recv(err).into()),
        }
    }

    fn print_statistics(&self, stats: &Statistics) {
        let ip = format!("{}", self.addr).blue();

        let mut min_time = stats.min_time;
        let mut total_time = stats.total_time;
        if min_time > stats.max_time {
            // every request timed out
            min_time = stats.max_time;
            total_time = stats.max_time * self.cnt;
        }

        let total = format!("{}", stats.total_packet_cnt).blue();
        let recv = format!("{}", stats.total_packet_cnt - stats.lost_packet_cnt).green();
        let lost = format!("{}", stats.lost_packet_cnt).red();
        let lost_percentage = {
            let percentage =
                stats.lost_packet_cnt as f64 / stats.total_packet_cnt as f64 * 100.0;
            let percentage_str = format!("{}", percentage);

            if percentage > 40.0 {
                percentage_str.red()
            } else if percentage > 20.0 {
                percentage_str.yellow()
            } else {
                percentage_str.green()
            }
        };
        let max_time = format!("{:#2?}", stats.max_time).green();
        let min_time = format!("{:#2?}", min_time).green();
        let avg_time = format!("{:#2?}", total_time / stats.total_packet_cnt.max(1)).green();

        println!("Ping statistics for {}: ", ip);
        println!(
            "    Packets: Sent = {}, Received = {}, Loss = {} ({}% loss)",
            total, recv, lost, lost_percentage
        );
        println!("Approximate round trip times in milli-seconds: ");
        println!(
            "    Minimum = {}, Maximum = {}, Average = {}",
            min_time, max_time, avg_time
        );
    }
}
