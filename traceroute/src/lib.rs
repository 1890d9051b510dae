//! ICMP path probing: the shared core behind the `traceroute` and `ping`
//! binaries.
//!
//! The pieces line up with how a probe travels: [`probe`] builds the
//! outgoing packet (checksummed by [`checksum`]), [`walker`] sends it and
//! waits, [`reply`] decodes whatever comes back off the raw socket
//! ([`ip`] and [`icmp`] hold the per-header readers), and [`correlate`]
//! decides whether the reply answers the probe that is in flight.

pub mod checksum;
pub mod config;
pub mod correlate;
pub mod error;
pub mod icmp;
pub mod ip;
pub mod probe;
pub mod reply;
pub mod resolve;
pub mod walker;

pub use config::TraceConfig;
pub use correlate::ReplyClass;
pub use error::{TraceError, TraceResult};
pub use walker::{Cancel, Hop, HopProber};
