use std::net::Ipv4Addr;
use std::time::Duration;

use crate::probe::BASE_DST_PORT;

/// Knobs for one path trace. Filled by the CLI layer, consumed by the
/// walker; defaults follow classic traceroute.
#[derive(Debug, Clone)]
pub struct TraceConfig {
    /// Resolved IPv4 destination; resolution happens outside the core.
    pub target: Ipv4Addr,
    /// Probe with ICMP echo requests instead of UDP datagrams.
    pub use_icmp_echo: bool,
    pub max_ttl: u8,
    pub retries_per_ttl: u8,
    /// Hard deadline per probe attempt.
    pub reply_timeout: Duration,
    /// UDP probes go to `base_port + seq`.
    pub base_port: u16,
}

impl TraceConfig {
    pub fn new(target: Ipv4Addr) -> TraceConfig {
        TraceConfig {
            target,
            use_icmp_echo: false,
            max_ttl: 30,
            retries_per_ttl: 1,
            reply_timeout: Duration::from_secs(1),
            base_port: BASE_DST_PORT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = TraceConfig::new(Ipv4Addr::new(8, 8, 8, 8));
        assert_eq!(config.max_ttl, 30);
        assert_eq!(config.retries_per_ttl, 1);
        assert_eq!(config.reply_timeout, Duration::from_secs(1));
        assert_eq!(config.base_port, 33434);
        assert!(!config.use_icmp_echo);
    }
}
