use std::net::{IpAddr, Ipv4Addr};

use crate::error::TraceError;

/// Resolves `host` to an IPv4 address using the system resolver
/// configuration. The probing core never calls this; only the CLI layer
/// does, handing the resolved address to [`crate::config::TraceConfig`].
pub fn look_up_ipv4(host: &str) -> Result<(Option<String>, Ipv4Addr), TraceError> {
    // already dotted-decimal? no lookup needed
    if let Ok(addr) = host.parse::<Ipv4Addr>() {
        return Ok((None, addr));
    }

    let resolver = trust_dns_resolver::Resolver::default().map_err(|err| TraceError::Resolve {
        host: host.to_string(),
        reason: err.to_string(),
    })?;
    let lookup = resolver.lookup_ip(host).map_err(|err| TraceError::Resolve {
        host: host.to_string(),
        reason: err.to_string(),
    })?;

    let record = lookup
        .as_lookup()
        .record_iter()
        .find_map(|record| {
            let name = record.name().to_string();
            match record.data().and_then(|data| data.to_ip_addr()) {
                Some(IpAddr::V4(addr)) => Some((name, addr)),
                _ => None,
            }
        });

    match record {
        Some((name, addr)) => Ok((Some(name), addr)),
        None => Err(TraceError::Resolve {
            host: host.to_string(),
            reason: "no ipv4 address in answer".to_string(),
        }),
    }
}
