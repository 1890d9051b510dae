use std::io::{self, Write};
use std::net::Ipv4Addr;
use std::process::exit;
use std::time::Duration;

use clap::{App, Arg};
use crossterm::style::Stylize;

use traceroute::{resolve, Cancel, HopProber, TraceConfig};

fn main() {
    let matches = App::new("traceroute")
        .arg(
            Arg::new("HOST")
                .takes_value(true)
                .required(true)
                .help("Hostname or ipv4 address to trace the path to"),
        )
        .arg(
            Arg::new("USE_PING")
                .short('p')
                .long("use-ping")
                .help("Probe with ICMP echo requests instead of UDP datagrams"),
        )
        .arg(
            Arg::new("MAX_TTL")
                .takes_value(true)
                .short('m')
                .long("max-ttl")
                .help("Give up after this many hops (default 30)"),
        )
        .arg(
            Arg::new("RETRIES")
                .takes_value(true)
                .short('r')
                .long("retries")
                .help("Probes per hop (default 1)"),
        )
        .arg(
            Arg::new("TIMEOUT")
                .takes_value(true)
                .short('t')
                .long("time-out")
                .help("Seconds to wait for each reply (default 1)"),
        )
        .about("Discover the route to a host, hop by hop.")
        .version("0.1.0")
        .get_matches();

    let host = matches.value_of("HOST").unwrap();
    let (host_name, addr) = match resolve::look_up_ipv4(host) {
        Ok(resolved) => resolved,
        Err(err) => {
            eprintln!("traceroute: {}", format!("{}", err).red());
            exit(1);
        }
    };

    let mut config = TraceConfig::new(addr);
    config.use_icmp_echo = matches.is_present("USE_PING");
    if let Some(max_ttl) = matches.value_of("MAX_TTL") {
        config.max_ttl = max_ttl.parse().expect("Invalid max-ttl value");
    }
    if let Some(retries) = matches.value_of("RETRIES") {
        config.retries_per_ttl = retries.parse().expect("Invalid retries value");
    }
    if let Some(timeout) = matches.value_of("TIMEOUT") {
        let secs: u64 = timeout.parse().expect("Invalid time-out value");
        config.reply_timeout = Duration::from_secs(secs);
    }

    match host_name {
        Some(name) => println!(
            "traceroute to {} [{}], {} hops max:",
            name.green(),
            addr.to_string().blue(),
            config.max_ttl
        ),
        None => println!(
            "traceroute to {}, {} hops max:",
            addr.to_string().blue(),
            config.max_ttl
        ),
    }

    let mut prober = match HopProber::new(config, Cancel::new()) {
        Ok(prober) => prober,
        Err(err) => {
            eprintln!("traceroute: {}", format!("{}", err).red());
            exit(1);
        }
    };

    // one line per ttl; retries append to it, repeating the address only
    // when it changes
    let mut current_ttl = 0u8;
    let mut last_addr: Option<Ipv4Addr> = None;
    let outcome = prober.walk(|hop| {
        if hop.ttl != current_ttl {
            if current_ttl != 0 {
                println!();
            }
            current_ttl = hop.ttl;
            last_addr = None;
            print!("{:>2}", hop.ttl);
        }

        match hop.addr {
            None => print!(" {}", "?".yellow()),
            Some(addr) => {
                if last_addr != Some(addr) {
                    print!(" {}", addr.to_string().blue());
                    last_addr = Some(addr);
                }
                if let Some(rtt) = hop.rtt {
                    let msec = format!("{:.3} msec", rtt.as_secs_f64() * 1000.0);
                    print!(" {}", msec.green());
                }
                if hop.class.is_terminal() {
                    print!(" {}", "(destination reached)".green());
                }
            }
        }

        let _ = io::stdout().flush();
    });
    println!();

    if let Err(err) = outcome {
        eprintln!("traceroute: {}", format!("{}", err).red());
        exit(1);
    }
}
