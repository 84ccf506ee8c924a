//! Scan command - run nmap against targets and show the results.

use std::time::Duration;

use anyhow::Result;
use chrono::{Local, TimeZone};
use nmapkit_core::{options, CancelToken, ScanResult, Scanner, TimingTemplate};

use super::{stored_options, truncate};

pub struct ScanArgs {
    pub targets: Vec<String>,
    pub ports: Option<String>,
    pub top_ports: Option<u32>,
    pub service: bool,
    pub os: bool,
    pub timing: Option<u8>,
    pub timeout: Option<u64>,
}

pub async fn run(args: ScanArgs, json: bool) -> Result<()> {
    let mut opts = stored_options().await?;
    opts.push(options::targets(args.targets));
    if let Some(ports) = args.ports {
        opts.push(options::ports(ports));
    }
    if let Some(n) = args.top_ports {
        opts.push(options::top_ports(n));
    }
    if args.service {
        opts.push(options::service_detection());
    }
    if args.os {
        opts.push(options::os_detection());
    }
    if let Some(template) = args.timing.and_then(TimingTemplate::from_level) {
        opts.push(options::timing(template));
    }
    if let Some(secs) = args.timeout {
        opts.push(options::timeout(Duration::from_secs(secs)));
    }

    let scanner = Scanner::new(opts).await?;

    // Ctrl-C cancels the run; nmap gets SIGTERM, then SIGKILL.
    let cancel = CancelToken::new();
    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });
    let result = scanner.run(&cancel).await;
    watcher.abort();

    let result = match result {
        Ok(result) => result,
        Err(e) if e.is_interrupted() => {
            eprintln!("{}", e);
            std::process::exit(130);
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    Ok(())
}

/// Human-readable report, one table per host.
pub(crate) fn print_result(result: &ScanResult) {
    if let Some(run) = &result.metadata.run {
        let started = run
            .start
            .and_then(|s| Local.timestamp_opt(s as i64, 0).single())
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "unknown time".to_string());
        println!(
            "{} {} at {}\n",
            run.scanner,
            run.version.as_deref().unwrap_or(""),
            started
        );
    }

    if result.hosts.is_empty() {
        println!("No hosts found.");
    }

    for host in &result.hosts {
        let addr = host
            .ip()
            .map(|ip| ip.to_string())
            .or_else(|| host.addresses.first().map(|a| a.addr.clone()))
            .unwrap_or_else(|| "?".to_string());
        let name = host
            .hostnames
            .first()
            .map(|h| format!(" ({})", h.name))
            .unwrap_or_default();
        println!("Host {}{} is {:?}", addr, name, host.status.state);

        if let Some(mac) = host.mac() {
            println!("  MAC: {} {}", mac.addr, mac.vendor.as_deref().unwrap_or(""));
        }

        if !host.ports.is_empty() {
            println!(
                "  {:<10} {:<14} {:<15} VERSION",
                "PORT", "STATE", "SERVICE"
            );
            for port in &host.ports {
                let service = port.service.as_ref();
                let version = service
                    .map(|s| {
                        [s.product.as_deref(), s.version.as_deref(), s.extra_info.as_deref()]
                            .into_iter()
                            .flatten()
                            .collect::<Vec<_>>()
                            .join(" ")
                    })
                    .unwrap_or_default();
                println!(
                    "  {:<10} {:<14} {:<15} {}",
                    format!("{}/{}", port.number, port.protocol),
                    port.state.state,
                    truncate(service.map(|s| s.name.as_str()).unwrap_or("-"), 15),
                    truncate(&version, 40)
                );
            }
        }
        for extra in &host.extra_ports {
            println!("  Not shown: {} {} ports", extra.count, extra.state);
        }

        if let Some(os) = host.best_os_match() {
            println!("  OS: {} ({}%)", os.name, os.accuracy);
        }
        println!();
    }

    if let Some(stats) = &result.stats {
        println!(
            "Total: {} hosts ({} up, {} down) in {:.2}s",
            stats.hosts_total, stats.hosts_up, stats.hosts_down, stats.elapsed
        );
    }
}
