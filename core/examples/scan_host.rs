//! Example: Scan the most common ports of one host and print what is open.
//!
//! Usage: `cargo run --example scan_host -- scanme.nmap.org`

use nmapkit_core::{options, CancelToken, Scanner};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let target = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1".to_string());
    println!("Scanning {}...\n", target);

    let scanner = match Scanner::new([
        options::targets([target]),
        options::top_ports(100),
        options::service_detection(),
    ])
    .await
    {
        Ok(scanner) => scanner,
        Err(e) => {
            eprintln!("Error creating scanner: {}", e);
            return;
        }
    };

    match scanner.run(&CancelToken::new()).await {
        Ok(result) => {
            if result.hosts.is_empty() {
                println!("No hosts found.");
                return;
            }

            for host in &result.hosts {
                let addr = host
                    .ip()
                    .map(|ip| ip.to_string())
                    .unwrap_or_else(|| "?".to_string());
                println!("{} ({:?})", addr, host.status.state);
                println!("{:<10} {:<10} {:<15} {}", "PORT", "STATE", "SERVICE", "VERSION");
                println!("{}", "-".repeat(60));

                for port in host.open_ports() {
                    let service = port.service.as_ref();
                    let version = service
                        .map(|s| {
                            [s.product.as_deref(), s.version.as_deref()]
                                .into_iter()
                                .flatten()
                                .collect::<Vec<_>>()
                                .join(" ")
                        })
                        .unwrap_or_default();

                    println!(
                        "{:<10} {:<10} {:<15} {}",
                        format!("{}/{}", port.number, port.protocol),
                        port.state.state,
                        service.map(|s| s.name.as_str()).unwrap_or(""),
                        version
                    );
                }
                println!();
            }

            if let Some(stats) = &result.stats {
                println!(
                    "Done: {} up, {} down in {:.2}s",
                    stats.hosts_up, stats.hosts_down, stats.elapsed
                );
            }
        }
        Err(e) => {
            eprintln!("Error scanning: {}", e);
        }
    }
}
