//! Interfaces command - list network interfaces and routes.

use anyhow::Result;
use nmapkit_core::{options, CancelToken, Scanner};

use super::{stored_options, truncate};

pub async fn run(json: bool) -> Result<()> {
    let mut opts = stored_options().await?;
    opts.push(options::interface_listing());
    let scanner = Scanner::new(opts).await?;
    let result = scanner.run(&CancelToken::new()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result.interfaces)?);
        return Ok(());
    }

    if result.interfaces.is_empty() {
        println!("No interfaces found.");
    } else {
        println!(
            "{:<16} {:<10} {:<5} {:<6} {:<18} ADDRESSES",
            "DEVICE", "TYPE", "UP", "MTU", "MAC"
        );
        println!("{}", "-".repeat(90));

        for iface in &result.interfaces {
            let addresses = iface
                .addresses
                .iter()
                .map(|a| format!("{}/{}", a.ip, a.prefix_len))
                .collect::<Vec<_>>()
                .join(", ");
            println!(
                "{:<16} {:<10} {:<5} {:<6} {:<18} {}",
                truncate(&iface.name, 16),
                truncate(&iface.kind, 10),
                if iface.flags.up { "up" } else { "down" },
                iface.mtu,
                iface.mac.as_deref().unwrap_or("-"),
                if addresses.is_empty() { "-".to_string() } else { addresses }
            );
        }
    }

    if !result.routes.is_empty() {
        println!();
        println!("{:<32} {:<16} {:<8} GATEWAY", "DESTINATION", "DEVICE", "METRIC");
        println!("{}", "-".repeat(72));
        for route in &result.routes {
            println!(
                "{:<32} {:<16} {:<8} {}",
                format!("{}/{}", route.destination, route.prefix_len),
                truncate(&route.device, 16),
                route.metric,
                route
                    .gateway
                    .map(|g| g.to_string())
                    .unwrap_or_else(|| "-".to_string())
            );
        }
    }

    println!(
        "\nTotal: {} interfaces, {} routes",
        result.interfaces.len(),
        result.routes.len()
    );
    Ok(())
}
