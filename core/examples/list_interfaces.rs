//! Example: Print the host's network interfaces as indented JSON.

use nmapkit_core::{CancelToken, Scanner};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let scanner = match Scanner::new([nmapkit_core::options::interface_listing()]).await {
        Ok(scanner) => scanner,
        Err(e) => {
            eprintln!("unable to create nmap scanner: {}", e);
            std::process::exit(1);
        }
    };

    let result = match scanner.run(&CancelToken::new()).await {
        Ok(result) => result,
        Err(e) => {
            eprintln!("unable to list interfaces: {}", e);
            std::process::exit(1);
        }
    };

    match serde_json::to_string_pretty(&result.interfaces) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("unable to encode interfaces: {}", e);
            std::process::exit(1);
        }
    }
}
