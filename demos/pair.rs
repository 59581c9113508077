//! Television pairing example.
//!
//! Pairs with a television over the local network, stores the client key in
//! `client_key.txt`, then sends one volume step to prove the credential.
//!
//! Run with: cargo run --example pair -- 192.168.1.50 AA:BB:CC:DD:EE:FF

use tv_volume_relay::{KeyStore, RelayConfig, TvClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let (Some(address), Some(mac_address)) = (args.next(), args.next()) else {
        eprintln!("Usage: pair <address> <mac>");
        std::process::exit(2);
    };

    let client = TvClient::new(
        RelayConfig {
            address,
            mac_address,
            ..RelayConfig::default()
        },
        KeyStore::at("client_key.txt"),
    );

    if client.is_paired() {
        println!("Already paired; delete client_key.txt to pair again.");
        return Ok(());
    }

    println!("Requesting pairing. Accept the prompt on the television...");
    client.pair().await?;
    println!("Paired. The client key is stored in client_key.txt.");

    client.volume_up().await?;
    println!("Sent one volume-up step as a check.");

    Ok(())
}
