//! Interactive relay example.
//!
//! Drives the relay from the console, standing in for the two platform
//! integrations a real embedding provides: a default-device watcher and a
//! low-level key hook. Type commands to simulate both and watch the relay
//! decide.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example interactive -- 192.168.1.50 AA:BB:CC:DD:EE:FF
//! ```

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use tv_volume_relay::{
    EndpointSnapshot, HostVolume, HostVolumeError, KeyStore, RelayConfig, VolumeKey, VolumeRelay,
};

/// Stands in for the platform mixer: one scalar level, printed on change.
struct ConsoleVolume {
    level: Mutex<f32>,
}

impl ConsoleVolume {
    fn new(level: f32) -> Self {
        Self {
            level: Mutex::new(level),
        }
    }
}

impl HostVolume for ConsoleVolume {
    fn level(&self) -> Result<f32, HostVolumeError> {
        Ok(*self.level.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn set_level(&self, level: f32) -> Result<(), HostVolumeError> {
        *self.level.lock().unwrap_or_else(PoisonError::into_inner) = level;
        println!("[host] output level set to {level:.2}");
        Ok(())
    }
}

fn read_command() -> Option<String> {
    print!("> ");
    io::stdout().flush().ok();
    let mut line = String::new();
    if io::stdin().read_line(&mut line).is_err() || line.is_empty() {
        return None;
    }
    Some(line.trim().to_string())
}

fn print_help() {
    println!("Commands:");
    println!("  tv        the television became the default device (spatial audio on)");
    println!("  tv-basic  the television became the default device (spatial audio off)");
    println!("  away      the default device moved elsewhere");
    println!("  up/down   press a volume key");
    println!("  mute      press the mute key");
    println!("  pair      pair with the television (accept the on-screen prompt)");
    println!("  unpair    delete the stored client key");
    println!("  status    show the relay status");
    println!("  quit      shut down");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let (Some(address), Some(mac_address)) = (args.next(), args.next()) else {
        eprintln!("Usage: interactive <address> <mac>");
        std::process::exit(2);
    };

    let relay = VolumeRelay::builder()
        .config(RelayConfig {
            address,
            mac_address,
            ..RelayConfig::default()
        })
        .host_volume(ConsoleVolume::new(0.5))
        .key_store(KeyStore::at("client_key.txt"))
        .on_event(|event| println!("[event] {event:?}"))
        .start()
        .await?;

    println!("=== tv-volume-relay interactive console ===");
    print_help();

    loop {
        let Some(command) = read_command() else {
            break;
        };
        match command.as_str() {
            "tv" => relay.endpoint_changed(Some(EndpointSnapshot::new("LG TV SSCR2", true))),
            "tv-basic" => {
                relay.endpoint_changed(Some(EndpointSnapshot::new("LG TV SSCR2", false)));
            }
            "away" => relay.endpoint_changed(None),
            "up" => println!("key disposition: {:?}", relay.key_pressed(VolumeKey::Up)),
            "down" => println!("key disposition: {:?}", relay.key_pressed(VolumeKey::Down)),
            "mute" => println!("key disposition: {:?}", relay.key_pressed(VolumeKey::Mute)),
            "pair" => match relay.pair().await {
                Ok(()) => println!("paired"),
                Err(err) => println!("pairing failed: {err}"),
            },
            "unpair" => match relay.unpair().await {
                Ok(()) => println!("unpaired"),
                Err(err) => println!("unpair failed: {err}"),
            },
            "status" => println!("{:#?}", relay.status()),
            "quit" => break,
            "" => {}
            _ => print_help(),
        }
    }

    println!("Shutting down...");
    relay.shutdown().await;
    Ok(())
}
