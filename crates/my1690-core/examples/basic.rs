//! Connect to a player, set the volume and start the first track.
//!
//! Usage: `cargo run --example basic -- /dev/ttyUSB0`

use my1690_core::prelude::*;
use my1690_core::serial::list_ports;
use my1690_core::session::SessionConfig;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let port_name = match std::env::args().nth(1) {
        Some(name) => name,
        None => {
            let ports = list_ports();
            anyhow::ensure!(!ports.is_empty(), "no serial ports found");
            println!("available ports:");
            for port in &ports {
                let product = port.product.as_deref().unwrap_or("unknown device");
                println!("  {} ({product})", port.name);
            }
            ports[0].name.clone()
        }
    };

    let mut session = Session::new(SessionConfig {
        port_name: port_name.clone(),
        ..SessionConfig::default()
    });

    println!("connecting to {port_name}...");
    session.connect()?;
    println!(
        "connected: dialect {:?}, firmware {:?}",
        session.dialect(),
        session.firmware_version()
    );

    session.set_volume(15)?;
    if session.play_track(1)? {
        println!("playing track 1");
    } else {
        println!("player did not confirm track selection");
    }

    Ok(())
}
