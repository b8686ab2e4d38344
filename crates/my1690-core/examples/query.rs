//! Dump everything the player will tell us about itself.
//!
//! Usage: `cargo run --example query -- /dev/ttyUSB0`

use my1690_core::commands::{EqMode, LoopMode};
use my1690_core::prelude::*;
use my1690_core::session::SessionConfig;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let port_name = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("usage: query <port>"))?;

    let mut session = Session::new(SessionConfig {
        port_name,
        ..SessionConfig::default()
    });
    session.connect()?;

    println!("dialect:        {:?}", session.dialect());
    println!("firmware:       {:?}", session.firmware_version());
    println!("playing:        {}", session.is_playing()?);
    println!("volume:         {}", session.get_volume()?);
    println!("songs on card:  {}", session.get_song_count()?);
    println!("current track:  {}", session.get_current_track()?);
    println!("elapsed (s):    {}", session.get_elapsed_time()?);
    println!("total (s):      {}", session.get_total_time()?);

    let eq = session.get_eq()?;
    match EqMode::try_from((eq & 0xFF) as u8) {
        Ok(mode) => println!("equalizer:      {mode:?}"),
        Err(_) => println!("equalizer:      raw {eq}"),
    }
    let loop_mode = session.get_loop_mode()?;
    match LoopMode::try_from((loop_mode & 0xFF) as u8) {
        Ok(mode) => println!("loop mode:      {mode:?}"),
        Err(_) => println!("loop mode:      raw {loop_mode}"),
    }

    Ok(())
}
