use std::{fs, sync::Mutex};

use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use thoughtboard::{config::Settings, ui};

/// Logs go to a file because the terminal belongs to the UI. Without a
/// writable data directory logging stays off.
fn init_tracing() {
    let Some(dir) = dirs::data_local_dir().map(|d| d.join("thoughtboard")) else {
        return;
    };
    if fs::create_dir_all(&dir).is_err() {
        return;
    }
    let Ok(file) = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("thoughtboard.log"))
    else {
        return;
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("thoughtboard=info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    ui::run(Settings::load())
}
