//! Command-line front end for `omega_gpio`.
//!
//! ```bash
//! omega-gpio on 8
//! omega-gpio set 8 0
//! omega-gpio get 8
//! omega-gpio --lifecycle eager get 8
//! omega-gpio pins
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use omega_gpio::{sysfs::SysfsFs, Level, Lifecycle, OmegaGpio, OMEGA_PINS};

/// Simple GPIO control for the Onion Omega
#[derive(Parser)]
#[command(name = "omega-gpio")]
#[command(version)]
#[command(about = "Export, drive and read the GPIO pins of an Onion Omega")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Pin export lifecycle: "per-operation" or "eager"
    #[arg(long, global = true, env = "OMEGA_GPIO_LIFECYCLE", default_value = "per-operation")]
    lifecycle: Lifecycle,

    /// Resolve the sysfs paths below this directory instead of /
    #[arg(long, global = true)]
    sysfs_root: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive a pin high
    On { pin: u32 },

    /// Drive a pin low
    Off { pin: u32 },

    /// Write 0 or 1 to a pin
    Set { pin: u32, value: u8 },

    /// Read a pin and print 0 or 1
    Get { pin: u32 },

    /// List the pins of the board
    Pins,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    if let Commands::Pins = cli.command {
        for pin in OMEGA_PINS {
            println!("{}", pin);
        }
        return Ok(());
    }

    let port = match &cli.sysfs_root {
        Some(root) => SysfsFs::with_root(root),
        None => SysfsFs::new(),
    };
    let mut gpio = OmegaGpio::with_port(port, cli.lifecycle)
        .with_context(|| format!("Failed to initialise GPIO ({} lifecycle)", cli.lifecycle))?;

    match cli.command {
        Commands::On { pin } => gpio
            .pin_on(pin)
            .with_context(|| format!("Failed to turn pin {} on", pin))?,
        Commands::Off { pin } => gpio
            .pin_off(pin)
            .with_context(|| format!("Failed to turn pin {} off", pin))?,
        Commands::Set { pin, value } => {
            let level = Level::try_from(value)?;
            gpio.set_value(pin, level)
                .with_context(|| format!("Failed to set pin {} to {}", pin, level))?
        }
        Commands::Get { pin } => {
            let level = gpio
                .get_value(pin)
                .with_context(|| format!("Failed to read pin {}", pin))?;
            println!("{}", level);
        }
        Commands::Pins => {}
    }

    Ok(())
}
