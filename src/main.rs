#[macro_use]
extern crate log;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gb_savestate::cartridge::Cartridge;
use gb_savestate::savestate;
use gb_savestate::GameBoy;

use std::path::{Path, PathBuf};

#[derive(Parser)]
struct Args {
  /// Log at debug level unless RUST_LOG says otherwise
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Print the cartridge header of a ROM
  Info { rom: PathBuf },
  /// Print the header of a save state
  Inspect { state: PathBuf },
  /// Write a power-on save state for a ROM
  Save {
    rom: PathBuf,
    state: PathBuf,
    /// Store the body uncompressed
    #[arg(long)]
    raw: bool,
  },
  /// Check that a save state loads against a ROM
  Load { rom: PathBuf, state: PathBuf },
}

fn main() -> Result<()> {
  let args = Args::parse();
  let level = if args.verbose { "debug" } else { "info" };
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

  match args.command {
    Command::Info { rom } => {
      let cart = open_cartridge(&rom)?;
      println!("title:    {}", cart.title_string());
      println!("mbc:      {:?}", cart.kind());
      println!("rom size: {} KiB", cart.rom_size() >> 10);
      println!("ram size: {} KiB", cart.ram_size() >> 10);
    }
    Command::Inspect { state } => {
      let header = savestate::read_header(&state)
        .with_context(|| format!("failed to read {}", state.display()))?;
      println!("version:    {}", header.version);
      println!("compressed: {}", header.compressed);
      println!("title:      {}", header.title_string());
    }
    Command::Save { rom, state, raw } => {
      let mut gb = GameBoy::new(open_cartridge(&rom)?);
      if raw {
        gb.set_compress(false);
      }
      gb.save_state(&state)
        .with_context(|| format!("failed to save {}", state.display()))?;
    }
    Command::Load { rom, state } => {
      let mut gb = GameBoy::new(open_cartridge(&rom)?);
      gb.load_state(&state)
        .with_context(|| format!("failed to load {}", state.display()))?;
      println!("mbc:   {:?}", gb.mbc().state());
      println!("timer: {:?}", gb.timer().state());
    }
  }
  Ok(())
}

fn open_cartridge(path: &Path) -> Result<Cartridge> {
  debug!("Opening ROM {}", path.display());
  Cartridge::from_file(path).with_context(|| format!("failed to load ROM {}", path.display()))
}
