use crate::mem::mbc::MbcKind;
use crate::state::{Snapshot, StateStream};

use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;

/// Length of the raw title field in the cartridge header.
pub const TITLE_LEN: usize = 16;

pub const ROM_BANK_SHIFT: u32 = 14;
pub const RAM_BANK_SHIFT: u32 = 13;

const TITLE_START: usize = 0x0134;
const CART_TYPE: usize = 0x0147;
const ROM_SIZE: usize = 0x0148;
const RAM_SIZE: usize = 0x0149;
const HEADER_END: usize = 0x0150;

#[derive(Debug, Error)]
pub enum CartridgeError {
  #[error("ROM image is {0} bytes, too small to hold a cartridge header")]
  TooSmall(usize),
  #[error("unsupported cartridge type 0x{0:02x}")]
  Unsupported(u8),
  #[error("invalid ROM size code 0x{0:02x}")]
  InvalidRomSize(u8),
  #[error("invalid RAM size code 0x{0:02x}")]
  InvalidRamSize(u8),
  #[error("failed to read ROM file")]
  Io(#[from] io::Error),
}

/// ROM/RAM image of the inserted game plus its header metadata.
#[derive(Debug)]
pub struct Cartridge {
  rom: Vec<u8>,
  ram: Vec<u8>,
  title: [u8; TITLE_LEN],
  kind: MbcKind,
  ram_enabled: bool,
}

impl Cartridge {
  /// Build a cartridge from a raw ROM image, sizing the ROM and RAM
  /// buffers from the header.
  pub fn new(mut rom: Vec<u8>) -> Result<Cartridge, CartridgeError> {
    if rom.len() < HEADER_END {
      return Err(CartridgeError::TooSmall(rom.len()));
    }

    let kind = match rom[CART_TYPE] {
      0x00 | 0x08 | 0x09 => MbcKind::None,
      0x01..=0x03 => MbcKind::Mbc1,
      0x0f..=0x13 => MbcKind::Mbc3,
      0x19..=0x1e => MbcKind::Mbc5,
      t => return Err(CartridgeError::Unsupported(t)),
    };
    let rom_size = match rom[ROM_SIZE] {
      code @ 0x00..=0x08 => 0x8000 << code,
      code => return Err(CartridgeError::InvalidRomSize(code)),
    };
    let ram_size = match rom[RAM_SIZE] {
      0x00 => 0,
      0x01 => 0x800,
      0x02 => 0x2000,
      0x03 => 0x8000,
      0x04 => 0x20000,
      0x05 => 0x10000,
      code => return Err(CartridgeError::InvalidRamSize(code)),
    };

    if rom.len() != rom_size {
      warn!(
        "ROM image is {} bytes but header declares {}, resizing",
        rom.len(),
        rom_size
      );
      rom.resize(rom_size, 0xff);
    }

    let mut title = [0; TITLE_LEN];
    title.copy_from_slice(&rom[TITLE_START..TITLE_START + TITLE_LEN]);

    let cart = Cartridge {
      rom: rom,
      ram: vec![0; ram_size],
      title: title,
      kind: kind,
      ram_enabled: false,
    };
    info!(
      "Loaded cartridge {:?}: {:?}, {} KiB ROM, {} KiB RAM",
      cart.title_string(),
      cart.kind,
      cart.rom_size() >> 10,
      cart.ram_size() >> 10
    );
    Ok(cart)
  }

  pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Cartridge, CartridgeError> {
    let rom = fs::read(path)?;
    Cartridge::new(rom)
  }

  pub fn rom(&self) -> &[u8] {
    &self.rom
  }

  pub fn ram(&self) -> &[u8] {
    &self.ram
  }

  pub fn ram_mut(&mut self) -> &mut [u8] {
    &mut self.ram
  }

  pub fn rom_size(&self) -> usize {
    self.rom.len()
  }

  pub fn ram_size(&self) -> usize {
    self.ram.len()
  }

  pub fn title(&self) -> &[u8; TITLE_LEN] {
    &self.title
  }

  /// Printable form of the title, stopping at the first NUL.
  pub fn title_string(&self) -> String {
    title_string(&self.title)
  }

  pub fn kind(&self) -> MbcKind {
    self.kind
  }

  pub fn ram_enabled(&self) -> bool {
    self.ram_enabled
  }

  pub fn set_ram_enabled(&mut self, enabled: bool) {
    self.ram_enabled = enabled;
  }
}

pub fn title_string(raw: &[u8]) -> String {
  let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
  String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Mask for a bank number given the total buffer size.
///
/// Sizes are powers of two, so the bank count is too and `count - 1`
/// keeps exactly the bits that address an existing bank.
pub fn bank_mask(size: usize, shift: u32) -> usize {
  debug_assert!(size == 0 || size.is_power_of_two());
  (size >> shift).saturating_sub(1)
}

impl Snapshot for Cartridge {
  fn snapshot(&mut self, s: &mut StateStream) -> io::Result<()> {
    self.ram_enabled = s.bool(self.ram_enabled)?;
    s.bytes(&mut self.ram)
  }
}
