use crate::cartridge::{bank_mask, Cartridge, ROM_BANK_SHIFT};
use crate::mem::mbc::{read_ram, write_ram};
use crate::state::{invalid_data, Snapshot, StateStream};

use std::io;

/// ROMs at least this large route the upper bank bits to the low ROM
/// window in advanced mode.
const LARGE_ROM: usize = 1 << 20;

/// Each upper-register step covers 32 ROM banks.
const ROM_BANK32_SHIFT: u32 = 19;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BankingMode {
  /// The upper register only extends the switchable ROM bank.
  Rom,
  /// The upper register also selects the RAM bank and, on large ROMs, the
  /// bank mapped at 0x0000-0x3fff.
  RamAdvancedRom,
}

#[derive(Debug)]
pub struct Mbc1 {
  rom_bank: u8,
  upper_bank: u8,
  mode: BankingMode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mbc1State {
  pub rom_bank: u8,
  pub upper_bank: u8,
  pub mode: BankingMode,
}

impl Mbc1 {
  pub fn new() -> Self {
    Self {
      rom_bank: 1,
      upper_bank: 0,
      mode: BankingMode::Rom,
    }
  }

  pub fn rom_bank(&self) -> u8 {
    self.rom_bank
  }

  pub fn upper_bank(&self) -> u8 {
    self.upper_bank
  }

  pub fn mode(&self) -> BankingMode {
    self.mode
  }

  fn rom_offset(&self, cart: &Cartridge, addr: u16) -> usize {
    let size = cart.rom_size();
    let bank = if addr < 0x4000 {
      match self.mode {
        BankingMode::RamAdvancedRom if size >= LARGE_ROM => {
          let bank32 = self.upper_bank as usize & bank_mask(size, ROM_BANK32_SHIFT);
          bank32 << 5
        }
        _ => 0,
      }
    } else {
      let bank = ((self.upper_bank as usize) << 5) | self.rom_bank as usize;
      bank & bank_mask(size, ROM_BANK_SHIFT)
    };
    (bank << ROM_BANK_SHIFT) | (addr & 0x3fff) as usize
  }

  fn ram_bank(&self) -> usize {
    match self.mode {
      BankingMode::Rom => 0,
      BankingMode::RamAdvancedRom => self.upper_bank as usize,
    }
  }

  pub fn rb(&self, cart: &Cartridge, addr: u16) -> u8 {
    match addr >> 12 {
      0x0..=0x7 => cart.rom()[self.rom_offset(cart, addr)],
      0xa..=0xb => read_ram(cart, self.ram_bank(), addr),
      _ => panic!("Invalid address to MBC: 0x{:04x}", addr),
    }
  }

  pub fn wb(&mut self, cart: &mut Cartridge, addr: u16, value: u8) {
    match addr >> 12 {
      0x0..=0x1 => cart.set_ram_enabled((value & 0x0f) == 0x0a),
      0x2..=0x3 => {
        self.rom_bank = match value & 0x1f {
          0 => 1,
          v => v,
        }
      }
      0x4..=0x5 => self.upper_bank = value & 0x03,
      0x6..=0x7 => {
        self.mode = if value & 0x1 == 0x0 {
          BankingMode::Rom
        } else {
          BankingMode::RamAdvancedRom
        };
      }
      0xa..=0xb => write_ram(cart, self.ram_bank(), addr, value),
      _ => panic!("Invalid address to MBC: 0x{:04x}", addr),
    }
  }

  pub fn state(&self) -> Mbc1State {
    Mbc1State {
      rom_bank: self.rom_bank,
      upper_bank: self.upper_bank,
      mode: self.mode,
    }
  }

  pub fn set_state(&mut self, state: &Mbc1State) {
    self.rom_bank = match state.rom_bank & 0x1f {
      0 => 1,
      v => v,
    };
    self.upper_bank = state.upper_bank & 0x03;
    self.mode = state.mode;
  }
}

impl Snapshot for Mbc1State {
  fn snapshot(&mut self, s: &mut StateStream) -> io::Result<()> {
    self.rom_bank = s.u8(self.rom_bank)?;
    self.upper_bank = s.u8(self.upper_bank)?;
    let mode = s.u8(self.mode as u8)?;
    self.mode = match mode {
      0 => BankingMode::Rom,
      1 => BankingMode::RamAdvancedRom,
      v => return Err(invalid_data("MBC1 banking mode", v)),
    };
    Ok(())
  }
}
