use crate::cartridge::{bank_mask, Cartridge, ROM_BANK_SHIFT};
use crate::mem::mbc::{read_ram, write_ram};
use crate::state::{Snapshot, StateStream};

use std::io;

/// MBC5: 9-bit ROM bank, 4-bit RAM bank. Unlike MBC1/3, bank 0 can be
/// mapped into the switchable window.
#[derive(Debug)]
pub struct Mbc5 {
  rom_bank: u16,
  ram_bank: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mbc5State {
  pub rom_bank: u16,
  pub ram_bank: u8,
}

impl Mbc5 {
  pub fn new() -> Self {
    Self {
      rom_bank: 1,
      ram_bank: 0,
    }
  }

  fn rom_offset(&self, cart: &Cartridge, addr: u16) -> usize {
    let bank = if addr < 0x4000 {
      0
    } else {
      self.rom_bank as usize & bank_mask(cart.rom_size(), ROM_BANK_SHIFT)
    };
    (bank << ROM_BANK_SHIFT) | (addr & 0x3fff) as usize
  }

  pub fn rb(&self, cart: &Cartridge, addr: u16) -> u8 {
    match addr >> 12 {
      0x0..=0x7 => cart.rom()[self.rom_offset(cart, addr)],
      0xa..=0xb => read_ram(cart, self.ram_bank as usize, addr),
      _ => panic!("Invalid address to MBC: 0x{:04x}", addr),
    }
  }

  pub fn wb(&mut self, cart: &mut Cartridge, addr: u16, value: u8) {
    match addr >> 12 {
      0x0..=0x1 => cart.set_ram_enabled((value & 0x0f) == 0x0a),
      0x2 => self.rom_bank = (self.rom_bank & 0x100) | value as u16,
      0x3 => self.rom_bank = (self.rom_bank & 0xff) | ((value as u16 & 0x1) << 8),
      0x4..=0x5 => self.ram_bank = value & 0x0f,
      0x6..=0x7 => (),
      0xa..=0xb => write_ram(cart, self.ram_bank as usize, addr, value),
      _ => panic!("Invalid address to MBC: 0x{:04x}", addr),
    }
  }

  pub fn state(&self) -> Mbc5State {
    Mbc5State {
      rom_bank: self.rom_bank,
      ram_bank: self.ram_bank,
    }
  }

  pub fn set_state(&mut self, state: &Mbc5State) {
    self.rom_bank = state.rom_bank & 0x1ff;
    self.ram_bank = state.ram_bank & 0x0f;
  }
}

impl Snapshot for Mbc5State {
  fn snapshot(&mut self, s: &mut StateStream) -> io::Result<()> {
    self.rom_bank = s.u16(self.rom_bank)?;
    self.ram_bank = s.u8(self.ram_bank)?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cartridge::tests::rom_image;

  #[test]
  fn nine_bit_bank_and_bank_zero() {
    // 8 MiB, 512 banks.
    let mut rom = rom_image(0x19, 0x08, 0x00, "MBC5");
    rom[0x1ff * 0x4000] = 0x9f;
    rom[0x0000] = 0x10;
    let mut cart = Cartridge::new(rom).unwrap();
    let mut mbc = Mbc5::new();

    mbc.wb(&mut cart, 0x2000, 0xff);
    mbc.wb(&mut cart, 0x3000, 0x01);
    assert_eq!(mbc.rb(&cart, 0x4000), 0x9f);

    mbc.wb(&mut cart, 0x2000, 0x00);
    mbc.wb(&mut cart, 0x3000, 0x00);
    assert_eq!(mbc.rb(&cart, 0x4000), 0x10);
  }

  #[test]
  fn sixteen_ram_banks() {
    let mut cart = Cartridge::new(rom_image(0x1b, 0x00, 0x04, "MBC5")).unwrap();
    let mut mbc = Mbc5::new();
    mbc.wb(&mut cart, 0x0000, 0x0a);
    mbc.wb(&mut cart, 0x4000, 0x0f);
    mbc.wb(&mut cart, 0xbfff, 0x3c);
    assert_eq!(cart.ram()[0x1ffff], 0x3c);
    assert_eq!(mbc.state().ram_bank, 0x0f);
  }
}
