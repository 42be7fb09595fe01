use crate::cartridge::{bank_mask, Cartridge, ROM_BANK_SHIFT};
use crate::mem::mbc::{read_ram, write_ram};
use crate::state::{Snapshot, StateStream};

use std::io;

/// MBC3 without the real-time clock. Selecting an RTC register maps
/// nothing into the RAM window.
#[derive(Debug)]
pub struct Mbc3 {
  rom_bank: u8,
  ram_select: u8,
  latch: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mbc3State {
  pub rom_bank: u8,
  pub ram_select: u8,
  pub latch: u8,
}

impl Mbc3 {
  pub fn new() -> Self {
    Self {
      rom_bank: 1,
      ram_select: 0,
      latch: 0,
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
      0xa..=0xb => match self.ram_select {
        0x0..=0x3 => read_ram(cart, self.ram_select as usize, addr),
        _ => 0xff, // RTC
      },
      _ => panic!("Invalid address to MBC: 0x{:04x}", addr),
    }
  }

  pub fn wb(&mut self, cart: &mut Cartridge, addr: u16, value: u8) {
    match addr >> 12 {
      0x0..=0x1 => cart.set_ram_enabled((value & 0x0f) == 0x0a),
      0x2..=0x3 => {
        self.rom_bank = match value & 0x7f {
          0 => 1,
          v => v,
        }
      }
      0x4..=0x5 => self.ram_select = value,
      0x6..=0x7 => self.latch = value,
      0xa..=0xb => {
        if self.ram_select <= 0x3 {
          write_ram(cart, self.ram_select as usize, addr, value);
        }
      }
      _ => panic!("Invalid address to MBC: 0x{:04x}", addr),
    }
  }

  pub fn state(&self) -> Mbc3State {
    Mbc3State {
      rom_bank: self.rom_bank,
      ram_select: self.ram_select,
      latch: self.latch,
    }
  }

  pub fn set_state(&mut self, state: &Mbc3State) {
    self.rom_bank = match state.rom_bank & 0x7f {
      0 => 1,
      v => v,
    };
    self.ram_select = state.ram_select;
    self.latch = state.latch;
  }
}

impl Snapshot for Mbc3State {
  fn snapshot(&mut self, s: &mut StateStream) -> io::Result<()> {
    self.rom_bank = s.u8(self.rom_bank)?;
    self.ram_select = s.u8(self.ram_select)?;
    self.latch = s.u8(self.latch)?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cartridge::tests::rom_image;

  fn init(rom: Vec<u8>) -> (Mbc3, Cartridge) {
    (Mbc3::new(), Cartridge::new(rom).unwrap())
  }

  #[test]
  fn seven_bit_rom_bank() {
    // 2 MiB, 128 banks.
    let mut rom = rom_image(0x13, 0x06, 0x03, "MBC3");
    rom[0x45 * 0x4000 + 1] = 0x45;
    rom[0x4001] = 0x01;
    let (mut mbc, mut cart) = init(rom);
    mbc.wb(&mut cart, 0x2000, 0x45);
    assert_eq!(mbc.rb(&cart, 0x4001), 0x45);
    mbc.wb(&mut cart, 0x2000, 0x00);
    assert_eq!(mbc.rb(&cart, 0x4001), 0x01);
  }

  #[test]
  fn ram_banks_and_rtc_select() {
    let (mut mbc, mut cart) = init(rom_image(0x13, 0x00, 0x03, "MBC3"));
    mbc.wb(&mut cart, 0x0000, 0x0a);
    mbc.wb(&mut cart, 0x4000, 0x03);
    mbc.wb(&mut cart, 0xa000, 0x77);
    assert_eq!(cart.ram()[3 * 0x2000], 0x77);

    mbc.wb(&mut cart, 0x4000, 0x08);
    assert_eq!(mbc.rb(&cart, 0xa000), 0xff);
    mbc.wb(&mut cart, 0xa000, 0x11);
    assert_eq!(cart.ram()[3 * 0x2000], 0x77);
    assert_eq!(cart.ram()[0], 0);
  }

  #[test]
  fn state_round_trip() {
    let (mut mbc, mut cart) = init(rom_image(0x13, 0x02, 0x03, "MBC3"));
    mbc.wb(&mut cart, 0x2000, 0x05);
    mbc.wb(&mut cart, 0x4000, 0x02);
    mbc.wb(&mut cart, 0x6000, 0x01);

    let mut buf = Vec::new();
    mbc.state().snapshot(&mut StateStream::Save(&mut buf)).unwrap();
    let mut state = Mbc3::new().state();
    state.snapshot(&mut StateStream::Load(&mut &buf[..])).unwrap();
    assert_eq!(state, mbc.state());
  }
}
