use crate::apu::APU;
use crate::cartridge::{Cartridge, CartridgeError};
use crate::mem::{Mbc, Timer};
use crate::savestate::{SaveState, StateError, COMPRESS_BY_DEFAULT};
use crate::state::Snapshot;

use std::path::Path;

/// A running machine: the inserted cartridge and its bank controller,
/// the timer and the APU. CPU and PPU cores live outside this crate and
/// join save states once attached.
pub struct GameBoy {
  cpu: Option<Box<dyn Snapshot>>,
  ppu: Option<Box<dyn Snapshot>>,
  timer: Timer,
  apu: APU,
  mbc: Mbc,
  cart: Cartridge,
  compress: bool,
}

impl GameBoy {
  pub fn new(cart: Cartridge) -> GameBoy {
    GameBoy {
      cpu: None,
      ppu: None,
      timer: Timer::new(),
      apu: APU::new(),
      mbc: Mbc::for_cartridge(&cart),
      cart: cart,
      compress: COMPRESS_BY_DEFAULT,
    }
  }

  pub fn from_rom(rom: Vec<u8>) -> Result<GameBoy, CartridgeError> {
    Ok(GameBoy::new(Cartridge::new(rom)?))
  }

  pub fn attach_cpu(&mut self, cpu: Box<dyn Snapshot>) {
    self.cpu = Some(cpu);
  }

  pub fn attach_ppu(&mut self, ppu: Box<dyn Snapshot>) {
    self.ppu = Some(ppu);
  }

  /// Choose whether `save_state` compresses the body.
  pub fn set_compress(&mut self, compress: bool) {
    self.compress = compress;
  }

  pub fn cartridge(&self) -> &Cartridge {
    &self.cart
  }

  pub fn mbc(&self) -> &Mbc {
    &self.mbc
  }

  pub fn timer(&self) -> &Timer {
    &self.timer
  }

  pub fn apu(&mut self) -> &mut APU {
    &mut self.apu
  }

  /// Read a byte at address `addr`.
  pub fn rb(&self, addr: u16) -> u8 {
    match addr {
      0x0000..=0x7fff | 0xa000..=0xbfff => self.mbc.rb(&self.cart, addr),
      0xff04..=0xff07 => self.timer.rb(addr),
      0xff10..=0xff3f => self.apu.rb(addr),
      _ => {
        trace!("Read from unmapped 0x{:04x}", addr);
        0xff
      }
    }
  }

  /// Write `value` at address `addr`.
  pub fn wb(&mut self, addr: u16, value: u8) {
    match addr {
      0x0000..=0x7fff | 0xa000..=0xbfff => self.mbc.wb(&mut self.cart, addr, value),
      0xff04..=0xff07 => self.timer.wb(addr, value),
      0xff10..=0xff3f => self.apu.wb(addr, value),
      _ => trace!("Write to unmapped 0x{:04x} = 0x{:02x}", addr, value),
    }
  }

  /// Advance the timer and APU by `m` machine cycles. Returns true if
  /// the timer requested an interrupt.
  pub fn step(&mut self, m: u32) -> bool {
    self.apu.step(m * 4);
    self.timer.inc(m)
  }

  pub fn save_state<P: AsRef<Path>>(&mut self, path: P) -> Result<(), StateError> {
    let compress = self.compress;
    self.state().compressed(compress).save(path)
  }

  /// Restore from `path`. Nothing changes if the file is missing, from
  /// another format version or for another cartridge.
  pub fn load_state<P: AsRef<Path>>(&mut self, path: P) -> Result<(), StateError> {
    self.state().load(path)
  }

  /// Components in save order. The order is part of the file format.
  fn state(&mut self) -> SaveState {
    let title = *self.cart.title();
    let GameBoy {
      cpu,
      ppu,
      timer,
      apu,
      mbc,
      cart,
      ..
    } = self;
    SaveState::new(
      title,
      vec![
        cpu.as_mut().map(|c| &mut **c as &mut dyn Snapshot),
        ppu.as_mut().map(|p| &mut **p as &mut dyn Snapshot),
        Some(timer as &mut dyn Snapshot),
        Some(apu as &mut dyn Snapshot),
        Some(mbc as &mut dyn Snapshot),
        Some(cart as &mut dyn Snapshot),
      ],
    )
  }
}
