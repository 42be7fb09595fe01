//! Memory bank controllers.
//!
//! Each controller maps the cartridge windows of the address space
//! (0x0000-0x7fff for ROM, 0xa000-0xbfff for external RAM) onto offsets
//! inside the cartridge buffers. Controllers only hold their bank
//! registers; the buffers and the RAM-enable latch stay in the
//! `Cartridge`, which is passed in on every access.

mod mbc0;
mod mbc1;
mod mbc3;
mod mbc5;

pub use self::mbc0::Mbc0;
pub use self::mbc1::{BankingMode, Mbc1, Mbc1State};
pub use self::mbc3::{Mbc3, Mbc3State};
pub use self::mbc5::{Mbc5, Mbc5State};

use crate::cartridge::{bank_mask, Cartridge, RAM_BANK_SHIFT};
use crate::state::{Snapshot, StateStream};

use std::io;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MbcKind {
  None,
  Mbc1,
  Mbc3,
  Mbc5,
}

#[derive(Debug)]
pub enum Mbc {
  None(Mbc0),
  Mbc1(Mbc1),
  Mbc3(Mbc3),
  Mbc5(Mbc5),
}

/// Register snapshot of whichever controller is in use.
#[derive(Debug, Clone, PartialEq)]
pub enum MbcState {
  None,
  Mbc1(Mbc1State),
  Mbc3(Mbc3State),
  Mbc5(Mbc5State),
}

impl Mbc {
  pub fn new(kind: MbcKind) -> Mbc {
    match kind {
      MbcKind::None => Mbc::None(Mbc0),
      MbcKind::Mbc1 => Mbc::Mbc1(Mbc1::new()),
      MbcKind::Mbc3 => Mbc::Mbc3(Mbc3::new()),
      MbcKind::Mbc5 => Mbc::Mbc5(Mbc5::new()),
    }
  }

  pub fn for_cartridge(cart: &Cartridge) -> Mbc {
    Mbc::new(cart.kind())
  }

  pub fn kind(&self) -> MbcKind {
    match self {
      Mbc::None(_) => MbcKind::None,
      Mbc::Mbc1(_) => MbcKind::Mbc1,
      Mbc::Mbc3(_) => MbcKind::Mbc3,
      Mbc::Mbc5(_) => MbcKind::Mbc5,
    }
  }

  /// Read a byte at address `addr`.
  ///
  /// Panics if `addr` lies outside the cartridge windows: that means the
  /// bus routed a foreign address here.
  pub fn rb(&self, cart: &Cartridge, addr: u16) -> u8 {
    match self {
      Mbc::None(m) => m.rb(cart, addr),
      Mbc::Mbc1(m) => m.rb(cart, addr),
      Mbc::Mbc3(m) => m.rb(cart, addr),
      Mbc::Mbc5(m) => m.rb(cart, addr),
    }
  }

  /// Write `value` at address `addr`.
  pub fn wb(&mut self, cart: &mut Cartridge, addr: u16, value: u8) {
    match self {
      Mbc::None(m) => m.wb(cart, addr, value),
      Mbc::Mbc1(m) => m.wb(cart, addr, value),
      Mbc::Mbc3(m) => m.wb(cart, addr, value),
      Mbc::Mbc5(m) => m.wb(cart, addr, value),
    }
  }

  pub fn state(&self) -> MbcState {
    match self {
      Mbc::None(_) => MbcState::None,
      Mbc::Mbc1(m) => MbcState::Mbc1(m.state()),
      Mbc::Mbc3(m) => MbcState::Mbc3(m.state()),
      Mbc::Mbc5(m) => MbcState::Mbc5(m.state()),
    }
  }

  pub fn set_state(&mut self, state: MbcState) {
    match (self, state) {
      (Mbc::None(_), MbcState::None) => (),
      (Mbc::Mbc1(m), MbcState::Mbc1(s)) => m.set_state(&s),
      (Mbc::Mbc3(m), MbcState::Mbc3(s)) => m.set_state(&s),
      (Mbc::Mbc5(m), MbcState::Mbc5(s)) => m.set_state(&s),
      (m, s) => warn!("Ignoring {:?} state for {:?} controller", s, m.kind()),
    }
  }
}

impl Snapshot for MbcState {
  fn snapshot(&mut self, s: &mut StateStream) -> io::Result<()> {
    match self {
      MbcState::None => Ok(()),
      MbcState::Mbc1(state) => state.snapshot(s),
      MbcState::Mbc3(state) => state.snapshot(s),
      MbcState::Mbc5(state) => state.snapshot(s),
    }
  }
}

impl Snapshot for Mbc {
  fn snapshot(&mut self, s: &mut StateStream) -> io::Result<()> {
    let mut state = self.state();
    state.snapshot(s)?;
    if s.is_loading() {
      self.set_state(state);
    }
    Ok(())
  }
}

/// Offset into cartridge RAM for `addr` in RAM bank `bank`, or `None` when
/// the RAM is disabled or absent.
///
/// The final mask mirrors carts with less than one full 8 KiB bank.
fn ram_index(cart: &Cartridge, bank: usize, addr: u16) -> Option<usize> {
  if !cart.ram_enabled() || cart.ram_size() == 0 {
    return None;
  }
  let bank = bank & bank_mask(cart.ram_size(), RAM_BANK_SHIFT);
  let offset = (bank << RAM_BANK_SHIFT) | (addr & 0x1fff) as usize;
  Some(offset & (cart.ram_size() - 1))
}

fn read_ram(cart: &Cartridge, bank: usize, addr: u16) -> u8 {
  match ram_index(cart, bank, addr) {
    Some(i) => cart.ram()[i],
    None => 0xff,
  }
}

fn write_ram(cart: &mut Cartridge, bank: usize, addr: u16, value: u8) {
  if let Some(i) = ram_index(cart, bank, addr) {
    cart.ram_mut()[i] = value;
  }
}
