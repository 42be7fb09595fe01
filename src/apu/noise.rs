use crate::state::{out_of_range, Snapshot, StateStream};

use std::io;

/// Longest LFSR period in T-cycles: divisor 7 at shift 15.
const MAX_PERIOD: i32 = (7 * 16) << 15;

/// Channel 4: LFSR noise (NR41-NR44).
#[derive(Debug)]
pub struct Noise {
  length: u8,
  length_enabled: bool,

  env_volume: u8,
  env_increase: bool,
  env_sweep: u8,
  env_timer: u8,
  volume: u8,

  clock_shift: u8,
  width7: bool,
  divisor: u8,

  lfsr: u16,
  timer: i32,
  enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoiseChannelState {
  pub length: u8,
  pub length_enabled: bool,
  pub env_volume: u8,
  pub env_increase: bool,
  pub env_sweep: u8,
  pub env_timer: u8,
  pub volume: u8,
  pub clock_shift: u8,
  pub width7: bool,
  pub divisor: u8,
  pub lfsr: u16,
  pub timer: i32,
  pub enabled: bool,
}

impl Noise {
  pub fn new() -> Noise {
    Noise {
      length: 0,
      length_enabled: false,
      env_volume: 0,
      env_increase: false,
      env_sweep: 0,
      env_timer: 0,
      volume: 0,
      clock_shift: 0,
      width7: false,
      divisor: 0,
      lfsr: 0x7fff,
      timer: 0,
      enabled: false,
    }
  }

  pub fn enabled(&self) -> bool {
    self.enabled
  }

  fn period(&self) -> i32 {
    let r = match self.divisor {
      0 => 8,
      d => d as i32 * 16,
    };
    r << self.clock_shift
  }

  pub fn rb(&self, addr: u16) -> u8 {
    match addr {
      0 | 1 => 0xff,
      2 => (self.env_volume << 4) | ((self.env_increase as u8) << 3) | self.env_sweep,
      3 => (self.clock_shift << 4) | ((self.width7 as u8) << 3) | self.divisor,
      4 => 0xbf | ((self.length_enabled as u8) << 6),
      _ => unreachable!(),
    }
  }

  pub fn wb(&mut self, addr: u16, val: u8) {
    match addr {
      0 => (),
      1 => self.length = 64 - (val & 0x3f),
      2 => {
        self.env_volume = val >> 4;
        self.env_increase = val & 0x08 != 0;
        self.env_sweep = val & 0x7;
        if val & 0xf8 == 0 {
          self.enabled = false;
        }
      }
      3 => {
        self.clock_shift = val >> 4;
        self.width7 = val & 0x08 != 0;
        self.divisor = val & 0x7;
      }
      4 => {
        self.length_enabled = val & 0x40 != 0;
        if val & 0x80 != 0 {
          self.enabled = self.env_volume != 0 || self.env_increase;
          if self.length == 0 {
            self.length = 64;
          }
          self.lfsr = 0x7fff;
          self.timer = self.period();
          self.volume = self.env_volume;
          self.env_timer = self.env_sweep;
        }
      }
      _ => unreachable!(),
    }
  }

  pub fn tick(&mut self, cycles: u32) {
    // Shifts 14 and 15 stop the LFSR clock.
    if !self.enabled || self.clock_shift >= 14 {
      return;
    }
    self.timer -= cycles as i32;
    while self.timer <= 0 {
      self.timer += self.period();
      let bit = (self.lfsr ^ (self.lfsr >> 1)) & 1;
      self.lfsr = (self.lfsr >> 1) | (bit << 14);
      if self.width7 {
        self.lfsr = (self.lfsr & !0x40) | (bit << 6);
      }
    }
  }

  pub fn step(&mut self, idx: u32) {
    if idx & 1 == 0 && self.length_enabled && self.length > 0 {
      self.length -= 1;
      if self.length == 0 {
        self.enabled = false;
      }
    }
    if idx == 7 && self.env_sweep != 0 {
      if self.env_timer > 1 {
        self.env_timer -= 1;
      } else {
        self.env_timer = self.env_sweep;
        if self.env_increase && self.volume < 0xf {
          self.volume += 1;
        } else if !self.env_increase && self.volume > 0 {
          self.volume -= 1;
        }
      }
    }
  }

  pub fn output(&self) -> u8 {
    if self.enabled && self.lfsr & 1 == 0 {
      self.volume
    } else {
      0
    }
  }

  pub fn state(&self) -> NoiseChannelState {
    NoiseChannelState {
      length: self.length,
      length_enabled: self.length_enabled,
      env_volume: self.env_volume,
      env_increase: self.env_increase,
      env_sweep: self.env_sweep,
      env_timer: self.env_timer,
      volume: self.volume,
      clock_shift: self.clock_shift,
      width7: self.width7,
      divisor: self.divisor,
      lfsr: self.lfsr,
      timer: self.timer,
      enabled: self.enabled,
    }
  }

  pub fn set_state(&mut self, state: &NoiseChannelState) {
    self.length = state.length.min(64);
    self.length_enabled = state.length_enabled;
    self.env_volume = state.env_volume & 0xf;
    self.env_increase = state.env_increase;
    self.env_sweep = state.env_sweep & 0x7;
    self.env_timer = state.env_timer;
    self.volume = state.volume & 0xf;
    self.clock_shift = state.clock_shift & 0xf;
    self.width7 = state.width7;
    self.divisor = state.divisor & 0x7;
    self.lfsr = state.lfsr & 0x7fff;
    self.timer = state.timer;
    self.enabled = state.enabled;
  }
}

impl Snapshot for NoiseChannelState {
  fn snapshot(&mut self, s: &mut StateStream) -> io::Result<()> {
    self.length = s.u8(self.length)?;
    self.length_enabled = s.bool(self.length_enabled)?;
    self.env_volume = s.u8(self.env_volume)?;
    self.env_increase = s.bool(self.env_increase)?;
    self.env_sweep = s.u8(self.env_sweep)?;
    self.env_timer = s.u8(self.env_timer)?;
    self.volume = s.u8(self.volume)?;
    self.clock_shift = s.u8(self.clock_shift)?;
    self.width7 = s.bool(self.width7)?;
    self.divisor = s.u8(self.divisor)?;
    self.lfsr = s.u16(self.lfsr)?;
    self.timer = s.i32(self.timer)?;
    self.enabled = s.bool(self.enabled)?;
    if s.is_loading() && !(0..=MAX_PERIOD).contains(&self.timer) {
      return Err(out_of_range("noise timer", self.timer));
    }
    Ok(())
  }
}
