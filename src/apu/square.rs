use crate::state::{out_of_range, Snapshot, StateStream};

use std::io;

/// Longest duty step in T-cycles, reached at frequency 0.
const MAX_PERIOD: u32 = 2048 * 4;

/// Square wave channel (NR10-NR14 / NR21-NR24). Channel 2 has no sweep
/// unit; its sweep register reads back as 0xff.
#[derive(Debug)]
pub struct Square {
  has_sweep: bool,

  sweep_time: u8, // 3 bit value: sweep_time/128 Hz.
  sweep_dir: i8,  // 1 if increase, -1 if decrease.
  sweep_shift: u8,
  sweep_timer: u8,

  duty_number: u8, // 2-bit index into duty table.
  length: u8,      // Counts down from 64 - NRx1 length bits.

  env_volume: u8, // Initial volume, between 0 and 0xf.
  env_dir: i8,    // 1 for increase, -1 for decrease.
  env_sweep: u8,  // Length of a step is env_sweep / 64.
  env_timer: u8,
  volume: u8, // Current envelope output.

  frequency: u16,       // Actual frequency: 131072/(2048-x) Hz.
  length_enabled: bool, // If true, stop output when length expires.

  duty: u8,          // Duty pattern, rotated once per period.
  period_count: u32, // Cycles left in the current duty step.
  enabled: bool,
}

/// Everything needed to resume a square channel mid-note.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SquareChannelState {
  pub sweep_time: u8,
  pub sweep_dir: i8,
  pub sweep_shift: u8,
  pub sweep_timer: u8,
  pub duty_number: u8,
  pub length: u8,
  pub env_volume: u8,
  pub env_dir: i8,
  pub env_sweep: u8,
  pub env_timer: u8,
  pub volume: u8,
  pub frequency: u16,
  pub length_enabled: bool,
  pub duty: u8,
  pub period_count: u32,
  pub enabled: bool,
}

impl Square {
  pub fn new(has_sweep: bool) -> Square {
    Square {
      has_sweep: has_sweep,

      sweep_time: 0,
      sweep_dir: 1,
      sweep_shift: 0,
      sweep_timer: 0,

      duty_number: 0,
      length: 0,

      env_volume: 0,
      env_dir: -1,
      env_sweep: 0,
      env_timer: 0,
      volume: 0,

      frequency: 0,
      length_enabled: false,

      duty: get_duty(0),
      period_count: MAX_PERIOD,
      enabled: false,
    }
  }

  pub fn enabled(&self) -> bool {
    self.enabled
  }

  pub fn rb(&self, addr: u16) -> u8 {
    match addr {
      0 if !self.has_sweep => 0xff,
      0 => {
        let hi = self.sweep_time;
        let mid = if self.sweep_dir == 1 { 0 } else { 1 };
        let lo = self.sweep_shift;
        0x80 | (hi << 4) | (mid << 3) | lo
      }
      // Only the duty bits are readable.
      1 => (self.duty_number << 6) | 0x3f,
      2 => {
        let hi = self.env_volume;
        let mid = if self.env_dir == 1 { 1 } else { 0 };
        let lo = self.env_sweep;
        (hi << 4) | (mid << 3) | lo
      }
      3 => 0xff, // Write-only register.
      4 => {
        let mid = if self.length_enabled { 1 } else { 0 };
        // Only bit 6 is readable.
        0xbf | (mid << 6)
      }
      _ => unreachable!(),
    }
  }

  pub fn wb(&mut self, addr: u16, val: u8) {
    match addr {
      0 => {
        if self.has_sweep {
          self.sweep_time = (val >> 4) & 0x7;
          self.sweep_dir = if val & 0x08 == 0 { 1 } else { -1 };
          self.sweep_shift = val & 0x7;
        }
      }
      1 => {
        self.length = 64 - (val & 0x3f);
        self.duty_number = val >> 6;
      }
      2 => {
        self.env_volume = val >> 4;
        self.env_dir = if val & 0x08 == 0 { -1 } else { 1 };
        self.env_sweep = val & 0x7;
        if val & 0xf8 == 0 {
          self.enabled = false;
        }
      }
      3 => {
        self.frequency = (self.frequency & !0xffu16) | (val as u16);
      }
      4 => {
        self.frequency = (self.frequency & 0xffu16) | ((val as u16 & 0x7) << 8);
        self.length_enabled = val & 0x40 != 0;
        if val & 0x80 != 0 {
          self.trigger();
        }
      }
      _ => unreachable!(),
    }
  }

  fn trigger(&mut self) {
    self.duty = get_duty(self.duty_number);
    self.reset_period();
    self.enabled = self.env_volume != 0 || self.env_dir == 1;
    if self.length == 0 {
      self.length = 64;
    }
    self.volume = self.env_volume;
    self.env_timer = self.env_sweep;
    self.sweep_timer = self.sweep_time;
  }

  fn reset_period(&mut self) {
    self.period_count = (2048 - (self.frequency as u32)) * 4;
  }

  /// Advance the duty generator by `cycles` T-cycles.
  pub fn tick(&mut self, mut cycles: u32) {
    while cycles >= self.period_count {
      cycles -= self.period_count;
      self.reset_period();
      self.duty = self.duty.rotate_left(1);
    }
    self.period_count -= cycles;
  }

  /// Clock the frame sequencer step `idx` (0-7).
  pub fn step(&mut self, idx: u32) {
    if idx & 1 == 0 && self.length_enabled && self.length > 0 {
      self.length -= 1;
      if self.length == 0 {
        self.enabled = false;
      }
    }
    if self.has_sweep && (idx == 2 || idx == 6) {
      self.step_sweep();
    }
    if idx == 7 {
      self.step_envelope();
    }
  }

  fn step_sweep(&mut self) {
    if self.sweep_time == 0 {
      return;
    }
    if self.sweep_timer > 1 {
      self.sweep_timer -= 1;
      return;
    }
    self.sweep_timer = self.sweep_time;
    let delta = self.frequency >> self.sweep_shift;
    let next = if self.sweep_dir == 1 {
      self.frequency + delta
    } else {
      self.frequency.saturating_sub(delta)
    };
    if next > 0x7ff {
      self.enabled = false;
    } else if self.sweep_shift != 0 {
      self.frequency = next;
    }
  }

  fn step_envelope(&mut self) {
    if self.env_sweep == 0 {
      return;
    }
    if self.env_timer > 1 {
      self.env_timer -= 1;
      return;
    }
    self.env_timer = self.env_sweep;
    match self.env_dir {
      1 if self.volume < 0xf => self.volume += 1,
      -1 if self.volume > 0 => self.volume -= 1,
      _ => (),
    }
  }

  /// Current output level, 0-15.
  pub fn output(&self) -> u8 {
    if self.enabled && self.duty & 0x80 != 0 {
      self.volume
    } else {
      0
    }
  }

  pub fn state(&self) -> SquareChannelState {
    SquareChannelState {
      sweep_time: self.sweep_time,
      sweep_dir: self.sweep_dir,
      sweep_shift: self.sweep_shift,
      sweep_timer: self.sweep_timer,
      duty_number: self.duty_number,
      length: self.length,
      env_volume: self.env_volume,
      env_dir: self.env_dir,
      env_sweep: self.env_sweep,
      env_timer: self.env_timer,
      volume: self.volume,
      frequency: self.frequency,
      length_enabled: self.length_enabled,
      duty: self.duty,
      period_count: self.period_count,
      enabled: self.enabled,
    }
  }

  pub fn set_state(&mut self, state: &SquareChannelState) {
    self.sweep_time = state.sweep_time & 0x7;
    self.sweep_dir = if state.sweep_dir < 0 { -1 } else { 1 };
    self.sweep_shift = state.sweep_shift & 0x7;
    self.sweep_timer = state.sweep_timer;
    self.duty_number = state.duty_number & 0x3;
    self.length = state.length;
    self.env_volume = state.env_volume & 0xf;
    self.env_dir = if state.env_dir < 0 { -1 } else { 1 };
    self.env_sweep = state.env_sweep & 0x7;
    self.env_timer = state.env_timer;
    self.volume = state.volume & 0xf;
    self.frequency = state.frequency & 0x7ff;
    self.length_enabled = state.length_enabled;
    self.duty = state.duty;
    self.period_count = state.period_count;
    self.enabled = state.enabled;
  }
}

impl Snapshot for SquareChannelState {
  fn snapshot(&mut self, s: &mut StateStream) -> io::Result<()> {
    self.sweep_time = s.u8(self.sweep_time)?;
    self.sweep_dir = s.i8(self.sweep_dir)?;
    self.sweep_shift = s.u8(self.sweep_shift)?;
    self.sweep_timer = s.u8(self.sweep_timer)?;
    self.duty_number = s.u8(self.duty_number)?;
    self.length = s.u8(self.length)?;
    self.env_volume = s.u8(self.env_volume)?;
    self.env_dir = s.i8(self.env_dir)?;
    self.env_sweep = s.u8(self.env_sweep)?;
    self.env_timer = s.u8(self.env_timer)?;
    self.volume = s.u8(self.volume)?;
    self.frequency = s.u16(self.frequency)?;
    self.length_enabled = s.bool(self.length_enabled)?;
    self.duty = s.u8(self.duty)?;
    self.period_count = s.u32(self.period_count)?;
    self.enabled = s.bool(self.enabled)?;
    if s.is_loading() && !(1..=MAX_PERIOD).contains(&self.period_count) {
      return Err(out_of_range("square period counter", self.period_count));
    }
    Ok(())
  }
}

/// Get the actual 8-bit duty given the duty number.
fn get_duty(duty_number: u8) -> u8 {
  match duty_number & 0b11 {
    0b00 => 0b00000001,
    0b01 => 0b10000001,
    0b10 => 0b10000111,
    _ => 0b01111110,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn playing() -> Square {
    let mut sq = Square::new(true);
    sq.wb(0, 0x2a);
    sq.wb(1, 0x80 | 0x10);
    sq.wb(2, 0xf3);
    sq.wb(3, 0x34);
    sq.wb(4, 0xc5);
    sq
  }

  #[test]
  fn trigger_enables_with_volume() {
    let sq = playing();
    assert!(sq.enabled());
    assert_eq!(sq.rb(1), 0xbf);
    assert_eq!(sq.rb(4), 0xff);
  }

  #[test]
  fn zero_dac_disables() {
    let mut sq = playing();
    sq.wb(2, 0x00);
    assert!(!sq.enabled());
    assert_eq!(sq.output(), 0);
  }

  #[test]
  fn length_expires() {
    let mut sq = Square::new(false);
    sq.wb(1, 0x3e); // length 2
    sq.wb(2, 0xf0);
    sq.wb(4, 0xc0);
    sq.step(0);
    assert!(sq.enabled());
    sq.step(2);
    assert!(!sq.enabled());
  }

  #[test]
  fn channel_two_has_no_sweep_register() {
    let mut sq = Square::new(false);
    sq.wb(0, 0x7f);
    assert_eq!(sq.rb(0), 0xff);
    assert_eq!(sq.state().sweep_shift, 0);
  }

  #[test]
  fn state_round_trip_continues_identically() {
    let mut sq = playing();
    sq.tick(12345);
    sq.step(7);

    let mut buf = Vec::new();
    sq.state().snapshot(&mut StateStream::Save(&mut buf)).unwrap();
    let mut state = SquareChannelState::default();
    state.snapshot(&mut StateStream::Load(&mut &buf[..])).unwrap();
    assert_eq!(state, sq.state());

    let mut restored = Square::new(true);
    restored.set_state(&state);
    for _ in 0..100 {
      sq.tick(97);
      restored.tick(97);
      assert_eq!(sq.output(), restored.output());
    }
  }

  #[test]
  fn stalled_period_counter_is_rejected() {
    for &bad in &[0, MAX_PERIOD + 1] {
      let mut state = playing().state();
      state.period_count = bad;
      let mut buf = Vec::new();
      state.snapshot(&mut StateStream::Save(&mut buf)).unwrap();

      let err = SquareChannelState::default()
        .snapshot(&mut StateStream::Load(&mut &buf[..]))
        .unwrap_err();
      assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
  }
}
