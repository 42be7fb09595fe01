use crate::state::{out_of_range, Snapshot, StateStream};

use std::io;

pub const WAVE_RAM_SIZE: usize = 16;

/// Longest sample period in T-cycles, reached at frequency 0.
const MAX_PERIOD: i32 = 2048 * 2;

/// Channel 3: plays 32 4-bit samples from wave RAM (NR30-NR34, 0xff30-0xff3f).
#[derive(Debug)]
pub struct Wave {
  dac_enabled: bool,
  length: u16, // Counts down from 256 - NR31.
  length_enabled: bool,
  volume_code: u8, // 0 = mute, 1 = 100%, 2 = 50%, 3 = 25%.
  frequency: u16,
  position: u8, // Current sample index, 0-31.
  timer: i32,
  sample: u8, // Last fetched 4-bit sample.
  enabled: bool,
  ram: [u8; WAVE_RAM_SIZE],
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaveChannelState {
  pub dac_enabled: bool,
  pub length: u16,
  pub length_enabled: bool,
  pub volume_code: u8,
  pub frequency: u16,
  pub position: u8,
  pub timer: i32,
  pub sample: u8,
  pub enabled: bool,
  pub ram: [u8; WAVE_RAM_SIZE],
}

impl Wave {
  pub fn new() -> Wave {
    Wave {
      dac_enabled: false,
      length: 0,
      length_enabled: false,
      volume_code: 0,
      frequency: 0,
      position: 0,
      timer: 0,
      sample: 0,
      enabled: false,
      ram: [0; WAVE_RAM_SIZE],
    }
  }

  pub fn enabled(&self) -> bool {
    self.enabled
  }

  fn period(&self) -> i32 {
    (2048 - self.frequency as i32) * 2
  }

  pub fn rb(&self, addr: u16) -> u8 {
    match addr {
      0 => 0x7f | if self.dac_enabled { 0x80 } else { 0 },
      1 => 0xff,
      2 => 0x9f | (self.volume_code << 5),
      3 => 0xff,
      4 => 0xbf | if self.length_enabled { 0x40 } else { 0 },
      _ => unreachable!(),
    }
  }

  pub fn wb(&mut self, addr: u16, val: u8) {
    match addr {
      0 => {
        self.dac_enabled = val & 0x80 != 0;
        if !self.dac_enabled {
          self.enabled = false;
        }
      }
      1 => self.length = 256 - val as u16,
      2 => self.volume_code = (val >> 5) & 0x3,
      3 => self.frequency = (self.frequency & 0x700) | val as u16,
      4 => {
        self.frequency = (self.frequency & 0xff) | ((val as u16 & 0x7) << 8);
        self.length_enabled = val & 0x40 != 0;
        if val & 0x80 != 0 {
          self.enabled = self.dac_enabled;
          if self.length == 0 {
            self.length = 256;
          }
          self.position = 0;
          self.timer = self.period();
        }
      }
      _ => unreachable!(),
    }
  }

  pub fn read_ram(&self, idx: usize) -> u8 {
    self.ram[idx]
  }

  pub fn write_ram(&mut self, idx: usize, val: u8) {
    self.ram[idx] = val;
  }

  pub fn tick(&mut self, cycles: u32) {
    if !self.enabled {
      return;
    }
    self.timer -= cycles as i32;
    while self.timer <= 0 {
      self.timer += self.period();
      self.position = (self.position + 1) & 0x1f;
      let byte = self.ram[(self.position / 2) as usize];
      self.sample = if self.position & 1 == 0 {
        byte >> 4
      } else {
        byte & 0x0f
      };
    }
  }

  pub fn step(&mut self, idx: u32) {
    if idx & 1 == 0 && self.length_enabled && self.length > 0 {
      self.length -= 1;
      if self.length == 0 {
        self.enabled = false;
      }
    }
  }

  pub fn output(&self) -> u8 {
    if !self.enabled || self.volume_code == 0 {
      return 0;
    }
    self.sample >> (self.volume_code - 1)
  }

  pub fn state(&self) -> WaveChannelState {
    WaveChannelState {
      dac_enabled: self.dac_enabled,
      length: self.length,
      length_enabled: self.length_enabled,
      volume_code: self.volume_code,
      frequency: self.frequency,
      position: self.position,
      timer: self.timer,
      sample: self.sample,
      enabled: self.enabled,
      ram: self.ram,
    }
  }

  pub fn set_state(&mut self, state: &WaveChannelState) {
    self.dac_enabled = state.dac_enabled;
    self.length = state.length.min(256);
    self.length_enabled = state.length_enabled;
    self.volume_code = state.volume_code & 0x3;
    self.frequency = state.frequency & 0x7ff;
    self.position = state.position & 0x1f;
    self.timer = state.timer;
    self.sample = state.sample & 0x0f;
    self.enabled = state.enabled;
    self.ram = state.ram;
  }
}

impl Snapshot for WaveChannelState {
  fn snapshot(&mut self, s: &mut StateStream) -> io::Result<()> {
    self.dac_enabled = s.bool(self.dac_enabled)?;
    self.length = s.u16(self.length)?;
    self.length_enabled = s.bool(self.length_enabled)?;
    self.volume_code = s.u8(self.volume_code)?;
    self.frequency = s.u16(self.frequency)?;
    self.position = s.u8(self.position)?;
    self.timer = s.i32(self.timer)?;
    self.sample = s.u8(self.sample)?;
    self.enabled = s.bool(self.enabled)?;
    self.ram = s.array(self.ram)?;
    if s.is_loading() && !(0..=MAX_PERIOD).contains(&self.timer) {
      return Err(out_of_range("wave timer", self.timer));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn playing() -> Wave {
    let mut wave = Wave::new();
    for i in 0..WAVE_RAM_SIZE {
      wave.write_ram(i, (i as u8) << 4 | (15 - i as u8));
    }
    wave.wb(0, 0x80);
    wave.wb(2, 0x20);
    wave.wb(3, 0x00);
    wave.wb(4, 0x87);
    wave
  }

  #[test]
  fn plays_nibbles_in_order() {
    let mut wave = playing();
    // Period is (2048 - 0x700) * 2 = 512.
    wave.tick(512);
    assert_eq!(wave.output(), 0x0f);
    wave.tick(512);
    assert_eq!(wave.output(), 0x01);
    wave.tick(512);
    assert_eq!(wave.output(), 0x0e);
  }

  #[test]
  fn dac_off_silences() {
    let mut wave = playing();
    wave.wb(0, 0x00);
    assert!(!wave.enabled());
    assert_eq!(wave.rb(0), 0x7f);
  }

  #[test]
  fn state_round_trip() {
    let mut wave = playing();
    wave.tick(3000);

    let mut buf = Vec::new();
    wave.state().snapshot(&mut StateStream::Save(&mut buf)).unwrap();
    assert_eq!(buf.len(), 14 + WAVE_RAM_SIZE);

    let mut state = WaveChannelState::default();
    state.snapshot(&mut StateStream::Load(&mut &buf[..])).unwrap();
    let mut restored = Wave::new();
    restored.set_state(&state);
    assert_eq!(restored.state(), wave.state());
  }

  #[test]
  fn runaway_timer_is_rejected() {
    for &bad in &[-1, MAX_PERIOD + 1, i32::MIN] {
      let mut state = playing().state();
      state.timer = bad;
      let mut buf = Vec::new();
      state.snapshot(&mut StateStream::Save(&mut buf)).unwrap();

      let err = WaveChannelState::default()
        .snapshot(&mut StateStream::Load(&mut &buf[..]))
        .unwrap_err();
      assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
  }
}
