//! Sound channel state. Synthesis here only goes as far as producing
//! channel levels; mixing, filtering and output belong to the frontend.

mod noise;
mod square;
mod wave;

pub use self::noise::{Noise, NoiseChannelState};
pub use self::square::{Square, SquareChannelState};
pub use self::wave::{Wave, WaveChannelState, WAVE_RAM_SIZE};

use crate::state::{out_of_range, Snapshot, StateStream};

use std::io;

/// T-cycles between frame sequencer steps (512 Hz).
const FRAME_SEQUENCER_PERIOD: u32 = 8192;

pub struct APU {
  channel1: Square,
  channel2: Square,
  channel3: Wave,
  channel4: Noise,

  nr50: u8,
  nr51: u8,
  powered: bool,

  sequencer_clock: u32,
  sequencer_step: u8,
}

impl APU {
  pub fn new() -> APU {
    APU {
      channel1: Square::new(true),
      channel2: Square::new(false),
      channel3: Wave::new(),
      channel4: Noise::new(),

      nr50: 0,
      nr51: 0,
      powered: false,

      sequencer_clock: 0,
      sequencer_step: 0,
    }
  }

  pub fn rb(&self, addr: u16) -> u8 {
    match addr {
      0xff10..=0xff14 => self.channel1.rb(addr - 0xff10),
      0xff15..=0xff19 => self.channel2.rb(addr - 0xff15),
      0xff1a..=0xff1e => self.channel3.rb(addr - 0xff1a),
      0xff1f..=0xff23 => self.channel4.rb(addr - 0xff1f),
      0xff24 => self.nr50,
      0xff25 => self.nr51,
      0xff26 => {
        let mut v = 0x70;
        if self.powered {
          v |= 0x80;
        }
        v |= self.channel1.enabled() as u8;
        v |= (self.channel2.enabled() as u8) << 1;
        v |= (self.channel3.enabled() as u8) << 2;
        v |= (self.channel4.enabled() as u8) << 3;
        v
      }
      0xff30..=0xff3f => self.channel3.read_ram((addr - 0xff30) as usize),
      _ => 0xff,
    }
  }

  pub fn wb(&mut self, addr: u16, val: u8) {
    if addr == 0xff26 {
      let on = val & 0x80 != 0;
      if self.powered && !on {
        self.power_off();
      }
      self.powered = on;
      return;
    }
    if let 0xff30..=0xff3f = addr {
      self.channel3.write_ram((addr - 0xff30) as usize, val);
      return;
    }
    if !self.powered {
      return;
    }
    match addr {
      0xff10..=0xff14 => self.channel1.wb(addr - 0xff10, val),
      0xff15..=0xff19 => self.channel2.wb(addr - 0xff15, val),
      0xff1a..=0xff1e => self.channel3.wb(addr - 0xff1a, val),
      0xff1f..=0xff23 => self.channel4.wb(addr - 0xff1f, val),
      0xff24 => self.nr50 = val,
      0xff25 => self.nr51 = val,
      _ => (),
    }
  }

  /// Powering off clears every register but keeps wave RAM.
  fn power_off(&mut self) {
    let mut wave = Wave::new();
    for i in 0..WAVE_RAM_SIZE {
      wave.write_ram(i, self.channel3.read_ram(i));
    }
    self.channel1 = Square::new(true);
    self.channel2 = Square::new(false);
    self.channel3 = wave;
    self.channel4 = Noise::new();
    self.nr50 = 0;
    self.nr51 = 0;
  }

  /// Advance all channels by `cycles` T-cycles.
  pub fn step(&mut self, cycles: u32) {
    if !self.powered {
      return;
    }
    self.channel1.tick(cycles);
    self.channel2.tick(cycles);
    self.channel3.tick(cycles);
    self.channel4.tick(cycles);

    self.sequencer_clock += cycles;
    while self.sequencer_clock >= FRAME_SEQUENCER_PERIOD {
      self.sequencer_clock -= FRAME_SEQUENCER_PERIOD;
      let idx = self.sequencer_step as u32;
      self.channel1.step(idx);
      self.channel2.step(idx);
      self.channel3.step(idx);
      self.channel4.step(idx);
      self.sequencer_step = (self.sequencer_step + 1) & 0x7;
    }
  }

  /// Current 4-bit level of each channel, for the frontend mixer.
  pub fn levels(&self) -> [u8; 4] {
    [
      self.channel1.output(),
      self.channel2.output(),
      self.channel3.output(),
      self.channel4.output(),
    ]
  }
}

impl Snapshot for APU {
  fn snapshot(&mut self, s: &mut StateStream) -> io::Result<()> {
    self.nr50 = s.u8(self.nr50)?;
    self.nr51 = s.u8(self.nr51)?;
    self.powered = s.bool(self.powered)?;
    let clock = s.u32(self.sequencer_clock)?;
    if clock >= FRAME_SEQUENCER_PERIOD {
      return Err(out_of_range("frame sequencer clock", clock));
    }
    self.sequencer_clock = clock;
    self.sequencer_step = s.u8(self.sequencer_step)? & 0x7;

    let mut ch1 = self.channel1.state();
    let mut ch2 = self.channel2.state();
    let mut ch3 = self.channel3.state();
    let mut ch4 = self.channel4.state();
    ch1.snapshot(s)?;
    ch2.snapshot(s)?;
    ch3.snapshot(s)?;
    ch4.snapshot(s)?;
    if s.is_loading() {
      self.channel1.set_state(&ch1);
      self.channel2.set_state(&ch2);
      self.channel3.set_state(&ch3);
      self.channel4.set_state(&ch4);
    }
    Ok(())
  }
}
