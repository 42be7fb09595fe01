use crate::state::{out_of_range, Snapshot, StateStream};

use std::io;

#[derive(Debug, Default)]
struct Clock {
  main: u32,
  sub: u32,
  div: u32,
}

#[derive(Debug, Default)]
pub struct Registers {
  pub div: u8,
  pub tima: u8,
  pub tma: u8,
  pub tac: u8,
}

#[derive(Debug)]
pub struct Timer {
  pub reg: Registers,
  clock: Clock,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimerState {
  pub div: u8,
  pub tima: u8,
  pub tma: u8,
  pub tac: u8,
  pub main: u32,
  pub sub: u32,
  pub div_clock: u32,
}

impl Timer {
  pub fn new() -> Timer {
    Timer {
      clock: Clock::default(),
      reg: Registers::default(),
    }
  }

  /// Updates the local registers using the m-time.
  /// Returns true if an interrupt was triggered.
  pub fn inc(&mut self, m: u32) -> bool {
    let mut interrupt = false;
    self.clock.sub += m;
    while self.clock.sub >= 4 {
      self.clock.sub -= 4;

      self.clock.div += 1;
      if self.clock.div == 16 {
        self.reg.div = self.reg.div.wrapping_add(1);
        self.clock.div = 0;
      }

      interrupt |= self.check_step();
    }
    interrupt
  }

  /// Return true if an interrupt was triggered.
  fn check_step(&mut self) -> bool {
    if self.reg.tac & 0x4 != 0 {
      self.clock.main += 1;
      let threshold = match self.reg.tac & 3 {
        0 => 64,
        1 => 1,
        2 => 4,
        _ => 16,
      };
      if self.clock.main >= threshold {
        return self.step();
      }
    }

    false
  }

  /// Step the clocks and return true if an interrupt was triggered.
  fn step(&mut self) -> bool {
    self.clock.main = 0;
    let (tima, overflow) = self.reg.tima.overflowing_add(1);
    self.reg.tima = if overflow { self.reg.tma } else { tima };
    overflow
  }

  pub fn rb(&self, addr: u16) -> u8 {
    match addr {
      0xff04 => self.reg.div,
      0xff05 => self.reg.tima,
      0xff06 => self.reg.tma,
      0xff07 => self.reg.tac | 0xf8,
      _ => panic!("Invalid address to timer: 0x{:04x}", addr),
    }
  }

  pub fn wb(&mut self, addr: u16, value: u8) {
    match addr {
      // Any write resets the divider.
      0xff04 => {
        self.reg.div = 0;
        self.clock.div = 0;
      }
      0xff05 => self.reg.tima = value,
      0xff06 => self.reg.tma = value,
      0xff07 => self.reg.tac = value & 0x7,
      _ => panic!("Invalid address to timer: 0x{:04x}", addr),
    }
  }

  pub fn state(&self) -> TimerState {
    TimerState {
      div: self.reg.div,
      tima: self.reg.tima,
      tma: self.reg.tma,
      tac: self.reg.tac,
      main: self.clock.main,
      sub: self.clock.sub,
      div_clock: self.clock.div,
    }
  }

  pub fn set_state(&mut self, state: &TimerState) {
    self.reg = Registers {
      div: state.div,
      tima: state.tima,
      tma: state.tma,
      tac: state.tac & 0x7,
    };
    self.clock = Clock {
      main: state.main,
      sub: state.sub,
      div: state.div_clock,
    };
  }
}

impl Snapshot for TimerState {
  fn snapshot(&mut self, s: &mut StateStream) -> io::Result<()> {
    self.div = s.u8(self.div)?;
    self.tima = s.u8(self.tima)?;
    self.tma = s.u8(self.tma)?;
    self.tac = s.u8(self.tac)?;
    self.main = s.u32(self.main)?;
    self.sub = s.u32(self.sub)?;
    self.div_clock = s.u32(self.div_clock)?;
    if s.is_loading() {
      // Clocks restart below these bounds on every tick.
      if self.main >= 64 {
        return Err(out_of_range("timer main clock", self.main));
      }
      if self.sub >= 4 {
        return Err(out_of_range("timer sub clock", self.sub));
      }
      if self.div_clock >= 16 {
        return Err(out_of_range("timer divider clock", self.div_clock));
      }
    }
    Ok(())
  }
}

impl Snapshot for Timer {
  fn snapshot(&mut self, s: &mut StateStream) -> io::Result<()> {
    let mut state = self.state();
    state.snapshot(s)?;
    if s.is_loading() {
      self.set_state(&state);
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn div_counts_every_64_m_cycles() {
    let mut timer = Timer::new();
    timer.inc(63);
    assert_eq!(timer.rb(0xff04), 0);
    timer.inc(1);
    assert_eq!(timer.rb(0xff04), 1);
    timer.wb(0xff04, 0x99);
    assert_eq!(timer.rb(0xff04), 0);
  }

  #[test]
  fn tima_overflow_reloads_tma() {
    let mut timer = Timer::new();
    timer.wb(0xff06, 0xf0);
    timer.wb(0xff05, 0xff);
    timer.wb(0xff07, 0x05); // enabled, fastest rate
    assert!(timer.inc(4));
    assert_eq!(timer.rb(0xff05), 0xf0);
    assert!(!timer.inc(4));
    assert_eq!(timer.rb(0xff05), 0xf1);
  }

  #[test]
  fn snapshot_resumes_mid_period() {
    let mut timer = Timer::new();
    timer.wb(0xff07, 0x04);
    timer.inc(4 * 40 + 3);

    let mut buf = Vec::new();
    timer.snapshot(&mut StateStream::Save(&mut buf)).unwrap();

    let mut restored = Timer::new();
    restored.snapshot(&mut StateStream::Load(&mut &buf[..])).unwrap();
    assert_eq!(restored.state(), timer.state());

    // Both copies must reach the next TIMA tick together.
    timer.inc(4 * 24);
    restored.inc(4 * 24);
    assert_eq!(restored.rb(0xff05), 1);
    assert_eq!(timer.rb(0xff05), 1);
  }

  #[test]
  fn main_clock_only_runs_while_enabled() {
    let mut timer = Timer::new();
    timer.inc(4 * 1000);
    assert_eq!(timer.state().main, 0);
    timer.wb(0xff07, 0x04);
    timer.inc(4 * 10);
    assert_eq!(timer.state().main, 10);
  }

  #[test]
  fn runaway_clocks_are_rejected() {
    let fields: [fn(&mut TimerState); 3] = [
      |t| t.main = 64,
      |t| t.sub = u32::MAX,
      |t| t.div_clock = 16,
    ];
    for corrupt in fields.iter() {
      let mut state = Timer::new().state();
      corrupt(&mut state);
      let mut buf = Vec::new();
      state.snapshot(&mut StateStream::Save(&mut buf)).unwrap();

      let mut restored = Timer::new();
      let err = restored
        .snapshot(&mut StateStream::Load(&mut &buf[..]))
        .unwrap_err();
      assert_eq!(err.kind(), io::ErrorKind::InvalidData);
      assert_eq!(restored.state(), Timer::new().state());
    }
  }
}
