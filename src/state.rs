//! The snapshot contract shared by every stateful component.
//!
//! A component implements a single `snapshot` function that visits its
//! fields in a fixed order. The same function both saves and loads: each
//! helper on `StateStream` takes the current value and hands back either
//! that value (saving) or the value read from the stream (loading), so
//! the caller always assigns the result back into the field.
//!
//! ```ignore
//! fn snapshot(&mut self, s: &mut StateStream) -> io::Result<()> {
//!   self.rom_bank = s.u8(self.rom_bank)?;
//!   self.enabled = s.bool(self.enabled)?;
//!   Ok(())
//! }
//! ```
//!
//! Field order is the wire format. Adding, removing or reordering a field
//! changes the layout and requires bumping `SAVE_STATE_FORMAT_VERSION`.

use std::fmt;
use std::io::{self, Read, Write};

/// A component whose runtime state can be written to and restored from a
/// save state.
pub trait Snapshot {
  fn snapshot(&mut self, stream: &mut StateStream) -> io::Result<()>;
}

/// Direction-tagged byte stream handed to `Snapshot::snapshot`.
pub enum StateStream<'a> {
  Save(&'a mut dyn Write),
  Load(&'a mut dyn Read),
}

impl<'a> StateStream<'a> {
  pub fn is_saving(&self) -> bool {
    match self {
      StateStream::Save(_) => true,
      StateStream::Load(_) => false,
    }
  }

  pub fn is_loading(&self) -> bool {
    !self.is_saving()
  }

  /// Write `buf` out, or fill it from the stream.
  pub fn bytes(&mut self, buf: &mut [u8]) -> io::Result<()> {
    match self {
      StateStream::Save(w) => w.write_all(buf),
      StateStream::Load(r) => r.read_exact(buf),
    }
  }

  pub fn array<const N: usize>(&mut self, mut value: [u8; N]) -> io::Result<[u8; N]> {
    self.bytes(&mut value)?;
    Ok(value)
  }

  pub fn bool(&mut self, value: bool) -> io::Result<bool> {
    let b = self.u8(value as u8)?;
    Ok(b != 0)
  }

  pub fn u8(&mut self, value: u8) -> io::Result<u8> {
    let [b] = self.array([value])?;
    Ok(b)
  }

  pub fn i8(&mut self, value: i8) -> io::Result<i8> {
    Ok(self.u8(value as u8)? as i8)
  }

  pub fn u16(&mut self, value: u16) -> io::Result<u16> {
    self.array(value.to_le_bytes()).map(u16::from_le_bytes)
  }

  pub fn i32(&mut self, value: i32) -> io::Result<i32> {
    self.array(value.to_le_bytes()).map(i32::from_le_bytes)
  }

  pub fn u32(&mut self, value: u32) -> io::Result<u32> {
    self.array(value.to_le_bytes()).map(u32::from_le_bytes)
  }

  pub fn u64(&mut self, value: u64) -> io::Result<u64> {
    self.array(value.to_le_bytes()).map(u64::from_le_bytes)
  }

  pub fn f32(&mut self, value: f32) -> io::Result<f32> {
    self.u32(value.to_bits()).map(f32::from_bits)
  }
}

/// Error for an enum field whose stored discriminant is out of range.
pub fn invalid_data(what: &str, value: u8) -> io::Error {
  io::Error::new(
    io::ErrorKind::InvalidData,
    format!("invalid {} value 0x{:02x}", what, value),
  )
}

/// Error for a restored counter outside the range the component can
/// ever hold.
pub fn out_of_range<T: fmt::Display>(what: &str, value: T) -> io::Error {
  io::Error::new(
    io::ErrorKind::InvalidData,
    format!("{} out of range: {}", what, value),
  )
}
