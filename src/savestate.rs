//! Save-state files.
//!
//! ## Layout
//!
//! All integers are little-endian.
//!
//! | Offset | Field                                        |
//! |--------|----------------------------------------------|
//! | 0x00   | format version (u32)                         |
//! | 0x04   | body compressed flag (u8, 0 or 1)            |
//! | 0x10   | raw cartridge title (16 bytes)               |
//! | 0x20   | component states, optionally Brotli-packed   |
//!
//! The body is the concatenation of every registered component's
//! snapshot, in registration order. Nothing in the body names its
//! component, so save and load must register the same components in the
//! same order.
//!
//! Loading checks the version first, then the rest of the header and the
//! cartridge title, before any component is touched. A body that turns out to be truncated or
//! malformed fails with `CorruptState`, but components restored before
//! the bad one keep their new state.

use crate::cartridge::{title_string, TITLE_LEN};
use crate::state::{Snapshot, StateStream};

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Bumped whenever any component's field list changes.
pub const SAVE_STATE_FORMAT_VERSION: u32 = 4;

/// Whether new save states are compressed unless overridden.
pub const COMPRESS_BY_DEFAULT: bool = cfg!(feature = "compress");

const TITLE_OFFSET: u64 = 0x10;
const BODY_OFFSET: u64 = TITLE_OFFSET + TITLE_LEN as u64;

const BROTLI_BUFFER_SIZE: usize = 4096;
const BROTLI_QUALITY: i32 = 5;
const BROTLI_LG_WINDOW: i32 = 22;

#[derive(Debug, Error)]
pub enum StateError {
  #[error("invalid argument: {0}")]
  InvalidArgument(String),
  #[error("save state {} not found", .0.display())]
  NotFound(PathBuf),
  #[error("save state version {found} does not match supported version {expected}")]
  VersionMismatch { found: u32, expected: u32 },
  #[error("save state is for cartridge {found:?}, but {expected:?} is loaded")]
  IdentityMismatch { found: String, expected: String },
  #[error("corrupt save state")]
  CorruptState(#[source] io::Error),
  #[error("save state I/O failed")]
  Io(#[from] io::Error),
}

/// The fixed-position fields at the start of a save-state file.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
  pub version: u32,
  pub compressed: bool,
  pub title: [u8; TITLE_LEN],
}

impl Header {
  pub fn title_string(&self) -> String {
    title_string(&self.title)
  }
}

/// Ordered set of components to save or restore, bound to the title of
/// the cartridge they belong to.
///
/// `None` entries stand for components that are not attached in this
/// session; they are skipped on both save and load.
pub struct SaveState<'a> {
  title: [u8; TITLE_LEN],
  components: Vec<Option<&'a mut dyn Snapshot>>,
  compress: bool,
}

impl<'a> SaveState<'a> {
  pub fn new(title: [u8; TITLE_LEN], components: Vec<Option<&'a mut dyn Snapshot>>) -> Self {
    SaveState {
      title: title,
      components: components,
      compress: COMPRESS_BY_DEFAULT,
    }
  }

  /// Override whether `save` compresses the body.
  pub fn compressed(mut self, compress: bool) -> Self {
    self.compress = compress;
    self
  }

  pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<(), StateError> {
    let path = path.as_ref();
    check_path(path)?;

    let file = match File::create(path) {
      Ok(f) => f,
      Err(e) => {
        error!("Failed to create save state {}: {}", path.display(), e);
        return Err(StateError::Io(e));
      }
    };
    let mut writer = BufWriter::new(file);
    let result = self.write_to(&mut writer).and_then(|()| {
      writer.flush()?;
      Ok(())
    });
    match &result {
      Ok(()) => info!("Saved state to {}", path.display()),
      Err(e) => error!("Failed to save state to {}: {}", path.display(), e),
    }
    result
  }

  pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<(), StateError> {
    let path = path.as_ref();
    check_path(path)?;

    let file = match File::open(path) {
      Ok(f) => f,
      Err(ref e) if e.kind() == io::ErrorKind::NotFound => {
        info!("No save state at {}", path.display());
        return Err(StateError::NotFound(path.to_path_buf()));
      }
      Err(e) => {
        error!("Failed to open save state {}: {}", path.display(), e);
        return Err(StateError::Io(e));
      }
    };

    let result = self.read_from(BufReader::new(file));
    match &result {
      Ok(()) => info!("Loaded state from {}", path.display()),
      Err(e) => error!("Failed to load state from {}: {}", path.display(), describe(e)),
    }
    result
  }

  /// Write the header and every component's state to `w`.
  pub fn write_to<W: Write + Seek>(&mut self, mut w: W) -> Result<(), StateError> {
    w.write_all(&SAVE_STATE_FORMAT_VERSION.to_le_bytes())?;
    w.write_all(&[self.compress as u8])?;
    w.seek(SeekFrom::Start(TITLE_OFFSET))?;
    w.write_all(&self.title)?;
    debug!(
      "Writing {} state body for {:?}",
      if self.compress { "compressed" } else { "raw" },
      title_string(&self.title)
    );

    if self.compress {
      let mut body = Vec::new();
      self.save_components(&mut body)?;
      let mut params = brotli::enc::BrotliEncoderParams::default();
      params.quality = BROTLI_QUALITY;
      params.lgwin = BROTLI_LG_WINDOW;
      let packed = brotli::BrotliCompress(&mut &body[..], &mut w, &params)?;
      trace!("Compressed {} body bytes to {}", body.len(), packed);
    } else {
      self.save_components(&mut w)?;
    }
    w.flush()?;
    Ok(())
  }

  /// Validate the header in `r`, then restore every component from it.
  pub fn read_from<R: Read + Seek>(&mut self, mut r: R) -> Result<(), StateError> {
    let version = read_version(&mut r)?;
    if version != SAVE_STATE_FORMAT_VERSION {
      return Err(StateError::VersionMismatch {
        found: version,
        expected: SAVE_STATE_FORMAT_VERSION,
      });
    }
    let header = read_header_rest(&mut r, version)?;
    if header.title != self.title {
      return Err(StateError::IdentityMismatch {
        found: header.title_string(),
        expected: title_string(&self.title),
      });
    }

    r.seek(SeekFrom::Start(BODY_OFFSET))
      .map_err(StateError::CorruptState)?;
    let result = if header.compressed {
      let mut source = brotli::Decompressor::new(&mut r, BROTLI_BUFFER_SIZE);
      self.load_components(&mut source)
    } else {
      self.load_components(&mut r)
    };
    result.map_err(StateError::CorruptState)
  }

  fn save_components(&mut self, w: &mut dyn Write) -> io::Result<()> {
    let mut stream = StateStream::Save(w);
    for (i, component) in self.components.iter_mut().enumerate() {
      if let Some(c) = component {
        trace!("Saving component {}", i);
        c.snapshot(&mut stream)?;
      }
    }
    Ok(())
  }

  fn load_components(&mut self, r: &mut dyn Read) -> io::Result<()> {
    let mut stream = StateStream::Load(r);
    for (i, component) in self.components.iter_mut().enumerate() {
      if let Some(c) = component {
        trace!("Loading component {}", i);
        c.snapshot(&mut stream).map_err(|e| {
          io::Error::new(e.kind(), format!("component {}: {}", i, e))
        })?;
      }
    }
    Ok(())
  }
}

/// Read just the header of the save state at `path`.
pub fn read_header<P: AsRef<Path>>(path: P) -> Result<Header, StateError> {
  let path = path.as_ref();
  check_path(path)?;
  let file = match File::open(path) {
    Ok(f) => f,
    Err(ref e) if e.kind() == io::ErrorKind::NotFound => {
      return Err(StateError::NotFound(path.to_path_buf()));
    }
    Err(e) => return Err(StateError::Io(e)),
  };
  read_header_from(BufReader::new(file))
}

fn read_header_from<R: Read + Seek>(mut r: R) -> Result<Header, StateError> {
  let version = read_version(&mut r)?;
  read_header_rest(r, version)
}

fn read_version<R: Read>(mut r: R) -> Result<u32, StateError> {
  let mut version = [0; 4];
  r.read_exact(&mut version).map_err(StateError::CorruptState)?;
  Ok(u32::from_le_bytes(version))
}

/// Parse the flag and title that follow the version.
fn read_header_rest<R: Read + Seek>(mut r: R, version: u32) -> Result<Header, StateError> {
  let mut flag = [0; 1];
  let mut title = [0; TITLE_LEN];
  r.read_exact(&mut flag)
    .and_then(|()| r.seek(SeekFrom::Start(TITLE_OFFSET)))
    .and_then(|_| r.read_exact(&mut title))
    .map_err(StateError::CorruptState)?;

  let compressed = match flag[0] {
    0 => false,
    1 => true,
    v => {
      return Err(StateError::CorruptState(io::Error::new(
        io::ErrorKind::InvalidData,
        format!("invalid compression flag 0x{:02x}", v),
      )))
    }
  };
  Ok(Header {
    version: version,
    compressed: compressed,
    title: title,
  })
}

fn check_path(path: &Path) -> Result<(), StateError> {
  if path.as_os_str().is_empty() || path.to_string_lossy().trim().is_empty() {
    error!("Save state file name is empty");
    return Err(StateError::InvalidArgument("empty file name".to_string()));
  }
  Ok(())
}

fn describe(e: &StateError) -> String {
  match e {
    StateError::CorruptState(inner) | StateError::Io(inner) => format!("{}: {}", e, inner),
    _ => e.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Cursor;

  #[derive(Debug, Default, PartialEq)]
  struct Regs {
    a: u8,
    pc: u16,
    cycles: u32,
  }

  impl Snapshot for Regs {
    fn snapshot(&mut self, s: &mut StateStream) -> io::Result<()> {
      self.a = s.u8(self.a)?;
      self.pc = s.u16(self.pc)?;
      self.cycles = s.u32(self.cycles)?;
      Ok(())
    }
  }

  fn title(name: &str) -> [u8; TITLE_LEN] {
    let mut t = [0; TITLE_LEN];
    t[..name.len()].copy_from_slice(name.as_bytes());
    t
  }

  fn regs() -> Regs {
    Regs {
      a: 0x42,
      pc: 0x0150,
      cycles: 123_456,
    }
  }

  fn save(compress: bool, name: &str, regs: &mut Regs) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    SaveState::new(title(name), vec![Some(regs as &mut dyn Snapshot)])
      .compressed(compress)
      .write_to(&mut buf)
      .unwrap();
    buf.into_inner()
  }

  fn load(data: &[u8], name: &str, regs: &mut Regs) -> Result<(), StateError> {
    SaveState::new(title(name), vec![Some(regs as &mut dyn Snapshot)])
      .read_from(Cursor::new(data))
  }

  #[test]
  fn raw_layout() {
    let data = save(false, "TETRIS", &mut regs());
    assert_eq!(&data[0..4], &[4, 0, 0, 0]);
    assert_eq!(data[4], 0);
    assert_eq!(&data[5..0x10], &[0; 11]);
    assert_eq!(&data[0x10..0x20], &title("TETRIS"));
    assert_eq!(&data[0x20..], &[0x42, 0x50, 0x01, 0x40, 0xe2, 0x01, 0x00]);
  }

  #[test]
  fn round_trip_raw_and_compressed() {
    for &compress in &[false, true] {
      let data = save(compress, "TETRIS", &mut regs());
      assert_eq!(data[4], compress as u8);

      let mut restored = Regs::default();
      load(&data, "TETRIS", &mut restored).unwrap();
      assert_eq!(restored, regs());
    }
  }

  #[test]
  fn header_is_readable_without_components() {
    let data = save(true, "ZELDA", &mut regs());
    let header = read_header_from(Cursor::new(&data)).unwrap();
    assert_eq!(header.version, SAVE_STATE_FORMAT_VERSION);
    assert!(header.compressed);
    assert_eq!(header.title_string(), "ZELDA");
  }

  #[test]
  fn version_mismatch_changes_nothing() {
    let mut data = save(false, "TETRIS", &mut regs());
    data[0..4].copy_from_slice(&(SAVE_STATE_FORMAT_VERSION - 1).to_le_bytes());

    let mut restored = Regs::default();
    match load(&data, "TETRIS", &mut restored) {
      Err(StateError::VersionMismatch { found, expected }) => {
        assert_eq!(found, SAVE_STATE_FORMAT_VERSION - 1);
        assert_eq!(expected, SAVE_STATE_FORMAT_VERSION);
      }
      other => panic!("unexpected result {:?}", other),
    }
    assert_eq!(restored, Regs::default());
  }

  #[test]
  fn identity_mismatch_changes_nothing() {
    let data = save(false, "GAME A", &mut regs());
    let mut restored = Regs::default();
    match load(&data, "GAME B", &mut restored) {
      Err(StateError::IdentityMismatch { found, expected }) => {
        assert_eq!(found, "GAME A");
        assert_eq!(expected, "GAME B");
      }
      other => panic!("unexpected result {:?}", other),
    }
    assert_eq!(restored, Regs::default());
  }

  #[test]
  fn truncated_body_keeps_earlier_components() {
    let mut first = regs();
    let mut second = regs();
    let mut buf = Cursor::new(Vec::new());
    SaveState::new(
      title("TETRIS"),
      vec![
        Some(&mut first as &mut dyn Snapshot),
        Some(&mut second as &mut dyn Snapshot),
      ],
    )
    .compressed(false)
    .write_to(&mut buf)
    .unwrap();
    let mut data = buf.into_inner();
    data.truncate(data.len() - 2);

    let mut first = Regs::default();
    let mut second = Regs::default();
    let result = SaveState::new(
      title("TETRIS"),
      vec![
        Some(&mut first as &mut dyn Snapshot),
        Some(&mut second as &mut dyn Snapshot),
      ],
    )
    .read_from(Cursor::new(&data));
    match result {
      Err(StateError::CorruptState(e)) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
      other => panic!("unexpected result {:?}", other),
    }
    assert_eq!(first, regs());
  }

  #[test]
  fn short_header_is_corrupt() {
    let data = save(false, "TETRIS", &mut regs());
    let result = load(&data[..0x18], "TETRIS", &mut Regs::default());
    assert!(matches!(result, Err(StateError::CorruptState(_))));
  }

  #[test]
  fn bad_compression_flag_is_corrupt() {
    let mut data = save(false, "TETRIS", &mut regs());
    data[4] = 7;
    let result = load(&data, "TETRIS", &mut Regs::default());
    assert!(matches!(result, Err(StateError::CorruptState(_))));
  }

  #[test]
  fn absent_components_are_skipped() {
    let mut a = regs();
    let mut buf = Cursor::new(Vec::new());
    SaveState::new(title("X"), vec![None, Some(&mut a as &mut dyn Snapshot), None])
      .compressed(false)
      .write_to(&mut buf)
      .unwrap();
    assert_eq!(buf.get_ref().len(), BODY_OFFSET as usize + 7);

    let mut b = Regs::default();
    SaveState::new(title("X"), vec![Some(&mut b as &mut dyn Snapshot)])
      .read_from(Cursor::new(buf.get_ref()))
      .unwrap();
    assert_eq!(b, regs());
  }

  #[test]
  fn file_errors() {
    let dir = tempfile::tempdir().unwrap();
    let mut r = Regs::default();

    let result = SaveState::new(title("X"), vec![Some(&mut r as &mut dyn Snapshot)]).load(" ");
    assert!(matches!(result, Err(StateError::InvalidArgument(_))));
    let result = SaveState::new(title("X"), vec![Some(&mut r as &mut dyn Snapshot)]).save("");
    assert!(matches!(result, Err(StateError::InvalidArgument(_))));

    let missing = dir.path().join("missing.state");
    let result = SaveState::new(title("X"), vec![Some(&mut r as &mut dyn Snapshot)]).load(&missing);
    assert!(matches!(result, Err(StateError::NotFound(_))));
    assert!(matches!(read_header(&missing), Err(StateError::NotFound(_))));
  }

  #[test]
  fn version_is_checked_before_the_rest_of_the_header() {
    let mut data = save(false, "TETRIS", &mut regs());
    data[0..4].copy_from_slice(&3u32.to_le_bytes());
    data[4] = 2;
    let result = load(&data, "TETRIS", &mut Regs::default());
    assert!(matches!(
      result,
      Err(StateError::VersionMismatch { found: 3, .. })
    ));

    let result = load(&data[..4], "TETRIS", &mut Regs::default());
    assert!(matches!(
      result,
      Err(StateError::VersionMismatch { found: 3, .. })
    ));

    let result = load(&data[..2], "TETRIS", &mut Regs::default());
    match result {
      Err(StateError::CorruptState(e)) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
      other => panic!("unexpected result {:?}", other),
    }
  }

  /// Accepts `limit` bytes, then fails every write.
  struct FullDisk {
    inner: Cursor<Vec<u8>>,
    limit: u64,
  }

  impl Write for FullDisk {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
      let room = self.limit.saturating_sub(self.inner.position()) as usize;
      if room == 0 {
        return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
      }
      let n = buf.len().min(room);
      self.inner.write(&buf[..n])
    }

    fn flush(&mut self) -> io::Result<()> {
      Ok(())
    }
  }

  impl Seek for FullDisk {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
      self.inner.seek(pos)
    }
  }

  #[test]
  fn failed_body_write_is_reported() {
    for &compress in &[false, true] {
      let mut sink = FullDisk {
        inner: Cursor::new(Vec::new()),
        limit: BODY_OFFSET + 2,
      };
      let mut r = regs();
      let result = SaveState::new(title("TETRIS"), vec![Some(&mut r as &mut dyn Snapshot)])
        .compressed(compress)
        .write_to(&mut sink);
      match result {
        Err(StateError::Io(_)) => (),
        other => panic!("compress={}: unexpected result {:?}", compress, other),
      }
    }
  }

  #[test]
  fn unwritable_path_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("no-such-dir").join("x.state");
    let mut r = regs();
    let result = SaveState::new(title("X"), vec![Some(&mut r as &mut dyn Snapshot)]).save(&path);
    assert!(matches!(result, Err(StateError::Io(_))));
  }
}
