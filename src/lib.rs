#[macro_use]
extern crate log;

pub mod apu;
pub mod cartridge;
pub mod gameboy;
pub mod mem;
pub mod savestate;
pub mod state;

pub use crate::cartridge::{Cartridge, CartridgeError};
pub use crate::gameboy::GameBoy;
pub use crate::savestate::{SaveState, StateError, SAVE_STATE_FORMAT_VERSION};
pub use crate::state::{Snapshot, StateStream};
