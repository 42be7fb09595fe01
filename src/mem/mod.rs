//! Memory-mapped hardware outside the CPU: bank controllers and the
//! divider/timer block.

pub mod mbc;
pub mod timer;

pub use self::mbc::{Mbc, MbcKind, MbcState};
pub use self::timer::{Timer, TimerState};
