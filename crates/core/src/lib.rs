// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! shepherd-core: state machine, dependency, and event primitives shared by
//! every other Shepherd crate.

#[macro_use]
mod macros;

pub mod bus;
pub mod clock;
pub mod error;
pub mod event;
pub mod fsm;
pub mod program;
pub mod state;

pub use bus::EventBus;
pub use clock::{Clock, FakeClock, SystemClock};
pub use error::{ConfigError, RuntimeError};
pub use event::Event;
pub use fsm::ProgramFsm;
pub use program::{
    DependencyMode, DependencySpec, ExitDisposition, FileStateSpec, Program, ProgramId,
    ProgramKind, ProgramSpec,
};
pub use state::{BuiltinState, StateName};
