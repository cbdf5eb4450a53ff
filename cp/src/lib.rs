//! Emulation of the microprogrammed central processor: the bit-slice
//! ALU, the control store and its decode cache, the eight cooperating
//! tasks and the channel to the I/O processor.
//!
//! The crate deliberately contains no outer surface: no clock, no
//! device controllers, no front end.  The surrounding system drives
//! [`CentralProcessor::execute_click`] and supplies wakeups and bus
//! data; everything in here is deterministic state.

pub mod alu;
pub mod control;
pub mod fault;
pub mod ibuffer;
pub mod iop;
pub mod stack;
pub mod trap;
pub mod types;

/// Size of the control store, in words.
pub const MICROCODE_WORDS: usize = 4096;

pub use alu::{AluOp, AluOutcome, BitAlu};
pub use control::{CentralProcessor, ClickOutcome, CpStatus};
pub use fault::CpFault;
pub use ibuffer::{IbState, InstructionBuffer};
pub use iop::{IopChannel, IopWakeMode};
pub use trap::{ErrorTrap, TrapRegister};
pub use types::{CyclePhase, TaskKind};
