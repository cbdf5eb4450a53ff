//! Emulated-hardware error traps.
//!
//! The error register names the type of error:
//!
//! | code | trap |
//! |------|------|
//! | 0 | control store parity error |
//! | 1 | emulator memory error |
//! | 2 | stack pointer overflow or underflow |
//! | 3 | instruction buffer empty |
//!
//! If two or more errors occur at the same time, smaller codes are
//! reported.  The error types are accumulated until the register is
//! reset: the minimum pending code is reported on every read.  The
//! clear operation also cancels pending interrupt requests; that
//! coupling lives in the execution engine, which owns the interrupt
//! flags.
use std::fmt::{self, Display, Formatter};

use serde::Serialize;
use tracing::{event, Level};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ErrorTrap {
    ControlStoreParity = 0,
    EmulatorMemoryError = 1,
    StackOverUnderflow = 2,
    IbEmpty = 3,
}

impl ErrorTrap {
    pub const ALL: [ErrorTrap; 4] = [
        ErrorTrap::ControlStoreParity,
        ErrorTrap::EmulatorMemoryError,
        ErrorTrap::StackOverUnderflow,
        ErrorTrap::IbEmpty,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl Display for ErrorTrap {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(match self {
            ErrorTrap::ControlStoreParity => "control store parity error",
            ErrorTrap::EmulatorMemoryError => "emulator memory error",
            ErrorTrap::StackOverUnderflow => "stack overflow or underflow",
            ErrorTrap::IbEmpty => "instruction buffer empty",
        })
    }
}

/// The sticky error register.  Raising a trap sets its bit; the
/// register reports the smallest pending code until explicitly
/// cleared.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TrapRegister {
    pending: u8,
}

impl TrapRegister {
    pub fn new() -> TrapRegister {
        TrapRegister::default()
    }

    pub fn raise(&mut self, trap: ErrorTrap) {
        event!(Level::INFO, "raising error trap: {}", trap);
        self.pending |= 1 << trap.code();
    }

    pub fn is_pending(&self, trap: ErrorTrap) -> bool {
        self.pending & (1 << trap.code()) != 0
    }

    pub fn any_pending(&self) -> bool {
        self.pending != 0
    }

    /// The reported error: the smallest pending code, if any.
    pub fn current(&self) -> Option<ErrorTrap> {
        ErrorTrap::ALL.into_iter().find(|t| self.is_pending(*t))
    }

    /// The two-bit code the microcode reads.  Zero when nothing is
    /// pending; the microcode distinguishes that case through the
    /// interrupt-request branch condition.
    pub fn code_bits(&self) -> u8 {
        self.current().map(ErrorTrap::code).unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.pending = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_minimum_pending_code() {
        let mut traps = TrapRegister::new();
        assert_eq!(traps.current(), None);

        traps.raise(ErrorTrap::StackOverUnderflow);
        assert_eq!(traps.current(), Some(ErrorTrap::StackOverUnderflow));

        // A smaller code takes over the report but the larger stays
        // pending.
        traps.raise(ErrorTrap::EmulatorMemoryError);
        assert_eq!(traps.current(), Some(ErrorTrap::EmulatorMemoryError));
        assert!(traps.is_pending(ErrorTrap::StackOverUnderflow));

        traps.raise(ErrorTrap::IbEmpty);
        assert_eq!(traps.current(), Some(ErrorTrap::EmulatorMemoryError));
    }

    #[test]
    fn accumulates_until_cleared() {
        let mut traps = TrapRegister::new();
        traps.raise(ErrorTrap::IbEmpty);
        traps.raise(ErrorTrap::ControlStoreParity);
        assert_eq!(traps.current(), Some(ErrorTrap::ControlStoreParity));

        traps.clear();
        assert_eq!(traps.current(), None);
        assert!(!traps.any_pending());
    }

    #[test]
    fn raising_twice_is_idempotent() {
        let mut traps = TrapRegister::new();
        traps.raise(ErrorTrap::IbEmpty);
        traps.raise(ErrorTrap::IbEmpty);
        assert_eq!(traps.current(), Some(ErrorTrap::IbEmpty));
        traps.clear();
        assert!(!traps.any_pending());
    }
}
