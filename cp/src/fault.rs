//! Host-domain faults.
//!
//! These indicate that the surrounding system is misconfigured (a
//! broken microcode image, an out-of-range store access, an unknown
//! port).  They are deliberately separate from the emulated-hardware
//! traps in [`crate::trap`]: a fault unwinds to the caller, a trap is
//! data the emulated program reads and reacts to.  The two must never
//! be conflated.
use std::error::Error;
use std::fmt::{self, Display, Formatter};

use base::instruction::BadControlWord;

use crate::MICROCODE_WORDS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpFault {
    /// A control-store access outside the 4096-word store.
    MicrocodeAddressOutOfRange { address: u16 },
    /// A stored word which cannot represent a valid control word.
    BadControlWord { address: u16, word: u64 },
    /// A microcode image whose length is not the size of the store.
    ImageSizeMismatch { words: usize },
    /// A port access outside the register map of the I/O processor
    /// channel.
    BadPort { port: u8 },
}

impl CpFault {
    pub(crate) fn bad_word(address: u16, e: BadControlWord) -> CpFault {
        CpFault::BadControlWord {
            address,
            word: e.0,
        }
    }
}

impl Display for CpFault {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            CpFault::MicrocodeAddressOutOfRange { address } => {
                write!(
                    f,
                    "control-store address {address:#05x} is outside the {MICROCODE_WORDS}-word store"
                )
            }
            CpFault::BadControlWord { address, word } => {
                write!(
                    f,
                    "control-store word at {address:#05x} is not a valid control word: {word:#014x}"
                )
            }
            CpFault::ImageSizeMismatch { words } => {
                write!(
                    f,
                    "microcode image has {words} words but the control store holds {MICROCODE_WORDS}"
                )
            }
            CpFault::BadPort { port } => {
                write!(f, "port {port:#04x} is not in the I/O processor register map")
            }
        }
    }
}

impl Error for CpFault {}
