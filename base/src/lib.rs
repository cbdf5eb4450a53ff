//! The `base` crate defines the things which are useful in both the
//! central-processor emulation and other associated tools.  The idea
//! is that if you want to write a microassembler or a control-store
//! image tool, it would depend on the base crate but would not need
//! to depend on the emulator library itself.

pub mod instruction;
pub mod microword;
pub mod prelude;
pub mod subword;
