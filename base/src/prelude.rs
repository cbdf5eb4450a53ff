//! The prelude exports the structs which are useful in representing
//! the central processor's control words.  Providing this prelude is
//! the main purpose of the base crate.
pub use super::instruction::{decode, BadControlWord, MicroInstruction};
pub use super::microword::*;
pub use super::subword::{
    control_word_parity_even, from_nibbles, high_byte, join_bytes, low_byte, nibble,
    rotate_left_bits,
};
