//! Various convenience utilities for splitting 16-bit data words into
//! nibbles and bytes, for joining them together, and for the parity
//! computation over 48-bit control words.

/// Extract nibble `i` of a 16-bit word.  Nibble 0 is the least
/// significant.
pub fn nibble(word: u16, i: u32) -> u8 {
    assert!(i < 4);
    ((word >> (4 * i)) & 0xf) as u8
}

/// Join four nibbles into a 16-bit word, most significant first.
pub fn from_nibbles(n3: u8, n2: u8, n1: u8, n0: u8) -> u16 {
    (u16::from(n3 & 0xf) << 12)
        | (u16::from(n2 & 0xf) << 8)
        | (u16::from(n1 & 0xf) << 4)
        | u16::from(n0 & 0xf)
}

/// Extract the more-significant byte from a 16-bit word.
pub fn high_byte(word: u16) -> u8 {
    (word >> 8) as u8
}

/// Extract the less-significant byte from a 16-bit word.
pub fn low_byte(word: u16) -> u8 {
    (word & 0xff) as u8
}

/// Join two bytes into a 16-bit word.
pub fn join_bytes(high: u8, low: u8) -> u16 {
    (u16::from(high) << 8) | u16::from(low)
}

/// Rotate a 16-bit word left by `bits` positions.  The late-LRotN
/// path only ever uses multiples of four.
pub fn rotate_left_bits(word: u16, bits: u32) -> u16 {
    word.rotate_left(bits % 16)
}

/// Whether a 48-bit control word has even parity over all of its bits
/// (including the stored parity bit, which the microassembler chooses
/// so that this holds for a well-formed word).
pub fn control_word_parity_even(word: u64) -> bool {
    word.count_ones() % 2 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nibble() {
        assert_eq!(nibble(0x1234, 0), 0x4);
        assert_eq!(nibble(0x1234, 1), 0x3);
        assert_eq!(nibble(0x1234, 2), 0x2);
        assert_eq!(nibble(0x1234, 3), 0x1);
    }

    #[test]
    fn test_from_nibbles() {
        assert_eq!(from_nibbles(0x1, 0x2, 0x3, 0x4), 0x1234);
        assert_eq!(from_nibbles(0xf, 0x0, 0xf, 0x0), 0xf0f0);
    }

    #[test]
    fn test_bytes() {
        assert_eq!(high_byte(0xabcd), 0xab);
        assert_eq!(low_byte(0xabcd), 0xcd);
        assert_eq!(join_bytes(0xab, 0xcd), 0xabcd);
    }

    #[test]
    fn test_rotate() {
        assert_eq!(rotate_left_bits(0x1234, 4), 0x2341);
        assert_eq!(rotate_left_bits(0x1234, 8), 0x3412);
        assert_eq!(rotate_left_bits(0x1234, 12), 0x4123);
        assert_eq!(rotate_left_bits(0x1234, 0), 0x1234);
    }

    #[test]
    fn test_parity() {
        assert!(control_word_parity_even(0));
        assert!(!control_word_parity_even(1));
        assert!(control_word_parity_even(0b11));
        assert!(control_word_parity_even(0xffff_ffff_ffff));
    }

    mod proptests {
        use super::super::*;
        use test_strategy::proptest;

        #[proptest]
        fn nibble_join_round_trip(word: u16) {
            assert_eq!(
                from_nibbles(
                    nibble(word, 3),
                    nibble(word, 2),
                    nibble(word, 1),
                    nibble(word, 0)
                ),
                word
            );
        }

        #[proptest]
        fn byte_join_round_trip(word: u16) {
            assert_eq!(join_bytes(high_byte(word), low_byte(word)), word);
        }

        #[proptest]
        fn rotate_by_four_four_times_is_identity(word: u16) {
            let mut w = word;
            for _ in 0..4 {
                w = rotate_left_bits(w, 4);
            }
            assert_eq!(w, word);
        }

        #[proptest]
        fn parity_flips_on_single_bit_flip(word: u64, #[strategy(0u32..48)] bit: u32) {
            let word = word & 0xffff_ffff_ffff;
            assert_ne!(
                control_word_parity_even(word),
                control_word_parity_even(word ^ (1 << bit))
            );
        }
    }
}
