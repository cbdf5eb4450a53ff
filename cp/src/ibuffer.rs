//! The instruction buffer (IB): a small byte-wise prefetch queue
//! feeding the bytecode dispatch logic.
//!
//! The buffer holds a front byte and two backing bytes.  Its state
//! moves one step per load (Empty, OneByte, Word, Full) and one step
//! back per consumption (Full, Word, OneByte, Empty); transitions are
//! written by state name because the hardware reference assigns the
//! states non-monotonic numeric codes (Empty=0, OneByte=1, Full=2,
//! Word=3).
//!
//! The front index addresses within the front word: index 0 reads the
//! even (front) byte, index 1 reads the odd byte behind it, discarding
//! the even byte on consumption.  Microcode forces the index after a
//! jump to an odd bytecode address.
use serde::Serialize;
use tracing::{event, Level};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IbState {
    Empty = 0,
    OneByte = 1,
    Full = 2,
    Word = 3,
}

impl IbState {
    /// The numeric code the microcode sees when it reads the buffer
    /// state.
    pub fn code(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionBuffer {
    state: IbState,
    front: u8,
    bytes: [u8; 2],
    front_index: u8,
}

impl Default for InstructionBuffer {
    fn default() -> InstructionBuffer {
        InstructionBuffer {
            state: IbState::Empty,
            front: 0,
            bytes: [0; 2],
            front_index: 0,
        }
    }
}

impl InstructionBuffer {
    pub fn new() -> InstructionBuffer {
        InstructionBuffer::default()
    }

    pub fn state(&self) -> IbState {
        self.state
    }

    pub fn front_index(&self) -> u8 {
        self.front_index
    }

    /// ibPtr<-0 / ibPtr<-1.
    pub fn set_front_index(&mut self, index: u8) {
        self.front_index = index & 1;
    }

    /// Append one byte.  Returns false when the buffer was already
    /// full and the byte was dropped.
    pub fn load(&mut self, byte: u8) -> bool {
        match self.state {
            IbState::Empty => {
                self.front = byte;
                self.state = IbState::OneByte;
                true
            }
            IbState::OneByte => {
                self.bytes[0] = byte;
                self.state = IbState::Word;
                true
            }
            IbState::Word => {
                self.bytes[1] = byte;
                self.state = IbState::Full;
                true
            }
            IbState::Full => {
                event!(Level::WARN, "IB<- while the buffer is full; byte dropped");
                false
            }
        }
    }

    fn available(&self) -> u8 {
        match self.state {
            IbState::Empty => 0,
            IbState::OneByte => 1,
            IbState::Word => 2,
            IbState::Full => 3,
        }
    }

    /// The byte the front index points at, without consuming it.
    pub fn peek(&self) -> Option<u8> {
        match self.front_index {
            0 if self.available() >= 1 => Some(self.front),
            1 if self.available() >= 2 => Some(self.bytes[0]),
            _ => None,
        }
    }

    /// Remove and return the byte the front index points at, moving
    /// the state towards Empty.  An odd front index discards the even
    /// byte ahead of it and then returns to sequential order.
    pub fn consume(&mut self) -> Option<u8> {
        if self.front_index == 1 {
            if self.available() < 2 {
                return None;
            }
            self.front_index = 0;
            self.step_out();
        }
        self.step_out()
    }

    fn step_out(&mut self) -> Option<u8> {
        match self.state {
            IbState::Empty => None,
            IbState::OneByte => {
                self.state = IbState::Empty;
                Some(self.front)
            }
            IbState::Word => {
                let out = self.front;
                self.front = self.bytes[0];
                self.state = IbState::OneByte;
                Some(out)
            }
            IbState::Full => {
                let out = self.front;
                self.front = self.bytes[0];
                self.bytes[0] = self.bytes[1];
                self.state = IbState::Word;
                Some(out)
            }
        }
    }

    pub fn reset(&mut self) {
        *self = InstructionBuffer::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_step_through_every_state_in_order() {
        let mut ib = InstructionBuffer::new();
        assert_eq!(ib.state(), IbState::Empty);
        assert!(ib.load(0x11));
        assert_eq!(ib.state(), IbState::OneByte);
        assert!(ib.load(0x22));
        assert_eq!(ib.state(), IbState::Word);
        assert!(ib.load(0x33));
        assert_eq!(ib.state(), IbState::Full);
        // A fourth load is dropped and the state does not move.
        assert!(!ib.load(0x44));
        assert_eq!(ib.state(), IbState::Full);
    }

    #[test]
    fn consumptions_step_back_through_every_state_in_order() {
        let mut ib = InstructionBuffer::new();
        for byte in [0x11, 0x22, 0x33] {
            ib.load(byte);
        }
        assert_eq!(ib.consume(), Some(0x11));
        assert_eq!(ib.state(), IbState::Word);
        assert_eq!(ib.consume(), Some(0x22));
        assert_eq!(ib.state(), IbState::OneByte);
        assert_eq!(ib.consume(), Some(0x33));
        assert_eq!(ib.state(), IbState::Empty);
        assert_eq!(ib.consume(), None);
    }

    #[test]
    fn bytes_come_out_in_load_order() {
        let mut ib = InstructionBuffer::new();
        ib.load(0xaa);
        assert_eq!(ib.peek(), Some(0xaa));
        assert_eq!(ib.consume(), Some(0xaa));
        ib.load(0xbb);
        ib.load(0xcc);
        assert_eq!(ib.consume(), Some(0xbb));
        assert_eq!(ib.consume(), Some(0xcc));
        assert_eq!(ib.peek(), None);
    }

    #[test]
    fn odd_front_index_skips_the_even_byte() {
        let mut ib = InstructionBuffer::new();
        for byte in [0x11, 0x22, 0x33] {
            ib.load(byte);
        }
        ib.set_front_index(1);
        assert_eq!(ib.peek(), Some(0x22));
        assert_eq!(ib.consume(), Some(0x22));
        // The even byte went with it and sequential order resumes.
        assert_eq!(ib.front_index(), 0);
        assert_eq!(ib.state(), IbState::OneByte);
        assert_eq!(ib.consume(), Some(0x33));
        assert_eq!(ib.state(), IbState::Empty);
    }

    #[test]
    fn odd_front_index_needs_a_whole_buffered_word() {
        let mut ib = InstructionBuffer::new();
        ib.load(0x11);
        ib.set_front_index(1);
        assert_eq!(ib.peek(), None);
        assert_eq!(ib.consume(), None);
        // Nothing was discarded; the even byte is still reachable.
        ib.set_front_index(0);
        assert_eq!(ib.consume(), Some(0x11));
    }

    #[test]
    fn state_codes_match_the_hardware_reference() {
        assert_eq!(IbState::Empty.code(), 0);
        assert_eq!(IbState::OneByte.code(), 1);
        assert_eq!(IbState::Full.code(), 2);
        assert_eq!(IbState::Word.code(), 3);
    }
}
