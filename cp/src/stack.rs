//! The hardware stack pointer: four bits with push, pop and
//! double-pop movements.  Boundary violations wrap the pointer and
//! are reported to the caller; they are never fatal.
use base::microword::StackTest;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stack {
    pointer: u8,
}

impl Stack {
    pub fn new() -> Stack {
        Stack::default()
    }

    pub fn pointer(&self) -> u8 {
        self.pointer
    }

    /// stackP<- from the ALU output.
    pub fn set(&mut self, value: u8) {
        self.pointer = value & 0xf;
    }

    /// Apply the stack movement an instruction specifies.  Returns
    /// true when the movement crossed a boundary named by the test.
    pub fn apply(&mut self, test: StackTest) -> bool {
        match test {
            StackTest::None => false,
            StackTest::Overflow => {
                let violated = self.pointer == 0xf;
                self.pointer = (self.pointer + 1) & 0xf;
                violated
            }
            StackTest::Underflow => {
                let violated = self.pointer == 0;
                self.pointer = self.pointer.wrapping_sub(1) & 0xf;
                violated
            }
            StackTest::Underflow2 => {
                let violated = self.pointer < 2;
                self.pointer = self.pointer.wrapping_sub(2) & 0xf;
                violated
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_pop_move_the_pointer() {
        let mut stack = Stack::new();
        assert!(!stack.apply(StackTest::Overflow));
        assert!(!stack.apply(StackTest::Overflow));
        assert_eq!(stack.pointer(), 2);
        assert!(!stack.apply(StackTest::Underflow));
        assert_eq!(stack.pointer(), 1);
        assert!(!stack.apply(StackTest::None));
        assert_eq!(stack.pointer(), 1);
    }

    #[test]
    fn boundary_violations_wrap_and_report() {
        let mut stack = Stack::new();
        assert!(stack.apply(StackTest::Underflow));
        assert_eq!(stack.pointer(), 0xf);
        assert!(stack.apply(StackTest::Overflow));
        assert_eq!(stack.pointer(), 0);

        stack.set(1);
        assert!(stack.apply(StackTest::Underflow2));
        assert_eq!(stack.pointer(), 0xf);
    }

    #[test]
    fn double_pop_from_two_is_clean() {
        let mut stack = Stack::new();
        stack.set(2);
        assert!(!stack.apply(StackTest::Underflow2));
        assert_eq!(stack.pointer(), 0);
    }
}
