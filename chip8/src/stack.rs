//! Call stack.
use crate::{
    constants::*,
    error::{Chip8Error, Chip8Result},
};

/// Stack of return pointers used for jumping when a routine call finishes.
#[derive(Debug, Default, Clone)]
pub struct Stack {
    slots: [u16; STACK_SIZE],
    /// Number of occupied slots, and the index of the next free slot.
    depth: usize,
}

impl Stack {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn push(&mut self, address: u16) -> Chip8Result<()> {
        let slot = self
            .slots
            .get_mut(self.depth)
            .ok_or(Chip8Error::StackOverflow)?;
        *slot = address;
        self.depth += 1;
        Ok(())
    }

    pub fn pop(&mut self) -> Chip8Result<u16> {
        let depth = self.depth.checked_sub(1).ok_or(Chip8Error::StackUnderflow)?;
        self.depth = depth;
        Ok(self.slots[depth])
    }

    #[inline(always)]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.depth == 0
    }

    /// Return addresses from the bottom of the stack to the top.
    pub fn as_slice(&self) -> &[u16] {
        &self.slots[..self.depth]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_push_pop() {
        let mut stack = Stack::new();
        stack.push(0x202).unwrap();
        stack.push(0x340).unwrap();
        assert_eq!(stack.as_slice(), &[0x202, 0x340]);
        assert_eq!(stack.pop().unwrap(), 0x340);
        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.pop().unwrap(), 0x202);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_overflow() {
        let mut stack = Stack::new();
        for i in 0..STACK_SIZE {
            stack.push(i as u16).unwrap();
        }
        assert!(matches!(stack.push(0xFFF), Err(Chip8Error::StackOverflow)));
        // Failed push leaves the stack untouched.
        assert_eq!(stack.depth(), STACK_SIZE);
        assert_eq!(stack.pop().unwrap(), (STACK_SIZE - 1) as u16);
    }

    #[test]
    fn test_underflow() {
        let mut stack = Stack::new();
        assert!(matches!(stack.pop(), Err(Chip8Error::StackUnderflow)));
        assert_eq!(stack.depth(), 0);
    }
}
