//! CPU and memory state.
use crate::{
    constants::*,
    display::Framebuffer,
    error::Chip8Result,
    memory::Memory,
    stack::Stack,
    timer::Timer,
};

/// Core state for a chip8 interpreter.
pub struct Chip8Cpu {
    // ------------------------------------------------------------------------
    // Registers
    /// Program counter pointing to the next instruction to be fetched.
    pub(crate) pc: u16,
    /// General purpose registers for temporary values.
    ///
    /// Register 16 (VF) is used for either the carry flag or borrow switch depending on opcode.
    pub(crate) registers: [u8; REGISTER_COUNT],
    /// (I) Address register. Holds a full 16-bit value, and is checked
    /// against the memory bounds when used for access.
    pub(crate) address: u16,
    /// (DT) Delay timer that counts down to 0.
    pub(crate) delay_timer: Timer,
    /// (ST) Sound timer that counts down to 0. When it has a non-zero value, a beep is played.
    pub(crate) sound_timer: Timer,
    /// Keyboard input state. Pressed is a 1 bit, released is a 0 bit.
    pub(crate) key_state: u16,

    // ------------------------------------------------------------------------
    // Memory
    /// Main memory storage space.
    pub(crate) ram: Memory,
    /// Stack of return pointers used for jumping when a routine call finishes.
    pub(crate) stack: Stack,
    /// Screen buffer that is drawn too.
    pub(crate) display: Framebuffer,
}

impl Default for Chip8Cpu {
    fn default() -> Self {
        Self {
            pc: MEM_START as u16,
            registers: [0; REGISTER_COUNT],
            address: 0,
            delay_timer: Timer::new(),
            sound_timer: Timer::new(),
            key_state: 0,

            ram: Memory::new(),
            stack: Stack::new(),
            display: Framebuffer::new(),
        }
    }
}

impl Chip8Cpu {
    pub fn new() -> Self {
        Default::default()
    }

    /// Fresh machine state with the program loaded at `MEM_START`.
    pub fn with_program(bytecode: &[u8]) -> Chip8Result<Self> {
        Ok(Self {
            ram: Memory::with_program(bytecode)?,
            ..Default::default()
        })
    }

    #[inline(always)]
    pub fn pc(&self) -> u16 {
        self.pc
    }

    /// Value of the `I` register.
    #[inline(always)]
    pub fn address(&self) -> u16 {
        self.address
    }

    #[inline(always)]
    pub fn registers(&self) -> &[u8; REGISTER_COUNT] {
        &self.registers
    }

    #[inline(always)]
    pub fn delay_timer(&self) -> u8 {
        self.delay_timer.get()
    }

    #[inline(always)]
    pub fn sound_timer(&self) -> u8 {
        self.sound_timer.get()
    }

    pub fn ram(&self) -> &Memory {
        &self.ram
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn display(&self) -> &Framebuffer {
        &self.display
    }

    #[inline(always)]
    pub(crate) fn set_flag(&mut self, flag: bool) {
        self.registers[FLAG_REGISTER] = flag as u8;
    }

    pub fn set_key_state(&mut self, key_id: u8, state: bool) {
        if (key_id as usize) < KEY_COUNT {
            if state {
                self.key_state |= 1 << key_id;
            } else {
                self.key_state &= !(1 << key_id);
            }
        }
    }

    /// Replace the whole keyboard state with a snapshot.
    pub fn set_keys(&mut self, keys: &[bool; KEY_COUNT]) {
        self.key_state = keys
            .iter()
            .enumerate()
            .filter(|(_, pressed)| **pressed)
            .fold(0, |mask, (key_id, _)| mask | (1 << key_id));
    }

    /// Whether the key is pressed. Key identifiers outside of the keypad are never pressed.
    pub fn key_state(&self, key_id: u8) -> bool {
        if (key_id as usize) < KEY_COUNT {
            self.key_state & (1 << key_id) > 0
        } else {
            false
        }
    }

    /// Check whether any key is pressed down.
    #[inline(always)]
    pub fn any_key(&self) -> bool {
        self.key_state > 0
    }

    /// Retrieve the value of the first key that is pressed down.
    #[inline]
    pub fn first_key(&self) -> Option<u8> {
        if self.any_key() {
            Some(self.key_state.trailing_zeros() as u8)
        } else {
            None
        }
    }

    /// Clear the keyboard input state, setting all keys to up.
    #[inline(always)]
    pub fn clear_keys(&mut self) {
        self.key_state = 0;
    }

    /// Count down both timers.
    #[inline]
    pub fn tick_timers(&mut self) {
        self.delay_timer.tick();
        self.sound_timer.tick();
    }

    /// Buzzer should be on while sound timer counts down.
    #[inline(always)]
    pub fn buzzer(&self) -> bool {
        self.sound_timer.is_active()
    }

    /// Extract the instruction at the current program counter.
    #[inline(always)]
    pub fn instr(&self) -> Chip8Result<[u8; 2]> {
        self.ram.instr(self.pc)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_key_state() {
        let mut cpu = Chip8Cpu::default();

        cpu.set_key_state(0, true);
        assert_eq!(cpu.key_state, 0b00000000_00000001);
        assert!(cpu.key_state(0));
        assert!(!cpu.key_state(1));
        assert!(!cpu.key_state(7));

        cpu.set_key_state(7, true);
        assert_eq!(cpu.key_state, 0b00000000_10000001);
        assert!(cpu.key_state(0));
        assert!(!cpu.key_state(1));
        assert!(cpu.key_state(7));

        cpu.set_key_state(0, false);
        assert_eq!(cpu.key_state, 0b00000000_10000000);
        assert!(!cpu.key_state(0));
        assert!(!cpu.key_state(1));
        assert!(cpu.key_state(7));

        cpu.set_key_state(15, true);
        assert_eq!(cpu.key_state, 0b10000000_10000000);
        assert!(cpu.key_state(15));

        // Out of range keys are ignored.
        cpu.set_key_state(16, true);
        assert_eq!(cpu.key_state, 0b10000000_10000000);
        assert!(!cpu.key_state(16));
    }

    #[test]
    fn test_key_snapshot() {
        let mut cpu = Chip8Cpu::default();
        let mut keys = [false; KEY_COUNT];
        assert_eq!(cpu.first_key(), None);

        keys[0xC] = true;
        keys[0x3] = true;
        cpu.set_keys(&keys);
        assert_eq!(cpu.key_state, 0b00010000_00001000);
        assert_eq!(cpu.first_key(), Some(0x3));

        cpu.clear_keys();
        assert!(!cpu.any_key());
    }

    #[test]
    fn test_reset_state() {
        let cpu = Chip8Cpu::with_program(&[0x00, 0xE0]).unwrap();
        assert_eq!(cpu.pc(), MEM_START as u16);
        assert_eq!(cpu.address(), 0);
        assert!(cpu.registers().iter().all(|v| *v == 0));
        assert!(cpu.stack().is_empty());
        assert!(cpu.display().is_blank());
        assert!(!cpu.buzzer());
    }
}
