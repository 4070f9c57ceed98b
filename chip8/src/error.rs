//! Result and errors.
use std::fmt::{self, Display, Formatter};

pub type Chip8Result<T> = std::result::Result<T, Chip8Error>;

#[derive(Debug)]
pub enum Chip8Error {
    /// Instruction does not match any known opcode pattern.
    DecodeFault {
        /// The raw 2-byte instruction.
        opcode: u16,
        /// Memory address the instruction was fetched from.
        address: u16,
    },
    /// Subroutine call nested deeper than the call stack allows.
    StackOverflow,
    /// Return from subroutine while the call stack is empty.
    StackUnderflow,
    /// Attempt to load a program that can't fit in memory.
    RomTooLarge { size: usize, max: usize },
    /// Memory access through the program counter or address register
    /// outside of the addressable range.
    MemoryOutOfBounds { address: usize },
    /// Custom fontset data is malformed.
    Font(String),
    /// The VM was stopped by an earlier error and must be reloaded.
    Halted,
    Fmt(fmt::Error),
}

impl Display for Chip8Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::DecodeFault { opcode, address } => {
                write!(f, "unsupported opcode {opcode:04X} at address {address:04X}")
            }
            Self::StackOverflow => write!(f, "call stack overflow"),
            Self::StackUnderflow => write!(f, "call stack underflow"),
            Self::RomTooLarge { size, max } => write!(
                f,
                "program too large for VM memory: {size} bytes, maximum is {max} bytes"
            ),
            Self::MemoryOutOfBounds { address } => {
                write!(f, "memory access out of bounds at address {address:#06X}")
            }
            Self::Font(msg) => write!(f, "font error: {msg}"),
            Self::Halted => write!(f, "virtual machine is halted"),
            Self::Fmt(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for Chip8Error {}

impl From<fmt::Error> for Chip8Error {
    fn from(err: fmt::Error) -> Self {
        Chip8Error::Fmt(err)
    }
}

impl Chip8Error {
    /// Whether the error was caused by an instruction that couldn't be decoded.
    pub fn is_decode_fault(&self) -> bool {
        matches!(self, Self::DecodeFault { .. })
    }
}
