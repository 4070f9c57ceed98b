//! Main memory and the bounded address type used to access it.
use crate::{
    constants::*,
    error::{Chip8Error, Chip8Result},
};

/// Memory address that is guaranteed to be inside the addressable space.
///
/// Registers such as the program counter and `I` hold plain integers, which
/// must be checked into an `Address` before memory can be touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u16);

impl Address {
    /// Check the raw value against the memory size.
    #[inline]
    pub fn new(raw: u16) -> Chip8Result<Self> {
        if (raw as usize) < MEM_SIZE {
            Ok(Self(raw))
        } else {
            Err(Chip8Error::MemoryOutOfBounds {
                address: raw as usize,
            })
        }
    }

    /// Build an address from the 12-bit operand of an instruction.
    ///
    /// Only the lowest 12 bits are used, so the result is always in range.
    #[inline(always)]
    pub fn from_nnn(nnn: u16) -> Self {
        Self(nnn & 0x0FFF)
    }

    /// Address `delta` bytes further along in memory.
    #[inline]
    pub fn offset(self, delta: usize) -> Chip8Result<Self> {
        let raw = self.0 as usize + delta;
        if raw < MEM_SIZE {
            Ok(Self(raw as u16))
        } else {
            Err(Chip8Error::MemoryOutOfBounds { address: raw })
        }
    }

    #[inline(always)]
    pub fn as_u16(self) -> u16 {
        self.0
    }

    #[inline(always)]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Main memory storage space.
pub struct Memory {
    ram: Box<[u8; MEM_SIZE]>,
}

impl Default for Memory {
    fn default() -> Self {
        let mut memory = Self {
            ram: Box::new([0; MEM_SIZE]),
        };
        memory.write_font(&BUILTIN_FONTSET);
        memory
    }
}

impl Memory {
    /// Zeroed memory with the builtin font loaded.
    pub fn new() -> Self {
        Default::default()
    }

    /// Memory with the builtin font, and the given program loaded at `MEM_START`.
    pub fn with_program(bytecode: &[u8]) -> Chip8Result<Self> {
        let mut memory = Self::new();
        memory.load_program(bytecode)?;
        Ok(memory)
    }

    /// Copy a program into memory at `MEM_START`.
    ///
    /// Nothing is written when the program does not fit.
    pub fn load_program(&mut self, bytecode: &[u8]) -> Chip8Result<()> {
        if bytecode.len() > MAX_PROGRAM_SIZE {
            return Err(Chip8Error::RomTooLarge {
                size: bytecode.len(),
                max: MAX_PROGRAM_SIZE,
            });
        }

        self.ram[MEM_START..MEM_START + bytecode.len()].copy_from_slice(bytecode);

        Ok(())
    }

    /// Replace the glyph table.
    pub fn load_font(&mut self, fontset: &[u8]) -> Chip8Result<()> {
        if fontset.len() != FONTSET_DATA_LENGTH {
            return Err(Chip8Error::Font(format!(
                "fontset data must be {FONTSET_DATA_LENGTH} bytes, got {}",
                fontset.len()
            )));
        }

        self.write_font(fontset);

        Ok(())
    }

    #[inline]
    fn write_font(&mut self, fontset: &[u8]) {
        let start = FONTSET_START as usize;
        self.ram[start..start + FONTSET_DATA_LENGTH].copy_from_slice(fontset);
    }

    #[inline(always)]
    pub fn read(&self, address: Address) -> u8 {
        self.ram[address.as_usize()]
    }

    /// Extract the big-endian instruction located at the raw address.
    #[inline]
    pub fn instr(&self, pc: u16) -> Chip8Result<[u8; 2]> {
        let hi = Address::new(pc)?;
        let lo = hi.offset(1)?;
        Ok([self.read(hi), self.read(lo)])
    }

    /// Borrow `len` bytes starting at the raw address.
    pub fn slice(&self, start: u16, len: usize) -> Chip8Result<&[u8]> {
        let range = Self::range(start, len)?;
        Ok(&self.ram[range])
    }

    /// Mutably borrow `len` bytes starting at the raw address.
    pub fn slice_mut(&mut self, start: u16, len: usize) -> Chip8Result<&mut [u8]> {
        let range = Self::range(start, len)?;
        Ok(&mut self.ram[range])
    }

    fn range(start: u16, len: usize) -> Chip8Result<std::ops::Range<usize>> {
        let start = Address::new(start)?.as_usize();
        let end = start + len;
        if end > MEM_SIZE {
            return Err(Chip8Error::MemoryOutOfBounds { address: end - 1 });
        }
        Ok(start..end)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.ram[..]
    }
}
