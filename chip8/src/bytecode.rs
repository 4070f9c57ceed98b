//! Helpers for extracting operands from instructions.
//!
//! Instructions are two bytes, big-endian, split into four nibbles:
//!
//! ```text
//! a: 0xF000  op
//!    0x0F00  x
//! b: 0x00F0  y
//!    0x000F  n
//! ```

/// Combine the two instruction bytes into a `u16`.
#[inline(always)]
pub fn op_word(instr: [u8; 2]) -> u16 {
    u16::from_be_bytes(instr)
}

/// Extract the opcode class from the highest nibble.
#[inline(always)]
pub fn op_code(instr: [u8; 2]) -> u8 {
    (instr[0] & 0b1111_0000) >> 4
}

/// Extract operand NNN, the lowest 12 bits.
#[inline(always)]
pub fn op_nnn(instr: [u8; 2]) -> u16 {
    ((instr[0] as u16 & 0b1111) << 8) | instr[1] as u16
}

/// Extract operand NN, the lowest byte.
#[inline(always)]
pub fn op_nn(instr: [u8; 2]) -> u8 {
    instr[1]
}

/// Extract operand VX.
#[inline(always)]
pub fn op_x(instr: [u8; 2]) -> u8 {
    // Opcode is in upper nibble and needs to be masked out.
    instr[0] & 0b1111
}

/// Extract operand VY.
#[inline(always)]
pub fn op_y(instr: [u8; 2]) -> u8 {
    (instr[1] & 0b1111_0000) >> 4
}

/// Extract operand N, the lowest nibble.
#[inline(always)]
pub fn op_n(instr: [u8; 2]) -> u8 {
    instr[1] & 0b1111
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_operands() {
        let instr = [0xD1, 0x2F];
        assert_eq!(op_word(instr), 0xD12F);
        assert_eq!(op_code(instr), 0xD);
        assert_eq!(op_x(instr), 0x1);
        assert_eq!(op_y(instr), 0x2);
        assert_eq!(op_n(instr), 0xF);
        assert_eq!(op_nn(instr), 0x2F);
        assert_eq!(op_nnn(instr), 0x12F);
    }
}
