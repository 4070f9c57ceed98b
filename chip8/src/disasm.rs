//! Disassembler.
use std::fmt::{self, Write as FmtWrite};

use crate::{bytecode::op_word, constants::MEM_START, op::Op};

pub struct Disassembler<'a> {
    bytecode: &'a [u8],
    cursor: usize,
}

impl<'a> Disassembler<'a> {
    pub fn new(bytecode: &'a [u8]) -> Self {
        Self {
            bytecode,
            cursor: 0,
        }
    }

    /// Write the whole program, one instruction per line.
    ///
    /// Words that don't decode are likely sprite data, and are written as `???`.
    pub fn disassemble<W: FmtWrite>(&mut self, w: &mut W) -> fmt::Result {
        self.cursor = 0;

        while self.cursor < self.bytecode.len() {
            self.disassemble_instr(w)?;
            self.cursor += 2;
        }

        self.cursor = 0;

        Ok(())
    }

    /// Write a single instruction to the given writer.
    fn disassemble_instr<W: FmtWrite>(&self, w: &mut W) -> fmt::Result {
        let address = MEM_START + self.cursor;

        // A trailing odd byte is padded.
        let instr = [
            self.bytecode[self.cursor],
            self.bytecode.get(self.cursor + 1).copied().unwrap_or(0),
        ];
        let word = op_word(instr);

        match Op::decode(instr) {
            Some(op) => writeln!(w, "0x{address:04X} {word:04X} {op}"),
            None => writeln!(w, "0x{address:04X} {word:04X} ???"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_disassemble() {
        let rom = [0x00, 0xE0, 0x6A, 0x02, 0xFF, 0xFF, 0x12, 0x00, 0xF0];
        let mut buf = String::new();
        Disassembler::new(&rom).disassemble(&mut buf).unwrap();

        let lines: Vec<&str> = buf.lines().collect();
        assert_eq!(
            lines,
            [
                "0x0200 00E0 CLS",
                "0x0202 6A02 LD vA, 0x02",
                "0x0204 FFFF ???",
                "0x0206 1200 JP 0x200",
                "0x0208 F000 ???",
            ]
        );
    }
}
