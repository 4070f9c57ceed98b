//! Virtual machine.
use std::{fmt, time::Duration};

use log::{debug, error, trace, warn};
use rand::prelude::*;

use crate::{
    bytecode::op_word,
    clock::Clock,
    constants::*,
    cpu::Chip8Cpu,
    devices::{Devices, KeyCode, Keypad},
    display::Framebuffer,
    error::{Chip8Error, Chip8Result},
    op::Op,
};

pub struct Chip8Vm {
    cpu: Chip8Cpu,
    /// Instruction clock.
    clock: Clock,
    /// Delay and sound timer clock.
    timer: Clock,
    rng: StdRng,
    /// Set when an error stopped execution.
    halted: bool,
    /// Last buzzer state reported to the devices.
    buzzer_state: bool,
    conf: Chip8Conf,
}

impl Chip8Vm {
    pub fn new(conf: Chip8Conf) -> Self {
        let rng = match conf.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Chip8Vm {
            cpu: Chip8Cpu::new(),
            clock: Clock::new(conf.clock_frequency.unwrap_or_default().0),
            timer: Clock::new(DELAY_FREQUENCY),
            rng,
            halted: false,
            buzzer_state: false,
            conf,
        }
    }

    /// Configuration that was used to instantiate the VM.
    pub fn config(&self) -> &Chip8Conf {
        &self.conf
    }

    /// Replace the builtin font glyphs.
    ///
    /// Must be called after [`Chip8Vm::load_rom`], which resets memory.
    pub fn load_font(&mut self, fontset: &[u8]) -> Chip8Result<()> {
        self.cpu.ram.load_font(fontset)
    }

    /// Load a program, discarding all previous machine state.
    ///
    /// The previous state is kept when the program does not fit in memory.
    pub fn load_rom(&mut self, bytecode: &[u8]) -> Chip8Result<()> {
        // Start with clean memory to avoid leaking previous program.
        self.cpu = Chip8Cpu::with_program(bytecode)?;
        self.reset();

        debug!("loaded program of {} bytes", bytecode.len());

        Ok(())
    }

    pub fn cpu(&self) -> &Chip8Cpu {
        &self.cpu
    }

    pub fn display_buffer(&self) -> &Framebuffer {
        &self.cpu.display
    }

    /// Whether the sound timer is running, and a tone should be played.
    pub fn buzzer(&self) -> bool {
        self.cpu.buzzer()
    }

    /// Whether an earlier error stopped the machine.
    pub fn is_halted(&self) -> bool {
        self.halted
    }
}

/// Outcome of executing a single instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Flow {
    Ok,
    /// Program counter has jumped to a new address.
    ///
    /// This is useful for the caller to detect infinite or long running loops.
    ///
    /// This is returned when the interpreter encounters:
    ///
    /// - 1nnn (`JP addr`)
    /// - 2nnn (`CALL addr`)
    /// - 00EE (`RET`)
    /// - Bnnn (`JP V0, addr`)
    Jump,
    /// Display buffer was cleared or drawn to.
    Draw,
    /// Sound timer was set.
    Sound,
    /// Wait for a keypress.
    ///
    /// This is triggered by the opcode `Fx0A` (`LD Vx, K`), which stops
    /// execution until a key is pressed, and loads the key value into `Vx`.
    KeyWait,
}

/// Result of advancing the VM's clocks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Cycle {
    /// Set when an instruction was executed.
    pub flow: Option<Flow>,
    /// Timers ticked, and the display should be presented.
    pub frame_ready: bool,
}

/// VM Configuration Parameters.
#[derive(Debug, Default, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(default))]
pub struct Chip8Conf {
    /// Instructions executed per second.
    pub clock_frequency: Option<Hz>,
    /// What happens after an instruction fails to decode.
    pub fault_policy: FaultPolicy,
    /// Seed for the random number generator. Taken from
    /// system entropy when not set.
    pub seed: Option<u64>,
}

/// CPU clock frequency, in hertz (per second)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(transparent))]
pub struct Hz(pub u64);

impl Default for Hz {
    fn default() -> Self {
        Hz(DEFAULT_CLOCK_FREQUENCY)
    }
}

impl From<Hz> for Duration {
    fn from(freq: Hz) -> Self {
        if freq.0 == 0 {
            Duration::from_nanos(0)
        } else {
            Duration::from_nanos(1_000_000_000 / freq.0)
        }
    }
}

/// Handling of instructions that don't match any opcode.
///
/// The error is always returned to the caller. The policy decides
/// whether the machine can be resumed afterwards.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum FaultPolicy {
    /// Stop the machine. Further execution returns [`Chip8Error::Halted`].
    #[default]
    Halt,
    /// Continue with the next instruction on the following cycle.
    Skip,
}

/// Interpreter
impl Chip8Vm {
    /// Sets the keyboard key input state.
    pub fn set_key(&mut self, key: KeyCode, pressed: bool) {
        self.cpu.set_key_state(key.as_u8(), pressed);
    }

    /// Clear the keyboard input state, setting all keys to up.
    pub fn clear_keys(&mut self) {
        self.cpu.clear_keys()
    }

    /// Clear internal state in preparation for a fresh startup.
    fn reset(&mut self) {
        self.clock.reset();
        self.timer.reset();
        self.halted = false;
        self.buzzer_state = false;
    }

    /// Let time pass on the virtual machine.
    ///
    /// The keyboard snapshot replaces the current key state. At most one
    /// instruction is executed and the timers are counted down at most once,
    /// regardless of how much time has elapsed.
    pub fn advance_time(&mut self, elapsed: Duration, keys: &Keypad) -> Chip8Result<Cycle> {
        if self.halted {
            return Err(Chip8Error::Halted);
        }

        self.cpu.set_keys(keys);
        self.clock.accumulate(elapsed);
        self.timer.accumulate(elapsed);

        let mut cycle = Cycle::default();

        if self.clock.tick() {
            cycle.flow = Some(self.tick()?);
        }

        // Count down timers
        if self.timer.tick() {
            self.cpu.tick_timers();
            cycle.frame_ready = true;
        }

        Ok(cycle)
    }

    /// Run one driver iteration against the given devices.
    ///
    /// Polls the keypad, advances time, presents the display when a frame is
    /// ready and switches the buzzer when the sound timer starts or stops.
    pub fn drive<D: Devices>(&mut self, elapsed: Duration, devices: &mut D) -> Chip8Result<Cycle> {
        let keys = devices.keypad();
        let cycle = self.advance_time(elapsed, &keys)?;

        if cycle.frame_ready {
            devices.draw(&self.cpu.display);
        }

        // Buzzer should be on while sound timer counts down,
        // then turned off when the timer reaches zero.
        let buzzer = self.cpu.buzzer();
        if buzzer != self.buzzer_state {
            self.buzzer_state = buzzer;
            devices.buzz(buzzer);
        }

        Ok(cycle)
    }

    /// Execute instructions without regard for the clock.
    pub fn run_steps(&mut self, step_count: usize) -> Chip8Result<()> {
        for _ in 0..step_count {
            self.tick()?;
        }

        Ok(())
    }

    /// Execute a single instruction immediately.
    pub fn tick(&mut self) -> Chip8Result<Flow> {
        if self.halted {
            return Err(Chip8Error::Halted);
        }

        self.step().map_err(|err| {
            if err.is_decode_fault() && self.conf.fault_policy == FaultPolicy::Skip {
                warn!("skipping instruction: {err}");
            } else {
                error!("halting: {err}");
                self.halted = true;
            }
            err
        })
    }

    fn step(&mut self) -> Chip8Result<Flow> {
        let pc = self.cpu.pc;
        let instr = self.cpu.instr()?;

        // Program counter always points to the next instruction.
        self.cpu.pc = pc + INSTR_SIZE;

        let op = Op::decode(instr).ok_or(Chip8Error::DecodeFault {
            opcode: op_word(instr),
            address: pc,
        })?;

        trace!("{pc:04X}: {op}");

        self.exec(op)
    }

    #[inline]
    fn skip_if(&mut self, condition: bool) {
        if condition {
            self.cpu.pc += INSTR_SIZE;
        }
    }

    /// Execute a control flow, register or display instruction.
    fn exec(&mut self, op: Op) -> Chip8Result<Flow> {
        let mut control_flow = Flow::Ok;

        match op {
            // 00E0 (CLS)
            Op::ClearScreen => {
                self.cpu.display.clear();
                control_flow = Flow::Draw;
            }
            // 00EE (RET)
            //
            // Set the program counter to the value at the top of the stack.
            Op::Return => {
                self.cpu.pc = self.cpu.stack.pop()?;
                control_flow = Flow::Jump;
            }
            // 1nnn (JP addr)
            Op::Jump { address } => {
                self.cpu.pc = address;
                control_flow = Flow::Jump;
            }
            // 2nnn (CALL addr)
            //
            // The return address is the instruction following the call.
            Op::Call { address } => {
                self.cpu.stack.push(self.cpu.pc)?;
                self.cpu.pc = address;
                control_flow = Flow::Jump;
            }
            // 3xnn (SE Vx, byte)
            Op::Skip_Eq_Byte { vx, nn } => {
                self.skip_if(self.cpu.registers[vx as usize] == nn);
            }
            // 4xnn (SNE Vx, byte)
            Op::Skip_NotEq_Byte { vx, nn } => {
                self.skip_if(self.cpu.registers[vx as usize] != nn);
            }
            // 5xy0 (SE Vx, Vy)
            Op::Skip_Eq { vx, vy } => {
                let x = self.cpu.registers[vx as usize];
                let y = self.cpu.registers[vy as usize];
                self.skip_if(x == y);
            }
            // 6xnn (LD Vx, byte)
            Op::Load_Byte { vx, nn } => {
                self.cpu.registers[vx as usize] = nn;
            }
            // 7xnn (ADD Vx, byte)
            //
            // Carry flag is not set.
            Op::Add_Byte { vx, nn } => {
                let x = self.cpu.registers[vx as usize];
                self.cpu.registers[vx as usize] = x.wrapping_add(nn);
            }
            // 9xy0 (SNE Vx, Vy)
            Op::Skip_NotEq { vx, vy } => {
                let x = self.cpu.registers[vx as usize];
                let y = self.cpu.registers[vy as usize];
                self.skip_if(x != y);
            }
            // Annn (LD I, addr)
            Op::Load_Address { address } => {
                self.cpu.address = address;
            }
            // Bnnn (JP V0, addr)
            //
            // The destination may land outside of memory, which
            // is caught by the next fetch.
            Op::Jump_V0 { address } => {
                self.cpu.pc = address + self.cpu.registers[0] as u16;
                control_flow = Flow::Jump;
            }
            // Cxnn (RND Vx, byte)
            //
            // Set register VX to the result of bitwise AND between a random number and NN.
            Op::Random { vx, nn } => {
                self.cpu.registers[vx as usize] = nn & self.rng.gen::<u8>();
            }
            // Dxyn (DRW Vx, Vy, nibble)
            //
            // Draw sprite to the display buffer, at coordinate as per registers Vx and Vy.
            // Sprite is encoded as 8 pixels wide, N pixels high, stored in bits located in
            // memory pointed to by address register I.
            //
            // If the drawing operation erases existing pixels in the display buffer, register VF is set to
            // 1, and set to 0 if no display bits are unset. This is used for collision detection.
            Op::Draw { vx, vy, n } => {
                let x = self.cpu.registers[vx as usize] as usize;
                let y = self.cpu.registers[vy as usize] as usize;

                let sprite = self.cpu.ram.slice(self.cpu.address, n as usize)?;
                let is_erased = self.cpu.display.draw(x, y, sprite);

                self.cpu.set_flag(is_erased);
                control_flow = Flow::Draw;
            }
            // Keyboard
            Op::Skip_Key { vx } => {
                let key = self.cpu.registers[vx as usize];
                self.skip_if(self.cpu.key_state(key));
            }
            Op::Skip_NotKey { vx } => {
                let key = self.cpu.registers[vx as usize];
                self.skip_if(!self.cpu.key_state(key));
            }
            Op::Load_Vx_Vy { .. }
            | Op::Or_Vx_Vy { .. }
            | Op::And_Vx_Vy { .. }
            | Op::Xor_Vx_Vy { .. }
            | Op::Add_Vx_Vy { .. }
            | Op::Sub_Vx_Vy { .. }
            | Op::ShiftRight { .. }
            | Op::SubReverse_Vx_Vy { .. }
            | Op::ShiftLeft { .. } => self.exec_math(op),
            _ => control_flow = self.exec_misc(op)?,
        }

        Ok(control_flow)
    }

    /// Execute an arithmetic instruction
    ///
    /// The flag is written after the result, so it wins when `Vx` is `VF`.
    #[inline]
    fn exec_math(&mut self, op: Op) {
        let regs = &mut self.cpu.registers;

        match op {
            // 8XY0 (LD Vx, Vy)
            Op::Load_Vx_Vy { vx, vy } => {
                regs[vx as usize] = regs[vy as usize];
            }
            // 8XY1 (OR Vx, Vy)
            Op::Or_Vx_Vy { vx, vy } => {
                regs[vx as usize] |= regs[vy as usize];
            }
            // 8XY2 (AND Vx, Vy)
            Op::And_Vx_Vy { vx, vy } => {
                regs[vx as usize] &= regs[vy as usize];
            }
            // 8XY3 (XOR Vx, Vy)
            Op::Xor_Vx_Vy { vx, vy } => {
                regs[vx as usize] ^= regs[vy as usize];
            }
            // 8XY4 (ADD Vx, Vy)
            //
            // If overflow, set VF to 1, else 0.
            Op::Add_Vx_Vy { vx, vy } => {
                let (result, carry) = regs[vx as usize].overflowing_add(regs[vy as usize]);
                regs[vx as usize] = result;
                regs[FLAG_REGISTER] = carry as u8;
            }
            // 8XY5 (SUB Vx, Vy)
            //
            // VF is set to 0 when there is a borrow, set to 1 when there isn't.
            Op::Sub_Vx_Vy { vx, vy } => {
                let (result, borrow) = regs[vx as usize].overflowing_sub(regs[vy as usize]);
                regs[vx as usize] = result;
                regs[FLAG_REGISTER] = !borrow as u8;
            }
            // 8XY6 (SHR Vx)
            Op::ShiftRight { vx } => {
                let x = regs[vx as usize];
                regs[vx as usize] = x >> 1;
                regs[FLAG_REGISTER] = x & 1;
            }
            // 8XY7 (SUBN Vx, Vy)
            //
            // VF is set to 0 when there is a borrow, set to 1 when there isn't.
            Op::SubReverse_Vx_Vy { vx, vy } => {
                let (result, borrow) = regs[vy as usize].overflowing_sub(regs[vx as usize]);
                regs[vx as usize] = result;
                regs[FLAG_REGISTER] = !borrow as u8;
            }
            // 8XYE (SHL Vx)
            Op::ShiftLeft { vx } => {
                let x = regs[vx as usize];
                regs[vx as usize] = x << 1;
                regs[FLAG_REGISTER] = (x >> 7) & 1;
            }
            _ => unreachable!("not an arithmetic instruction: {op:?}"),
        }
    }

    /// Execute a timer, address register or memory instruction
    #[inline]
    fn exec_misc(&mut self, op: Op) -> Chip8Result<Flow> {
        let mut control_flow = Flow::Ok;

        match op {
            // Fx07 (LD Vx, DT)
            Op::Load_Vx_Delay { vx } => {
                self.cpu.registers[vx as usize] = self.cpu.delay_timer.get();
            }
            // Fx0A (LD Vx, K)
            //
            // Wait for a key press, store the value of the key in Vx.
            // When multiple keys are down, the lowest key wins.
            Op::Wait_Key { vx } => {
                if let Some(k) = self.cpu.first_key() {
                    self.cpu.registers[vx as usize] = k;
                } else {
                    // rewind the program counter to stall the machine
                    self.cpu.pc -= INSTR_SIZE;
                    control_flow = Flow::KeyWait;
                }
            }
            // Fx15 (LD DT, Vx)
            Op::Load_Delay_Vx { vx } => {
                self.cpu.delay_timer.set(self.cpu.registers[vx as usize]);
            }
            // Fx18 (LD ST, Vx)
            Op::Load_Sound_Vx { vx } => {
                self.cpu.sound_timer.set(self.cpu.registers[vx as usize]);
                control_flow = Flow::Sound;
            }
            // Fx1E (ADD I, Vx)
            //
            // VF is set when the 16-bit register wraps.
            Op::Add_Address { vx } => {
                let x = self.cpu.registers[vx as usize] as u16;
                let (address, overflow) = self.cpu.address.overflowing_add(x);
                self.cpu.address = address;
                self.cpu.set_flag(overflow);
            }
            // Fx29 (LD F, Vx)
            //
            // Set I = location of sprite for digit Vx.
            Op::Load_Glyph { vx } => {
                let digit = (self.cpu.registers[vx as usize] & 0xF) as u16;
                self.cpu.address = FONTSET_START + digit * FONTSET_HEIGHT as u16;
            }
            // Fx33 (LD B, Vx)
            //
            // Store the binary-coded decimal representation of Vx
            // in the memory locations I, I+1, and I+2.
            #[rustfmt::skip]
            Op::Store_Bcd { vx } => {
                let x = self.cpu.registers[vx as usize];
                let out = self.cpu.ram.slice_mut(self.cpu.address, 3)?;
                out[0] = x / 100 % 10;
                out[1] = x / 10  % 10;
                out[2] = x       % 10;
            }
            // Fx55 (LD [I], Vx)
            //
            // Store registers V0 through Vx in memory starting at location I.
            Op::Store_Registers { vx } => {
                let count = vx as usize + 1;
                self.cpu
                    .ram
                    .slice_mut(self.cpu.address, count)?
                    .copy_from_slice(&self.cpu.registers[..count]);
            }
            // Fx65 (LD Vx, [I])
            //
            // Read registers V0 through Vx from memory starting at location I.
            Op::Load_Registers { vx } => {
                let count = vx as usize + 1;
                let values = self.cpu.ram.slice(self.cpu.address, count)?;
                self.cpu.registers[..count].copy_from_slice(values);
            }
            _ => unreachable!("not a miscellaneous instruction: {op:?}"),
        }

        Ok(control_flow)
    }
}

/// Troubleshooting
#[doc(hidden)]
impl Chip8Vm {
    /// Returns the contents of the program memory as a human readable string.
    pub fn dump_ram(&self, count: usize) -> Result<String, fmt::Error> {
        use fmt::Write;

        let ram = self.cpu.ram.as_slice();
        let mut buf = String::new();

        for (i, instr) in ram[MEM_START..]
            .chunks_exact(2)
            .take(count / 2)
            .enumerate()
        {
            writeln!(buf, "{:04X}: {:02X}{:02X}", MEM_START + i * 2, instr[0], instr[1])?;
        }

        Ok(buf)
    }

    pub fn dump_display(&self) -> Result<String, fmt::Error> {
        self.cpu.display.dump()
    }

    pub fn dump_keys(&self) -> Result<String, fmt::Error> {
        use fmt::Write;

        let mut buf = String::new();

        if self.cpu.any_key() {
            write!(buf, "keys: ")?;
            for i in 0..KEY_COUNT as u8 {
                if self.cpu.key_state(i) {
                    write!(buf, "k{i:x}")?;
                }
            }
        }

        Ok(buf)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const NO_KEYS: Keypad = [false; KEY_COUNT];

    fn vm_with(rom: &[u8]) -> Chip8Vm {
        let mut vm = Chip8Vm::new(Chip8Conf {
            seed: Some(8),
            ..Default::default()
        });
        vm.load_rom(rom).unwrap();
        vm
    }

    #[test]
    fn test_clock_hz() {
        let interval: Duration = Hz(60).into();
        assert_eq!(interval.as_millis(), 16);
        assert_eq!(Hz::default(), Hz(700));
    }

    #[test]
    #[rustfmt::skip]
    fn test_skip_instructions() {
        let mut vm = vm_with(&[
            0x61, 0x05, // LD v1, 5
            0x31, 0x05, // SE v1, 5     ; skips
            0x00, 0x00, // invalid
            0x41, 0x05, // SNE v1, 5    ; does not skip
            0x62, 0x05, // LD v2, 5
            0x51, 0x20, // SE v1, v2    ; skips
            0x00, 0x00, // invalid
            0x91, 0x20, // SNE v1, v2   ; does not skip
            0x63, 0x42, // LD v3, 0x42
        ]);
        vm.run_steps(7).unwrap();
        assert_eq!(vm.cpu.registers[3], 0x42);
        assert_eq!(vm.cpu.pc, MEM_START as u16 + 18);
    }

    #[test]
    #[rustfmt::skip]
    fn test_call_return() {
        let mut vm = vm_with(&[
            0x22, 0x06, // CALL 0x206
            0x60, 0x01, // LD v0, 1
            0x12, 0x04, // JP 0x204
            0x61, 0x02, // LD v1, 2
            0x00, 0xEE, // RET
        ]);
        assert_eq!(vm.tick().unwrap(), Flow::Jump);
        assert_eq!(vm.cpu.pc, 0x206);
        assert_eq!(vm.cpu.stack.as_slice(), &[0x202]);

        vm.tick().unwrap();
        assert_eq!(vm.tick().unwrap(), Flow::Jump);
        assert_eq!(vm.cpu.pc, 0x202);
        assert!(vm.cpu.stack.is_empty());

        vm.tick().unwrap();
        assert_eq!(vm.cpu.registers[0], 1);
        assert_eq!(vm.cpu.registers[1], 2);
    }

    #[test]
    fn test_return_underflow_halts() {
        let mut vm = vm_with(&[0x00, 0xEE]);
        assert!(matches!(vm.tick(), Err(Chip8Error::StackUnderflow)));
        assert!(vm.is_halted());
        assert!(matches!(vm.tick(), Err(Chip8Error::Halted)));
    }

    #[test]
    fn test_call_overflow() {
        // Subroutine that calls itself forever.
        let mut vm = vm_with(&[0x22, 0x00]);
        vm.run_steps(STACK_SIZE).unwrap();
        assert_eq!(vm.cpu.stack.depth(), STACK_SIZE);
        assert!(matches!(vm.tick(), Err(Chip8Error::StackOverflow)));
        assert_eq!(vm.cpu.stack.depth(), STACK_SIZE);
    }

    #[test]
    #[rustfmt::skip]
    fn test_flag_register_as_destination() {
        let mut vm = vm_with(&[
            0x6F, 0xFF, // LD vF, 0xFF
            0x60, 0x02, // LD v0, 2
            0x8F, 0x04, // ADD vF, v0
        ]);
        vm.run_steps(3).unwrap();
        assert_eq!(vm.cpu.registers[0xF], 1);
    }

    #[test]
    #[rustfmt::skip]
    fn test_shifts() {
        let mut vm = vm_with(&[
            0x60, 0b1000_0001, // LD v0, 0x81
            0x80, 0x06,        // SHR v0
            0x61, 0b1000_0000, // LD v1, 0x80
            0x81, 0x0E,        // SHL v1
            0x62, 0b0100_0000, // LD v2, 0x40
            0x82, 0x0E,        // SHL v2
        ]);
        vm.run_steps(2).unwrap();
        assert_eq!(vm.cpu.registers[0], 0b0100_0000);
        assert_eq!(vm.cpu.registers[0xF], 1);

        vm.run_steps(2).unwrap();
        assert_eq!(vm.cpu.registers[1], 0);
        assert_eq!(vm.cpu.registers[0xF], 1);

        vm.run_steps(2).unwrap();
        assert_eq!(vm.cpu.registers[2], 0b1000_0000);
        assert_eq!(vm.cpu.registers[0xF], 0);
    }

    #[test]
    #[rustfmt::skip]
    fn test_logic_ops() {
        let mut vm = vm_with(&[
            0x60, 0b1100, // LD v0, 0x0C
            0x61, 0b1010, // LD v1, 0x0A
            0x80, 0x11,   // OR v0, v1
            0x60, 0b1100, // LD v0, 0x0C
            0x80, 0x12,   // AND v0, v1
            0x60, 0b1100, // LD v0, 0x0C
            0x80, 0x13,   // XOR v0, v1
            0x82, 0x10,   // LD v2, v1
        ]);
        vm.run_steps(3).unwrap();
        assert_eq!(vm.cpu.registers[0], 0b1110);

        vm.run_steps(2).unwrap();
        assert_eq!(vm.cpu.registers[0], 0b1000);

        vm.run_steps(2).unwrap();
        assert_eq!(vm.cpu.registers[0], 0b0110);

        vm.run_steps(1).unwrap();
        assert_eq!(vm.cpu.registers[2], 0b1010);
        assert_eq!(vm.cpu.registers[1], 0b1010);
    }

    #[test]
    #[rustfmt::skip]
    fn test_add_byte_wraps() {
        let mut vm = vm_with(&[
            0x6F, 0x05, // LD vF, 5
            0x63, 0xFF, // LD v3, 0xFF
            0x73, 0x02, // ADD v3, 2
        ]);
        vm.run_steps(3).unwrap();
        assert_eq!(vm.cpu.registers[3], 1);
        // Carry is not reported.
        assert_eq!(vm.cpu.registers[0xF], 5);
    }

    #[test]
    #[rustfmt::skip]
    fn test_clear_screen() {
        let mut vm = vm_with(&[
            0x60, 0x00, // LD v0, 0
            0xF0, 0x29, // LD F, v0
            0xD0, 0x05, // DRW v0, v0, 5
            0x00, 0xE0, // CLS
        ]);
        vm.run_steps(3).unwrap();
        assert!(!vm.display_buffer().is_blank());

        assert_eq!(vm.tick().unwrap(), Flow::Draw);
        assert!(vm.display_buffer().is_blank());
    }

    #[test]
    #[rustfmt::skip]
    fn test_custom_font() {
        let mut vm = vm_with(&[
            0x60, 0x01, // LD v0, 1
            0xF0, 0x29, // LD F, v0
            0xD0, 0x05, // DRW v0, v0, 5
        ]);
        assert!(matches!(vm.load_font(&[0xFF; 4]), Err(Chip8Error::Font(_))));

        let mut fontset = [0; FONTSET_DATA_LENGTH];
        fontset[FONTSET_HEIGHT..FONTSET_HEIGHT * 2].fill(0xFF);
        vm.load_font(&fontset).unwrap();

        vm.run_steps(3).unwrap();
        let display = vm.display_buffer();
        assert_eq!(display.as_slice().iter().filter(|p| **p).count(), 40);
        assert!(display.pixel(1, 1));
        assert!(display.pixel(8, 5));
        assert!(!display.pixel(0, 1));
        assert!(!display.pixel(1, 6));
    }

    #[test]
    fn test_config() {
        let vm = Chip8Vm::new(Chip8Conf {
            clock_frequency: Some(Hz(60)),
            fault_policy: FaultPolicy::Skip,
            seed: Some(1),
        });
        assert_eq!(vm.config().clock_frequency, Some(Hz(60)));
        assert_eq!(vm.config().fault_policy, FaultPolicy::Skip);
        assert_eq!(vm.config().seed, Some(1));
    }

    #[test]
    #[rustfmt::skip]
    fn test_jump_offset() {
        let mut vm = vm_with(&[
            0x60, 0x04, // LD v0, 4
            0xB2, 0x00, // JP v0, 0x200
            0x00, 0x00,
            0x61, 0x07, // LD v1, 7
        ]);
        vm.run_steps(2).unwrap();
        assert_eq!(vm.cpu.pc, 0x204);
    }

    #[test]
    #[rustfmt::skip]
    fn test_jump_offset_out_of_memory() {
        let mut vm = vm_with(&[
            0x60, 0xFF, // LD v0, 0xFF
            0xBF, 0xFF, // JP v0, 0xFFF
        ]);
        vm.run_steps(2).unwrap();
        assert!(matches!(
            vm.tick(),
            Err(Chip8Error::MemoryOutOfBounds { address: 0x10FE })
        ));
    }

    #[test]
    #[rustfmt::skip]
    fn test_random_masked() {
        let mut vm = vm_with(&[
            0xC0, 0x0F, // RND v0, 0x0F
            0xC1, 0x00, // RND v1, 0x00
        ]);
        vm.run_steps(2).unwrap();
        assert_eq!(vm.cpu.registers[0] & 0xF0, 0);
        assert_eq!(vm.cpu.registers[1], 0);
    }

    #[test]
    #[rustfmt::skip]
    fn test_random_seeded() {
        let rom = [0xC0, 0xFF, 0xC1, 0xFF, 0xC2, 0xFF];
        let mut a = vm_with(&rom);
        let mut b = vm_with(&rom);
        a.run_steps(3).unwrap();
        b.run_steps(3).unwrap();
        assert_eq!(a.cpu.registers, b.cpu.registers);
    }

    /// Fx0A (LD Vx, K)
    ///
    /// Wait for a keypress, then store the key value in Vx.
    /// The VM must stall while waiting, and signal the state to the outer executer.
    #[test]
    #[rustfmt::skip]
    fn test_key_wait() {
        let mut vm = vm_with(&[
            0xF1, 0x0A, // LD v1, K
            0x62, 0x42  // LD v2, 0x42  ; sentinal
        ]);

        // machine must stall
        for _ in 0..6 {
            assert_eq!(vm.cpu.pc, MEM_START as u16);
            assert_eq!(vm.tick().unwrap(), Flow::KeyWait);
        }
        assert_eq!(vm.cpu.pc, MEM_START as u16);

        // machine has yielded, waiting for any key to be pressed.
        vm.set_key(KeyCode::Key5, true);

        // machine will now advance
        vm.tick().unwrap();
        assert_eq!(vm.cpu.pc, MEM_START as u16 + 2);
        assert!(vm.cpu.key_state(0x05));
        assert_eq!(vm.cpu.registers[1], 0x05);

        // Ensure the machine is continuing
        vm.tick().unwrap();
        assert_eq!(vm.cpu.pc, MEM_START as u16 + 4);
        assert_eq!(vm.cpu.registers[2], 0x42); // sentinal
    }

    #[test]
    #[rustfmt::skip]
    fn test_skip_key() {
        let mut vm = vm_with(&[
            0x60, 0x0E, // LD v0, 0xE
            0xE0, 0x9E, // SKP v0
            0x61, 0x01, // LD v1, 1   ; runs, key up
            0xE0, 0xA1, // SKNP v0
            0x00, 0x00, // skipped, key up
            0x62, 0x01, // LD v2, 1
        ]);
        vm.run_steps(5).unwrap();
        assert_eq!(vm.cpu.registers[1], 1);
        assert_eq!(vm.cpu.registers[2], 1);

        vm.load_rom(&[0x60, 0x0E, 0xE0, 0x9E, 0x00, 0x00, 0x61, 0x01]).unwrap();
        vm.set_key(KeyCode::KeyE, true);
        vm.run_steps(3).unwrap();
        assert_eq!(vm.cpu.registers[1], 1);
    }

    /// Register values beyond the keypad are never pressed.
    #[test]
    #[rustfmt::skip]
    fn test_skip_key_out_of_range() {
        let mut vm = vm_with(&[
            0x60, 0x10, // LD v0, 0x10
            0xE0, 0xA1, // SKNP v0
        ]);
        vm.set_key(KeyCode::Key0, true);
        vm.run_steps(2).unwrap();
        assert_eq!(vm.cpu.pc, MEM_START as u16 + 6);
    }

    #[test]
    #[rustfmt::skip]
    fn test_timers() {
        let mut vm = vm_with(&[
            0x60, 0x03, // LD v0, 3
            0xF0, 0x15, // LD DT, v0
            0xF0, 0x18, // LD ST, v0
            0xF1, 0x07, // LD v1, DT
        ]);
        vm.run_steps(2).unwrap();
        assert_eq!(vm.tick().unwrap(), Flow::Sound);
        assert!(vm.buzzer());

        vm.cpu.tick_timers();
        vm.tick().unwrap();
        assert_eq!(vm.cpu.registers[1], 2);
    }

    #[test]
    #[rustfmt::skip]
    fn test_add_address_overflow() {
        let mut vm = vm_with(&[
            0xAF, 0xFF, // LD I, 0xFFF
            0x60, 0x01, // LD v0, 1
            0xF0, 0x1E, // ADD I, v0
        ]);
        vm.run_steps(3).unwrap();
        assert_eq!(vm.cpu.address, 0x1000);
        assert_eq!(vm.cpu.registers[0xF], 0);

        vm.cpu.address = 0xFFFF;
        vm.cpu.pc -= 2;
        vm.tick().unwrap();
        assert_eq!(vm.cpu.address, 0x0000);
        assert_eq!(vm.cpu.registers[0xF], 1);
    }

    #[test]
    #[rustfmt::skip]
    fn test_glyph_address() {
        let mut vm = vm_with(&[
            0x60, 0x1A, // LD v0, 0x1A  ; only the low nibble counts
            0xF0, 0x29, // LD F, v0
        ]);
        vm.run_steps(2).unwrap();
        assert_eq!(vm.cpu.address, FONTSET_START + 0xA * 5);
    }

    #[test]
    #[rustfmt::skip]
    fn test_bcd() {
        let mut vm = vm_with(&[
            0x60, 0xFE, // LD v0, 254
            0xA3, 0x00, // LD I, 0x300
            0xF0, 0x33, // LD B, v0
        ]);
        vm.run_steps(3).unwrap();
        assert_eq!(vm.cpu.ram.slice(0x300, 3).unwrap(), &[2, 5, 4]);
        assert_eq!(vm.cpu.address, 0x300);
    }

    #[test]
    #[rustfmt::skip]
    fn test_store_load_registers() {
        let mut vm = vm_with(&[
            0x60, 0x11, // LD v0, 0x11
            0x61, 0x22, // LD v1, 0x22
            0x62, 0x33, // LD v2, 0x33
            0xA3, 0x00, // LD I, 0x300
            0xF1, 0x55, // LD [I], v1
            0x60, 0x00, // LD v0, 0
            0x61, 0x00, // LD v1, 0
            0xF2, 0x65, // LD v2, [I]
        ]);
        vm.run_steps(5).unwrap();
        assert_eq!(vm.cpu.ram.slice(0x300, 3).unwrap(), &[0x11, 0x22, 0x00]);

        vm.run_steps(3).unwrap();
        assert_eq!(&vm.cpu.registers[..3], &[0x11, 0x22, 0x00]);
        assert_eq!(vm.cpu.address, 0x300);
    }

    #[test]
    #[rustfmt::skip]
    fn test_store_registers_out_of_memory() {
        let mut vm = vm_with(&[
            0xAF, 0xFE, // LD I, 0xFFE
            0xF2, 0x55, // LD [I], v2
        ]);
        vm.tick().unwrap();
        assert!(matches!(vm.tick(), Err(Chip8Error::MemoryOutOfBounds { .. })));
    }

    #[test]
    #[rustfmt::skip]
    fn test_draw_collision() {
        // Draw two sprites next to each other.
        // The zero bits of the second draw must not erase
        // the pixels of the first draw
        let mut vm = vm_with(&[
            0xA2, 0x0C, // LD I, .sprite
            0x60, 0x04, // LD v0, 4
            0x61, 0x00, // LD v1, 0
            0xD0, 0x11, // DRW v0, v1, 1
            0x60, 0x00, // LD v0, 0
            0xD0, 0x11, // DRW v0, v1, 1
            0b1111_0000, // .sprite
        ]);
        vm.run_steps(4).unwrap();
        assert_eq!(vm.cpu.registers[0xF], 0);

        assert_eq!(vm.tick().unwrap(), Flow::Ok);
        assert_eq!(vm.tick().unwrap(), Flow::Draw);

        for x in 0..8 {
            assert!(vm.display_buffer().pixel(x, 0));
        }
        assert_eq!(vm.cpu.registers[0xF], 0);
    }

    #[test]
    #[rustfmt::skip]
    fn test_draw_font_glyph() {
        let mut vm = vm_with(&[
            0x60, 0x00, // LD v0, 0
            0xF0, 0x29, // LD F, v0
            0xD0, 0x05, // DRW v0, v0, 5
        ]);
        vm.run_steps(3).unwrap();
        let dump = vm.dump_display().unwrap();
        let rows: Vec<&str> = dump.lines().take(5).map(|l| &l[..4]).collect();
        assert_eq!(rows, ["####", "#..#", "#..#", "#..#", "####"]);
    }

    #[test]
    fn test_decode_fault_halts() {
        let mut vm = vm_with(&[0xFF, 0xFF, 0x60, 0x01]);
        match vm.tick() {
            Err(Chip8Error::DecodeFault { opcode, address }) => {
                assert_eq!(opcode, 0xFFFF);
                assert_eq!(address, 0x200);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(vm.is_halted());
        assert!(matches!(
            vm.advance_time(Duration::from_secs(1), &NO_KEYS),
            Err(Chip8Error::Halted)
        ));

        // Reloading resumes the machine.
        vm.load_rom(&[0x60, 0x01]).unwrap();
        assert!(!vm.is_halted());
    }

    #[test]
    fn test_register_skip_requires_zero_nibble() {
        let mut vm = vm_with(&[0x51, 0x21]);
        assert!(matches!(
            vm.tick(),
            Err(Chip8Error::DecodeFault { opcode: 0x5121, address: 0x200 })
        ));
    }

    #[test]
    fn test_decode_fault_skip() {
        let mut vm = Chip8Vm::new(Chip8Conf {
            fault_policy: FaultPolicy::Skip,
            ..Default::default()
        });
        vm.load_rom(&[0xFF, 0xFF, 0x60, 0x01]).unwrap();

        assert!(vm.tick().unwrap_err().is_decode_fault());
        assert!(!vm.is_halted());
        vm.tick().unwrap();
        assert_eq!(vm.cpu.registers[0], 1);
    }

    /// Skipping only applies to decode faults.
    #[test]
    fn test_skip_policy_still_halts_on_stack_error() {
        let mut vm = Chip8Vm::new(Chip8Conf {
            fault_policy: FaultPolicy::Skip,
            ..Default::default()
        });
        vm.load_rom(&[0x00, 0xEE]).unwrap();
        assert!(vm.tick().is_err());
        assert!(vm.is_halted());
    }

    #[test]
    fn test_load_rom_too_large_keeps_state() {
        let mut vm = vm_with(&[0x60, 0x01]);
        vm.tick().unwrap();

        let rom = vec![0; MAX_PROGRAM_SIZE + 1];
        assert!(matches!(
            vm.load_rom(&rom),
            Err(Chip8Error::RomTooLarge { .. })
        ));
        assert_eq!(vm.cpu.registers[0], 1);
    }

    #[test]
    fn test_advance_time_one_instruction() {
        let mut vm = vm_with(&[0x70, 0x01, 0x12, 0x00]);

        // Below one instruction period.
        let cycle = vm.advance_time(Duration::from_micros(1000), &NO_KEYS).unwrap();
        assert_eq!(cycle, Cycle::default());

        let cycle = vm.advance_time(Duration::from_micros(500), &NO_KEYS).unwrap();
        assert_eq!(cycle.flow, Some(Flow::Ok));
        assert!(!cycle.frame_ready);
        assert_eq!(vm.cpu.registers[0], 1);
    }

    #[test]
    fn test_advance_time_bounded_catch_up() {
        let mut vm = vm_with(&[0x70, 0x01, 0x12, 0x00]);
        vm.cpu.delay_timer.set(10);

        let cycle = vm.advance_time(Duration::from_secs(60), &NO_KEYS).unwrap();
        assert_eq!(cycle.flow, Some(Flow::Ok));
        assert!(cycle.frame_ready);
        assert_eq!(vm.cpu.registers[0], 1);
        assert_eq!(vm.cpu.delay_timer(), 9);
    }

    #[test]
    fn test_advance_time_key_snapshot() {
        let mut vm = vm_with(&[0xF3, 0x0A]);
        let mut keys = NO_KEYS;
        keys[0x9] = true;
        keys[0x4] = true;

        let cycle = vm.advance_time(Duration::from_millis(2), &keys).unwrap();
        assert_eq!(cycle.flow, Some(Flow::Ok));
        assert_eq!(vm.cpu.registers[3], 0x4);
    }

    #[test]
    fn test_unthrottled_clock() {
        let mut vm = Chip8Vm::new(Chip8Conf {
            clock_frequency: Some(Hz(0)),
            ..Default::default()
        });
        vm.load_rom(&[0x70, 0x01, 0x12, 0x00]).unwrap();
        vm.advance_time(Duration::ZERO, &NO_KEYS).unwrap();
        assert_eq!(vm.cpu.registers[0], 1);
    }

    #[derive(Default)]
    struct MockDevices {
        keys: Keypad,
        frames: usize,
        buzzes: Vec<bool>,
    }

    impl Devices for MockDevices {
        fn keypad(&mut self) -> Keypad {
            self.keys
        }

        fn draw(&mut self, _display: &Framebuffer) {
            self.frames += 1;
        }

        fn buzz(&mut self, state: bool) {
            self.buzzes.push(state);
        }
    }

    #[test]
    #[rustfmt::skip]
    fn test_drive_devices() {
        let mut vm = vm_with(&[
            0x60, 0x02, // LD v0, 2
            0xF0, 0x18, // LD ST, v0
            0x12, 0x04, // JP 0x204
        ]);
        let mut devices = MockDevices::default();
        let frame = Duration::from_micros(16_667);

        vm.drive(frame, &mut devices).unwrap();
        vm.drive(frame, &mut devices).unwrap();
        assert_eq!(devices.buzzes, [true]);

        // Timer runs out after two more frames.
        vm.drive(frame, &mut devices).unwrap();
        vm.drive(frame, &mut devices).unwrap();
        assert_eq!(devices.buzzes, [true, false]);
        assert_eq!(devices.frames, 4);
    }

    #[test]
    fn test_dump_keys() {
        let mut vm = vm_with(&[]);
        assert_eq!(vm.dump_keys().unwrap(), "");
        vm.set_key(KeyCode::Key1, true);
        vm.set_key(KeyCode::KeyB, true);
        assert_eq!(vm.dump_keys().unwrap(), "keys: k1kb");
        vm.clear_keys();
        assert_eq!(vm.dump_keys().unwrap(), "");
    }

    #[test]
    fn test_dump_ram() {
        let vm = vm_with(&[0x00, 0xE0, 0x12, 0x00]);
        assert_eq!(vm.dump_ram(4).unwrap(), "0200: 00E0\n0202: 1200\n");
    }
}
