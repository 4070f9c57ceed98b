mod bytecode;
mod clock;
pub mod constants;
mod cpu;
mod devices;
mod disasm;
mod display;
mod error;
mod memory;
mod op;
mod stack;
mod timer;
mod vm;

pub use self::{
    devices::{keypad_with, Devices, InvalidKeyCode, KeyCode, Keypad},
    display::Framebuffer,
    error::{Chip8Error, Chip8Result},
    memory::{Address, Memory},
    op::Op,
    stack::Stack,
    timer::Timer,
    vm::{Cycle, FaultPolicy, Flow, Hz},
};

/// Version of this implementation.
pub const IMPL_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod prelude {
    pub use super::{
        cpu::Chip8Cpu,
        devices::{Devices, KeyCode, Keypad},
        disasm::Disassembler,
        error::{Chip8Error, Chip8Result},
        vm::{Chip8Conf, Chip8Vm, Cycle, FaultPolicy, Flow, Hz},
    };
}
