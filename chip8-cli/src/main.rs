//! Entrypoint for CLI
mod config;
mod error;
mod headless;

use std::{
    env, fs,
    time::{Duration, Instant},
};

use chip8::{prelude::*, IMPL_VERSION};
use log::{debug, error, info};

use self::{config::RunConfig, error::AppError, headless::Headless};

static USAGE: &str = r#"
usage: chip8 CMD FILE [CONFIG]

commands:
    run     Run the target ROM file without a window, and print the final frame
    dis     Disassemble the target ROM into readable assembly

examples:
    chip8 run breakout.rom
    chip8 run breakout.rom breakout.yaml
    chip8 dis breakout.rom
"#;

/// Time the driver loop yields between iterations.
const DRIVER_SLEEP: Duration = Duration::from_micros(500);

fn run_rom(filepath: &str, config: RunConfig) -> Result<(), AppError> {
    info!("load rom: {filepath}");
    let bytecode = fs::read(filepath)?;

    let mut vm = Chip8Vm::new(config.vm.clone());
    vm.load_rom(&bytecode)?;
    debug!("vm configuration: {:?}", vm.config());

    let mut devices = Headless::new(&config.held_keys);
    let run_time = config.run_time();
    let start = Instant::now();
    let mut last = start;
    let mut instr_count = 0_usize;

    while last.duration_since(start) < run_time {
        std::thread::sleep(DRIVER_SLEEP);
        let now = Instant::now();

        match vm.drive(now.duration_since(last), &mut devices) {
            Ok(cycle) => {
                if cycle.flow.is_some() {
                    instr_count += 1;
                }
            }
            // The VM logs skipped instructions itself.
            Err(err) if err.is_decode_fault() && !vm.is_halted() => {}
            Err(err) => {
                println!("{}", devices.frame().dump()?);
                return Err(err.into());
            }
        }

        last = now;
    }

    info!(
        "executed {instr_count} instructions, presented {} frames, buzzed {} times",
        devices.frame_count(),
        devices.buzz_count()
    );
    println!("{}", devices.frame().dump()?);

    Ok(())
}

fn run_disassembler(filepath: &str) -> Result<(), AppError> {
    info!("disassemble rom: {filepath}");
    let bytecode = fs::read(filepath)?;

    let mut listing = String::new();
    Disassembler::new(&bytecode).disassemble(&mut listing)?;
    print!("{listing}");

    Ok(())
}

fn main() {
    simple_logger::SimpleLogger::new().env().init().unwrap();

    let result = match parse_args() {
        Some(Cmd::Run { filepath, config }) => config
            .as_deref()
            .map(RunConfig::from_file)
            .unwrap_or_else(|| Ok(RunConfig::default()))
            .and_then(|config| run_rom(&filepath, config)),
        Some(Cmd::Dis { filepath }) => run_disassembler(&filepath),
        None => {
            print_usage();
            // FreeBSD EX_USAGE (64)
            std::process::exit(64)
        }
    };

    if let Err(err) = result {
        error!("{err}");
        std::process::exit(1);
    }
}

fn parse_args() -> Option<Cmd> {
    let mut args = env::args().skip(1);
    match args.next() {
        Some(cmd) => {
            // don't format me T.T
            match cmd.as_str() {
                "run" => Some(Cmd::Run {
                    filepath: args.next()?,
                    config: args.next(),
                }),
                "dis" => Some(Cmd::Dis {
                    filepath: args.next()?,
                }),
                _ => None,
            }
        }
        None => None,
    }
}

fn print_usage() {
    println!("Chip8 v{IMPL_VERSION}");
    println!("{USAGE}");
}

enum Cmd {
    /// Run file
    Run {
        filepath: String,
        config: Option<String>,
    },
    /// Disassemble
    Dis { filepath: String },
}
