//! Entrypoint for CLI
mod config;
mod error;

use std::{
    env, fs,
    time::{Duration, Instant},
};

use chip8vm::{constants::*, prelude::*, IMPL_VERSION};
use log::{debug, error, info, warn};

use self::{config::RunConf, error::AppError};

static USAGE: &str = r#"
usage: chip8vm CMD FILE [CONFIG]

commands:
    run     Run the target ROM file headless, and print the final screen
    dis     Disassemble the the target ROM into readable assembly

examples:
    chip8vm run maze.rom
    chip8vm run breakout.rom chip48.yaml
    chip8vm dis maze.rom
"#;

fn run_bytecode(filepath: &str, config: Option<&str>) -> Result<(), AppError> {
    let conf = match config {
        Some(config) => RunConf::from_file(config)?,
        None => RunConf::default(),
    };

    let bytecode = fs::read(filepath)?;

    let mut vm = Chip8Vm::new(conf.vm);
    vm.load(bytecode.as_slice())?;

    info!("running {filepath} for {} frames", conf.frames);

    // No input devices are attached, so the host loop only keeps time.
    let frame = Duration::from_nanos(CLOCK_CYCLE_TIME);
    let start = Instant::now();
    let mut last = start;
    let mut buzzing = false;

    for _ in 0..conf.frames {
        std::thread::sleep(frame.saturating_sub(last.elapsed()));
        let now = Instant::now();
        let elapsed = now.duration_since(last);
        last = now;

        let flow = vm.advance(elapsed).map_err(|err| {
            error!("{err}");
            err
        })?;

        if vm.is_buzzing() != buzzing {
            buzzing = vm.is_buzzing();
            debug!("buzzer {}", if buzzing { "on" } else { "off" });
        }

        if flow == Flow::KeyWait {
            warn!("program is waiting for a key press, stopping");
            break;
        }
    }

    println!(
        "time taken: {}ms",
        start.elapsed().as_nanos() as f64 / 1000000.0
    ); // to millis
    println!("{}", vm.dump_display()?);

    Ok(())
}

fn run_disassembler(filepath: &str) -> Result<(), AppError> {
    let bytecode = fs::read(filepath)?;

    for instr in Decoder::new(&bytecode, MEM_START as u16) {
        let addr = instr.addr;
        let opcode = instr.opcode;
        match instr.op {
            Ok(op) => println!("0x{addr:04X} {opcode:04X} {op}"),
            // Sprites and other data are interleaved with code.
            Err(_) => {
                let [hi, lo] = opcode.to_be_bytes();
                println!("0x{addr:04X} {opcode:04X} 0b{hi:08b} 0b{lo:08b}")
            }
        }
    }

    if bytecode.len() % 2 != 0 {
        warn!("trailing byte ignored, instructions are always 2 bytes");
    }

    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    simple_logger::SimpleLogger::new().env().init()?;

    let result = match parse_args() {
        Some(Cmd::Run { filepath, config }) => run_bytecode(&filepath, config.as_deref()),
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

    Ok(())
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
    println!("Chip8 VM v{IMPL_VERSION}");
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
