//! Bootstrap for the mullion compositor server.

use std::process::ExitCode;

use log::{error, warn};

use mullion_abi::{DEFAULT_IDENT, DISPLAY_ENV};
use mullion_server::output::{FbdevOutput, MemoryOutput, Output};
use mullion_server::{ServerError, devices, nested, spawn_server};

struct Options {
    nested: bool,
    width: u32,
    height: u32,
}

fn usage(program: &str) {
    eprintln!(
        "mullion - window compositor\n\
         \n\
         usage: {} [-n [-g WxH]] [-h]\n\
         \n\
          -n --nested     Run as a window of another compositor.\n\
          -g --geometry   Size of the server framebuffer.\n\
          -h --help       Show this help message.\n",
        program
    );
}

/// Parse bootstrap flags; `Err` carries the process exit code.
fn parse_args() -> Result<Options, i32> {
    let mut args = std::env::args();
    let program = args.next().unwrap_or_else(|| "mullion-server".into());
    let mut opts = Options {
        nested: false,
        width: 640,
        height: 480,
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-n" | "--nested" => opts.nested = true,
            "-g" | "--geometry" => {
                let Some(spec) = args.next() else {
                    usage(&program);
                    return Err(1);
                };
                let Some((w, h)) = parse_geometry(&spec) else {
                    eprintln!("bad geometry '{}'", spec);
                    return Err(1);
                };
                opts.width = w;
                opts.height = h;
            }
            "-h" | "--help" => {
                usage(&program);
                return Err(0);
            }
            other => {
                eprintln!("unrecognized option: {}", other);
            }
        }
    }
    Ok(opts)
}

fn parse_geometry(spec: &str) -> Option<(u32, u32)> {
    let (w, h) = spec.split_once('x')?;
    let w = w.parse().ok()?;
    let h = h.parse().ok()?;
    (w > 0 && h > 0).then_some((w, h))
}

fn run() -> Result<(), ServerError> {
    let opts = match parse_args() {
        Ok(o) => o,
        Err(code) => std::process::exit(code),
    };

    let mut relay = None;
    let (ident, output) = if opts.nested {
        let parent = std::env::var(DISPLAY_ENV).map_err(|_| {
            ServerError::Display(format!("nested mode needs {} set by the parent", DISPLAY_ENV))
        })?;
        let ident = format!("{}-nest-{}", DEFAULT_IDENT, std::process::id());
        let handshake = nested::connect(&parent, opts.width, opts.height)?;
        relay = Some(handshake.reader);
        (ident, Output::Nested(handshake.output))
    } else {
        let output = match FbdevOutput::open() {
            Ok(fb) => Output::Fbdev(fb),
            Err(e) => {
                warn!(
                    "framebuffer unavailable ({}); running headless {}x{}",
                    e, opts.width, opts.height
                );
                let (mem, _front) = MemoryOutput::new(opts.width, opts.height);
                Output::Memory(mem)
            }
        };
        (DEFAULT_IDENT.to_owned(), output)
    };

    // Children and clients find the endpoint through the environment.
    unsafe { std::env::set_var(DISPLAY_ENV, &ident) };

    let handle = spawn_server(&ident, output)?;

    if let Some(reader) = relay {
        let local = ident.clone();
        std::thread::Builder::new()
            .name("nested-relay".into())
            .spawn(move || nested::run_relay(reader, local))?;
    } else {
        devices::spawn(&ident);
    }

    handle.wait();
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
