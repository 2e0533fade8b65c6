#![forbid(unsafe_code)]

//! boxen entry point: build the framer and host, load the client, pump the
//! tick loop, map the final run state onto an exit code.

mod cli;

use std::cell::RefCell;
use std::fs;
use std::io;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::prelude::*;

use boxen_frame::Framer;
use boxen_machine::{Client, FrameLogLayer, Host, LogBuffer, RunState};
use boxen_tty::{AnsiFramer, Key, KeyInput, ResizeWatcher};
use boxen_value::{Value, ValuePack};

/// Pace of the outer loop; the computer sleeps on its own schedule.
const TICK: Duration = Duration::from_millis(20);

fn main() {
    let opts = cli::Opts::parse();
    std::process::exit(run(&opts));
}

fn run(opts: &cli::Opts) -> i32 {
    let log_buffer = LogBuffer::new();
    if let Err(e) = init_tracing(Path::new(&opts.env_path), log_buffer.clone()) {
        eprintln!("failed to initialize logging: {e}");
        return 1;
    }

    let framer: Rc<RefCell<dyn Framer>> = if opts.headless {
        Rc::new(RefCell::new(AnsiFramer::headless((80, 25), io::sink())))
    } else {
        Rc::new(RefCell::new(AnsiFramer::stdout()))
    };
    if let Err(e) = framer.borrow_mut().open() {
        eprintln!("failed to open terminal: {e}");
        return 1;
    }

    let host = match Host::new(&opts.env_path, framer.clone()) {
        Ok(host) => host,
        Err(e) => {
            error!("failed to set up environment: {e}");
            framer.borrow_mut().close();
            return 1;
        }
    };

    let mut input = if opts.headless {
        None
    } else {
        match KeyInput::open() {
            Ok(input) => Some(input),
            Err(e) => {
                info!("no key input available: {e}");
                None
            }
        }
    };
    let resize = if opts.headless {
        None
    } else {
        ResizeWatcher::new().ok()
    };

    let code = loop {
        let mut client = Client::new(&host, log_buffer.clone());
        if !client.load(&host) {
            break 1;
        }
        info!(env = %opts.env_path, "machine loaded");

        let state = loop {
            pump_input(&client, input.as_mut());
            pump_resize(&client, resize.as_ref(), &framer);

            let state = client.run();
            if state != RunState::Continue {
                break state;
            }
            std::thread::sleep(TICK);
        };

        let crashed = client.computer_crashed();
        client.close();
        match state {
            RunState::Reboot => {
                info!("rebooting");
            }
            _ => break if crashed { 2 } else { 0 },
        }
    };

    framer.borrow_mut().close();
    code
}

/// Forward terminal keys as `key_down` signals carrying the keyboard
/// address.
fn pump_input(client: &Client, input: Option<&mut KeyInput>) {
    let Some(input) = input else { return };
    let keys = input.poll();
    if keys.is_empty() {
        return;
    }
    let keyboard = client
        .components("keyboard", true)
        .first()
        .map(|(address, _)| address.clone())
        .unwrap_or_default();
    for key in keys {
        let (character, code) = key.signal_parts();
        let _ = client.push_signal(ValuePack::of([
            Value::from("key_down"),
            Value::from(character),
            Value::from(code),
            Value::from(keyboard.clone()),
        ]));
    }
}

/// Surface SIGWINCH as a `screen_resized` signal and keep the log mirror at
/// the new size.
fn pump_resize(
    client: &Client,
    resize: Option<&ResizeWatcher>,
    framer: &Rc<RefCell<dyn Framer>>,
) {
    let Some(resize) = resize else { return };
    if !resize.poll() {
        return;
    }
    let (w, h) = framer.borrow().max_resolution();
    client.log_frame().borrow_mut().set_resolution(w, h, false);
    let _ = client.push_signal(ValuePack::of([
        Value::from("screen_resized"),
        Value::from(i64::from(w)),
        Value::from(i64::from(h)),
    ]));
}

/// Diagnostics go to `<env>/boxen.log` and to the frame-backed mirror; the
/// terminal itself belongs to the framer.
fn init_tracing(env: &Path, buffer: LogBuffer) -> io::Result<()> {
    fs::create_dir_all(env)?;
    let file = fs::File::create(env.join("boxen.log"))?;
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(file)),
        )
        .with(FrameLogLayer::new(buffer))
        .init();
    Ok(())
}
