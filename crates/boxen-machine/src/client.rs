#![forbid(unsafe_code)]

//! The client: top-level orchestrator.
//!
//! Owns the configuration, the component registry, the distinguished
//! computer handle, and the injected log sink. Construction wires nothing;
//! [`Client::load`] builds the machine from configuration, and
//! [`Client::run`] drives one tick: update every component in insertion
//! order, drain host effects, mirror pending log lines, flush the framer.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::{Rc, Weak};

use tracing::{error, info, warn};

use boxen_frame::{Frame, FrameHandle, Framer};
use boxen_value::{Table, Value, ValuePack};

use crate::component::{Component, PostInitCtx, RunState};
use crate::computer::{Computer, SystemConfig};
use crate::config::Config;
use crate::error::ClientError;
use crate::host::Host;
use crate::logsink::LogBuffer;
use crate::registry::{Entry, Registry, RegistryHandle};

/// Consecutive framer flush failures tolerated before the tick escalates to
/// Halt.
const MAX_FLUSH_FAILURES: u32 = 3;

pub struct Client {
    env: PathBuf,
    config: Option<Config>,
    registry: RegistryHandle,
    computer: Option<Rc<RefCell<Computer>>>,
    tmp_address: Option<String>,
    framer: Weak<RefCell<dyn Framer>>,
    log_buffer: LogBuffer,
    log_frame: FrameHandle,
    io_failures: u32,
    loaded: bool,
}

impl Client {
    /// Build an unloaded client against a host and an injected log sink.
    #[must_use]
    pub fn new(host: &Host, log_buffer: LogBuffer) -> Self {
        let log_frame = Frame::shared(80, 25);
        log_frame.borrow_mut().set_scrolling(true);
        Self {
            env: host.env().to_path_buf(),
            config: None,
            registry: Rc::new(RefCell::new(Registry::new())),
            computer: None,
            tmp_address: None,
            framer: host.framer(),
            log_buffer,
            log_frame,
            io_failures: 0,
            loaded: false,
        }
    }

    /// The default machine: a computer, an EEPROM, a screen with keyboard,
    /// one persistent volume, and the temporary volume.
    #[must_use]
    pub fn default_config() -> Table {
        fn entry(parts: &[(i64, Value)]) -> Value {
            let mut table = Table::new();
            for (index, value) in parts {
                table.set(Value::Integer(*index), value.clone());
            }
            Value::Table(table)
        }

        let mut components = Table::new();
        components.push(entry(&[(1, Value::from("computer"))]));
        components.push(entry(&[(1, Value::from("eeprom"))]));
        components.push(entry(&[(1, Value::from("screen"))]));
        components.push(entry(&[(1, Value::from("keyboard"))]));
        components.push(entry(&[(1, Value::from("filesystem"))]));
        components.push(entry(&[
            (1, Value::from("filesystem")),
            (4, Value::from("tmpfs")),
        ]));

        let mut data = Table::new();
        data.set_str("components", Value::Table(components));
        data.set_str("system", Value::table());
        data
    }

    /// Build the machine from configuration. Returns true iff fully
    /// initialized; failures are reported on the diagnostic stream.
    pub fn load(&mut self, host: &Host) -> bool {
        if self.loaded || self.config.is_some() {
            error!("client is either already loaded or did not close properly");
            return false;
        }

        let mut config = match Config::load_or_create(&self.env, "client", Self::default_config()) {
            Ok(config) => config,
            Err(e) => {
                error!("failed to load client config: {e}");
                return false;
            }
        };

        // The log mirror sits at the bottom of the z-order; screens paint
        // over it once they attach.
        if let Some(framer) = self.framer.upgrade() {
            let mut framer = framer.borrow_mut();
            let (w, h) = framer.max_resolution();
            self.log_frame.borrow_mut().set_resolution(w, h, true);
            framer.add(self.log_frame.clone(), Some(0));
        }

        let mut system = SystemConfig::default();
        let mut load_err = None;
        for section in config.keys() {
            match section.as_str() {
                "components" => {
                    if let Err(e) = self.create_components(host, &mut config) {
                        load_err = Some(e);
                        break;
                    }
                }
                "system" => system = SystemConfig::from_value(config.get("system")),
                other => warn!(section = other, "unrecognized configuration section"),
            }
        }
        if let Some(e) = load_err {
            error!("failed to create components: {e}");
            self.abort_load();
            return false;
        }
        info!(count = self.registry.borrow().len(), "components loaded");

        let Some(computer) = self.computer.clone() else {
            error!("emulation requires exactly one computer component");
            self.abort_load();
            return false;
        };

        {
            let mut computer = computer.borrow_mut();
            if let Err(e) = computer.setup(Rc::downgrade(&self.registry), &system) {
                error!("failed to load sandbox api: {e}");
                drop(computer);
                self.abort_load();
                return false;
            }
            computer.set_device_info(Self::device_info(&self.registry.borrow()));
            if let Some(tmp) = &self.tmp_address {
                computer.set_tmp_address(tmp);
            }
        }

        if let Err(e) = self.post_init() {
            error!("post initialization failed: {e}");
            self.abort_load();
            return false;
        }
        info!("components post initialized");

        if let Err(e) = config.save() {
            warn!("could not persist configuration: {e}");
        }
        self.config = Some(config);
        self.loaded = true;
        true
    }

    fn create_components(&mut self, host: &Host, config: &mut Config) -> Result<(), ClientError> {
        let mut components = config
            .get("components")
            .as_table()
            .cloned()
            .ok_or_else(|| ClientError::Config("components section is not a table".into()))?;

        let count = components.len();
        for index in 1..=count {
            let Some(mut entry) = components.get_index(index).as_table().cloned() else {
                continue;
            };
            let key = entry
                .get_index(1)
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| {
                    ClientError::Config(format!("component entry {index} has no key"))
                })?;

            let created = host.create(&key, &mut entry)?;
            info!(key = %key, address = %created.address, "component ready");

            if let Some(computer) = &created.computer {
                if self.computer.is_some() {
                    return Err(ClientError::Init(
                        "emulation requires exactly one computer component".into(),
                    ));
                }
                self.computer = Some(Rc::clone(computer));
            }
            if created.tmpfs && self.tmp_address.is_none() {
                self.tmp_address = Some(created.address.clone());
            }

            self.registry.borrow_mut().insert(Entry {
                address: created.address,
                kind: created.kind,
                slot: created.slot,
                methods: created.methods,
                cell: created.cell,
            })?;

            // Addresses generated during construction persist.
            components.set(Value::Integer(index), Value::Table(entry));
        }
        config.set("components", Value::Table(components));
        Ok(())
    }

    fn post_init(&mut self) -> Result<(), ClientError> {
        let keyboards: Vec<String> = self
            .registry
            .borrow()
            .matching("keyboard", true)
            .map(|e| e.address.clone())
            .collect();
        let ctx = PostInitCtx {
            keyboards: &keyboards,
        };
        let cells = self.registry.borrow().cells();
        for cell in cells {
            cell.borrow_mut().post_init(&ctx)?;
        }
        Ok(())
    }

    fn abort_load(&mut self) {
        self.registry.borrow_mut().clear();
        self.computer = None;
        self.tmp_address = None;
    }

    /// Device descriptors served by `computer.getDeviceInfo()`.
    fn device_info(registry: &Registry) -> Value {
        let mut info = Table::new();
        for entry in registry.iter() {
            let (class, description) = match entry.kind {
                "computer" => ("system", "Computer"),
                "eeprom" => ("memory", "EEPROM"),
                "screen" => ("display", "Text buffer"),
                "keyboard" => ("input", "Keyboard"),
                "filesystem" => ("volume", "Filesystem"),
                _ => ("generic", "Device"),
            };
            let mut device = Table::new();
            device.set_str("class", Value::from(class));
            device.set_str("description", Value::from(description));
            device.set_str("vendor", Value::from("boxen"));
            device.set_str("product", Value::from(entry.kind));
            info.set(Value::from(entry.address.clone()), Value::Table(device));
        }
        Value::Table(info)
    }

    /// One tick: update components in insertion order, surface effects,
    /// mirror logs, flush the framer.
    pub fn run(&mut self) -> RunState {
        if !self.loaded {
            return RunState::Halt;
        }

        let mut result = RunState::Continue;
        let cells = self.registry.borrow().cells();
        for cell in cells {
            let state = cell.borrow_mut().update();
            if state != RunState::Continue {
                result = state;
                break;
            }
        }

        // Host effects drain even on a short-circuited tick; the computer
        // already ran.
        self.drain_effects();
        if result != RunState::Continue {
            return result;
        }
        self.mirror_log_lines();
        self.flush_framer()
    }

    fn drain_effects(&mut self) {
        let Some(computer) = &self.computer else {
            return;
        };
        let beeps = computer.borrow_mut().take_beeps();
        if beeps.is_empty() {
            return;
        }
        for (freq, duration) in beeps {
            info!(freq, duration, "beep");
        }
        if let Some(framer) = self.framer.upgrade() {
            let _ = framer.borrow_mut().bell();
        }
    }

    fn mirror_log_lines(&mut self) {
        let lines = self.log_buffer.drain();
        if lines.is_empty() {
            return;
        }
        let mut frame = self.log_frame.borrow_mut();
        for line in lines {
            let bottom = i64::from(frame.height()) + 1;
            frame.set_text(1, bottom, &line);
        }
    }

    fn flush_framer(&mut self) -> RunState {
        let Some(framer) = self.framer.upgrade() else {
            return RunState::Continue;
        };
        let result = framer.borrow_mut().update();
        match result {
            Ok(()) => {
                self.io_failures = 0;
                RunState::Continue
            }
            Err(e) => {
                self.io_failures += 1;
                warn!(failures = self.io_failures, "framer flush failed: {e}");
                if self.io_failures >= MAX_FLUSH_FAILURES {
                    error!("framer failed {MAX_FLUSH_FAILURES} consecutive flushes, halting");
                    RunState::Halt
                } else {
                    RunState::Continue
                }
            }
        }
    }

    /// Persist configuration and destroy all components. Idempotent.
    pub fn close(&mut self) {
        if let Some(config) = self.config.take() {
            if let Err(e) = config.save() {
                warn!("could not persist configuration: {e}");
            }
        }
        self.registry.borrow_mut().clear();
        self.computer = None;
        self.tmp_address = None;
        self.io_failures = 0;
        self.loaded = false;
    }

    /// Components whose type starts with `filter` (equals it, when
    /// `exact`), as `(address, type)` pairs in insertion order.
    #[must_use]
    pub fn components(&self, filter: &str, exact: bool) -> Vec<(String, &'static str)> {
        self.registry
            .borrow()
            .matching(filter, exact)
            .map(|e| (e.address.clone(), e.kind))
            .collect()
    }

    /// The component at `address`, if any.
    #[must_use]
    pub fn component(&self, address: &str) -> Option<Rc<RefCell<dyn Component>>> {
        self.registry
            .borrow()
            .find(address)
            .map(|e| Rc::clone(&e.cell))
    }

    /// Enqueue a signal on the computer.
    pub fn push_signal(&self, pack: ValuePack) -> Result<(), ClientError> {
        let computer = self
            .computer
            .as_ref()
            .ok_or_else(|| ClientError::Init("no computer to signal".into()))?;
        computer.borrow().push_signal(pack);
        Ok(())
    }

    /// Whether the computer halted on an interpreter fault.
    #[must_use]
    pub fn computer_crashed(&self) -> bool {
        self.computer
            .as_ref()
            .is_some_and(|c| c.borrow().crashed())
    }

    /// Address of the temporary filesystem, once loaded.
    #[must_use]
    pub fn tmp_address(&self) -> Option<&str> {
        self.tmp_address.as_deref()
    }

    /// The scrolling frame mirroring the diagnostic stream.
    #[must_use]
    pub fn log_frame(&self) -> FrameHandle {
        self.log_frame.clone()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}
