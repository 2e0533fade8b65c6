#![forbid(unsafe_code)]

//! The computer: the distinguished component hosting the guest interpreter.
//!
//! # State machine
//!
//! ```text
//! Off → Booting → Running ⇄ Sleeping
//!                    ↓
//!                 Halting → (RunState::Halt)
//! ```
//!
//! - `Off → Booting` on the first update after libraries are registered.
//! - `Booting → Running` once the machine script yields cooperatively.
//! - `Running → Sleeping` when the guest yields a positive standby deadline.
//! - `Sleeping → Running` when wall-clock passes the deadline or a signal
//!   arrives.
//! - Anything → `Halting` on fatal error or explicit shutdown.
//!
//! # Cooperative execution
//!
//! Each `update()` resumes the machine coroutine with the pending signal (if
//! any) as arguments. The guest yields `(number)` to sleep that many
//! seconds, `(nil)` to halt, or `("reboot")` to reboot. Suspension is
//! strictly cooperative; between resumes no guest code runs.

use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use mlua::{Lua, MultiValue, ThreadStatus, Value as LuaValue};
use tracing::{debug, error, info, trace};

use boxen_value::{Table, Value, ValuePack};

use crate::component::{Component, ComponentBase, MethodDecl, MethodError, MethodResult, RunState};
use crate::error::ClientError;
use crate::luaapi::{self, GuestContext};
use crate::registry::Registry;
use crate::signal::SignalQueue;

/// Embedded boot kernel; `system.machine` points at a replacement.
const DEFAULT_MACHINE: &str = include_str!("machine.lua");

/// Default interpreter heap ceiling.
const DEFAULT_MEMORY: usize = 4 * 1024 * 1024;

/// Default energy buffer and per-tick drain.
const DEFAULT_MAX_ENERGY: f64 = 5000.0;
const DEFAULT_TICK_ENERGY: f64 = 0.05;

/// Ticks the guest gets between the low-energy signal and the forced halt.
const LOW_ENERGY_GRACE_TICKS: u32 = 200;

/// The single interpreter variant this machine offers.
const ARCHITECTURE: &str = "Lua 5.4";

/// Interpreter policies from the configuration's `system` section.
#[derive(Debug, Clone)]
pub struct SystemConfig {
    pub timeout: f64,
    pub allow_bytecode: bool,
    pub allow_gc: bool,
    /// Path to a replacement machine script.
    pub machine: Option<String>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            timeout: 5.0,
            allow_bytecode: false,
            allow_gc: false,
            machine: None,
        }
    }
}

impl SystemConfig {
    /// Read the `system` section; missing keys keep their defaults.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let mut config = Self::default();
        let Some(table) = value.as_table() else {
            return config;
        };
        if let Some(t) = table.get_str("timeout").as_number() {
            config.timeout = t;
        }
        if let Value::Boolean(b) = table.get_str("allowBytecode") {
            config.allow_bytecode = *b;
        }
        if let Value::Boolean(b) = table.get_str("allowGC") {
            config.allow_gc = *b;
        }
        if let Some(path) = table.get_str("machine").as_str() {
            config.machine = Some(path.to_string());
        }
        config
    }
}

/// The guest-visible computer method table.
pub static COMPUTER_METHODS: &[MethodDecl] = &[
    MethodDecl::new("address", "function():string -- The component address of this computer."),
    MethodDecl::new("tmpAddress", "function():string -- The component address of the temporary filesystem."),
    MethodDecl::new("beep", "function([frequency:number[, duration:number]]) -- Emits a beep; frequency clamps to [20, 2000] Hz, duration to [0.05, 5] seconds."),
    MethodDecl::new("freeMemory", "function():number -- The currently unused amount of interpreter memory, in bytes."),
    MethodDecl::new("totalMemory", "function():number -- The configured interpreter memory, in bytes."),
    MethodDecl::new("energy", "function():number -- The currently stored energy."),
    MethodDecl::new("maxEnergy", "function():number -- The maximum amount of stored energy."),
    MethodDecl::new("realTime", "function():number -- Wall-clock seconds since boot."),
    MethodDecl::new("uptime", "function():number -- Virtual seconds since boot; advances only while running."),
    MethodDecl::new("pushSignal", "function(name:string[, ...]) -- Enqueue a signal for the machine."),
    MethodDecl::new("pullSignal", "function([timeout:number]):... -- Wait for a signal, up to timeout seconds."),
    MethodDecl::new("shutdown", "function([reboot:boolean]) -- Stop the machine; reboot when requested."),
    MethodDecl::new("addUser", "function(name:string):boolean -- Grant a user access to this machine."),
    MethodDecl::new("removeUser", "function(name:string):boolean -- Revoke a user's access."),
    MethodDecl::new("users", "function():... -- The users registered on this machine."),
    MethodDecl::new("isRobot", "function():boolean -- Whether this computer is a robot. It is not."),
    MethodDecl::new("getArchitecture", "function():string -- The architecture the machine is running."),
    MethodDecl::new("setArchitecture", "function(name:string):boolean -- Select an architecture; only one exists."),
    MethodDecl::new("getArchitectures", "function():table -- The available architectures."),
    MethodDecl::new("getDeviceInfo", "function():table -- Device descriptors for every installed component."),
    MethodDecl::new("getProgramLocations", "function():table -- Well-known guest program locations."),
];

/// Machine lifecycle.
#[derive(Debug, Clone, Copy, PartialEq)]
enum MachineState {
    Off,
    Booting,
    Running,
    Sleeping { deadline: Instant },
    Halting,
}

/// Host-side computer state the guest APIs act on.
///
/// Lives behind its own cell so guest callbacks can reach it while the
/// computer's component cell is borrowed for `update()`.
pub struct ComputerServices {
    pub address: String,
    tmp_address: Option<String>,
    pub signals: SignalQueue,
    users: Vec<String>,
    energy: f64,
    max_energy: f64,
    memory_limit: usize,
    boot_instant: Instant,
    uptime: Duration,
    beeps: Vec<(f64, f64)>,
    device_info: Value,
}

impl ComputerServices {
    fn new(address: String, memory_limit: usize, max_energy: f64) -> Self {
        Self {
            address,
            tmp_address: None,
            signals: SignalQueue::new(),
            users: Vec::new(),
            energy: max_energy,
            max_energy,
            memory_limit,
            boot_instant: Instant::now(),
            uptime: Duration::ZERO,
            beeps: Vec::new(),
            device_info: Value::table(),
        }
    }

    /// Dispatch one guest-visible computer method.
    pub fn dispatch(&mut self, lua: &Lua, method: &str, args: &ValuePack) -> MethodResult {
        match method {
            "address" => Ok(ValuePack::of([Value::from(self.address.clone())])),
            "tmpAddress" => Ok(ValuePack::of([self
                .tmp_address
                .clone()
                .map_or(Value::Nil, Value::from)])),
            "beep" => {
                let freq = args.arg_or::<f64>(0, 440.0)?.clamp(20.0, 2000.0);
                let duration = args.arg_or::<f64>(1, 0.1)?.clamp(0.05, 5.0);
                self.beeps.push((freq, duration));
                Ok(ValuePack::new())
            }
            "freeMemory" => {
                let used = lua.used_memory();
                let free = self.memory_limit.saturating_sub(used);
                Ok(ValuePack::of([Value::from(free as i64)]))
            }
            "totalMemory" => Ok(ValuePack::of([Value::from(self.memory_limit as i64)])),
            "energy" => Ok(ValuePack::of([Value::from(self.energy)])),
            "maxEnergy" => Ok(ValuePack::of([Value::from(self.max_energy)])),
            "realTime" => Ok(ValuePack::of([Value::from(
                self.boot_instant.elapsed().as_secs_f64(),
            )])),
            "uptime" => Ok(ValuePack::of([Value::from(self.uptime.as_secs_f64())])),
            "pushSignal" => {
                args.arg::<String>(0)?;
                self.signals.push(args.clone());
                Ok(ValuePack::new())
            }
            // Reached only through component.invoke; the machine's own
            // pullSignal is the coroutine shim.
            "pullSignal" => Ok(self.signals.pop().unwrap_or_default()),
            "shutdown" => Err(MethodError::failure(
                "shutdown must be called from the machine",
            )),
            "addUser" => {
                let name = args.arg::<String>(0)?;
                if self.users.contains(&name) {
                    return Err(MethodError::failure("user exists"));
                }
                self.users.push(name);
                Ok(ValuePack::of([Value::from(true)]))
            }
            "removeUser" => {
                let name = args.arg::<String>(0)?;
                let before = self.users.len();
                self.users.retain(|u| u != &name);
                Ok(ValuePack::of([Value::from(self.users.len() != before)]))
            }
            "users" => Ok(self.users.iter().map(|u| Value::from(u.clone())).collect()),
            "isRobot" => Ok(ValuePack::of([Value::from(false)])),
            "getArchitecture" => Ok(ValuePack::of([Value::from(ARCHITECTURE)])),
            "getArchitectures" => {
                let mut archs = Table::new();
                archs.push(Value::from(ARCHITECTURE));
                Ok(ValuePack::of([Value::Table(archs)]))
            }
            "setArchitecture" => {
                let name = args.arg::<String>(0)?;
                if name == ARCHITECTURE {
                    // Already selected; no reboot needed.
                    Ok(ValuePack::of([Value::from(false)]))
                } else {
                    Err(MethodError::failure("unknown architecture"))
                }
            }
            "getDeviceInfo" => Ok(ValuePack::of([self.device_info.clone()])),
            "getProgramLocations" => {
                let mut locations = Table::new();
                for (program, volume) in [("shell", "system"), ("edit", "tools")] {
                    let mut pair = Table::new();
                    pair.push(Value::from(program));
                    pair.push(Value::from(volume));
                    locations.push(Value::Table(pair));
                }
                Ok(ValuePack::of([Value::Table(locations)]))
            }
            _ => Err(MethodError::NoSuchMethod),
        }
    }
}

/// The guest interpreter driver.
pub struct Computer {
    base: ComponentBase,
    lua: Lua,
    machine: Option<mlua::Thread>,
    machine_src: String,
    state: MachineState,
    services: Rc<RefCell<ComputerServices>>,
    crashed: bool,
    low_energy_signaled: bool,
    energy_grace: u32,
    tick_energy: f64,
    last_tick: Instant,
    next_trace: Instant,
    trace_interval: Duration,
}

impl Computer {
    /// Build from a configuration entry `[key, address?, slot?, memory?]`.
    pub fn create(entry: &mut Table, _env: &Path) -> Result<Self, ClientError> {
        let base = ComponentBase::from_entry(entry);
        let memory_limit = entry
            .get_index(4)
            .as_integer()
            .map_or(DEFAULT_MEMORY, |m| m.max(64 * 1024) as usize);

        let lua = Lua::new();
        lua.set_memory_limit(memory_limit)
            .map_err(|e| ClientError::Init(format!("memory limit unsupported: {e}")))?;

        let services = Rc::new(RefCell::new(ComputerServices::new(
            base.address().to_string(),
            memory_limit,
            DEFAULT_MAX_ENERGY,
        )));

        let now = Instant::now();
        Ok(Self {
            base,
            lua,
            machine: None,
            machine_src: String::new(),
            state: MachineState::Off,
            services,
            crashed: false,
            low_energy_signaled: false,
            energy_grace: LOW_ENERGY_GRACE_TICKS,
            tick_energy: DEFAULT_TICK_ENERGY,
            last_tick: now,
            next_trace: now,
            trace_interval: Duration::from_secs(1),
        })
    }

    /// Weak handle to the services, for guest closures.
    #[must_use]
    pub fn services(&self) -> Weak<RefCell<ComputerServices>> {
        Rc::downgrade(&self.services)
    }

    /// Register every sandbox library and load the machine script source.
    ///
    /// A configured `system.machine` path that cannot be read is an
    /// initialization error, not a runtime failure.
    pub fn setup(
        &mut self,
        registry: Weak<RefCell<Registry>>,
        system: &SystemConfig,
    ) -> Result<(), ClientError> {
        self.machine_src = match &system.machine {
            Some(path) => fs::read_to_string(path)
                .map_err(|e| ClientError::Init(format!("machine script {path}: {e}")))?,
            None => DEFAULT_MACHINE.to_string(),
        };

        let ctx = GuestContext {
            registry,
            services: self.services(),
        };
        let register = || -> mlua::Result<()> {
            luaapi::register_component_lib(&self.lua, &ctx)?;
            luaapi::register_computer_lib(&self.lua, &ctx)?;
            luaapi::register_unicode_lib(&self.lua)?;
            luaapi::register_system_lib(&self.lua, system)?;
            luaapi::inject_kernel_shims(&self.lua)
        };
        register().map_err(|e| ClientError::Init(format!("sandbox setup: {e}")))?;
        Ok(())
    }

    /// Record the temporary filesystem address (bound by the client after
    /// post-init).
    pub fn set_tmp_address(&mut self, address: &str) {
        self.services.borrow_mut().tmp_address = Some(address.to_string());
    }

    /// Install the device descriptor table served by `getDeviceInfo`.
    pub fn set_device_info(&mut self, info: Value) {
        self.services.borrow_mut().device_info = info;
    }

    /// Enqueue a signal for the machine.
    pub fn push_signal(&self, pack: ValuePack) {
        self.services.borrow_mut().signals.push(pack);
    }

    /// Beeps emitted since the last drain.
    pub fn take_beeps(&mut self) -> Vec<(f64, f64)> {
        std::mem::take(&mut self.services.borrow_mut().beeps)
    }

    /// Whether the machine halted because of an interpreter fault.
    #[must_use]
    pub const fn crashed(&self) -> bool {
        self.crashed
    }

    fn boot(&mut self) -> Result<(), ClientError> {
        info!(address = %self.base.address(), "machine booting");
        let function = self
            .lua
            .load(&self.machine_src)
            .set_name("machine")
            .into_function()
            .map_err(|e| ClientError::Guest(e.to_string()))?;
        let thread = self
            .lua
            .create_thread(function)
            .map_err(|e| ClientError::Guest(e.to_string()))?;
        self.machine = Some(thread);
        self.state = MachineState::Booting;
        self.services.borrow_mut().boot_instant = Instant::now();
        Ok(())
    }

    fn drain_energy(&mut self) -> RunState {
        let mut services = self.services.borrow_mut();
        if services.max_energy <= 0.0 {
            return RunState::Continue;
        }
        services.energy = (services.energy - self.tick_energy).max(0.0);
        if services.energy > 0.0 {
            return RunState::Continue;
        }
        if !self.low_energy_signaled {
            self.low_energy_signaled = true;
            services
                .signals
                .push(ValuePack::of([Value::from("low_energy")]));
            return RunState::Continue;
        }
        if self.energy_grace == 0 {
            drop(services);
            error!("energy exhausted, halting");
            self.state = MachineState::Halting;
            return RunState::Halt;
        }
        self.energy_grace -= 1;
        RunState::Continue
    }

    fn resume_machine(&mut self) -> RunState {
        // The boot resume starts the machine script; signals wait for the
        // first real resume.
        let signal = if self.state == MachineState::Booting {
            None
        } else {
            self.services.borrow_mut().signals.pop()
        };
        let args = match signal {
            Some(pack) => match luaapi::pack_to_multi(&self.lua, &pack) {
                Ok(multi) => multi,
                Err(e) => return self.fault(&format!("signal marshalling: {e}")),
            },
            None => MultiValue::new(),
        };

        let Some(thread) = self.machine.clone() else {
            return self.fault("machine thread missing");
        };

        match thread.resume::<MultiValue>(args) {
            Err(err) => self.fault(&err.to_string()),
            Ok(values) => {
                if thread.status() != ThreadStatus::Resumable {
                    info!("machine finished, shutting down");
                    self.state = MachineState::Halting;
                    return RunState::Halt;
                }
                let head = values.into_iter().next().unwrap_or(LuaValue::Nil);
                self.on_yield(head)
            }
        }
    }

    /// Interpret a cooperative yield.
    fn on_yield(&mut self, head: LuaValue) -> RunState {
        match head {
            LuaValue::Integer(n) => self.standby(n as f64),
            LuaValue::Number(n) => self.standby(n),
            LuaValue::Nil => {
                info!("machine requested shutdown");
                self.state = MachineState::Halting;
                RunState::Halt
            }
            LuaValue::String(s) if s.to_string_lossy() == "reboot" => {
                info!("machine requested reboot");
                self.state = MachineState::Halting;
                RunState::Reboot
            }
            other => self.fault(&format!("invalid yield ({})", other.type_name())),
        }
    }

    fn standby(&mut self, seconds: f64) -> RunState {
        let seconds = if seconds.is_finite() {
            seconds.clamp(0.0, 86_400.0)
        } else {
            86_400.0
        };
        self.state = if seconds > 0.0 {
            MachineState::Sleeping {
                deadline: Instant::now() + Duration::from_secs_f64(seconds),
            }
        } else {
            MachineState::Running
        };
        RunState::Continue
    }

    /// A hard interpreter error: print the stack trace and halt.
    fn fault(&mut self, message: &str) -> RunState {
        error!("machine fault: {message}");
        self.crashed = true;
        self.state = MachineState::Halting;
        RunState::Halt
    }

    fn trace_tick(&mut self, now: Instant) {
        if now < self.next_trace {
            return;
        }
        self.next_trace = now + self.trace_interval;
        let services = self.services.borrow();
        trace!(
            state = ?self.state,
            memory = self.lua.used_memory(),
            signals = services.signals.len(),
            energy = services.energy,
            "machine trace"
        );
    }
}

impl Component for Computer {
    fn address(&self) -> &str {
        self.base.address()
    }

    fn kind(&self) -> &'static str {
        "computer"
    }

    fn slot(&self) -> i64 {
        self.base.slot()
    }

    fn methods(&self) -> &'static [MethodDecl] {
        COMPUTER_METHODS
    }

    fn invoke(&mut self, method: &str, args: &ValuePack) -> MethodResult {
        self.services.borrow_mut().dispatch(&self.lua, method, args)
    }

    fn update(&mut self) -> RunState {
        let now = Instant::now();
        if self.state == MachineState::Running {
            self.services.borrow_mut().uptime += now - self.last_tick;
        }
        self.last_tick = now;
        self.trace_tick(now);

        match self.state {
            MachineState::Halting => return RunState::Halt,
            MachineState::Off => {
                if let Err(e) = self.boot() {
                    return self.fault(&e.to_string());
                }
            }
            MachineState::Sleeping { deadline } => {
                let pending = !self.services.borrow().signals.is_empty();
                if !pending && now < deadline {
                    return RunState::Continue;
                }
                debug!(signal = pending, "machine waking");
                self.state = MachineState::Running;
            }
            MachineState::Booting | MachineState::Running => {}
        }

        if self.drain_energy() == RunState::Halt {
            return RunState::Halt;
        }
        self.resume_machine()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        computer: Computer,
        // The client owns this in production; tests keep it alive here.
        _registry: crate::registry::RegistryHandle,
    }

    impl std::ops::Deref for Fixture {
        type Target = Computer;

        fn deref(&self) -> &Computer {
            &self.computer
        }
    }

    impl std::ops::DerefMut for Fixture {
        fn deref_mut(&mut self) -> &mut Computer {
            &mut self.computer
        }
    }

    fn computer_with_machine(machine: &str) -> Fixture {
        let mut entry = Table::new();
        entry.push(Value::from("computer"));
        let mut computer = Computer::create(&mut entry, Path::new("/tmp")).unwrap();
        let registry = Rc::new(RefCell::new(Registry::new()));
        computer
            .setup(Rc::downgrade(&registry), &SystemConfig::default())
            .unwrap();
        computer.machine_src = machine.to_string();
        Fixture {
            computer,
            _registry: registry,
        }
    }

    #[test]
    fn yielding_number_sleeps() {
        let mut computer = computer_with_machine("while true do coroutine.yield(0.5) end");
        assert_eq!(computer.update(), RunState::Continue);
        assert!(matches!(computer.state, MachineState::Sleeping { .. }));
        // Still sleeping: the deadline is half a second out.
        assert_eq!(computer.update(), RunState::Continue);
        assert!(matches!(computer.state, MachineState::Sleeping { .. }));
    }

    #[test]
    fn yielding_zero_stays_running() {
        let mut computer = computer_with_machine("while true do coroutine.yield(0) end");
        assert_eq!(computer.update(), RunState::Continue);
        assert_eq!(computer.state, MachineState::Running);
    }

    #[test]
    fn yielding_nil_halts_cleanly() {
        let mut computer = computer_with_machine("coroutine.yield(nil)");
        assert_eq!(computer.update(), RunState::Halt);
        assert!(!computer.crashed());
    }

    #[test]
    fn yielding_reboot_reboots() {
        let mut computer = computer_with_machine("coroutine.yield(\"reboot\")");
        assert_eq!(computer.update(), RunState::Reboot);
    }

    #[test]
    fn machine_return_halts() {
        let mut computer = computer_with_machine("return 0");
        assert_eq!(computer.update(), RunState::Halt);
        assert!(!computer.crashed());
    }

    #[test]
    fn machine_error_is_a_crash() {
        let mut computer = computer_with_machine("error(\"boom\")");
        assert_eq!(computer.update(), RunState::Halt);
        assert!(computer.crashed());
    }

    #[test]
    fn invalid_yield_is_a_crash() {
        let mut computer = computer_with_machine("coroutine.yield({})");
        assert_eq!(computer.update(), RunState::Halt);
        assert!(computer.crashed());
    }

    #[test]
    fn signal_wakes_sleeping_machine() {
        let mut computer = computer_with_machine(
            "local sig = coroutine.yield(60) coroutine.yield(sig == \"ping\" and 60 or nil)",
        );
        assert_eq!(computer.update(), RunState::Continue);
        assert!(matches!(computer.state, MachineState::Sleeping { .. }));
        computer.push_signal(ValuePack::of([Value::from("ping")]));
        // The signal ends the standby early and is delivered as resume args.
        assert_eq!(computer.update(), RunState::Continue);
        assert!(matches!(computer.state, MachineState::Sleeping { .. }));
    }

    #[test]
    fn pull_signal_shim_round_trips() {
        let mut computer = computer_with_machine(
            r#"
            local name, a, b = computer.pullSignal(1)
            if name == "key_down" and a == "a" and b == 97 then
                coroutine.yield(30)
            end
            coroutine.yield(nil)
            "#,
        );
        assert_eq!(computer.update(), RunState::Continue);
        computer.push_signal(ValuePack::of([
            Value::from("key_down"),
            Value::from("a"),
            Value::from(97),
        ]));
        assert_eq!(computer.update(), RunState::Continue);
        assert!(matches!(computer.state, MachineState::Sleeping { .. }));
    }

    #[test]
    fn dispatch_reports_memory_and_energy() {
        let computer = computer_with_machine("return 0");
        let lua = &computer.lua;
        let mut services = computer.services.borrow_mut();

        let total = services.dispatch(lua, "totalMemory", &ValuePack::new()).unwrap();
        assert_eq!(*total.get(0), Value::from(DEFAULT_MEMORY as i64));

        let free = services.dispatch(lua, "freeMemory", &ValuePack::new()).unwrap();
        let free = free.get(0).as_integer().unwrap();
        assert!(free > 0 && free <= DEFAULT_MEMORY as i64);

        let energy = services.dispatch(lua, "maxEnergy", &ValuePack::new()).unwrap();
        assert_eq!(*energy.get(0), Value::from(DEFAULT_MAX_ENERGY));
    }

    #[test]
    fn beep_clamps_and_records() {
        let mut computer = computer_with_machine("return 0");
        {
            let lua = &computer.lua;
            let mut services = computer.services.borrow_mut();
            services
                .dispatch(lua, "beep", &ValuePack::of([Value::from(9000.0)]))
                .unwrap();
            services
                .dispatch(
                    lua,
                    "beep",
                    &ValuePack::of([Value::from(100.0), Value::from(0.001)]),
                )
                .unwrap();
        }
        let beeps = computer.take_beeps();
        assert_eq!(beeps, vec![(2000.0, 0.1), (100.0, 0.05)]);
        assert!(computer.take_beeps().is_empty());
    }

    #[test]
    fn user_acl_round_trip() {
        let computer = computer_with_machine("return 0");
        let lua = &computer.lua;
        let mut services = computer.services.borrow_mut();

        let added = services
            .dispatch(lua, "addUser", &ValuePack::of([Value::from("rose")]))
            .unwrap();
        assert_eq!(*added.get(0), Value::from(true));
        let again = services
            .dispatch(lua, "addUser", &ValuePack::of([Value::from("rose")]))
            .unwrap_err();
        assert_eq!(again.message(), "user exists");

        let users = services.dispatch(lua, "users", &ValuePack::new()).unwrap();
        assert_eq!(*users.get(0), Value::from("rose"));

        let removed = services
            .dispatch(lua, "removeUser", &ValuePack::of([Value::from("rose")]))
            .unwrap();
        assert_eq!(*removed.get(0), Value::from(true));
    }

    #[test]
    fn architecture_is_single_valued() {
        let computer = computer_with_machine("return 0");
        let lua = &computer.lua;
        let mut services = computer.services.borrow_mut();

        let arch = services
            .dispatch(lua, "getArchitecture", &ValuePack::new())
            .unwrap();
        assert_eq!(*arch.get(0), Value::from(ARCHITECTURE));

        let set = services
            .dispatch(lua, "setArchitecture", &ValuePack::of([Value::from(ARCHITECTURE)]))
            .unwrap();
        assert_eq!(*set.get(0), Value::from(false));

        let unknown = services
            .dispatch(lua, "setArchitecture", &ValuePack::of([Value::from("MIPS")]))
            .unwrap_err();
        assert_eq!(unknown.message(), "unknown architecture");
    }

    #[test]
    fn unknown_method_fails() {
        let computer = computer_with_machine("return 0");
        let lua = &computer.lua;
        let mut services = computer.services.borrow_mut();
        let err = services
            .dispatch(lua, "explode", &ValuePack::new())
            .unwrap_err();
        assert_eq!(err, MethodError::NoSuchMethod);
    }
}
