#![forbid(unsafe_code)]

//! The boxen machine: components, client runtime, and the Lua-hosted
//! computer.
//!
//! # Role in boxen
//!
//! - Component layer: the [`Component`] contract plus the concrete kinds
//!   (computer, EEPROM, screen, keyboard, filesystem).
//! - Client layer: [`Client`] constructs the machine from configuration via
//!   the [`Host`] factory, exposes the guest-visible `component` library,
//!   and drives the per-tick update loop.
//! - The [`Computer`] hosts the guest interpreter: resumable cooperative
//!   execution, the signal queue, and the guest `computer` API.
//!
//! # Scheduling model
//!
//! Single-threaded cooperative. One host thread owns all state; the only
//! suspension points are interpreter yields inside `Computer::update()`.
//! Components communicate through signals and the computer's guest-facing
//! APIs, never by observing each other's state mid-tick.

pub mod client;
pub mod component;
pub mod computer;
pub mod config;
pub mod eeprom;
pub mod error;
pub mod filesystem;
pub mod host;
pub mod keyboard;
pub mod logsink;
pub mod luaapi;
pub mod registry;
pub mod screen;
pub mod signal;

pub use client::Client;
pub use component::{Component, ComponentBase, MethodDecl, MethodError, MethodResult, RunState};
pub use computer::Computer;
pub use config::Config;
pub use error::ClientError;
pub use host::Host;
pub use logsink::{FrameLogLayer, LogBuffer};
pub use registry::{Registry, RegistryHandle};
pub use signal::SignalQueue;
