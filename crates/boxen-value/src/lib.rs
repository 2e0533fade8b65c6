#![forbid(unsafe_code)]

//! Dynamic values for the boxen guest/host boundary.
//!
//! The guest language is dynamically typed; the host is not. [`Value`] is the
//! tagged representation every guest-visible method speaks, [`ValuePack`] is
//! the ordered argument/return list those methods exchange, and
//! [`ArgError`] is the structured failure produced when an argument does not
//! coerce to the kind a method asked for.
//!
//! # Role in boxen
//!
//! - Component methods receive a `&ValuePack` and answer with a `ValuePack`.
//! - Signals are ValuePacks whose first element is the signal name.
//! - The configuration file round-trips through [`Value::to_json`] /
//!   [`Value::from_json`].

pub mod pack;
pub mod value;

pub use pack::{ArgError, FromValue, ValuePack};
pub use value::{Table, Value};
