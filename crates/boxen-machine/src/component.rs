#![forbid(unsafe_code)]

//! The component contract.
//!
//! A component is a hardware-like guest-visible object: an address, a short
//! lowercase type name, an optional slot, and a method table. Components are
//! constructed by the [`Host`](crate::host::Host) factory from their
//! configuration entry, updated once per tick, and invoked by the guest
//! through the uniform `component.invoke` protocol.

use boxen_value::{ArgError, Table, Value, ValuePack};
use uuid::Uuid;

/// Result of a component update; any non-`Continue` short-circuits the tick
/// and propagates outward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Continue,
    Reboot,
    Halt,
}

/// One entry of a component's method table.
#[derive(Debug, Clone, Copy)]
pub struct MethodDecl {
    pub name: &'static str,
    /// All boxen methods dispatch directly within the calling tick, and
    /// `component.methods` reports them as such.
    pub direct: bool,
    pub doc: &'static str,
}

impl MethodDecl {
    #[must_use]
    pub const fn new(name: &'static str, doc: &'static str) -> Self {
        Self {
            name,
            direct: true,
            doc,
        }
    }
}

/// Guest-visible method failure. Every variant renders as a `(nil, message)`
/// return; none of them aborts the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodError {
    /// checkArg failure.
    Arg(ArgError),
    /// The method itself refused (`"not enough space"`, `"file not found"`…).
    Failure(String),
    NoSuchMethod,
}

impl MethodError {
    /// The message carried to the guest.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Arg(err) => err.to_string(),
            Self::Failure(msg) => msg.clone(),
            Self::NoSuchMethod => "no such method".to_string(),
        }
    }

    /// Shorthand for a refusal.
    #[must_use]
    pub fn failure(msg: impl Into<String>) -> Self {
        Self::Failure(msg.into())
    }
}

impl From<ArgError> for MethodError {
    fn from(err: ArgError) -> Self {
        Self::Arg(err)
    }
}

/// What a method invocation produces.
pub type MethodResult = Result<ValuePack, MethodError>;

/// Context handed to `post_init`, after every sibling exists.
pub struct PostInitCtx<'a> {
    /// Addresses of all keyboard components, in insertion order.
    pub keyboards: &'a [String],
}

/// A hardware-like guest-visible object.
pub trait Component {
    /// Stable 128-bit identifier, canonical hyphenated form.
    fn address(&self) -> &str;

    /// Short lowercase type name (`"computer"`, `"eeprom"`, `"screen"`…).
    fn kind(&self) -> &'static str;

    /// Slot number; -1 if unslotted.
    fn slot(&self) -> i64 {
        -1
    }

    /// The invokable method table.
    fn methods(&self) -> &'static [MethodDecl];

    /// Dispatch one guest invocation.
    fn invoke(&mut self, method: &str, args: &ValuePack) -> MethodResult;

    /// Called once after all siblings exist.
    fn post_init(&mut self, _ctx: &PostInitCtx<'_>) -> Result<(), crate::error::ClientError> {
        Ok(())
    }

    /// Advance one tick.
    fn update(&mut self) -> RunState {
        RunState::Continue
    }
}

/// Fields every component extracts from its configuration entry.
///
/// Entry layout: `[key, address?, slot?, extra…]`. A missing address is
/// generated fresh and written back into the entry so it persists across
/// runs.
#[derive(Debug, Clone)]
pub struct ComponentBase {
    address: String,
    slot: i64,
}

impl ComponentBase {
    pub fn from_entry(entry: &mut Table) -> Self {
        let address = match entry.get_index(2).as_str() {
            Some(addr) if !addr.is_empty() => addr.to_string(),
            _ => {
                let fresh = Uuid::new_v4().to_string();
                entry.set(Value::Integer(2), Value::from(fresh.clone()));
                fresh
            }
        };
        let slot = entry.get_index(3).as_integer().unwrap_or(-1);
        Self { address, slot }
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[must_use]
    pub const fn slot(&self) -> i64 {
        self.slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_keeps_configured_address() {
        let mut entry = Table::new();
        entry.push(Value::from("eeprom"));
        entry.push(Value::from("aabb-ccdd"));
        entry.push(Value::from(9));
        let base = ComponentBase::from_entry(&mut entry);
        assert_eq!(base.address(), "aabb-ccdd");
        assert_eq!(base.slot(), 9);
    }

    #[test]
    fn missing_address_is_generated_and_written_back() {
        let mut entry = Table::new();
        entry.push(Value::from("screen"));
        let base = ComponentBase::from_entry(&mut entry);
        assert_eq!(base.address().len(), 36);
        assert_eq!(entry.get_index(2).as_str(), Some(base.address()));
        assert_eq!(base.slot(), -1);
    }

    #[test]
    fn generated_addresses_differ() {
        let mut a = Table::new();
        a.push(Value::from("screen"));
        let mut b = Table::new();
        b.push(Value::from("screen"));
        assert_ne!(
            ComponentBase::from_entry(&mut a).address(),
            ComponentBase::from_entry(&mut b).address()
        );
    }

    #[test]
    fn method_error_messages() {
        assert_eq!(MethodError::NoSuchMethod.message(), "no such method");
        assert_eq!(
            MethodError::failure("not enough space").message(),
            "not enough space"
        );
    }
}
