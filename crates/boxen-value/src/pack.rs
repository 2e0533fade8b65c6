#![forbid(unsafe_code)]

//! Argument and return lists, plus the `checkArg` coercion contract.
//!
//! Every component method receives a [`ValuePack`] and pulls its arguments
//! through [`ValuePack::arg`] / [`ValuePack::arg_or`]. A wrong-kind argument
//! produces an [`ArgError`] naming the 1-based position, the expected kind,
//! and the kind found; the dispatch layer turns that into a guest-visible
//! `(nil, message)` return, never a host fault.

use std::fmt;

use crate::value::{Table, Value};

/// Structured argument-coercion failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgError {
    /// 1-based argument position.
    pub index: usize,
    /// Kind the method asked for.
    pub expected: &'static str,
    /// Kind actually present (`"no value"` when the slot is absent).
    pub found: &'static str,
}

impl fmt::Display for ArgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bad argument #{} ({} expected, got {})",
            self.index, self.expected, self.found
        )
    }
}

impl std::error::Error for ArgError {}

/// Kinds that can be pulled out of a pack slot.
pub trait FromValue: Sized {
    /// Kind name used in [`ArgError`] messages.
    const EXPECTED: &'static str;

    /// Coerce; `None` means wrong kind.
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for bool {
    const EXPECTED: &'static str = "boolean";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl FromValue for i64 {
    const EXPECTED: &'static str = "integer";

    fn from_value(value: &Value) -> Option<Self> {
        value.as_integer()
    }
}

impl FromValue for f64 {
    const EXPECTED: &'static str = "number";

    fn from_value(value: &Value) -> Option<Self> {
        value.as_number()
    }
}

impl FromValue for String {
    const EXPECTED: &'static str = "string";

    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl FromValue for Table {
    const EXPECTED: &'static str = "table";

    fn from_value(value: &Value) -> Option<Self> {
        value.as_table().cloned()
    }
}

/// Handles also accept plain integers: the guest has no handle type of its
/// own and passes back whatever token the host returned.
impl FromValue for u64 {
    const EXPECTED: &'static str = "handle";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Handle(h) => Some(*h),
            Value::Integer(i) if *i >= 0 => Some(*i as u64),
            _ => None,
        }
    }
}

/// An ordered sequence of values crossing the guest/host boundary.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValuePack {
    values: Vec<Value>,
}

impl ValuePack {
    #[must_use]
    pub fn new() -> Self {
        Self { values: Vec::new() }
    }

    /// Build a pack from its values. `ValuePack::of(["key_down".into(), ..])`
    /// is the usual way signals are made.
    #[must_use]
    pub fn of(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn push(&mut self, value: Value) {
        self.values.push(value);
    }

    /// The slot at `index` (0-based); absent slots read as `Nil`.
    #[must_use]
    pub fn get(&self, index: usize) -> &Value {
        static NIL: Value = Value::Nil;
        self.values.get(index).unwrap_or(&NIL)
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Signal name, when this pack is a signal.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.values.first().and_then(Value::as_str)
    }

    // ── checkArg ─────────────────────────────────────────────────────────

    /// Coerce the argument at `index` (0-based) to `T`.
    pub fn arg<T: FromValue>(&self, index: usize) -> Result<T, ArgError> {
        let value = self.values.get(index);
        match value {
            None => Err(ArgError {
                index: index + 1,
                expected: T::EXPECTED,
                found: "no value",
            }),
            Some(v) => T::from_value(v).ok_or_else(|| ArgError {
                index: index + 1,
                expected: T::EXPECTED,
                found: v.type_name(),
            }),
        }
    }

    /// Like [`arg`](Self::arg), but an absent or nil slot yields `default`.
    pub fn arg_or<T: FromValue>(&self, index: usize, default: T) -> Result<T, ArgError> {
        match self.values.get(index) {
            None | Some(Value::Nil) => Ok(default),
            Some(v) => T::from_value(v).ok_or_else(|| ArgError {
                index: index + 1,
                expected: T::EXPECTED,
                found: v.type_name(),
            }),
        }
    }
}

impl From<Vec<Value>> for ValuePack {
    fn from(values: Vec<Value>) -> Self {
        Self { values }
    }
}

impl FromIterator<Value> for ValuePack {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::of(iter)
    }
}

impl IntoIterator for ValuePack {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl fmt::Display for ValuePack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn arg_coerces_each_kind() {
        let pack = ValuePack::of([
            Value::from("key_down"),
            Value::from(97),
            Value::from(1.5),
            Value::from(true),
            Value::Handle(3),
        ]);
        assert_eq!(pack.arg::<String>(0).unwrap(), "key_down");
        assert_eq!(pack.arg::<i64>(1).unwrap(), 97);
        assert_eq!(pack.arg::<f64>(2).unwrap(), 1.5);
        assert!(pack.arg::<bool>(3).unwrap());
        assert_eq!(pack.arg::<u64>(4).unwrap(), 3);
    }

    #[test]
    fn arg_coerces_tables() {
        let mut table = Table::new();
        table.set_str("direct", Value::from(true));
        let pack = ValuePack::of([Value::Table(table.clone())]);
        assert_eq!(pack.arg::<Table>(0).unwrap(), table);
    }

    #[test]
    fn wrong_kind_names_index_and_kinds() {
        let pack = ValuePack::of([Value::from(12)]);
        let err = pack.arg::<String>(0).unwrap_err();
        assert_eq!(err.to_string(), "bad argument #1 (string expected, got integer)");
    }

    #[test]
    fn absent_slot_reads_as_no_value() {
        let pack = ValuePack::new();
        let err = pack.arg::<String>(1).unwrap_err();
        assert_eq!(err.to_string(), "bad argument #2 (string expected, got no value)");
    }

    #[test]
    fn arg_or_fills_absent_and_nil() {
        let pack = ValuePack::of([Value::Nil]);
        assert_eq!(pack.arg_or::<f64>(0, 440.0).unwrap(), 440.0);
        assert_eq!(pack.arg_or::<f64>(5, 0.1).unwrap(), 0.1);
    }

    #[test]
    fn arg_or_still_rejects_wrong_kind() {
        let pack = ValuePack::of([Value::from("loud")]);
        let err = pack.arg_or::<f64>(0, 440.0).unwrap_err();
        assert_eq!(err.expected, "number");
        assert_eq!(err.found, "string");
    }

    #[test]
    fn number_coerces_to_integer_when_whole() {
        let pack = ValuePack::of([Value::from(97.0)]);
        assert_eq!(pack.arg::<i64>(0).unwrap(), 97);
    }

    #[test]
    fn signal_name() {
        let sig = ValuePack::of([Value::from("key_down"), Value::from("a")]);
        assert_eq!(sig.name(), Some("key_down"));
        assert_eq!(ValuePack::new().name(), None);
    }

    fn value_strategy() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Nil),
            any::<bool>().prop_map(Value::Boolean),
            any::<i64>().prop_map(Value::Integer),
            (-1.0e12f64..1.0e12).prop_map(Value::Number),
            "[a-z0-9 ]{0,24}".prop_map(Value::String),
        ]
    }

    proptest! {
        #[test]
        fn pack_round_trips_values(values in proptest::collection::vec(value_strategy(), 0..8)) {
            let pack = ValuePack::of(values.clone());
            prop_assert_eq!(pack.values(), values.as_slice());
        }

        #[test]
        fn checkarg_round_trips_strings(s in "[ -~]{0,32}") {
            let pack = ValuePack::of([Value::from(s.clone())]);
            prop_assert_eq!(pack.arg::<String>(0).unwrap(), s);
        }
    }
}
