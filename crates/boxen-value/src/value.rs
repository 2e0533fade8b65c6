#![forbid(unsafe_code)]

//! The tagged dynamic value and its table type.
//!
//! # Invariants
//!
//! 1. Table entries preserve insertion order; a key occurs at most once.
//! 2. Setting a key to `Nil` removes the entry (a table never stores `Nil`
//!    values, matching guest-language semantics).
//! 3. `Table::len()` is the largest `n` such that integer keys `1..=n` are
//!    all present.

use std::fmt;

/// Short kind names used in diagnostics and [`ArgError`](crate::ArgError)
/// messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Nil,
    Boolean,
    Integer,
    Number,
    String,
    Table,
    Handle,
}

impl Kind {
    /// Guest-facing name of the kind.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::String => "string",
            Self::Table => "table",
            Self::Handle => "handle",
        }
    }
}

/// A tagged dynamic value crossing the guest/host boundary.
///
/// Deep-cloneable and comparable. Equality is variant + payload; tables
/// compare entry-by-entry in insertion order.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Nil,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(String),
    Table(Table),
    /// Opaque host-issued token (open file handles and the like). Never
    /// persisted.
    Handle(u64),
}

impl Value {
    /// Create an empty table value.
    #[must_use]
    pub fn table() -> Self {
        Self::Table(Table::new())
    }

    /// The kind tag of this value.
    #[must_use]
    pub const fn kind(&self) -> Kind {
        match self {
            Self::Nil => Kind::Nil,
            Self::Boolean(_) => Kind::Boolean,
            Self::Integer(_) => Kind::Integer,
            Self::Number(_) => Kind::Number,
            Self::String(_) => Kind::String,
            Self::Table(_) => Kind::Table,
            Self::Handle(_) => Kind::Handle,
        }
    }

    /// Guest-facing name of this value's kind.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.kind().name()
    }

    #[must_use]
    pub const fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view; whole numbers coerce.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Number(n) if n.fract() == 0.0 && n.is_finite() => Some(*n as i64),
            _ => None,
        }
    }

    /// Numeric view; integers widen.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Self::Table(t) => Some(t),
            _ => None,
        }
    }

    // ── Configuration serialization ──────────────────────────────────────

    /// Render this value into the configuration format.
    ///
    /// Tables whose keys are exactly `1..=n` become JSON arrays; other
    /// tables become objects (integer keys rendered as decimal strings).
    /// Handles do not persist and render as `null`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Nil | Self::Handle(_) => serde_json::Value::Null,
            Self::Boolean(b) => serde_json::Value::Bool(*b),
            Self::Integer(i) => serde_json::Value::from(*i),
            Self::Number(n) => {
                serde_json::Number::from_f64(*n).map_or(serde_json::Value::Null, serde_json::Value::Number)
            }
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Table(t) => t.to_json(),
        }
    }

    /// Parse a value from the configuration format.
    ///
    /// Object keys that parse as decimal integers become integer keys, so
    /// sparse arrays round-trip.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Nil,
            serde_json::Value::Bool(b) => Self::Boolean(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Integer(i)
                } else {
                    Self::Number(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Self::String(s.clone()),
            serde_json::Value::Array(items) => {
                let mut table = Table::new();
                for (i, item) in items.iter().enumerate() {
                    table.set(Self::Integer(i as i64 + 1), Self::from_json(item));
                }
                Self::Table(table)
            }
            serde_json::Value::Object(map) => {
                let mut table = Table::new();
                for (key, item) in map {
                    let key = match key.parse::<i64>() {
                        Ok(i) => Self::Integer(i),
                        Err(_) => Self::String(key.clone()),
                    };
                    table.set(key, Self::from_json(item));
                }
                Self::Table(table)
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => write!(f, "nil"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Table(t) => write!(f, "table[{}]", t.pairs().count()),
            Self::Handle(h) => write!(f, "handle[{h}]"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Table> for Value {
    fn from(t: Table) -> Self {
        Self::Table(t)
    }
}

/// An ordered mapping from [`Value`] to [`Value`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    entries: Vec<(Value, Value)>,
}

impl Table {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Look up a key. Missing keys read as `Nil`.
    #[must_use]
    pub fn get(&self, key: &Value) -> &Value {
        static NIL: Value = Value::Nil;
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map_or(&NIL, |(_, v)| v)
    }

    /// Convenience lookup by string key.
    #[must_use]
    pub fn get_str(&self, key: &str) -> &Value {
        self.get(&Value::String(key.to_string()))
    }

    /// Convenience lookup by 1-based index.
    #[must_use]
    pub fn get_index(&self, index: i64) -> &Value {
        self.get(&Value::Integer(index))
    }

    /// Insert or replace. Setting `Nil` removes the key.
    pub fn set(&mut self, key: Value, value: Value) {
        if value.is_nil() {
            self.entries.retain(|(k, _)| k != &key);
            return;
        }
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| k == &key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    /// Insert or replace under a string key.
    pub fn set_str(&mut self, key: &str, value: Value) {
        self.set(Value::String(key.to_string()), value);
    }

    /// Append at the next free 1-based index.
    pub fn push(&mut self, value: Value) {
        let next = self.len() + 1;
        self.set(Value::Integer(next), value);
    }

    #[must_use]
    pub fn contains(&self, key: &Value) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// The table "length": the largest `n` with keys `1..=n` all present.
    #[must_use]
    pub fn len(&self) -> i64 {
        let mut n = 0;
        while self.contains(&Value::Integer(n + 1)) {
            n += 1;
        }
        n
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, in insertion order.
    pub fn pairs(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    /// The contiguous 1-based prefix, in index order.
    pub fn ipairs(&self) -> impl Iterator<Item = &Value> {
        (1..=self.len()).map(|i| self.get(&Value::Integer(i)))
    }

    fn to_json(&self) -> serde_json::Value {
        let len = self.len();
        if len as usize == self.entries.len() {
            // Pure sequence.
            let items = self.ipairs().map(Value::to_json).collect();
            return serde_json::Value::Array(items);
        }
        let mut map = serde_json::Map::new();
        for (key, value) in &self.entries {
            let key = match key {
                Value::String(s) => s.clone(),
                Value::Integer(i) => i.to_string(),
                other => other.to_string(),
            };
            map.insert(key, value.to_json());
        }
        serde_json::Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_len_is_contiguous_prefix() {
        let mut t = Table::new();
        t.set(Value::Integer(1), Value::from("a"));
        t.set(Value::Integer(2), Value::from("b"));
        t.set(Value::Integer(4), Value::from("d"));
        assert_eq!(t.len(), 2);
        t.set(Value::Integer(3), Value::from("c"));
        assert_eq!(t.len(), 4);
    }

    #[test]
    fn setting_nil_removes() {
        let mut t = Table::new();
        t.set_str("key", Value::from(1));
        assert!(t.contains(&Value::from("key")));
        t.set_str("key", Value::Nil);
        assert!(!t.contains(&Value::from("key")));
        assert_eq!(*t.get_str("key"), Value::Nil);
    }

    #[test]
    fn key_equality_is_variant_plus_payload() {
        let mut t = Table::new();
        t.set(Value::Integer(1), Value::from("int"));
        t.set(Value::String("1".into()), Value::from("str"));
        assert_eq!(*t.get(&Value::Integer(1)), Value::from("int"));
        assert_eq!(*t.get(&Value::from("1")), Value::from("str"));
    }

    #[test]
    fn sequence_round_trips_as_array() {
        let mut t = Table::new();
        t.push(Value::from("computer"));
        t.push(Value::from(42));
        let v = Value::Table(t);
        let json = v.to_json();
        assert!(json.is_array());
        assert_eq!(Value::from_json(&json), v);
    }

    #[test]
    fn sparse_table_round_trips_as_object() {
        let mut t = Table::new();
        t.set(Value::Integer(1), Value::from("eeprom"));
        t.set(Value::Integer(3), Value::from(9));
        let v = Value::Table(t.clone());
        let json = v.to_json();
        assert!(json.is_object());
        let back = Value::from_json(&json);
        let back = back.as_table().expect("table");
        assert_eq!(*back.get_index(1), Value::from("eeprom"));
        assert_eq!(*back.get_index(3), Value::from(9));
        assert_eq!(back.len(), 1);
    }

    #[test]
    fn nested_tables_round_trip() {
        let mut inner = Table::new();
        inner.set_str("timeout", Value::from(5.0));
        inner.set_str("allowBytecode", Value::from(false));
        let mut outer = Table::new();
        outer.set_str("system", Value::Table(inner));
        let v = Value::Table(outer);
        assert_eq!(Value::from_json(&v.to_json()), v);
    }

    #[test]
    fn handles_do_not_persist() {
        assert_eq!(Value::Handle(7).to_json(), serde_json::Value::Null);
    }

    #[test]
    fn integer_coercion_from_whole_number() {
        assert_eq!(Value::Number(3.0).as_integer(), Some(3));
        assert_eq!(Value::Number(3.5).as_integer(), None);
        assert_eq!(Value::Number(f64::INFINITY).as_integer(), None);
    }
}
