#![forbid(unsafe_code)]

//! The component registry.
//!
//! Insertion-ordered entries, each carrying a metadata snapshot (address,
//! kind, slot, method table) beside the component cell. The snapshot lets
//! the guest-side `list`/`type`/`slot`/`doc`/`methods` answer without
//! borrowing a component — which may be the computer itself, mid-update —
//! while `invoke` clones the cell handle and borrows only the target.

use std::cell::RefCell;
use std::rc::Rc;

use crate::component::{Component, MethodDecl};
use crate::error::ClientError;

/// One registered component.
pub struct Entry {
    pub address: String,
    pub kind: &'static str,
    pub slot: i64,
    pub methods: &'static [MethodDecl],
    pub cell: Rc<RefCell<dyn Component>>,
}

/// Shared handle; the client owns the strong reference, guest closures hold
/// weak ones.
pub type RegistryHandle = Rc<RefCell<Registry>>;

/// Insertion-ordered component collection with unique addresses.
#[derive(Default)]
pub struct Registry {
    entries: Vec<Entry>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Register a component. Duplicate addresses are an initialization
    /// error.
    pub fn insert(&mut self, entry: Entry) -> Result<(), ClientError> {
        if self.find(&entry.address).is_some() {
            return Err(ClientError::Init(format!(
                "duplicate component address {}",
                entry.address
            )));
        }
        self.entries.push(entry);
        Ok(())
    }

    #[must_use]
    pub fn find(&self, address: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.address == address)
    }

    /// Entries whose kind starts with `filter` (equals it, when `exact`).
    pub fn matching<'a>(
        &'a self,
        filter: &'a str,
        exact: bool,
    ) -> impl Iterator<Item = &'a Entry> + 'a {
        self.entries
            .iter()
            .filter(move |e| e.kind.starts_with(filter) && (!exact || e.kind == filter))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the component cells, in insertion order.
    #[must_use]
    pub fn cells(&self) -> Vec<Rc<RefCell<dyn Component>>> {
        self.entries.iter().map(|e| Rc::clone(&e.cell)).collect()
    }

    /// Drop every component.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{MethodResult, RunState};
    use boxen_value::ValuePack;

    struct Dummy {
        address: String,
        kind: &'static str,
    }

    impl Component for Dummy {
        fn address(&self) -> &str {
            &self.address
        }

        fn kind(&self) -> &'static str {
            self.kind
        }

        fn methods(&self) -> &'static [MethodDecl] {
            &[]
        }

        fn invoke(&mut self, _method: &str, _args: &ValuePack) -> MethodResult {
            Err(crate::component::MethodError::NoSuchMethod)
        }

        fn update(&mut self) -> RunState {
            RunState::Continue
        }
    }

    fn entry(address: &str, kind: &'static str) -> Entry {
        Entry {
            address: address.to_string(),
            kind,
            slot: -1,
            methods: &[],
            cell: Rc::new(RefCell::new(Dummy {
                address: address.to_string(),
                kind,
            })),
        }
    }

    #[test]
    fn duplicate_addresses_rejected() {
        let mut reg = Registry::new();
        reg.insert(entry("a", "screen")).unwrap();
        let err = reg.insert(entry("a", "eeprom")).unwrap_err();
        assert!(matches!(err, ClientError::Init(_)));
    }

    #[test]
    fn prefix_and_exact_matching() {
        let mut reg = Registry::new();
        reg.insert(entry("f1", "filesystem")).unwrap();
        reg.insert(entry("f2", "filesystem")).unwrap();
        reg.insert(entry("c1", "computer")).unwrap();

        let prefix: Vec<_> = reg.matching("file", false).map(|e| e.address.as_str()).collect();
        assert_eq!(prefix, vec!["f1", "f2"]);

        assert_eq!(reg.matching("file", true).count(), 0);
        assert_eq!(reg.matching("filesystem", true).count(), 2);
        assert_eq!(reg.matching("", false).count(), 3);
    }

    #[test]
    fn find_returns_registered_cell() {
        let mut reg = Registry::new();
        reg.insert(entry("abc", "keyboard")).unwrap();
        let found = reg.find("abc").unwrap();
        assert_eq!(found.kind, "keyboard");
        assert!(reg.find("missing").is_none());
    }
}
