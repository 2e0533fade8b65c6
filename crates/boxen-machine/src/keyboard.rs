#![forbid(unsafe_code)]

//! Keyboard: an address-bearing component with no methods of its own.
//!
//! Key events enter the machine as `key_down`/`key_up` signals carrying the
//! keyboard's address; screens list attached keyboards via `getKeyboards`.

use boxen_value::{Table, ValuePack};

use crate::component::{Component, ComponentBase, MethodDecl, MethodError, MethodResult};
use crate::error::ClientError;

pub struct Keyboard {
    base: ComponentBase,
}

impl Keyboard {
    pub fn create(entry: &mut Table) -> Result<Self, ClientError> {
        Ok(Self {
            base: ComponentBase::from_entry(entry),
        })
    }
}

impl Component for Keyboard {
    fn address(&self) -> &str {
        self.base.address()
    }

    fn kind(&self) -> &'static str {
        "keyboard"
    }

    fn slot(&self) -> i64 {
        self.base.slot()
    }

    fn methods(&self) -> &'static [MethodDecl] {
        &[]
    }

    fn invoke(&mut self, _method: &str, _args: &ValuePack) -> MethodResult {
        Err(MethodError::NoSuchMethod)
    }
}
