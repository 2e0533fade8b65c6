#![forbid(unsafe_code)]

//! The host factory: explicit registration from component key to
//! constructor.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use boxen_frame::Framer;
use boxen_value::Table;

use crate::component::{Component, MethodDecl};
use crate::computer::Computer;
use crate::eeprom::Eeprom;
use crate::error::ClientError;
use crate::filesystem::Filesystem;
use crate::keyboard::Keyboard;
use crate::screen::Screen;

/// A freshly constructed component plus its registry metadata.
pub struct Created {
    pub cell: Rc<RefCell<dyn Component>>,
    /// Present when the component is the computer.
    pub computer: Option<Rc<RefCell<Computer>>>,
    pub address: String,
    pub kind: &'static str,
    pub slot: i64,
    pub methods: &'static [MethodDecl],
    /// Whether this is the temporary filesystem.
    pub tmpfs: bool,
}

impl Created {
    fn from_component<C: Component + 'static>(component: C, tmpfs: bool) -> Self {
        let address = component.address().to_string();
        let kind = component.kind();
        let slot = component.slot();
        let methods = component.methods();
        let cell: Rc<RefCell<dyn Component>> = Rc::new(RefCell::new(component));
        Self {
            cell,
            computer: None,
            address,
            kind,
            slot,
            methods,
            tmpfs,
        }
    }
}

/// Owns the environment directory and the framer; creates components by
/// key.
pub struct Host {
    env: PathBuf,
    framer: Rc<RefCell<dyn Framer>>,
}

impl Host {
    /// Create the host, making the environment directory if needed.
    pub fn new(env: impl Into<PathBuf>, framer: Rc<RefCell<dyn Framer>>) -> Result<Self, ClientError> {
        let env = env.into();
        fs::create_dir_all(&env)?;
        Ok(Self { env, framer })
    }

    #[must_use]
    pub fn env(&self) -> &Path {
        &self.env
    }

    /// Weak handle to the framer; back-references never extend its life.
    #[must_use]
    pub fn framer(&self) -> Weak<RefCell<dyn Framer>> {
        Rc::downgrade(&self.framer)
    }

    /// Construct a component by its configuration key.
    pub fn create(&self, key: &str, entry: &mut Table) -> Result<Created, ClientError> {
        match key {
            "computer" => {
                // The client needs a typed handle beside the erased cell.
                let computer = Rc::new(RefCell::new(Computer::create(entry, &self.env)?));
                let (address, slot, methods) = {
                    let c = computer.borrow();
                    (c.address().to_string(), c.slot(), c.methods())
                };
                let cell: Rc<RefCell<dyn Component>> = computer.clone();
                Ok(Created {
                    cell,
                    computer: Some(computer),
                    address,
                    kind: "computer",
                    slot,
                    methods,
                    tmpfs: false,
                })
            }
            "eeprom" => Ok(Created::from_component(
                Eeprom::create(entry, &self.env)?,
                false,
            )),
            "screen" => Ok(Created::from_component(
                Screen::create(entry, self.framer())?,
                false,
            )),
            "keyboard" => Ok(Created::from_component(Keyboard::create(entry)?, false)),
            "filesystem" => {
                let filesystem = Filesystem::create(entry, &self.env)?;
                let tmpfs = filesystem.is_tmpfs();
                Ok(Created::from_component(filesystem, tmpfs))
            }
            other => Err(ClientError::Init(format!("unknown component key {other}"))),
        }
    }
}
