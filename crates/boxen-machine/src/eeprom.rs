#![forbid(unsafe_code)]

//! EEPROM: two persistent byte blobs.
//!
//! The bios blob is executable (the machine kernel loads it), the data blob
//! is non-executable scratch. Both persist under the environment directory;
//! the bios is seeded from `originalBiosPath` only when no persisted blob
//! exists yet.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use boxen_value::{Table, Value, ValuePack};

use crate::component::{Component, ComponentBase, MethodDecl, MethodError, MethodResult};
use crate::error::ClientError;

const DEFAULT_BIOS_SIZE: usize = 4 * 1024;
const DEFAULT_DATA_SIZE: usize = 256;

static METHODS: &[MethodDecl] = &[
    MethodDecl::new("get", "function():string -- The currently stored bios code."),
    MethodDecl::new("set", "function(data:string) -- Overwrite the bios code."),
    MethodDecl::new("getData", "function():string -- The currently stored data blob."),
    MethodDecl::new("setData", "function(data:string) -- Overwrite the data blob."),
    MethodDecl::new("getLabel", "function():string -- The label of this EEPROM."),
    MethodDecl::new("setLabel", "function(label:string):string -- Set the label; returns the label actually set."),
    MethodDecl::new("getSize", "function():number -- Storage capacity of the bios blob."),
    MethodDecl::new("getDataSize", "function():number -- Storage capacity of the data blob."),
];

/// The EEPROM component.
pub struct Eeprom {
    base: ComponentBase,
    bios: String,
    data: String,
    label: String,
    bios_limit: usize,
    data_limit: usize,
    dir: PathBuf,
}

impl Eeprom {
    /// Build from `[key, address?, slot?, originalBiosPath?]`.
    ///
    /// A persisted blob larger than the limit is an initialization error.
    pub fn create(entry: &mut Table, env: &Path) -> Result<Self, ClientError> {
        let base = ComponentBase::from_entry(entry);
        let dir = env.to_path_buf();
        let mut eeprom = Self {
            base,
            bios: String::new(),
            data: String::new(),
            label: "EEPROM".to_string(),
            bios_limit: DEFAULT_BIOS_SIZE,
            data_limit: DEFAULT_DATA_SIZE,
            dir,
        };

        if eeprom.bios_path().exists() {
            eeprom.bios = fs::read_to_string(eeprom.bios_path())?;
        } else if let Some(original) = entry.get_index(4).as_str() {
            debug!(path = original, "seeding eeprom bios");
            eeprom.bios = fs::read_to_string(original)
                .map_err(|e| ClientError::Init(format!("originalBiosPath {original}: {e}")))?;
        }
        if eeprom.data_path().exists() {
            eeprom.data = fs::read_to_string(eeprom.data_path())?;
        }

        if eeprom.bios.len() > eeprom.bios_limit {
            return Err(ClientError::Init(format!(
                "eeprom bios exceeds {} bytes",
                eeprom.bios_limit
            )));
        }
        Ok(eeprom)
    }

    fn bios_path(&self) -> PathBuf {
        self.dir.join("eeprom.bin")
    }

    fn data_path(&self) -> PathBuf {
        self.dir.join("eeprom.data")
    }

    fn persist(&self, path: PathBuf, blob: &str) -> MethodResult {
        fs::write(path, blob).map_err(|e| MethodError::failure(e.to_string()))?;
        Ok(ValuePack::new())
    }
}

impl Component for Eeprom {
    fn address(&self) -> &str {
        self.base.address()
    }

    fn kind(&self) -> &'static str {
        "eeprom"
    }

    fn slot(&self) -> i64 {
        self.base.slot()
    }

    fn methods(&self) -> &'static [MethodDecl] {
        METHODS
    }

    fn invoke(&mut self, method: &str, args: &ValuePack) -> MethodResult {
        match method {
            "get" => Ok(ValuePack::of([Value::from(self.bios.clone())])),
            "set" => {
                let blob = args.arg::<String>(0)?;
                if blob.len() > self.bios_limit {
                    return Err(MethodError::failure("not enough space"));
                }
                self.persist(self.bios_path(), &blob)?;
                self.bios = blob;
                Ok(ValuePack::new())
            }
            "getData" => Ok(ValuePack::of([Value::from(self.data.clone())])),
            "setData" => {
                let blob = args.arg::<String>(0)?;
                if blob.len() > self.data_limit {
                    return Err(MethodError::failure("not enough space"));
                }
                self.persist(self.data_path(), &blob)?;
                self.data = blob;
                Ok(ValuePack::new())
            }
            "getLabel" => Ok(ValuePack::of([Value::from(self.label.clone())])),
            "setLabel" => {
                self.label = args.arg::<String>(0)?;
                Ok(ValuePack::of([Value::from(self.label.clone())]))
            }
            "getSize" => Ok(ValuePack::of([Value::from(self.bios_limit as i64)])),
            "getDataSize" => Ok(ValuePack::of([Value::from(self.data_limit as i64)])),
            _ => Err(MethodError::NoSuchMethod),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn eeprom_in(dir: &Path) -> Eeprom {
        let mut entry = Table::new();
        entry.push(Value::from("eeprom"));
        Eeprom::create(&mut entry, dir).unwrap()
    }

    fn set(eeprom: &mut Eeprom, blob: &str) -> MethodResult {
        eeprom.invoke("set", &ValuePack::of([Value::from(blob)]))
    }

    #[test]
    fn set_then_get_round_trips_and_persists() {
        let dir = tempdir().unwrap();
        {
            let mut eeprom = eeprom_in(dir.path());
            set(&mut eeprom, "print('hi')").unwrap();
        }
        let mut eeprom = eeprom_in(dir.path());
        let got = eeprom.invoke("get", &ValuePack::new()).unwrap();
        assert_eq!(*got.get(0), Value::from("print('hi')"));
    }

    #[test]
    fn oversized_set_fails_and_retains_previous_blob() {
        let dir = tempdir().unwrap();
        let mut eeprom = eeprom_in(dir.path());
        set(&mut eeprom, "old bios").unwrap();

        let big = "x".repeat(DEFAULT_BIOS_SIZE + 1);
        let err = set(&mut eeprom, &big).unwrap_err();
        assert_eq!(err.message(), "not enough space");

        let got = eeprom.invoke("get", &ValuePack::new()).unwrap();
        assert_eq!(*got.get(0), Value::from("old bios"));
        // The persisted copy is untouched too.
        assert_eq!(fs::read_to_string(dir.path().join("eeprom.bin")).unwrap(), "old bios");
    }

    #[test]
    fn exactly_at_limit_is_allowed() {
        let dir = tempdir().unwrap();
        let mut eeprom = eeprom_in(dir.path());
        let full = "x".repeat(DEFAULT_BIOS_SIZE);
        assert!(set(&mut eeprom, &full).is_ok());
    }

    #[test]
    fn data_blob_has_its_own_limit() {
        let dir = tempdir().unwrap();
        let mut eeprom = eeprom_in(dir.path());
        let err = eeprom
            .invoke(
                "setData",
                &ValuePack::of([Value::from("x".repeat(DEFAULT_DATA_SIZE + 1))]),
            )
            .unwrap_err();
        assert_eq!(err.message(), "not enough space");

        eeprom
            .invoke("setData", &ValuePack::of([Value::from("settings")]))
            .unwrap();
        let got = eeprom.invoke("getData", &ValuePack::new()).unwrap();
        assert_eq!(*got.get(0), Value::from("settings"));
    }

    #[test]
    fn seeds_from_original_bios_only_without_persisted_blob() {
        let dir = tempdir().unwrap();
        let seed = dir.path().join("seed.lua");
        fs::write(&seed, "seed code").unwrap();

        let mut entry = Table::new();
        entry.push(Value::from("eeprom"));
        entry.set(Value::Integer(4), Value::from(seed.to_str().unwrap()));
        let mut eeprom = Eeprom::create(&mut entry.clone(), dir.path()).unwrap();
        let got = eeprom.invoke("get", &ValuePack::new()).unwrap();
        assert_eq!(*got.get(0), Value::from("seed code"));

        // Persist something else; the seed must not win on the next boot.
        set(&mut eeprom, "persisted").unwrap();
        let mut eeprom = Eeprom::create(&mut entry, dir.path()).unwrap();
        let got = eeprom.invoke("get", &ValuePack::new()).unwrap();
        assert_eq!(*got.get(0), Value::from("persisted"));
    }

    #[test]
    fn label_round_trip() {
        let dir = tempdir().unwrap();
        let mut eeprom = eeprom_in(dir.path());
        let set = eeprom
            .invoke("setLabel", &ValuePack::of([Value::from("init")]))
            .unwrap();
        assert_eq!(*set.get(0), Value::from("init"));
        let got = eeprom.invoke("getLabel", &ValuePack::new()).unwrap();
        assert_eq!(*got.get(0), Value::from("init"));
    }

    #[test]
    fn sizes_report_limits() {
        let dir = tempdir().unwrap();
        let mut eeprom = eeprom_in(dir.path());
        let size = eeprom.invoke("getSize", &ValuePack::new()).unwrap();
        assert_eq!(*size.get(0), Value::from(DEFAULT_BIOS_SIZE as i64));
        let data_size = eeprom.invoke("getDataSize", &ValuePack::new()).unwrap();
        assert_eq!(*data_size.get(0), Value::from(DEFAULT_DATA_SIZE as i64));
    }
}
