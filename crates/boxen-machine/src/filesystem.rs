#![forbid(unsafe_code)]

//! Filesystem: a disk-backed component rooted under the environment
//! directory.
//!
//! Regular volumes live at `<env>/<address>/`; the temporary volume lives at
//! `<env>/tmp/` and is cleared at boot. Paths are sandboxed below the
//! component root; `..` escapes are rejected. Open files are handed to the
//! guest as opaque handle tokens.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use tracing::debug;

use boxen_value::{Table, Value, ValuePack};

use crate::component::{Component, ComponentBase, MethodDecl, MethodError, MethodResult};
use crate::error::ClientError;

/// Upper bound on one `read` call.
const MAX_READ: usize = 64 * 1024;

const TMPFS_SPACE: u64 = 64 * 1024;
const VOLUME_SPACE: u64 = 1024 * 1024;

static METHODS: &[MethodDecl] = &[
    MethodDecl::new("getLabel", "function():string -- The label of this volume."),
    MethodDecl::new("setLabel", "function(label:string):string -- Set the label; returns the label actually set."),
    MethodDecl::new("isReadOnly", "function():boolean -- Whether this volume refuses writes."),
    MethodDecl::new("spaceTotal", "function():number -- Volume capacity, in bytes."),
    MethodDecl::new("spaceUsed", "function():number -- Bytes currently used."),
    MethodDecl::new("exists", "function(path:string):boolean -- Whether a file or directory exists."),
    MethodDecl::new("isDirectory", "function(path:string):boolean -- Whether the path names a directory."),
    MethodDecl::new("size", "function(path:string):number -- File size in bytes; 0 for directories."),
    MethodDecl::new("lastModified", "function(path:string):number -- Modification time, seconds since the epoch."),
    MethodDecl::new("list", "function(path:string):table -- Names in a directory; directories carry a trailing slash."),
    MethodDecl::new("makeDirectory", "function(path:string):boolean -- Create a directory and its parents."),
    MethodDecl::new("remove", "function(path:string):boolean -- Remove a file or directory tree."),
    MethodDecl::new("open", "function(path:string[, mode:string]):handle -- Open a file; modes r, w, a (binary suffix accepted)."),
    MethodDecl::new("read", "function(handle, count:number):string or nil -- Read up to count bytes; nil at end of file."),
    MethodDecl::new("write", "function(handle, data:string):boolean -- Write data to an open file."),
    MethodDecl::new("close", "function(handle) -- Close an open file."),
];

enum OpenFile {
    Read(File),
    Write(File),
}

pub struct Filesystem {
    base: ComponentBase,
    root: PathBuf,
    label: String,
    tmpfs: bool,
    read_only: bool,
    space_total: u64,
    handles: HashMap<u64, OpenFile>,
    next_handle: u64,
}

impl Filesystem {
    /// Build from `[key, address?, slot?, "tmpfs"?]`. The tmpfs marker
    /// selects the shared `<env>/tmp` root and clears it.
    pub fn create(entry: &mut Table, env: &Path) -> Result<Self, ClientError> {
        let base = ComponentBase::from_entry(entry);
        let tmpfs = entry.get_index(4).as_str() == Some("tmpfs");
        let root = if tmpfs {
            env.join("tmp")
        } else {
            env.join(base.address())
        };
        if tmpfs && root.exists() {
            debug!(path = %root.display(), "clearing tmpfs");
            fs::remove_dir_all(&root)?;
        }
        fs::create_dir_all(&root)?;
        Ok(Self {
            base,
            root,
            label: if tmpfs { "tmpfs".to_string() } else { String::new() },
            tmpfs,
            read_only: false,
            space_total: if tmpfs { TMPFS_SPACE } else { VOLUME_SPACE },
            handles: HashMap::new(),
            next_handle: 1,
        })
    }

    /// Whether this is the temporary volume.
    #[must_use]
    pub const fn is_tmpfs(&self) -> bool {
        self.tmpfs
    }

    /// Resolve a guest path below the volume root.
    fn resolve(&self, path: &str) -> Result<PathBuf, MethodError> {
        let mut resolved = self.root.clone();
        for part in path.split('/') {
            match part {
                "" | "." => {}
                ".." => return Err(MethodError::failure("path escapes volume")),
                part => resolved.push(part),
            }
        }
        Ok(resolved)
    }

    fn space_used_in(path: &Path) -> u64 {
        let Ok(entries) = fs::read_dir(path) else {
            return 0;
        };
        entries
            .flatten()
            .map(|entry| {
                let path = entry.path();
                if path.is_dir() {
                    Self::space_used_in(&path)
                } else {
                    entry.metadata().map_or(0, |m| m.len())
                }
            })
            .sum()
    }

    fn guard_writable(&self) -> Result<(), MethodError> {
        if self.read_only {
            return Err(MethodError::failure("filesystem is read-only"));
        }
        Ok(())
    }

    fn open_file(&mut self, path: &str, mode: &str) -> MethodResult {
        let resolved = self.resolve(path)?;
        let file = match mode.trim_end_matches('b') {
            "r" => File::open(&resolved)
                .map(OpenFile::Read)
                .map_err(|_| MethodError::failure("file not found"))?,
            "w" => {
                self.guard_writable()?;
                if let Some(parent) = resolved.parent() {
                    fs::create_dir_all(parent)
                        .map_err(|e| MethodError::failure(e.to_string()))?;
                }
                File::create(&resolved)
                    .map(OpenFile::Write)
                    .map_err(|e| MethodError::failure(e.to_string()))?
            }
            "a" => {
                self.guard_writable()?;
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&resolved)
                    .map(OpenFile::Write)
                    .map_err(|e| MethodError::failure(e.to_string()))?
            }
            other => return Err(MethodError::failure(format!("unsupported mode {other}"))),
        };
        let handle = self.next_handle;
        self.next_handle += 1;
        self.handles.insert(handle, file);
        Ok(ValuePack::of([Value::Handle(handle)]))
    }
}

impl Component for Filesystem {
    fn address(&self) -> &str {
        self.base.address()
    }

    fn kind(&self) -> &'static str {
        "filesystem"
    }

    fn slot(&self) -> i64 {
        self.base.slot()
    }

    fn methods(&self) -> &'static [MethodDecl] {
        METHODS
    }

    fn invoke(&mut self, method: &str, args: &ValuePack) -> MethodResult {
        match method {
            "getLabel" => Ok(ValuePack::of([Value::from(self.label.clone())])),
            "setLabel" => {
                if self.tmpfs {
                    return Err(MethodError::failure("label is read only"));
                }
                self.label = args.arg::<String>(0)?;
                Ok(ValuePack::of([Value::from(self.label.clone())]))
            }
            "isReadOnly" => Ok(ValuePack::of([Value::from(self.read_only)])),
            "spaceTotal" => Ok(ValuePack::of([Value::from(self.space_total as i64)])),
            "spaceUsed" => Ok(ValuePack::of([Value::from(
                Self::space_used_in(&self.root) as i64,
            )])),
            "exists" => {
                let path = self.resolve(&args.arg::<String>(0)?)?;
                Ok(ValuePack::of([Value::from(path.exists())]))
            }
            "isDirectory" => {
                let path = self.resolve(&args.arg::<String>(0)?)?;
                Ok(ValuePack::of([Value::from(path.is_dir())]))
            }
            "size" => {
                let path = self.resolve(&args.arg::<String>(0)?)?;
                let size = fs::metadata(&path)
                    .map(|m| if m.is_file() { m.len() } else { 0 })
                    .unwrap_or(0);
                Ok(ValuePack::of([Value::from(size as i64)]))
            }
            "lastModified" => {
                let path = self.resolve(&args.arg::<String>(0)?)?;
                let seconds = fs::metadata(&path)
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map_or(0, |d| d.as_secs());
                Ok(ValuePack::of([Value::from(seconds as i64)]))
            }
            "list" => {
                let path = self.resolve(&args.arg::<String>(0)?)?;
                let entries =
                    fs::read_dir(&path).map_err(|_| MethodError::failure("no such directory"))?;
                let mut names: Vec<String> = entries
                    .flatten()
                    .map(|entry| {
                        let mut name = entry.file_name().to_string_lossy().into_owned();
                        if entry.path().is_dir() {
                            name.push('/');
                        }
                        name
                    })
                    .collect();
                names.sort();
                let mut list = Table::new();
                for name in names {
                    list.push(Value::from(name));
                }
                Ok(ValuePack::of([Value::Table(list)]))
            }
            "makeDirectory" => {
                self.guard_writable()?;
                let path = self.resolve(&args.arg::<String>(0)?)?;
                Ok(ValuePack::of([Value::from(
                    fs::create_dir_all(&path).is_ok(),
                )]))
            }
            "remove" => {
                self.guard_writable()?;
                let path = self.resolve(&args.arg::<String>(0)?)?;
                let removed = if path.is_dir() {
                    fs::remove_dir_all(&path).is_ok()
                } else {
                    fs::remove_file(&path).is_ok()
                };
                Ok(ValuePack::of([Value::from(removed)]))
            }
            "open" => {
                let path = args.arg::<String>(0)?;
                let mode = args.arg_or::<String>(1, "r".to_string())?;
                self.open_file(&path, &mode)
            }
            "read" => {
                let handle = args.arg::<u64>(0)?;
                let count = args.arg::<i64>(1)?.max(0) as usize;
                let Some(OpenFile::Read(file)) = self.handles.get_mut(&handle) else {
                    return Err(MethodError::failure("bad file descriptor"));
                };
                let mut buffer = vec![0u8; count.min(MAX_READ)];
                let n = file
                    .read(&mut buffer)
                    .map_err(|e| MethodError::failure(e.to_string()))?;
                if n == 0 && count > 0 {
                    return Ok(ValuePack::of([Value::Nil]));
                }
                buffer.truncate(n);
                Ok(ValuePack::of([Value::from(
                    String::from_utf8_lossy(&buffer).into_owned(),
                )]))
            }
            "write" => {
                let handle = args.arg::<u64>(0)?;
                let data = args.arg::<String>(1)?;
                let used = Self::space_used_in(&self.root);
                if used + data.len() as u64 > self.space_total {
                    return Err(MethodError::failure("not enough space"));
                }
                let Some(OpenFile::Write(file)) = self.handles.get_mut(&handle) else {
                    return Err(MethodError::failure("bad file descriptor"));
                };
                file.write_all(data.as_bytes())
                    .map_err(|e| MethodError::failure(e.to_string()))?;
                Ok(ValuePack::of([Value::from(true)]))
            }
            "close" => {
                let handle = args.arg::<u64>(0)?;
                if self.handles.remove(&handle).is_none() {
                    return Err(MethodError::failure("bad file descriptor"));
                }
                Ok(ValuePack::new())
            }
            _ => Err(MethodError::NoSuchMethod),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn volume(env: &Path) -> Filesystem {
        let mut entry = Table::new();
        entry.push(Value::from("filesystem"));
        Filesystem::create(&mut entry, env).unwrap()
    }

    fn tmp_volume(env: &Path) -> Filesystem {
        let mut entry = Table::new();
        entry.push(Value::from("filesystem"));
        entry.set(Value::Integer(4), Value::from("tmpfs"));
        Filesystem::create(&mut entry, env).unwrap()
    }

    fn call(fs: &mut Filesystem, method: &str, args: Vec<Value>) -> MethodResult {
        fs.invoke(method, &ValuePack::of(args))
    }

    #[test]
    fn write_read_round_trip() {
        let env = tempdir().unwrap();
        let mut fs = volume(env.path());

        let handle = call(&mut fs, "open", vec![Value::from("greeting"), Value::from("w")])
            .unwrap()
            .get(0)
            .clone();
        call(&mut fs, "write", vec![handle.clone(), Value::from("hello disk")]).unwrap();
        call(&mut fs, "close", vec![handle]).unwrap();

        let handle = call(&mut fs, "open", vec![Value::from("greeting")])
            .unwrap()
            .get(0)
            .clone();
        let data = call(&mut fs, "read", vec![handle.clone(), Value::from(1024)]).unwrap();
        assert_eq!(*data.get(0), Value::from("hello disk"));
        // End of file reads nil.
        let eof = call(&mut fs, "read", vec![handle.clone(), Value::from(1024)]).unwrap();
        assert_eq!(*eof.get(0), Value::Nil);
        call(&mut fs, "close", vec![handle]).unwrap();
    }

    #[test]
    fn directories_and_listing() {
        let env = tempdir().unwrap();
        let mut fs = volume(env.path());

        call(&mut fs, "makeDirectory", vec![Value::from("bin/deep")]).unwrap();
        let handle = call(&mut fs, "open", vec![Value::from("bin/tool"), Value::from("w")])
            .unwrap()
            .get(0)
            .clone();
        call(&mut fs, "close", vec![handle]).unwrap();

        let listing = call(&mut fs, "list", vec![Value::from("bin")]).unwrap();
        let listing = listing.get(0).as_table().unwrap().clone();
        assert_eq!(*listing.get_index(1), Value::from("deep/"));
        assert_eq!(*listing.get_index(2), Value::from("tool"));

        let is_dir = call(&mut fs, "isDirectory", vec![Value::from("bin/deep")]).unwrap();
        assert_eq!(*is_dir.get(0), Value::from(true));
    }

    #[test]
    fn path_escape_is_rejected() {
        let env = tempdir().unwrap();
        let mut fs = volume(env.path());
        let err = call(&mut fs, "exists", vec![Value::from("../outside")]).unwrap_err();
        assert_eq!(err.message(), "path escapes volume");
    }

    #[test]
    fn missing_file_open_fails() {
        let env = tempdir().unwrap();
        let mut fs = volume(env.path());
        let err = call(&mut fs, "open", vec![Value::from("absent")]).unwrap_err();
        assert_eq!(err.message(), "file not found");
    }

    #[test]
    fn bad_handle_is_refused() {
        let env = tempdir().unwrap();
        let mut fs = volume(env.path());
        let err = call(&mut fs, "read", vec![Value::Handle(99), Value::from(10)]).unwrap_err();
        assert_eq!(err.message(), "bad file descriptor");
    }

    #[test]
    fn tmpfs_clears_at_boot() {
        let env = tempdir().unwrap();
        {
            let mut fs = tmp_volume(env.path());
            let handle = call(&mut fs, "open", vec![Value::from("scratch"), Value::from("w")])
                .unwrap()
                .get(0)
                .clone();
            call(&mut fs, "write", vec![handle.clone(), Value::from("junk")]).unwrap();
            call(&mut fs, "close", vec![handle]).unwrap();
        }
        let mut fs = tmp_volume(env.path());
        let exists = call(&mut fs, "exists", vec![Value::from("scratch")]).unwrap();
        assert_eq!(*exists.get(0), Value::from(false));
        assert!(fs.is_tmpfs());
    }

    #[test]
    fn space_accounting() {
        let env = tempdir().unwrap();
        let mut fs = volume(env.path());
        let handle = call(&mut fs, "open", vec![Value::from("blob"), Value::from("w")])
            .unwrap()
            .get(0)
            .clone();
        call(&mut fs, "write", vec![handle.clone(), Value::from("12345")]).unwrap();
        call(&mut fs, "close", vec![handle]).unwrap();

        let used = call(&mut fs, "spaceUsed", vec![]).unwrap();
        assert_eq!(*used.get(0), Value::from(5));
        let total = call(&mut fs, "spaceTotal", vec![]).unwrap();
        assert_eq!(*total.get(0), Value::from(VOLUME_SPACE as i64));
    }

    #[test]
    fn remove_files_and_trees() {
        let env = tempdir().unwrap();
        let mut fs = volume(env.path());
        call(&mut fs, "makeDirectory", vec![Value::from("tree/inner")]).unwrap();
        let removed = call(&mut fs, "remove", vec![Value::from("tree")]).unwrap();
        assert_eq!(*removed.get(0), Value::from(true));
        let exists = call(&mut fs, "exists", vec![Value::from("tree")]).unwrap();
        assert_eq!(*exists.get(0), Value::from(false));
    }
}
