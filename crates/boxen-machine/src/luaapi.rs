#![forbid(unsafe_code)]

//! The guest/host value boundary and the sandbox libraries.
//!
//! Conversions map [`Value`] onto `mlua` values (handles ride as integers;
//! the guest has no handle type of its own) and back (callables and userdata
//! degrade to nil; conversion depth is capped so a cyclic guest table cannot
//! hang the host).
//!
//! Library registration installs the guest-visible `component`, `computer`,
//! `unicode`, and `system` tables. The closures capture only weak handles:
//! the client owns the registry and the computer owns its services, and a
//! library must never extend either lifetime.

use std::cell::RefCell;
use std::rc::Weak;

use mlua::{Lua, MultiValue, Value as LuaValue, Variadic};

use boxen_value::{Table, Value, ValuePack};

use crate::component::{MethodError, MethodResult};
use crate::computer::{ComputerServices, SystemConfig, COMPUTER_METHODS};
use crate::registry::Registry;

/// Conversion depth cap; guest tables deeper than this truncate to nil.
const MAX_TABLE_DEPTH: usize = 16;

// ── Conversions ──────────────────────────────────────────────────────────

/// Host value → guest value.
pub fn value_to_lua(lua: &Lua, value: &Value) -> mlua::Result<LuaValue> {
    Ok(match value {
        Value::Nil => LuaValue::Nil,
        Value::Boolean(b) => LuaValue::Boolean(*b),
        Value::Integer(i) => LuaValue::Integer(*i),
        Value::Number(n) => LuaValue::Number(*n),
        Value::String(s) => LuaValue::String(lua.create_string(s)?),
        Value::Handle(h) => LuaValue::Integer(*h as i64),
        Value::Table(t) => {
            let table = lua.create_table()?;
            for (k, v) in t.pairs() {
                table.set(value_to_lua(lua, k)?, value_to_lua(lua, v)?)?;
            }
            LuaValue::Table(table)
        }
    })
}

/// Guest value → host value.
pub fn lua_to_value(value: &LuaValue) -> Value {
    lua_to_value_depth(value, 0)
}

fn lua_to_value_depth(value: &LuaValue, depth: usize) -> Value {
    match value {
        LuaValue::Nil => Value::Nil,
        LuaValue::Boolean(b) => Value::Boolean(*b),
        LuaValue::Integer(i) => Value::Integer(*i),
        LuaValue::Number(n) => Value::Number(*n),
        LuaValue::String(s) => {
            let bytes = s.as_bytes();
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        }
        LuaValue::Table(t) => {
            if depth >= MAX_TABLE_DEPTH {
                return Value::Nil;
            }
            let mut out = Table::new();
            for pair in t.clone().pairs::<LuaValue, LuaValue>() {
                let Ok((k, v)) = pair else { continue };
                let key = lua_to_value_depth(&k, depth + 1);
                let val = lua_to_value_depth(&v, depth + 1);
                if !key.is_nil() {
                    out.set(key, val);
                }
            }
            Value::Table(out)
        }
        // Functions, threads, userdata: nothing the host can hold.
        _ => Value::Nil,
    }
}

/// Convert a pack into resume/return arguments.
pub fn pack_to_multi(lua: &Lua, pack: &ValuePack) -> mlua::Result<MultiValue> {
    pack.values()
        .iter()
        .map(|v| value_to_lua(lua, v))
        .collect::<mlua::Result<MultiValue>>()
}

/// Convert guest varargs into a pack.
#[must_use]
pub fn variadic_to_pack(args: &Variadic<LuaValue>) -> ValuePack {
    args.iter().map(lua_to_value).collect()
}

/// Render a library-call result: success values as-is, failure as
/// `(nil, message)`.
pub fn lib_result_to_multi(lua: &Lua, result: MethodResult) -> mlua::Result<MultiValue> {
    match result {
        Ok(pack) => pack_to_multi(lua, &pack),
        Err(err) => failure_multi(lua, &err.message()),
    }
}

/// Render an `invoke` result: success gains the `true` status prefix so the
/// guest can tell host-level errors from returned nils.
pub fn invoke_result_to_multi(lua: &Lua, result: MethodResult) -> mlua::Result<MultiValue> {
    match result {
        Ok(pack) => {
            let mut values = vec![LuaValue::Boolean(true)];
            for v in pack.values() {
                values.push(value_to_lua(lua, v)?);
            }
            Ok(MultiValue::from_iter(values))
        }
        Err(err) => failure_multi(lua, &err.message()),
    }
}

fn failure_multi(lua: &Lua, message: &str) -> mlua::Result<MultiValue> {
    Ok(MultiValue::from_iter([
        LuaValue::Nil,
        LuaValue::String(lua.create_string(message)?),
    ]))
}

// ── Guest context ────────────────────────────────────────────────────────

/// Weak handles the sandbox libraries close over.
#[derive(Clone)]
pub struct GuestContext {
    pub registry: Weak<RefCell<Registry>>,
    pub services: Weak<RefCell<ComputerServices>>,
}

impl GuestContext {
    fn registry_or_err(&self) -> mlua::Result<std::rc::Rc<RefCell<Registry>>> {
        self.registry
            .upgrade()
            .ok_or_else(|| mlua::Error::RuntimeError("component registry is gone".into()))
    }
}

// ── component library ────────────────────────────────────────────────────

/// Install the guest-visible `component` table.
pub fn register_component_lib(lua: &Lua, ctx: &GuestContext) -> mlua::Result<()> {
    let lib = lua.create_table()?;

    // list(filter?, exact?) → table address → type.
    // A nil filter forces exact=false, documented contract.
    let list_ctx = ctx.clone();
    lib.set(
        "list",
        lua.create_function(move |lua, (filter, exact): (Option<LuaValue>, Option<bool>)| {
            let filter_is_nil = !matches!(filter, Some(ref v) if !v.is_nil());
            let filter = match filter {
                Some(LuaValue::String(s)) => {
                    let bytes = s.as_bytes();
                    String::from_utf8_lossy(&bytes).into_owned()
                }
                None | Some(LuaValue::Nil) => String::new(),
                Some(other) => {
                    return Err(mlua::Error::RuntimeError(format!(
                        "bad argument #1 (string expected, got {})",
                        other.type_name()
                    )));
                }
            };
            let exact = if filter_is_nil {
                false
            } else {
                exact.unwrap_or(false)
            };

            let registry = list_ctx.registry_or_err()?;
            let registry = registry.borrow();
            let result = lua.create_table()?;
            for entry in registry.matching(&filter, exact) {
                result.set(entry.address.as_str(), entry.kind)?;
            }
            Ok(result)
        })?,
    )?;

    // invoke(address, method, …) → (true, …) | (nil, message).
    let invoke_ctx = ctx.clone();
    lib.set(
        "invoke",
        lua.create_function(
            move |lua, (address, method, args): (String, String, Variadic<LuaValue>)| {
                let pack = variadic_to_pack(&args);
                let result = dispatch_invoke(&invoke_ctx, lua, &address, &method, &pack)?;
                match result {
                    Some(result) => invoke_result_to_multi(lua, result),
                    None => failure_multi(lua, &format!("no such component {address}")),
                }
            },
        )?,
    )?;

    // methods(address) → table name → {direct=true}.
    let methods_ctx = ctx.clone();
    lib.set(
        "methods",
        lua.create_function(move |lua, address: String| {
            let registry = methods_ctx.registry_or_err()?;
            let registry = registry.borrow();
            let Some(entry) = registry.find(&address) else {
                return failure_multi(lua, "no such component");
            };
            let result = lua.create_table()?;
            for decl in entry.methods {
                let info = lua.create_table()?;
                info.set("direct", decl.direct)?;
                result.set(decl.name, info)?;
            }
            Ok(MultiValue::from_iter([LuaValue::Table(result)]))
        })?,
    )?;

    // type(address) → type string.
    let type_ctx = ctx.clone();
    lib.set(
        "type",
        lua.create_function(move |lua, address: String| {
            let registry = type_ctx.registry_or_err()?;
            let registry = registry.borrow();
            match registry.find(&address) {
                Some(entry) => Ok(MultiValue::from_iter([LuaValue::String(
                    lua.create_string(entry.kind)?,
                )])),
                None => failure_multi(lua, "no such component"),
            }
        })?,
    )?;

    // slot(address) → integer.
    let slot_ctx = ctx.clone();
    lib.set(
        "slot",
        lua.create_function(move |lua, address: String| {
            let registry = slot_ctx.registry_or_err()?;
            let registry = registry.borrow();
            match registry.find(&address) {
                Some(entry) => Ok(MultiValue::from_iter([LuaValue::Integer(entry.slot)])),
                None => failure_multi(lua, "no such component"),
            }
        })?,
    )?;

    // doc(address, method) → documentation string.
    let doc_ctx = ctx.clone();
    lib.set(
        "doc",
        lua.create_function(move |lua, (address, method): (String, String)| {
            let registry = doc_ctx.registry_or_err()?;
            let registry = registry.borrow();
            let Some(entry) = registry.find(&address) else {
                return failure_multi(lua, "no such component");
            };
            match entry.methods.iter().find(|d| d.name == method) {
                Some(decl) => Ok(MultiValue::from_iter([LuaValue::String(
                    lua.create_string(decl.doc)?,
                )])),
                None => Ok(MultiValue::from_iter([LuaValue::Nil])),
            }
        })?,
    )?;

    lua.globals().set("component", lib)
}

/// Route an invocation: the computer's own address dispatches through its
/// services (its component cell is borrowed while the guest runs), anything
/// else through the registry. `None` means no such component.
fn dispatch_invoke(
    ctx: &GuestContext,
    lua: &Lua,
    address: &str,
    method: &str,
    args: &ValuePack,
) -> mlua::Result<Option<MethodResult>> {
    if let Some(services) = ctx.services.upgrade() {
        let is_self = services.borrow().address == address;
        if is_self {
            return Ok(Some(services.borrow_mut().dispatch(lua, method, args)));
        }
    }

    let registry = ctx.registry_or_err()?;
    let cell = {
        let registry = registry.borrow();
        registry.find(address).map(|entry| std::rc::Rc::clone(&entry.cell))
    };
    Ok(cell.map(|cell| cell.borrow_mut().invoke(method, args)))
}

// ── computer library ─────────────────────────────────────────────────────

/// Install the guest-visible `computer` table. Each entry forwards to the
/// services dispatcher; `pullSignal`/`shutdown` are replaced afterwards by
/// the coroutine shims in [`inject_kernel_shims`].
pub fn register_computer_lib(lua: &Lua, ctx: &GuestContext) -> mlua::Result<()> {
    let lib = lua.create_table()?;
    for decl in COMPUTER_METHODS {
        let name = decl.name;
        let services = ctx.services.clone();
        lib.set(
            name,
            lua.create_function(move |lua, args: Variadic<LuaValue>| {
                let pack = variadic_to_pack(&args);
                let services = services
                    .upgrade()
                    .ok_or_else(|| mlua::Error::RuntimeError("computer is gone".into()))?;
                let result = services.borrow_mut().dispatch(lua, name, &pack);
                lib_result_to_multi(lua, result)
            })?,
        )?;
    }
    lua.globals().set("computer", lib)
}

/// Replace `computer.pullSignal`/`computer.shutdown` with coroutine shims:
/// pulling a signal yields the timeout to the host, which resumes with the
/// signal values; shutting down yields nil (or "reboot") and never returns.
pub fn inject_kernel_shims(lua: &Lua) -> mlua::Result<()> {
    lua.load(
        r#"
        local computer = computer
        computer.pullSignal = function(timeout)
            return coroutine.yield(tonumber(timeout) or math.huge)
        end
        computer.shutdown = function(reboot)
            while true do
                coroutine.yield(reboot and "reboot" or nil)
            end
        end
        "#,
    )
    .set_name("shims")
    .exec()
}

// ── unicode library ──────────────────────────────────────────────────────

/// Install the `unicode` helper table (UTF-8 aware string operations).
pub fn register_unicode_lib(lua: &Lua) -> mlua::Result<()> {
    use unicode_width::UnicodeWidthChar;

    let lib = lua.create_table()?;

    lib.set(
        "char",
        lua.create_function(|lua, codes: Variadic<u32>| {
            let s: String = codes
                .iter()
                .map(|&c| char::from_u32(c).unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect();
            lua.create_string(&s)
        })?,
    )?;

    lib.set(
        "len",
        lua.create_function(|_, s: String| Ok(s.chars().count() as i64))?,
    )?;

    lib.set(
        "sub",
        lua.create_function(|lua, (s, i, j): (String, i64, Option<i64>)| {
            let chars: Vec<char> = s.chars().collect();
            let len = chars.len() as i64;
            let j = j.unwrap_or(-1);
            // Lua string.sub index rules, applied per character.
            let from = if i < 0 { (len + i + 1).max(1) } else { i.max(1) };
            let to = if j < 0 { len + j + 1 } else { j.min(len) };
            if from > to {
                return lua.create_string("");
            }
            let out: String = chars[(from - 1) as usize..to as usize].iter().collect();
            lua.create_string(&out)
        })?,
    )?;

    lib.set(
        "upper",
        lua.create_function(|lua, s: String| lua.create_string(&s.to_uppercase()))?,
    )?;

    lib.set(
        "lower",
        lua.create_function(|lua, s: String| lua.create_string(&s.to_lowercase()))?,
    )?;

    lib.set(
        "reverse",
        lua.create_function(|lua, s: String| {
            lua.create_string(&s.chars().rev().collect::<String>())
        })?,
    )?;

    lib.set(
        "charWidth",
        lua.create_function(|_, s: String| {
            Ok(s.chars().next().and_then(|c| c.width()).unwrap_or(0) as i64)
        })?,
    )?;

    lib.set(
        "isWide",
        lua.create_function(|_, s: String| {
            Ok(s.chars().next().and_then(|c| c.width()).unwrap_or(0) > 1)
        })?,
    )?;

    lua.globals().set("unicode", lib)
}

// ── system library ───────────────────────────────────────────────────────

/// Install the `system` policy table.
pub fn register_system_lib(lua: &Lua, config: &SystemConfig) -> mlua::Result<()> {
    let lib = lua.create_table()?;
    let timeout = config.timeout;
    lib.set("timeout", lua.create_function(move |_, ()| Ok(timeout))?)?;
    let allow_bytecode = config.allow_bytecode;
    lib.set(
        "allowBytecode",
        lua.create_function(move |_, ()| Ok(allow_bytecode))?,
    )?;
    let allow_gc = config.allow_gc;
    lib.set("allowGC", lua.create_function(move |_, ()| Ok(allow_gc))?)?;
    lua.globals().set("system", lib)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_round_trip_through_lua() {
        let lua = Lua::new();
        let mut table = Table::new();
        table.set_str("name", Value::from("screen"));
        table.push(Value::from(1));
        table.push(Value::from(2.5));
        let original = Value::Table(table);

        let lua_value = value_to_lua(&lua, &original).unwrap();
        assert_eq!(lua_to_value(&lua_value), original);
    }

    #[test]
    fn handles_become_integers() {
        let lua = Lua::new();
        let lua_value = value_to_lua(&lua, &Value::Handle(7)).unwrap();
        assert!(matches!(lua_value, LuaValue::Integer(7)));
    }

    #[test]
    fn functions_degrade_to_nil() {
        let lua = Lua::new();
        let f: LuaValue = lua
            .load("return function() end")
            .eval()
            .unwrap();
        assert_eq!(lua_to_value(&f), Value::Nil);
    }

    #[test]
    fn cyclic_tables_truncate() {
        let lua = Lua::new();
        let t: LuaValue = lua.load("local t = {} t.self = t return t").eval().unwrap();
        // Must terminate; the innermost level is nil-truncated and
        // nil-valued keys drop out.
        let _ = lua_to_value(&t);
    }

    #[test]
    fn invoke_result_gains_true_prefix() {
        let lua = Lua::new();
        let ok = invoke_result_to_multi(&lua, Ok(ValuePack::of([Value::from(9)]))).unwrap();
        let values: Vec<LuaValue> = ok.into_iter().collect();
        assert!(matches!(values[0], LuaValue::Boolean(true)));
        assert!(matches!(values[1], LuaValue::Integer(9)));
    }

    #[test]
    fn failures_are_nil_plus_message() {
        let lua = Lua::new();
        let multi =
            lib_result_to_multi(&lua, Err(MethodError::failure("not enough space"))).unwrap();
        let values: Vec<LuaValue> = multi.into_iter().collect();
        assert!(values[0].is_nil());
        assert_eq!(values[1].to_string().unwrap(), "not enough space");
    }

    #[test]
    fn unicode_sub_matches_lua_semantics() {
        let lua = Lua::new();
        register_unicode_lib(&lua).unwrap();
        let out: String = lua.load(r#"return unicode.sub("héllo", 2, 3)"#).eval().unwrap();
        assert_eq!(out, "él");
        let out: String = lua.load(r#"return unicode.sub("héllo", -2)"#).eval().unwrap();
        assert_eq!(out, "lo");
    }

    #[test]
    fn unicode_len_counts_chars() {
        let lua = Lua::new();
        register_unicode_lib(&lua).unwrap();
        let n: i64 = lua.load(r#"return unicode.len("héllo")"#).eval().unwrap();
        assert_eq!(n, 5);
    }

    #[test]
    fn system_lib_reports_policies() {
        let lua = Lua::new();
        let config = SystemConfig {
            timeout: 7.5,
            allow_bytecode: true,
            allow_gc: false,
            machine: None,
        };
        register_system_lib(&lua, &config).unwrap();
        let t: f64 = lua.load("return system.timeout()").eval().unwrap();
        assert_eq!(t, 7.5);
        let b: bool = lua.load("return system.allowBytecode()").eval().unwrap();
        assert!(b);
    }
}
