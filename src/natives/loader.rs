//! Dynamic-library bridge for the `use` native.
//!
//! A loadable library exports `init_ry_module(register_fn, target)` and
//! registers its functions through the callback; `use(path)` returns a map
//! of the registered names. The exchange value is the C-compatible tagged
//! struct from the library development kit; only nil, bool, number, and
//! string cross the boundary.

use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::rc::Rc;

use indexmap::IndexMap;
use libloading::{Library, Symbol};

use crate::value::{Globals, MapKey, Native, Value};

const RY_NIL: c_int = 0;
const RY_BOOL: c_int = 1;
const RY_NUMBER: c_int = 2;
const RY_STRING: c_int = 3;

#[repr(C)]
#[derive(Clone, Copy)]
union RawData {
    number: f64,
    boolean: bool,
    ptr: *mut c_void,
}

/// The development-kit value struct: a tag plus a data union.
#[repr(C)]
#[derive(Clone, Copy)]
struct RawValue {
    kind: c_int,
    data: RawData,
}

type RawNativeFn = unsafe extern "C" fn(c_int, *mut RawValue) -> RawValue;
type RegisterFn = unsafe extern "C" fn(*const c_char, RawNativeFn, c_int, *mut c_void);
type InitFn = unsafe extern "C" fn(RegisterFn, *mut c_void);

/// `use(path)`: load a library and return a map of its natives. Load and
/// symbol failures print a library error and yield nil rather than panic.
pub fn ry_use(argv: &[Value], _globals: &mut Globals) -> Result<Value, String> {
    let Some(Value::String(path)) = argv.first() else {
        return Ok(Value::Null);
    };

    match load_module(path) {
        Ok(module) => Ok(module),
        Err(error) => {
            eprintln!("Ry Library Error: {}", error);
            Ok(Value::Null)
        }
    }
}

fn load_module(path: &str) -> Result<Value, String> {
    let mut registry: Vec<(String, RawNativeFn, usize)> = Vec::new();

    unsafe {
        let library = Library::new(path).map_err(|e| e.to_string())?;
        {
            let init: Symbol<InitFn> =
                library.get(b"init_ry_module").map_err(|e| e.to_string())?;
            init(register_callback, &mut registry as *mut _ as *mut c_void);
        }
        // Registered function pointers live inside the library; keep it
        // mapped for the rest of the process.
        std::mem::forget(library);
    }

    let mut entries = IndexMap::new();
    for (name, fn_ptr, arity) in registry {
        let native = wrap_foreign(&name, fn_ptr, arity);
        entries.insert(MapKey::String(name), Value::Native(Rc::new(native)));
    }
    Ok(Value::map(entries))
}

unsafe extern "C" fn register_callback(
    name: *const c_char,
    fn_ptr: RawNativeFn,
    arity: c_int,
    target: *mut c_void,
) {
    if name.is_null() || target.is_null() {
        return;
    }
    let registry = &mut *(target as *mut Vec<(String, RawNativeFn, usize)>);
    let name = CStr::from_ptr(name).to_string_lossy().into_owned();
    registry.push((name, fn_ptr, arity.max(0) as usize));
}

fn wrap_foreign(name: &str, fn_ptr: RawNativeFn, arity: usize) -> Native {
    Native::new(name, arity, move |argv, _globals| {
        // The CString storage must outlive the foreign call.
        let mut strings: Vec<CString> = Vec::new();
        let mut raw_args: Vec<RawValue> =
            argv.iter().map(|v| to_raw(v, &mut strings)).collect();

        let result = unsafe { fn_ptr(raw_args.len() as c_int, raw_args.as_mut_ptr()) };
        Ok(unsafe { from_raw(result) })
    })
}

fn to_raw(value: &Value, strings: &mut Vec<CString>) -> RawValue {
    match value {
        Value::Number(n) => RawValue {
            kind: RY_NUMBER,
            data: RawData { number: *n },
        },
        Value::Bool(b) => RawValue {
            kind: RY_BOOL,
            data: RawData { boolean: *b },
        },
        Value::String(s) => {
            let cstring = CString::new(s.as_str()).unwrap_or_default();
            let ptr = cstring.as_ptr() as *mut c_void;
            strings.push(cstring);
            RawValue {
                kind: RY_STRING,
                data: RawData { ptr },
            }
        }
        _ => RawValue {
            kind: RY_NIL,
            data: RawData { number: 0.0 },
        },
    }
}

unsafe fn from_raw(raw: RawValue) -> Value {
    match raw.kind {
        RY_BOOL => Value::Bool(raw.data.boolean),
        RY_NUMBER => Value::Number(raw.data.number),
        RY_STRING => {
            let ptr = raw.data.ptr as *const c_char;
            if ptr.is_null() {
                Value::Null
            } else {
                Value::String(CStr::from_ptr(ptr).to_string_lossy().into_owned())
            }
        }
        _ => Value::Null,
    }
}
