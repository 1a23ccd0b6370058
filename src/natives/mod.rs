//! The native standard library: host functions registered into the global
//! table at VM construction.

pub mod loader;

use std::io::Write;
use std::rc::Rc;

use crate::value::{Globals, Native, Value};

/// Names the compiler treats as natives (namespace prefixing skips them).
pub fn names() -> &'static [&'static str] {
    &["out", "input", "clock", "clear", "exit", "type", "use"]
}

/// Install every native into a fresh global table.
pub fn register(globals: &mut Globals) {
    let mut define = |name: &str, arity: usize, func: fn(&[Value], &mut Globals) -> Result<Value, String>| {
        globals.insert(
            name.to_string(),
            Value::Native(Rc::new(Native::new(name, arity, func))),
        );
    };

    define("out", 1, ry_out);
    define("input", 1, ry_input);
    define("clock", 0, ry_clock);
    define("clear", 0, ry_clear);
    define("exit", 1, ry_exit);
    define("type", 1, ry_type);
    define("use", 1, loader::ry_use);
}

/// The receiver-consuming `pop` method surfaced by `GET_PROPERTY`.
pub fn list_pop() -> Rc<Native> {
    Rc::new(Native::method("pop", 0, |argv, _globals| {
        match argv.first() {
            Some(Value::List(list)) => {
                let mut list = list.borrow_mut();
                list.pop()
                    .ok_or_else(|| "Cannot pop from an empty list.".to_string())
            }
            _ => Err("Argument to pop() must be a list.".to_string()),
        }
    }))
}

/// `out(...)`: stringify every argument, join with spaces, newline.
fn ry_out(argv: &[Value], _globals: &mut Globals) -> Result<Value, String> {
    let line = argv
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    println!("{}", line);
    Ok(Value::Null)
}

/// `input(prompt)`: read a line, coercing numbers and the literal words.
fn ry_input(argv: &[Value], _globals: &mut Globals) -> Result<Value, String> {
    if let Some(prompt) = argv.first() {
        print!("{}", prompt);
        let _ = std::io::stdout().flush();
    }

    let mut line = String::new();
    match std::io::stdin().read_line(&mut line) {
        Ok(0) | Err(_) => return Ok(Value::Null),
        Ok(_) => {}
    }
    let line = line.trim_end_matches(['\n', '\r']).to_string();

    if let Ok(number) = line.parse::<f64>() {
        return Ok(Value::Number(number));
    }
    Ok(match line.as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        _ => Value::String(line),
    })
}

/// `clock()`: seconds since the epoch, for timing scripts.
fn ry_clock(_argv: &[Value], _globals: &mut Globals) -> Result<Value, String> {
    let seconds = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    Ok(Value::Number(seconds))
}

/// `clear()`: wipe the terminal.
fn ry_clear(_argv: &[Value], _globals: &mut Globals) -> Result<Value, String> {
    print!("\x1b[2J\x1b[1;1H");
    let _ = std::io::stdout().flush();
    Ok(Value::Null)
}

/// `exit(code)`: terminate the process.
fn ry_exit(argv: &[Value], _globals: &mut Globals) -> Result<Value, String> {
    let code = argv.first().and_then(|v| v.as_number()).unwrap_or(0.0) as i32;
    println!("[Ry] Exited Successfully with exit code: {}", code);
    std::process::exit(code);
}

/// `type(v)`: the coarse runtime type tag.
fn ry_type(argv: &[Value], _globals: &mut Globals) -> Result<Value, String> {
    let name = match argv.first() {
        Some(Value::Number(_)) => "number",
        Some(Value::String(_)) => "string",
        Some(Value::Bool(_)) => "bool",
        Some(Value::List(_)) => "list",
        Some(Value::Map(_)) => "map",
        _ => "unknown",
    };
    Ok(Value::String(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_matches_names() {
        let mut globals = Globals::new();
        register(&mut globals);
        for name in names() {
            assert!(
                matches!(globals.get(*name), Some(Value::Native(_))),
                "missing native {}",
                name
            );
        }
    }

    #[test]
    fn type_tags() {
        let mut globals = Globals::new();
        let mut tag = |v: Value| {
            ry_type(&[v], &mut globals)
                .unwrap()
                .to_string()
        };
        assert_eq!(tag(Value::Number(1.0)), "number");
        assert_eq!(tag(Value::Bool(true)), "bool");
        assert_eq!(tag(Value::list(vec![])), "list");
        assert_eq!(tag(Value::Null), "unknown");
    }

    #[test]
    fn list_pop_consumes_from_receiver() {
        let mut globals = Globals::new();
        let list = Value::list(vec![Value::Number(1.0), Value::Number(2.0)]);
        let native = list_pop();
        let result = (native.func)(&[list.clone()], &mut globals).unwrap();
        assert_eq!(result, Value::Number(2.0));
        assert_eq!(list.to_string(), "[1]");

        let err = (native.func)(&[Value::Number(3.0)], &mut globals).unwrap_err();
        assert_eq!(err, "Argument to pop() must be a list.");
    }
}
