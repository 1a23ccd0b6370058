//! Ry CLI: run a script file or start the REPL.

use std::env;
use std::process;

use ry::repl::Repl;
use ry::vm::Vm;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_usage() {
    eprintln!("Ry (ByteCode Edition) v{}", VERSION);
    eprintln!();
    eprintln!("Usage: ry                 Start the interactive REPL");
    eprintln!("       ry run <script>    Run a script file");
    eprintln!("       ry -v | --version  Print the version");
}

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();

    if args.is_empty() {
        Repl::new().run();
        return;
    }

    match args[0].as_str() {
        "run" if args.len() == 2 => {
            let path = &args[1];
            let source = match std::fs::read_to_string(path) {
                Ok(source) => source,
                Err(_) => {
                    eprintln!("Could not open file: {}", path);
                    process::exit(1);
                }
            };
            let mut vm = Vm::new();
            ry::interpret(&mut vm, &source);
        }
        "-v" | "--version" => {
            println!("Ry (ByteCode Edition) v{}", VERSION);
        }
        _ => print_usage(),
    }
}
