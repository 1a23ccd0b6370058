//! The interactive shell.
//!
//! Lines are buffered until the running brace depth returns to zero, so
//! multi-line functions and classes can be typed naturally. One VM lives
//! for the whole session: globals and the module cache carry across
//! submissions.

use std::io::Write;
use std::path::PathBuf;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::report::count_indentation;
use crate::vm::Vm;

const HISTORY_FILE: &str = ".ry_history";

pub struct Repl {
    vm: Vm,
    buffer: String,
    indent_level: i32,
}

impl Repl {
    pub fn new() -> Self {
        Self {
            vm: Vm::new(),
            buffer: String::new(),
            indent_level: 0,
        }
    }

    fn history_path() -> PathBuf {
        match dirs::home_dir() {
            Some(home) => home.join(HISTORY_FILE),
            None => PathBuf::from(HISTORY_FILE),
        }
    }

    pub fn run(&mut self) {
        println!("Ry (Ry's for You) REPL - Bytecode Edition");

        let Ok(mut editor) = DefaultEditor::new() else {
            self.run_basic();
            return;
        };
        let history_path = Self::history_path();
        let _ = editor.load_history(&history_path);

        loop {
            let prompt = self.prompt();
            match editor.readline(&prompt) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        let _ = editor.add_history_entry(line.as_str());
                    }
                    if !self.feed(&line) {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    self.buffer.clear();
                    self.indent_level = 0;
                }
                Err(ReadlineError::Eof) => break,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    break;
                }
            }
        }
        let _ = editor.save_history(&history_path);
    }

    /// Plain-stdin loop for when no terminal is available.
    fn run_basic(&mut self) {
        let stdin = std::io::stdin();
        loop {
            print!("{}", self.prompt());
            let _ = std::io::stdout().flush();

            let mut line = String::new();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim_end_matches(['\n', '\r']);
            if !self.feed(line) {
                break;
            }
        }
    }

    fn prompt(&self) -> String {
        if self.buffer.is_empty() {
            "ry> ".to_string()
        } else {
            format!("{} ", ".".repeat((self.indent_level.max(0) as usize) * 4))
        }
    }

    /// Process one line; returns false when the session should end.
    fn feed(&mut self, line: &str) -> bool {
        match line {
            "quit" => return false,
            "clear" => {
                print!("\x1b[2J\x1b[1;1H");
                let _ = std::io::stdout().flush();
                self.buffer.clear();
                self.indent_level = 0;
                return true;
            }
            _ => {}
        }
        if line == "!!" {
            self.buffer.clear();
            self.indent_level = 0;
            println!("Buffer cleared.");
            return true;
        }
        if line.is_empty() && self.buffer.is_empty() {
            return true;
        }

        self.indent_level += count_indentation(line);
        self.buffer.push_str(line);
        self.buffer.push('\n');

        if self.indent_level <= 0 && !self.buffer.trim().is_empty() {
            let source = std::mem::take(&mut self.buffer);
            self.indent_level = 0;
            crate::interpret(&mut self.vm, &source);
        }
        true
    }
}

impl Default for Repl {
    fn default() -> Self {
        Self::new()
    }
}
