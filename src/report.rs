//! Diagnostic reporting and small source-text utilities shared by the
//! compiler, the VM, and the REPL.

/// Print a single diagnostic with a source excerpt and a caret under the
/// offending column.
pub fn report(line: usize, column: usize, location: &str, message: &str, source: &str) {
    eprintln!("[line {}:{}] Error{}: {}", line, column, location, message);

    if let Some(text) = source.lines().nth(line.saturating_sub(1)) {
        eprintln!("    {}", text);
        eprintln!("    {}^", " ".repeat(column.saturating_sub(1)));
    }
}

/// Net change in brace depth contributed by one line of source.
///
/// Braces inside string literals and `#` comments do not count. The REPL uses
/// the running total to decide when a multi-line form is complete.
pub fn count_indentation(line: &str) -> i32 {
    let mut depth = 0;
    let mut in_string = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => in_string = !in_string,
            '\\' if in_string => {
                chars.next();
            }
            '#' if !in_string => break,
            '{' if !in_string => depth += 1,
            '}' if !in_string => depth -= 1,
            _ => {}
        }
    }
    depth
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_braces() {
        assert_eq!(count_indentation("func f() {"), 1);
        assert_eq!(count_indentation("}"), -1);
        assert_eq!(count_indentation("if x { out(1) } else {"), 1);
    }

    #[test]
    fn ignores_strings_and_comments() {
        assert_eq!(count_indentation("out(\"{\")"), 0);
        assert_eq!(count_indentation("var x = 1 # { comment"), 0);
        assert_eq!(count_indentation("out(\"\\\"{\")"), 0);
    }
}
