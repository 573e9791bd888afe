//! Wires `StdoutHost` to an `ejs::Engine` and either runs a file argument or
//! drops into a line-buffered REPL, mirroring `ouros-repl`'s bin.rs shape
//! (file-path-or-interactive dispatch, a `needs_more_input` brace-balance
//! heuristic, a `read_line` prompt helper) without its snapshot/resume
//! machinery, which this interpreter has no equivalent of.

use std::{
    io::{self, Write},
    process::ExitCode,
};

use ejs::{Engine, EngineConfig, StdoutHost};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let mut engine = Engine::new(EngineConfig::default(), StdoutHost::new());

    if args.len() > 1 {
        let path = &args[1];
        let source = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Error reading {path}: {e}");
                return ExitCode::FAILURE;
            }
        };
        return match engine.exec(&source) {
            Ok(_) => ExitCode::SUCCESS,
            Err(exc) => {
                eprintln!("{exc}");
                ExitCode::FAILURE
            }
        };
    }

    run_repl(&mut engine)
}

fn run_repl(engine: &mut Engine) -> ExitCode {
    let mut source = String::new();
    loop {
        let prompt = if source.is_empty() { "> " } else { "... " };
        let Some(line) = read_line(prompt) else {
            println!();
            break;
        };

        if source.is_empty() && line.trim().is_empty() {
            continue;
        }

        if !source.is_empty() {
            source.push('\n');
        }
        source.push_str(&line);

        if needs_more_input(&source) {
            continue;
        }

        match engine.exec(&source) {
            Ok(value) if !value.is_undefined() => {
                let text = engine.as_string_bytes(value);
                println!("{}", String::from_utf8_lossy(&text));
                engine.unlock(value);
            }
            Ok(value) => engine.unlock(value),
            Err(exc) => eprintln!("{exc}"),
        }
        source.clear();
    }
    ExitCode::SUCCESS
}

/// Heuristic multiline detector: more input is needed while brackets are
/// unbalanced or the line ends with a continuation backslash. Good enough
/// for an interactive prompt; not a real tokenizer lookahead.
fn needs_more_input(source: &str) -> bool {
    let trimmed = source.trim_end();
    if trimmed.ends_with('\\') {
        return true;
    }
    let mut balance = 0i32;
    let mut in_string: Option<char> = None;
    let mut escaped = false;
    for ch in trimmed.chars() {
        if let Some(quote) = in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == quote {
                in_string = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' | '`' => in_string = Some(ch),
            '(' | '[' | '{' => balance += 1,
            ')' | ']' | '}' => balance -= 1,
            _ => {}
        }
    }
    balance > 0 || in_string.is_some()
}

/// Reads one line from stdin after printing a prompt. Returns `None` on EOF
/// (Ctrl+D).
fn read_line(prompt: &str) -> Option<String> {
    print!("{prompt}");
    if io::stdout().flush().is_err() {
        return None;
    }
    let mut input = String::new();
    let read = io::stdin().read_line(&mut input).ok()?;
    if read == 0 {
        return None;
    }
    Some(input.trim_end_matches(['\r', '\n']).to_owned())
}
