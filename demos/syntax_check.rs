//! Check CIF files for syntax errors.
//!
//! ```text
//! cargo run --example syntax_check -- file.cif [more.cif ...]
//! ```
//!
//! Parses each file leniently, printing every recoverable error with
//! its position; exits nonzero if any file had errors or failed
//! outright.

use std::fs::File;
use std::process::ExitCode;

use cif_stream::{parse, Builder, ParseOptions, SyntaxError};

struct Discard;

impl Builder for Discard {}

fn check(path: &str) -> Result<usize, cif_stream::CifError> {
    let file = File::open(path)?;
    let mut errors: Vec<SyntaxError> = Vec::new();
    parse(file, &ParseOptions::default(), &mut Discard, &mut errors)?;
    for error in &errors {
        println!("{path}:{}:{}: {}", error.line, error.column, error.code);
    }
    Ok(errors.len())
}

fn main() -> ExitCode {
    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        eprintln!("usage: syntax_check <file.cif>...");
        return ExitCode::FAILURE;
    }
    let mut failures = 0usize;
    for path in &paths {
        match check(path) {
            Ok(0) => println!("{path}: ok"),
            Ok(n) => {
                println!("{path}: {n} error(s)");
                failures += 1;
            }
            Err(err) => {
                eprintln!("{path}: {err}");
                failures += 1;
            }
        }
    }
    if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
