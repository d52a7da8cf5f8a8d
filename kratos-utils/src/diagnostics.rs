//! Source-location tracking and the stderr excerpt printer.
use owo_colors::OwoColorize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Lines of context shown around the offending line.
const CODE_RANGE: u32 = 2;
const LINE_WIDTH: usize = 80;

/// A host-side source location recorded on an IR node at build time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLoc {
    pub file: String,
    pub line: u32,
}

impl SourceLoc {
    pub fn new<S: ToString>(file: S, line: u32) -> Self {
        Self {
            file: file.to_string(),
            line,
        }
    }
}

impl std::fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

fn blue_line() -> String {
    "-".repeat(LINE_WIDTH).blue().to_string()
}

/// Print the excerpt for one location: the filename, then the file
/// contents around the recorded line with the offending line highlighted.
/// Locations pointing at files that no longer exist are skipped.
fn print_loc(loc: &SourceLoc) {
    if !Path::new(&loc.file).exists() {
        return;
    }
    let Ok(file) = File::open(&loc.file) else {
        return;
    };
    eprintln!("{}", loc.file);
    eprintln!("{}", blue_line());
    let mut line_count: u32 = 0;
    for line in BufReader::new(file).lines() {
        let Ok(line) = line else { break };
        line_count += 1;
        if line_count == loc.line {
            eprintln!("{}", format!(">{line}").red());
        } else if line_count + CODE_RANGE >= loc.line
            && line_count <= loc.line + CODE_RANGE
        {
            eprintln!("{}", format!(" {line}").green());
        }
    }
    eprintln!("{}", blue_line());
}

/// Render every recorded location for an error to stderr.
pub fn print_source_locs(locs: &[SourceLoc]) {
    for loc in locs {
        print_loc(loc);
    }
}
