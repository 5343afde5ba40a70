//! VideoCore IV QPU assembler and disassembler.

use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod assembler;
pub mod change;
pub mod cli;
pub mod disassembler;
pub mod error;
pub mod expression;
pub mod instruction;
pub mod parser;
pub mod segments;
pub mod source;
#[cfg(test)] mod test;

pub use assembler::{AssembledProgram, Assembler};
pub use cli::Frontend;
pub use disassembler::{Disassembler, DisassemblerOptions};
pub use error::{AssemblyError, ErrorKind};
pub use source::{AssemblyCode, FileSystem, MemorySources, SourceProvider};

/// Assembles the given files in order. Diagnostics are reported to `frontend`; the returned error only signals that
/// assembly failed.
///
/// # Errors
/// If a file cannot be read or any error was reported.
pub fn run_assembler(
	frontend: Arc<dyn Frontend>,
	sources: impl SourceProvider + 'static,
	files: &[impl AsRef<Path>],
	include_paths: &[PathBuf],
) -> Result<AssembledProgram, Box<AssemblyError>> {
	let mut assembler = Assembler::new(frontend, sources);
	for path in include_paths {
		assembler.add_include_path(path);
	}
	for file in files {
		assembler.add_file(file)?;
	}
	assembler.finish()
}

/// Assembles a single in-memory source, which is known as `name` in diagnostics and to `.include`.
///
/// # Errors
/// If any error was reported.
pub fn assemble_source(
	frontend: Arc<dyn Frontend>,
	name: &str,
	text: &str,
) -> Result<AssembledProgram, Box<AssemblyError>> {
	run_assembler(frontend, MemorySources::new().with_file(name, text), &[name], &[])
}

/// Formats instruction words as C initializer lines, low half first.
#[must_use]
pub fn pretty_hex(words: &[u64]) -> String {
	let mut string = String::new();
	// Two eight digit halves with prefix and separators per word.
	string.reserve(words.len() * 25);
	for word in words {
		string += &format!("0x{:08x}, 0x{:08x},\n", *word as u32, word >> 32);
	}
	string
}
