//! Command-line interface related structures and the diagnostics frontend.

use std::fmt::Debug;
use std::str::FromStr;

#[cfg(feature = "binaries")] use clap::Args;
use parking_lot::{Mutex, RwLock};

use crate::error::AssemblyError;

/// Default limit of nested macro, function and include expansions.
pub const DEFAULT_MAXIMUM_EXPANSION_DEPTH: usize = 256;

/// Interface between the assembler and its caller, which decides how diagnostics are presented and which of them are
/// fatal.
pub trait Frontend: Debug + Send + Sync {
	/// Whether the given diagnostic is to be treated as an error, even if it is only a warning.
	fn is_error(&self, diagnostic: &AssemblyError) -> bool;

	/// Whether the given warning or advice is to be silenced.
	fn is_ignored(&self, diagnostic: &AssemblyError) -> bool;

	/// Maximum nesting depth of macro, function and include expansions.
	fn maximum_macro_expansion_depth(&self) -> usize;

	/// Receives a diagnostic that is to be reported.
	fn report_diagnostic_impl(&self, diagnostic: AssemblyError);

	/// Reports a diagnostic unless it is ignored. Errors are never ignored.
	fn report_diagnostic(&self, diagnostic: AssemblyError) {
		if diagnostic.is_error() || self.is_error(&diagnostic) || !self.is_ignored(&diagnostic) {
			self.report_diagnostic_impl(diagnostic);
		}
	}
}

/// A diagnostic code given on the command line, e.g. `qpuasm::unused_label` or just `unused_label`. The special code
/// `all` matches every diagnostic.
#[derive(Debug, Clone, Eq, PartialEq)]
#[repr(transparent)]
pub struct ErrorCodeSpec(String);

const error_prefix: &str = "qpuasm::";
const all_marker: &str = "all";

impl ErrorCodeSpec {
	/// Whether the diagnostic has this code.
	#[must_use]
	pub fn matches(&self, diagnostic: &AssemblyError) -> bool {
		self.0 == all_marker || diagnostic.code_name() == self.0
	}
}

impl FromStr for ErrorCodeSpec {
	type Err = String;

	fn from_str(string_code: &str) -> Result<Self, Self::Err> {
		let code = string_code.trim();
		if code.is_empty() || code.contains(char::is_whitespace) {
			return Err("invalid error code".to_owned());
		}
		// If the user provided an error code not starting with qpuasm:: (very reasonable), add the prefix.
		if code == all_marker || code.starts_with(error_prefix) {
			Ok(Self(code.to_owned()))
		} else {
			Ok(Self(format!("{error_prefix}{code}")))
		}
	}
}

/// Specification of which diagnostics to silence and which to turn into errors.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
#[cfg_attr(feature = "binaries", derive(Args))]
pub struct ErrorOptions {
	/// Warnings to silence; `all` silences every warning.
	#[cfg_attr(feature = "binaries", arg(value_parser, long, short = 'w'))]
	pub ignore: Vec<ErrorCodeSpec>,
	/// Warnings to turn into a hard error; `all` promotes every warning.
	#[cfg_attr(feature = "binaries", arg(value_parser, long, short = 'W'))]
	pub error:  Vec<ErrorCodeSpec>,
}

impl ErrorOptions {
	fn is_error(&self, diagnostic: &AssemblyError) -> bool {
		self.error.iter().any(|spec| spec.matches(diagnostic))
	}

	fn is_ignored(&self, diagnostic: &AssemblyError) -> bool {
		self.ignore.iter().any(|spec| spec.matches(diagnostic))
	}
}

/// Frontend of the command-line assembler, printing diagnostics to standard error.
#[derive(Debug, Default)]
pub struct CliFrontend {
	/// Diagnostic promotion and silencing.
	pub options:                 ErrorOptions,
	/// Maximum nesting depth of expansions.
	pub maximum_expansion_depth: usize,
	had_error:                   RwLock<bool>,
}

impl CliFrontend {
	/// Creates a frontend with the given options.
	#[must_use]
	pub const fn new(options: ErrorOptions, maximum_expansion_depth: usize) -> Self {
		Self { options, maximum_expansion_depth, had_error: RwLock::new(false) }
	}

	/// Whether any reported diagnostic was an error.
	#[must_use]
	pub fn had_error(&self) -> bool {
		*self.had_error.read()
	}
}

impl Frontend for CliFrontend {
	fn is_error(&self, diagnostic: &AssemblyError) -> bool {
		self.options.is_error(diagnostic)
	}

	fn is_ignored(&self, diagnostic: &AssemblyError) -> bool {
		self.options.is_ignored(diagnostic)
	}

	fn maximum_macro_expansion_depth(&self) -> usize {
		self.maximum_expansion_depth
	}

	fn report_diagnostic_impl(&self, diagnostic: AssemblyError) {
		if diagnostic.is_error() || self.is_error(&diagnostic) {
			*self.had_error.write() = true;
		}
		eprintln!("{:?}", miette::Report::new(diagnostic));
	}
}

/// Frontend that collects all diagnostics, for library users and tests.
#[derive(Debug)]
pub struct CollectingFrontend {
	/// Diagnostic promotion and silencing.
	pub options:                 ErrorOptions,
	/// Maximum nesting depth of expansions.
	pub maximum_expansion_depth: usize,
	/// Everything reported so far.
	pub collected_diagnostics:   Mutex<Vec<AssemblyError>>,
}

impl Default for CollectingFrontend {
	fn default() -> Self {
		Self {
			options:                 ErrorOptions::default(),
			maximum_expansion_depth: DEFAULT_MAXIMUM_EXPANSION_DEPTH,
			collected_diagnostics:   Mutex::new(Vec::new()),
		}
	}
}

impl CollectingFrontend {
	/// Removes and returns the collected diagnostics.
	pub fn take(&self) -> Vec<AssemblyError> {
		std::mem::take(&mut *self.collected_diagnostics.lock())
	}

	/// Codes of the collected diagnostics, in order of reporting.
	#[must_use]
	pub fn codes(&self) -> Vec<String> {
		self.collected_diagnostics.lock().iter().map(AssemblyError::code_name).collect()
	}
}

impl Frontend for CollectingFrontend {
	fn is_error(&self, diagnostic: &AssemblyError) -> bool {
		self.options.is_error(diagnostic)
	}

	fn is_ignored(&self, diagnostic: &AssemblyError) -> bool {
		self.options.is_ignored(diagnostic)
	}

	fn maximum_macro_expansion_depth(&self) -> usize {
		self.maximum_expansion_depth
	}

	fn report_diagnostic_impl(&self, diagnostic: AssemblyError) {
		self.collected_diagnostics.lock().push(diagnostic);
	}
}

#[cfg(feature = "binaries")]
mod clap_dependent {
	use std::path::PathBuf;

	use clap::{ArgAction, Parser, ValueEnum};

	use super::{DEFAULT_MAXIMUM_EXPANSION_DEPTH, ErrorOptions};

	/// VideoCore IV QPU assembler.
	#[derive(Parser, Debug)]
	#[command(author, version, about, long_about = None)]
	pub struct QpuasmCli {
		/// Assembly files to assemble, in order.
		#[arg(value_parser, required = true)]
		pub inputs:                  Vec<PathBuf>,
		/// Output file; standard output if not given.
		#[arg(value_parser, long, short = 'o')]
		pub output:                  Option<PathBuf>,
		/// Directories searched by `.include <file>`.
		#[arg(value_parser, long = "include", short = 'I')]
		pub include_paths:           Vec<PathBuf>,
		#[command(flatten)]
		pub warning_flags:           ErrorOptions,
		/// Format to output to.
		///
		/// - plain: The instruction words as little-endian binary.
		///
		/// - hex: One instruction word per line as a C initializer.
		///
		/// - listing: Disassembly of the result with source lines.
		#[arg(value_parser, default_value = "plain", long, short = 'f')]
		pub output_format:           OutputFormat,
		/// Print the exported symbols after assembling.
		#[arg(long, short = 's')]
		pub symbols:                 bool,
		/// Maximum nesting depth of macro, function and include expansions.
		#[arg(long, default_value_t = DEFAULT_MAXIMUM_EXPANSION_DEPTH)]
		pub maximum_expansion_depth: usize,
		/// Increase log verbosity; may be repeated.
		#[arg(long, short = 'v', action = ArgAction::Count)]
		pub verbose:                 u8,
	}

	/// Output formats of the assembler.
	#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
	#[repr(u8)]
	pub enum OutputFormat {
		/// Binary instruction words.
		Plain,
		/// Hexadecimal instruction words.
		Hex,
		/// Disassembly listing.
		Listing,
	}

	/// VideoCore IV QPU disassembler.
	#[derive(Parser, Debug)]
	#[command(author, version, about, long_about = None)]
	pub struct QpudisCli {
		/// Binary file of little-endian instruction words.
		#[arg(value_parser)]
		pub input:       PathBuf,
		/// Output file; standard output if not given.
		#[arg(value_parser, long, short = 'o')]
		pub output:      Option<PathBuf>,
		/// Byte address of the first instruction.
		#[arg(long, short = 'b', default_value_t = 0, value_parser = parse_address)]
		pub base:        u32,
		/// Never render register copies and constants as `mov`.
		#[arg(long)]
		pub no_mov:      bool,
		/// Render immediates that look like floats as floats.
		#[arg(long = "float", short = 'F')]
		pub use_float:   bool,
		/// Omit the field breakdown from the comment column.
		#[arg(long)]
		pub no_fields:   bool,
		/// Omit the comment column entirely.
		#[arg(long)]
		pub no_comment:  bool,
		/// Increase log verbosity; may be repeated.
		#[arg(long, short = 'v', action = ArgAction::Count)]
		pub verbose:     u8,
	}

	fn parse_address(text: &str) -> Result<u32, String> {
		let (value, length) = crate::parser::lexer::parse_int(text);
		if length != text.len() || text.is_empty() {
			return Err(format!("`{text}` is no valid address"));
		}
		u32::try_from(value).map_err(|_| format!("`{text}` is out of range"))
	}

	/// Log level for a repeated `-v` count.
	#[must_use]
	pub const fn log_level(verbose: u8) -> log::LevelFilter {
		match verbose {
			0 => log::LevelFilter::Warn,
			1 => log::LevelFilter::Info,
			2 => log::LevelFilter::Debug,
			_ => log::LevelFilter::Trace,
		}
	}
}

#[cfg(feature = "binaries")]
pub use clap_dependent::*;
