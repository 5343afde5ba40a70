//! Source code infrastructure for error reporting and file access.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use flexstr::{SharedStr, ToSharedStr};
use miette::{MietteError, MietteSpanContents, SourceCode, SourceSpan, SpanContents};

/// The source code of one assembly file.
#[derive(Debug, Clone, Default)]
pub struct AssemblyCode {
	/// The text content of the assembly code.
	pub text:         SharedStr,
	/// The source code location; canonicalized for files read from disk.
	pub name:         PathBuf,
	/// The include path of the file.
	pub include_path: Vec<PathBuf>,
}

impl AssemblyCode {
	/// Create a new source code struct from source code text and a (possibly fake) name.
	#[must_use]
	pub fn new(text: &str, name: &str) -> Self {
		Self::new_from_path(text, Path::new(name))
	}

	/// Create a new source code struct from source code text and a file system path.
	#[must_use]
	pub fn new_from_path(text: &str, name: &Path) -> Self {
		Self {
			text:         text.chars().filter(|c| c != &'\r').collect::<String>().to_shared_str(),
			name:         name.to_owned(),
			include_path: Vec::new(),
		}
	}

	/// Returns a pretty-printed variant of the file name of this source code.
	#[must_use]
	pub fn file_name(&self) -> SharedStr {
		Self::file_name_for(&self.name)
	}

	/// Returns a pretty-printed variant of the given path.
	///
	/// The pretty-printing rules are as follows:
	/// - If the file is relative to the working directory, print a relative file name without leading `./`.
	/// - If the file is not relative, i.e. its canonical path does not contain the working directory, print an absolute
	///   file name. On Windows, extended path length syntax (`\\?\`) is omitted.
	#[must_use]
	pub fn file_name_for(path: &Path) -> SharedStr {
		let relative = uniform_canonicalize(Path::new("."))
			.ok()
			.and_then(|cwd| path.strip_prefix(cwd).ok().map(Path::to_path_buf));
		relative.as_deref().unwrap_or(path).to_string_lossy().to_shared_str()
	}

	/// The lines of the text with the byte offset at which each of them starts.
	pub fn lines(&self) -> impl Iterator<Item = (usize, &str)> {
		let text = self.text.as_str();
		text.split('\n').scan(0, |offset, line| {
			let start = *offset;
			*offset += line.len() + 1;
			Some((start, line))
		})
	}
}

/// Implements a more uniform canonicalization. The main difference to ``std::fs::canonicalize`` is that it doesn't
/// create the extended length path syntax on Windows. This is for better compatibility with file link-supporting
/// terminals.
#[cfg(windows)]
#[inline]
pub fn uniform_canonicalize(path: &Path) -> std::io::Result<PathBuf> {
	// Extended length paths start with the four characters '\\?\'.
	Ok(PathBuf::from(path.canonicalize()?.into_os_string().to_string_lossy()[4 ..].to_owned()))
}

/// Implements a more uniform canonicalization. The main difference to ``std::fs::canonicalize`` is that it doesn't
/// create the extended length syntax on Windows.
#[cfg(not(windows))]
#[inline]
pub fn uniform_canonicalize(path: &Path) -> std::io::Result<PathBuf> {
	path.canonicalize()
}

impl SourceCode for AssemblyCode {
	fn read_span<'a>(
		&'a self,
		span: &SourceSpan,
		context_lines_before: usize,
		context_lines_after: usize,
	) -> Result<Box<dyn SpanContents<'a> + 'a>, MietteError> {
		let result = self.text.as_str().read_span(span, context_lines_before, context_lines_after)?;
		Ok(Box::new(MietteSpanContents::new_named(
			self.file_name().as_str().to_owned(),
			result.data(),
			*result.span(),
			result.line(),
			result.column(),
			result.line_count(),
		)))
	}
}

/// Access to the contents of source files. The assembler never touches the file system directly, so that sources can
/// come from memory as well.
pub trait SourceProvider: std::fmt::Debug {
	/// Reads the complete text of a file.
	///
	/// # Errors
	/// If the file cannot be read.
	fn read(&self, path: &Path) -> std::io::Result<String>;

	/// Whether the file exists; used to search include paths.
	fn exists(&self, path: &Path) -> bool;

	/// The name under which a found file is recorded. Files on disk are canonicalized, so that the same file reached
	/// through different paths is recognized.
	fn canonical_name(&self, path: &Path) -> PathBuf {
		path.to_owned()
	}
}

/// Reads sources from the file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSystem;

impl SourceProvider for FileSystem {
	fn read(&self, path: &Path) -> std::io::Result<String> {
		std::fs::read_to_string(path)
	}

	fn exists(&self, path: &Path) -> bool {
		path.is_file()
	}

	fn canonical_name(&self, path: &Path) -> PathBuf {
		uniform_canonicalize(path).unwrap_or_else(|_| path.to_owned())
	}
}

/// Sources held in memory, keyed by path.
#[derive(Debug, Clone, Default)]
pub struct MemorySources {
	files: HashMap<PathBuf, String>,
}

impl MemorySources {
	/// Creates an empty set of sources.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a file, builder-style.
	#[must_use]
	pub fn with_file(mut self, path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
		self.insert(path, text);
		self
	}

	/// Adds or replaces a file.
	pub fn insert(&mut self, path: impl Into<PathBuf>, text: impl Into<String>) {
		self.files.insert(path.into(), text.into());
	}
}

impl SourceProvider for MemorySources {
	fn read(&self, path: &Path) -> std::io::Result<String> {
		self.files
			.get(path)
			.cloned()
			.ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, path.display().to_string()))
	}

	fn exists(&self, path: &Path) -> bool {
		self.files.contains_key(path)
	}
}
