//! Assembler pipeline.
//!
//! The assembler reads source files line by line and builds instruction words on the fly; there is no syntax tree.
//! Labels may be referenced before they are defined, so every source is assembled twice. The first pass discovers the
//! label addresses, the second pass repeats the work with all addresses known, reports diagnostics and produces the
//! final words. Only the label table and the file list survive from the first pass into the second.
#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_possible_wrap)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use miette::SourceSpan;

use crate::cli::Frontend;
use crate::error::{AssemblyError, ErrorKind, TrailEntry, TrailReason};
use crate::expression::Value;
use crate::instruction::optimize::optimize;
use crate::instruction::{Instruction, InstructionFlags};
use crate::parser::lexer::Lexer;
use crate::segments::Segments;
use crate::source::{AssemblyCode, SourceProvider};

mod context;
mod directive;
mod expression;
mod label;
mod macros;
mod statement;
mod table;
#[cfg(test)] mod test;

pub use context::{Label, LabelSite, Location};
use context::{CarriedState, Frame, FrameKind, PassState, SourceFile};
pub use table::{Opcode, opcode, register_named};

/// Result of assembler operations; the error is boxed as it is comparatively large.
pub type Result<T = ()> = std::result::Result<T, Box<AssemblyError>>;

/// The two-pass assembler. Add the source files in order with [`Assembler::add_file`], then run the second pass and
/// collect the result with [`Assembler::finish`].
#[derive(Debug)]
pub struct Assembler {
	frontend:      Arc<dyn Frontend>,
	sources:       Box<dyn SourceProvider>,
	include_paths: Vec<PathBuf>,
	carried:       CarriedState,
	pass:          PassState,
	pass2:         bool,
	/// Whether no error has been reported so far.
	success:       bool,
}

impl Assembler {
	/// Creates an assembler that reads its sources through `sources` and reports diagnostics to `frontend`.
	#[must_use]
	pub fn new(frontend: Arc<dyn Frontend>, sources: impl SourceProvider + 'static) -> Self {
		Self {
			frontend,
			sources: Box::new(sources),
			include_paths: Vec::new(),
			carried: CarriedState::default(),
			pass: PassState::default(),
			pass2: false,
			success: true,
		}
	}

	/// Adds a directory that `.include <file>` searches before the directory of the including file.
	pub fn add_include_path(&mut self, path: impl Into<PathBuf>) {
		self.include_paths.push(path.into());
	}

	/// Runs the first pass over a source file. Errors within the file are reported to the frontend and make
	/// [`Assembler::finish`] fail.
	///
	/// # Errors
	/// If the file cannot be read.
	pub fn add_file(&mut self, path: impl AsRef<Path>) -> Result {
		let path = path.as_ref();
		let text = self.sources.read(path).map_err(|_| {
			self.success = false;
			Box::new(AssemblyError::new(
				ErrorKind::FileNotFound { name: path.display().to_string() },
				Arc::new(AssemblyCode::new_from_path("", path)),
				(0, 0).into(),
			))
		})?;
		let name = self.sources.canonical_name(path);
		let mut code = AssemblyCode::new_from_path(&text, &name);
		code.include_path.clone_from(&self.include_paths);
		self.carried.files.push(SourceFile { code: Arc::new(code), parent: None });
		let index = self.carried.files.len() - 1;
		self.pass.files_count = self.carried.files.len();
		log::debug!("Assembling {}", name.display());
		self.parse_root(index);
		Ok(())
	}

	/// Runs the second pass and returns the assembled program.
	///
	/// # Errors
	/// If any error was reported during assembly.
	pub fn finish(mut self) -> Result<AssembledProgram> {
		if self.success {
			self.second_pass();
		}
		if !self.success {
			return Err(self.error_in(0, ErrorKind::AssemblyFailed, (0, 0).into()));
		}

		let pass = std::mem::take(&mut self.pass);
		let mut flags = pass.flags;
		flags.resize(pass.words.len(), InstructionFlags::empty());
		Ok(AssembledProgram {
			words: pass.words,
			flags,
			locations: pass.locations,
			segments: pass.segments,
			files: self.carried.files.into_iter().map(|file| file.code).collect(),
			labels: self.carried.labels,
			globals: pass.globals,
		})
	}

	fn second_pass(&mut self) {
		log::debug!(
			"Pass 1 finished with {} instructions, {} labels and {} files",
			self.pass.words.len(),
			self.carried.labels.len(),
			self.carried.files.len()
		);
		self.carried.previous_words = std::mem::take(&mut self.pass.words);
		self.pass = PassState::default();
		self.pass2 = true;
		self.check_labels();

		while self.pass.files_count < self.carried.files.len() {
			let index = self.pass.files_count;
			if self.carried.files[index].parent.is_some() {
				let error = self.error_in(index, ErrorKind::InconsistentPass("include files"), (0, 0).into());
				self.emit(*error);
				return;
			}
			self.pass.files_count += 1;
			self.parse_root(index);
		}

		self.canonicalize();
		let flags = &self.pass.flags;
		let is_data = (0 .. self.pass.words.len())
			.map(|pc| flags.get(pc).is_some_and(|flags| flags.contains(InstructionFlags::DATA)));
		self.pass.segments.detect_code(is_data);
		log::debug!("Pass 2 finished with {} instructions", self.pass.words.len());
	}

	/// Reports undefined and unused labels and prepares the label table for pass 2.
	fn check_labels(&mut self) {
		let mut labels = std::mem::take(&mut self.carried.labels);
		for label in &labels {
			match (label.definition, label.reference) {
				(None, Some(reference)) => {
					let error = self.error_in(
						reference.location.file,
						ErrorKind::UndefinedLabel {
							name:      label.name.clone(),
							reference: self.describe(reference.location),
						},
						reference.span,
					);
					self.emit(*error);
				},
				(Some(definition), None) if !label.exported => {
					let error = self.error_in(
						definition.location.file,
						ErrorKind::UnusedLabel { name: label.name.clone() },
						definition.span,
					);
					self.emit(*error);
				},
				_ => {},
			}
		}
		for label in &mut labels {
			label.definition = None;
		}
		self.carried.labels = labels;
	}

	fn canonicalize(&mut self) {
		for (pc, word) in self.pass.words.iter_mut().enumerate() {
			if self.pass.flags.get(pc).is_some_and(|flags| flags.contains(InstructionFlags::DATA)) {
				continue;
			}
			let mut instruction = Instruction::decode(*word);
			if optimize(&mut instruction).is_modified() {
				let optimized = instruction.encode();
				log::trace!("Canonicalized instruction {pc}: {word:016x} -> {optimized:016x}");
				*word = optimized;
			}
		}
	}

	//#region Scopes and files

	fn parse_root(&mut self, index: usize) {
		let frame = Frame::new(FrameKind::File, Some(Location { file: index, line: 0 }), (0, 0).into());
		if let Err(error) = self.with_frame(frame, |this| this.parse_file(index)) {
			self.emit(*error);
		}
	}

	/// Runs `body` within a new scope. The scope and any blocks left open by `body` are closed afterwards.
	fn with_frame<T>(&mut self, frame: Frame, body: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
		let depth = self.pass.frames.len();
		let maximum = self.frontend.maximum_macro_expansion_depth();
		if depth > maximum {
			return Err(self.error(ErrorKind::RecursiveMacro { depth: maximum }, frame.span));
		}
		self.pass.frames.push(frame);
		let result = body(self);

		let unterminated = self
			.pass
			.frames
			.iter()
			.skip(depth + 1)
			.rfind(|frame| frame.kind == FrameKind::Block)
			.map(|frame| (frame.location.unwrap_or_default(), frame.span));
		let unterminated = unterminated.map(|(location, span)| {
			self.error_in(location.file, ErrorKind::UnterminatedBlock { line: location.line }, span)
		});
		self.pass.frames.truncate(depth);
		match (result, unterminated) {
			(Err(error), _) | (Ok(_), Some(error)) => Err(error),
			(Ok(value), None) => Ok(value),
		}
	}

	/// Parses all lines of a file within the current scope.
	fn parse_file(&mut self, index: usize) -> Result {
		let code = self.carried.files[index].code.clone();
		let frame = self.pass.frames.len() - 1;
		let conditions = self.pass.conditions.len();
		let recording = self.pass.recording.is_some();

		for (number, (offset, text)) in code.lines().enumerate() {
			self.set_line(frame, number + 1);
			let mut lexer = Lexer::new(text, offset);
			self.run_line(&mut lexer)?;
		}

		let end = SourceSpan::from((code.text.len(), 0));
		if !recording && let Some(open) = self.pass.recording.take() {
			return Err(self.error(ErrorKind::UnterminatedBlock { line: open.body.definition.line }, end));
		}
		if let Some(open) = self.pass.conditions.get(conditions) {
			let line = open.line;
			self.pass.conditions.truncate(conditions);
			return Err(self.error(ErrorKind::UnterminatedIf { line }, end));
		}
		Ok(())
	}

	/// Parses one line, reporting recoverable errors. Only fatal errors are returned.
	fn run_line(&mut self, lexer: &mut Lexer) -> Result {
		if let Err(error) = self.parse_line(lexer) {
			if error.kind.is_fatal() {
				return Err(error);
			}
			self.report(error);
		}
		Ok(())
	}

	fn set_line(&mut self, frame: usize, line: usize) {
		if let Some(location) = self.pass.frames.get_mut(frame).and_then(|frame| frame.location.as_mut()) {
			location.line = line;
		}
	}

	/// The innermost location that is not a block, i.e. the line currently being processed.
	fn innermost_location(frames: &[Frame]) -> Option<Location> {
		frames.iter().rev().filter(|frame| frame.kind != FrameKind::Block).find_map(|frame| frame.location)
	}

	/// The line currently being processed.
	fn location(&self) -> Location {
		Self::innermost_location(&self.pass.frames).unwrap_or_default()
	}

	/// Index of the innermost file or macro scope, which `.if` blocks must not leave.
	fn condition_scope(&self) -> usize {
		self.pass.frames.iter().rposition(|frame| frame.kind != FrameKind::Block).unwrap_or_default()
	}

	/// Human-readable form of a location, as used in messages.
	fn describe(&self, location: Location) -> String {
		let name = self.carried.files.get(location.file).map(|file| file.code.file_name());
		format!("{} ({})", name.as_deref().unwrap_or("<unknown>"), location.line)
	}

	//#endregion
	//#region Diagnostics

	/// Creates an error located in the line currently being processed.
	fn error(&self, kind: impl Into<ErrorKind>, span: SourceSpan) -> Box<AssemblyError> {
		self.error_in(self.location().file, kind, span)
	}

	fn error_in(&self, file: usize, kind: impl Into<ErrorKind>, span: SourceSpan) -> Box<AssemblyError> {
		let src = self.carried.files.get(file).map_or_else(Arc::default, |file| file.code.clone());
		let mut error = AssemblyError::new(kind, src, span);
		error.trail = self.trail();
		Box::new(error)
	}

	/// The invocations that led to the current line, innermost first.
	fn trail(&self) -> Vec<TrailEntry> {
		let frames = &self.pass.frames;
		frames
			.iter()
			.enumerate()
			.rev()
			.filter_map(|(index, frame)| {
				let reason = match frame.kind {
					FrameKind::Include => TrailReason::Include,
					FrameKind::Macro => TrailReason::Macro,
					FrameKind::Function => TrailReason::Function,
					FrameKind::Root | FrameKind::File | FrameKind::Block => return None,
				};
				let site = Self::innermost_location(&frames[.. index])?;
				let file = self.carried.files.get(site.file)?.code.name.clone();
				Some(TrailEntry { reason, file, line: site.line })
			})
			.collect()
	}

	/// Reports a diagnostic that depends on the final label values; these are only emitted in pass 2.
	fn message(&mut self, kind: impl Into<ErrorKind>, span: SourceSpan) {
		if self.pass2 {
			let error = self.error(kind, span);
			self.report(error);
		}
	}

	/// Reports a diagnostic, or holds it back while trying to merge statements.
	fn report(&mut self, error: Box<AssemblyError>) {
		if let Some(deferred) = &mut self.pass.deferred {
			deferred.push(*error);
		} else {
			self.emit(*error);
		}
	}

	fn emit(&mut self, error: AssemblyError) {
		if error.is_error() || self.frontend.is_error(&error) {
			self.success = false;
		}
		self.frontend.report_diagnostic(error);
	}

	//#endregion
}

/// The result of a successful assembly.
#[derive(Clone, Debug)]
pub struct AssembledProgram {
	/// Instruction words.
	pub words:     Vec<u64>,
	/// Metadata of each instruction word.
	pub flags:     Vec<InstructionFlags>,
	/// Source line of each instruction word.
	pub locations: Vec<Location>,
	/// Classification into code and data.
	pub segments:  Segments,
	/// All source files in order of first use; [`Location::file`] indexes into this list.
	pub files:     Vec<Arc<AssemblyCode>>,
	/// All labels in order of first occurrence.
	pub labels:    Vec<Label>,
	/// Symbols declared with `.global`.
	pub globals:   BTreeMap<String, Value>,
}

impl AssembledProgram {
	/// The exported symbol table: values of `.global` symbols and of labels defined with `::`, in bytes.
	#[must_use]
	pub fn symbols(&self) -> BTreeMap<String, i64> {
		let exported = self
			.labels
			.iter()
			.filter(|label| label.exported && label.definition.is_some())
			.map(|label| (label.name.clone(), label.value));
		let globals = self.globals.iter().filter_map(|(name, value)| match *value {
			Value::Integer(value) | Value::Label(value) => Some((name.clone(), value)),
			_ => None,
		});
		exported.chain(globals).collect()
	}

	/// Value of a defined label by name. For redefined numeric labels, this is the last definition.
	#[must_use]
	pub fn label_value(&self, name: &str) -> Option<i64> {
		self.labels
			.iter()
			.rev()
			.find(|label| label.name == name && label.definition.is_some())
			.map(|label| label.value)
	}

	/// Names of the labels that point into the instruction word at `pc`.
	#[must_use]
	pub fn labels_for_instruction(&self, pc: usize, exported_only: bool) -> Vec<&str> {
		self.labels
			.iter()
			.filter(|label| {
				label.definition.is_some() && label.value >= 0 && label.value as usize / 8 == pc
					&& (!exported_only || label.exported)
			})
			.map(|label| label.name.as_str())
			.collect()
	}

	/// All labels by instruction address in bytes, as expected by the disassembler.
	#[must_use]
	pub fn label_map(&self, exported_only: bool) -> BTreeMap<u32, String> {
		self.labels
			.iter()
			.filter(|label| label.definition.is_some() && (!exported_only || label.exported))
			.map(|label| ((label.value as u32) & !7, label.name.clone()))
			.collect()
	}

	/// The source text of the statement that produced the instruction at `pc`, without comment.
	#[must_use]
	pub fn source_line(&self, pc: usize) -> Option<&str> {
		let location = self.locations.get(pc)?;
		let file = self.files.get(location.file)?;
		let line = file.text.as_str().split('\n').nth(location.line.checked_sub(1)?)?;
		Some(line.split('#').next().unwrap_or_default().trim())
	}

	/// The instruction words as little-endian bytes.
	#[must_use]
	pub fn to_bytes(&self) -> Vec<u8> {
		self.words.iter().flat_map(|word| word.to_le_bytes()).collect()
	}
}
