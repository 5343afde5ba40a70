//! State of the assembler during a pass.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use miette::SourceSpan;

use crate::error::AssemblyError;
use crate::expression::Value;
use crate::instruction::{InstructionBuilder, InstructionFlags};
use crate::segments::Segments;
use crate::source::AssemblyCode;

/// A line in one of the source files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Location {
	/// Index into the source file list.
	pub file: usize,
	/// One-based line number.
	pub line: usize,
}

/// A source file that takes part in the assembly.
#[derive(Clone, Debug)]
pub struct SourceFile {
	/// Contents.
	pub code:   Arc<AssemblyCode>,
	/// The `.include` that pulled the file in; `None` for files given by the caller.
	pub parent: Option<Location>,
}

/// What opened a scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameKind {
	/// The global scope, which holds `.set` constants.
	Root,
	/// A file given by the caller.
	File,
	/// A file pulled in by `.include`.
	Include,
	/// `.local` ... `.endloc`.
	Block,
	/// Expansion of a macro, `.rep` or `.foreach`.
	Macro,
	/// Evaluation of a function or functional macro.
	Function,
}

/// One entry of the scope stack.
#[derive(Clone, Debug)]
pub struct Frame {
	pub kind:      FrameKind,
	/// The source line currently processed within this scope; `None` only for the root scope. Blocks keep the line
	/// that opened them.
	pub location:  Option<Location>,
	/// Constants, function arguments and macro arguments defined in this scope.
	pub constants: HashMap<String, Value>,
	/// What opened the scope: the invocation, the `.local` or the whole file.
	pub span:      SourceSpan,
}

impl Frame {
	pub fn new(kind: FrameKind, location: Option<Location>, span: SourceSpan) -> Self {
		Self { kind, location, constants: HashMap::new(), span }
	}
}

/// A function defined with `.set name(arguments) body`. The body is re-evaluated at every invocation.
#[derive(Clone, Debug)]
pub struct Function {
	pub arguments:  Vec<String>,
	/// Unparsed expression text.
	pub body:       String,
	/// Byte offset of the body within the defining file.
	pub offset:     usize,
	pub definition: Location,
}

/// One recorded line of a macro body.
#[derive(Clone, Debug)]
pub struct MacroLine {
	pub text:   String,
	/// Byte offset of the line within the defining file.
	pub offset: usize,
	/// Line number within the defining file.
	pub line:   usize,
}

/// A macro, functional macro or loop body.
#[derive(Clone, Debug, Default)]
pub struct Macro {
	pub arguments:  Vec<String>,
	pub lines:      Vec<MacroLine>,
	pub definition: Location,
}

/// What a recording in progress will turn into.
#[derive(Clone, Debug)]
pub enum RecordingKind {
	/// `.macro`, or `.func` if functional.
	Macro { name: String, functional: bool },
	/// `.rep variable, count`.
	Repeat { variable: String, count: usize },
	/// `.foreach variable, values...`.
	ForEach { variable: String, values: Vec<Value> },
}

impl RecordingKind {
	/// The directive that closes the recording.
	pub const fn end_directive(&self) -> &'static str {
		match self {
			Self::Macro { functional: false, .. } => "endm",
			Self::Macro { functional: true, .. } => "endf",
			Self::Repeat { .. } => "endr",
			Self::ForEach { .. } => "endfor",
		}
	}
}

/// A macro or loop body being recorded.
#[derive(Clone, Debug)]
pub struct Recording {
	pub kind:  RecordingKind,
	pub body:  Macro,
	/// Number of loops opened inside the body that are not closed yet.
	pub depth: usize,
}

/// State of an `.if` block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConditionState {
	/// No branch taken yet.
	False,
	/// The current branch is taken.
	True,
	/// An earlier branch was taken, all further ones are skipped.
	Settled,
	/// The whole block is inside a skipped region.
	Disabled,
}

/// An open `.if` block.
#[derive(Clone, Copy, Debug)]
pub struct ConditionBlock {
	pub state: ConditionState,
	/// Index of the innermost file or macro scope at the `.if`.
	pub scope: usize,
	pub line:  usize,
}

/// Where a label was defined or referenced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LabelSite {
	pub location: Location,
	pub span:     SourceSpan,
}

/// A code label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Label {
	pub name:       String,
	/// Byte address.
	pub value:      i64,
	pub definition: Option<LabelSite>,
	/// First reference.
	pub reference:  Option<LabelSite>,
	/// Defined with `::`.
	pub exported:   bool,
}

impl Label {
	pub const fn new(name: String) -> Self {
		Self { name, value: 0, definition: None, reference: None, exported: false }
	}
}

/// State that survives from pass 1 to pass 2.
#[derive(Clone, Debug, Default)]
pub struct CarriedState {
	/// All labels in order of first occurrence; pass 2 visits them in the same order.
	pub labels:         Vec<Label>,
	pub files:          Vec<SourceFile>,
	/// Instruction words of pass 1, for cloning code ahead of the current position in pass 2.
	pub previous_words: Vec<u64>,
}

/// State that is rebuilt by each pass.
#[derive(Debug)]
pub struct PassState {
	pub frames:          Vec<Frame>,
	pub labels_by_name:  HashMap<String, usize>,
	pub label_count:     usize,
	pub globals:         BTreeMap<String, Value>,
	pub functions:       HashMap<String, Function>,
	pub macros:          HashMap<String, Macro>,
	pub function_macros: HashMap<String, Macro>,
	pub recording:       Option<Recording>,
	pub conditions:      Vec<ConditionBlock>,
	pub words:           Vec<u64>,
	/// Indexed by instruction; may run ahead of `words`, e.g. for branch return points.
	pub flags:           Vec<InstructionFlags>,
	pub locations:       Vec<Location>,
	/// Index of the next instruction.
	pub pc:              usize,
	/// Bits of data already written to the word at `pc`.
	pub bit_offset:      u32,
	/// Number of instructions moved back by `.back`.
	pub back:            usize,
	pub segments:        Segments,
	/// Number of files visited in this pass.
	pub files_count:     usize,
	pub builder:         InstructionBuilder,
	/// Diagnostics held back while trying to merge a statement into the previous instruction.
	pub deferred:        Option<Vec<AssemblyError>>,
}

impl Default for PassState {
	fn default() -> Self {
		Self {
			frames:          vec![Frame::new(FrameKind::Root, None, (0, 0).into())],
			labels_by_name:  HashMap::new(),
			label_count:     0,
			globals:         BTreeMap::new(),
			functions:       HashMap::new(),
			macros:          HashMap::new(),
			function_macros: HashMap::new(),
			recording:       None,
			conditions:      Vec::new(),
			words:           Vec::new(),
			flags:           Vec::new(),
			locations:       Vec::new(),
			pc:              0,
			bit_offset:      0,
			back:            0,
			segments:        Segments::default(),
			files_count:     0,
			builder:         InstructionBuilder::new(),
			deferred:        None,
		}
	}
}

impl PassState {
	/// Whether lines are currently skipped by a false condition.
	pub fn is_disabled(&self) -> bool {
		self.conditions.last().is_some_and(|condition| condition.state != ConditionState::True)
	}

	/// Makes sure that the flags of instruction `pc` exist.
	pub fn ensure_flags(&mut self, pc: usize) {
		if self.flags.len() <= pc {
			self.flags.resize(pc + 1, InstructionFlags::empty());
		}
	}

	/// Looks up a constant, innermost scope first.
	pub fn constant(&self, name: &str) -> Option<Value> {
		self.frames.iter().rev().find_map(|frame| frame.constants.get(name).copied())
	}
}
