//! Assembler lookup tables.
//!
//! This module provides the ``register_table``, ``opcode_table``, ``extension_table`` and ``directive_table`` data
//! structures, which map source words to what they stand for.

use std::collections::HashMap;
use std::sync::LazyLock;

use bitflags::bitflags;
use num_traits::FromPrimitive;

use crate::expression::{RegisterCapabilities, RegisterDescriptor};
use crate::instruction::{AddOp, BranchCondition, Condition, LoadMode, MulOp, Pack, Signal, Unpack};
use crate::segments::SegmentKind;

/// What an opcode mnemonic assembles to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
	/// An ADD ALU operation; operations that also exist in the MUL ALU may move there.
	Add(AddOp),
	/// A MUL ALU operation.
	Mul(MulOp),
	/// `mov` without a mode, or one of the load immediate mnemonics.
	Move(Option<LoadMode>),
	/// `read`.
	Read,
	/// `bra` or `brr`.
	Branch { relative: bool },
	/// `sacq` or `srel`.
	Semaphore { acquire: bool },
	/// A signal mnemonic such as `thrsw`.
	Signal(Signal),
}

bitflags! {
	/// Statement positions at which an instruction extension is valid.
	#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
	pub struct Positions: u8 {
		/// Directly after the opcode.
		const OPCODE = 0x01;
		/// After the target operand.
		const TARGET = 0x02;
		/// After a source operand.
		const SOURCE = 0x04;
	}
}

/// What an instruction extension such as `.ifz` does.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Extension {
	SetFlags,
	Condition(Condition),
	BranchCondition(BranchCondition),
	Pack(Pack),
	Unpack(Unpack),
	/// `.rot amount,` vector rotation of the MUL ALU sources.
	Rotate,
}

/// Kinds of assembler directives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Directive {
	Global,
	/// `.set` and `.const`, `.lset` and `.lconst`.
	Set { local: bool, constant: bool },
	/// `.unset` and `.lunset`.
	Unset { local: bool },
	If,
	IfSet,
	ElseIf,
	Else,
	EndIf,
	Assert,
	Local,
	EndLocal,
	/// Data of the given width in bits; negative widths denote floating point formats.
	Data(i32),
	/// `.bits width, values...`.
	Bits,
	Align,
	Back,
	EndBack,
	Clone,
	Segment(SegmentKind),
	Include,
	/// `.macro`, or `.func` if functional.
	Macro { functional: bool },
	/// `.endm`, or `.endf` if functional.
	EndMacro { functional: bool },
	Repeat,
	EndRepeat,
	ForEach,
	EndForEach,
}

/// How a directive interacts with macro recording and conditional assembly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DirectiveClass {
	/// Recorded into macro bodies, skipped in disabled regions.
	Plain,
	/// Conditional assembly: recorded into macro bodies, but evaluated in disabled regions.
	Conditional,
	/// Macro definitions: never recorded, skipped in disabled regions.
	Definition,
	/// Opens a loop body; recorded and counted when nested inside a recording.
	LoopStart,
	/// Closes a loop body.
	LoopEnd,
}

impl Directive {
	/// How the directive interacts with recording and conditional assembly.
	#[must_use]
	pub const fn class(self) -> DirectiveClass {
		match self {
			Self::If | Self::IfSet | Self::ElseIf | Self::Else | Self::EndIf => DirectiveClass::Conditional,
			Self::Macro { .. } | Self::EndMacro { .. } => DirectiveClass::Definition,
			Self::Repeat | Self::ForEach => DirectiveClass::LoopStart,
			Self::EndRepeat | Self::EndForEach => DirectiveClass::LoopEnd,
			_ => DirectiveClass::Plain,
		}
	}
}

fn register(number: u8, capabilities: RegisterCapabilities) -> RegisterDescriptor {
	RegisterDescriptor::new(number, capabilities)
}

static register_table: LazyLock<HashMap<String, RegisterDescriptor>> = LazyLock::new(|| {
	use RegisterCapabilities as C;
	let mut table = HashMap::new();
	let read_write = C::READ | C::WRITE;

	for number in 0 .. 32 {
		table.insert(format!("ra{number}"), register(number, C::FILE_A | read_write));
		table.insert(format!("rb{number}"), register(number, C::FILE_B | read_write));
	}
	for number in 0 .. 4 {
		table.insert(format!("r{number}"), register(32 + number, C::FILES | C::WRITE | C::ACCUMULATOR));
	}
	for number in 0 .. 16 {
		table.insert(format!("sacq{number}"), register(number, C::SEMAPHORE | C::ACQUIRE));
		table.insert(format!("srel{number}"), register(number, C::SEMAPHORE));
	}

	let named = [
		("r4", 36, C::ACCUMULATOR),
		("r5", 37, C::FILE_A | C::WRITE | C::ACCUMULATOR),
		("r5quad", 37, C::FILE_A | C::WRITE),
		("r5rep", 37, C::FILE_B | C::WRITE),
		("unif", 32, C::FILES | C::READ),
		("uniform", 32, C::FILES | C::READ),
		("vary", 35, C::FILES | C::READ),
		("varying", 35, C::FILES | C::READ),
		("elem_num", 38, C::FILE_A | C::READ),
		("element_number", 38, C::FILE_A | C::READ),
		("qpu_num", 38, C::FILE_B | C::READ),
		("qpu_number", 38, C::FILE_B | C::READ),
		("host_int", 38, C::FILES | C::WRITE),
		("nop", 39, C::FILES | read_write),
		("unif_addr", 40, C::FILE_A | C::WRITE),
		("unif_addr_rel", 40, C::FILE_B | C::WRITE),
		("x_coord", 41, C::FILE_A | C::READ),
		("y_coord", 41, C::FILE_B | C::READ),
		("quad_x", 41, C::FILE_A | C::WRITE),
		("quad_y", 41, C::FILE_B | C::WRITE),
		("ms_flags", 42, C::FILE_A | read_write),
		("rev_flag", 42, C::FILE_B | read_write),
		("tlb_stencil", 43, C::FILES | C::WRITE),
		("tlb_z", 44, C::FILES | C::WRITE),
		("tlb_color_ms", 45, C::FILES | C::WRITE),
		("tlb_color_all", 46, C::FILES | C::WRITE),
		("tlb_alpha_mask", 47, C::FILES | C::WRITE),
		("vpm", 48, C::FILES | read_write),
		("vr_busy", 49, C::FILE_A | C::READ),
		("vw_busy", 49, C::FILE_B | C::READ),
		("vr_setup", 49, C::FILE_A | C::WRITE),
		("vw_setup", 49, C::FILE_B | C::WRITE),
		("vr_wait", 50, C::FILE_A | C::READ),
		("vw_wait", 50, C::FILE_B | C::READ),
		("vr_addr", 50, C::FILE_A | C::WRITE),
		("vw_addr", 50, C::FILE_B | C::WRITE),
		("mutex", 51, C::FILES | read_write),
		("sfu_recip", 52, C::FILES | C::WRITE),
		("sfu_recipsqrt", 53, C::FILES | C::WRITE),
		("sfu_exp", 54, C::FILES | C::WRITE),
		("sfu_log", 55, C::FILES | C::WRITE),
		("tmu0_s", 56, C::FILES | C::WRITE),
		("tmu0_t", 57, C::FILES | C::WRITE),
		("tmu0_r", 58, C::FILES | C::WRITE),
		("tmu0_b", 59, C::FILES | C::WRITE),
		("tmu1_s", 60, C::FILES | C::WRITE),
		("tmu1_t", 61, C::FILES | C::WRITE),
		("tmu1_r", 62, C::FILES | C::WRITE),
		("tmu1_b", 63, C::FILES | C::WRITE),
		("tmu_noswap", 36, C::FILES | C::WRITE),
	];
	for (name, number, capabilities) in named {
		table.insert(name.to_owned(), register(number, capabilities));
	}
	table
});

static opcode_table: LazyLock<HashMap<&'static str, Opcode>> = LazyLock::new(|| {
	let mut table = HashMap::new();
	for op in (0 .. 32).filter_map(AddOp::from_u8) {
		// Reserved operations have no mnemonic.
		if !op.mnemonic().starts_with("op") {
			table.insert(op.mnemonic(), Opcode::Add(op));
		}
	}
	for op in [MulOp::Fmul, MulOp::Mul24, MulOp::V8muld, MulOp::V8min, MulOp::V8max] {
		table.insert(op.mnemonic(), Opcode::Mul(op));
	}
	table.extend([
		("mov", Opcode::Move(None)),
		("ldi", Opcode::Move(Some(LoadMode::Immediate))),
		("ldipes", Opcode::Move(Some(LoadMode::PerElementSigned))),
		("ldipeu", Opcode::Move(Some(LoadMode::PerElementUnsigned))),
		("read", Opcode::Read),
		("bra", Opcode::Branch { relative: false }),
		("brr", Opcode::Branch { relative: true }),
		("sacq", Opcode::Semaphore { acquire: true }),
		("srel", Opcode::Semaphore { acquire: false }),
		("bkpt", Opcode::Signal(Signal::Breakpoint)),
		("thrsw", Opcode::Signal(Signal::ThreadSwitch)),
		("thrend", Opcode::Signal(Signal::ProgramEnd)),
		("sbwait", Opcode::Signal(Signal::WaitScoreboard)),
		("sbdone", Opcode::Signal(Signal::ScoreboardUnlock)),
		("lthrsw", Opcode::Signal(Signal::LastThreadSwitch)),
		("loadcv", Opcode::Signal(Signal::CoverageLoad)),
		("loadc", Opcode::Signal(Signal::ColorLoad)),
		("ldcend", Opcode::Signal(Signal::ColorLoadEnd)),
		("ldtmu0", Opcode::Signal(Signal::LoadTmu0)),
		("ldtmu1", Opcode::Signal(Signal::LoadTmu1)),
		("loadam", Opcode::Signal(Signal::AlphaMaskLoad)),
	]);
	table
});

static extension_table: LazyLock<HashMap<String, Vec<(Positions, Extension)>>> = LazyLock::new(|| {
	let mut table: HashMap<String, Vec<(Positions, Extension)>> = HashMap::new();
	let mut add = |name: &str, positions: Positions, extension: Extension| {
		table.entry(name.to_owned()).or_default().push((positions, extension));
	};
	let result = Positions::OPCODE | Positions::TARGET;

	add("setf", result, Extension::SetFlags);
	for condition in (0 .. 8).filter_map(Condition::from_u8).filter(|condition| *condition != Condition::Always) {
		add(condition.suffix(), result, Extension::Condition(condition));
	}
	for condition in (0 .. 12).filter_map(BranchCondition::from_u8) {
		add(condition.suffix(), Positions::OPCODE, Extension::BranchCondition(condition));
	}
	for pack in (1 .. 16).filter_map(Pack::from_u8) {
		add(pack.suffix(), result, Extension::Pack(pack));
	}
	for unpack in (1 .. 8).filter_map(Unpack::from_u8) {
		add(unpack.suffix(), Positions::SOURCE, Extension::Unpack(unpack));
		add(&format!("unpack{}", unpack.suffix()), Positions::OPCODE | Positions::SOURCE, Extension::Unpack(unpack));
	}
	add("rot", Positions::OPCODE, Extension::Rotate);
	table
});

static directive_table: LazyLock<HashMap<&'static str, Directive>> = LazyLock::new(|| {
	HashMap::from([
		("global", Directive::Global),
		("set", Directive::Set { local: false, constant: false }),
		("const", Directive::Set { local: false, constant: true }),
		("lset", Directive::Set { local: true, constant: false }),
		("lconst", Directive::Set { local: true, constant: true }),
		("unset", Directive::Unset { local: false }),
		("lunset", Directive::Unset { local: true }),
		("if", Directive::If),
		("ifset", Directive::IfSet),
		("elseif", Directive::ElseIf),
		("else", Directive::Else),
		("endif", Directive::EndIf),
		("assert", Directive::Assert),
		("local", Directive::Local),
		("endloc", Directive::EndLocal),
		("bit", Directive::Data(1)),
		("byte", Directive::Data(8)),
		("short", Directive::Data(16)),
		("int", Directive::Data(32)),
		("word", Directive::Data(32)),
		("long", Directive::Data(64)),
		("quad", Directive::Data(64)),
		("half", Directive::Data(-16)),
		("float", Directive::Data(-32)),
		("double", Directive::Data(-64)),
		("bits", Directive::Bits),
		("align", Directive::Align),
		("back", Directive::Back),
		("endb", Directive::EndBack),
		("clone", Directive::Clone),
		("code", Directive::Segment(SegmentKind::Code)),
		("data", Directive::Segment(SegmentKind::Data)),
		("include", Directive::Include),
		("macro", Directive::Macro { functional: false }),
		("endm", Directive::EndMacro { functional: false }),
		("func", Directive::Macro { functional: true }),
		("endf", Directive::EndMacro { functional: true }),
		("rep", Directive::Repeat),
		("endr", Directive::EndRepeat),
		("foreach", Directive::ForEach),
		("endfor", Directive::EndForEach),
	])
});

/// Looks up a register name.
#[must_use]
pub fn register_named(name: &str) -> Option<RegisterDescriptor> {
	register_table.get(name).copied()
}

/// Looks up an opcode mnemonic.
#[must_use]
pub fn opcode(mnemonic: &str) -> Option<Opcode> {
	opcode_table.get(mnemonic).copied()
}

/// Why an instruction extension could not be used.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtensionLookupError {
	/// No extension of this name exists.
	Unknown,
	/// The extension exists, but not at this position.
	Misplaced,
}

/// Looks up an instruction extension valid at `position`.
pub fn extension(name: &str, position: Positions) -> Result<Extension, ExtensionLookupError> {
	let candidates = extension_table.get(name).ok_or(ExtensionLookupError::Unknown)?;
	candidates
		.iter()
		.find(|(positions, _)| positions.intersects(position))
		.map(|(_, extension)| *extension)
		.ok_or(ExtensionLookupError::Misplaced)
}

/// Looks up a directive name without its leading period.
#[must_use]
pub fn directive(name: &str) -> Option<Directive> {
	directive_table.get(name).copied()
}
