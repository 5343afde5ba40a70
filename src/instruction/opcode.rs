//! Instruction fields with a fixed set of encodings.
//!
//! Every enum here covers all bit patterns of its field, so that decoding any 64-bit word is total. Reserved encodings
//! are kept as explicit variants.

use num_derive::{FromPrimitive, ToPrimitive};

/// The signal field, which also selects the instruction class.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum Signal {
	/// Software breakpoint.
	Breakpoint = 0,
	/// No signal.
	#[default]
	None = 1,
	/// Thread switch.
	ThreadSwitch = 2,
	/// Program end (thread end).
	ProgramEnd = 3,
	/// Wait for scoreboard.
	WaitScoreboard = 4,
	/// Scoreboard unlock.
	ScoreboardUnlock = 5,
	/// Last thread switch.
	LastThreadSwitch = 6,
	/// Coverage load from the tile buffer to r4.
	CoverageLoad = 7,
	/// Color load from the tile buffer to r4.
	ColorLoad = 8,
	/// Color load and program end.
	ColorLoadEnd = 9,
	/// Load data from TMU0 to r4.
	LoadTmu0 = 10,
	/// Load data from TMU1 to r4.
	LoadTmu1 = 11,
	/// Alpha-mask load from the tile buffer to r4.
	AlphaMaskLoad = 12,
	/// ALU instruction whose register file B read address holds a small immediate.
	SmallImmediate = 13,
	/// Load immediate instruction.
	LoadImmediate = 14,
	/// Branch instruction.
	Branch = 15,
}

impl Signal {
	/// Whether the signal claims the texture or tile buffer load path.
	#[must_use]
	pub const fn is_memory_load(self) -> bool {
		matches!(self, Self::CoverageLoad | Self::LoadTmu0 | Self::LoadTmu1 | Self::AlphaMaskLoad)
	}

	/// Whether the signal reads the color buffer.
	#[must_use]
	pub const fn is_color_load(self) -> bool {
		matches!(self, Self::ColorLoad | Self::ColorLoadEnd)
	}
}

/// ADD ALU operations.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum AddOp {
	#[default]
	Nop = 0,
	Fadd = 1,
	Fsub = 2,
	Fmin = 3,
	Fmax = 4,
	Fminabs = 5,
	Fmaxabs = 6,
	Ftoi = 7,
	Itof = 8,
	Reserved9 = 9,
	Reserved10 = 10,
	Reserved11 = 11,
	Add = 12,
	Sub = 13,
	Shr = 14,
	Asr = 15,
	Ror = 16,
	Shl = 17,
	Min = 18,
	Max = 19,
	And = 20,
	Or = 21,
	Xor = 22,
	Not = 23,
	Clz = 24,
	Reserved25 = 25,
	Reserved26 = 26,
	Reserved27 = 27,
	Reserved28 = 28,
	Reserved29 = 29,
	V8adds = 30,
	V8subs = 31,
}

impl AddOp {
	/// Assembler mnemonic.
	#[must_use]
	pub const fn mnemonic(self) -> &'static str {
		match self {
			Self::Nop => "nop",
			Self::Fadd => "fadd",
			Self::Fsub => "fsub",
			Self::Fmin => "fmin",
			Self::Fmax => "fmax",
			Self::Fminabs => "fminabs",
			Self::Fmaxabs => "fmaxabs",
			Self::Ftoi => "ftoi",
			Self::Itof => "itof",
			Self::Reserved9 => "op9",
			Self::Reserved10 => "op10",
			Self::Reserved11 => "op11",
			Self::Add => "add",
			Self::Sub => "sub",
			Self::Shr => "shr",
			Self::Asr => "asr",
			Self::Ror => "ror",
			Self::Shl => "shl",
			Self::Min => "min",
			Self::Max => "max",
			Self::And => "and",
			Self::Or => "or",
			Self::Xor => "xor",
			Self::Not => "not",
			Self::Clz => "clz",
			Self::Reserved25 => "op25",
			Self::Reserved26 => "op26",
			Self::Reserved27 => "op27",
			Self::Reserved28 => "op28",
			Self::Reserved29 => "op29",
			Self::V8adds => "v8adds",
			Self::V8subs => "v8subs",
		}
	}

	/// Operations that only use their first operand. The second multiplexer mirrors the first.
	#[must_use]
	pub const fn is_unary(self) -> bool {
		matches!(self, Self::Ftoi | Self::Itof | Self::Not | Self::Clz)
	}

	/// Operations on floating point operands.
	#[must_use]
	pub const fn is_float(self) -> bool {
		matches!(self, Self::Fadd | Self::Fsub | Self::Fmin | Self::Fmax | Self::Fminabs | Self::Fmaxabs | Self::Ftoi)
	}

	/// Operations where exchanging both operands does not change the result.
	#[must_use]
	pub const fn is_commutative(self) -> bool {
		matches!(
			self,
			Self::Fadd
				| Self::Fmin | Self::Fmax
				| Self::Fminabs | Self::Fmaxabs
				| Self::Add | Self::Min
				| Self::Max | Self::And
				| Self::Or | Self::Xor
				| Self::V8adds
		)
	}

	/// The MUL ALU operation with identical semantics, if any.
	#[must_use]
	pub const fn mul_equivalent(self) -> Option<MulOp> {
		match self {
			Self::Nop => Some(MulOp::Nop),
			Self::V8adds => Some(MulOp::V8adds),
			Self::V8subs => Some(MulOp::V8subs),
			_ => None,
		}
	}
}

/// MUL ALU operations.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum MulOp {
	#[default]
	Nop = 0,
	Fmul = 1,
	Mul24 = 2,
	V8muld = 3,
	V8min = 4,
	V8max = 5,
	V8adds = 6,
	V8subs = 7,
}

impl MulOp {
	/// Assembler mnemonic.
	#[must_use]
	pub const fn mnemonic(self) -> &'static str {
		match self {
			Self::Nop => "nop",
			Self::Fmul => "fmul",
			Self::Mul24 => "mul24",
			Self::V8muld => "v8muld",
			Self::V8min => "v8min",
			Self::V8max => "v8max",
			Self::V8adds => "v8adds",
			Self::V8subs => "v8subs",
		}
	}

	/// Operations where exchanging both operands does not change the result.
	#[must_use]
	pub const fn is_commutative(self) -> bool {
		!matches!(self, Self::Nop | Self::V8subs)
	}

	/// The ADD ALU operation with identical semantics, if any.
	#[must_use]
	pub const fn add_equivalent(self) -> Option<AddOp> {
		match self {
			Self::Nop => Some(AddOp::Nop),
			Self::V8adds => Some(AddOp::V8adds),
			Self::V8subs => Some(AddOp::V8subs),
			_ => None,
		}
	}
}

/// Write condition of an ALU result.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum Condition {
	/// Never write; the canonical state of an unused slot.
	#[default]
	Never = 0,
	/// Always write.
	Always = 1,
	/// Zero flag set.
	ZeroSet = 2,
	/// Zero flag clear.
	ZeroClear = 3,
	/// Negative flag set.
	NegativeSet = 4,
	/// Negative flag clear.
	NegativeClear = 5,
	/// Carry flag set.
	CarrySet = 6,
	/// Carry flag clear.
	CarryClear = 7,
}

impl Condition {
	/// Extension suffix, without the leading period. Always writing needs no suffix.
	#[must_use]
	pub const fn suffix(self) -> &'static str {
		match self {
			Self::Never => "never",
			Self::Always => "",
			Self::ZeroSet => "ifz",
			Self::ZeroClear => "ifnz",
			Self::NegativeSet => "ifn",
			Self::NegativeClear => "ifnn",
			Self::CarrySet => "ifc",
			Self::CarryClear => "ifnc",
		}
	}
}

/// Branch conditions, evaluated across all 16 SIMD elements.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum BranchCondition {
	AllZeroSet = 0,
	AllZeroClear = 1,
	AnyZeroSet = 2,
	AnyZeroClear = 3,
	AllNegativeSet = 4,
	AllNegativeClear = 5,
	AnyNegativeSet = 6,
	AnyNegativeClear = 7,
	AllCarrySet = 8,
	AllCarryClear = 9,
	AnyCarrySet = 10,
	AnyCarryClear = 11,
	Reserved12 = 12,
	Reserved13 = 13,
	Reserved14 = 14,
	#[default]
	Always = 15,
}

impl BranchCondition {
	/// Extension suffix, without the leading period.
	#[must_use]
	pub const fn suffix(self) -> &'static str {
		match self {
			Self::AllZeroSet => "allz",
			Self::AllZeroClear => "allnz",
			Self::AnyZeroSet => "anyz",
			Self::AnyZeroClear => "anynz",
			Self::AllNegativeSet => "alln",
			Self::AllNegativeClear => "allnn",
			Self::AnyNegativeSet => "anyn",
			Self::AnyNegativeClear => "anynn",
			Self::AllCarrySet => "allc",
			Self::AllCarryClear => "allnc",
			Self::AnyCarrySet => "anyc",
			Self::AnyCarryClear => "anync",
			Self::Reserved12 => "cond12",
			Self::Reserved13 => "cond13",
			Self::Reserved14 => "cond14",
			Self::Always => "",
		}
	}
}

/// ALU input multiplexer.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Mux {
	#[default]
	R0 = 0,
	R1 = 1,
	R2 = 2,
	R3 = 3,
	R4 = 4,
	R5 = 5,
	/// Value read from register file A.
	RegisterA = 6,
	/// Value read from register file B, or the small immediate.
	RegisterB = 7,
}

impl Mux {
	/// Whether this selects an accumulator.
	#[must_use]
	pub const fn is_accumulator(self) -> bool {
		!matches!(self, Self::RegisterA | Self::RegisterB)
	}

	/// Name for messages and disassembly of accumulator sources.
	#[must_use]
	pub const fn name(self) -> &'static str {
		match self {
			Self::R0 => "r0",
			Self::R1 => "r1",
			Self::R2 => "r2",
			Self::R3 => "r3",
			Self::R4 => "r4",
			Self::R5 => "r5",
			Self::RegisterA => "register file A",
			Self::RegisterB => "register file B",
		}
	}
}

/// Pack modes. With the PM bit clear they narrow a register file A write, with PM set they narrow the MUL ALU result
/// into a color format, where only the saturating 8 bit modes exist.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Pack {
	#[default]
	None = 0,
	Half16a = 1,
	Half16b = 2,
	Replicate8888 = 3,
	Byte8a = 4,
	Byte8b = 5,
	Byte8c = 6,
	Byte8d = 7,
	Saturate32 = 8,
	Half16aSaturate = 9,
	Half16bSaturate = 10,
	Replicate8888Saturate = 11,
	Byte8aSaturate = 12,
	Byte8bSaturate = 13,
	Byte8cSaturate = 14,
	Byte8dSaturate = 15,
}

impl Pack {
	/// Extension suffix, without the leading period.
	#[must_use]
	pub const fn suffix(self) -> &'static str {
		match self {
			Self::None => "",
			Self::Half16a => "16a",
			Self::Half16b => "16b",
			Self::Replicate8888 => "8abcd",
			Self::Byte8a => "8a",
			Self::Byte8b => "8b",
			Self::Byte8c => "8c",
			Self::Byte8d => "8d",
			Self::Saturate32 => "s",
			Self::Half16aSaturate => "16as",
			Self::Half16bSaturate => "16bs",
			Self::Replicate8888Saturate => "8abcds",
			Self::Byte8aSaturate => "8as",
			Self::Byte8bSaturate => "8bs",
			Self::Byte8cSaturate => "8cs",
			Self::Byte8dSaturate => "8ds",
		}
	}

	/// Whether the mode writes all bits of the target; partial modes leave the remaining bits untouched.
	#[must_use]
	pub const fn is_full_width(self) -> bool {
		matches!(self, Self::None | Self::Replicate8888 | Self::Saturate32 | Self::Replicate8888Saturate)
	}
}

/// Unpack modes. With the PM bit clear they widen a register file A read, with PM set they widen r4.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Unpack {
	#[default]
	None = 0,
	Half16a = 1,
	Half16b = 2,
	Replicate8d = 3,
	Byte8a = 4,
	Byte8b = 5,
	Byte8c = 6,
	Byte8d = 7,
}

impl Unpack {
	/// Extension suffix, without the leading period.
	#[must_use]
	pub const fn suffix(self) -> &'static str {
		match self {
			Self::None => "",
			Self::Half16a => "16a",
			Self::Half16b => "16b",
			Self::Replicate8d => "8dr",
			Self::Byte8a => "8a",
			Self::Byte8b => "8b",
			Self::Byte8c => "8c",
			Self::Byte8d => "8d",
		}
	}
}

/// Load immediate variants.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum LoadMode {
	/// One 32-bit value for all elements.
	#[default]
	Immediate = 0,
	/// Two bits per element, signed.
	PerElementSigned = 1,
	/// Reserved.
	Reserved2 = 2,
	/// Two bits per element, unsigned.
	PerElementUnsigned = 3,
	/// Semaphore acquire or release.
	Semaphore = 4,
	/// Reserved.
	Reserved5 = 5,
	/// Reserved.
	Reserved6 = 6,
	/// Reserved.
	Reserved7 = 7,
}

impl LoadMode {
	/// Assembler mnemonic.
	#[must_use]
	pub const fn mnemonic(self) -> &'static str {
		match self {
			Self::Immediate => "ldi",
			Self::PerElementSigned => "ldipes",
			Self::Reserved2 => "ldi2",
			Self::PerElementUnsigned => "ldipeu",
			Self::Semaphore => "s",
			Self::Reserved5 => "ldi5",
			Self::Reserved6 => "ldi6",
			Self::Reserved7 => "ldi7",
		}
	}
}
