//! Small immediate codes and the table of values they can produce.
//!
//! The small immediate field supplies one of 48 constants to the register file B input. Running such a constant
//! through an ALU operation with both inputs equal, or through a pack mode, yields further values that need no load
//! immediate instruction. [`lookup`] searches the table of all those values.

use std::sync::LazyLock;

use super::alu::{evaluate_add, evaluate_mul, evaluate_pack};
use super::opcode::{AddOp, MulOp, Pack};
use super::Slot;

/// Code of the vector rotation by r5. Codes above it rotate by a constant amount.
pub const ROTATION_BY_R5: u8 = 48;

/// The value that a small immediate code supplies. Rotation codes alias the value of the code 32 below them.
#[must_use]
pub fn code_value(code: u8) -> u32 {
	match code & 63 {
		code @ 0 ..= 15 => u32::from(code),
		code @ 16 ..= 31 => (i32::from(code) - 32) as u32,
		code @ 32 ..= 39 => (f32::from(1u8 << (code - 32))).to_bits(),
		code @ 40 ..= 47 => (1. / f32::from(1u16 << (48 - code))).to_bits(),
		code => code_value(code - 32),
	}
}

/// The small immediate code that supplies exactly this value, if any.
#[must_use]
pub fn code_for_value(value: u32) -> Option<u8> {
	(0 .. ROTATION_BY_R5).find(|&code| code_value(code) == value)
}

/// The ALU operation an entry uses to produce its value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlotOperation {
	/// ADD ALU operation.
	Add(AddOp),
	/// MUL ALU operation.
	Mul(MulOp),
}

impl SlotOperation {
	/// The ALU executing the operation.
	#[must_use]
	pub const fn slot(self) -> Slot {
		match self {
			Self::Add(_) => Slot::Add,
			Self::Mul(_) => Slot::Mul,
		}
	}
}

/// One way of producing a value from a small immediate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Entry {
	/// Resulting value.
	pub value:     u32,
	/// Small immediate code.
	pub code:      u8,
	/// Operation applied with both inputs set to the small immediate.
	pub operation: SlotOperation,
	/// Pack mode applied to the result; [`Pack::None`] if none.
	pub pack:      Pack,
	/// PM bit that goes along with `pack`.
	pub pm:        bool,
}

/// Identity operations first, so that plain constants are preferred.
const ADD_OPERATIONS: [AddOp; 12] = [
	AddOp::Or,
	AddOp::Add,
	AddOp::Shl,
	AddOp::Shr,
	AddOp::Asr,
	AddOp::Ror,
	AddOp::Not,
	AddOp::Clz,
	AddOp::Itof,
	AddOp::Ftoi,
	AddOp::Fadd,
	AddOp::V8adds,
];
const MUL_OPERATIONS: [MulOp; 5] = [MulOp::V8min, MulOp::Fmul, MulOp::Mul24, MulOp::V8muld, MulOp::V8adds];

static TABLE: LazyLock<Vec<Entry>> = LazyLock::new(|| {
	let codes = || 0 .. ROTATION_BY_R5;
	let add = |op: AddOp| {
		codes().map(move |code| {
			let value = code_value(code);
			Entry { value: evaluate_add(op, value, value), code, operation: SlotOperation::Add(op), pack: Pack::None, pm: false }
		})
	};
	let mul = |op: MulOp| {
		codes().map(move |code| {
			let value = code_value(code);
			Entry { value: evaluate_mul(op, value, value), code, operation: SlotOperation::Mul(op), pack: Pack::None, pm: false }
		})
	};
	let packed = |operation: SlotOperation| {
		codes().map(move |code| Entry {
			value: evaluate_pack(code_value(code), Pack::Replicate8888, false),
			code,
			operation,
			pack: Pack::Replicate8888,
			pm: false,
		})
	};

	let mut table: Vec<Entry> = add(ADD_OPERATIONS[0])
		.chain(mul(MUL_OPERATIONS[0]))
		.chain(ADD_OPERATIONS[1 ..].iter().flat_map(|&op| add(op)))
		.chain(MUL_OPERATIONS[1 ..].iter().flat_map(|&op| mul(op)))
		.chain(packed(SlotOperation::Add(AddOp::Or)))
		.chain(packed(SlotOperation::Mul(MulOp::V8min)))
		.collect();
	// Stable, so that the order of preference is kept among equal values.
	table.sort_by_key(|entry| entry.value);
	table.dedup();
	table
});

/// The complete table, sorted by value.
#[must_use]
pub fn table() -> &'static [Entry] {
	&TABLE
}

/// All entries producing `value`, in order of preference.
#[must_use]
pub fn lookup(value: u32) -> &'static [Entry] {
	let start = TABLE.partition_point(|entry| entry.value < value);
	let length = TABLE[start ..].iter().take_while(|entry| entry.value == value).count();
	&TABLE[start .. start + length]
}
