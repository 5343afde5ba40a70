//! Where in a statement the builder currently is.

use bitflags::bitflags;

use super::Slot;

bitflags! {
	/// Position within the statement being assembled. Every builder operation receives the context explicitly, and some
	/// operations modify it, e.g. when an operation moves to the other ALU.
	#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
	pub struct InstructionContext: u8 {
		/// The statement uses the ADD ALU.
		const ADD = 0x01;
		/// The statement uses the MUL ALU.
		const MUL = 0x02;
		/// Both ALUs, e.g. a `mov` with two targets.
		const BOTH = 0x03;
		/// At the second source operand.
		const SECOND_SOURCE = 0x04;
		/// At the target operand.
		const TARGET = 0x08;
		/// At a source operand.
		const SOURCE = 0x10;
		/// The operation may still move to the other ALU.
		const CAN_SWAP = 0x20;
	}
}

bitflags! {
	/// Which operands requested a rotation or an unpack mode.
	#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
	pub struct Requests: u8 {
		/// Requested at the opcode; applies to all sources.
		const OPCODE = 0x01;
		/// Requested at the first source.
		const FIRST_SOURCE = 0x02;
		/// Requested at the second source.
		const SECOND_SOURCE = 0x04;
		/// The request changed the instruction rather than confirming a mode already present.
		const NEW = 0x08;
	}
}

impl InstructionContext {
	/// The slot that this context refers to. With both ALUs in use, this is the MUL ALU.
	#[must_use]
	pub const fn slot(self) -> Slot {
		if self.contains(Self::MUL) { Slot::Mul } else { Slot::Add }
	}

	/// Whether the context is at the opcode or its extensions rather than at an operand.
	#[must_use]
	pub const fn is_opcode(self) -> bool {
		!self.intersects(Self::TARGET.union(Self::SOURCE))
	}

	/// Whether the context is at the second source operand.
	#[must_use]
	pub const fn is_second_source(self) -> bool {
		self.contains(Self::SECOND_SOURCE)
	}

	/// The request bit that an extension at this position sets.
	#[must_use]
	pub const fn request(self) -> Requests {
		if !self.contains(Self::SOURCE) {
			Requests::OPCODE
		} else if self.contains(Self::SECOND_SOURCE) {
			Requests::SECOND_SOURCE
		} else {
			Requests::FIRST_SOURCE
		}
	}

	/// Switches between the ADD and the MUL ALU.
	pub fn toggle_slot(&mut self) {
		self.toggle(Self::BOTH);
	}
}
