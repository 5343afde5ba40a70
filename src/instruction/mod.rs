//! The QPU instruction word model.
//!
//! An [`Instruction`] is the decoded field view of one 64-bit instruction word. All three instruction classes (ALU,
//! load immediate and branch) share the same struct; fields that a class does not encode keep their defaults.
//! Encoding and decoding are total and mutually inverse for every word.
#![allow(clippy::struct_excessive_bools)]

use std::fmt::Display;

use bitflags::bitflags;
use num_traits::FromPrimitive;

pub mod alu;
pub mod builder;
pub mod context;
pub mod opcode;
pub mod optimize;
pub mod small_immediate;
#[cfg(test)] mod test;

pub use builder::InstructionBuilder;
pub use context::{InstructionContext, Requests};
pub use opcode::{AddOp, BranchCondition, Condition, LoadMode, MulOp, Mux, Pack, Signal, Unpack};

/// Register address that reads and writes nothing.
pub const NOP_REGISTER: u8 = 39;

bitflags! {
	/// Per-instruction metadata kept by the assembler alongside every instruction word.
	#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
	pub struct InstructionFlags: u8 {
		/// A label or a branch return points here; nothing may be merged into or moved across this instruction.
		const BRANCH_TARGET = 0x01;
		/// The word was emitted by a data directive and is not code.
		const DATA = 0x02;
		/// A register was placed in a register file it is exclusive to, so the files must not be swapped.
		const NO_SWAP = 0x04;
		/// The statement line ended with ';', so the next line may be merged into this word.
		const COMBINE_ALLOWED = 0x08;
		/// An explicit ADD ALU `nop` was given, so a following `mov` must use the MUL ALU.
		const HAD_NOP = 0x10;
	}
}

/// One of the two ALU slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Slot {
	/// The ADD ALU.
	Add,
	/// The MUL ALU.
	Mul,
}

impl Slot {
	/// The other slot.
	#[must_use]
	pub const fn other(self) -> Self {
		match self {
			Self::Add => Self::Mul,
			Self::Mul => Self::Add,
		}
	}
}

impl Display for Slot {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(match self {
			Self::Add => "ADD ALU",
			Self::Mul => "MUL ALU",
		})
	}
}

/// Register addresses that name different registers in file A and file B when written.
const fn is_file_specific_write(address: u8) -> bool {
	address < 32 || matches!(address, 37 | 40 | 41 | 42 | 49 | 50)
}

/// Register addresses that refer to the same register in both files when read.
const fn is_file_independent_read(address: u8) -> bool {
	matches!(address, 32 | 35 | NOP_REGISTER | 48 | 51)
}

/// Decoded view of one instruction word.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Instruction {
	/// Signal field; selects the instruction class.
	pub signal:           Signal,
	/// Unpack mode of ALU instructions.
	pub unpack:           Unpack,
	/// Load mode of load immediate instructions.
	pub load_mode:        LoadMode,
	/// Pack/unpack mode select: regfile A (false) or MUL ALU and r4 (true).
	pub pm:               bool,
	/// Pack mode.
	pub pack:             Pack,
	/// Write condition of the ADD ALU.
	pub cond_add:         Condition,
	/// Write condition of the MUL ALU.
	pub cond_mul:         Condition,
	/// Update the condition flags.
	pub set_flags:        bool,
	/// Write swap: the ADD ALU writes to register file B and the MUL ALU to file A.
	pub write_swap:       bool,
	/// Write address of the ADD ALU.
	pub waddr_add:        u8,
	/// Write address of the MUL ALU.
	pub waddr_mul:        u8,
	/// ADD ALU operation.
	pub op_add:           AddOp,
	/// MUL ALU operation.
	pub op_mul:           MulOp,
	/// Read address of register file A; for branches the branch target register.
	pub raddr_a:          u8,
	/// Read address of register file B.
	pub raddr_b:          u8,
	/// Small immediate code, shared with the register file B read address.
	pub small_immediate:  u8,
	/// First ADD ALU source.
	pub add_a:            Mux,
	/// Second ADD ALU source.
	pub add_b:            Mux,
	/// First MUL ALU source.
	pub mul_a:            Mux,
	/// Second MUL ALU source.
	pub mul_b:            Mux,
	/// Immediate of load immediate and branch instructions.
	pub immediate:        u32,
	/// Branch condition.
	pub branch_condition: BranchCondition,
	/// Relative branch.
	pub relative:         bool,
	/// Branch target register is added to the immediate.
	pub branch_register:  bool,
}

impl Default for Instruction {
	fn default() -> Self {
		Self {
			signal:           Signal::None,
			unpack:           Unpack::None,
			load_mode:        LoadMode::Immediate,
			pm:               false,
			pack:             Pack::None,
			cond_add:         Condition::Never,
			cond_mul:         Condition::Never,
			set_flags:        false,
			write_swap:       false,
			waddr_add:        NOP_REGISTER,
			waddr_mul:        NOP_REGISTER,
			op_add:           AddOp::Nop,
			op_mul:           MulOp::Nop,
			raddr_a:          NOP_REGISTER,
			raddr_b:          NOP_REGISTER,
			small_immediate:  0,
			add_a:            Mux::R0,
			add_b:            Mux::R0,
			mul_a:            Mux::R0,
			mul_b:            Mux::R0,
			immediate:        0,
			branch_condition: BranchCondition::Always,
			relative:         false,
			branch_register:  false,
		}
	}
}

/// Extracts `width` bits starting at `shift`.
const fn field(word: u64, shift: u32, width: u32) -> u8 {
	((word >> shift) & ((1 << width) - 1)) as u8
}

impl Instruction {
	/// The canonical `nop` instruction word.
	pub const NOP_WORD: u64 = 0x1000_09e7_009e_7000;

	/// Packs the fields into a 64-bit word.
	#[must_use]
	pub fn encode(&self) -> u64 {
		let shared = (u64::from(self.pm) << 56)
			| (u64::from(self.pack as u8) << 52)
			| (u64::from(self.cond_add as u8) << 49)
			| (u64::from(self.cond_mul as u8) << 46)
			| (u64::from(self.set_flags) << 45)
			| (u64::from(self.write_swap) << 44)
			| (u64::from(self.waddr_add & 63) << 38)
			| (u64::from(self.waddr_mul & 63) << 32);
		match self.signal {
			Signal::Branch =>
				(u64::from(Signal::Branch as u8) << 60)
					| (u64::from(self.branch_condition as u8) << 52)
					| (u64::from(self.relative) << 51)
					| (u64::from(self.branch_register) << 50)
					| (u64::from((self.raddr_a | u8::from(self.set_flags)) & 31) << 45)
					| (u64::from(self.write_swap) << 44)
					| (u64::from(self.waddr_add & 63) << 38)
					| (u64::from(self.waddr_mul & 63) << 32)
					| u64::from(self.immediate),
			Signal::LoadImmediate =>
				(u64::from(Signal::LoadImmediate as u8) << 60)
					| (u64::from(self.load_mode as u8) << 57)
					| shared | u64::from(self.immediate),
			signal => {
				let raddr_b = if signal == Signal::SmallImmediate { self.small_immediate } else { self.raddr_b };
				(u64::from(signal as u8) << 60)
					| (u64::from(self.unpack as u8) << 57)
					| shared | (u64::from(self.op_mul as u8) << 29)
					| (u64::from(self.op_add as u8) << 24)
					| (u64::from(self.raddr_a & 63) << 18)
					| (u64::from(raddr_b & 63) << 12)
					| (u64::from(self.add_a as u8) << 9)
					| (u64::from(self.add_b as u8) << 6)
					| (u64::from(self.mul_a as u8) << 3)
					| u64::from(self.mul_b as u8)
			},
		}
	}

	/// Unpacks a 64-bit word. Fields not encoded by the word's instruction class are left at their defaults.
	#[must_use]
	pub fn decode(word: u64) -> Self {
		let mut instruction = Self {
			signal: Signal::from_u8(field(word, 60, 4)).unwrap_or_default(),
			write_swap: field(word, 44, 1) != 0,
			waddr_add: field(word, 38, 6),
			waddr_mul: field(word, 32, 6),
			..Self::default()
		};
		if instruction.signal == Signal::Branch {
			instruction.branch_condition = BranchCondition::from_u8(field(word, 52, 4)).unwrap_or_default();
			instruction.relative = field(word, 51, 1) != 0;
			instruction.branch_register = field(word, 50, 1) != 0;
			instruction.raddr_a = field(word, 45, 5);
			instruction.set_flags = instruction.raddr_a & 1 != 0;
			instruction.immediate = word as u32;
			return instruction;
		}

		instruction.pm = field(word, 56, 1) != 0;
		instruction.pack = Pack::from_u8(field(word, 52, 4)).unwrap_or_default();
		instruction.cond_add = Condition::from_u8(field(word, 49, 3)).unwrap_or_default();
		instruction.cond_mul = Condition::from_u8(field(word, 46, 3)).unwrap_or_default();
		instruction.set_flags = field(word, 45, 1) != 0;
		if instruction.signal == Signal::LoadImmediate {
			instruction.load_mode = LoadMode::from_u8(field(word, 57, 3)).unwrap_or_default();
			instruction.immediate = word as u32;
			return instruction;
		}

		instruction.unpack = Unpack::from_u8(field(word, 57, 3)).unwrap_or_default();
		instruction.op_mul = MulOp::from_u8(field(word, 29, 3)).unwrap_or_default();
		instruction.op_add = AddOp::from_u8(field(word, 24, 5)).unwrap_or_default();
		instruction.raddr_a = field(word, 18, 6);
		if instruction.signal == Signal::SmallImmediate {
			instruction.small_immediate = field(word, 12, 6);
		} else {
			instruction.raddr_b = field(word, 12, 6);
		}
		instruction.add_a = Mux::from_u8(field(word, 9, 3)).unwrap_or_default();
		instruction.add_b = Mux::from_u8(field(word, 6, 3)).unwrap_or_default();
		instruction.mul_a = Mux::from_u8(field(word, 3, 3)).unwrap_or_default();
		instruction.mul_b = Mux::from_u8(field(word, 0, 3)).unwrap_or_default();
		instruction
	}

	/// Whether this is an ALU instruction, with or without small immediate.
	#[must_use]
	pub fn is_alu(&self) -> bool {
		self.signal < Signal::LoadImmediate
	}

	/// Whether the ADD ALU slot (or for load immediates, its write port) is in use.
	#[must_use]
	pub fn is_add_used(&self) -> bool {
		(self.is_alu() && self.op_add != AddOp::Nop) || self.waddr_add != NOP_REGISTER
	}

	/// Whether the MUL ALU slot (or for load immediates, its write port) is in use.
	#[must_use]
	pub fn is_mul_used(&self) -> bool {
		(self.is_alu() && self.op_mul != MulOp::Nop) || self.waddr_mul != NOP_REGISTER
	}

	/// Whether the slot is in use.
	#[must_use]
	pub fn is_used(&self, slot: Slot) -> bool {
		match slot {
			Slot::Add => self.is_add_used(),
			Slot::Mul => self.is_mul_used(),
		}
	}

	/// Whether the ADD ALU operation only uses its first source.
	#[must_use]
	pub const fn is_unary(&self) -> bool {
		self.op_add.is_unary()
	}

	/// Whether the flags are set from the ADD ALU result. Otherwise, `.setf` applies to the MUL ALU.
	#[must_use]
	pub fn add_sets_flags(&self) -> bool {
		self.set_flags && self.is_alu() && self.op_add != AddOp::Nop
	}

	/// Whether the flags are set from the MUL ALU result.
	#[must_use]
	pub fn mul_sets_flags(&self) -> bool {
		self.set_flags && self.is_alu() && self.op_add == AddOp::Nop
	}

	/// Write address of the slot.
	#[must_use]
	pub const fn waddr(&self, slot: Slot) -> u8 {
		match slot {
			Slot::Add => self.waddr_add,
			Slot::Mul => self.waddr_mul,
		}
	}

	/// Write condition of the slot.
	#[must_use]
	pub const fn condition(&self, slot: Slot) -> Condition {
		match slot {
			Slot::Add => self.cond_add,
			Slot::Mul => self.cond_mul,
		}
	}

	/// Mutable write condition of the slot.
	pub const fn condition_mut(&mut self, slot: Slot) -> &mut Condition {
		match slot {
			Slot::Add => &mut self.cond_add,
			Slot::Mul => &mut self.cond_mul,
		}
	}

	/// Whether the slot writes to register file A.
	#[must_use]
	pub const fn writes_file_a(&self, slot: Slot) -> bool {
		match slot {
			Slot::Add => !self.write_swap,
			Slot::Mul => self.write_swap,
		}
	}

	/// The source multiplexer of a slot; `second` selects the second source.
	#[must_use]
	pub const fn mux(&self, slot: Slot, second: bool) -> Mux {
		match (slot, second) {
			(Slot::Add, false) => self.add_a,
			(Slot::Add, true) => self.add_b,
			(Slot::Mul, false) => self.mul_a,
			(Slot::Mul, true) => self.mul_b,
		}
	}

	/// Mutable source multiplexer of a slot.
	pub const fn mux_mut(&mut self, slot: Slot, second: bool) -> &mut Mux {
		match (slot, second) {
			(Slot::Add, false) => &mut self.add_a,
			(Slot::Add, true) => &mut self.add_b,
			(Slot::Mul, false) => &mut self.mul_a,
			(Slot::Mul, true) => &mut self.mul_b,
		}
	}

	/// Whether any of the four source multiplexers selects the given input.
	#[must_use]
	pub fn uses_mux(&self, mux: Mux) -> bool {
		[self.add_a, self.add_b, self.mul_a, self.mul_b].contains(&mux)
	}

	/// The 32-bit value that the small immediate field supplies to the register file B input.
	#[must_use]
	pub fn small_immediate_value(&self) -> u32 {
		small_immediate::code_value(self.small_immediate)
	}

	/// Moves the ADD ALU operation to the MUL ALU or vice versa, where the operation exists in both ALUs.
	///
	/// Returns `false` without modification if the swap would change the semantics of the instruction.
	pub fn try_alu_swap(&mut self) -> bool {
		if self.signal == Signal::Branch {
			return false;
		}
		if self.signal == Signal::LoadImmediate {
			if self.pack != Pack::None {
				return false;
			}
			self.swap_write_ports();
			return true;
		}
		if self.pack != Pack::None || self.unpack != Unpack::None || self.set_flags {
			return false;
		}

		let new_mul = match self.op_add {
			AddOp::Or if self.add_a == self.add_b => Some(MulOp::V8min),
			AddOp::Xor if self.add_a == self.add_b => Some(MulOp::V8subs),
			op => op.mul_equivalent(),
		};
		let new_add = match self.op_mul {
			MulOp::V8min if self.mul_a == self.mul_b => Some(AddOp::Or),
			op => op.add_equivalent(),
		};
		let (Some(new_mul), Some(new_add)) = (new_mul, new_add) else {
			return false;
		};

		self.op_add = new_add;
		self.op_mul = new_mul;
		std::mem::swap(&mut self.add_a, &mut self.mul_a);
		std::mem::swap(&mut self.add_b, &mut self.mul_b);
		self.swap_write_ports();
		true
	}

	fn swap_write_ports(&mut self) {
		std::mem::swap(&mut self.cond_add, &mut self.cond_mul);
		std::mem::swap(&mut self.waddr_add, &mut self.waddr_mul);
		self.write_swap = !self.write_swap;
	}

	/// Exchanges the read addresses of register file A and B, for registers that are available in both files under the
	/// same address.
	///
	/// Returns `false` without modification if this is impossible.
	pub fn try_file_swap(&mut self) -> bool {
		if self.signal >= Signal::SmallImmediate
			|| !is_file_independent_read(self.raddr_a)
			|| !is_file_independent_read(self.raddr_b)
			|| (!self.pm && self.unpack != Unpack::None)
		{
			return false;
		}
		std::mem::swap(&mut self.raddr_a, &mut self.raddr_b);
		for mux in [&mut self.add_a, &mut self.add_b, &mut self.mul_a, &mut self.mul_b] {
			*mux = match *mux {
				Mux::RegisterA => Mux::RegisterB,
				Mux::RegisterB => Mux::RegisterA,
				other => other,
			};
		}
		true
	}

	/// Whether the slot's write target is a register that exists in both register files under the same address, so
	/// that the write swap bit does not matter for it.
	#[must_use]
	pub fn is_file_independent_write(&self, slot: Slot) -> bool {
		!is_file_specific_write(self.waddr(slot))
	}

	/// Usage of hardware resources that at most one of two merged statements may claim.
	#[must_use]
	pub fn resource_claims(&self) -> ResourceClaims {
		const SPECIAL_WRITE: u64 = 0xfff0_9e00_0000_0000;
		const SPECIAL_READ: u64 = 0x0008_0600_0000_0000;

		let mut claims = ResourceClaims::default();
		for address in [self.waddr_add, self.waddr_mul] {
			if SPECIAL_WRITE & (1 << address) != 0 {
				claims.special += 1;
			}
		}
		if self.signal != Signal::Branch && SPECIAL_READ & (1 << self.raddr_a) != 0 {
			claims.special += 1;
		}
		if self.signal < Signal::SmallImmediate && SPECIAL_READ & (1 << self.raddr_b) != 0 {
			claims.special += 1;
		}
		if self.signal.is_memory_load() || (self.signal == Signal::LoadImmediate && self.load_mode == LoadMode::Semaphore)
		{
			claims.special += 1;
		}
		// All tile buffer color accesses together count once.
		if self.signal.is_color_load() || matches!(self.waddr_add, 45 | 46) || matches!(self.waddr_mul, 45 | 46) {
			claims.color = 1;
		}
		claims
	}
}

/// Counts of claims on mutually exclusive hardware resources, see [`Instruction::resource_claims`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResourceClaims {
	/// Special function registers, TMU and SFU accesses, mutex and semaphores.
	pub special: u8,
	/// Tile buffer color accesses; at most 1.
	pub color:   u8,
}

impl ResourceClaims {
	/// Whether more than one exclusive resource is claimed, which forbids merging statements into this word.
	#[must_use]
	pub const fn is_overcommitted(&self) -> bool {
		self.special + self.color > 1
	}
}
