//! Incremental construction of one instruction word.
//!
//! The assembler feeds each statement of a line into the same [`InstructionBuilder`], operand by operand. Every
//! operation checks the new request against the resources that earlier operands already committed (ALU slots, register
//! file ports, the small immediate field, pack and unpack modes) and either claims the resource, finds an equivalent
//! encoding by moving an operation to the other ALU or a register to the other file, or fails.

use super::context::{InstructionContext, Requests};
use super::opcode::{AddOp, BranchCondition, Condition, LoadMode, MulOp, Mux, Pack, Signal, Unpack};
use super::small_immediate::{self, ROTATION_BY_R5, SlotOperation};
use super::{Instruction, InstructionFlags, NOP_REGISTER, Slot};
use crate::error::{InstructionError, InstructionWarning};
use crate::expression::{ROTATE_BY_R5, RegisterCapabilities, RegisterDescriptor};

/// The instruction under construction together with the bookkeeping needed to validate further requests.
#[derive(Clone, Debug, Default)]
pub struct InstructionBuilder {
	/// The instruction word being built.
	pub instruction:     Instruction,
	/// Metadata of the word being built.
	pub flags:           InstructionFlags,
	rotation_use:        Requests,
	unpack_use:          Requests,
	/// Slots (as [`InstructionContext::ADD`] and [`InstructionContext::MUL`]) with an explicit write condition.
	explicit_conditions: InstructionContext,
	advisories:          Vec<InstructionWarning>,
}

type Result<T = ()> = std::result::Result<T, InstructionError>;

impl InstructionBuilder {
	/// Starts a new, empty instruction.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Continues building on an instruction that has already been emitted.
	#[must_use]
	pub fn resume(word: u64, flags: InstructionFlags) -> Self {
		let instruction = Instruction::decode(word);
		let mut explicit_conditions = InstructionContext::empty();
		for (slot, bit) in [(Slot::Add, InstructionContext::ADD), (Slot::Mul, InstructionContext::MUL)] {
			if !matches!(instruction.condition(slot), Condition::Never | Condition::Always) {
				explicit_conditions |= bit;
			}
		}
		Self { instruction, flags, explicit_conditions, ..Self::default() }
	}

	/// Removes and returns the advisories collected so far.
	pub fn take_advisories(&mut self) -> Vec<InstructionWarning> {
		std::mem::take(&mut self.advisories)
	}

	fn advise(&mut self, warning: InstructionWarning) {
		self.advisories.push(warning);
	}

	fn slot_busy(&self, slot: Slot) -> bool {
		let is_immediate = self.instruction.signal == Signal::LoadImmediate;
		match slot {
			Slot::Add =>
				self.flags.contains(InstructionFlags::HAD_NOP)
					|| self.instruction.waddr_add != NOP_REGISTER
					|| (!is_immediate && self.instruction.op_add != AddOp::Nop),
			Slot::Mul =>
				self.instruction.waddr_mul != NOP_REGISTER || (!is_immediate && self.instruction.op_mul != MulOp::Nop),
		}
	}

	fn activate(&mut self, slot: Slot) {
		let explicit = match slot {
			Slot::Add => InstructionContext::ADD,
			Slot::Mul => InstructionContext::MUL,
		};
		let condition = self.instruction.condition_mut(slot);
		if *condition == Condition::Never && !self.explicit_conditions.contains(explicit) {
			*condition = Condition::Always;
		}
	}

	/// Moves the current operation to the other ALU if the context allows it.
	pub fn try_slot_swap(&mut self, context: &mut InstructionContext) -> bool {
		if !context.contains(InstructionContext::CAN_SWAP) || context.contains(InstructionContext::BOTH) {
			return false;
		}
		if !self.swap_alus() {
			return false;
		}
		context.toggle_slot();
		true
	}

	fn swap_alus(&mut self) -> bool {
		if !self.instruction.try_alu_swap() {
			return false;
		}
		let add = self.explicit_conditions.contains(InstructionContext::ADD);
		let mul = self.explicit_conditions.contains(InstructionContext::MUL);
		self.explicit_conditions.set(InstructionContext::ADD, mul);
		self.explicit_conditions.set(InstructionContext::MUL, add);
		true
	}

	//#region Opcodes

	/// Claims the ADD ALU for `op`. Operations that also exist in the MUL ALU move there if the ADD ALU is taken.
	/// Returns the context of the slot that was claimed.
	///
	/// # Errors
	/// If no suitable ALU is free.
	pub fn begin_add(&mut self, op: AddOp) -> Result<InstructionContext> {
		self.begin_operation(SlotOperation::Add(op), true)
	}

	/// Claims the MUL ALU for `op`, see [`Self::begin_add`].
	///
	/// # Errors
	/// If no suitable ALU is free.
	pub fn begin_mul(&mut self, op: MulOp) -> Result<InstructionContext> {
		self.begin_operation(SlotOperation::Mul(op), true)
	}

	fn begin_operation(&mut self, operation: SlotOperation, may_retry: bool) -> Result<InstructionContext> {
		let slot = operation.slot();
		if self.instruction.signal >= Signal::LoadImmediate {
			return Err(InstructionError::AluInImmediate { slot });
		}
		if self.instruction.is_used(slot) {
			let alternative = match operation {
				SlotOperation::Add(op) => op.mul_equivalent().map(SlotOperation::Mul),
				SlotOperation::Mul(op) => op.add_equivalent().map(SlotOperation::Add),
			};
			match alternative {
				Some(alternative) if may_retry => return self.begin_operation(alternative, false),
				_ => {
					let other_idle = match slot {
						Slot::Add => self.instruction.op_mul == MulOp::Nop,
						Slot::Mul => self.instruction.op_add == AddOp::Nop,
					};
					if !other_idle || !self.swap_alus() {
						return Err(InstructionError::SlotInUse { slot });
					}
				},
			}
		}

		self.rotation_use = Requests::empty();
		self.unpack_use = Requests::empty();
		Ok(match operation {
			SlotOperation::Add(op) => {
				self.instruction.op_add = op;
				if op == AddOp::Nop {
					self.flags |= InstructionFlags::HAD_NOP;
				} else {
					self.activate(Slot::Add);
				}
				InstructionContext::ADD
			},
			SlotOperation::Mul(op) => {
				self.instruction.op_mul = op;
				if op != MulOp::Nop {
					self.activate(Slot::Mul);
				}
				InstructionContext::MUL
			},
		})
	}

	/// Claims a free ALU for a `mov` or load immediate statement. Returns the context of the slot that was claimed.
	///
	/// # Errors
	/// If both ALUs are busy or the instruction is a branch.
	pub fn begin_move(&mut self) -> Result<InstructionContext> {
		if self.instruction.signal == Signal::Branch {
			return Err(InstructionError::MoveWithBranch);
		}
		let slot = if self.slot_busy(Slot::Add) { InstructionContext::MUL } else { InstructionContext::ADD };
		if slot == InstructionContext::MUL && self.slot_busy(Slot::Mul) {
			return Err(InstructionError::BothAlusUsed);
		}
		self.rotation_use = Requests::empty();
		self.unpack_use = Requests::empty();
		Ok(InstructionContext::CAN_SWAP | slot)
	}

	/// Extends a `mov` to both ALUs for a second target.
	///
	/// # Errors
	/// If the other ALU is busy.
	pub fn add_second_target(&mut self, context: &mut InstructionContext) -> Result {
		if self.slot_busy(context.slot().other()) {
			return Err(InstructionError::TwoTargetsNeedBothAlus);
		}
		context.remove(InstructionContext::CAN_SWAP | InstructionContext::TARGET);
		context.toggle_slot();
		Ok(())
	}

	/// Turns the instruction into a branch.
	///
	/// # Errors
	/// If anything else is already part of the instruction.
	pub fn begin_branch(&mut self, relative: bool) -> Result<InstructionContext> {
		let instruction = &mut self.instruction;
		if instruction.op_add != AddOp::Nop
			|| instruction.op_mul != MulOp::Nop
			|| instruction.signal != Signal::None
			|| instruction.raddr_a != NOP_REGISTER
			|| instruction.raddr_b != NOP_REGISTER
			|| instruction.waddr_add != NOP_REGISTER
			|| instruction.waddr_mul != NOP_REGISTER
			|| instruction.pack != Pack::None
		{
			return Err(InstructionError::BranchNotAlone);
		}
		instruction.signal = Signal::Branch;
		instruction.branch_condition = BranchCondition::Always;
		instruction.relative = relative;
		instruction.raddr_a = 0;
		instruction.branch_register = false;
		instruction.immediate = 0;
		Ok(InstructionContext::ADD)
	}

	/// Turns the instruction into a semaphore instruction. Returns whether an existing load immediate is combined.
	///
	/// # Errors
	/// If anything other than a plain load immediate is already part of the instruction.
	pub fn begin_semaphore(&mut self) -> Result<bool> {
		let instruction = &mut self.instruction;
		let combined = match instruction.signal {
			Signal::LoadImmediate if instruction.load_mode == LoadMode::Immediate => true,
			Signal::None
				if instruction.op_add == AddOp::Nop
					&& instruction.op_mul == MulOp::Nop
					&& instruction.raddr_a == NOP_REGISTER
					&& instruction.raddr_b == NOP_REGISTER =>
			{
				instruction.signal = Signal::LoadImmediate;
				false
			},
			_ => return Err(InstructionError::SemaphoreNotAlone),
		};
		instruction.load_mode = LoadMode::Semaphore;
		Ok(combined)
	}

	/// Sets the semaphore number and direction; `value` has bit 4 set for acquire.
	///
	/// # Errors
	/// If a combined load immediate value does not agree in the low five bits.
	pub const fn set_semaphore(&mut self, combined: bool, value: u32) -> Result {
		if combined {
			if self.instruction.immediate & 0x1f != value & 0x1f {
				return Err(InstructionError::SemaphoreMismatch);
			}
		} else {
			self.instruction.immediate = value;
		}
		Ok(())
	}

	/// Adds a signal such as `thrsw`.
	///
	/// # Errors
	/// If another signal or an immediate already occupies the signal field.
	pub fn add_signal(&mut self, signal: Signal) -> Result {
		match self.instruction.signal {
			Signal::None => {
				self.instruction.signal = signal;
				Ok(())
			},
			Signal::Branch | Signal::LoadImmediate | Signal::SmallImmediate => Err(InstructionError::SignalWithImmediate),
			_ => Err(InstructionError::MultipleSignals),
		}
	}

	//#endregion
	//#region Operands

	/// Allocates a source multiplexer for reading `register`, claiming a register file port where needed.
	///
	/// # Errors
	/// If the register cannot be read or both suitable register file ports are taken.
	pub fn read_register(&mut self, register: RegisterDescriptor) -> Result<Mux> {
		let capabilities = register.capabilities;
		if capabilities.contains(RegisterCapabilities::SEMAPHORE) {
			return Err(InstructionError::SemaphoreSource);
		}
		if !capabilities.contains(RegisterCapabilities::READ) {
			if !capabilities.contains(RegisterCapabilities::ACCUMULATOR) {
				return Err(InstructionError::NotReadable);
			}
			// Accumulators are read directly through the multiplexer.
			return match register.number ^ 32 {
				0 => Ok(Mux::R0),
				1 => Ok(Mux::R1),
				2 => Ok(Mux::R2),
				3 => Ok(Mux::R3),
				4 => Ok(Mux::R4),
				5 => Ok(Mux::R5),
				_ => Err(InstructionError::NotReadable),
			};
		}

		let in_a = capabilities.contains(RegisterCapabilities::FILE_A);
		let in_b = capabilities.contains(RegisterCapabilities::FILE_B);
		let port_free = |instruction: &Instruction, mux: Mux, address: u8| {
			address == register.number || !instruction.uses_mux(mux)
		};

		if in_a && port_free(&self.instruction, Mux::RegisterA, self.instruction.raddr_a) {
			return Ok(self.claim_port(register, Mux::RegisterA));
		}
		if in_b {
			if self.instruction.signal >= Signal::SmallImmediate {
				return Err(InstructionError::FileBConflictsWithSmallImmediate);
			}
			if port_free(&self.instruction, Mux::RegisterB, self.instruction.raddr_b) {
				return Ok(self.claim_port(register, Mux::RegisterB));
			}
		}

		// The register is exclusive to one file: try to move the other read to the other file.
		let target = match (in_a, in_b) {
			(true, false) => Some((Mux::RegisterA, Mux::RegisterB, self.instruction.raddr_b)),
			(false, true) => Some((Mux::RegisterB, Mux::RegisterA, self.instruction.raddr_a)),
			_ => None,
		};
		if let Some((wanted, other, other_address)) = target
			&& port_free(&self.instruction, other, other_address)
			&& !self.flags.contains(InstructionFlags::NO_SWAP)
			&& self.instruction.try_file_swap()
		{
			return Ok(self.claim_port(register, wanted));
		}
		Err(InstructionError::ReadConflict)
	}

	fn claim_port(&mut self, register: RegisterDescriptor, mux: Mux) -> Mux {
		let (address, other_file) = match mux {
			Mux::RegisterA => (&mut self.instruction.raddr_a, RegisterCapabilities::FILE_B),
			_ => (&mut self.instruction.raddr_b, RegisterCapabilities::FILE_A),
		};
		*address = register.number;
		if !register.capabilities.contains(other_file) {
			self.flags |= InstructionFlags::NO_SWAP;
		}
		mux
	}

	/// Sets the small immediate field to `code`.
	///
	/// # Errors
	/// If the field already holds a different value or is unavailable.
	pub fn do_small_immediate(&mut self, code: u8) -> Result {
		match self.instruction.signal {
			Signal::SmallImmediate => {
				let current = self.instruction.small_immediate;
				if current == code {
					return Ok(());
				}
				// Rotation codes supply the same value as the codes 16 to 31.
				if code & 16 != 0 && (current ^ code) & 31 == 0 {
					self.instruction.small_immediate |= code;
					return Ok(());
				}
				Err(InstructionError::MultipleSmallImmediates { requested: code, current })
			},
			Signal::None => {
				if self.instruction.raddr_b != NOP_REGISTER {
					return Err(InstructionError::SmallImmediateWithFileB);
				}
				self.instruction.signal = Signal::SmallImmediate;
				self.instruction.small_immediate = code;
				Ok(())
			},
			_ => Err(InstructionError::SignalWithSmallImmediate),
		}
	}

	/// Writes the target of the slot selected by `context`.
	///
	/// # Errors
	/// If the register is not writable or the register file, pack mode or rotation conflict with the instruction.
	pub fn set_target(&mut self, context: &mut InstructionContext, register: RegisterDescriptor) -> Result {
		context.insert(InstructionContext::TARGET);
		if !register.capabilities.contains(RegisterCapabilities::WRITE) {
			return Err(InstructionError::NotWritable);
		}
		let slot = context.slot();
		let mul = slot == Slot::Mul;
		let instruction = &mut self.instruction;

		let files = register.capabilities & RegisterCapabilities::FILES;
		if files != RegisterCapabilities::FILES {
			let other_frozen = !instruction.is_file_independent_write(slot.other());
			if files.contains(RegisterCapabilities::FILE_A) && (!other_frozen || instruction.write_swap == mul) {
				instruction.write_swap = mul;
			} else if files.contains(RegisterCapabilities::FILE_B) && (!other_frozen || instruction.write_swap != mul) {
				instruction.write_swap = !mul;
			} else {
				return Err(InstructionError::SameWriteFile);
			}
		}

		// A pack mode given at the opcode is checked against the now known target.
		if instruction.signal != Signal::Branch
			&& instruction.pack != Pack::None
			&& instruction.pm == mul
			&& (mul || !instruction.write_swap)
		{
			if !mul {
				if register.number >= 32 {
					return Err(InstructionError::AddPackNeedsFileA);
				}
			} else if instruction.write_swap && register.number < 32 && instruction.unpack == Unpack::None {
				instruction.pm = false;
			} else if instruction.pack < Pack::Replicate8888Saturate {
				return Err(InstructionError::MulPackNotSaturated);
			} else {
				instruction.pack = color_pack(instruction.pack);
			}
		}

		match slot {
			Slot::Add => instruction.waddr_add = register.number,
			Slot::Mul => instruction.waddr_mul = register.number,
		}
		if instruction.signal != Signal::Branch {
			self.activate(slot);
		}

		match register.rotation {
			0 => Ok(()),
			ROTATE_BY_R5 => Err(InstructionError::TargetRotationByR5),
			rotation => self.apply_rotation(context, 16 - rotation),
		}
	}

	/// Requests a MUL ALU vector rotation of the sources by `amount` elements to the right; [`ROTATE_BY_R5`] rotates by
	/// the contents of r5. An amount of zero only checks whether an earlier rotation of the first source also affects
	/// the second.
	///
	/// # Errors
	/// If the rotation conflicts with an earlier rotation, the small immediate, or cannot be moved to the MUL ALU.
	pub fn apply_rotation(&mut self, context: &mut InstructionContext, amount: u8) -> Result {
		let second = context.is_second_source();
		if amount == 0 {
			let instruction = &self.instruction;
			if second
				&& self.rotation_use.contains(Requests::FIRST_SOURCE)
				&& (instruction.mul_b.is_accumulator()
					|| instruction.small_immediate & 3 != 0
					|| instruction.small_immediate == ROTATION_BY_R5)
			{
				self.advise(InstructionWarning::RotationAppliesToSecondSource);
			}
			return Ok(());
		}

		let request = context.request();
		if self.rotation_use.intersects(Requests::OPCODE | request) {
			return Err(InstructionError::MultipleRotations);
		}
		if *context & InstructionContext::BOTH != InstructionContext::MUL && !self.try_slot_swap(context) {
			return Err(InstructionError::RotationOnlyInMul);
		}
		context.remove(InstructionContext::CAN_SWAP);

		let mux = if second { self.instruction.mul_b } else { self.instruction.mul_a };
		if mux == Mux::R5 {
			self.advise(InstructionWarning::R5NotRotatable);
		}
		let mut code = ROTATION_BY_R5 + (amount & 15);
		let is_accumulator = mux.is_accumulator();
		if !is_accumulator && code > ROTATION_BY_R5 + 3 && code < 64 - 3 {
			self.advise(InstructionWarning::PartialRotation { mux: mux.name() });
		}

		let instruction = &mut self.instruction;
		if instruction.signal == Signal::SmallImmediate {
			let current = instruction.small_immediate;
			let mask = if !is_accumulator
				|| (second && !instruction.mul_a.is_accumulator() && !instruction.uses_mux(Mux::RegisterB))
			{
				0x13
			} else {
				0x1f
			};
			if (current ^ code) & mask != 0 {
				return Err(if current < ROTATION_BY_R5 {
					InstructionError::RotationConflictsWithSmallImmediate
				} else {
					InstructionError::DifferentRotations
				});
			}
			if is_accumulator {
				instruction.small_immediate = code;
			} else {
				code = current | 0x20;
			}
		}

		if second
			&& (instruction.signal != Signal::SmallImmediate || instruction.small_immediate < ROTATION_BY_R5)
			&& (instruction.mul_a.is_accumulator() || code & 3 != 0)
		{
			self.advise(InstructionWarning::RotationAppliesToFirstSource);
		}
		self.rotation_use |= request;
		self.do_small_immediate(code)
	}

	/// Assigns a register source to a `mov`: the slot becomes an identity operation on it. Returns the multiplexer for
	/// the unpack check.
	///
	/// # Errors
	/// If the register cannot be read or combined with the instruction.
	pub fn move_register(&mut self, context: &mut InstructionContext, register: RegisterDescriptor) -> Result<Mux> {
		if self.instruction.signal == Signal::LoadImmediate {
			return Err(InstructionError::RegisterMoveWithImmediate);
		}
		let mux = self.read_register(register)?;
		if context.contains(InstructionContext::MUL) {
			self.instruction.mul_a = mux;
			self.instruction.mul_b = mux;
			self.instruction.op_mul = MulOp::V8min;
		}
		if context.contains(InstructionContext::ADD) {
			self.instruction.add_a = mux;
			self.instruction.add_b = mux;
			self.instruction.op_add = AddOp::Or;
		}
		self.apply_rotation(context, register.rotation)?;
		Ok(mux)
	}

	/// Tries to produce `value` in the current slot without a load immediate, by a small immediate and possibly an
	/// operation or pack mode. Returns `false` if the value cannot be produced this way; the caller then falls back to a
	/// load immediate.
	///
	/// # Errors
	/// If a small immediate is generally unavailable in this instruction.
	pub fn try_small_immediate(&mut self, context: &mut InstructionContext, value: u32) -> Result<bool> {
		if value == 0 {
			// Zero needs no small immediate at all.
			let operation = match context.slot() {
				Slot::Add => SlotOperation::Add(AddOp::Xor),
				Slot::Mul => SlotOperation::Mul(MulOp::V8subs),
			};
			self.set_identity_operation(operation, Mux::R0);
			return Ok(true);
		}
		match self.instruction.signal {
			Signal::None =>
				if self.instruction.raddr_b != NOP_REGISTER {
					return Err(InstructionError::ImmediateCollidesWithFileB);
				},
			Signal::SmallImmediate => {},
			_ => return Err(InstructionError::ImmediateWithSignal),
		}

		for entry in small_immediate::lookup(value) {
			let instruction = &self.instruction;
			if instruction.signal != Signal::None
				&& !(instruction.signal == Signal::SmallImmediate && instruction.small_immediate == entry.code)
			{
				continue;
			}
			if entry.pack != Pack::None {
				if instruction.pack != Pack::None && (instruction.pack != entry.pack || instruction.pm != entry.pm) {
					continue;
				}
				if !entry.pm {
					if instruction.set_flags {
						continue;
					}
					let slot = context.slot();
					if !instruction.writes_file_a(slot) || instruction.waddr(slot) >= 32 {
						continue;
					}
				}
			}
			if entry.operation.slot() != context.slot() && !self.try_slot_swap(context) {
				continue;
			}

			self.instruction.signal = Signal::SmallImmediate;
			self.instruction.small_immediate = entry.code;
			if entry.pack != Pack::None {
				self.instruction.pack = entry.pack;
				self.instruction.pm = entry.pm;
			}
			self.set_identity_operation(entry.operation, Mux::RegisterB);
			return Ok(true);
		}
		Ok(false)
	}

	fn set_identity_operation(&mut self, operation: SlotOperation, mux: Mux) {
		match operation {
			SlotOperation::Add(op) => {
				self.instruction.op_add = op;
				self.instruction.add_a = mux;
				self.instruction.add_b = mux;
			},
			SlotOperation::Mul(op) => {
				self.instruction.op_mul = op;
				self.instruction.mul_a = mux;
				self.instruction.mul_b = mux;
			},
		}
	}

	/// Loads a 32-bit immediate into the targets.
	///
	/// # Errors
	/// If the instruction cannot become a load immediate or already loads a different value.
	pub fn load_immediate(&mut self, value: u32, mode: LoadMode) -> Result {
		let instruction = &mut self.instruction;
		match instruction.signal {
			Signal::SmallImmediate => return Err(InstructionError::ImmediatePairUnsupported),
			Signal::LoadImmediate =>
				if instruction.immediate != value || instruction.load_mode != mode {
					return Err(InstructionError::DifferentImmediates { current: instruction.immediate, requested: value });
				},
			Signal::None =>
				if instruction.op_add != AddOp::Nop
					|| instruction.op_mul != MulOp::Nop
					|| instruction.raddr_a != NOP_REGISTER
					|| instruction.raddr_b != NOP_REGISTER
				{
					return Err(InstructionError::ImmediateWithAlu);
				},
			_ => return Err(InstructionError::ImmediateWithSignal),
		}
		instruction.signal = Signal::LoadImmediate;
		instruction.load_mode = mode;
		instruction.immediate = value;
		Ok(())
	}

	/// Uses a constant as an ALU source operand through the small immediate field. Returns the multiplexer.
	///
	/// # Errors
	/// If the value has no small immediate encoding or the field is taken.
	pub fn small_immediate_source(&mut self, context: InstructionContext, mut value: i64) -> Result<Mux> {
		let instruction = &mut self.instruction;
		if context.is_second_source() && !context.contains(InstructionContext::MUL) {
			match instruction.op_add {
				AddOp::Add | AddOp::Sub =>
					if value == 16
						|| (instruction.signal == Signal::SmallImmediate
							&& i64::from(instruction.small_immediate_value() as i32) == -value)
					{
						instruction.op_add = if instruction.op_add == AddOp::Add { AddOp::Sub } else { AddOp::Add };
						value = -value;
					},
				// Shifts only use the low five bits.
				AddOp::Asr | AddOp::Shl | AddOp::Shr | AddOp::Ror => value = (value << 59) >> 59,
				_ => {},
			}
		}
		let value = value as u32;
		let code = small_immediate::code_for_value(value).ok_or(InstructionError::ImmediateDoesNotFit(value))?;
		self.do_small_immediate(code)?;
		Ok(Mux::RegisterB)
	}

	/// Same as [`Self::small_immediate_source`] for a float constant.
	///
	/// # Errors
	/// If the value has no small immediate encoding or the field is taken.
	pub fn small_immediate_float(&mut self, value: f32) -> Result<Mux> {
		let value = value.to_bits();
		let code = small_immediate::code_for_value(value).ok_or(InstructionError::ImmediateDoesNotFit(value))?;
		self.do_small_immediate(code)?;
		Ok(Mux::RegisterB)
	}

	/// Claims a register file port or the small immediate field without using the value, for `read`.
	///
	/// # Errors
	/// If the register is an accumulator or rotated, or the port is taken.
	pub fn read_only(&mut self, register: RegisterDescriptor) -> Result {
		if matches!(self.instruction.signal, Signal::LoadImmediate | Signal::Branch) {
			return Err(InstructionError::ReadWithImmediate);
		}
		if register.rotation != 0 {
			return Err(InstructionError::ReadRotation);
		}
		match self.read_register(register)? {
			Mux::RegisterA | Mux::RegisterB => Ok(()),
			_ => Err(InstructionError::AccumulatorRead),
		}
	}

	//#endregion
	//#region Branch operands

	/// Adds a constant to the branch target.
	///
	/// # Errors
	/// If an immediate target was already given.
	pub const fn set_branch_immediate(&mut self, value: i64) -> Result {
		if self.instruction.immediate != 0 {
			return Err(InstructionError::TwoBranchImmediates);
		}
		self.instruction.immediate = value as u32;
		Ok(())
	}

	/// Adds a register to the branch target.
	///
	/// # Errors
	/// If the register is not a register file A general purpose register or a register was already given.
	pub fn set_branch_register(&mut self, register: RegisterDescriptor) -> Result {
		if register.number == NOP_REGISTER
			&& register.rotation == 0
			&& register.capabilities.intersects(RegisterCapabilities::FILES)
		{
			return Ok(());
		}
		if !register.capabilities.contains(RegisterCapabilities::FILE_A) || register.number >= 32 {
			return Err(InstructionError::BranchRegisterNotFileA);
		}
		if register.rotation != 0 {
			return Err(InstructionError::BranchRotation);
		}
		if self.instruction.branch_register {
			return Err(InstructionError::TwoBranchRegisters);
		}
		// The low bit of the branch register shares its bit with the set flags bit.
		let odd = register.number & 1 != 0;
		if odd != self.instruction.set_flags {
			if self.instruction.set_flags {
				return Err(InstructionError::BranchSetFlagsEvenRegister);
			}
			self.advise(InstructionWarning::OddBranchRegister);
			self.instruction.set_flags = true;
		}
		self.instruction.branch_register = true;
		self.instruction.raddr_a = register.number;
		Ok(())
	}

	//#endregion
	//#region Extensions

	/// Sets the write condition of the slot selected by `context`.
	///
	/// # Errors
	/// On branches, or if a condition was already given.
	pub fn add_condition(&mut self, context: InstructionContext, condition: Condition) -> Result {
		if self.instruction.signal == Signal::Branch {
			return Err(InstructionError::ConditionOnBranch);
		}
		let (slot, bit) = match context.slot() {
			Slot::Add => (Slot::Add, InstructionContext::ADD),
			Slot::Mul => (Slot::Mul, InstructionContext::MUL),
		};
		let current = self.instruction.condition_mut(slot);
		if self.explicit_conditions.contains(bit) || !matches!(*current, Condition::Never | Condition::Always) {
			return Err(InstructionError::ConditionAlreadySpecified);
		}
		*current = condition;
		self.explicit_conditions |= bit;
		Ok(())
	}

	/// Sets the branch condition.
	///
	/// # Errors
	/// If this is no branch, or a condition was already given.
	pub const fn add_branch_condition(&mut self, condition: BranchCondition) -> Result {
		if !matches!(self.instruction.signal, Signal::Branch) {
			return Err(InstructionError::BranchConditionOnAlu);
		}
		if !matches!(self.instruction.branch_condition, BranchCondition::Always) {
			return Err(InstructionError::MultipleBranchConditions);
		}
		self.instruction.branch_condition = condition;
		Ok(())
	}

	/// Sets the pack mode, choosing between register file A pack and MUL ALU color pack.
	///
	/// # Errors
	/// On branches, if a pack mode was already given, or the mode cannot be used with the target.
	pub fn add_pack(&mut self, context: InstructionContext, pack: Pack) -> Result {
		let instruction = &mut self.instruction;
		if instruction.signal == Signal::Branch {
			return Err(InstructionError::PackOnBranch);
		}
		if instruction.pack != Pack::None {
			return Err(InstructionError::MultiplePacks);
		}
		let mut pm = context.contains(InstructionContext::MUL);
		let mut mode = pack;
		if context.contains(InstructionContext::TARGET) {
			if !pm {
				if instruction.write_swap || instruction.waddr_add >= 32 {
					return Err(InstructionError::AddPackNeedsFileA);
				}
			} else if instruction.write_swap && instruction.waddr_mul < 32 && !instruction.pm {
				// Register file A pack is preferred for the MUL ALU as well.
				pm = false;
			} else if pack < Pack::Replicate8888Saturate {
				return Err(InstructionError::MulPackNotSaturated);
			} else {
				mode = color_pack(pack);
			}
		}
		if instruction.unpack != Unpack::None && instruction.pm != pm {
			return Err(InstructionError::PackConflictsWithUnpack);
		}
		instruction.pm = pm;
		instruction.pack = mode;
		Ok(())
	}

	/// Requests an unpack mode for the sources selected by `context`. The mode is validated against the actual source
	/// by [`Self::check_unpack`].
	///
	/// # Errors
	/// On immediates, or if a different unpack mode was already given.
	pub fn add_unpack(&mut self, context: InstructionContext, unpack: Unpack) -> Result {
		if self.instruction.signal >= Signal::LoadImmediate {
			return Err(InstructionError::UnpackOnImmediate);
		}
		let request = context.request();
		if self.unpack_use.intersects(Requests::OPCODE | request) {
			return Err(InstructionError::MultipleUnpacks);
		}
		if self.instruction.unpack != unpack {
			if self.instruction.unpack != Unpack::None {
				return Err(InstructionError::DifferentUnpacks);
			}
			self.instruction.unpack = unpack;
			self.unpack_use |= Requests::NEW;
		}
		self.unpack_use |= request;
		Ok(())
	}

	/// Whether a source is affected by unpack; `Some(pm)` with the PM bit it requires.
	fn unpack_mode_of(&self, mux: Mux) -> Option<bool> {
		match mux {
			Mux::R4 => Some(true),
			Mux::RegisterA if self.instruction.raddr_a < 32 => Some(false),
			_ => None,
		}
	}

	/// Whether the other ALU has a source that an unpack mode with the given PM bit would affect.
	fn other_alu_unpacks(&self, mul: bool, pm: Option<bool>) -> bool {
		let instruction = &self.instruction;
		let matches = |mux: Mux| {
			let mode = self.unpack_mode_of(mux);
			pm.map_or(mode.is_some(), |pm| mode == Some(pm))
		};
		if mul {
			matches(instruction.add_b) || (!instruction.is_unary() && matches(instruction.add_a))
		} else {
			matches(instruction.mul_b) || matches(instruction.mul_a)
		}
	}

	/// Checks a source operand against the requested unpack mode, and commits the PM bit the source requires.
	///
	/// # Errors
	/// If the source cannot be unpacked, or unpacking would change the semantics of another operand.
	pub fn check_unpack(&mut self, context: InstructionContext, mux: Mux) -> Result {
		let second = context.is_second_source();
		let mul = context.contains(InstructionContext::MUL);
		if self.unpack_use.intersects(Requests::OPCODE | context.request()) {
			let pm = if let Some(pm) = self.unpack_mode_of(mux) {
				pm
			} else if !self.unpack_use.contains(Requests::OPCODE) {
				return Err(InstructionError::CannotUnpackSource);
			} else {
				if second {
					let first = if mul { self.instruction.mul_a } else { self.instruction.add_a };
					if !((mul || !self.instruction.is_unary()) && self.unpack_mode_of(first).is_some()) {
						return Err(InstructionError::UnpackAppliesToNoSource);
					}
				}
				self.instruction.pm
			};
			if self.unpack_use.contains(Requests::NEW) && self.other_alu_unpacks(mul, Some(pm)) {
				return Err(InstructionError::UnpackChangesOtherAlu);
			}
			if pm != self.instruction.pm {
				if self.instruction.pack != Pack::None {
					return Err(InstructionError::UnpackConflictsWithPack);
				}
				if second && self.unpack_use.contains(Requests::FIRST_SOURCE) {
					return Err(InstructionError::ConflictingSourceUnpacks);
				}
				if self.other_alu_unpacks(mul, None) {
					return Err(InstructionError::DifferentUnpackModes);
				}
				self.instruction.pm = pm;
			}
		} else if self.instruction.unpack != Unpack::None
			&& self.unpack_mode_of(mux).is_some_and(|pm| pm == self.instruction.pm)
		{
			return Err(InstructionError::UnpackSilentlyApplies { second });
		}
		Ok(())
	}

	/// Sets the set flags bit.
	///
	/// # Errors
	/// If the flags would be taken from the other ALU, or the bit is already set.
	pub fn add_set_flags(&mut self, context: &mut InstructionContext) -> Result {
		let instruction = &self.instruction;
		if instruction.signal < Signal::LoadImmediate
			&& context.contains(InstructionContext::MUL)
			&& (instruction.waddr_add != NOP_REGISTER || instruction.op_add != AddOp::Nop)
			&& !self.try_slot_swap(context)
		{
			return Err(InstructionError::SetFlagsAddInUse);
		}
		if self.instruction.set_flags {
			return Err(InstructionError::DuplicateSetFlags);
		}
		self.instruction.set_flags = true;
		context.remove(InstructionContext::CAN_SWAP);
		Ok(())
	}

	//#endregion
}

/// MUL ALU color pack modes are encoded like the register file A modes without saturation.
fn color_pack(pack: Pack) -> Pack {
	match pack {
		Pack::Replicate8888Saturate => Pack::Replicate8888,
		Pack::Byte8aSaturate => Pack::Byte8a,
		Pack::Byte8bSaturate => Pack::Byte8b,
		Pack::Byte8cSaturate => Pack::Byte8c,
		Pack::Byte8dSaturate => Pack::Byte8d,
		other => other,
	}
}
