//! Canonicalization of finished instructions.
//!
//! Every rule rewrites an instruction into an equivalent one that executes identically but disassembles more
//! readably, e.g. an ALU slot that can never write becomes a `nop`. Rules never touch fields that influence the
//! condition flags, register reads with side effects, or anything that branch and load immediate instructions encode
//! differently.

use super::opcode::{AddOp, Condition, MulOp, Mux, Signal};
use super::{Instruction, NOP_REGISTER, Slot};
use crate::change::Change;

/// A single rewrite rule.
pub type Rule = fn(&mut Instruction) -> Change;

/// The rules in the order they are applied.
pub const RULES: [Rule; 5] =
	[discard_dead_slots, discard_nop_targets, canonical_operations, canonical_unary, clear_idle_sources];

/// Applies all rules to the instruction.
pub fn optimize(instruction: &mut Instruction) -> Change {
	if instruction.signal == Signal::Branch {
		return Change::Unmodified;
	}
	RULES.iter().fold(Change::Unmodified, |change, rule| change | rule(instruction))
}

/// Whether the slot's result determines the condition flags. Removing such a slot changes which ALU sets the flags.
fn determines_flags(instruction: &Instruction, slot: Slot) -> bool {
	match slot {
		Slot::Add => instruction.set_flags && instruction.op_add != AddOp::Nop,
		Slot::Mul => instruction.set_flags,
	}
}

fn is_idle(instruction: &Instruction, slot: Slot) -> bool {
	match slot {
		Slot::Add => instruction.op_add == AddOp::Nop,
		Slot::Mul => instruction.op_mul == MulOp::Nop,
	}
}

fn clear_slot(instruction: &mut Instruction, slot: Slot) {
	match slot {
		Slot::Add => {
			instruction.op_add = AddOp::Nop;
			instruction.waddr_add = NOP_REGISTER;
		},
		Slot::Mul => {
			instruction.op_mul = MulOp::Nop;
			instruction.waddr_mul = NOP_REGISTER;
		},
	}
	*instruction.condition_mut(slot) = Condition::Never;
}

/// A slot that never writes its result is a `nop`.
fn discard_dead_slots(instruction: &mut Instruction) -> Change {
	let mut change = Change::Unmodified;
	for slot in [Slot::Add, Slot::Mul] {
		if instruction.condition(slot) != Condition::Never || determines_flags(instruction, slot) {
			continue;
		}
		let dead = if instruction.is_alu() {
			!is_idle(instruction, slot) || instruction.waddr(slot) != NOP_REGISTER
		} else {
			instruction.waddr(slot) != NOP_REGISTER
		};
		if dead {
			if instruction.is_alu() {
				clear_slot(instruction, slot);
			} else {
				match slot {
					Slot::Add => instruction.waddr_add = NOP_REGISTER,
					Slot::Mul => instruction.waddr_mul = NOP_REGISTER,
				}
			}
			change = Change::Modified;
		}
	}
	change
}

/// A slot writing to the nop register has no effect besides its flags.
fn discard_nop_targets(instruction: &mut Instruction) -> Change {
	let mut change = Change::Unmodified;
	for slot in [Slot::Add, Slot::Mul] {
		if instruction.waddr(slot) != NOP_REGISTER || determines_flags(instruction, slot) {
			continue;
		}
		let active = instruction.condition(slot) != Condition::Never
			|| (instruction.is_alu() && !is_idle(instruction, slot));
		if active {
			if instruction.is_alu() {
				clear_slot(instruction, slot);
			} else {
				*instruction.condition_mut(slot) = Condition::Never;
			}
			change = Change::Modified;
		}
	}
	change
}

/// Operations that only copy their source when both sources are equal become the canonical copy operation.
fn canonical_operations(instruction: &mut Instruction) -> Change {
	if !instruction.is_alu() {
		return Change::Unmodified;
	}
	let mut change = Change::Unmodified;
	if instruction.add_a == instruction.add_b && !determines_flags(instruction, Slot::Add) {
		let canonical = match instruction.op_add {
			AddOp::And | AddOp::Min | AddOp::Max => AddOp::Or,
			AddOp::Sub => AddOp::Xor,
			op => op,
		};
		change |= Change::from(canonical != instruction.op_add);
		instruction.op_add = canonical;
	}
	if instruction.mul_a == instruction.mul_b
		&& instruction.op_mul == MulOp::V8max
		&& !determines_flags(instruction, Slot::Mul)
	{
		instruction.op_mul = MulOp::V8min;
		change = Change::Modified;
	}
	change
}

/// Unary operations ignore their second source.
fn canonical_unary(instruction: &mut Instruction) -> Change {
	if !instruction.is_alu() || !instruction.is_unary() || instruction.add_b == instruction.add_a {
		return Change::Unmodified;
	}
	instruction.add_b = instruction.add_a;
	Change::Modified
}

/// Sources of idle slots are not evaluated.
fn clear_idle_sources(instruction: &mut Instruction) -> Change {
	if !instruction.is_alu() {
		return Change::Unmodified;
	}
	let mut change = Change::Unmodified;
	for slot in [Slot::Add, Slot::Mul] {
		if is_idle(instruction, slot) {
			for second in [false, true] {
				let mux = instruction.mux_mut(slot, second);
				change |= Change::from(*mux != Mux::R0);
				*mux = Mux::R0;
			}
		}
	}
	change
}
