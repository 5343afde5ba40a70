//! Disassembler.
//!
//! Renders instruction words as assembler source. Every line reassembles to the same word up to the encoding choices
//! that the assembler makes by itself, such as the slot of a `mov`.

use std::collections::BTreeMap;

use num_traits::FromPrimitive;

use crate::instruction::alu::{evaluate_add, evaluate_mul, evaluate_pack};
use crate::instruction::small_immediate::ROTATION_BY_R5;
use crate::instruction::{AddOp, Condition, Instruction, LoadMode, MulOp, Mux, NOP_REGISTER, Pack, Signal, Slot};

pub mod names;
#[cfg(test)] mod test;

/// Size of an instruction word in bytes.
const WORD_SIZE: u32 = 8;
/// Branches return to the fourth instruction after them.
const BRANCH_DELAY: u32 = 4 * WORD_SIZE;
/// Width of the text column when comments are printed.
const TEXT_WIDTH: usize = 55;

/// Rendering switches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisassemblerOptions {
	/// Render register copies and constants produced by ALU operations as `mov`.
	pub use_mov:       bool,
	/// Render immediates that look like floats as floats.
	pub use_float:     bool,
	/// Add the raw instruction fields to the comment column.
	pub print_fields:  bool,
	/// Print the comment column with address and word at all.
	pub print_comment: bool,
	/// Byte address of the first instruction.
	pub base:          u32,
}

impl Default for DisassemblerOptions {
	fn default() -> Self {
		Self { use_mov: true, use_float: false, print_fields: true, print_comment: true, base: 0 }
	}
}

/// Disassembler for a sequence of instruction words.
#[derive(Clone, Debug, Default)]
pub struct Disassembler {
	options: DisassemblerOptions,
	labels:  BTreeMap<u32, String>,
}

impl Disassembler {
	/// Creates a disassembler without any labels.
	#[must_use]
	pub const fn new(options: DisassemblerOptions) -> Self {
		Self { options, labels: BTreeMap::new() }
	}

	/// The labels by byte address.
	#[must_use]
	pub const fn labels(&self) -> &BTreeMap<u32, String> {
		&self.labels
	}

	/// Replaces all labels with the given ones.
	pub fn provide_labels(&mut self, labels: BTreeMap<u32, String>) {
		self.labels = labels;
	}

	/// Adds a label for every branch target and every link address of `words`. Existing labels are kept.
	pub fn scan_labels(&mut self, words: &[u64]) {
		for (index, &word) in words.iter().enumerate() {
			let instruction = Instruction::decode(word);
			if instruction.signal != Signal::Branch {
				continue;
			}
			let source = self.address_of(index);
			let return_point = source.wrapping_add(BRANCH_DELAY);
			for slot in [Slot::Add, Slot::Mul] {
				let address = instruction.waddr(slot);
				if address != NOP_REGISTER {
					let name = format!(
						"LL{}_{}",
						self.labels.len(),
						names::write_register(address, instruction.writes_file_a(slot))
					);
					self.labels.entry(return_point).or_insert(name);
				}
			}
			if instruction.immediate == 0 {
				continue;
			}
			let target = branch_target(&instruction, return_point);
			self.labels.entry(target).or_insert_with(|| format!("L{target:x}_{source:x}"));
		}
	}

	fn address_of(&self, index: usize) -> u32 {
		self.options.base.wrapping_add((index as u32).wrapping_mul(WORD_SIZE))
	}

	/// Disassembles all words into source text, one instruction per line, with label lines in between.
	#[must_use]
	pub fn disassemble(&self, words: &[u64]) -> String {
		let mut output = String::new();
		for (index, &word) in words.iter().enumerate() {
			let address = self.address_of(index);
			if let Some(label) = self.labels.get(&address) {
				output.push(':');
				output.push_str(label);
				output.push('\n');
			}
			let (text, fields) = self.disassemble_instruction(word, address);
			let line = if self.options.print_comment {
				format!("\t{text:<TEXT_WIDTH$} # {address:04x}: {word:016x} {fields}")
			} else {
				format!("\t{text}")
			};
			output.push_str(line.trim_end());
			output.push('\n');
		}
		output
	}

	/// Disassembles one word at the given byte address. Returns the statement text and the field breakdown, which is
	/// empty unless requested.
	#[must_use]
	pub fn disassemble_instruction(&self, word: u64, address: u32) -> (String, String) {
		let instruction = Instruction::decode(word);
		let mut line = Line { options: &self.options, labels: &self.labels, instruction, text: String::new() };
		match instruction.signal {
			Signal::Branch => line.branch(address),
			Signal::LoadImmediate => line.load_immediate(),
			_ => line.alu(),
		}
		let fields = if self.options.print_fields { fields(&instruction) } else { String::new() };
		(line.text, fields)
	}
}

/// Absolute byte address a branch with a nonzero immediate jumps to.
fn branch_target(instruction: &Instruction, return_point: u32) -> u32 {
	if instruction.relative { return_point.wrapping_add(instruction.immediate) } else { instruction.immediate }
}

/// Raw field values for the comment column.
fn fields(instruction: &Instruction) -> String {
	let i = instruction;
	match i.signal {
		Signal::Branch => format!(
			"rel{} reg{} ra{:02} Bcc{:X} Aw{:02} Mw{:02} ws{}",
			u8::from(i.relative),
			u8::from(i.branch_register),
			i.raddr_a,
			i.branch_condition as u8,
			i.waddr_add,
			i.waddr_mul,
			u8::from(i.write_swap)
		),
		Signal::LoadImmediate => format!(
			"md{} pm{} pck{:X} Acc{} Aw{:02} Mcc{} Mw{:02} sf{} ws{}",
			i.load_mode as u8,
			u8::from(i.pm),
			i.pack as u8,
			i.cond_add as u8,
			i.waddr_add,
			i.cond_mul as u8,
			i.waddr_mul,
			u8::from(i.set_flags),
			u8::from(i.write_swap)
		),
		signal => format!(
			"sig{:X} ra{:02} rb{:02} pm{} upk{} pck{:X} Aop{:02} Acc{} Aw{:02} Aa{} Ab{} Mop{} Mcc{} Mw{:02} Ma{} Mb{} sf{} \
			 ws{}",
			signal as u8,
			i.raddr_a,
			if signal == Signal::SmallImmediate { i.small_immediate } else { i.raddr_b },
			u8::from(i.pm),
			i.unpack as u8,
			i.pack as u8,
			i.op_add as u8,
			i.cond_add as u8,
			i.waddr_add,
			i.add_a as u8,
			i.add_b as u8,
			i.op_mul as u8,
			i.cond_mul as u8,
			i.waddr_mul,
			i.mul_a as u8,
			i.mul_b as u8,
			u8::from(i.set_flags),
			u8::from(i.write_swap)
		),
	}
}

/// ADD operations that return their operand, or zero, if both operands are equal.
const fn is_add_copy(op: AddOp) -> bool {
	matches!(op, AddOp::Sub | AddOp::Min | AddOp::Max | AddOp::And | AddOp::Or | AddOp::Xor | AddOp::V8subs)
}

/// MUL operations that return their operand, or zero, if both operands are equal.
const fn is_mul_copy(op: MulOp) -> bool {
	matches!(op, MulOp::V8min | MulOp::V8max | MulOp::V8subs)
}

/// Pack modes that a constant can be folded through.
const fn is_foldable_pack(pack: Pack) -> bool {
	matches!(pack, Pack::None | Pack::Replicate8888 | Pack::Saturate32 | Pack::Replicate8888Saturate)
}

/// The text of one instruction under construction.
struct Line<'a> {
	options:     &'a DisassemblerOptions,
	labels:      &'a BTreeMap<u32, String>,
	instruction: Instruction,
	text:        String,
}

impl Line<'_> {
	fn push(&mut self, text: &str) {
		self.text.push_str(text);
	}

	fn push_extension(&mut self, suffix: &str) {
		if !suffix.is_empty() {
			self.text.push('.');
			self.text.push_str(suffix);
		}
	}

	fn push_condition(&mut self, condition: Condition) {
		self.push_extension(condition.suffix());
	}

	/// Whether the pack mode applies to the result of `slot`.
	const fn packs(&self, slot: Slot) -> bool {
		let instruction = &self.instruction;
		if instruction.pm { matches!(slot, Slot::Mul) } else { instruction.writes_file_a(slot) }
	}

	fn push_pack(&mut self, slot: Slot) {
		if self.packs(slot) {
			let instruction = &self.instruction;
			// Color packs are written with the saturating suffix of the same mode.
			let pack = if instruction.pm && instruction.pack >= Pack::Replicate8888 && instruction.pack <= Pack::Byte8d {
				Pack::from_u8(instruction.pack as u8 + 8).unwrap_or(instruction.pack)
			} else {
				instruction.pack
			};
			self.push_extension(pack.suffix());
		}
	}

	fn push_target(&mut self, slot: Slot) {
		let instruction = &self.instruction;
		let name = names::write_register(instruction.waddr(slot), instruction.writes_file_a(slot));
		self.push(&name);
	}

	fn push_immediate(&mut self, value: u32) {
		let exponent = ((value >> 23) & 0xff) as i32;
		let text = if self.options.use_float && (exponent - 0x80).abs() <= 20 {
			format!("{:.6e}", f32::from_bits(value))
		} else if (value as i32).unsigned_abs() < 256 {
			(value as i32).to_string()
		} else {
			format!("0x{value:x}")
		};
		self.push(&text);
	}

	fn push_per_element(&mut self, signed: bool) {
		let value = self.instruction.immediate;
		let elements: Vec<String> = (0 .. 16)
			.map(|element| {
				let low = (value >> element) & 1;
				let high = (value >> (16 + element)) & 1;
				if signed { (low as i32 - 2 * high as i32).to_string() } else { (low + 2 * high).to_string() }
			})
			.collect();
		self.text.push('[');
		self.push(&elements.join(","));
		self.text.push(']');
	}

	fn push_source(&mut self, mux: Mux) {
		let instruction = self.instruction;
		let text = match mux {
			Mux::RegisterA => names::read_register(instruction.raddr_a, true).into_owned(),
			Mux::RegisterB if instruction.signal == Signal::SmallImmediate =>
				names::small_immediate(instruction.small_immediate),
			Mux::RegisterB => names::read_register(instruction.raddr_b, false).into_owned(),
			accumulator => accumulator.name().to_owned(),
		};
		self.push(&text);
		if (instruction.pm && mux == Mux::R4) || (!instruction.pm && mux == Mux::RegisterA) {
			self.push_extension(instruction.unpack.suffix());
		}
	}

	/// Appends a MUL ALU source including its vector rotation.
	fn push_mul_source(&mut self, mux: Mux) {
		self.push(", ");
		self.push_source(mux);
		let instruction = &self.instruction;
		if instruction.signal != Signal::SmallImmediate
			|| instruction.small_immediate < ROTATION_BY_R5
			|| (mux == Mux::RegisterA && instruction.raddr_a == 32)
			|| mux == Mux::RegisterB
		{
			return;
		}
		let mut rotation = i32::from(instruction.small_immediate - ROTATION_BY_R5);
		if rotation == 0 {
			self.push(" >> r5");
			return;
		}
		if rotation >= 8 {
			rotation -= 16;
		}
		// Only accumulators r0 to r3 rotate across the full vector, everything else within quads.
		if mux as u8 >= Mux::R4 as u8 {
			rotation %= 4;
		}
		let text = if rotation < 0 { format!(" << {}", -rotation) } else { format!(" >> {rotation}") };
		self.push(&text);
	}

	fn alu(&mut self) {
		self.add();
		self.mul();
		let instruction = self.instruction;
		if instruction.raddr_a != NOP_REGISTER {
			self.read(Mux::RegisterA);
		}
		let reads_b = if instruction.signal == Signal::SmallImmediate {
			instruction.small_immediate < ROTATION_BY_R5
		} else {
			instruction.raddr_b != NOP_REGISTER
		};
		if reads_b {
			self.read(Mux::RegisterB);
		}
		if let Some(signal) = names::signal(instruction.signal) {
			self.push("; ");
			self.push(signal);
		}
	}

	/// Appends a `read` statement for a register file port that no ALU source uses.
	fn read(&mut self, file: Mux) {
		if !self.instruction.uses_mux(file) {
			self.push("; read ");
			self.push_source(file);
		}
	}

	fn add(&mut self) {
		let instruction = self.instruction;
		let op = instruction.op_add;
		let is_unary = op.is_unary();
		let is_immediate = instruction.signal == Signal::SmallImmediate
			&& op != AddOp::Nop
			&& instruction.add_a == Mux::RegisterB
			&& (is_unary || instruction.add_b == Mux::RegisterB);
		let is_move = self.options.use_mov
			&& ((instruction.add_a == instruction.add_b && is_add_copy(op)) || is_immediate);

		self.push(if is_move { "mov" } else { op.mnemonic() });
		if instruction.add_sets_flags() {
			self.push(".setf");
		}
		if op == AddOp::Nop && !is_move && instruction.waddr_add == NOP_REGISTER {
			return;
		}
		self.push_condition(instruction.cond_add);
		self.push(" ");
		self.push_target(Slot::Add);

		let fold_pack = is_move && is_immediate && self.packs(Slot::Add) && is_foldable_pack(instruction.pack);
		if !fold_pack {
			self.push_pack(Slot::Add);
		}
		if is_move {
			if matches!(op, AddOp::Sub | AddOp::Xor | AddOp::V8subs) {
				self.push(", 0");
				return;
			}
			if is_immediate {
				let operand = instruction.small_immediate_value();
				let mut value = evaluate_add(op, operand, operand);
				if fold_pack {
					value = evaluate_pack(value, instruction.pack, instruction.pm);
				}
				self.push(", ");
				self.push_immediate(value);
				return;
			}
		} else if op == AddOp::Nop {
			return;
		}
		self.push(", ");
		self.push_source(instruction.add_a);
		if !is_move && !is_unary {
			self.push(", ");
			self.push_source(instruction.add_b);
		}
	}

	fn mul(&mut self) {
		let instruction = self.instruction;
		if !instruction.is_mul_used() {
			return;
		}
		let op = instruction.op_mul;
		let is_immediate =
			instruction.signal == Signal::SmallImmediate && op != MulOp::Nop && instruction.mul_a == Mux::RegisterB;
		let is_move =
			self.options.use_mov && instruction.mul_a == instruction.mul_b && (is_mul_copy(op) || is_immediate);

		self.push("; ");
		self.push(if is_move { "mov" } else { op.mnemonic() });
		if instruction.mul_sets_flags() {
			self.push(".setf");
		}
		self.push_condition(instruction.cond_mul);
		self.push(" ");
		self.push_target(Slot::Mul);

		let fold_pack = is_move && is_immediate && self.packs(Slot::Mul) && is_foldable_pack(instruction.pack);
		if !fold_pack {
			self.push_pack(Slot::Mul);
		}
		if is_move {
			if op == MulOp::V8subs {
				self.push(", 0");
				return;
			}
			if is_immediate {
				let operand = instruction.small_immediate_value();
				let mut value = evaluate_mul(op, operand, operand);
				if fold_pack {
					value = evaluate_pack(value, instruction.pack, instruction.pm);
				}
				self.push(", ");
				self.push_immediate(value);
				return;
			}
		} else if op == MulOp::Nop {
			return;
		} else {
			self.push_mul_source(instruction.mul_a);
		}
		self.push_mul_source(instruction.mul_b);
	}

	fn load_immediate(&mut self) {
		let instruction = self.instruction;
		if instruction.load_mode == LoadMode::Semaphore {
			self.push(if instruction.immediate & 0x10 != 0 { "sacq" } else { "srel" });
		} else {
			self.push(instruction.load_mode.mnemonic());
		}
		if instruction.set_flags {
			self.push(".setf");
		}
		self.push(" ");

		for slot in [Slot::Add, Slot::Mul] {
			if instruction.waddr(slot) != NOP_REGISTER {
				self.push_target(slot);
				self.push_pack(slot);
				self.push_condition(instruction.condition(slot));
				self.push(", ");
			}
		}
		if instruction.waddr_add == NOP_REGISTER && instruction.waddr_mul == NOP_REGISTER {
			self.push("-, ");
		}

		match instruction.load_mode {
			LoadMode::PerElementSigned => self.push_per_element(true),
			LoadMode::PerElementUnsigned => self.push_per_element(false),
			LoadMode::Semaphore => self.push(&(instruction.immediate & 15).to_string()),
			_ => self.push_immediate(instruction.immediate),
		}
	}

	fn branch(&mut self, address: u32) {
		let instruction = self.instruction;
		self.push(if instruction.relative { "brr" } else { "bra" });
		self.push_extension(instruction.branch_condition.suffix());
		self.push(" ");

		for slot in [Slot::Add, Slot::Mul] {
			if instruction.waddr(slot) != NOP_REGISTER {
				self.push_target(slot);
				self.push(", ");
			}
		}
		let has_add_link = instruction.waddr_add != NOP_REGISTER;
		let has_mul_link = instruction.waddr_mul != NOP_REGISTER;
		if !has_add_link && !has_mul_link {
			self.push("-, ");
		}
		if instruction.branch_register {
			self.push(&names::read_register(instruction.raddr_a, true));
			if instruction.immediate != 0 {
				self.push(", ");
			}
		} else if has_add_link && has_mul_link {
			self.push("-, ");
		}

		let offset = instruction.immediate as i32;
		if offset != 0 {
			let return_point = address.wrapping_add(BRANCH_DELAY);
			let target = branch_target(&instruction, return_point);
			if let Some(label) = self.labels.get(&target) {
				let forward = label.starts_with(|c: char| c.is_ascii_digit()) && target > return_point;
				let text = format!(":{label}{}", if forward { "f" } else { "" });
				self.push(&text);
			} else if instruction.relative {
				self.push(&format!("{offset:+} # 0x{target:04x}"));
			} else {
				self.push(&format!("{offset} # 0x{target:04x}"));
			}
		} else if !instruction.branch_register {
			self.push(if instruction.relative { "+0" } else { "0x0" });
		}
	}
}
