use std::collections::BTreeMap;

use super::*;
use crate::instruction::{AddOp, Condition, Instruction, LoadMode, MulOp, Mux, Signal};

fn plain() -> Disassembler {
	Disassembler::new(DisassemblerOptions { print_comment: false, ..DisassemblerOptions::default() })
}

fn text_of(instruction: Instruction) -> String {
	plain().disassemble_instruction(instruction.encode(), 0).0
}

fn relative_branch(immediate: u32) -> Instruction {
	Instruction { signal: Signal::Branch, relative: true, immediate, raddr_a: 0, ..Instruction::default() }
}

#[test]
fn nop() {
	assert_eq!(plain().disassemble_instruction(Instruction::NOP_WORD, 0).0, "nop");
}

#[test]
fn add_operation() {
	let instruction = Instruction {
		op_add: AddOp::Add,
		cond_add: Condition::Always,
		waddr_add: 0,
		raddr_a: 1,
		add_a: Mux::RegisterA,
		add_b: Mux::R1,
		..Instruction::default()
	};
	assert_eq!(text_of(instruction), "add ra0, ra1, r1");
}

#[test]
fn conditions_and_flags() {
	let instruction = Instruction {
		op_add: AddOp::Sub,
		cond_add: Condition::ZeroSet,
		set_flags: true,
		waddr_add: 33,
		add_a: Mux::R2,
		add_b: Mux::R3,
		..Instruction::default()
	};
	assert_eq!(text_of(instruction), "sub.setf.ifz r1, r2, r3");
}

#[test]
fn small_immediate_move() {
	let instruction = Instruction {
		signal: Signal::SmallImmediate,
		small_immediate: 5,
		op_add: AddOp::Or,
		cond_add: Condition::Always,
		waddr_add: 32,
		add_a: Mux::RegisterB,
		add_b: Mux::RegisterB,
		..Instruction::default()
	};
	assert_eq!(text_of(instruction), "mov r0, 5");

	let options = DisassemblerOptions { use_mov: false, print_comment: false, ..DisassemblerOptions::default() };
	let (text, _) = Disassembler::new(options).disassemble_instruction(instruction.encode(), 0);
	assert_eq!(text, "or r0, 5, 5");
}

#[test]
fn register_copy_in_mul_alu() {
	let instruction = Instruction {
		op_mul: MulOp::V8min,
		cond_mul: Condition::Always,
		waddr_mul: 3,
		raddr_a: 7,
		mul_a: Mux::RegisterA,
		mul_b: Mux::RegisterA,
		..Instruction::default()
	};
	assert_eq!(text_of(instruction), "nop; mov rb3, ra7");
}

#[test]
fn zero_move() {
	let instruction = Instruction {
		op_add: AddOp::Xor,
		cond_add: Condition::Always,
		waddr_add: 4,
		..Instruction::default()
	};
	assert_eq!(text_of(instruction), "mov ra4, 0");
}

#[test]
fn mul_rotation() {
	let instruction = Instruction {
		signal: Signal::SmallImmediate,
		small_immediate: 50,
		op_mul: MulOp::Fmul,
		cond_mul: Condition::Always,
		waddr_mul: 33,
		mul_a: Mux::R0,
		mul_b: Mux::R1,
		..Instruction::default()
	};
	assert_eq!(text_of(instruction), "nop; fmul r1, r0 >> 2, r1 >> 2");

	let by_r5 = Instruction { small_immediate: 48, ..instruction };
	assert_eq!(text_of(by_r5), "nop; fmul r1, r0 >> r5, r1 >> r5");

	let left = Instruction { small_immediate: 63, ..instruction };
	assert_eq!(text_of(left), "nop; fmul r1, r0 << 1, r1 << 1");
}

#[test]
fn unused_read_and_signal() {
	let instruction = Instruction { signal: Signal::ThreadSwitch, raddr_a: 32, ..Instruction::default() };
	assert_eq!(text_of(instruction), "nop; read unif; thrsw");
}

#[test]
fn load_immediates() {
	let immediate = Instruction {
		signal: Signal::LoadImmediate,
		cond_add: Condition::Always,
		waddr_add: 1,
		immediate: 0x1234_5678,
		..Instruction::default()
	};
	assert_eq!(text_of(immediate), "ldi ra1, 0x12345678");
	assert_eq!(text_of(Instruction { immediate: (-3i32) as u32, ..immediate }), "ldi ra1, -3");

	let per_element = Instruction { load_mode: LoadMode::PerElementUnsigned, immediate: 0x0001_0003, ..immediate };
	assert_eq!(text_of(per_element), "ldipeu ra1, [3,1,0,0,0,0,0,0,0,0,0,0,0,0,0,0]");

	let signed = Instruction { load_mode: LoadMode::PerElementSigned, immediate: 0x0001_0003, ..immediate };
	assert_eq!(text_of(signed), "ldipes ra1, [-1,1,0,0,0,0,0,0,0,0,0,0,0,0,0,0]");
}

#[test]
fn float_immediates() {
	let instruction = Instruction {
		signal: Signal::LoadImmediate,
		cond_add: Condition::Always,
		waddr_add: 1,
		immediate: 2.5f32.to_bits(),
		..Instruction::default()
	};
	assert_eq!(text_of(instruction), "ldi ra1, 0x40200000");

	let options = DisassemblerOptions { use_float: true, print_comment: false, ..DisassemblerOptions::default() };
	let (text, _) = Disassembler::new(options).disassemble_instruction(instruction.encode(), 0);
	assert_eq!(text, "ldi ra1, 2.500000e0");
}

#[test]
fn semaphores() {
	let acquire = Instruction {
		signal: Signal::LoadImmediate,
		load_mode: LoadMode::Semaphore,
		immediate: 0x13,
		..Instruction::default()
	};
	assert_eq!(text_of(acquire), "sacq -, 3");
	assert_eq!(text_of(Instruction { immediate: 7, ..acquire }), "srel -, 7");
}

#[test]
fn unresolved_branches() {
	assert_eq!(text_of(relative_branch(16)), "brr -, +16 # 0x0030");
	let absolute = Instruction { relative: false, ..relative_branch(0x100) };
	assert_eq!(text_of(absolute), "bra -, 256 # 0x0100");
	assert_eq!(text_of(relative_branch(0)), "brr -, +0");
}

#[test]
fn scanned_labels() {
	let mut words = vec![relative_branch(16).encode()];
	words.extend([Instruction::NOP_WORD; 6]);
	let mut disassembler = plain();
	disassembler.scan_labels(&words);
	assert_eq!(disassembler.labels(), &BTreeMap::from([(48, "L30_0".to_owned())]));

	let output = disassembler.disassemble(&words);
	let lines: Vec<&str> = output.lines().collect();
	assert_eq!(lines[0], "\tbrr -, :L30_0");
	assert_eq!(lines[6], ":L30_0");
	assert_eq!(lines[7], "\tnop");
	assert_eq!(lines.len(), 8);
}

#[test]
fn link_labels() {
	let branch = Instruction { waddr_add: 10, ..relative_branch((-32i32) as u32) };
	let words = [branch.encode(), Instruction::NOP_WORD, Instruction::NOP_WORD, Instruction::NOP_WORD];
	let mut disassembler = plain();
	disassembler.scan_labels(&words);
	assert_eq!(
		disassembler.labels(),
		&BTreeMap::from([(0, "L0_0".to_owned()), (32, "LL0_ra10".to_owned())])
	);
	assert_eq!(disassembler.disassemble_instruction(words[0], 0).0, "brr ra10, :L0_0");
}

#[test]
fn provided_labels_replace_scanned_ones() {
	let words = [relative_branch(16).encode()];
	let mut disassembler = plain();
	disassembler.scan_labels(&words);
	disassembler.provide_labels(BTreeMap::from([(48, "1".to_owned())]));
	assert_eq!(disassembler.disassemble_instruction(words[0], 0).0, "brr -, :1f");
}

#[test]
fn comment_column() {
	let options = DisassemblerOptions { print_fields: false, base: 0x100, ..DisassemblerOptions::default() };
	let output = Disassembler::new(options).disassemble(&[Instruction::NOP_WORD]);
	let expected = format!("\t{:<55} # 0100: 100009e7009e7000\n", "nop");
	assert_eq!(output, expected);

	let output = Disassembler::new(DisassemblerOptions::default()).disassemble(&[Instruction::NOP_WORD]);
	assert!(output.contains("# 0000: 100009e7009e7000 sig1 ra39 rb39 pm0 upk0 pck0 Aop00 Acc0 Aw39"));
}

#[test]
fn register_names() {
	assert_eq!(names::write_register(37, false), "r5rep");
	assert_eq!(names::write_register(49, true), "vr_setup");
	assert_eq!(names::read_register(38, false), "qpu_num");
	assert_eq!(names::read_register(33, true), ":[33, 5]");
	assert_eq!(names::small_immediate(16), "-16");
	assert_eq!(names::small_immediate(32), "1.0");
	assert_eq!(names::small_immediate(40), "0.00390625");
	assert_eq!(names::small_immediate(49), "-15");
}
