use super::optimize::optimize;
use super::small_immediate::{self, SlotOperation, code_for_value, code_value};
use super::*;
use crate::change::Change;
use crate::error::InstructionError;
use crate::expression::{RegisterCapabilities, RegisterDescriptor};

fn file_a(number: u8) -> RegisterDescriptor {
	RegisterDescriptor::new(
		number,
		RegisterCapabilities::FILE_A | RegisterCapabilities::READ | RegisterCapabilities::WRITE,
	)
}

fn file_b(number: u8) -> RegisterDescriptor {
	RegisterDescriptor::new(
		number,
		RegisterCapabilities::FILE_B | RegisterCapabilities::READ | RegisterCapabilities::WRITE,
	)
}

fn accumulator(number: u8) -> RegisterDescriptor {
	RegisterDescriptor::new(32 + number, RegisterCapabilities::ACCUMULATOR | RegisterCapabilities::WRITE)
}

#[test]
fn nop_word() {
	assert_eq!(Instruction::decode(Instruction::NOP_WORD), Instruction::default());
	assert_eq!(Instruction::default().encode(), Instruction::NOP_WORD);
}

#[test]
fn encoding() {
	let alu = Instruction {
		signal: Signal::ThreadSwitch,
		op_add: AddOp::Fadd,
		cond_add: Condition::Always,
		waddr_add: 32,
		op_mul: MulOp::Fmul,
		cond_mul: Condition::ZeroClear,
		waddr_mul: 5,
		write_swap: true,
		set_flags: true,
		raddr_a: 3,
		raddr_b: 12,
		add_a: Mux::RegisterA,
		add_b: Mux::R1,
		mul_a: Mux::RegisterB,
		mul_b: Mux::R4,
		..Instruction::default()
	};
	assert_eq!(Instruction::decode(alu.encode()), alu);

	let branch = Instruction {
		signal: Signal::Branch,
		relative: true,
		branch_register: true,
		branch_condition: BranchCondition::AllZeroClear,
		raddr_a: 4,
		waddr_add: 10,
		immediate: (-64i32) as u32,
		..Instruction::default()
	};
	let word = branch.encode();
	assert_eq!(word >> 60, 15);
	assert_eq!(word as u32, (-64i32) as u32);
	assert_eq!(Instruction::decode(word), branch);

	let immediate = Instruction {
		signal: Signal::LoadImmediate,
		load_mode: LoadMode::PerElementSigned,
		cond_add: Condition::Always,
		waddr_add: 1,
		immediate: 0xdead_beef,
		..Instruction::default()
	};
	let word = immediate.encode();
	assert_eq!((word >> 60, (word >> 57) & 7, (word >> 38) & 63), (14, 1, 1));
	assert_eq!(word as u32, 0xdead_beef);
	assert_eq!(Instruction::decode(immediate.encode()), immediate);
}

#[test]
fn slot_accessors() {
	let instruction = Instruction {
		op_mul: MulOp::Fmul,
		cond_mul: Condition::Always,
		waddr_mul: 7,
		write_swap: true,
		mul_b: Mux::R3,
		..Instruction::default()
	};
	assert!(instruction.is_mul_used());
	assert!(!instruction.is_add_used());
	assert!(instruction.writes_file_a(Slot::Mul));
	assert!(!instruction.writes_file_a(Slot::Add));
	assert_eq!(instruction.waddr(Slot::Mul), 7);
	assert_eq!(instruction.condition(Slot::Add), Condition::Never);
	assert_eq!(instruction.mux(Slot::Mul, true), Mux::R3);
	assert!(instruction.uses_mux(Mux::R3));
	assert!(!instruction.uses_mux(Mux::R5));
	assert_eq!(Slot::Add.other(), Slot::Mul);
	assert_eq!(Slot::Mul.to_string(), "MUL ALU");
}

#[test]
fn small_immediate_values() {
	assert_eq!(code_value(0), 0);
	assert_eq!(code_value(15), 15);
	assert_eq!(code_value(16), (-16i32) as u32);
	assert_eq!(code_value(31), u32::MAX);
	assert_eq!(code_value(32), 1f32.to_bits());
	assert_eq!(code_value(39), 128f32.to_bits());
	assert_eq!(code_value(40), (1. / 256f32).to_bits());
	assert_eq!(code_value(47), 0.5f32.to_bits());
	// Rotation codes alias the negative integers.
	assert_eq!(code_value(48), code_value(16));
	assert_eq!(code_value(63), u32::MAX);

	assert_eq!(code_for_value(u32::MAX), Some(31));
	assert_eq!(code_for_value(2f32.to_bits()), Some(33));
	assert_eq!(code_for_value(100), None);
}

#[test]
fn small_immediate_table() {
	let entries = small_immediate::lookup(5);
	assert_eq!(entries[0].code, 5);
	assert_eq!(entries[0].operation, SlotOperation::Add(AddOp::Or));
	assert_eq!(entries[0].pack, Pack::None);
	assert!(entries.iter().all(|entry| entry.value == 5));

	let doubled = small_immediate::lookup(30)[0];
	assert_eq!((doubled.code, doubled.operation), (15, SlotOperation::Add(AddOp::Add)));

	let replicated = small_immediate::lookup(0x0101_0101)[0];
	assert_eq!(replicated.code, 1);
	assert_eq!(replicated.pack, Pack::Replicate8888);

	assert!(small_immediate::lookup(0x1234_5678).is_empty());
	assert!(small_immediate::table().windows(2).all(|pair| pair[0].value <= pair[1].value));
}

#[test]
fn alu_evaluation() {
	assert_eq!(alu::evaluate_add(AddOp::Sub, 3, 5), (-2i32) as u32);
	assert_eq!(alu::evaluate_add(AddOp::Clz, 1, 0), 31);
	assert_eq!(alu::evaluate_add(AddOp::Itof, 3, 0), 3f32.to_bits());
	assert_eq!(alu::evaluate_add(AddOp::V8adds, 0x80ff_0001, 0x80ff_0001), 0xffff_0002);
	assert_eq!(alu::evaluate_mul(MulOp::Mul24, 0x0100_0003, 4), 12);
	assert_eq!(alu::evaluate_mul(MulOp::V8min, 0x10_20, 0x20_10), 0x10_10);
	assert_eq!(alu::evaluate_pack(0x1234_5678, Pack::Byte8b, false), 0x7800);
	assert_eq!(alu::evaluate_pack((-5i32) as u32, Pack::Byte8aSaturate, false), 0);
	assert_eq!(alu::evaluate_pack(0x1_0000, Pack::Half16aSaturate, false), 0x7fff);
	assert_eq!(alu::evaluate_pack(1f32.to_bits(), Pack::Replicate8888, true), 0xffff_ffff);
	assert_eq!(alu::evaluate_pack(0.5f32.to_bits(), Pack::Byte8b, true), 128 << 8);
}

#[test]
fn builder_operations() {
	let mut builder = InstructionBuilder::new();
	assert_eq!(builder.begin_add(AddOp::Add), Ok(InstructionContext::ADD));
	assert_eq!(builder.instruction.cond_add, Condition::Always);
	assert_eq!(builder.begin_add(AddOp::Add), Err(InstructionError::SlotInUse { slot: Slot::Add }));

	// Operations that exist in both ALUs move to the free one.
	let mut builder = InstructionBuilder::new();
	assert_eq!(builder.begin_add(AddOp::V8adds), Ok(InstructionContext::ADD));
	assert_eq!(builder.begin_add(AddOp::V8adds), Ok(InstructionContext::MUL));
	assert_eq!(builder.instruction.op_mul, MulOp::V8adds);
	assert_eq!(builder.instruction.cond_mul, Condition::Always);

	assert_eq!(builder.begin_branch(true), Err(InstructionError::BranchNotAlone));
	assert_eq!(builder.load_immediate(1, LoadMode::Immediate), Err(InstructionError::ImmediateWithAlu));
}

#[test]
fn builder_register_reads() {
	let mut builder = InstructionBuilder::new();
	let mux = builder.read_register(file_a(5)).unwrap();
	assert_eq!(mux, Mux::RegisterA);
	assert_eq!(builder.instruction.raddr_a, 5);
	assert!(builder.flags.contains(InstructionFlags::NO_SWAP));
	builder.instruction.add_a = mux;

	let mux = builder.read_register(file_b(3)).unwrap();
	assert_eq!(mux, Mux::RegisterB);
	builder.instruction.add_b = mux;

	// Reading the same register again shares the port.
	assert_eq!(builder.read_register(file_a(5)), Ok(Mux::RegisterA));
	assert_eq!(builder.read_register(file_a(6)), Err(InstructionError::ReadConflict));
	assert_eq!(builder.read_register(accumulator(1)), Ok(Mux::R1));

	let semaphore = RegisterDescriptor::new(0, RegisterCapabilities::SEMAPHORE);
	assert_eq!(builder.read_register(semaphore), Err(InstructionError::SemaphoreSource));
}

#[test]
fn builder_targets() {
	let mut builder = InstructionBuilder::new();
	let mut context = builder.begin_add(AddOp::Add).unwrap();
	builder.set_target(&mut context, file_b(5)).unwrap();
	assert_eq!(builder.instruction.waddr_add, 5);
	assert!(builder.instruction.write_swap);

	let readonly = RegisterDescriptor::new(32, RegisterCapabilities::FILES | RegisterCapabilities::READ);
	assert_eq!(builder.set_target(&mut context, readonly), Err(InstructionError::NotWritable));
}

#[test]
fn builder_small_immediates() {
	let mut builder = InstructionBuilder::new();
	let mut context = builder.begin_move().unwrap();
	assert_eq!(builder.try_small_immediate(&mut context, 0), Ok(true));
	assert_eq!(builder.instruction.op_add, AddOp::Xor);
	assert_eq!(builder.instruction.signal, Signal::None);

	let mut builder = InstructionBuilder::new();
	let mut context = builder.begin_move().unwrap();
	assert_eq!(builder.try_small_immediate(&mut context, 5), Ok(true));
	assert_eq!(builder.instruction.signal, Signal::SmallImmediate);
	assert_eq!(builder.instruction.small_immediate, 5);
	assert_eq!(builder.instruction.op_add, AddOp::Or);
	assert_eq!((builder.instruction.add_a, builder.instruction.add_b), (Mux::RegisterB, Mux::RegisterB));

	// 100 is 10 * 10, which only the MUL ALU computes.
	let mut builder = InstructionBuilder::new();
	let mut context = builder.begin_move().unwrap();
	assert_eq!(builder.try_small_immediate(&mut context, 100), Ok(true));
	assert_eq!(context.slot(), Slot::Mul);
	assert_eq!(builder.instruction.op_mul, MulOp::Mul24);
	assert_eq!(builder.instruction.small_immediate, 10);

	let mut builder = InstructionBuilder::new();
	let mut context = builder.begin_move().unwrap();
	assert_eq!(builder.try_small_immediate(&mut context, 0x1234_5678), Ok(false));
	assert_eq!(builder.load_immediate(0x1234_5678, LoadMode::Immediate), Ok(()));
	assert_eq!(
		builder.load_immediate(1, LoadMode::Immediate),
		Err(InstructionError::DifferentImmediates { current: 0x1234_5678, requested: 1 })
	);
}

#[test]
fn builder_signals() {
	let mut builder = InstructionBuilder::new();
	builder.do_small_immediate(16).unwrap();
	// A rotation code supplies the same value.
	builder.do_small_immediate(48).unwrap();
	assert_eq!(builder.instruction.small_immediate, 48);
	assert_eq!(
		builder.do_small_immediate(5),
		Err(InstructionError::MultipleSmallImmediates { requested: 5, current: 48 })
	);
	assert_eq!(builder.add_signal(Signal::ThreadSwitch), Err(InstructionError::SignalWithImmediate));

	let mut builder = InstructionBuilder::new();
	builder.add_signal(Signal::ThreadSwitch).unwrap();
	assert_eq!(builder.add_signal(Signal::LoadTmu0), Err(InstructionError::MultipleSignals));

	let mut builder = InstructionBuilder::new();
	assert_eq!(builder.begin_semaphore(), Ok(false));
	builder.set_semaphore(false, 0x13).unwrap();
	assert_eq!(builder.instruction.load_mode, LoadMode::Semaphore);
	assert_eq!(builder.instruction.immediate, 0x13);
}

#[test]
fn optimize_dead_slot() {
	let mut instruction = Instruction {
		op_add: AddOp::Add,
		waddr_add: 5,
		add_a: Mux::R1,
		add_b: Mux::R2,
		..Instruction::default()
	};
	assert_eq!(optimize(&mut instruction), Change::Modified);
	assert_eq!(instruction, Instruction::default());

	let mut nop = Instruction::default();
	assert_eq!(optimize(&mut nop), Change::Unmodified);
}

#[test]
fn optimize_canonical_operations() {
	let mut instruction = Instruction {
		op_add: AddOp::And,
		cond_add: Condition::Always,
		waddr_add: 32,
		add_a: Mux::R1,
		add_b: Mux::R1,
		..Instruction::default()
	};
	assert_eq!(optimize(&mut instruction), Change::Modified);
	assert_eq!(instruction.op_add, AddOp::Or);

	let mut unary = Instruction { op_add: AddOp::Not, add_b: Mux::R2, ..instruction };
	assert_eq!(optimize(&mut unary), Change::Modified);
	assert_eq!(unary.add_b, Mux::R1);

	// Flags keep the ADD ALU operation as written.
	let mut flags = Instruction { op_add: AddOp::Sub, set_flags: true, ..instruction };
	assert_eq!(optimize(&mut flags), Change::Unmodified);
	assert_eq!(flags.op_add, AddOp::Sub);

	let mut branch = Instruction { signal: Signal::Branch, waddr_add: 3, ..Instruction::default() };
	assert_eq!(optimize(&mut branch), Change::Unmodified);
}

#[test]
fn alu_swap() {
	let mut instruction = Instruction {
		op_add: AddOp::Or,
		cond_add: Condition::Always,
		waddr_add: 5,
		add_a: Mux::R1,
		add_b: Mux::R1,
		..Instruction::default()
	};
	assert!(instruction.try_alu_swap());
	assert_eq!(instruction.op_mul, MulOp::V8min);
	assert_eq!(instruction.op_add, AddOp::Nop);
	assert_eq!((instruction.mul_a, instruction.mul_b), (Mux::R1, Mux::R1));
	assert_eq!((instruction.cond_mul, instruction.waddr_mul), (Condition::Always, 5));
	assert_eq!((instruction.cond_add, instruction.waddr_add), (Condition::Never, NOP_REGISTER));
	// The target stays in register file A.
	assert!(instruction.writes_file_a(Slot::Mul));

	let mut add = Instruction { op_add: AddOp::Add, ..Instruction::default() };
	assert!(!add.try_alu_swap());
	let mut with_flags = Instruction { set_flags: true, ..instruction };
	assert!(!with_flags.try_alu_swap());
}

#[test]
fn resource_claims() {
	let nop = Instruction::default().resource_claims();
	assert_eq!(nop, ResourceClaims::default());

	let tmu = Instruction { cond_add: Condition::Always, waddr_add: 56, ..Instruction::default() };
	assert_eq!(tmu.resource_claims().special, 1);
	let load = Instruction { signal: Signal::LoadTmu0, ..tmu };
	assert_eq!(load.resource_claims().special, 2);
	let color = Instruction { signal: Signal::ColorLoad, ..Instruction::default() };
	assert_eq!(color.resource_claims().color, 1);

	let color_write = Instruction { cond_mul: Condition::Always, waddr_mul: 45, ..color };
	assert_eq!(color_write.resource_claims().color, 1);

	assert!(!tmu.resource_claims().is_overcommitted());
	assert!(load.resource_claims().is_overcommitted());
	assert!(!color_write.resource_claims().is_overcommitted());
	let both = Instruction { cond_mul: Condition::Always, waddr_mul: 45, ..tmu };
	assert!(both.resource_claims().is_overcommitted());
}
