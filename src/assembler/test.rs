use std::sync::Arc;

use super::*;
use crate::cli::CollectingFrontend;
use crate::instruction::{AddOp, Condition, LoadMode, MulOp, Mux, Signal};
use crate::source::MemorySources;

const MAIN: &str = "main.qasm";

fn assemble_sources(
	frontend: CollectingFrontend,
	sources: MemorySources,
) -> (Result<AssembledProgram>, Vec<String>) {
	let frontend = Arc::new(frontend);
	let mut assembler = Assembler::new(frontend.clone(), sources);
	assembler.add_file(MAIN).expect("main file exists");
	let result = assembler.finish();
	(result, frontend.codes())
}

fn assemble(source: &str) -> (Result<AssembledProgram>, Vec<String>) {
	assemble_sources(CollectingFrontend::default(), MemorySources::new().with_file(MAIN, source))
}

/// Assembles a program that must not produce any diagnostics.
fn assemble_clean(source: &str) -> AssembledProgram {
	let (result, codes) = assemble(source);
	assert_eq!(codes, Vec::<String>::new());
	result.expect("assembly succeeds")
}

fn decoded(program: &AssembledProgram, pc: usize) -> Instruction {
	Instruction::decode(program.words[pc])
}

#[test]
fn single_nop() {
	let program = assemble_clean("\tnop\n");
	assert_eq!(program.words, [Instruction::NOP_WORD]);
	assert_eq!(program.to_bytes(), Instruction::NOP_WORD.to_le_bytes());
}

#[test]
fn alu_instruction() {
	let program = assemble_clean("add ra1, ra2, r3");
	let expected = Instruction {
		op_add: AddOp::Add,
		cond_add: Condition::Always,
		waddr_add: 1,
		raddr_a: 2,
		add_a: Mux::RegisterA,
		add_b: Mux::R3,
		..Instruction::default()
	};
	assert_eq!(program.words, [expected.encode()]);
	assert_eq!(program.source_line(0), Some("add ra1, ra2, r3"));
}

#[test]
fn moves() {
	let program = assemble_clean("mov r0, 5\nmov ra4, 0\nmov ra1, 0x12345678\nldi ra1, 0x12345678");

	let small = decoded(&program, 0);
	assert_eq!(small.signal, Signal::SmallImmediate);
	assert_eq!(small.small_immediate, 5);
	assert_eq!((small.op_add, small.add_a, small.add_b), (AddOp::Or, Mux::RegisterB, Mux::RegisterB));
	assert_eq!(small.waddr_add, 32);

	let zero = decoded(&program, 1);
	assert_eq!(zero.signal, Signal::None);
	assert_eq!((zero.op_add, zero.add_a, zero.add_b), (AddOp::Xor, Mux::R0, Mux::R0));

	let large = decoded(&program, 2);
	assert_eq!(
		(large.signal, large.load_mode, large.immediate),
		(Signal::LoadImmediate, LoadMode::Immediate, 0x1234_5678)
	);
	assert_eq!(large.waddr_add, 1);
	assert_eq!(program.words[2], program.words[3]);
}

#[test]
fn per_element_load() {
	let program =
		assemble_clean("ldi ra1, [3,1,0,0,0,0,0,0,0,0,0,0,0,0,0,0]\nmov ra1, [-1,1,0,0,0,0,0,0,0,0,0,0,0,0,0,0]");
	let unsigned = decoded(&program, 0);
	assert_eq!((unsigned.load_mode, unsigned.immediate), (LoadMode::PerElementUnsigned, 0x0001_0003));
	let signed = decoded(&program, 1);
	assert_eq!((signed.load_mode, signed.immediate), (LoadMode::PerElementSigned, 0x0001_0003));

	let (result, codes) = assemble("ldipes ra1, [3,1,0,0,0,0,0,0,0,0,0,0,0,0,0,0]");
	assert!(result.is_err());
	assert_eq!(codes, ["qpuasm::syntax::per_element_mode"]);
}

#[test]
fn relative_branch() {
	let program = assemble_clean("loop:\n\tnop\n\tbrr -, :loop\n");
	let branch = decoded(&program, 1);
	assert_eq!(branch.signal, Signal::Branch);
	assert!(branch.relative);
	assert!(!branch.branch_register);
	assert_eq!(branch.immediate as i32, -40);
	assert_eq!(program.label_value("loop"), Some(0));
	assert!(program.flags[0].contains(InstructionFlags::BRANCH_TARGET));
}

#[test]
fn forward_references() {
	let program = assemble_clean("\tbrr -, :1f\n\tnop\n\tnop\n\tnop\n\tnop\n1:\n\tnop\n");
	assert_eq!(decoded(&program, 0).immediate, 8);
	assert_eq!(program.label_value("1"), Some(40));
	assert_eq!(program.labels_for_instruction(5, false), ["1"]);
	assert!(program.labels_for_instruction(5, true).is_empty());
}

#[test]
fn numeric_labels_can_be_redefined() {
	let program = assemble_clean("1:\n\tnop\n\tbrr -, :1\n1:\n\tnop\n\tbrr -, :1\n");
	let values: Vec<_> = program.labels.iter().map(|label| (label.name.as_str(), label.value)).collect();
	assert_eq!(values, [("1", 0), ("1", 16)]);
	assert_eq!(program.label_value("1"), Some(16));
	assert_eq!(decoded(&program, 3).immediate as i32, -40);

	let (result, codes) = assemble("a:\n\tnop\na:\n\tnop\n");
	assert!(result.is_err());
	assert_eq!(codes, ["qpuasm::label_redefinition"]);
}

#[test]
fn label_diagnostics() {
	let (result, codes) = assemble("\tbrr -, :missing\n");
	assert!(matches!(result.map_err(|error| error.kind), Err(ErrorKind::AssemblyFailed)));
	assert_eq!(codes, ["qpuasm::undefined_label"]);

	let (result, codes) = assemble("start:\n\tnop\n");
	assert!(result.is_ok());
	assert_eq!(codes, ["qpuasm::unused_label"]);

	let (result, codes) = assemble("start:\n\tbra -, :start\n");
	assert!(result.is_ok());
	assert_eq!(codes, ["qpuasm::absolute_label_branch"]);

	// Exported labels are used by whoever links the program.
	let (result, codes) = assemble("start::\n\tnop\n");
	assert!(result.is_ok());
	assert!(codes.is_empty());
}

#[test]
fn symbols() {
	let program = assemble_clean("\tnop\nentry::\n\tnop\n.global answer, 42\n.global entry\n");
	assert_eq!(program.symbols(), BTreeMap::from([("answer".to_owned(), 42), ("entry".to_owned(), 8)]));
	assert_eq!(program.label_map(true), BTreeMap::from([(8, "entry".to_owned())]));
}

#[test]
fn merged_statements() {
	let program = assemble_clean("\tadd r0, r1, r2;\n\t; fmul r3, r0, r1\n");
	assert_eq!(program.words.len(), 1);
	let merged = decoded(&program, 0);
	assert_eq!((merged.op_add, merged.op_mul), (AddOp::Add, MulOp::Fmul));
	assert_eq!((merged.waddr_add, merged.waddr_mul), (32, 35));

	// Without the trailing semicolon, the first instruction is closed.
	let program = assemble_clean("\tadd r0, r1, r2\n\t; fmul r3, r0, r1\n");
	assert_eq!(program.words.len(), 2);

	// Two TMU accesses cannot share one instruction.
	let program = assemble_clean("\tmov tmu0_s, r0;\n\t; ldtmu0\n");
	assert_eq!(program.words.len(), 2);
	assert_eq!(decoded(&program, 1).signal, Signal::LoadTmu0);

	// Branch targets start a new instruction.
	let program = assemble_clean("\tnop;\ntarget::\n\t; thrsw\n");
	assert_eq!(program.words.len(), 2);

	// A TMU write and a tile buffer write each claim an exclusive resource.
	let program = assemble_clean("\tmov tmu0_s, r0;\n\t; mov tlb_color_all, r1\n");
	assert_eq!(program.words.len(), 2);
	assert_eq!((decoded(&program, 0).waddr_add, decoded(&program, 1).waddr_add), (56, 46));

	// So does a statement that claims two resources on its own.
	let program = assemble_clean("\tadd r0, r1, r2;\n\t; mov tmu0_s, r0; ldtmu0\n");
	assert_eq!(program.words.len(), 2);

	// One exclusive resource may join an instruction without any.
	let program = assemble_clean("\tadd r0, r1, r2;\n\t; fmul tmu0_s, r0, r1\n");
	assert_eq!(program.words.len(), 1);
}

#[test]
fn semaphores() {
	let program = assemble_clean("\tsacq -, 3\n\tsrel -, 7\n");
	let acquire = decoded(&program, 0);
	assert_eq!(
		(acquire.signal, acquire.load_mode, acquire.immediate),
		(Signal::LoadImmediate, LoadMode::Semaphore, 0x13)
	);
	assert_eq!(decoded(&program, 1).immediate, 7);

	let (result, codes) = assemble("\tsrel -, 16\n");
	assert!(result.is_err());
	assert_eq!(codes, ["qpuasm::syntax::semaphore_number"]);
}

#[test]
fn data() {
	let program = assemble_clean(".int 1, 2\n.float 1.0\n.half 1.0\n");
	assert_eq!(program.words[0], 0x0000_0002_0000_0001);
	assert_eq!(program.words[1], 0x3c00_3f80_0000);
	assert!(program.flags.iter().all(|flags| flags.contains(InstructionFlags::DATA)));

	let (result, codes) = assemble(".byte 300\n");
	assert_eq!(result.expect("only a warning").words, [44]);
	assert_eq!(codes, ["qpuasm::data_out_of_range"]);

	let (result, codes) = assemble(".int 1.5\n");
	assert!(result.is_err());
	assert_eq!(codes, ["qpuasm::data_type"]);

	let program = assemble_clean(".bits 63, -1\n.bits 1, 0\n.bits 64, -2\n.bits 63, 5\n.bits 1, 1\n");
	assert_eq!(program.words, [0x7fff_ffff_ffff_ffff, 0xffff_ffff_ffff_fffe, 0x8000_0000_0000_0005]);

	let (result, codes) = assemble(".bits 63, -0x4000000000000001\n");
	assert_eq!(result.expect("only a warning").words, [0x3fff_ffff_ffff_ffff]);
	assert_eq!(codes, ["qpuasm::data_out_of_range"]);
}

#[test]
fn alignment() {
	let (result, codes) = assemble(".short 1\n\tnop\n");
	assert_eq!(result.expect("only a warning").words, [1, Instruction::NOP_WORD]);
	assert_eq!(codes, ["qpuasm::instruction_padding"]);

	let program = assemble_clean("\tnop\n.align 16\n\tnop\n");
	assert_eq!(program.words, [Instruction::NOP_WORD, 0, Instruction::NOP_WORD]);

	let (result, codes) = assemble(".align 3\n");
	assert!(result.is_err());
	assert_eq!(codes, ["qpuasm::invalid_alignment"]);
}

#[test]
fn constants_and_functions() {
	let source = ".set base, 5\n.set next, base + 1\n.set double(x) x * 2\n\tmov ra0, next\n\tmov ra1, double(4)\n";
	let program = assemble_clean(source);
	assert_eq!(decoded(&program, 0).small_immediate, 6);
	assert_eq!(decoded(&program, 1).small_immediate, 8);

	let (result, codes) = assemble(".const size, 4\n.const size, 5\n");
	assert!(result.is_err());
	assert_eq!(codes, ["qpuasm::constant_redefinition"]);
}

#[test]
fn conditional_assembly() {
	let source = ".set mode, 1\n.if mode == 1\n\tnop\n.elseif mode == 2\n\tthrsw\n.else\n\tthrsw\n.endif\n";
	let program = assemble_clean(source);
	assert_eq!(program.words, [Instruction::NOP_WORD]);

	let program = assemble_clean(".ifset undefined\n\tnop\n.endif\n");
	assert!(program.words.is_empty());

	let (result, codes) = assemble(".assert 1 == 1\n.assert 2 < 1\n");
	assert!(result.is_err());
	assert_eq!(codes, ["qpuasm::assertion_failed"]);

	let (result, codes) = assemble(".if 1\n\tnop\n");
	assert!(result.is_err());
	assert_eq!(codes, ["qpuasm::unterminated_if"]);

	let program = assemble_clean(".if 0\n\tnop\n.else\n\tthrsw\n\tthrsw\n.endif\n");
	assert_eq!(program.words.len(), 2);
	assert!(program.words.iter().all(|&word| Instruction::decode(word).signal == Signal::ThreadSwitch));

	let program = assemble_clean(".if 0\n\tnop\n.elseif 1\n\tthrsw\n.else\n\tnop\n.endif\n");
	assert_eq!(program.words.len(), 1);
	assert_eq!(decoded(&program, 0).signal, Signal::ThreadSwitch);
}

#[test]
fn endif_in_included_file() {
	let sources = MemorySources::new()
		.with_file(MAIN, ".if 1\n.include \"lib.qasm\"\n\tnop\n")
		.with_file("lib.qasm", "\tnop\n.endif\n");
	let (result, codes) = assemble_sources(CollectingFrontend::default(), sources);
	assert!(result.is_err());
	assert_eq!(codes, ["qpuasm::endif_in_other_file"]);
}

#[test]
fn loops() {
	let program = assemble_clean(".rep i, 3\n\tnop\n.endr\n");
	assert_eq!(program.words, [Instruction::NOP_WORD; 3]);

	let program = assemble_clean(".foreach value, 1, 2\n\tmov ra0, value\n.endfor\n");
	let values: Vec<_> = (0 .. 2).map(|pc| decoded(&program, pc).small_immediate).collect();
	assert_eq!(values, [1, 2]);

	let program = assemble_clean(".rep i, 2\n.rep j, 2\n\tnop\n.endr\n.endr\n");
	assert_eq!(program.words.len(), 4);

	let program = assemble_clean(".rep i, 0\n\tnop\n.endr\n");
	assert!(program.words.is_empty());

	// The loop variable counts from zero.
	let program = assemble_clean(".rep i, 3\n\t.int i\n.endr\n");
	assert_eq!(program.words, [0x1_0000_0000, 2]);
}

#[test]
fn macros() {
	let source = ".macro twice, value\n\tmov ra0, value\n\tmov ra1, value\n.endm\n\ttwice 3\n";
	let program = assemble_clean(source);
	assert_eq!(program.words.len(), 2);
	assert_eq!((decoded(&program, 0).waddr_add, decoded(&program, 1).waddr_add), (0, 1));
	assert!(program.words.iter().all(|&word| Instruction::decode(word).small_immediate == 3));

	let source = ".macro pair, first, second\n\tmov ra0, first\n\tmov ra1, second\n.endm\n\tpair 2, 5\n";
	let program = assemble_clean(source);
	assert_eq!(program.words.len(), 2);
	assert_eq!((decoded(&program, 0).small_immediate, decoded(&program, 1).small_immediate), (2, 5));
	assert_eq!((decoded(&program, 0).waddr_add, decoded(&program, 1).waddr_add), (0, 1));

	let (result, codes) = assemble(".macro twice, value\n\tnop\n.endm\n\ttwice 1, 2\n");
	assert!(result.is_err());
	assert_eq!(codes, ["qpuasm::argument_count"]);

	let (result, codes) = assemble(".func plus_one(x)\n\tx + 1\n.endf\n.assert plus_one(2) == 3\n");
	assert!(result.is_ok());
	assert!(codes.is_empty());
}

#[test]
fn recursive_macro() {
	let frontend = CollectingFrontend { maximum_expansion_depth: 8, ..CollectingFrontend::default() };
	let sources = MemorySources::new().with_file(MAIN, ".macro forever\n\tforever\n.endm\n\tforever\n");
	let (result, codes) = assemble_sources(frontend, sources);
	assert!(result.is_err());
	assert_eq!(codes, ["qpuasm::recursive_macro"]);
}

#[test]
fn includes() {
	let sources = MemorySources::new()
		.with_file(MAIN, ".include \"lib.qasm\"\n\tnop\n")
		.with_file("lib.qasm", ".set value, 7\n\tmov ra0, value\n");
	let (result, codes) = assemble_sources(CollectingFrontend::default(), sources);
	let program = result.expect("assembly succeeds");
	assert!(codes.is_empty());
	assert_eq!(program.words.len(), 2);
	assert_eq!(decoded(&program, 0).small_immediate, 7);
	assert_eq!(program.files.len(), 2);
	assert_eq!(program.locations[0].file, 1);

	let (result, codes) = assemble(".include \"missing.qasm\"\n");
	assert!(result.is_err());
	assert_eq!(codes, ["qpuasm::file_not_found"]);

	let frontend: Arc<dyn Frontend> = Arc::new(CollectingFrontend::default());
	let mut assembler = Assembler::new(frontend, MemorySources::new());
	let error = assembler.add_file("missing.qasm").expect_err("file does not exist");
	assert!(matches!(error.kind, ErrorKind::FileNotFound { .. }));
}

#[test]
fn clone_and_back() {
	let program = assemble_clean("first:\n\tadd r0, r1, r2\n\tthrsw\n.clone :first, 2\n");
	assert_eq!(program.words.len(), 4);
	assert_eq!(program.words[.. 2], program.words[2 ..]);

	let program = assemble_clean("\tmov r0, 1\n\tnop\n\tnop\n.back 2\n\tmov r1, 2\n.endb\n");
	assert_eq!(program.words.len(), 4);
	assert_eq!(decoded(&program, 1).small_immediate, 2);
	assert_eq!(program.words[2 ..], [Instruction::NOP_WORD; 2]);

	let (result, codes) = assemble("first:\n\tnop\n.clone :first - 16, 1\n");
	assert!(result.is_err());
	assert_eq!(codes, ["qpuasm::clone_out_of_range"]);
}

#[test]
fn deterministic() {
	let source = concat!(
		"start:\n\tmov r0, 0x12345678\n\tbrr -, :1f\n\tnop\n\tnop\n\tnop\n",
		"1:\n\tbrr -, :start\n\tnop\n\tnop\n\tnop\n",
	);
	let first = assemble_clean(source);
	let second = assemble_clean(source);
	assert_eq!(first.words, second.words);
	assert_eq!(first.label_map(false), second.label_map(false));
}

#[test]
fn syntax_errors() {
	let (_, codes) = assemble("\tfrobnicate r0\n");
	assert_eq!(codes, ["qpuasm::syntax::unknown_opcode"]);
	let (_, codes) = assemble(".frobnicate\n");
	assert_eq!(codes, ["qpuasm::syntax::unknown_directive"]);
	let (_, codes) = assemble("\tnop r0\n");
	assert_eq!(codes, ["qpuasm::dangling_tokens"]);
	let (_, codes) = assemble("\tadd ra0, rb1, rb2\n");
	assert_eq!(codes, ["qpuasm::instruction::read_conflict"]);
}
