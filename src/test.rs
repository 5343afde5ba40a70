//! Tests of the complete assembler and disassembler.

use std::sync::Arc;

use crate::cli::CollectingFrontend;
use crate::instruction::Instruction;
use crate::{AssembledProgram, Disassembler, DisassemblerOptions, assemble_source, pretty_hex};

const PROGRAM: &str = "\
loop:
	add ra1, ra2, r3
	mov r0, 5
	mov ra4, 0
	ldi ra1, 0x12345678   # load
	sacq -, 3
	ldi ra1, [3,1,0,0,0,0,0,0,0,0,0,0,0,0,0,0]
	nop
	brr -, :loop
	nop
	nop
	nop
";

fn assemble(source: &str) -> AssembledProgram {
	let frontend = Arc::new(CollectingFrontend::default());
	let program = assemble_source(frontend.clone(), "test.qasm", source).expect("assembly succeeds");
	assert_eq!(frontend.codes(), Vec::<String>::new());
	program
}

#[test]
fn round_trip() {
	let program = assemble(PROGRAM);
	assert_eq!(program.words.len(), 11);

	let mut disassembler = Disassembler::new(DisassemblerOptions { print_comment: false, ..Default::default() });
	disassembler.provide_labels(program.label_map(false));
	let output = disassembler.disassemble(&program.words);
	let lines: Vec<&str> = output.lines().collect();
	assert_eq!(lines, [
		":loop",
		"\tadd ra1, ra2, r3",
		"\tmov r0, 5",
		"\tmov ra4, 0",
		"\tldi ra1, 0x12345678",
		"\tsacq -, 3",
		"\tldipeu ra1, [3,1,0,0,0,0,0,0,0,0,0,0,0,0,0,0]",
		"\tnop",
		"\tbrr -, :loop",
		"\tnop",
		"\tnop",
		"\tnop",
	]);

	// The disassembly assembles to the same words.
	let reassembled = assemble(&output);
	assert_eq!(reassembled.words, program.words);
}

#[test]
fn listing_lines() {
	let program = assemble(PROGRAM);
	assert_eq!(program.labels_for_instruction(0, false), ["loop"]);
	assert_eq!(program.source_line(3), Some("ldi ra1, 0x12345678"));
	assert_eq!(program.source_line(7), Some("brr -, :loop"));
	assert_eq!(program.source_line(11), None);
}

#[test]
fn exported_symbols() {
	let program = assemble("\tnop\nentry::\n\tnop\nhelper:\n\tbrr -, :helper\n\tnop\n\tnop\n\tnop\n");
	assert_eq!(program.symbols().into_iter().collect::<Vec<_>>(), [("entry".to_owned(), 8)]);
	assert_eq!(program.label_map(true).into_iter().collect::<Vec<_>>(), [(8, "entry".to_owned())]);
	assert_eq!(program.label_map(false).len(), 2);
}

#[test]
fn hex_output() {
	assert_eq!(pretty_hex(&[Instruction::NOP_WORD]), "0x009e7000, 0x100009e7,\n");
	assert_eq!(pretty_hex(&[1, 2 << 32]), "0x00000001, 0x00000000,\n0x00000000, 0x00000002,\n");
	assert_eq!(pretty_hex(&[]), "");
}

#[test]
fn binary_output() {
	let program = assemble("\tnop\n\t.long 0x0102030405060708\n");
	let bytes = program.to_bytes();
	assert_eq!(bytes.len(), 16);
	assert_eq!(&bytes[.. 8], Instruction::NOP_WORD.to_le_bytes());
	assert_eq!(&bytes[8 ..], [8, 7, 6, 5, 4, 3, 2, 1]);
}
