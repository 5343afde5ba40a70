//! Error and diagnostic types.
//!
//! Errors come in three layers. The expression evaluator and the instruction builder know nothing about source code
//! and return the plain [`EvalError`] and [`InstructionError`] kinds. The assembler wraps them, together with its own
//! kinds, in an [`ErrorKind`] and locates that in the source as an [`AssemblyError`], which is what frontends receive.
#![allow(missing_docs)]

use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Arc;

use miette::{Diagnostic, LabeledSpan, Severity, SourceCode, SourceSpan};
use thiserror::Error;

use crate::instruction::Slot;
use crate::source::AssemblyCode;

/// Errors of the expression evaluator.
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum EvalError {
	#[error("Registers can only be rotated once, and rotation by r5 cannot be combined with a constant rotation")]
	#[diagnostic(code(qpuasm::expression::invalid_rotation), severity(Error))]
	InvalidRotation,

	#[error("Expected an operator between two operands")]
	#[diagnostic(code(qpuasm::expression::missing_operator), severity(Error))]
	MissingOperator,

	#[error("Incomplete expression")]
	#[diagnostic(code(qpuasm::expression::incomplete), severity(Error))]
	IncompleteExpression,

	#[error("Operator `{operator}` is missing its left operand")]
	#[diagnostic(code(qpuasm::expression::missing_operand), severity(Error))]
	MissingOperand { operator: &'static str },

	#[error("Unbalanced parenthesis")]
	#[diagnostic(code(qpuasm::expression::unbalanced_parenthesis), severity(Error))]
	UnbalancedParenthesis,

	#[error("Operator `{operator}` cannot be applied to a {operand}")]
	#[diagnostic(code(qpuasm::expression::invalid_operand), severity(Error))]
	InvalidOperand { operator: &'static str, operand: &'static str },

	#[error("Operator `{operator}` cannot be applied to a {left} and a {right}")]
	#[diagnostic(code(qpuasm::expression::type_mismatch), severity(Error))]
	TypeMismatch { operator: &'static str, left: &'static str, right: &'static str },

	#[error("Invalid shift amount or exponent {0}")]
	#[diagnostic(code(qpuasm::expression::invalid_shift), severity(Error))]
	InvalidShift(i64),

	#[error("Division by zero")]
	#[diagnostic(code(qpuasm::expression::division_by_zero), severity(Error))]
	DivisionByZero,
}

/// Conflicts detected while building an instruction word.
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum InstructionError {
	//#region Slots and instruction classes
	#[error("Cannot use the {slot} in a load immediate or branch instruction")]
	#[diagnostic(code(qpuasm::instruction::alu_in_immediate), severity(Error))]
	AluInImmediate { slot: Slot },

	#[error("The {slot} is already used by this instruction")]
	#[diagnostic(code(qpuasm::instruction::slot_in_use), severity(Error))]
	SlotInUse { slot: Slot },

	#[error("Cannot use mov together with a branch instruction")]
	#[diagnostic(code(qpuasm::instruction::move_with_branch), severity(Error))]
	MoveWithBranch,

	#[error("Both ALUs are already used by this instruction")]
	#[diagnostic(code(qpuasm::instruction::both_alus_used), severity(Error))]
	BothAlusUsed,

	#[error("An ALU instruction with two targets needs both ALUs")]
	#[diagnostic(code(qpuasm::instruction::two_targets_need_both_alus), severity(Error))]
	TwoTargetsNeedBothAlus,

	#[error("A branch instruction must be the only one in its instruction word")]
	#[diagnostic(code(qpuasm::instruction::branch_not_alone), severity(Error))]
	BranchNotAlone,

	#[error("Semaphore instructions can only be combined with a plain load immediate")]
	#[diagnostic(code(qpuasm::instruction::semaphore_not_alone), severity(Error))]
	SemaphoreNotAlone,

	#[error(
		"Combining a semaphore instruction with a load immediate requires the low five bits of the immediate to match \
		 the semaphore number and direction"
	)]
	#[diagnostic(code(qpuasm::instruction::semaphore_mismatch), severity(Error))]
	SemaphoreMismatch,

	#[error("Signals cannot be combined with branches or immediate values")]
	#[diagnostic(code(qpuasm::instruction::signal_with_immediate), severity(Error))]
	SignalWithImmediate,

	#[error("Only one signal per instruction")]
	#[diagnostic(code(qpuasm::instruction::multiple_signals), severity(Error))]
	MultipleSignals,
	//#endregion
	//#region Registers
	#[error("Cannot use a semaphore register as ALU or read source")]
	#[diagnostic(code(qpuasm::instruction::semaphore_source), severity(Error))]
	SemaphoreSource,

	#[error("The register is not readable")]
	#[diagnostic(code(qpuasm::instruction::not_readable), severity(Error))]
	NotReadable,

	#[error("The register is not writable")]
	#[diagnostic(code(qpuasm::instruction::not_writable), severity(Error))]
	NotWritable,

	#[error("Access to register file B conflicts with the small immediate value")]
	#[diagnostic(code(qpuasm::instruction::file_b_with_small_immediate), severity(Error))]
	FileBConflictsWithSmallImmediate,

	#[error("Read access to register conflicts with another access to the same register file")]
	#[diagnostic(
		code(qpuasm::instruction::read_conflict),
		severity(Error),
		help("Each register file can only read one address per instruction")
	)]
	ReadConflict,

	#[error("The ADD ALU and the MUL ALU cannot write to the same register file")]
	#[diagnostic(code(qpuasm::instruction::same_write_file), severity(Error))]
	SameWriteFile,

	#[error("read cannot be combined with load immediate, semaphore or branch instructions")]
	#[diagnostic(code(qpuasm::instruction::read_with_immediate), severity(Error))]
	ReadWithImmediate,

	#[error("Vector rotations cannot be used with read")]
	#[diagnostic(code(qpuasm::instruction::read_rotation), severity(Error))]
	ReadRotation,

	#[error("Accumulators cannot be used with read")]
	#[diagnostic(code(qpuasm::instruction::accumulator_read), severity(Error))]
	AccumulatorRead,

	#[error("A mov with a register source cannot be combined with a load immediate")]
	#[diagnostic(code(qpuasm::instruction::register_move_with_immediate), severity(Error))]
	RegisterMoveWithImmediate,
	//#endregion
	//#region Small immediates and load immediates
	#[error("Only one distinct small immediate value per instruction (requested code {requested}, current code {current})")]
	#[diagnostic(code(qpuasm::instruction::multiple_small_immediates), severity(Error))]
	MultipleSmallImmediates { requested: u8, current: u8 },

	#[error("A small immediate cannot be used together with a register file B read")]
	#[diagnostic(code(qpuasm::instruction::small_immediate_with_file_b), severity(Error))]
	SmallImmediateWithFileB,

	#[error("Small immediate values and vector rotations cannot be used together with signals")]
	#[diagnostic(code(qpuasm::instruction::signal_with_small_immediate), severity(Error))]
	SignalWithSmallImmediate,

	#[error("Immediate value collides with a read from register file B")]
	#[diagnostic(code(qpuasm::instruction::immediate_with_file_b), severity(Error))]
	ImmediateCollidesWithFileB,

	#[error("Immediate values cannot be used together with signals")]
	#[diagnostic(code(qpuasm::instruction::immediate_with_signal), severity(Error))]
	ImmediateWithSignal,

	#[error("This pair of immediate values cannot be handled in one instruction word")]
	#[diagnostic(code(qpuasm::instruction::immediate_pair), severity(Error))]
	ImmediatePairUnsupported,

	#[error("Tried to load two different immediate values in one instruction ({current:#x} vs. {requested:#x})")]
	#[diagnostic(code(qpuasm::instruction::different_immediates), severity(Error))]
	DifferentImmediates { current: u32, requested: u32 },

	#[error("Cannot combine a load immediate with ALU instructions")]
	#[diagnostic(code(qpuasm::instruction::immediate_with_alu), severity(Error))]
	ImmediateWithAlu,

	#[error("Value {0:#x} does not fit into the small immediate field")]
	#[diagnostic(
		code(qpuasm::instruction::immediate_does_not_fit),
		severity(Error),
		help("Load the value into an accumulator with ldi first")
	)]
	ImmediateDoesNotFit(u32),
	//#endregion
	//#region Vector rotation
	#[error("Cannot rotate an ALU target right by r5")]
	#[diagnostic(code(qpuasm::instruction::target_rotation_by_r5), severity(Error))]
	TargetRotationByR5,

	#[error("Only one vector rotation per ALU instruction")]
	#[diagnostic(code(qpuasm::instruction::multiple_rotations), severity(Error))]
	MultipleRotations,

	#[error("Vector rotation is only available to the MUL ALU")]
	#[diagnostic(code(qpuasm::instruction::rotation_only_in_mul), severity(Error))]
	RotationOnlyInMul,

	#[error("Vector rotation is in conflict with the small immediate value")]
	#[diagnostic(code(qpuasm::instruction::rotation_with_small_immediate), severity(Error))]
	RotationConflictsWithSmallImmediate,

	#[error("Cannot use different vector rotations within one instruction")]
	#[diagnostic(code(qpuasm::instruction::different_rotations), severity(Error))]
	DifferentRotations,
	//#endregion
	//#region Branches
	#[error("Cannot specify two immediate values as branch target")]
	#[diagnostic(code(qpuasm::instruction::two_branch_immediates), severity(Error))]
	TwoBranchImmediates,

	#[error("The branch target register must be a general purpose register of register file A")]
	#[diagnostic(code(qpuasm::instruction::branch_register_not_file_a), severity(Error))]
	BranchRegisterNotFileA,

	#[error("Cannot use vector rotation with a branch instruction")]
	#[diagnostic(code(qpuasm::instruction::branch_rotation), severity(Error))]
	BranchRotation,

	#[error("Cannot specify two registers as branch target")]
	#[diagnostic(code(qpuasm::instruction::two_branch_registers), severity(Error))]
	TwoBranchRegisters,

	#[error("A branch instruction with .setf cannot use even register numbers")]
	#[diagnostic(code(qpuasm::instruction::branch_set_flags_even_register), severity(Error))]
	BranchSetFlagsEvenRegister,
	//#endregion
	//#region Extensions
	#[error("Cannot apply a write condition to a branch instruction")]
	#[diagnostic(code(qpuasm::instruction::condition_on_branch), severity(Error))]
	ConditionOnBranch,

	#[error("The write condition was already specified")]
	#[diagnostic(code(qpuasm::instruction::condition_already_specified), severity(Error))]
	ConditionAlreadySpecified,

	#[error("Branch conditions can only be applied to branch instructions")]
	#[diagnostic(code(qpuasm::instruction::branch_condition_on_alu), severity(Error))]
	BranchConditionOnAlu,

	#[error("Only one branch condition per instruction")]
	#[diagnostic(code(qpuasm::instruction::multiple_branch_conditions), severity(Error))]
	MultipleBranchConditions,

	#[error("Cannot pack the result of a branch instruction")]
	#[diagnostic(code(qpuasm::instruction::pack_on_branch), severity(Error))]
	PackOnBranch,

	#[error("Only one pack mode per instruction")]
	#[diagnostic(code(qpuasm::instruction::multiple_packs), severity(Error))]
	MultiplePacks,

	#[error("The target of the ADD ALU must be in register file A to use pack")]
	#[diagnostic(code(qpuasm::instruction::add_pack_needs_file_a), severity(Error))]
	AddPackNeedsFileA,

	#[error("The MUL ALU only supports saturated 8 bit pack modes")]
	#[diagnostic(code(qpuasm::instruction::mul_pack_not_saturated), severity(Error))]
	MulPackNotSaturated,

	#[error("The pack mode conflicts with the unpack mode in the PM bit")]
	#[diagnostic(code(qpuasm::instruction::pack_conflicts_with_unpack), severity(Error))]
	PackConflictsWithUnpack,

	#[error("Cannot unpack in branch and load immediate instructions")]
	#[diagnostic(code(qpuasm::instruction::unpack_on_immediate), severity(Error))]
	UnpackOnImmediate,

	#[error("Only one unpack mode per ALU instruction")]
	#[diagnostic(code(qpuasm::instruction::multiple_unpacks), severity(Error))]
	MultipleUnpacks,

	#[error("Cannot use different unpack modes within one instruction")]
	#[diagnostic(code(qpuasm::instruction::different_unpacks), severity(Error))]
	DifferentUnpacks,

	#[error("Cannot unpack this source operand")]
	#[diagnostic(
		code(qpuasm::instruction::cannot_unpack_source),
		severity(Error),
		help("Only r4 and register file A general purpose registers can be unpacked")
	)]
	CannotUnpackSource,

	#[error("The unpack mode applies to none of the source operands of the operation")]
	#[diagnostic(code(qpuasm::instruction::unpack_applies_to_no_source), severity(Error))]
	UnpackAppliesToNoSource,

	#[error("Using unpack changes the semantics of the other ALU")]
	#[diagnostic(code(qpuasm::instruction::unpack_changes_other_alu), severity(Error))]
	UnpackChangesOtherAlu,

	#[error("The requested unpack mode conflicts with the pack mode of the instruction")]
	#[diagnostic(code(qpuasm::instruction::unpack_conflicts_with_pack), severity(Error))]
	UnpackConflictsWithPack,

	#[error("Conflicting unpack modes of the first and second source operand")]
	#[diagnostic(code(qpuasm::instruction::conflicting_source_unpacks), severity(Error))]
	ConflictingSourceUnpacks,

	#[error("The unpack modes of the ADD ALU and the MUL ALU are different")]
	#[diagnostic(code(qpuasm::instruction::different_unpack_modes), severity(Error))]
	DifferentUnpackModes,

	#[error("The unpack mode silently applies to the {} source operand", if *.second { "second" } else { "first" })]
	#[diagnostic(code(qpuasm::instruction::unpack_silently_applies), severity(Error))]
	UnpackSilentlyApplies { second: bool },

	#[error("Cannot apply .setf because the flags of the ADD ALU are used")]
	#[diagnostic(code(qpuasm::instruction::set_flags_add_in_use), severity(Error))]
	SetFlagsAddInUse,

	#[error("Don't use .setf twice")]
	#[diagnostic(code(qpuasm::instruction::duplicate_set_flags), severity(Error))]
	DuplicateSetFlags,
	//#endregion
}

/// Advisories of the instruction builder; the instruction is still built.
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum InstructionWarning {
	#[error("r5 does not support vector rotation")]
	#[diagnostic(code(qpuasm::r5_not_rotatable), severity(Warning))]
	R5NotRotatable,

	#[error("{mux} does not support full MUL ALU vector rotation")]
	#[diagnostic(
		code(qpuasm::partial_rotation),
		severity(Warning),
		help("Register file reads only rotate by 1 to 3 or 13 to 15 elements")
	)]
	PartialRotation { mux: &'static str },

	#[error("The vector rotation of the second MUL ALU source silently applies to the first source as well")]
	#[diagnostic(code(qpuasm::rotation_applies_to_first_source), severity(Warning))]
	RotationAppliesToFirstSource,

	#[error("The vector rotation of the first MUL ALU source silently applies to the second source as well")]
	#[diagnostic(code(qpuasm::rotation_applies_to_second_source), severity(Warning))]
	RotationAppliesToSecondSource,

	#[error("Using an odd register number as branch target implies .setf")]
	#[diagnostic(code(qpuasm::odd_branch_register), severity(Warning), help("Use an explicit .setf to avoid this warning"))]
	OddBranchRegister,
}

/// All kinds of errors and diagnostics of the assembler.
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum ErrorKind {
	#[error(transparent)]
	#[diagnostic(transparent)]
	Eval(#[from] EvalError),

	#[error(transparent)]
	#[diagnostic(transparent)]
	Instruction(#[from] InstructionError),

	#[error(transparent)]
	#[diagnostic(transparent)]
	InstructionWarning(#[from] InstructionWarning),

	//#region Syntax errors: detected while lexing and evaluating operands
	#[error("Expected {expected}, found `{found}`")]
	#[diagnostic(code(qpuasm::syntax::unexpected_token), severity(Error))]
	UnexpectedToken { expected: &'static str, found: String },

	#[error("Syntax error: unexpected `{0}`")]
	#[diagnostic(code(qpuasm::syntax::syntax_error), severity(Error))]
	SyntaxError(String),

	#[error("`{0}` is no integral number")]
	#[diagnostic(code(qpuasm::syntax::malformed_integer), severity(Error))]
	MalformedInteger(String),

	#[error("`{0}` is no real number")]
	#[diagnostic(code(qpuasm::syntax::malformed_float), severity(Error))]
	MalformedFloat(String),

	#[error("The identifier `{0}` is undefined")]
	#[diagnostic(code(qpuasm::syntax::undefined_identifier), severity(Error))]
	UndefinedIdentifier(String),

	#[error("`{0}:` is no valid label prefix")]
	#[diagnostic(code(qpuasm::syntax::invalid_label_prefix), severity(Error), help("Use `r:` for relative label references"))]
	InvalidLabelPrefix(String),

	#[error("Invalid operator `{0}`")]
	#[diagnostic(code(qpuasm::syntax::invalid_operator), severity(Error))]
	InvalidOperator(String),

	#[error("Invalid opcode or unknown macro `{0}`")]
	#[diagnostic(code(qpuasm::syntax::unknown_opcode), severity(Error))]
	UnknownOpcode(String),

	#[error("Invalid assembler directive `.{0}`")]
	#[diagnostic(code(qpuasm::syntax::unknown_directive), severity(Error))]
	UnknownDirective(String),

	#[error("Unknown instruction extension `.{0}`")]
	#[diagnostic(code(qpuasm::syntax::unknown_extension), severity(Error))]
	UnknownExtension(String),

	#[error("The instruction extension `.{0}` is not valid at this position")]
	#[diagnostic(
		code(qpuasm::syntax::misplaced_extension),
		severity(Error),
		help("Conditions and .setf belong to the opcode, unpack modes to source operands")
	)]
	MisplacedExtension(String),

	#[error("Expected {expected}, found a {found}")]
	#[diagnostic(code(qpuasm::syntax::operand_type), severity(Error))]
	OperandType { expected: &'static str, found: &'static str },

	#[error("Per element constants only accept integers in the range -2 to 3")]
	#[diagnostic(code(qpuasm::syntax::per_element_range), severity(Error))]
	PerElementRange,

	#[error("All elements of a per element constant must be in the range -2 to 1 or in the range 0 to 3")]
	#[diagnostic(code(qpuasm::syntax::per_element_sign), severity(Error))]
	PerElementMixedSign,

	#[error("Too {} initializers for a per element constant", if *.too_many { "many" } else { "few" })]
	#[diagnostic(code(qpuasm::syntax::per_element_count), severity(Error), help("Exactly 16 values are required"))]
	PerElementCount { too_many: bool },

	#[error("Load immediate mode conflicts with the per element constant")]
	#[diagnostic(code(qpuasm::syntax::per_element_mode), severity(Error))]
	PerElementMode,

	#[error("Vector rotation needs an integer or r5 as the rotation amount")]
	#[diagnostic(code(qpuasm::syntax::invalid_rotation_amount), severity(Error))]
	InvalidRotationAmount,

	#[error("Semaphore instructions require an integer semaphore number below 16")]
	#[diagnostic(code(qpuasm::syntax::semaphore_number), severity(Error))]
	SemaphoreNumber,
	//#endregion
	//#region Labels and symbols
	#[error("Redefinition of label `{name}`, previously defined at {previous}")]
	#[diagnostic(
		code(qpuasm::label_redefinition),
		severity(Error),
		help("Only labels starting with a digit may be redefined")
	)]
	LabelRedefinition { name: String, previous: String },

	#[error("Cannot define a label at a bit boundary")]
	#[diagnostic(code(qpuasm::unaligned_label), severity(Error), help("At least byte alignment is required"))]
	UnalignedLabel,

	#[error("Label `{name}` is undefined, referenced from {reference}")]
	#[diagnostic(code(qpuasm::undefined_label), severity(Error))]
	UndefinedLabel { name: String, reference: String },

	#[error("Label `{name}` is not used")]
	#[diagnostic(code(qpuasm::unused_label), severity(Advice))]
	UnusedLabel { name: String },

	#[error("Using the value of a label as target of an absolute branch creates non-relocatable code")]
	#[diagnostic(code(qpuasm::absolute_label_branch), severity(Warning), help("Use brr for relative branches"))]
	AbsoluteBranchToLabel,

	#[error("A branch target without 32 bit alignment probably does not hit the intended instruction")]
	#[diagnostic(code(qpuasm::unaligned_branch_target), severity(Warning))]
	UnalignedBranchTarget,

	#[error("Global symbol values must be integers in the range -0x80000000 to 0xffffffff, found {0}")]
	#[diagnostic(code(qpuasm::global_value), severity(Error))]
	GlobalValue(String),

	#[error("`{name}` is already marked as global")]
	#[diagnostic(code(qpuasm::duplicate_global), severity(Advice))]
	DuplicateGlobal { name: String },

	#[error("Global `{name}` is redefined with a different value")]
	#[diagnostic(code(qpuasm::global_redefinition), severity(Error))]
	GlobalRedefinition { name: String },
	//#endregion
	//#region Data and alignment
	#[error("Data directives only accept integer or float values, found a {0}")]
	#[diagnostic(code(qpuasm::data_type), severity(Error))]
	DataType(&'static str),

	#[error("Value {value} is out of range for {bits} bit data")]
	#[diagnostic(code(qpuasm::data_out_of_range), severity(Warning), help("The upper bits are truncated"))]
	DataOutOfRange { value: i64, bits: u32 },

	#[error("Data is not aligned to instruction words")]
	#[diagnostic(
		code(qpuasm::unaligned_data),
		severity(Warning),
		help("Labels into the middle of the data may not be addressable by the QPU")
	)]
	UnalignedData,

	#[error("Invalid data width {0}")]
	#[diagnostic(code(qpuasm::invalid_data_width), severity(Error), help("Data widths from 1 to 64 bits are supported"))]
	InvalidDataWidth(i64),

	#[error("Alignment must be a power of two from 1 to 64 bytes, found {0}")]
	#[diagnostic(code(qpuasm::invalid_alignment), severity(Error))]
	InvalidAlignment(i64),

	#[error("Used padding to enforce 64 bit alignment of the instruction")]
	#[diagnostic(code(qpuasm::instruction_padding), severity(Warning))]
	InstructionPadding,
	//#endregion
	//#region Blocks, conditionals and directives
	#[error("`.{directive}` without a matching `.{opening}`")]
	#[diagnostic(code(qpuasm::unmatched_block_end), severity(Error))]
	UnmatchedBlockEnd { directive: &'static str, opening: &'static str },

	#[error("Unterminated block in the current file, starting at line {line}")]
	#[diagnostic(code(qpuasm::unterminated_block), severity(Error))]
	UnterminatedBlock { line: usize },

	#[error("Unterminated .if at line {line}")]
	#[diagnostic(code(qpuasm::unterminated_if), severity(Error))]
	UnterminatedIf { line: usize },

	#[error(".endif must be in the same file as its .if")]
	#[diagnostic(code(qpuasm::endif_in_other_file), severity(Error))]
	EndifInOtherFile,

	#[error("Assertion failed")]
	#[diagnostic(code(qpuasm::assertion_failed), severity(Error))]
	AssertionFailed,

	#[error("Expected end of line")]
	#[diagnostic(code(qpuasm::dangling_tokens), severity(Error), help("Remove these tokens"))]
	DanglingTokens,

	#[error("Invalid repetition count {0}")]
	#[diagnostic(code(qpuasm::invalid_repeat_count), severity(Error), help("At most 0x1000000 repetitions are allowed"))]
	InvalidRepeatCount(i64),

	#[error("Cannot nest .back blocks")]
	#[diagnostic(code(qpuasm::nested_back), severity(Error))]
	NestedBack,

	#[error("Cannot move instructions back by {0}")]
	#[diagnostic(
		code(qpuasm::invalid_back_count),
		severity(Error),
		help("At most 10 instructions and no further than the start of the program")
	)]
	InvalidBackCount(i64),

	#[error("Moving instructions across a branch target")]
	#[diagnostic(code(qpuasm::back_across_branch_target), severity(Warning))]
	BackAcrossBranchTarget,

	#[error("Invalid clone count {0}")]
	#[diagnostic(code(qpuasm::invalid_clone_count), severity(Error), help("Between 0 and 3 instructions can be cloned"))]
	InvalidCloneCount(i64),

	#[error("Cannot clone behind the end of the code")]
	#[diagnostic(code(qpuasm::clone_behind_end), severity(Error))]
	CloneBehindEnd,

	#[error("Clone source address {0:#x} is outside of the program")]
	#[diagnostic(code(qpuasm::clone_out_of_range), severity(Error))]
	CloneOutOfRange(i64),

	#[error("Cloning a branch instruction")]
	#[diagnostic(code(qpuasm::clone_branch), severity(Warning), help("The relative branch target is not adjusted"))]
	CloneBranch,

	#[error("Constant `{name}` is already defined")]
	#[diagnostic(code(qpuasm::constant_redefinition), severity(Error))]
	ConstantRedefinition { name: String },

	#[error("Redefinition of function `{name}`")]
	#[diagnostic(code(qpuasm::function_redefinition), severity(Advice))]
	FunctionRedefinition { name: String },

	#[error("Cannot unset `{name}` because it has not been defined")]
	#[diagnostic(code(qpuasm::undefined_constant), severity(Warning))]
	UndefinedConstant { name: String },

	#[error("Cannot nest macro definitions; in definition of macro starting at {previous}")]
	#[diagnostic(code(qpuasm::nested_macro), severity(Error))]
	NestedMacro { previous: String },

	#[error("Redefinition of macro `{name}`, previously defined at {previous}")]
	#[diagnostic(code(qpuasm::macro_redefinition), severity(Advice))]
	MacroRedefinition { name: String, previous: String },

	#[error("Cannot close this definition with `.{directive}`, expected `.{expected}`")]
	#[diagnostic(code(qpuasm::macro_end_mismatch), severity(Error))]
	MacroEndMismatch { directive: String, expected: &'static str },

	#[error("Macro arguments must not be numbers")]
	#[diagnostic(code(qpuasm::numeric_macro_argument), severity(Error))]
	NumericMacroArgument,

	#[error("Too {} arguments for `{name}`, expected {expected}", if *.too_many { "many" } else { "few" })]
	#[diagnostic(code(qpuasm::argument_count), severity(Error))]
	ArgumentCount { name: String, expected: usize, too_many: bool },

	#[error("Label definitions are not allowed in functional macro `{name}`")]
	#[diagnostic(code(qpuasm::label_in_functional_macro), severity(Error))]
	LabelInFunctionalMacro { name: String },

	#[error("Only one expression is allowed per functional macro")]
	#[diagnostic(code(qpuasm::multiple_functional_macro_values), severity(Error))]
	MultipleFunctionalMacroValues,

	#[error("Functional macro `{name}` did not return a value")]
	#[diagnostic(code(qpuasm::missing_functional_macro_value), severity(Error))]
	MissingFunctionalMacroValue { name: String },

	#[error("Function `{name}` evaluated to an incomplete expression")]
	#[diagnostic(code(qpuasm::incomplete_function), severity(Error))]
	IncompleteFunction { name: String },

	#[error("Maximum macro expansion depth {depth} exceeded")]
	#[diagnostic(
		code(qpuasm::recursive_macro),
		severity(Error),
		help("A macro probably invokes itself unconditionally, or the limit is set too low")
	)]
	RecursiveMacro { depth: usize },

	#[error("Expected \"file-name\" or <file-name> after .include")]
	#[diagnostic(code(qpuasm::include_syntax), severity(Error))]
	IncludeSyntax,

	#[error("Cannot locate file `{name}`")]
	#[diagnostic(code(qpuasm::file_not_found), severity(Error))]
	FileNotFound { name: String },

	#[error("Inconsistent {0} during pass 2")]
	#[diagnostic(
		code(qpuasm::inconsistent_pass),
		severity(Error),
		help("The source assembles differently in the second pass, e.g. because of a condition on a forward label")
	)]
	InconsistentPass(&'static str),

	#[error("Assembly failed with errors")]
	#[diagnostic(code(qpuasm::assembly_failed), severity(Error))]
	AssemblyFailed,
	//#endregion
}

impl ErrorKind {
	/// Internal consistency errors abort the whole file instead of only the current line.
	#[must_use]
	pub const fn is_fatal(&self) -> bool {
		matches!(
			self,
			Self::InconsistentPass(_)
				| Self::UnterminatedBlock { .. }
				| Self::UnterminatedIf { .. }
				| Self::EndifInOtherFile
				| Self::RecursiveMacro { .. }
		)
	}
}

/// One entry of the trail of invocations that led to an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrailEntry {
	/// How the inner code was reached.
	pub reason: TrailReason,
	/// File of the invocation.
	pub file:   PathBuf,
	/// One-based line of the invocation.
	pub line:   usize,
}

/// How the code of an error location was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrailReason {
	/// Through `.include`.
	Include,
	/// Through a macro, `.rep` or `.foreach` invocation.
	Macro,
	/// Through a function or functional macro call.
	Function,
}

impl Display for TrailEntry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let reason = match self.reason {
			TrailReason::Include => "Included from",
			TrailReason::Macro => "At invocation of macro from",
			TrailReason::Function => "At function invocation from",
		};
		write!(f, "{reason} {} ({})", AssemblyCode::file_name_for(&self.file), self.line)
	}
}

/// An error or diagnostic located in the source code.
#[derive(Debug, Clone)]
pub struct AssemblyError {
	/// What happened.
	pub kind:     ErrorKind,
	/// The source file of the location.
	pub src:      Arc<AssemblyCode>,
	/// Where it happened.
	pub location: SourceSpan,
	/// Invocations that led to the location, innermost first.
	pub trail:    Vec<TrailEntry>,
}

impl AssemblyError {
	/// Creates an error without invocation trail.
	#[must_use]
	pub fn new(kind: impl Into<ErrorKind>, src: Arc<AssemblyCode>, location: SourceSpan) -> Self {
		Self { kind: kind.into(), src, location, trail: Vec::new() }
	}

	/// The diagnostic code, e.g. `qpuasm::undefined_label`.
	#[must_use]
	pub fn code_name(&self) -> String {
		self.kind.code().map(|code| code.to_string()).unwrap_or_default()
	}

	/// Whether this is an error rather than a warning or advice.
	#[must_use]
	pub fn is_error(&self) -> bool {
		self.kind.severity().is_none_or(|severity| severity == Severity::Error)
	}
}

impl Display for AssemblyError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		self.kind.fmt(f)
	}
}

impl std::error::Error for AssemblyError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		self.kind.source()
	}
}

impl Diagnostic for AssemblyError {
	fn code<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
		self.kind.code()
	}

	fn severity(&self) -> Option<Severity> {
		self.kind.severity()
	}

	fn help<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
		let help = self.kind.help().map(|help| help.to_string());
		if self.trail.is_empty() {
			return help.map(|help| Box::new(help) as Box<dyn Display>);
		}
		let trail = self.trail.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n");
		Some(Box::new(help.map_or_else(|| trail.clone(), |help| format!("{help}\n{trail}"))))
	}

	fn source_code(&self) -> Option<&dyn SourceCode> {
		Some(&*self.src)
	}

	fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
		Some(Box::new(std::iter::once(LabeledSpan::new_with_span(Some("here".to_owned()), self.location))))
	}
}
