//! Source lines and instruction statements.
//!
//! A line holds labels, then either a directive, a macro invocation or one or more statements separated by `;`. All
//! statements of a line go into the same instruction word. A line that starts with `;` is merged into the previous
//! instruction word if the resources allow it.

use miette::SourceSpan;

use super::context::MacroLine;
use super::expression::span_since;
use super::table::{self, Extension, ExtensionLookupError, Opcode, Positions};
use super::{Assembler, Result};
use crate::error::{ErrorKind, InstructionError};
use crate::expression::{ElementSign, ROTATE_BY_R5, RegisterCapabilities, RegisterDescriptor, Value};
use crate::instruction::small_immediate::code_for_value;
use crate::instruction::{
	AddOp, InstructionBuilder, InstructionContext, InstructionFlags, LoadMode, MulOp, Mux, Signal, Slot,
};
use crate::parser::lexer::{Lexer, Token};

/// Whether more operands follow the extensions at the cursor, i.e. there is a `,` before the end of the statement.
fn has_more_operands(lexer: &Lexer) -> bool {
	lexer.rest().split(['#', ';']).next().is_some_and(|statement| statement.contains(','))
}

impl Assembler {
	//#region Lines

	/// Parses one source line.
	pub(super) fn parse_line(&mut self, lexer: &mut Lexer) -> Result {
		if self.pass.recording.is_some() {
			if lexer.next_token() != Token::Period {
				self.record_line(lexer);
				return Ok(());
			}
			lexer.unget();
		}

		let pc = self.pass.pc;
		self.pass.ensure_flags(pc);
		let mut try_combine = false;
		let mut is_instruction = false;
		loop {
			match lexer.next_token() {
				Token::Period if !is_instruction => return self.parse_directive(lexer),
				Token::End => return Ok(()),
				_ if self.pass.is_disabled() => return Ok(()),
				Token::Colon if !is_instruction => self.parse_label_prefix(lexer)?,
				Token::Semicolon => {
					try_combine = pc > 0
						&& self.pass.flags[pc - 1].contains(InstructionFlags::COMBINE_ALLOWED)
						&& !self.pass.flags[pc].contains(InstructionFlags::BRANCH_TARGET);
					is_instruction = true;
				},
				Token::Number if !is_instruction && lexer.peek_char() == Some(':') => self.parse_label_suffix(lexer)?,
				Token::Word => {
					if lexer.peek_char() == Some(':') {
						self.parse_label_suffix(lexer)?;
						continue;
					}
					let name = lexer.text().to_owned();
					let span = lexer.span();
					if self.pass.macros.contains_key(&name) {
						return self.invoke_macro(&name, lexer, span);
					}
					lexer.unget();
					return self.parse_statements(lexer, try_combine);
				},
				_ => return Err(self.error(ErrorKind::SyntaxError(lexer.text().to_owned()), lexer.span())),
			}
		}
	}

	/// Defines the label just lexed, which is followed by `:` or `::`.
	fn parse_label_suffix(&mut self, lexer: &mut Lexer) -> Result {
		let name = lexer.text().to_owned();
		let span = lexer.span();
		lexer.set_position(lexer.position() + 1);
		let exported = lexer.peek_char() == Some(':');
		if exported {
			lexer.set_position(lexer.position() + 1);
		}
		self.define_label(&name, exported, span)
	}

	/// Parses a line that starts with `:`: `:name`, `::name` or a lone `:` that only marks a branch target.
	fn parse_label_prefix(&mut self, lexer: &mut Lexer) -> Result {
		if !lexer.peek_char().is_some_and(char::is_whitespace) {
			let mut token = lexer.next_token();
			let exported = token == Token::Colon;
			if exported {
				token = lexer.next_token();
			}
			match token {
				Token::Word | Token::Number => {
					let name = lexer.text().to_owned();
					self.define_label(&name, exported, lexer.span())?;
				},
				Token::End => lexer.unget(),
				_ => return Err(self.unexpected(lexer, "label name")),
			}
		}
		let pc = self.pass.pc;
		self.pass.ensure_flags(pc);
		self.pass.flags[pc] |= InstructionFlags::BRANCH_TARGET;
		Ok(())
	}

	/// Appends the current line verbatim to the macro or loop body being recorded.
	pub(super) fn record_line(&mut self, lexer: &Lexer) {
		let line = self.location().line;
		if let Some(recording) = &mut self.pass.recording {
			recording.body.lines.push(MacroLine { text: lexer.line().to_owned(), offset: lexer.offset(), line });
		}
	}

	/// Parses the statements of a line into an instruction word, merging them into the previous word if requested and
	/// possible.
	fn parse_statements(&mut self, lexer: &mut Lexer, try_combine: bool) -> Result {
		let padded = self.do_align(8, 0);
		if padded {
			self.message(ErrorKind::InstructionPadding, lexer.span());
		}
		let pc = self.pass.pc;

		if try_combine && !padded {
			let start = lexer.position();
			self.pass.deferred = Some(Vec::new());
			let result = self.parse_instruction(lexer);
			let deferred = self.pass.deferred.take().unwrap_or_default();
			let merged = &self.pass.builder.instruction;
			let overcommitted = merged.signal < Signal::LoadImmediate && merged.resource_claims().is_overcommitted();
			match result {
				Ok(()) if !overcommitted => {
					let builder = &self.pass.builder;
					self.pass.words[pc - 1] = builder.instruction.encode();
					let flags = self.pass.flags[pc - 1] | builder.flags;
					self.pass.flags[pc - 1] = flags - InstructionFlags::COMBINE_ALLOWED;
					for error in deferred {
						self.report(Box::new(error));
					}
					return Ok(());
				},
				Ok(()) => log::trace!("Not merging into instruction {}: too many special resources", pc - 1),
				Err(error) => log::trace!("Not merging into instruction {}: {error}", pc - 1),
			}
			lexer.set_position(start);
		}

		self.pass.builder = InstructionBuilder::new();
		self.parse_instruction(lexer)?;
		let word = self.pass.builder.instruction.encode();
		self.store_word(word);
		self.pass.ensure_flags(pc);
		self.pass.flags[pc] |= self.pass.builder.flags;
		self.pass.pc += 1;
		Ok(())
	}

	/// Parses `;`-separated statements into the current builder until the end of the line.
	fn parse_instruction(&mut self, lexer: &mut Lexer) -> Result {
		loop {
			self.pass.builder.flags.remove(InstructionFlags::COMBINE_ALLOWED);
			if lexer.next_token() != Token::Word {
				return Err(self.unexpected(lexer, "opcode"));
			}
			let start = lexer.column() - 1;
			let name = lexer.text().to_owned();
			let span = lexer.span();
			let opcode = table::opcode(&name).ok_or_else(|| self.error(ErrorKind::UnknownOpcode(name), span))?;
			self.assemble(opcode, lexer, span)?;

			let statement = span_since(lexer, start);
			for advisory in self.pass.builder.take_advisories() {
				self.message(advisory, statement);
			}

			match lexer.next_token() {
				Token::End => return Ok(()),
				Token::Semicolon => {
					self.pass.builder.flags.insert(InstructionFlags::COMBINE_ALLOWED);
					match lexer.next_token() {
						Token::End => return Ok(()),
						Token::Word => lexer.unget(),
						_ => return Err(self.unexpected(lexer, "opcode or end of line")),
					}
				},
				_ => return Err(self.error(ErrorKind::DanglingTokens, lexer.span())),
			}
		}
	}

	/// Writes an instruction word at the current position. Within `.back`, the word goes in front of the instructions
	/// that were moved back.
	pub(super) fn store_word(&mut self, word: u64) {
		let index = self.pass.pc.min(self.pass.words.len());
		let location = self.location();
		self.pass.words.insert(index, word);
		self.pass.locations.insert(index, location);
	}

	/// Pads to a multiple of `bytes` relative to `offset` bytes: first within the current data word, then with whole
	/// zero words. Returns whether padding was necessary.
	pub(super) fn do_align(&mut self, bytes: u32, offset: u32) -> bool {
		if bytes == 0 {
			return false;
		}
		let misalignment = (self.pass.bit_offset + (offset << 3)) & 63 & ((bytes << 3) - 1);
		if misalignment != 0 {
			self.pass.bit_offset += 8 * bytes - misalignment;
			if self.pass.bit_offset >= 64 {
				self.pass.pc += 1;
				self.pass.bit_offset = 0;
			}
		}

		let words = (bytes >> 3) as usize;
		let offset = (offset >> 3) as usize;
		if words == 0 || (self.pass.pc + offset) % words == 0 {
			return misalignment != 0;
		}
		while (self.pass.pc + offset) % words != 0 {
			// Padding is not an instruction and must stay zero.
			let pc = self.pass.pc;
			self.store_word(0);
			self.pass.ensure_flags(pc);
			self.pass.flags[pc] |= InstructionFlags::DATA;
			self.pass.pc += 1;
		}
		true
	}

	//#endregion
	//#region Statements

	/// Runs an operation of the instruction builder, attributing its error to `span`.
	fn build<T>(
		&mut self,
		span: SourceSpan,
		operation: impl FnOnce(&mut InstructionBuilder) -> std::result::Result<T, InstructionError>,
	) -> Result<T> {
		operation(&mut self.pass.builder).map_err(|error| self.error(error, span))
	}

	fn assemble(&mut self, opcode: Opcode, lexer: &mut Lexer, span: SourceSpan) -> Result {
		match opcode {
			Opcode::Add(op) => {
				let mut context = self.build(span, |builder| builder.begin_add(op))?;
				self.parse_alu_operands(lexer, &mut context, op == AddOp::Nop, op.is_unary())
			},
			Opcode::Mul(op) => {
				let mut context = self.build(span, |builder| builder.begin_mul(op))?;
				self.parse_alu_operands(lexer, &mut context, op == MulOp::Nop, false)
			},
			Opcode::Move(mode) => self.assemble_move(lexer, mode, span),
			Opcode::Read => self.assemble_read(lexer),
			Opcode::Branch { relative } => self.assemble_branch(lexer, relative, span),
			Opcode::Semaphore { acquire } => self.assemble_semaphore(lexer, acquire, span),
			Opcode::Signal(signal) => self.build(span, |builder| builder.add_signal(signal)),
		}
	}

	fn parse_alu_operands(
		&mut self,
		lexer: &mut Lexer,
		context: &mut InstructionContext,
		is_nop: bool,
		is_unary: bool,
	) -> Result {
		self.parse_extensions(lexer, context)?;
		if is_nop {
			return Ok(());
		}
		self.parse_target(lexer, context)?;
		self.expect(lexer, Token::Comma, "','")?;
		self.parse_source(lexer, context)?;

		if is_unary && context.slot() == Slot::Add {
			let instruction = &mut self.pass.builder.instruction;
			instruction.add_b = instruction.add_a;
			return Ok(());
		}
		context.insert(InstructionContext::SECOND_SOURCE);
		self.expect(lexer, Token::Comma, "','")?;
		self.parse_source(lexer, context)
	}

	/// Parses a register expression, writes it to the slot of `context`, then parses the target extensions.
	fn parse_target(&mut self, lexer: &mut Lexer, context: &mut InstructionContext) -> Result {
		let start = lexer.position();
		let value = self.parse_expression(lexer)?;
		let span = span_since(lexer, start);
		self.set_target(value, span, lexer, context)
	}

	fn set_target(
		&mut self,
		value: Value,
		span: SourceSpan,
		lexer: &mut Lexer,
		context: &mut InstructionContext,
	) -> Result {
		let register = self.expect_register(value, span)?;
		self.build(span, |builder| builder.set_target(context, register))?;
		self.parse_extensions(lexer, context)
	}

	fn expect_register(&self, value: Value, span: SourceSpan) -> Result<RegisterDescriptor> {
		match value {
			Value::Register(register) => Ok(register),
			other => Err(self.error(ErrorKind::OperandType { expected: "register", found: other.type_name() }, span)),
		}
	}

	/// Parses one ALU source operand: a register or a small immediate constant.
	fn parse_source(&mut self, lexer: &mut Lexer, context: &mut InstructionContext) -> Result {
		context.remove(InstructionContext::TARGET);
		context.insert(InstructionContext::SOURCE);
		let start = lexer.position();
		let value = self.parse_expression(lexer)?;
		let span = span_since(lexer, start);

		let slot = context.slot();
		let second = context.is_second_source();
		let mux = match value {
			Value::Register(register) => self.build(span, |builder| {
				let mux = builder.read_register(register)?;
				*builder.instruction.mux_mut(slot, second) = mux;
				builder.apply_rotation(context, register.rotation)?;
				Ok(mux)
			})?,
			Value::Integer(value) => {
				let current = *context;
				self.build(span, |builder| builder.small_immediate_source(current, value))?
			},
			Value::Float(value) => self.build(span, |builder| builder.small_immediate_float(value as f32))?,
			other =>
				return Err(self.error(
					ErrorKind::OperandType { expected: "register or small immediate", found: other.type_name() },
					span,
				)),
		};
		if !matches!(value, Value::Register(_)) {
			*self.pass.builder.instruction.mux_mut(context.slot(), context.is_second_source()) = mux;
		}
		self.parse_extensions(lexer, context)?;
		let current = *context;
		self.build(span, |builder| builder.check_unpack(current, mux))
	}

	fn assemble_move(&mut self, lexer: &mut Lexer, mode: Option<LoadMode>, span: SourceSpan) -> Result {
		let mut context = self.build(span, InstructionBuilder::begin_move)?;
		self.parse_extensions(lexer, &mut context)?;
		self.parse_target(lexer, &mut context)?;
		self.expect(lexer, Token::Comma, "','")?;

		let mut start = lexer.position();
		let mut value = self.parse_expression(lexer)?;
		let mut span = span_since(lexer, start);

		let second_target = match lexer.next_token() {
			Token::Comma => Some(false),
			Token::Period if has_more_operands(lexer) => {
				lexer.unget();
				Some(true)
			},
			_ => {
				lexer.unget();
				None
			},
		};
		if let Some(with_extensions) = second_target {
			self.build(span, |builder| builder.add_second_target(&mut context))?;
			self.set_target(value, span, lexer, &mut context)?;
			if with_extensions {
				self.expect(lexer, Token::Comma, "','")?;
			}
			context.insert(InstructionContext::BOTH);
			start = lexer.position();
			value = self.parse_expression(lexer)?;
			span = span_since(lexer, start);
		}

		context.remove(InstructionContext::TARGET);
		context.insert(InstructionContext::SOURCE);
		match value {
			Value::Register(register) if register.capabilities.contains(RegisterCapabilities::SEMAPHORE) => {
				let acquire = if register.capabilities.contains(RegisterCapabilities::ACQUIRE) { 0x10 } else { 0 };
				let immediate = u32::from(register.number) | acquire;
				self.build(span, |builder| builder.load_immediate(immediate, LoadMode::Semaphore))?;
				self.parse_extensions(lexer, &mut context)
			},
			Value::Register(register) => {
				if mode.is_some() {
					let kind = ErrorKind::OperandType { expected: "immediate value", found: "register" };
					return Err(self.error(kind, span));
				}
				let mux = self.build(span, |builder| builder.move_register(&mut context, register))?;
				self.parse_extensions(lexer, &mut context)?;
				self.build(span, |builder| builder.check_unpack(context, mux))
			},
			Value::PerElement(bits, sign) => {
				let mode = match (mode, sign) {
					(None | Some(LoadMode::Immediate | LoadMode::PerElementSigned), ElementSign::Signed)
					| (None | Some(LoadMode::Immediate | LoadMode::PerElementSigned), ElementSign::Either) =>
						LoadMode::PerElementSigned,
					(None | Some(LoadMode::Immediate | LoadMode::PerElementUnsigned), ElementSign::Unsigned)
					| (Some(LoadMode::PerElementUnsigned), ElementSign::Either) => LoadMode::PerElementUnsigned,
					_ => return Err(self.error(ErrorKind::PerElementMode, span)),
				};
				self.build(span, |builder| builder.load_immediate(bits, mode))?;
				self.parse_extensions(lexer, &mut context)
			},
			Value::Integer(_) | Value::Label(_) | Value::Float(_) => {
				let immediate = value.as_qpu_value().unwrap_or_default();
				if mode.is_none()
					&& !context.contains(InstructionContext::BOTH)
					&& self.pass.builder.instruction.signal != Signal::LoadImmediate
					&& self.build(span, |builder| builder.try_small_immediate(&mut context, immediate))?
				{
					self.parse_extensions(lexer, &mut context)?;
					let mux = self.pass.builder.instruction.mux(context.slot(), false);
					return self.build(span, |builder| builder.check_unpack(context, mux));
				}
				let mode = mode.unwrap_or(LoadMode::Immediate);
				self.build(span, |builder| builder.load_immediate(immediate, mode))?;
				self.parse_extensions(lexer, &mut context)
			},
			other => Err(self.error(
				ErrorKind::OperandType { expected: "register or immediate value", found: other.type_name() },
				span,
			)),
		}
	}

	fn assemble_read(&mut self, lexer: &mut Lexer) -> Result {
		let start = lexer.position();
		let value = self.parse_expression(lexer)?;
		let span = span_since(lexer, start);
		let constant = match value {
			Value::Register(register) => return self.build(span, |builder| builder.read_only(register)),
			Value::Integer(value) => value as u32,
			Value::Float(value) => (value as f32).to_bits(),
			other =>
				return Err(self.error(
					ErrorKind::OperandType { expected: "register or small immediate", found: other.type_name() },
					span,
				)),
		};
		let code = code_for_value(constant)
			.ok_or_else(|| self.error(InstructionError::ImmediateDoesNotFit(constant), span))?;
		self.build(span, |builder| builder.do_small_immediate(code))
	}

	fn assemble_branch(&mut self, lexer: &mut Lexer, relative: bool, span: SourceSpan) -> Result {
		let mut context = self.build(span, |builder| builder.begin_branch(relative))?;
		self.parse_extensions(lexer, &mut context)?;
		self.parse_target(lexer, &mut context)?;
		self.expect(lexer, Token::Comma, "','")?;

		let start = lexer.position();
		let second = self.parse_expression(lexer)?;
		let second_span = span_since(lexer, start);
		match lexer.next_token() {
			Token::End | Token::Semicolon => {
				lexer.unget();
				self.branch_source(second, second_span, relative)?;
			},
			Token::Comma => {
				let start = lexer.position();
				let third = self.parse_expression(lexer)?;
				let third_span = span_since(lexer, start);
				match lexer.next_token() {
					Token::End | Token::Semicolon => {
						lexer.unget();
						self.branch_source(second, second_span, relative)?;
						self.branch_source(third, third_span, relative)?;
					},
					Token::Comma => {
						// The second operand is the link register of the MUL ALU.
						let mut link = InstructionContext::MUL;
						self.set_target(second, second_span, lexer, &mut link)?;
						self.branch_source(third, third_span, relative)?;
						let start = lexer.position();
						let fourth = self.parse_expression(lexer)?;
						self.branch_source(fourth, span_since(lexer, start), relative)?;
					},
					_ => return Err(self.unexpected(lexer, "',' or end of line")),
				}
			},
			_ => return Err(self.unexpected(lexer, "',' or end of line")),
		}

		let instruction = &self.pass.builder.instruction;
		if instruction.immediate & 3 != 0 {
			self.message(ErrorKind::UnalignedBranchTarget, span);
		}
		let instruction = &self.pass.builder.instruction;
		if instruction.branch_register || instruction.immediate != 0 {
			// Execution continues after the three delay slots if the branch is not taken.
			let next = self.pass.pc + 4;
			self.pass.ensure_flags(next);
			self.pass.flags[next] |= InstructionFlags::BRANCH_TARGET;
		}
		Ok(())
	}

	/// Adds an operand to the branch target: a label, an integer offset or a register.
	fn branch_source(&mut self, value: Value, span: SourceSpan, relative: bool) -> Result {
		let offset = match value {
			Value::Label(target) =>
				if relative {
					target - (self.pass.pc as i64 + 4) * 8
				} else {
					self.message(ErrorKind::AbsoluteBranchToLabel, span);
					target
				},
			Value::Integer(offset) => offset,
			Value::Register(register) => return self.build(span, |builder| builder.set_branch_register(register)),
			other =>
				return Err(self.error(
					ErrorKind::OperandType { expected: "label, integer or register", found: other.type_name() },
					span,
				)),
		};
		if offset == 0 {
			return Ok(());
		}
		self.build(span, |builder| builder.set_branch_immediate(offset))
	}

	fn assemble_semaphore(&mut self, lexer: &mut Lexer, acquire: bool, span: SourceSpan) -> Result {
		let combined = self.build(span, InstructionBuilder::begin_semaphore)?;
		let mut context = InstructionContext::ADD;
		self.parse_extensions(lexer, &mut context)?;
		self.parse_target(lexer, &mut context)?;
		self.expect(lexer, Token::Comma, "','")?;

		let start = lexer.position();
		let value = self.parse_expression(lexer)?;
		let span = span_since(lexer, start);
		let direction = u32::from(acquire) << 4;
		let number = match value {
			Value::Integer(number) if (0 .. 32).contains(&number) && (number as u32 & !direction) < 16 => number as u32,
			_ => return Err(self.error(ErrorKind::SemaphoreNumber, span)),
		};
		self.build(span, |builder| builder.set_semaphore(combined, number | direction))
	}

	//#endregion
	//#region Extensions

	/// Parses any number of `.extension` suffixes at the cursor and applies them to the slot of `context`.
	fn parse_extensions(&mut self, lexer: &mut Lexer, context: &mut InstructionContext) -> Result {
		while lexer.next_token() == Token::Period {
			if !matches!(lexer.next_token(), Token::Word | Token::Number) {
				return Err(self.unexpected(lexer, "instruction extension"));
			}
			let name = lexer.text().to_owned();
			let span = lexer.span();
			let position = if context.contains(InstructionContext::SOURCE) {
				Positions::SOURCE
			} else if context.contains(InstructionContext::TARGET) {
				Positions::TARGET
			} else {
				Positions::OPCODE
			};
			let extension = table::extension(&name, position).map_err(|error| match error {
				ExtensionLookupError::Unknown => self.error(ErrorKind::UnknownExtension(name.clone()), span),
				ExtensionLookupError::Misplaced => self.error(ErrorKind::MisplacedExtension(name.clone()), span),
			})?;

			let current = *context;
			match extension {
				Extension::SetFlags => self.build(span, |builder| builder.add_set_flags(context))?,
				Extension::Condition(condition) =>
					self.build(span, |builder| builder.add_condition(current, condition))?,
				Extension::BranchCondition(condition) =>
					self.build(span, |builder| builder.add_branch_condition(condition))?,
				Extension::Pack(pack) => self.build(span, |builder| builder.add_pack(current, pack))?,
				Extension::Unpack(unpack) => self.build(span, |builder| builder.add_unpack(current, unpack))?,
				Extension::Rotate => self.parse_rotation(lexer, context)?,
			}
		}
		lexer.unget();
		Ok(())
	}

	/// Parses the amount of a `.rot amount,` extension: an integer or `r5`.
	fn parse_rotation(&mut self, lexer: &mut Lexer, context: &mut InstructionContext) -> Result {
		let start = lexer.position();
		let value = self.parse_expression(lexer)?;
		let span = span_since(lexer, start);
		self.expect(lexer, Token::Comma, "','")?;
		let amount = match value {
			Value::Register(register) if register.is_r5() => ROTATE_BY_R5,
			Value::Integer(amount) => (amount & 15) as u8,
			_ => return Err(self.error(ErrorKind::InvalidRotationAmount, span)),
		};
		if amount == 0 {
			return Ok(());
		}
		self.build(span, |builder| builder.apply_rotation(context, amount))
	}

	//#endregion
}
