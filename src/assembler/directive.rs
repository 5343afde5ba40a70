//! Assembler directives.

use std::path::PathBuf;
use std::sync::Arc;

use miette::SourceSpan;

use super::context::{
	ConditionBlock, ConditionState, Frame, FrameKind, Function, Location, Macro, Recording, RecordingKind, SourceFile,
};
use super::expression::span_since;
use super::table::{self, Directive, DirectiveClass};
use super::{Assembler, Result};
use crate::error::ErrorKind;
use crate::expression::Value;
use crate::instruction::{InstructionBuilder, InstructionFlags};
use crate::parser::lexer::{Lexer, Token};
use crate::source::AssemblyCode;

/// Largest repetition count of `.rep`.
const MAXIMUM_REPEAT_COUNT: i64 = 0x100_0000;
/// How many instructions `.back` can move at most.
const MAXIMUM_BACK_COUNT: i64 = 10;

impl Assembler {
	/// Parses a directive after its leading period.
	pub(super) fn parse_directive(&mut self, lexer: &mut Lexer) -> Result {
		let recording = self.pass.recording.is_some();
		let disabled = self.pass.is_disabled();
		let directive = if lexer.next_token() == Token::Word { table::directive(lexer.text()) } else { None };
		let Some(directive) = directive else {
			if recording {
				self.record_line(lexer);
				return Ok(());
			}
			if disabled {
				return Ok(());
			}
			return Err(match lexer.token() {
				Token::Word => self.error(ErrorKind::UnknownDirective(lexer.text().to_owned()), lexer.span()),
				_ => self.unexpected(lexer, "assembler directive"),
			});
		};
		let name = lexer.text().to_owned();
		let span = lexer.span();

		if recording {
			if self.record_directive(directive, &name, lexer, span)? {
				return Ok(());
			}
		} else if disabled && directive.class() != DirectiveClass::Conditional {
			return Ok(());
		}

		match directive {
			Directive::Global => self.parse_global(lexer),
			Directive::Set { local, constant } => self.parse_set(lexer, local, constant),
			Directive::Unset { local } => self.parse_unset(lexer, local),
			Directive::If => {
				let state = if disabled {
					lexer.skip_rest();
					ConditionState::Disabled
				} else if self.parse_condition(lexer)? {
					ConditionState::True
				} else {
					ConditionState::False
				};
				self.push_condition(state);
				Ok(())
			},
			Directive::IfSet => {
				let state = if disabled {
					lexer.skip_rest();
					ConditionState::Disabled
				} else {
					if lexer.next_token() != Token::Word {
						return Err(self.unexpected(lexer, "identifier"));
					}
					let is_set = self.pass.constant(lexer.text()).is_some();
					self.expect_end(lexer)?;
					if is_set { ConditionState::True } else { ConditionState::False }
				};
				self.push_condition(state);
				Ok(())
			},
			Directive::ElseIf => {
				let state = self.current_condition("elseif", span)?;
				let state = match state {
					ConditionState::False =>
						if self.parse_condition(lexer)? {
							ConditionState::True
						} else {
							ConditionState::False
						},
					ConditionState::True => ConditionState::Settled,
					other => other,
				};
				lexer.skip_rest();
				self.set_condition(state);
				Ok(())
			},
			Directive::Else => {
				let state = match self.current_condition("else", span)? {
					ConditionState::False => ConditionState::True,
					ConditionState::True => ConditionState::Settled,
					other => other,
				};
				self.set_condition(state);
				self.expect_end(lexer)
			},
			Directive::EndIf => {
				let scope = self.pass.conditions.last().map(|condition| condition.scope);
				match scope {
					None =>
						return Err(
							self.error(ErrorKind::UnmatchedBlockEnd { directive: "endif", opening: "if" }, span)
						),
					Some(scope) if scope != self.condition_scope() =>
						return Err(self.error(ErrorKind::EndifInOtherFile, span)),
					Some(_) => self.pass.conditions.pop(),
				};
				self.expect_end(lexer)
			},
			Directive::Assert => {
				let start = lexer.position();
				if self.parse_condition(lexer)? {
					Ok(())
				} else {
					Err(self.error(ErrorKind::AssertionFailed, span_since(lexer, start)))
				}
			},
			Directive::Local => {
				self.expect_end(lexer)?;
				let location = self.location();
				self.pass.frames.push(Frame::new(FrameKind::Block, Some(location), span));
				Ok(())
			},
			Directive::EndLocal => {
				if self.pass.frames.last().is_none_or(|frame| frame.kind != FrameKind::Block) {
					return Err(self.error(ErrorKind::UnmatchedBlockEnd { directive: "endloc", opening: "local" }, span));
				}
				self.pass.frames.pop();
				self.expect_end(lexer)
			},
			Directive::Data(bits) => self.parse_data(lexer, bits),
			Directive::Bits => {
				let start = lexer.position();
				let width = self.parse_integer(lexer)?;
				if !(1 ..= 64).contains(&width) {
					return Err(self.error(ErrorKind::InvalidDataWidth(width), span_since(lexer, start)));
				}
				self.expect(lexer, Token::Comma, "','")?;
				self.parse_data(lexer, width as i32)
			},
			Directive::Align => self.parse_align(lexer),
			Directive::Back => self.parse_back(lexer, span),
			Directive::EndBack => {
				self.expect_end(lexer)?;
				self.pass.pc += self.pass.back;
				self.pass.back = 0;
				self.resume_previous();
				Ok(())
			},
			Directive::Clone => self.parse_clone(lexer),
			Directive::Segment(kind) => {
				self.expect_end(lexer)?;
				self.pass.segments.set_kind(self.pass.pc, kind);
				Ok(())
			},
			Directive::Include => self.parse_include(lexer, span),
			Directive::Macro { functional } => self.begin_macro(lexer, functional),
			Directive::Repeat | Directive::ForEach => self.begin_loop(lexer, directive == Directive::ForEach),
			Directive::EndMacro { .. } | Directive::EndRepeat | Directive::EndForEach =>
				self.end_recording(lexer, &name, span),
		}
	}

	/// Handles a directive while a macro or loop body is being recorded. Returns whether the directive is done with;
	/// otherwise, it closes the recording and must be executed.
	fn record_directive(&mut self, directive: Directive, name: &str, lexer: &Lexer, span: SourceSpan) -> Result<bool> {
		let Some(recording) = &mut self.pass.recording else {
			return Ok(false);
		};
		let class = directive.class();
		match class {
			DirectiveClass::Plain | DirectiveClass::Conditional => {},
			DirectiveClass::LoopStart => recording.depth += 1,
			DirectiveClass::LoopEnd if recording.depth > 0 => recording.depth -= 1,
			DirectiveClass::LoopEnd | DirectiveClass::Definition => {
				let expected = recording.kind.end_directive();
				if name == expected {
					return Ok(false);
				}
				let is_macro = matches!(recording.kind, RecordingKind::Macro { .. });
				let definition = recording.body.definition;
				if matches!(directive, Directive::Macro { .. }) {
					let previous = self.describe(definition);
					return Err(self.error(ErrorKind::NestedMacro { previous }, span));
				}
				if !(is_macro && class == DirectiveClass::LoopEnd) {
					return Err(self.error(ErrorKind::MacroEndMismatch { directive: name.to_owned(), expected }, span));
				}
			},
		}
		self.record_line(lexer);
		Ok(true)
	}

	/// Consumes the end of the line.
	pub(super) fn expect_end(&self, lexer: &mut Lexer) -> Result {
		self.expect(lexer, Token::End, "end of line")
	}

	/// Continues building on the instruction before the current position, so that a following `;` statement can be
	/// merged into it.
	fn resume_previous(&mut self) {
		let pc = self.pass.pc;
		self.pass.builder = match pc.checked_sub(1).and_then(|previous| self.pass.words.get(previous)) {
			Some(&word) => InstructionBuilder::resume(word, self.pass.flags.get(pc - 1).copied().unwrap_or_default()),
			None => InstructionBuilder::new(),
		};
	}

	//#region Symbols

	fn parse_global(&mut self, lexer: &mut Lexer) -> Result {
		let (name, value) = match lexer.next_token() {
			Token::Word => {
				let name = lexer.text().to_owned();
				let span = lexer.span();
				match lexer.next_token() {
					Token::Comma => {
						let start = lexer.position();
						let value = self.parse_expression(lexer)?;
						match value {
							Value::Integer(integer) if (-0x8000_0000 ..= 0xffff_ffff).contains(&integer) => {},
							Value::Label(_) => {},
							other =>
								return Err(self.error(ErrorKind::GlobalValue(other.to_string()), span_since(lexer, start))),
						}
						(name, value)
					},
					Token::End => {
						lexer.unget();
						let value = self.label_ref(&name, false, span)?;
						(name, value)
					},
					_ => return Err(self.unexpected(lexer, "',' or end of line")),
				}
			},
			Token::Colon => {
				let mut token = lexer.next_token();
				if token == Token::Colon {
					token = lexer.next_token();
				}
				if token != Token::Word {
					return Err(self.unexpected(lexer, "label name"));
				}
				let name = lexer.text().to_owned();
				let value = self.label_ref(&name, false, lexer.span())?;
				(name, value)
			},
			_ => return Err(self.unexpected(lexer, "global symbol name")),
		};
		let span = span_since(lexer, 0);
		self.expect_end(lexer)?;

		match self.pass.globals.get(&name) {
			None => {
				self.pass.globals.insert(name, value);
			},
			Some(previous) if *previous == value => self.message(ErrorKind::DuplicateGlobal { name }, span),
			Some(_) => self.message(ErrorKind::GlobalRedefinition { name }, span),
		}
		Ok(())
	}

	fn parse_set(&mut self, lexer: &mut Lexer, local: bool, constant: bool) -> Result {
		if lexer.next_token() != Token::Word {
			return Err(self.unexpected(lexer, "identifier"));
		}
		let name = lexer.text().to_owned();
		let span = lexer.span();
		match lexer.next_token() {
			Token::OpenParenthesis => self.define_function(lexer, name, span),
			Token::Comma => {
				let value = self.parse_expression(lexer)?;
				self.expect_end(lexer)?;
				let frame = if local { self.pass.frames.len() - 1 } else { 0 };
				let constants = &mut self.pass.frames[frame].constants;
				if constant && constants.contains_key(&name) {
					return Err(self.error(ErrorKind::ConstantRedefinition { name }, span));
				}
				constants.insert(name, value);
				Ok(())
			},
			_ => Err(self.unexpected(lexer, "',' or '('")),
		}
	}

	/// Defines `name(arguments) body` after the opening parenthesis. The body is kept as text.
	fn define_function(&mut self, lexer: &mut Lexer, name: String, span: SourceSpan) -> Result {
		let mut arguments = Vec::new();
		if lexer.next_token() == Token::CloseParenthesis {
			// no arguments
		} else {
			lexer.unget();
			loop {
				match lexer.next_token() {
					Token::Word => arguments.push(lexer.text().to_owned()),
					Token::Number => return Err(self.error(ErrorKind::NumericMacroArgument, lexer.span())),
					_ => return Err(self.unexpected(lexer, "argument name")),
				}
				match lexer.next_token() {
					Token::Comma => {},
					Token::CloseParenthesis => break,
					_ => return Err(self.unexpected(lexer, "',' or ')'")),
				}
			}
		}

		let rest = lexer.rest();
		let skipped = rest.len() - rest.trim_start_matches([' ', '\t', '\r', '\n', ',']).len();
		let function = Function {
			arguments,
			body: rest[skipped ..].to_owned(),
			offset: lexer.offset() + lexer.position() + skipped,
			definition: self.location(),
		};
		lexer.skip_rest();
		if self.pass.functions.insert(name.clone(), function).is_some() {
			self.message(ErrorKind::FunctionRedefinition { name }, span);
		}
		Ok(())
	}

	fn parse_unset(&mut self, lexer: &mut Lexer, local: bool) -> Result {
		if lexer.next_token() != Token::Word {
			return Err(self.unexpected(lexer, "identifier"));
		}
		let name = lexer.text().to_owned();
		let span = lexer.span();
		self.expect_end(lexer)?;
		let frame = if local { self.pass.frames.len() - 1 } else { 0 };
		if self.pass.frames[frame].constants.remove(&name).is_none() {
			self.message(ErrorKind::UndefinedConstant { name }, span);
		}
		Ok(())
	}

	//#endregion
	//#region Conditions

	/// Parses the rest of the line as a condition.
	fn parse_condition(&mut self, lexer: &mut Lexer) -> Result<bool> {
		let start = lexer.position();
		let value = self.parse_expression(lexer)?;
		let condition = value.is_true().ok_or_else(|| {
			self.error(ErrorKind::OperandType { expected: "integer", found: value.type_name() }, span_since(lexer, start))
		})?;
		self.expect_end(lexer)?;
		Ok(condition)
	}

	fn push_condition(&mut self, state: ConditionState) {
		let block = ConditionBlock { state, scope: self.condition_scope(), line: self.location().line };
		self.pass.conditions.push(block);
	}

	fn current_condition(&self, directive: &'static str, span: SourceSpan) -> Result<ConditionState> {
		self.pass
			.conditions
			.last()
			.map(|condition| condition.state)
			.ok_or_else(|| self.error(ErrorKind::UnmatchedBlockEnd { directive, opening: "if" }, span))
	}

	fn set_condition(&mut self, state: ConditionState) {
		if let Some(condition) = self.pass.conditions.last_mut() {
			condition.state = state;
		}
	}

	//#endregion
	//#region Data and layout

	/// Parses a comma-separated list of data values of `bits` width; negative widths are floating point formats.
	fn parse_data(&mut self, lexer: &mut Lexer, bits: i32) -> Result {
		let mut warned = false;
		loop {
			let start = lexer.position();
			let value = self.parse_expression(lexer)?;
			let span = span_since(lexer, start);
			let (raw, width) = match (bits, value) {
				(-64, Value::Integer(value)) => ((value as f64).to_bits(), 64),
				(-64, Value::Float(value)) => (value.to_bits(), 64),
				(-32, Value::Integer(value)) => (u64::from((value as f32).to_bits()), 32),
				(-32, Value::Float(value)) => (u64::from((value as f32).to_bits()), 32),
				(-16, Value::Integer(value)) => (self.half_data(value as f64, span), 16),
				(-16, Value::Float(value)) => (self.half_data(value, span), 16),
				(1 .., Value::Integer(value)) => (self.integer_data(value, bits as u32, span), bits as u32),
				(_, other) => return Err(self.error(ErrorKind::DataType(other.type_name()), span)),
			};
			self.store_data(raw, width, span, &mut warned);

			match lexer.next_token() {
				Token::Comma => {},
				Token::End => break,
				_ => return Err(self.unexpected(lexer, "',' or end of line")),
			}
		}
		self.pass.builder = InstructionBuilder::new();
		Ok(())
	}

	/// Range checks an integer data value and truncates it to `bits`.
	fn integer_data(&mut self, value: i64, bits: u32, span: SourceSpan) -> u64 {
		if bits >= 64 {
			return value as u64;
		}
		let mask = u64::MAX >> (64 - bits);
		let lower = if bits == 1 { 0 } else { -(1i128 << (bits - 1)) };
		if i128::from(value) > i128::from(mask) || i128::from(value) < lower {
			self.message(ErrorKind::DataOutOfRange { value, bits }, span);
		}
		value as u64 & mask
	}

	fn half_data(&mut self, value: f64, span: SourceSpan) -> u64 {
		let half = half::f16::from_f64(value);
		if half.is_infinite() && value.is_finite() {
			self.message(ErrorKind::DataOutOfRange { value: value as i64, bits: 16 }, span);
		}
		u64::from(half.to_bits())
	}

	/// Appends `width` bits of data at the current bit position, spilling into the next word where necessary.
	fn store_data(&mut self, raw: u64, width: u32, span: SourceSpan, warned: &mut bool) {
		if self.pass.bit_offset == 0 {
			self.store_word(0);
		} else if !*warned && self.pass.bit_offset % width != 0 {
			*warned = true;
			self.message(ErrorKind::UnalignedData, span);
		}
		let pc = self.pass.pc;
		self.pass.ensure_flags(pc);
		self.pass.flags[pc] |= InstructionFlags::BRANCH_TARGET | InstructionFlags::DATA;
		if let Some(word) = self.pass.words.get_mut(pc) {
			*word |= raw << self.pass.bit_offset;
		}

		self.pass.bit_offset += width;
		if self.pass.bit_offset >= 64 {
			self.pass.pc += 1;
			self.pass.bit_offset -= 64;
			if self.pass.bit_offset != 0 {
				self.store_word(raw >> (width - self.pass.bit_offset));
				let pc = self.pass.pc;
				self.pass.ensure_flags(pc);
				self.pass.flags[pc] |= InstructionFlags::BRANCH_TARGET | InstructionFlags::DATA;
			}
		}
	}

	fn parse_align(&mut self, lexer: &mut Lexer) -> Result {
		let start = lexer.position();
		let bytes = self.parse_integer(lexer)?;
		if !(0 ..= 64).contains(&bytes) || bytes & (bytes - 1) != 0 {
			return Err(self.error(ErrorKind::InvalidAlignment(bytes), span_since(lexer, start)));
		}
		let offset = match lexer.next_token() {
			Token::Comma => {
				let start = lexer.position();
				let offset = match self.parse_expression(lexer)? {
					Value::Integer(offset) | Value::Label(offset) => -offset & 63,
					other =>
						return Err(self.error(
							ErrorKind::OperandType { expected: "integer or label", found: other.type_name() },
							span_since(lexer, start),
						)),
				};
				self.expect_end(lexer)?;
				offset
			},
			Token::End => 0,
			_ => return Err(self.unexpected(lexer, "',' or end of line")),
		};
		self.do_align(bytes as u32, offset as u32);
		Ok(())
	}

	fn parse_back(&mut self, lexer: &mut Lexer, span: SourceSpan) -> Result {
		if self.pass.back != 0 {
			return Err(self.error(ErrorKind::NestedBack, span));
		}
		let start = lexer.position();
		let count = self.parse_integer(lexer)?;
		if !(0 ..= MAXIMUM_BACK_COUNT).contains(&count) || count as usize > self.pass.pc {
			return Err(self.error(ErrorKind::InvalidBackCount(count), span_since(lexer, start)));
		}
		self.expect_end(lexer)?;

		let count = count as usize;
		self.pass.back = count;
		self.pass.pc -= count;
		self.resume_previous();
		let pc = self.pass.pc;
		let crossed = (pc + 1 .. pc + count)
			.any(|position| self.pass.flags.get(position).is_some_and(|flags| flags.contains(InstructionFlags::BRANCH_TARGET)));
		if crossed {
			self.message(ErrorKind::BackAcrossBranchTarget, span);
		}
		Ok(())
	}

	fn parse_clone(&mut self, lexer: &mut Lexer) -> Result {
		let start = lexer.position();
		let (address, first) = match self.parse_expression(lexer)? {
			Value::Label(address) => (address, usize::try_from(address >> 3).ok()),
			other =>
				return Err(self.error(
					ErrorKind::OperandType { expected: "label", found: other.type_name() },
					span_since(lexer, start),
				)),
		};
		let source_span = span_since(lexer, start);
		self.expect(lexer, Token::Comma, "','")?;
		let start = lexer.position();
		let count = self.parse_integer(lexer)?;
		let span = span_since(lexer, start);
		if !(0 ..= 3).contains(&count) {
			return Err(self.error(ErrorKind::InvalidCloneCount(count), span));
		}
		self.expect_end(lexer)?;
		if count == 0 {
			return Ok(());
		}

		let Some((first, end)) = first.and_then(|first| Some((first, first.checked_add(count as usize)?))) else {
			return Err(self.error(ErrorKind::CloneOutOfRange(address), source_span));
		};
		// Pass 1 may clone code that does not exist yet; it only needs the instruction count.
		if self.pass2 && end > self.carried.previous_words.len() {
			return Err(self.error(ErrorKind::CloneBehindEnd, span));
		}
		if self.do_align(8, 0) {
			self.message(ErrorKind::InstructionPadding, span);
		}
		for source in first .. end {
			let words = if self.pass2 { &self.carried.previous_words } else { &self.pass.words };
			let word = words.get(source).copied().unwrap_or_default();
			let flags = self.pass.flags.get(source).copied().unwrap_or_default() - InstructionFlags::BRANCH_TARGET;
			if word >> 60 == 0xf {
				self.message(ErrorKind::CloneBranch, span);
			}
			let pc = self.pass.pc;
			self.pass.ensure_flags(pc);
			self.pass.flags[pc] |= flags;
			self.store_word(word);
			self.pass.pc += 1;
		}
		self.resume_previous();
		Ok(())
	}

	//#endregion
	//#region Files

	fn parse_include(&mut self, lexer: &mut Lexer, span: SourceSpan) -> Result {
		let rest = lexer.rest().trim_start();
		let (name, system) = match rest.chars().next() {
			Some('"') => rest[1 ..].split_once('"').map(|(name, remainder)| (name, false, remainder)),
			Some('<') => rest[1 ..].split_once('>').map(|(name, remainder)| (name, true, remainder)),
			_ => None,
		}
		.filter(|(name, _, remainder)| {
			!name.is_empty() && remainder.trim_start().chars().next().is_none_or(|next| next == '#')
		})
		.map(|(name, system, _)| (name.to_owned(), system))
		.ok_or_else(|| self.error(ErrorKind::IncludeSyntax, span))?;
		lexer.skip_rest();

		let current = &self.carried.files[self.location().file].code.name;
		let relative = current.parent().map_or_else(|| PathBuf::from(&name), |directory| directory.join(&name));
		let path = system
			.then(|| self.include_paths.iter().map(|directory| directory.join(&name)).find(|path| self.sources.exists(path)))
			.flatten()
			.unwrap_or(relative);
		let not_found = || ErrorKind::FileNotFound { name: name.clone() };
		if !self.sources.exists(&path) {
			return Err(self.error(not_found(), span));
		}
		let canonical = self.sources.canonical_name(&path);

		let index = if self.pass2 {
			let index = self.pass.files_count;
			if self.carried.files.get(index).is_none_or(|file| file.code.name != canonical) {
				return Err(self.error(ErrorKind::InconsistentPass("include files"), span));
			}
			index
		} else {
			let text = self.sources.read(&path).map_err(|_| self.error(not_found(), span))?;
			let mut code = AssemblyCode::new_from_path(&text, &canonical);
			code.include_path.clone_from(&self.include_paths);
			let parent = Some(self.location());
			self.carried.files.push(SourceFile { code: Arc::new(code), parent });
			self.carried.files.len() - 1
		};
		self.pass.files_count = index + 1;
		log::debug!("Including {}", canonical.display());

		let frame = Frame::new(FrameKind::Include, Some(Location { file: index, line: 0 }), span);
		self.with_frame(frame, |this| this.parse_file(index))
	}

	//#endregion
	//#region Macros and loops

	/// Starts recording a macro: `.macro name, arguments...` or `.macro name(arguments...)`.
	fn begin_macro(&mut self, lexer: &mut Lexer, functional: bool) -> Result {
		if lexer.next_token() != Token::Word {
			return Err(self.unexpected(lexer, "macro name"));
		}
		let name = lexer.text().to_owned();
		let span = lexer.span();

		let mut arguments = Vec::new();
		// 0: no parenthesis, 1: inside, 2: after the closing parenthesis
		let mut parenthesis = 0;
		loop {
			match lexer.next_token() {
				Token::OpenParenthesis if arguments.is_empty() && parenthesis == 0 => parenthesis = 1,
				Token::Comma if parenthesis != 2 => {},
				Token::CloseParenthesis if parenthesis == 1 => {
					parenthesis = 2;
					continue;
				},
				Token::End if parenthesis != 1 => break,
				Token::Number => return Err(self.error(ErrorKind::NumericMacroArgument, lexer.span())),
				_ => return Err(self.unexpected(lexer, "',' or macro argument")),
			}
			match lexer.next_token() {
				Token::Word => arguments.push(lexer.text().to_owned()),
				Token::Number => return Err(self.error(ErrorKind::NumericMacroArgument, lexer.span())),
				Token::CloseParenthesis if parenthesis == 1 && arguments.is_empty() => parenthesis = 2,
				_ => return Err(self.unexpected(lexer, "macro argument name")),
			}
		}

		let existing = if functional { &self.pass.function_macros } else { &self.pass.macros };
		if let Some(previous) = existing.get(&name).map(|previous| previous.definition) {
			let previous = self.describe(previous);
			self.message(ErrorKind::MacroRedefinition { name: name.clone(), previous }, span);
		}
		self.pass.recording = Some(Recording {
			kind:  RecordingKind::Macro { name, functional },
			body:  Macro { arguments, lines: Vec::new(), definition: self.location() },
			depth: 0,
		});
		Ok(())
	}

	/// Starts recording a loop body: `.rep variable, count` or `.foreach variable, values...`.
	fn begin_loop(&mut self, lexer: &mut Lexer, for_each: bool) -> Result {
		if lexer.next_token() != Token::Word {
			return Err(self.unexpected(lexer, "loop variable name"));
		}
		let variable = lexer.text().to_owned();
		self.expect(lexer, Token::Comma, "','")?;

		let kind = if for_each {
			let mut values = Vec::new();
			loop {
				values.push(self.parse_expression(lexer)?);
				match lexer.next_token() {
					Token::Comma => {},
					Token::End => break,
					_ => return Err(self.unexpected(lexer, "',' or end of line")),
				}
			}
			RecordingKind::ForEach { variable, values }
		} else {
			let start = lexer.position();
			let count = self.parse_integer(lexer)?;
			if !(0 ..= MAXIMUM_REPEAT_COUNT).contains(&count) {
				return Err(self.error(ErrorKind::InvalidRepeatCount(count), span_since(lexer, start)));
			}
			self.expect_end(lexer)?;
			RecordingKind::Repeat { variable, count: count as usize }
		};
		self.pass.recording = Some(Recording {
			kind,
			body: Macro { arguments: Vec::new(), lines: Vec::new(), definition: self.location() },
			depth: 0,
		});
		Ok(())
	}

	/// Closes the recording with its end directive: stores a macro, or expands a loop.
	fn end_recording(&mut self, lexer: &mut Lexer, name: &str, span: SourceSpan) -> Result {
		let Some(recording) = self.pass.recording.take() else {
			let (directive, opening) = match name {
				"endm" => ("endm", "macro"),
				"endf" => ("endf", "func"),
				"endr" => ("endr", "rep"),
				_ => ("endfor", "foreach"),
			};
			return Err(self.error(ErrorKind::UnmatchedBlockEnd { directive, opening }, span));
		};
		self.expect_end(lexer)?;
		match recording.kind {
			RecordingKind::Macro { name, functional } => {
				log::trace!("Defined macro {name} with {} lines", recording.body.lines.len());
				let macros = if functional { &mut self.pass.function_macros } else { &mut self.pass.macros };
				macros.insert(name, recording.body);
				Ok(())
			},
			RecordingKind::Repeat { variable, count } => {
				let values = (0 .. count).map(|index| Value::Integer(index as i64)).collect();
				self.expand_loop(&variable, values, &recording.body, span)
			},
			RecordingKind::ForEach { variable, values } => self.expand_loop(&variable, values, &recording.body, span),
		}
	}

	//#endregion
}
