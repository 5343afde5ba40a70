//! Expansion of macros, loops, functions and functional macros.
//!
//! All of them replay source text in a new scope that binds the arguments as constants. The replayed lines keep the
//! locations of their definition, so diagnostics point at the macro body while the trail names the invocation.

use std::collections::HashMap;

use miette::SourceSpan;

use super::context::{Frame, FrameKind, Macro};
use super::expression::span_since;
use super::{Assembler, Result};
use crate::error::{AssemblyError, ErrorKind};
use crate::expression::Value;
use crate::parser::lexer::{Lexer, Token};

fn bind(arguments: &[String], values: Vec<Value>) -> HashMap<String, Value> {
	arguments.iter().cloned().zip(values).collect()
}

impl Assembler {
	/// Expands the macro `name`; the cursor is after the name, at the arguments.
	pub(super) fn invoke_macro(&mut self, name: &str, lexer: &mut Lexer, span: SourceSpan) -> Result {
		let Some(body) = self.pass.macros.get(name).cloned() else {
			return Err(self.error(ErrorKind::UnknownOpcode(name.to_owned()), span));
		};
		let expected = body.arguments.len();
		let mut values = Vec::with_capacity(expected);
		if expected == 0 {
			if lexer.next_token() != Token::End {
				return Err(self.argument_count(name, 0, true, lexer.span()));
			}
		} else {
			loop {
				values.push(self.parse_expression(lexer)?);
				match lexer.next_token() {
					Token::Comma if values.len() < expected => {},
					Token::Comma => return Err(self.argument_count(name, expected, true, lexer.span())),
					Token::End if values.len() == expected => break,
					Token::End => return Err(self.argument_count(name, expected, false, lexer.span())),
					_ => return Err(self.unexpected(lexer, "',' or end of line")),
				}
			}
		}

		log::trace!("Expanding macro {name}");
		let mut frame = Frame::new(FrameKind::Macro, Some(body.definition), span_since(lexer, 0));
		frame.constants = bind(&body.arguments, values);
		self.with_frame(frame, |this| this.replay(&body))
	}

	/// Expands a loop body once per value, with the value bound to `variable`.
	pub(super) fn expand_loop(&mut self, variable: &str, values: Vec<Value>, body: &Macro, span: SourceSpan) -> Result {
		log::trace!("Expanding loop over {variable} with {} iterations", values.len());
		let frame = Frame::new(FrameKind::Macro, Some(body.definition), span);
		self.with_frame(frame, |this| {
			for value in values {
				if let Some(frame) = this.pass.frames.last_mut() {
					frame.constants.insert(variable.to_owned(), value);
				}
				this.replay(body)?;
			}
			Ok(())
		})
	}

	/// Runs the recorded lines of `body` within the current scope.
	fn replay(&mut self, body: &Macro) -> Result {
		let frame = self.pass.frames.len() - 1;
		let conditions = self.pass.conditions.len();
		let recording = self.pass.recording.is_some();
		for line in &body.lines {
			self.set_line(frame, line.line);
			let mut lexer = Lexer::new(line.text.as_str(), line.offset);
			self.run_line(&mut lexer)?;
		}
		if !recording && let Some(open) = self.pass.recording.take() {
			let line = open.body.definition.line;
			return Err(self.error(ErrorKind::UnterminatedBlock { line }, self.frame_span()));
		}
		self.close_conditions(conditions)
	}

	/// Reports `.if` blocks that were opened at or after `conditions` and are still open, and discards them.
	fn close_conditions(&mut self, conditions: usize) -> Result {
		if let Some(open) = self.pass.conditions.get(conditions) {
			let line = open.line;
			self.pass.conditions.truncate(conditions);
			return Err(self.error(ErrorKind::UnterminatedIf { line }, self.frame_span()));
		}
		Ok(())
	}

	fn frame_span(&self) -> SourceSpan {
		self.pass.frames.last().map_or_else(|| (0, 0).into(), |frame| frame.span)
	}

	fn argument_count(&self, name: &str, expected: usize, too_many: bool, span: SourceSpan) -> Box<AssemblyError> {
		self.error(ErrorKind::ArgumentCount { name: name.to_owned(), expected, too_many }, span)
	}

	/// Parses a parenthesized argument list with exactly `expected` values.
	fn parse_call_arguments(&mut self, name: &str, expected: usize, lexer: &mut Lexer) -> Result<Vec<Value>> {
		self.expect(lexer, Token::OpenParenthesis, "'('")?;
		let mut values = Vec::with_capacity(expected);
		if expected == 0 {
			return match lexer.next_token() {
				Token::CloseParenthesis => Ok(values),
				_ => Err(self.argument_count(name, 0, true, lexer.span())),
			};
		}
		loop {
			values.push(self.parse_expression(lexer)?);
			match lexer.next_token() {
				Token::CloseParenthesis if values.len() == expected => return Ok(values),
				Token::CloseParenthesis => return Err(self.argument_count(name, expected, false, lexer.span())),
				Token::Comma if values.len() < expected => {},
				Token::Comma => return Err(self.argument_count(name, expected, true, lexer.span())),
				_ => return Err(self.unexpected(lexer, "',' or ')'")),
			}
		}
	}

	/// Evaluates a call of the function `name`; the cursor is at the argument list.
	pub(super) fn call_function(&mut self, name: &str, lexer: &mut Lexer, span: SourceSpan) -> Result<Value> {
		let Some(function) = self.pass.functions.get(name).cloned() else {
			return Err(self.error(ErrorKind::UndefinedIdentifier(name.to_owned()), span));
		};
		let values = self.parse_call_arguments(name, function.arguments.len(), lexer)?;
		let mut frame = Frame::new(FrameKind::Function, Some(function.definition), span);
		frame.constants = bind(&function.arguments, values);
		self.with_frame(frame, |this| {
			let mut body = Lexer::new(function.body.as_str(), function.offset);
			let value = this.parse_expression(&mut body)?;
			if body.next_token() != Token::End {
				return Err(this.error(ErrorKind::IncompleteFunction { name: name.to_owned() }, body.span()));
			}
			Ok(value)
		})
	}

	/// Evaluates a call of the functional macro `name`; the cursor is at the argument list. The body runs its
	/// directives and yields the value of its only expression line.
	pub(super) fn call_function_macro(&mut self, name: &str, lexer: &mut Lexer, span: SourceSpan) -> Result<Value> {
		let Some(body) = self.pass.function_macros.get(name).cloned() else {
			return Err(self.error(ErrorKind::UndefinedIdentifier(name.to_owned()), span));
		};
		let values = self.parse_call_arguments(name, body.arguments.len(), lexer)?;
		let mut frame = Frame::new(FrameKind::Function, Some(body.definition), span);
		frame.constants = bind(&body.arguments, values);
		self.with_frame(frame, |this| this.evaluate_function_macro(name, &body, span))
	}

	fn label_in_function_macro(&self, name: &str, lexer: &Lexer) -> Box<AssemblyError> {
		self.error(ErrorKind::LabelInFunctionalMacro { name: name.to_owned() }, lexer.span())
	}

	fn evaluate_function_macro(&mut self, name: &str, body: &Macro, span: SourceSpan) -> Result<Value> {
		let frame = self.pass.frames.len() - 1;
		let conditions = self.pass.conditions.len();
		let mut result = None;
		for line in &body.lines {
			self.set_line(frame, line.line);
			let mut lexer = Lexer::new(line.text.as_str(), line.offset);
			let token = lexer.next_token();
			if self.pass.recording.is_some() && token != Token::Period {
				self.record_line(&lexer);
				continue;
			}
			match token {
				Token::Period => self.parse_directive(&mut lexer)?,
				Token::End => {},
				_ if self.pass.is_disabled() => {},
				Token::Colon => return Err(self.label_in_function_macro(name, &lexer)),
				Token::Word if lexer.peek_char() == Some(':') => return Err(self.label_in_function_macro(name, &lexer)),
				_ => {
					if result.is_some() {
						return Err(self.error(ErrorKind::MultipleFunctionalMacroValues, lexer.span()));
					}
					lexer.unget();
					result = Some(self.parse_expression(&mut lexer)?);
					self.expect_end(&mut lexer)?;
				},
			}
		}
		self.close_conditions(conditions)?;
		result.ok_or_else(|| self.error(ErrorKind::MissingFunctionalMacroValue { name: name.to_owned() }, span))
	}
}
