//! Expression parsing: feeds operands and operators from the lexer into the [`Evaluator`].

use miette::SourceSpan;

use super::{Assembler, Result, table};
use crate::error::{AssemblyError, ErrorKind};
use crate::expression::operator::{lookup_symbol, lookup_word};
use crate::expression::{ElementSign, Evaluator, OperatorSymbol, RegisterCapabilities, RegisterDescriptor, Value};
use crate::parser::lexer::{Lexer, Token, parse_int};

/// Source span from byte `start` of the line up to the cursor.
pub(super) fn span_since(lexer: &Lexer, start: usize) -> SourceSpan {
	(lexer.offset() + start, lexer.position().saturating_sub(start)).into()
}

/// Whether a `-` just lexed stands alone as an operand, which denotes the nop register.
fn is_lone_dash(lexer: &Lexer) -> bool {
	lexer.rest().trim_start().chars().next().is_none_or(|next| matches!(next, ',' | ';' | '.' | '#'))
}

impl Assembler {
	/// Consumes the next token, which must be `token`.
	pub(super) fn expect(&self, lexer: &mut Lexer, token: Token, expected: &'static str) -> Result {
		if lexer.next_token() == token { Ok(()) } else { Err(self.unexpected(lexer, expected)) }
	}

	/// Error for the token just lexed.
	pub(super) fn unexpected(&self, lexer: &Lexer, expected: &'static str) -> Box<AssemblyError> {
		let found = match lexer.token() {
			Token::End => "end of line".to_owned(),
			_ => lexer.text().to_owned(),
		};
		self.error(ErrorKind::UnexpectedToken { expected, found }, lexer.span())
	}

	/// Parses one expression. The expression ends at the first token that cannot continue it, which is left for the
	/// caller. An empty expression yields [`Value::None`].
	pub(super) fn parse_expression(&mut self, lexer: &mut Lexer) -> Result<Value> {
		let start = lexer.position();
		let mut evaluator = Evaluator::new();
		loop {
			let token = lexer.next_token();
			let span = lexer.span();
			let value = match token {
				Token::Word => {
					let word = lexer.text().to_owned();
					if let Some(value) = self.pass.constant(&word) {
						value
					} else if self.pass.functions.contains_key(&word) {
						self.call_function(&word, lexer, span)?
					} else if self.pass.function_macros.contains_key(&word) {
						self.call_function_macro(&word, lexer, span)?
					} else if let Some(register) = table::register_named(&word) {
						Value::Register(register)
					} else if let Some(symbol) = lookup_word(&word) {
						if self.push_operator(&mut evaluator, symbol, span)? {
							continue;
						}
						lexer.unget();
						break;
					} else {
						if lexer.next_token() != Token::Colon {
							return Err(self.error(ErrorKind::UndefinedIdentifier(word), span));
						}
						if word != "r" {
							return Err(self.error(ErrorKind::InvalidLabelPrefix(word), span));
						}
						self.parse_label_operand(lexer)?
					}
				},
				Token::Colon => self.parse_label_operand(lexer)?,
				Token::Operator if lexer.text() == "-" && evaluator.expects_operand() && is_lone_dash(lexer) =>
					table::register_named("nop").map_or(Value::None, Value::Register),
				Token::Operator | Token::OpenParenthesis | Token::CloseParenthesis => {
					let symbol = lookup_symbol(lexer.text())
						.ok_or_else(|| self.error(ErrorKind::InvalidOperator(lexer.text().to_owned()), span))?;
					if self.push_operator(&mut evaluator, symbol, span)? {
						continue;
					}
					lexer.unget();
					break;
				},
				Token::OpenBracket => self.parse_per_element(lexer)?,
				Token::Number => self.parse_number(lexer)?,
				_ => {
					lexer.unget();
					break;
				},
			};
			evaluator.push_value(value).map_err(|error| self.error(error, span))?;
		}
		evaluator.evaluate().map_err(|error| self.error(error, span_since(lexer, start)))
	}

	fn push_operator(&self, evaluator: &mut Evaluator, symbol: OperatorSymbol, span: SourceSpan) -> Result<bool> {
		evaluator.push_operator(symbol).map_err(|error| self.error(error, span))
	}

	/// Parses an expression that must evaluate to an integer.
	pub(super) fn parse_integer(&mut self, lexer: &mut Lexer) -> Result<i64> {
		let start = lexer.position();
		match self.parse_expression(lexer)? {
			Value::Integer(value) => Ok(value),
			other => Err(self.error(
				ErrorKind::OperandType { expected: "integer", found: other.type_name() },
				span_since(lexer, start),
			)),
		}
	}

	/// Parses what follows a `:` in an expression: a label name, `:(address)` or `:[number, capabilities, rotation]`.
	fn parse_label_operand(&mut self, lexer: &mut Lexer) -> Result<Value> {
		let mut token = lexer.next_token();
		if token == Token::Colon {
			token = lexer.next_token();
		}
		let span = lexer.span();
		match token {
			Token::OpenParenthesis => {
				let address = self.parse_integer(lexer)?;
				self.expect(lexer, Token::CloseParenthesis, "')'")?;
				Ok(Value::Label(address))
			},
			Token::OpenBracket => self.parse_register_constant(lexer),
			Token::Number => {
				let text = lexer.text();
				let (name, forward) = text.strip_suffix('f').map_or((text, false), |name| (name, true));
				let name = name.to_owned();
				self.label_ref(&name, forward, span)
			},
			Token::Word => {
				let name = lexer.text().to_owned();
				self.label_ref(&name, false, span)
			},
			_ => Err(self.unexpected(lexer, "label name")),
		}
	}

	fn parse_register_constant(&mut self, lexer: &mut Lexer) -> Result<Value> {
		let number = self.parse_integer(lexer)?;
		self.expect(lexer, Token::Comma, "','")?;
		let capabilities = self.parse_integer(lexer)?;
		let rotation = match lexer.next_token() {
			Token::Comma => {
				let rotation = self.parse_integer(lexer)?;
				self.expect(lexer, Token::CloseBracket, "']'")?;
				rotation
			},
			Token::CloseBracket => 0,
			_ => return Err(self.unexpected(lexer, "',' or ']'")),
		};
		Ok(Value::Register(RegisterDescriptor {
			number:       number as u8,
			capabilities: RegisterCapabilities::from_bits_retain(capabilities as u8),
			rotation:     rotation as u8,
		}))
	}

	/// Parses the elements of a per-element constant after the opening bracket.
	fn parse_per_element(&mut self, lexer: &mut Lexer) -> Result<Value> {
		let mut value = 0u32;
		let mut sign = ElementSign::Either;
		let mut position = 0;
		loop {
			let start = lexer.position();
			let element = self.parse_expression(lexer)?;
			let span = span_since(lexer, start);
			let Value::Integer(mut element) = element else {
				return Err(self.error(ErrorKind::OperandType { expected: "integer", found: element.type_name() }, span));
			};
			if !(-2 ..= 3).contains(&element) {
				return Err(self.error(ErrorKind::PerElementRange, span));
			}
			if element < 0 {
				if sign == ElementSign::Unsigned {
					return Err(self.error(ErrorKind::PerElementMixedSign, span));
				}
				sign = ElementSign::Signed;
				element &= 3;
			} else if element > 1 {
				if sign == ElementSign::Signed {
					return Err(self.error(ErrorKind::PerElementMixedSign, span));
				}
				sign = ElementSign::Unsigned;
			}
			value |= ((element as u32 * 0x8001) & 0x10001) << position;

			match lexer.next_token() {
				Token::Comma if position < 15 => position += 1,
				Token::Comma => return Err(self.error(ErrorKind::PerElementCount { too_many: true }, lexer.span())),
				Token::CloseBracket if position == 15 => return Ok(Value::PerElement(value, sign)),
				Token::CloseBracket => return Err(self.error(ErrorKind::PerElementCount { too_many: false }, lexer.span())),
				_ => return Err(self.unexpected(lexer, "',' or ']'")),
			}
		}
	}

	/// Parses the number token just lexed. Literals with a period are floats, everything else integers.
	fn parse_number(&self, lexer: &mut Lexer) -> Result<Value> {
		let span = lexer.span();
		let mut text = lexer.text().to_owned();
		if !text.contains('.') {
			let (value, length) = parse_int(&text);
			if length != text.len() {
				return Err(self.error(ErrorKind::MalformedInteger(text), span));
			}
			return Ok(Value::Integer(value));
		}

		// The sign of an exponent is lexed as an operator.
		if text.ends_with(['e', 'E'])
			&& let Some(sign @ ('+' | '-')) = lexer.peek_char()
		{
			let digits = lexer.rest()[sign.len_utf8() ..].bytes().take_while(u8::is_ascii_digit).count();
			let length = sign.len_utf8() + digits;
			text.push_str(&lexer.rest()[.. length]);
			lexer.set_position(lexer.position() + length);
		}
		let span = (span.offset(), text.len()).into();
		text.parse::<f64>().map(Value::Float).map_err(|_| self.error(ErrorKind::MalformedFloat(text), span))
	}
}
