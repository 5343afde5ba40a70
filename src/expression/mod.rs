//! Expression evaluation.
//!
//! The [`Evaluator`] is an operator precedence (shunting yard) machine. The statement parser feeds it values and
//! operators as it lexes them and asks for the result once it hits something that cannot continue the expression. The
//! evaluator knows nothing about source locations; its errors carry only the message and are located by the caller.

pub mod operator;
pub mod value;
#[cfg(test)] mod test;

pub use operator::{Operator, OperatorSymbol};
pub use value::{ElementSign, ROTATE_BY_R5, RegisterCapabilities, RegisterDescriptor, Value};

use crate::error::EvalError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StackEntry {
	Operator(Operator),
	Parenthesis,
}

/// Incremental evaluator for one expression.
#[derive(Debug, Default)]
pub struct Evaluator {
	operands:     Vec<Value>,
	operators:    Vec<StackEntry>,
	have_operand: bool,
}

impl Evaluator {
	/// Creates an empty evaluator.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Whether the evaluator currently expects an operand rather than an operator.
	#[must_use]
	pub const fn expects_operand(&self) -> bool {
		!self.have_operand
	}

	/// Appends an operand.
	///
	/// # Errors
	/// If the previous element was an operand as well.
	pub fn push_value(&mut self, value: Value) -> Result<(), EvalError> {
		if self.have_operand {
			return Err(EvalError::MissingOperator);
		}
		self.operands.push(value);
		self.have_operand = true;
		Ok(())
	}

	/// Offers an operator to the evaluator. Returns `false` if the operator cannot continue the current expression, in
	/// which case the caller should stop and evaluate; e.g. a closing parenthesis that belongs to an enclosing
	/// argument list.
	///
	/// # Errors
	/// If the operator can neither start nor continue the expression, or applying an operator fails.
	pub fn push_operator(&mut self, symbol: OperatorSymbol) -> Result<bool, EvalError> {
		match symbol {
			OperatorSymbol::OpenParenthesis => {
				if self.have_operand {
					return Ok(false);
				}
				self.operators.push(StackEntry::Parenthesis);
			},
			OperatorSymbol::CloseParenthesis => {
				if !self.operators.contains(&StackEntry::Parenthesis) {
					return Ok(false);
				}
				if !self.have_operand {
					return Err(EvalError::IncompleteExpression);
				}
				while let Some(StackEntry::Operator(operator)) = self.operators.last().copied() {
					self.operators.pop();
					self.reduce(operator)?;
				}
				self.operators.pop();
			},
			OperatorSymbol::Operator { prefix, infix } =>
				if self.have_operand {
					let Some(operator) = infix else {
						return Ok(false);
					};
					while let Some(StackEntry::Operator(top)) = self.operators.last().copied() {
						if top.precedence() > operator.precedence()
							|| (top.precedence() == operator.precedence() && !operator.is_right_associative())
						{
							self.operators.pop();
							self.reduce(top)?;
						} else {
							break;
						}
					}
					self.operators.push(StackEntry::Operator(operator));
					self.have_operand = false;
				} else {
					let operator = prefix.or(infix).ok_or(EvalError::IncompleteExpression)?;
					if !operator.is_unary() {
						return Err(EvalError::MissingOperand { operator: operator.symbol() });
					}
					self.operators.push(StackEntry::Operator(operator));
				},
		}
		Ok(true)
	}

	fn reduce(&mut self, operator: Operator) -> Result<(), EvalError> {
		let right = self.operands.pop().ok_or(EvalError::IncompleteExpression)?;
		let result = if operator.is_unary() {
			operator.apply_unary(right)?
		} else {
			let left = self.operands.pop().ok_or(EvalError::IncompleteExpression)?;
			operator.apply_binary(left, right)?
		};
		self.operands.push(result);
		Ok(())
	}

	/// Applies all pending operators and returns the result. An empty expression yields [`Value::None`].
	///
	/// # Errors
	/// If the expression is incomplete, has unbalanced parentheses, or applying an operator fails.
	pub fn evaluate(mut self) -> Result<Value, EvalError> {
		if self.operands.is_empty() && self.operators.is_empty() {
			return Ok(Value::None);
		}
		if !self.have_operand {
			return Err(EvalError::IncompleteExpression);
		}
		while let Some(entry) = self.operators.pop() {
			match entry {
				StackEntry::Operator(operator) => self.reduce(operator)?,
				StackEntry::Parenthesis => return Err(EvalError::UnbalancedParenthesis),
			}
		}
		match (self.operands.pop(), self.operands.is_empty()) {
			(Some(result), true) => Ok(result),
			_ => Err(EvalError::IncompleteExpression),
		}
	}
}
