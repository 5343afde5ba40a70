//! Operator table and operator semantics.

use super::value::Value;
use crate::error::EvalError;

/// All operators known to the evaluator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
	/// Unary `-`.
	Negate,
	/// Unary `+`.
	Identity,
	/// `~`
	Not,
	/// `!`
	LogicalNot,
	/// `abs`
	Absolute,
	/// `ceil`
	Ceiling,
	/// `floor`
	Floor,
	/// `sqrt`
	SquareRoot,
	/// `exp`
	Exponential,
	/// `exp2`
	Exponential2,
	/// `log`
	Logarithm,
	/// `log2`
	Logarithm2,
	/// `**`
	Power,
	/// `*`
	Multiply,
	/// `/`
	Divide,
	/// `%`
	Modulo,
	/// Binary `+`.
	Add,
	/// Binary `-`.
	Subtract,
	/// `<<`
	ShiftLeft,
	/// `>>`, arithmetic.
	ShiftRight,
	/// `<<<`, 32 bit rotation.
	RotateLeft,
	/// `>>>`, 32 bit rotation.
	RotateRight,
	/// `<`
	Less,
	/// `<=`
	LessEqual,
	/// `>`
	Greater,
	/// `>=`
	GreaterEqual,
	/// `==`
	Equal,
	/// `!=`
	NotEqual,
	/// `&`
	And,
	/// `^`
	Xor,
	/// `!^`
	Xnor,
	/// `|`
	Or,
	/// `&&`
	LogicalAnd,
	/// `^^`
	LogicalXor,
	/// `||`
	LogicalOr,
}

/// What a symbol in the source stands for in an expression.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperatorSymbol {
	/// `(`
	OpenParenthesis,
	/// `)`
	CloseParenthesis,
	/// An operator with its prefix and infix interpretations.
	Operator {
		/// Meaning when an operand is expected.
		prefix: Option<Operator>,
		/// Meaning after an operand.
		infix:  Option<Operator>,
	},
}

const fn prefix(operator: Operator) -> OperatorSymbol {
	OperatorSymbol::Operator { prefix: Some(operator), infix: None }
}

const fn infix(operator: Operator) -> OperatorSymbol {
	OperatorSymbol::Operator { prefix: None, infix: Some(operator) }
}

/// Punctuation operators, sorted by symbol for binary search.
static SYMBOLS: [(&str, OperatorSymbol); 27] = [
	("!", prefix(Operator::LogicalNot)),
	("!=", infix(Operator::NotEqual)),
	("!^", infix(Operator::Xnor)),
	("%", infix(Operator::Modulo)),
	("&", infix(Operator::And)),
	("&&", infix(Operator::LogicalAnd)),
	("(", OperatorSymbol::OpenParenthesis),
	(")", OperatorSymbol::CloseParenthesis),
	("*", infix(Operator::Multiply)),
	("**", infix(Operator::Power)),
	("+", OperatorSymbol::Operator { prefix: Some(Operator::Identity), infix: Some(Operator::Add) }),
	("-", OperatorSymbol::Operator { prefix: Some(Operator::Negate), infix: Some(Operator::Subtract) }),
	("/", infix(Operator::Divide)),
	("<", infix(Operator::Less)),
	("<<", infix(Operator::ShiftLeft)),
	("<<<", infix(Operator::RotateLeft)),
	("<=", infix(Operator::LessEqual)),
	("==", infix(Operator::Equal)),
	(">", infix(Operator::Greater)),
	(">=", infix(Operator::GreaterEqual)),
	(">>", infix(Operator::ShiftRight)),
	(">>>", infix(Operator::RotateRight)),
	("^", infix(Operator::Xor)),
	("^^", infix(Operator::LogicalXor)),
	("|", infix(Operator::Or)),
	("||", infix(Operator::LogicalOr)),
	("~", prefix(Operator::Not)),
];

/// Alphabetic operators, sorted by name for binary search. These share their namespace with registers and functions.
static WORDS: [(&str, OperatorSymbol); 13] = [
	("abs", prefix(Operator::Absolute)),
	("and", infix(Operator::And)),
	("ceil", prefix(Operator::Ceiling)),
	("exp", prefix(Operator::Exponential)),
	("exp2", prefix(Operator::Exponential2)),
	("floor", prefix(Operator::Floor)),
	("log", prefix(Operator::Logarithm)),
	("log2", prefix(Operator::Logarithm2)),
	("not", prefix(Operator::Not)),
	("or", infix(Operator::Or)),
	("sqrt", prefix(Operator::SquareRoot)),
	("xnor", infix(Operator::Xnor)),
	("xor", infix(Operator::Xor)),
];

/// Looks up a punctuation operator.
#[must_use]
pub fn lookup_symbol(symbol: &str) -> Option<OperatorSymbol> {
	SYMBOLS.binary_search_by(|(name, _)| (*name).cmp(symbol)).ok().map(|index| SYMBOLS[index].1)
}

/// Looks up an alphabetic operator.
#[must_use]
pub fn lookup_word(word: &str) -> Option<OperatorSymbol> {
	WORDS.binary_search_by(|(name, _)| (*name).cmp(word)).ok().map(|index| WORDS[index].1)
}

fn integer_or_float(operator: Operator, value: Value) -> Result<Value, EvalError> {
	match value {
		Value::Integer(_) | Value::Float(_) => Ok(value),
		_ => Err(EvalError::InvalidOperand { operator: operator.symbol(), operand: value.type_name() }),
	}
}

const fn from_bool(value: bool) -> Value {
	Value::Integer(value as i64)
}

impl Operator {
	/// Source text of the operator.
	#[must_use]
	pub const fn symbol(self) -> &'static str {
		match self {
			Self::Negate | Self::Subtract => "-",
			Self::Identity | Self::Add => "+",
			Self::Not => "~",
			Self::LogicalNot => "!",
			Self::Absolute => "abs",
			Self::Ceiling => "ceil",
			Self::Floor => "floor",
			Self::SquareRoot => "sqrt",
			Self::Exponential => "exp",
			Self::Exponential2 => "exp2",
			Self::Logarithm => "log",
			Self::Logarithm2 => "log2",
			Self::Power => "**",
			Self::Multiply => "*",
			Self::Divide => "/",
			Self::Modulo => "%",
			Self::ShiftLeft => "<<",
			Self::ShiftRight => ">>",
			Self::RotateLeft => "<<<",
			Self::RotateRight => ">>>",
			Self::Less => "<",
			Self::LessEqual => "<=",
			Self::Greater => ">",
			Self::GreaterEqual => ">=",
			Self::Equal => "==",
			Self::NotEqual => "!=",
			Self::And => "&",
			Self::Xor => "^",
			Self::Xnor => "!^",
			Self::Or => "|",
			Self::LogicalAnd => "&&",
			Self::LogicalXor => "^^",
			Self::LogicalOr => "||",
		}
	}

	/// Binding strength; higher binds tighter.
	#[must_use]
	pub const fn precedence(self) -> u8 {
		match self {
			Self::Negate
			| Self::Identity
			| Self::Not
			| Self::LogicalNot
			| Self::Absolute
			| Self::Ceiling
			| Self::Floor
			| Self::SquareRoot
			| Self::Exponential
			| Self::Exponential2
			| Self::Logarithm
			| Self::Logarithm2 => 14,
			Self::Power => 13,
			Self::Multiply | Self::Divide | Self::Modulo => 12,
			Self::Add | Self::Subtract => 11,
			Self::ShiftLeft | Self::ShiftRight | Self::RotateLeft | Self::RotateRight => 10,
			Self::Less | Self::LessEqual | Self::Greater | Self::GreaterEqual => 9,
			Self::Equal | Self::NotEqual => 8,
			Self::And => 7,
			Self::Xor | Self::Xnor => 6,
			Self::Or => 5,
			Self::LogicalAnd => 4,
			Self::LogicalXor => 3,
			Self::LogicalOr => 2,
		}
	}

	/// Whether this operator takes a single operand.
	#[must_use]
	pub const fn is_unary(self) -> bool {
		self.precedence() == 14
	}

	/// Whether operators of equal precedence group from the right.
	#[must_use]
	pub const fn is_right_associative(self) -> bool {
		self.is_unary() || matches!(self, Self::Power)
	}

	/// Applies a unary operator.
	///
	/// # Errors
	/// If the operand type is not supported by the operator.
	pub fn apply_unary(self, operand: Value) -> Result<Value, EvalError> {
		let operand = integer_or_float(self, operand)?;
		Ok(match (self, operand) {
			(Self::Identity, value) => value,
			(Self::Negate, Value::Integer(value)) => Value::Integer(value.wrapping_neg()),
			(Self::Negate, Value::Float(value)) => Value::Float(-value),
			(Self::Not, Value::Integer(value)) => Value::Integer(!value),
			(Self::LogicalNot, value) => from_bool(value.is_true() == Some(false)),
			(Self::Absolute, Value::Integer(value)) => Value::Integer(value.wrapping_abs()),
			(Self::Absolute, Value::Float(value)) => Value::Float(value.abs()),
			(Self::Ceiling | Self::Floor, Value::Integer(value)) => Value::Integer(value),
			(Self::Ceiling, Value::Float(value)) => Value::Float(value.ceil()),
			(Self::Floor, Value::Float(value)) => Value::Float(value.floor()),
			(
				Self::SquareRoot | Self::Exponential | Self::Exponential2 | Self::Logarithm | Self::Logarithm2,
				Value::Integer(value),
			) => self.apply_float_function(value as f64),
			(
				Self::SquareRoot | Self::Exponential | Self::Exponential2 | Self::Logarithm | Self::Logarithm2,
				Value::Float(value),
			) => self.apply_float_function(value),
			(_, value) => return Err(EvalError::InvalidOperand { operator: self.symbol(), operand: value.type_name() }),
		})
	}

	/// Applies a binary operator.
	///
	/// # Errors
	/// If the operand types are not supported by the operator, or on division by zero.
	pub fn apply_binary(self, left: Value, right: Value) -> Result<Value, EvalError> {
		let mismatch =
			|| EvalError::TypeMismatch { operator: self.symbol(), left: left.type_name(), right: right.type_name() };

		match (left, right) {
			(Value::Register(register), Value::Integer(amount)) => match self {
				Self::ShiftRight | Self::RotateRight => Ok(Value::Register(register.rotated_right(amount)?)),
				Self::ShiftLeft | Self::RotateLeft => Ok(Value::Register(register.rotated_right(-amount)?)),
				_ => Err(mismatch()),
			},
			(Value::Register(register), Value::Register(amount))
				if amount.is_r5() && matches!(self, Self::ShiftRight | Self::RotateRight) =>
				Ok(Value::Register(register.rotated_by_r5()?)),
			(Value::Label(label), Value::Integer(offset)) => match self {
				Self::Add => Ok(Value::Label(label.wrapping_add(offset))),
				Self::Subtract => Ok(Value::Label(label.wrapping_sub(offset))),
				_ => Err(mismatch()),
			},
			(Value::Integer(offset), Value::Label(label)) if self == Self::Add =>
				Ok(Value::Label(label.wrapping_add(offset))),
			(Value::Label(left), Value::Label(right)) => match self {
				Self::Subtract => Ok(Value::Integer(left.wrapping_sub(right))),
				Self::Less
				| Self::LessEqual
				| Self::Greater
				| Self::GreaterEqual
				| Self::Equal
				| Self::NotEqual => self.apply_binary(Value::Integer(left), Value::Integer(right)),
				_ => Err(mismatch()),
			},
			(Value::Integer(left), Value::Integer(right)) => self.apply_integer(left, right),
			(Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
				let as_float = |value: Value| match value {
					Value::Integer(value) => value as f64,
					Value::Float(value) => value,
					_ => 0.,
				};
				self.apply_float(as_float(left), as_float(right)).ok_or_else(mismatch)
			},
			_ => Err(mismatch()),
		}
	}

	fn apply_float_function(self, value: f64) -> Value {
		Value::Float(match self {
			Self::SquareRoot => value.sqrt(),
			Self::Exponential => value.exp(),
			Self::Exponential2 => value.exp2(),
			Self::Logarithm => value.ln(),
			_ => value.log2(),
		})
	}

	fn apply_integer(self, left: i64, right: i64) -> Result<Value, EvalError> {
		Ok(Value::Integer(match self {
			Self::Power =>
				if right < 0 {
					return Ok(Value::Float((left as f64).powf(right as f64)));
				} else {
					left.wrapping_pow(u32::try_from(right).map_err(|_| EvalError::InvalidShift(right))?)
				},
			Self::Multiply => left.wrapping_mul(right),
			Self::Divide => left.checked_div(right).ok_or(EvalError::DivisionByZero)?,
			Self::Modulo => left.checked_rem(right).ok_or(EvalError::DivisionByZero)?,
			Self::Add => left.wrapping_add(right),
			Self::Subtract => left.wrapping_sub(right),
			Self::ShiftLeft => match u32::try_from(right) {
				Ok(amount) if amount < 64 => left << amount,
				Ok(_) => 0,
				Err(_) => return Err(EvalError::InvalidShift(right)),
			},
			Self::ShiftRight => match u32::try_from(right) {
				Ok(amount) => left >> amount.min(63),
				Err(_) => return Err(EvalError::InvalidShift(right)),
			},
			Self::RotateLeft => i64::from((left as u32).rotate_left(right.rem_euclid(32) as u32)),
			Self::RotateRight => i64::from((left as u32).rotate_right(right.rem_euclid(32) as u32)),
			Self::Less => (left < right).into(),
			Self::LessEqual => (left <= right).into(),
			Self::Greater => (left > right).into(),
			Self::GreaterEqual => (left >= right).into(),
			Self::Equal => (left == right).into(),
			Self::NotEqual => (left != right).into(),
			Self::And => left & right,
			Self::Xor => left ^ right,
			Self::Xnor => !(left ^ right),
			Self::Or => left | right,
			Self::LogicalAnd => (left != 0 && right != 0).into(),
			Self::LogicalXor => ((left != 0) ^ (right != 0)).into(),
			Self::LogicalOr => (left != 0 || right != 0).into(),
			_ => return Err(EvalError::InvalidOperand { operator: self.symbol(), operand: "integer" }),
		}))
	}

	#[allow(clippy::float_cmp)]
	fn apply_float(self, left: f64, right: f64) -> Option<Value> {
		Some(match self {
			Self::Power => Value::Float(left.powf(right)),
			Self::Multiply => Value::Float(left * right),
			Self::Divide => Value::Float(left / right),
			Self::Modulo => Value::Float(left % right),
			Self::Add => Value::Float(left + right),
			Self::Subtract => Value::Float(left - right),
			Self::Less => from_bool(left < right),
			Self::LessEqual => from_bool(left <= right),
			Self::Greater => from_bool(left > right),
			Self::GreaterEqual => from_bool(left >= right),
			Self::Equal => from_bool(left == right),
			Self::NotEqual => from_bool(left != right),
			Self::LogicalAnd => from_bool(left != 0. && right != 0.),
			Self::LogicalXor => from_bool((left != 0.) ^ (right != 0.)),
			Self::LogicalOr => from_bool(left != 0. || right != 0.),
			_ => return None,
		})
	}
}
