//! Evaluator tests.

use super::operator::{lookup_symbol, lookup_word};
use super::*;

fn r0() -> RegisterDescriptor {
	RegisterDescriptor::new(32, RegisterCapabilities::ACCUMULATOR | RegisterCapabilities::READ)
}

fn r5() -> RegisterDescriptor {
	RegisterDescriptor::new(37, RegisterCapabilities::ACCUMULATOR | RegisterCapabilities::WRITE)
}

/// Evaluates space separated tokens. `$n` stands for `values[n]`.
fn evaluate(expression: &str, values: &[Value]) -> Result<Value, EvalError> {
	let mut evaluator = Evaluator::new();
	for token in expression.split_whitespace() {
		if let Some(index) = token.strip_prefix('$') {
			evaluator.push_value(values[index.parse::<usize>().unwrap()])?;
		} else if let Ok(integer) = token.parse::<i64>() {
			evaluator.push_value(Value::Integer(integer))?;
		} else if let Ok(float) = token.parse::<f64>() {
			evaluator.push_value(Value::Float(float))?;
		} else {
			let symbol = lookup_symbol(token).or_else(|| lookup_word(token)).unwrap();
			assert!(evaluator.push_operator(symbol)?, "operator {token} rejected");
		}
	}
	evaluator.evaluate()
}

fn integer(expression: &str) -> i64 {
	match evaluate(expression, &[]) {
		Ok(Value::Integer(value)) => value,
		other => panic!("{expression} evaluated to {other:?}"),
	}
}

#[test]
fn precedence() {
	assert_eq!(integer("1 + 2 * 3"), 7);
	assert_eq!(integer("( 1 + 2 ) * 3"), 9);
	assert_eq!(integer("10 - 4 - 3"), 3);
	assert_eq!(integer("2 ** 3 ** 2"), 512);
	assert_eq!(integer("- 2 ** 2"), 4);
	assert_eq!(integer("1 << 4 + 1"), 32);
	assert_eq!(integer("6 & 3 | 8"), 10);
	assert_eq!(integer("1 || 0 && 0"), 1);
	assert_eq!(integer("3 < 4 == 1"), 1);
}

#[test]
fn unary_operators() {
	assert_eq!(integer("- 5"), -5);
	assert_eq!(integer("+ 5"), 5);
	assert_eq!(integer("~ 0"), -1);
	assert_eq!(integer("! 7"), 0);
	assert_eq!(integer("abs - 3"), 3);
	assert_eq!(integer("not 0 and 12"), 12);
	assert_eq!(integer("- - 1"), 1);
}

#[test]
fn integer_semantics() {
	assert_eq!(integer("7 / 2"), 3);
	assert_eq!(integer("- 7 % 3"), -1);
	assert_eq!(integer("1 << 64"), 0);
	assert_eq!(integer("- 16 >> 2"), -4);
	assert_eq!(integer("1 <<< 33"), 2);
	assert_eq!(integer("1 >>> 1"), 0x8000_0000);
	assert_eq!(integer("5 !^ 3"), !6);
	assert_eq!(integer("1 ^^ 1"), 0);
	assert_eq!(evaluate("1 / 0", &[]), Err(EvalError::DivisionByZero));
	assert_eq!(evaluate("1 % 0", &[]), Err(EvalError::DivisionByZero));
	assert_eq!(evaluate("1 << - 1", &[]), Err(EvalError::InvalidShift(-1)));
}

#[test]
fn floats() {
	assert_eq!(evaluate("1 + 0.5", &[]), Ok(Value::Float(1.5)));
	assert_eq!(evaluate("2 ** - 1", &[]), Ok(Value::Float(0.5)));
	assert_eq!(evaluate("floor 2.75", &[]), Ok(Value::Float(2.)));
	assert_eq!(evaluate("sqrt 16", &[]), Ok(Value::Float(4.)));
	assert_eq!(evaluate("1.5 < 2", &[]), Ok(Value::Integer(1)));
	assert_eq!(
		evaluate("1.5 & 1", &[]),
		Err(EvalError::TypeMismatch { operator: "&", left: "float", right: "integer" })
	);
	assert_eq!(evaluate("~ 1.5", &[]), Err(EvalError::InvalidOperand { operator: "~", operand: "float" }));
}

#[test]
fn labels() {
	let values = [Value::Label(64), Value::Label(32)];
	assert_eq!(evaluate("$0 - $1", &values), Ok(Value::Integer(32)));
	assert_eq!(evaluate("$0 + 8", &values), Ok(Value::Label(72)));
	assert_eq!(evaluate("8 + $1", &values), Ok(Value::Label(40)));
	assert_eq!(evaluate("$0 > $1", &values), Ok(Value::Integer(1)));
	assert_eq!(
		evaluate("$0 * 2", &values),
		Err(EvalError::TypeMismatch { operator: "*", left: "label", right: "integer" })
	);
}

#[test]
fn register_rotation() {
	let values = [Value::Register(r0()), Value::Register(r5())];
	let rotated = |rotation| Ok(Value::Register(RegisterDescriptor { rotation, ..r0() }));
	assert_eq!(evaluate("$0 >> 2", &values), rotated(2));
	assert_eq!(evaluate("$0 << 1", &values), rotated(15));
	assert_eq!(evaluate("$0 >> 3 >> 14", &values), rotated(1));
	assert_eq!(evaluate("$0 >> $1", &values), rotated(ROTATE_BY_R5));
	assert_eq!(evaluate("$0 >> 2 >> $1", &values), Err(EvalError::InvalidRotation));
	assert_eq!(evaluate("$0 >> $1 >> 2", &values), Err(EvalError::InvalidRotation));
	assert!(matches!(evaluate("$0 + 1", &values), Err(EvalError::TypeMismatch { .. })));
}

#[test]
fn malformed_expressions() {
	assert_eq!(evaluate("", &[]), Ok(Value::None));
	assert_eq!(evaluate("1 +", &[]), Err(EvalError::IncompleteExpression));
	assert_eq!(evaluate("( 1 + 2", &[]), Err(EvalError::UnbalancedParenthesis));
	assert_eq!(evaluate("* 2", &[]), Err(EvalError::MissingOperand { operator: "*" }));
	assert_eq!(evaluate("( )", &[]), Err(EvalError::IncompleteExpression));

	let mut evaluator = Evaluator::new();
	evaluator.push_value(Value::Integer(1)).unwrap();
	assert_eq!(evaluator.push_value(Value::Integer(2)), Err(EvalError::MissingOperator));
}

#[test]
fn stops_at_foreign_symbols() {
	let mut evaluator = Evaluator::new();
	assert!(evaluator.expects_operand());
	evaluator.push_value(Value::Integer(3)).unwrap();
	assert!(!evaluator.expects_operand());
	// A closing parenthesis of an enclosing argument list and a call parenthesis both end the expression.
	assert_eq!(evaluator.push_operator(OperatorSymbol::CloseParenthesis), Ok(false));
	assert_eq!(evaluator.push_operator(OperatorSymbol::OpenParenthesis), Ok(false));
	assert_eq!(evaluator.push_operator(lookup_symbol("~").unwrap()), Ok(false));
	assert_eq!(evaluator.evaluate(), Ok(Value::Integer(3)));
}

#[test]
fn operator_tables() {
	assert_eq!(
		lookup_symbol("-"),
		Some(OperatorSymbol::Operator { prefix: Some(Operator::Negate), infix: Some(Operator::Subtract) })
	);
	assert_eq!(lookup_symbol(">>>"), Some(OperatorSymbol::Operator { prefix: None, infix: Some(Operator::RotateRight) }));
	assert_eq!(lookup_symbol("=>"), None);
	assert_eq!(lookup_word("xor"), Some(OperatorSymbol::Operator { prefix: None, infix: Some(Operator::Xor) }));
	assert_eq!(lookup_word("log2"), Some(OperatorSymbol::Operator { prefix: Some(Operator::Logarithm2), infix: None }));
	assert_eq!(lookup_word("ra0"), None);
	assert!(Operator::Power.is_right_associative());
	assert!(!Operator::Subtract.is_right_associative());
}

#[test]
fn display() {
	assert_eq!(Value::Integer(-4).to_string(), "-4");
	assert_eq!(Value::Float(2.0).to_string(), "2.0");
	assert_eq!(Value::Label(96).to_string(), ":(96)");
	assert_eq!(Value::Register(RegisterDescriptor { rotation: 3, ..r0() }).to_string(), ":[32, 68, 3]");
	assert_eq!(
		Value::PerElement(0x0001_0003, ElementSign::Unsigned).to_string(),
		"[3, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]"
	);
	assert_eq!(Value::None.to_string(), "<none>");
}

#[test]
fn qpu_values() {
	assert_eq!(Value::Integer(-1).as_qpu_value(), Some(u32::MAX));
	assert_eq!(Value::Float(1.0).as_qpu_value(), Some(0x3f80_0000));
	assert_eq!(Value::Register(r0()).as_qpu_value(), None);
	assert!(Value::Integer(1 << 32).exceeds_32_bits());
	assert!(!Value::Integer(i64::from(u32::MAX)).exceeds_32_bits());
	assert!(Value::Integer(i64::from(i32::MIN) - 1).exceeds_32_bits());
	assert_eq!(Value::Register(r0()).is_true(), None);
}
