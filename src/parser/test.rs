//! Lexer tests.

use miette::SourceSpan;

use super::lexer::{Lexer, Token, parse_int};

fn tokens(line: &str) -> Vec<(Token, String)> {
	let mut lexer = Lexer::new(line, 0);
	let mut tokens = Vec::new();
	loop {
		let token = lexer.next_token();
		if token == Token::End {
			return tokens;
		}
		tokens.push((token, lexer.text().to_owned()));
	}
}

#[test]
fn statement() {
	let expected = [
		(Token::Word, "add"),
		(Token::Period, "."),
		(Token::Word, "setf"),
		(Token::Word, "ra0"),
		(Token::Comma, ","),
		(Token::Word, "r1"),
		(Token::Comma, ","),
		(Token::Number, "0x10"),
		(Token::Semicolon, ";"),
		(Token::Word, "thrsw"),
	];
	let expected: Vec<_> = expected.into_iter().map(|(token, text)| (token, text.to_owned())).collect();
	assert_eq!(tokens("add.setf ra0, r1, 0x10; thrsw # comment"), expected);
}

#[test]
fn operators() {
	let texts: Vec<_> = tokens("a >> b <<< c ** d != e !^ f === g <= h").into_iter().map(|(_, text)| text).collect();
	assert_eq!(texts, ["a", ">>", "b", "<<<", "c", "**", "d", "!=", "e", "!^", "f", "===", "g", "<=", "h"]);
}

#[test]
fn numbers_keep_periods() {
	assert_eq!(tokens("1.5e3"), [(Token::Number, "1.5e3".to_owned())]);
	assert_eq!(tokens("2.0)"), [(Token::Number, "2.0".to_owned()), (Token::CloseParenthesis, ")".to_owned())]);
	// Words end at a period, numbers do not.
	assert_eq!(tokens("r0.8a")[0], (Token::Word, "r0".to_owned()));
}

#[test]
fn labels_and_brackets() {
	let kinds: Vec<_> = tokens("::loop: [1, 2]").into_iter().map(|(token, _)| token).collect();
	assert_eq!(kinds, [
		Token::Colon,
		Token::Colon,
		Token::Word,
		Token::Colon,
		Token::OpenBracket,
		Token::Number,
		Token::Comma,
		Token::Number,
		Token::CloseBracket,
	]);
}

#[test]
fn comment_ends_line() {
	let mut lexer = Lexer::new("nop # nothing", 0);
	assert_eq!(lexer.next_token(), Token::Word);
	assert_eq!(lexer.next_token(), Token::End);
	assert_eq!(lexer.next_token(), Token::End);
	assert_eq!(lexer.rest(), "# nothing");
}

#[test]
fn cursor_control() {
	let mut lexer = Lexer::new("  mov r0, r1", 100);
	assert_eq!(lexer.next_token(), Token::Word);
	assert_eq!(lexer.column(), 3);
	assert_eq!(lexer.span(), SourceSpan::from((102, 3)));
	let position = lexer.position();
	assert_eq!(lexer.next_token(), Token::Word);
	lexer.unget();
	assert_eq!(lexer.next_token(), Token::Word);
	assert_eq!(lexer.text(), "r0");
	lexer.set_position(position);
	assert_eq!(lexer.peek_char(), Some(' '));
	assert_eq!(lexer.rest(), " r0, r1");
	lexer.skip_rest();
	assert_eq!(lexer.next_token(), Token::End);
	assert_eq!(lexer.line(), "  mov r0, r1");
	assert_eq!(lexer.offset(), 100);
}

#[test]
fn integers() {
	assert_eq!(parse_int("42"), (42, 2));
	assert_eq!(parse_int("0x1f"), (31, 4));
	assert_eq!(parse_int("0b101"), (5, 5));
	assert_eq!(parse_int("0o17"), (15, 4));
	assert_eq!(parse_int("0d99"), (99, 4));
	assert_eq!(parse_int("017"), (17, 3));
	assert_eq!(parse_int("12ab"), (12, 2));
	assert_eq!(parse_int("0xffffffffffffffff"), (-1, 18));
	// Stops before overflowing 64 bits.
	assert_eq!(parse_int("0x1ffffffffffffffff").1, 18);
}
