//! Lexing.
//!
//! Source is lexed one line at a time and on demand: the statement parser pulls one token after another from a
//! [`Lexer`] and may step back by one token or inspect the raw text following the cursor. This is what lets macro
//! bodies and function bodies be stored as raw text and be re-lexed whenever they are expanded.

use miette::SourceSpan;

/// Kinds of tokens produced by the [`Lexer`]. The token text is obtained separately via [`Lexer::text`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Token {
	/// End of the line, or the start of a `#` comment.
	#[default]
	End,
	/// Identifier, keyword or register name.
	Word,
	/// Numeric literal, always starting with a digit.
	Number,
	/// Operator of one to three characters.
	Operator,
	/// '('
	OpenParenthesis,
	/// ')'
	CloseParenthesis,
	/// '['
	OpenBracket,
	/// ']'
	CloseBracket,
	/// '.'
	Period,
	/// ','
	Comma,
	/// ';'
	Semicolon,
	/// ':'
	Colon,
}

/// Characters that end a word token.
const fn is_separator(chr: u8) -> bool {
	matches!(
		chr,
		b'.' | b',' | b';' | b':' | b'+' | b'-' | b'*' | b'/' | b'%' | b'(' | b')' | b'[' | b']' | b'&' | b'|' | b'^'
			| b'~' | b'!' | b'=' | b'<' | b'>' | b'#'
	) || chr.is_ascii_whitespace()
}

/// A cursor over one line of source code.
#[derive(Clone, Debug, Default)]
pub struct Lexer {
	line:        String,
	/// Byte offset of the line within its source file, for diagnostics.
	offset:      usize,
	position:    usize,
	token_start: usize,
	token_end:   usize,
	token:       Token,
}

impl Lexer {
	/// Creates a lexer positioned at the start of the given line.
	#[must_use]
	pub fn new(line: impl Into<String>, offset: usize) -> Self {
		Self { line: line.into(), offset, position: 0, token_start: 0, token_end: 0, token: Token::End }
	}

	/// Lexes the next token and advances the cursor past it.
	pub fn next_token(&mut self) -> Token {
		let bytes = self.line.as_bytes();
		while self.position < bytes.len() && bytes[self.position].is_ascii_whitespace() {
			self.position += 1;
		}
		self.token_start = self.position;

		let Some(&chr) = bytes.get(self.position) else {
			self.token_end = self.position;
			self.token = Token::End;
			return self.token;
		};
		let next = bytes.get(self.position + 1).copied();
		let after_next = bytes.get(self.position + 2).copied();

		let (token, length) = match chr {
			// The comment stays in place so that subsequent calls keep returning End.
			b'#' => (Token::End, 0),
			b'(' => (Token::OpenParenthesis, 1),
			b')' => (Token::CloseParenthesis, 1),
			b'[' => (Token::OpenBracket, 1),
			b']' => (Token::CloseBracket, 1),
			b'.' => (Token::Period, 1),
			b',' => (Token::Comma, 1),
			b';' => (Token::Semicolon, 1),
			b':' => (Token::Colon, 1),
			b'*' | b'>' | b'<' | b'&' | b'^' | b'|' =>
				if next == Some(chr) {
					(Token::Operator, if after_next == Some(chr) { 3 } else { 2 })
				} else if next == Some(b'=') {
					(Token::Operator, 2)
				} else {
					(Token::Operator, 1)
				},
			b'!' => match next {
				Some(b'^') => (Token::Operator, if after_next == Some(b'^') { 3 } else { 2 }),
				Some(b'=') => (Token::Operator, 2),
				_ => (Token::Operator, 1),
			},
			b'=' => match next {
				Some(b'=') => (Token::Operator, if after_next == Some(b'=') { 3 } else { 2 }),
				_ => (Token::Operator, 1),
			},
			b'+' | b'-' | b'/' | b'%' | b'~' => (Token::Operator, 1),
			b'0' ..= b'9' => {
				let length = bytes[self.position ..]
					.iter()
					.take_while(|&&chr| chr == b'.' || !is_separator(chr))
					.count();
				(Token::Number, length)
			},
			_ => {
				let length = bytes[self.position ..].iter().take_while(|&&chr| !is_separator(chr)).count();
				(Token::Word, length.max(1))
			},
		};
		self.position += length;
		self.token_end = self.position;
		self.token = token;
		token
	}

	/// The most recently lexed token kind.
	#[must_use]
	pub const fn token(&self) -> Token {
		self.token
	}

	/// Text of the most recently lexed token.
	#[must_use]
	pub fn text(&self) -> &str {
		&self.line[self.token_start .. self.token_end]
	}

	/// Steps back so that the most recently lexed token is returned again by the next call to
	/// [`Lexer::next_token`].
	pub const fn unget(&mut self) {
		self.position = self.token_start;
	}

	/// The raw character directly at the cursor, without skipping white space.
	#[must_use]
	pub fn peek_char(&self) -> Option<char> {
		self.line[self.position ..].chars().next()
	}

	/// The raw text following the cursor.
	#[must_use]
	pub fn rest(&self) -> &str {
		&self.line[self.position ..]
	}

	/// Moves the cursor to the end of the line.
	pub fn skip_rest(&mut self) {
		self.token_start = self.position;
		self.position = self.line.len();
		self.token_end = self.position;
		self.token = Token::End;
	}

	/// The complete line.
	#[must_use]
	pub fn line(&self) -> &str {
		&self.line
	}

	/// Byte offset of the cursor within the line.
	#[must_use]
	pub const fn position(&self) -> usize {
		self.position
	}

	/// Moves the cursor to an absolute position within the line, e.g. one saved with [`Lexer::position`].
	pub fn set_position(&mut self, position: usize) {
		self.position = position.min(self.line.len());
		self.token_start = self.position;
		self.token_end = self.position;
	}

	/// Byte offset of the line within its source file.
	#[must_use]
	pub const fn offset(&self) -> usize {
		self.offset
	}

	/// One-based column of the current token.
	#[must_use]
	pub const fn column(&self) -> usize {
		self.token_start + 1
	}

	/// Source location of the current token relative to the file that the line belongs to.
	#[must_use]
	pub fn span(&self) -> SourceSpan {
		(self.offset + self.token_start, self.token_end - self.token_start).into()
	}
}

/// Parses an integer literal.
///
/// A single leading digit of zero may be followed by a radix marker: `b` (binary), `o` (octal), `x` (hexadecimal) or
/// `d` (decimal). Parsing stops at the first character that is not a digit of the active base, or when the value would
/// no longer fit into 64 bits. Returns the value and the number of bytes consumed; the caller decides whether a
/// partial parse is acceptable.
#[must_use]
pub fn parse_int(text: &str) -> (i64, usize) {
	let bytes = text.as_bytes();
	let mut base = 10;
	let mut value = 0u64;
	let mut position = 0;
	let mut radix_allowed = false;

	while let Some(&chr) = bytes.get(position) {
		if radix_allowed {
			radix_allowed = false;
			let radix = match chr.to_ascii_lowercase() {
				b'b' => Some(2),
				b'o' => Some(8),
				b'x' => Some(16),
				b'd' => Some(10),
				_ => None,
			};
			if let Some(radix) = radix {
				base = radix;
				position += 1;
				continue;
			}
		}
		let Some(digit) = char::from(chr).to_digit(base) else {
			break;
		};
		let Some(next) = value.checked_mul(u64::from(base)).and_then(|value| value.checked_add(u64::from(digit)))
		else {
			break;
		};
		value = next;
		position += 1;
		radix_allowed = position == 1 && value == 0;
	}
	(value as i64, position)
}
