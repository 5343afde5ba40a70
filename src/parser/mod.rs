//! Parser infrastructure.
//!
//! The assembler parses while it assembles, so this only holds the line lexer that the statement and directive
//! parsers pull their tokens from.

pub mod lexer;
#[cfg(test)] mod test;
