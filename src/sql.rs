//! Query language front end.
//!
//! This module provides a handwritten recursive descent parser that converts
//! query text into an Abstract Syntax Tree (AST), and the canonical text form
//! used to print it back.

mod ast;
mod display;
mod error;
mod expr;
mod lexer;
mod parser;
mod token;

pub use ast::*;
pub use error::{Span, SyntaxError};
pub use lexer::Lexer;
pub use parser::{Parser, parse_query};
pub use token::{Keyword, Token, TokenKind};
