#![forbid(unsafe_code)]
#![deny(unused_must_use)]

mod lexer;
mod parser;
mod token;

pub use lexer::{lex, Lexer};
pub use parser::parse_str;
pub use token::{Tok, TokKind};
