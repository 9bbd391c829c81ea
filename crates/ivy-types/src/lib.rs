#![forbid(unsafe_code)]
#![deny(unused_must_use)]

mod analyzer;
mod scope;
pub mod types;

pub use analyzer::{analyze, Diagnostic};
