#![forbid(unsafe_code)]
#![deny(unused_must_use)]

pub mod eval;
pub mod events;
