//! Domain services: pure logic with no I/O.

mod frame_parser;

pub use frame_parser::*;
