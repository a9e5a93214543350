//! Pipeline services: decoder backends, symbol scanning, function
//! disassembly and the census driver that ties them together.

pub mod backends;
pub mod census;
pub mod disassembler;
pub mod scanner;
