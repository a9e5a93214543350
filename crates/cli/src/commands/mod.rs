pub mod census;
pub mod disassemble;
pub mod dump;
pub mod sections;
pub mod symbols;
pub mod util;

pub use census::*;
pub use disassemble::*;
pub use dump::*;
pub use sections::*;
pub use symbols::*;
pub use util::*;
