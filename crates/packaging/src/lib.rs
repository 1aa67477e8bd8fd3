pub mod assembler;
pub mod helper;
pub mod installer;
pub mod layer;

pub use assembler::*;
pub use helper::*;
pub use installer::*;
pub use layer::*;
