pub mod policy;
pub mod supervisor;

pub use policy::*;
pub use supervisor::*;
