pub mod config;
pub mod error;
pub mod image;
pub mod manifest;
pub mod source;
pub mod staging;

pub use config::*;
pub use error::*;
pub use image::*;
pub use manifest::*;
pub use source::*;
pub use staging::*;
