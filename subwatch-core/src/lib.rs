pub mod config;
pub mod error;
pub mod error_utils;
pub mod seen;
pub mod source;
pub mod types;

pub use config::*;
pub use error::*;
pub use error_utils::*;
pub use seen::*;
pub use source::*;
pub use types::*;
