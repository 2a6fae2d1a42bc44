pub mod config;
pub mod corpus;
pub mod error;
pub mod identity;
pub mod traits;
pub mod types;

pub use error::{Error, ErrorKind, Result};
