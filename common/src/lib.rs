pub mod types;
pub mod crypto;
pub mod error;

pub use types::*;
pub use crypto::*;
pub use error::*;
