// pacebot-common: shared models, wire protocol, and trait seams used by
// the core crate and both binaries.

pub mod error;
pub mod models;
pub mod traits;

pub use error::Error;
