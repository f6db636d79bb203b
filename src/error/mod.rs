pub mod types;

pub use types::{HelmError, Result};
