//! Gateway to the remote taxonomy API (dimensions and discrete traits).

pub mod error;
pub mod types;
pub mod uniform;

pub use error::{ErrorContext, FetchError};
pub use types::*;
pub use uniform::{TaxonomySource, UniformAdapter};
