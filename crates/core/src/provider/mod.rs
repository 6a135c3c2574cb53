//! The boundary to the target system.

mod error;
mod traits;
mod update;

pub use error::{ProviderError, Result};
pub use traits::TableProvider;
pub use update::{table_updates, TableUpdate};
