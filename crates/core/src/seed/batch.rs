use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::schema::PrimaryKey;

/// Maximum number of items written per provider call.
pub const SEED_CHUNK_SIZE: usize = 25;

/// One item record: attribute name to JSON value.
pub type Item = BTreeMap<String, Value>;

/// Errors found while checking seed items against a table key.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SeedError {
    #[error("Seed item {index} is missing key attribute '{attribute}'")]
    MissingKey { index: usize, attribute: String },
}

/// Items to write into a freshly created table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeedBatch {
    items: Vec<Item>,
}

impl SeedBatch {
    pub fn new(items: Vec<Item>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Checks every item carries the key attributes. Attribute types are not
    /// checked.
    pub fn check_keys(&self, key: &PrimaryKey) -> Result<(), SeedError> {
        let attributes: Vec<&str> = std::iter::once(key.hash_attribute.as_str())
            .chain(key.range_attribute.as_deref())
            .collect();
        for (index, item) in self.items.iter().enumerate() {
            if let Some(missing) = attributes.iter().find(|attr| !item.contains_key(**attr)) {
                return Err(SeedError::MissingKey {
                    index,
                    attribute: missing.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Items grouped into provider-sized writes.
    pub fn chunks(&self) -> impl Iterator<Item = &[Item]> {
        self.items.chunks(SEED_CHUNK_SIZE)
    }
}
