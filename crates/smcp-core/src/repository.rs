//! Read-side seam between the search layer and entity storage.

use crate::error::Result;

/// Source-of-truth lookup for one entity kind.
///
/// The search orchestrator only ever reads through this trait, so any
/// storage backend (SQLite, in-memory fixtures) can sit behind it.
pub trait EntityRepository<T> {
    /// All entities of this kind.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SmcpError::Storage`] if the backend cannot be read.
    fn list(&self) -> Result<Vec<T>>;

    /// One entity by id, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SmcpError::Storage`] if the backend cannot be read.
    fn get(&self, id: &str) -> Result<Option<T>>;
}

/// Vector-backed repositories of plain structs, used by tests and tools.
impl<T: Clone + HasId> EntityRepository<T> for Vec<T> {
    fn list(&self) -> Result<Vec<T>> {
        Ok(self.clone())
    }

    fn get(&self, id: &str) -> Result<Option<T>> {
        Ok(self.iter().find(|e| e.entity_id() == id).cloned())
    }
}

/// Anything carrying a stable entity id.
pub trait HasId {
    fn entity_id(&self) -> &str;
}

macro_rules! impl_has_id {
    ($($ty:ty),*) => {
        $(impl HasId for $ty {
            fn entity_id(&self) -> &str {
                &self.id
            }
        })*
    };
}

impl_has_id!(
    crate::entity::Prompt,
    crate::entity::Resource,
    crate::entity::Tool
);
