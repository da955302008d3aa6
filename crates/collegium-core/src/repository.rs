//! Persistence collaborator.
//!
//! The pipeline only ever calls [`Repository::find_by_id`]. The rest of the
//! trait exists for the handlers that sit behind the pipeline.

use crate::error::PipelineError;
use crate::BoxFuture;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use thiserror::Error;

/// A persisted entity with an integer primary key.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Entity type name used in logs and not-found messages.
    const KIND: &'static str;

    /// Primary key. Zero means "not yet persisted".
    fn id(&self) -> i64;

    /// Assigns the primary key.
    fn set_id(&mut self, id: i64);
}

/// Errors raised by a persistence backend.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The backend could not be reached.
    #[error("repository unavailable: {0}")]
    Unavailable(String),

    /// An update referenced a row that does not exist.
    #[error("{kind} with ID '{id}' does not exist")]
    Missing {
        /// Entity type name.
        kind: &'static str,
        /// Requested key.
        id: i64,
    },
}

impl From<RepositoryError> for PipelineError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Missing { kind, id } => {
                PipelineError::not_found_resource(kind, id.to_string())
            }
            other @ RepositoryError::Unavailable(_) => {
                PipelineError::upstream_with_source("persistence failure", "repository", other)
            }
        }
    }
}

/// Filter predicate passed to [`Repository::query`].
pub type Predicate<'a, E> = &'a (dyn Fn(&E) -> bool + Send + Sync);

/// Async CRUD access to one entity type.
pub trait Repository<E: Entity>: Send + Sync {
    /// Looks up a single entity.
    fn find_by_id(&self, id: i64) -> BoxFuture<'_, Result<Option<E>, RepositoryError>>;

    /// Returns every entity matching `filter`, ordered by key.
    fn query<'a>(&'a self, filter: Predicate<'a, E>)
        -> BoxFuture<'a, Result<Vec<E>, RepositoryError>>;

    /// Inserts (id zero) or updates an entity and returns the committed value.
    fn save(&self, entity: E) -> BoxFuture<'_, Result<E, RepositoryError>>;

    /// Removes an entity. Returns `false` when nothing was removed.
    fn delete(&self, id: i64) -> BoxFuture<'_, Result<bool, RepositoryError>>;

    /// Number of stored entities.
    fn count(&self) -> BoxFuture<'_, Result<usize, RepositoryError>>;

    /// Returns `true` when an entity with this key exists.
    fn exists(&self, id: i64) -> BoxFuture<'_, Result<bool, RepositoryError>> {
        Box::pin(async move { Ok(self.find_by_id(id).await?.is_some()) })
    }
}

/// Process-local repository backed by a `BTreeMap`.
///
/// # Example
///
/// ```
/// use collegium_core::{Department, InMemoryRepository, Repository};
///
/// # tokio_test::block_on(async {
/// let repo = InMemoryRepository::new();
/// let saved = repo.save(Department::new("Math", "smart")).await.unwrap();
/// assert_eq!(saved.id, 1);
/// assert!(repo.find_by_id(1).await.unwrap().is_some());
/// # });
/// ```
#[derive(Debug)]
pub struct InMemoryRepository<E> {
    rows: RwLock<BTreeMap<i64, E>>,
    next_id: AtomicI64,
}

impl<E: Entity> InMemoryRepository<E> {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Creates a repository pre-populated with `entities`.
    ///
    /// Entities with id zero are assigned fresh keys.
    #[must_use]
    pub fn seeded(entities: impl IntoIterator<Item = E>) -> Self {
        let repo = Self::new();
        {
            let mut rows = repo.rows.write();
            for entity in entities {
                repo.insert_locked(&mut rows, entity);
            }
        }
        repo
    }

    fn insert_locked(&self, rows: &mut BTreeMap<i64, E>, mut entity: E) -> E {
        if entity.id() == 0 {
            entity.set_id(self.next_id.fetch_add(1, Ordering::Relaxed));
        } else {
            self.next_id.fetch_max(entity.id() + 1, Ordering::Relaxed);
        }
        rows.insert(entity.id(), entity.clone());
        entity
    }
}

impl<E: Entity> Default for InMemoryRepository<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> Repository<E> for InMemoryRepository<E> {
    fn find_by_id(&self, id: i64) -> BoxFuture<'_, Result<Option<E>, RepositoryError>> {
        let found = self.rows.read().get(&id).cloned();
        Box::pin(async move { Ok(found) })
    }

    fn query<'a>(
        &'a self,
        filter: Predicate<'a, E>,
    ) -> BoxFuture<'a, Result<Vec<E>, RepositoryError>> {
        let matches = self
            .rows
            .read()
            .values()
            .filter(|entity| filter(entity))
            .cloned()
            .collect();
        Box::pin(async move { Ok(matches) })
    }

    fn save(&self, entity: E) -> BoxFuture<'_, Result<E, RepositoryError>> {
        let result = {
            let mut rows = self.rows.write();
            if entity.id() != 0 && !rows.contains_key(&entity.id()) {
                Err(RepositoryError::Missing {
                    kind: E::KIND,
                    id: entity.id(),
                })
            } else {
                Ok(self.insert_locked(&mut rows, entity))
            }
        };
        Box::pin(async move { result })
    }

    fn delete(&self, id: i64) -> BoxFuture<'_, Result<bool, RepositoryError>> {
        let removed = self.rows.write().remove(&id).is_some();
        Box::pin(async move { Ok(removed) })
    }

    fn count(&self) -> BoxFuture<'_, Result<usize, RepositoryError>> {
        let count = self.rows.read().len();
        Box::pin(async move { Ok(count) })
    }
}
