//! The department entity.

use crate::repository::{Entity, Repository, RepositoryError};
use crate::BoxFuture;
use serde::{Deserialize, Serialize};

/// A university department.
///
/// The pipeline only looks at [`location`](Self::location); the remaining
/// fields belong to the CRUD handlers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    /// Primary key. Zero means "not yet persisted".
    #[serde(default)]
    pub id: i64,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Number of lab computers.
    #[serde(default)]
    pub pc_numbers: Option<u32>,
    /// Name of the department manager.
    #[serde(default)]
    pub manager_name: Option<String>,
    /// Campus the department belongs to.
    #[serde(default)]
    pub location: Option<String>,
}

impl Department {
    /// Creates an unsaved department.
    #[must_use]
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: Some(name.into()),
            pc_numbers: None,
            manager_name: None,
            location: Some(location.into()),
        }
    }

    /// Sets the primary key.
    #[must_use]
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    /// Sets the manager name.
    #[must_use]
    pub fn with_manager(mut self, manager_name: impl Into<String>) -> Self {
        self.manager_name = Some(manager_name.into());
        self
    }

    /// Sets the lab computer count.
    #[must_use]
    pub fn with_pc_numbers(mut self, pc_numbers: u32) -> Self {
        self.pc_numbers = Some(pc_numbers);
        self
    }
}

impl Entity for Department {
    const KIND: &'static str = "Department";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }
}

/// Read-only department lookup consumed by the location filters.
///
/// Every [`Repository<Department>`] is a store.
pub trait DepartmentStore: Send + Sync {
    /// Looks up a department by key.
    fn find_department(&self, id: i64) -> BoxFuture<'_, Result<Option<Department>, RepositoryError>>;
}

impl<R> DepartmentStore for R
where
    R: Repository<Department> + ?Sized,
{
    fn find_department(&self, id: i64) -> BoxFuture<'_, Result<Option<Department>, RepositoryError>> {
        self.find_by_id(id)
    }
}
