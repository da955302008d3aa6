//! # Collegium Core
//!
//! Foundational types shared by every Collegium crate:
//!
//! - [`PipelineError`] and [`ErrorCategory`] - the failure taxonomy
//! - [`CallerIdentity`] - who is calling, with role claims
//! - [`RequestId`] - UUID v7 request identifier
//! - [`Department`], [`Repository`] - the persistence collaborator
//! - [`Notifier`] - email and messaging collaborators
//! - [`LocationPolicy`] - the canonical campus allow-list

#![doc(html_root_url = "https://docs.rs/collegium-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod department;
mod error;
mod identity;
mod location;
pub mod notify;
pub mod repository;
mod request_id;

use std::future::Future;
use std::pin::Pin;

pub use department::{Department, DepartmentStore};
pub use error::{ErrorCategory, ErrorDetail, ErrorEnvelope, FieldErrors, PipelineError, CollegiumResult};
pub use identity::{roles, CallerIdentity};
pub use location::{normalize_location, LocationPolicy, DEFAULT_ALLOWED_LOCATIONS};
pub use notify::{Channel, Notifier, NotifyError, TracingNotifier};
pub use repository::{Entity, InMemoryRepository, Repository, RepositoryError};
pub use request_id::{RequestId, REQUEST_ID_HEADER};

/// A boxed future that is `Send`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
