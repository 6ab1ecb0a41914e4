// src/external/mod.rs

//! Interfaces to the systems the pipeline drives but does not own.
//!
//! - [`Warehouse`] runs statements and queries (stage, load, quality checks).
//! - [`StorageSource`] lists raw objects to be staged.
//! - [`CredentialResolver`] turns a credential id into access keys for COPY.
//!
//! Production implementations shell out to existing clients ([`command`]) or
//! read a local directory tree ([`storage`]). Tests inject fakes.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::errors::TaskError;

pub mod command;
pub mod credentials;
pub mod sql;
pub mod storage;

pub use command::{CommandStorage, CommandWarehouse};
pub use credentials::{EnvCredentialResolver, StaticCredentialResolver};
pub use sql::{Identifier, Row, SqlValue, Statement, TableName};
pub use storage::LocalStorage;

/// Errors reported by external collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExternalError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("statement failed: {0}")]
    Statement(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("credentials error: {0}")]
    Credentials(String),
}

impl From<ExternalError> for TaskError {
    fn from(err: ExternalError) -> Self {
        TaskError::ActionFailure(err.to_string())
    }
}

/// Temporary access keys used by the warehouse to read object storage.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
    pub session_token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .finish()
    }
}

/// Warehouse connection.
#[async_trait]
pub trait Warehouse: Send + Sync + fmt::Debug {
    /// Run a statement, returning the number of affected rows.
    async fn execute(&self, stmt: &Statement) -> Result<u64, ExternalError>;

    /// Run a query and return all rows.
    async fn query(&self, stmt: &Statement) -> Result<Vec<Row>, ExternalError>;
}

/// Object storage listing.
#[async_trait]
pub trait StorageSource: Send + Sync + fmt::Debug {
    /// Keys of all objects in `bucket` whose key starts with `prefix`.
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, ExternalError>;
}

#[async_trait]
pub trait CredentialResolver: Send + Sync + fmt::Debug {
    async fn resolve(&self, credential_id: &str) -> Result<Credentials, ExternalError>;
}
