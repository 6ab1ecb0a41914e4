// src/external/credentials.rs

use std::collections::HashMap;

use async_trait::async_trait;

use super::{CredentialResolver, Credentials, ExternalError};

/// Resolves credentials from environment variables.
///
/// For credential id `aws_credentials` it reads
/// `AWS_CREDENTIALS_ACCESS_KEY_ID`, `AWS_CREDENTIALS_SECRET_ACCESS_KEY` and
/// (optionally) `AWS_CREDENTIALS_SESSION_TOKEN`, falling back to the standard
/// `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` / `AWS_SESSION_TOKEN`.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentialResolver;

impl EnvCredentialResolver {
    fn lookup(prefix: &str, suffix: &str) -> Option<String> {
        std::env::var(format!("{prefix}_{suffix}"))
            .or_else(|_| std::env::var(format!("AWS_{suffix}")))
            .ok()
            .filter(|v| !v.is_empty())
    }
}

#[async_trait]
impl CredentialResolver for EnvCredentialResolver {
    async fn resolve(&self, credential_id: &str) -> Result<Credentials, ExternalError> {
        let prefix = credential_id.to_uppercase().replace(['-', '.'], "_");
        let access_key = Self::lookup(&prefix, "ACCESS_KEY_ID").ok_or_else(|| {
            ExternalError::Credentials(format!(
                "no access key for '{credential_id}' (set {prefix}_ACCESS_KEY_ID)"
            ))
        })?;
        let secret_key = Self::lookup(&prefix, "SECRET_ACCESS_KEY").ok_or_else(|| {
            ExternalError::Credentials(format!(
                "no secret key for '{credential_id}' (set {prefix}_SECRET_ACCESS_KEY)"
            ))
        })?;
        let session_token = Self::lookup(&prefix, "SESSION_TOKEN").unwrap_or_default();

        Ok(Credentials {
            access_key,
            secret_key,
            session_token,
        })
    }
}

/// Fixed set of credentials keyed by id.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialResolver {
    entries: HashMap<String, Credentials>,
}

impl StaticCredentialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: impl Into<String>, credentials: Credentials) -> Self {
        self.entries.insert(id.into(), credentials);
        self
    }
}

#[async_trait]
impl CredentialResolver for StaticCredentialResolver {
    async fn resolve(&self, credential_id: &str) -> Result<Credentials, ExternalError> {
        self.entries.get(credential_id).cloned().ok_or_else(|| {
            ExternalError::Credentials(format!("unknown credential id '{credential_id}'"))
        })
    }
}
