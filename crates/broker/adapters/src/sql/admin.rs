//! SQL administration seam
//!
//! Binding a database means creating a contained login on it. The broker
//! talks to the server through [`SqlAdmin`] so the operation can be made
//! idempotent ("ensure login") and replaced in tests.

use async_trait::async_trait;
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

/// Administrator access to one server
#[derive(Clone)]
pub struct SqlServerAccess {
    pub fqdn: String,
    pub admin_login: String,
    pub admin_password: Zeroizing<String>,
}

impl fmt::Debug for SqlServerAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlServerAccess")
            .field("fqdn", &self.fqdn)
            .field("admin_login", &self.admin_login)
            .field("admin_password", &"<redacted>")
            .finish()
    }
}

/// What `ensure_login` had to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Created,
    /// The login existed with another password, which was reset
    Updated,
    Unchanged,
}

#[derive(Debug, Error)]
pub enum SqlAdminError {
    #[error("Cannot reach {fqdn}: {message}")]
    Unreachable { fqdn: String, message: String },

    #[error("Login failed for administrator {login} on {fqdn}")]
    AccessDenied { fqdn: String, login: String },

    #[error("Database {database} does not exist on {fqdn}")]
    NoDatabase { fqdn: String, database: String },

    #[error("Operation cancelled")]
    Cancelled,
}

/// Login management on a SQL server
#[async_trait]
pub trait SqlAdmin: Send + Sync {
    /// Make `login` exist on `database` with `password`
    async fn ensure_login(
        &self,
        access: &SqlServerAccess,
        database: &str,
        login: &str,
        password: &str,
        cancel: &CancellationToken,
    ) -> Result<LoginOutcome, SqlAdminError>;

    /// Remove `login`; returns whether it existed
    async fn drop_login(
        &self,
        access: &SqlServerAccess,
        database: &str,
        login: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, SqlAdminError>;
}

/// In-memory [`SqlAdmin`] for development and tests
#[derive(Debug, Default)]
pub struct InMemorySqlAdmin {
    /// (fqdn, database, login) -> password
    logins: DashMap<(String, String, String), Zeroizing<String>>,
    /// fqdn -> required admin password; unknown servers accept any
    admins: DashMap<String, Zeroizing<String>>,
    creates: AtomicUsize,
    drops: AtomicUsize,
}

impl InMemorySqlAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `password` for administrator access to `fqdn`
    pub fn require_admin_password(&self, fqdn: &str, password: &str) {
        self.admins
            .insert(fqdn.to_string(), Zeroizing::new(password.to_string()));
    }

    pub fn has_login(&self, fqdn: &str, database: &str, login: &str) -> bool {
        self.logins
            .contains_key(&(fqdn.to_string(), database.to_string(), login.to_string()))
    }

    pub fn login_count(&self) -> usize {
        self.logins.len()
    }

    /// Logins actually created, not counting no-op ensures
    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn drops(&self) -> usize {
        self.drops.load(Ordering::SeqCst)
    }

    fn authorize(&self, access: &SqlServerAccess) -> Result<(), SqlAdminError> {
        match self.admins.get(&access.fqdn) {
            Some(required) if required.as_str() != access.admin_password.as_str() => {
                Err(SqlAdminError::AccessDenied {
                    fqdn: access.fqdn.clone(),
                    login: access.admin_login.clone(),
                })
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl SqlAdmin for InMemorySqlAdmin {
    async fn ensure_login(
        &self,
        access: &SqlServerAccess,
        database: &str,
        login: &str,
        password: &str,
        cancel: &CancellationToken,
    ) -> Result<LoginOutcome, SqlAdminError> {
        if cancel.is_cancelled() {
            return Err(SqlAdminError::Cancelled);
        }
        self.authorize(access)?;

        let key = (access.fqdn.clone(), database.to_string(), login.to_string());
        let outcome = match self.logins.get_mut(&key) {
            Some(existing) if existing.as_str() == password => LoginOutcome::Unchanged,
            Some(mut existing) => {
                *existing = Zeroizing::new(password.to_string());
                LoginOutcome::Updated
            }
            None => {
                self.logins.insert(key, Zeroizing::new(password.to_string()));
                self.creates.fetch_add(1, Ordering::SeqCst);
                LoginOutcome::Created
            }
        };
        Ok(outcome)
    }

    async fn drop_login(
        &self,
        access: &SqlServerAccess,
        database: &str,
        login: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, SqlAdminError> {
        if cancel.is_cancelled() {
            return Err(SqlAdminError::Cancelled);
        }
        self.authorize(access)?;

        let key = (access.fqdn.clone(), database.to_string(), login.to_string());
        let existed = self.logins.remove(&key).is_some();
        if existed {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn access(password: &str) -> SqlServerAccess {
        SqlServerAccess {
            fqdn: "srv1.database.windows.net".to_string(),
            admin_login: "admin".to_string(),
            admin_password: Zeroizing::new(password.to_string()),
        }
    }

    #[tokio::test]
    async fn test_ensure_login_is_idempotent() {
        let admin = InMemorySqlAdmin::new();
        let cancel = CancellationToken::new();
        let access = access("pw");

        let first = admin.ensure_login(&access, "db1", "u1", "p1", &cancel).await.unwrap();
        let second = admin.ensure_login(&access, "db1", "u1", "p1", &cancel).await.unwrap();
        let third = admin.ensure_login(&access, "db1", "u1", "p2", &cancel).await.unwrap();

        assert_eq!(first, LoginOutcome::Created);
        assert_eq!(second, LoginOutcome::Unchanged);
        assert_eq!(third, LoginOutcome::Updated);
        assert_eq!(admin.creates(), 1);
        assert_eq!(admin.login_count(), 1);
    }

    #[tokio::test]
    async fn test_drop_login_reports_absence() {
        let admin = InMemorySqlAdmin::new();
        let cancel = CancellationToken::new();
        let access = access("pw");

        admin.ensure_login(&access, "db1", "u1", "p1", &cancel).await.unwrap();
        assert!(admin.drop_login(&access, "db1", "u1", &cancel).await.unwrap());
        assert!(!admin.drop_login(&access, "db1", "u1", &cancel).await.unwrap());
        assert_eq!(admin.drops(), 1);
    }

    #[tokio::test]
    async fn test_wrong_admin_password_is_denied() {
        let admin = InMemorySqlAdmin::new();
        admin.require_admin_password("srv1.database.windows.net", "right");

        let err = admin
            .ensure_login(&access("wrong"), "db1", "u1", "p1", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SqlAdminError::AccessDenied { .. }));
        assert!(format!("{:?}", access("wrong")).contains("<redacted>"));
    }
}
