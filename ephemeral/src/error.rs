//! Crate-wide error types
//!
//! Every failure the provisioning engine can produce is one variant of
//! [`Error`]. Construction-time variants abort engine creation, per-test
//! variants fail only the requesting test, and [`Error::Cleanup`] is only
//! ever logged.

use sea_orm::DbErr;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Provisioning error
///
/// # Example
///
/// ```rust,ignore
/// use ephemeral_pg::{Error, Provisioner};
///
/// match Provisioner::connect(url, &migrations, config).await {
///     Ok(provisioner) => { /* ... */ }
///     Err(Error::Migration { template, source }) => {
///         panic!("migrations failed on {}: {}", template, source);
///     }
///     Err(e) => panic!("{}", e),
/// }
/// ```
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid connection string or missing configuration
    #[error("invalid configuration: {message}")]
    Config {
        /// What was wrong
        message: String,
    },

    /// The server could not be reached, or the connection failed its ping
    #[error("failed to connect to database '{database}': {source}")]
    Connection {
        /// Database the connection targeted
        database: String,
        #[source]
        source: DbErr,
    },

    /// A named lock could not be acquired or released
    #[error("lock '{name}': {message}")]
    Lock {
        /// Lock key
        name: String,
        /// Failure description
        message: String,
    },

    /// The caller-supplied migration failed on the template database
    #[error("failed to run migrations on template '{template}': {source}")]
    Migration {
        /// Template database being migrated
        template: String,
        #[source]
        source: DbErr,
    },

    /// One of the template bookkeeping statements failed
    #[error("failed to {step} template '{template}': {source}")]
    TemplateCreation {
        /// Template database name
        template: String,
        /// Statement that failed (check, drop, create, mark)
        step: &'static str,
        #[source]
        source: DbErr,
    },

    /// Cloning the template or connecting to the clone failed
    #[error("failed to create ephemeral database '{database}': {source}")]
    EphemeralCreation {
        /// Ephemeral database name
        database: String,
        #[source]
        source: DbErr,
    },

    /// Post-test drop or rollback failed
    #[error("failed to clean up '{database}': {source}")]
    Cleanup {
        /// Database (or transaction owner) being released
        database: String,
        #[source]
        source: DbErr,
    },

    /// The test was canceled while its database was being provisioned
    #[error("provisioning canceled by the test context")]
    Canceled,

    /// A secondary failure (e.g. releasing a lock) that followed a primary one
    #[error("{primary}; additionally: {secondary}")]
    Compound {
        /// The failure that happened first
        primary: Box<Error>,
        /// The failure that happened while unwinding
        secondary: Box<Error>,
    },
}

impl Error {
    /// Create a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a Connection error
    pub fn connection(database: impl Into<String>, source: DbErr) -> Self {
        Self::Connection {
            database: database.into(),
            source,
        }
    }

    /// Create a Lock error
    pub fn lock(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Lock {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a TemplateCreation error for the given step
    pub fn template(template: impl Into<String>, step: &'static str, source: DbErr) -> Self {
        Self::TemplateCreation {
            template: template.into(),
            step,
            source,
        }
    }

    /// Create an EphemeralCreation error
    pub fn ephemeral(database: impl Into<String>, source: DbErr) -> Self {
        Self::EphemeralCreation {
            database: database.into(),
            source,
        }
    }

    /// Combine the outcome of a fallible operation with the outcome of the
    /// step that unwinds it, keeping the earlier failure in front.
    pub fn merge<T>(result: Result<T>, unwind: Result<()>) -> Result<T> {
        match (result, unwind) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(secondary)) => Err(secondary),
            (Err(primary), Ok(())) => Err(primary),
            (Err(primary), Err(secondary)) => Err(Self::Compound {
                primary: Box::new(primary),
                secondary: Box::new(secondary),
            }),
        }
    }

    /// Whether this error (or the primary error of a compound) is a lock failure
    pub fn is_lock(&self) -> bool {
        match self {
            Self::Lock { .. } => true,
            Self::Compound { primary, .. } => primary.is_lock(),
            _ => false,
        }
    }

    /// Whether this error (or the primary error of a compound) is a migration failure
    pub fn is_migration(&self) -> bool {
        match self {
            Self::Migration { .. } => true,
            Self::Compound { primary, .. } => primary.is_migration(),
            _ => false,
        }
    }
}
