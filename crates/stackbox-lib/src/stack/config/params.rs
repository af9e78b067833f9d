//! The single source of truth every generated artifact is rendered from.

use crate::stack::paths::StackPaths;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use once_cell::sync::Lazy;
use rand::RngCore;
use regex::Regex;
use std::path::PathBuf;

pub const DEFAULT_APP_PORT: u16 = 8080;
pub const DEFAULT_DB_PORT: u16 = 3307;
pub const DEFAULT_APP_NAME: &str = "Stackbox";
pub const DEFAULT_DB_NAME: &str = "stackbox";
pub const DEFAULT_DB_USER: &str = "stackbox";

const SECRET_PREFIX: &str = "base64:";
const SECRET_BYTES: usize = 32;

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]{1,64}$").expect("valid identifier pattern"));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParameterError {
    #[error("{name} port must be between 1 and 65535")]
    PortOutOfRange { name: &'static str },

    #[error("application and database ports must differ (both are {0})")]
    PortClash(u16),

    #[error("{field} {value:?} must be 1-64 characters of letters, digits or underscores")]
    InvalidIdentifier { field: &'static str, value: String },

    #[error("database password must be printable ASCII without quotes or backslashes")]
    InvalidPassword,

    #[error("application name must not be empty or contain quotes or line breaks")]
    InvalidAppName,
}

/// Root, ports, credentials and the application secret for one install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSet {
    pub root: PathBuf,
    pub app_name: String,
    pub app_port: u16,
    pub db_port: u16,
    pub db_name: String,
    pub db_user: String,
    pub db_password: String,
    /// `base64:`-prefixed, 32 bytes of CSPRNG output.
    pub app_secret: String,
}

impl ParameterSet {
    /// Validate the inputs and generate a fresh application secret.
    pub fn new(
        root: impl Into<PathBuf>,
        app_port: u16,
        db_port: u16,
        db_name: &str,
        db_user: &str,
        db_password: &str,
    ) -> Result<Self, ParameterError> {
        Self::with_secret(
            root,
            app_port,
            db_port,
            db_name,
            db_user,
            db_password,
            generate_app_secret(),
        )
    }

    /// Same validation, with an existing secret (e.g. read back from `.env`).
    pub fn with_secret(
        root: impl Into<PathBuf>,
        app_port: u16,
        db_port: u16,
        db_name: &str,
        db_user: &str,
        db_password: &str,
        app_secret: String,
    ) -> Result<Self, ParameterError> {
        if app_port == 0 {
            return Err(ParameterError::PortOutOfRange { name: "application" });
        }
        if db_port == 0 {
            return Err(ParameterError::PortOutOfRange { name: "database" });
        }
        if app_port == db_port {
            return Err(ParameterError::PortClash(app_port));
        }
        validate_identifier("database name", db_name)?;
        validate_identifier("database user", db_user)?;
        if !is_valid_password(db_password) {
            return Err(ParameterError::InvalidPassword);
        }

        Ok(Self {
            root: root.into(),
            app_name: DEFAULT_APP_NAME.to_string(),
            app_port,
            db_port,
            db_name: db_name.to_string(),
            db_user: db_user.to_string(),
            db_password: db_password.to_string(),
            app_secret,
        })
    }

    pub fn with_app_name(mut self, name: &str) -> Result<Self, ParameterError> {
        if name.trim().is_empty() || name.contains(['\r', '\n', '"', '\'']) {
            return Err(ParameterError::InvalidAppName);
        }
        self.app_name = name.trim().to_string();
        Ok(self)
    }

    pub fn paths(&self) -> StackPaths {
        StackPaths::new(&self.root)
    }

    pub fn app_url(&self) -> String {
        format!("http://localhost:{}", self.app_port)
    }
}

fn validate_identifier(field: &'static str, value: &str) -> Result<(), ParameterError> {
    if IDENTIFIER.is_match(value) {
        Ok(())
    } else {
        Err(ParameterError::InvalidIdentifier {
            field,
            value: value.to_string(),
        })
    }
}

/// Empty passwords are allowed (MariaDB's own default for local users).
fn is_valid_password(password: &str) -> bool {
    password
        .chars()
        .all(|c| c.is_ascii_graphic() && !matches!(c, '"' | '\'' | '\\' | '`'))
}

/// `base64:` followed by 32 random bytes from the thread-local CSPRNG.
pub fn generate_app_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    format!("{SECRET_PREFIX}{}", STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(app: u16, db: u16) -> Result<ParameterSet, ParameterError> {
        ParameterSet::new("/srv/stack", app, db, "laravel", "app_user", "s3cr3t!")
    }

    #[test]
    fn rejects_bad_ports() {
        assert_eq!(
            params(0, 3307).unwrap_err(),
            ParameterError::PortOutOfRange { name: "application" }
        );
        assert_eq!(params(8080, 8080).unwrap_err(), ParameterError::PortClash(8080));
        assert!(params(8080, 3307).is_ok());
    }

    #[test]
    fn rejects_unsafe_identifiers_and_passwords() {
        assert!(matches!(
            ParameterSet::new("/s", 80, 3306, "app-db", "u", "p"),
            Err(ParameterError::InvalidIdentifier { field: "database name", .. })
        ));
        assert!(matches!(
            ParameterSet::new("/s", 80, 3306, "app", &"u".repeat(65), "p"),
            Err(ParameterError::InvalidIdentifier { field: "database user", .. })
        ));
        assert_eq!(
            ParameterSet::new("/s", 80, 3306, "app", "u", "it's").unwrap_err(),
            ParameterError::InvalidPassword
        );
        assert_eq!(
            ParameterSet::new("/s", 80, 3306, "app", "u", "two words").unwrap_err(),
            ParameterError::InvalidPassword
        );
        assert!(ParameterSet::new("/s", 80, 3306, "app", "u", "").is_ok());
    }

    #[test]
    fn secret_is_prefixed_32_random_bytes() {
        let secret = generate_app_secret();
        let encoded = secret.strip_prefix("base64:").unwrap();
        assert_eq!(STANDARD.decode(encoded).unwrap().len(), 32);
        assert_ne!(secret, generate_app_secret());
    }

    #[test]
    fn app_name_is_single_line() {
        let p = params(8080, 3307).unwrap();
        assert_eq!(p.clone().with_app_name("  Shop ").unwrap().app_name, "Shop");
        assert_eq!(
            p.with_app_name("a\nb").unwrap_err(),
            ParameterError::InvalidAppName
        );
    }
}
