//! Error types for work item tracking.

use std::fmt;

use thiserror::Error;

/// Errors that can occur in tracker operations.
///
/// `Context` wraps a lower-level failure with a message; [`WitError::cause`]
/// walks back to the root kind.
#[derive(Debug, Error)]
pub enum WitError {
    #[error("{entity} with id '{id}' not found")]
    NotFound { entity: String, id: String },
    #[error("{}", bad_parameter_message(.parameter, .value, .expected))]
    BadParameter {
        parameter: String,
        value: String,
        expected: Option<String>,
    },
    #[error("unknown field type: {0}")]
    UnknownFieldType(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("internal error: {0}")]
    Internal(String),
    #[error("{message}: {source}")]
    Context {
        message: String,
        #[source]
        source: Box<WitError>,
    },
}

fn bad_parameter_message(parameter: &str, value: &str, expected: &Option<String>) -> String {
    match expected {
        Some(expected) => {
            format!("Bad value for parameter '{parameter}': '{value}' (expected: '{expected}')")
        }
        None => format!("Bad value for parameter '{parameter}': '{value}'"),
    }
}

impl WitError {
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn bad_parameter(parameter: impl Into<String>, value: impl fmt::Display) -> Self {
        Self::BadParameter {
            parameter: parameter.into(),
            value: value.to_string(),
            expected: None,
        }
    }

    /// Attach the expected value to a `BadParameter` error. Other kinds are
    /// returned untouched.
    pub fn expected(self, expected: impl Into<String>) -> Self {
        match self {
            Self::BadParameter {
                parameter, value, ..
            } => Self::BadParameter {
                parameter,
                value,
                expected: Some(expected.into()),
            },
            other => other,
        }
    }

    pub fn wrap(self, message: impl Into<String>) -> Self {
        Self::Context {
            message: message.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error of a context chain.
    pub fn cause(&self) -> &WitError {
        let mut current = self;
        while let Self::Context { source, .. } = current {
            current = source;
        }
        current
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.cause(), Self::NotFound { .. })
    }

    pub fn is_bad_parameter(&self) -> bool {
        matches!(self.cause(), Self::BadParameter { .. })
    }
}

/// Convenience result type for tracker operations.
pub type WitResult<T> = Result<T, WitError>;

/// Adds context to a failed [`WitResult`].
pub trait ResultExt<T> {
    fn wrap_err(self, message: impl Into<String>) -> WitResult<T>;

    fn wrap_err_with<M, F>(self, message: F) -> WitResult<T>
    where
        M: Into<String>,
        F: FnOnce() -> M;
}

impl<T> ResultExt<T> for WitResult<T> {
    fn wrap_err(self, message: impl Into<String>) -> WitResult<T> {
        self.map_err(|error| error.wrap(message))
    }

    fn wrap_err_with<M, F>(self, message: F) -> WitResult<T>
    where
        M: Into<String>,
        F: FnOnce() -> M,
    {
        self.map_err(|error| error.wrap(message()))
    }
}
