use thiserror::Error;

pub type KliResult<T> = Result<T, KliError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum KliError {
    #[error("Validation failed for parameter '{name}': {what}")]
    Validation { name: String, what: String },

    #[error("Unit error: {what}")]
    Unit { what: String },

    #[error("Non-finite numeric value for {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: String },
}

impl KliError {
    pub fn validation(name: impl Into<String>, what: impl Into<String>) -> Self {
        KliError::Validation {
            name: name.into(),
            what: what.into(),
        }
    }

    pub fn unit(what: impl Into<String>) -> Self {
        KliError::Unit { what: what.into() }
    }
}
