use leasehold_core::{AppError, AppResult};

const IDENTIFIER_MAX_LENGTH: usize = 63;

/// Validated, optionally schema-qualified lease table identifier.
///
/// The value is interpolated into SQL text, so only plain identifiers are
/// accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseTableName(String);

impl LeaseTableName {
    /// Table name used when none is configured.
    pub const DEFAULT: &'static str = "shedlock";

    /// Creates a validated table name such as `shedlock` or `ops.shedlock`.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        let parts: Vec<&str> = value.split('.').collect();

        if parts.len() > 2 || !parts.iter().all(|part| is_identifier(part)) {
            return Err(AppError::Validation(format!(
                "invalid lease table name '{value}', expected [schema.]table with letters, digits and underscores"
            )));
        }

        Ok(Self(value))
    }

    /// Returns the identifier as written into statements.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Default for LeaseTableName {
    fn default() -> Self {
        Self(Self::DEFAULT.to_owned())
    }
}

fn is_identifier(part: &str) -> bool {
    let mut characters = part.chars();
    let Some(first) = characters.next() else {
        return false;
    };

    part.len() <= IDENTIFIER_MAX_LENGTH
        && (first.is_ascii_alphabetic() || first == '_')
        && characters.all(|character| character.is_ascii_alphanumeric() || character == '_')
}
