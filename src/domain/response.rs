use serde::{Deserialize, Serialize};

/// Outcome of a billing rule check. Valid when no error was recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Reply carried back over the request/response channel, and the return type
/// of every billing operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub validation_result: ValidationResult,
}

impl ResponseMessage {
    pub fn new(validation_result: ValidationResult) -> Self {
        Self { validation_result }
    }

    pub fn ok() -> Self {
        Self::default()
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        let mut validation_result = ValidationResult::new();
        validation_result.add_error(error);
        Self { validation_result }
    }

    pub fn is_valid(&self) -> bool {
        self.validation_result.is_valid()
    }

    pub fn errors(&self) -> &[String] {
        &self.validation_result.errors
    }
}
