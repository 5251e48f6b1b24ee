use crate::jvm::Error;
use std::fmt;

/// Which sort of rule a method broke
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Malformed input that has nothing to do with types: truncated instructions, jumps into the
    /// middle of an instruction, bad constant pool entries, broken stack map tables
    ClassFormat,

    /// Type-safety violation found while abstractly interpreting the method
    Verify,
}

/// Reason a method was rejected
///
/// Only the first failure is ever reported: verification stops as soon as something is wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationFailure {
    pub kind: FailureKind,
    pub message: String,

    /// Whether a version 50 class may be re-verified without its stack map table after this
    pub allow_fallback: bool,
}

impl VerificationFailure {
    pub fn format(message: impl Into<String>) -> VerificationFailure {
        VerificationFailure {
            kind: FailureKind::ClassFormat,
            message: message.into(),
            allow_fallback: true,
        }
    }

    /// Format failure which re-verifying without stack maps could never fix
    pub fn format_no_fallback(message: impl Into<String>) -> VerificationFailure {
        VerificationFailure {
            kind: FailureKind::ClassFormat,
            message: message.into(),
            allow_fallback: false,
        }
    }

    pub fn verify(message: impl Into<String>) -> VerificationFailure {
        VerificationFailure {
            kind: FailureKind::Verify,
            message: message.into(),
            allow_fallback: true,
        }
    }

    pub fn is_format(&self) -> bool {
        self.kind == FailureKind::ClassFormat
    }
}

/// Anything that goes wrong reading the class file is a format problem
impl From<Error> for VerificationFailure {
    fn from(err: Error) -> VerificationFailure {
        VerificationFailure::format(err.to_string())
    }
}

impl fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FailureKind::ClassFormat => write!(f, "ClassFormatError: {}", self.message),
            FailureKind::Verify => write!(f, "VerifyError: {}", self.message),
        }
    }
}

impl std::error::Error for VerificationFailure {}

/// Fail with a `Verify` failure unless the condition holds
pub(crate) fn verify_guarantee(
    condition: bool,
    message: impl FnOnce() -> String,
) -> Result<(), VerificationFailure> {
    if condition {
        Ok(())
    } else {
        Err(VerificationFailure::verify(message()))
    }
}

/// Fail with a `ClassFormat` failure unless the condition holds
pub(crate) fn format_guarantee(
    condition: bool,
    message: impl FnOnce() -> String,
) -> Result<(), VerificationFailure> {
    if condition {
        Ok(())
    } else {
        Err(VerificationFailure::format(message()))
    }
}
