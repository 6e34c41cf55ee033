//! ID generation utilities.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::{AppError, AppResult};

/// Length of a session code.
pub const SESSION_CODE_LEN: usize = 6;

/// Characters a session code is drawn from. Codes are case-insensitive, so
/// only the uppercase form is generated and stored.
const SESSION_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// ID generator for entities.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    _private: (),
}

impl IdGenerator {
    /// Create a new ID generator.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Generate a new ULID-based ID.
    ///
    /// Used for poll internal ids and connection ids: globally unique and
    /// independent of any session code.
    #[must_use]
    pub fn generate(&self) -> String {
        Ulid::new().to_string().to_lowercase()
    }

    /// Generate a random session code, uniformly distributed over
    /// 6 characters of `[A-Z0-9]`.
    ///
    /// The result is not checked for availability; see the allocator in
    /// `livepoll-core` for that.
    #[must_use]
    pub fn generate_session_code(&self) -> SessionCode {
        let mut rng = rand::thread_rng();
        let code: String = (0..SESSION_CODE_LEN)
            .map(|_| {
                let idx = rng.gen_range(0..SESSION_CODE_ALPHABET.len());
                char::from(SESSION_CODE_ALPHABET[idx])
            })
            .collect();
        SessionCode(code)
    }
}

/// Short, human-typable public identifier for a poll.
///
/// Always held in canonical (uppercase) form, so two codes typed with
/// different case compare equal and address the same room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionCode(String);

impl SessionCode {
    /// Parse user input into a canonical session code.
    ///
    /// Surrounding whitespace is ignored. Anything other than exactly six
    /// ASCII alphanumerics is rejected before any store lookup happens.
    pub fn parse(input: &str) -> AppResult<Self> {
        let trimmed = input.trim();
        if trimmed.len() != SESSION_CODE_LEN
            || !trimmed.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(AppError::InvalidInput(format!(
                "session code must be {SESSION_CODE_LEN} alphanumeric characters"
            )));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// The canonical string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SessionCode {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionCode> for String {
    fn from(code: SessionCode) -> Self {
        code.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_ulid() {
        let id_gen = IdGenerator::new();
        let id1 = id_gen.generate();
        let id2 = id_gen.generate();

        assert_eq!(id1.len(), 26);
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_generate_session_code_shape() {
        let id_gen = IdGenerator::new();
        for _ in 0..200 {
            let code = id_gen.generate_session_code();
            assert_eq!(code.as_str().len(), SESSION_CODE_LEN);
            assert!(
                code.as_str()
                    .bytes()
                    .all(|b| SESSION_CODE_ALPHABET.contains(&b))
            );
        }
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        let lower = SessionCode::parse("ab12cd").unwrap();
        let upper = SessionCode::parse("AB12CD").unwrap();
        assert_eq!(lower, upper);
        assert_eq!(lower.as_str(), "AB12CD");
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let code = SessionCode::parse("  xyz789 \n").unwrap();
        assert_eq!(code.to_string(), "XYZ789");
    }

    #[test]
    fn test_parse_rejects_malformed_codes() {
        for bad in ["", "ABC", "ABCDEFG", "AB-12C", "ÄB12CD", "AB 2CD"] {
            assert!(
                matches!(SessionCode::parse(bad), Err(AppError::InvalidInput(_))),
                "expected {bad:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_serde_uses_canonical_form() {
        let code: SessionCode = serde_json::from_str("\"k3lm9q\"").unwrap();
        assert_eq!(serde_json::to_string(&code).unwrap(), "\"K3LM9Q\"");
        assert!(serde_json::from_str::<SessionCode>("\"nope\"").is_err());
    }
}
