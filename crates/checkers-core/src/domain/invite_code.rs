//! Invite codes: the short opaque tokens players use to address each other.
//!
//! A code is cut from a random v4 UUID: the 128-bit value is rendered as 32
//! lowercase hex digits and the first [`INVITE_CODE_LEN`] are kept.  With 48
//! bits of randomness collisions are rare, but the issuer still re-rolls until
//! the code is not live anywhere else.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::DomainError;

/// Exact length of every invite code on the wire.
pub const INVITE_CODE_LEN: usize = 12;

/// A 12-character invite code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InviteCode(String);

impl InviteCode {
    /// Validates the length of `code` and wraps it.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InviteCodeLength`] when `code` is not exactly
    /// [`INVITE_CODE_LEN`] characters long.
    pub fn parse(code: &str) -> Result<Self, DomainError> {
        let got = code.chars().count();
        if got != INVITE_CODE_LEN {
            return Err(DomainError::InviteCodeLength {
                expected: INVITE_CODE_LEN,
                got,
            });
        }
        Ok(Self(code.to_string()))
    }

    /// Generates a fresh random code.
    pub fn random() -> Self {
        let mut hex = Uuid::new_v4().simple().to_string();
        hex.truncate(INVITE_CODE_LEN);
        Self(hex)
    }

    /// Generates random codes until `is_live` reports one that is not in use.
    pub fn generate_unique(mut is_live: impl FnMut(&InviteCode) -> bool) -> Self {
        loop {
            let code = Self::random();
            if !is_live(&code) {
                return code;
            }
        }
    }

    /// Returns the code as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InviteCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for InviteCode {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<InviteCode> for String {
    fn from(code: InviteCode) -> Self {
        code.0
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_random_code_is_twelve_lowercase_hex_characters() {
        // Arrange / Act
        let code = InviteCode::random();

        // Assert
        assert_eq!(code.as_str().len(), INVITE_CODE_LEN);
        assert!(code
            .as_str()
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        assert_eq!(
            InviteCode::parse("abc"),
            Err(DomainError::InviteCodeLength { expected: 12, got: 3 })
        );
        assert!(InviteCode::parse("abc123def4567").is_err());
    }

    #[test]
    fn test_parse_accepts_any_twelve_characters() {
        let code = InviteCode::parse("abc123def456").unwrap();
        assert_eq!(code.to_string(), "abc123def456");
    }

    #[test]
    fn test_generate_unique_rerolls_while_code_is_live() {
        // Arrange: the first two candidates are reported as taken.
        let mut attempts = 0;

        // Act
        let code = InviteCode::generate_unique(|_| {
            attempts += 1;
            attempts <= 2
        });

        // Assert
        assert_eq!(attempts, 3);
        assert_eq!(code.as_str().len(), INVITE_CODE_LEN);
    }

    #[test]
    fn test_generate_unique_never_returns_a_live_code() {
        let mut live = HashSet::new();
        for _ in 0..500 {
            let code = InviteCode::generate_unique(|c| live.contains(c));
            assert!(live.insert(code));
        }
    }
}
