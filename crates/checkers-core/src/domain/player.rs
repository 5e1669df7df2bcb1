//! Player identity as exchanged on the wire.

use serde::{Deserialize, Serialize};

use super::base64::{base64_decode, base64_encode};
use super::DomainError;

/// A player's nickname and profile image, both in wire (base64) form.
///
/// The lobby treats both fields as opaque tokens; it only checks that they
/// look like base64 and that the nickname is unique among registered players.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerIdentity {
    pub nickname: String,
    pub profile_image: String,
}

impl PlayerIdentity {
    /// Wraps already-encoded wire fields.
    pub fn new(nickname: impl Into<String>, profile_image: impl Into<String>) -> Self {
        Self {
            nickname: nickname.into(),
            profile_image: profile_image.into(),
        }
    }

    /// Builds an identity from a human-readable name and raw image bytes,
    /// encoding both as base64.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::EmptyNickname`] if `display_name` is empty and
    /// [`DomainError::InvalidBase64`] if `image` is empty (an empty field
    /// would vanish during whitespace tokenization).
    pub fn from_display(display_name: &str, image: &[u8]) -> Result<Self, DomainError> {
        if display_name.is_empty() {
            return Err(DomainError::EmptyNickname);
        }
        if image.is_empty() {
            return Err(DomainError::InvalidBase64 {
                field: "profile image",
            });
        }
        Ok(Self::new(
            base64_encode(display_name.as_bytes()),
            base64_encode(image),
        ))
    }

    /// Decodes the nickname back to text, replacing invalid UTF-8.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidBase64`] if the nickname is not base64.
    pub fn display_name(&self) -> Result<String, DomainError> {
        let bytes = base64_decode(&self.nickname)
            .map_err(|_| DomainError::InvalidBase64 { field: "nickname" })?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_display_encodes_both_fields() {
        let player = PlayerIdentity::from_display("nickname", b"img").unwrap();
        assert_eq!(player.nickname, "bmlja25hbWU=");
        assert_eq!(player.profile_image, "aW1n");
        assert_eq!(player.display_name().unwrap(), "nickname");
    }

    #[test]
    fn test_from_display_rejects_empty_fields() {
        assert_eq!(
            PlayerIdentity::from_display("", b"img"),
            Err(DomainError::EmptyNickname)
        );
        assert!(PlayerIdentity::from_display("bob", b"").is_err());
    }
}
