//! Participant identifiers

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A participant's extended public identifier: a BIP32 neutered key in
/// Base58 (`xpub…`) form.
///
/// The canonical signer address is the Ethereum address of the first
/// non-hardened child key; that derivation needs curve arithmetic and
/// lives in the crypto crate. This type is the cheap, validated handle
/// passed around on the wire and in the store.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicIdentifier(String);

impl PublicIdentifier {
    /// Validate and wrap an extended public key string.
    pub fn new(raw: impl Into<String>) -> Result<Self, ModelError> {
        let raw = raw.into();
        if !raw.starts_with("xpub") || raw.len() < 16 {
            return Err(ModelError::InvalidIdentifier(raw));
        }
        Ok(Self(raw))
    }

    /// The Base58 string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PublicIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for PublicIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicIdentifier({}…)", &self.0[..12.min(self.0.len())])
    }
}

impl FromStr for PublicIdentifier {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_xpub_prefix() {
        let id = PublicIdentifier::new("xpub6Cabbage000000000000000").unwrap();
        assert!(id.as_str().starts_with("xpub"));
    }

    #[test]
    fn test_rejects_other_prefixes() {
        assert!(PublicIdentifier::new("xprv9s21ZrQH143K").is_err());
        assert!(PublicIdentifier::new("").is_err());
    }

    #[test]
    fn test_serde_is_transparent() {
        let id = PublicIdentifier::new("xpub6Cabbage000000000000000").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"xpub6Cabbage000000000000000\"");
    }
}
