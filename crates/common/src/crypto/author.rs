//! Snapshot authors
//!
//! A [`LocalAuthor`] owns a signing key and can attribute new snapshots.
//! Everyone else only ever sees the [`RemoteAuthor`] projection, which holds
//! the verification key and nothing private.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::keys::{KeyError, PublicKey, SecretKey, Signature};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AuthorError {
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("invalid author JSON: {0}")]
    Json(String),
}

/// An author whose private key lives on this machine
#[derive(Debug, Clone)]
pub struct LocalAuthor {
    name: String,
    signing_key: SecretKey,
}

/// Generate a new keypair for `name`
///
/// Names are labels only; two authors may share one.
pub fn create_local_author(name: impl Into<String>) -> Result<LocalAuthor, AuthorError> {
    Ok(LocalAuthor::new(name, SecretKey::generate()?))
}

impl LocalAuthor {
    pub fn new(name: impl Into<String>, signing_key: SecretKey) -> Self {
        Self {
            name: name.into(),
            signing_key,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signing_key(&self) -> &SecretKey {
        &self.signing_key
    }

    pub fn public_key(&self) -> PublicKey {
        self.signing_key.public()
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    pub fn to_remote_author(&self) -> RemoteAuthor {
        RemoteAuthor {
            name: self.name.clone(),
            verify_key: self.public_key(),
        }
    }
}

impl PartialEq for LocalAuthor {
    fn eq(&self, other: &Self) -> bool {
        self.public_key() == other.public_key()
    }
}

impl Eq for LocalAuthor {}

/// The public half of an author
#[derive(Debug, Clone)]
pub struct RemoteAuthor {
    name: String,
    verify_key: PublicKey,
}

impl RemoteAuthor {
    pub fn new(name: impl Into<String>, verify_key: PublicKey) -> Self {
        Self {
            name: name.into(),
            verify_key,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn verify_key(&self) -> &PublicKey {
        &self.verify_key
    }

    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), KeyError> {
        self.verify_key.verify(message, signature)
    }

    /// Serialize to the compact JSON stored in commit objects
    pub fn to_json(&self) -> String {
        // a struct of two strings cannot fail to serialize
        serde_json::to_string(&AuthorJson::from(self)).unwrap_or_default()
    }

    pub fn from_json(s: &str) -> Result<Self, AuthorError> {
        let json: AuthorJson = serde_json::from_str(s).map_err(|e| AuthorError::Json(e.to_string()))?;
        json.try_into()
    }
}

impl PartialEq for RemoteAuthor {
    fn eq(&self, other: &Self) -> bool {
        self.verify_key == other.verify_key
    }
}

impl Eq for RemoteAuthor {}

impl Hash for RemoteAuthor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.verify_key.hash(state);
    }
}

/// Wire form of a [`RemoteAuthor`]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AuthorJson {
    name: String,
    public_key: String,
}

impl From<&RemoteAuthor> for AuthorJson {
    fn from(author: &RemoteAuthor) -> Self {
        Self {
            name: author.name.clone(),
            public_key: author.verify_key.to_hex(),
        }
    }
}

impl TryFrom<AuthorJson> for RemoteAuthor {
    type Error = AuthorError;

    fn try_from(json: AuthorJson) -> Result<Self, Self::Error> {
        Ok(Self {
            name: json.name,
            verify_key: PublicKey::from_hex(&json.public_key)?,
        })
    }
}

impl Serialize for RemoteAuthor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        AuthorJson::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RemoteAuthor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        AuthorJson::deserialize(deserializer)?
            .try_into()
            .map_err(serde::de::Error::custom)
    }
}
