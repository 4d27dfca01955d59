use ed25519_dalek::{Signer, Verifier};

/// Size of an ed25519 seed / public key in bytes
pub const KEY_SIZE: usize = 32;
/// Size of an ed25519 signature in bytes
pub const SIGNATURE_SIZE: usize = 64;
/// PEM tag for a stored author seed
pub const PEM_TAG: &str = "MAGIC FOLDER AUTHOR KEY";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum KeyError {
    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("invalid signature length: expected 64 bytes, got {0}")]
    InvalidSignatureLength(usize),
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("signature verification failed")]
    BadSignature,
    #[error("system randomness unavailable: {0}")]
    Randomness(String),
    #[error("invalid PEM: {0}")]
    Pem(String),
}

/// A private ed25519 signing key
#[derive(Clone)]
pub struct SecretKey(ed25519_dalek::SigningKey);

impl SecretKey {
    /// Generate a fresh key from system randomness
    pub fn generate() -> Result<Self, KeyError> {
        let mut seed = [0u8; KEY_SIZE];
        getrandom::getrandom(&mut seed).map_err(|e| KeyError::Randomness(e.to_string()))?;
        Ok(Self::from(seed))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let seed: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| KeyError::InvalidKeyLength(bytes.len()))?;
        Ok(Self::from(seed))
    }

    /// The raw 32 byte seed
    pub fn to_bytes(&self) -> [u8; KEY_SIZE] {
        self.0.to_bytes()
    }

    pub fn public(&self) -> PublicKey {
        PublicKey(self.0.verifying_key())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.0.sign(message))
    }

    pub fn to_pem(&self) -> String {
        pem::encode(&pem::Pem::new(PEM_TAG, self.to_bytes().to_vec()))
    }

    pub fn from_pem(s: &str) -> Result<Self, KeyError> {
        let parsed = pem::parse(s).map_err(|e| KeyError::Pem(e.to_string()))?;
        if parsed.tag() != PEM_TAG {
            return Err(KeyError::Pem(format!("unexpected tag {:?}", parsed.tag())));
        }
        Self::from_bytes(parsed.contents())
    }
}

impl From<[u8; KEY_SIZE]> for SecretKey {
    fn from(seed: [u8; KEY_SIZE]) -> Self {
        Self(ed25519_dalek::SigningKey::from_bytes(&seed))
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SecretKey").field(&self.public().to_hex()).finish()
    }
}

/// A public ed25519 verification key
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(ed25519_dalek::VerifyingKey);

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let raw: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| KeyError::InvalidKeyLength(bytes.len()))?;
        ed25519_dalek::VerifyingKey::from_bytes(&raw)
            .map(Self)
            .map_err(|_| KeyError::InvalidPublicKey)
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        Self::from_bytes(&hex::decode(s)?)
    }

    pub fn to_bytes(&self) -> [u8; KEY_SIZE] {
        self.0.to_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0.as_bytes())
    }

    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), KeyError> {
        self.0
            .verify(message, &signature.0)
            .map_err(|_| KeyError::BadSignature)
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PublicKey").field(&self.to_hex()).finish()
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature(ed25519_dalek::Signature);

impl Signature {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let raw: [u8; SIGNATURE_SIZE] = bytes
            .try_into()
            .map_err(|_| KeyError::InvalidSignatureLength(bytes.len()))?;
        Ok(Self(ed25519_dalek::Signature::from_bytes(&raw)))
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        Self::from_bytes(&hex::decode(s)?)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let secret = SecretKey::generate().unwrap();
        let signature = secret.sign(b"hello");
        assert!(secret.public().verify(b"hello", &signature).is_ok());
        assert_eq!(
            secret.public().verify(b"goodbye", &signature),
            Err(KeyError::BadSignature)
        );
    }

    #[test]
    fn test_hex_round_trip() {
        let secret = SecretKey::from([7u8; KEY_SIZE]);
        let public = secret.public();
        assert_eq!(PublicKey::from_hex(&public.to_hex()).unwrap(), public);

        let signature = secret.sign(b"payload");
        assert_eq!(Signature::from_hex(&signature.to_hex()).unwrap(), signature);
    }

    #[test]
    fn test_rejects_wrong_lengths() {
        assert_eq!(
            SecretKey::from_bytes(&[0u8; 31]).unwrap_err(),
            KeyError::InvalidKeyLength(31)
        );
        assert_eq!(
            Signature::from_bytes(&[0u8; 10]).unwrap_err(),
            KeyError::InvalidSignatureLength(10)
        );
    }

    #[test]
    fn test_seed_is_stable() {
        let secret = SecretKey::from([3u8; KEY_SIZE]);
        let restored = SecretKey::from_bytes(&secret.to_bytes()).unwrap();
        assert_eq!(restored.public(), secret.public());
    }

    #[test]
    fn test_pem_round_trip() {
        let secret = SecretKey::generate().unwrap();
        let encoded = secret.to_pem();
        assert!(encoded.contains("BEGIN MAGIC FOLDER AUTHOR KEY"));
        assert_eq!(SecretKey::from_pem(&encoded).unwrap().public(), secret.public());

        let other = pem::encode(&pem::Pem::new("PRIVATE KEY", vec![0u8; KEY_SIZE]));
        assert!(matches!(SecretKey::from_pem(&other), Err(KeyError::Pem(_))));
    }
}
