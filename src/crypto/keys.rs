use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretString, Zeroize};
use sha2::{Digest, Sha256};
use std::fmt;

use super::armor::{self, PRIVATE_KEY_LABEL, PUBLIC_KEY_LABEL};
use crate::error::{PkiError, Result};

const ALGORITHM: &str = "Ed25519";

/// Armored private key text, zeroized on drop. Not `Serialize`, and
/// `Debug` prints a placeholder.
pub struct SecretPem(SecretString);

impl SecretPem {
    fn new(armored: String) -> Self {
        Self(SecretString::new(armored))
    }
}

impl ExposeSecret<String> for SecretPem {
    fn expose_secret(&self) -> &String {
        self.0.expose_secret()
    }
}

// every copy is its own zeroizing container
impl Clone for SecretPem {
    fn clone(&self) -> Self {
        Self::new(self.0.expose_secret().clone())
    }
}

impl fmt::Debug for SecretPem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretPem(<redacted>)")
    }
}

/// An Ed25519 key pair backing one certificate.
pub struct KeyMaterial {
    signing_key: SigningKey,
}

impl KeyMaterial {
    pub fn generate() -> Result<Self> {
        let mut seed = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut seed)
            .map_err(|e| PkiError::KeyGenerationFailed(e.to_string()))?;
        let signing_key = SigningKey::from_bytes(&seed);
        seed.zeroize();
        Ok(Self { signing_key })
    }

    pub fn from_private_pem(pem: &SecretPem) -> Result<Self> {
        let mut armored = armor::decode(PRIVATE_KEY_LABEL, pem.expose_secret())?;
        let seed: Option<[u8; 32]> = armored.body.as_slice().try_into().ok();
        armored.body.zeroize();
        let mut seed = seed
            .ok_or_else(|| PkiError::InvalidEncoding("private key must be 32 bytes".to_string()))?;
        let signing_key = SigningKey::from_bytes(&seed);
        seed.zeroize();
        Ok(Self { signing_key })
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn public_pem(&self) -> String {
        armor::encode(
            PUBLIC_KEY_LABEL,
            &[("Algorithm", ALGORITHM)],
            &self.public_key_bytes(),
        )
    }

    pub fn private_pem(&self) -> SecretPem {
        let mut seed = self.signing_key.to_bytes();
        let pem = SecretPem::new(armor::encode(
            PRIVATE_KEY_LABEL,
            &[("Algorithm", ALGORITHM)],
            &seed,
        ));
        seed.zeroize();
        pem
    }

    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        self.signing_key.sign(data).to_bytes().to_vec()
    }
}

pub fn decode_public_pem(pem: &str) -> Result<VerifyingKey> {
    let armored = armor::decode(PUBLIC_KEY_LABEL, pem)?;
    if let Some(algorithm) = armored.header("Algorithm") {
        if algorithm != ALGORITHM {
            return Err(PkiError::InvalidEncoding(format!(
                "unsupported key algorithm: {}",
                algorithm
            )));
        }
    }
    let bytes: [u8; 32] = armored
        .body
        .as_slice()
        .try_into()
        .map_err(|_| PkiError::InvalidEncoding("public key must be 32 bytes".to_string()))?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| PkiError::InvalidEncoding(e.to_string()))
}

pub fn verify_with_key(key: &VerifyingKey, data: &[u8], signature: &[u8]) -> bool {
    match <&[u8; 64]>::try_from(signature) {
        Ok(sig_array) => key.verify(data, &Signature::from_bytes(sig_array)).is_ok(),
        Err(_) => false,
    }
}

/// Verify `signature` over `data` under an armored public key. Malformed
/// keys or signatures verify as false.
pub fn verify(public_pem: &str, data: &[u8], signature: &[u8]) -> bool {
    match decode_public_pem(public_pem) {
        Ok(key) => verify_with_key(&key, data, signature),
        Err(_) => false,
    }
}

pub fn fingerprint(public_key: &[u8]) -> String {
    format!("{:x}", Sha256::digest(public_key))
}

/// 128-bit random serial number, lowercase hex.
pub fn random_serial() -> Result<String> {
    let mut bytes = [0u8; 16];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| PkiError::KeyGenerationFailed(e.to_string()))?;
    Ok(hex::encode(bytes))
}
