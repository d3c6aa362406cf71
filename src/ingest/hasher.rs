use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::path::Path;

type HmacSha256 = Hmac<Sha256>;

/// Salted one-way hashing of raw client identifiers (IP addresses).
///
/// The same salt always yields the same hash for the same identifier, so
/// returning visitors can be recognised without ever storing their IP.
pub struct IdentifierHasher {
    salt: Vec<u8>,
}

impl IdentifierHasher {
    pub fn new(salt: impl Into<Vec<u8>>) -> Self {
        Self { salt: salt.into() }
    }

    /// Use `secret` as the salt when given, otherwise the persisted salt file.
    pub fn from_secret_or_file(secret: Option<&str>, salt_path: &Path) -> std::io::Result<Self> {
        match secret {
            Some(secret) if !secret.is_empty() => Ok(Self::new(secret.as_bytes())),
            _ => Self::load_or_create(salt_path),
        }
    }

    /// Load a hex-encoded salt from `path`, generating and persisting a
    /// random 32-byte salt if the file does not exist yet.
    ///
    /// An existing file that does not hold valid hex is an error; it is
    /// never overwritten, since that would change every stored hash.
    pub fn load_or_create(path: &Path) -> std::io::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let salt = hex::decode(contents.trim())
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
                if salt.is_empty() {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "salt file is empty",
                    ));
                }
                tracing::debug!(path = %path.display(), "Loaded identifier salt");
                Ok(Self::new(salt))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let salt: [u8; 32] = rand::random();
                std::fs::write(path, hex::encode(salt))?;
                tracing::info!(path = %path.display(), "Generated new identifier salt");
                Ok(Self::new(salt.to_vec()))
            }
            Err(e) => Err(e),
        }
    }

    /// HMAC-SHA256 of `raw` under the salt, hex encoded (64 chars).
    pub fn hash(&self, raw: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.salt).expect("HMAC accepts any key length");
        mac.update(raw.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}
