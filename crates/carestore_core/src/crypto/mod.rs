//! Optional encryption of the primary data file.
//!
//! When a [`StoreConfiguration`](crate::StoreConfiguration) carries an
//! encryption key, the store image is sealed with AES-256-GCM before it is
//! framed and written. Where keys come from is the application's business.
//!
//! Encryption is compiled in with the `encryption` feature (on by default).
//! Without it, the types below still exist but every operation fails with
//! [`CoreError::EncryptionNotEnabled`](crate::CoreError::EncryptionNotEnabled).

#[cfg(feature = "encryption")]
mod encrypted;

#[cfg(feature = "encryption")]
pub use encrypted::*;

/// Module contents when encryption feature is disabled.
#[cfg(not(feature = "encryption"))]
mod stub {
    use crate::error::{CoreError, CoreResult};

    /// Encryption key (stub when encryption disabled).
    #[derive(Debug, Clone)]
    pub struct EncryptionKey {
        _private: (),
    }

    impl EncryptionKey {
        /// Always returns an error when encryption is disabled.
        pub fn generate() -> CoreResult<Self> {
            Err(CoreError::encryption_not_enabled())
        }

        /// Always returns an error when encryption is disabled.
        pub fn from_bytes(_bytes: &[u8]) -> CoreResult<Self> {
            Err(CoreError::encryption_not_enabled())
        }
    }

    /// Crypto manager (stub when encryption disabled).
    #[derive(Debug)]
    pub struct CryptoManager {
        _private: (),
    }

    impl CryptoManager {
        /// Always returns an error when encryption is disabled.
        pub fn new(_key: &EncryptionKey) -> CoreResult<Self> {
            Err(CoreError::encryption_not_enabled())
        }

        /// Always returns an error when encryption is disabled.
        pub fn encrypt(&self, _data: &[u8]) -> CoreResult<Vec<u8>> {
            Err(CoreError::encryption_not_enabled())
        }

        /// Always returns an error when encryption is disabled.
        pub fn decrypt(&self, _data: &[u8]) -> CoreResult<Vec<u8>> {
            Err(CoreError::encryption_not_enabled())
        }
    }
}

#[cfg(not(feature = "encryption"))]
pub use stub::*;
