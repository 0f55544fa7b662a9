pub mod vault;

pub use vault::{generate_salt, protect, random_string, reveal, EncryptionKey, VaultError};
