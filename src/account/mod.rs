//! Account management module
//!
//! Login and token validation, access levels and bans, the per-account
//! currency ledger, and transactional account provisioning.

pub mod credentials;
pub mod error;
pub mod models;
pub mod store;

pub use credentials::{Argon2Hasher, CredentialError, CredentialHasher, IdGenerator, UuidGenerator};
pub use error::ProvisionError;
pub use models::{AccountId, Currency};
pub use store::AccountStore;
