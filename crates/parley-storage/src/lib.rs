//! Parley storage crate - per-user SQLite namespaces and credentials.
//!
//! Each user owns one physical SQLite file provisioned on demand by
//! `StoreFactory`; chats and messages for that user never share a
//! connection with any other user's data. A flat JSON credential set
//! (username -> bcrypt hash) is shared across users.

pub mod credentials;
pub mod migrations;
pub mod store;

pub use credentials::CredentialStore;
pub use store::{StoreFactory, UserStore};
