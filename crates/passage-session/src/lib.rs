//! Session identity and persistence for Passage.
//!
//! This crate owns the two pieces of client-side state a delegated login
//! needs to survive a full-page redirect:
//!
//! 1. **Identifiers**: a fresh, hard-to-guess id per login attempt
//!    ([`SessionIdGenerator`], [`RandomSessionIds`])
//! 2. **Durable slots**: where the id and the user record live between
//!    page loads ([`Storage`] trait, [`MemoryStorage`], [`FileStorage`])
//! 3. **Pairing**: keeping the id and the record in step
//!    ([`SessionStore`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Controller (above)  ← drives the login state machine
//!     ↕
//! Session Layer (this crate)  ← persists session id + user record
//!     ↕
//! Protocol Layer (below)  ← provides SessionId, UserRecord, JsonCodec
//! ```

mod error;
mod file;
mod generator;
mod storage;
mod store;

pub use error::StorageError;
pub use file::FileStorage;
pub use generator::{RandomSessionIds, SessionIdGenerator, SUFFIX_LEN};
pub use storage::{MemoryStorage, Storage, StorageOp, StorageResult};
pub use store::{SessionStore, StorageKeys};
