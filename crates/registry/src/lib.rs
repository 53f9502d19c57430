//! ChainDocs document registry
//!
//! Tracks trade documents, fingerprints every upload with SHA-256 before
//! the bytes reach object storage, and writes the audit trail for issue,
//! update, verification and view events.
//!
//! # Key Types
//! - `ObjectStore`: the async byte-storage seam, with an in-memory impl
//! - `Document`: one registered document and its current fingerprint
//! - `DocumentRegistry`: the registration and update engine

pub mod document;
pub mod registry;
pub mod storage;

pub use document::{Document, DocumentType, UpdateMode};
pub use registry::{sha256_hex, DocumentRegistry};
pub use storage::{FsObjectStore, MemoryObjectStore, ObjectStore, StorageError};
