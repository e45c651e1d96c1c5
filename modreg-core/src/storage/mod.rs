//! Storage modules for Modreg
//!
//! Provides the durable blob store and the Registry metadata store.

pub mod blob_store;
pub mod metadata_store;

pub use blob_store::BlobStore;
pub use metadata_store::{METADATA_FILE, MetadataStore, ModuleMeta, ModuleRecord, Registry};
