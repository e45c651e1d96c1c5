//! Modreg Core - Core library for a minimal versioned module artifact registry
//!
//! Clients publish successive binary versions of named modules and later
//! fetch the currently-active version's bytes plus metadata. The core is:
//! - a Metadata Store owning the authoritative Registry, serializing every
//!   mutation under a single mutex with a persist-on-mutation cycle
//! - a Blob Store mapping each (module id, version number) to an immutable
//!   blob file on disk

pub mod error;
pub mod storage;
pub mod sync;

pub use error::{RegistryError, Result};
pub use storage::{BlobStore, METADATA_FILE, MetadataStore, ModuleMeta, ModuleRecord, Registry};
pub use sync::{InstalledModule, updated_modules};
