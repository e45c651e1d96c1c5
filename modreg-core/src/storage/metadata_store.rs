use crate::error::{RegistryError, Result};
use crate::storage::blob_store::BlobStore;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

pub const METADATA_FILE: &str = "metadata.json";

/// Free-form descriptive fields of a module, replaced wholesale by `set_meta`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModuleMeta {
    pub name: String,
    pub description: String,
    pub package: String,
}

/// Authoritative record of one module: its version timeline and which
/// version is active.
///
/// Version numbers are assigned monotonically starting at 1 and never
/// removed. `active_version == 0` means no version has been activated yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModuleRecord {
    pub versions: BTreeMap<u32, DateTime<Utc>>,
    pub version_count: u32,
    pub active_version: u32,
    pub meta: ModuleMeta,
}

/// The full module-id -> record mapping; the unit of persistence.
///
/// Serializes to the `metadata.json` wire format: integer version keys are
/// encoded as JSON string keys, timestamps as RFC3339 strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    #[serde(rename = "Modules")]
    pub modules: BTreeMap<String, ModuleRecord>,
}

/// MetadataStore is the single source of truth for the Registry.
///
/// The Registry is loaded once at `open` and kept in memory; every mutation
/// runs a mutate-persist-commit cycle under one `tokio::sync::Mutex` so
/// concurrent callers observe a serializable history of states. The working
/// copy is committed to memory only after the metadata file has been
/// durably replaced, so a failed persist leaves both disk and memory at the
/// previous state.
///
/// `add_version` is the one acknowledged inconsistency window: the Registry
/// is persisted with the new version number before the blob write is
/// attempted. A blob failure surfaces as `BlobWrite` while the version
/// number stays reserved; retrying the upload heals the window because
/// version numbers are never reused.
#[derive(Debug)]
pub struct MetadataStore {
    metadata_path: PathBuf,
    blobs: BlobStore,
    state: Mutex<Registry>,
}

impl MetadataStore {
    /// Open the store at `dir`, loading `metadata.json` or initializing an
    /// empty Registry if the file does not exist yet.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| RegistryError::Persistence(format!("create data dir failed: {}", e)))?;

        let metadata_path = dir.join(METADATA_FILE);
        let registry = match fs::read(&metadata_path).await {
            Ok(raw) => serde_json::from_slice(&raw).map_err(|e| {
                RegistryError::Persistence(format!("corrupt metadata file: {}", e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let registry = Registry::default();
                persist_registry(&metadata_path, &registry).await?;
                registry
            }
            Err(e) => {
                return Err(RegistryError::Persistence(format!(
                    "read metadata file failed: {}",
                    e
                )));
            }
        };

        tracing::info!(
            "Opened metadata store at {:?} with {} modules",
            dir,
            registry.modules.len()
        );

        Ok(Self {
            metadata_path,
            blobs: BlobStore::new(dir),
            state: Mutex::new(registry),
        })
    }

    /// Snapshot of the current Registry. Callers receive a copy, never a
    /// live reference.
    pub async fn list_modules(&self) -> Registry {
        self.state.lock().await.clone()
    }

    /// Insert a new module with an empty version history.
    pub async fn create_module(&self, id: &str) -> Result<()> {
        validate_module_id(id)?;
        let mut state = self.state.lock().await;
        if state.modules.contains_key(id) {
            return Err(RegistryError::ModuleExists(id.to_string()));
        }

        let mut next = state.clone();
        next.modules.insert(id.to_string(), ModuleRecord::default());
        persist_registry(&self.metadata_path, &next).await?;
        *state = next;

        tracing::info!("Created module {}", id);
        Ok(())
    }

    /// Assign the next version number to `id`, record `timestamp`, persist
    /// the Registry, then store the content. Returns the assigned number.
    pub async fn add_version(
        &self,
        id: &str,
        timestamp: DateTime<Utc>,
        content: Bytes,
    ) -> Result<u32> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let module = next
            .modules
            .get_mut(id)
            .ok_or_else(|| RegistryError::ModuleNotFound(id.to_string()))?;

        let version = module.version_count + 1;
        module.version_count = version;
        module.versions.insert(version, timestamp);

        // Metadata commits first; a blob failure below leaves this version
        // reserved with no backing content until the upload is retried.
        persist_registry(&self.metadata_path, &next).await?;
        *state = next;

        self.blobs.write(id, version, content).await?;

        tracing::info!("Added version {} to module {}", version, id);
        Ok(version)
    }

    /// Set `active_version` for `id`. The version value is not checked
    /// against the version timeline; callers validate upstream.
    pub async fn set_active_version(&self, id: &str, version: u32) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let module = next
            .modules
            .get_mut(id)
            .ok_or_else(|| RegistryError::ModuleNotFound(id.to_string()))?;
        module.active_version = version;

        persist_registry(&self.metadata_path, &next).await?;
        *state = next;

        tracing::info!("Set active version of module {} to {}", id, version);
        Ok(())
    }

    /// Wholesale-replace the meta record of `id`.
    pub async fn set_meta(
        &self,
        id: &str,
        name: &str,
        package: &str,
        description: &str,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let module = next
            .modules
            .get_mut(id)
            .ok_or_else(|| RegistryError::ModuleNotFound(id.to_string()))?;
        module.meta = ModuleMeta {
            name: name.to_string(),
            description: description.to_string(),
            package: package.to_string(),
        };

        persist_registry(&self.metadata_path, &next).await?;
        *state = next;
        Ok(())
    }

    /// Resolve `id` and read the blob for its active version.
    ///
    /// A module whose `active_version` is 0 has no blob and fails with
    /// `BlobRead` rather than returning empty content; a missing blob for a
    /// recorded active version is a cross-store invariant violation and is
    /// surfaced the same way rather than silently recovered.
    pub async fn active_version_content(&self, id: &str) -> Result<(ModuleRecord, Bytes)> {
        let module = {
            let state = self.state.lock().await;
            state
                .modules
                .get(id)
                .cloned()
                .ok_or_else(|| RegistryError::ModuleNotFound(id.to_string()))?
        };

        let content = self.blobs.read(id, module.active_version).await?;
        Ok((module, content))
    }
}

async fn persist_registry(path: &Path, registry: &Registry) -> Result<()> {
    let payload = serde_json::to_vec_pretty(registry)
        .map_err(|e| RegistryError::Persistence(format!("encode metadata failed: {}", e)))?;

    // Write to temporary file first, then rename for atomicity
    let temp_path = path.with_extension("tmp");
    let result: std::io::Result<()> = async {
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&payload).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&temp_path, path).await
    }
    .await;

    result.map_err(|e| RegistryError::Persistence(format!("write metadata file failed: {}", e)))
}

fn validate_module_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(RegistryError::InvalidRequest(
            "module id cannot be empty".to_string(),
        ));
    }
    if id == "." || id == ".." || id.contains('/') || id.contains('\\') {
        return Err(RegistryError::InvalidRequest(format!(
            "invalid module id: {}",
            id
        )));
    }
    Ok(())
}
