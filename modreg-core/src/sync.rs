use crate::storage::metadata_store::Registry;
use serde::{Deserialize, Serialize};

/// A (module id, version) pair as reported by a client or returned as an
/// update instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledModule {
    pub id: String,
    pub version: u32,
}

/// Reconcile a client's installed modules against a Registry snapshot.
///
/// Returns the subset whose recorded active version differs from the
/// installed one, each paired with the correct active version. Module ids
/// unknown to the Registry produce no entry.
pub fn updated_modules(registry: &Registry, installed: &[InstalledModule]) -> Vec<InstalledModule> {
    installed
        .iter()
        .filter_map(|entry| {
            let module = registry.modules.get(&entry.id)?;
            if module.active_version == entry.version {
                return None;
            }
            Some(InstalledModule {
                id: entry.id.clone(),
                version: module.active_version,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::metadata_store::ModuleRecord;

    fn registry_with_active(entries: &[(&str, u32)]) -> Registry {
        let mut registry = Registry::default();
        for (id, active) in entries {
            registry.modules.insert(
                id.to_string(),
                ModuleRecord {
                    active_version: *active,
                    ..ModuleRecord::default()
                },
            );
        }
        registry
    }

    #[test]
    fn test_outdated_module_yields_update() {
        let registry = registry_with_active(&[("proxy", 2)]);
        let installed = [InstalledModule {
            id: "proxy".to_string(),
            version: 1,
        }];

        let updates = updated_modules(&registry, &installed);
        assert_eq!(
            updates,
            vec![InstalledModule {
                id: "proxy".to_string(),
                version: 2,
            }]
        );
    }

    #[test]
    fn test_up_to_date_module_yields_nothing() {
        let registry = registry_with_active(&[("proxy", 2)]);
        let installed = [InstalledModule {
            id: "proxy".to_string(),
            version: 2,
        }];

        assert!(updated_modules(&registry, &installed).is_empty());
    }

    #[test]
    fn test_unknown_module_is_skipped() {
        let registry = registry_with_active(&[("proxy", 2)]);
        let installed = [
            InstalledModule {
                id: "ghost".to_string(),
                version: 1,
            },
            InstalledModule {
                id: "proxy".to_string(),
                version: 1,
            },
        ];

        let updates = updated_modules(&registry, &installed);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].id, "proxy");
    }
}
