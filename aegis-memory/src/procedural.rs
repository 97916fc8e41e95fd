//! Procedural memory: a keyed store of callable procedures (spec §4.4).
//!
//! The source system persists parameter names and function body text, then
//! reconstructs a callable from that text at load time. Rehydrating code
//! from arbitrary stored text crosses a trust boundary this crate won't
//! cross by default: the default build exposes a *named-procedure
//! registry* instead — procedures are registered by name at startup, and
//! `ProceduralStore` only ever stores/serves metadata plus a reference to
//! an already-registered callable. Dynamic rehydration from persisted body
//! text remains behind `code_loading_enabled` and is refused otherwise.

use aegis_core::MemoryError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Metadata persisted for a procedure: enough to describe its signature
/// without carrying executable content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcedureRecord {
    pub name: String,
    pub param_names: Vec<String>,
    /// Source body text, kept only for audit/export; never evaluated unless
    /// `code_loading_enabled` is set and a loader is supplied.
    pub body: String,
}

pub type ProcedureFn = dyn Fn(&HashMap<String, serde_json::Value>) -> serde_json::Value + Send + Sync;

pub struct ProceduralStore {
    code_loading_enabled: bool,
    records: parking_lot::RwLock<HashMap<String, ProcedureRecord>>,
    registry: parking_lot::RwLock<HashMap<String, Arc<ProcedureFn>>>,
}

impl std::fmt::Debug for ProceduralStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProceduralStore")
            .field("code_loading_enabled", &self.code_loading_enabled)
            .field("records", &self.records)
            .field("registry_len", &self.registry.read().len())
            .finish()
    }
}

impl ProceduralStore {
    pub fn new(code_loading_enabled: bool) -> Self {
        Self {
            code_loading_enabled,
            records: parking_lot::RwLock::new(HashMap::new()),
            registry: parking_lot::RwLock::new(HashMap::new()),
        }
    }

    /// Register a callable implementation under `name`. This is the
    /// supported way to make a procedure invocable.
    pub fn register(&self, name: impl Into<String>, f: Arc<ProcedureFn>) {
        self.registry.write().insert(name.into(), f);
    }

    /// Store procedure metadata (parameter names + body text) for later
    /// export/audit. Does not make the procedure callable by itself.
    pub fn store_metadata(&self, record: ProcedureRecord) {
        self.records.write().insert(record.name.clone(), record);
    }

    pub fn metadata(&self, name: &str) -> Option<ProcedureRecord> {
        self.records.read().get(name).cloned()
    }

    pub fn all_metadata(&self) -> Vec<ProcedureRecord> {
        self.records.read().values().cloned().collect()
    }

    pub fn load_metadata(&self, records: Vec<ProcedureRecord>) {
        *self.records.write() = records.into_iter().map(|r| (r.name.clone(), r)).collect();
    }

    /// Invoke a registered procedure by name.
    pub fn invoke(&self, name: &str, args: &HashMap<String, serde_json::Value>) -> Result<serde_json::Value, MemoryError> {
        let f = self
            .registry
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| MemoryError::ProcedureNotRegistered { name: name.to_string() })?;
        Ok(f(args))
    }

    /// Reconstruct a callable from persisted body text. Always refused
    /// unless `code_loading_enabled` is set; even then this crate carries
    /// no interpreter, so the caller must supply one via `loader`.
    pub fn rehydrate_with(
        &self,
        name: &str,
        loader: impl FnOnce(&ProcedureRecord) -> Arc<ProcedureFn>,
    ) -> Result<(), MemoryError> {
        if !self.code_loading_enabled {
            return Err(MemoryError::CodeLoadingDisabled { name: name.to_string() });
        }
        let record = self
            .records
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| MemoryError::ProcedureNotRegistered { name: name.to_string() })?;
        let f = loader(&record);
        self.registry.write().insert(name.to_string(), f);
        Ok(())
    }

    pub fn code_loading_enabled(&self) -> bool {
        self.code_loading_enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoke_requires_registration() {
        let store = ProceduralStore::new(false);
        let err = store.invoke("missing", &HashMap::new()).unwrap_err();
        assert!(matches!(err, MemoryError::ProcedureNotRegistered { .. }));
    }

    #[test]
    fn registered_procedure_is_invocable() {
        let store = ProceduralStore::new(false);
        store.register("echo", Arc::new(|args: &HashMap<String, serde_json::Value>| {
            serde_json::Value::Object(args.clone().into_iter().collect())
        }));
        let mut args = HashMap::new();
        args.insert("x".to_string(), serde_json::json!(1));
        let result = store.invoke("echo", &args).unwrap();
        assert_eq!(result["x"], serde_json::json!(1));
    }

    #[test]
    fn rehydrate_refused_when_code_loading_disabled() {
        let store = ProceduralStore::new(false);
        store.store_metadata(ProcedureRecord {
            name: "danger".into(),
            param_names: vec![],
            body: "return 1".into(),
        });
        let err = store.rehydrate_with("danger", |_| Arc::new(|_| serde_json::json!(1))).unwrap_err();
        assert!(matches!(err, MemoryError::CodeLoadingDisabled { .. }));
    }

    #[test]
    fn rehydrate_succeeds_when_enabled_and_metadata_present() {
        let store = ProceduralStore::new(true);
        store.store_metadata(ProcedureRecord {
            name: "double".into(),
            param_names: vec!["x".into()],
            body: "return x * 2".into(),
        });
        store.rehydrate_with("double", |_| Arc::new(|_| serde_json::json!(2))).unwrap();
        let result = store.invoke("double", &HashMap::new()).unwrap();
        assert_eq!(result, serde_json::json!(2));
    }
}
