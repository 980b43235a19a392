//! ID/Name Registrar: reserves unique names and ids, and resolves ids by prefix.

use std::{
    collections::{BTreeSet, HashMap},
    sync::RwLock,
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
/// Errors produced by the [`Registrar`].
pub enum RegistrarError {
    #[error("name {0:?} is already reserved")]
    NameInUse(String),

    #[error("name {0:?} is not reserved")]
    NameNotReserved(String),

    #[error("id query must not be empty")]
    EmptyQuery,

    #[error("id {0:?} not found")]
    NotFound(String),

    #[error("id {0:?} is an ambiguous prefix")]
    Ambiguous(String),
}

/// Reserves unique names and ids for sandboxes and containers, and provides a
/// prefix-index lookup from a (possibly partial) id to the full id it
/// identifies. All operations are safe under concurrent callers.
#[derive(Default)]
pub struct Registrar {
    names: RwLock<HashMap<String, String>>,
    ids: RwLock<BTreeSet<String>>,
}

impl Registrar {
    /// Create a new, empty registrar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `name` for `id`. Fails with [`RegistrarError::NameInUse`] if
    /// the name already maps to a *different* id. Reserving the same
    /// (name, id) pair twice is not an error.
    pub fn reserve_name(&self, name: &str, id: &str) -> Result<(), RegistrarError> {
        let mut names = self.names.write().expect("registrar name lock poisoned");
        match names.get(name) {
            Some(existing) if existing != id => Err(RegistrarError::NameInUse(name.to_string())),
            _ => {
                names.insert(name.to_string(), id.to_string());
                Ok(())
            }
        }
    }

    /// Release a previously reserved name. Releasing an unreserved name is a
    /// no-op.
    pub fn release_name(&self, name: &str) {
        self.names.write().expect("registrar name lock poisoned").remove(name);
    }

    /// Look up the id reserved for `name`.
    pub fn lookup_id_by_name(&self, name: &str) -> Result<String, RegistrarError> {
        self.names
            .read()
            .expect("registrar name lock poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| RegistrarError::NameNotReserved(name.to_string()))
    }

    /// Add `id` to the prefix index.
    pub fn index_add(&self, id: &str) {
        self.ids.write().expect("registrar id lock poisoned").insert(id.to_string());
    }

    /// Remove `id` from the prefix index.
    pub fn index_delete(&self, id: &str) {
        self.ids.write().expect("registrar id lock poisoned").remove(id);
    }

    /// Resolve `query` to the single id it identifies: either the full id or
    /// a prefix that uniquely identifies exactly one id.
    pub fn index_get(&self, query: &str) -> Result<String, RegistrarError> {
        if query.is_empty() {
            return Err(RegistrarError::EmptyQuery);
        }
        let ids = self.ids.read().expect("registrar id lock poisoned");
        if ids.contains(query) {
            return Ok(query.to_string());
        }

        let mut matches = ids.range(query.to_string()..).take_while(|id| id.starts_with(query));
        let first = matches.next().cloned();
        let ambiguous = matches.next().is_some();
        match first {
            None => Err(RegistrarError::NotFound(query.to_string())),
            Some(_) if ambiguous => Err(RegistrarError::Ambiguous(query.to_string())),
            Some(id) => Ok(id),
        }
    }
}
