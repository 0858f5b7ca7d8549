//! Purpose: Bulk-deletion driver over namespaces and kinds.
//! Exports: `KeyStore`, `DeleteOutcome`, `delete_all`, `is_reserved_kind`.
//! Role: Key-only fetch per kind, then chunked multi-key deletes.
//! Invariants: Delete requests never exceed `DELETE_CHUNK_SIZE` keys.
//! Invariants: Reserved metadata kinds (`__...__`) are never deleted.
use serde_json::Value;

use crate::core::error::Error;

pub const DELETE_CHUNK_SIZE: usize = 500;

/// Collaborator surface for `delete-all`: namespace/kind discovery, key-only
/// queries, and multi-key deletion. Keys stay opaque wire values so they can
/// be echoed back into delete mutations untouched.
pub trait KeyStore {
    fn namespaces(&self) -> Result<Vec<String>, Error>;
    fn kinds(&self, namespace: &str) -> Result<Vec<String>, Error>;
    fn keys_of_kind(&self, kind: &str, namespace: &str) -> Result<Vec<Value>, Error>;
    fn delete_keys(&self, keys: &[Value]) -> Result<(), Error>;
}

/// Datastore metadata pseudo-kinds (`__kind__`, `__namespace__`, ...).
pub fn is_reserved_kind(name: &str) -> bool {
    name.starts_with("__") && name.ends_with("__")
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DeleteOutcome {
    pub kinds_cleared: u64,
    pub keys_deleted: u64,
}

/// Delete every entity of the given kinds in the given namespaces. When
/// `kinds` is `None` the kind list is discovered per namespace. `on_kind`
/// fires before each kind's deletion with its key count.
pub fn delete_all<S, P>(
    store: &S,
    namespaces: &[String],
    kinds: Option<&[String]>,
    mut on_kind: P,
) -> Result<DeleteOutcome, Error>
where
    S: KeyStore + ?Sized,
    P: FnMut(&str, &str, u64),
{
    let mut outcome = DeleteOutcome::default();
    for namespace in namespaces {
        let discovered;
        let kind_list: &[String] = match kinds {
            Some(kinds) => kinds,
            None => {
                discovered = store.kinds(namespace)?;
                &discovered
            }
        };
        for kind in kind_list {
            if is_reserved_kind(kind) {
                continue;
            }
            let keys = store.keys_of_kind(kind, namespace)?;
            on_kind(namespace, kind, keys.len() as u64);
            for chunk in keys.chunks(DELETE_CHUNK_SIZE) {
                store.delete_keys(chunk)?;
            }
            outcome.kinds_cleared += 1;
            outcome.keys_deleted += keys.len() as u64;
        }
    }
    Ok(outcome)
}
