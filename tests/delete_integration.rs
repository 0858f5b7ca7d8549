// Driver-level integration tests for bulk deletion.
use std::cell::RefCell;
use std::collections::BTreeMap;

use serde_json::{Value, json};

use dsadmin::core::delete::{KeyStore, delete_all};
use dsadmin::core::error::Error;

struct FakeStore {
    // namespace -> kind -> key count
    data: BTreeMap<String, BTreeMap<String, usize>>,
    deletes: RefCell<Vec<usize>>,
}

impl FakeStore {
    fn new(data: &[(&str, &[(&str, usize)])]) -> Self {
        let data = data
            .iter()
            .map(|(namespace, kinds)| {
                (
                    namespace.to_string(),
                    kinds
                        .iter()
                        .map(|(kind, count)| (kind.to_string(), *count))
                        .collect(),
                )
            })
            .collect();
        Self {
            data,
            deletes: RefCell::new(Vec::new()),
        }
    }
}

impl KeyStore for FakeStore {
    fn namespaces(&self) -> Result<Vec<String>, Error> {
        Ok(self.data.keys().cloned().collect())
    }

    fn kinds(&self, namespace: &str) -> Result<Vec<String>, Error> {
        Ok(self
            .data
            .get(namespace)
            .map(|kinds| kinds.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn keys_of_kind(&self, kind: &str, namespace: &str) -> Result<Vec<Value>, Error> {
        let count = self
            .data
            .get(namespace)
            .and_then(|kinds| kinds.get(kind))
            .copied()
            .unwrap_or(0);
        Ok((0..count)
            .map(|n| json!({ "path": [{ "kind": kind, "id": n.to_string() }] }))
            .collect())
    }

    fn delete_keys(&self, keys: &[Value]) -> Result<(), Error> {
        self.deletes.borrow_mut().push(keys.len());
        Ok(())
    }
}

#[test]
fn clears_every_kind_across_namespaces_in_chunks() {
    let store = FakeStore::new(&[
        ("", &[("Widget", 1200), ("Gadget", 3)]),
        ("staging", &[("Widget", 500)]),
    ]);
    let namespaces = store.namespaces().expect("namespaces");
    let mut visited = Vec::new();
    let outcome = delete_all(&store, &namespaces, None, |namespace, kind, count| {
        visited.push((namespace.to_string(), kind.to_string(), count));
    })
    .expect("delete");

    assert_eq!(outcome.kinds_cleared, 3);
    assert_eq!(outcome.keys_deleted, 1703);
    assert_eq!(*store.deletes.borrow(), [3, 500, 500, 200, 500]);
    assert_eq!(
        visited,
        [
            ("".to_string(), "Gadget".to_string(), 3),
            ("".to_string(), "Widget".to_string(), 1200),
            ("staging".to_string(), "Widget".to_string(), 500),
        ]
    );
}

#[test]
fn explicit_kind_list_limits_the_sweep() {
    let store = FakeStore::new(&[("", &[("Widget", 10), ("Gadget", 10)])]);
    let namespaces = [String::new()];
    let kinds = ["Widget".to_string()];
    let outcome = delete_all(&store, &namespaces, Some(&kinds), |_, _, _| {}).expect("delete");
    assert_eq!(outcome.kinds_cleared, 1);
    assert_eq!(outcome.keys_deleted, 10);
}

#[test]
fn reserved_kinds_never_reach_deletion() {
    let store = FakeStore::new(&[("", &[("__kind__", 5), ("Widget", 1)])]);
    let namespaces = [String::new()];
    let outcome = delete_all(&store, &namespaces, None, |_, _, _| {}).expect("delete");
    assert_eq!(outcome.kinds_cleared, 1);
    assert_eq!(outcome.keys_deleted, 1);
    assert_eq!(*store.deletes.borrow(), [1]);
}
