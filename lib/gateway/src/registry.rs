// SPDX-FileCopyrightText: Copyright (c) 2024-2025 Archway Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Typed name-to-constructor table for pluggable products.
//!
//! Used by the discovery coordinator to hold provider constructors, but
//! generic over the product so other plug-in points can reuse it.
//! Registration is last-wins: re-registering a name replaces the previous
//! constructor. Reads vastly outnumber writes, so the table sits behind a
//! reader-preferring lock and supports registration at runtime.

use std::sync::{Arc, RwLock};

/// A constructor for the registered product.
pub type Ctor<T> = Arc<dyn Fn() -> T + Send + Sync>;

pub struct Registry<T> {
    entries: RwLock<Vec<(String, Ctor<T>)>>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `ctor` under `name`, replacing any previous registration.
    pub fn register(&self, name: impl Into<String>, ctor: impl Fn() -> T + Send + Sync + 'static) {
        let name = name.into();
        let ctor: Ctor<T> = Arc::new(ctor);
        let mut entries = self.entries.write().unwrap();
        if let Some(entry) = entries.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = ctor;
        } else {
            entries.push((name, ctor));
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Ctor<T>> {
        let entries = self.entries.read().unwrap();
        entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, ctor)| Arc::clone(ctor))
    }

    /// Visit every entry in registration order.
    pub fn range(&self, mut visit: impl FnMut(&str, &Ctor<T>)) {
        let entries = self.entries.read().unwrap();
        for (name, ctor) in entries.iter() {
            visit(name, ctor);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let registry: Registry<u32> = Registry::new();
        registry.register("one", || 1);
        registry.register("two", || 2);

        assert_eq!(registry.lookup("one").map(|ctor| ctor()), Some(1));
        assert_eq!(registry.lookup("two").map(|ctor| ctor()), Some(2));
        assert!(registry.lookup("three").is_none());
    }

    #[test]
    fn test_last_registration_wins() {
        let registry: Registry<&'static str> = Registry::new();
        registry.register("provider", || "first");
        registry.register("provider", || "second");

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("provider").map(|ctor| ctor()), Some("second"));
    }

    #[test]
    fn test_range_preserves_order() {
        let registry: Registry<i32> = Registry::new();
        registry.register("a", || 1);
        registry.register("b", || 2);
        registry.register("c", || 3);

        let mut seen = Vec::new();
        registry.range(|name, ctor| seen.push((name.to_string(), ctor())));
        assert_eq!(
            seen,
            vec![
                ("a".to_string(), 1),
                ("b".to_string(), 2),
                ("c".to_string(), 3)
            ]
        );
    }
}
