// SPDX-FileCopyrightText: Copyright (c) 2024-2025 Archway Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The configuration agent: a layered key/value view over N providers.
//!
//! Selectors are dotted paths (`a.b.c`) into a JSON tree. Reads consult
//! providers in reverse registration order, then the defaults; writes
//! target the first provider in that order; `all` merges every layer.
//! Concrete backends (files, remote stores) implement [`ConfigProvider`]
//! outside this crate; the in-memory provider here is the reference
//! implementation and the default write target.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde_json::{Map, Value};

/// One configuration layer.
pub trait ConfigProvider: Send + Sync {
    /// Resolve a dotted selector.
    fn lookup(&self, selector: &str) -> Option<Value>;

    /// Set a value, returning the previous one.
    fn set(&self, selector: &str, value: Value) -> Option<Value>;

    /// Merge a flat map of dotted selectors into the layer; returns the
    /// layer's data afterwards.
    fn update(&self, values: &Map<String, Value>) -> Value;

    /// The layer's full data tree.
    fn data(&self) -> Value;
}

#[derive(Default)]
pub struct MemoryProvider {
    root: RwLock<Value>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self {
            root: RwLock::new(Value::Object(Map::new())),
        }
    }

    pub fn with_data(data: Value) -> Self {
        Self {
            root: RwLock::new(data),
        }
    }
}

impl ConfigProvider for MemoryProvider {
    fn lookup(&self, selector: &str) -> Option<Value> {
        lookup_path(&self.root.read().unwrap(), selector).cloned()
    }

    fn set(&self, selector: &str, value: Value) -> Option<Value> {
        set_path(&mut self.root.write().unwrap(), selector, value)
    }

    fn update(&self, values: &Map<String, Value>) -> Value {
        let mut root = self.root.write().unwrap();
        for (selector, value) in values {
            set_path(&mut root, selector, value.clone());
        }
        root.clone()
    }

    fn data(&self) -> Value {
        self.root.read().unwrap().clone()
    }
}

/// The layered store. Providers are consulted newest-first.
pub struct ConfigStore {
    defaults: Value,
    providers: Vec<Arc<dyn ConfigProvider>>,
}

impl ConfigStore {
    pub fn new(defaults: Value, providers: Vec<Arc<dyn ConfigProvider>>) -> Self {
        Self {
            defaults,
            providers,
        }
    }

    fn reverse_providers(&self) -> impl Iterator<Item = &Arc<dyn ConfigProvider>> {
        self.providers.iter().rev()
    }

    pub fn get(&self, selector: &str) -> Option<Value> {
        for provider in self.reverse_providers() {
            if let Some(value) = provider.lookup(selector) {
                return Some(value);
            }
        }
        lookup_path(&self.defaults, selector).cloned()
    }

    /// Set on the first provider (reverse order); no-op without providers.
    pub fn set(&self, selector: &str, value: Value) -> Option<Value> {
        self.reverse_providers()
            .next()
            .and_then(|provider| provider.set(selector, value))
    }

    /// Merge `values` across every provider, newest-first, and return the
    /// merged result.
    pub fn update(&self, values: &Map<String, Value>) -> Value {
        let mut merged = Value::Object(Map::new());
        for provider in self.reverse_providers() {
            merge_into(&mut merged, &provider.update(values));
        }
        merged
    }

    /// Merged snapshot of every layer, defaults included.
    pub fn all(&self) -> Value {
        let mut merged = self.defaults.clone();
        for provider in self.reverse_providers() {
            merge_into(&mut merged, &provider.data());
        }
        merged
    }

    pub fn str_(&self, selector: &str) -> String {
        match self.get(selector) {
            Some(Value::String(s)) => s,
            Some(other) if !other.is_null() => other.to_string(),
            _ => String::new(),
        }
    }

    pub fn int_(&self, selector: &str) -> i64 {
        match self.get(selector) {
            Some(Value::Number(n)) => n.as_i64().unwrap_or_default(),
            Some(Value::String(s)) => s.parse().unwrap_or_default(),
            _ => 0,
        }
    }

    pub fn bool_(&self, selector: &str) -> bool {
        match self.get(selector) {
            Some(Value::Bool(b)) => b,
            Some(Value::String(s)) => archway_truthy(&s),
            Some(Value::Number(n)) => n.as_i64().unwrap_or_default() != 0,
            _ => false,
        }
    }

    pub fn float_(&self, selector: &str) -> f64 {
        match self.get(selector) {
            Some(Value::Number(n)) => n.as_f64().unwrap_or_default(),
            Some(Value::String(s)) => s.parse().unwrap_or_default(),
            _ => 0.0,
        }
    }

    /// Durations accept integer seconds or `"30s"` / `"150ms"` strings.
    pub fn duration(&self, selector: &str) -> Duration {
        match self.get(selector) {
            Some(Value::Number(n)) => Duration::from_secs(n.as_u64().unwrap_or_default()),
            Some(Value::String(s)) => parse_duration(&s).unwrap_or_default(),
            _ => Duration::ZERO,
        }
    }
}

fn archway_truthy(val: &str) -> bool {
    matches!(val.to_lowercase().as_str(), "1" | "true" | "on" | "yes")
}

fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if let Some(ms) = raw.strip_suffix("ms") {
        return ms.parse::<u64>().ok().map(Duration::from_millis);
    }
    if let Some(secs) = raw.strip_suffix('s') {
        return secs.parse::<u64>().ok().map(Duration::from_secs);
    }
    if let Some(mins) = raw.strip_suffix('m') {
        return mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60));
    }
    if let Some(hours) = raw.strip_suffix('h') {
        return hours
            .parse::<u64>()
            .ok()
            .map(|h| Duration::from_secs(h * 3600));
    }
    raw.parse::<u64>().ok().map(Duration::from_secs)
}

pub(crate) fn lookup_path<'a>(root: &'a Value, selector: &str) -> Option<&'a Value> {
    let mut cur = root;
    for part in selector.split('.') {
        cur = cur.get(part)?;
    }
    Some(cur)
}

fn set_path(root: &mut Value, selector: &str, value: Value) -> Option<Value> {
    let mut cur = root;
    let mut parts = selector.split('.').peekable();

    while let Some(part) = parts.next() {
        if !cur.is_object() {
            *cur = Value::Object(Map::new());
        }
        let map = cur.as_object_mut().expect("object ensured above");

        if parts.peek().is_none() {
            return map.insert(part.to_string(), value);
        }
        cur = map
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    None
}

/// Deep-merge `layer` into `target`; objects merge recursively, everything
/// else replaces.
fn merge_into(target: &mut Value, layer: &Value) {
    match (target, layer) {
        (Value::Object(target_map), Value::Object(layer_map)) => {
            for (key, value) in layer_map {
                match target_map.get_mut(key) {
                    Some(existing) => merge_into(existing, value),
                    None => {
                        target_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, layer) => *target = layer.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_with_two_layers() -> ConfigStore {
        let first = Arc::new(MemoryProvider::with_data(json!({
            "db": { "host": "first", "port": 5432 },
            "flag": false,
        })));
        let second = Arc::new(MemoryProvider::with_data(json!({
            "db": { "host": "second" },
            "timeout": "30s",
        })));
        ConfigStore::new(
            json!({ "db": { "host": "default", "name": "app" } }),
            vec![first, second],
        )
    }

    #[test]
    fn test_reads_prefer_latest_provider() {
        let store = store_with_two_layers();
        assert_eq!(store.str_("db.host"), "second");
        assert_eq!(store.int_("db.port"), 5432);
        assert_eq!(store.str_("db.name"), "app");
        assert!(store.get("db.missing").is_none());
    }

    #[test]
    fn test_writes_target_first_provider() {
        let store = store_with_two_layers();
        let old = store.set("timeout", json!("45s"));
        assert_eq!(old, Some(json!("30s")));
        assert_eq!(store.duration("timeout"), Duration::from_secs(45));
    }

    #[test]
    fn test_all_merges_layers() {
        let store = store_with_two_layers();
        let all = store.all();
        assert_eq!(all["db"]["host"], "second");
        assert_eq!(all["db"]["port"], 5432);
        assert_eq!(all["db"]["name"], "app");
        assert_eq!(all["timeout"], "30s");
    }

    #[test]
    fn test_update_merges_across_providers() {
        let store = store_with_two_layers();
        let mut values = Map::new();
        values.insert("db.pool".to_string(), json!(8));
        let merged = store.update(&values);
        assert_eq!(merged["db"]["pool"], 8);
        assert_eq!(store.int_("db.pool"), 8);
    }

    #[test]
    fn test_typed_accessors() {
        let store = ConfigStore::new(
            json!({
                "name": "gw",
                "retries": 3,
                "enabled": "yes",
                "ratio": 0.5,
                "warmup": "150ms",
                "idle": 30,
            }),
            Vec::new(),
        );
        assert_eq!(store.str_("name"), "gw");
        assert_eq!(store.int_("retries"), 3);
        assert!(store.bool_("enabled"));
        assert_eq!(store.float_("ratio"), 0.5);
        assert_eq!(store.duration("warmup"), Duration::from_millis(150));
        assert_eq!(store.duration("idle"), Duration::from_secs(30));
    }

    #[test]
    fn test_set_creates_nested_paths() {
        let provider = MemoryProvider::new();
        assert_eq!(provider.set("a.b.c", json!(1)), None);
        assert_eq!(provider.lookup("a.b.c"), Some(json!(1)));
        assert_eq!(provider.set("a.b.c", json!(2)), Some(json!(1)));
    }
}
