use chrono::{Duration, Utc};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::error::{NudgeError, Result};
use crate::model::{
    ComponentInfo, ComponentSnapshot, Hint, HintMeta, HintValue, Snapshot, now_iso,
    parse_timestamp,
};

pub const SCHEMA_VERSION: &str = "1.0";

pub const DEFAULT_MAX_COMPONENTS: usize = 500;
pub const DEFAULT_MAX_HINTS_PER_COMPONENT: usize = 200;
pub const DEFAULT_MAX_TOTAL_HINTS: usize = 5000;

static ISO_DURATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^PT(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?$").expect("valid regex"));

/// Parse the supported `PT<h>H<m>M<s>S` subset of ISO-8601 durations.
pub fn parse_iso_duration(duration: &str) -> Option<Duration> {
    let caps = ISO_DURATION.captures(duration)?;
    let group = |i: usize| {
        caps.get(i)
            .and_then(|m| m.as_str().parse::<i64>().ok())
            .unwrap_or(0)
    };
    Some(Duration::hours(group(1)) + Duration::minutes(group(2)) + Duration::seconds(group(3)))
}

/// Whether a hint's TTL has elapsed.
///
/// `"session"` never expires. An unparseable duration is deliberately lax:
/// the hint is kept forever instead of poisoning the store, but we log it.
pub fn is_expired(hint: &Hint) -> bool {
    let Some(ttl) = hint.meta.ttl.as_deref() else {
        return false;
    };
    if ttl == "session" {
        return false;
    }
    let Some(duration) = parse_iso_duration(ttl) else {
        warn!(ttl, "unparseable ttl, treating hint as non-expiring");
        return false;
    };
    let Some(created) = parse_timestamp(&hint.created_at) else {
        return false;
    };
    Utc::now() - created > duration
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    #[default]
    Merge,
    Replace,
}

#[derive(Debug, Default)]
struct Component {
    hints: IndexMap<String, Hint>,
}

/// The in-memory hint store.
///
/// Components and hints iterate in insertion order, which is the documented
/// tie-break for ranking. All mutations go through `&mut self`; callers
/// serialize access (the service wraps the store in a mutex).
#[derive(Debug)]
pub struct Store {
    max_components: usize,
    max_hints_per_component: usize,
    max_total_hints: usize,
    session_id: String,
    created_at: String,
    components: IndexMap<String, Component>,
}

impl Default for Store {
    fn default() -> Self {
        Store::new(
            DEFAULT_MAX_COMPONENTS,
            DEFAULT_MAX_HINTS_PER_COMPONENT,
            DEFAULT_MAX_TOTAL_HINTS,
        )
    }
}

impl Store {
    pub fn new(
        max_components: usize,
        max_hints_per_component: usize,
        max_total_hints: usize,
    ) -> Self {
        Store {
            max_components,
            max_hints_per_component,
            max_total_hints,
            session_id: Uuid::new_v4().to_string(),
            created_at: now_iso(),
            components: IndexMap::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn total_hints(&self) -> usize {
        self.components.values().map(|c| c.hints.len()).sum()
    }

    /// Create or update a hint.
    ///
    /// Updates replace the value (and the meta, when provided), bump
    /// `version` and refresh `updated_at`; `created_at` is only ever set at
    /// creation. `if_match_version` enables optimistic concurrency.
    pub fn set(
        &mut self,
        component: &str,
        key: &str,
        value: HintValue,
        meta: Option<HintMeta>,
        if_match_version: Option<u64>,
    ) -> Result<Hint> {
        if component.is_empty() || key.is_empty() {
            return Err(NudgeError::Invalid(
                "component and key must be non-empty".to_string(),
            ));
        }

        if let Some(existing) = self
            .components
            .get_mut(component)
            .and_then(|c| c.hints.get_mut(key))
        {
            if let Some(expected) = if_match_version {
                if existing.version != expected {
                    return Err(NudgeError::Conflict {
                        expected,
                        current: existing.version,
                    });
                }
            }
            existing.value = value;
            if let Some(meta) = meta {
                existing.meta = meta;
            }
            existing.version += 1;
            existing.updated_at = now_iso();
            return Ok(existing.clone());
        }

        // New key: every quota is checked before anything is inserted.
        let component_len = self.components.get(component).map(|c| c.hints.len());
        if component_len.is_none() && self.components.len() >= self.max_components {
            return Err(NudgeError::quota("components", self.max_components));
        }
        if self.total_hints() >= self.max_total_hints {
            return Err(NudgeError::quota("total hints", self.max_total_hints));
        }
        if component_len.unwrap_or(0) >= self.max_hints_per_component {
            return Err(NudgeError::quota(
                "hints per component",
                self.max_hints_per_component,
            ));
        }

        let hint = Hint::new(value, meta.unwrap_or_default());
        self.components
            .entry(component.to_string())
            .or_default()
            .hints
            .insert(key.to_string(), hint.clone());
        Ok(hint)
    }

    /// Pure lookup; never touches counters or TTLs.
    pub fn get(&self, component: &str, key: &str) -> Option<&Hint> {
        self.components.get(component)?.hints.get(key)
    }

    /// Remove a hint, dropping the owning component if it becomes empty.
    pub fn delete(&mut self, component: &str, key: &str) -> (bool, Option<Hint>) {
        let Some(comp) = self.components.get_mut(component) else {
            return (false, None);
        };
        let Some(previous) = comp.hints.shift_remove(key) else {
            return (false, None);
        };
        if comp.hints.is_empty() {
            self.components.shift_remove(component);
        }
        (true, Some(previous))
    }

    /// Record usage: add `delta` to `use_count` and stamp `last_used_at`.
    /// Not an edit, so neither `version` nor `updated_at` move.
    pub fn bump(&mut self, component: &str, key: &str, delta: u64) -> Option<Hint> {
        let hint = self
            .components
            .get_mut(component)?
            .hints
            .get_mut(key)?;
        hint.use_count += delta;
        hint.last_used_at = Some(now_iso());
        Some(hint.clone())
    }

    pub fn list_components(&self) -> Vec<ComponentInfo> {
        self.components
            .iter()
            .map(|(name, comp)| ComponentInfo {
                name: name.clone(),
                hint_count: comp.hints.len(),
            })
            .collect()
    }

    /// All hints as `(component, key, hint)` triples, optionally narrowed to
    /// one component. An unknown component yields nothing.
    pub fn get_all(&self, component: Option<&str>) -> Vec<(String, String, Hint)> {
        let mut results = Vec::new();
        for (name, comp) in &self.components {
            if component.is_some_and(|c| c != name) {
                continue;
            }
            for (key, hint) in &comp.hints {
                results.push((name.clone(), key.clone(), hint.clone()));
            }
        }
        results
    }

    /// Structural copy of the whole tree for serialization.
    pub fn export(&self) -> Snapshot {
        Snapshot {
            schema_version: SCHEMA_VERSION.to_string(),
            session_id: self.session_id.clone(),
            created_at: self.created_at.clone(),
            components: self
                .components
                .iter()
                .map(|(name, comp)| {
                    (
                        name.clone(),
                        ComponentSnapshot {
                            hints: comp.hints.clone(),
                        },
                    )
                })
                .collect(),
        }
    }

    /// Install hints from a snapshot payload.
    ///
    /// `replace` clears the tree first; `merge` keeps existing entries and
    /// counts the incoming duplicates as skipped. Records that fail to
    /// deserialize are skipped, never fatal; only a wrong `schema_version`
    /// rejects the payload.
    pub fn import(&mut self, payload: &Value, mode: ImportMode) -> Result<(usize, usize)> {
        let schema_version = payload.get("schema_version").and_then(Value::as_str);
        if schema_version != Some(SCHEMA_VERSION) {
            return Err(NudgeError::Invalid(format!(
                "Unsupported schema version: {}",
                schema_version.unwrap_or("none")
            )));
        }

        if mode == ImportMode::Replace {
            self.components.clear();
        }

        let mut imported = 0;
        let mut skipped = 0;
        let components = payload
            .get("components")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        for (comp_name, comp_data) in components {
            let hints = comp_data
                .get("hints")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            for (key, record) in hints {
                if mode == ImportMode::Merge && self.get(&comp_name, &key).is_some() {
                    skipped += 1;
                    continue;
                }
                match serde_json::from_value::<Hint>(record) {
                    Ok(hint) => {
                        self.components
                            .entry(comp_name.clone())
                            .or_default()
                            .hints
                            .insert(key, hint);
                        imported += 1;
                    }
                    Err(err) => {
                        warn!(component = %comp_name, key = %key, %err, "skipping malformed record");
                        skipped += 1;
                    }
                }
            }
        }
        Ok((imported, skipped))
    }

    /// Delete every hint whose TTL has elapsed; empty components go with
    /// them. Returns the eviction count.
    pub fn evict_expired(&mut self) -> usize {
        let mut evicted = 0;
        for comp in self.components.values_mut() {
            let before = comp.hints.len();
            comp.hints.retain(|_, hint| !is_expired(hint));
            evicted += before - comp.hints.len();
        }
        self.components.retain(|_, comp| !comp.hints.is_empty());
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Scope;
    use serde_json::json;

    fn text(value: &str) -> HintValue {
        HintValue::from(value)
    }

    #[test]
    fn set_and_get() {
        let mut store = Store::default();
        let hint = store
            .set("test-component", "test-key", text("test value"), None, None)
            .unwrap();
        assert_eq!(hint.value, text("test value"));
        assert_eq!(hint.version, 1);
        assert_eq!(hint.use_count, 0);

        let retrieved = store.get("test-component", "test-key").unwrap();
        assert_eq!(retrieved.value, text("test value"));
        assert_eq!(retrieved.version, 1);
    }

    #[test]
    fn update_increments_version_and_keeps_created_at() {
        let mut store = Store::default();
        let first = store.set("comp", "key", text("value1"), None, None).unwrap();
        let second = store.set("comp", "key", text("value2"), None, None).unwrap();
        let third = store.set("comp", "key", text("value3"), None, None).unwrap();

        assert_eq!(second.value, text("value2"));
        assert_eq!(second.version, 2);
        assert_eq!(third.version, 3);
        assert_eq!(third.created_at, first.created_at);
    }

    #[test]
    fn version_conflict_leaves_store_untouched() {
        let mut store = Store::default();
        store.set("comp", "key", text("value1"), None, None).unwrap();

        let err = store
            .set("comp", "key", text("value2"), None, Some(5))
            .unwrap_err();
        assert!(matches!(
            err,
            NudgeError::Conflict {
                expected: 5,
                current: 1
            }
        ));

        let stored = store.get("comp", "key").unwrap();
        assert_eq!(stored.value, text("value1"));
        assert_eq!(stored.version, 1);
    }

    #[test]
    fn matching_version_updates() {
        let mut store = Store::default();
        store.set("comp", "key", text("value1"), None, None).unwrap();
        let updated = store
            .set("comp", "key", text("value2"), None, Some(1))
            .unwrap();
        assert_eq!(updated.version, 2);
    }

    #[test]
    fn empty_identifiers_are_invalid() {
        let mut store = Store::default();
        assert!(matches!(
            store.set("", "key", text("v"), None, None),
            Err(NudgeError::Invalid(_))
        ));
        assert!(matches!(
            store.set("comp", "", text("v"), None, None),
            Err(NudgeError::Invalid(_))
        ));
    }

    #[test]
    fn delete_removes_hint_and_empty_component() {
        let mut store = Store::default();
        store.set("comp", "key", text("value"), None, None).unwrap();

        let (deleted, previous) = store.delete("comp", "key");
        assert!(deleted);
        assert_eq!(previous.unwrap().value, text("value"));
        assert!(store.get("comp", "key").is_none());
        assert!(store.list_components().is_empty());

        let (deleted, previous) = store.delete("comp", "key");
        assert!(!deleted);
        assert!(previous.is_none());
    }

    #[test]
    fn bump_accumulates_without_editing() {
        let mut store = Store::default();
        let created = store.set("comp", "key", text("value"), None, None).unwrap();

        let bumped = store.bump("comp", "key", 1).unwrap();
        assert_eq!(bumped.use_count, 1);
        assert!(bumped.last_used_at.is_some());

        let bumped = store.bump("comp", "key", 2).unwrap();
        assert_eq!(bumped.use_count, 3);
        assert_eq!(bumped.version, 1);
        assert_eq!(bumped.updated_at, created.updated_at);

        assert!(store.bump("comp", "missing", 1).is_none());
    }

    #[test]
    fn list_components_reports_counts() {
        let mut store = Store::default();
        store.set("comp1", "key1", text("v"), None, None).unwrap();
        store.set("comp1", "key2", text("v"), None, None).unwrap();
        store.set("comp2", "key1", text("v"), None, None).unwrap();

        let components = store.list_components();
        assert_eq!(components.len(), 2);
        assert!(components
            .iter()
            .any(|c| c.name == "comp1" && c.hint_count == 2));
        assert!(components
            .iter()
            .any(|c| c.name == "comp2" && c.hint_count == 1));
    }

    #[test]
    fn get_all_with_unknown_component_is_empty() {
        let mut store = Store::default();
        store.set("comp", "key", text("v"), None, None).unwrap();
        assert_eq!(store.get_all(Some("other")).len(), 0);
        assert_eq!(store.get_all(Some("comp")).len(), 1);
        assert_eq!(store.get_all(None).len(), 1);
    }

    #[test]
    fn per_component_quota() {
        let mut store = Store::new(10, 2, 100);
        store.set("c", "k1", text("v"), None, None).unwrap();
        store.set("c", "k2", text("v"), None, None).unwrap();

        let err = store.set("c", "k3", text("v"), None, None).unwrap_err();
        assert!(matches!(err, NudgeError::Quota { limit: 2, .. }));
        assert_eq!(err.data()["limit"], 2);

        // Updates to existing keys are unaffected by the quota.
        let updated = store.set("c", "k1", text("v2"), None, None).unwrap();
        assert_eq!(updated.version, 2);
    }

    #[test]
    fn component_quota() {
        let mut store = Store::new(2, 10, 100);
        store.set("c1", "k", text("v"), None, None).unwrap();
        store.set("c2", "k", text("v"), None, None).unwrap();
        let err = store.set("c3", "k", text("v"), None, None).unwrap_err();
        assert!(matches!(err, NudgeError::Quota { limit: 2, .. }));
    }

    #[test]
    fn total_hint_quota() {
        let mut store = Store::new(10, 10, 3);
        store.set("c1", "k1", text("v"), None, None).unwrap();
        store.set("c1", "k2", text("v"), None, None).unwrap();
        store.set("c2", "k1", text("v"), None, None).unwrap();
        let err = store.set("c2", "k2", text("v"), None, None).unwrap_err();
        assert!(matches!(err, NudgeError::Quota { limit: 3, .. }));
    }

    #[test]
    fn iso_duration_parsing() {
        assert_eq!(parse_iso_duration("PT2H"), Some(Duration::hours(2)));
        assert_eq!(parse_iso_duration("PT30M"), Some(Duration::minutes(30)));
        assert_eq!(
            parse_iso_duration("PT1H30M15S"),
            Some(Duration::seconds(5415))
        );
        assert!(parse_iso_duration("P1D").is_none());
        assert!(parse_iso_duration("2 hours").is_none());
    }

    #[test]
    fn ttl_expiry() {
        let mut hint = Hint::new(
            text("v"),
            HintMeta {
                ttl: Some("PT1S".into()),
                ..Default::default()
            },
        );
        hint.created_at = (Utc::now() - Duration::seconds(5)).to_rfc3339();
        assert!(is_expired(&hint));

        hint.meta.ttl = Some("session".into());
        assert!(!is_expired(&hint));

        // Lax fallback: unparseable durations never expire.
        hint.meta.ttl = Some("forever".into());
        assert!(!is_expired(&hint));

        hint.meta.ttl = None;
        assert!(!is_expired(&hint));
    }

    #[test]
    fn evict_expired_drops_hints_and_empty_components() {
        let mut store = Store::default();
        let snapshot = json!({
            "schema_version": "1.0",
            "session_id": "s",
            "created_at": "2020-01-01T00:00:00Z",
            "components": {
                "stale": {"hints": {"k": {
                    "value": "old",
                    "meta": {"ttl": "PT1S"},
                    "version": 1,
                    "created_at": "2020-01-01T00:00:00Z",
                    "updated_at": "2020-01-01T00:00:00Z",
                    "use_count": 0
                }}}
            }
        });
        store.import(&snapshot, ImportMode::Merge).unwrap();
        store.set("fresh", "k", text("v"), None, None).unwrap();

        assert_eq!(store.evict_expired(), 1);
        assert!(store.get("stale", "k").is_none());
        let components = store.list_components();
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].name, "fresh");
    }

    #[test]
    fn export_import_roundtrip_is_identity() {
        let mut store = Store::default();
        store
            .set(
                "build",
                "cmd",
                text("docker compose build router"),
                Some(HintMeta {
                    tags: Some(vec!["build".into()]),
                    priority: Some(8),
                    scope: Some(Scope {
                        branch: Some(vec!["main".into()]),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                None,
            )
            .unwrap();
        store.set("dev", "srv", text("make run"), None, None).unwrap();
        store.bump("build", "cmd", 2).unwrap();

        let payload = serde_json::to_value(store.export()).unwrap();

        let mut restored = Store::default();
        let (imported, skipped) = restored.import(&payload, ImportMode::Merge).unwrap();
        assert_eq!(imported, 2);
        assert_eq!(skipped, 0);

        // Full reconstruction, meta and scope included.
        let hint = restored.get("build", "cmd").unwrap();
        assert_eq!(hint.meta.priority, Some(8));
        assert_eq!(
            hint.meta.scope.as_ref().unwrap().branch,
            Some(vec!["main".to_string()])
        );
        assert_eq!(hint.use_count, 2);
        assert!(hint.last_used_at.is_some());

        assert_eq!(
            serde_json::to_value(restored.export()).unwrap()["components"],
            payload["components"]
        );
    }

    #[test]
    fn import_merge_skips_existing_and_replace_clears() {
        let mut store = Store::default();
        store.set("c", "k", text("local"), None, None).unwrap();

        let payload = json!({
            "schema_version": "1.0",
            "session_id": "s",
            "created_at": "2026-01-01T00:00:00Z",
            "components": {
                "c": {"hints": {"k": {"value": "incoming", "version": 3,
                    "created_at": "2026-01-01T00:00:00Z",
                    "updated_at": "2026-01-01T00:00:00Z", "use_count": 0}}},
                "other": {"hints": {"k2": {"value": "new", "version": 1,
                    "created_at": "2026-01-01T00:00:00Z",
                    "updated_at": "2026-01-01T00:00:00Z", "use_count": 0}}}
            }
        });

        let (imported, skipped) = store.import(&payload, ImportMode::Merge).unwrap();
        assert_eq!((imported, skipped), (1, 1));
        assert_eq!(store.get("c", "k").unwrap().value, text("local"));
        assert_eq!(store.get("other", "k2").unwrap().value, text("new"));

        let (imported, _) = store.import(&payload, ImportMode::Replace).unwrap();
        assert_eq!(imported, 2);
        assert_eq!(store.get("c", "k").unwrap().value, text("incoming"));
    }

    #[test]
    fn import_rejects_wrong_schema_version() {
        let mut store = Store::default();
        let payload = json!({"schema_version": "2.0", "components": {}});
        let err = store.import(&payload, ImportMode::Merge).unwrap_err();
        assert!(matches!(err, NudgeError::Invalid(_)));
        assert_eq!(err.code().as_i64(), 40001);
    }

    #[test]
    fn import_skips_malformed_records() {
        let mut store = Store::default();
        let payload = json!({
            "schema_version": "1.0",
            "components": {
                "c": {"hints": {
                    "good": {"value": "ok"},
                    "bad": {"value": {"type": "command"}}
                }}
            }
        });
        let (imported, skipped) = store.import(&payload, ImportMode::Merge).unwrap();
        assert_eq!((imported, skipped), (1, 1));
        // Missing bookkeeping fields default sensibly.
        let hint = store.get("c", "good").unwrap();
        assert_eq!(hint.version, 1);
        assert_eq!(hint.use_count, 0);
    }
}
