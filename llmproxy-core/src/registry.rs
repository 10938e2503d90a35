use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::error::ProxyError;
use crate::provider::ProviderAdapter;
use crate::provider_factory::build_adapter;

/// How long a probe result is trusted before the next health check re-runs
/// it. Bounds outbound probe traffic under repeated health-endpoint polling.
const HEALTH_CACHE_TTL: Duration = Duration::from_secs(5);
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

pub struct Entry {
    pub adapter: Arc<dyn ProviderAdapter>,
    pub priority: i64,
    in_flight: AtomicI64,
}

impl Entry {
    pub fn in_flight(&self) -> i64 {
        self.in_flight.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Copy)]
struct HealthState {
    healthy: bool,
    checked_at: Instant,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthSnapshot {
    pub name: String,
    pub healthy: bool,
}

/// Indexed, health-aware view of the adapters enabled by configuration.
/// Built once at startup; the adapter set never changes afterward.
pub struct Registry {
    entries: Vec<Entry>,
    cursor: AtomicUsize,
    health: RwLock<HashMap<String, HealthState>>,
}

impl Registry {
    /// Build from configuration. Adapters that fail to initialize are
    /// logged at WARN and skipped; if none remain, startup fails.
    pub fn from_config(cfg: &Config) -> Result<Self, ProxyError> {
        let mut entries = Vec::new();
        for spec in &cfg.providers {
            if !spec.enabled {
                continue;
            }
            match build_adapter(spec) {
                Ok(adapter) => entries.push(Entry {
                    adapter,
                    priority: spec.priority,
                    in_flight: AtomicI64::new(0),
                }),
                Err(ProxyError::AdapterInit { name, reason }) => {
                    tracing::warn!(provider = %name, reason = %reason, "adapter failed to initialize, skipping");
                }
                Err(other) => return Err(other),
            }
        }
        if entries.is_empty() {
            return Err(ProxyError::Config("no providers configured".to_string()));
        }
        Ok(Registry {
            entries,
            cursor: AtomicUsize::new(0),
            health: RwLock::new(HashMap::new()),
        })
    }

    /// Build a registry directly from adapters, bypassing configuration.
    /// Used by handler/server tests that need deterministic stub adapters.
    #[cfg(test)]
    pub fn from_adapters(adapters: Vec<(Arc<dyn ProviderAdapter>, i64)>) -> Self {
        let entries = adapters
            .into_iter()
            .map(|(adapter, priority)| Entry { adapter, priority, in_flight: AtomicI64::new(0) })
            .collect();
        Registry {
            entries,
            cursor: AtomicUsize::new(0),
            health: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn advance_cursor(&self) -> usize {
        self.cursor.fetch_add(1, Ordering::Relaxed) % self.entries.len().max(1)
    }

    pub fn incr_in_flight(&self, idx: usize) {
        self.entries[idx].in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decr_in_flight(&self, idx: usize) {
        self.entries[idx].in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    /// Is `name` currently marked unhealthy by the cache? Unknown names (not
    /// probed yet) are treated as healthy — health is advisory, not a gate.
    pub fn is_unhealthy(&self, name: &str) -> bool {
        let cache = self.health.read().unwrap();
        matches!(cache.get(name), Some(state) if !state.healthy)
    }

    /// Refresh any stale cache entries and return a health snapshot for
    /// every adapter.
    pub async fn snapshot_health(&self) -> Vec<HealthSnapshot> {
        let mut stale = Vec::new();
        {
            let cache = self.health.read().unwrap();
            for entry in &self.entries {
                let name = entry.adapter.name();
                let needs_probe = match cache.get(name) {
                    Some(state) => state.checked_at.elapsed() >= HEALTH_CACHE_TTL,
                    None => true,
                };
                if needs_probe {
                    stale.push(name.to_string());
                }
            }
        }
        for name in stale {
            if let Some(entry) = self.entries.iter().find(|e| e.adapter.name() == name) {
                let healthy = entry.adapter.probe(PROBE_TIMEOUT).await;
                self.health.write().unwrap().insert(
                    name,
                    HealthState { healthy, checked_at: Instant::now() },
                );
            }
        }
        let cache = self.health.read().unwrap();
        self.entries
            .iter()
            .map(|e| HealthSnapshot {
                name: e.adapter.name().to_string(),
                healthy: cache.get(e.adapter.name()).map(|s| s.healthy).unwrap_or(true),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProviderSpec, RoutingCfg};
    use std::collections::BTreeMap;

    fn cfg_with(specs: Vec<ProviderSpec>) -> Config {
        Config {
            host: "0.0.0.0".into(),
            port: 8080,
            providers: specs,
            routing: RoutingCfg::default(),
            http: Default::default(),
        }
    }

    fn local_spec(name: &str, priority: i64) -> ProviderSpec {
        ProviderSpec {
            name: name.to_string(),
            kind: "local".to_string(),
            enabled: true,
            priority,
            settings: BTreeMap::new(),
        }
    }

    #[test]
    fn zero_adapters_is_fatal() {
        let cfg = cfg_with(vec![]);
        let err = Registry::from_config(&cfg).unwrap_err();
        match err {
            ProxyError::Config(_) => {}
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn disabled_adapters_are_skipped_without_failing() {
        let mut spec = local_spec("disabled-1", 1);
        spec.enabled = false;
        let cfg = cfg_with(vec![spec, local_spec("enabled-1", 1)]);
        let reg = Registry::from_config(&cfg).unwrap();
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.entries()[0].adapter.name(), "enabled-1");
    }

    #[test]
    fn unknown_kind_is_fatal_even_alongside_good_adapters() {
        // An unknown provider kind is a config-invalid error, not a
        // per-adapter init failure — it aborts the whole build rather than
        // being skipped, unlike a single adapter failing to initialize.
        let mut bad = local_spec("bad-1", 1);
        bad.kind = "unknown-kind".to_string();
        let cfg = cfg_with(vec![bad, local_spec("good-1", 1)]);
        let err = Registry::from_config(&cfg).unwrap_err();
        match err {
            ProxyError::Config(_) => {}
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn in_flight_counters_start_at_zero_and_balance() {
        let cfg = cfg_with(vec![local_spec("a", 1)]);
        let reg = Registry::from_config(&cfg).unwrap();
        assert_eq!(reg.entries()[0].in_flight(), 0);
        reg.incr_in_flight(0);
        assert_eq!(reg.entries()[0].in_flight(), 1);
        reg.decr_in_flight(0);
        assert_eq!(reg.entries()[0].in_flight(), 0);
    }

    #[test]
    fn cursor_advances_and_wraps() {
        let cfg = cfg_with(vec![local_spec("a", 1), local_spec("b", 1)]);
        let reg = Registry::from_config(&cfg).unwrap();
        assert_eq!(reg.advance_cursor(), 0);
        assert_eq!(reg.advance_cursor(), 1);
        assert_eq!(reg.advance_cursor(), 0);
    }

    #[test]
    fn unknown_adapter_name_is_treated_as_healthy() {
        let cfg = cfg_with(vec![local_spec("a", 1)]);
        let reg = Registry::from_config(&cfg).unwrap();
        assert!(!reg.is_unhealthy("a"));
    }

    #[tokio::test]
    async fn snapshot_health_reports_every_entry() {
        let cfg = cfg_with(vec![local_spec("a", 1), local_spec("b", 2)]);
        let reg = Registry::from_config(&cfg).unwrap();
        let snap = reg.snapshot_health().await;
        assert_eq!(snap.len(), 2);
    }
}
