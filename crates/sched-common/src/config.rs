use serde::Deserialize;
use std::env;
use std::path::PathBuf;

use crate::env::CpuBackend;

/// Static knobs for the admission planner and cache sizing, loaded once at
/// process startup the same way `RunnerConfig` was in the teacher runner:
/// an optional YAML file, then individual env var overrides on top.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedConfig {
    /// Total KV slot count backing the radix cache (C1).
    pub kv_slots: usize,
    /// Total table slot count managed by C2.
    pub table_slots: usize,
    /// Per-step token budget `B_t` handed to the admission planner.
    pub token_budget: usize,
    /// Scheduler step interval, in milliseconds.
    pub scheduler_tick_ms: u64,
    /// `CPU_BACKEND` choice.
    pub cpu_backend: CpuBackend,
    /// `CPU_BACKEND_SHADOW`.
    pub cpu_backend_shadow: bool,
    /// `CPU_BACKEND_SHADOW_REPORT` path, when shadow logging is enabled.
    pub cpu_backend_shadow_report: Option<PathBuf>,
    /// `CPU_BACKEND_SHADOW_MAX_DIFFS`.
    pub cpu_backend_shadow_max_diffs: usize,
    /// `CPU_BACKEND_SHADOW_EVERY_N`, must be >= 1.
    pub cpu_backend_shadow_every_n: u32,
    /// `RUNTIME_METRICS`.
    pub runtime_metrics: bool,
    /// `TRANSPORT_LATENCY_STATS`.
    pub transport_latency_stats: bool,
    /// `TYPED_TRANSPORT`.
    pub typed_transport: bool,
    /// `TOKENIZER_BACKEND`, opaque to the core.
    pub tokenizer_backend: Option<String>,
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self {
            kv_slots: 8192,
            table_slots: 256,
            token_budget: 1024,
            scheduler_tick_ms: 2,
            cpu_backend: CpuBackend::RustHotpath,
            cpu_backend_shadow: false,
            cpu_backend_shadow_report: None,
            cpu_backend_shadow_max_diffs: 200,
            cpu_backend_shadow_every_n: 1,
            runtime_metrics: false,
            transport_latency_stats: false,
            typed_transport: false,
            tokenizer_backend: None,
        }
    }
}

impl SchedConfig {
    pub fn load() -> Self {
        if let Ok(path) = env::var("SCHED_CONFIG") {
            let Ok(text) = std::fs::read_to_string(&path) else {
                return Self::default();
            };
            let Ok(cfg) = serde_yaml::from_str::<SchedConfig>(&text) else {
                return Self::default();
            };
            return cfg.with_env_overrides();
        }
        Self::default().with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_usize("SCHED_KV_SLOTS") {
            self.kv_slots = v;
        }
        if let Some(v) = env_usize("SCHED_TABLE_SLOTS") {
            self.table_slots = v;
        }
        if let Some(v) = env_usize("SCHED_TOKEN_BUDGET") {
            self.token_budget = v;
        }
        if let Some(v) = env::var("SCHED_TICK_MS").ok().and_then(|v| v.parse().ok()) {
            self.scheduler_tick_ms = v;
        }
        if let Ok(v) = env::var("CPU_BACKEND") {
            if let Some(b) = CpuBackend::parse(&v) {
                self.cpu_backend = b;
            }
        }
        if let Some(v) = env_bool("CPU_BACKEND_SHADOW") {
            self.cpu_backend_shadow = v;
        }
        if let Ok(v) = env::var("CPU_BACKEND_SHADOW_REPORT") {
            self.cpu_backend_shadow_report = Some(PathBuf::from(v));
        }
        if let Some(v) = env_usize("CPU_BACKEND_SHADOW_MAX_DIFFS") {
            self.cpu_backend_shadow_max_diffs = v;
        }
        if let Some(v) = env::var("CPU_BACKEND_SHADOW_EVERY_N")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.cpu_backend_shadow_every_n = v;
        }
        if let Some(v) = env_bool("RUNTIME_METRICS") {
            self.runtime_metrics = v;
        }
        if let Some(v) = env_bool("TRANSPORT_LATENCY_STATS") {
            self.transport_latency_stats = v;
        }
        if let Some(v) = env_bool("TYPED_TRANSPORT") {
            self.typed_transport = v;
        }
        if let Ok(v) = env::var("TOKENIZER_BACKEND") {
            self.tokenizer_backend = Some(v);
        }
        self
    }
}

fn env_usize(key: &str) -> Option<usize> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    env::var(key).ok().map(|v| {
        let v = v.trim().to_ascii_lowercase();
        matches!(v.as_str(), "1" | "true" | "yes" | "on")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_nonzero_budgets() {
        let cfg = SchedConfig::default();
        assert!(cfg.kv_slots > 0);
        assert!(cfg.table_slots > 0);
        assert!(cfg.token_budget > 0);
        assert_eq!(cfg.cpu_backend_shadow_every_n, 1);
    }
}
