//! Process-wide environment-flag registry (§6, §9 "Global mutable state").
//!
//! Kept behind a small struct rather than scattered `std::env::var` calls so
//! tests can substitute a fresh instance instead of depending on real process
//! environment.

use once_cell::sync::OnceCell;
use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuBackend {
    Python,
    RustHotpath,
}

impl CpuBackend {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "python" => Some(Self::Python),
            "rust_hotpath" => Some(Self::RustHotpath),
            _ => None,
        }
    }
}

/// Snapshot of the §6 environment flags. Constructed once from the real
/// process environment via [`EnvFlags::global`], or freely via
/// [`EnvFlags::from_env_like`] in tests.
#[derive(Debug, Clone)]
pub struct EnvFlags {
    pub typed_transport: bool,
    pub cpu_backend: CpuBackend,
    pub cpu_backend_shadow: bool,
    pub cpu_backend_shadow_every_n: u32,
    pub runtime_metrics: bool,
    pub transport_latency_stats: bool,
}

impl Default for EnvFlags {
    fn default() -> Self {
        Self {
            typed_transport: false,
            cpu_backend: CpuBackend::RustHotpath,
            cpu_backend_shadow: false,
            cpu_backend_shadow_every_n: 1,
            runtime_metrics: false,
            transport_latency_stats: false,
        }
    }
}

impl EnvFlags {
    pub fn from_process_env() -> Self {
        let mut flags = Self::default();
        if let Ok(v) = env::var("TYPED_TRANSPORT") {
            flags.typed_transport = truthy(&v);
        }
        if let Ok(v) = env::var("CPU_BACKEND") {
            if let Some(b) = CpuBackend::parse(&v) {
                flags.cpu_backend = b;
            }
        }
        if let Ok(v) = env::var("CPU_BACKEND_SHADOW") {
            flags.cpu_backend_shadow = truthy(&v);
        }
        if let Ok(v) = env::var("CPU_BACKEND_SHADOW_EVERY_N") {
            if let Ok(n) = v.parse() {
                flags.cpu_backend_shadow_every_n = n;
            }
        }
        if let Ok(v) = env::var("RUNTIME_METRICS") {
            flags.runtime_metrics = truthy(&v);
        }
        if let Ok(v) = env::var("TRANSPORT_LATENCY_STATS") {
            flags.transport_latency_stats = truthy(&v);
        }
        flags
    }
}

fn truthy(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

static GLOBAL: OnceCell<EnvFlags> = OnceCell::new();

/// The process-wide singleton, initialized lazily from the real environment
/// on first access.
pub fn global() -> &'static EnvFlags {
    GLOBAL.get_or_init(EnvFlags::from_process_env)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_flags_are_all_off() {
        let flags = EnvFlags::default();
        assert!(!flags.typed_transport);
        assert!(!flags.cpu_backend_shadow);
        assert_eq!(flags.cpu_backend_shadow_every_n, 1);
    }

    #[test]
    fn cpu_backend_parses_known_values() {
        assert_eq!(CpuBackend::parse("python"), Some(CpuBackend::Python));
        assert_eq!(CpuBackend::parse("rust_hotpath"), Some(CpuBackend::RustHotpath));
        assert_eq!(CpuBackend::parse("bogus"), None);
    }
}
