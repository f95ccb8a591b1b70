// src/config/pipeline.rs
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::gate::{QualityGate, DEFAULT_MIN_CONFIDENCE};
use crate::pipeline::RunSettings;
use crate::publish::retry::RetryPolicy;

/// Tunables read from the environment. Unparseable values fall back to the
/// default with a warning; out-of-range values are clamped.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub min_confidence: u8,
    pub dedup_window_days: i64,
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_jitter_ms: u64,
    pub credential_safety_margin_secs: i64,
    pub fetch_hours_back: i64,
    pub fetch_concurrency: usize,
    pub source_timeout_secs: u64,
    pub capability_timeout_secs: u64,
    pub publish_timeout_secs: u64,
    pub max_revisions: u32,
    pub state_dir: PathBuf,
    pub dry_run: bool,
    /// Background trigger period; `None` disables the scheduler.
    pub schedule_interval_secs: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            dedup_window_days: crate::dedup::DEFAULT_WINDOW_DAYS,
            retry_max_attempts: crate::publish::retry::DEFAULT_MAX_ATTEMPTS,
            retry_base_delay_ms: 1000,
            retry_jitter_ms: 0,
            credential_safety_margin_secs: crate::publish::DEFAULT_SAFETY_MARGIN_SECS,
            fetch_hours_back: crate::pipeline::DEFAULT_HOURS_BACK,
            fetch_concurrency: crate::ingest::DEFAULT_FETCH_CONCURRENCY,
            source_timeout_secs: 15,
            capability_timeout_secs: 120,
            publish_timeout_secs: 60,
            max_revisions: 0,
            state_dir: PathBuf::from("state"),
            dry_run: false,
            schedule_interval_secs: None,
        }
    }
}

fn parsed<T: FromStr + Copy>(lookup: &dyn Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        None => default,
        Some(raw) if raw.trim().is_empty() => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "invalid config value; using default");
            default
        }),
    }
}

fn flag(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> bool {
    lookup(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let l: &dyn Fn(&str) -> Option<String> = &lookup;
        let d = Self::default();

        let min_confidence: u32 = parsed(l, "MIN_CONFIDENCE", u32::from(d.min_confidence));
        let interval: u64 = parsed(l, "SCHEDULE_INTERVAL_SECS", 0);

        Self {
            min_confidence: min_confidence.min(100) as u8,
            dedup_window_days: parsed(l, "DEDUP_WINDOW_DAYS", d.dedup_window_days).clamp(1, 365),
            retry_max_attempts: parsed(l, "RETRY_MAX_ATTEMPTS", d.retry_max_attempts).clamp(1, 10),
            retry_base_delay_ms: parsed(l, "RETRY_BASE_DELAY_MS", d.retry_base_delay_ms).min(60_000),
            retry_jitter_ms: parsed(l, "RETRY_JITTER_MS", d.retry_jitter_ms).min(60_000),
            credential_safety_margin_secs: parsed(
                l,
                "CREDENTIAL_SAFETY_MARGIN_SECS",
                d.credential_safety_margin_secs,
            )
            .clamp(0, 86_400),
            fetch_hours_back: parsed(l, "FETCH_HOURS_BACK", d.fetch_hours_back).clamp(1, 24 * 30),
            fetch_concurrency: parsed(l, "FETCH_CONCURRENCY", d.fetch_concurrency).clamp(1, 32),
            source_timeout_secs: parsed(l, "SOURCE_TIMEOUT_SECS", d.source_timeout_secs).clamp(1, 300),
            capability_timeout_secs: parsed(l, "CAPABILITY_TIMEOUT_SECS", d.capability_timeout_secs)
                .clamp(1, 1800),
            publish_timeout_secs: parsed(l, "PUBLISH_TIMEOUT_SECS", d.publish_timeout_secs).clamp(1, 600),
            max_revisions: parsed(l, "MAX_REVISIONS", d.max_revisions).min(5),
            state_dir: lookup("STATE_DIR")
                .filter(|s| !s.trim().is_empty())
                .map(|s| PathBuf::from(s.trim()))
                .unwrap_or(d.state_dir),
            dry_run: flag(l, "DRY_RUN"),
            schedule_interval_secs: (interval > 0).then(|| interval.max(60)),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
            Duration::from_millis(self.retry_jitter_ms),
        )
    }

    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            hours_back: self.fetch_hours_back,
            capability_timeout: Duration::from_secs(self.capability_timeout_secs),
            publish_timeout: Duration::from_secs(self.publish_timeout_secs),
            max_revisions: self.max_revisions,
            gate: QualityGate::new(self.min_confidence),
        }
    }

    pub fn seen_index_path(&self) -> PathBuf {
        self.state_dir.join("seen_index.json")
    }

    pub fn credential_path(&self) -> PathBuf {
        self.state_dir.join("credential.json")
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.state_dir.join("runs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn cfg(pairs: &[(&str, &str)]) -> PipelineConfig {
        let m: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PipelineConfig::from_lookup(|k| m.get(k).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let c = cfg(&[]);
        assert_eq!(c, PipelineConfig::default());
        assert_eq!(c.min_confidence, 85);
        assert_eq!(c.dedup_window_days, 14);
        assert_eq!(c.retry_max_attempts, 3);
        assert_eq!(c.retry_base_delay_ms, 1000);
        assert!(c.schedule_interval_secs.is_none());
    }

    #[test]
    fn invalid_falls_back_and_out_of_range_clamps() {
        let c = cfg(&[
            ("MIN_CONFIDENCE", "abc"),
            ("RETRY_MAX_ATTEMPTS", "0"),
            ("DEDUP_WINDOW_DAYS", "9999"),
            ("DRY_RUN", "TRUE"),
            ("SCHEDULE_INTERVAL_SECS", "5"),
        ]);
        assert_eq!(c.min_confidence, 85);
        assert_eq!(c.retry_max_attempts, 1);
        assert_eq!(c.dedup_window_days, 365);
        assert!(c.dry_run);
        assert_eq!(c.schedule_interval_secs, Some(60));
    }

    #[test]
    fn derived_settings_follow_values() {
        let c = cfg(&[("MIN_CONFIDENCE", "90"), ("STATE_DIR", "/tmp/x")]);
        assert_eq!(c.run_settings().gate.min_confidence, 90);
        assert_eq!(c.runs_dir(), PathBuf::from("/tmp/x/runs"));
        assert_eq!(c.retry_policy().max_attempts, 3);
    }
}
