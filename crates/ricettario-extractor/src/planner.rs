//! Mode planning
//!
//! The planner binds a run to one execution strategy before any call is made.
//! Its estimates are advisory: they are reported to the caller and recorded,
//! but nothing re-plans mid-run.

use crate::config::{EngineConfig, PricingConfig};
use crate::error::ExtractorError;
use ricettario_domain::{ExecutionMode, ProcessingMode};
use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// Smoothing factor of the latency average
const LATENCY_ALPHA: f64 = 0.2;

/// Rolling per-call latency (exponentially weighted moving average)
#[derive(Debug)]
pub struct LatencyEstimator {
    millis: Mutex<f64>,
}

impl LatencyEstimator {
    /// Start from a seed value
    pub fn new(seed: Duration) -> Self {
        Self {
            millis: Mutex::new(seed.as_secs_f64() * 1000.0),
        }
    }

    /// Fold one observed call latency into the average
    pub fn observe(&self, latency: Duration) {
        let sample = latency.as_secs_f64() * 1000.0;
        let mut millis = self.millis.lock().unwrap_or_else(|e| e.into_inner());
        *millis = LATENCY_ALPHA * sample + (1.0 - LATENCY_ALPHA) * *millis;
    }

    /// Current estimate in milliseconds
    pub fn current_ms(&self) -> f64 {
        *self.millis.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current estimate
    pub fn current(&self) -> Duration {
        Duration::from_secs_f64(self.current_ms().max(0.0) / 1000.0)
    }
}

/// Advisory plan for one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModePlan {
    /// Strategy the run will use
    pub recommended_mode: ExecutionMode,
    /// Mode the caller asked for
    pub requested: ProcessingMode,
    /// Captions that need model calls
    pub uncached: usize,
    /// Captions answered from the cache
    pub cached: usize,
    /// Estimated cost in concurrent mode (USD)
    pub cost_concurrent: f64,
    /// Estimated cost in batch mode (USD)
    pub cost_batch: f64,
    /// Estimated wall-clock time in concurrent mode
    pub latency_concurrent: Duration,
    /// Estimated wall-clock time in batch mode
    pub latency_batch: Duration,
    /// `cost_concurrent - cost_batch`
    pub savings: f64,
    /// Savings as a percentage of the concurrent cost
    pub savings_percent: f64,
    /// Why this mode was chosen
    pub reasoning: String,
}

impl ModePlan {
    /// Estimated cost of the recommended mode
    pub fn cost_estimate(&self) -> f64 {
        match self.recommended_mode {
            ExecutionMode::Batch => self.cost_batch,
            ExecutionMode::Concurrent => self.cost_concurrent,
        }
    }
}

/// Chooses between batch and concurrent execution
#[derive(Debug, Clone)]
pub struct ModePlanner {
    concurrency: usize,
    batch_threshold: usize,
    accept_batch_latency: bool,
    pricing: PricingConfig,
    batch_available: bool,
}

impl ModePlanner {
    /// Create a planner from the engine configuration
    pub fn new(config: &EngineConfig, batch_available: bool) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            batch_threshold: config.batch_threshold,
            accept_batch_latency: config.accept_batch_latency,
            pricing: config.pricing.clone(),
            batch_available,
        }
    }

    /// Plan a run over `pending` captions, `cached` of which need no call
    pub fn plan(
        &self,
        requested: ProcessingMode,
        pending: usize,
        cached: usize,
        per_call_latency: Duration,
    ) -> Result<ModePlan, ExtractorError> {
        let uncached = pending.saturating_sub(cached);
        let unit_cost = self.pricing.unit_cost_standard();
        let cost_concurrent = uncached as f64 * unit_cost;
        let cost_batch = cost_concurrent * self.pricing.batch_discount;

        let waves = uncached.div_ceil(self.concurrency) as u32;
        let latency_concurrent = per_call_latency * waves * self.pricing.requests_per_caption;
        let latency_batch = if uncached == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(self.pricing.batch_latency_ceiling_secs)
        };

        let (recommended_mode, reasoning) = match requested {
            ProcessingMode::Batch => {
                if !self.batch_available {
                    return Err(ExtractorError::Config(
                        "batch mode requested but no batch service is configured".to_string(),
                    ));
                }
                (ExecutionMode::Batch, "batch mode requested".to_string())
            }
            ProcessingMode::Concurrent => {
                (ExecutionMode::Concurrent, "concurrent mode requested".to_string())
            }
            ProcessingMode::Auto => self.choose(uncached),
        };

        let savings = cost_concurrent - cost_batch;
        let savings_percent = if cost_concurrent > 0.0 {
            savings / cost_concurrent * 100.0
        } else {
            0.0
        };

        debug!(
            "Planned {} for {} uncached captions ({} cached)",
            recommended_mode, uncached, cached
        );

        Ok(ModePlan {
            recommended_mode,
            requested,
            uncached,
            cached,
            cost_concurrent,
            cost_batch,
            latency_concurrent,
            latency_batch,
            savings,
            savings_percent,
            reasoning,
        })
    }

    fn choose(&self, uncached: usize) -> (ExecutionMode, String) {
        if !self.batch_available {
            return (
                ExecutionMode::Concurrent,
                "no batch service configured".to_string(),
            );
        }
        if !self.accept_batch_latency {
            return (
                ExecutionMode::Concurrent,
                "batch turnaround not acceptable for this run".to_string(),
            );
        }
        if uncached == 0 || uncached < self.batch_threshold {
            return (
                ExecutionMode::Concurrent,
                format!(
                    "{} uncached captions is below the batch threshold of {}",
                    uncached, self.batch_threshold
                ),
            );
        }
        (
            ExecutionMode::Batch,
            format!(
                "{} uncached captions meets the batch threshold of {}",
                uncached, self.batch_threshold
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn planner(batch_available: bool) -> ModePlanner {
        ModePlanner::new(&EngineConfig::default(), batch_available)
    }

    const LATENCY: Duration = Duration::from_millis(1_500);

    #[test]
    fn test_auto_below_threshold_is_concurrent() {
        let plan = planner(true).plan(ProcessingMode::Auto, 19, 0, LATENCY).unwrap();
        assert_eq!(plan.recommended_mode, ExecutionMode::Concurrent);
    }

    #[test]
    fn test_auto_at_threshold_is_batch() {
        let plan = planner(true).plan(ProcessingMode::Auto, 20, 0, LATENCY).unwrap();
        assert_eq!(plan.recommended_mode, ExecutionMode::Batch);
    }

    #[test]
    fn test_cached_captions_do_not_count() {
        let plan = planner(true).plan(ProcessingMode::Auto, 25, 10, LATENCY).unwrap();
        assert_eq!(plan.uncached, 15);
        assert_eq!(plan.recommended_mode, ExecutionMode::Concurrent);
    }

    #[test]
    fn test_auto_without_latency_acceptance() {
        let config = EngineConfig::interactive();
        let plan = ModePlanner::new(&config, true)
            .plan(ProcessingMode::Auto, 500, 0, LATENCY)
            .unwrap();
        assert_eq!(plan.recommended_mode, ExecutionMode::Concurrent);
    }

    #[test]
    fn test_forced_batch_without_service_fails() {
        let result = planner(false).plan(ProcessingMode::Batch, 5, 0, LATENCY);
        assert!(matches!(result, Err(ExtractorError::Config(_))));
        let plan = planner(false).plan(ProcessingMode::Auto, 500, 0, LATENCY).unwrap();
        assert_eq!(plan.recommended_mode, ExecutionMode::Concurrent);
    }

    #[test]
    fn test_forced_modes_win() {
        let plan = planner(true).plan(ProcessingMode::Batch, 1, 0, LATENCY).unwrap();
        assert_eq!(plan.recommended_mode, ExecutionMode::Batch);
        let plan = planner(true).plan(ProcessingMode::Concurrent, 500, 0, LATENCY).unwrap();
        assert_eq!(plan.recommended_mode, ExecutionMode::Concurrent);
    }

    #[test]
    fn test_cost_and_latency_estimates() {
        let plan = planner(true).plan(ProcessingMode::Auto, 100, 0, LATENCY).unwrap();
        assert!((plan.cost_concurrent - 0.072).abs() < 1e-9);
        assert!((plan.cost_batch - 0.036).abs() < 1e-9);
        assert!((plan.savings_percent - 50.0).abs() < 1e-9);
        // ceil(100 / 8) = 13 waves of two calls
        assert_eq!(plan.latency_concurrent, Duration::from_millis(13 * 2 * 1_500));
        assert_eq!(plan.latency_batch, Duration::from_secs(86_400));
        assert_eq!(plan.cost_estimate(), plan.cost_batch);
    }

    #[test]
    fn test_empty_run() {
        let plan = planner(true).plan(ProcessingMode::Auto, 0, 0, LATENCY).unwrap();
        assert_eq!(plan.recommended_mode, ExecutionMode::Concurrent);
        assert_eq!(plan.cost_concurrent, 0.0);
        assert_eq!(plan.savings_percent, 0.0);
        assert_eq!(plan.latency_batch, Duration::ZERO);
    }

    #[test]
    fn test_latency_ewma() {
        let estimator = LatencyEstimator::new(Duration::from_millis(1_000));
        estimator.observe(Duration::from_millis(2_000));
        assert!((estimator.current_ms() - 1_200.0).abs() < 1e-9);
        estimator.observe(Duration::from_millis(1_200));
        assert!((estimator.current_ms() - 1_200.0).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn batch_never_costs_more(
            pending in 0usize..5_000,
            cached in 0usize..5_000,
            discount in 0.0f64..=1.0,
        ) {
            let mut config = EngineConfig::default();
            config.pricing.batch_discount = discount;
            let plan = ModePlanner::new(&config, true)
                .plan(ProcessingMode::Auto, pending, cached, LATENCY)
                .unwrap();
            prop_assert!(plan.cost_batch <= plan.cost_concurrent);
            prop_assert!(plan.savings >= 0.0);
        }
    }
}
