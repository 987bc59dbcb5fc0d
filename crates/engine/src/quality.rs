//! The PCG quality loop: metrics collection, threshold monitoring, and
//! bounded runtime adjustment of generator parameters.
//!
//! The collector subscribes to `content_generated` events on the bus.
//! A monitor task samples it at a configurable interval; when any score
//! falls below its threshold it mutates the shared generation parameters
//! and emits a `generation_adjusted` event, bounded by a per-session
//! adjustment budget to prevent oscillation.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashSet, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use grimbox_domain::pcg::Difficulty;
use grimbox_domain::{EventKind, GameEvent};

use crate::events::EventBus;

/// Rolling window size for generation records.
const WINDOW: usize = 64;

/// Per-dimension minimum scores; anything below triggers an adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityThresholds {
    pub min_overall_score: f64,
    pub min_performance: f64,
    pub min_variety: f64,
    pub min_consistency: f64,
    pub min_engagement: f64,
    pub min_stability: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_overall_score: 0.7,
            min_performance: 0.5,
            min_variety: 0.3,
            min_consistency: 0.5,
            min_engagement: 0.4,
            min_stability: 0.6,
        }
    }
}

/// What the monitor decided to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    DifficultyStep,
    VarietyBoost,
    ComplexityReduction,
    PerformanceGuard,
}

impl AdjustmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DifficultyStep => "difficulty_step",
            Self::VarietyBoost => "variety_boost",
            Self::ComplexityReduction => "complexity_reduction",
            Self::PerformanceGuard => "performance_guard",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct GenerationRecord {
    duration_ms: u64,
    quality: f64,
    output_hash: u64,
}

/// Player feedback sample fed in over RPC or dev tooling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerFeedback {
    /// 0..1
    pub rating: f64,
    /// 0 = far too easy, 0.5 = right, 1 = far too hard
    pub difficulty_perception: f64,
    /// 0..1
    pub enjoyment: f64,
}

/// Aggregated scores over the rolling window, each in 0..1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityScores {
    pub overall: f64,
    pub performance: f64,
    pub variety: f64,
    pub consistency: f64,
    pub engagement: f64,
    pub stability: f64,
}

/// Tracks per-generation telemetry and system health.
#[derive(Default)]
pub struct MetricsCollector {
    records: Mutex<VecDeque<GenerationRecord>>,
    feedback: Mutex<VecDeque<PlayerFeedback>>,
    error_count: AtomicU64,
    success_count: AtomicU64,
    dropped_frames: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one generation outcome. `fingerprint` is hashed into the
    /// variety window.
    pub fn record_generation(&self, duration_ms: u64, quality: f64, fingerprint: &str) {
        let mut hasher = DefaultHasher::new();
        fingerprint.hash(&mut hasher);
        let record = GenerationRecord {
            duration_ms,
            quality: quality.clamp(0.0, 1.0),
            output_hash: hasher.finish(),
        };
        let mut records = lock(&self.records);
        if records.len() >= WINDOW {
            records.pop_front();
        }
        records.push_back(record);
        self.success_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_feedback(&self, sample: PlayerFeedback) {
        let mut feedback = lock(&self.feedback);
        if feedback.len() >= WINDOW {
            feedback.pop_front();
        }
        feedback.push_back(sample);
    }

    /// Latest total of frames shed by the fan-out under backpressure.
    pub fn set_dropped_frames(&self, total: u64) {
        self.dropped_frames.store(total, Ordering::Relaxed);
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Aggregate the window into scores.
    pub fn scores(&self) -> QualityScores {
        let records = lock(&self.records);
        if records.is_empty() {
            // no data: report healthy so the monitor stays quiet
            return QualityScores {
                overall: 1.0,
                performance: 1.0,
                variety: 1.0,
                consistency: 1.0,
                engagement: 1.0,
                stability: 1.0,
            };
        }

        let n = records.len() as f64;
        let overall = records.iter().map(|r| r.quality).sum::<f64>() / n;

        // performance: fraction of generations under 250ms
        let performance = records
            .iter()
            .filter(|r| r.duration_ms < 250)
            .count() as f64
            / n;

        let unique: HashSet<u64> = records.iter().map(|r| r.output_hash).collect();
        let variety = unique.len() as f64 / n;

        // consistency: 1 - variance of quality around its mean
        let variance =
            records.iter().map(|r| (r.quality - overall).powi(2)).sum::<f64>() / n;
        let consistency = (1.0 - variance.sqrt()).clamp(0.0, 1.0);

        let feedback = lock(&self.feedback);
        let engagement = if feedback.is_empty() {
            1.0
        } else {
            feedback
                .iter()
                .map(|f| (f.rating + f.enjoyment) / 2.0)
                .sum::<f64>()
                / feedback.len() as f64
        };

        let errors = self.error_count.load(Ordering::Relaxed) as f64;
        let successes = self.success_count.load(Ordering::Relaxed) as f64;
        let stability = if errors + successes == 0.0 {
            1.0
        } else {
            successes / (errors + successes)
        };

        QualityScores {
            overall,
            performance,
            variety,
            consistency,
            engagement,
            stability,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poison| poison.into_inner())
}

/// Shared, mutable generation parameters plus the adjustment budget.
pub struct PcgController {
    difficulty: Mutex<Difficulty>,
    /// Extra entropy mixed into generation seeds after a variety boost
    variety_salt: AtomicU64,
    /// Room-count reduction applied after a complexity adjustment
    complexity_relief: AtomicU32,
    adjustment_count: AtomicU32,
    max_adjustments: u32,
}

impl PcgController {
    pub fn new(difficulty: Difficulty, max_adjustments: u32) -> Self {
        Self {
            difficulty: Mutex::new(difficulty),
            variety_salt: AtomicU64::new(0),
            complexity_relief: AtomicU32::new(0),
            adjustment_count: AtomicU32::new(0),
            max_adjustments,
        }
    }

    pub fn difficulty(&self) -> Difficulty {
        *lock(&self.difficulty)
    }

    pub fn variety_salt(&self) -> u64 {
        self.variety_salt.load(Ordering::Relaxed)
    }

    pub fn complexity_relief(&self) -> u32 {
        self.complexity_relief.load(Ordering::Relaxed)
    }

    pub fn adjustment_count(&self) -> u32 {
        self.adjustment_count.load(Ordering::Relaxed)
    }

    pub fn budget_remaining(&self) -> bool {
        self.adjustment_count() < self.max_adjustments
    }

    fn apply(&self, adjustment: AdjustmentKind) {
        match adjustment {
            AdjustmentKind::DifficultyStep => {
                let mut difficulty = lock(&self.difficulty);
                *difficulty = difficulty.step_down();
            }
            AdjustmentKind::VarietyBoost => {
                self.variety_salt
                    .fetch_add(0x9E37_79B9, Ordering::Relaxed);
            }
            AdjustmentKind::ComplexityReduction => {
                self.complexity_relief.fetch_add(1, Ordering::Relaxed);
            }
            AdjustmentKind::PerformanceGuard => {
                self.complexity_relief.fetch_add(2, Ordering::Relaxed);
            }
        }
        self.adjustment_count.fetch_add(1, Ordering::Relaxed);
    }
}

/// Samples the collector and adjusts generation parameters.
pub struct QualityMonitor {
    collector: Arc<MetricsCollector>,
    controller: Arc<PcgController>,
    thresholds: QualityThresholds,
    pub interval: Duration,
}

impl QualityMonitor {
    pub fn new(
        collector: Arc<MetricsCollector>,
        controller: Arc<PcgController>,
        thresholds: QualityThresholds,
        interval: Duration,
    ) -> Self {
        Self {
            collector,
            controller,
            thresholds,
            interval,
        }
    }

    /// Wire the collector into the bus: every `content_generated` event
    /// feeds the rolling window.
    pub fn install_collector(bus: &EventBus, collector: Arc<MetricsCollector>) {
        bus.subscribe(Some(&["content_generated"]), move |event: &GameEvent| {
            if let EventKind::ContentGenerated {
                content_kind,
                duration_ms,
                quality,
            } = &event.kind
            {
                // the kind tags the fingerprint so distinct generators
                // do not collapse into one variety bucket
                let fingerprint = format!("{content_kind}:{}", event.seq);
                collector.record_generation(*duration_ms, *quality, &fingerprint);
            }
        });
    }

    /// One sampling pass. Returns the adjustment made, if any.
    pub fn sample_once(&self) -> Option<AdjustmentKind> {
        if !self.controller.budget_remaining() {
            return None;
        }
        let scores = self.collector.scores();
        let thresholds = &self.thresholds;

        let adjustment = if scores.performance < thresholds.min_performance {
            AdjustmentKind::PerformanceGuard
        } else if scores.variety < thresholds.min_variety {
            AdjustmentKind::VarietyBoost
        } else if scores.consistency < thresholds.min_consistency {
            AdjustmentKind::ComplexityReduction
        } else if scores.overall < thresholds.min_overall_score
            || scores.engagement < thresholds.min_engagement
            || scores.stability < thresholds.min_stability
        {
            AdjustmentKind::DifficultyStep
        } else {
            return None;
        };

        self.controller.apply(adjustment);
        tracing::info!(
            adjustment = adjustment.as_str(),
            overall = scores.overall,
            "quality monitor adjusted generation parameters"
        );
        Some(adjustment)
    }

    /// The long-lived monitor task: sample on a ticker, publish an
    /// adjustment event for every change.
    pub async fn run(self, bus: Arc<EventBus>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Some(adjustment) = self.sample_once() {
                let scores = self.collector.scores();
                let mut event = GameEvent::new(EventKind::GenerationAdjusted {
                    adjustment: adjustment.as_str().to_string(),
                    reason: format!("overall score {:.2}", scores.overall),
                });
                bus.publish(&mut event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(max_adjustments: u32) -> (Arc<MetricsCollector>, Arc<PcgController>, QualityMonitor) {
        let collector = Arc::new(MetricsCollector::new());
        let controller = Arc::new(PcgController::new(Difficulty::Normal, max_adjustments));
        let monitor = QualityMonitor::new(
            collector.clone(),
            controller.clone(),
            QualityThresholds::default(),
            Duration::from_millis(10),
        );
        (collector, controller, monitor)
    }

    #[test]
    fn test_scores_empty_window_is_healthy() {
        let collector = MetricsCollector::new();
        let scores = collector.scores();
        assert_eq!(scores.overall, 1.0);
    }

    #[test]
    fn test_low_quality_triggers_bounded_adjustments() {
        let (collector, controller, monitor) = monitor(2);
        for (i, quality) in [0.85, 0.85, 0.4, 0.4].into_iter().enumerate() {
            collector.record_generation(50, quality, &format!("dungeon:{i}"));
        }
        // overall = 0.625 < 0.7 -> difficulty adjustments, budget 2
        assert_eq!(monitor.sample_once(), Some(AdjustmentKind::DifficultyStep));
        assert_eq!(monitor.sample_once(), Some(AdjustmentKind::DifficultyStep));
        assert_eq!(monitor.sample_once(), None);
        assert_eq!(controller.adjustment_count(), 2);
        assert_eq!(controller.difficulty(), Difficulty::Easy);
    }

    #[test]
    fn test_healthy_window_makes_no_adjustment() {
        let (collector, controller, monitor) = monitor(5);
        for i in 0..8 {
            collector.record_generation(40, 0.9, &format!("quest:{i}"));
        }
        assert_eq!(monitor.sample_once(), None);
        assert_eq!(controller.adjustment_count(), 0);
    }

    #[test]
    fn test_slow_generation_triggers_performance_guard() {
        let (collector, controller, monitor) = monitor(3);
        for i in 0..6 {
            collector.record_generation(2000, 0.9, &format!("dungeon:{i}"));
        }
        assert_eq!(
            monitor.sample_once(),
            Some(AdjustmentKind::PerformanceGuard)
        );
        assert!(controller.complexity_relief() >= 2);
    }

    #[test]
    fn test_variety_measured_over_unique_hashes() {
        let (collector, _, monitor) = monitor(3);
        for _ in 0..10 {
            collector.record_generation(40, 0.9, "dungeon:same");
        }
        assert_eq!(monitor.sample_once(), Some(AdjustmentKind::VarietyBoost));
    }

    #[test]
    fn test_collector_subscribes_to_bus() {
        let bus = EventBus::new();
        let collector = Arc::new(MetricsCollector::new());
        QualityMonitor::install_collector(&bus, collector.clone());

        let mut event = GameEvent::new(EventKind::ContentGenerated {
            content_kind: "dungeon".into(),
            duration_ms: 30,
            quality: 0.9,
        });
        bus.publish(&mut event);
        // window no longer empty: consistency of one record is 1.0
        assert_eq!(collector.scores().overall, 0.9);
    }
}
