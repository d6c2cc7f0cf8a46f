//! 内存压力监测
//!
//! 按固定间隔（而不是每帧）采样内存占用比例，作为缓存策略的输入。

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sc_rendering::Clock;

/// 内存占用采样器
pub trait MemorySampler {
    /// 当前内存占用比例，期望范围 [0, 1]
    fn usage_ratio(&self) -> f32;
}

impl<F> MemorySampler for F
where
    F: Fn() -> f32,
{
    fn usage_ratio(&self) -> f32 {
        self()
    }
}

/// 可手动设置的采样器，克隆体共享同一数值
#[derive(Debug, Clone, Default)]
pub struct ManualMemorySampler {
    ratio: Arc<Mutex<f32>>,
}

impl ManualMemorySampler {
    pub fn new(ratio: f32) -> Self {
        Self {
            ratio: Arc::new(Mutex::new(ratio)),
        }
    }

    pub fn set(&self, ratio: f32) {
        *self.ratio.lock() = ratio;
    }
}

impl MemorySampler for ManualMemorySampler {
    fn usage_ratio(&self) -> f32 {
        *self.ratio.lock()
    }
}

/// 监测阈值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryConfig {
    /// 达到该比例视为内存压力
    pub pressure_ratio: f32,
    /// 不超过该比例视为有余量
    pub headroom_ratio: f32,
    pub sample_interval: Duration,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            pressure_ratio: 0.85,
            headroom_ratio: 0.7,
            sample_interval: Duration::from_secs(1),
        }
    }
}

/// 压力状态变化
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressureChange {
    Entered,
    Relieved,
}

/// 内存监测器
pub struct MemoryMonitor<M> {
    sampler: M,
    clock: Arc<dyn Clock>,
    config: MemoryConfig,
    last_ratio: f32,
    last_sample: Option<Instant>,
    under_pressure: bool,
}

impl<M: MemorySampler> MemoryMonitor<M> {
    pub fn new(sampler: M, config: MemoryConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            sampler,
            clock,
            config,
            last_ratio: 0.0,
            last_sample: None,
            under_pressure: false,
        }
    }

    /// 到达采样间隔时重新采样，返回压力状态的变化
    pub fn poll(&mut self) -> Option<PressureChange> {
        let now = self.clock.now();
        let due = self
            .last_sample
            .is_none_or(|last| now.saturating_duration_since(last) >= self.config.sample_interval);
        if !due {
            return None;
        }
        self.sample_at(now)
    }

    /// 立即采样
    pub fn sample(&mut self) -> Option<PressureChange> {
        let now = self.clock.now();
        self.sample_at(now)
    }

    fn sample_at(&mut self, now: Instant) -> Option<PressureChange> {
        self.last_sample = Some(now);
        self.last_ratio = sanitize_ratio(self.sampler.usage_ratio());

        let pressure = self.last_ratio >= self.config.pressure_ratio;
        if pressure == self.under_pressure {
            return None;
        }
        self.under_pressure = pressure;
        if pressure {
            tracing::info!(ratio = self.last_ratio, "memory pressure detected");
            Some(PressureChange::Entered)
        } else {
            tracing::info!(ratio = self.last_ratio, "memory pressure relieved");
            Some(PressureChange::Relieved)
        }
    }

    /// 最近一次采样的比例
    #[inline]
    pub fn last_ratio(&self) -> f32 {
        self.last_ratio
    }

    #[inline]
    pub fn under_pressure(&self) -> bool {
        self.under_pressure
    }

    /// 是否还有余量启用整场景缓存
    pub fn has_headroom(&self) -> bool {
        !self.under_pressure && self.last_ratio <= self.config.headroom_ratio
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn sampler(&self) -> &M {
        &self.sampler
    }
}

/// 限制到 [0, 1]，NaN 视为 0
fn sanitize_ratio(ratio: f32) -> f32 {
    if ratio.is_nan() { 0.0 } else { ratio.clamp(0.0, 1.0) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sc_rendering::ManualClock;

    fn monitor(ratio: f32) -> (MemoryMonitor<ManualMemorySampler>, ManualMemorySampler, ManualClock) {
        let clock = ManualClock::new();
        let sampler = ManualMemorySampler::new(ratio);
        let monitor = MemoryMonitor::new(sampler.clone(), MemoryConfig::default(), Arc::new(clock.clone()));
        (monitor, sampler, clock)
    }

    #[test]
    fn test_first_poll_samples_immediately() {
        let (mut monitor, _, _) = monitor(0.4);
        assert_eq!(monitor.poll(), None);
        assert_eq!(monitor.last_ratio(), 0.4);
        assert!(monitor.has_headroom());
    }

    #[test]
    fn test_samples_only_at_interval() {
        let (mut monitor, sampler, clock) = monitor(0.4);
        monitor.poll();
        sampler.set(0.95);
        assert_eq!(monitor.poll(), None);
        assert_eq!(monitor.last_ratio(), 0.4);

        clock.advance(Duration::from_secs(1));
        assert_eq!(monitor.poll(), Some(PressureChange::Entered));
        assert!(monitor.under_pressure());
        assert!(!monitor.has_headroom());

        sampler.set(0.5);
        clock.advance(Duration::from_secs(1));
        assert_eq!(monitor.poll(), Some(PressureChange::Relieved));
    }

    #[test]
    fn test_between_thresholds_has_no_headroom() {
        let (mut monitor, _, _) = monitor(0.8);
        monitor.poll();
        assert!(!monitor.under_pressure());
        assert!(!monitor.has_headroom());
    }

    #[test]
    fn test_ratio_sanitized() {
        let (mut monitor, sampler, _) = monitor(f32::NAN);
        monitor.sample();
        assert_eq!(monitor.last_ratio(), 0.0);
        sampler.set(7.0);
        assert_eq!(monitor.sample(), Some(PressureChange::Entered));
        assert_eq!(monitor.last_ratio(), 1.0);
    }

    #[test]
    fn test_closure_sampler() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new());
        let mut monitor = MemoryMonitor::new(|| 0.1_f32, MemoryConfig::default(), clock);
        monitor.poll();
        assert!(monitor.has_headroom());
    }
}
