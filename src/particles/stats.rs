//! 跨线程共享的运行统计
//!
//! 模拟线程与渲染线程各自递增自己负责的计数器，读取方随时取快照。

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// 单个无锁计数器
#[derive(Debug, Default)]
pub struct StatCounter {
    value: AtomicU64,
}

impl StatCounter {
    pub const fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn increment(&self) {
        self.add(1);
    }

    #[inline]
    pub fn add(&self, amount: u64) {
        if amount > 0 {
            self.value.fetch_add(amount, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.value.store(0, Ordering::Relaxed);
    }
}

/// 粒子系统统计
#[derive(Debug, Default)]
pub struct ParticleStats {
    pub spawned: StatCounter,
    pub killed: StatCounter,
    /// 因容量上限被丢弃的生成请求
    pub capacity_exceeded: StatCounter,
    pub allocation_failures: StatCounter,
    pub ticks_skipped: StatCounter,
    pub snapshots_built: StatCounter,
    pub bundles_submitted: StatCounter,
    pub bundles_applied: StatCounter,
    pub fill_tasks_scheduled: StatCounter,
    /// ensure-complete 时任务尚未开始、由调用线程同步执行的次数
    pub fill_sync_fallbacks: StatCounter,
    pub fill_failures: StatCounter,
    pub draws_submitted: StatCounter,
    pub draws_skipped: StatCounter,
}

/// 某一时刻的统计值
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub spawned: u64,
    pub killed: u64,
    pub capacity_exceeded: u64,
    pub allocation_failures: u64,
    pub ticks_skipped: u64,
    pub snapshots_built: u64,
    pub bundles_submitted: u64,
    pub bundles_applied: u64,
    pub fill_tasks_scheduled: u64,
    pub fill_sync_fallbacks: u64,
    pub fill_failures: u64,
    pub draws_submitted: u64,
    pub draws_skipped: u64,
}

impl ParticleStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            spawned: self.spawned.get(),
            killed: self.killed.get(),
            capacity_exceeded: self.capacity_exceeded.get(),
            allocation_failures: self.allocation_failures.get(),
            ticks_skipped: self.ticks_skipped.get(),
            snapshots_built: self.snapshots_built.get(),
            bundles_submitted: self.bundles_submitted.get(),
            bundles_applied: self.bundles_applied.get(),
            fill_tasks_scheduled: self.fill_tasks_scheduled.get(),
            fill_sync_fallbacks: self.fill_sync_fallbacks.get(),
            fill_failures: self.fill_failures.get(),
            draws_submitted: self.draws_submitted.get(),
            draws_skipped: self.draws_skipped.get(),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.spawned,
            &self.killed,
            &self.capacity_exceeded,
            &self.allocation_failures,
            &self.ticks_skipped,
            &self.snapshots_built,
            &self.bundles_submitted,
            &self.bundles_applied,
            &self.fill_tasks_scheduled,
            &self.fill_sync_fallbacks,
            &self.fill_failures,
            &self.draws_submitted,
            &self.draws_skipped,
        ] {
            counter.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_counters_across_threads() {
        let stats = Arc::new(ParticleStats::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..250 {
                        stats.spawned.increment();
                    }
                    stats.capacity_exceeded.add(2);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.spawned, 1000);
        assert_eq!(snapshot.capacity_exceeded, 8);

        stats.reset();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }
}
