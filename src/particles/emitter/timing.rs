//! 发射器时间推进与生成计划
//!
//! 这里全部是纯函数：给定当前时间状态和步长，算出新状态和本帧要生成多少粒子。
//! 实例在确认容量之后才提交计划，所以分配失败时实例保持原样。

use crate::particles::template::{BurstEntry, RequiredModule, SpawnModule};
use rand::rngs::StdRng;
use rand::Rng;

/// 发射器时间状态
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EmitterClock {
    /// 当前循环内的时间，包含延迟
    pub emitter_time: f32,
    pub loop_count: u32,
}

/// 时间推进结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeStep {
    pub clock: EmitterClock,
    /// 本帧落在延迟之后、且循环未结束的时间
    pub spawn_dt: f32,
    /// 本帧是否越过循环边界
    pub looped: bool,
    /// 本帧结束时是否已跑完所有循环
    pub finished: bool,
}

/// 一个循环内被本帧覆盖的时间段，burst 按段检查
#[derive(Debug, Clone, Copy, PartialEq)]
struct Segment {
    /// 去掉延迟后的段结束时间
    end: f32,
    /// 段结束时是否进入下一个循环
    wraps: bool,
}

/// 单个循环的总长度，时长为 0 时无限
fn loop_length(required: &RequiredModule, loop_index: u32) -> f32 {
    if required.duration > 0.0 {
        required.duration + required.delay_for_loop(loop_index)
    } else {
        f32::INFINITY
    }
}

fn loops_finished(required: &RequiredModule, loop_count: u32) -> bool {
    required.loops > 0 && loop_count >= required.loops
}

/// 单帧最多逐段检查的循环数，其余整循环直接跳过
const MAX_WRAP_SEGMENTS: usize = 16;

/// `remaining` 内能完整跑完的循环数，以及其中可生成的时间
///
/// 只在循环边界调用；此后每个循环长度相同。跳过的循环里 burst 不触发。
fn skip_whole_loops(required: &RequiredModule, loop_count: u32, remaining: f32) -> (u32, f32) {
    let length = loop_length(required, loop_count);
    if !length.is_finite() || length <= 0.0 {
        return (0, 0.0);
    }
    let whole = (remaining / length).floor() as u32;
    if loops_finished(required, loop_count) {
        return (whole, 0.0);
    }
    let skipped = if required.loops > 0 {
        whole.min(required.loops - loop_count)
    } else {
        whole
    };
    (skipped, skipped as f32 * required.duration)
}

/// 推进发射器时间，返回新状态和可生成的时间
pub fn advance(clock: EmitterClock, delta_time: f32, required: &RequiredModule) -> TimeStep {
    let (step, _) = advance_segments(clock, delta_time, required);
    step
}

fn advance_segments(
    clock: EmitterClock,
    delta_time: f32,
    required: &RequiredModule,
) -> (TimeStep, Vec<Segment>) {
    let mut time = clock.emitter_time;
    let mut loop_count = clock.loop_count;
    let mut remaining = delta_time.max(0.0);
    let mut spawn_dt = 0.0;
    let mut looped = false;
    let mut segments = Vec::new();

    loop {
        let delay = required.delay_for_loop(loop_count);
        let length = loop_length(required, loop_count);
        let step = remaining.min(length - time).max(0.0);
        let end = time + step;

        if !loops_finished(required, loop_count) {
            let active_start = time.max(delay);
            if end > active_start {
                spawn_dt += end - active_start;
            }
            segments.push(Segment {
                end: end - delay,
                wraps: end >= length,
            });
        }

        remaining -= step;
        if end >= length {
            time = 0.0;
            loop_count = loop_count.saturating_add(1);
            looped = true;
            if remaining <= 0.0 {
                break;
            }
            if loops_finished(required, loop_count) || segments.len() >= MAX_WRAP_SEGMENTS {
                let (skipped, active) = skip_whole_loops(required, loop_count, remaining);
                spawn_dt += active;
                remaining -= skipped as f32 * loop_length(required, loop_count);
                loop_count = loop_count.saturating_add(skipped);
            }
        } else {
            time = end;
            break;
        }
    }

    let step = TimeStep {
        clock: EmitterClock {
            emitter_time: time,
            loop_count,
        },
        spawn_dt,
        looped,
        finished: loops_finished(required, loop_count),
    };
    (step, segments)
}

/// 归一化的发射器时间，无限时长时为 0
pub fn normalized_time(clock: &EmitterClock, required: &RequiredModule) -> f32 {
    if required.duration > 0.0 {
        let delay = required.delay_for_loop(clock.loop_count);
        ((clock.emitter_time - delay) / required.duration).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// burst 在循环内的触发时间（去掉延迟后）
pub fn burst_time(entry: &BurstEntry, required: &RequiredModule) -> f32 {
    if required.duration > 0.0 {
        entry.time * required.duration
    } else {
        entry.time
    }
}

/// 单个待生成粒子
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnEvent {
    /// 到本帧结束时已经存在的时间
    pub spawn_time: f32,
    /// 出生位置在上一帧与本帧发射器位置间的插值
    pub interpolation: f32,
}

/// 本帧生成计划
#[derive(Debug, Clone)]
pub struct SpawnPlan {
    pub time: TimeStep,
    /// 连续速率生成，按出生先后排列
    pub rate_events: Vec<SpawnEvent>,
    pub burst_count: usize,
    pub spawn_fraction: f32,
    pub burst_fired: Vec<bool>,
    /// 计划期间推进过的随机数状态
    pub rng: StdRng,
}

impl SpawnPlan {
    pub fn total(&self) -> usize {
        self.rate_events.len() + self.burst_count
    }
}

/// 计划本帧的时间推进与生成
#[allow(clippy::too_many_arguments)]
pub fn plan_spawn(
    clock: EmitterClock,
    delta_time: f32,
    required: &RequiredModule,
    spawn: &SpawnModule,
    spawn_fraction: f32,
    burst_fired: &[bool],
    spawning_enabled: bool,
    rng: &StdRng,
) -> SpawnPlan {
    let (time, segments) = advance_segments(clock, delta_time, required);
    let mut rng = rng.clone();
    let mut fired = burst_fired.to_vec();
    fired.resize(spawn.bursts.len(), false);

    let mut rate_events = Vec::new();
    let mut burst_count = 0usize;
    let mut fraction = spawn_fraction;

    if spawning_enabled {
        // 连续速率
        let t = normalized_time(&time.clock, required);
        let rate = (spawn.rate.sample(t, &mut rng) * spawn.rate_scale).max(0.0);
        if rate > 0.0 && time.spawn_dt > 0.0 {
            let new_fraction = fraction + rate * time.spawn_dt;
            let number = new_fraction.floor().max(0.0) as usize;
            let increment = 1.0 / rate;
            let start_time = time.spawn_dt + fraction * increment - increment;
            rate_events = (0..number)
                .map(|i| {
                    let spawn_time = (start_time - i as f32 * increment).max(0.0);
                    SpawnEvent {
                        spawn_time,
                        interpolation: (1.0 - spawn_time / delta_time.max(f32::EPSILON))
                            .clamp(0.0, 1.0),
                    }
                })
                .collect();
            fraction = new_fraction - number as f32;
        }

        // 突发：越过触发时间的条目各触发一次，循环重绕时重置
        for segment in &segments {
            for (entry, fired_flag) in spawn.bursts.iter().zip(fired.iter_mut()) {
                let at = burst_time(entry, required);
                if !*fired_flag && segment.end >= 0.0 && at <= segment.end {
                    *fired_flag = true;
                    burst_count += burst_amount(entry, spawn.burst_scale, &mut rng);
                }
            }
            if segment.wraps {
                fired.iter_mut().for_each(|f| *f = false);
            }
        }
    }

    // 重绕发生在没有记录段的循环（循环已结束）时同样清空
    if time.looped && !spawning_enabled {
        fired.iter_mut().for_each(|f| *f = false);
    }

    SpawnPlan {
        time,
        rate_events,
        burst_count,
        spawn_fraction: fraction,
        burst_fired: fired,
        rng,
    }
}

fn burst_amount(entry: &BurstEntry, scale: f32, rng: &mut StdRng) -> usize {
    let count = match entry.count_low {
        Some(low) if low < entry.count => rng.gen_range(low..=entry.count),
        _ => entry.count,
    };
    (count as f32 * scale).round().max(0.0) as usize
}

/// 切换 LOD 时，把本循环内已经过去的 burst 标记为已触发
pub fn passed_bursts(clock: &EmitterClock, required: &RequiredModule, spawn: &SpawnModule) -> Vec<bool> {
    let elapsed = clock.emitter_time - required.delay_for_loop(clock.loop_count);
    spawn
        .bursts
        .iter()
        .map(|entry| elapsed >= 0.0 && burst_time(entry, required) <= elapsed)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn required(duration: f32, loops: u32, delay: f32) -> RequiredModule {
        RequiredModule {
            duration,
            loops,
            delay,
            ..RequiredModule::default()
        }
    }

    #[test]
    fn test_tiny_duration_large_step_is_bounded() {
        let req = required(1.0e-4, 0, 0.0);
        let (step, segments) = advance_segments(EmitterClock::default(), 10.0, &req);
        assert!(segments.len() < MAX_WRAP_SEGMENTS * 2);
        assert!(step.clock.loop_count > 90_000);
        assert!(step.clock.emitter_time < 1.0e-3);
        assert!((step.spawn_dt - 10.0).abs() < 1e-2);
    }

    #[test]
    fn test_finished_loops_skip_remaining_time() {
        let req = required(0.01, 2, 0.0);
        let (step, segments) = advance_segments(EmitterClock::default(), 100.0, &req);
        assert_eq!(segments.len(), 2);
        assert!(step.finished);
        assert!((step.spawn_dt - 0.02).abs() < 1e-5);
    }

    #[test]
    fn test_advance_within_loop() {
        let step = advance(EmitterClock::default(), 0.25, &required(1.0, 0, 0.0));
        assert_eq!(step.clock.emitter_time, 0.25);
        assert_eq!(step.spawn_dt, 0.25);
        assert!(!step.looped);
    }

    #[test]
    fn test_delay_consumes_time() {
        let req = required(1.0, 0, 0.5);
        let step = advance(EmitterClock::default(), 0.4, &req);
        assert_eq!(step.spawn_dt, 0.0);
        let step = advance(step.clock, 0.4, &req);
        assert!((step.spawn_dt - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_loop_wrap_and_finish() {
        let req = required(1.0, 2, 0.0);
        let clock = EmitterClock {
            emitter_time: 0.75,
            loop_count: 0,
        };
        let step = advance(clock, 0.5, &req);
        assert!(step.looped);
        assert_eq!(step.clock.loop_count, 1);
        assert_eq!(step.clock.emitter_time, 0.25);
        assert_eq!(step.spawn_dt, 0.5);
        assert!(!step.finished);

        let step = advance(step.clock, 1.0, &req);
        assert!(step.finished);
        assert_eq!(step.clock.loop_count, 2);
        // 最后一个循环结束后不再累计生成时间
        assert_eq!(step.spawn_dt, 0.75);
    }

    #[test]
    fn test_rate_spawn_carries_fraction() {
        let req = required(0.0, 0, 0.0);
        let spawn = SpawnModule::with_rate(10.0);
        let rng = StdRng::seed_from_u64(1);
        let plan = plan_spawn(EmitterClock::default(), 0.15, &req, &spawn, 0.0, &[], true, &rng);
        assert_eq!(plan.rate_events.len(), 1);
        assert!((plan.spawn_fraction - 0.5).abs() < 1e-5);
        // 第一个粒子在帧内 0.1 秒处出生，到帧尾存在了 0.05 秒
        assert!((plan.rate_events[0].spawn_time - 0.05).abs() < 1e-5);

        let plan = plan_spawn(plan.time.clock, 0.15, &req, &spawn, plan.spawn_fraction, &[], true, &rng);
        assert_eq!(plan.rate_events.len(), 2);
        // 出生顺序：先出生的存在时间更长
        assert!(plan.rate_events[0].spawn_time > plan.rate_events[1].spawn_time);
    }

    #[test]
    fn test_bursts_fire_once_per_loop() {
        let req = required(1.0, 0, 0.0);
        let spawn = SpawnModule::default().burst(0.0, 5).burst(0.5, 3);
        let rng = StdRng::seed_from_u64(7);

        let plan = plan_spawn(EmitterClock::default(), 0.1, &req, &spawn, 0.0, &[], true, &rng);
        assert_eq!(plan.burst_count, 5);
        assert_eq!(plan.burst_fired, vec![true, false]);

        let plan = plan_spawn(plan.time.clock, 0.1, &req, &spawn, 0.0, &plan.burst_fired, true, &rng);
        assert_eq!(plan.burst_count, 0);

        // 越过 0.5 并重绕：第二个条目触发，然后新循环的第一个条目再次触发
        let clock = EmitterClock {
            emitter_time: 0.25,
            loop_count: 0,
        };
        let plan = plan_spawn(clock, 0.875, &req, &spawn, 0.0, &[true, false], true, &rng);
        assert_eq!(plan.burst_count, 3 + 5);
        assert_eq!(plan.burst_fired, vec![true, false]);
    }

    #[test]
    fn test_suppressed_spawning_still_advances() {
        let req = required(1.0, 0, 0.0);
        let spawn = SpawnModule::with_rate(100.0).burst(0.0, 10);
        let rng = StdRng::seed_from_u64(3);
        let plan = plan_spawn(EmitterClock::default(), 0.5, &req, &spawn, 0.0, &[], false, &rng);
        assert_eq!(plan.total(), 0);
        assert_eq!(plan.time.clock.emitter_time, 0.5);
    }

    #[test]
    fn test_burst_range_and_scale() {
        let req = required(1.0, 0, 0.0);
        let mut spawn = SpawnModule::default().burst_range(0.0, 2, 4);
        spawn.burst_scale = 2.0;
        let rng = StdRng::seed_from_u64(11);
        let plan = plan_spawn(EmitterClock::default(), 0.1, &req, &spawn, 0.0, &[], true, &rng);
        assert!((4..=8).contains(&plan.burst_count));
        assert_eq!(plan.burst_count % 2, 0);
    }

    #[test]
    fn test_passed_bursts() {
        let req = required(2.0, 0, 0.0);
        let spawn = SpawnModule::default().burst(0.25, 1).burst(0.75, 1);
        let clock = EmitterClock {
            emitter_time: 1.0,
            loop_count: 0,
        };
        assert_eq!(passed_bursts(&clock, &req, &spawn), vec![true, false]);
    }
}
