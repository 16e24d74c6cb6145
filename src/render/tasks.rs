//! 缓冲填充任务与工作线程池
//!
//! 每个任务只能被执行一次：工作线程和渲染线程通过原子状态竞争执行权。
//! 渲染线程在 `ensure_complete` 时如果任务还没开始，就自己同步执行，
//! 所以线程池饱和或没有工作线程时也不会卡住绘制。
//!
//! ```text
//! PENDING ──claim──► RUNNING ──► DONE
//!    ▲ worker / ensure_complete 二选一
//! ```

use crate::core::error::{RenderError, RenderResult};
use crate::particles::stats::ParticleStats;
use crate::render::fill::FillOutput;
use crossbeam_channel::{unbounded, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const DONE: u8 = 2;

/// 填充结果；多个观察者共享同一份输出
pub type FillResult = RenderResult<Arc<FillOutput>>;

type FillJob = Box<dyn FnOnce() -> RenderResult<FillOutput> + Send + 'static>;

/// 单个（发射器, 视图）的填充任务
pub struct FillTask {
    emitter_index: usize,
    view_index: usize,
    state: AtomicU8,
    job: Mutex<Option<FillJob>>,
    result: Mutex<Option<FillResult>>,
    done: Condvar,
    ran_inline: AtomicBool,
}

impl std::fmt::Debug for FillTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FillTask")
            .field("emitter_index", &self.emitter_index)
            .field("view_index", &self.view_index)
            .field("state", &self.state.load(Ordering::Relaxed))
            .field("ran_inline", &self.ran_inline.load(Ordering::Relaxed))
            .finish()
    }
}

impl FillTask {
    pub fn new<F>(emitter_index: usize, view_index: usize, job: F) -> Arc<Self>
    where
        F: FnOnce() -> RenderResult<FillOutput> + Send + 'static,
    {
        Arc::new(Self {
            emitter_index,
            view_index,
            state: AtomicU8::new(PENDING),
            job: Mutex::new(Some(Box::new(job))),
            result: Mutex::new(None),
            done: Condvar::new(),
            ran_inline: AtomicBool::new(false),
        })
    }

    pub fn emitter_index(&self) -> usize {
        self.emitter_index
    }

    pub fn view_index(&self) -> usize {
        self.view_index
    }

    pub fn is_complete(&self) -> bool {
        self.state.load(Ordering::Acquire) == DONE
    }

    /// 任务是否由 `ensure_complete` 同步执行
    pub fn ran_inline(&self) -> bool {
        self.ran_inline.load(Ordering::Acquire)
    }

    /// 尝试取得执行权并执行；已被别人取走时返回 `false`
    fn try_run(&self) -> bool {
        if self
            .state
            .compare_exchange(PENDING, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let job = self.job.lock().ok().and_then(|mut job| job.take());
        let result = match job {
            Some(job) => match catch_unwind(AssertUnwindSafe(job)) {
                Ok(result) => result.map(Arc::new),
                Err(_) => Err(RenderError::FillPanicked {
                    emitter: self.emitter_index,
                }),
            },
            None => Err(RenderError::FillFailed {
                emitter: self.emitter_index,
                reason: "fill job missing".to_string(),
            }),
        };

        match self.result.lock() {
            Ok(mut slot) => *slot = Some(result),
            Err(poisoned) => *poisoned.into_inner() = Some(result),
        }
        self.state.store(DONE, Ordering::Release);
        self.done.notify_all();
        true
    }

    /// 阻塞直到任务完成；任务尚未开始时在当前线程同步执行
    pub fn ensure_complete(&self, stats: &ParticleStats) -> FillResult {
        if self.try_run() {
            self.ran_inline.store(true, Ordering::Release);
            stats.fill_sync_fallbacks.increment();
            tracing::trace!(
                target: "render::fill",
                emitter = self.emitter_index,
                view = self.view_index,
                "Fill executed synchronously"
            );
        }

        let mut result = match self.result.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        while result.is_none() {
            result = match self.done.wait(result) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
        result.clone().unwrap_or(Err(RenderError::FillFailed {
            emitter: self.emitter_index,
            reason: "fill result missing".to_string(),
        }))
    }
}

// ============================================================================
// 工作线程池
// ============================================================================

/// 填充工作线程池
///
/// 线程数为 0 时不创建线程，所有任务都在 `ensure_complete` 时同步执行。
pub struct FillWorkerPool {
    sender: Option<Sender<Arc<FillTask>>>,
    workers: Vec<JoinHandle<()>>,
    stats: Arc<ParticleStats>,
}

impl std::fmt::Debug for FillWorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FillWorkerPool")
            .field("workers", &self.workers.len())
            .finish()
    }
}

impl FillWorkerPool {
    pub fn new(threads: usize, stats: Arc<ParticleStats>) -> RenderResult<Self> {
        if threads == 0 {
            return Ok(Self {
                sender: None,
                workers: Vec::new(),
                stats,
            });
        }

        let (sender, receiver) = unbounded::<Arc<FillTask>>();
        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let receiver = receiver.clone();
            let handle = std::thread::Builder::new()
                .name(format!("particle-fill-{index}"))
                .spawn(move || {
                    // 发送端关闭后退出
                    while let Ok(task) = receiver.recv() {
                        task.try_run();
                    }
                })
                .map_err(|err| RenderError::WorkerSpawn(err.to_string()))?;
            workers.push(handle);
        }

        tracing::info!(target: "render::fill", threads, "Fill worker pool started");
        Ok(Self {
            sender: Some(sender),
            workers,
            stats,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// 把任务交给工作线程；没有工作线程时保留到 `ensure_complete`
    pub fn schedule(&self, task: &Arc<FillTask>) {
        let Some(sender) = &self.sender else {
            return;
        };
        if sender.send(Arc::clone(task)).is_ok() {
            self.stats.fill_tasks_scheduled.increment();
        } else {
            tracing::warn!(
                target: "render::fill",
                emitter = task.emitter_index(),
                "Fill queue closed, task will run inline"
            );
        }
    }
}

impl Drop for FillWorkerPool {
    fn drop(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::error!(target: "render::fill", "Fill worker panicked during shutdown");
            }
        }
    }
}
