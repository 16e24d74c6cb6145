//! 渲染侧资源池
//!
//! - [`VertexFactoryPool`]：按发射器类型缓存顶点工厂，归还后复用
//! - [`SortScratchPool`]：排序临时缓冲区，按需增长后复用
//!
//! 两者都通过 RAII 守卫借出，守卫析构时自动归还，
//! 填充中途出错或 panic 也不会泄漏池中的资源。

use crate::particles::template::EmitterType;
use crate::render::fill::{renderer_for, EmitterRenderer};
use crate::render::sort::ParticleOrder;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ============================================================================
// 顶点工厂池
// ============================================================================

/// 某一发射器类型的顶点工厂
#[derive(Debug)]
pub struct VertexFactory {
    id: u64,
    emitter_type: EmitterType,
    renderer: &'static dyn EmitterRenderer,
}

impl VertexFactory {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn emitter_type(&self) -> EmitterType {
        self.emitter_type
    }

    pub fn renderer(&self) -> &'static dyn EmitterRenderer {
        self.renderer
    }
}

/// 顶点工厂池统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FactoryPoolStats {
    pub created: usize,
    pub reused: usize,
    pub available: usize,
}

/// 按类型分组的顶点工厂空闲列表
#[derive(Debug, Default)]
pub struct VertexFactoryPool {
    free: Mutex<HashMap<EmitterType, Vec<VertexFactory>>>,
    next_id: AtomicU64,
    created: AtomicUsize,
    reused: AtomicUsize,
}

impl VertexFactoryPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// 借出一个 `emitter_type` 类型的工厂，空闲列表为空时新建
    pub fn acquire(self: &Arc<Self>, emitter_type: EmitterType) -> PooledVertexFactory {
        let recycled = self
            .free
            .lock()
            .ok()
            .and_then(|mut free| free.get_mut(&emitter_type).and_then(Vec::pop));

        let factory = match recycled {
            Some(factory) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                factory
            }
            None => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                self.created.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    target: "render::pools",
                    id,
                    emitter_type = ?emitter_type,
                    "Vertex factory created"
                );
                VertexFactory {
                    id,
                    emitter_type,
                    renderer: renderer_for(emitter_type),
                }
            }
        };

        PooledVertexFactory {
            factory,
            pool: Arc::clone(self),
        }
    }

    fn release(&self, factory: VertexFactory) {
        match self.free.lock() {
            Ok(mut free) => free.entry(factory.emitter_type).or_default().push(factory),
            Err(_) => tracing::warn!(
                target: "render::pools",
                id = factory.id,
                "Vertex factory pool poisoned, dropping factory"
            ),
        }
    }

    pub fn available(&self, emitter_type: EmitterType) -> usize {
        self.free
            .lock()
            .map(|free| free.get(&emitter_type).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    pub fn stats(&self) -> FactoryPoolStats {
        let available = self
            .free
            .lock()
            .map(|free| free.values().map(Vec::len).sum())
            .unwrap_or(0);
        FactoryPoolStats {
            created: self.created.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            available,
        }
    }
}

/// 借出的顶点工厂，析构时归还
#[derive(Debug)]
pub struct PooledVertexFactory {
    factory: VertexFactory,
    pool: Arc<VertexFactoryPool>,
}

impl Deref for PooledVertexFactory {
    type Target = VertexFactory;

    fn deref(&self) -> &VertexFactory {
        &self.factory
    }
}

impl Drop for PooledVertexFactory {
    fn drop(&mut self) {
        self.pool.release(VertexFactory {
            id: self.factory.id,
            emitter_type: self.factory.emitter_type,
            renderer: self.factory.renderer,
        });
    }
}

// ============================================================================
// 排序临时缓冲区池
// ============================================================================

/// 排序临时缓冲区池
///
/// 单线程按顺序使用时始终复用同一块缓冲区；
/// 并行填充任务同时借出时才会额外分配。
#[derive(Debug)]
pub struct SortScratchPool {
    free: Mutex<Vec<Vec<ParticleOrder>>>,
    initial_capacity: usize,
    allocations: AtomicUsize,
}

impl SortScratchPool {
    pub fn new(initial_capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            initial_capacity: initial_capacity.max(1),
            allocations: AtomicUsize::new(0),
        }
    }

    /// 借出长度恰为 `count` 的缓冲区，容量不足时增长
    pub fn get_scratch(self: &Arc<Self>, count: usize) -> ScratchGuard {
        let recycled = self.free.lock().ok().and_then(|mut free| free.pop());
        let mut buffer = recycled.unwrap_or_else(|| {
            self.allocations.fetch_add(1, Ordering::Relaxed);
            Vec::with_capacity(self.initial_capacity)
        });
        if buffer.capacity() < count {
            tracing::trace!(
                target: "render::pools",
                from = buffer.capacity(),
                to = count,
                "Sort scratch grown"
            );
        }
        buffer.clear();
        buffer.resize(count, ParticleOrder::new(0, 0, 0.0));
        ScratchGuard {
            buffer,
            pool: Arc::clone(self),
        }
    }

    /// 累计新建的缓冲区数量
    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::Relaxed)
    }

    pub fn available(&self) -> usize {
        self.free.lock().map(|free| free.len()).unwrap_or(0)
    }
}

/// 借出的排序缓冲区，析构时归还
#[derive(Debug)]
pub struct ScratchGuard {
    buffer: Vec<ParticleOrder>,
    pool: Arc<SortScratchPool>,
}

impl Deref for ScratchGuard {
    type Target = [ParticleOrder];

    fn deref(&self) -> &[ParticleOrder] {
        &self.buffer
    }
}

impl DerefMut for ScratchGuard {
    fn deref_mut(&mut self) -> &mut [ParticleOrder] {
        &mut self.buffer
    }
}

impl Drop for ScratchGuard {
    fn drop(&mut self) {
        let buffer = std::mem::take(&mut self.buffer);
        if let Ok(mut free) = self.pool.free.lock() {
            free.push(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_returned_on_drop() {
        let pool = Arc::new(VertexFactoryPool::new());
        let first_id = {
            let factory = pool.acquire(EmitterType::Sprite);
            assert_eq!(factory.emitter_type(), EmitterType::Sprite);
            assert_eq!(pool.available(EmitterType::Sprite), 0);
            factory.id()
        };
        assert_eq!(pool.available(EmitterType::Sprite), 1);

        let again = pool.acquire(EmitterType::Sprite);
        assert_eq!(again.id(), first_id);
        let stats = pool.stats();
        assert_eq!((stats.created, stats.reused), (1, 1));
    }

    #[test]
    fn test_factory_never_shared() {
        let pool = Arc::new(VertexFactoryPool::new());
        let a = pool.acquire(EmitterType::Mesh);
        let b = pool.acquire(EmitterType::Mesh);
        assert_ne!(a.id(), b.id());
        let beam = pool.acquire(EmitterType::Beam);
        assert_eq!(beam.renderer().emitter_type(), EmitterType::Beam);
        drop((a, b, beam));
        assert_eq!(pool.available(EmitterType::Mesh), 2);
        assert_eq!(pool.available(EmitterType::Beam), 1);
    }

    #[test]
    fn test_scratch_reused_and_sized() {
        let pool = Arc::new(SortScratchPool::new(4));
        {
            let scratch = pool.get_scratch(10);
            assert_eq!(scratch.len(), 10);
        }
        {
            let scratch = pool.get_scratch(3);
            assert_eq!(scratch.len(), 3);
        }
        assert_eq!(pool.allocations(), 1);

        let a = pool.get_scratch(2);
        let b = pool.get_scratch(2);
        assert_eq!(pool.allocations(), 2);
        drop((a, b));
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_scratch_returned_after_panic() {
        let pool = Arc::new(SortScratchPool::new(4));
        let cloned = Arc::clone(&pool);
        let result = std::panic::catch_unwind(move || {
            let _scratch = cloned.get_scratch(8);
            panic!("fill failed");
        });
        assert!(result.is_err());
        assert_eq!(pool.available(), 1);
    }
}
