//! 粒子池
//!
//! 一块连续的字节缓冲区（`max_active × stride`）加一个同长度的活动索引数组。
//! 索引数组是槽位编号的一个排列，前 `active` 项是存活粒子。
//!
//! ```text
//! indices: [ 3 | 0 | 4 | 1 | 2 ]
//!            └── active ──┘ └ free ┘
//! ```
//!
//! 移除粒子只交换索引数组中的两项并递减计数，从不移动粒子字节。
//! 每个物理槽位带一个代数，移除时递增，使旧的 [`ParticleHandle`] 失效。

use crate::core::error::{PoolError, PoolResult};
use crate::particles::payload::ParticleView;
use crate::particles::record::{ParticleRecord, PARTICLE_RECORD_SIZE, PARTICLE_STRIDE_ALIGN};

/// 存储单元：16 字节、4 字节对齐
type Chunk = [u32; 4];
const CHUNK_SIZE: usize = std::mem::size_of::<Chunk>();

/// 带代数的粒子句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParticleHandle {
    pub slot: u32,
    pub generation: u32,
}

/// 粒子池
#[derive(Debug, Clone)]
pub struct ParticlePool {
    data: Vec<Chunk>,
    indices: Vec<u32>,
    /// 槽位 → 在 `indices` 中的位置
    positions: Vec<u32>,
    generations: Vec<u32>,
    stride: usize,
    active: usize,
    max_active: usize,
}

impl ParticlePool {
    /// 创建空池，步长向上取整到 16 字节且不小于基础记录
    pub fn new(stride: usize) -> Self {
        let stride = stride
            .max(PARTICLE_RECORD_SIZE)
            .div_ceil(PARTICLE_STRIDE_ALIGN)
            * PARTICLE_STRIDE_ALIGN;
        Self {
            data: Vec::new(),
            indices: Vec::new(),
            positions: Vec::new(),
            generations: Vec::new(),
            stride,
            active: 0,
            max_active: 0,
        }
    }

    /// 创建并预分配容量
    pub fn with_capacity(stride: usize, capacity: usize) -> PoolResult<Self> {
        let mut pool = Self::new(stride);
        pool.resize(capacity, true)?;
        Ok(pool)
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[inline]
    pub fn active_count(&self) -> usize {
        self.active
    }

    #[inline]
    pub fn max_active(&self) -> usize {
        self.max_active
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.active >= self.max_active
    }

    #[inline]
    pub fn free_slots(&self) -> usize {
        self.max_active - self.active
    }

    /// 已分配的粒子数据字节数
    pub fn allocated_bytes(&self) -> usize {
        self.data.len() * CHUNK_SIZE
    }

    fn chunks_per_slot(&self) -> usize {
        self.stride / CHUNK_SIZE
    }

    /// 重新分配到 `new_max` 个槽位
    ///
    /// `preserve_active` 为真时容量不会低于当前活动数；
    /// 为假且 `new_max < active` 时，按活动顺序保留前 `new_max` 个粒子。
    /// 只有分配失败才返回错误，此时池保持原样。
    pub fn resize(&mut self, new_max: usize, preserve_active: bool) -> PoolResult<()> {
        let new_max = if preserve_active {
            new_max.max(self.active)
        } else {
            new_max
        };
        if new_max == self.max_active {
            return Ok(());
        }

        if new_max > self.max_active {
            self.grow(new_max)
        } else {
            self.shrink(new_max)
        }
    }

    fn allocation_error(&self, requested: usize) -> PoolError {
        PoolError::AllocationFailed {
            requested,
            stride: self.stride,
        }
    }

    fn grow(&mut self, new_max: usize) -> PoolResult<()> {
        let chunk_count = new_max
            .checked_mul(self.chunks_per_slot())
            .ok_or_else(|| self.allocation_error(new_max))?;
        let extra = new_max - self.max_active;

        // 先全部预留，任一失败都不修改现有状态
        self.data
            .try_reserve_exact(chunk_count - self.data.len())
            .map_err(|_| self.allocation_error(new_max))?;
        self.indices
            .try_reserve_exact(extra)
            .map_err(|_| self.allocation_error(new_max))?;
        self.positions
            .try_reserve_exact(extra)
            .map_err(|_| self.allocation_error(new_max))?;
        self.generations
            .try_reserve_exact(extra)
            .map_err(|_| self.allocation_error(new_max))?;

        // 新槽位从当前最大代数开始，收缩前发出的句柄不会重新生效
        let generation = self.generations.iter().copied().max().unwrap_or(0);
        self.data.resize(chunk_count, [0; 4]);
        self.indices.extend(self.max_active as u32..new_max as u32);
        self.positions.extend(self.max_active as u32..new_max as u32);
        self.generations.resize(new_max, generation);

        tracing::trace!(
            target: "particle::pool",
            from = self.max_active,
            to = new_max,
            stride = self.stride,
            "Particle pool grown"
        );
        self.max_active = new_max;
        Ok(())
    }

    fn shrink(&mut self, new_max: usize) -> PoolResult<()> {
        let keep = self.active.min(new_max);
        let per_slot = self.chunks_per_slot();

        let mut data: Vec<Chunk> = Vec::new();
        data.try_reserve_exact(new_max * per_slot)
            .map_err(|_| self.allocation_error(new_max))?;

        // 按活动顺序把保留的粒子压缩到前 keep 个槽位
        for active_index in 0..keep {
            let slot = self.indices[active_index] as usize;
            data.extend_from_slice(&self.data[slot * per_slot..(slot + 1) * per_slot]);
        }
        data.resize(new_max * per_slot, [0; 4]);

        let dropped = self.active - keep;
        if dropped > 0 {
            tracing::debug!(
                target: "particle::pool",
                dropped,
                new_max,
                "Pool shrink truncated active particles"
            );
        }

        // 所有旧句柄都失效
        let next_generation = self.generations.iter().copied().max().unwrap_or(0).wrapping_add(1);
        self.data = data;
        self.indices = (0..new_max as u32).collect();
        self.positions = (0..new_max as u32).collect();
        self.generations = vec![next_generation; new_max];
        self.active = keep;
        self.max_active = new_max;
        Ok(())
    }

    /// 取出下一个空闲槽位并使其活动
    ///
    /// 槽位内容被清零。池满时返回 `None`，调用方需先 `resize`。
    pub fn acquire_slot(&mut self) -> Option<ParticleHandle> {
        if self.is_full() {
            return None;
        }
        let slot = self.indices[self.active];
        self.active += 1;
        self.slot_chunks_mut(slot as usize).fill([0; 4]);
        Some(ParticleHandle {
            slot,
            generation: self.generations[slot as usize],
        })
    }

    /// O(1) 移除：与最后一个活动项交换索引后递减计数
    ///
    /// 越界属于调用方错误：记录日志并返回 `false`，不修改任何状态。
    pub fn kill_at(&mut self, active_index: usize) -> bool {
        if active_index >= self.active {
            tracing::error!(
                target: "particle::pool",
                active_index,
                active = self.active,
                "kill_at beyond active particles ignored"
            );
            return false;
        }
        let last = self.active - 1;
        let killed_slot = self.indices[active_index] as usize;
        self.indices.swap(active_index, last);
        self.positions[self.indices[active_index] as usize] = active_index as u32;
        self.positions[killed_slot] = last as u32;
        self.generations[killed_slot] = self.generations[killed_slot].wrapping_add(1);
        self.active = last;
        true
    }

    /// 移除所有活动粒子
    pub fn kill_all(&mut self) {
        for &slot in &self.indices[..self.active] {
            let generation = &mut self.generations[slot as usize];
            *generation = generation.wrapping_add(1);
        }
        self.active = 0;
    }

    /// 活动索引 → 物理字节偏移
    pub fn direct_index_of(&self, active_index: usize) -> Option<usize> {
        self.slot_of(active_index)
            .map(|slot| slot as usize * self.stride)
    }

    /// 活动索引 → 物理槽位
    pub fn slot_of(&self, active_index: usize) -> Option<u32> {
        if active_index >= self.active {
            return None;
        }
        Some(self.indices[active_index])
    }

    /// 活动索引 → 句柄
    pub fn handle_of(&self, active_index: usize) -> Option<ParticleHandle> {
        self.slot_of(active_index).map(|slot| ParticleHandle {
            slot,
            generation: self.generations[slot as usize],
        })
    }

    /// 句柄是否仍指向同一个存活粒子
    pub fn is_valid(&self, handle: ParticleHandle) -> bool {
        let slot = handle.slot as usize;
        slot < self.max_active
            && self.generations[slot] == handle.generation
            && (self.positions[slot] as usize) < self.active
    }

    /// 活动索引数组（只含存活部分）
    pub fn active_indices(&self) -> &[u32] {
        &self.indices[..self.active]
    }

    /// 整个数据缓冲区的字节视图
    pub fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    fn slot_chunks(&self, slot: usize) -> &[Chunk] {
        let per_slot = self.chunks_per_slot();
        &self.data[slot * per_slot..(slot + 1) * per_slot]
    }

    fn slot_chunks_mut(&mut self, slot: usize) -> &mut [Chunk] {
        let per_slot = self.chunks_per_slot();
        &mut self.data[slot * per_slot..(slot + 1) * per_slot]
    }

    /// 按活动索引读取槽位字节
    pub fn particle_bytes(&self, active_index: usize) -> Option<&[u8]> {
        let slot = self.slot_of(active_index)?;
        Some(bytemuck::cast_slice(self.slot_chunks(slot as usize)))
    }

    /// 按活动索引读取基础记录
    pub fn particle(&self, active_index: usize) -> Option<&ParticleRecord> {
        let bytes = self.particle_bytes(active_index)?;
        Some(bytemuck::from_bytes(&bytes[..PARTICLE_RECORD_SIZE]))
    }

    /// 按活动索引获取可变视图
    pub fn particle_mut(&mut self, active_index: usize) -> Option<ParticleView<'_>> {
        let slot = self.slot_of(active_index)?;
        Some(self.slot_view_mut(slot))
    }

    /// 按句柄读取；句柄失效返回 `None`
    pub fn get(&self, handle: ParticleHandle) -> Option<&ParticleRecord> {
        if !self.is_valid(handle) {
            return None;
        }
        let bytes: &[u8] = bytemuck::cast_slice(self.slot_chunks(handle.slot as usize));
        Some(bytemuck::from_bytes(&bytes[..PARTICLE_RECORD_SIZE]))
    }

    /// 按句柄获取可变视图
    pub fn get_mut(&mut self, handle: ParticleHandle) -> Option<ParticleView<'_>> {
        if !self.is_valid(handle) {
            return None;
        }
        Some(self.slot_view_mut(handle.slot))
    }

    pub(crate) fn slot_view_mut(&mut self, slot: u32) -> ParticleView<'_> {
        let chunks = self.slot_chunks_mut(slot as usize);
        ParticleView::from_slot_bytes(bytemuck::cast_slice_mut(chunks))
    }

    /// 依次访问活动区间 `range` 内的粒子
    pub fn for_each_in_range_mut<F>(&mut self, range: std::ops::Range<usize>, mut f: F)
    where
        F: FnMut(usize, ParticleView<'_>),
    {
        let end = range.end.min(self.active);
        let per_slot = self.chunks_per_slot();
        for active_index in range.start..end {
            let slot = self.indices[active_index] as usize;
            let chunks = &mut self.data[slot * per_slot..(slot + 1) * per_slot];
            f(
                active_index,
                ParticleView::from_slot_bytes(bytemuck::cast_slice_mut(chunks)),
            );
        }
    }

    /// 依次访问全部活动粒子
    pub fn for_each_active_mut<F>(&mut self, f: F)
    where
        F: FnMut(usize, ParticleView<'_>),
    {
        self.for_each_in_range_mut(0..self.active, f);
    }

    /// 按活动顺序紧凑复制存活粒子（快照使用）
    ///
    /// 返回 16 字节分块，保证拷贝出的槽位与池内一样 4 字节对齐。
    pub fn compact_copy(&self) -> Vec<[u32; 4]> {
        let mut out = Vec::with_capacity(self.active * self.chunks_per_slot());
        for &slot in self.active_indices() {
            out.extend_from_slice(self.slot_chunks(slot as usize));
        }
        out
    }
}
