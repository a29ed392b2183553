// Tensor-region overlap index: maps live output regions to their
// producing task so the orchestrator can turn "submitted a task that
// reads these bytes" into a fanin edge on whoever last wrote them.
//
// Two region shapes are modeled, matching spec §3: `TensorRegion`, the
// legacy flat `(base, tile_index, offset, size)` form used by simple
// contiguous-buffer submissions, and `LogicalTensor`, the extended
// strided-view form needed once a task submits a reshape/transpose/view
// over another tensor's storage. Both reduce to the same
// `[min_byte_offset, max_byte_offset)` bounding box for the fast overlap
// path; `LogicalTensor` additionally carries enough shape/stride
// information for the exact 1-D GCD check.

use arrayvec::ArrayVec;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use xxhash_rust::xxh3::xxh3_64;

use crate::interval_tree::IntervalTree;
use crate::task::TaskId;

pub const MAX_DIMS: usize = 8;

/// Legacy flat region: a contiguous byte range within one allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorRegion {
    pub raw_base: usize,
    pub tile_index: u32,
    pub offset: usize,
    pub size: usize,
}

impl TensorRegion {
    pub fn to_logical(self) -> LogicalTensor {
        LogicalTensor {
            raw_base: self.raw_base,
            storage_offset: self.offset,
            elem_size: 1,
            shape: [self.size].into_iter().collect(),
            strides: [1isize].into_iter().collect(),
            ndim: 1,
            numel: self.size,
            min_byte_offset: self.offset,
            max_byte_offset: self.offset + self.size,
            extraction_type: ExtractionType::Raw,
            is_contiguous: true,
        }
    }
}

/// How a [`LogicalTensor`] relates to the storage it was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionType {
    Raw,
    View,
    Reshape,
    Transpose,
    DeepView,
    DeepReshape,
    DeepTranspose,
}

/// Extended, strided-view tensor region.
#[derive(Debug, Clone)]
pub struct LogicalTensor {
    pub raw_base: usize,
    pub storage_offset: usize,
    pub elem_size: usize,
    pub shape: ArrayVec<usize, MAX_DIMS>,
    pub strides: ArrayVec<isize, MAX_DIMS>,
    pub ndim: u8,
    pub numel: usize,
    pub min_byte_offset: usize,
    pub max_byte_offset: usize,
    pub extraction_type: ExtractionType,
    pub is_contiguous: bool,
}

impl LogicalTensor {
    pub fn contiguous(
        raw_base: usize,
        storage_offset: usize,
        shape: &[usize],
        elem_size: usize,
    ) -> Self {
        let ndim = shape.len();
        let mut strides = vec![0isize; ndim];
        let mut acc: isize = 1;
        for i in (0..ndim).rev() {
            strides[i] = acc;
            acc *= shape[i] as isize;
        }
        let numel: usize = shape.iter().product();
        let span = if numel == 0 { 0 } else { numel * elem_size };
        let min_byte_offset = storage_offset * elem_size;
        Self {
            raw_base,
            storage_offset,
            elem_size,
            shape: shape.iter().copied().collect(),
            strides: strides.into_iter().collect(),
            ndim: ndim as u8,
            numel,
            min_byte_offset,
            max_byte_offset: min_byte_offset + span,
            extraction_type: ExtractionType::Raw,
            is_contiguous: true,
        }
    }

    /// Builds a transposed view (permuted shape/strides) of `self`,
    /// recomputing the bounding box from the new stride pattern.
    pub fn transposed(&self, perm: &[usize]) -> Self {
        debug_assert_eq!(perm.len(), self.ndim as usize);
        let shape: ArrayVec<usize, MAX_DIMS> = perm.iter().map(|&i| self.shape[i]).collect();
        let strides: ArrayVec<isize, MAX_DIMS> = perm.iter().map(|&i| self.strides[i]).collect();
        let (min_off, max_off) = bounding_box(self.storage_offset, &shape, &strides, self.elem_size);
        Self {
            raw_base: self.raw_base,
            storage_offset: self.storage_offset,
            elem_size: self.elem_size,
            shape,
            strides,
            ndim: self.ndim,
            numel: self.numel,
            min_byte_offset: min_off,
            max_byte_offset: max_off,
            extraction_type: ExtractionType::Transpose,
            is_contiguous: false,
        }
    }
}

fn bounding_box(
    storage_offset: usize,
    shape: &[usize],
    strides: &[isize],
    elem_size: usize,
) -> (usize, usize) {
    let mut min_elem: isize = storage_offset as isize;
    let mut max_elem: isize = storage_offset as isize;
    for (&dim, &stride) in shape.iter().zip(strides) {
        if dim == 0 {
            continue;
        }
        let span = stride * (dim as isize - 1);
        if stride >= 0 {
            max_elem += span;
        } else {
            min_elem += span;
        }
    }
    ((min_elem as usize) * elem_size, (max_elem as usize + 1) * elem_size)
}

/// Bounding-box fast path: conservative, always correct, may report a
/// false-positive overlap for non-contiguous strided regions.
#[inline]
pub fn bbox_overlap(a: &LogicalTensor, b: &LogicalTensor) -> bool {
    a.raw_base == b.raw_base
        && a.min_byte_offset < b.max_byte_offset
        && b.min_byte_offset < a.max_byte_offset
}

/// Exact overlap check for two 1-D strided regions sharing the same
/// base: two arithmetic progressions `offset_a + i*stride_a` (i in
/// `[0, n_a)`) and `offset_b + j*stride_b` (j in `[0, n_b)`) intersect
/// iff the Diophantine equation `i*stride_a - j*stride_b = offset_b -
/// offset_a` has an integer solution AND that solution's family crosses
/// both index ranges (spec §4.3 step 3) — a shared residue class modulo
/// `gcd(stride_a, stride_b)` is necessary but not sufficient, since the
/// two progressions are bounded. Falls back to the bounding-box verdict
/// for anything that isn't 1-D.
pub fn overlap_1d_exact(a: &LogicalTensor, b: &LogicalTensor) -> bool {
    if a.ndim != 1 || b.ndim != 1 {
        return bbox_overlap(a, b);
    }
    if !bbox_overlap(a, b) {
        return false;
    }
    let sa = a.strides[0] as i64;
    let sb = b.strides[0] as i64;
    if sa == 0 || sb == 0 {
        return bbox_overlap(a, b);
    }
    let n_a = a.shape[0] as i64;
    let n_b = b.shape[0] as i64;
    let oa = a.storage_offset as i64;
    let ob = b.storage_offset as i64;
    let delta = ob - oa;

    // i*sa - j*sb = delta
    let (g, x, y) = extended_gcd(sa, -sb);
    if delta % g != 0 {
        return false;
    }
    let scale = delta / g;
    let i0 = x * scale;
    let j0 = y * scale;
    let step_i = sb / g;
    let step_j = sa / g;

    let Some((lo_i, hi_i)) = solve_t_range(i0, step_i, n_a) else {
        return false;
    };
    let Some((lo_j, hi_j)) = solve_t_range(j0, step_j, n_b) else {
        return false;
    };
    lo_i.max(lo_j) <= hi_i.min(hi_j)
}

/// Solves `a*x + b*y = gcd(a, b)` for `(gcd, x, y)`, with `gcd >= 0`.
fn extended_gcd(a: i64, b: i64) -> (i64, i64, i64) {
    fn eg(a: i64, b: i64) -> (i64, i64, i64) {
        if b == 0 {
            return (a, 1, 0);
        }
        let (g, x1, y1) = eg(b, a % b);
        (g, y1, x1 - (a / b) * y1)
    }
    let (g, x, y) = eg(a, b);
    if g < 0 {
        (-g, -x, -y)
    } else {
        (g, x, y)
    }
}

fn floor_div(n: i64, d: i64) -> i64 {
    let q = n / d;
    let r = n % d;
    if r != 0 && (r < 0) != (d < 0) {
        q - 1
    } else {
        q
    }
}

fn ceil_div(n: i64, d: i64) -> i64 {
    -floor_div(-n, d)
}

/// Range of `t` for which `0 <= index0 + t*step < n`, or `None` if no
/// integer `t` satisfies it. `step` is never 0 (caller rejects zero
/// strides before this point).
fn solve_t_range(index0: i64, step: i64, n: i64) -> Option<(i64, i64)> {
    let (lo, hi) = if step > 0 {
        (ceil_div(-index0, step), floor_div(n - 1 - index0, step))
    } else {
        (ceil_div(n - 1 - index0, step), floor_div(-index0, step))
    };
    if lo > hi {
        None
    } else {
        Some((lo, hi))
    }
}

/// Dispatches to the exact 1-D check when both regions are 1-D and
/// contiguous-strided; otherwise falls back to the conservative
/// bounding-box predicate (spec §4.3 hybrid overlap predicate).
pub fn hybrid_overlap(a: &LogicalTensor, b: &LogicalTensor) -> bool {
    if a.raw_base != b.raw_base {
        return false;
    }
    if a.ndim == 1 && b.ndim == 1 {
        overlap_1d_exact(a, b)
    } else {
        bbox_overlap(a, b)
    }
}

/// One region-index entry: a live output region and the task that
/// produced it.
#[derive(Debug, Clone)]
pub struct TensorMapEntry {
    pub region: LogicalTensor,
    pub producer_task_id: TaskId,
    pub retired_at: Option<u64>,
}

enum Bucket {
    Linear(Vec<TensorMapEntry>),
    Tree(IntervalTree),
}

impl Bucket {
    fn len(&self) -> usize {
        match self {
            Bucket::Linear(v) => v.len(),
            Bucket::Tree(t) => t.len(),
        }
    }
}

/// Hash-bucketed overlap index over live tensor regions.
///
/// Buckets key on `raw_base` (spec §4.3); a bucket is promoted from a
/// linear scan to an AVL interval tree once it grows past
/// `interval_tree_threshold` entries, trading insert cost for bounded
/// query cost on heavily-aliased allocations.
pub struct RegionIndex {
    buckets: Mutex<FxHashMap<u64, Bucket>>,
    interval_tree_threshold: usize,
    retired_count: AtomicU64,
    cleanup_interval: u64,
}

impl RegionIndex {
    pub fn new(interval_tree_threshold: usize, cleanup_interval: u64) -> Self {
        Self {
            buckets: Mutex::new(FxHashMap::default()),
            interval_tree_threshold,
            retired_count: AtomicU64::new(0),
            cleanup_interval,
        }
    }

    fn bucket_key(raw_base: usize) -> u64 {
        xxh3_64(&raw_base.to_ne_bytes())
    }

    pub fn insert(&self, region: LogicalTensor, producer_task_id: TaskId) {
        let key = Self::bucket_key(region.raw_base);
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(key).or_insert_with(|| Bucket::Linear(Vec::new()));
        match bucket {
            Bucket::Linear(entries) => {
                entries.push(TensorMapEntry {
                    region,
                    producer_task_id,
                    retired_at: None,
                });
                if entries.len() > self.interval_tree_threshold {
                    let drained = std::mem::take(entries);
                    let mut tree = IntervalTree::new();
                    for e in drained {
                        tree.insert(e);
                    }
                    *bucket = Bucket::Tree(tree);
                }
            }
            Bucket::Tree(tree) => {
                tree.insert(TensorMapEntry {
                    region,
                    producer_task_id,
                    retired_at: None,
                });
            }
        }
    }

    /// Returns the most recent live producer overlapping `query`, if any.
    pub fn lookup(&self, query: &LogicalTensor) -> Option<TaskId> {
        let mut found: Option<(usize, TaskId)> = None;
        self.for_each_overlap(query, |entry| {
            if entry.retired_at.is_none()
                && found.map_or(true, |(id, _)| entry.producer_task_id as usize > id)
            {
                found = Some((entry.producer_task_id as usize, entry.producer_task_id));
            }
        });
        found.map(|(_, id)| id)
    }

    /// Returns every live producer overlapping `query`, most recent
    /// first, bounded by the output slice's length.
    pub fn lookup_all(&self, query: &LogicalTensor, out: &mut [TaskId]) -> usize {
        let mut hits: Vec<TaskId> = Vec::new();
        self.for_each_overlap(query, |entry| {
            if entry.retired_at.is_none() {
                hits.push(entry.producer_task_id);
            }
        });
        hits.sort_unstable_by(|a, b| b.cmp(a));
        let n = hits.len().min(out.len());
        out[..n].copy_from_slice(&hits[..n]);
        n
    }

    fn for_each_overlap(&self, query: &LogicalTensor, mut f: impl FnMut(&TensorMapEntry)) {
        let key = Self::bucket_key(query.raw_base);
        let buckets = self.buckets.lock();
        let Some(bucket) = buckets.get(&key) else {
            return;
        };
        match bucket {
            Bucket::Linear(entries) => {
                for e in entries {
                    if hybrid_overlap(&e.region, query) {
                        f(e);
                    }
                }
            }
            Bucket::Tree(tree) => tree.query_overlap(query, &mut f),
        }
    }

    /// Marks every live entry produced by `task_id` as retired at the
    /// given logical retirement tick, and runs `cleanup_retired` every
    /// `cleanup_interval` retirements (spec §4.3).
    pub fn sync_validity(&self, task_id: TaskId) {
        let tick = self.retired_count.fetch_add(1, Ordering::AcqRel) + 1;
        let mut buckets = self.buckets.lock();
        for bucket in buckets.values_mut() {
            match bucket {
                Bucket::Linear(entries) => {
                    for e in entries.iter_mut() {
                        if e.producer_task_id == task_id && e.retired_at.is_none() {
                            e.retired_at = Some(tick);
                        }
                    }
                }
                Bucket::Tree(tree) => tree.retire_producer(task_id, tick),
            }
        }
        drop(buckets);
        if tick % self.cleanup_interval == 0 {
            self.cleanup_retired(tick.saturating_sub(self.cleanup_interval * 4));
        }
    }

    /// Drops entries retired at or before `older_than_tick`, reclaiming
    /// bucket storage for allocations that are no longer referenced by
    /// any live task.
    pub fn cleanup_retired(&self, older_than_tick: u64) {
        let mut buckets = self.buckets.lock();
        buckets.retain(|_, bucket| {
            match bucket {
                Bucket::Linear(entries) => {
                    entries.retain(|e| {
                        e.retired_at.map_or(true, |t| t > older_than_tick)
                    });
                    !entries.is_empty()
                }
                Bucket::Tree(tree) => {
                    tree.remove_stale(older_than_tick);
                    tree.len() > 0
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(base: usize, offset: usize, len: usize) -> LogicalTensor {
        LogicalTensor::contiguous(base, offset, &[len], 1)
    }

    #[test]
    fn overlapping_byte_ranges_are_detected() {
        let a = region(0x1000, 0, 16);
        let b = region(0x1000, 8, 16);
        assert!(hybrid_overlap(&a, &b));
    }

    #[test]
    fn disjoint_ranges_do_not_overlap() {
        let a = region(0x1000, 0, 16);
        let b = region(0x1000, 16, 16);
        assert!(!hybrid_overlap(&a, &b));
    }

    #[test]
    fn different_base_never_overlaps() {
        let a = region(0x1000, 0, 16);
        let b = region(0x2000, 0, 16);
        assert!(!hybrid_overlap(&a, &b));
    }

    #[test]
    fn strided_1d_gcd_eliminates_false_positive() {
        // a: offset 0, stride 4, 4 elements -> bytes {0,4,8,12}
        // b: offset 2, stride 4, 4 elements -> bytes {2,6,10,14}
        // bounding boxes overlap (0..16 vs 2..18) but no byte coincides
        let mut a = region(0x1000, 0, 4);
        a.strides[0] = 4;
        a.max_byte_offset = a.min_byte_offset + 4 * 4;
        let mut b = region(0x1000, 2, 4);
        b.strides[0] = 4;
        b.max_byte_offset = b.min_byte_offset + 4 * 4;
        assert!(bbox_overlap(&a, &b));
        assert!(!overlap_1d_exact(&a, &b));
    }

    #[test]
    fn bbox_overlap_without_shared_index_is_rejected() {
        // a: offset 0, stride 100, 2 elements -> {0, 100}
        // b: offset 1, stride 3, 2 elements -> {1, 4}
        // bounding boxes overlap (0..101 vs 1..5) and gcd(100,3) = 1
        // divides every integer, but the two bounded progressions share
        // no actual index.
        let mut a = region(0x1000, 0, 2);
        a.strides[0] = 100;
        a.max_byte_offset = a.min_byte_offset + 100 * 2;
        let mut b = region(0x1000, 1, 2);
        b.strides[0] = 3;
        b.max_byte_offset = b.min_byte_offset + 3 * 2;
        assert!(bbox_overlap(&a, &b));
        assert!(!overlap_1d_exact(&a, &b));
    }

    #[test]
    fn region_index_lookup_finds_latest_producer() {
        let index = RegionIndex::new(32, 64);
        index.insert(region(0x1000, 0, 16), 1);
        index.insert(region(0x1000, 0, 16), 2);
        let hit = index.lookup(&region(0x1000, 4, 4));
        assert_eq!(hit, Some(2));
    }

    #[test]
    fn retired_entries_are_excluded_from_lookup() {
        let index = RegionIndex::new(32, 64);
        index.insert(region(0x1000, 0, 16), 1);
        index.sync_validity(1);
        assert_eq!(index.lookup(&region(0x1000, 0, 16)), None);
    }
}
