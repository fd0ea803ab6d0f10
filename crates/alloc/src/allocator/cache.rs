// A slab cache: all the slabs serving one (object_size, alignment) size
// class, and the state machine that moves them between full/partial/empty
// as occupancy crosses the boundaries (spec §3, §4.3).

use core::mem::size_of;
use core::ptr::NonNull;

use slab_error::AllocError;

use super::bulk::BulkSupplier;
use super::list::IntrusiveList;
use super::slab::{align_up, Slab};

/// Constructor hook, run on slot activation. Must not fail (spec §7).
pub type CtorFn = fn(NonNull<u8>, usize);
/// Destructor hook, run on slot deactivation. Must not fail (spec §7).
pub type DtorFn = fn(NonNull<u8>, usize);

/// All slabs for one (object_size, alignment) size class.
///
/// # Invariants (spec §3)
/// - Every slab belongs to exactly one of `full`/`partial`/`empty`.
/// - `active == 0 <-> empty`, `active == capacity <-> full`, else `partial`.
/// - `capacity >= 1` once initialized (`init`/`new` reject the alternative).
pub struct SlabCache {
    object_size: usize,
    alignment: usize,
    stride: usize,
    capacity: usize,
    slab_size: usize,
    ctor: Option<CtorFn>,
    dtor: Option<DtorFn>,
    partial: IntrusiveList<Slab>,
    full: IntrusiveList<Slab>,
    empty: IntrusiveList<Slab>,
    total_allocs: u64,
    total_frees: u64,
}

impl SlabCache {
    /// An uninitialized cache-array slot. `object_size == 0` marks it
    /// absent, per spec §3 ("Cache array"): it sorts to the front and can
    /// never satisfy a request of any positive size, so the front end's
    /// linear scan skips it automatically.
    pub const fn absent() -> Self {
        Self {
            object_size: 0,
            alignment: 0,
            stride: 0,
            capacity: 0,
            slab_size: 0,
            ctor: None,
            dtor: None,
            partial: IntrusiveList::new(),
            full: IntrusiveList::new(),
            empty: IntrusiveList::new(),
            total_allocs: 0,
            total_frees: 0,
        }
    }

    pub fn is_absent(&self) -> bool {
        self.object_size == 0
    }

    /// Derive slot capacity per page for this `(object_size, alignment,
    /// slab_size)` triple: `floor((slab_size - header) / (stride + index))`.
    fn capacity_for(object_size: usize, alignment: usize, slab_size: usize) -> usize {
        let stride = align_up(object_size, alignment);
        let header = Slab::HEADER_SIZE;
        if slab_size <= header {
            return 0;
        }
        (slab_size - header) / (stride + size_of::<usize>())
    }

    /// Initialize an absent cache slot for `(object_size, alignment)`.
    ///
    /// Fails with [`AllocError::RequestTooLarge`] if the resulting capacity
    /// would be zero (spec §3: "capacity >= 1 (init fails otherwise)").
    pub fn init(
        &mut self,
        object_size: usize,
        alignment: usize,
        slab_size: usize,
        ctor: Option<CtorFn>,
        dtor: Option<DtorFn>,
    ) -> Result<(), AllocError> {
        let alignment = if alignment == 0 { 1 } else { alignment };
        let capacity = Self::capacity_for(object_size, alignment, slab_size);
        if capacity == 0 {
            return Err(AllocError::RequestTooLarge);
        }

        *self = Self {
            object_size,
            alignment,
            stride: align_up(object_size, alignment),
            capacity,
            slab_size,
            ctor,
            dtor,
            partial: IntrusiveList::new(),
            full: IntrusiveList::new(),
            empty: IntrusiveList::new(),
            total_allocs: 0,
            total_frees: 0,
        };
        Ok(())
    }

    pub fn object_size(&self) -> usize {
        self.object_size
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `(total_allocs, total_frees)`, kept for diagnostics only — not part
    /// of any spec invariant.
    pub fn stats(&self) -> (u64, u64) {
        (self.total_allocs, self.total_frees)
    }

    /// `(partial_len, full_len, empty_len)`, for asserting the "membership
    /// matches active" invariant (spec §3, §8 property 2) from outside this
    /// module.
    pub fn list_lens(&self) -> (usize, usize, usize) {
        (self.partial.len(), self.full.len(), self.empty.len())
    }

    /// Serve one allocation (spec §4.3 "Serve one allocation").
    ///
    /// Partial always wins over empty (step 1 before step 2) to keep
    /// locality and leave the empty list as a small reuse pool.
    pub fn alloc(&mut self, bulk: &dyn BulkSupplier) -> Result<NonNull<u8>, AllocError> {
        let mut slab_ptr = if let Some(head) = self.partial.head() {
            head
        } else if let Some(mut reclaimed) = self.empty.pop_front() {
            // SAFETY: reclaimed was just unlinked from empty, not yet a
            // member of any other list.
            unsafe { self.partial.push_front(reclaimed.as_mut()) };
            reclaimed
        } else {
            // SAFETY: capacity >= 1 is guaranteed by `init`/`capacity_for`.
            let mut created =
                unsafe { Slab::create(bulk, self.alignment, self.capacity, self.slab_size)? };
            // SAFETY: created is fresh, not yet a member of any list.
            unsafe { self.partial.push_front(created.as_mut()) };
            created
        };

        // SAFETY: slab_ptr is a valid member of partial, inserted above.
        let slab = unsafe { slab_ptr.as_mut() };
        let Some(addr) = slab.alloc_slot(self.stride) else {
            // Unreachable given the invariants above (a slab just pulled
            // from partial/empty/fresh always has a free slot), but
            // propagated rather than unwrapped.
            return Err(AllocError::OutOfMemory);
        };

        // SAFETY: addr was just returned by alloc_slot, so it is non-null
        // (payload_base is derived from a NonNull bulk-allocated region).
        let ptr = unsafe { NonNull::new_unchecked(addr as *mut u8) };

        if let Some(ctor) = self.ctor {
            ctor(ptr, self.object_size);
        }

        if slab.is_full() {
            self.partial.remove(slab);
            self.full.push_front(slab);
        }

        self.total_allocs += 1;
        log::debug!(
            "slab_alloc: object_size={} served, active={}/{}",
            self.object_size,
            slab.active(),
            self.capacity
        );
        Ok(ptr)
    }

    /// Serve one free, given the owning slab (spec §4.3 "Serve one free").
    ///
    /// # Safety
    /// `ptr` must currently be checked out from `slab`, and `slab` must be
    /// a member of one of this cache's three lists.
    pub unsafe fn free_in_slab(&mut self, slab: &mut Slab, ptr: NonNull<u8>) {
        let was_full = slab.is_full();

        if let Some(dtor) = self.dtor {
            dtor(ptr, self.object_size);
        }
        // SAFETY: caller guarantees ptr is checked out from slab.
        unsafe { slab.free_slot(ptr.as_ptr() as usize, self.stride) };

        if was_full {
            self.full.remove(slab);
            self.partial.push_front(slab);
        }
        // Not an `else`: a capacity-1 slab goes full -> partial -> empty in
        // the same free (spec note on the full->empty edge case).
        if slab.is_empty() {
            self.partial.remove(slab);
            self.empty.push_front(slab);
        }

        self.total_frees += 1;
    }

    /// Find the slab in `partial` or `full` whose payload range contains
    /// `ptr` (spec §4.4 "Owner-slab lookup"). Empty slabs hold no live
    /// pointers, so they are not scanned.
    pub fn find_owner(&mut self, ptr: usize) -> Option<NonNull<Slab>> {
        let stride = self.stride;
        Self::scan_list(&mut self.partial, ptr, stride)
            .or_else(|| Self::scan_list(&mut self.full, ptr, stride))
    }

    fn scan_list(list: &mut IntrusiveList<Slab>, ptr: usize, stride: usize) -> Option<NonNull<Slab>> {
        let mut cursor = list.head();
        while let Some(node) = cursor {
            // SAFETY: node is a member of `list`, which this cache owns
            // exclusively while &mut self is held.
            let slab_ref = unsafe { &*node.as_ptr() };
            if slab_ref.contains(ptr, stride) {
                return Some(node);
            }
            cursor = slab_ref.next();
        }
        None
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::allocator::bulk::SystemBulkSupplier;

    #[test]
    fn absent_cache_has_zero_object_size() {
        let cache = SlabCache::absent();
        assert!(cache.is_absent());
        assert_eq!(cache.capacity(), 0);
    }

    #[test]
    fn init_rejects_object_size_too_large_for_slab() {
        let mut cache = SlabCache::absent();
        let err = cache.init(8192, 8, 4096, None, None).unwrap_err();
        assert_eq!(err, AllocError::RequestTooLarge);
    }

    #[test]
    fn capacity_matches_formula() {
        let mut cache = SlabCache::absent();
        cache.init(32, 8, 4096, None, None).unwrap();
        let expected = (4096 - Slab::HEADER_SIZE) / (32 + size_of::<usize>());
        assert_eq!(cache.capacity(), expected);
    }

    // Scenario B/C/D/E from spec §8.
    #[test]
    fn full_cycle_moves_slabs_between_lists() {
        let bulk = SystemBulkSupplier;
        let mut cache = SlabCache::absent();
        cache.init(32, 8, 4096, None, None).unwrap();
        let capacity = cache.capacity();

        let mut first_allocs = std::vec::Vec::new();
        for _ in 0..capacity {
            first_allocs.push(cache.alloc(&bulk).unwrap());
        }
        assert!(cache.partial.is_empty());
        assert!(cache.empty.is_empty());
        assert_eq!(cache.full.len(), 1);

        // C: one more alloc creates a second slab in partial.
        let extra = cache.alloc(&bulk).unwrap();
        assert_eq!(cache.full.len(), 1);
        assert_eq!(cache.partial.len(), 1);

        // D: freeing one object from the full slab moves it to partial.
        let first_ptr = first_allocs[0];
        let owner = cache.find_owner(first_ptr.as_ptr() as usize).unwrap();
        let owner_ref = unsafe { &mut *owner.as_ptr() };
        unsafe { cache.free_in_slab(owner_ref, first_ptr) };
        assert!(cache.full.is_empty());
        assert_eq!(cache.partial.len(), 2);

        // E: freeing the rest of the first slab moves it to empty.
        for &ptr in &first_allocs[1..] {
            let owner = cache.find_owner(ptr.as_ptr() as usize).unwrap();
            let owner_ref = unsafe { &mut *owner.as_ptr() };
            unsafe { cache.free_in_slab(owner_ref, ptr) };
        }
        assert_eq!(cache.empty.len(), 1);
        assert_eq!(cache.partial.len(), 1);

        let _ = extra;
    }

    #[test]
    fn ctor_and_dtor_run_on_activation_and_deactivation() {
        fn fill_aa(ptr: NonNull<u8>, size: usize) {
            unsafe { ptr.as_ptr().write_bytes(0xAA, size) };
        }
        fn fill_dd(ptr: NonNull<u8>, size: usize) {
            unsafe { ptr.as_ptr().write_bytes(0xDD, size) };
        }

        let bulk = SystemBulkSupplier;
        let mut cache = SlabCache::absent();
        cache.init(128, 8, 4096, Some(fill_aa), Some(fill_dd)).unwrap();

        let ptr = cache.alloc(&bulk).unwrap();
        assert_eq!(unsafe { *ptr.as_ptr() }, 0xAA);

        let owner = cache.find_owner(ptr.as_ptr() as usize).unwrap();
        let owner_ref = unsafe { &mut *owner.as_ptr() };
        unsafe { cache.free_in_slab(owner_ref, ptr) };
        assert_eq!(unsafe { *ptr.as_ptr() }, 0xDD);
    }

    #[test]
    fn capacity_one_slab_goes_straight_from_full_to_empty() {
        let bulk = SystemBulkSupplier;
        let mut cache = SlabCache::absent();
        // object_size chosen so capacity_for(..) == 1 for this slab_size.
        cache.init(3000, 8, 4096, None, None).unwrap();
        assert_eq!(cache.capacity(), 1);

        let p = cache.alloc(&bulk).unwrap();
        assert_eq!(cache.full.len(), 1);
        assert!(cache.partial.is_empty());

        let owner = cache.find_owner(p.as_ptr() as usize).unwrap();
        let owner_ref = unsafe { &mut *owner.as_ptr() };
        unsafe { cache.free_in_slab(owner_ref, p) };

        assert!(cache.full.is_empty());
        assert!(cache.partial.is_empty());
        assert_eq!(cache.empty.len(), 1, "a capacity-1 slab must end up in empty, not stuck in partial");
    }

    #[test]
    fn lifo_hotness_same_cache_returns_same_pointer() {
        let bulk = SystemBulkSupplier;
        let mut cache = SlabCache::absent();
        cache.init(64, 8, 4096, None, None).unwrap();

        let p = cache.alloc(&bulk).unwrap();
        let owner = cache.find_owner(p.as_ptr() as usize).unwrap();
        let owner_ref = unsafe { &mut *owner.as_ptr() };
        unsafe { cache.free_in_slab(owner_ref, p) };
        let q = cache.alloc(&bulk).unwrap();
        assert_eq!(p, q);
    }
}
