//! Slab-based fixed-size object allocator.
//!
//! [`list`] is the intrusive list primitive; [`slab`] is a single page-sized
//! slab; [`cache`] is a collection of slabs for one size class; this module
//! is the front end: cache-array routing plus the canary-protected
//! `malloc`/`free`/`realloc` wrapper (spec §4.4).

pub mod bulk;
pub mod cache;
pub mod list;
pub mod slab;

use core::mem::size_of;
use core::ptr::NonNull;

use slab_error::{AllocError, Diagnostic};
use slab_utils::Mutex;

pub use bulk::BulkSupplier;
pub use cache::{CtorFn, DtorFn, SlabCache};
pub use slab::Slab;

/// Default slab region size (original default 4096, spec §6).
pub const DEFAULT_SLAB_SIZE: usize = 4096;
/// Default cache-array capacity (original default 10, spec §6).
pub const DEFAULT_MAX_CACHES: usize = 10;

const CANARY: [u8; 4] = [0xDE, 0xAD, 0xBE, 0xEF];

/// One pre-populated size class for [`AllocatorConfig::initial_caches`].
#[derive(Clone, Copy)]
pub struct InitialCache {
    pub object_size: usize,
    pub alignment: usize,
    pub ctor: Option<CtorFn>,
    pub dtor: Option<DtorFn>,
}

/// Construction-time configuration (spec §6 "Configuration").
pub struct AllocatorConfig<'a> {
    pub slab_size: usize,
    pub initial_caches: &'a [InitialCache],
    pub canary_enabled: bool,
}

impl Default for AllocatorConfig<'_> {
    fn default() -> Self {
        Self {
            slab_size: DEFAULT_SLAB_SIZE,
            initial_caches: &[],
            canary_enabled: false,
        }
    }
}

/// The slab-cache engine: an array of size classes, sorted non-decreasing
/// by `object_size`, routing requests to the smallest adequate cache.
///
/// `N` realizes spec §6's `max_caches` option: the cache array has no heap
/// allocation behind it, so its bound is a compile-time const generic
/// rather than a runtime field (see DESIGN.md for the reasoning). The
/// default of 10 matches the source's documented default.
pub struct SlabFrontEnd<'a, const N: usize = DEFAULT_MAX_CACHES> {
    caches: [SlabCache; N],
    bulk: &'a dyn BulkSupplier,
    slab_size: usize,
}

impl<'a, const N: usize> SlabFrontEnd<'a, N> {
    /// An allocator with no size classes yet; all `N` cache slots absent.
    pub const fn empty(bulk: &'a dyn BulkSupplier, slab_size: usize) -> Self {
        Self {
            caches: [const { SlabCache::absent() }; N],
            bulk,
            slab_size,
        }
    }

    /// Build an allocator and pre-populate it with `config.initial_caches`.
    pub fn new(bulk: &'a dyn BulkSupplier, config: &AllocatorConfig) -> Result<Self, AllocError> {
        let mut front_end = Self::empty(bulk, config.slab_size);
        for initial in config.initial_caches {
            front_end.create_cache(initial.object_size, initial.alignment, initial.ctor, initial.dtor)?;
        }
        Ok(front_end)
    }

    /// Select the first cache whose slot size and alignment satisfy the
    /// request (spec §4.4 "Select cache"). The array is kept sorted
    /// non-decreasing by `object_size`, so the first match is also the
    /// smallest adequate one.
    fn select_cache(&self, size: usize, alignment: usize) -> Option<usize> {
        self.caches
            .iter()
            .position(|c| !c.is_absent() && c.object_size() >= size && c.alignment() >= alignment)
    }

    /// Initialize the first absent slot for `(object_size, alignment)` and
    /// re-sort the array (spec §4.4 "On *NoFittingCache*...").
    fn create_cache(
        &mut self,
        object_size: usize,
        alignment: usize,
        ctor: Option<CtorFn>,
        dtor: Option<DtorFn>,
    ) -> Result<(), AllocError> {
        let slot = self
            .caches
            .iter()
            .position(SlabCache::is_absent)
            .ok_or(AllocError::NoFittingCache)?;
        self.caches[slot].init(object_size, alignment, self.slab_size, ctor, dtor)?;
        self.sort_caches();
        Ok(())
    }

    /// Insertion sort by `object_size`, ascending. Absent slots
    /// (`object_size == 0`) always sort to the front (spec §3).
    fn sort_caches(&mut self) {
        for i in 1..N {
            let mut j = i;
            while j > 0 && self.caches[j - 1].object_size() > self.caches[j].object_size() {
                self.caches.swap(j - 1, j);
                j -= 1;
            }
        }
    }

    /// Allocate `size` bytes aligned to `alignment` (spec §4.4 "Allocate").
    ///
    /// `alignment == 0` is treated as `alignment == 1` with a diagnostic
    /// (spec §4.4 "Alignment≡0 policy").
    pub fn allocate(&mut self, size: usize, alignment: usize) -> Option<NonNull<u8>> {
        let alignment = if alignment == 0 {
            log::debug!("slab_alloc: alignment 0 requested, treating as 1");
            1
        } else {
            alignment
        };

        if let Some(idx) = self.select_cache(size, alignment) {
            return self.alloc_from(idx);
        }

        match self.create_cache(size, alignment, None, None) {
            Ok(()) => match self.select_cache(size, alignment) {
                Some(idx) => self.alloc_from(idx),
                None => None,
            },
            Err(err) => {
                log::error!("slab_alloc: allocate({size}, {alignment}) failed: {err}");
                None
            }
        }
    }

    fn alloc_from(&mut self, idx: usize) -> Option<NonNull<u8>> {
        match self.caches[idx].alloc(self.bulk) {
            Ok(ptr) => Some(ptr),
            Err(err) => {
                log::error!("slab_alloc: {err}");
                None
            }
        }
    }

    /// Find the owning slab for `ptr` by address-range containment (spec
    /// §4.4 "Owner-slab lookup"): every initialized cache, partial then
    /// full, first match wins.
    pub(crate) fn find_owner(&mut self, ptr: usize) -> Option<(usize, NonNull<Slab>)> {
        for (idx, cache) in self.caches.iter_mut().enumerate() {
            if cache.is_absent() {
                continue;
            }
            if let Some(slab) = cache.find_owner(ptr) {
                return Some((idx, slab));
            }
        }
        None
    }

    pub(crate) fn object_size_at(&self, idx: usize) -> usize {
        self.caches[idx].object_size()
    }

    /// Free `ptr`, given it was returned by a prior `allocate` on this
    /// allocator. Returns `false` (and logs [`Diagnostic::InvalidFree`])
    /// if no slab owns `ptr` (spec §7 *InvalidFree*).
    pub fn free(&mut self, ptr: NonNull<u8>) -> bool {
        match self.find_owner(ptr.as_ptr() as usize) {
            Some((idx, mut slab)) => {
                // SAFETY: slab was just found as `ptr`'s owner.
                let slab_ref = unsafe { slab.as_mut() };
                // SAFETY: ptr is owned by slab_ref, checked out from it.
                unsafe { self.caches[idx].free_in_slab(slab_ref, ptr) };
                true
            }
            None => {
                log::warn!("slab_alloc: {}", Diagnostic::InvalidFree);
                false
            }
        }
    }
}

// SAFETY: the only pointer state here (IntrusiveList heads, Slab links) is
// reachable solely through &mut self; callers are responsible for
// synchronizing access across threads (spec §5: the core itself is
// single-threaded and non-reentrant).
unsafe impl<const N: usize> Send for SlabFrontEnd<'_, N> {}
unsafe impl<const N: usize> Sync for SlabFrontEnd<'_, N> {}

/// The canary-protected outer wrapper (spec §4.4 "Canary-protected
/// wrapper"): `mm_malloc`/`mm_free`/`mm_realloc` built on top of
/// [`SlabFrontEnd`], adding a trailing canary and a requested-size footer
/// for corruption detection when `canary_enabled` is set.
pub struct MmAllocator<'a, const N: usize = DEFAULT_MAX_CACHES> {
    core: SlabFrontEnd<'a, N>,
    canary_enabled: bool,
}

impl<'a, const N: usize> MmAllocator<'a, N> {
    pub fn new(bulk: &'a dyn BulkSupplier, config: &AllocatorConfig) -> Result<Self, AllocError> {
        Ok(Self {
            core: SlabFrontEnd::new(bulk, config)?,
            canary_enabled: config.canary_enabled,
        })
    }

    /// Expose the underlying core, e.g. for tests asserting on cache state.
    pub fn core(&mut self) -> &mut SlabFrontEnd<'a, N> {
        &mut self.core
    }

    pub fn mm_malloc(&mut self, size: usize, alignment: usize) -> Option<NonNull<u8>> {
        if !self.canary_enabled {
            return self.core.allocate(size, alignment);
        }

        let footer = size_of::<usize>();
        let total = match size.checked_add(CANARY.len()).and_then(|v| v.checked_add(footer)) {
            Some(total) => total,
            None => {
                log::error!("slab_alloc: {}", AllocError::RequestTooLarge);
                return None;
            }
        };

        let slot = self.core.allocate(total, alignment)?;
        // SAFETY: allocate() only returns pointers it just handed out.
        let (idx, _slab) = self.core.find_owner(slot.as_ptr() as usize)?;
        let slot_size = self.core.object_size_at(idx);

        // SAFETY: slot_size >= total = size + CANARY.len() + footer, so
        // both writes below land inside the slot.
        unsafe {
            let canary_at = slot.as_ptr().add(size);
            core::ptr::copy_nonoverlapping(CANARY.as_ptr(), canary_at, CANARY.len());
            slot.as_ptr()
                .add(slot_size - footer)
                .cast::<usize>()
                .write_unaligned(size);
        }

        Some(slot)
    }

    pub fn mm_free(&mut self, ptr: NonNull<u8>) {
        if !self.canary_enabled {
            self.core.free(ptr);
            return;
        }

        let Some((idx, _slab)) = self.core.find_owner(ptr.as_ptr() as usize) else {
            log::warn!("slab_alloc: {}", Diagnostic::InvalidFree);
            return;
        };
        let slot_size = self.core.object_size_at(idx);
        let footer = size_of::<usize>();

        // SAFETY: idx was just found as ptr's owning cache, so slot_size
        // is this slot's true capacity and the footer lies inside it.
        let n = unsafe {
            ptr.as_ptr()
                .add(slot_size - footer)
                .cast::<usize>()
                .read_unaligned()
        };

        let mut actual = [0u8; CANARY.len()];
        // SAFETY: canary was written at p + n by mm_malloc; n came from
        // that same slot's footer, so this read stays within the slot as
        // long as no write past offset n occurred (which is exactly the
        // corruption this check detects).
        unsafe { core::ptr::copy_nonoverlapping(ptr.as_ptr().add(n), actual.as_mut_ptr(), CANARY.len()) };
        if actual != CANARY {
            // Non-fatal by design (spec §7): log and proceed with the free.
            log::warn!("slab_alloc: {}", Diagnostic::CanaryMismatch);
        }

        self.core.free(ptr);
    }

    pub fn mm_realloc(&mut self, ptr: Option<NonNull<u8>>, size: usize, alignment: usize) -> Option<NonNull<u8>> {
        let Some(old_ptr) = ptr else {
            return self.mm_malloc(size, alignment);
        };

        let old_size = self.requested_size_of(old_ptr).unwrap_or(0);
        let new_ptr = self.mm_malloc(size, alignment)?;

        let copy_len = core::cmp::min(old_size, size);
        // SAFETY: old_ptr is a live allocation of at least old_size bytes,
        // new_ptr is a fresh allocation of at least size bytes, and
        // copy_len is the smaller of the two (spec §9 "adopt the second"
        // realloc variant — never read past the old block's own size).
        unsafe { core::ptr::copy_nonoverlapping(old_ptr.as_ptr(), new_ptr.as_ptr(), copy_len) };

        self.mm_free(old_ptr);
        Some(new_ptr)
    }

    fn requested_size_of(&mut self, ptr: NonNull<u8>) -> Option<usize> {
        let (idx, _slab) = self.core.find_owner(ptr.as_ptr() as usize)?;
        let slot_size = self.core.object_size_at(idx);

        if self.canary_enabled {
            let footer = size_of::<usize>();
            // SAFETY: idx was just found as ptr's owning cache.
            Some(unsafe {
                ptr.as_ptr()
                    .add(slot_size - footer)
                    .cast::<usize>()
                    .read_unaligned()
            })
        } else {
            // No footer is recorded without canary mode; the owning
            // slot's full capacity is the best available upper bound.
            // Overestimating here only risks copying slack bytes already
            // inside the same slot, never past it.
            Some(slot_size)
        }
    }
}

// SAFETY: same reasoning as SlabFrontEnd's impl above.
unsafe impl<const N: usize> Send for MmAllocator<'_, N> {}
unsafe impl<const N: usize> Sync for MmAllocator<'_, N> {}

/// An [`MmAllocator`] behind a [`slab_utils::Mutex`], for the common case of
/// one allocator instance shared across threads (spec §5 leaves locking to
/// the caller; this is the straightforward exclusion region it asks for).
pub struct LockedAllocator<'a, const N: usize = DEFAULT_MAX_CACHES> {
    inner: Mutex<MmAllocator<'a, N>>,
}

impl<'a, const N: usize> LockedAllocator<'a, N> {
    pub fn new(bulk: &'a dyn BulkSupplier, config: &AllocatorConfig) -> Result<Self, AllocError> {
        Ok(Self { inner: Mutex::new(MmAllocator::new(bulk, config)?) })
    }

    pub fn malloc(&self, size: usize, alignment: usize) -> Option<NonNull<u8>> {
        self.inner.lock().mm_malloc(size, alignment)
    }

    pub fn free(&self, ptr: NonNull<u8>) {
        self.inner.lock().mm_free(ptr);
    }

    pub fn realloc(&self, ptr: Option<NonNull<u8>>, size: usize, alignment: usize) -> Option<NonNull<u8>> {
        self.inner.lock().mm_realloc(ptr, size, alignment)
    }
}
