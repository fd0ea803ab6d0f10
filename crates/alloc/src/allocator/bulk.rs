// The bulk page supplier: an external collaborator (spec §6) that hands the
// core raw, unaligned memory regions. The core never returns regions to it
// in this design (slabs are retained in the empty list for reuse), but the
// trait still exposes `bulk_free` for symmetry and for a future reclamation
// policy (spec §9).

use core::ptr::NonNull;

/// Supplies raw, page-sized-or-larger memory regions to the slab core.
///
/// Implementors need not align the returned pointer; [`super::slab::Slab`]
/// realigns internally using the extra `alignment - 1` bytes the core
/// always requests on top of `SLAB_SIZE`.
pub trait BulkSupplier {
    /// Request `size` bytes. Returns `None` (not a panic) when exhausted.
    fn bulk_alloc(&self, size: usize) -> Option<NonNull<u8>>;

    /// Return a previously allocated region of `size` bytes.
    ///
    /// # Safety
    /// `ptr` must have been returned by a prior `bulk_alloc(size)` call on
    /// this same supplier and not already freed.
    unsafe fn bulk_free(&self, ptr: NonNull<u8>, size: usize);
}

/// A [`BulkSupplier`] backed by the host allocator, for `std` tests.
#[cfg(feature = "std")]
pub struct SystemBulkSupplier;

#[cfg(feature = "std")]
impl BulkSupplier for SystemBulkSupplier {
    fn bulk_alloc(&self, size: usize) -> Option<NonNull<u8>> {
        // 16-byte base alignment is enough: the core adds `alignment - 1`
        // slack bytes to every request and realigns `payload_base` itself.
        let layout = std::alloc::Layout::from_size_align(size, 16).ok()?;
        // SAFETY: layout has non-zero size, checked by Layout construction
        // failing on size 0 only when align is invalid, which it is not here.
        let ptr = unsafe { std::alloc::alloc(layout) };
        NonNull::new(ptr)
    }

    unsafe fn bulk_free(&self, ptr: NonNull<u8>, size: usize) {
        let layout = match std::alloc::Layout::from_size_align(size, 16) {
            Ok(layout) => layout,
            Err(_) => return,
        };
        // SAFETY: caller guarantees ptr/size match a prior bulk_alloc call.
        unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) };
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn system_supplier_returns_usable_memory() {
        let supplier = SystemBulkSupplier;
        let ptr = supplier.bulk_alloc(4096).expect("allocation should succeed");
        // SAFETY: just-allocated region of 4096 bytes.
        unsafe {
            ptr.as_ptr().write_bytes(0xAB, 4096);
            assert_eq!(*ptr.as_ptr(), 0xAB);
            supplier.bulk_free(ptr, 4096);
        }
    }
}
