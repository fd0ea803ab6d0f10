#![cfg_attr(not(feature = "std"), no_std)]

//! A slab-based fixed-size object allocator layered beneath a
//! `malloc`/`free`/`realloc` front end.
//!
//! The core partitions memory into fixed-size slabs, each sub-divided into
//! equal-sized object slots drawn from a per-size [`allocator::SlabCache`],
//! and serves requests by routing them to the smallest cache whose slot
//! size and alignment satisfy the request. See `SPEC_FULL.md` at the
//! workspace root for the full design.
//!
//! The core is single-threaded and non-reentrant (no internal locking);
//! a multi-threaded caller wraps the whole front end in one exclusion
//! region. [`allocator::LockedAllocator`] does exactly that, e.g.:
//!
//! ```
//! # #[cfg(feature = "std")] {
//! use slab_alloc::allocator::{AllocatorConfig, LockedAllocator, bulk::SystemBulkSupplier};
//!
//! let bulk = SystemBulkSupplier;
//! let allocator: LockedAllocator = LockedAllocator::new(&bulk, &AllocatorConfig::default())
//!     .expect("default configuration always succeeds");
//!
//! let p = allocator.malloc(64, 8).expect("bulk supplier has memory to give");
//! allocator.free(p);
//! # }
//! ```

pub mod allocator;
