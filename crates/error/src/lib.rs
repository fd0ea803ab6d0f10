//! Allocator error handling infrastructure.
//!
//! Provides the `define_error!` macro for consistent error type definitions,
//! and the concrete error enums used by the slab allocator front end.

#![no_std]

/// Macro to define an error type with a subsystem byte and a numeric code
/// per variant.
///
/// Supports both simple variants and nested variants containing inner
/// errors.
#[macro_export]
macro_rules! define_error {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident($subsystem:literal) {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident $(($inner:ty))? = $code:literal => $desc:literal
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                $variant $(($inner))?,
            )*
        }

        impl $name {
            /// Subsystem identifier for this error type.
            pub const SUBSYSTEM: u8 = $subsystem;

            /// Numeric error code for diagnostics.
            pub const fn code(&self) -> u16 {
                match self {
                    $(
                        $crate::define_error!(@pattern $variant $(($inner))? _unused) => {
                            (($subsystem as u16) << 8) | $code
                        }
                    )*
                }
            }

            /// Error name for logging.
            pub const fn name(&self) -> &'static str {
                match self {
                    $(
                        $crate::define_error!(@pattern $variant $(($inner))? _unused) => {
                            $desc
                        }
                    )*
                }
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                match self {
                    $(
                        $crate::define_error!(@pattern $variant $(($inner))? inner) => {
                            $crate::define_error!(@display_body self f $desc $(($inner))? inner)
                        }
                    )*
                }
            }
        }

        impl core::error::Error for $name {}
    };

    (@pattern $variant:ident ($inner:ty) $bind:ident) => { Self::$variant($bind) };
    (@pattern $variant:ident $bind:ident) => { Self::$variant };

    (@display_body $self:ident $f:ident $desc:literal ($inner:ty) $bind:ident) => {
        write!($f, "E{:04X}: {} ({})", $self.code(), $desc, $bind)
    };
    (@display_body $self:ident $f:ident $desc:literal $bind:ident) => {
        write!($f, "E{:04X}: {}", $self.code(), $desc)
    };
}

define_error! {
    /// Failures surfaced by the slab front end (§7 of the design).
    ///
    /// These never propagate as unwinding exceptions; callers see them as
    /// `None`/null, and should consult the logged [`AllocError::name`] for
    /// the reason when a request unexpectedly fails.
    pub enum AllocError(0x01) {
        /// The bulk page supplier returned null.
        OutOfMemory = 0x01 => "bulk supplier exhausted",
        /// No size class fits and no uninitialized slot is free to create one.
        NoFittingCache = 0x02 => "no fitting size class available",
        /// Requested size exceeds what any slab payload could hold.
        RequestTooLarge = 0x03 => "requested size exceeds slab payload",
    }
}

define_error! {
    /// Non-fatal conditions raised by the canary-protected wrapper.
    ///
    /// Both variants are logged and then the operation proceeds, per
    /// spec §7: canary mismatches are "non-fatal by design" and invalid
    /// frees are "silently returned" in the source but "should at minimum
    /// be logged" in a rewrite.
    pub enum Diagnostic(0x02) {
        /// The trailing canary did not match on `free`.
        CanaryMismatch = 0x01 => "canary mismatch on free, possible buffer overrun",
        /// `free` was called with a pointer owned by no slab.
        InvalidFree = 0x02 => "free of pointer not owned by any slab",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    define_error! {
        pub enum TestError(0xFF) {
            First = 0x01 => "first error",
        }
    }

    #[test]
    fn codes_combine_subsystem_and_variant() {
        assert_eq!(AllocError::OutOfMemory.code(), 0x0101);
        assert_eq!(AllocError::NoFittingCache.code(), 0x0102);
        assert_eq!(AllocError::RequestTooLarge.code(), 0x0103);
        assert_eq!(Diagnostic::CanaryMismatch.code(), 0x0201);
        assert_eq!(Diagnostic::InvalidFree.code(), 0x0202);
        assert_eq!(TestError::First.code(), 0xFF01);
    }

    #[test]
    fn names_are_stable() {
        assert_eq!(AllocError::OutOfMemory.name(), "bulk supplier exhausted");
        assert_eq!(Diagnostic::InvalidFree.name(), "free of pointer not owned by any slab");
    }

    #[test]
    fn display_matches_code_and_name() {
        extern crate std;
        use std::format;
        assert_eq!(
            format!("{}", AllocError::RequestTooLarge),
            "E0103: requested size exceeds slab payload"
        );
    }

    #[test]
    fn derives_behave() {
        let e = AllocError::OutOfMemory;
        let e2 = e;
        assert_eq!(e, e2);
        extern crate std;
        use std::format;
        assert!(format!("{:?}", e).contains("OutOfMemory"));
    }
}
