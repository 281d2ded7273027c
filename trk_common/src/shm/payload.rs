//! Payload marker trait and layout hashing.
//!
//! Every value stored in a shared segment crosses a process boundary by raw
//! byte copy. `Payload` marks the types for which that is sound, and
//! `layout_hash` lets an attaching process detect that it disagrees with the
//! owner about the payload type.

/// Fixed-layout value type that can live in a shared segment.
///
/// # Safety
///
/// Implementors must:
/// - be `#[repr(C)]` (or a primitive / array of primitives) so the layout is
///   identical in every process built from this workspace,
/// - contain no pointers, references or handles that are only meaningful in
///   the process that created them,
/// - accept any bit pattern written by another process's copy of the same
///   type (no niche-carrying fields such as `bool` read from foreign bytes
///   that were not produced by a valid value).
pub unsafe trait Payload: Copy + Default + Send + 'static {}

macro_rules! impl_payload_primitive {
    ($($ty:ty),* $(,)?) => {
        $(
            // SAFETY: plain numeric primitive without indirection.
            unsafe impl Payload for $ty {}
        )*
    };
}

impl_payload_primitive!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

// SAFETY: an array of payloads has the element's layout repeated N times.
unsafe impl<T: Payload, const N: usize> Payload for [T; N] where [T; N]: Default {}

/// Compile-time layout hash for payload compatibility detection.
///
/// Computes a hash from `size_of::<T>()` and `align_of::<T>()`.
/// If the payload layout changes, the hash changes, and an attaching
/// `Source` refuses to connect.
///
/// **Known limitation**: does not detect field reordering within the
/// same total size and alignment.
pub const fn layout_hash<T>() -> u32 {
    let size = core::mem::size_of::<T>() as u32;
    let align = core::mem::align_of::<T>() as u32;
    size.wrapping_mul(0x9E3779B9) ^ align.wrapping_mul(0x517CC1B7)
}
