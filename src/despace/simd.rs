//! Keep-mask classification and compress-store kernels.
//!
//! Every kernel works on raw pointers so the same code serves both the
//! two-buffer API and in-place compaction. The write cursor never passes
//! the read cursor, and each chunk is fully loaded before any of it is
//! stored, so `dst == src` is always allowed.

use std::ptr;

/// Vector width in bytes: one 512-bit register.
pub const CHUNK: usize = 64;

/// The bytes removed by the despacer. CR, FF, VT and non-ASCII spaces are kept.
pub const WHITESPACE: [u8; 3] = [b' ', b'\t', b'\n'];

/// Returns true if `b` is one of the three removed bytes.
#[inline(always)]
pub fn is_despace_byte(b: u8) -> bool {
    b == b' ' || b == b'\t' || b == b'\n'
}

/// Classify a chunk lane-by-lane. Bit `k` of the result is set when
/// `chunk[k]` is kept.
#[inline]
pub fn keep_mask(chunk: &[u8; CHUNK]) -> u64 {
    let mut mask = 0u64;
    for (k, &b) in chunk.iter().enumerate() {
        let keep = (b != b' ') & (b != b'\t') & (b != b'\n');
        mask |= (keep as u64) << k;
    }
    mask
}

/// Pack the lanes of `chunk` selected by `mask` densely into the front of
/// `dst`, preserving their order. Returns `mask.count_ones()`.
///
/// Only the first `mask.count_ones()` bytes of `dst` are written, which
/// matches the masked store semantics of `vpcompressb`.
///
/// # Panics
///
/// Panics if `dst` is shorter than `mask.count_ones()`.
pub fn compress_store(chunk: &[u8; CHUNK], mask: u64, dst: &mut [u8]) -> usize {
    let count = mask.count_ones() as usize;
    assert!(
        dst.len() >= count,
        "compress_store: {} kept bytes do not fit in {} bytes",
        count,
        dst.len()
    );
    // SAFETY: dst is writable for `count` bytes and cannot alias the local chunk.
    unsafe { compress_raw(chunk, mask, dst.as_mut_ptr()) }
}

/// Portable compress-store. Writes exactly `mask.count_ones()` bytes.
///
/// # Safety
///
/// `dst` must be writable for `mask.count_ones()` bytes.
#[inline(always)]
unsafe fn compress_raw(chunk: &[u8; CHUNK], mask: u64, dst: *mut u8) -> usize {
    if mask == u64::MAX {
        unsafe { ptr::copy_nonoverlapping(chunk.as_ptr(), dst, CHUNK) };
        return CHUNK;
    }
    let mut m = mask;
    let mut j = 0;
    while m != 0 {
        let k = m.trailing_zeros() as usize;
        unsafe { *dst.add(j) = *chunk.get_unchecked(k) };
        j += 1;
        m &= m - 1;
    }
    j
}

/// Scalar remainder: always store the byte at the cursor, but only advance
/// past it when it is kept. Continues from the vector tier's cursors.
///
/// # Safety
///
/// `src` readable and `dst` writable for `len` bytes, `j <= i`.
#[inline(always)]
pub(super) unsafe fn scalar_tail(
    src: *const u8,
    dst: *mut u8,
    mut i: usize,
    mut j: usize,
    len: usize,
) -> usize {
    while i < len {
        unsafe {
            let b = *src.add(i);
            *dst.add(j) = b;
            j += !is_despace_byte(b) as usize;
        }
        i += 1;
    }
    j
}

/// Lane compare and compress in portable Rust, 64 bytes per step.
///
/// # Safety
///
/// `src` readable and `dst` writable for `len` bytes; either disjoint or equal.
pub(super) unsafe fn despace_portable(src: *const u8, dst: *mut u8, len: usize) -> usize {
    let mut i = 0;
    let mut j = 0;
    while i + CHUNK <= len {
        let chunk = unsafe { ptr::read_unaligned(src.add(i).cast::<[u8; CHUNK]>()) };
        let mask = keep_mask(&chunk);
        // j <= i, and i + CHUNK <= len, so the packed bytes stay in bounds.
        j += unsafe { compress_raw(&chunk, mask, dst.add(j)) };
        i += CHUNK;
    }
    unsafe { scalar_tail(src, dst, i, j, len) }
}

/// Bulk-copy the runs between whitespace bytes located with `memchr3`.
/// Fast when whitespace is sparse; degrades on dense input.
///
/// # Safety
///
/// `src` readable and `dst` writable for `len` bytes; either disjoint or equal.
pub(super) unsafe fn despace_memchr(src: *const u8, dst: *mut u8, len: usize) -> usize {
    let [space, tab, newline] = WHITESPACE;
    let mut i = 0;
    let mut j = 0;
    while i < len {
        // The borrow ends before the copy below writes into the same memory.
        let rest = unsafe { std::slice::from_raw_parts(src.add(i), len - i) };
        let run = memchr::memchr3(space, tab, newline, rest).unwrap_or(rest.len());
        if run > 0 {
            if i != j || !ptr::eq(src, dst) {
                unsafe { ptr::copy(src.add(i), dst.add(j), run) };
            }
            j += run;
        }
        i += run + 1;
    }
    j
}

/// AVX2 classification (two 32-lane compares per chunk), portable compress.
///
/// # Safety
///
/// CPU must support AVX2. `src` readable and `dst` writable for `len` bytes;
/// either disjoint or equal.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
pub(super) unsafe fn despace_avx2(src: *const u8, dst: *mut u8, len: usize) -> usize {
    unsafe {
        use std::arch::x86_64::*;

        let space = _mm256_set1_epi8(b' ' as i8);
        let tab = _mm256_set1_epi8(b'\t' as i8);
        let newline = _mm256_set1_epi8(b'\n' as i8);

        let mut i = 0;
        let mut j = 0;
        while i + CHUNK <= len {
            let lo = _mm256_loadu_si256(src.add(i).cast::<__m256i>());
            let hi = _mm256_loadu_si256(src.add(i + 32).cast::<__m256i>());

            let ws_lo = _mm256_or_si256(
                _mm256_or_si256(_mm256_cmpeq_epi8(lo, space), _mm256_cmpeq_epi8(lo, tab)),
                _mm256_cmpeq_epi8(lo, newline),
            );
            let ws_hi = _mm256_or_si256(
                _mm256_or_si256(_mm256_cmpeq_epi8(hi, space), _mm256_cmpeq_epi8(hi, tab)),
                _mm256_cmpeq_epi8(hi, newline),
            );
            let ws = (_mm256_movemask_epi8(ws_lo) as u32 as u64)
                | ((_mm256_movemask_epi8(ws_hi) as u32 as u64) << 32);

            let chunk = ptr::read_unaligned(src.add(i).cast::<[u8; CHUNK]>());
            j += compress_raw(&chunk, !ws, dst.add(j));
            i += CHUNK;
        }
        scalar_tail(src, dst, i, j, len)
    }
}

/// AVX-512BW compare plus VBMI2 `vpcompressb` masked compress-store.
///
/// # Safety
///
/// CPU must support AVX-512F, AVX-512BW and AVX-512 VBMI2. `src` readable
/// and `dst` writable for `len` bytes; either disjoint or equal.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx512f,avx512bw,avx512vbmi2")]
pub(super) unsafe fn despace_avx512(src: *const u8, dst: *mut u8, len: usize) -> usize {
    unsafe {
        use std::arch::x86_64::*;

        let space = _mm512_set1_epi8(b' ' as i8);
        let tab = _mm512_set1_epi8(b'\t' as i8);
        let newline = _mm512_set1_epi8(b'\n' as i8);

        let mut i = 0;
        let mut j = 0;
        while i + CHUNK <= len {
            let data = _mm512_loadu_si512(src.add(i).cast());
            let mask: u64 = _mm512_cmpneq_epi8_mask(data, space)
                & _mm512_cmpneq_epi8_mask(data, tab)
                & _mm512_cmpneq_epi8_mask(data, newline);
            // Masked store: only `popcount(mask)` bytes are touched.
            _mm512_mask_compressstoreu_epi8(dst.add(j).cast(), mask, data);
            j += mask.count_ones() as usize;
            i += CHUNK;
        }
        scalar_tail(src, dst, i, j, len)
    }
}
