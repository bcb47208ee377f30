use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

use rayon::prelude::*;

use super::error::DespaceError;
use super::simd;

/// Inputs above this size are despaced in parallel by `despace_write`.
pub const PAR_THRESHOLD: usize = 4 * 1024 * 1024;

/// Slice size handed to each rayon task. A multiple of the vector width so
/// every slice but the last runs entirely in the vector tier.
pub const PAR_CHUNK: usize = 1024 * 1024;

/// Strategy used for the vector tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kernel {
    /// No vector tier; every byte goes through the scalar loop.
    Scalar,
    /// 64-byte chunks with portable lane compare and compress.
    Portable,
    /// `memchr3` search for whitespace plus bulk copies of the runs between.
    Memchr,
    /// AVX2 keep-mask, portable compress.
    Avx2,
    /// AVX-512BW keep-mask, VBMI2 `vpcompressb` compress-store.
    Avx512,
}

impl Kernel {
    pub const ALL: [Kernel; 5] = [
        Kernel::Scalar,
        Kernel::Portable,
        Kernel::Memchr,
        Kernel::Avx2,
        Kernel::Avx512,
    ];

    /// Best kernel the running CPU supports.
    pub fn detect() -> Kernel {
        if Kernel::Avx512.is_supported() {
            Kernel::Avx512
        } else if Kernel::Avx2.is_supported() {
            Kernel::Avx2
        } else {
            Kernel::Portable
        }
    }

    /// Whether this kernel can run on the current CPU.
    pub fn is_supported(self) -> bool {
        match self {
            Kernel::Scalar | Kernel::Portable | Kernel::Memchr => true,
            #[cfg(target_arch = "x86_64")]
            Kernel::Avx2 => is_x86_feature_detected!("avx2"),
            #[cfg(target_arch = "x86_64")]
            Kernel::Avx512 => {
                is_x86_feature_detected!("avx512f")
                    && is_x86_feature_detected!("avx512bw")
                    && is_x86_feature_detected!("avx512vbmi2")
            }
            #[cfg(not(target_arch = "x86_64"))]
            Kernel::Avx2 | Kernel::Avx512 => false,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Kernel::Scalar => "scalar",
            Kernel::Portable => "portable",
            Kernel::Memchr => "memchr",
            Kernel::Avx2 => "avx2",
            Kernel::Avx512 => "avx512",
        }
    }

    /// Unsupported hardware kernels fall back to `Portable`.
    #[inline]
    fn resolve(self) -> Kernel {
        if self.is_supported() {
            self
        } else {
            Kernel::Portable
        }
    }

    /// Run the kernel over `len` bytes.
    ///
    /// # Safety
    ///
    /// `src` must be readable and `dst` writable for `len` bytes, and the two
    /// regions must be either disjoint or identical.
    unsafe fn run(self, src: *const u8, dst: *mut u8, len: usize) -> usize {
        unsafe {
            match self.resolve() {
                Kernel::Scalar => simd::scalar_tail(src, dst, 0, 0, len),
                Kernel::Portable => simd::despace_portable(src, dst, len),
                Kernel::Memchr => simd::despace_memchr(src, dst, len),
                #[cfg(target_arch = "x86_64")]
                Kernel::Avx2 => simd::despace_avx2(src, dst, len),
                #[cfg(target_arch = "x86_64")]
                Kernel::Avx512 => simd::despace_avx512(src, dst, len),
                #[cfg(not(target_arch = "x86_64"))]
                Kernel::Avx2 | Kernel::Avx512 => simd::despace_portable(src, dst, len),
            }
        }
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Kernel {
    type Err = DespaceError;

    /// Parses a kernel name; `auto` resolves to `Kernel::detect()`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Kernel::detect()),
            "scalar" => Ok(Kernel::Scalar),
            "portable" => Ok(Kernel::Portable),
            "memchr" => Ok(Kernel::Memchr),
            "avx2" => Ok(Kernel::Avx2),
            "avx512" => Ok(Kernel::Avx512),
            _ => Err(DespaceError::UnknownKernel(s.to_string())),
        }
    }
}

// ============================================================================
// Slice API
// ============================================================================

/// Remove spaces, tabs and newlines from `src` into `dst`, returning the
/// number of bytes written. `dst[..n]` holds the result; bytes past `n` are
/// unspecified.
///
/// `dst` must be at least as long as `src`, even though usually fewer bytes
/// are kept: the vector tier works a whole chunk at a time.
pub fn despace(src: &[u8], dst: &mut [u8]) -> Result<usize, DespaceError> {
    despace_with(Kernel::detect(), src, dst)
}

/// `despace` with an explicit kernel.
pub fn despace_with(kernel: Kernel, src: &[u8], dst: &mut [u8]) -> Result<usize, DespaceError> {
    if dst.len() < src.len() {
        return Err(DespaceError::DestinationTooSmall {
            needed: src.len(),
            capacity: dst.len(),
        });
    }
    if src.is_empty() {
        return Ok(0);
    }
    // SAFETY: src is readable and dst writable for src.len() bytes; a shared
    // and a mutable borrow never overlap.
    Ok(unsafe { kernel.run(src.as_ptr(), dst.as_mut_ptr(), src.len()) })
}

/// Despace into a freshly allocated, exactly sized `Vec`.
pub fn despace_to_vec(src: &[u8]) -> Vec<u8> {
    despace_to_vec_with(Kernel::detect(), src)
}

pub fn despace_to_vec_with(kernel: Kernel, src: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; src.len()];
    let n = if src.is_empty() {
        0
    } else {
        // SAFETY: out has exactly src.len() bytes and is a separate allocation.
        unsafe { kernel.run(src.as_ptr(), out.as_mut_ptr(), src.len()) }
    };
    out.truncate(n);
    out
}

/// Compact `buf` in place. Returns the new logical length; `buf[..n]` holds
/// the despaced bytes.
pub fn despace_in_place(buf: &mut [u8]) -> usize {
    despace_in_place_with(Kernel::detect(), buf)
}

pub fn despace_in_place_with(kernel: Kernel, buf: &mut [u8]) -> usize {
    if buf.is_empty() {
        return 0;
    }
    let len = buf.len();
    let ptr = buf.as_mut_ptr();
    // SAFETY: identical regions are allowed; every kernel loads a chunk before
    // storing it and keeps the write cursor at or behind the read cursor.
    unsafe { kernel.run(ptr, ptr, len) }
}

// ============================================================================
// Writer API
// ============================================================================

/// Despace a fully materialized input (typically an mmap) into `writer`.
/// Returns the number of bytes written.
///
/// Inputs larger than `PAR_THRESHOLD` are split into `PAR_CHUNK` slices and
/// despaced in parallel with rayon, a batch of slices at a time; each batch's
/// outputs are written in order before the next batch starts.
pub fn despace_write(kernel: Kernel, data: &[u8], writer: &mut impl Write) -> io::Result<u64> {
    if data.is_empty() {
        return Ok(0);
    }

    if data.len() > PAR_THRESHOLD {
        return despace_write_batched(kernel, data, writer, par_batch_slices());
    }

    let out = despace_to_vec_with(kernel, data);
    writer.write_all(&out)?;
    Ok(out.len() as u64)
}

/// Two slices in flight per worker keeps every thread busy while peak output
/// memory stays at `2 * threads * PAR_CHUNK`, independent of input size.
fn par_batch_slices() -> usize {
    rayon::current_num_threads().max(1) * 2
}

/// Parallel path of `despace_write`: `batch_slices` slices of `PAR_CHUNK`
/// bytes are despaced concurrently, then written, then dropped.
pub(super) fn despace_write_batched(
    kernel: Kernel,
    data: &[u8],
    writer: &mut impl Write,
    batch_slices: usize,
) -> io::Result<u64> {
    let batch_len = PAR_CHUNK * batch_slices.max(1);
    let mut total = 0u64;
    for batch in data.chunks(batch_len) {
        let outputs: Vec<Vec<u8>> = batch
            .par_chunks(PAR_CHUNK)
            .map(|chunk| despace_to_vec_with(kernel, chunk))
            .collect();
        for out in &outputs {
            writer.write_all(out)?;
            total += out.len() as u64;
        }
    }
    Ok(total)
}
