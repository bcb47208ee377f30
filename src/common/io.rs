use std::fs::File;
use std::io::{self, Read};
use std::ops::Deref;
use std::path::Path;

use memmap2::{Mmap, MmapOptions};

/// A whole input file: mapped read-only, or owned (and so mutable in place).
pub enum FileData {
    Mmap(Mmap),
    Owned(Vec<u8>),
}

impl Deref for FileData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            FileData::Mmap(m) => m,
            FileData::Owned(v) => v,
        }
    }
}

/// Files below 1MB are read into a Vec; mapping them costs more in page
/// table setup than it saves in copying.
const MMAP_THRESHOLD: u64 = 1024 * 1024;

/// Initial stdin buffer. Grows by doubling.
const STDIN_PREALLOC: usize = 4 * 1024 * 1024;

/// Open `path` and load its full contents.
///
/// Regular files of at least `MMAP_THRESHOLD` bytes are memory-mapped; if
/// mapping fails they are read instead. Everything else (small files,
/// FIFOs, character devices) is read into an owned buffer.
pub fn read_file(path: &Path) -> io::Result<FileData> {
    let file = File::open(path)?;
    let metadata = file.metadata()?;
    let len = metadata.len();

    if !metadata.file_type().is_file() {
        let mut buf = Vec::new();
        (&file).read_to_end(&mut buf)?;
        return Ok(FileData::Owned(buf));
    }
    if len == 0 {
        return Ok(FileData::Owned(Vec::new()));
    }

    if len >= MMAP_THRESHOLD {
        // SAFETY: read-only private mapping; concurrent truncation by another
        // process is outside what a filter can defend against.
        if let Ok(mmap) = unsafe { MmapOptions::new().map(&file) } {
            #[cfg(target_os = "linux")]
            {
                let _ = mmap.advise(memmap2::Advice::Sequential);
                let _ = mmap.advise(memmap2::Advice::WillNeed);
            }
            return Ok(FileData::Mmap(mmap));
        }
    }

    let size = buffer_len(len)?;
    let mut buf = vec![0u8; size];
    let n = read_full(&mut &file, &mut buf)?;
    buf.truncate(n);
    // The file may have grown since fstat.
    if n == size {
        (&file).read_to_end(&mut buf)?;
    }
    Ok(FileData::Owned(buf))
}

/// Convert a file size to a buffer length. Sizes that do not fit in the
/// address space (32-bit targets) are reported as out of memory.
fn buffer_len(len: u64) -> io::Result<usize> {
    usize::try_from(len).map_err(|_| {
        io::Error::new(
            io::ErrorKind::OutOfMemory,
            format!("file of {} bytes does not fit in memory", len),
        )
    })
}

/// Read all of standard input into an owned buffer.
pub fn read_stdin() -> io::Result<Vec<u8>> {
    let mut stdin = io::stdin().lock();
    let mut buf: Vec<u8> = Vec::with_capacity(STDIN_PREALLOC);
    let mut chunk = vec![0u8; STDIN_PREALLOC];
    loop {
        match stdin.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(buf)
}

/// Fill `buf` from `reader`, stopping early only at EOF.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}
