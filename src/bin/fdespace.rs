use std::io::{self, BufWriter, Write};
#[cfg(unix)]
use std::mem::ManuallyDrop;
#[cfg(unix)]
use std::os::unix::io::FromRawFd;
use std::path::Path;
use std::process;

use clap::Parser;

use despace_rs::common::io::{FileData, read_file, read_stdin};
use despace_rs::common::{io_error_msg, reset_sigpipe};
use despace_rs::despace::{self, DespaceError, Kernel};

#[derive(Parser)]
#[command(
    name = "fdespace",
    version,
    about = "Remove spaces, tabs and newlines from each FILE (or standard input) and write the result to standard output",
    override_usage = "fdespace [OPTION]... [FILE]..."
)]
struct Cli {
    /// Vector kernel: auto, scalar, portable, memchr, avx2 or avx512
    #[arg(short = 'k', long = "kernel", default_value = "auto", value_parser = parse_kernel)]
    kernel: Kernel,

    /// Print the number of bytes kept for each FILE instead of the bytes
    #[arg(short = 'c', long = "count")]
    count: bool,

    /// List the kernels and whether this CPU supports each one
    #[arg(long = "list-kernels")]
    list_kernels: bool,

    /// Input files; "-" or none means standard input
    files: Vec<String>,
}

fn parse_kernel(name: &str) -> Result<Kernel, DespaceError> {
    name.parse()
}

/// Enlarge pipe buffers on Linux so large piped inputs take fewer syscalls.
#[cfg(target_os = "linux")]
fn enlarge_pipes() {
    for &fd in &[0i32, 1] {
        for &size in &[8 * 1024 * 1024i32, 1024 * 1024, 256 * 1024] {
            if unsafe { libc::fcntl(fd, libc::F_SETPIPE_SZ, size) } > 0 {
                break;
            }
        }
    }
}

/// Despace one input into `out`. Owned buffers are compacted in place;
/// mapped files go through the (possibly parallel) writer path.
fn despace_data(kernel: Kernel, data: FileData, out: &mut impl Write) -> io::Result<u64> {
    match data {
        FileData::Owned(mut buf) => {
            let n = despace::despace_in_place_with(kernel, &mut buf);
            out.write_all(&buf[..n])?;
            Ok(n as u64)
        }
        FileData::Mmap(map) => despace::despace_write(kernel, &map, out),
    }
}

fn list_kernels() {
    let best = Kernel::detect();
    for kernel in Kernel::ALL {
        let status = if !kernel.is_supported() {
            "unsupported"
        } else if kernel == best {
            "supported (auto)"
        } else {
            "supported"
        };
        println!("{:<9} {}", kernel.name(), status);
    }
}

fn main() {
    reset_sigpipe();

    #[cfg(target_os = "linux")]
    enlarge_pipes();

    let cli = Cli::parse();

    if cli.list_kernels {
        list_kernels();
        return;
    }

    let kernel = if cli.kernel.is_supported() {
        cli.kernel
    } else {
        eprintln!(
            "fdespace: kernel '{}' not supported on this CPU, using {}",
            cli.kernel,
            Kernel::Portable
        );
        Kernel::Portable
    };

    let files: Vec<String> = if cli.files.is_empty() {
        vec!["-".to_string()]
    } else {
        cli.files
    };

    #[cfg(unix)]
    let stdout_raw = unsafe { ManuallyDrop::new(std::fs::File::from_raw_fd(1)) };
    #[cfg(unix)]
    let mut out = BufWriter::with_capacity(256 * 1024, &*stdout_raw);
    #[cfg(not(unix))]
    let stdout = io::stdout();
    #[cfg(not(unix))]
    let mut out = BufWriter::with_capacity(256 * 1024, stdout.lock());

    let mut had_error = false;

    for filename in &files {
        let data = if filename == "-" {
            match read_stdin() {
                Ok(d) => FileData::Owned(d),
                Err(e) => {
                    eprintln!("fdespace: standard input: {}", io_error_msg(&e));
                    had_error = true;
                    continue;
                }
            }
        } else {
            match read_file(Path::new(filename)) {
                Ok(d) => d,
                Err(e) => {
                    eprintln!("fdespace: {}: {}", filename, io_error_msg(&e));
                    had_error = true;
                    continue;
                }
            }
        };

        let result = if cli.count {
            despace::despace_write(kernel, &data, &mut io::sink())
                .and_then(|n| writeln!(out, "{} {}", n, filename))
        } else {
            despace_data(kernel, data, &mut out).map(|_| ())
        };

        if let Err(e) = result {
            if e.kind() == io::ErrorKind::BrokenPipe {
                process::exit(0);
            }
            eprintln!("fdespace: write error: {}", io_error_msg(&e));
            had_error = true;
        }
    }

    if let Err(e) = out.flush()
        && e.kind() != io::ErrorKind::BrokenPipe
    {
        eprintln!("fdespace: write error: {}", io_error_msg(&e));
        had_error = true;
    }

    if had_error {
        process::exit(1);
    }
}
