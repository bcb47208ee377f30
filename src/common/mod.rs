pub mod io;

/// Restore the default SIGPIPE disposition so `fdespace | head` ends quietly
/// with status 141 like other Unix filters. Rust ignores SIGPIPE by default.
/// Call first thing in `main()`.
#[inline]
pub fn reset_sigpipe() {
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }
}

/// Render an I/O error without Rust's " (os error N)" suffix, e.g.
/// "No such file or directory".
pub fn io_error_msg(e: &std::io::Error) -> String {
    match e.raw_os_error() {
        Some(code) => {
            let text = std::io::Error::from_raw_os_error(code).to_string();
            let suffix = format!(" (os error {})", code);
            text.strip_suffix(&suffix).unwrap_or(&text).to_string()
        }
        None => e.to_string(),
    }
}
