//! Small helpers shared by the process and terminal layers.

use std::env;
use std::io;
use std::os::fd::RawFd;
use std::sync::OnceLock;

/// True when `CREW_DEBUG` is set; gates internal tracing on stderr.
pub fn debug_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| env::var_os("CREW_DEBUG").is_some())
}

/// Write the whole buffer to a raw fd, retrying on EINTR.
pub fn write_all_fd(fd: RawFd, mut buf: &[u8]) -> io::Result<()> {
    while !buf.is_empty() {
        let n = unsafe { libc::write(fd, buf.as_ptr() as *const libc::c_void, buf.len()) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0"));
        }
        buf = &buf[n as usize..];
    }
    Ok(())
}

/// Split a line on single spaces. Interior empty tokens are kept; a trailing
/// separator does not produce a final empty token, and an empty line yields
/// no tokens at all.
pub fn tokenize(line: &str) -> Vec<String> {
    if line.is_empty() {
        return Vec::new();
    }
    let mut tokens: Vec<String> = line.split(' ').map(str::to_string).collect();
    if line.ends_with(' ') {
        tokens.pop();
    }
    tokens
}
