//! Fluent construction and execution of external commands with pipe, pty,
//! or in-place replacement attachment.

use std::collections::BTreeMap;
use std::env;
use std::ffi::{CString, OsString};
use std::fmt;
use std::io::{self, Write};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use nix::errno::Errno;
use nix::pty::openpty;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{chdir, dup2, execvpe, fork, pipe, setsid, ForkResult, Pid};

use crate::util;

/// How the child's exit status is folded into the `run` result.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// A nonzero exit status aborts the caller with a diagnostic.
    #[default]
    FatalOnNonzero,
    /// The exit status is handed back verbatim.
    ReturnCode,
}

/// How the child is attached to the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunMode {
    /// Fork and drain stdout/stderr through two pipes into the sinks.
    #[default]
    PipeCapture,
    /// Fork inside a fresh pty session and drain the master into `out`.
    PtyCapture,
    /// Replace the current process image; never returns on success.
    ExecReplace,
}

/// An external command plus everything needed to run it. Configure through
/// the chained methods, then consume it with [`CommandSpec::run`].
///
/// ```no_run
/// use crew::command::{CommandSpec, ErrorPolicy};
///
/// # fn main() -> anyhow::Result<()> {
/// let mut out: Vec<u8> = Vec::new();
/// let code = CommandSpec::new("git")
///     .arg("rev-parse")
///     .arg("--show-toplevel")
///     .out(&mut out)
///     .on_error(ErrorPolicy::ReturnCode)
///     .run()?;
/// # Ok(())
/// # }
/// ```
pub struct CommandSpec<'a> {
    program: String,
    args: Vec<String>,
    dir: Option<PathBuf>,
    env: BTreeMap<String, String>,
    verbose: bool,
    dry_run: bool,
    mode: RunMode,
    policy: ErrorPolicy,
    out: Option<&'a mut dyn Write>,
    err: Option<&'a mut dyn Write>,
}

impl<'a> CommandSpec<'a> {
    pub fn new(program: impl Into<String>) -> CommandSpec<'a> {
        CommandSpec {
            program: program.into(),
            args: Vec::new(),
            dir: None,
            env: BTreeMap::new(),
            verbose: false,
            dry_run: false,
            mode: RunMode::default(),
            policy: ErrorPolicy::default(),
            out: None,
            err: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Working directory the child switches to before exec.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Environment override for the child; later writes to the same key win.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn verbose(mut self, on: bool) -> Self {
        self.verbose = on;
        self
    }

    pub fn dry_run(mut self, on: bool) -> Self {
        self.dry_run = on;
        self
    }

    pub fn mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn on_error(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sink for the child's stdout (and the whole pty stream in pty mode).
    /// Defaults to the caller's stdout.
    pub fn out(mut self, sink: &'a mut dyn Write) -> Self {
        self.out = Some(sink);
        self
    }

    /// Sink for the child's stderr. Defaults to the caller's stderr.
    pub fn err(mut self, sink: &'a mut dyn Write) -> Self {
        self.err = Some(sink);
        self
    }

    /// Run the command and return its exit code. Consumes the spec; in
    /// `ExecReplace` mode this only returns on failure.
    pub fn run(mut self) -> Result<i32> {
        if self.verbose || self.dry_run {
            self.describe();
        }
        if self.dry_run {
            return Ok(0);
        }
        let image = ExecImage::prepare(&self)?;
        let code = match self.mode {
            RunMode::PipeCapture => run_pipes(&mut self, &image)?,
            RunMode::PtyCapture => run_pty(&mut self, &image)?,
            RunMode::ExecReplace => return Err(exec_replace(&image)),
        };
        if code != 0 && self.policy == ErrorPolicy::FatalOnNonzero {
            bail!("command \"{self}\" failed with non-zero exit status: {code}");
        }
        Ok(code)
    }

    fn describe(&self) {
        let mut text = String::new();
        text.push_str(if self.dry_run { "DRY: " } else { "LOG: " });
        text.push_str(&self.to_string());
        text.push('\n');
        if let Some(dir) = &self.dir {
            text.push_str(&format!("\t- executing from directory: {}\n", dir.display()));
        }
        if !self.env.is_empty() {
            text.push_str(&format!(
                "\t- overriding {} environment variables\n",
                self.env.len()
            ));
        }
        eprint!("{text}");
    }
}

impl fmt::Display for CommandSpec<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

// -------- exec image --------

/// Everything the exec needs, converted up front so the forked child does no
/// allocation between fork and exec.
struct ExecImage {
    prog: CString,
    argv: Vec<CString>,
    envp: Vec<CString>,
    dir: Option<PathBuf>,
}

impl ExecImage {
    fn prepare(spec: &CommandSpec<'_>) -> Result<ExecImage> {
        let prog = cstring(spec.program.as_bytes())?;
        let mut argv = Vec::with_capacity(spec.args.len() + 1);
        argv.push(prog.clone());
        for arg in &spec.args {
            argv.push(cstring(arg.as_bytes())?);
        }
        let mut merged: BTreeMap<OsString, OsString> = env::vars_os().collect();
        for (key, value) in &spec.env {
            merged.insert(OsString::from(key), OsString::from(value));
        }
        let mut envp = Vec::with_capacity(merged.len());
        for (key, value) in &merged {
            let mut entry = key.as_bytes().to_vec();
            entry.push(b'=');
            entry.extend_from_slice(value.as_bytes());
            envp.push(cstring(&entry)?);
        }
        Ok(ExecImage {
            prog,
            argv,
            envp,
            dir: spec.dir.clone(),
        })
    }

    /// Apply the directory override and replace the process image. Only
    /// returns on failure.
    fn replace(&self) -> anyhow::Error {
        if let Some(dir) = &self.dir {
            if let Err(e) = chdir(dir) {
                return anyhow!("failed to change directory to {}: {e}", dir.display());
            }
        }
        match execvpe(&self.prog, &self.argv, &self.envp) {
            Ok(infallible) => match infallible {},
            Err(e) => anyhow!("execvp failed: {e}"),
        }
    }
}

fn cstring(bytes: &[u8]) -> Result<CString> {
    CString::new(bytes).map_err(|_| anyhow!("command string contains an interior NUL byte"))
}

// -------- child side --------

/// Report a post-fork failure on the child's (already redirected) stderr and
/// terminate the process image without unwinding back into the caller's
/// duplicated state.
fn child_abort(err: anyhow::Error) -> ! {
    let msg = format!("error: {err}\n");
    let _ = util::write_all_fd(libc::STDERR_FILENO, msg.as_bytes());
    unsafe { libc::_exit(1) }
}

fn dup2_retry(oldfd: RawFd, newfd: RawFd) -> nix::Result<()> {
    loop {
        match dup2(oldfd, newfd) {
            Ok(_) => return Ok(()),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e),
        }
    }
}

fn child_pipes(out_w: &OwnedFd, err_w: &OwnedFd, image: &ExecImage) -> anyhow::Error {
    if let Err(e) = dup2_retry(out_w.as_raw_fd(), libc::STDOUT_FILENO) {
        return anyhow!("dup2 failed: {e}");
    }
    if let Err(e) = dup2_retry(err_w.as_raw_fd(), libc::STDERR_FILENO) {
        return anyhow!("dup2 failed: {e}");
    }
    image.replace()
}

fn child_pty(slave: &OwnedFd, image: &ExecImage) -> anyhow::Error {
    if let Err(e) = setsid() {
        return anyhow!("setsid failed: {e}");
    }
    // the fresh session has no controlling terminal yet; adopt the slave
    let _ = unsafe { libc::ioctl(slave.as_raw_fd(), libc::TIOCSCTTY, 0) };
    for fd in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        if let Err(e) = dup2_retry(slave.as_raw_fd(), fd) {
            return anyhow!("dup2 failed: {e}");
        }
    }
    image.replace()
}

// -------- run modes --------

fn run_pipes(spec: &mut CommandSpec<'_>, image: &ExecImage) -> Result<i32> {
    let (out_r, out_w) = pipe().map_err(|e| anyhow!("failed to create pipe: {e}"))?;
    let (err_r, err_w) = pipe().map_err(|e| anyhow!("failed to create pipe: {e}"))?;
    match unsafe { fork() }.map_err(|e| anyhow!("fork failed: {e}"))? {
        ForkResult::Child => {
            drop(out_r);
            drop(err_r);
            child_abort(child_pipes(&out_w, &err_w, image));
        }
        ForkResult::Parent { child } => {
            drop(out_w);
            drop(err_w);
            if util::debug_enabled() {
                eprintln!("[run] forked pid {child} for \"{spec}\"");
            }
            let mut fallback_out;
            let mut fallback_err;
            let out: &mut dyn Write = match &mut spec.out {
                Some(sink) => &mut **sink,
                None => {
                    fallback_out = io::stdout();
                    &mut fallback_out
                }
            };
            let err: &mut dyn Write = match &mut spec.err {
                Some(sink) => &mut **sink,
                None => {
                    fallback_err = io::stderr();
                    &mut fallback_err
                }
            };
            let mut targets: [(RawFd, &mut dyn Write); 2] =
                [(out_r.as_raw_fd(), out), (err_r.as_raw_fd(), err)];
            pump_fds(&mut targets)?;
            reap(child)
        }
    }
}

fn run_pty(spec: &mut CommandSpec<'_>, image: &ExecImage) -> Result<i32> {
    let pty = openpty(None, None).map_err(|e| anyhow!("failed to allocate pty: {e}"))?;
    match unsafe { fork() }.map_err(|e| anyhow!("fork failed: {e}"))? {
        ForkResult::Child => {
            drop(pty.master);
            child_abort(child_pty(&pty.slave, image));
        }
        ForkResult::Parent { child } => {
            drop(pty.slave);
            if util::debug_enabled() {
                eprintln!("[run] forked pid {child} on a pty for \"{spec}\"");
            }
            let mut fallback_out;
            let out: &mut dyn Write = match &mut spec.out {
                Some(sink) => &mut **sink,
                None => {
                    fallback_out = io::stdout();
                    &mut fallback_out
                }
            };
            let mut targets: [(RawFd, &mut dyn Write); 1] = [(pty.master.as_raw_fd(), out)];
            pump_fds(&mut targets)?;
            reap(child)
        }
    }
}

fn exec_replace(image: &ExecImage) -> anyhow::Error {
    // best effort: reattach the controlling terminal so the target program
    // talks to the user directly even if our standard streams were rewired
    let tty = unsafe { libc::open(b"/dev/tty\0".as_ptr() as *const libc::c_char, libc::O_RDWR) };
    if tty >= 0 {
        let _ = unsafe { libc::login_tty(tty) };
    }
    image.replace()
}

// -------- output pump --------

/// Drain every source fd into its sink until all of them report end of
/// stream, multiplexing with poll so a child filling several streams at once
/// cannot wedge the drain. EIO on a pty master means the peer closed and
/// counts as a normal end of stream; each sink is flushed once its source is
/// exhausted.
fn pump_fds(targets: &mut [(RawFd, &mut dyn Write)]) -> Result<()> {
    let mut open = vec![true; targets.len()];
    let mut buf = [0u8; 4096];
    while open.iter().any(|o| *o) {
        let mut fds: Vec<libc::pollfd> = Vec::with_capacity(targets.len());
        let mut index: Vec<usize> = Vec::with_capacity(targets.len());
        for (i, (fd, _)) in targets.iter().enumerate() {
            if open[i] {
                fds.push(libc::pollfd {
                    fd: *fd,
                    events: libc::POLLIN,
                    revents: 0,
                });
                index.push(i);
            }
        }
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
        if rc < 0 {
            let e = io::Error::last_os_error();
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            bail!("poll failed: {e}");
        }
        for (slot, pfd) in fds.iter().enumerate() {
            if pfd.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) == 0 {
                continue;
            }
            let i = index[slot];
            match nix::unistd::read(targets[i].0, &mut buf) {
                Ok(0) | Err(Errno::EIO) => {
                    targets[i]
                        .1
                        .flush()
                        .map_err(|e| anyhow!("failed to flush output sink: {e}"))?;
                    open[i] = false;
                    if util::debug_enabled() {
                        eprintln!("[run] fd {} drained", targets[i].0);
                    }
                }
                Ok(n) => {
                    targets[i]
                        .1
                        .write_all(&buf[..n])
                        .map_err(|e| anyhow!("failed to write captured output: {e}"))?;
                }
                Err(Errno::EINTR) => {}
                Err(e) => bail!("read() failed: {e}"),
            }
        }
    }
    Ok(())
}

fn reap(child: Pid) -> Result<i32> {
    match waitpid(child, None) {
        Ok(WaitStatus::Exited(_, code)) => Ok(code),
        Ok(_) => bail!("child failed to exit normally"),
        Err(e) => bail!("waitpid failed: {e}"),
    }
}
