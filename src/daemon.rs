//! Daemon lifecycle: PID file locking, detaching from the terminal, signals.
//!
//! The lifecycle runs STARTING -> DETACHED -> RUNNING -> STOPPING -> STOPPED.
//! The PID file is locked in the invoking process before forking, so a second
//! `start` sees the lock and exits without sampling. The lock is inherited
//! across both forks and held until shutdown. The file names the invoking
//! process until the daemon rewrites it, and the invoking process stays alive
//! until then.
//!
//! The async runtime is only built after the last fork; forking a process
//! that already runs runtime threads is not safe.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use nix::sys::signal::{kill, Signal};
use nix::sys::stat::{umask, Mode};
use nix::unistd::{chdir, dup2, fork, getpid, pipe, setsid, ForkResult, Pid};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::collectors::ProcCounterSource;
use crate::config::{resolve_config, ConfigOverrides, DaemonConfig};
use crate::emitter::{Emitter, SinkTarget};
use crate::error::{ConfigError, DaemonizeError, ExitStatus};
use crate::scheduler::{Scheduler, SchedulerExit};

/// Lifecycle states of the daemon process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Detached,
    Running,
    Stopping,
    Stopped,
}

impl LifecycleState {
    /// Whether `self -> next` is a legal transition. Any state may fail over to STOPPED.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Starting, Detached)
                | (Starting, Running)
                | (Detached, Running)
                | (Running, Stopping)
                | (Stopping, Stopped)
                | (Starting, Stopped)
                | (Detached, Stopped)
                | (Running, Stopped)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Starting => "STARTING",
            LifecycleState::Detached => "DETACHED",
            LifecycleState::Running => "RUNNING",
            LifecycleState::Stopping => "STOPPING",
            LifecycleState::Stopped => "STOPPED",
        };
        f.write_str(name)
    }
}

/// Tracks and logs lifecycle transitions.
#[derive(Debug)]
pub struct Lifecycle {
    state: LifecycleState,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            state: LifecycleState::Starting,
        }
    }
}

impl Lifecycle {
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn transition(&mut self, next: LifecycleState) {
        if !self.state.can_transition_to(next) {
            warn!("Unexpected lifecycle transition {} -> {}", self.state, next);
        }
        info!("Lifecycle: {} -> {}", self.state, next);
        self.state = next;
    }
}

/// Requests delivered to the scheduler at tick boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Stop,
    Reload,
}

/// Outcome of trying to claim the PID file.
#[derive(Debug)]
pub enum PidLock {
    Acquired(PidFile),
    /// Another live instance holds the lock.
    AlreadyRunning(i32),
}

/// An exclusively locked PID file.
pub struct PidFile {
    path: PathBuf,
    file: Flock<File>,
}

impl fmt::Debug for PidFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PidFile").field("path", &self.path).finish()
    }
}

/// How often a locked PID file is re-read before its owner is declared gone.
const OWNER_RETRIES: u32 = 10;
const OWNER_BACKOFF: Duration = Duration::from_millis(100);

impl PidFile {
    /// Opens `path` and takes a non-blocking exclusive lock on it.
    ///
    /// On success the file already names the calling process. A lock held
    /// elsewhere may belong to an instance that is still starting, so its
    /// recorded pid is re-read for about a second; only a lock whose recorded
    /// process never shows up alive is reported as stale.
    pub fn acquire(path: &Path) -> Result<PidLock, DaemonizeError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .mode(0o644)
            .open(path)
            .map_err(|source| DaemonizeError::PidFileOpen {
                path: path.to_path_buf(),
                source,
            })?;

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(file) => {
                debug!("Locked PID file {}", path.display());
                let mut pid_file = PidFile {
                    path: path.to_path_buf(),
                    file,
                };
                pid_file.write_pid(getpid().as_raw())?;
                Ok(PidLock::Acquired(pid_file))
            }
            Err((_, Errno::EWOULDBLOCK)) => wait_for_owner(path),
            Err((_, errno)) => Err(DaemonizeError::PidFileLock {
                path: path.to_path_buf(),
                source: errno,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the file content with `pid` as a single decimal line.
    pub fn write_pid(&mut self, pid: i32) -> Result<(), DaemonizeError> {
        let path = self.path.clone();
        let file: &mut File = &mut self.file;
        file.set_len(0)
            .and_then(|_| file.seek(SeekFrom::Start(0)))
            .and_then(|_| writeln!(file, "{}", pid))
            .and_then(|_| file.sync_all())
            .map_err(|source| DaemonizeError::PidFileWrite { path, source })
    }

    /// Removes the PID file, then releases the lock.
    pub fn release(self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove PID file {}: {}", self.path.display(), e);
        }
        drop(self.file);
        debug!("Released PID file {}", self.path.display());
    }
}

/// Reads the process id recorded in a PID file. `Ok(None)` if missing or empty.
pub fn read_pid(path: &Path) -> std::io::Result<Option<i32>> {
    let mut content = String::new();
    match File::open(path) {
        Ok(mut file) => file.read_to_string(&mut content)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed.parse::<i32>().map(Some).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("invalid pid '{}': {}", trimmed, e),
        )
    })
}

/// Polls a PID file whose lock is held by someone else until it names a
/// live process.
fn wait_for_owner(path: &Path) -> Result<PidLock, DaemonizeError> {
    let mut detail = String::new();
    for attempt in 0..OWNER_RETRIES {
        if attempt > 0 {
            thread::sleep(OWNER_BACKOFF);
        }
        match read_pid(path) {
            Ok(Some(pid)) if process_alive(pid) => return Ok(PidLock::AlreadyRunning(pid)),
            Ok(Some(pid)) => detail = format!("recorded pid {} is not running", pid),
            Ok(None) => detail = "no pid recorded".into(),
            Err(e) => detail = e.to_string(),
        }
        debug!("PID file {} is locked but {}", path.display(), detail);
    }
    Err(DaemonizeError::StaleLock {
        path: path.to_path_buf(),
        detail,
    })
}

/// True if a process with `pid` exists, even if we may not signal it.
pub fn process_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => !is_zombie(pid),
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// An exited but unreaped process still accepts signal 0.
fn is_zombie(pid: i32) -> bool {
    fs::read_to_string(format!("/proc/{}/stat", pid))
        .ok()
        .and_then(|stat| {
            stat.rsplit_once(')')
                .map(|(_, rest)| rest.trim_start().starts_with('Z'))
        })
        .unwrap_or(false)
}

/// The pid recorded in `pid_file`, provided a running monitor still holds
/// its lock.
///
/// A PID file nobody has locked was left behind by a daemon that died; the
/// pid in it may since have been reused by an unrelated process.
pub fn locked_daemon_pid(pid_file: &Path) -> Result<i32, DaemonizeError> {
    let stale = |detail: String| DaemonizeError::StaleLock {
        path: pid_file.to_path_buf(),
        detail,
    };

    let file = File::open(pid_file).map_err(|e| stale(e.to_string()))?;
    match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
        // The lock taken here is released again on drop.
        Ok(_) => return Err(stale("not locked by a running monitor".into())),
        Err((_, Errno::EWOULDBLOCK)) => {}
        Err((_, errno)) => {
            return Err(DaemonizeError::PidFileLock {
                path: pid_file.to_path_buf(),
                source: errno,
            })
        }
    }

    let pid = read_pid(pid_file)
        .map_err(|e| stale(e.to_string()))?
        .ok_or_else(|| stale("no pid recorded".into()))?;
    if !process_alive(pid) {
        return Err(stale(format!("recorded pid {} is not running", pid)));
    }
    Ok(pid)
}

/// Sends `sig` to the monitor holding the lock on `pid_file`.
pub fn signal_daemon(pid_file: &Path, sig: Signal) -> Result<i32, DaemonizeError> {
    let pid = locked_daemon_pid(pid_file)?;
    kill(Pid::from_raw(pid), sig).map_err(|e| DaemonizeError::StaleLock {
        path: pid_file.to_path_buf(),
        detail: format!("pid {}: {}", pid, e),
    })?;
    Ok(pid)
}

/// Carries the daemon's startup outcome back to the process that ran `start`.
///
/// The invoking process only exits once the detached daemon has written its
/// pid and installed its signal handlers, or failed trying, so its exit
/// status reflects the real outcome. A default handle has no pipe and
/// reports nothing, as in foreground mode.
#[derive(Debug, Default)]
pub struct Readiness {
    reader: Option<File>,
    writer: Option<File>,
}

impl Readiness {
    pub fn pipe() -> Result<Self, DaemonizeError> {
        let (reader, writer) = pipe().map_err(DaemonizeError::Readiness)?;
        Ok(Self {
            reader: Some(File::from(reader)),
            writer: Some(File::from(writer)),
        })
    }

    /// Reports `status` once. Later calls do nothing.
    pub fn notify(&mut self, status: ExitStatus) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.write_all(&[status.code()]) {
                warn!("Failed to report startup status: {}", e);
            }
        }
    }

    /// Blocks until a status arrives. A pipe closed without one means the
    /// daemon died during startup.
    fn wait(&mut self) -> u8 {
        self.writer = None;
        let mut status = [0u8; 1];
        match self.reader.take() {
            Some(mut reader) => match reader.read_exact(&mut status) {
                Ok(()) => status[0],
                Err(_) => ExitStatus::Daemonize.code(),
            },
            None => ExitStatus::Daemonize.code(),
        }
    }
}

/// Detaches from the controlling terminal.
///
/// Forks twice with a `setsid` in between, so the daemon is not a session
/// leader and can never reacquire a terminal. The intermediate child exits
/// with status 0; the invoking process waits on `readiness` and exits with
/// whatever the daemon reports. Standard input is redirected to /dev/null
/// and standard output and error to `daemon_log`.
pub fn detach(daemon_log: &Path, readiness: &mut Readiness) -> Result<(), DaemonizeError> {
    // Open everything that can fail while errors still reach the terminal.
    let devnull = File::open("/dev/null")
        .map_err(|e| DaemonizeError::Redirect(format!("/dev/null: {}", e)))?;
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(daemon_log)
        .map_err(|e| DaemonizeError::Redirect(format!("{}: {}", daemon_log.display(), e)))?;

    // SAFETY: no other threads exist yet; the runtime is built after detaching.
    match unsafe { fork() }.map_err(DaemonizeError::Fork)? {
        ForkResult::Parent { child } => {
            debug!("Forked daemon child {}, waiting for startup", child);
            std::process::exit(i32::from(readiness.wait()));
        }
        ForkResult::Child => readiness.reader = None,
    }

    setsid().map_err(DaemonizeError::Setsid)?;

    // SAFETY: still single-threaded.
    match unsafe { fork() }.map_err(DaemonizeError::Fork)? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    chdir("/").map_err(DaemonizeError::Chdir)?;
    umask(Mode::from_bits_truncate(0o022));

    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();
    for (src, dst) in [
        (devnull.as_raw_fd(), 0),
        (log.as_raw_fd(), 1),
        (log.as_raw_fd(), 2),
    ] {
        dup2(src, dst).map_err(|e| DaemonizeError::Redirect(format!("fd {}: {}", dst, e)))?;
    }

    Ok(())
}

/// Forwards SIGTERM/SIGINT as [`Control::Stop`] and SIGHUP as [`Control::Reload`].
///
/// Must be called from within a tokio runtime.
pub fn spawn_signal_forwarder(
    tx: mpsc::Sender<Control>,
) -> Result<tokio::task::JoinHandle<()>, DaemonizeError> {
    let mut terminate = signal(SignalKind::terminate()).map_err(DaemonizeError::Signal)?;
    let mut interrupt = signal(SignalKind::interrupt()).map_err(DaemonizeError::Signal)?;
    let mut hangup = signal(SignalKind::hangup()).map_err(DaemonizeError::Signal)?;

    Ok(tokio::spawn(async move {
        loop {
            let control = tokio::select! {
                _ = terminate.recv() => {
                    info!("Received SIGTERM, stopping after the current tick");
                    Control::Stop
                }
                _ = interrupt.recv() => {
                    info!("Received SIGINT, stopping after the current tick");
                    Control::Stop
                }
                _ = hangup.recv() => {
                    info!("Received SIGHUP, reloading configuration");
                    Control::Reload
                }
            };
            if tx.send(control).await.is_err() {
                break;
            }
        }
    }))
}

/// Everything `start` needs from the command line.
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    pub overrides: ConfigOverrides,
    pub foreground: bool,
}

/// Makes every path in the overrides absolute, and pins the config file that
/// would be picked from the default locations, so that a reload after
/// `chdir("/")` reads the same files.
fn pin_overrides(overrides: &mut ConfigOverrides, base: &Path) {
    if overrides.config_path.is_none() && !overrides.no_config {
        overrides.config_path = crate::config::locate_config();
    }
    for path in [
        overrides.config_path.as_mut(),
        overrides.log_path.as_mut(),
        overrides.pid_file.as_mut(),
    ]
    .into_iter()
    .flatten()
    {
        crate::config::absolutize(path, base);
    }
}

/// Resolves, absolutizes and validates the configuration.
pub fn load_daemon_config(
    overrides: &ConfigOverrides,
    base: &Path,
) -> Result<DaemonConfig, ConfigError> {
    let mut config = resolve_config(overrides)?;
    config.absolutize(base);
    config.validate()?;
    Ok(config)
}

/// Gives up on startup after the PID file was claimed.
fn abandon(
    pid_file: PidFile,
    readiness: &mut Readiness,
    lifecycle: &mut Lifecycle,
    status: ExitStatus,
) -> ExitStatus {
    pid_file.release();
    readiness.notify(status);
    lifecycle.transition(LifecycleState::Stopped);
    status
}

/// Runs the full daemon lifecycle and returns the process exit status.
pub fn start(options: StartOptions) -> ExitStatus {
    let mut lifecycle = Lifecycle::default();
    info!("Lifecycle: {}", lifecycle.state());

    let base = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("❌ Cannot determine working directory: {}", e);
            return ExitStatus::Config;
        }
    };
    let mut overrides = options.overrides;
    pin_overrides(&mut overrides, &base);

    let config = match load_daemon_config(&overrides, &base) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Configuration invalid: {}", e);
            return ExitStatus::Config;
        }
    };
    if let Err(e) = config.create_parent_dirs() {
        eprintln!("❌ Configuration invalid: {}", e);
        return ExitStatus::Config;
    }

    let mut pid_file = match PidFile::acquire(&config.pid_file) {
        Ok(PidLock::Acquired(pid_file)) => pid_file,
        Ok(PidLock::AlreadyRunning(pid)) => {
            info!(
                "Monitor already running with pid {} ({}), nothing to do",
                pid,
                config.pid_file.display()
            );
            return ExitStatus::Success;
        }
        Err(e) => {
            eprintln!("❌ {}", e);
            return ExitStatus::from(&e);
        }
    };

    let emitter = match Emitter::open(SinkTarget::from_path(&config.log_path), config.log_backups)
    {
        Ok(emitter) => emitter,
        Err(e) => {
            eprintln!("❌ Cannot open metrics log: {}", e);
            pid_file.release();
            return ExitStatus::Config;
        }
    };
    let filters = match config.filters() {
        Ok(filters) => filters,
        Err(e) => {
            eprintln!("❌ Configuration invalid: {}", e);
            pid_file.release();
            return ExitStatus::Config;
        }
    };
    let source = ProcCounterSource::new(&config.proc_root, filters, config.filesystems);

    let mut readiness = Readiness::default();
    if !options.foreground {
        let detached = Readiness::pipe().and_then(|pipe| {
            readiness = pipe;
            detach(&config.daemon_log, &mut readiness)
        });
        if let Err(e) = detached {
            eprintln!("❌ Failed to daemonize: {}", e);
            error!("Failed to daemonize: {}", e);
            return abandon(pid_file, &mut readiness, &mut lifecycle, ExitStatus::from(&e));
        }
        lifecycle.transition(LifecycleState::Detached);
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("{}", DaemonizeError::Runtime(e));
            return abandon(pid_file, &mut readiness, &mut lifecycle, ExitStatus::Daemonize);
        }
    };

    // Signal streams exist before the pid is published, so a stop or reload
    // aimed at that pid is never met by the default disposition.
    let (tx, mut rx) = mpsc::channel(8);
    let forwarder = {
        let _guard = runtime.enter();
        spawn_signal_forwarder(tx)
    };
    let forwarder = match forwarder {
        Ok(handle) => handle,
        Err(e) => {
            error!("{}", e);
            return abandon(pid_file, &mut readiness, &mut lifecycle, ExitStatus::Daemonize);
        }
    };

    let pid = getpid().as_raw();
    if let Err(e) = pid_file.write_pid(pid) {
        error!("{}", e);
        forwarder.abort();
        return abandon(pid_file, &mut readiness, &mut lifecycle, ExitStatus::Daemonize);
    }

    let mut scheduler = Scheduler::new(source, emitter, &config);
    let reload = move || load_daemon_config(&overrides, &base);

    lifecycle.transition(LifecycleState::Running);
    info!(
        pid,
        interval_seconds = config.interval_seconds,
        log_path = %config.log_path.display(),
        "Monitor running"
    );
    readiness.notify(ExitStatus::Success);

    let summary = runtime.block_on(async {
        let summary = scheduler.run(&mut rx, reload).await;
        forwarder.abort();
        summary
    });

    lifecycle.transition(LifecycleState::Stopping);
    info!(
        ticks = summary.ticks,
        emitted = summary.emitted,
        failed = summary.failed,
        "Scheduler finished"
    );
    pid_file.release();
    lifecycle.transition(LifecycleState::Stopped);

    match summary.exit {
        SchedulerExit::Stopped => ExitStatus::Success,
        SchedulerExit::Escalated => ExitStatus::TickFailures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        use LifecycleState::*;
        assert!(Starting.can_transition_to(Detached));
        assert!(Detached.can_transition_to(Running));
        assert!(Running.can_transition_to(Stopping));
        assert!(Stopping.can_transition_to(Stopped));
        assert!(Starting.can_transition_to(Stopped));
        assert!(!Stopped.can_transition_to(Running));
        assert!(!Running.can_transition_to(Detached));
        assert!(!Stopping.can_transition_to(Running));

        let mut lifecycle = Lifecycle::default();
        assert_eq!(lifecycle.state(), Starting);
        lifecycle.transition(Running);
        assert_eq!(lifecycle.state(), Running);
        assert_eq!(Running.to_string(), "RUNNING");
    }

    fn own_pid() -> i32 {
        std::process::id() as i32
    }

    fn acquired(path: &Path) -> PidFile {
        match PidFile::acquire(path).unwrap() {
            PidLock::Acquired(p) => p,
            other => panic!("expected lock, got {:?}", other),
        }
    }

    #[test]
    fn test_pid_file_acquire_write_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.pid");

        let mut pid_file = acquired(&path);
        assert_eq!(read_pid(&path).unwrap(), Some(own_pid()));

        pid_file.write_pid(4242).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "4242\n");
        assert_eq!(read_pid(&path).unwrap(), Some(4242));

        // Rewriting truncates
        pid_file.write_pid(7).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "7\n");

        pid_file.release();
        assert!(!path.exists());
    }

    #[test]
    fn test_second_acquire_sees_running_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.pid");

        // flock locks belong to the open file description, so a second open in
        // the same process conflicts just like another process would.
        let first = acquired(&path);
        match PidFile::acquire(&path).unwrap() {
            PidLock::AlreadyRunning(pid) => assert_eq!(pid, own_pid()),
            other => panic!("expected AlreadyRunning, got {:?}", other),
        }

        first.release();
    }

    #[test]
    fn test_locked_file_waits_for_owner_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.pid");

        // The holder is mid-startup: the file still names a previous run.
        let mut first = acquired(&path);
        first.write_pid(999_999).unwrap();

        let writer = {
            let path = path.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(250));
                fs::write(&path, format!("{}\n", own_pid())).unwrap();
            })
        };

        match PidFile::acquire(&path).unwrap() {
            PidLock::AlreadyRunning(pid) => assert_eq!(pid, own_pid()),
            other => panic!("expected AlreadyRunning, got {:?}", other),
        }
        writer.join().unwrap();
        first.release();
    }

    #[test]
    fn test_locked_without_pid_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.pid");

        let first = acquired(&path);
        fs::write(&path, "").unwrap();

        let started = std::time::Instant::now();
        let err = PidFile::acquire(&path).unwrap_err();
        assert!(matches!(err, DaemonizeError::StaleLock { .. }));
        assert_eq!(ExitStatus::from(&err), ExitStatus::PidConflict);
        assert!(started.elapsed() >= OWNER_BACKOFF * (OWNER_RETRIES - 1));

        first.release();
    }

    #[test]
    fn test_unlocked_stale_pid_file_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.pid");
        fs::write(&path, "999999\n").unwrap();

        match PidFile::acquire(&path).unwrap() {
            PidLock::Acquired(p) => p.release(),
            other => panic!("expected lock, got {:?}", other),
        }
    }

    #[test]
    fn test_read_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p");
        assert_eq!(read_pid(&path).unwrap(), None);

        fs::write(&path, "").unwrap();
        assert_eq!(read_pid(&path).unwrap(), None);

        fs::write(&path, " 123 \n").unwrap();
        assert_eq!(read_pid(&path).unwrap(), Some(123));

        fs::write(&path, "abc").unwrap();
        assert!(read_pid(&path).is_err());
    }

    #[test]
    fn test_process_alive() {
        assert!(process_alive(std::process::id() as i32));
        assert!(!process_alive(0));
        assert!(!process_alive(-5));
    }

    #[test]
    fn test_signal_daemon_without_pid_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = signal_daemon(&dir.path().join("none.pid"), Signal::SIGHUP).unwrap_err();
        assert!(matches!(err, DaemonizeError::StaleLock { .. }));
    }

    #[test]
    fn test_locked_daemon_pid_requires_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.pid");

        let pid_file = acquired(&path);
        assert_eq!(locked_daemon_pid(&path).unwrap(), own_pid());
        pid_file.release();

        // Same live pid, but nobody holds the lock any more
        fs::write(&path, format!("{}\n", own_pid())).unwrap();
        let err = locked_daemon_pid(&path).unwrap_err();
        assert!(matches!(err, DaemonizeError::StaleLock { .. }));
    }

    #[test]
    fn test_signal_daemon_spares_unlocked_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.pid");

        let mut bystander = std::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        fs::write(&path, format!("{}\n", bystander.id())).unwrap();

        let err = signal_daemon(&path, Signal::SIGTERM).unwrap_err();
        assert_eq!(ExitStatus::from(&err), ExitStatus::PidConflict);
        std::thread::sleep(Duration::from_millis(100));
        assert!(bystander.try_wait().unwrap().is_none());

        bystander.kill().unwrap();
        bystander.wait().unwrap();
    }

    #[test]
    fn test_readiness_reports_status_once() {
        let mut readiness = Readiness::pipe().unwrap();
        readiness.notify(ExitStatus::PidConflict);
        readiness.notify(ExitStatus::Success);
        assert_eq!(readiness.wait(), ExitStatus::PidConflict.code());
    }

    #[test]
    fn test_readiness_closed_without_status() {
        let mut readiness = Readiness::pipe().unwrap();
        assert_eq!(readiness.wait(), ExitStatus::Daemonize.code());

        // Foreground handles have no pipe
        let mut foreground = Readiness::default();
        foreground.notify(ExitStatus::Success);
        assert_eq!(foreground.wait(), ExitStatus::Daemonize.code());
    }

    #[test]
    fn test_pin_overrides_absolutizes() {
        let mut overrides = ConfigOverrides {
            no_config: true,
            log_path: Some(PathBuf::from("logs/m.jsonl")),
            pid_file: Some(PathBuf::from("/run/m.pid")),
            ..Default::default()
        };
        pin_overrides(&mut overrides, Path::new("/srv/app"));
        assert_eq!(overrides.log_path, Some(PathBuf::from("/srv/app/logs/m.jsonl")));
        assert_eq!(overrides.pid_file, Some(PathBuf::from("/run/m.pid")));
        assert_eq!(overrides.config_path, None);
    }
}
