//! Handle on the running monitoring script.

use super::error::SupervisorError;
use super::script::{script_env, ConfiguredScript};
use super::settings::Settings;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A spawned script together with everything that must be torn down with it:
/// the temporary script copy, the output consumer and the stderr drain.
#[derive(Debug)]
pub struct ScriptProcess {
    child: Child,
    pid: Option<u32>,
    script: Option<ConfiguredScript>,
    stdout: Option<ChildStdout>,
    cancel: CancellationToken,
    reader: Option<JoinHandle<()>>,
    stderr_drain: Option<JoinHandle<()>>,
}

impl ScriptProcess {
    /// Spawn `script` through `interpreter` (or directly when the interpreter
    /// is empty) with stdout/stderr captured.
    ///
    /// On unix the child leads its own process group so that termination
    /// also reaches the `ping`/`sleep` children of the shell.
    pub fn spawn(
        interpreter: &str,
        script: ConfiguredScript,
        settings: &Settings,
    ) -> Result<Self, SupervisorError> {
        let (mut cmd, program) = if interpreter.is_empty() {
            (
                Command::new(script.path()),
                script.path().display().to_string(),
            )
        } else {
            let mut cmd = Command::new(interpreter);
            cmd.arg(script.path());
            (cmd, interpreter.to_string())
        };

        cmd.envs(script_env(settings))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|source| SupervisorError::Spawn { program, source })?;

        let stdout = child
            .stdout
            .take()
            .ok_or(SupervisorError::MissingPipe("stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or(SupervisorError::MissingPipe("stderr"))?;

        let pid = child.id();
        let stderr_drain = tokio::spawn(drain_stderr(stderr, pid));

        Ok(Self {
            child,
            pid,
            script: Some(script),
            stdout: Some(stdout),
            cancel: CancellationToken::new(),
            reader: None,
            stderr_drain: Some(stderr_drain),
        })
    }

    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    /// Token observed by the output consumer; cancelled on shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Hand out stdout to the output consumer. Returns `None` after the
    /// first call.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Register the output consumer so shutdown can wait for it.
    pub fn attach_reader(&mut self, handle: JoinHandle<()>) {
        self.reader = Some(handle);
    }

    /// Terminate the child and release its resources.
    ///
    /// Sends SIGTERM, waits up to `timeout`, then escalates to SIGKILL. An
    /// already exited child is reaped after its process group is signalled.
    /// The temporary script copy is removed whatever the outcome.
    pub async fn shutdown(mut self, timeout: Duration) -> Result<ExitStatus, SupervisorError> {
        self.cancel.cancel();

        let result = self.terminate(timeout).await;

        if let Some(reader) = self.reader.take() {
            if let Err(e) = reader.await {
                tracing::warn!(error = %e, "Output consumer ended abnormally");
            }
        }
        if let Some(drain) = self.stderr_drain.take() {
            drain.abort();
        }
        if let Some(script) = self.script.take() {
            let path = script.path().to_path_buf();
            if let Err(e) = script.remove() {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to remove temporary script"
                );
            }
        }

        result
    }

    async fn terminate(&mut self, timeout: Duration) -> Result<ExitStatus, SupervisorError> {
        // The group is signalled before the leader is reaped, so leftover
        // ping/sleep children are reached even when the script already exited.
        #[cfg(unix)]
        self.request_stop()?;

        if let Some(status) = self
            .child
            .try_wait()
            .map_err(SupervisorError::Termination)?
        {
            return Ok(status);
        }

        #[cfg(not(unix))]
        self.request_stop()?;

        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(status) => status.map_err(SupervisorError::Termination),
            Err(_) => {
                tracing::warn!(
                    pid = self.pid,
                    timeout_seconds = timeout.as_secs_f64(),
                    "Script did not exit after SIGTERM, killing"
                );
                self.force_kill()?;
                self.child.wait().await.map_err(SupervisorError::Termination)
            }
        }
    }

    #[cfg(unix)]
    fn request_stop(&mut self) -> Result<(), SupervisorError> {
        self.signal_group(libc::SIGTERM)
    }

    #[cfg(not(unix))]
    fn request_stop(&mut self) -> Result<(), SupervisorError> {
        self.child.start_kill().map_err(SupervisorError::Termination)
    }

    #[cfg(unix)]
    fn force_kill(&mut self) -> Result<(), SupervisorError> {
        self.signal_group(libc::SIGKILL)
    }

    #[cfg(not(unix))]
    fn force_kill(&mut self) -> Result<(), SupervisorError> {
        self.child.start_kill().map_err(SupervisorError::Termination)
    }

    /// Signal the whole process group led by the child.
    #[cfg(unix)]
    fn signal_group(&self, signal: libc::c_int) -> Result<(), SupervisorError> {
        let Some(pid) = self.pid else {
            return Ok(());
        };
        // SAFETY: kill(2) has no memory-safety preconditions. The child has
        // not been reaped yet, so its pid (and process group id) cannot have
        // been recycled.
        let rc = unsafe { libc::kill(-(pid as libc::pid_t), signal) };
        if rc == -1 {
            let err = std::io::Error::last_os_error();
            // Group already gone
            if err.raw_os_error() == Some(libc::ESRCH) {
                return Ok(());
            }
            return Err(SupervisorError::Termination(err));
        }
        Ok(())
    }
}

async fn drain_stderr(stderr: ChildStderr, pid: Option<u32>) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::warn!(pid, line = %line.trim_end(), "Script stderr");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::Instant;

    /// Alive and not a zombie waiting for its new parent to reap it.
    fn running(pid: libc::pid_t) -> bool {
        if unsafe { libc::kill(pid, 0) } != 0 {
            return false;
        }
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => !stat
                .rsplit(')')
                .next()
                .is_some_and(|rest| rest.trim_start().starts_with('Z')),
            Err(_) => true,
        }
    }

    fn prepare(dir: &Path, body: &str) -> ConfiguredScript {
        let source = dir.join("wifitoggler");
        std::fs::write(&source, body).unwrap();
        ConfiguredScript::prepare(&source, &Settings::default(), Some(dir)).unwrap()
    }

    #[tokio::test]
    async fn test_spawn_and_graceful_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let script = prepare(dir.path(), "sleep 30\n");
        let script_path = script.path().to_path_buf();

        let process = ScriptProcess::spawn("bash", script, &Settings::default()).unwrap();
        assert!(process.id().is_some());

        let status = process.shutdown(Duration::from_secs(5)).await.unwrap();
        assert!(!status.success());
        assert!(!script_path.exists());
    }

    #[tokio::test]
    async fn test_shutdown_escalates_to_kill() {
        let dir = tempfile::tempdir().unwrap();
        let script = prepare(dir.path(), "trap '' TERM\nwhile true; do sleep 0.1; done\n");

        let process = ScriptProcess::spawn("bash", script, &Settings::default()).unwrap();
        // Give bash time to install the trap
        tokio::time::sleep(Duration::from_millis(200)).await;

        let started = Instant::now();
        let status = process.shutdown(Duration::from_millis(300)).await.unwrap();
        assert!(!status.success());
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_shutdown_reaps_exited_child() {
        let dir = tempfile::tempdir().unwrap();
        let script = prepare(dir.path(), "exit 0\n");

        let process = ScriptProcess::spawn("bash", script, &Settings::default()).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let status = process.shutdown(Duration::from_secs(5)).await.unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn test_shutdown_after_exit_terminates_leftover_group_members() {
        let dir = tempfile::tempdir().unwrap();
        let script = prepare(dir.path(), "sleep 30 > /dev/null &\necho $!\nexit 0\n");

        let mut process = ScriptProcess::spawn("bash", script, &Settings::default()).unwrap();
        let stdout = process.take_stdout().unwrap();
        let mut lines = BufReader::new(stdout).lines();
        let orphan: libc::pid_t = lines.next_line().await.unwrap().unwrap().parse().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let status = process.shutdown(Duration::from_secs(5)).await.unwrap();
        assert!(status.success());

        let deadline = Instant::now() + Duration::from_secs(3);
        while running(orphan) && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!running(orphan), "background sleep survived");
    }

    #[tokio::test]
    async fn test_spawn_passes_settings_env() {
        let dir = tempfile::tempdir().unwrap();
        let script = prepare(dir.path(), "echo \"host=$PING_HOST\"\n");

        let mut process = ScriptProcess::spawn("bash", script, &Settings::default()).unwrap();
        let stdout = process.take_stdout().unwrap();
        let mut lines = BufReader::new(stdout).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        assert_eq!(line, "host=8.8.8.8");

        process.shutdown(Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn test_spawn_missing_interpreter() {
        let dir = tempfile::tempdir().unwrap();
        let script = prepare(dir.path(), "sleep 1\n");
        let script_path = script.path().to_path_buf();

        let result = ScriptProcess::spawn(
            "/nonexistent/interpreter",
            script,
            &Settings::default(),
        );
        assert!(matches!(result, Err(SupervisorError::Spawn { .. })));
        // Copy is dropped together with the failed spawn
        assert!(!script_path.exists());
    }
}
