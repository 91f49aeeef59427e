//! Out-of-process mode: one child process per client
//!
//! Each child runs `kickoff child` headless in its own process group. Any
//! child that exits is respawned with the same arguments, so a reload keeps
//! its client id. The supervisor only stops on Ctrl-C: every group gets
//! SIGTERM, then SIGKILL after a grace period.

use std::ffi::OsString;
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

use crate::error::AppError;

const STOP_GRACE: Duration = Duration::from_millis(500);

/// How to start one child client
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChildSpec {
    pub index: usize,
    pub client_id: String,
    pub program: PathBuf,
    pub config: Option<PathBuf>,
    pub language: Option<String>,
}

impl ChildSpec {
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "child".into(),
            "--index".into(),
            self.index.to_string().into(),
            "--client-id".into(),
            self.client_id.clone().into(),
        ];
        if let Some(config) = &self.config {
            args.push("--config".into());
            args.push(config.clone().into_os_string());
        }
        if let Some(lang) = &self.language {
            args.push("--lang".into());
            args.push(lang.into());
        }
        args
    }
}

struct RunningChild {
    spec: ChildSpec,
    child: Option<Child>,
    pgid: i32,
    restarts: u32,
}

impl RunningChild {
    fn spawn(spec: ChildSpec) -> Result<Self, AppError> {
        let (child, pgid) = spawn_child(&spec)?;
        Ok(Self {
            spec,
            child: Some(child),
            pgid,
            restarts: 0,
        })
    }

    /// Reap the child if it exited and start it again
    fn check(&mut self) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        let status = match child.try_wait() {
            Ok(Some(status)) => status,
            Ok(None) => return,
            Err(err) => {
                tracing::warn!(client = self.spec.index, error = %err, "failed to poll child");
                return;
            }
        };
        self.child = None;

        tracing::warn!(
            client = self.spec.index,
            code = ?status.code(),
            restarts = self.restarts,
            "client exited, respawning"
        );
        match spawn_child(&self.spec) {
            Ok((child, pgid)) => {
                self.child = Some(child);
                self.pgid = pgid;
                self.restarts += 1;
            }
            Err(err) => {
                tracing::error!(client = self.spec.index, error = %err, "respawn failed");
            }
        }
    }

    fn is_running(&self) -> bool {
        self.child.is_some()
    }

    fn signal(&mut self, signal: i32) {
        let Some(child) = self.child.as_mut() else {
            return;
        };

        #[cfg(unix)]
        if self.pgid > 0 {
            unsafe {
                libc::killpg(self.pgid, signal);
            }
            return;
        }

        let _ = signal;
        let _ = child.start_kill();
    }
}

fn spawn_child(spec: &ChildSpec) -> Result<(Child, i32), AppError> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(spec.args());

    #[cfg(unix)]
    unsafe {
        cmd.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }

    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.stdin(Stdio::null());

    let mut child = cmd.spawn().map_err(|source| AppError::Spawn {
        index: spec.index,
        source,
    })?;
    let pgid = child.id().map(|pid| pid as i32).unwrap_or(-1);
    tracing::info!(client = spec.index, id = %spec.client_id, pid = pgid, "client spawned");

    let index = spec.index;
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::info!(client = index, "{}", line);
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::info!(client = index, "{}", line);
            }
        });
    }

    Ok((child, pgid))
}

/// Supervise the children until Ctrl-C
pub async fn run(specs: Vec<ChildSpec>) -> Result<(), AppError> {
    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        tracing::info!("interrupted, stopping clients");
    };
    supervise(specs, shutdown).await?;
    Ok(())
}

/// Keep every child running until `shutdown` resolves.
///
/// Returns how many times each child was respawned.
async fn supervise<S>(specs: Vec<ChildSpec>, shutdown: S) -> Result<Vec<u32>, AppError>
where
    S: Future<Output = ()>,
{
    let mut children = Vec::with_capacity(specs.len());
    for spec in specs {
        match RunningChild::spawn(spec) {
            Ok(child) => children.push(child),
            Err(err) => {
                stop_all(&mut children).await;
                return Err(err);
            }
        }
    }

    let mut check_interval = tokio::time::interval(Duration::from_millis(100));
    check_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = check_interval.tick() => {
                for child in &mut children {
                    child.check();
                }
            }
        }
    }

    stop_all(&mut children).await;
    Ok(children.iter().map(|child| child.restarts).collect())
}

async fn stop_all(children: &mut [RunningChild]) {
    if !children.iter().any(RunningChild::is_running) {
        return;
    }

    for child in children.iter_mut() {
        child.signal(libc::SIGTERM);
    }
    tokio::time::sleep(STOP_GRACE).await;

    for child in children.iter_mut() {
        let still_running = child
            .child
            .as_mut()
            .map(|c| c.try_wait().ok().flatten().is_none())
            .unwrap_or(false);
        if still_running {
            tracing::warn!(client = child.spec.index, "client ignored SIGTERM, killing");
            child.signal(libc::SIGKILL);
        }
        if let Some(mut process) = child.child.take() {
            let _ = process.wait().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(program: &str) -> ChildSpec {
        ChildSpec {
            index: 2,
            client_id: "abc".into(),
            program: program.into(),
            config: None,
            language: None,
        }
    }

    #[test]
    fn test_child_args() {
        let mut spec = spec("kickoff");
        assert_eq!(
            spec.args(),
            vec!["child", "--index", "2", "--client-id", "abc"]
                .into_iter()
                .map(OsString::from)
                .collect::<Vec<_>>()
        );

        spec.config = Some(PathBuf::from("/tmp/kickoff.yaml"));
        spec.language = Some("fr".into());
        let args = spec.args();
        assert_eq!(args[5], OsString::from("--config"));
        assert_eq!(args[6], OsString::from("/tmp/kickoff.yaml"));
        assert_eq!(args[7..], [OsString::from("--lang"), OsString::from("fr")]);
    }

    /// Shell script that appends its arguments to `runs.log`, then runs `tail`
    #[cfg(unix)]
    fn script_child(tail: &str) -> (PathBuf, PathBuf) {
        use std::os::unix::fs::PermissionsExt;

        let dir = std::env::temp_dir().join(format!("kickoff-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let log = dir.join("runs.log");
        let script = dir.join("child.sh");
        std::fs::write(
            &script,
            format!("#!/bin/sh\necho \"$@\" >> '{}'\n{}\n", log.display(), tail),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        (script, log)
    }

    #[cfg(unix)]
    fn runs(log: &std::path::Path) -> Vec<String> {
        std::fs::read_to_string(log)
            .unwrap_or_default()
            .lines()
            .map(String::from)
            .collect()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_child_is_respawned_with_same_args() {
        let (script, log) = script_child("exit 3");
        let spec = ChildSpec {
            config: Some(PathBuf::from("/tmp/kickoff.yaml")),
            ..spec(script.to_str().unwrap())
        };

        let restarts = supervise(vec![spec], tokio::time::sleep(Duration::from_millis(1500)))
            .await
            .unwrap();

        let runs = runs(&log);
        assert!(runs.len() >= 3, "child ran {} times", runs.len());
        assert!(
            runs.iter()
                .all(|args| args == "child --index 2 --client-id abc --config /tmp/kickoff.yaml")
        );
        assert!(restarts[0] >= 2);
        assert!(runs.len() as u32 >= restarts[0]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_clean_exit_is_respawned_until_shutdown() {
        let (script, log) = script_child("exit 0");
        let started = std::time::Instant::now();

        let restarts = supervise(
            vec![spec(script.to_str().unwrap())],
            tokio::time::sleep(Duration::from_millis(1000)),
        )
        .await
        .unwrap();

        // the supervisor only returns on shutdown
        assert!(started.elapsed() >= Duration::from_millis(1000));
        assert!(runs(&log).len() >= 2);
        assert!(restarts[0] >= 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shutdown_stops_running_children() {
        let (script, log) = script_child("exec sleep 30");
        let specs = vec![
            spec(script.to_str().unwrap()),
            ChildSpec {
                index: 3,
                ..spec(script.to_str().unwrap())
            },
        ];

        let restarts = tokio::time::timeout(
            Duration::from_secs(5),
            supervise(specs, tokio::time::sleep(Duration::from_millis(300))),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(restarts, vec![0, 0]);
        assert_eq!(runs(&log).len(), 2);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let err = run(vec![spec("/nonexistent/kickoff")]).await.unwrap_err();
        assert!(matches!(err, AppError::Spawn { index: 2, .. }));
    }
}
