use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use kdev_types::{CopyDirection, KdevError, PortMapping, Result};

use crate::locator::ToolLocator;
use crate::parse;
use crate::process::{InteractiveCommand, PortForward};

/// Directories prepended to `PATH` so the tool and its helpers stay reachable
pub const DEFAULT_LOOKUP_DIRS: &[&str] = &["/usr/local/bin", "/usr/bin"];

const PATH_VAR: &str = "PATH";
const KUBECONFIG_VAR: &str = "KUBECONFIG";

/// Prefers bash inside the container, falling back to sh
const SHELL_FALLBACK: &str = "command -v bash >/dev/null 2>&1 && exec bash || exec sh";

/// Receives every command line right before it runs
pub type ActivitySink = Arc<dyn Fn(&str) + Send + Sync>;

/// Runs kubectl invocations
#[derive(Clone)]
pub struct Kubectl {
    locator: ToolLocator,
    lookup_dirs: Vec<PathBuf>,
    kubeconfig: Option<PathBuf>,
    activity: Option<ActivitySink>,
}

impl Kubectl {
    pub fn new(locator: ToolLocator) -> Self {
        Self {
            locator,
            lookup_dirs: DEFAULT_LOOKUP_DIRS.iter().map(PathBuf::from).collect(),
            kubeconfig: None,
            activity: None,
        }
    }

    pub fn with_lookup_dirs<I>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        self.lookup_dirs = dirs.into_iter().collect();
        self
    }

    /// Point every invocation at a specific credentials file
    pub fn with_kubeconfig(mut self, kubeconfig: Option<PathBuf>) -> Self {
        self.kubeconfig = kubeconfig;
        self
    }

    pub fn with_activity(mut self, sink: ActivitySink) -> Self {
        self.activity = Some(sink);
        self
    }

    pub fn kubeconfig(&self) -> Option<&Path> {
        self.kubeconfig.as_deref()
    }

    /// `PATH` for child processes: lookup dirs first, then the inherited value
    fn search_path(&self) -> OsString {
        let inherited = std::env::var_os(PATH_VAR).unwrap_or_default();
        let dirs = self
            .lookup_dirs
            .iter()
            .cloned()
            .chain(std::env::split_paths(&inherited));

        std::env::join_paths(dirs).unwrap_or(inherited)
    }

    /// Environment overrides applied on top of the inherited environment
    fn env_overrides(&self) -> Vec<(String, OsString)> {
        let mut env = vec![(PATH_VAR.to_string(), self.search_path())];
        if let Some(kubeconfig) = &self.kubeconfig {
            env.push((KUBECONFIG_VAR.to_string(), kubeconfig.clone().into_os_string()));
        }
        env
    }

    fn record(&self, program: &Path, args: &[String]) {
        let line = CommandLine(program, args).to_string();
        tracing::debug!(command = %line, "running external tool");
        if let Some(sink) = &self.activity {
            sink(&line);
        }
    }

    fn command(&self, args: &[String]) -> Result<Command> {
        let program = self.locator.locate()?;
        self.record(&program, args);

        let mut cmd = Command::new(&program);
        cmd.args(args)
            .envs(self.env_overrides())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        Ok(cmd)
    }

    /// Run one invocation and return its trimmed stdout
    ///
    /// A non-zero exit fails with the trimmed stderr text, or with the exit
    /// status when stderr is empty. Cancelling the token kills the child
    /// process.
    pub async fn execute(&self, args: &[String], cancel: &CancellationToken) -> Result<String> {
        let child = self
            .command(args)?
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| KdevError::Spawn(e.to_string()))?;

        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(KdevError::Cancelled),
            output = child.wait_with_output() => output.map_err(|e| KdevError::Spawn(e.to_string()))?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::debug!(status = %output.status, "external tool failed");
            return Err(KdevError::ExternalTool(if stderr.is_empty() {
                format!("{} exited with {}", self.locator.program(), output.status)
            } else {
                stderr
            }));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Start a long-running invocation without waiting for it
    pub fn spawn(&self, args: &[String]) -> Result<Child> {
        self.command(args)?
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| KdevError::Spawn(e.to_string()))
    }

    /// Describe an invocation for the caller to run in its own terminal
    pub fn interactive(&self, args: Vec<String>) -> Result<InteractiveCommand> {
        let program = self.locator.locate()?;
        self.record(&program, &args);

        Ok(InteractiveCommand {
            program,
            args,
            env: self.env_overrides(),
        })
    }

    // ------------------------------------------------------------------------
    // Listings
    // ------------------------------------------------------------------------

    pub async fn contexts(&self, cancel: &CancellationToken) -> Result<Vec<String>> {
        let out = self
            .execute(&args(["config", "get-contexts", "--no-headers", "-o", "name"]), cancel)
            .await?;
        Ok(parse::parse_names(&out))
    }

    pub async fn namespaces(&self, context: &str, cancel: &CancellationToken) -> Result<Vec<String>> {
        let mut cmd = args(["--context", context]);
        cmd.extend(args(["get", "ns", "-o", "json"]));
        let out = self.execute(&cmd, cancel).await?;
        parse::parse_item_names(&out)
    }

    pub async fn pods(
        &self,
        context: &str,
        namespace: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let mut cmd = scoped(context, namespace);
        cmd.extend(args(["get", "pods", "-o", "json"]));
        let out = self.execute(&cmd, cancel).await?;
        parse::parse_item_names(&out)
    }

    /// Fetch the full document of one pod
    pub async fn pod(
        &self,
        context: &str,
        namespace: &str,
        pod: &str,
        cancel: &CancellationToken,
    ) -> Result<Pod> {
        let mut cmd = scoped(context, namespace);
        cmd.extend(args(["get", "pod", pod, "-o", "json"]));
        let out = self.execute(&cmd, cancel).await?;
        parse::parse_pod(&out)
    }

    // ------------------------------------------------------------------------
    // Session switches
    // ------------------------------------------------------------------------

    pub async fn use_context(&self, context: &str, cancel: &CancellationToken) -> Result<()> {
        self.execute(&args(["config", "use-context", context]), cancel)
            .await
            .map(drop)
    }

    pub async fn set_namespace(&self, namespace: &str, cancel: &CancellationToken) -> Result<()> {
        self.execute(
            &args(["config", "set-context", "--current", "--namespace", namespace]),
            cancel,
        )
        .await
        .map(drop)
    }

    // ------------------------------------------------------------------------
    // Pod operations
    // ------------------------------------------------------------------------

    pub async fn logs(
        &self,
        context: &str,
        namespace: &str,
        pod: &str,
        container: Option<&str>,
        tail: u32,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let mut cmd = scoped(context, namespace);
        cmd.extend(args(["logs", pod]));
        cmd.push(format!("--tail={tail}"));
        if let Some(container) = container {
            cmd.extend(args(["-c", container]));
        }
        self.execute(&cmd, cancel).await
    }

    pub async fn delete_pod(
        &self,
        context: &str,
        namespace: &str,
        pod: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut cmd = scoped(context, namespace);
        cmd.extend(args(["delete", "pod", pod]));
        self.execute(&cmd, cancel).await.map(drop)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn copy(
        &self,
        context: &str,
        namespace: &str,
        pod: &str,
        direction: CopyDirection,
        local: &Path,
        remote: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let local = local.to_string_lossy().into_owned();
        let in_pod = format!("{pod}:{remote}");
        let (src, dst) = match direction {
            CopyDirection::Upload => (local, in_pod),
            CopyDirection::Download => (in_pod, local),
        };

        let mut cmd = scoped(context, namespace);
        cmd.extend(["cp".to_string(), src, dst]);
        self.execute(&cmd, cancel).await.map(drop)
    }

    pub fn exec_shell(&self, context: &str, namespace: &str, pod: &str) -> Result<InteractiveCommand> {
        let mut cmd = scoped(context, namespace);
        cmd.extend(args(["exec", "-it", pod, "--", "sh", "-c", SHELL_FALLBACK]));
        self.interactive(cmd)
    }

    pub fn port_forward(
        &self,
        context: &str,
        namespace: &str,
        pod: &str,
        mapping: PortMapping,
    ) -> Result<PortForward> {
        let mut cmd = scoped(context, namespace);
        cmd.extend(args(["port-forward", pod]));
        cmd.push(mapping.to_string());
        let child = self.spawn(&cmd)?;
        Ok(PortForward::new(pod.to_string(), mapping, child))
    }
}

impl fmt::Debug for Kubectl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kubectl")
            .field("locator", &self.locator)
            .field("lookup_dirs", &self.lookup_dirs)
            .field("kubeconfig", &self.kubeconfig)
            .field("activity", &self.activity.is_some())
            .finish()
    }
}

/// Display adapter for `program arg1 arg2 ...`
struct CommandLine<'a>(&'a Path, &'a [String]);

impl fmt::Display for CommandLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())?;
        for arg in self.1 {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

fn scoped(context: &str, namespace: &str) -> Vec<String> {
    args(["--context", context, "-n", namespace])
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::testing::write_script;
    use std::fs;
    use std::sync::Mutex;

    fn kubectl_for(script: PathBuf) -> Kubectl {
        Kubectl::new(ToolLocator::new("kubectl", [script]))
    }

    #[tokio::test]
    async fn test_execute_returns_trimmed_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "kubectl", "printf '\\n  c1\\nc2  \\n\\n'");

        let out = kubectl_for(script)
            .execute(&args(["config", "get-contexts"]), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, "c1\nc2");
    }

    #[tokio::test]
    async fn test_non_zero_exit_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "kubectl",
            "echo '  error: context \"c9\" not found  ' >&2\nexit 1",
        );

        let err = kubectl_for(script)
            .execute(&args(["config", "use-context", "c9"]), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            KdevError::ExternalTool("error: context \"c9\" not found".into())
        );
    }

    #[tokio::test]
    async fn test_silent_failure_reports_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "kubectl", "exit 3");

        let err = kubectl_for(script)
            .execute(&args(["delete", "pod", "p1"]), &CancellationToken::new())
            .await
            .unwrap_err();
        let KdevError::ExternalTool(message) = err else {
            panic!("expected an external tool error, got {err:?}");
        };
        assert!(message.starts_with("kubectl exited with"), "{message}");
        assert!(message.contains('3'), "{message}");
    }

    #[tokio::test]
    async fn test_missing_tool() {
        let dir = tempfile::tempdir().unwrap();
        let kubectl = Kubectl::new(
            ToolLocator::new("kdev-missing-tool", Vec::new()).with_search_path(dir.path().as_os_str()),
        );

        let err = kubectl
            .execute(&args(["version"]), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, KdevError::ToolNotFound("kdev-missing-tool".into()));
    }

    #[tokio::test]
    async fn test_environment_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "kubectl", "echo \"$PATH\"\necho \"$KUBECONFIG\"");
        let kubeconfig = dir.path().join("config");

        let out = kubectl_for(script)
            .with_lookup_dirs([PathBuf::from("/opt/kdev/bin")])
            .with_kubeconfig(Some(kubeconfig.clone()))
            .execute(&[], &CancellationToken::new())
            .await
            .unwrap();

        let mut lines = out.lines();
        assert!(lines.next().unwrap().starts_with("/opt/kdev/bin:"));
        assert_eq!(lines.next().unwrap(), kubeconfig.to_string_lossy());
    }

    #[tokio::test]
    async fn test_activity_sink_sees_command_line() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "kubectl", "exit 0");
        let recorded = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&recorded);

        kubectl_for(script.clone())
            .with_activity(Arc::new(move |line: &str| sink.lock().unwrap().push(line.to_string())))
            .use_context("c1", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            *recorded.lock().unwrap(),
            vec![format!("{} config use-context c1", script.display())]
        );
    }

    #[tokio::test]
    async fn test_cancel_stops_invocation() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "kubectl", "sleep 30");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = kubectl_for(script).execute(&[], &cancel).await.unwrap_err();
        assert_eq!(err, KdevError::Cancelled);
    }

    #[tokio::test]
    async fn test_copy_argument_order() {
        let dir = tempfile::tempdir().unwrap();
        let calls = dir.path().join("calls");
        let script = write_script(
            dir.path(),
            "kubectl",
            &format!("echo \"$@\" >> {}", calls.display()),
        );
        let kubectl = kubectl_for(script);
        let cancel = CancellationToken::new();

        kubectl
            .copy("c1", "n1", "p1", CopyDirection::Upload, Path::new("/tmp/a.txt"), "/tmp/a.txt", &cancel)
            .await
            .unwrap();
        kubectl
            .copy("c1", "n1", "p1", CopyDirection::Download, Path::new("/home/u/b.log"), "/var/b.log", &cancel)
            .await
            .unwrap();

        let recorded = fs::read_to_string(calls).unwrap();
        assert_eq!(
            recorded.lines().collect::<Vec<_>>(),
            vec![
                "--context c1 -n n1 cp /tmp/a.txt p1:/tmp/a.txt",
                "--context c1 -n n1 cp p1:/var/b.log /home/u/b.log",
            ]
        );
    }

    #[test]
    fn test_exec_shell_command() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "kubectl", "exit 0");

        let cmd = kubectl_for(script.clone()).exec_shell("c1", "n1", "p1").unwrap();
        assert_eq!(cmd.program, script);
        assert_eq!(
            &cmd.args[..6],
            &args(["--context", "c1", "-n", "n1", "exec", "-it"])[..]
        );
        assert_eq!(cmd.args.last().map(String::as_str), Some(SHELL_FALLBACK));
        assert!(cmd.env.iter().any(|(k, _)| k == "PATH"));
    }
}
