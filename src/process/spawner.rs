use crate::config::ProcessConfig;
use crate::error::{Result, SupervisorError};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Resolve the configured executable to a runnable path
///
/// Values containing a `/` are taken as paths; bare names are searched
/// for on `PATH`, the same way a shell would.
pub fn resolve_executable(exec: &str) -> Result<PathBuf> {
    if exec.contains('/') {
        let path = PathBuf::from(exec);
        return if is_executable(&path) {
            Ok(path)
        } else {
            Err(SupervisorError::ExecutableNotFound(
                exec.to_string(),
                "no such executable file".to_string(),
            ))
        };
    }

    let search_path = std::env::var_os("PATH").unwrap_or_default();
    std::env::split_paths(&search_path)
        .map(|dir| dir.join(exec))
        .find(|candidate| is_executable(candidate))
        .ok_or_else(|| {
            SupervisorError::ExecutableNotFound(
                exec.to_string(),
                "executable file not found in $PATH".to_string(),
            )
        })
}

fn is_executable(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

fn open_output(stream: &'static str, path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o644)
        .open(path)
        .map_err(|source| SupervisorError::OutputOpen {
            stream,
            path: path.display().to_string(),
            source,
        })
}

/// Build the command for one launch attempt
///
/// Resolves the executable, applies arguments, working directory and
/// environment overrides, and opens the output files. The returned command
/// owns the only copies of the output handles, so dropping it after the run
/// closes them.
pub fn prepare(config: &ProcessConfig) -> Result<Command> {
    let program = resolve_executable(&config.exec)?;

    let mut command = Command::new(&program);
    command.args(&config.args);

    if let Some(ref dir) = config.dir {
        command.current_dir(dir);
    }

    command.envs(config.env_pairs());

    let stderr = match config.stderr {
        Some(ref path) => Some(open_output("stderr", path)?),
        None => None,
    };

    let stdout = match config.stdout {
        Some(ref path) if config.stderr.as_ref() == Some(path) => match stderr {
            Some(ref shared) => Some(shared.try_clone().map_err(|source| {
                SupervisorError::OutputOpen {
                    stream: "stdout",
                    path: path.display().to_string(),
                    source,
                }
            })?),
            None => None,
        },
        // stderr (if any) is dropped and closed on this error path
        Some(ref path) => Some(open_output("stdout", path)?),
        None => None,
    };

    command.stdin(Stdio::null());
    command.stdout(stdout.map(Stdio::from).unwrap_or_else(Stdio::null));
    command.stderr(stderr.map(Stdio::from).unwrap_or_else(Stdio::null));
    command.kill_on_drop(true);

    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_absolute_path() {
        let path = resolve_executable("/bin/sh").unwrap();
        assert_eq!(path, PathBuf::from("/bin/sh"));
    }

    #[test]
    fn test_resolve_from_path() {
        let path = resolve_executable("sh").unwrap();
        assert!(path.ends_with("sh"));
    }

    #[test]
    fn test_resolve_missing_executable() {
        let result = resolve_executable("procward-definitely-not-a-binary");
        assert!(matches!(
            result,
            Err(SupervisorError::ExecutableNotFound(..))
        ));

        let result = resolve_executable("/nonexistent/script");
        assert!(matches!(
            result,
            Err(SupervisorError::ExecutableNotFound(..))
        ));
    }

    #[test]
    fn test_resolve_rejects_non_executable_file() {
        let temp_dir = TempDir::new().unwrap();
        let plain = temp_dir.path().join("plain.txt");
        std::fs::write(&plain, "not a program").unwrap();

        let result = resolve_executable(plain.to_str().unwrap());
        assert!(result.is_err());
    }

    #[test]
    fn test_prepare_output_open_failure() {
        let mut config = ProcessConfig::new("/bin/echo");
        config.stdout = Some(PathBuf::from("/nonexistent/dir/out.log"));

        match prepare(&config) {
            Err(SupervisorError::OutputOpen { stream, .. }) => assert_eq!(stream, "stdout"),
            other => panic!("Expected OutputOpen, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_prepare_shared_output_file() {
        let temp_dir = TempDir::new().unwrap();
        let log = temp_dir.path().join("combined.log");

        let mut config = ProcessConfig::new("/bin/sh");
        config.args = vec!["-c".to_string(), "echo out; echo err >&2".to_string()];
        config.stdout = Some(log.clone());
        config.stderr = Some(log.clone());

        let mut command = prepare(&config).unwrap();
        let status = command.spawn().unwrap().wait().await.unwrap();
        assert!(status.success());
        drop(command);

        let contents = std::fs::read_to_string(&log).unwrap();
        assert!(contents.contains("out"));
        assert!(contents.contains("err"));
    }

    #[tokio::test]
    async fn test_prepare_appends_and_applies_env() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("out.log");
        std::fs::write(&out, "previous\n").unwrap();

        let mut config = ProcessConfig::new("sh");
        config.args = vec!["-c".to_string(), "echo $PROCWARD_GREETING; pwd".to_string()];
        config.env = vec!["PROCWARD_GREETING=hello".to_string()];
        config.dir = Some(temp_dir.path().to_path_buf());
        config.stdout = Some(out.clone());

        let mut command = prepare(&config).unwrap();
        let status = command.spawn().unwrap().wait().await.unwrap();
        assert!(status.success());
        drop(command);

        let contents = std::fs::read_to_string(&out).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "previous");
        assert_eq!(lines[1], "hello");
        assert!(lines[2].ends_with(temp_dir.path().file_name().unwrap().to_str().unwrap()));
    }
}
