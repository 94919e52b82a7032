use std::path::Path;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::trace;

use super::{MediaProbe, ProbeError, ProbeReport};

const PATH_PLACEHOLDER: &str = "{path}";

/// Runs an external program against a file and captures what it prints.
///
/// Arguments may contain a `{path}` placeholder; if none does, the path is
/// appended as the final argument.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    tool: String,
    program: String,
    args: Vec<String>,
}

impl CommandProbe {
    pub fn new(tool: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// `ffmpeg -v error -i {path} -f null -`
    pub fn ffmpeg() -> Self {
        Self::new("ffmpeg", "ffmpeg").args([
            "-v",
            "error",
            "-i",
            PATH_PLACEHOLDER,
            "-f",
            "null",
            "-",
        ])
    }

    /// `magick identify -regard-warnings {path}`
    pub fn imagemagick() -> Self {
        Self::new("imagemagick", "magick").args(["identify", "-regard-warnings", PATH_PLACEHOLDER])
    }

    fn render_args(&self, path: &Path) -> Vec<String> {
        let path = path.to_string_lossy();
        let mut rendered: Vec<String> = self
            .args
            .iter()
            .map(|arg| arg.replace(PATH_PLACEHOLDER, &path))
            .collect();
        if !self.args.iter().any(|arg| arg.contains(PATH_PLACEHOLDER)) {
            rendered.push(path.into_owned());
        }
        rendered
    }
}

#[async_trait]
impl MediaProbe for CommandProbe {
    fn tool(&self) -> &str {
        &self.tool
    }

    async fn probe(&self, path: &Path) -> Result<ProbeReport, ProbeError> {
        if let Err(err) = tokio::fs::metadata(path).await {
            return Err(ProbeError::Unreadable {
                path: path.display().to_string(),
                message: err.to_string(),
            });
        }

        let args = self.render_args(path);
        trace!(tool = %self.tool, program = %self.program, ?args, "launching probe");

        let started = Instant::now();
        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| ProbeError::Spawn {
                tool: self.tool.clone(),
                message: err.to_string(),
            })?;
        let elapsed = started.elapsed();

        let mut raw_output = String::from_utf8_lossy(&output.stderr).into_owned();
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            if !raw_output.is_empty() && !raw_output.ends_with('\n') {
                raw_output.push('\n');
            }
            raw_output.push_str(&stdout);
        }

        Ok(ProbeReport {
            tool: self.tool.clone(),
            exit_ok: output.status.success(),
            raw_output,
            elapsed,
        })
    }
}
