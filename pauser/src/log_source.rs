//! Where server output comes from.
//!
//! The pauser only needs "the next line, or the end, or an error". A
//! [`LineSource`] provides exactly that over a container's log stream, a file,
//! or stdin.

use async_trait::async_trait;
use log::info;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Split};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};

#[async_trait]
pub trait LineSource: Send {
    /// `Ok(None)` once the source is exhausted.
    async fn next_line(&mut self) -> io::Result<Option<String>>;
}

/// Newline-delimited reader that never rejects a line for its encoding.
pub type RawLines<R> = Split<R>;

pub fn raw_lines<R: AsyncBufRead + Unpin>(reader: R) -> RawLines<R> {
    reader.split(b'\n')
}

/// Invalid UTF-8 is replaced rather than rejected; a trailing `\r` is dropped.
fn decode_line(mut raw: Vec<u8>) -> String {
    if raw.last() == Some(&b'\r') {
        raw.pop();
    }
    String::from_utf8_lossy(&raw).into_owned()
}

#[async_trait]
impl<R> LineSource for Split<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        Ok(self.next_segment().await?.map(decode_line))
    }
}

#[async_trait]
impl LineSource for Box<dyn LineSource> {
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        (**self).next_line().await
    }
}

/// Configured origin of the server log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSource {
    /// Follow a container's output from now on, no backlog.
    Docker { container: String },
    File(PathBuf),
    Stdin,
}

impl LogSource {
    pub async fn open(&self) -> io::Result<Box<dyn LineSource>> {
        info!("Reading server log from {}", self);

        match self {
            LogSource::Docker { container } => {
                let mut command = Command::new("docker");
                command.args(["logs", "--follow", "--tail", "0", container.as_str()]);
                Ok(Box::new(ProcessLogs::spawn(command)?))
            }
            LogSource::File(path) => {
                let file = tokio::fs::File::open(path).await?;
                Ok(Box::new(raw_lines(BufReader::new(file))))
            }
            LogSource::Stdin => Ok(Box::new(raw_lines(BufReader::new(tokio::io::stdin())))),
        }
    }
}

impl fmt::Display for LogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogSource::Docker { container } => write!(f, "container {}", container),
            LogSource::File(path) => write!(f, "file {}", path.display()),
            LogSource::Stdin => f.write_str("stdin"),
        }
    }
}

/// Stdout and stderr of a child process, merged line by line.
///
/// The child is killed when this is dropped. A non-zero exit after both pipes
/// close is reported as an error.
pub struct ProcessLogs {
    child: Child,
    stdout: Option<RawLines<BufReader<ChildStdout>>>,
    stderr: Option<RawLines<BufReader<ChildStderr>>>,
}

impl ProcessLogs {
    pub fn spawn(mut command: Command) -> io::Result<Self> {
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        Ok(Self {
            stdout: child.stdout.take().map(|pipe| raw_lines(BufReader::new(pipe))),
            stderr: child.stderr.take().map(|pipe| raw_lines(BufReader::new(pipe))),
            child,
        })
    }
}

async fn next_from<R>(lines: Option<&mut RawLines<R>>) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin + Send,
{
    match lines {
        Some(lines) => lines.next_line().await,
        None => std::future::pending().await,
    }
}

#[async_trait]
impl LineSource for ProcessLogs {
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        loop {
            if self.stdout.is_none() && self.stderr.is_none() {
                let status = self.child.wait().await?;
                return if status.success() {
                    Ok(None)
                } else {
                    Err(io::Error::other(format!("log process exited with {}", status)))
                };
            }

            let (from_stdout, line) = tokio::select! {
                line = next_from(self.stdout.as_mut()) => (true, line?),
                line = next_from(self.stderr.as_mut()) => (false, line?),
            };

            match line {
                Some(line) => return Ok(Some(line)),
                None if from_stdout => self.stdout = None,
                None => self.stderr = None,
            }
        }
    }
}
