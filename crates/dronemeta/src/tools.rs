//! Resolution of the external media tools (ffprobe, ffmpeg) and a runner
//! that kills them at a deadline.
//!
//! An environment override wins when it points at an existing file;
//! otherwise the bare tool name is returned for `PATH` lookup.

use std::env;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub const FFPROBE_ENV: &str = "DRONEMETA_FFPROBE_PATH";
pub const FFMPEG_ENV: &str = "DRONEMETA_FFMPEG_PATH";

/// Deadline for tools started outside a configured batch.
pub const DEFAULT_TOOL_DEADLINE: Duration = Duration::from_secs(300);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

fn resolve_tool(env_key: &str, default_name: &str) -> PathBuf {
    if let Ok(value) = env::var(env_key) {
        let candidate = PathBuf::from(&value);
        if candidate.is_file() {
            return candidate;
        }
        log::warn!(
            "{} points at '{}' which does not exist, falling back to PATH",
            env_key,
            value
        );
    }

    let mut name = default_name.to_string();
    if cfg!(windows) && !name.to_ascii_lowercase().ends_with(".exe") {
        name.push_str(".exe");
    }
    PathBuf::from(name)
}

pub fn ffprobe_path() -> PathBuf {
    resolve_tool(FFPROBE_ENV, "ffprobe")
}

pub fn ffmpeg_path() -> PathBuf {
    resolve_tool(FFMPEG_ENV, "ffmpeg")
}

/// Like [`Command::output`], but the child is killed and reaped once
/// `deadline` passes. A killed run returns `ErrorKind::TimedOut`.
pub fn output_with_deadline(command: &mut Command, deadline: Duration) -> io::Result<Output> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    // A full pipe would stall the child, so both streams drain on threads.
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let started = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if started.elapsed() >= deadline {
            log::warn!(
                "{:?} still running after {:?}, killing it",
                command.get_program(),
                deadline
            );
            let _ = child.kill();
            let _ = child.wait();
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("killed after {:.1}s", deadline.as_secs_f64()),
            ));
        }
        thread::sleep(POLL_INTERVAL);
    };

    Ok(Output {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
    })
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = reader.read_to_end(&mut buffer);
        buffer
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}
