//! Post-copy external process.
//!
//! Each output pipe is read on its own thread; lines are relayed to the
//! listeners on the calling thread, so listener callbacks never run
//! concurrently.

use std::io::{self, BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::thread;

use crossbeam_channel::{unbounded, Sender};

use crate::model::PostCopyCommand;
use crate::progress::{CopyListener, ProcessStream};

type OutputLine = (ProcessStream, String);

/// Run `command` to completion, relaying its output.
///
/// # Returns
/// The exit code, or `None` if the process was terminated by a signal
///
/// # Errors
/// Returns the I/O error if the process could not be spawned or waited on
pub fn run_post_copy(
    command: &PostCopyCommand,
    listeners: &[Box<dyn CopyListener>],
) -> io::Result<Option<i32>> {
    let mut child = Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    tracing::info!(program = %command.program.display(), pid = child.id(), "Started post-copy process");

    let (sender, receiver) = unbounded::<OutputLine>();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    thread::scope(|scope| {
        if let Some(pipe) = stdout {
            let sender = sender.clone();
            scope.spawn(move || read_lines(pipe, ProcessStream::Stdout, sender));
        }
        if let Some(pipe) = stderr {
            let sender = sender.clone();
            scope.spawn(move || read_lines(pipe, ProcessStream::Stderr, sender));
        }
        drop(sender);

        for (stream, line) in receiver {
            for listener in listeners {
                listener.on_process_output(&line, stream);
            }
        }
    });

    let status = child.wait()?;
    let exit_code = status.code();
    tracing::info!(exit_code = ?exit_code, "Post-copy process ended");

    for listener in listeners {
        listener.on_process_ended(exit_code);
    }
    Ok(exit_code)
}

fn read_lines<R: Read>(pipe: R, stream: ProcessStream, sender: Sender<OutputLine>) {
    for line in BufReader::new(pipe).lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::debug!(stream = ?stream, error = %e, "Stopped reading process output");
                break;
            }
        };
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        if sender.send((stream, line.to_string())).is_err() {
            break;
        }
    }
}
