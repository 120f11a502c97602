//! Chunked file data transfer.
//!
//! Two interchangeable strategies implement [`DataCopier`]:
//! - [`SingleBufferCopier`]: read a chunk, write it, repeat.
//! - [`DoubleBufferCopier`]: overlap the write of one chunk with the read of
//!   the next, using a writer thread that owns the target file.
//!
//! Both check the cancellation token after every chunk and remove the
//! partially written target on failure or cancellation. Timestamps and
//! attributes are not copied here.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::error::EngineError;
use crate::fs_ops;
use crate::progress::CancelToken;

/// How a data transfer ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    /// Every byte of the source reached the target
    Completed { bytes_copied: u64 },
    /// Stopped at a cancellation checkpoint; the partial target is gone
    Cancelled { bytes_copied: u64 },
}

/// Which data copier implementation a `TreeCopier` uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CopierStrategy {
    #[default]
    SingleBuffer,
    DoubleBuffer,
}

impl CopierStrategy {
    pub fn build(self) -> Box<dyn DataCopier> {
        match self {
            CopierStrategy::SingleBuffer => Box::new(SingleBufferCopier),
            CopierStrategy::DoubleBuffer => Box::new(DoubleBufferCopier),
        }
    }
}

/// Streams the bytes of one file into another.
pub trait DataCopier: Send + Sync {
    fn strategy(&self) -> CopierStrategy;

    /// Copy `source` into `target` (created or truncated) in chunks of
    /// `buffer_size` bytes.
    ///
    /// `on_chunk(file_size, bytes_copied)` fires after each chunk, in source
    /// offset order.
    ///
    /// # Errors
    /// Any open/read/write error. The partial target has been removed by the
    /// time this returns.
    fn copy(
        &self,
        source: &Path,
        target: &Path,
        buffer_size: usize,
        cancel: &CancelToken,
        on_chunk: &mut dyn FnMut(u64, u64),
    ) -> Result<Transfer, EngineError>;
}

/// Synchronous read-then-write copier.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleBufferCopier;

impl DataCopier for SingleBufferCopier {
    fn strategy(&self) -> CopierStrategy {
        CopierStrategy::SingleBuffer
    }

    fn copy(
        &self,
        source: &Path,
        target: &Path,
        buffer_size: usize,
        cancel: &CancelToken,
        on_chunk: &mut dyn FnMut(u64, u64),
    ) -> Result<Transfer, EngineError> {
        let result = copy_single(source, target, buffer_size, cancel, on_chunk);
        clean_up(target, result)
    }
}

fn copy_single(
    source: &Path,
    target: &Path,
    buffer_size: usize,
    cancel: &CancelToken,
    on_chunk: &mut dyn FnMut(u64, u64),
) -> Result<Transfer, EngineError> {
    let (mut src_file, mut dst_file, file_size) = open_pair(source, target)?;
    let mut buffer = vec![0u8; buffer_size.max(1)];
    let mut bytes_copied = 0u64;

    loop {
        let n = read_chunk(&mut src_file, &mut buffer, source)?;

        if n > 0 {
            dst_file
                .write_all(&buffer[..n])
                .map_err(|e| EngineError::WriteError {
                    path: target.to_path_buf(),
                    source: e,
                })?;
            bytes_copied += n as u64;
            on_chunk(file_size, bytes_copied);
        }

        if cancel.is_cancelled() {
            return Ok(Transfer::Cancelled { bytes_copied });
        }

        if n == 0 {
            return Ok(Transfer::Completed { bytes_copied });
        }
    }
}

/// Pipelined copier: the next chunk is read while the previous one is being
/// written.
#[derive(Debug, Clone, Copy, Default)]
pub struct DoubleBufferCopier;

impl DataCopier for DoubleBufferCopier {
    fn strategy(&self) -> CopierStrategy {
        CopierStrategy::DoubleBuffer
    }

    fn copy(
        &self,
        source: &Path,
        target: &Path,
        buffer_size: usize,
        cancel: &CancelToken,
        on_chunk: &mut dyn FnMut(u64, u64),
    ) -> Result<Transfer, EngineError> {
        let result = copy_double(source, target, buffer_size, cancel, on_chunk);
        clean_up(target, result)
    }
}

/// A filled buffer and the number of valid bytes in it.
type WriteJob = (Vec<u8>, usize);

fn copy_double(
    source: &Path,
    target: &Path,
    buffer_size: usize,
    cancel: &CancelToken,
    on_chunk: &mut dyn FnMut(u64, u64),
) -> Result<Transfer, EngineError> {
    let (mut src_file, dst_file, file_size) = open_pair(source, target)?;

    // Capacity 1 on both sides: at most one write is ever outstanding.
    let (job_tx, job_rx) = bounded::<WriteJob>(1);
    let (done_tx, done_rx) = bounded::<io::Result<Vec<u8>>>(1);

    thread::scope(|scope| {
        scope.spawn(move || write_loop(dst_file, job_rx, done_tx));

        let pipeline = Pipeline {
            source,
            target,
            file_size,
            jobs: job_tx,
            done: &done_rx,
        };
        pipeline.run(&mut src_file, buffer_size.max(1), cancel, on_chunk)
    })
}

/// Writer thread body. Sends each buffer back once it has been written, or
/// the error that stopped it.
fn write_loop(mut dst_file: File, jobs: Receiver<WriteJob>, done: Sender<io::Result<Vec<u8>>>) {
    for (buffer, len) in jobs {
        let result = dst_file.write_all(&buffer[..len]).map(|()| buffer);
        let failed = result.is_err();
        if done.send(result).is_err() || failed {
            break;
        }
    }
}

struct Pipeline<'a> {
    source: &'a Path,
    target: &'a Path,
    file_size: u64,
    jobs: Sender<WriteJob>,
    done: &'a Receiver<io::Result<Vec<u8>>>,
}

impl Pipeline<'_> {
    /// Consumes the pipeline so the job sender is dropped on return, which
    /// lets the writer thread finish.
    fn run(
        self,
        src_file: &mut File,
        buffer_size: usize,
        cancel: &CancelToken,
        on_chunk: &mut dyn FnMut(u64, u64),
    ) -> Result<Transfer, EngineError> {
        let mut read_buffer = vec![0u8; buffer_size];
        // `None` while the other buffer is owned by an in-flight write
        let mut idle_buffer = Some(vec![0u8; buffer_size]);
        let mut bytes_copied = 0u64;

        loop {
            let n = read_chunk(src_file, &mut read_buffer, self.source)?;

            if n > 0 {
                let next = match idle_buffer.take() {
                    Some(buffer) => buffer,
                    None => self.wait_for_write()?,
                };
                let filled = std::mem::replace(&mut read_buffer, next);
                if self.jobs.send((filled, n)).is_err() {
                    return Err(self.writer_gone());
                }
                bytes_copied += n as u64;
                on_chunk(self.file_size, bytes_copied);
            }

            if cancel.is_cancelled() {
                if idle_buffer.is_none() {
                    let _ = self.wait_for_write();
                }
                return Ok(Transfer::Cancelled { bytes_copied });
            }

            if n == 0 {
                break;
            }
        }

        if idle_buffer.is_none() {
            self.wait_for_write()?;
        }
        Ok(Transfer::Completed { bytes_copied })
    }

    fn wait_for_write(&self) -> Result<Vec<u8>, EngineError> {
        match self.done.recv() {
            Ok(Ok(buffer)) => Ok(buffer),
            Ok(Err(e)) => Err(EngineError::WriteError {
                path: self.target.to_path_buf(),
                source: e,
            }),
            Err(_) => Err(self.writer_gone()),
        }
    }

    fn writer_gone(&self) -> EngineError {
        EngineError::WriteError {
            path: self.target.to_path_buf(),
            source: io::Error::new(io::ErrorKind::BrokenPipe, "writer thread stopped"),
        }
    }
}

fn open_pair(source: &Path, target: &Path) -> Result<(File, File, u64), EngineError> {
    let src_file = File::open(source).map_err(|e| EngineError::ReadError {
        path: source.to_path_buf(),
        source: e,
    })?;
    let file_size = src_file
        .metadata()
        .map_err(|e| EngineError::ReadError {
            path: source.to_path_buf(),
            source: e,
        })?
        .len();
    let dst_file = File::create(target).map_err(|e| EngineError::WriteError {
        path: target.to_path_buf(),
        source: e,
    })?;
    Ok((src_file, dst_file, file_size))
}

fn read_chunk(file: &mut File, buffer: &mut [u8], path: &Path) -> Result<usize, EngineError> {
    loop {
        match file.read(buffer) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            result => {
                return result.map_err(|e| EngineError::ReadError {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        }
    }
}

/// Remove the target unless the transfer completed. Both files are closed by
/// the time this runs.
fn clean_up(
    target: &Path,
    result: Result<Transfer, EngineError>,
) -> Result<Transfer, EngineError> {
    if !matches!(result, Ok(Transfer::Completed { .. })) {
        fs_ops::remove_partial(target);
    }
    result
}
