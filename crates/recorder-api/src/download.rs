//! Disk download helper.
//!
//! A transfer goes to the first capability that is available, in order:
//! 1. a [`SavePicker`] destination, streamed straight to the chosen file;
//! 2. a [`StreamWorker`] writer thread (secure origins only);
//! 3. a [`Handoff`] to the system download handler.
//!
//! Strategies 1 and 2 report progress through the caller's sink, honour the
//! [`CancelToken`] even while the body read is stalled, and remove partial
//! output on failure.
//! Strategy 3 has neither progress nor cancellation.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};

use crate::error::{ApiError, Result};

const CHUNK_SIZE: usize = 64 * 1024;
const WRITER_QUEUE: usize = 16;
const READER_QUEUE: usize = 4;
/// How often a stalled read looks at the cancel flag.
const CANCEL_POLL: Duration = Duration::from_millis(100);
const MAX_RENAME_ATTEMPTS: u32 = 999;

/// Shared cancellation flag for an in-flight download.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Chooses where a download should be written.
pub trait SavePicker: Send + Sync {
    /// `None` means the user dismissed the prompt.
    fn pick(&self, suggested_name: &str) -> Option<PathBuf>;
}

/// Hands a URL to something outside this process that performs the transfer.
pub trait Handoff: Send + Sync {
    fn hand_off(&self, url: &str, filename: &str) -> Result<()>;
}

/// Picker with a destination decided up front. A directory destination
/// receives the suggested filename.
#[derive(Clone, Debug)]
pub struct FixedPicker {
    dest: PathBuf,
}

impl FixedPicker {
    pub fn new(dest: impl Into<PathBuf>) -> Self {
        Self { dest: dest.into() }
    }
}

impl SavePicker for FixedPicker {
    fn pick(&self, suggested_name: &str) -> Option<PathBuf> {
        if self.dest.is_dir() {
            Some(self.dest.join(suggested_name))
        } else {
            Some(self.dest.clone())
        }
    }
}

/// Opens the URL with the desktop's default handler.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemHandoff;

impl Handoff for SystemHandoff {
    fn hand_off(&self, url: &str, filename: &str) -> Result<()> {
        let opener = if cfg!(target_os = "macos") {
            "open"
        } else if cfg!(windows) {
            "explorer"
        } else {
            "xdg-open"
        };
        tracing::info!(url, filename, opener, "handing download to system handler");
        Command::new(opener)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        Ok(())
    }
}

/// Writer-thread fallback that streams into a downloads directory.
///
/// The directory is only touched when this strategy is reached.
#[derive(Clone, Debug)]
pub struct StreamWorker {
    dir: PathBuf,
}

impl StreamWorker {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn register(&self) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        if !self.dir.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("{} is not a directory", self.dir.display()),
            ));
        }
        Ok(())
    }

    fn open_stream(&self, filename: &str, size: Option<u64>) -> Result<StreamWriter> {
        let path = unique_path(&self.dir.join(filename));
        let file = File::create(&path)?;
        if let Some(size) = size {
            file.set_len(size)?;
        }
        StreamWriter::spawn(path, file)
    }
}

/// Capabilities available to one download.
pub struct Strategies<'a> {
    pub picker: Option<&'a dyn SavePicker>,
    pub worker: Option<&'a StreamWorker>,
    pub handoff: &'a dyn Handoff,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Written to the picked destination.
    Saved { path: PathBuf, bytes: u64 },
    /// Written by the stream worker.
    Streamed { path: PathBuf, bytes: u64 },
    /// Delegated; completion is not observed.
    HandedOff { url: String },
}

#[derive(Clone, Debug)]
pub struct DownloadRequest<'a> {
    pub url: &'a str,
    pub suggested_name: Option<&'a str>,
}

/// Deliver `req.url` to disk using the first available strategy.
pub fn download_to_disk(
    agent: &ureq::Agent,
    req: &DownloadRequest<'_>,
    strategies: &Strategies<'_>,
    progress: &mut dyn FnMut(u64, Option<u64>),
    cancel: &CancelToken,
) -> Result<DownloadOutcome> {
    let filename = req
        .suggested_name
        .map(sanitize_filename)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| filename_from_url(req.url));

    if let Some(picker) = strategies.picker {
        tracing::debug!(url = req.url, "download via save picker");
        let Some(dest) = picker.pick(&filename) else {
            return Err(ApiError::Cancelled);
        };
        return save_to_picked(agent, req.url, &dest, progress, cancel);
    }

    if let Some(worker) = strategies.worker {
        if is_secure_context(req.url) {
            match worker.register() {
                Ok(()) => {
                    tracing::debug!(url = req.url, dir = %worker.dir().display(), "download via stream worker");
                    return stream_via_worker(agent, req, worker, &filename, progress, cancel);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "stream worker registration failed, falling back to handoff");
                }
            }
        } else {
            tracing::debug!(url = req.url, "insecure origin, skipping stream worker");
        }
    }

    cancel_check(cancel)?;
    strategies.handoff.hand_off(req.url, &filename)?;
    Ok(DownloadOutcome::HandedOff {
        url: req.url.to_string(),
    })
}

struct Fetched {
    reader: Box<dyn Read + Send>,
    total: Option<u64>,
    disposition_name: Option<String>,
}

fn fetch(agent: &ureq::Agent, url: &str, cancel: &CancelToken) -> Result<Fetched> {
    cancel_check(cancel)?;
    let resp = match agent.get(url).call() {
        Ok(resp) => resp,
        Err(err) if cancel.is_cancelled() => {
            tracing::debug!(error = %err, "request failed after cancel");
            return Err(ApiError::Cancelled);
        }
        Err(err) => return Err(ApiError::transport(url, err)),
    };
    let code = resp.status().as_u16();
    if !resp.status().is_success() {
        let body = resp
            .into_body()
            .with_config()
            .limit(200_000)
            .read_to_string()
            .unwrap_or_default();
        return Err(ApiError::from_status(code, &body));
    }
    if code == 204 {
        return Err(ApiError::Unsupported(
            "response carries no readable body stream".to_string(),
        ));
    }
    let total = resp
        .headers()
        .get("content-length")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());
    let disposition_name = resp
        .headers()
        .get("content-disposition")
        .and_then(|value| value.to_str().ok())
        .and_then(filename_from_disposition);
    Ok(Fetched {
        reader: Box::new(resp.into_body().into_reader()),
        total,
        disposition_name,
    })
}

fn save_to_picked(
    agent: &ureq::Agent,
    url: &str,
    dest: &Path,
    progress: &mut dyn FnMut(u64, Option<u64>),
    cancel: &CancelToken,
) -> Result<DownloadOutcome> {
    let fetched = fetch(agent, url, cancel)?;
    let mut file = File::create(dest)?;
    let total = fetched.total;
    let result = pump(fetched.reader, total, progress, cancel, |chunk| {
        file.write_all(&chunk).map_err(ApiError::from)
    })
    .and_then(|bytes| {
        file.flush()?;
        file.sync_all()?;
        Ok(bytes)
    });
    match result {
        Ok(bytes) => {
            tracing::info!(path = %dest.display(), bytes, "download saved");
            Ok(DownloadOutcome::Saved {
                path: dest.to_path_buf(),
                bytes,
            })
        }
        Err(err) => {
            drop(file);
            if let Err(rm) = fs::remove_file(dest) {
                tracing::warn!(path = %dest.display(), error = %rm, "failed to remove partial download");
            }
            Err(err)
        }
    }
}

fn stream_via_worker(
    agent: &ureq::Agent,
    req: &DownloadRequest<'_>,
    worker: &StreamWorker,
    filename: &str,
    progress: &mut dyn FnMut(u64, Option<u64>),
    cancel: &CancelToken,
) -> Result<DownloadOutcome> {
    let fetched = fetch(agent, req.url, cancel)?;
    let name = match (req.suggested_name, fetched.disposition_name.as_deref()) {
        (None, Some(from_header)) => sanitize_filename(from_header),
        _ => filename.to_string(),
    };
    let mut writer = worker.open_stream(&name, fetched.total)?;
    let path = writer.path.clone();
    let result = pump(fetched.reader, fetched.total, progress, cancel, |chunk| writer.write(chunk));
    match result {
        Ok(_) => {
            let bytes = writer.close()?;
            tracing::info!(path = %path.display(), bytes, "download streamed");
            Ok(DownloadOutcome::Streamed { path, bytes })
        }
        Err(err) => {
            writer.abort();
            Err(err)
        }
    }
}

enum ReadMsg {
    Data(Vec<u8>),
    Eof,
    Failed(io::Error),
}

/// Read the body on its own thread. After a cancel the thread is left to
/// exit on its next chunk or when the connection closes.
fn spawn_reader(mut reader: Box<dyn Read + Send>) -> Result<Receiver<ReadMsg>> {
    let (tx, rx) = bounded::<ReadMsg>(READER_QUEUE);
    thread::Builder::new()
        .name("download-reader".to_string())
        .spawn(move || {
            let mut buf = vec![0u8; CHUNK_SIZE];
            loop {
                let msg = match reader.read(&mut buf) {
                    Ok(0) => ReadMsg::Eof,
                    Ok(n) => ReadMsg::Data(buf[..n].to_vec()),
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => ReadMsg::Failed(err),
                };
                let done = !matches!(msg, ReadMsg::Data(_));
                if tx.send(msg).is_err() || done {
                    break;
                }
            }
        })?;
    Ok(rx)
}

/// Copy the body in chunks, reporting cumulative bytes after each write.
fn pump(
    reader: Box<dyn Read + Send>,
    total: Option<u64>,
    progress: &mut dyn FnMut(u64, Option<u64>),
    cancel: &CancelToken,
    mut sink: impl FnMut(Vec<u8>) -> Result<()>,
) -> Result<u64> {
    let chunks = spawn_reader(reader)?;
    let mut received = 0u64;
    loop {
        cancel_check(cancel)?;
        let chunk = match chunks.recv_timeout(CANCEL_POLL) {
            Ok(ReadMsg::Data(chunk)) => chunk,
            Ok(ReadMsg::Eof) => break,
            Ok(ReadMsg::Failed(_)) if cancel.is_cancelled() => return Err(ApiError::Cancelled),
            Ok(ReadMsg::Failed(err)) => return Err(ApiError::Io(err)),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                return Err(ApiError::Io(io::Error::other("download reader exited early")));
            }
        };
        let n = chunk.len() as u64;
        sink(chunk)?;
        received += n;
        progress(received, total);
    }
    cancel_check(cancel)?;
    Ok(received)
}

fn cancel_check(cancel: &CancelToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(ApiError::Cancelled);
    }
    Ok(())
}

enum WriterMsg {
    Chunk(Vec<u8>),
    Close,
    Abort,
}

struct StreamWriter {
    path: PathBuf,
    tx: Option<Sender<WriterMsg>>,
    handle: Option<JoinHandle<io::Result<u64>>>,
}

impl StreamWriter {
    fn spawn(path: PathBuf, file: File) -> Result<Self> {
        let (tx, rx) = bounded::<WriterMsg>(WRITER_QUEUE);
        let thread_path = path.clone();
        let handle = thread::Builder::new()
            .name("download-writer".to_string())
            .spawn(move || {
                let mut file = file;
                let mut written = 0u64;
                loop {
                    match rx.recv() {
                        Ok(WriterMsg::Chunk(chunk)) => {
                            if let Err(err) = file.write_all(&chunk) {
                                drop(file);
                                let _ = fs::remove_file(&thread_path);
                                return Err(err);
                            }
                            written += chunk.len() as u64;
                        }
                        Ok(WriterMsg::Close) => {
                            file.flush()?;
                            // Declared length may exceed what actually arrived.
                            file.set_len(written)?;
                            file.sync_all()?;
                            return Ok(written);
                        }
                        Ok(WriterMsg::Abort) | Err(_) => {
                            drop(file);
                            let _ = fs::remove_file(&thread_path);
                            return Err(io::Error::new(
                                io::ErrorKind::Interrupted,
                                "download stream aborted",
                            ));
                        }
                    }
                }
            });
        let handle = match handle {
            Ok(handle) => handle,
            Err(err) => {
                let _ = fs::remove_file(&path);
                return Err(ApiError::Io(err));
            }
        };
        Ok(Self {
            path,
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    fn write(&mut self, chunk: Vec<u8>) -> Result<()> {
        let Some(tx) = self.tx.as_ref() else {
            return Err(ApiError::Io(io::Error::other("download stream closed")));
        };
        if tx.send(WriterMsg::Chunk(chunk)).is_ok() {
            return Ok(());
        }
        self.tx = None;
        Err(ApiError::Io(self.join().err().unwrap_or_else(|| {
            io::Error::other("download writer exited early")
        })))
    }

    fn close(mut self) -> Result<u64> {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(WriterMsg::Close);
        }
        self.join().map_err(ApiError::Io)
    }

    fn abort(mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(WriterMsg::Abort);
        }
        let _ = self.join();
        let _ = fs::remove_file(&self.path);
    }

    fn join(&mut self) -> io::Result<u64> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("download writer panicked"))),
            None => Err(io::Error::other("download writer already joined")),
        }
    }
}

/// HTTPS origins and loopback hosts.
pub fn is_secure_context(url: &str) -> bool {
    let lower = url.trim().to_ascii_lowercase();
    if lower.starts_with("https://") {
        return true;
    }
    let Some(rest) = lower.strip_prefix("http://") else {
        return false;
    };
    let authority = rest.split(['/', '?', '#']).next().unwrap_or("");
    let host_port = authority.rsplit('@').next().unwrap_or(authority);
    let host = if let Some(v6) = host_port.strip_prefix('[') {
        v6.split(']').next().unwrap_or("")
    } else {
        host_port.split(':').next().unwrap_or("")
    };
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}

/// Last path segment of `url`, percent-decoded, or `download`.
pub fn filename_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let path = path.split_once("://").map(|(_, rest)| rest).unwrap_or(path);
    let last = path
        .split_once('/')
        .map(|(_, p)| p)
        .unwrap_or("")
        .rsplit('/')
        .find(|seg| !seg.is_empty())
        .unwrap_or("");
    let decoded = urlencoding::decode(last)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| last.to_string());
    let name = sanitize_filename(&decoded);
    if name.is_empty() {
        "download".to_string()
    } else {
        name
    }
}

/// Filename from a `Content-Disposition` header (`filename*=` preferred).
pub fn filename_from_disposition(value: &str) -> Option<String> {
    let mut plain = None;
    for part in value.split(';') {
        let part = part.trim();
        if let Some(encoded) = part.strip_prefix("filename*=") {
            let encoded = encoded.rsplit('\'').next().unwrap_or(encoded);
            if let Ok(decoded) = urlencoding::decode(encoded.trim_matches('"')) {
                let name = sanitize_filename(&decoded);
                if !name.is_empty() {
                    return Some(name);
                }
            }
        } else if let Some(name) = part.strip_prefix("filename=") {
            let name = sanitize_filename(name.trim_matches('"'));
            if !name.is_empty() {
                plain = Some(name);
            }
        }
    }
    plain
}

fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    if base == "." || base == ".." {
        return String::new();
    }
    base.chars().filter(|c| !c.is_control()).collect()
}

/// `path`, or `stem (n).ext` for the first free `n`.
fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("download");
    let ext = path.extension().and_then(|e| e.to_str());
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    for i in 1..=MAX_RENAME_ATTEMPTS {
        let candidate = match ext {
            Some(ext) => parent.join(format!("{stem} ({i}).{ext}")),
            None => parent.join(format!("{stem} ({i})")),
        };
        if !candidate.exists() {
            return candidate;
        }
    }
    path.to_path_buf()
}
