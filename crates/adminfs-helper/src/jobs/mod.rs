//! The privileged jobs behind each verb.
//!
//! Filesystem semantics here are deliberately plain: enough to exercise the
//! command machinery, with errors mapped onto [`ErrorCode`]s.

mod attrs;
mod copy;
mod del;
mod file;
mod get;
mod list_dir;
mod put;
mod stat;

pub use file::FileCommand;
pub use put::PutCommand;

use crate::command::VerbCommand;
use crate::job::{spawn_job, JobContext, JobFuture};
use adminfs_core::{
    AdminError, Command, ErrorCode, FileType, Result, StatRecord, Verb,
};
use adminfs_stream::PipeEndpoint;
use async_trait::async_trait;
use nix::unistd::{Gid, Group, Uid, User};
use parking_lot::Mutex;
use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

type JobFactory = Box<dyn FnOnce(JobContext) -> JobFuture + Send>;

/// Command whose whole work is one job started by `start`.
pub struct OneShotCommand {
    verb: Verb,
    factory: Mutex<Option<JobFactory>>,
}

impl std::fmt::Debug for OneShotCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OneShotCommand")
            .field("verb", &self.verb)
            .finish_non_exhaustive()
    }
}

impl OneShotCommand {
    /// Command running the job produced by `factory`.
    pub fn new<F>(verb: Verb, factory: F) -> Self
    where
        F: FnOnce(JobContext) -> JobFuture + Send + 'static,
    {
        Self {
            verb,
            factory: Mutex::new(Some(Box::new(factory))),
        }
    }
}

#[async_trait]
impl VerbCommand for OneShotCommand {
    fn verb(&self) -> Verb {
        self.verb
    }

    fn start(&self, ctx: JobContext) -> Result<()> {
        let factory = self
            .factory
            .lock()
            .take()
            .ok_or_else(|| AdminError::invalid("command already started"))?;
        spawn_job(ctx.clone(), factory(ctx));
        Ok(())
    }
}

/// Build the command object body for `command`.
///
/// Streaming verbs need the matching pipe end: the write end for `get`, the
/// read end for `put`. Other verbs must not carry one.
pub fn build(command: Command, endpoint: Option<PipeEndpoint>) -> Result<Box<dyn VerbCommand>> {
    let verb = command.verb();
    let endpoint = match (verb.is_streaming(), endpoint) {
        (true, Some(endpoint)) => Some(endpoint),
        (true, None) => {
            return Err(AdminError::invalid(format!("{verb} needs a stream pipe endpoint")))
        }
        (false, Some(_)) => {
            return Err(AdminError::invalid(format!("{verb} takes no stream pipe endpoint")))
        }
        (false, None) => None,
    };

    let body: Box<dyn VerbCommand> = match command {
        Command::ListDir { url } => {
            let path = url.path().to_path_buf();
            Box::new(OneShotCommand::new(verb, move |ctx| {
                Box::pin(list_dir::run(ctx, path))
            }))
        }
        Command::Stat { url } => {
            let path = url.path().to_path_buf();
            Box::new(OneShotCommand::new(verb, move |ctx| Box::pin(stat::run(ctx, path))))
        }
        Command::Get { url } => {
            let writer = endpoint
                .and_then(PipeEndpoint::into_writer)
                .ok_or_else(|| AdminError::invalid("get needs the write end of the pipe"))?;
            let path = url.path().to_path_buf();
            Box::new(OneShotCommand::new(verb, move |ctx| {
                Box::pin(get::run(ctx, path, writer))
            }))
        }
        Command::Put {
            url,
            permissions,
            flags,
        } => {
            let reader = endpoint
                .and_then(PipeEndpoint::into_reader)
                .ok_or_else(|| AdminError::invalid("put needs the read end of the pipe"))?;
            Box::new(PutCommand::new(url.path().to_path_buf(), permissions, flags, reader))
        }
        Command::Copy {
            src,
            dst,
            permissions,
            flags,
        } => {
            let (src, dst) = (src.path().to_path_buf(), dst.path().to_path_buf());
            Box::new(OneShotCommand::new(verb, move |ctx| {
                Box::pin(copy::run(ctx, src, dst, permissions, flags))
            }))
        }
        Command::Del { url } => {
            let path = url.path().to_path_buf();
            Box::new(OneShotCommand::new(verb, move |ctx| Box::pin(del::run(ctx, path))))
        }
        Command::Mkdir { url, permissions } => {
            let path = url.path().to_path_buf();
            Box::new(OneShotCommand::new(verb, move |_ctx| {
                Box::pin(attrs::mkdir(path, permissions))
            }))
        }
        Command::Rename { src, dst, flags } => {
            let (src, dst) = (src.path().to_path_buf(), dst.path().to_path_buf());
            Box::new(OneShotCommand::new(verb, move |_ctx| {
                Box::pin(attrs::rename(src, dst, flags))
            }))
        }
        Command::Chmod { url, permissions } => {
            let path = url.path().to_path_buf();
            Box::new(OneShotCommand::new(verb, move |_ctx| {
                Box::pin(attrs::chmod(path, permissions))
            }))
        }
        Command::Chown { url, owner, group } => {
            let path = url.path().to_path_buf();
            Box::new(OneShotCommand::new(verb, move |_ctx| {
                Box::pin(attrs::chown(path, owner, group))
            }))
        }
        Command::File { url, mode } => Box::new(FileCommand::new(url.path().to_path_buf(), mode)),
    };
    Ok(body)
}

/// Describe the object at `path` without following a final symlink.
pub(crate) async fn stat_record(path: &Path, name: String) -> Result<StatRecord> {
    let metadata = tokio::fs::symlink_metadata(path)
        .await
        .map_err(|e| AdminError::from_io(&e, ErrorCode::CannotRead))?;
    let link_target = if metadata.file_type().is_symlink() {
        tokio::fs::read_link(path)
            .await
            .ok()
            .map(|target| target.to_string_lossy().into_owned())
    } else {
        None
    };
    Ok(record_from_metadata(path, name, &metadata, link_target))
}

fn record_from_metadata(
    path: &Path,
    name: String,
    metadata: &Metadata,
    link_target: Option<String>,
) -> StatRecord {
    let file_type = if metadata.file_type().is_symlink() {
        FileType::Symlink
    } else if metadata.is_dir() {
        FileType::Directory
    } else if metadata.is_file() {
        FileType::File
    } else {
        FileType::Other
    };
    let mime_type = match file_type {
        FileType::Directory => Some(DIRECTORY_MIME.to_string()),
        FileType::File => Some(guess_mime(path, None).to_string()),
        _ => None,
    };
    StatRecord {
        name,
        file_type,
        size: metadata.len(),
        mode: metadata.mode() & 0o7777,
        uid: metadata.uid(),
        gid: metadata.gid(),
        user: User::from_uid(Uid::from_raw(metadata.uid()))
            .ok()
            .flatten()
            .map(|u| u.name),
        group: Group::from_gid(Gid::from_raw(metadata.gid()))
            .ok()
            .flatten()
            .map(|g| g.name),
        modified: metadata.mtime(),
        accessed: metadata.atime(),
        link_target,
        mime_type,
    }
}

const DIRECTORY_MIME: &str = "inode/directory";
const FALLBACK_MIME: &str = "application/octet-stream";

/// Content type from the first bytes when given, else from the extension.
pub(crate) fn guess_mime(path: &Path, head: Option<&[u8]>) -> &'static str {
    if let Some(head) = head {
        if let Some(mime) = sniff(head) {
            return mime;
        }
    }
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let by_extension = match extension.as_deref() {
        Some("txt" | "conf" | "cfg" | "log" | "ini") => Some("text/plain"),
        Some("toml") => Some("application/toml"),
        Some("json") => Some("application/json"),
        Some("xml") => Some("application/xml"),
        Some("html" | "htm") => Some("text/html"),
        Some("sh") => Some("application/x-shellscript"),
        Some("png") => Some("image/png"),
        Some("jpg" | "jpeg") => Some("image/jpeg"),
        Some("gz") => Some("application/gzip"),
        Some("pdf") => Some("application/pdf"),
        _ => None,
    };
    match (by_extension, head) {
        (Some(mime), _) => mime,
        (None, Some(head)) if looks_like_text(head) => "text/plain",
        _ => FALLBACK_MIME,
    }
}

fn sniff(head: &[u8]) -> Option<&'static str> {
    const MAGIC: &[(&[u8], &str)] = &[
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"GIF8", "image/gif"),
        (b"%PDF-", "application/pdf"),
        (b"\x1f\x8b", "application/gzip"),
        (b"PK\x03\x04", "application/zip"),
        (b"\x7fELF", "application/x-executable"),
        (b"#!", "application/x-shellscript"),
    ];
    MAGIC
        .iter()
        .find(|(magic, _)| head.starts_with(magic))
        .map(|(_, mime)| *mime)
}

fn looks_like_text(head: &[u8]) -> bool {
    !head.is_empty() && std::str::from_utf8(head).is_ok() && !head.contains(&0)
}

/// Whether `path` exists, without following a final symlink.
pub(crate) async fn exists(path: &Path) -> bool {
    tokio::fs::symlink_metadata(path).await.is_ok()
}

pub(crate) fn read_error(err: std::io::Error) -> AdminError {
    AdminError::from_io(&err, ErrorCode::CannotRead)
}

pub(crate) fn write_error(err: std::io::Error) -> AdminError {
    AdminError::from_io(&err, ErrorCode::CannotWrite)
}

/// Apply permission bits.
pub(crate) async fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .map_err(write_error)
}
