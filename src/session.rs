//! Per-connection SFTP session state and command handlers.
//!
//! [`SftpSession`] owns the handle registry and the currently active
//! [`Protocol`] table; [`SftpSession::dispatch`] is the single entry point
//! the SSH integration layer in [`crate::server`] feeds raw channel bytes
//! into. Everything below that is opcode-specific logic grounded in
//! `original_source/v3.c`/`v6.c`/`stat.c`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::{Buf, Bytes};
use russh::server::Msg;
use russh::Channel;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use crate::attrs::{self, AttrFlags, FileAttrs, PathTarget};
use crate::config::Config;
use crate::error::{map_io_error, Error, Result};
use crate::handles::{HandleRegistry, SlotState};
use crate::protocol::{self, opcode, BoxFuture, OpenFlags, Protocol, StatusCode};
use crate::wire;

/// Ceiling on simultaneously open handles per session.
const MAX_HANDLES: usize = 1024;
/// Largest single `READ` this server will honor, matching common
/// OpenSSH-compatible server limits.
const MAX_READ: u32 = 64 * 1024;
/// Per-operation host syscall timeout.
const FILE_OP_TIMEOUT: Duration = Duration::from_secs(30);
/// Directory entries sent per `READDIR` batch.
const READDIR_BATCH: usize = 100;

const REALPATH_NO_CHECK: u8 = 1;
const REALPATH_STAT_IF: u8 = 2;
const REALPATH_STAT_ALWAYS: u8 = 3;

/// v5/v6 rename flag asking for a non-atomic overwrite of an existing
/// target, bypassing the link+unlink dance entirely.
const RENAME_OVERWRITE: u32 = 0x0000_0001;

/// Per-client SFTP session state: the active protocol table, open handles,
/// and whether `INIT` has been processed yet.
pub struct SftpSession {
    config: Arc<Config>,
    pub channel: Option<Channel<Msg>>,
    handles: HandleRegistry,
    protocol: &'static Protocol,
    initialized: bool,
}

impl SftpSession {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            channel: None,
            handles: HandleRegistry::new(),
            protocol: protocol::table_for_version(3),
            initialized: false,
        }
    }
}

impl Drop for SftpSession {
    fn drop(&mut self) {
        let n = self.handles.len();
        if n > 0 {
            info!("closing {} open handle(s) on session end", n);
            self.handles.close_all();
        }
    }
}

impl SftpSession {
    /// Entry point: parse the opcode, dispatch through the active protocol
    /// table, and return the response packet bytes ready for the channel.
    pub async fn dispatch(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        if data.is_empty() {
            return Err(Error::Protocol("empty packet".into()));
        }
        let op = data[0];
        let mut body = Bytes::copy_from_slice(&data[1..]);

        if op == opcode::INIT {
            return self.handle_init(&mut body).await;
        }

        if !self.initialized {
            return Err(Error::Protocol("session not initialized".into()));
        }

        // No request id has been read yet, so there is nothing to attach a
        // STATUS reply to; a truncated header is session-fatal like a
        // malformed INIT.
        let id = wire::get_u32(&mut body)?;
        debug!(opcode = op, request_id = id, "dispatching SFTP request");

        if op == opcode::EXTENDED {
            let name = match wire::get_string(&mut body) {
                Ok(n) => n,
                Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
            };
            return match self.protocol.lookup_extension(&name) {
                Some(f) => f(self, body, id).await,
                None => Ok(protocol::send_status_error(
                    id,
                    &Error::NotSupported(format!("extension {name}")),
                    self.protocol.max_status,
                )),
            };
        }

        match self.protocol.lookup(op) {
            Some(f) => f(self, body, id).await,
            None => Ok(protocol::send_status_error(
                id,
                &Error::NotSupported(format!("opcode {op}")),
                self.protocol.max_status,
            )),
        }
    }

    async fn handle_init(&mut self, body: &mut Bytes) -> Result<Vec<u8>> {
        if self.initialized {
            return Err(Error::Protocol("duplicate INIT".into()));
        }
        let client_version = wire::get_u32(body)?;
        let version = client_version.min(protocol::SERVER_MAX_VERSION).max(3);
        self.protocol = protocol::table_for_version(version);
        self.initialized = true;

        info!(client_version, negotiated_version = version, "SFTP session initialized");

        let mut w = wire::Writer::begin();
        w.put_u8(opcode::VERSION).put_u32(version);
        for name in self.protocol.extensions.keys() {
            w.put_string(name).put_string("1");
        }
        Ok(w.end())
    }

    /// Resolve a client-supplied path against the session's confined root,
    /// rejecting empty paths, embedded NULs, and traversal outside the
    /// root directory.
    fn resolve_path(&self, path: &str) -> Result<PathBuf> {
        if path.is_empty() {
            return Err(Error::InvalidPath("empty path".into()));
        }
        if path.contains('\0') {
            warn!("path contains null byte: {:?}", path);
            return Err(Error::InvalidPath("path contains invalid characters".into()));
        }

        let relative = path.trim_start_matches('/');
        let resolved = self.config.root_dir.join(relative);

        if !resolved.starts_with(&self.config.root_dir) {
            warn!("path traversal attempt: {}", path);
            return Err(Error::InvalidPath("invalid path".into()));
        }

        Ok(resolved)
    }

    /// The client-visible form of a resolved host path: root-relative,
    /// absolute, `/`-separated.
    fn virtual_path(&self, resolved: &Path) -> String {
        let rel = resolved.strip_prefix(&self.config.root_dir).unwrap_or(resolved);
        let s = rel.to_string_lossy();
        if s.is_empty() {
            "/".to_string()
        } else {
            format!("/{s}")
        }
    }

    fn want_ownergroup(&self) -> bool {
        self.protocol.attr_bits.contains(AttrFlags::OWNERGROUP)
    }

    // ---- OPEN -----------------------------------------------------------

    async fn open_common(&mut self, filename: String, flags: OpenFlags, mut attrs: FileAttrs, id: u32) -> Result<Vec<u8>> {
        let path = match self.resolve_path(&filename) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };

        if self.handles.len() >= MAX_HANDLES {
            return Ok(protocol::send_status_error(
                id,
                &Error::resource_exhaustion("too many open handles"),
                self.protocol.max_status,
            ));
        }

        let existed_before = tokio::fs::symlink_metadata(&path).await.is_ok();

        let mut options = tokio::fs::OpenOptions::new();
        let read = flags.has(OpenFlags::READ);
        let write = flags.has(OpenFlags::WRITE);
        options.read(read || !write);
        if write {
            options.write(true);
        }
        if flags.has(OpenFlags::APPEND) && write {
            options.append(true);
        }
        if flags.has(OpenFlags::CREAT) {
            options.create(true);
        }
        if flags.has(OpenFlags::TRUNC) {
            options.truncate(true);
        }
        if flags.has(OpenFlags::EXCL) {
            options.create_new(true);
        }

        if let Some(mode) = attrs.get_permissions() {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(mode & 0o777);
            attrs.valid.remove(AttrFlags::PERMISSIONS);
        }

        let file = match options.open(&path).await {
            Ok(f) => f,
            Err(e) => return Ok(protocol::send_status_error(id, &map_io_error(e, &filename), self.protocol.max_status)),
        };

        let created = flags.has(OpenFlags::CREAT) && !existed_before;

        if !attrs.valid.is_empty() {
            if let Err(e) = attrs::apply(&PathTarget(&path), &attrs) {
                drop(file);
                if created {
                    let _ = tokio::fs::remove_file(&path).await;
                }
                return Ok(protocol::send_status_error(id, &e, self.protocol.max_status));
            }
        }

        let text = flags.has(OpenFlags::TEXT);
        let handle = self.handles.open_file(path, file, text);
        Ok(protocol::send_handle(id, &handle))
    }

    async fn handle_open_v34(&mut self, mut body: Bytes, id: u32) -> Result<Vec<u8>> {
        let filename = match wire::get_path(&mut body) {
            Ok(f) => f,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let pflags = match wire::get_u32(&mut body) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let attrs = match (self.protocol.parseattrs)(&mut body) {
            Ok(a) => a,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        self.open_common(filename, OpenFlags(pflags), attrs, id).await
    }

    async fn handle_open_v56(&mut self, mut body: Bytes, id: u32) -> Result<Vec<u8>> {
        const ACE_READ_DATA: u32 = 0x0000_0001;
        const ACE_WRITE_DATA: u32 = 0x0000_0002;
        const ACE_APPEND_DATA: u32 = 0x0000_0004;

        let filename = match wire::get_path(&mut body) {
            Ok(f) => f,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let desired_access = match wire::get_u32(&mut body) {
            Ok(a) => a,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let disposition = match wire::get_u32(&mut body) {
            Ok(d) => d,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let attrs = match (self.protocol.parseattrs)(&mut body) {
            Ok(a) => a,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };

        let mut flags = 0u32;
        if desired_access & ACE_READ_DATA != 0 {
            flags |= OpenFlags::READ;
        }
        if desired_access & (ACE_WRITE_DATA | ACE_APPEND_DATA) != 0 {
            flags |= OpenFlags::WRITE;
        }
        if desired_access & ACE_APPEND_DATA != 0 {
            flags |= OpenFlags::APPEND;
        }
        match disposition & 0x7 {
            0 => flags |= OpenFlags::CREAT | OpenFlags::EXCL,
            1 => flags |= OpenFlags::CREAT | OpenFlags::TRUNC,
            3 => flags |= OpenFlags::CREAT,
            4 => flags |= OpenFlags::TRUNC,
            _ => {}
        }

        self.open_common(filename, OpenFlags(flags), attrs, id).await
    }

    // ---- CLOSE ------------------------------------------------------------

    async fn handle_close(&mut self, mut body: Bytes, id: u32) -> Result<Vec<u8>> {
        let handle = match wire::get_handle(&mut body) {
            Ok(h) => h,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        match self.handles.close(&handle) {
            Ok(()) => Ok(protocol::send_status(id, StatusCode::Ok as u32, "")),
            Err(e) => Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        }
    }

    // ---- READ / WRITE -------------------------------------------------

    async fn handle_read(&mut self, mut body: Bytes, id: u32) -> Result<Vec<u8>> {
        let handle = match wire::get_handle(&mut body) {
            Ok(h) => h,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let offset = match wire::get_u64(&mut body) {
            Ok(o) => o,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let len = match wire::get_u32(&mut body) {
            Ok(l) => l.min(MAX_READ) as usize,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };

        let mut guard = match self.handles.lock_owned(&handle).await {
            Ok(g) => g,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };

        let (file, text, cursor) = match &mut *guard {
            SlotState::File { file, text, text_cursor, .. } => (file, *text, text_cursor),
            SlotState::Dir { .. } => {
                return Ok(protocol::send_status_error(
                    id,
                    &Error::invalid_handle("cannot read from directory handle"),
                    self.protocol.max_status,
                ));
            }
        };

        let seek_to = if text { *cursor } else { offset };
        if let Err(e) = file.seek(std::io::SeekFrom::Start(seek_to)).await {
            return Ok(protocol::send_status_error(id, &Error::Io(e), self.protocol.max_status));
        }

        let mut buffer = vec![0u8; len];
        match timeout(FILE_OP_TIMEOUT, file.read(&mut buffer)).await {
            Ok(Ok(0)) => Ok(protocol::send_status(id, StatusCode::Eof as u32, "EOF")),
            Ok(Ok(n)) => {
                buffer.truncate(n);
                if text {
                    *cursor += n as u64;
                }
                Ok(protocol::send_data(id, &buffer))
            }
            Ok(Err(e)) => Ok(protocol::send_status_error(id, &Error::Io(e), self.protocol.max_status)),
            Err(_) => Ok(protocol::send_status_error(id, &Error::timeout("read timed out"), self.protocol.max_status)),
        }
    }

    async fn handle_write(&mut self, mut body: Bytes, id: u32) -> Result<Vec<u8>> {
        let handle = match wire::get_handle(&mut body) {
            Ok(h) => h,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let offset = match wire::get_u64(&mut body) {
            Ok(o) => o,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let data = match wire::get_bytes(&mut body) {
            Ok(d) => d,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };

        let mut guard = match self.handles.lock_owned(&handle).await {
            Ok(g) => g,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };

        let (file, text, cursor) = match &mut *guard {
            SlotState::File { file, text, text_cursor, .. } => (file, *text, text_cursor),
            SlotState::Dir { .. } => {
                return Ok(protocol::send_status_error(
                    id,
                    &Error::invalid_handle("cannot write to directory handle"),
                    self.protocol.max_status,
                ));
            }
        };

        let seek_to = if text { *cursor } else { offset };
        if let Err(e) = file.seek(std::io::SeekFrom::Start(seek_to)).await {
            return Ok(protocol::send_status_error(id, &Error::Io(e), self.protocol.max_status));
        }

        match timeout(FILE_OP_TIMEOUT, file.write_all(&data)).await {
            Ok(Ok(())) => {
                if text {
                    *cursor += data.len() as u64;
                }
                Ok(protocol::send_status(id, StatusCode::Ok as u32, ""))
            }
            Ok(Err(e)) => Ok(protocol::send_status_error(id, &Error::Io(e), self.protocol.max_status)),
            Err(_) => Ok(protocol::send_status_error(id, &Error::timeout("write timed out"), self.protocol.max_status)),
        }
    }

    // ---- STAT / LSTAT / FSTAT / SETSTAT / FSETSTAT ---------------------

    async fn stat_path(&mut self, mut body: Bytes, id: u32, follow: bool) -> Result<Vec<u8>> {
        let path = match wire::get_path(&mut body) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let resolved = match self.resolve_path(&path) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };

        let meta = if follow {
            timeout(FILE_OP_TIMEOUT, tokio::fs::metadata(&resolved)).await
        } else {
            timeout(FILE_OP_TIMEOUT, tokio::fs::symlink_metadata(&resolved)).await
        };

        match meta {
            Ok(Ok(meta)) => {
                let attrs = FileAttrs::from_metadata(&meta, self.want_ownergroup());
                protocol::send_attrs(id, &attrs, self.protocol.sendattrs)
            }
            Ok(Err(e)) => Ok(protocol::send_status_error(id, &map_io_error(e, &path), self.protocol.max_status)),
            Err(_) => Ok(protocol::send_status_error(id, &Error::timeout("stat timed out"), self.protocol.max_status)),
        }
    }

    async fn handle_stat(&mut self, body: Bytes, id: u32) -> Result<Vec<u8>> {
        self.stat_path(body, id, true).await
    }

    async fn handle_lstat(&mut self, body: Bytes, id: u32) -> Result<Vec<u8>> {
        self.stat_path(body, id, false).await
    }

    async fn handle_fstat(&mut self, mut body: Bytes, id: u32) -> Result<Vec<u8>> {
        let handle = match wire::get_handle(&mut body) {
            Ok(h) => h,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let guard = match self.handles.lock_owned(&handle).await {
            Ok(g) => g,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let file = match &*guard {
            SlotState::File { file, .. } => file,
            SlotState::Dir { .. } => {
                return Ok(protocol::send_status_error(
                    id,
                    &Error::invalid_handle("cannot fstat a directory handle"),
                    self.protocol.max_status,
                ));
            }
        };
        match file.metadata().await {
            Ok(meta) => {
                let attrs = FileAttrs::from_metadata(&meta, self.want_ownergroup());
                protocol::send_attrs(id, &attrs, self.protocol.sendattrs)
            }
            Err(e) => Ok(protocol::send_status_error(id, &Error::Io(e), self.protocol.max_status)),
        }
    }

    async fn handle_setstat(&mut self, mut body: Bytes, id: u32) -> Result<Vec<u8>> {
        let path = match wire::get_path(&mut body) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let attrs = match (self.protocol.parseattrs)(&mut body) {
            Ok(a) => a,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let resolved = match self.resolve_path(&path) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        match attrs::apply(&PathTarget(&resolved), &attrs) {
            Ok(()) => Ok(protocol::send_status(id, StatusCode::Ok as u32, "")),
            Err(e) => Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        }
    }

    async fn handle_fsetstat(&mut self, mut body: Bytes, id: u32) -> Result<Vec<u8>> {
        let handle = match wire::get_handle(&mut body) {
            Ok(h) => h,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let attrs = match (self.protocol.parseattrs)(&mut body) {
            Ok(a) => a,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let guard = match self.handles.lock_owned(&handle).await {
            Ok(g) => g,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let path = match &*guard {
            SlotState::File { path, .. } => path.clone(),
            SlotState::Dir { .. } => {
                return Ok(protocol::send_status_error(
                    id,
                    &Error::invalid_handle("cannot fsetstat a directory handle"),
                    self.protocol.max_status,
                ));
            }
        };
        drop(guard);
        match attrs::apply(&PathTarget(&path), &attrs) {
            Ok(()) => Ok(protocol::send_status(id, StatusCode::Ok as u32, "")),
            Err(e) => Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        }
    }

    // ---- OPENDIR / READDIR ----------------------------------------------

    async fn handle_opendir(&mut self, mut body: Bytes, id: u32) -> Result<Vec<u8>> {
        let path = match wire::get_path(&mut body) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let resolved = match self.resolve_path(&path) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };

        let mut entries = Vec::new();
        for dot_name in [".", ".."] {
            let dot_path = resolved.join(dot_name);
            if let Ok(meta) = tokio::fs::symlink_metadata(&dot_path).await {
                let mut attrs = FileAttrs::from_metadata(&meta, self.want_ownergroup());
                attrs.name = dot_name.to_string();
                entries.push((dot_name.to_string(), attrs));
            }
        }

        let read_dir = timeout(FILE_OP_TIMEOUT, tokio::fs::read_dir(&resolved)).await;
        let mut read_dir = match read_dir {
            Ok(Ok(rd)) => rd,
            Ok(Err(e)) => return Ok(protocol::send_status_error(id, &map_io_error(e, &path), self.protocol.max_status)),
            Err(_) => return Ok(protocol::send_status_error(id, &Error::timeout("opendir timed out"), self.protocol.max_status)),
        };

        loop {
            match read_dir.next_entry().await {
                Ok(Some(entry)) => {
                    let meta = match entry.metadata().await {
                        Ok(m) => m,
                        Err(e) => return Ok(protocol::send_status_error(id, &Error::Io(e), self.protocol.max_status)),
                    };
                    let name = entry.file_name().to_string_lossy().into_owned();
                    let mut attrs = FileAttrs::from_metadata(&meta, self.want_ownergroup());
                    attrs.name = name.clone();
                    entries.push((name, attrs));
                }
                Ok(None) => break,
                Err(e) => return Ok(protocol::send_status_error(id, &Error::Io(e), self.protocol.max_status)),
            }
        }

        let handle = self.handles.open_dir(resolved, entries);
        Ok(protocol::send_handle(id, &handle))
    }

    async fn handle_readdir(&mut self, mut body: Bytes, id: u32) -> Result<Vec<u8>> {
        let handle = match wire::get_handle(&mut body) {
            Ok(h) => h,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let mut guard = match self.handles.lock_owned(&handle).await {
            Ok(g) => g,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };

        let (entries, index) = match &mut *guard {
            SlotState::Dir { entries, index, .. } => (entries, index),
            SlotState::File { .. } => {
                return Ok(protocol::send_status_error(
                    id,
                    &Error::invalid_handle("cannot readdir a file handle"),
                    self.protocol.max_status,
                ));
            }
        };

        if *index >= entries.len() {
            return Ok(protocol::send_status(id, StatusCode::Eof as u32, "end of directory"));
        }

        let end = (*index + READDIR_BATCH).min(entries.len());
        let batch: Vec<FileAttrs> = entries[*index..end].iter().map(|(_, a)| a.clone()).collect();
        *index = end;

        protocol::send_names(id, &batch, self.protocol.sendnames)
    }

    // ---- REMOVE / MKDIR / RMDIR -----------------------------------------

    async fn handle_remove(&mut self, mut body: Bytes, id: u32) -> Result<Vec<u8>> {
        let filename = match wire::get_path(&mut body) {
            Ok(f) => f,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let path = match self.resolve_path(&filename) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        match timeout(FILE_OP_TIMEOUT, tokio::fs::remove_file(&path)).await {
            Ok(Ok(())) => Ok(protocol::send_status(id, StatusCode::Ok as u32, "")),
            Ok(Err(e)) => Ok(protocol::send_status_error(id, &map_io_error(e, &filename), self.protocol.max_status)),
            Err(_) => Ok(protocol::send_status_error(id, &Error::timeout("remove timed out"), self.protocol.max_status)),
        }
    }

    async fn handle_mkdir(&mut self, mut body: Bytes, id: u32) -> Result<Vec<u8>> {
        let path = match wire::get_path(&mut body) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let attrs = match (self.protocol.parseattrs)(&mut body) {
            Ok(a) => a,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let resolved = match self.resolve_path(&path) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };

        match timeout(FILE_OP_TIMEOUT, tokio::fs::create_dir(&resolved)).await {
            Ok(Ok(())) => {
                if attrs.valid.intersects(AttrFlags::PERMISSIONS | AttrFlags::UIDGID | AttrFlags::ACCESSTIME | AttrFlags::MODIFYTIME) {
                    if let Err(e) = attrs::apply(&PathTarget(&resolved), &attrs) {
                        let _ = tokio::fs::remove_dir(&resolved).await;
                        return Ok(protocol::send_status_error(id, &e, self.protocol.max_status));
                    }
                }
                Ok(protocol::send_status(id, StatusCode::Ok as u32, ""))
            }
            Ok(Err(e)) => Ok(protocol::send_status_error(id, &map_io_error(e, &path), self.protocol.max_status)),
            Err(_) => Ok(protocol::send_status_error(id, &Error::timeout("mkdir timed out"), self.protocol.max_status)),
        }
    }

    async fn handle_rmdir(&mut self, mut body: Bytes, id: u32) -> Result<Vec<u8>> {
        let path = match wire::get_path(&mut body) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let resolved = match self.resolve_path(&path) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        match timeout(FILE_OP_TIMEOUT, tokio::fs::remove_dir(&resolved)).await {
            Ok(Ok(())) => Ok(protocol::send_status(id, StatusCode::Ok as u32, "")),
            Ok(Err(e)) => Ok(protocol::send_status_error(id, &map_io_error(e, &path), self.protocol.max_status)),
            Err(_) => Ok(protocol::send_status_error(id, &Error::timeout("rmdir timed out"), self.protocol.max_status)),
        }
    }

    // ---- REALPATH --------------------------------------------------------

    async fn handle_realpath_v345(&mut self, mut body: Bytes, id: u32) -> Result<Vec<u8>> {
        let path = match wire::get_path(&mut body) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let resolved = match self.resolve_path(&path) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let mut attrs = FileAttrs::default();
        attrs.name = self.virtual_path(&resolved);
        protocol::send_name_one(id, &attrs, self.protocol.sendnames)
    }

    async fn handle_realpath_v6(&mut self, mut body: Bytes, id: u32) -> Result<Vec<u8>> {
        let mut path = match wire::get_path(&mut body) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let control_byte = if body.has_remaining() {
            match wire::get_u8(&mut body) {
                Ok(c) => c,
                Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
            }
        } else {
            REALPATH_NO_CHECK
        };
        while body.has_remaining() {
            let frag = match wire::get_path(&mut body) {
                Ok(f) => f,
                Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
            };
            if frag.starts_with('/') {
                path = frag;
            } else {
                path = format!("{}/{}", path.trim_end_matches('/'), frag);
            }
        }

        let resolved = match self.resolve_path(&path) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let virtual_path = self.virtual_path(&resolved);

        let mut attrs = FileAttrs::default();
        attrs.name = virtual_path.clone();

        match control_byte {
            REALPATH_STAT_IF => {
                if let Ok(meta) = tokio::fs::symlink_metadata(&resolved).await {
                    attrs = FileAttrs::from_metadata(&meta, self.want_ownergroup());
                    attrs.name = virtual_path;
                }
            }
            REALPATH_STAT_ALWAYS => match tokio::fs::metadata(&resolved).await {
                Ok(meta) => {
                    attrs = FileAttrs::from_metadata(&meta, self.want_ownergroup());
                    attrs.name = virtual_path;
                }
                Err(e) => return Ok(protocol::send_status_error(id, &map_io_error(e, &path), self.protocol.max_status)),
            },
            REALPATH_NO_CHECK => {}
            _ => return Ok(protocol::send_status_error(id, &Error::Protocol("bad control byte".into()), self.protocol.max_status)),
        }

        protocol::send_name_one(id, &attrs, self.protocol.sendnames)
    }

    // ---- RENAME ------------------------------------------------------------

    async fn atomic_rename(&self, old: &Path, new: &Path) -> std::io::Result<()> {
        match tokio::fs::hard_link(old, new).await {
            Ok(()) => tokio::fs::remove_file(old).await,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(e),
            Err(_) => tokio::fs::rename(old, new).await,
        }
    }

    async fn handle_rename_v34(&mut self, mut body: Bytes, id: u32) -> Result<Vec<u8>> {
        let oldpath = match wire::get_path(&mut body) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let newpath = match wire::get_path(&mut body) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let old = match self.resolve_path(&oldpath) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let new = match self.resolve_path(&newpath) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        match self.atomic_rename(&old, &new).await {
            Ok(()) => Ok(protocol::send_status(id, StatusCode::Ok as u32, "")),
            Err(e) => Ok(protocol::send_status_error(id, &map_io_error(e, &oldpath), self.protocol.max_status)),
        }
    }

    async fn handle_rename_v56(&mut self, mut body: Bytes, id: u32) -> Result<Vec<u8>> {
        let oldpath = match wire::get_path(&mut body) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let newpath = match wire::get_path(&mut body) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let flags = if body.has_remaining() {
            match wire::get_u32(&mut body) {
                Ok(f) => f,
                Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
            }
        } else {
            0
        };

        let old = match self.resolve_path(&oldpath) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let new = match self.resolve_path(&newpath) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };

        let result = if flags & RENAME_OVERWRITE != 0 {
            tokio::fs::rename(&old, &new).await
        } else {
            self.atomic_rename(&old, &new).await
        };

        match result {
            Ok(()) => Ok(protocol::send_status(id, StatusCode::Ok as u32, "")),
            Err(e) => Ok(protocol::send_status_error(id, &map_io_error(e, &oldpath), self.protocol.max_status)),
        }
    }

    // ---- READLINK / SYMLINK / LINK --------------------------------------

    async fn handle_readlink(&mut self, mut body: Bytes, id: u32) -> Result<Vec<u8>> {
        let path = match wire::get_path(&mut body) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let resolved = match self.resolve_path(&path) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        match timeout(FILE_OP_TIMEOUT, tokio::fs::read_link(&resolved)).await {
            Ok(Ok(target)) => {
                let target_str = target.to_string_lossy().into_owned();
                let mut attrs = FileAttrs::default();
                attrs.name = target_str;
                protocol::send_name_one(id, &attrs, self.protocol.sendnames)
            }
            Ok(Err(e)) => Ok(protocol::send_status_error(id, &map_io_error(e, &path), self.protocol.max_status)),
            Err(_) => Ok(protocol::send_status_error(id, &Error::timeout("readlink timed out"), self.protocol.max_status)),
        }
    }

    async fn handle_symlink(&mut self, mut body: Bytes, id: u32) -> Result<Vec<u8>> {
        let linkpath = match wire::get_path(&mut body) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let targetpath = match wire::get_path(&mut body) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let resolved_link = match self.resolve_path(&linkpath) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };

        match timeout(FILE_OP_TIMEOUT, tokio::fs::symlink(&targetpath, &resolved_link)).await {
            Ok(Ok(())) => Ok(protocol::send_status(id, StatusCode::Ok as u32, "")),
            Ok(Err(e)) => Ok(protocol::send_status_error(id, &map_io_error(e, &linkpath), self.protocol.max_status)),
            Err(_) => Ok(protocol::send_status_error(id, &Error::timeout("symlink timed out"), self.protocol.max_status)),
        }
    }

    async fn handle_link_v6(&mut self, mut body: Bytes, id: u32) -> Result<Vec<u8>> {
        let newlinkpath = match wire::get_path(&mut body) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let oldpath = match wire::get_path(&mut body) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let symbolic = match wire::get_u8(&mut body) {
            Ok(s) => s != 0,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };

        let new_resolved = match self.resolve_path(&newlinkpath) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let old_resolved = match self.resolve_path(&oldpath) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };

        let result = if symbolic {
            tokio::fs::symlink(&old_resolved, &new_resolved).await
        } else {
            tokio::fs::hard_link(&old_resolved, &new_resolved).await
        };

        match result {
            Ok(()) => Ok(protocol::send_status(id, StatusCode::Ok as u32, "")),
            Err(e) if e.raw_os_error() == Some(libc::EPERM) => {
                Ok(protocol::send_status(id, StatusCode::OpUnsupported as u32, "link not supported on this filesystem"))
            }
            Err(e) => Ok(protocol::send_status_error(id, &map_io_error(e, &newlinkpath), self.protocol.max_status)),
        }
    }

    // ---- v6 extensions ---------------------------------------------------

    async fn handle_posix_rename(&mut self, mut body: Bytes, id: u32) -> Result<Vec<u8>> {
        let oldpath = match wire::get_path(&mut body) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let newpath = match wire::get_path(&mut body) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let old = match self.resolve_path(&oldpath) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let new = match self.resolve_path(&newpath) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        match tokio::fs::rename(&old, &new).await {
            Ok(()) => Ok(protocol::send_status(id, StatusCode::Ok as u32, "")),
            Err(e) => Ok(protocol::send_status_error(id, &map_io_error(e, &oldpath), self.protocol.max_status)),
        }
    }

    async fn handle_space_available(&mut self, mut body: Bytes, id: u32) -> Result<Vec<u8>> {
        let path = match wire::get_path(&mut body) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let resolved = match self.resolve_path(&path) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        match nix::sys::statvfs::statvfs(&resolved) {
            Ok(vfs) => {
                let bsize = vfs.fragment_size().max(1);
                let bytes_total = bsize * vfs.blocks();
                let bytes_free = bsize * vfs.blocks_free();
                let bytes_available = bsize * vfs.blocks_available();
                Ok(protocol::send_extended_reply(id, |w| {
                    w.put_u64(bytes_total)
                        .put_u64(bytes_free)
                        .put_u64(bytes_available)
                        .put_u64(bytes_available)
                        .put_u32(0);
                }))
            }
            Err(e) => {
                warn!("statvfs failed for {:?}: {}", resolved, e);
                Ok(protocol::send_extended_reply(id, |w| {
                    w.put_u64(0).put_u64(0).put_u64(0).put_u64(0).put_u32(0);
                }))
            }
        }
    }

    async fn handle_statfs(&mut self, mut body: Bytes, id: u32) -> Result<Vec<u8>> {
        let path = match wire::get_path(&mut body) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let resolved = match self.resolve_path(&path) {
            Ok(p) => p,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        match nix::sys::statvfs::statvfs(&resolved) {
            Ok(vfs) => Ok(protocol::send_extended_reply(id, |w| {
                w.put_u64(vfs.block_size())
                    .put_u64(vfs.fragment_size())
                    .put_u64(vfs.blocks())
                    .put_u64(vfs.blocks_free())
                    .put_u64(vfs.blocks_available())
                    .put_u64(vfs.files())
                    .put_u64(vfs.files_free())
                    .put_u64(vfs.files_available())
                    .put_u64(vfs.filesystem_id() as u64)
                    .put_u64(0)
                    .put_u64(vfs.name_max() as u64);
            })),
            Err(e) => Ok(protocol::send_status_error(
                id,
                &Error::Io(std::io::Error::from_raw_os_error(e as i32)),
                self.protocol.max_status,
            )),
        }
    }

    async fn handle_text_seek(&mut self, mut body: Bytes, id: u32) -> Result<Vec<u8>> {
        let handle = match wire::get_handle(&mut body) {
            Ok(h) => h,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let line = match wire::get_u64(&mut body) {
            Ok(l) => l,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };

        let mut guard = match self.handles.lock_owned(&handle).await {
            Ok(g) => g,
            Err(e) => return Ok(protocol::send_status_error(id, &e, self.protocol.max_status)),
        };
        let (file, text, cursor) = match &mut *guard {
            SlotState::File { file, text, text_cursor, .. } => (file, *text, text_cursor),
            SlotState::Dir { .. } => {
                return Ok(protocol::send_status_error(
                    id,
                    &Error::invalid_handle("cannot text-seek a directory handle"),
                    self.protocol.max_status,
                ));
            }
        };
        if !text {
            return Ok(protocol::send_status_error(
                id,
                &Error::NotSupported("text-seek on a non-text handle".into()),
                self.protocol.max_status,
            ));
        }

        if let Err(e) = file.seek(std::io::SeekFrom::Start(0)).await {
            return Ok(protocol::send_status_error(id, &Error::Io(e), self.protocol.max_status));
        }

        let mut seen_newlines = 0u64;
        let mut offset = 0u64;
        let mut chunk = [0u8; 4096];
        'scan: while seen_newlines < line {
            let n = match file.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => return Ok(protocol::send_status_error(id, &Error::Io(e), self.protocol.max_status)),
            };
            for &b in &chunk[..n] {
                offset += 1;
                if b == b'\n' {
                    seen_newlines += 1;
                    if seen_newlines == line {
                        break 'scan;
                    }
                }
            }
        }

        *cursor = offset;
        Ok(protocol::send_status(id, StatusCode::Ok as u32, ""))
    }

    async fn handle_version_select(&mut self, mut body: Bytes, id: u32) -> Result<Vec<u8>> {
        let _ = id; // the protocol forbids a response to version-select
        let requested = wire::get_string(&mut body)?;
        let version: u32 = match requested.parse() {
            Ok(v @ 3..=6) => v,
            _ => return Err(Error::Protocol(format!("invalid version-select argument '{requested}'"))),
        };
        self.protocol = protocol::table_for_version(version);
        info!(new_version = version, "version-select switched active protocol table");
        Ok(Vec::new())
    }
}

// ---- CommandFn wrappers --------------------------------------------------
//
// Each opcode's table entry is a plain (non-async) fn that boxes the call
// into the session's real async handler, since a fn pointer cannot name an
// `async fn`'s anonymous future type directly.

macro_rules! cmd {
    ($name:ident, $method:ident) => {
        pub(crate) fn $name(session: &mut SftpSession, body: Bytes, id: u32) -> BoxFuture<'_> {
            Box::pin(async move { session.$method(body, id).await })
        }
    };
}

cmd!(cmd_open_v34, handle_open_v34);
cmd!(cmd_open_v56, handle_open_v56);
cmd!(cmd_close, handle_close);
cmd!(cmd_read, handle_read);
cmd!(cmd_write, handle_write);
cmd!(cmd_stat, handle_stat);
cmd!(cmd_lstat, handle_lstat);
cmd!(cmd_fstat, handle_fstat);
cmd!(cmd_setstat, handle_setstat);
cmd!(cmd_fsetstat, handle_fsetstat);
cmd!(cmd_opendir, handle_opendir);
cmd!(cmd_readdir, handle_readdir);
cmd!(cmd_remove, handle_remove);
cmd!(cmd_mkdir, handle_mkdir);
cmd!(cmd_rmdir, handle_rmdir);
cmd!(cmd_realpath_v345, handle_realpath_v345);
cmd!(cmd_realpath_v6, handle_realpath_v6);
cmd!(cmd_rename_v34, handle_rename_v34);
cmd!(cmd_rename_v56, handle_rename_v56);
cmd!(cmd_readlink, handle_readlink);
cmd!(cmd_symlink, handle_symlink);
cmd!(cmd_link_v6, handle_link_v6);
cmd!(cmd_posix_rename, handle_posix_rename);
cmd!(cmd_space_available, handle_space_available);
cmd!(cmd_statfs, handle_statfs);
cmd!(cmd_text_seek, handle_text_seek);
cmd!(cmd_version_select, handle_version_select);

pub(crate) use cmd_open_v34 as open_v34;
pub(crate) use cmd_open_v56 as open_v56;
pub(crate) use cmd_close as close;
pub(crate) use cmd_read as read;
pub(crate) use cmd_write as write;
pub(crate) use cmd_stat as stat;
pub(crate) use cmd_lstat as lstat;
pub(crate) use cmd_fstat as fstat;
pub(crate) use cmd_setstat as setstat;
pub(crate) use cmd_fsetstat as fsetstat;
pub(crate) use cmd_opendir as opendir;
pub(crate) use cmd_readdir as readdir;
pub(crate) use cmd_remove as remove;
pub(crate) use cmd_mkdir as mkdir;
pub(crate) use cmd_rmdir as rmdir;
pub(crate) use cmd_realpath_v345 as realpath_v345;
pub(crate) use cmd_realpath_v6 as realpath_v6;
pub(crate) use cmd_rename_v34 as rename_v34;
pub(crate) use cmd_rename_v56 as rename_v56;
pub(crate) use cmd_readlink as readlink;
pub(crate) use cmd_symlink as symlink;
pub(crate) use cmd_link_v6 as link_v6;
pub(crate) use cmd_posix_rename as posix_rename;
pub(crate) use cmd_space_available as space_available;
pub(crate) use cmd_statfs as statfs;
pub(crate) use cmd_text_seek as text_seek;
pub(crate) use cmd_version_select as version_select;
