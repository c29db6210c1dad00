//! Per-version SFTP protocol tables.
//!
//! The wire protocol changed incompatibly across versions 3 through 6:
//! attribute encoding, name-list encoding, and a handful of command
//! semantics (`OPEN`, `RENAME`, `REALPATH`) all vary. [`Protocol`] captures
//! one version's behavior as a flat struct of function pointers and data,
//! mirroring the reference server's `struct sftpprotocol` table rather than
//! reaching for a trait object where every implementor is known up front.

pub mod v3;
pub mod v4;
pub mod v6;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use crate::attrs::{AttrFlags, FileAttrs};
use crate::error::{Error, Result};
use crate::session::SftpSession;
use crate::wire::Writer;

/// SFTP opcodes shared across every protocol version this server speaks.
pub mod opcode {
    pub const INIT: u8 = 1;
    pub const VERSION: u8 = 2;
    pub const OPEN: u8 = 3;
    pub const CLOSE: u8 = 4;
    pub const READ: u8 = 5;
    pub const WRITE: u8 = 6;
    pub const LSTAT: u8 = 7;
    pub const FSTAT: u8 = 8;
    pub const SETSTAT: u8 = 9;
    pub const FSETSTAT: u8 = 10;
    pub const OPENDIR: u8 = 11;
    pub const READDIR: u8 = 12;
    pub const REMOVE: u8 = 13;
    pub const MKDIR: u8 = 14;
    pub const RMDIR: u8 = 15;
    pub const REALPATH: u8 = 16;
    pub const STAT: u8 = 17;
    pub const RENAME: u8 = 18;
    pub const READLINK: u8 = 19;
    pub const SYMLINK: u8 = 20;
    pub const LINK: u8 = 21;
    pub const EXTENDED: u8 = 200;
    pub const EXTENDED_REPLY: u8 = 201;

    pub const STATUS: u8 = 101;
    pub const HANDLE: u8 = 102;
    pub const DATA: u8 = 103;
    pub const NAME: u8 = 104;
    pub const ATTRS: u8 = 105;
}

/// SFTP status codes, `SSH_FX_*`. Later protocol versions add codes past
/// `OP_UNSUPPORTED`; a table's `max_status` caps which of these an older
/// version is allowed to send (see [`Error::to_status_code`]).
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok = 0,
    Eof = 1,
    NoSuchFile = 2,
    PermissionDenied = 3,
    Failure = 4,
    BadMessage = 5,
    NoConnection = 6,
    ConnectionLost = 7,
    OpUnsupported = 8,
    InvalidHandle = 9,
    NoSuchPath = 10,
    FileAlreadyExists = 11,
    WriteProtect = 12,
    NoMedia = 13,
    NoSpaceOnFilesystem = 14,
    QuotaExceeded = 15,
    UnknownPrincipal = 16,
    LockConflict = 17,
}

impl From<StatusCode> for u32 {
    fn from(code: StatusCode) -> u32 {
        code as u32
    }
}

/// `OPEN` pflags, normalized across every protocol version's distinct wire
/// encoding (v3/v4's single `pflags` word vs v5/v6's desired-access +
/// disposition pair).
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags(pub u32);

impl OpenFlags {
    pub const READ: u32 = 0x0000_0001;
    pub const WRITE: u32 = 0x0000_0002;
    pub const APPEND: u32 = 0x0000_0004;
    pub const CREAT: u32 = 0x0000_0008;
    pub const TRUNC: u32 = 0x0000_0010;
    pub const EXCL: u32 = 0x0000_0020;
    pub const TEXT: u32 = 0x0000_0040;

    pub fn has(&self, bit: u32) -> bool {
        self.0 & bit != 0
    }
}

/// A boxed, session-borrowing future, letting [`CommandFn`] entries be
/// ordinary async methods on [`SftpSession`] without each protocol table
/// needing its own monomorphized closure type.
pub type BoxFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + 'a>>;

/// One opcode's handler: given the session, the remaining request body
/// (owned, so the returned future borrows nothing but `self`), and the
/// request id, produce the full response packet bytes (status/handle/
/// data/name/attrs, whichever the opcode implies).
pub type CommandFn = for<'a> fn(&'a mut SftpSession, bytes::Bytes, u32) -> BoxFuture<'a>;

/// One extension's handler, dispatched from `EXTENDED` by name.
pub type ExtensionFn = CommandFn;

/// Attribute codec hooks: how this version reads/writes a [`FileAttrs`] and
/// a list of named entries on the wire. Sending can fail (v3's timestamps
/// don't fit the wire's `uint32` seconds field past 2038) and that failure
/// is session-fatal, exactly like a rejected `version-select`: it means the
/// server is about to lie about a file's timestamp, not that the client
/// sent something wrong.
pub type SendAttrsFn = fn(&mut Writer, &FileAttrs) -> Result<()>;
pub type ParseAttrsFn = fn(&mut bytes::Bytes) -> Result<FileAttrs>;
pub type SendNamesFn = fn(&mut Writer, &[FileAttrs]) -> Result<()>;

/// One protocol version's complete behavior.
pub struct Protocol {
    pub version: u32,
    pub commands: HashMap<u8, CommandFn>,
    pub extensions: HashMap<&'static str, ExtensionFn>,
    pub attr_bits: AttrFlags,
    pub max_status: u32,
    pub sendattrs: SendAttrsFn,
    pub parseattrs: ParseAttrsFn,
    pub sendnames: SendNamesFn,
}

impl Protocol {
    pub fn lookup(&self, op: u8) -> Option<CommandFn> {
        self.commands.get(&op).copied()
    }

    pub fn lookup_extension(&self, name: &str) -> Option<ExtensionFn> {
        self.extensions.get(name).copied()
    }
}

/// Highest protocol version this server negotiates.
pub const SERVER_MAX_VERSION: u32 = 6;

/// Select the table to install for a negotiated version, per `min(client,
/// server_max)`. Versions below 3 are rejected (this server implements no
/// earlier revision); versions above 6 collapse to 6.
pub fn table_for_version(version: u32) -> &'static Protocol {
    match version {
        0..=3 => &*v3::TABLE,
        4 => &*v4::TABLE4,
        5 => &*v4::TABLE5,
        _ => &*v6::TABLE,
    }
}

/// Write a `STATUS` response.
pub fn send_status(id: u32, code: u32, message: &str) -> Vec<u8> {
    let mut w = Writer::begin();
    w.put_u8(opcode::STATUS)
        .put_u32(id)
        .put_u32(code)
        .put_string(message)
        .put_string("en");
    w.end()
}

/// Write a `STATUS` response built from an [`Error`], capping the mapped
/// code at the active protocol's `max_status`.
pub fn send_status_error(id: u32, error: &Error, max_status: u32) -> Vec<u8> {
    send_status(id, error.to_status_code(max_status), &error.sanitized_message())
}

/// Write a `HANDLE` response.
pub fn send_handle(id: u32, handle: &[u8]) -> Vec<u8> {
    let mut w = Writer::begin();
    w.put_u8(opcode::HANDLE).put_u32(id).put_bytes(handle);
    w.end()
}

/// Write a `DATA` response.
pub fn send_data(id: u32, data: &[u8]) -> Vec<u8> {
    let mut w = Writer::begin();
    w.put_u8(opcode::DATA).put_u32(id).put_bytes(data);
    w.end()
}

/// Write an `ATTRS` response using the active protocol's attribute codec.
///
/// # Errors
///
/// Propagates the codec's error if an attribute can't be represented on the
/// wire (e.g. v3's out-of-range timestamps) — this is session-fatal, not a
/// client-facing `STATUS`, since the server itself produced an unsendable
/// value.
pub fn send_attrs(id: u32, attrs: &FileAttrs, sendattrs: SendAttrsFn) -> Result<Vec<u8>> {
    let mut w = Writer::begin();
    w.put_u8(opcode::ATTRS).put_u32(id);
    sendattrs(&mut w, attrs)?;
    Ok(w.end())
}

/// Write a `NAME` response for a single entry (REALPATH, READLINK).
///
/// # Errors
///
/// See [`send_attrs`].
pub fn send_name_one(id: u32, attrs: &FileAttrs, sendnames: SendNamesFn) -> Result<Vec<u8>> {
    let mut w = Writer::begin();
    w.put_u8(opcode::NAME).put_u32(id);
    sendnames(&mut w, std::slice::from_ref(attrs))?;
    Ok(w.end())
}

/// Write a `NAME` response for a batch of directory entries.
///
/// # Errors
///
/// See [`send_attrs`].
pub fn send_names(id: u32, entries: &[FileAttrs], sendnames: SendNamesFn) -> Result<Vec<u8>> {
    let mut w = Writer::begin();
    w.put_u8(opcode::NAME).put_u32(id);
    sendnames(&mut w, entries)?;
    Ok(w.end())
}

/// Extended-reply envelope used by `space-available`/`statfs@openssh.org`.
pub fn send_extended_reply(id: u32, body: impl FnOnce(&mut Writer)) -> Vec<u8> {
    let mut w = Writer::begin();
    w.put_u8(opcode::EXTENDED_REPLY).put_u32(id);
    body(&mut w);
    w.end()
}

/// Consistency check shared by every table builder: every command in the
/// map must be for a recognized opcode constant. This is a debug assertion
/// rather than a runtime check since the tables are static data built once.
pub fn assert_known_opcodes(commands: &HashMap<u8, CommandFn>) {
    for &op in commands.keys() {
        debug_assert!(
            (1..=21).contains(&op) || op == opcode::EXTENDED,
            "unexpected opcode {op} in protocol table"
        );
    }
}
