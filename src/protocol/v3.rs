//! Protocol version 3 (and the handful of clients that negotiate below it):
//! the `pflags`-style `OPEN`, a flat `ACMODTIME` timestamp pair, and
//! `longname`-bearing `NAME` responses.

use std::collections::HashMap;
use std::sync::LazyLock;

use bytes::Bytes;
use chrono::{Datelike, Utc};

use crate::attrs::{AttrFlags, FileAttrs, Timestamp};
use crate::error::{Error, Result};
use crate::session;
use crate::wire::{self, Writer};

use super::{assert_known_opcodes, opcode, CommandFn, ExtensionFn, Protocol, StatusCode};

/// Narrow a timestamp to v3's wire `uint32` seconds field. Fails rather than
/// clamping or wrapping if the value doesn't fit — a narrowed-but-wrong
/// timestamp would silently misreport a file's age, and the C original
/// treats this the same way (`fatal("...mtime too large for remote
/// protocol")`): loud, not quiet.
fn secs_u32(ts: Timestamp) -> Result<u32> {
    u32::try_from(ts.seconds).map_err(|_| {
        Error::Protocol(format!("timestamp {} does not fit in v3's u32 wire field", ts.seconds))
    })
}

fn send_attrs(w: &mut Writer, attrs: &FileAttrs) -> Result<()> {
    let mut valid = attrs.valid
        & (AttrFlags::SIZE | AttrFlags::UIDGID | AttrFlags::PERMISSIONS | AttrFlags::ACCESSTIME | AttrFlags::MODIFYTIME);
    // v3's ACMODTIME is one bit covering both timestamps; send neither
    // unless both are present.
    if !valid.contains(AttrFlags::ACMODTIME) {
        valid.remove(AttrFlags::ACCESSTIME | AttrFlags::MODIFYTIME);
    }

    w.put_u32(valid.bits());
    if valid.contains(AttrFlags::SIZE) {
        w.put_u64(attrs.size);
    }
    if valid.contains(AttrFlags::UIDGID) {
        w.put_u32(attrs.uid).put_u32(attrs.gid);
    }
    if valid.contains(AttrFlags::PERMISSIONS) {
        w.put_u32(attrs.permissions);
    }
    if valid.contains(AttrFlags::ACMODTIME) {
        w.put_u32(secs_u32(attrs.atime)?).put_u32(secs_u32(attrs.mtime)?);
    }
    Ok(())
}

fn parse_attrs(buf: &mut Bytes) -> Result<FileAttrs> {
    let bits = wire::get_u32(buf)?;
    let mut valid = AttrFlags::from_bits_truncate(bits);
    let mut attrs = FileAttrs::default();

    if valid.contains(AttrFlags::SIZE) {
        attrs.size = wire::get_u64(buf)?;
    }
    if valid.contains(AttrFlags::UIDGID) {
        attrs.uid = wire::get_u32(buf)?;
        attrs.gid = wire::get_u32(buf)?;
    }
    if valid.contains(AttrFlags::PERMISSIONS) {
        attrs.permissions = wire::get_u32(buf)?;
    }
    if valid.intersects(AttrFlags::ACCESSTIME | AttrFlags::MODIFYTIME) {
        // A client that sets either of these bits is required to have
        // written both fields; a lone bit is a protocol quirk this server
        // tolerates by treating the pair as present on receipt.
        attrs.atime = Timestamp::from_secs(wire::get_u32(buf)? as i64);
        attrs.mtime = Timestamp::from_secs(wire::get_u32(buf)? as i64);
        valid |= AttrFlags::ACMODTIME;
    }

    attrs.valid = valid;
    Ok(attrs)
}

fn send_names(w: &mut Writer, entries: &[FileAttrs]) -> Result<()> {
    let this_year = Utc::now().year();
    w.put_u32(entries.len() as u32);
    for entry in entries {
        w.put_string(&entry.name);
        w.put_string(&entry.longname(this_year, false));
        send_attrs(w, entry)?;
    }
    Ok(())
}

pub static TABLE: LazyLock<Protocol> = LazyLock::new(|| {
    let mut commands: HashMap<u8, CommandFn> = HashMap::new();
    commands.insert(opcode::OPEN, session::open_v34);
    commands.insert(opcode::CLOSE, session::close);
    commands.insert(opcode::READ, session::read);
    commands.insert(opcode::WRITE, session::write);
    commands.insert(opcode::LSTAT, session::lstat);
    commands.insert(opcode::STAT, session::stat);
    commands.insert(opcode::FSTAT, session::fstat);
    commands.insert(opcode::SETSTAT, session::setstat);
    commands.insert(opcode::FSETSTAT, session::fsetstat);
    commands.insert(opcode::OPENDIR, session::opendir);
    commands.insert(opcode::READDIR, session::readdir);
    commands.insert(opcode::REMOVE, session::remove);
    commands.insert(opcode::MKDIR, session::mkdir);
    commands.insert(opcode::RMDIR, session::rmdir);
    commands.insert(opcode::REALPATH, session::realpath_v345);
    commands.insert(opcode::RENAME, session::rename_v34);
    commands.insert(opcode::READLINK, session::readlink);
    commands.insert(opcode::SYMLINK, session::symlink);
    assert_known_opcodes(&commands);

    let extensions: HashMap<&'static str, ExtensionFn> = HashMap::new();

    Protocol {
        version: 3,
        commands,
        extensions,
        attr_bits: AttrFlags::SIZE | AttrFlags::UIDGID | AttrFlags::PERMISSIONS | AttrFlags::ACMODTIME,
        max_status: StatusCode::OpUnsupported as u32,
        sendattrs: send_attrs,
        parseattrs: parse_attrs,
        sendnames: send_names,
    }
});
