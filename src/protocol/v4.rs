//! Protocol versions 4 and 5, which share a wire-compatible attribute
//! record (explicit type byte, `OWNERGROUP` strings instead of v3's raw
//! `uid`/`gid`, per-field timestamps with an optional sub-second
//! extension) and the ACE-style `desired-access`/`flags` `OPEN`. They part
//! ways only on `RENAME`, where v5 adds a flags word; each version gets its
//! own static table so the right one can be picked without a runtime
//! branch on every rename.

use std::collections::HashMap;
use std::sync::LazyLock;

use bytes::Bytes;

use crate::attrs::{AttrFlags, FileAttrs, FileType, Timestamp};
use crate::error::Result;
use crate::session;
use crate::wire::{self, Writer};

use super::{assert_known_opcodes, opcode, CommandFn, ExtensionFn, Protocol, StatusCode};

const SENDABLE: AttrFlags = AttrFlags::SIZE
    .union(AttrFlags::OWNERGROUP)
    .union(AttrFlags::PERMISSIONS)
    .union(AttrFlags::ACCESSTIME)
    .union(AttrFlags::CREATETIME)
    .union(AttrFlags::MODIFYTIME)
    .union(AttrFlags::CTIME)
    .union(AttrFlags::SUBSECOND_TIMES);

fn send_attrs(w: &mut Writer, attrs: &FileAttrs) -> Result<()> {
    let valid = attrs.valid & SENDABLE;
    w.put_u32(valid.bits());
    w.put_u8(attrs.file_type as u32 as u8);

    if valid.contains(AttrFlags::SIZE) {
        w.put_u64(attrs.size);
    }
    if valid.contains(AttrFlags::OWNERGROUP) {
        w.put_string(attrs.owner.as_deref().unwrap_or("unknown"));
        w.put_string(attrs.group.as_deref().unwrap_or("unknown"));
    }
    if valid.contains(AttrFlags::PERMISSIONS) {
        w.put_u32(attrs.permissions & 0o777);
    }

    let subsecond = valid.contains(AttrFlags::SUBSECOND_TIMES);
    let mut put_time = |w: &mut Writer, ts: Timestamp| {
        w.put_u64(ts.seconds as u64);
        if subsecond {
            w.put_u32(ts.nanoseconds);
        }
    };
    if valid.contains(AttrFlags::ACCESSTIME) {
        put_time(w, attrs.atime);
    }
    if valid.contains(AttrFlags::CREATETIME) {
        put_time(w, attrs.createtime);
    }
    if valid.contains(AttrFlags::MODIFYTIME) {
        put_time(w, attrs.mtime);
    }
    if valid.contains(AttrFlags::CTIME) {
        put_time(w, attrs.ctime);
    }
    Ok(())
}

fn parse_attrs(buf: &mut Bytes) -> Result<FileAttrs> {
    let bits = wire::get_u32(buf)?;
    let valid = AttrFlags::from_bits_truncate(bits) & SENDABLE;
    let mut attrs = FileAttrs { valid, ..FileAttrs::default() };
    attrs.file_type = FileType::from_wire(wire::get_u8(buf)?);

    if valid.contains(AttrFlags::SIZE) {
        attrs.size = wire::get_u64(buf)?;
    }
    if valid.contains(AttrFlags::OWNERGROUP) {
        attrs.owner = Some(wire::get_string(buf)?);
        attrs.group = Some(wire::get_string(buf)?);
    }
    if valid.contains(AttrFlags::PERMISSIONS) {
        attrs.permissions = wire::get_u32(buf)?;
    }

    let subsecond = valid.contains(AttrFlags::SUBSECOND_TIMES);
    let mut get_time = |buf: &mut Bytes| -> Result<Timestamp> {
        let seconds = wire::get_u64(buf)? as i64;
        let nanoseconds = if subsecond { wire::get_u32(buf)? } else { 0 };
        Ok(Timestamp { seconds, nanoseconds })
    };
    if valid.contains(AttrFlags::ACCESSTIME) {
        attrs.atime = get_time(buf)?;
    }
    if valid.contains(AttrFlags::CREATETIME) {
        attrs.createtime = get_time(buf)?;
    }
    if valid.contains(AttrFlags::MODIFYTIME) {
        attrs.mtime = get_time(buf)?;
    }
    if valid.contains(AttrFlags::CTIME) {
        attrs.ctime = get_time(buf)?;
    }

    Ok(attrs)
}

/// v4+ `NAME` responses drop v3's `longname` column entirely; clients are
/// expected to format listings themselves from the attribute record.
fn send_names(w: &mut Writer, entries: &[FileAttrs]) -> Result<()> {
    w.put_u32(entries.len() as u32);
    for entry in entries {
        w.put_string(&entry.name);
        send_attrs(w, entry)?;
    }
    Ok(())
}

fn base_commands() -> HashMap<u8, CommandFn> {
    let mut commands: HashMap<u8, CommandFn> = HashMap::new();
    commands.insert(opcode::OPEN, session::open_v56);
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
    commands.insert(opcode::READLINK, session::readlink);
    commands.insert(opcode::SYMLINK, session::symlink);
    commands
}

pub static TABLE4: LazyLock<Protocol> = LazyLock::new(|| {
    let mut commands = base_commands();
    commands.insert(opcode::RENAME, session::rename_v34);
    assert_known_opcodes(&commands);

    Protocol {
        version: 4,
        commands,
        extensions: HashMap::<&'static str, ExtensionFn>::new(),
        attr_bits: SENDABLE,
        max_status: StatusCode::UnknownPrincipal as u32,
        sendattrs: send_attrs,
        parseattrs: parse_attrs,
        sendnames: send_names,
    }
});

pub static TABLE5: LazyLock<Protocol> = LazyLock::new(|| {
    let mut commands = base_commands();
    commands.insert(opcode::RENAME, session::rename_v56);
    assert_known_opcodes(&commands);

    Protocol {
        version: 5,
        commands,
        extensions: HashMap::<&'static str, ExtensionFn>::new(),
        attr_bits: SENDABLE,
        max_status: StatusCode::LockConflict as u32,
        sendattrs: send_attrs,
        parseattrs: parse_attrs,
        sendnames: send_names,
    }
});
