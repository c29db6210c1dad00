//! Protocol version 6 (and anything a client asks for above it, which
//! collapses to 6 per [`super::table_for_version`]): adds the `LINK`
//! opcode, fragment-composing `REALPATH` with stat-control semantics, and
//! the named extensions this server advertises in its `VERSION` reply.

use std::collections::HashMap;
use std::sync::LazyLock;

use bytes::Bytes;

use crate::attrs::{AttrFlags, FileAttrs, FileType, Timestamp};
use crate::error::Result;
use crate::session;
use crate::wire::{self, Writer};

use super::{assert_known_opcodes, opcode, CommandFn, ExtensionFn, Protocol, StatusCode};

const SENDABLE: AttrFlags = AttrFlags::SIZE
    .union(AttrFlags::ALLOCATION_SIZE)
    .union(AttrFlags::OWNERGROUP)
    .union(AttrFlags::PERMISSIONS)
    .union(AttrFlags::ACCESSTIME)
    .union(AttrFlags::CREATETIME)
    .union(AttrFlags::MODIFYTIME)
    .union(AttrFlags::CTIME)
    .union(AttrFlags::SUBSECOND_TIMES)
    .union(AttrFlags::LINK_COUNT);

fn send_attrs(w: &mut Writer, attrs: &FileAttrs) -> Result<()> {
    let valid = attrs.valid & SENDABLE;
    w.put_u32(valid.bits());
    w.put_u8(attrs.file_type as u32 as u8);

    if valid.contains(AttrFlags::SIZE) {
        w.put_u64(attrs.size);
    }
    if valid.contains(AttrFlags::ALLOCATION_SIZE) {
        w.put_u64(attrs.allocation_size);
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
    if valid.contains(AttrFlags::LINK_COUNT) {
        w.put_u32(attrs.link_count);
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
    if valid.contains(AttrFlags::ALLOCATION_SIZE) {
        attrs.allocation_size = wire::get_u64(buf)?;
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
    if valid.contains(AttrFlags::LINK_COUNT) {
        attrs.link_count = wire::get_u32(buf)?;
    }

    Ok(attrs)
}

fn send_names(w: &mut Writer, entries: &[FileAttrs]) -> Result<()> {
    w.put_u32(entries.len() as u32);
    for entry in entries {
        w.put_string(&entry.name);
        send_attrs(w, entry)?;
    }
    Ok(())
}

pub static TABLE: LazyLock<Protocol> = LazyLock::new(|| {
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
    commands.insert(opcode::REALPATH, session::realpath_v6);
    commands.insert(opcode::RENAME, session::rename_v56);
    commands.insert(opcode::READLINK, session::readlink);
    commands.insert(opcode::SYMLINK, session::symlink);
    commands.insert(opcode::LINK, session::link_v6);
    assert_known_opcodes(&commands);

    let mut extensions: HashMap<&'static str, ExtensionFn> = HashMap::new();
    extensions.insert("posix-rename@openssh.org", session::posix_rename);
    extensions.insert("space-available", session::space_available);
    extensions.insert("statfs@openssh.org", session::statfs);
    extensions.insert("text-seek", session::text_seek);
    extensions.insert("version-select", session::version_select);

    Protocol {
        version: 6,
        commands,
        extensions,
        attr_bits: SENDABLE,
        max_status: StatusCode::LockConflict as u32,
        sendattrs: send_attrs,
        parseattrs: parse_attrs,
        sendnames: send_names,
    }
});
