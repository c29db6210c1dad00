//! Versioned file-attribute model: the `sftpattr` record, its validity
//! bitmask, host-stat translation, `ls -l`-style long-listing formatting,
//! and the atomic-attempt pipeline that applies a record back onto the
//! file system.

use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;

use bitflags::bitflags;
use chrono::{Datelike, TimeZone, Utc};
use tracing::warn;

use crate::error::{Error, Result};

bitflags! {
    /// Which fields of a [`FileAttrs`] record are meaningful. Mirrors the
    /// `SSH_FILEXFER_ATTR_*` bits across versions 3-6; a given protocol
    /// table only ever sets/reads the subset its version defines
    /// (`Protocol::attr_bits`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
    pub struct AttrFlags: u32 {
        const SIZE              = 0x0000_0001;
        const UIDGID            = 0x0000_0002;
        const PERMISSIONS       = 0x0000_0004;
        const ACCESSTIME        = 0x0000_0008;
        const CREATETIME        = 0x0000_0010;
        const MODIFYTIME        = 0x0000_0020;
        const ACMODTIME         = 0x0000_0008 | 0x0000_0020;
        const OWNERGROUP        = 0x0000_0080;
        const SUBSECOND_TIMES   = 0x0000_0100;
        const BITS              = 0x0000_0200;
        const ALLOCATION_SIZE   = 0x0000_0400;
        const CTIME             = 0x0000_0800;
        const LINK_COUNT        = 0x0000_1000;
        const EXTENDED          = 0x8000_0000;
    }
}

/// File type discriminant, `SSH_FILEXFER_TYPE_*`. Values are stable across
/// protocol versions and index directly into the long-listing type-char
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FileType {
    Regular = 1,
    Directory = 2,
    Symlink = 3,
    Special = 4,
    Unknown = 5,
    Socket = 6,
    CharDevice = 7,
    BlockDevice = 8,
    Fifo = 9,
}

impl FileType {
    /// Decode a v4+ wire `type` byte, `SSH_FILEXFER_TYPE_*`. Unrecognized
    /// values (including gaps the spec reserves) map to `Unknown` rather
    /// than erroring, matching how unrecognized `st_mode` bits are handled
    /// in [`FileAttrs::from_metadata`].
    pub fn from_wire(b: u8) -> Self {
        match b {
            1 => FileType::Regular,
            2 => FileType::Directory,
            3 => FileType::Symlink,
            4 => FileType::Special,
            6 => FileType::Socket,
            7 => FileType::CharDevice,
            8 => FileType::BlockDevice,
            9 => FileType::Fifo,
            _ => FileType::Unknown,
        }
    }

    fn type_char(self) -> char {
        const TABLE: &str = "?-dl??scbp";
        TABLE
            .chars()
            .nth(self as usize)
            .expect("FileType discriminant within typedetails table bounds")
    }
}

/// A seconds+nanoseconds timestamp, matching the wire's split representation
/// and v4+'s optional sub-second extension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanoseconds: u32,
}

impl Timestamp {
    pub fn from_secs(seconds: i64) -> Self {
        Timestamp { seconds, nanoseconds: 0 }
    }
}

/// The unified attribute record. Only fields whose bit is set in `valid`
/// carry meaningful values; callers must check `valid` (or use the
/// `get_*`-style accessors) rather than reading the raw fields directly.
#[derive(Debug, Clone)]
pub struct FileAttrs {
    pub valid: AttrFlags,
    pub file_type: FileType,
    pub size: u64,
    pub allocation_size: u64,
    pub uid: u32,
    pub gid: u32,
    pub owner: Option<String>,
    pub group: Option<String>,
    pub permissions: u32,
    pub atime: Timestamp,
    pub mtime: Timestamp,
    pub ctime: Timestamp,
    pub createtime: Timestamp,
    pub link_count: u32,
    pub name: String,
}

impl Default for FileAttrs {
    fn default() -> Self {
        FileAttrs {
            valid: AttrFlags::empty(),
            file_type: FileType::Unknown,
            size: 0,
            allocation_size: 0,
            uid: 0,
            gid: 0,
            owner: None,
            group: None,
            permissions: 0,
            atime: Timestamp::default(),
            mtime: Timestamp::default(),
            ctime: Timestamp::default(),
            createtime: Timestamp::default(),
            link_count: 0,
            name: String::new(),
        }
    }
}

impl FileAttrs {
    pub fn get_size(&self) -> Option<u64> {
        self.valid.contains(AttrFlags::SIZE).then_some(self.size)
    }

    pub fn get_permissions(&self) -> Option<u32> {
        self.valid
            .contains(AttrFlags::PERMISSIONS)
            .then_some(self.permissions)
    }

    pub fn get_uidgid(&self) -> Option<(u32, u32)> {
        self.valid
            .contains(AttrFlags::UIDGID)
            .then_some((self.uid, self.gid))
    }

    /// Translate a host `std::fs::Metadata` into the wire record. Owner and
    /// group name lookups are only performed (and `OWNERGROUP` only set)
    /// when `want_ownergroup` is true, since the lookup is a syscall per
    /// file and most callers (bare `LSTAT`/`STAT` on v3) never read it.
    pub fn from_metadata(meta: &std::fs::Metadata, want_ownergroup: bool) -> Self {
        let mode = meta.mode();
        let file_type = match mode & libc::S_IFMT {
            libc::S_IFIFO => FileType::Fifo,
            libc::S_IFCHR => FileType::CharDevice,
            libc::S_IFDIR => FileType::Directory,
            libc::S_IFBLK => FileType::BlockDevice,
            libc::S_IFREG => FileType::Regular,
            libc::S_IFLNK => FileType::Symlink,
            libc::S_IFSOCK => FileType::Socket,
            _ => FileType::Special,
        };

        let mut valid = AttrFlags::SIZE
            | AttrFlags::PERMISSIONS
            | AttrFlags::ACCESSTIME
            | AttrFlags::MODIFYTIME
            | AttrFlags::CTIME
            | AttrFlags::UIDGID
            | AttrFlags::ALLOCATION_SIZE
            | AttrFlags::LINK_COUNT
            | AttrFlags::SUBSECOND_TIMES;

        let (owner, group) = if want_ownergroup {
            valid |= AttrFlags::OWNERGROUP;
            (
                users::get_user_by_uid(meta.uid()).map(|u| u.name().to_string_lossy().into_owned()),
                users::get_group_by_gid(meta.gid())
                    .map(|g| g.name().to_string_lossy().into_owned()),
            )
        } else {
            (None, None)
        };

        FileAttrs {
            valid,
            file_type,
            size: meta.len(),
            allocation_size: meta.blksize(),
            uid: meta.uid(),
            gid: meta.gid(),
            owner,
            group,
            permissions: mode,
            atime: Timestamp { seconds: meta.atime(), nanoseconds: meta.atime_nsec() as u32 },
            mtime: Timestamp { seconds: meta.mtime(), nanoseconds: meta.mtime_nsec() as u32 },
            ctime: Timestamp { seconds: meta.ctime(), nanoseconds: meta.ctime_nsec() as u32 },
            createtime: Timestamp::default(),
            link_count: meta.nlink() as u32,
            name: String::new(),
        }
    }

    /// Render a v3-style `ls -l` long-listing line.
    ///
    /// `this_year` selects whether the date column shows a time-of-day
    /// (current year) or a year (everything else); `numeric_preference`
    /// mirrors `FORMAT_PREFER_NUMERIC_UID`, swapping which of the numeric
    /// or textual owner/group is tried first.
    pub fn longname(&self, this_year: i32, numeric_preference: bool) -> String {
        let mut perms = String::new();
        perms.push(self.file_type.type_char());
        if self.valid.contains(AttrFlags::PERMISSIONS) {
            let m = self.permissions;
            perms.push(if m & 0o400 != 0 { 'r' } else { '-' });
            perms.push(if m & 0o200 != 0 { 'w' } else { '-' });
            perms.push(match m & 0o4100 {
                0o4100 => 's',
                0o4000 => 'S',
                0o100 => 'x',
                _ => '-',
            });
            perms.push(if m & 0o040 != 0 { 'r' } else { '-' });
            perms.push(if m & 0o020 != 0 { 'w' } else { '-' });
            perms.push(match m & 0o2010 {
                0o2010 => 's',
                0o2000 => 'S',
                0o010 => 'x',
                _ => '-',
            });
            perms.push(if m & 0o004 != 0 { 'r' } else { '-' });
            perms.push(if m & 0o002 != 0 { 'w' } else { '-' });
            perms.push(match m & 0o1001 {
                0o1001 => 't',
                0o1000 => 'T',
                0o001 => 'x',
                _ => '-',
            });
        } else {
            perms.push_str("?????????");
        }

        let linkcount = if self.valid.contains(AttrFlags::LINK_COUNT) {
            self.link_count.to_string()
        } else {
            "?".to_string()
        };

        let size = if self.valid.contains(AttrFlags::SIZE) {
            self.size.to_string()
        } else {
            "?".to_string()
        };

        let numeric_owner = self.valid.contains(AttrFlags::UIDGID).then(|| self.uid.to_string());
        let numeric_group = self.valid.contains(AttrFlags::UIDGID).then(|| self.gid.to_string());
        let textual_owner = self.valid.contains(AttrFlags::OWNERGROUP).then(|| self.owner.clone()).flatten();
        let textual_group = self.valid.contains(AttrFlags::OWNERGROUP).then(|| self.group.clone()).flatten();

        let (owner, group) = if numeric_preference {
            (
                numeric_owner.or(textual_owner).unwrap_or_else(|| "?".to_string()),
                numeric_group.or(textual_group).unwrap_or_else(|| "?".to_string()),
            )
        } else {
            (
                textual_owner.or(numeric_owner).unwrap_or_else(|| "?".to_string()),
                textual_group.or(numeric_group).unwrap_or_else(|| "?".to_string()),
            )
        };

        let date = if self.valid.contains(AttrFlags::MODIFYTIME) {
            match Utc.timestamp_opt(self.mtime.seconds, 0).single() {
                Some(dt) if dt.year() == this_year => dt.format("%b %d %H:%M").to_string(),
                Some(dt) => dt.format("%b %d  %Y").to_string(),
                None => "?".to_string(),
            }
        } else {
            "?".to_string()
        };

        format!(
            "{:>10.10} {:>3.3} {:<8.8} {:<8.8} {:>8.8} {:>12.12} {}",
            perms, linkcount, owner, group, size, date, self.name
        )
    }
}

/// Abstracts the five syscalls an attribute-apply pass needs, so the same
/// algorithm in [`apply`] drives both `SETSTAT` (path-based) and
/// `FSETSTAT` (fd-based).
pub trait AttrTarget {
    fn truncate(&self, size: u64) -> std::io::Result<()>;
    fn chown(&self, uid: u32, gid: u32) -> std::io::Result<()>;
    fn chmod(&self, mode: u32) -> std::io::Result<()>;
    fn stat(&self) -> std::io::Result<std::fs::Metadata>;
    fn set_times(&self, atime: std::time::SystemTime, mtime: std::time::SystemTime) -> std::io::Result<()>;
}

/// `SETSTAT` target: operates on a path without following a trailing
/// symlink (chown uses `lchown` semantics; the rest match the C original's
/// `path`-based `SET_STATUS` instantiation).
pub struct PathTarget<'a>(pub &'a Path);

impl AttrTarget for PathTarget<'_> {
    fn truncate(&self, size: u64) -> std::io::Result<()> {
        let file = std::fs::OpenOptions::new().write(true).open(self.0)?;
        file.set_len(size)
    }

    fn chown(&self, uid: u32, gid: u32) -> std::io::Result<()> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;
        let c_path = CString::new(self.0.as_os_str().as_bytes())
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "nul byte in path"))?;
        let rc = unsafe { libc::lchown(c_path.as_ptr(), uid, gid) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }

    fn chmod(&self, mode: u32) -> std::io::Result<()> {
        std::fs::set_permissions(self.0, std::fs::Permissions::from_mode(mode))
    }

    fn stat(&self) -> std::io::Result<std::fs::Metadata> {
        std::fs::symlink_metadata(self.0)
    }

    fn set_times(&self, atime: std::time::SystemTime, mtime: std::time::SystemTime) -> std::io::Result<()> {
        filetime::set_symlink_file_times(
            self.0,
            filetime::FileTime::from_system_time(atime),
            filetime::FileTime::from_system_time(mtime),
        )
    }
}

/// `FSETSTAT` target: operates on an already-open descriptor.
pub struct FdTarget<'a>(pub &'a std::fs::File);

impl AttrTarget for FdTarget<'_> {
    fn truncate(&self, size: u64) -> std::io::Result<()> {
        self.0.set_len(size)
    }

    fn chown(&self, uid: u32, gid: u32) -> std::io::Result<()> {
        use std::os::unix::io::AsRawFd;
        let rc = unsafe { libc::fchown(self.0.as_raw_fd(), uid, gid) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }

    fn chmod(&self, mode: u32) -> std::io::Result<()> {
        let perms = std::fs::Permissions::from_mode(mode);
        self.0.set_permissions(perms)
    }

    fn stat(&self) -> std::io::Result<std::fs::Metadata> {
        self.0.metadata()
    }

    fn set_times(&self, atime: std::time::SystemTime, mtime: std::time::SystemTime) -> std::io::Result<()> {
        filetime::set_file_handle_times(
            self.0,
            Some(filetime::FileTime::from_system_time(atime)),
            Some(filetime::FileTime::from_system_time(mtime)),
        )
    }
}

fn timestamp_to_system_time(ts: Timestamp) -> std::time::SystemTime {
    if ts.seconds >= 0 {
        std::time::SystemTime::UNIX_EPOCH + std::time::Duration::new(ts.seconds as u64, ts.nanoseconds)
    } else {
        std::time::SystemTime::UNIX_EPOCH - std::time::Duration::new((-ts.seconds) as u64, 0)
    }
}

/// Apply `attrs` to `target`, in the fixed order the protocol requires:
/// truncate, chown, chmod, utimes. Each step runs only if its bit is valid
/// and stops the whole chain on the first failure — except chown, whose
/// failure is logged and swallowed, matching this server's default
/// unprivileged deployment (a hard-fail here would break every `SETSTAT`
/// against a server not running as root).
pub fn apply<T: AttrTarget>(target: &T, attrs: &FileAttrs) -> Result<()> {
    if let Some(size) = attrs.get_size() {
        target.truncate(size).map_err(Error::Io)?;
    }

    if let Some((uid, gid)) = attrs.get_uidgid() {
        if let Err(e) = target.chown(uid, gid) {
            warn!("chown to {}:{} failed (non-fatal, unprivileged server): {}", uid, gid, e);
        }
    }

    if let Some(mode) = attrs.get_permissions() {
        target.chmod(mode & 0o777).map_err(Error::Io)?;
    }

    if attrs.valid.intersects(AttrFlags::ACCESSTIME | AttrFlags::MODIFYTIME) {
        let current = target.stat().map_err(Error::Io)?;
        let atime = if attrs.valid.contains(AttrFlags::ACCESSTIME) {
            timestamp_to_system_time(attrs.atime)
        } else {
            current.accessed().map_err(Error::Io)?
        };
        let mtime = if attrs.valid.contains(AttrFlags::MODIFYTIME) {
            timestamp_to_system_time(attrs.mtime)
        } else {
            current.modified().map_err(Error::Io)?
        };
        target.set_times(atime, mtime).map_err(Error::Io)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longname_substitutes_unknown_fields() {
        let mut attrs = FileAttrs::default();
        attrs.name = "afile".to_string();
        let line = attrs.longname(2026, false);
        assert!(line.contains("?????????"));
        assert!(line.ends_with("afile"));
    }

    #[test]
    fn longname_current_year_uses_time_of_day() {
        let mut attrs = FileAttrs::default();
        attrs.valid = AttrFlags::MODIFYTIME | AttrFlags::PERMISSIONS | AttrFlags::SIZE | AttrFlags::LINK_COUNT;
        attrs.permissions = 0o100644;
        attrs.file_type = FileType::Regular;
        attrs.mtime = Timestamp::from_secs(1_700_000_000);
        attrs.link_count = 1;
        attrs.name = "f".to_string();
        let line = attrs.longname(2023, false);
        assert!(line.starts_with("-rw-r--r--"));
    }

    #[test]
    fn acmodtime_bit_covers_both_access_and_modify() {
        assert!(AttrFlags::ACMODTIME.contains(AttrFlags::ACCESSTIME));
        assert!(AttrFlags::ACMODTIME.contains(AttrFlags::MODIFYTIME));
    }
}
