//! Comprehensive error handling tests
//!
//! NIST 800-53: SI-11 (Error Handling)
//! STIG: V-222566
//! Implementation: Tests for error categorization, sanitization, and status mapping

use wardenfs_sftp::protocol::StatusCode;
use wardenfs_sftp::Error;

const MAX_STATUS_V6: u32 = StatusCode::LockConflict as u32;

/// NIST 800-53: AU-2, SI-11 - Test error is_security_event classification
#[test]
fn test_error_is_security_event() {
    assert!(Error::InvalidPath("test".into()).is_security_event());
    assert!(Error::PermissionDenied("test".into()).is_security_event());
    assert!(Error::AuthenticationFailed("test".into()).is_security_event());
    assert!(Error::InvalidHandle("test".into()).is_security_event());

    assert!(!Error::FileNotFound("test".into()).is_security_event());
    assert!(!Error::Timeout("test".into()).is_security_event());
    assert!(!Error::Connection("test".into()).is_security_event());
    assert!(!Error::Config("test".into()).is_security_event());
}

/// NIST 800-53: SI-11 - Test SFTP status code mapping
#[test]
fn test_error_to_status_code() {
    assert_eq!(
        Error::FileNotFound("test".into()).to_status_code(MAX_STATUS_V6),
        StatusCode::NoSuchFile as u32
    );
    assert_eq!(
        Error::PermissionDenied("test".into()).to_status_code(MAX_STATUS_V6),
        StatusCode::PermissionDenied as u32
    );
    assert_eq!(
        Error::InvalidPath("test".into()).to_status_code(MAX_STATUS_V6),
        StatusCode::BadMessage as u32
    );
    assert_eq!(
        Error::InvalidHandle("test".into()).to_status_code(MAX_STATUS_V6),
        StatusCode::InvalidHandle as u32
    );
    assert_eq!(
        Error::AlreadyExists("test".into()).to_status_code(MAX_STATUS_V6),
        StatusCode::FileAlreadyExists as u32
    );
    assert_eq!(
        Error::NotSupported("test".into()).to_status_code(MAX_STATUS_V6),
        StatusCode::OpUnsupported as u32
    );
    assert_eq!(
        Error::ChannelClosed("test".into()).to_status_code(MAX_STATUS_V6),
        StatusCode::ConnectionLost as u32
    );
    assert_eq!(
        Error::Connection("test".into()).to_status_code(MAX_STATUS_V6),
        StatusCode::ConnectionLost as u32
    );
    assert_eq!(
        Error::Timeout("test".into()).to_status_code(MAX_STATUS_V6),
        StatusCode::Failure as u32
    );
}

/// NIST 800-53: SI-11 - A v3 session must never see a status code past its
/// own `max_status` ceiling, even for an error that would naturally map to
/// one (e.g. INVALID_HANDLE, which v3 lacks).
#[test]
fn test_error_to_status_code_capped_at_v3_ceiling() {
    let v3_max = StatusCode::OpUnsupported as u32;

    assert_eq!(
        Error::InvalidHandle("stale".into()).to_status_code(v3_max),
        v3_max,
        "INVALID_HANDLE (9) exceeds v3's ceiling (8) and must cap"
    );
    assert_eq!(
        Error::AlreadyExists("dup".into()).to_status_code(v3_max),
        v3_max,
        "FILE_ALREADY_EXISTS (11) exceeds v3's ceiling (8) and must cap"
    );
}

/// NIST 800-53: SI-11 - I/O errors map by `ErrorKind`, independent of the
/// client-supplied message.
#[test]
fn test_io_error_kind_mapping() {
    let not_found = Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "x"));
    assert_eq!(not_found.to_status_code(MAX_STATUS_V6), StatusCode::NoSuchFile as u32);

    let denied = Error::Io(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "x"));
    assert_eq!(denied.to_status_code(MAX_STATUS_V6), StatusCode::PermissionDenied as u32);

    let exists = Error::Io(std::io::Error::new(std::io::ErrorKind::AlreadyExists, "x"));
    assert_eq!(exists.to_status_code(MAX_STATUS_V6), StatusCode::FileAlreadyExists as u32);

    let other = Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "x"));
    assert_eq!(other.to_status_code(MAX_STATUS_V6), StatusCode::Failure as u32);
}

/// NIST 800-53: SI-11 - Test sanitized error messages don't leak I/O internals
/// STIG: V-222566 - Error messages must not reveal sensitive information
#[test]
fn test_error_sanitized_messages() {
    let io_err = Error::Io(std::io::Error::new(
        std::io::ErrorKind::PermissionDenied,
        "open(\"/etc/shadow\"): Permission denied (os error 13)",
    ));
    assert_eq!(io_err.sanitized_message(), "I/O error");
    assert!(!io_err.sanitized_message().contains("/etc/shadow"));

    // Non-I/O variants pass their own Display through unchanged - their
    // messages are already client-path-relative, not host-path-revealing.
    let invalid_path = Error::InvalidPath("../escape".into());
    assert!(invalid_path.sanitized_message().contains("../escape"));
}

/// NIST 800-53: SI-11 - Test error constructor helpers
#[test]
fn test_error_constructors() {
    assert!(matches!(Error::timeout("slow"), Error::Timeout(_)));
    assert!(matches!(Error::channel_closed("gone"), Error::ChannelClosed(_)));
    assert!(matches!(Error::invalid_handle("stale"), Error::InvalidHandle(_)));
    assert!(matches!(
        Error::resource_exhaustion("too many handles"),
        Error::ResourceExhaustion(_)
    ));
}

/// NIST 800-53: SI-11 - Test error display messages
#[test]
fn test_error_display() {
    let err = Error::FileNotFound("test.txt".into());
    assert!(format!("{}", err).contains("test.txt"));

    let err = Error::InvalidHandle("123".into());
    assert!(format!("{}", err).contains("Invalid handle"));
}

/// NIST 800-53: SI-11 - Test IO error conversion via `?`/`From`
#[test]
fn test_io_error_conversion() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let sftp_err: Error = io_err.into();
    assert!(matches!(sftp_err, Error::Io(_)));
}

/// NIST 800-53: SI-11 - `map_io_error` attaches the client-supplied path, not
/// the resolved host path, to path-shaped I/O failures.
#[test]
fn test_map_io_error_uses_client_path() {
    use wardenfs_sftp::error::map_io_error;

    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "host-side detail");
    let mapped = map_io_error(io_err, "relative/client/path.txt");

    match mapped {
        Error::FileNotFound(path) => assert_eq!(path, "relative/client/path.txt"),
        other => panic!("expected FileNotFound, got {other:?}"),
    }
}
