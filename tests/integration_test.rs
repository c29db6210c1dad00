//! Integration tests for Wardenfs SFTP
//!
//! These tests verify RFC compliance and basic functionality

use wardenfs_sftp::{Config, Server};
use std::path::PathBuf;

#[tokio::test]
async fn test_server_creation() {
    let mut config = Config::default();
    config.root_dir = PathBuf::from("/tmp/sftp_test");

    // Create test directory
    std::fs::create_dir_all(&config.root_dir).unwrap();

    let result = Server::new(config).await;
    assert!(result.is_ok(), "Server should be created successfully");

    // Cleanup
    std::fs::remove_dir_all("/tmp/sftp_test").ok();
}

#[test]
fn test_config_validation() {
    let mut config = Config::default();
    config.root_dir = PathBuf::from("/nonexistent/directory");

    let result = config.validate();
    assert!(result.is_err(), "Config validation should fail for non-existent directory");
}

#[test]
fn test_config_packet_size_validation() {
    let mut config = Config::default();
    config.root_dir = PathBuf::from("/tmp");
    config.max_packet_size = 1024; // Too small per RFC 4254

    let result = config.validate();
    assert!(result.is_err(), "Config validation should fail for packet size < 32768");
}

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.port, 2222);
    assert_eq!(config.bind_address, "0.0.0.0");
    assert!(config.max_packet_size >= 32768, "Default packet size should meet RFC 4254 minimum");
}

mod protocol_tests {
    use wardenfs_sftp::protocol::{opcode, table_for_version, OpenFlags, StatusCode, SERVER_MAX_VERSION};

    #[test]
    fn test_server_max_version() {
        assert_eq!(SERVER_MAX_VERSION, 6);
    }

    #[test]
    fn test_version_negotiation_selects_right_table() {
        assert_eq!(table_for_version(3).version, 3);
        assert_eq!(table_for_version(4).version, 4);
        assert_eq!(table_for_version(5).version, 5);
        assert_eq!(table_for_version(6).version, 6);
        // Above the server's max, the table collapses to the max version.
        assert_eq!(table_for_version(99).version, 6);
    }

    #[test]
    fn test_every_table_handles_the_common_opcodes() {
        for version in [3, 4, 5, 6] {
            let table = table_for_version(version);
            for op in [
                opcode::OPEN,
                opcode::CLOSE,
                opcode::READ,
                opcode::WRITE,
                opcode::LSTAT,
                opcode::STAT,
                opcode::FSTAT,
                opcode::SETSTAT,
                opcode::FSETSTAT,
                opcode::OPENDIR,
                opcode::READDIR,
                opcode::REMOVE,
                opcode::MKDIR,
                opcode::RMDIR,
                opcode::REALPATH,
                opcode::RENAME,
                opcode::READLINK,
                opcode::SYMLINK,
            ] {
                assert!(
                    table.lookup(op).is_some(),
                    "version {version} table missing opcode {op}"
                );
            }
        }
    }

    #[test]
    fn test_link_opcode_only_in_v6() {
        assert!(table_for_version(3).lookup(opcode::LINK).is_none());
        assert!(table_for_version(4).lookup(opcode::LINK).is_none());
        assert!(table_for_version(5).lookup(opcode::LINK).is_none());
        assert!(table_for_version(6).lookup(opcode::LINK).is_some());
    }

    #[test]
    fn test_v6_extensions_advertised_elsewhere_absent() {
        let v6 = table_for_version(6);
        assert!(v6.lookup_extension("posix-rename@openssh.org").is_some());
        assert!(v6.lookup_extension("space-available").is_some());
        assert!(v6.lookup_extension("statfs@openssh.org").is_some());
        assert!(v6.lookup_extension("text-seek").is_some());
        assert!(v6.lookup_extension("version-select").is_some());
        assert!(v6.lookup_extension("nonexistent@example.com").is_none());

        assert!(table_for_version(3).lookup_extension("posix-rename@openssh.org").is_none());
    }

    #[test]
    fn test_max_status_increases_with_version() {
        assert_eq!(table_for_version(3).max_status, StatusCode::OpUnsupported as u32);
        assert_eq!(table_for_version(4).max_status, StatusCode::UnknownPrincipal as u32);
        assert_eq!(table_for_version(5).max_status, StatusCode::LockConflict as u32);
        assert_eq!(table_for_version(6).max_status, StatusCode::LockConflict as u32);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(u32::from(StatusCode::Ok), 0);
        assert_eq!(u32::from(StatusCode::Eof), 1);
        assert_eq!(u32::from(StatusCode::NoSuchFile), 2);
        assert_eq!(u32::from(StatusCode::PermissionDenied), 3);
    }

    #[test]
    fn test_open_flags() {
        let flags = OpenFlags(OpenFlags::READ | OpenFlags::WRITE);
        assert!(flags.has(OpenFlags::READ));
        assert!(flags.has(OpenFlags::WRITE));
        assert!(!flags.has(OpenFlags::APPEND));
    }
}
