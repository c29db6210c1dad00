//! SSH transport integration: authentication, rate limiting, connection
//! tracking, and the per-channel glue that feeds raw SFTP subsystem bytes
//! into [`crate::session::SftpSession`].

use crate::{
    cnsa, AuthorizedKeys, Config, ConnectionTracker, ConnectionTrackerConfig, Error,
    RateLimitConfig, RateLimiter, Result,
};
use crate::session::SftpSession;
use async_trait::async_trait;
use russh::server::{Auth, Handler, Msg, Server as SshServer, Session};
use russh::{Channel, ChannelId, CryptoVec};
use russh_keys::key;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// SFTP Server
pub struct Server {
    config: Arc<Config>,
    ssh_config: russh::server::Config,
}

impl Server {
    /// Create a new SFTP server with NSA CNSA 2.0 compliant cryptography
    ///
    /// CNSS Advisory: Commercial National Security Algorithm Suite 2.0
    /// Implementation: Enforces CNSA 2.0 cipher suite for SECRET and below
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let key_pair = load_host_key(&config.host_key_path).await?;

        let mut ssh_config = russh::server::Config {
            inactivity_timeout: Some(std::time::Duration::from_secs(config.timeout)),
            auth_rejection_time: std::time::Duration::from_secs(3),
            auth_rejection_time_initial: Some(std::time::Duration::from_secs(0)),
            keys: vec![key_pair],
            ..Default::default()
        };

        // NSA CNSA 2.0: only approved algorithms are offered
        ssh_config.preferred = russh::Preferred {
            kex: cnsa::CNSA_KEX_ALGORITHMS,
            key: cnsa::CNSA_HOST_KEY_ALGORITHMS,
            cipher: cnsa::CNSA_CIPHERS,
            mac: cnsa::CNSA_MAC_ALGORITHMS,
            ..Default::default()
        };

        info!(
            event = "cnsa_compliance",
            kex_algorithms = ?cnsa::CNSA_KEX_ALGORITHMS,
            ciphers = ?cnsa::CNSA_CIPHERS,
            mac_algorithms = ?cnsa::CNSA_MAC_ALGORITHMS,
            host_key_algorithms = ?cnsa::CNSA_HOST_KEY_ALGORITHMS,
            "NSA CNSA 2.0 cipher suite enforced"
        );

        Ok(Self {
            config: Arc::new(config),
            ssh_config,
        })
    }

    /// Run the SFTP server
    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.bind_address, self.config.port);
        info!("Starting SFTP server on {}", addr);

        let config = Arc::new(self.ssh_config);
        let server_config = self.config.clone();

        russh::server::run(config, &addr, SftpHandler::new(server_config))
            .await
            .map_err(|e| Error::Connection(format!("Server error: {}", e)))?;

        Ok(())
    }
}

/// SSH/SFTP connection factory
///
/// NIST 800-53: AC-7 (Unsuccessful Logon Attempts), AC-10 (Concurrent Session Control)
struct SftpHandler {
    config: Arc<Config>,
    rate_limiter: Arc<RateLimiter>,
    connection_tracker: Arc<ConnectionTracker>,
}

impl SftpHandler {
    fn new(config: Arc<Config>) -> Self {
        let rate_limit_config = RateLimitConfig {
            max_attempts: config.max_auth_attempts,
            window_secs: config.rate_limit_window_secs,
            lockout_duration_secs: config.lockout_duration_secs,
        };

        let connection_tracker_config = ConnectionTrackerConfig {
            max_connections_per_user: config.max_connections_per_user,
        };

        Self {
            config,
            rate_limiter: Arc::new(RateLimiter::new(rate_limit_config)),
            connection_tracker: Arc::new(ConnectionTracker::new(connection_tracker_config)),
        }
    }
}

#[async_trait]
impl SshServer for SftpHandler {
    type Handler = SftpSessionHandler;

    async fn new_client(&mut self, peer_addr: Option<std::net::SocketAddr>) -> Self::Handler {
        let session = SftpSession::new(self.config.clone());

        let mut auth_keys = AuthorizedKeys::new(
            self.config.authorized_keys_path.to_string_lossy().to_string()
        );
        if let Err(e) = auth_keys.load() {
            warn!("Failed to load authorized_keys: {}. Authentication will fail.", e);
        }

        SftpSessionHandler {
            session: Arc::new(Mutex::new(session)),
            authorized_keys: Arc::new(Mutex::new(auth_keys)),
            rate_limiter: self.rate_limiter.clone(),
            connection_tracker: self.connection_tracker.clone(),
            peer_addr: peer_addr.map(|addr| addr.ip()),
            username: Arc::new(Mutex::new(None)),
            connection_id: Arc::new(Mutex::new(None)),
        }
    }
}

/// Per-connection session handler
///
/// NIST 800-53: AC-2 (Account Management), IA-2 (Identification and Authentication), AC-7, AC-10
/// STIG: V-222601 (Session termination)
struct SftpSessionHandler {
    session: Arc<Mutex<SftpSession>>,
    authorized_keys: Arc<Mutex<AuthorizedKeys>>,
    rate_limiter: Arc<RateLimiter>,
    connection_tracker: Arc<ConnectionTracker>,
    peer_addr: Option<IpAddr>,
    username: Arc<Mutex<Option<String>>>,
    connection_id: Arc<Mutex<Option<usize>>>,
}

#[async_trait]
impl Handler for SftpSessionHandler {
    type Error = Error;

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool> {
        info!("Channel opened for session");
        let mut session = self.session.lock().await;
        session.channel = Some(channel);
        Ok(true)
    }

    async fn subsystem_request(
        &mut self,
        channel_id: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<()> {
        info!("Subsystem request: {}", name);

        if name == "sftp" {
            session.channel_success(channel_id).await?;
            Ok(())
        } else {
            warn!("Unsupported subsystem: {}", name);
            session.channel_failure(channel_id).await?;
            Err(Error::Protocol(format!("Unsupported subsystem: {}", name)))
        }
    }

    // NIST 800-53: IA-2, AC-3, AC-7, AC-10
    // STIG: V-222611, V-222578, V-222601
    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &key::PublicKey,
    ) -> Result<Auth> {
        if let Some(ip) = self.peer_addr {
            if !self.rate_limiter.check_allowed(ip).await {
                warn!(
                    "Rate limit exceeded for IP {}, rejecting authentication for user: {}",
                    ip, user
                );
                return Ok(Auth::Reject { proceed_with_methods: None });
            }
        }

        let auth_keys = self.authorized_keys.lock().await;

        if auth_keys.is_authorized(public_key) {
            if !self.connection_tracker.can_connect(user).await {
                warn!(
                    "User '{}' exceeded maximum concurrent connections, rejecting authentication",
                    user
                );
                return Ok(Auth::Reject { proceed_with_methods: None });
            }

            info!("Public key authentication succeeded for user: {}", user);

            if let Some(ip) = self.peer_addr {
                self.rate_limiter.record_success(ip).await;
            }

            if let Some(conn_id) = self
                .connection_tracker
                .register_connection(user.to_string())
                .await
            {
                *self.username.lock().await = Some(user.to_string());
                *self.connection_id.lock().await = Some(conn_id);
                Ok(Auth::Accept)
            } else {
                warn!(
                    "Failed to register connection for user '{}' (connection limit reached)",
                    user
                );
                Ok(Auth::Reject { proceed_with_methods: None })
            }
        } else {
            warn!("Public key authentication failed for user: {}", user);

            if let Some(ip) = self.peer_addr {
                self.rate_limiter.record_failure(ip).await;
            }

            Ok(Auth::Reject {
                proceed_with_methods: Some(russh::MethodSet::PUBLICKEY),
            })
        }
    }

    async fn auth_password(&mut self, _user: &str, _password: &str) -> Result<Auth> {
        warn!("Password authentication rejected");
        Ok(Auth::Reject {
            proceed_with_methods: Some(russh::MethodSet::PUBLICKEY),
        })
    }

    /// Handle SFTP data
    ///
    /// NIST 800-53: SI-11 (Error Handling), SC-8 (Transmission Confidentiality)
    /// STIG: V-222566
    async fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<()> {
        let mut sess = self.session.lock().await;

        let response = match sess.dispatch(data).await {
            Ok(resp) => resp,
            Err(e) => {
                error!("SFTP packet handling error: {}", e);
                if e.is_security_event() {
                    warn!("Security event during SFTP operation: {}", e);
                }
                return Err(e);
            }
        };

        if !response.is_empty() {
            if let Err(e) = session.data(channel, CryptoVec::from_slice(&response)).await {
                error!("Failed to send response, channel may be closed: {}", e);
                return Err(Error::channel_closed(format!(
                    "Failed to send response: {}",
                    e
                )));
            }
        }

        Ok(())
    }

    // NIST 800-53: AC-12 (Session Termination), AC-10 (Concurrent Session Control)
    // STIG: V-222601
    async fn finished(&mut self, _session: &mut Session) -> Result<()> {
        let username = self.username.lock().await;
        let connection_id = self.connection_id.lock().await;

        if let (Some(user), Some(conn_id)) = (username.as_ref(), *connection_id) {
            info!(
                "Session finished for user '{}', unregistering connection {}",
                user, conn_id
            );
            self.connection_tracker
                .unregister_connection(user, conn_id)
                .await;
        }

        Ok(())
    }
}

async fn load_host_key(path: &Path) -> Result<key::KeyPair> {
    if !path.exists() {
        warn!("Host key not found, generating temporary key");
        return Ok(key::KeyPair::generate_ed25519()
            .ok_or_else(|| Error::Config("Failed to generate host key".into()))?);
    }

    let key_data = fs::read_to_string(path).await?;
    russh_keys::decode_secret_key(&key_data, None)
        .map_err(|e| Error::Config(format!("Failed to load host key: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_host_key_generates_when_missing() {
        let path = Path::new("/nonexistent/path/for/wardenfs-test-host-key");
        let key = load_host_key(path).await;
        assert!(key.is_ok());
    }
}
