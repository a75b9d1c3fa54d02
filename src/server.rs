//! Accepts connections on a UNIX socket, owns the state shared by every
//! connection worker, and wires up reload/termination signals.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::{UnixListener, UnixStream};
use tokio::signal::unix::{signal, SignalKind};

use crate::config::Cli;
use crate::error::{AgentError, Result};
use crate::handler::ConnectionHandler;
use crate::lock::LockCell;
use crate::peer::PeerIdentity;
use crate::policy::PolicyCache;
use crate::store::KeyStore;

/// State shared by every connection worker: the key store, the lock cell,
/// and the policy cache. Each field manages its own internal
/// synchronization (see §5); there is no outer lock over the whole
/// struct.
pub struct SharedState {
    pub store: Mutex<KeyStore>,
    pub lock: LockCell,
    pub policy: PolicyCache,
}

impl SharedState {
    pub fn new() -> Arc<Self> {
        Arc::new(SharedState {
            store: Mutex::new(KeyStore::new()),
            lock: LockCell::new(),
            policy: PolicyCache::empty(),
        })
    }
}

/// Bind `socket_path`, serve connections until a termination signal
/// arrives, then remove the socket file and return.
pub async fn run(cli: &Cli) -> Result<()> {
    let state = SharedState::new();
    state.policy.reload(&cli.key_dir, &cli.auth_dir);

    let listener = bind_socket(&cli.bind).await?;
    tracing::info!(socket = %cli.bind.display(), "keyholderd listening");

    let mut sighup = signal(SignalKind::hangup())
        .map_err(|e| AgentError::FatalStartup(format!("cannot install SIGHUP handler: {e}")))?;
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| AgentError::FatalStartup(format!("cannot install SIGTERM handler: {e}")))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| AgentError::FatalStartup(format!("cannot install SIGINT handler: {e}")))?;

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => spawn_worker(stream, state.clone()),
                    Err(err) => tracing::warn!(error = %err, "accept failed"),
                }
            }
            _ = sighup.recv() => {
                tracing::info!("SIGHUP received, reloading policy cache");
                let state = state.clone();
                let key_dir = cli.key_dir.clone();
                let auth_dir = cli.auth_dir.clone();
                tokio::task::spawn_blocking(move || state.policy.reload(&key_dir, &auth_dir));
            }
            _ = sigterm.recv() => {
                tracing::info!("SIGTERM received, shutting down");
                break;
            }
            _ = sigint.recv() => {
                tracing::info!("SIGINT received, shutting down");
                break;
            }
        }
    }

    let _ = std::fs::remove_file(&cli.bind);
    Ok(())
}

async fn bind_socket(path: &Path) -> Result<UnixListener> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            AgentError::FatalStartup(format!(
                "cannot create socket directory {}: {e}",
                parent.display()
            ))
        })?;
        // Trusted-local-access only: owner rwx, nothing for group/other.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            let _ = std::fs::set_permissions(parent, perms);
        }
    }
    if path.exists() {
        let _ = std::fs::remove_file(path);
    }
    UnixListener::bind(path)
        .map_err(|e| AgentError::FatalStartup(format!("cannot bind {}: {e}", path.display())))
}

fn spawn_worker(mut stream: UnixStream, state: Arc<SharedState>) {
    tokio::spawn(async move {
        let peer = match PeerIdentity::resolve(&stream) {
            Ok(peer) => peer,
            Err(err) => {
                tracing::warn!(error = %err, "dropping connection: could not resolve peer identity");
                return;
            }
        };
        tracing::debug!(user = %peer.user, "connection accepted");
        let handler = ConnectionHandler::new(peer, state);
        if let Err(err) = handler.serve(&mut stream).await {
            tracing::debug!(error = %err, "connection closed");
        }
    });
}
