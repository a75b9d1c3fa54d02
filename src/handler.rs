//! The per-connection state machine: read peer credentials once, then loop
//! reading requests and dispatching to the operation they name.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{AgentError, Result};
use crate::keys::{Fingerprint, LoadedKey};
use crate::peer::PeerIdentity;
use crate::server::SharedState;
use crate::wire::{self, Identity, Request, Response};

/// Owns one accepted connection's lifetime: a resolved peer identity plus
/// a handle to the state shared across the whole server.
pub struct ConnectionHandler {
    peer: PeerIdentity,
    state: std::sync::Arc<SharedState>,
}

impl ConnectionHandler {
    pub fn new(peer: PeerIdentity, state: std::sync::Arc<SharedState>) -> Self {
        ConnectionHandler { peer, state }
    }

    /// Serve requests from `stream` until end-of-stream or a transport
    /// error. Protocol errors are answered with `FAILURE` and do not end
    /// the connection.
    pub async fn serve<S>(&self, stream: &mut S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            let request = match wire::read_request(stream).await {
                Ok(Some(request)) => request,
                Ok(None) => return Ok(()),
                Err(AgentError::Transport(e)) => return Err(AgentError::Transport(e)),
                Err(_) => {
                    wire::write_response(stream, &Response::Failure).await?;
                    continue;
                }
            };

            let response = match self.dispatch(request) {
                Ok(response) => response,
                Err(_) => Response::Failure,
            };
            wire::write_response(stream, &response).await?;
        }
    }

    fn dispatch(&self, request: Request) -> Result<Response> {
        match request {
            Request::RequestIdentities => Ok(self.request_identities()),
            Request::AddIdentity { fields, comment } => self.add_identity(fields, comment),
            Request::RemoveIdentity { key_blob } => self.remove_identity(&key_blob),
            Request::RemoveAllIdentities => self.remove_all_identities(),
            Request::SignRequest {
                key_blob,
                data,
                flags,
            } => self.sign_request(&key_blob, &data, flags),
            Request::Lock { passphrase } => self.lock(passphrase),
            Request::Unlock { passphrase } => self.unlock(&passphrase),
            Request::Unimplemented(_) => Err(AgentError::NotImplemented),
        }
    }

    fn request_identities(&self) -> Response {
        if self.state.lock.is_locked() {
            return Response::Identities(Vec::new());
        }
        let store = self.state.store.lock();
        let identities = store
            .iter()
            .filter(|key| self.may_use(&key.fingerprint()))
            .map(|key| Identity {
                key_blob: key.public_key_blob().to_vec(),
                comment: key.comment().to_string(),
            })
            .collect();
        Response::Identities(identities)
    }

    fn add_identity(&self, fields: wire::AddIdentityFields, comment: String) -> Result<Response> {
        self.require_root()?;
        let key = LoadedKey::from_wire(&fields, comment)?;
        self.state.store.lock().insert(key);
        Ok(Response::Success)
    }

    fn remove_identity(&self, key_blob: &[u8]) -> Result<Response> {
        self.require_root()?;
        let fingerprint = Fingerprint::of_blob(key_blob);
        if self.state.store.lock().remove(&fingerprint) {
            Ok(Response::Success)
        } else {
            Err(AgentError::NotFound)
        }
    }

    fn remove_all_identities(&self) -> Result<Response> {
        self.require_root()?;
        self.state.store.lock().clear();
        Ok(Response::Success)
    }

    fn sign_request(&self, key_blob: &[u8], data: &[u8], flags: u32) -> Result<Response> {
        let fingerprint = Fingerprint::of_blob(key_blob);
        if !self.may_use(&fingerprint) {
            return Err(AgentError::AuthorizationDenied);
        }
        // Reject arbitrary signing payloads before ever touching the key.
        wire::auth_request::parse(data)?;

        let store = self.state.store.lock();
        let key = store.get(&fingerprint).ok_or(AgentError::NotFound)?;
        let signature = key.sign(data, flags)?;
        Ok(Response::SignResponse(signature))
    }

    fn lock(&self, passphrase: Vec<u8>) -> Result<Response> {
        self.require_root()?;
        if self.state.lock.lock(passphrase) {
            Ok(Response::Success)
        } else {
            Err(AgentError::AuthorizationDenied)
        }
    }

    fn unlock(&self, passphrase: &[u8]) -> Result<Response> {
        self.require_root()?;
        if self.state.lock.unlock(passphrase) {
            Ok(Response::Success)
        } else {
            Err(AgentError::AuthorizationDenied)
        }
    }

    fn require_root(&self) -> Result<()> {
        if self.peer.is_root() {
            Ok(())
        } else {
            Err(AgentError::AuthorizationDenied)
        }
    }

    /// `is_allowed` from §4.5: unlocked, and either root or in a group the
    /// policy cache permits for this fingerprint.
    fn may_use(&self, fingerprint: &Fingerprint) -> bool {
        if self.state.lock.is_locked() {
            return false;
        }
        if self.peer.is_root() {
            return true;
        }
        let allowed_groups = self.state.policy.groups_for(fingerprint);
        self.peer.groups.iter().any(|g| allowed_groups.contains(g))
    }
}
