//! Resolution of a connecting peer's identity: kernel-reported credentials
//! off the socket, then uid/gid numbers to a user name and full group set.

use std::collections::HashSet;
use std::ffi::CStr;

use nix::sys::socket::{getsockopt, sockopt::PeerCredentials};
use nix::unistd::{Gid, Uid};
use tokio::net::UnixStream;

use crate::error::{AgentError, Result};

/// The privileged identity; only this user may mutate the key store, the
/// lock cell, or trigger administrative operations.
pub const ROOT_USER: &str = "root";

/// A connecting peer's resolved identity: immutable for the life of the
/// connection.
#[derive(Debug, Clone)]
pub struct PeerIdentity {
    pub user: String,
    pub groups: HashSet<String>,
}

impl PeerIdentity {
    pub fn is_root(&self) -> bool {
        self.user == ROOT_USER
    }

    /// Read `SO_PEERCRED` off `stream` and resolve the reported uid/gid
    /// into a full identity. Fails (and the connection should be closed)
    /// if the uid doesn't resolve to a user name or group lookup fails.
    pub fn resolve(stream: &UnixStream) -> Result<Self> {
        let creds = getsockopt(stream, PeerCredentials)
            .map_err(|e| AgentError::Protocol(format!("SO_PEERCRED failed: {e}")))?;
        let uid = Uid::from_raw(creds.uid());
        let primary_gid = Gid::from_raw(creds.gid());
        resolve_identity(uid, primary_gid)
    }
}

fn resolve_identity(uid: Uid, primary_gid: Gid) -> Result<PeerIdentity> {
    let user = username_for_uid(uid)
        .ok_or_else(|| AgentError::Protocol(format!("uid {uid} has no password-database entry")))?;
    let groups = groups_for_user(&user, primary_gid)?;
    Ok(PeerIdentity { user, groups })
}

fn username_for_uid(uid: Uid) -> Option<String> {
    let mut buf = vec![0i8; 16 * 1024];
    let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
    let mut result: *mut libc::passwd = std::ptr::null_mut();

    let ret = unsafe {
        libc::getpwuid_r(
            uid.as_raw(),
            &mut pwd,
            buf.as_mut_ptr(),
            buf.len(),
            &mut result,
        )
    };
    if ret != 0 || result.is_null() {
        return None;
    }
    let name = unsafe { CStr::from_ptr(pwd.pw_name) };
    name.to_str().ok().map(str::to_string)
}

/// Full group-name set for `user`: primary group plus every supplementary
/// group reported by `getgrouplist`, each numeric gid resolved to a name
/// via `getgrgid_r`.
fn groups_for_user(user: &str, primary_gid: Gid) -> Result<HashSet<String>> {
    let c_user = std::ffi::CString::new(user)
        .map_err(|_| AgentError::Protocol("user name contains a NUL byte".into()))?;

    let mut ngroups: libc::c_int = 32;
    let mut gids: Vec<libc::gid_t> = vec![0; ngroups as usize];

    loop {
        let ret = unsafe {
            libc::getgrouplist(
                c_user.as_ptr(),
                primary_gid.as_raw(),
                gids.as_mut_ptr(),
                &mut ngroups,
            )
        };
        if ret >= 0 {
            gids.truncate(ngroups as usize);
            break;
        }
        // ngroups was updated with the required size; try again.
        gids.resize(ngroups as usize, 0);
    }

    let mut names = HashSet::with_capacity(gids.len());
    for gid in gids {
        if let Some(name) = groupname_for_gid(gid) {
            names.insert(name);
        }
    }
    Ok(names)
}

fn groupname_for_gid(gid: libc::gid_t) -> Option<String> {
    let mut buf = vec![0i8; 16 * 1024];
    let mut grp: libc::group = unsafe { std::mem::zeroed() };
    let mut result: *mut libc::group = std::ptr::null_mut();

    let ret = unsafe { libc::getgrgid_r(gid, &mut grp, buf.as_mut_ptr(), buf.len(), &mut result) };
    if ret != 0 || result.is_null() {
        return None;
    }
    let name = unsafe { CStr::from_ptr(grp.gr_name) };
    name.to_str().ok().map(str::to_string)
}
