//! Switching to an unprivileged user

use log::{debug, info};
use nix::unistd::{self, Uid, User};

use crate::common::{ProxyError, Result};

/// Look up a user by name or numeric uid
pub fn resolve_user(user: &str) -> Result<User> {
    let found = match user.parse::<u32>() {
        Ok(uid) => User::from_uid(Uid::from_raw(uid)),
        Err(_) => User::from_name(user),
    };

    match found {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(ProxyError::Privilege(format!("unknown user '{}'", user))),
        Err(e) => Err(ProxyError::Privilege(format!("failed to look up user '{}': {}", user, e))),
    }
}

/// Become `user` if the process runs as root
///
/// Supplementary groups are replaced by the user's primary group, then the
/// gid and finally the uid are set. Returns whether a switch happened.
///
/// # Errors
///
/// Returns [`ProxyError::Privilege`] if the user is unknown or any step
/// fails; the process must not serve connections in that case.
pub fn drop_privileges(user: &str) -> Result<bool> {
    if !unistd::geteuid().is_root() {
        debug!("Not running as root, keeping uid {}", unistd::geteuid());
        return Ok(false);
    }

    let user = resolve_user(user)?;

    unistd::setgroups(&[user.gid])
        .map_err(|e| ProxyError::Privilege(format!("setgroups({}): {}", user.gid, e)))?;
    unistd::setgid(user.gid)
        .map_err(|e| ProxyError::Privilege(format!("setgid({}): {}", user.gid, e)))?;
    unistd::setuid(user.uid)
        .map_err(|e| ProxyError::Privilege(format!("setuid({}): {}", user.uid, e)))?;

    info!("Running as {} (uid {}, gid {})", user.name, user.uid, user.gid);
    Ok(true)
}
