//! Memory pinning: ask the kernel to keep every current and future page of
//! this process resident, so key material is never written to swap.

/// Calls `mlockall(MCL_CURRENT | MCL_FUTURE)`. Failure is logged at `warn`
/// and does not abort startup -- a daemon that can't lock memory still
/// works, just with a weaker guarantee.
pub fn lock_all_memory() {
    let ret = unsafe { libc::mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        tracing::warn!(error = %err, "mlockall failed, key material may be swappable");
    }
}
