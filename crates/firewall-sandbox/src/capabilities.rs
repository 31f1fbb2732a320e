//! Host sandbox capability detection.
//!
//! Probed once at startup: whether unprivileged user namespaces are
//! available, and which Landlock ABI (if any) the kernel supports.

/// What the host kernel offers for sandboxing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Unprivileged user namespaces can be created.
    pub user_namespace: bool,
    /// Landlock is available.
    pub landlock: bool,
    /// Landlock ABI version: 0 = unavailable, 1+ = kernel ABI.
    pub landlock_abi: i32,
}

/// Effective isolation level derived from the capability pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    /// User namespaces and Landlock both available.
    Full,
    /// One of the two available.
    Partial,
    /// Neither; only the env allowlist applies.
    Minimal,
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IsolationLevel::Full => write!(f, "full"),
            IsolationLevel::Partial => write!(f, "partial"),
            IsolationLevel::Minimal => write!(f, "minimal"),
        }
    }
}

impl Capabilities {
    pub fn effective_level(&self) -> IsolationLevel {
        match (self.user_namespace, self.landlock) {
            (true, true) => IsolationLevel::Full,
            (false, false) => IsolationLevel::Minimal,
            _ => IsolationLevel::Partial,
        }
    }
}

/// Probe the host for sandbox capabilities.
#[cfg(target_os = "linux")]
pub fn detect_capabilities() -> Capabilities {
    let abi = crate::landlock_fs::detect_abi();
    Capabilities {
        user_namespace: detect_user_namespace(),
        landlock: abi > 0,
        landlock_abi: abi,
    }
}

/// Non-Linux hosts have neither facility.
#[cfg(not(target_os = "linux"))]
pub fn detect_capabilities() -> Capabilities {
    Capabilities::default()
}

#[cfg(target_os = "linux")]
fn detect_user_namespace() -> bool {
    // Debian-style kernels expose a dedicated sysctl.
    if let Ok(data) = std::fs::read_to_string("/proc/sys/kernel/unprivileged_userns_clone") {
        return data.trim() == "1";
    }

    // No sysctl: probe with a short-lived fork so the unshare cannot
    // contaminate this process.
    unsafe {
        let pid = libc::fork();
        if pid < 0 {
            return false;
        }
        if pid == 0 {
            let rc = libc::unshare(libc::CLONE_NEWUSER);
            libc::_exit(if rc == 0 { 0 } else { 1 });
        }
        let mut status: libc::c_int = 0;
        if libc::waitpid(pid, &mut status, 0) != pid {
            return false;
        }
        libc::WIFEXITED(status) && libc::WEXITSTATUS(status) == 0
    }
}

// ============================================================
// Tests
// ============================================================
