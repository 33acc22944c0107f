//! Platform identity and distro-family detection.

use std::fmt;
use tracing::debug;

/// Distro family, deciding which package managers to probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistroType {
    /// Debian, Ubuntu and derivatives.
    Debian,
    /// Fedora, Red Hat, CentOS.
    RedHat,
    /// Arch and derivatives.
    Arch,
    /// openSUSE.
    OpenSuse,
    /// Gentoo.
    Gentoo,
    /// Slackware.
    Slackware,
    /// Void Linux.
    Void,
    /// Alpine.
    Alpine,
    /// Clear Linux.
    Clear,
    /// Solus.
    Solus,
    /// Embedded distributions.
    Embedded,
    /// macOS.
    MacOs,
    /// Windows.
    Windows,
    /// Anything unrecognized.
    Unknown,
}

impl fmt::Display for DistroType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Maps an OS identity string to a [`DistroType`] and its package managers.
#[derive(Debug, Clone)]
pub struct PlatformDetector {
    platform: String,
    distro: DistroType,
}

impl PlatformDetector {
    /// Detect from an OS identity string (e.g. the contents of
    /// `/etc/os-release`'s `PRETTY_NAME`, or an `uname` product name).
    #[must_use]
    pub fn from_identity(identity: &str) -> Self {
        let distro = classify(identity);
        debug!(identity, %distro, "platform detected");
        Self {
            platform: identity.to_string(),
            distro,
        }
    }

    /// Detect the running platform from the environment.
    #[must_use]
    pub fn current() -> Self {
        let identity = match std::env::consts::OS {
            "macos" => "macOS".to_string(),
            "windows" => "Windows".to_string(),
            "linux" => linux_identity(),
            other => other.to_string(),
        };
        Self::from_identity(&identity)
    }

    /// The raw platform identity string.
    #[must_use]
    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// The detected distro family.
    #[must_use]
    pub fn distro_type(&self) -> DistroType {
        self.distro
    }

    /// The conventional default package manager of the platform.
    #[must_use]
    pub fn default_package_manager(&self) -> &'static str {
        match self.distro {
            DistroType::Debian => "apt",
            DistroType::RedHat => "dnf",
            DistroType::Arch => "pacman",
            DistroType::MacOs => "brew",
            DistroType::Windows => "choco",
            DistroType::OpenSuse => "zypper",
            _ => "apt",
        }
    }

    /// The candidate package managers worth probing on this platform.
    #[must_use]
    pub fn supported_managers(&self) -> &'static [&'static str] {
        match self.distro {
            DistroType::MacOs => &["brew", "port"],
            DistroType::Windows => &["choco", "scoop", "winget"],
            _ => &["apt", "dnf", "pacman", "zypper", "yum"],
        }
    }
}

fn classify(identity: &str) -> DistroType {
    const TABLE: &[(&str, DistroType)] = &[
        ("Windows", DistroType::Windows),
        ("Darwin", DistroType::MacOs),
        ("macOS", DistroType::MacOs),
        ("Ubuntu", DistroType::Debian),
        ("Debian", DistroType::Debian),
        ("Fedora", DistroType::RedHat),
        ("Red Hat", DistroType::RedHat),
        ("CentOS", DistroType::RedHat),
        ("Arch", DistroType::Arch),
        ("openSUSE", DistroType::OpenSuse),
        ("Gentoo", DistroType::Gentoo),
        ("Slackware", DistroType::Slackware),
        ("Void", DistroType::Void),
        ("Alpine", DistroType::Alpine),
        ("Clear Linux", DistroType::Clear),
        ("Solus", DistroType::Solus),
        ("Embedded", DistroType::Embedded),
    ];
    for (needle, distro) in TABLE {
        if identity.contains(needle) {
            return *distro;
        }
    }
    DistroType::Unknown
}

fn linux_identity() -> String {
    std::fs::read_to_string("/etc/os-release")
        .ok()
        .and_then(|content| {
            content.lines().find_map(|line| {
                line.strip_prefix("PRETTY_NAME=")
                    .map(|v| v.trim_matches('"').to_string())
            })
        })
        .unwrap_or_else(|| "Linux".to_string())
}
