//! Information about the platforms in the release matrix
//!
//! This covers the target triples we ship, what kind of machine has to build
//! each of them, and which GitHub Actions runner provides that machine.

use dist_matrix_schema::HostClass;

macro_rules! define_target_triples {
    ($($(#[$meta:meta])* const $name:ident = $triple:expr;)*) => {
        $(
            $(#[$meta])*
            pub const $name: &str = $triple;
        )*
    };
}

define_target_triples!(
    /// ARM64 Linux (kernel 4.1, glibc 2.17+)
    const TARGET_ARM64_LINUX_GNU = "aarch64-unknown-linux-gnu";
    /// ARM64 Linux with MUSL
    const TARGET_ARM64_LINUX_MUSL = "aarch64-unknown-linux-musl";
    /// ARMv6 Linux, hardfloat (kernel 3.2, glibc 2.17)
    const TARGET_ARMV6_LINUX_GNU_HARDFLOAT = "arm-unknown-linux-gnueabihf";
    /// 32-bit Linux (kernel 3.2+, glibc 2.17+)
    const TARGET_X86_LINUX_GNU = "i686-unknown-linux-gnu";
    /// 32-bit Linux with MUSL
    const TARGET_X86_LINUX_MUSL = "i686-unknown-linux-musl";
    /// 64-bit Linux (kernel 3.2+, glibc 2.17+)
    const TARGET_X64_LINUX_GNU = "x86_64-unknown-linux-gnu";
    /// 64-bit Linux with MUSL
    const TARGET_X64_LINUX_MUSL = "x86_64-unknown-linux-musl";
);

define_target_triples!(
    /// 64-bit Intel macOS (10.12+, Sierra+)
    const TARGET_X64_MAC = "x86_64-apple-darwin";
    /// ARM64 macOS (11.0+, Big Sur+) -- AKA "Apple Silicon"
    const TARGET_ARM64_MAC = "aarch64-apple-darwin";
);

define_target_triples!(
    /// 64-bit Windows MSVC (Windows 7+)
    const TARGET_X64_WINDOWS = "x86_64-pc-windows-msvc";
);

/// Every target we release for, with the host class that builds it (in matrix order)
pub const RELEASE_TARGETS: &[(&str, HostClass)] = &[
    (TARGET_ARM64_LINUX_GNU, HostClass::Linux),
    (TARGET_ARM64_LINUX_MUSL, HostClass::Linux),
    (TARGET_ARMV6_LINUX_GNU_HARDFLOAT, HostClass::Linux),
    (TARGET_X86_LINUX_GNU, HostClass::Linux),
    (TARGET_X86_LINUX_MUSL, HostClass::Linux),
    (TARGET_X64_LINUX_GNU, HostClass::Linux),
    (TARGET_X64_LINUX_MUSL, HostClass::Linux),
    (TARGET_X64_MAC, HostClass::Mac),
    (TARGET_ARM64_MAC, HostClass::Mac),
    (TARGET_X64_WINDOWS, HostClass::Windows),
];

/// The host class of the machine this code is running on
///
/// This is determined through `std::env::consts::OS` rather than running `cargo`.
/// Returns None for hosts that can't build anything in the matrix.
pub fn current_host() -> Option<HostClass> {
    host_for_os(std::env::consts::OS)
}

/// Map an OS name (as in `std::env::consts::OS`) to a host class
pub fn host_for_os(os: &str) -> Option<HostClass> {
    match os {
        "linux" => Some(HostClass::Linux),
        "macos" => Some(HostClass::Mac),
        "windows" => Some(HostClass::Windows),
        _ => None,
    }
}

/// A string representing a Github Runner
pub type GithubRunner = &'static str;
/// The Github Runner to use for Linux
pub const GITHUB_LINUX_RUNNER: GithubRunner = "ubuntu-latest";
/// The Github Runner to use for macos
pub const GITHUB_MACOS_RUNNER: GithubRunner = "macos-latest";
/// The Github Runner to use for windows
pub const GITHUB_WINDOWS_RUNNER: GithubRunner = "windows-latest";

/// Get the Github Runner that provides a given host class
pub fn github_runner_for_host(host: HostClass) -> GithubRunner {
    match host {
        HostClass::Linux => GITHUB_LINUX_RUNNER,
        HostClass::Mac => GITHUB_MACOS_RUNNER,
        HostClass::Windows => GITHUB_WINDOWS_RUNNER,
    }
}

/// The file name an executable gets on a given host class
pub fn exe_name(bin_name: &str, host: HostClass) -> String {
    match host {
        HostClass::Windows => format!("{bin_name}.exe"),
        HostClass::Linux | HostClass::Mac => bin_name.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_for_os() {
        assert_eq!(host_for_os("linux"), Some(HostClass::Linux));
        assert_eq!(host_for_os("macos"), Some(HostClass::Mac));
        assert_eq!(host_for_os("windows"), Some(HostClass::Windows));
        assert_eq!(host_for_os("freebsd"), None);
    }

    #[test]
    fn triples_agree_with_their_host() {
        for &(triple, host) in RELEASE_TARGETS {
            let expected = if triple.contains("windows") {
                HostClass::Windows
            } else if triple.contains("apple") {
                HostClass::Mac
            } else {
                HostClass::Linux
            };
            assert_eq!(host, expected, "{triple}");
        }
    }

    #[test]
    fn runners() {
        assert_eq!(github_runner_for_host(HostClass::Linux), "ubuntu-latest");
        assert_eq!(github_runner_for_host(HostClass::Windows), "windows-latest");
        assert_eq!(exe_name("csv2parquet", HostClass::Windows), "csv2parquet.exe");
        assert_eq!(exe_name("csv2parquet", HostClass::Mac), "csv2parquet");
    }
}
