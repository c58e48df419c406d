//! Turning a built binary into the archive that gets attached to the release

use axoasset::LocalAsset;
use axoprocess::Cmd;
use camino::{Utf8Path, Utf8PathBuf};
use dist_matrix_schema::{ArchiveFormat, HostClass};
use temp_dir::TempDir;
use tracing::{debug, info, warn};

use crate::archive::{tar_gz_file, zip_file};
use crate::build::BuildResult;
use crate::config::Config;
use crate::platform::exe_name;
use crate::{DistError, DistResult};

/// The content type every release asset is uploaded with
pub const ASSET_CONTENT_TYPE: &str = "application/octet-stream";

/// A finished archive, ready to publish
#[derive(Debug, Clone)]
pub struct Artifact {
    /// The asset name (same as the archive's file name)
    pub name: String,
    /// Where the archive was written
    pub path: Utf8PathBuf,
    /// The archive's contents
    pub bytes: Vec<u8>,
    /// The content type to upload with
    pub content_type: &'static str,
}

/// Something that can archive the output of a build
pub trait Package: Send + Sync {
    /// Produce the archive for a successful build
    fn package(&self, build: &BuildResult) -> DistResult<Artifact>;
}

/// Packages binaries into `.tar.gz` or `.zip` (depending on the host)
#[derive(Debug, Clone)]
pub struct ArchivePackager {
    /// Where archives are written
    pub dist_dir: Utf8PathBuf,
    /// Whether to strip debug symbols first
    pub strip: bool,
    /// How to invoke strip
    pub strip_tool: String,
}

impl ArchivePackager {
    /// Create a packager from the run's config
    pub fn new(cfg: &Config) -> Self {
        Self {
            dist_dir: cfg.dist_dir.clone(),
            strip: cfg.strip,
            strip_tool: "strip".to_owned(),
        }
    }
}

impl Package for ArchivePackager {
    fn package(&self, build: &BuildResult) -> DistResult<Artifact> {
        let entry = &build.entry;
        let Some(binary) = build.binary_path.as_deref() else {
            return Err(DistError::NothingToPackage {
                archive_name: entry.archive_name.clone(),
            });
        };
        if !binary.is_file() {
            return Err(DistError::MissingBinary {
                bin_name: entry.bin_name.clone(),
                target: entry.target_triple.clone(),
            });
        }

        // Stage the binary under the name it should have in the archive
        let staging = TempDir::new()?;
        let staging_dir = Utf8Path::from_path(staging.path()).ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, "temp dir isn't utf8")
        })?;
        let archived_name = exe_name(&entry.bin_name, entry.host);
        let staged = staging_dir.join(&archived_name);
        LocalAsset::copy_file_to_file(binary, &staged)?;

        if self.strip {
            strip_binary(&self.strip_tool, &staged, entry.host);
        }

        LocalAsset::create_dir_all(&self.dist_dir)?;
        let dest = self.dist_dir.join(&entry.archive_name);
        if dest.exists() {
            LocalAsset::remove_file(&dest)?;
        }

        info!("packaging {} into {}", entry.target_triple, dest);
        match entry.archive_format() {
            ArchiveFormat::Zip => zip_file(&staged, &archived_name, &dest)?,
            ArchiveFormat::TarGz => tar_gz_file(&staged, &archived_name, &dest)?,
        }

        let bytes = LocalAsset::load_bytes(&dest)?;
        Ok(Artifact {
            name: entry.archive_name.clone(),
            path: dest,
            bytes,
            content_type: ASSET_CONTENT_TYPE,
        })
    }
}

/// Strip debug symbols, if we can
///
/// A binary that can't be stripped still gets shipped, just bigger.
fn strip_binary(strip_tool: &str, path: &Utf8Path, host: HostClass) {
    if host == HostClass::Windows {
        debug!("not stripping {path}, symbols live in a separate pdb on windows");
        return;
    }
    let mut cmd = Cmd::new(strip_tool, "strip debug symbols");
    cmd.arg(path);
    cmd.check(true);
    if let Err(e) = cmd.output() {
        warn!("failed to strip {path}, packaging it as-is: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{tar_gz_entries, zip_entries};
    use crate::matrix::MatrixEntry;

    struct Fixture {
        _tmp: TempDir,
        packager: ArchivePackager,
        bin: Utf8PathBuf,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let dir = Utf8Path::from_path(tmp.path()).unwrap().to_owned();
        let bin = dir.join("built-binary");
        std::fs::write(&bin, b"not really a program").unwrap();
        Fixture {
            packager: ArchivePackager {
                dist_dir: dir.join("distrib"),
                // there's nothing to strip in a fake binary
                strip: false,
                strip_tool: "strip".to_owned(),
            },
            bin,
            _tmp: tmp,
        }
    }

    #[test]
    fn linux_gets_a_tarball() {
        let f = fixture();
        let entry = MatrixEntry::new("csv2parquet", "x86_64-unknown-linux-gnu", HostClass::Linux);
        let build = BuildResult::built(entry, f.bin.clone());

        let artifact = f.packager.package(&build).unwrap();
        assert_eq!(artifact.name, "csv2parquet-x86_64-unknown-linux-gnu.tar.gz");
        assert_eq!(artifact.content_type, "application/octet-stream");
        assert_eq!(artifact.path.file_name(), Some(artifact.name.as_str()));
        assert_eq!(tar_gz_entries(&artifact.path).unwrap(), vec!["csv2parquet"]);
        assert_eq!(artifact.bytes, std::fs::read(&artifact.path).unwrap());
    }

    #[test]
    fn windows_gets_a_zip() {
        let f = fixture();
        let entry = MatrixEntry::new("csv2parquet", "x86_64-pc-windows-msvc", HostClass::Windows);
        let build = BuildResult::built(entry, f.bin.clone());

        let artifact = f.packager.package(&build).unwrap();
        assert_eq!(artifact.name, "csv2parquet-x86_64-pc-windows-msvc.zip");
        assert_eq!(zip_entries(&artifact.path).unwrap(), vec!["csv2parquet.exe"]);
    }

    #[test]
    fn repackaging_replaces_the_archive() {
        let f = fixture();
        let entry = MatrixEntry::new("csv2parquet", "aarch64-apple-darwin", HostClass::Mac);
        let build = BuildResult::built(entry, f.bin.clone());

        let first = f.packager.package(&build).unwrap();
        let second = f.packager.package(&build).unwrap();
        assert_eq!(first.path, second.path);
        assert_eq!(tar_gz_entries(&second.path).unwrap(), vec!["csv2parquet"]);
    }

    #[test]
    fn failed_builds_are_not_packaged() {
        let f = fixture();
        let entry = MatrixEntry::new("csv2parquet", "i686-unknown-linux-musl", HostClass::Linux);
        let err = f.packager.package(&BuildResult::failed(entry)).unwrap_err();
        assert!(matches!(err, DistError::NothingToPackage { .. }));
        assert!(!f.packager.dist_dir.exists());
    }

    #[test]
    fn unstrippable_binaries_still_ship() {
        let mut f = fixture();
        f.packager.strip = true;
        f.packager.strip_tool = "dist-matrix-definitely-not-strip".to_owned();
        let entry = MatrixEntry::new("csv2parquet", "x86_64-unknown-linux-musl", HostClass::Linux);
        let build = BuildResult::built(entry, f.bin.clone());

        let artifact = f.packager.package(&build).unwrap();
        assert_eq!(tar_gz_entries(&artifact.path).unwrap(), vec!["csv2parquet"]);
    }
}
