//! Writing (and reading back) single-binary archives
//!
//! Every archive we ship contains exactly one file at its root: the binary.
//! There are no directory entries and no README/LICENSE extras.

use std::fs::File;
use std::io::BufWriter;

use camino::Utf8Path;
use flate2::{read::GzDecoder, Compression, GzBuilder};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipArchive, ZipWriter};

use crate::DistResult;

/// gzip level used for tarballs
const GZ_LEVEL: u32 = 6;
/// Permissions recorded for the binary inside zips
const EXE_MODE: u32 = 0o755;

/// Write `src` into a fresh `.tar.gz` at `dest`, stored as `name`
pub fn tar_gz_file(src: &Utf8Path, name: &str, dest: &Utf8Path) -> DistResult<()> {
    let tar_name = dest
        .file_name()
        .and_then(|n| n.strip_suffix(".gz"))
        .unwrap_or(name)
        .to_owned();
    let file = BufWriter::new(File::create(dest)?);
    let gz = GzBuilder::new()
        .filename(tar_name)
        .write(file, Compression::new(GZ_LEVEL));

    let mut tar = tar::Builder::new(gz);
    // no mtimes/owners from the build machine, so rebuilding gives the same structure
    tar.mode(tar::HeaderMode::Deterministic);
    tar.append_path_with_name(src, name)?;

    let gz = tar.into_inner()?;
    let mut file = gz.finish()?;
    std::io::Write::flush(&mut file)?;
    Ok(())
}

/// Write `src` into a fresh `.zip` at `dest`, stored as `name`
pub fn zip_file(src: &Utf8Path, name: &str, dest: &Utf8Path) -> DistResult<()> {
    let file = File::create(dest)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(EXE_MODE);

    zip.start_file(name, options)?;
    let mut input = File::open(src)?;
    std::io::copy(&mut input, &mut zip)?;
    zip.finish()?;
    Ok(())
}

/// List the names of every entry in a `.tar.gz`
pub fn tar_gz_entries(path: &Utf8Path) -> DistResult<Vec<String>> {
    let file = File::open(path)?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    let mut names = vec![];
    for entry in archive.entries()? {
        let entry = entry?;
        names.push(entry.path()?.to_string_lossy().into_owned());
    }
    Ok(names)
}

/// List the names of every entry in a `.zip`
pub fn zip_entries(path: &Utf8Path) -> DistResult<Vec<String>> {
    let file = File::open(path)?;
    let archive = ZipArchive::new(file)?;
    Ok(archive.file_names().map(|n| n.to_owned()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use temp_dir::TempDir;

    fn fake_binary(dir: &Utf8Path, name: &str) -> camino::Utf8PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"\x7fELF pretend this is a program").unwrap();
        path
    }

    #[test]
    fn tarball_has_one_entry() {
        let tmp = TempDir::new().unwrap();
        let dir = Utf8Path::from_path(tmp.path()).unwrap();
        let bin = fake_binary(dir, "some-build-output");
        let dest = dir.join("csv2parquet-x86_64-unknown-linux-gnu.tar.gz");

        tar_gz_file(&bin, "csv2parquet", &dest).unwrap();
        assert_eq!(tar_gz_entries(&dest).unwrap(), vec!["csv2parquet"]);
    }

    #[test]
    fn zip_has_one_entry_with_same_bytes() {
        let tmp = TempDir::new().unwrap();
        let dir = Utf8Path::from_path(tmp.path()).unwrap();
        let bin = fake_binary(dir, "out.exe");
        let dest = dir.join("csv2parquet-x86_64-pc-windows-msvc.zip");

        zip_file(&bin, "csv2parquet.exe", &dest).unwrap();
        assert_eq!(zip_entries(&dest).unwrap(), vec!["csv2parquet.exe"]);

        let mut archive = ZipArchive::new(File::open(&dest).unwrap()).unwrap();
        let mut contents = vec![];
        archive
            .by_name("csv2parquet.exe")
            .unwrap()
            .read_to_end(&mut contents)
            .unwrap();
        assert_eq!(contents, std::fs::read(&bin).unwrap());
    }
}
