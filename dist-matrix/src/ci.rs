//! CI script generation
//!
//! The generated workflow runs one job per matrix entry, each on the kind of
//! runner its host class needs, and each calling `dist-matrix run --target`.

use axoasset::LocalAsset;
use camino::Utf8PathBuf;
use minijinja::syntax::SyntaxConfig;
use minijinja::{AutoEscape, Environment};
use newline_converter::dos2unix;
use serde::Serialize;

use crate::config::Config;
use crate::matrix::MatrixEntry;
use crate::platform::{github_runner_for_host, GithubRunner};
use crate::{DistError, DistResult, SELF_DIST_VERSION};

/// Where the workflow goes, relative to the project dir
pub const GITHUB_CI_FILE: &str = ".github/workflows/release.yml";
/// Template key for the github release.yml
const TEMPLATE_CI_GITHUB: &str = "ci/github_release.yml";
const TEMPLATE_CI_GITHUB_SRC: &str = include_str!("../templates/ci/github_release.yml");

#[derive(Debug, Serialize)]
struct CiInfo {
    install_dist_matrix: String,
    bin_name: String,
    token_env: String,
    entries: Vec<CiEntry>,
}

#[derive(Debug, Serialize)]
struct CiEntry {
    target: String,
    runner: GithubRunner,
    archive: String,
}

/// Returns a bit of sh to install the given version of dist-matrix
///
/// We don't publish to crates.io, so this builds the release tag from git.
fn install_dist_matrix_for_version(version: &str) -> String {
    let repository = env!("CARGO_PKG_REPOSITORY").trim_end_matches('/');
    format!("cargo install --git {repository}/ --tag v{version} dist-matrix --locked")
}

fn compute_ci_info(cfg: &Config, entries: &[MatrixEntry]) -> CiInfo {
    CiInfo {
        install_dist_matrix: install_dist_matrix_for_version(SELF_DIST_VERSION),
        bin_name: cfg.bin_name.clone(),
        token_env: cfg.token_env.clone(),
        entries: entries
            .iter()
            .map(|entry| CiEntry {
                target: entry.target_triple.to_string(),
                runner: github_runner_for_host(entry.host),
                archive: entry.archive_name.clone(),
            })
            .collect(),
    }
}

/// Github CI ymls already use {{ }} as delimiters so add an extra layer
/// of braces to disambiguate without needing tons of escaping
fn yaml_env() -> DistResult<Environment<'static>> {
    let mut env = Environment::new();
    env.set_syntax(
        SyntaxConfig::builder()
            .block_delimiters("{{%", "%}}")
            .variable_delimiters("{{{", "}}}")
            .comment_delimiters("{{#", "#}}")
            .build()?,
    );
    env.set_debug(true);
    // the .yml name would otherwise get json escaping
    env.set_auto_escape_callback(|_| AutoEscape::None);
    env.add_template(TEMPLATE_CI_GITHUB, TEMPLATE_CI_GITHUB_SRC)?;
    Ok(env)
}

/// Render the release workflow for `entries`, with unix newlines
pub fn render_github_ci(cfg: &Config, entries: &[MatrixEntry]) -> DistResult<String> {
    let env = yaml_env()?;
    let template = env.get_template(TEMPLATE_CI_GITHUB)?;
    let rendered = template.render(compute_ci_info(cfg, entries))?;
    let mut cleaned = dos2unix(&rendered).into_owned();
    if !cleaned.ends_with('\n') {
        cleaned.push('\n');
    }
    Ok(cleaned)
}

/// Generate CI for Github
///
/// This actually creates a file and writes to disk! With `check` nothing is
/// written, instead it's an error for the file on disk to differ.
pub fn generate_github_ci(cfg: &Config, entries: &[MatrixEntry], check: bool) -> DistResult<Utf8PathBuf> {
    let ci_file = cfg.project_dir.join(GITHUB_CI_FILE);
    let rendered = render_github_ci(cfg, entries)?;

    if check {
        let existing = if ci_file.exists() {
            Some(dos2unix(&LocalAsset::load_string(&ci_file)?).into_owned())
        } else {
            None
        };
        if existing.as_deref() != Some(rendered.as_str()) {
            return Err(DistError::CiOutOfDate { file: ci_file });
        }
        return Ok(ci_file);
    }

    LocalAsset::write_new_all(&rendered, &ci_file)?;
    eprintln!("generated Github CI to {}", ci_file);
    Ok(ci_file)
}
