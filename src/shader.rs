pub mod diagnostic;
pub mod validate;

use std::path::{Path, PathBuf};

use anyhow::Context;

/// A shader stage, identified by the file extension glslang uses for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Stage {
    Vertex,
    TessControl,
    TessEvaluation,
    Geometry,
    Fragment,
    Compute,
}

impl Stage {
    /// Stages validated when no allow-list is given.
    pub const DEFAULT: [Stage; 2] = [Stage::Vertex, Stage::Fragment];

    pub fn extension(self) -> &'static str {
        match self {
            Stage::Vertex => "vert",
            Stage::TessControl => "tesc",
            Stage::TessEvaluation => "tese",
            Stage::Geometry => "geom",
            Stage::Fragment => "frag",
            Stage::Compute => "comp",
        }
    }

    pub fn from_extension(extension: &str) -> Option<Stage> {
        [
            Stage::Vertex,
            Stage::TessControl,
            Stage::TessEvaluation,
            Stage::Geometry,
            Stage::Fragment,
            Stage::Compute,
        ]
        .into_iter()
        .find(|stage| stage.extension() == extension)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderFile {
    pub path: PathBuf,
    pub name: String,
    pub stage: Stage,
}

impl ShaderFile {
    /// Returns `None` unless the path ends in one of the `allowed` stage extensions.
    pub fn from_path(path: &Path, allowed: &[Stage]) -> Option<ShaderFile> {
        let extension = path.extension()?.to_str()?;
        let stage = Stage::from_extension(extension).filter(|stage| allowed.contains(stage))?;
        let name = path.file_stem()?.to_string_lossy().into_owned();

        Some(ShaderFile {
            path: path.to_owned(),
            name,
            stage,
        })
    }
}

/// All stages in one directory that share a base name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderProgram {
    pub name: String,
    pub stages: Vec<ShaderFile>,
}

impl ShaderProgram {
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.stages.iter().map(|stage| stage.path.as_path())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderDirectory {
    pub path: PathBuf,
    pub programs: Vec<ShaderProgram>,
}

impl ShaderDirectory {
    fn insert(&mut self, file: ShaderFile) {
        match self.programs.iter_mut().find(|program| program.name == file.name) {
            Some(program) => program.stages.push(file),
            None => self.programs.push(ShaderProgram {
                name: file.name.clone(),
                stages: vec![file],
            }),
        }
    }
}

/// Collects the shader programs of every directory below `root`, `root` included.
///
/// Each directory only contributes its immediate files, so stages sharing a base name in
/// different directories end up in different programs.
pub fn discover(root: &Path, allowed: &[Stage]) -> anyhow::Result<Vec<ShaderDirectory>> {
    let metadata = std::fs::metadata(root)
        .with_context(|| format!("could not open shader directory: {root:?}"))?;
    if !metadata.is_dir() {
        anyhow::bail!("shader root is not a directory: {root:?}");
    }

    let mut directories = Vec::new();

    let walker = walkdir::WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.file_type().is_dir());

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) if error.depth() == 0 => {
                return Err(error)
                    .with_context(|| format!("could not open shader directory: {root:?}"))
            }
            Err(error) => {
                warn!("skipping unreadable directory: {error}");
                continue;
            }
        };

        match scan_directory(entry.path(), allowed) {
            Ok(directory) => directories.push(directory),
            Err(error) if entry.depth() == 0 => return Err(error),
            Err(error) => warn!("skipping directory: {error:#}"),
        }
    }

    Ok(directories)
}

fn scan_directory(path: &Path, allowed: &[Stage]) -> anyhow::Result<ShaderDirectory> {
    let mut files = Vec::new();
    let entries =
        std::fs::read_dir(path).with_context(|| format!("could not read directory: {path:?}"))?;

    for entry in entries {
        let entry = entry.with_context(|| format!("could not read directory: {path:?}"))?;
        // follows symlinks, so linked stage files are validated too
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }

    files.sort();

    let mut directory = ShaderDirectory {
        path: path.to_owned(),
        programs: Vec::new(),
    };

    for file in files.iter().filter_map(|path| ShaderFile::from_path(path, allowed)) {
        debug!(path = %file.path.display(), stage = ?file.stage, "found shader stage");
        directory.insert(file);
    }

    Ok(directory)
}
