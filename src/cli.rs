use std::{fmt, path::PathBuf};

use anyhow::Context;
use clap::Parser;

use crate::shader::{
    validate::{Glslang, Mode},
    Stage,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    shader_validator                                  # Uses $GLSLANG_PATH and Asset/Shader
    shader_validator --shaders assets/shaders         # Validate another shader tree
    shader_validator --stage vertex --stage compute   # Only look at .vert and .comp files
    shader_validator --strict                         # Exit with status 1 on failures
    shader_validator --watch                          # Revalidate whenever a shader changes")]
pub struct Cli {
    /// Directory containing the glslangValidator executable
    #[arg(long, env = "GLSLANG_PATH", value_name = "DIR")]
    pub glslang_path: Option<PathBuf>,

    /// Root of the shader tree, also used as the include directory
    /// [default: Asset/Shader next to this executable]
    #[arg(short, long, value_name = "DIR")]
    pub shaders: Option<PathBuf>,

    /// Shader stage to validate, may be repeated [default: vertex, fragment]
    #[arg(long = "stage", value_enum, value_name = "STAGE")]
    pub stages: Vec<Stage>,

    /// Validate each stage file on its own instead of linking whole programs.
    /// glslang does not resolve #include in this mode
    #[arg(long)]
    pub per_stage: bool,

    /// Exit with a non-zero status if any shader fails validation
    #[arg(long)]
    pub strict: bool,

    /// Keep running and revalidate whenever a file in the shader tree changes
    #[arg(short, long)]
    pub watch: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub validator: PathBuf,
    pub shaders_root: PathBuf,
    pub stages: Vec<Stage>,
    pub mode: Mode,
    pub strict: bool,
    pub watch: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Setup {
    Ready(Config),
    /// There is no validator to run. This is not a failure of the shaders.
    Unconfigured(Unconfigured),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unconfigured {
    PathUnset,
    ExecutableMissing(PathBuf),
}

impl fmt::Display for Unconfigured {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unconfigured::PathUnset => write!(
                f,
                "environment variable \"GLSLANG_PATH\" is not defined, skipping shader validation"
            ),
            Unconfigured::ExecutableMissing(path) => write!(
                f,
                "{} not found at {path:?}, skipping shader validation",
                Glslang::EXECUTABLE
            ),
        }
    }
}

impl Cli {
    pub fn resolve(self) -> anyhow::Result<Setup> {
        self.resolve_with(default_shaders_root)
    }

    fn resolve_with(
        self,
        default_root: impl FnOnce() -> anyhow::Result<PathBuf>,
    ) -> anyhow::Result<Setup> {
        let Some(directory) = self.glslang_path else {
            return Ok(Setup::Unconfigured(Unconfigured::PathUnset));
        };

        let validator = Glslang::executable_in(&directory);
        if !validator.is_file() {
            return Ok(Setup::Unconfigured(Unconfigured::ExecutableMissing(
                validator,
            )));
        }

        let shaders_root = match self.shaders {
            Some(root) => root,
            None => default_root()?,
        };

        let stages = if self.stages.is_empty() {
            Stage::DEFAULT.to_vec()
        } else {
            self.stages
        };

        let mode = if self.per_stage {
            Mode::PerStage
        } else {
            Mode::Linked
        };

        Ok(Setup::Ready(Config {
            validator,
            shaders_root,
            stages,
            mode,
            strict: self.strict,
            watch: self.watch,
        }))
    }
}

fn default_shaders_root() -> anyhow::Result<PathBuf> {
    let executable = std::env::current_exe().context("could not locate the running executable")?;
    let directory = executable
        .parent()
        .with_context(|| format!("executable has no parent directory: {executable:?}"))?;
    Ok(directory.join("Asset").join("Shader"))
}
