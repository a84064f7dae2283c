use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::Context;
use codespan_reporting::term::termcolor::WriteColor;

use super::{diagnostic, ShaderDirectory, ShaderProgram};

/// Exit status and captured text of one validator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// `None` if the process was terminated by a signal.
    pub code: Option<i32>,
    pub output: String,
}

impl Invocation {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Something that can check a set of shader files, usually an external executable.
pub trait Validator {
    /// Runs the validator on `inputs` followed by `flags`.
    ///
    /// An error means the validator could not be run at all, not that it rejected the inputs.
    fn invoke(&self, inputs: &[&Path], flags: &[OsString]) -> anyhow::Result<Invocation>;
}

pub struct Glslang {
    executable: PathBuf,
}

impl Glslang {
    pub const EXECUTABLE: &'static str = "glslangValidator";

    pub fn new(executable: impl Into<PathBuf>) -> Glslang {
        Glslang {
            executable: executable.into(),
        }
    }

    /// Path of the validator executable inside `directory`.
    pub fn executable_in(directory: &Path) -> PathBuf {
        directory.join(format!(
            "{}{}",
            Self::EXECUTABLE,
            std::env::consts::EXE_SUFFIX
        ))
    }
}

impl Validator for Glslang {
    fn invoke(&self, inputs: &[&Path], flags: &[OsString]) -> anyhow::Result<Invocation> {
        let output = Command::new(&self.executable)
            .args(inputs)
            .args(flags)
            .output()
            .with_context(|| format!("could not run {:?}", self.executable))?;

        Ok(Invocation {
            code: output.status.code(),
            output: combine_output(&output.stdout, &output.stderr),
        })
    }
}

/// glslang reports to stdout, but keep anything it writes to stderr as well, on its own line.
fn combine_output(stdout: &[u8], stderr: &[u8]) -> String {
    let mut text = String::from_utf8_lossy(stdout).into_owned();
    if !stderr.is_empty() && !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    text.push_str(&String::from_utf8_lossy(stderr));
    text
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    /// All stages of a program in one linked invocation. Includes resolve against the shader
    /// root.
    #[default]
    Linked,
    /// Every stage file on its own. glslang cannot resolve `#include` in this mode, so
    /// shaders that use includes will fail.
    PerStage,
}

#[derive(Debug, Clone)]
pub struct Options {
    pub include_dir: PathBuf,
    pub mode: Mode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    /// The validator ran and reported problems.
    Rejected { code: Option<i32>, output: String },
    /// The validator could not be started.
    NotRun { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub program: String,
    pub paths: Vec<PathBuf>,
    pub mode: Mode,
    pub outcome: Outcome,
}

impl ValidationResult {
    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Passed
    }

    /// One line naming the failed program, worded for the mode it was checked in.
    pub fn failure_message(&self) -> String {
        match self.mode {
            Mode::Linked => format!(
                "shader \"{}\" could not be compiled as a whole",
                self.program
            ),
            Mode::PerStage => format!(
                "shader \"{}\" has stages that could not be compiled",
                self.program
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DirectorySummary {
    pub path: PathBuf,
    pub results: Vec<ValidationResult>,
}

impl DirectorySummary {
    pub fn success(&self) -> bool {
        self.results.iter().all(ValidationResult::passed)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Summary {
    pub directories: Vec<DirectorySummary>,
}

impl Summary {
    pub fn success(&self) -> bool {
        self.directories.iter().all(DirectorySummary::success)
    }

    pub fn results(&self) -> impl Iterator<Item = &ValidationResult> {
        self.directories
            .iter()
            .flat_map(|directory| directory.results.iter())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results().filter(|result| !result.passed())
    }
}

pub fn validate_program(
    program: &ShaderProgram,
    validator: &dyn Validator,
    options: &Options,
) -> ValidationResult {
    let paths: Vec<&Path> = program.paths().collect();

    let outcome = match options.mode {
        Mode::Linked => {
            // -l links all stages into one program
            let flags = [include_flag(&options.include_dir), OsString::from("-l")];
            to_outcome(validator.invoke(&paths, &flags))
        }
        Mode::PerStage => paths
            .iter()
            .map(|path| to_outcome(validator.invoke(&[*path], &[])))
            .fold(Outcome::Passed, merge_outcomes),
    };

    ValidationResult {
        program: program.name.clone(),
        paths: paths.into_iter().map(Path::to_owned).collect(),
        mode: options.mode,
        outcome,
    }
}

/// Validates every program in every directory, writing the diagnostics of failed programs to
/// `report`. A failure never stops the remaining programs from being validated.
pub fn validate_all(
    directories: &[ShaderDirectory],
    validator: &dyn Validator,
    options: &Options,
    report: &mut dyn WriteColor,
) -> Summary {
    let mut summary = Summary::default();

    for directory in directories {
        let mut results = Vec::with_capacity(directory.programs.len());

        for program in &directory.programs {
            debug!(program = %program.name, stages = program.stages.len(), "validating");
            let result = validate_program(program, validator, options);

            if result.passed() {
                debug!(program = %result.program, "passed");
            } else {
                error!("{}", result.failure_message());
                if let Err(error) = diagnostic::emit(report, &result) {
                    warn!("could not write diagnostics: {error:#}");
                }
            }

            results.push(result);
        }

        let directory = DirectorySummary {
            path: directory.path.clone(),
            results,
        };

        if directory.success() {
            info!(directory = %directory.path.display(), "all shaders validated successfully");
        } else {
            error!(directory = %directory.path.display(), "some shaders have validation errors");
        }

        summary.directories.push(directory);
    }

    summary
}

fn include_flag(directory: &Path) -> OsString {
    let mut flag = OsString::from("-I");
    flag.push(directory);
    flag
}

fn to_outcome(result: anyhow::Result<Invocation>) -> Outcome {
    match result {
        Ok(invocation) if invocation.success() => Outcome::Passed,
        Ok(invocation) => Outcome::Rejected {
            code: invocation.code,
            output: invocation.output,
        },
        Err(error) => Outcome::NotRun {
            error: format!("{error:#}"),
        },
    }
}

fn merge_outcomes(current: Outcome, next: Outcome) -> Outcome {
    match (current, next) {
        (not_run @ Outcome::NotRun { .. }, _) | (_, not_run @ Outcome::NotRun { .. }) => not_run,
        (Outcome::Passed, other) | (other, Outcome::Passed) => other,
        (
            Outcome::Rejected { code, mut output },
            Outcome::Rejected {
                output: more_output,
                ..
            },
        ) => {
            output.push_str(&more_output);
            Outcome::Rejected { code, output }
        }
    }
}
