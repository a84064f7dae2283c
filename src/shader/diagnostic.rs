use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use codespan_reporting::{
    diagnostic::{Diagnostic, Label, Severity as CodespanSeverity},
    files::{Files, SimpleFiles},
    term::{self, termcolor::WriteColor},
};
use regex::Regex;

use super::validate::{Outcome, ValidationResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// A glslang message that points at a line in a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub severity: Severity,
    pub file: PathBuf,
    /// 1-based, as printed by glslang.
    pub line: usize,
    pub text: String,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
        };
        write!(f, "{severity}: {}:{}: {}", self.file.display(), self.line, self.text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line<'a> {
    Located(Message),
    Other(&'a str),
}

/// Splits validator output into located messages and everything else, dropping blank lines.
pub fn parse(output: &str) -> Vec<Line<'_>> {
    output
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(|line| match parse_message(line) {
            Some(message) => Line::Located(message),
            None => Line::Other(line),
        })
        .collect()
}

fn parse_message(line: &str) -> Option<Message> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"^(ERROR|WARNING): (.+?):(\d+): (.*)$").expect("invalid message pattern")
    });

    let captures = pattern.captures(line)?;
    let severity = match &captures[1] {
        "ERROR" => Severity::Error,
        _ => Severity::Warning,
    };
    let line = captures[3].parse::<usize>().ok().filter(|&line| line > 0)?;

    Some(Message {
        severity,
        file: PathBuf::from(&captures[2]),
        line,
        text: captures[4].trim().to_owned(),
    })
}

/// Writes the diagnostics of a failed program to `writer`. Passing programs produce no output.
///
/// Messages pointing at a readable file are shown with the offending source line. Everything
/// else the validator printed ends up as notes on a final error naming the program.
pub fn emit(writer: &mut dyn WriteColor, result: &ValidationResult) -> anyhow::Result<()> {
    let config = term::Config::default();
    let mut files = SimpleFiles::new();
    let mut file_ids: HashMap<PathBuf, Option<usize>> = HashMap::new();
    let mut notes = Vec::new();

    match &result.outcome {
        Outcome::Passed => return Ok(()),
        Outcome::NotRun { error } => {
            notes.push(format!("the validator could not be started: {error}"));
        }
        Outcome::Rejected { code, output } => {
            for line in parse(output) {
                let message = match line {
                    Line::Located(message) => message,
                    Line::Other(text) => {
                        notes.push(text.to_owned());
                        continue;
                    }
                };

                let id = *file_ids
                    .entry(message.file.clone())
                    .or_insert_with(|| load_file(&mut files, &message.file));

                let location = id.and_then(|id| {
                    let range = files.line_range(id, message.line - 1).ok()?;
                    Some((id, range))
                });

                match location {
                    Some((id, range)) => {
                        let severity = match message.severity {
                            Severity::Error => CodespanSeverity::Error,
                            Severity::Warning => CodespanSeverity::Warning,
                        };
                        let diagnostic = Diagnostic::new(severity)
                            .with_message(&message.text)
                            .with_labels(vec![Label::primary(id, trim_newline(&files, id, range))]);
                        term::emit(writer, &config, &files, &diagnostic)?;
                    }
                    None => notes.push(message.to_string()),
                }
            }

            match code {
                Some(code) => notes.push(format!("validator exited with status {code}")),
                None => notes.push("validator was terminated".to_owned()),
            }
        }
    }

    let paths = result
        .paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");

    let diagnostic = Diagnostic::error()
        .with_message(result.failure_message())
        .with_notes(
            std::iter::once(format!("stages: {paths}"))
                .chain(notes)
                .collect(),
        );
    term::emit(writer, &config, &files, &diagnostic)?;

    Ok(())
}

fn load_file(files: &mut SimpleFiles<String, String>, path: &Path) -> Option<usize> {
    let source = std::fs::read_to_string(path).ok()?;
    Some(files.add(path.display().to_string(), source))
}

/// Label only the text of the line, not its terminator.
fn trim_newline(
    files: &SimpleFiles<String, String>,
    id: usize,
    range: std::ops::Range<usize>,
) -> std::ops::Range<usize> {
    let source = files.get(id).map(|file| file.source().as_str()).unwrap_or("");
    let text = source.get(range.clone()).unwrap_or("");
    let trimmed = text.trim_end_matches(['\n', '\r']).len();
    range.start..range.start + trimmed
}

#[cfg(test)]
mod tests {
    use codespan_reporting::term::termcolor::NoColor;

    use super::*;
    use crate::{shader::validate::Mode, testing::TempDir};

    fn render(result: &ValidationResult) -> String {
        let mut writer = NoColor::new(Vec::new());
        emit(&mut writer, result).unwrap();
        String::from_utf8(writer.into_inner()).unwrap()
    }

    #[test]
    fn parses_located_messages() {
        let output = "\
shaders/a.frag
ERROR: shaders/a.frag:12: 'colour' : undeclared identifier
WARNING: C:\\shaders\\b.vert:3: 'x' : unused

ERROR: 1 compilation errors.  No code generated.
";
        let lines = parse(output);

        assert_eq!(
            lines,
            vec![
                Line::Other("shaders/a.frag"),
                Line::Located(Message {
                    severity: Severity::Error,
                    file: PathBuf::from("shaders/a.frag"),
                    line: 12,
                    text: "'colour' : undeclared identifier".to_owned(),
                }),
                Line::Located(Message {
                    severity: Severity::Warning,
                    file: PathBuf::from("C:\\shaders\\b.vert"),
                    line: 3,
                    text: "'x' : unused".to_owned(),
                }),
                Line::Other("ERROR: 1 compilation errors.  No code generated."),
            ]
        );
    }

    #[test]
    fn line_zero_is_not_a_location() {
        assert_eq!(
            parse("ERROR: a.frag:0: bad"),
            vec![Line::Other("ERROR: a.frag:0: bad")]
        );
    }

    #[test]
    fn renders_source_line_for_readable_files() {
        let dir = TempDir::new();
        let path = dir.write(
            "b.frag",
            "#version 450\nvoid main() { colour = vec4(1.0); }\n",
        );

        let result = ValidationResult {
            program: "b".to_owned(),
            paths: vec![path.clone()],
            mode: Mode::Linked,
            outcome: Outcome::Rejected {
                code: Some(2),
                output: format!(
                    "ERROR: {}:2: 'colour' : undeclared identifier\nERROR: 1 compilation errors.  No code generated.\n",
                    path.display()
                ),
            },
        };

        let text = render(&result);

        assert!(text.contains("'colour' : undeclared identifier"));
        assert!(text.contains("void main() { colour = vec4(1.0); }"));
        assert!(text.contains("shader \"b\" could not be compiled as a whole"));
        assert!(text.contains("1 compilation errors"));
        assert!(text.contains("validator exited with status 2"));
    }

    #[test]
    fn unreadable_locations_become_notes() {
        let result = ValidationResult {
            program: "missing".to_owned(),
            paths: vec![PathBuf::from("missing.vert")],
            mode: Mode::PerStage,
            outcome: Outcome::Rejected {
                code: Some(1),
                output: "ERROR: does/not/exist.vert:4: syntax error\n".to_owned(),
            },
        };

        let text = render(&result);

        assert!(text.contains("ERROR: does/not/exist.vert:4: syntax error"));
        assert!(text.contains("shader \"missing\" has stages that could not be compiled"));
    }

    #[test]
    fn passing_programs_print_nothing() {
        let result = ValidationResult {
            program: "a".to_owned(),
            paths: vec![PathBuf::from("a.vert")],
            mode: Mode::Linked,
            outcome: Outcome::Passed,
        };

        assert!(render(&result).is_empty());
    }
}
