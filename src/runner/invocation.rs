use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::executor::{MAX_ERROR_CHARS, truncate_message};

/// Everything needed to start one runner process.
#[derive(Debug, Clone)]
pub struct RunnerInvocation {
    /// Interpreter executable (e.g. a virtualenv's `python`). Empty means the
    /// environment has not been set up yet.
    pub program: String,
    /// Runner script passed as the first argument; must exist before spawning.
    pub script: PathBuf,
    /// Arguments following the script path.
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// Variables set on top of the inherited environment.
    pub env: BTreeMap<String, String>,
    /// Run through the platform shell (`cmd /C` on Windows, `sh -c` elsewhere).
    pub use_shell: bool,
    /// File the runner must leave behind for the attempt to count as a success.
    pub artifact: PathBuf,
    /// Refuse to start when `artifact` already exists.
    pub create_only: bool,
}

impl RunnerInvocation {
    pub fn new(program: impl Into<String>, script: impl Into<PathBuf>, artifact: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            script: script.into(),
            args: Vec::new(),
            working_dir: PathBuf::from("."),
            env: BTreeMap::new(),
            use_shell: cfg!(windows),
            artifact: artifact.into(),
            create_only: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn use_shell(mut self, use_shell: bool) -> Self {
        self.use_shell = use_shell;
        self
    }

    pub fn create_only(mut self, create_only: bool) -> Self {
        self.create_only = create_only;
        self
    }

    /// Human-readable name of the artifact, used in error messages.
    pub fn artifact_name(&self) -> String {
        self.artifact
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.artifact.display().to_string())
    }

    /// Script path followed by the remaining arguments, as passed to the interpreter.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.script.to_string_lossy().to_string())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// The single command string handed to the shell when `use_shell` is set.
    pub fn shell_command_line(&self) -> String {
        std::iter::once(self.program.clone())
            .chain(self.argv())
            .map(|part| shell_quote(&part))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Quote one argument for the platform shell.
pub fn shell_quote(arg: &str) -> String {
    if cfg!(windows) {
        cmd_quote(arg)
    } else {
        posix_quote(arg)
    }
}

/// Quote for `sh -c`.
pub fn posix_quote(arg: &str) -> String {
    let is_plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c));
    if is_plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Quote for `cmd /C`.
///
/// `cmd` expands `%VAR%` even inside double quotes, so every `%` is emitted
/// outside the quotes with a caret escape. Redirection and escape characters
/// are inert once quoted.
pub fn cmd_quote(arg: &str) -> String {
    let needs_quotes = arg.is_empty()
        || arg
            .chars()
            .any(|c| c.is_whitespace() || "\"&|<>^%()".contains(c));
    if !needs_quotes {
        return arg.to_string();
    }
    let escaped = arg.replace('"', "\"\"").replace('%', "\"^%\"");
    format!("\"{}\"", escaped)
}

/// Terminal outcome of one runner invocation. Produced exactly once, at exit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GenerationResult {
    Success {
        success: SuccessFlag<true>,
        #[serde(rename = "outputPath")]
        output_path: PathBuf,
    },
    Failure {
        success: SuccessFlag<false>,
        error: String,
    },
}

impl GenerationResult {
    pub fn success(output_path: impl Into<PathBuf>) -> Self {
        GenerationResult::Success {
            success: SuccessFlag,
            output_path: output_path.into(),
        }
    }

    /// A failed result. The message is cut to [`MAX_ERROR_CHARS`] characters.
    pub fn failure(error: impl Into<String>) -> Self {
        GenerationResult::Failure {
            success: SuccessFlag,
            error: truncate_message(&error.into(), MAX_ERROR_CHARS),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, GenerationResult::Success { .. })
    }

    pub fn output_path(&self) -> Option<&Path> {
        match self {
            GenerationResult::Success { output_path, .. } => Some(output_path),
            GenerationResult::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            GenerationResult::Success { .. } => None,
            GenerationResult::Failure { error, .. } => Some(error),
        }
    }
}

/// Serializes as a fixed boolean so `success` and `outputPath`/`error` can
/// never disagree on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SuccessFlag<const V: bool>;

impl<const V: bool> Serialize for SuccessFlag<V> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bool(V)
    }
}

impl<'de, const V: bool> Deserialize<'de> for SuccessFlag<V> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = bool::deserialize(deserializer)?;
        if value == V {
            Ok(SuccessFlag)
        } else {
            Err(serde::de::Error::custom(format!("expected success = {}", V)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_args_and_env() {
        let inv = RunnerInvocation::new("python3", "/backend/runner.py", "/proj/CLAUDE.md")
            .args(["--project", "/proj"])
            .arg("--progress")
            .env("PYTHONPATH", "/backend")
            .working_dir("/backend")
            .create_only(true);
        assert_eq!(
            inv.argv(),
            vec!["/backend/runner.py", "--project", "/proj", "--progress"]
        );
        assert_eq!(inv.env.get("PYTHONPATH").map(String::as_str), Some("/backend"));
        assert!(inv.create_only);
        assert_eq!(inv.artifact_name(), "CLAUDE.md");
    }

    #[test]
    fn test_posix_quote() {
        assert_eq!(posix_quote("/usr/bin/python3"), "/usr/bin/python3");
        assert_eq!(posix_quote("my project"), "'my project'");
        assert_eq!(posix_quote("it's"), r"'it'\''s'");
        assert_eq!(posix_quote(""), "''");
    }

    #[test]
    fn test_cmd_quote_plain_and_spaced() {
        assert_eq!(cmd_quote(r"C:\venv\python.exe"), r"C:\venv\python.exe");
        assert_eq!(cmd_quote(r"C:\My Project"), r#""C:\My Project""#);
        assert_eq!(cmd_quote(r#"say "hi""#), r#""say ""hi""""#);
        assert_eq!(cmd_quote(""), r#""""#);
    }

    #[test]
    fn test_cmd_quote_keeps_percent_out_of_quotes() {
        assert_eq!(cmd_quote("%PATH%"), r#"""^%"PATH"^%"""#);
        assert_eq!(cmd_quote(r"C:\100%"), r#""C:\100"^%"""#);
        for quoted in [cmd_quote("%PATH%"), cmd_quote(r"C:\100% done")] {
            // Every percent sign is caret-escaped and sits between quote pairs.
            assert!(!quoted.contains("\"%"));
            assert_eq!(quoted.matches('%').count(), quoted.matches("^%").count());
        }
    }

    #[test]
    fn test_cmd_quote_wraps_redirection_and_escape_chars() {
        assert_eq!(cmd_quote("a<b>c"), r#""a<b>c""#);
        assert_eq!(cmd_quote("x^y"), r#""x^y""#);
        assert_eq!(cmd_quote("a&b|c"), r#""a&b|c""#);
        assert_eq!(cmd_quote("(x)"), r#""(x)""#);
    }

    #[cfg(not(windows))]
    #[test]
    fn test_shell_command_line_quotes_each_part() {
        let inv = RunnerInvocation::new("python3", "/backend/runner.py", "/p/CLAUDE.md")
            .args(["--project", "/Users/me/My Project"]);
        assert_eq!(
            inv.shell_command_line(),
            "python3 /backend/runner.py --project '/Users/me/My Project'"
        );
    }

    #[test]
    fn test_generation_result_wire_shape() {
        let ok = serde_json::to_value(GenerationResult::success("/p/CLAUDE.md")).unwrap();
        assert_eq!(ok, serde_json::json!({"success": true, "outputPath": "/p/CLAUDE.md"}));

        let err = serde_json::to_value(GenerationResult::failure("boom")).unwrap();
        assert_eq!(err, serde_json::json!({"success": false, "error": "boom"}));
    }

    #[test]
    fn test_generation_result_rejects_contradictory_payload() {
        let parsed: Result<GenerationResult, _> =
            serde_json::from_str(r#"{"success": false, "outputPath": "/p/CLAUDE.md"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_generation_result_accessors() {
        let ok = GenerationResult::success("/p/CLAUDE.md");
        assert!(ok.is_success());
        assert_eq!(ok.output_path(), Some(Path::new("/p/CLAUDE.md")));
        assert!(ok.error().is_none());

        let err = GenerationResult::failure("nope");
        assert!(!err.is_success());
        assert_eq!(err.error(), Some("nope"));
    }

    #[test]
    fn test_failure_message_is_bounded() {
        let err = GenerationResult::failure("é".repeat(MAX_ERROR_CHARS * 4));
        assert_eq!(err.error().unwrap().chars().count(), MAX_ERROR_CHARS);
    }
}
