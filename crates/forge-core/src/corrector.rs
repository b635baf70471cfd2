//! Failure classification and automatic command correction.
//!
//! A failed command's output is matched against an ordered pattern table to
//! get an [`ErrorKind`]. Each kind has a fixed confidence; a kind-specific
//! heuristic may propose a corrected command. [`RetryCorrector::run`] retries
//! with the proposed fix while the confidence clears the threshold and the
//! attempt budget lasts.

use std::{
    collections::{BTreeMap, HashSet, VecDeque},
    sync::Arc,
};

use jiff::Timestamp;
use log::{debug, info};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    config::RetryConfig,
    external::CommandOutput,
    models::{ErrorKind, RetryAttempt},
};

static PATTERNS: Lazy<Vec<(ErrorKind, Regex)>> = Lazy::new(|| {
    [
        (
            ErrorKind::ModuleNotFound,
            r"(?i)modulenotfounderror|importerror|no module named|module not found|cannot import",
        ),
        (
            ErrorKind::CommandNotFound,
            r"(?i)command not found|not recognized|n'est pas reconnu|: not found",
        ),
        (
            ErrorKind::PermissionDenied,
            r"(?i)permission denied|access denied|operation not permitted",
        ),
        (
            ErrorKind::FileNotFound,
            r"(?i)filenotfounderror|no such file|file not found",
        ),
        (
            ErrorKind::PortInUse,
            r"(?i)address already in use|port.*already in use",
        ),
        (
            ErrorKind::SyntaxError,
            r"(?i)syntax error|invalid syntax|unexpected token",
        ),
        (
            ErrorKind::ConnectionError,
            r"(?i)connection refused|network unreachable|connection error|timed out|timeout",
        ),
    ]
    .into_iter()
    .map(|(kind, pattern)| {
        (
            kind,
            Regex::new(pattern).expect("error pattern regex must compile"),
        )
    })
    .collect()
});

static MISSING_COMMAND_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)command not found:\s*(\S+)|([\w.+-]+): (?:command )?not found")
        .expect("missing command regex must compile")
});

static MISSING_MODULE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:no module named|module not found:?)\s*['"]?([\w.-]+)"#)
        .expect("missing module regex must compile")
});

static MISSING_FILE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)no such file or directory[:\s]+['"]?([^'"\n]+)"#)
        .expect("missing file regex must compile")
});

static PORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)port\s+(\d+)").expect("port regex must compile"));

const MISSPELLINGS: &[(&str, &str)] = &[
    ("pyhton", "python"),
    ("pytohn", "python"),
    ("pyton", "python"),
    ("node.js", "node"),
    ("nodejs", "node"),
    ("gti", "git"),
    ("clare", "clear"),
    ("claer", "clear"),
    ("cd..", "cd .."),
    ("sl", "ls"),
    ("les", "less"),
    ("grpe", "grep"),
    ("gerp", "grep"),
    ("maek", "make"),
    ("mkae", "make"),
];

const COMMON_COMMANDS: &[&str] = &[
    "ls", "cd", "pwd", "cat", "grep", "find", "echo", "mkdir", "rmdir", "cp", "mv", "rm", "touch",
    "chmod", "chown", "ps", "kill", "top", "git", "python", "node", "npm", "pip", "make", "gcc",
    "java",
];

const MAX_EDIT_DISTANCE: usize = 2;
const HIGH_CONFIDENCE: f64 = 0.7;

/// Facts pulled out of a command and its error output.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorDetails {
    pub command_name: Option<String>,
    #[serde(default)]
    pub command_args: Vec<String>,
    pub missing_command: Option<String>,
    pub missing_module: Option<String>,
    pub missing_file: Option<String>,
    pub port: Option<u16>,
}

/// Classification of one failed command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorAnalysis {
    pub error_kind: ErrorKind,
    pub details: ErrorDetails,
    pub original_command: String,
    pub exit_code: i32,
    pub auto_fix: Option<String>,
    /// 0.0 when no fix was proposed
    pub confidence: f64,
    pub suggestions: Vec<String>,
    pub can_retry: bool,
    pub analyzed_at: Timestamp,
}

/// Totals over the retained analysis history.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CorrectionStats {
    pub total_errors: usize,
    pub error_kinds: BTreeMap<String, usize>,
    pub auto_fixable: usize,
    pub auto_fixable_percent: f64,
    pub high_confidence: usize,
    pub high_confidence_percent: f64,
}

/// Final outcome of a command run with retries.
#[derive(Debug, Clone)]
pub struct RetryOutcome {
    /// Command of the last attempt
    pub command: String,
    pub output: CommandOutput,
    pub attempts: u32,
    pub history: Vec<RetryAttempt>,
}

/// Classifies command failures and retries them with proposed fixes.
///
/// Cloning shares the analysis history.
#[derive(Debug, Clone)]
pub struct RetryCorrector {
    max_retries: u32,
    confidence_threshold: f64,
    history_limit: usize,
    history: Arc<Mutex<VecDeque<ErrorAnalysis>>>,
}

impl Default for RetryCorrector {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}

impl RetryCorrector {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            confidence_threshold: config.confidence_threshold,
            history_limit: config.history_limit,
            history: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Runs `command` through `execute`, retrying with automatic fixes.
    ///
    /// Fixes are always derived from the original command, and a fix that
    /// was already tried is never run twice. At most `max_retries`
    /// executions happen in total.
    pub fn run<F>(&self, command: &str, mut execute: F) -> RetryOutcome
    where
        F: FnMut(&str) -> CommandOutput,
    {
        let mut current = command.to_string();
        let mut tried: HashSet<String> = HashSet::from([current.clone()]);
        let mut history = Vec::new();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let output = execute(&current);
            if output.success() {
                if attempts > 1 {
                    info!("`{current}` succeeded on attempt {attempts}");
                }
                return RetryOutcome {
                    command: current,
                    output,
                    attempts,
                    history,
                };
            }

            let error_text = output.error_text();
            let analysis = self.analyze(command, &error_text, output.exit_code);
            let next = analysis
                .auto_fix
                .clone()
                .filter(|_| analysis.can_retry && attempts < self.max_retries)
                .filter(|fix| !tried.contains(fix));

            history.push(RetryAttempt::new(
                attempts,
                current.as_str(),
                output.exit_code,
                &error_text,
                analysis.error_kind,
                analysis.confidence,
                next.clone(),
            ));

            match next {
                Some(fix) => {
                    info!(
                        "Retrying as `{fix}` ({}, confidence {:.2})",
                        analysis.error_kind.as_str(),
                        analysis.confidence
                    );
                    tried.insert(fix.clone());
                    current = fix;
                }
                None => {
                    return RetryOutcome {
                        command: current,
                        output,
                        attempts,
                        history,
                    }
                }
            }
        }
    }

    /// Classifies a failure and proposes a fix. The analysis is recorded.
    pub fn analyze(&self, command: &str, error_output: &str, exit_code: i32) -> ErrorAnalysis {
        let error_kind = classify(error_output);
        let details = extract_details(command, error_output, error_kind);
        let auto_fix = propose_fix(command, error_kind, &details);
        let confidence = if auto_fix.is_some() {
            error_kind.confidence()
        } else {
            0.0
        };

        let analysis = ErrorAnalysis {
            error_kind,
            details,
            original_command: command.to_string(),
            exit_code,
            can_retry: auto_fix.is_some() && confidence > self.confidence_threshold,
            auto_fix,
            confidence,
            suggestions: suggestions(error_kind)
                .iter()
                .map(|s| s.to_string())
                .collect(),
            analyzed_at: Timestamp::now(),
        };
        debug!(
            "Classified failure of `{command}` as {} (confidence {:.2})",
            error_kind.as_str(),
            confidence
        );

        let mut history = self.history.lock();
        history.push_back(analysis.clone());
        while history.len() > self.history_limit {
            history.pop_front();
        }
        analysis
    }

    pub fn last_analysis(&self) -> Option<ErrorAnalysis> {
        self.history.lock().back().cloned()
    }

    pub fn stats(&self) -> CorrectionStats {
        let history = self.history.lock();
        let total = history.len();
        if total == 0 {
            return CorrectionStats::default();
        }

        let mut stats = CorrectionStats {
            total_errors: total,
            ..Default::default()
        };
        for analysis in history.iter() {
            *stats
                .error_kinds
                .entry(analysis.error_kind.as_str().to_string())
                .or_default() += 1;
            if analysis.can_retry {
                stats.auto_fixable += 1;
            }
            if analysis.confidence > HIGH_CONFIDENCE {
                stats.high_confidence += 1;
            }
        }
        stats.auto_fixable_percent = percent(stats.auto_fixable, total);
        stats.high_confidence_percent = percent(stats.high_confidence, total);
        stats
    }
}

fn percent(part: usize, total: usize) -> f64 {
    (part as f64 / total as f64 * 1000.0).round() / 10.0
}

/// First matching kind in table order.
pub fn classify(error_output: &str) -> ErrorKind {
    PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(error_output))
        .map(|(kind, _)| *kind)
        .unwrap_or(ErrorKind::Unknown)
}

fn extract_details(command: &str, error_output: &str, kind: ErrorKind) -> ErrorDetails {
    let mut parts = command.split_whitespace();
    let mut details = ErrorDetails {
        command_name: parts.next().map(String::from),
        command_args: parts.map(String::from).collect(),
        ..Default::default()
    };

    let capture = |re: &Regex| {
        re.captures(error_output).and_then(|caps| {
            caps.iter()
                .skip(1)
                .flatten()
                .next()
                .map(|m| m.as_str().trim().to_string())
        })
    };

    match kind {
        ErrorKind::CommandNotFound => details.missing_command = capture(&MISSING_COMMAND_RE),
        ErrorKind::ModuleNotFound => details.missing_module = capture(&MISSING_MODULE_RE),
        ErrorKind::FileNotFound => details.missing_file = capture(&MISSING_FILE_RE),
        ErrorKind::PortInUse => {
            details.port = capture(&PORT_RE).and_then(|p| p.parse().ok());
        }
        _ => {}
    }
    details
}

fn propose_fix(command: &str, kind: ErrorKind, details: &ErrorDetails) -> Option<String> {
    let name = details.command_name.as_deref()?;
    let args = details.command_args.join(" ");
    let with_args = |program: &str| format!("{program} {args}").trim().to_string();

    if let Some((_, fixed)) = MISSPELLINGS.iter().find(|(typo, _)| *typo == name) {
        return Some(with_args(fixed));
    }

    match kind {
        ErrorKind::PermissionDenied if !command.trim_start().starts_with("sudo") => {
            Some(format!("sudo {command}"))
        }
        ErrorKind::ModuleNotFound => {
            let module = details.missing_module.as_deref()?;
            let package = module.split('.').next().unwrap_or(module);
            Some(format!("pip install {package} && {command}"))
        }
        ErrorKind::CommandNotFound => nearest_command(name).map(with_args),
        ErrorKind::FileNotFound if name == "python" || name == "python3" => {
            let script = details.command_args.first()?;
            if script.ends_with(".py") {
                return None;
            }
            Some(format!("{name} {script}.py {}", details.command_args[1..].join(" "))
                .trim()
                .to_string())
        }
        _ => None,
    }
}

/// Closest common command within a small edit distance, excluding exact matches.
fn nearest_command(name: &str) -> Option<&'static str> {
    COMMON_COMMANDS
        .iter()
        .map(|candidate| (*candidate, levenshtein(name, candidate)))
        .filter(|(_, distance)| (1..=MAX_EDIT_DISTANCE).contains(distance))
        .min_by_key(|(_, distance)| *distance)
        .map(|(candidate, _)| candidate)
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut current = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != *cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        previous = current;
    }
    previous[b.len()]
}

fn suggestions(kind: ErrorKind) -> &'static [&'static str] {
    match kind {
        ErrorKind::CommandNotFound => &[
            "Check the spelling of the command",
            "Check that the package providing it is installed",
            "Use the full path to the executable",
        ],
        ErrorKind::PermissionDenied => &[
            "Run with elevated privileges (sudo)",
            "Check file permissions (chmod)",
            "Check file ownership (chown)",
        ],
        ErrorKind::ModuleNotFound => &[
            "Install the module: pip install <module>",
            "Check the module name",
            "Activate the project's virtual environment",
        ],
        ErrorKind::FileNotFound => &[
            "Check the file path",
            "Create the file if it should exist",
            "Check the spelling of the file name",
        ],
        ErrorKind::ConnectionError => &[
            "Check network connectivity",
            "Check that the service is running",
            "Check firewall rules",
        ],
        ErrorKind::PortInUse => &[
            "Use a different port",
            "Stop the process holding the port",
            "Find the process with lsof or netstat",
        ],
        ErrorKind::SyntaxError | ErrorKind::Unknown => &[],
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    fn failing(stderr: &str) -> CommandOutput {
        CommandOutput {
            exit_code: 1,
            stderr: stderr.to_string(),
            ..Default::default()
        }
    }

    fn ok() -> CommandOutput {
        CommandOutput::default()
    }

    #[test]
    fn test_classification_order() {
        assert_eq!(classify("ModuleNotFoundError: No module named 'flask'"), ErrorKind::ModuleNotFound);
        assert_eq!(classify("bash: pyhton: command not found"), ErrorKind::CommandNotFound);
        assert_eq!(classify("sh: 1: foo: not found"), ErrorKind::CommandNotFound);
        assert_eq!(classify("mkdir: /root/x: Permission denied"), ErrorKind::PermissionDenied);
        assert_eq!(
            classify("python: can't open file 'app': [Errno 2] No such file or directory"),
            ErrorKind::FileNotFound
        );
        assert_eq!(classify("OSError: [Errno 98] Address already in use"), ErrorKind::PortInUse);
        assert_eq!(classify("SyntaxError: invalid syntax"), ErrorKind::SyntaxError);
        assert_eq!(classify("curl: (7) Connection refused"), ErrorKind::ConnectionError);
        assert_eq!(classify("segmentation fault"), ErrorKind::Unknown);
    }

    #[test]
    fn test_module_fix_installs_then_reruns() {
        let corrector = RetryCorrector::default();
        let analysis = corrector.analyze("python app.py", "No module named 'requests.adapters'", 1);

        assert_eq!(analysis.error_kind, ErrorKind::ModuleNotFound);
        assert_eq!(analysis.details.missing_module.as_deref(), Some("requests.adapters"));
        assert_eq!(
            analysis.auto_fix.as_deref(),
            Some("pip install requests && python app.py")
        );
        assert_eq!(analysis.confidence, 0.85);
        assert!(analysis.can_retry);
    }

    #[test]
    fn test_misspelling_table_wins() {
        let corrector = RetryCorrector::default();
        let analysis = corrector.analyze("pyhton app.py", "bash: pyhton: command not found", 127);

        assert_eq!(analysis.auto_fix.as_deref(), Some("python app.py"));
        assert_eq!(analysis.details.missing_command.as_deref(), Some("pyhton"));
        assert!(analysis.can_retry);
    }

    #[test]
    fn test_nearest_command_by_edit_distance() {
        let corrector = RetryCorrector::default();
        let analysis = corrector.analyze("mkdri build", "mkdri: command not found", 127);

        assert_eq!(analysis.auto_fix.as_deref(), Some("mkdir build"));
        assert_eq!(analysis.confidence, 0.7);
    }

    #[test]
    fn test_no_nearest_command_for_distant_names() {
        let corrector = RetryCorrector::default();
        let analysis = corrector.analyze("kubectl get pods", "kubectl: command not found", 127);

        assert!(analysis.auto_fix.is_none());
        assert_eq!(analysis.confidence, 0.0);
        assert!(!analysis.can_retry);
    }

    #[test]
    fn test_permission_fix_adds_sudo_once() {
        let corrector = RetryCorrector::default();
        assert_eq!(
            corrector
                .analyze("mkdir /opt/app", "Permission denied", 1)
                .auto_fix
                .as_deref(),
            Some("sudo mkdir /opt/app")
        );
        assert!(corrector
            .analyze("sudo mkdir /opt/app", "Permission denied", 1)
            .auto_fix
            .is_none());
    }

    #[test]
    fn test_python_script_gets_extension_but_stays_below_threshold() {
        let corrector = RetryCorrector::default();
        let analysis = corrector.analyze(
            "python app --debug",
            "python: can't open file 'app': [Errno 2] No such file or directory",
            2,
        );

        assert_eq!(analysis.auto_fix.as_deref(), Some("python app.py --debug"));
        assert_eq!(analysis.confidence, 0.6);
        assert!(!analysis.can_retry);
    }

    #[test]
    fn test_port_is_extracted() {
        let corrector = RetryCorrector::default();
        let analysis = corrector.analyze("npm start", "Error: port 3000 already in use", 1);

        assert_eq!(analysis.error_kind, ErrorKind::PortInUse);
        assert_eq!(analysis.details.port, Some(3000));
        assert!(analysis.auto_fix.is_none());
    }

    #[test]
    fn test_always_failing_module_retries_exactly_once() {
        let corrector = RetryCorrector::default();
        let executed = RefCell::new(Vec::new());

        let outcome = corrector.run("python main.py", |cmd| {
            executed.borrow_mut().push(cmd.to_string());
            failing("module not found: foo")
        });

        assert_eq!(outcome.attempts, 2);
        assert!(outcome.attempts <= 3);
        assert_eq!(
            executed.into_inner(),
            vec![
                "python main.py".to_string(),
                "pip install foo && python main.py".to_string()
            ]
        );
        assert_eq!(outcome.history.len(), 2);
        assert_eq!(
            outcome.history[0].auto_fix.as_deref(),
            Some("pip install foo && python main.py")
        );
        assert!(outcome.history[1].auto_fix.is_none());
        assert!(!outcome.output.success());
    }

    #[test]
    fn test_attempts_never_exceed_max_retries() {
        // Alternating failures keep proposing fixes that were not tried yet
        let run_with = |max_retries| {
            let corrector = RetryCorrector::new(&RetryConfig {
                max_retries,
                ..Default::default()
            });
            let mut calls = 0u32;
            let outcome = corrector.run("mkdir /opt/x", |_| {
                calls += 1;
                if calls % 2 == 1 {
                    failing("mkdir: /opt/x: Permission denied")
                } else {
                    failing("No module named 'foo'")
                }
            });
            (calls, outcome)
        };

        let (calls, outcome) = run_with(3);
        assert_eq!(calls, 3);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.history[0].auto_fix.as_deref(), Some("sudo mkdir /opt/x"));
        assert_eq!(
            outcome.history[1].auto_fix.as_deref(),
            Some("pip install foo && mkdir /opt/x")
        );
        assert!(outcome.history[2].auto_fix.is_none());

        let (calls, outcome) = run_with(2);
        assert_eq!(calls, 2);
        assert_eq!(outcome.attempts, 2);
    }

    #[test]
    fn test_success_short_circuits() {
        let corrector = RetryCorrector::default();
        let mut calls = 0;

        let outcome = corrector.run("gti status", |cmd| {
            calls += 1;
            if cmd == "git status" {
                ok()
            } else {
                failing("gti: command not found")
            }
        });

        assert!(outcome.output.success());
        assert_eq!(outcome.command, "git status");
        assert_eq!(outcome.attempts, 2);
        assert_eq!(calls, 2);
        assert_eq!(outcome.history.len(), 1);
    }

    #[test]
    fn test_unfixable_failure_runs_once() {
        let corrector = RetryCorrector::default();
        let outcome = corrector.run("false", |_| failing("something odd"));

        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.history.len(), 1);
        assert_eq!(outcome.history[0].error_kind, ErrorKind::Unknown);
    }

    #[test]
    fn test_history_is_bounded_and_counted() {
        let corrector = RetryCorrector::new(&RetryConfig {
            history_limit: 3,
            ..Default::default()
        });
        corrector.analyze("mkdir /x", "Permission denied", 1);
        corrector.analyze("ls", "weird", 1);
        corrector.analyze("gti", "gti: command not found", 127);
        corrector.analyze("ls", "still weird", 1);

        let stats = corrector.stats();
        assert_eq!(stats.total_errors, 3);
        assert_eq!(stats.error_kinds.get("unknown"), Some(&2));
        assert_eq!(stats.auto_fixable, 1);
        assert_eq!(stats.auto_fixable_percent, 33.3);
        assert_eq!(
            corrector.last_analysis().map(|a| a.original_command),
            Some("ls".to_string())
        );
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "ls"), 2);
        assert_eq!(levenshtein("git", "git"), 0);
    }
}
