//! Verdict classification for a finished test run.
//!
//! Everything here is a pure function of its inputs: the same output text
//! and mock log always produce the same verdict.

use std::sync::LazyLock;

use regex::Regex;

use super::test_runner::TestOutcome;
use crate::domain::errors::SupervisorError;
use crate::domain::models::{CrashCause, Verdict};

/// Observations about one attempt that classification depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifierInput<'a> {
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub stdout: &'a str,
    pub stderr: &'a str,
    /// The mock exited on its own while the test was running
    pub mock_crashed: bool,
}

impl<'a> ClassifierInput<'a> {
    pub fn from_outcome(outcome: &'a TestOutcome, mock_crashed: bool) -> Self {
        Self {
            exit_code: outcome.exit_code,
            timed_out: outcome.timed_out,
            stdout: &outcome.stdout,
            stderr: &outcome.stderr,
            mock_crashed,
        }
    }
}

/// A framework marker that names the failing case.
struct CaseMarker {
    pattern: Regex,
    extract: fn(&regex::Captures<'_>) -> String,
}

fn group(caps: &regex::Captures<'_>, index: usize) -> String {
    caps.get(index).map_or_else(String::new, |m| m.as_str().trim().to_string())
}

static CASE_MARKERS: LazyLock<Vec<CaseMarker>> = LazyLock::new(|| {
    vec![
        // unittest: "FAIL: test_echo (test_mock.EchoTest)" or "(test_mock.EchoTest.test_echo)"
        CaseMarker {
            pattern: compile(r"(?m)^(?:FAIL|ERROR): (\S+) \(([^)]+)\)"),
            extract: |caps| {
                let method = group(caps, 1);
                let owner = group(caps, 2);
                if owner.ends_with(&format!(".{method}")) {
                    owner
                } else {
                    format!("{owner}.{method}")
                }
            },
        },
        // pytest short summary
        CaseMarker {
            pattern: compile(r"(?m)^(?:FAILED|ERROR) (\S+::\S+)"),
            extract: |caps| group(caps, 1),
        },
        // cargo test
        CaseMarker {
            pattern: compile(r"(?m)^test (\S+) \.\.\. FAILED"),
            extract: |caps| group(caps, 1),
        },
        // go test
        CaseMarker {
            pattern: compile(r"(?m)^\s*--- FAIL: (\S+)"),
            extract: |caps| group(caps, 1),
        },
        // TAP
        CaseMarker {
            pattern: compile(r"(?m)^not ok \d+(?: - )?(.*)$"),
            extract: |caps| group(caps, 1),
        },
    ]
});

/// Markers that show assertions ran and failed without naming a case.
static GENERIC_MARKERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        compile(r"(?m)^FAILED \((?:failures|errors)=\d+"),
        compile(r"\bAssertionError\b"),
        compile(r"assertion failed"),
        compile(r"(?m)^test result: FAILED\."),
    ]
});

/// Signatures of a mock process that died while serving.
static MOCK_CRASH_MARKERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        compile(r"Traceback \(most recent call last\)"),
        compile(r"panicked at"),
        compile(r"(?i)segmentation fault"),
    ]
});

#[allow(clippy::expect_used)]
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("classifier patterns are valid")
}

/// Failing case identifiers found in `text`, in order of first appearance.
pub fn failing_cases(text: &str) -> Vec<String> {
    let mut found: Vec<(usize, String)> = CASE_MARKERS
        .iter()
        .flat_map(|marker| {
            marker
                .pattern
                .captures_iter(text)
                .filter_map(|caps| {
                    let start = caps.get(0)?.start();
                    let id = (marker.extract)(&caps);
                    (!id.is_empty()).then_some((start, id))
                })
                .collect::<Vec<_>>()
        })
        .collect();
    found.sort_by_key(|(start, _)| *start);

    let mut cases: Vec<String> = Vec::with_capacity(found.len());
    for (_, id) in found {
        if !cases.contains(&id) {
            cases.push(id);
        }
    }
    cases
}

fn has_generic_marker(text: &str) -> bool {
    GENERIC_MARKERS.iter().any(|pattern| pattern.is_match(text))
}

fn mock_log_shows_crash(mock_log: &str) -> bool {
    MOCK_CRASH_MARKERS.iter().any(|pattern| pattern.is_match(mock_log))
}

/// Classify a finished test run.
///
/// Precedence: a crashed mock, then a runner timeout, then framework
/// failure markers, then a clean exit. Anything left is a crash, blamed
/// on the mock if its log carries a crash signature.
pub fn classify(input: &ClassifierInput<'_>, mock_log: &str) -> Verdict {
    if input.mock_crashed {
        return Verdict::Crash {
            cause: CrashCause::MockCrashed,
        };
    }
    if input.timed_out {
        return Verdict::Timeout;
    }

    let mut failing = failing_cases(input.stdout);
    for case in failing_cases(input.stderr) {
        if !failing.contains(&case) {
            failing.push(case);
        }
    }
    if !failing.is_empty() || has_generic_marker(input.stdout) || has_generic_marker(input.stderr) {
        return Verdict::AssertionFailure {
            failing_cases: failing,
        };
    }

    if input.exit_code == Some(0) {
        return Verdict::Pass;
    }

    let cause = if mock_log_shows_crash(mock_log) {
        CrashCause::MockCrashed
    } else {
        CrashCause::TestErrored
    };
    Verdict::Crash { cause }
}

/// Verdict for an attempt whose mock never became ready.
pub fn classify_readiness_failure(err: &SupervisorError) -> Verdict {
    let cause = match err {
        SupervisorError::ReadinessTimeout { .. } => CrashCause::ReadinessTimeout,
        SupervisorError::ExitedBeforeReady { .. } => CrashCause::MockExitedBeforeReady,
        SupervisorError::Spawn { .. } | SupervisorError::Capture(_) => CrashCause::MockCrashed,
    };
    Verdict::Crash { cause }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(exit_code: Option<i32>, stdout: &'a str, stderr: &'a str) -> ClassifierInput<'a> {
        ClassifierInput {
            exit_code,
            timed_out: false,
            stdout,
            stderr,
            mock_crashed: false,
        }
    }

    #[test]
    fn test_clean_exit_is_pass() {
        let stderr = "..\n----------------------------------------------------------------------\nRan 2 tests in 0.01s\n\nOK\n";
        assert_eq!(classify(&input(Some(0), "", stderr), ""), Verdict::Pass);
    }

    #[test]
    fn test_unittest_failure_extracts_cases() {
        let stderr = "\
F.E
======================================================================
FAIL: test_echo (test_mock.EchoTest.test_echo)
----------------------------------------------------------------------
AssertionError: b'' != b'ping'
======================================================================
ERROR: test_burst (test_mock.EchoTest)
----------------------------------------------------------------------
FAILED (failures=1, errors=1)
";
        assert_eq!(
            classify(&input(Some(1), "", stderr), ""),
            Verdict::AssertionFailure {
                failing_cases: vec![
                    "test_mock.EchoTest.test_echo".to_string(),
                    "test_mock.EchoTest.test_burst".to_string(),
                ],
            }
        );
    }

    #[test]
    fn test_pytest_and_cargo_markers() {
        let stdout = "FAILED tests/test_udp.py::test_oversized - assert 0 == 1\n";
        assert_eq!(failing_cases(stdout), vec!["tests/test_udp.py::test_oversized"]);

        let stdout = "test udp::echo ... FAILED\ntest udp::burst ... ok\ntest udp::echo ... FAILED\n";
        assert_eq!(failing_cases(stdout), vec!["udp::echo"]);
    }

    #[test]
    fn test_generic_marker_without_case_ids() {
        let verdict = classify(&input(Some(1), "", "AssertionError: mismatch\n"), "");
        assert_eq!(
            verdict,
            Verdict::AssertionFailure {
                failing_cases: vec![]
            }
        );
    }

    #[test]
    fn test_markers_override_zero_exit() {
        let verdict = classify(&input(Some(0), "--- FAIL: TestEcho (0.00s)\n", ""), "");
        assert!(matches!(verdict, Verdict::AssertionFailure { .. }));
    }

    #[test]
    fn test_nonzero_without_markers_is_test_crash() {
        let stderr = "Traceback (most recent call last):\n  File \"t.py\", line 1\nNameError: x\n";
        assert_eq!(
            classify(&input(Some(1), "", stderr), "READY\n"),
            Verdict::Crash {
                cause: CrashCause::TestErrored
            }
        );
    }

    #[test]
    fn test_mock_log_crash_signature_blames_mock() {
        let mock_log = "READY\n[stderr] Traceback (most recent call last):\n";
        assert_eq!(
            classify(&input(Some(1), "", "timed out waiting for reply"), mock_log),
            Verdict::Crash {
                cause: CrashCause::MockCrashed
            }
        );
    }

    #[test]
    fn test_crashed_mock_and_timeout_take_precedence() {
        let mut crashed = input(Some(0), "", "");
        crashed.mock_crashed = true;
        crashed.timed_out = true;
        assert_eq!(
            classify(&crashed, ""),
            Verdict::Crash {
                cause: CrashCause::MockCrashed
            }
        );

        let mut timed_out = input(None, "FAIL: a (b)", "");
        timed_out.timed_out = true;
        assert_eq!(classify(&timed_out, ""), Verdict::Timeout);
    }

    #[test]
    fn test_readiness_failures() {
        assert_eq!(
            classify_readiness_failure(&SupervisorError::ReadinessTimeout { timeout_ms: 500 }),
            Verdict::Crash {
                cause: CrashCause::ReadinessTimeout
            }
        );
        assert_eq!(
            classify_readiness_failure(&SupervisorError::ExitedBeforeReady { exit_code: Some(2) }),
            Verdict::Crash {
                cause: CrashCause::MockExitedBeforeReady
            }
        );
    }
}
