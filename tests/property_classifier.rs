use proptest::prelude::*;
use udpqa::services::{classify, failing_cases, ClassifierInput};
use udpqa::{CrashCause, Verdict};

fn input<'a>(exit_code: Option<i32>, timed_out: bool, stdout: &'a str, stderr: &'a str) -> ClassifierInput<'a> {
    ClassifierInput {
        exit_code,
        timed_out,
        stdout,
        stderr,
        mock_crashed: false,
    }
}

proptest! {
    /// Property: classification is a pure function of its inputs
    #[test]
    fn prop_classification_is_deterministic(
        exit_code in proptest::option::of(-2i32..3),
        timed_out in any::<bool>(),
        stdout in ".{0,200}",
        stderr in ".{0,200}",
        mock_log in ".{0,200}"
    ) {
        let input = input(exit_code, timed_out, &stdout, &stderr);
        prop_assert_eq!(classify(&input, &mock_log), classify(&input, &mock_log));
    }

    /// Property: a timeout wins over anything the output says
    #[test]
    fn prop_timeout_dominates_output(
        exit_code in proptest::option::of(-2i32..3),
        stdout in ".{0,200}",
        stderr in ".{0,200}"
    ) {
        let input = input(exit_code, true, &stdout, &stderr);
        prop_assert_eq!(classify(&input, ""), Verdict::Timeout);
    }

    /// Property: a crashed mock wins over everything else
    #[test]
    fn prop_mock_crash_dominates(
        exit_code in proptest::option::of(-2i32..3),
        timed_out in any::<bool>(),
        stdout in ".{0,200}"
    ) {
        let mut input = input(exit_code, timed_out, &stdout, "");
        input.mock_crashed = true;
        prop_assert_eq!(
            classify(&input, ""),
            Verdict::Crash { cause: CrashCause::MockCrashed }
        );
    }

    /// Property: plain output with a zero exit is a pass
    #[test]
    fn prop_clean_output_with_zero_exit_passes(stdout in "[a-z ]{0,100}") {
        let input = input(Some(0), false, &stdout, "");
        prop_assert_eq!(classify(&input, ""), Verdict::Pass);
    }

    /// Property: failing cases are reported once each, in first-seen order
    #[test]
    fn prop_failing_cases_are_deduplicated(
        names in proptest::collection::vec("test_[a-z]{1,8}", 1..8)
    ) {
        let text: String = names
            .iter()
            .map(|name| format!("test {name} ... FAILED\n"))
            .collect();
        let cases = failing_cases(&text);

        let mut expected: Vec<String> = Vec::new();
        for name in &names {
            if !expected.contains(name) {
                expected.push(name.clone());
            }
        }
        prop_assert_eq!(cases, expected);
    }
}
