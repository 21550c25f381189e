//! Prompt text for text-completion oracles.

use std::fmt::Write;

use super::response::{MOCK_MARKER, NO_CHANGE_MARKER, TEST_MARKER};
use crate::domain::ports::{EdgeCaseContext, RepairContext};

fn push_section(prompt: &mut String, title: &str, body: &str) {
    let _ = write!(prompt, "\n## {title}\n```\n{}\n```\n", body.trim_end());
}

/// Prompt asking for replacement artifacts after a failed attempt.
pub fn repair_prompt(context: &RepairContext) -> String {
    let service = &context.service;
    let attempt = &context.attempt;

    let mut prompt = format!(
        "A mock UDP service and its test suite disagree. Service '{}' declared port {}; \
         attempt {} ran against port {} and was classified as {}.\n",
        service.id, service.port, attempt.number, attempt.port, attempt.verdict
    );
    if !service.description.is_empty() {
        let _ = writeln!(prompt, "\nService description:\n{}", service.description);
    }
    let exit = attempt
        .exit_code
        .map_or_else(|| "none (killed or never ran)".to_string(), |code| code.to_string());
    let _ = writeln!(prompt, "\nTest exit code: {exit}");

    push_section(&mut prompt, "Current mock artifact", &context.mock_artifact);
    push_section(&mut prompt, "Current test artifact", &context.test_artifact);
    push_section(&mut prompt, "Test stdout", &attempt.stdout);
    push_section(&mut prompt, "Test stderr", &attempt.stderr);
    push_section(&mut prompt, "Mock log", &context.mock_log);

    let _ = write!(
        prompt,
        "\nDecide which artifact is wrong and reply with the complete replacement. \
         Use a line '{MOCK_MARKER}' followed by the full new mock, and/or a line \
         '{TEST_MARKER}' followed by the full new test. Omit an artifact that should \
         stay unchanged. Reply '{NO_CHANGE_MARKER}' if neither should change.\n"
    );
    prompt
}

/// Prompt asking for edge-case scenarios for a converged service.
pub fn edge_case_prompt(context: &EdgeCaseContext) -> String {
    let mut prompt = format!(
        "The mock UDP service '{}' (port {}) passes its test suite. Suggest edge-case \
         scenarios such as malformed payload, oversized payload, rapid burst, and \
         send-to-closed-port.\n",
        context.service.id, context.service.port
    );
    push_section(&mut prompt, "Mock artifact", &context.mock_artifact);
    push_section(&mut prompt, "Test artifact", &context.test_artifact);
    prompt.push_str(
        "\nReply with a JSON array only. Each element is an object with a short \"name\", \
         a \"test_artifact\" holding a complete test for that scenario, and optionally a \
         \"mock_artifact\" if the mock must change to handle it.\n",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        MockState, RepairOutcome, RunAttempt, ServiceSpec, Verdict,
    };
    use chrono::Utc;

    #[test]
    fn test_repair_prompt_carries_failure_context() {
        let context = RepairContext {
            service: ServiceSpec::new("echo", 9999, "m.py", "t.py").with_description("echoes datagrams"),
            mock_artifact: "MOCK-BODY".to_string(),
            test_artifact: "TEST-BODY".to_string(),
            attempt: RunAttempt {
                number: 2,
                port: 40001,
                exit_code: Some(1),
                stdout: String::new(),
                stderr: "FAIL: test_echo (t.EchoTest)".to_string(),
                mock_log: "READY".to_string(),
                elapsed_ms: 12,
                verdict: Verdict::AssertionFailure {
                    failing_cases: vec!["t.EchoTest.test_echo".to_string()],
                },
                test_ran: true,
                mock_started_at: Utc::now(),
                mock_stopped_at: Utc::now(),
                mock_final_state: MockState::Stopped,
                repair: RepairOutcome::NotAttempted,
            },
            mock_log: "READY".to_string(),
        };

        let prompt = repair_prompt(&context);
        for needle in ["echoes datagrams", "MOCK-BODY", "TEST-BODY", "FAIL: test_echo", "port 40001", MOCK_MARKER] {
            assert!(prompt.contains(needle), "prompt missing {needle}");
        }
    }
}
