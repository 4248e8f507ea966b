//! CLI integration tests using assert_cmd.

use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn saqeval() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("saqeval").unwrap()
}

/// Offline config: hints and explanations are matched first, then grading by answer.
const MOCK_CONFIG: &str = r#"
default_provider = "mock"
default_model = "mock-model"

[providers.mock]
type = "mock"
default_response = '{"correctness": 0.1, "feedback_category": "incorrect", "reasoning": "off topic"}'
responses = [
    { when = "Socratic", reply = "Good start! What else does the plant need?" },
    { when = "expert tutor", reply = "Plants turn light into chemical energy." },
    { when = "<student_answer>\nsunlight\n</student_answer>", reply = '{"correctness": 0.6, "feedback_category": "partially_correct", "reasoning": "missing inputs"}' },
    { when = "<student_answer>\nplants use sunlight and water to make sugar\n</student_answer>", reply = '{"correctness": 0.95, "feedback_category": "correct", "reasoning": "complete"}' },
]
"#;

/// Points at a closed port so every call fails fast.
const UNREACHABLE_CONFIG: &str = r#"
default_provider = "ollama"
default_model = "llama3.1:8b"
max_retries = 0
retry_delay_ms = 0
judgment_timeout_secs = 5

[providers.ollama]
type = "ollama"
base_url = "http://127.0.0.1:9"
"#;

const BANK: &str = r#"
[bank]
id = "bio"
name = "Biology"

[[questions]]
id = "q1"
text = "What is photosynthesis?"
ideal_answer = "Plants use sunlight and water to make sugar."

[[questions]]
id = "q2"
type = "mcq"
text = "Which organelle holds the DNA?"
options = [
    { text = "Nucleus", correct = true },
    { text = "Ribosome" },
]
"#;

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn init_creates_files() {
    let dir = TempDir::new().unwrap();

    saqeval()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created saqeval.toml"))
        .stdout(predicate::str::contains(
            "Created question-banks/example.toml",
        ));

    assert!(dir.path().join("saqeval.toml").exists());
    assert!(dir.path().join("question-banks/example.toml").exists());
}

#[test]
fn init_skips_existing() {
    let dir = TempDir::new().unwrap();

    saqeval()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();

    saqeval()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn init_output_validates() {
    let dir = TempDir::new().unwrap();

    saqeval()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();

    saqeval()
        .current_dir(dir.path())
        .args(["validate", "--bank", "question-banks/example.toml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("3 questions"))
        .stdout(predicate::str::contains("All question banks valid"));
}

#[test]
fn validate_reports_warnings() {
    let dir = TempDir::new().unwrap();
    let bank = write(
        &dir,
        "broken.toml",
        r#"
[bank]
id = "b"
name = "Broken"

[[questions]]
id = "q1"
text = "What is photosynthesis?"

[[questions]]
id = "q2"
type = "mcq"
text = "Pick one"
options = [{ text = "A" }, { text = "B" }]
"#,
    );

    saqeval()
        .args(["validate", "--bank"])
        .arg(&bank)
        .assert()
        .success()
        .stdout(predicate::str::contains("[q1] WARNING"))
        .stdout(predicate::str::contains("0 correct options"))
        .stdout(predicate::str::contains("2 warning(s) found"));
}

#[test]
fn validate_nonexistent_file() {
    saqeval()
        .args(["validate", "--bank", "nonexistent.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn evaluate_partial_answer_grants_retry() {
    let dir = TempDir::new().unwrap();
    let config = write(&dir, "saqeval.toml", MOCK_CONFIG);

    let output = saqeval()
        .arg("--config")
        .arg(&config)
        .args([
            "evaluate",
            "--question",
            "What is photosynthesis?",
            "--reference",
            "Plants use sunlight and water to make sugar.",
            "--answer",
            "sunlight",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let outcome: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(outcome["advance"], false);
    assert_eq!(outcome["is_correct"], false);
    assert_eq!(outcome["fallback_used"], false);
    assert_eq!(outcome["feedback"]["evaluation"], "partially_correct");
    assert_eq!(outcome["feedback"]["requires_retry"], true);
    assert_eq!(
        outcome["feedback"]["explanation_or_hint"],
        "Good start! What else does the plant need?"
    );
}

#[test]
fn evaluate_falls_back_when_backend_unreachable() {
    let dir = TempDir::new().unwrap();
    let config = write(&dir, "saqeval.toml", UNREACHABLE_CONFIG);

    let output = saqeval()
        .arg("--config")
        .arg(&config)
        .args([
            "evaluate",
            "--question",
            "What is the capital of France?",
            "--reference",
            "Paris",
            "--answer",
            "paris",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let outcome: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(outcome["fallback_used"], true);
    assert_eq!(outcome["advance"], true);
    assert_eq!(outcome["is_correct"], true);
    assert_eq!(outcome["feedback"]["requires_retry"], false);
    assert!(outcome["correctness"].is_null());
}

#[test]
fn evaluate_rejects_empty_answer() {
    let dir = TempDir::new().unwrap();
    let config = write(&dir, "saqeval.toml", MOCK_CONFIG);

    saqeval()
        .arg("--config")
        .arg(&config)
        .args([
            "evaluate",
            "--question",
            "What is photosynthesis?",
            "--reference",
            "Plants make sugar.",
            "--answer",
            "   ",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("candidate answer is empty"));
}

#[test]
fn evaluate_unknown_provider() {
    let dir = TempDir::new().unwrap();
    let config = write(&dir, "saqeval.toml", MOCK_CONFIG);

    saqeval()
        .arg("--config")
        .arg(&config)
        .args([
            "evaluate",
            "--provider",
            "nope",
            "--question",
            "Q",
            "--reference",
            "R",
            "--answer",
            "A",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("provider 'nope' is not configured"));
}

#[test]
fn quiz_runs_to_completion_with_retry() {
    let dir = TempDir::new().unwrap();
    let config = write(&dir, "saqeval.toml", MOCK_CONFIG);
    let bank = write(&dir, "bio.toml", BANK);
    let report = dir.path().join("out/report.json");

    saqeval()
        .arg("--config")
        .arg(&config)
        .args(["quiz", "--bank"])
        .arg(&bank)
        .arg("--report")
        .arg(&report)
        .write_stdin("sunlight\nplants use sunlight and water to make sugar\n1\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Hint: Good start!"))
        .stdout(predicate::str::contains("Try again."))
        .stdout(predicate::str::contains("Quiz Complete! Your score: 2/2"));

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(saved["score"], 2);
    assert_eq!(saved["total_questions_answered"], 2);
    // Only the short-answer submissions go through the engine.
    assert_eq!(saved["audits"].as_array().unwrap().len(), 2);
    assert_eq!(saved["stats"]["retries_granted"], 1);
}

#[test]
fn quiz_ends_early_on_closed_input() {
    let dir = TempDir::new().unwrap();
    let config = write(&dir, "saqeval.toml", MOCK_CONFIG);
    let bank = write(&dir, "bio.toml", BANK);

    saqeval()
        .arg("--config")
        .arg(&config)
        .args(["quiz", "--bank"])
        .arg(&bank)
        .write_stdin("\nsomething unrelated\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Please enter an answer."))
        .stdout(predicate::str::contains("Which organelle holds the DNA?"))
        .stderr(predicate::str::contains("ending quiz early"));
}

#[test]
fn batch_keeps_input_order() {
    let dir = TempDir::new().unwrap();
    let config = write(&dir, "saqeval.toml", MOCK_CONFIG);
    let submissions = write(
        &dir,
        "submissions.jsonl",
        concat!(
            r#"{"question_text":"What is photosynthesis?","ideal_answer":"Plants use sunlight and water to make sugar.","student_answer":"sunlight","question_id":"q1","session_id":"s1"}"#,
            "\n",
            r#"{"question_text":"What is photosynthesis?","ideal_answer":"Plants use sunlight and water to make sugar.","student_answer":"","question_id":"q1","session_id":"s2"}"#,
            "\n\n",
            r#"{"question_text":"What is photosynthesis?","ideal_answer":"Plants use sunlight and water to make sugar.","student_answer":"sunlight","question_id":"q1","session_id":"s1"}"#,
            "\n",
        ),
    );

    let output = saqeval()
        .arg("--config")
        .arg(&config)
        .args(["batch", "--submissions"])
        .arg(&submissions)
        .output()
        .unwrap();
    assert!(output.status.success());

    let lines: Vec<serde_json::Value> = String::from_utf8(output.stdout)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);

    assert_eq!(lines[0]["session_id"], "s1");
    assert_eq!(lines[0]["outcome"]["advance"], false);
    assert_eq!(lines[1]["session_id"], "s2");
    assert!(lines[1]["error"].as_str().unwrap().contains("empty"));
    // Second partial answer on the same question exhausts the retry.
    assert_eq!(lines[2]["outcome"]["advance"], true);
    assert_eq!(lines[2]["outcome"]["attempt"], 2);
    assert_eq!(lines[2]["outcome"]["feedback"]["requires_retry"], false);
    let closing = lines[2]["outcome"]["feedback"]["explanation_or_hint"]
        .as_str()
        .unwrap();
    assert!(closing.starts_with("Plants turn light into chemical energy."));
}

#[test]
fn batch_rejects_malformed_line() {
    let dir = TempDir::new().unwrap();
    let config = write(&dir, "saqeval.toml", MOCK_CONFIG);
    let submissions = write(&dir, "submissions.jsonl", "{not json}\n");

    saqeval()
        .arg("--config")
        .arg(&config)
        .args(["batch", "--submissions"])
        .arg(&submissions)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid submission on line 1"));
}

#[test]
fn risk_summarizes_sessions() {
    let dir = TempDir::new().unwrap();
    let events = write(
        &dir,
        "events.jsonl",
        concat!(
            r#"{"session_id":"s1","event_type":"PASTE_DETECTED","timestamp":1700000000000}"#,
            "\n",
            r#"{"session_id":"s1","event_type":"PASTE_DETECTED","timestamp":1700000001000}"#,
            "\n",
            r#"{"session_id":"s2","event_type":"TAB_FOCUSED","timestamp":1700000002000}"#,
            "\n",
        ),
    );

    saqeval()
        .args(["risk", "--events"])
        .arg(&events)
        .assert()
        .success()
        .stdout(predicate::str::contains("s1"))
        .stdout(predicate::str::contains("high"))
        .stdout(predicate::str::contains("PASTE_DETECTED=2"));

    let output = saqeval()
        .args(["risk", "--format", "json", "--events"])
        .arg(&events)
        .output()
        .unwrap();
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["s1"]["score"], 6);
    assert_eq!(summary["s2"]["level"], "low");
}

#[test]
fn list_models_for_mock_provider() {
    let dir = TempDir::new().unwrap();
    let config = write(&dir, "saqeval.toml", MOCK_CONFIG);

    saqeval()
        .arg("--config")
        .arg(&config)
        .args(["list-models", "--provider", "mock"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mock-model"));
}

#[test]
fn help_output() {
    saqeval()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("short-answer quizzes"));
}

#[test]
fn version_output() {
    saqeval()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("saqeval"));
}
