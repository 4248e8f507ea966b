//! The `saqeval init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    if std::path::Path::new("saqeval.toml").exists() {
        println!("saqeval.toml already exists, skipping.");
    } else {
        std::fs::write("saqeval.toml", SAMPLE_CONFIG)?;
        println!("Created saqeval.toml");
    }

    std::fs::create_dir_all("question-banks")?;
    let example_path = std::path::Path::new("question-banks/example.toml");
    if example_path.exists() {
        println!("question-banks/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_BANK)?;
        println!("Created question-banks/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Edit saqeval.toml with your API keys");
    println!("  2. Run: saqeval validate --bank question-banks/example.toml");
    println!("  3. Run: saqeval quiz --bank question-banks/example.toml");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# saqeval configuration

default_provider = "openai"
default_model = "gpt-4o-mini"
# Sampling temperature for grading; hints and explanations use feedback_temperature.
temperature = 0.1
feedback_temperature = 0.3
judgment_timeout_secs = 30
max_retries = 2
retry_delay_ms = 500
# "model_asserted" keeps the model's category, "score_bands" derives it from the score.
category_policy = "model_asserted"
parallelism = 4

[providers.openai]
type = "openai"
api_key = "${OPENAI_API_KEY}"

[providers.anthropic]
type = "anthropic"
api_key = "${ANTHROPIC_API_KEY}"

[providers.ollama]
type = "ollama"
base_url = "http://localhost:11434"

# Offline provider for trying things out without an API key.
[providers.mock]
type = "mock"
default_response = '{"correctness": 0.5, "feedback_category": "partially_correct", "reasoning": "offline"}'
"#;

const EXAMPLE_BANK: &str = r#"[bank]
id = "example"
name = "Example Question Bank"

[[questions]]
id = "photosynthesis"
text = "What is photosynthesis?"
ideal_answer = "The process by which plants convert light energy, water and carbon dioxide into glucose and oxygen."
page = 1

[[questions]]
id = "mitochondria"
text = "What is the main function of the mitochondria?"
ideal_answer = "Producing energy for the cell in the form of ATP."
page = 2

[[questions]]
id = "organelle"
type = "mcq"
text = "Which organelle contains the cell's genetic material?"
options = [
    { text = "Nucleus", correct = true },
    { text = "Ribosome" },
    { text = "Golgi apparatus" },
]
page = 3
"#;
