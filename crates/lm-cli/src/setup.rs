use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::Config;

pub const CONFIG_TEMPLATE: &str = r#"# learnmate configuration
#
# Every key can be overridden from the environment with a LEARNMATE_ prefix,
# nested keys joined by a double underscore:
#   LEARNMATE_TOKEN, LEARNMATE_BASE_URL, LEARNMATE_DISPLAY__SHOW_THINKING

# Backend root URL
base_url = "http://localhost:8000"

# Bearer token for authenticated endpoints. Prefer token_file or the
# LEARNMATE_TOKEN environment variable over storing it here.
# token = "eyJ..."
# token_file = "~/.config/learnmate/token"

# Seconds to wait for the backend to start answering
timeout_secs = 60

[display]
# Print the model's reasoning above the answer
show_thinking = true
# Dim the reasoning when writing to a terminal
color = true

[splitter]
# Strip leading whitespace from the start of the reasoning and the answer
trim_leading_whitespace = true
"#;

pub fn run() -> Result<()> {
    let config_path = Config::config_path()?;
    let config_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;

    if config_path.exists() {
        println!("Existing config file found:");
        println!("  {}", config_path.display());
        print!("\nOverwrite? (Existing file will be backed up) [y/N] ");

        // Flush stdout so the prompt appears before reading
        use std::io::Write;
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Setup cancelled.");
            return Ok(());
        }

        let backup = backup_file(&config_path)?;
        println!("  Backed up to {}", backup.display());
    }

    write_template(&config_path)?;
    println!("Created {}", config_path.display());

    println!("\nNext steps:");
    println!("  1. Set your token:    export LEARNMATE_TOKEN=\"...\"");
    println!("  2. Check the backend: lm health");
    println!("  3. Ask something:     lm ask <conversation-id> \"hello\"");

    Ok(())
}

fn write_template(path: &Path) -> Result<()> {
    std::fs::write(path, CONFIG_TEMPLATE)
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Back up a file to <name>.bak, appending a timestamp if .bak already exists.
fn backup_file(path: &Path) -> Result<PathBuf> {
    let mut backup = path.with_extension("toml.bak");

    if backup.exists() {
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let name = format!("toml.bak.{}", timestamp);
        backup = path.with_extension(name);
    }

    std::fs::rename(path, &backup)
        .with_context(|| format!("Failed to back up {} to {}", path.display(), backup.display()))?;

    Ok(backup)
}
