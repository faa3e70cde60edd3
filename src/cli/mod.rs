pub mod doctor;
pub mod list;
pub mod search;

use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use crate::server::{setup_shared_state, SharedState};
use pcheck::config::PolicyConfig;

/// Build shared state and run the load + embed pass behind a spinner.
pub async fn ready_state(config: &PolicyConfig) -> Result<SharedState> {
    let state = setup_shared_state(config.clone())?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {spinner} {msg} ({elapsed})")
            .context("invalid spinner template")?,
    );
    pb.set_message(format!(
        "Loading and embedding policies from {}",
        config.resolved_data_dir().display()
    ));
    pb.enable_steady_tick(Duration::from_millis(100));

    let outcome = state.repository.initialize().await;
    pb.finish_and_clear();
    outcome.context("failed to initialize policy repository")?;

    Ok(state)
}

/// First `max_chars` characters of `text` on one line, with an ellipsis when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > max_chars {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{cut}...")
    } else {
        flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_flattens_and_truncates() {
        assert_eq!(preview("a\n  b\tc", 10), "a b c");
        assert_eq!(preview("abcdefgh", 3), "abc...");
        assert_eq!(preview("ünïcödé", 3), "ünï...");
    }
}
