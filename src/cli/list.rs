//! CLI `list` and `show` commands.

use anyhow::Result;

use super::{preview, ready_state};
use pcheck::config::PolicyConfig;

/// Print every policy in load order, flagging those without an embedding.
pub async fn list(config: &PolicyConfig) -> Result<()> {
    let state = ready_state(config).await?;
    let policies = state.repository.all()?;

    println!("Policies ({})", policies.len());
    println!("{}", "=".repeat(40));
    for policy in policies {
        let marker = if policy.is_embedded() { " " } else { "!" };
        println!("  {marker} {:<24} {}", policy.id, preview(&policy.title, 60));
    }

    let status = state.repository.status();
    if !status.embedding_failures.is_empty() {
        println!();
        println!("! = not embedded; excluded from matching:");
        for failure in &status.embedding_failures {
            println!("  {}: {}", failure.policy_id, failure.reason);
        }
    }

    state.repository.shutdown();
    Ok(())
}

/// Print a single policy in full.
pub async fn show(config: &PolicyConfig, id: &str) -> Result<()> {
    let state = ready_state(config).await?;
    let policy = state.repository.find_by_id(id)?;

    println!("Policy: {}", policy.id);
    println!("{}", "=".repeat(50));
    println!("  Title:      {}", policy.title);
    println!("  Source:     {}", policy.source.display());
    if let Some(modified) = policy.modified {
        println!("  Modified:   {}", modified.to_rfc3339());
    }
    match policy.embedding() {
        Some(embedding) => println!("  Embedding:  {} dimensions", embedding.dimensions()),
        None => println!("  Embedding:  none (excluded from matching)"),
    }
    println!();
    println!("{}", policy.body);

    state.repository.shutdown();
    Ok(())
}
