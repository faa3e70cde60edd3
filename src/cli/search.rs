use anyhow::Result;

use super::{preview, ready_state};
use pcheck::config::PolicyConfig;

/// Match free text against the policy folder and print ranked results.
pub async fn search(
    config: &PolicyConfig,
    query: &str,
    k: Option<usize>,
    min_score: Option<f64>,
) -> Result<()> {
    let state = ready_state(config).await?;

    let k = k.unwrap_or(config.matching.default_k);
    let min_score = min_score.unwrap_or(config.matching.default_min_score);

    let results = state.matcher.match_policies(query, k, min_score).await?;

    if results.is_empty() {
        println!("No policies scored at or above {min_score:.2}.");
        return Ok(());
    }

    println!("Found {} matching policy(ies)\n", results.len());

    for (i, result) in results.iter().enumerate() {
        println!(
            "  {}. {} [{}] (score: {:.4})",
            i + 1,
            result.policy.title,
            result.policy.id,
            result.score,
        );
        println!("     {}", preview(&result.policy.body, 120));
        println!();
    }

    state.repository.shutdown();
    Ok(())
}
