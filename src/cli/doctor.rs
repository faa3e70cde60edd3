//! CLI `doctor` command: check configuration and dry-load the policy folder.

use anyhow::Result;

use pcheck::config::{self, PolicyConfig};
use pcheck::policy::{DirectoryStore, PolicySource};

/// Print a configuration and load report. Makes no embedding calls.
pub fn doctor(config: &PolicyConfig) -> Result<()> {
    println!("pcheck Health Report");
    println!("====================");
    println!();

    println!("Configuration:");
    let required = [
        (config::ENV_API_KEY, config.embedding.api_key.as_str()),
        (config::ENV_ENDPOINT, config.embedding.endpoint.as_str()),
        (config::ENV_DEPLOYMENT, config.embedding.deployment.as_str()),
        (config::ENV_DATA_DIR, config.policies.data_dir.as_str()),
    ];
    for (key, value) in required {
        let state = if config::require(key, value).is_ok() {
            "set"
        } else {
            "MISSING"
        };
        println!("  {key:<38} {state}");
    }
    if let Err(e) = config.validate() {
        println!("  Status: INVALID ({e})");
    } else {
        println!("  Status: OK");
    }
    println!();

    let data_dir = config.resolved_data_dir();
    println!("Policy folder:     {}", data_dir.display());
    println!("Strict parsing:    {}", config.policies.strict_parsing);
    println!("Strict embedding:  {}", config.policies.strict_embedding);

    let store = DirectoryStore::new(&data_dir, config.policies.strict_parsing);
    match store.load() {
        Ok(report) => {
            println!("Load:              OK ({} policies)", report.policies.len());
            if !report.warnings.is_empty() {
                println!();
                println!("Skipped files ({}):", report.warnings.len());
                for warning in &report.warnings {
                    println!("  {}: {}", warning.path.display(), warning.reason);
                }
            }
        }
        Err(e) => {
            println!("Load:              FAILED");
            println!("  {e}");
        }
    }

    Ok(())
}
