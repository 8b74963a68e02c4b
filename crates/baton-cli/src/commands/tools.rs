use anyhow::{Context, Result};
use baton::config::SandboxSettings;
use baton::sandbox::{builtin_registry, BUILTIN_TOOLS};

pub fn execute() -> Result<()> {
    let registry = builtin_registry(&SandboxSettings::default())
        .context("Failed to set up the sandbox tools")?;

    let specs: Vec<_> = BUILTIN_TOOLS
        .iter()
        .filter_map(|name| registry.describe(name))
        .collect();
    println!("{}", serde_json::to_string_pretty(&specs)?);
    Ok(())
}
