use anyhow::{Context, Result};
use modbuild_core::plugins::ResolverPlugin;
use tracing::debug;

use crate::cli::GlobalArgs;
use crate::project::Project;

pub fn modules_command(global: &GlobalArgs, test: bool) -> Result<()> {
    let mut project = Project::load(global)?;
    let tree = project.configure()?;

    let resolver = ResolverPlugin::new(project.toolbox.clone());
    let resolution = resolver
        .check(&tree.view(), test)
        .context("Failed to resolve modules")?;
    debug!("Resolved {} modules", resolution.reachable().len());

    println!("Reachable modules:");
    for name in resolution.reachable() {
        println!("  {}", name);
    }
    if resolution.is_success() {
        return Ok(());
    }

    println!("Unresolved modules:");
    for (name, chain) in resolution.unresolved() {
        println!("  {}: {}", name, chain);
    }
    std::process::exit(1);
}
