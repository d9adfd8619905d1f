use anyhow::{Context, Result};
use modbuild_core::config::ConfigTree;
use tracing::{debug, info};

use crate::cli::GlobalArgs;
use crate::project::Project;

pub fn build_command(global: &GlobalArgs, plugins: Vec<String>) -> Result<()> {
    let mut project = Project::load(global)?;
    debug!("Building {} with {:?}", project.dir.display(), plugins);

    let code = project
        .pipeline
        .run(&mut ConfigTree::new(), &project.settings, &plugins)
        .with_context(|| format!("Failed to run {}", plugins.join(" ")))?;

    if code != 0 {
        std::process::exit(code);
    }
    info!("Build finished");
    Ok(())
}
