use anyhow::Result;

use crate::cli::GlobalArgs;
use crate::project::Project;

pub fn plugins_command(global: &GlobalArgs) -> Result<()> {
    let project = Project::load(global)?;
    for name in project.pipeline.registry().names() {
        println!("{}", name);
    }
    Ok(())
}
