use anyhow::{Context, Result};
use modbuild_core::ConfigValue;
use std::collections::BTreeMap;

use crate::cli::GlobalArgs;
use crate::project::Project;

pub fn config_command(global: &GlobalArgs, key: Option<&str>, json: bool) -> Result<()> {
    let mut project = Project::load(global)?;
    let tree = project.configure()?;

    match key {
        Some(key) if tree.view().section(key).is_ok() => {
            print!("{}", tree.render_section(key)?);
        }
        Some(key) => {
            let value: ConfigValue = tree.get(key).with_context(|| format!("Cannot read {key}"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("{}", value);
            }
        }
        None if json => {
            let values: BTreeMap<String, ConfigValue> = tree
                .flatten()
                .into_iter()
                .filter_map(|(key, value)| value.ok().map(|value| (key, value)))
                .collect();
            println!("{}", serde_json::to_string_pretty(&values)?);
        }
        None => {
            for (key, value) in tree.flatten() {
                match value {
                    Ok(value) => println!("{} = {}", key, value),
                    Err(e) => println!("{} = <{}>", key, e),
                }
            }
        }
    }
    Ok(())
}
