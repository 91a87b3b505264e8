//! Config command - show the resolved chart settings

use console::style;
use monstack_core::{CONFIG_NAMESPACE, MonitoringConfig};
use serde_json::json;

use crate::commands::GlobalArgs;
use crate::display;
use crate::error::Result;

/// Run the config command
pub fn run(global: &GlobalArgs, json: bool) -> Result<()> {
    let config = global.stack_config()?;
    let resolved = MonitoringConfig::resolve(&config.namespace(CONFIG_NAMESPACE))?;

    if json {
        let settings: Vec<_> = resolved
            .settings()
            .iter()
            .map(|s| {
                json!({
                    "key": format!("{}:{}", CONFIG_NAMESPACE, s.key),
                    "value": s.value,
                    "default": s.defaulted,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&settings)?);
        return Ok(());
    }

    println!(
        "{} Configuration of stack {}",
        style("→").blue().bold(),
        style(&global.stack).cyan()
    );
    display::render_settings(&mut std::io::stdout(), CONFIG_NAMESPACE, resolved.settings())?;
    Ok(())
}
