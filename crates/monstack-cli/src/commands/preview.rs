//! Preview command - show what a run would do without touching the cluster

use console::style;
use monstack_core::declare;

use crate::commands::GlobalArgs;
use crate::display;
use crate::error::Result;

/// Run the preview command
pub fn run(global: &GlobalArgs, show_values: bool) -> Result<()> {
    let ctx = global.program_context()?;
    let stack = global.own_stack()?;
    let program = declare(&ctx)?;

    println!(
        "{} Previewing stack {}",
        style("→").blue().bold(),
        style(&stack).cyan()
    );
    display::render_plan(
        &mut std::io::stdout(),
        &program.plan,
        &program.exports,
        show_values,
    )?;
    Ok(())
}
