//! Outputs command - show the persisted outputs of this stack

use monstack_core::{FileBackend, StackBackend};

use crate::commands::GlobalArgs;
use crate::display;
use crate::error::Result;

/// Run the outputs command
pub async fn run(global: &GlobalArgs, json: bool, show_secrets: bool) -> Result<()> {
    let stack = global.own_stack()?;
    let backend = FileBackend::new(global.state_dir());
    let state = backend.load(&stack).await?;

    if json {
        let visible = display::visible_outputs(&state.outputs, &state.secret_outputs, show_secrets);
        println!("{}", serde_json::to_string_pretty(&visible)?);
        return Ok(());
    }

    let mut out = std::io::stdout();
    display::render_state_header(&mut out, &stack.to_string(), &state)?;
    display::render_outputs(&mut out, &state.outputs, &state.secret_outputs, show_secrets)?;
    Ok(())
}
