//! Up command - deploy the monitoring stack and persist its outputs

use std::sync::Arc;

use console::style;
use monstack_core::{ProgramContext, ResolvedExports, StackRef, StackState, declare};
use monstack_kube::{ClusterConnector, Engine, HelmCli, KubeConnector, RunSummary};

use crate::commands::GlobalArgs;
use crate::display;
use crate::error::Result;

/// Everything a successful deployment produced
pub struct Deployment {
    pub run: RunSummary,
    pub exports: ResolvedExports,
    pub state: StackState,
}

/// Run the up command
pub async fn run(global: &GlobalArgs, show_secrets: bool) -> Result<()> {
    let ctx = global.program_context()?;
    let stack = global.own_stack()?;

    println!(
        "{} Updating stack {}",
        style("→").blue().bold(),
        style(&stack).cyan()
    );

    let connector = KubeConnector::new(HelmCli::new(&global.helm));
    let deployment = deploy(&ctx, &stack, Arc::new(connector)).await?;

    let mut out = std::io::stdout();
    display::render_run(&mut out, &deployment.run)?;

    println!();
    println!("{}:", style("Outputs").bold());
    display::render_outputs(
        &mut out,
        &deployment.exports.values,
        &deployment.exports.secret,
        show_secrets,
    )?;

    println!();
    println!(
        "{} Stack {} updated to version {} ({})",
        style("✓").green().bold(),
        style(&stack).cyan(),
        style(deployment.state.version).yellow(),
        display::pluralize(deployment.run.len(), "resource", "resources")
    );
    Ok(())
}

/// Declare, realize and persist one run of the program
pub async fn deploy(
    ctx: &ProgramContext,
    stack: &StackRef,
    connector: Arc<dyn ClusterConnector>,
) -> Result<Deployment> {
    let program = declare(ctx)?;
    tracing::debug!(resources = program.plan.len(), "declared");

    let mut engine = Engine::new(connector);
    let run = engine.run(program.plan).await?;

    let exports = program.exports.resolve().await?;
    let state = ctx
        .backend
        .save(stack, exports.values.clone(), exports.secret.clone())
        .await?;

    Ok(Deployment {
        run,
        exports,
        state,
    })
}
