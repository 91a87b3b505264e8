//! Display formatting for CLI output
//!
//! Provides structured display for:
//! - The declared resource graph, grouped by execution wave
//! - Run results with per-resource timings
//! - Stack outputs with secret masking
//! - Resolved configuration settings

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};

use console::style;
use monstack_core::{
    Exports, Output, Plan, REDACTED, ResolvedSetting, Resource, ResourceKind, StackState,
};
use monstack_kube::RunSummary;
use serde_json::Value as JsonValue;

use crate::util::{format_duration, format_value, indent};

/// Shown for values only known once the cluster has been touched
pub const COMPUTED: &str = "<computed>";

/// Format count with proper pluralization
pub fn pluralize(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{} {}", count, singular)
    } else {
        format!("{} {}", count, plural)
    }
}

/// A string output as far as it is known, without forcing it
fn peek_string(output: &Output<String>) -> String {
    match output.peek() {
        Some(resolved) if resolved.secret => REDACTED.to_string(),
        Some(resolved) => resolved.value,
        None => COMPUTED.to_string(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Plan Display
// ═══════════════════════════════════════════════════════════════════════════

/// Render the declared graph, wave by wave
pub fn render_plan<W: Write>(
    w: &mut W,
    plan: &Plan,
    exports: &Exports,
    show_values: bool,
) -> io::Result<()> {
    for (wave, ids) in plan.waves().iter().enumerate() {
        writeln!(w)?;
        writeln!(w, "{}", style(format!("Wave {}", wave)).bold())?;
        for resource in ids.iter().filter_map(|id| plan.get(id)) {
            render_resource(w, resource, show_values)?;
        }
    }

    writeln!(w)?;
    writeln!(w, "{}:", style("Outputs").bold())?;
    for (name, value) in exports.preview() {
        writeln!(w, "    {}: {}", style(name).cyan(), format_value(&value))?;
    }

    writeln!(w)?;
    writeln!(
        w,
        "{} {} to create",
        style("Resources:").bold(),
        pluralize(plan.len(), "resource", "resources")
    )?;
    Ok(())
}

fn render_resource<W: Write>(w: &mut W, resource: &Resource, show_values: bool) -> io::Result<()> {
    writeln!(
        w,
        "  {} {} {}",
        style("+").green().bold(),
        style(resource.id.kind).dim(),
        style(&resource.id.name).cyan()
    )?;

    if let Some(provider) = &resource.options.provider {
        writeln!(w, "      provider: {}", provider.name)?;
    }

    let dependencies: Vec<String> = resource
        .dependencies
        .iter()
        .filter(|d| Some(*d) != resource.options.provider.as_ref())
        .map(|d| d.name.clone())
        .collect();
    if !dependencies.is_empty() {
        writeln!(w, "      depends on: {}", dependencies.join(", "))?;
    }

    if let Some(create) = resource.options.custom_timeouts.create {
        writeln!(w, "      create timeout: {}", format_duration(create))?;
    }

    match &resource.kind {
        // Forcing these would read the referenced stacks
        ResourceKind::Provider(_) => writeln!(w, "      kubeconfig: {}", COMPUTED)?,
        ResourceKind::Secret(_) => writeln!(w, "      id: {}", COMPUTED)?,
        ResourceKind::Namespace(spec) => writeln!(w, "      name: {}", spec.name)?,
        ResourceKind::Release(spec) => {
            let chart = match spec.repository() {
                Some(repo) => match &repo.name {
                    Some(alias) => format!("{}/{}", alias, spec.chart()),
                    None => format!("{} ({})", spec.chart(), repo.url),
                },
                None => spec.chart().to_string(),
            };
            writeln!(w, "      chart: {} {}", chart, spec.version())?;
            writeln!(w, "      namespace: {}", peek_string(spec.namespace()))?;
            writeln!(w, "      timeout: {}s", spec.timeout().as_secs())?;

            if show_values {
                let values = spec.values().preview();
                let yaml = serde_yaml::to_string(values.inner())
                    .map_err(|e| io::Error::other(e.to_string()))?;
                writeln!(w, "      values:")?;
                writeln!(w, "{}", indent(yaml.trim_end(), 8))?;
            }
        }
        ResourceKind::ConfigGroup(spec) => {
            writeln!(w, "      files: {}", spec.files().join(", "))?;
        }
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// Run Display
// ═══════════════════════════════════════════════════════════════════════════

/// Render the outcome of every resource of a run
pub fn render_run<W: Write>(w: &mut W, summary: &RunSummary) -> io::Result<()> {
    for record in &summary.records {
        writeln!(
            w,
            "  {} {} {} {} {}",
            style("✓").green(),
            style(record.id.kind).dim(),
            style(&record.id.name).cyan(),
            style(&record.detail).dim(),
            style(format!("({})", format_duration(record.elapsed))).dim()
        )?;
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// Outputs Display
// ═══════════════════════════════════════════════════════════════════════════

/// Outputs with secret values masked unless `show_secrets`
pub fn visible_outputs(
    values: &BTreeMap<String, JsonValue>,
    secret: &BTreeSet<String>,
    show_secrets: bool,
) -> BTreeMap<String, JsonValue> {
    values
        .iter()
        .map(|(name, value)| {
            let shown = if secret.contains(name) && !show_secrets {
                JsonValue::String(REDACTED.to_string())
            } else {
                value.clone()
            };
            (name.clone(), shown)
        })
        .collect()
}

/// Render stack outputs as a name/value list
pub fn render_outputs<W: Write>(
    w: &mut W,
    values: &BTreeMap<String, JsonValue>,
    secret: &BTreeSet<String>,
    show_secrets: bool,
) -> io::Result<()> {
    let width = values.keys().map(String::len).max().unwrap_or(0);
    for (name, value) in visible_outputs(values, secret, show_secrets) {
        writeln!(
            w,
            "    {:<width$}  {}",
            style(&name).cyan(),
            format_value(&value),
            width = width
        )?;
    }
    Ok(())
}

/// Render the header line of a persisted stack state
pub fn render_state_header<W: Write>(w: &mut W, stack: &str, state: &StackState) -> io::Result<()> {
    let updated = state
        .updated_at
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "never".to_string());
    writeln!(
        w,
        "Current stack outputs ({}, version {}, updated {}):",
        style(stack).cyan(),
        style(state.version).yellow(),
        updated
    )
}

// ═══════════════════════════════════════════════════════════════════════════
// Config Display
// ═══════════════════════════════════════════════════════════════════════════

/// Render resolved settings, marking defaulted ones
pub fn render_settings<W: Write>(
    w: &mut W,
    namespace: &str,
    settings: &[ResolvedSetting],
) -> io::Result<()> {
    let width = settings
        .iter()
        .map(|s| namespace.len() + 1 + s.key.len())
        .max()
        .unwrap_or(0);
    for setting in settings {
        let key = format!("{}:{}", namespace, setting.key);
        let source = if setting.defaulted {
            style("(default)").dim().to_string()
        } else {
            String::new()
        };
        writeln!(
            w,
            "  {:<width$}  {} {}",
            key,
            setting.value,
            source,
            width = width
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use monstack_core::{NamespaceSpec, ReleaseSpec, ResourceOptions, Values};
    use serde_json::json;

    fn plain(render: impl FnOnce(&mut Vec<u8>) -> io::Result<()>) -> String {
        console::set_colors_enabled(false);
        let mut buffer = Vec::new();
        render(&mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize(1, "resource", "resources"), "1 resource");
        assert_eq!(pluralize(6, "resource", "resources"), "6 resources");
    }

    #[test]
    fn test_render_plan_groups_by_wave() {
        let mut plan = Plan::new();
        let provider = plan
            .provider(
                "ingress-controller",
                Output::known("apiVersion: v1\nkind: Config\n".to_string()),
            )
            .unwrap();
        let ns = plan
            .namespace(
                "prometheus",
                NamespaceSpec {
                    name: "prometheus".to_string(),
                },
                ResourceOptions::new().provider(&provider),
            )
            .unwrap();
        plan.release(
            ReleaseSpec::builder("statsd", "prometheus-statsd-exporter")
                .version("0.5.0")
                .namespace(ns.name.clone())
                .values(Values(json!({"serviceMonitor": {"enabled": true}})))
                .build()
                .unwrap(),
            ResourceOptions::new().provider(&provider).depends_on(&ns.id),
        )
        .unwrap();

        let out = plain(|w| render_plan(w, &plan, &Exports::new(), true));
        assert!(out.contains("Wave 0"));
        assert!(out.contains("Wave 2"));
        assert!(out.contains("kubeconfig: <computed>"));
        assert!(out.contains("chart: prometheus-statsd-exporter 0.5.0"));
        assert!(out.contains("namespace: <computed>"));
        assert!(out.contains("depends on: prometheus"));
        assert!(out.contains("enabled: true"));
        assert!(out.contains("3 resources to create"));
        // The kubeconfig document itself is never shown
        assert!(!out.contains("kind: Config"));
    }

    #[test]
    fn test_visible_outputs_masks_secrets() {
        let mut values = BTreeMap::new();
        values.insert("prom_hostname".to_string(), json!("host"));
        values.insert("token".to_string(), json!("s3cr3t"));
        let secret: BTreeSet<String> = ["token".to_string()].into_iter().collect();

        let masked = visible_outputs(&values, &secret, false);
        assert_eq!(masked["token"], json!(REDACTED));
        assert_eq!(masked["prom_hostname"], json!("host"));

        let shown = visible_outputs(&values, &secret, true);
        assert_eq!(shown["token"], json!("s3cr3t"));
    }

    #[test]
    fn test_render_settings_marks_defaults() {
        let settings = vec![
            ResolvedSetting {
                key: "chart_version",
                value: "39.4.0".to_string(),
                defaulted: false,
            },
            ResolvedSetting {
                key: "helm_timeout",
                value: "600".to_string(),
                defaulted: true,
            },
        ];
        let out = plain(|w| render_settings(w, "prometheus", &settings));
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[0].contains("prometheus:chart_version"));
        assert!(!lines[0].contains("(default)"));
        assert!(lines[1].contains("600 (default)"));
    }
}
