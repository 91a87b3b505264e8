//! Integration tests for CLI commands

use std::process::Command;

/// Helper to run monstack against the fixture project and state
fn monstack(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_monstack"))
        .args([
            "--project-dir",
            &project_path(),
            "--state-dir",
            &state_path(),
        ])
        .args(args)
        .env_remove("MONSTACK_STACK")
        .env_remove("MONSTACK_OWNER")
        .env("RUST_LOG", "off")
        .output()
        .expect("Failed to execute monstack")
}

/// Get the fixtures path
fn fixtures_path() -> &'static str {
    concat!(env!("CARGO_MANIFEST_DIR"), "/../../fixtures")
}

fn project_path() -> String {
    format!("{}/kubernetes/prometheus", fixtures_path())
}

fn state_path() -> String {
    format!("{}/state", fixtures_path())
}

mod preview_command {
    use super::*;

    #[test]
    fn test_preview_lists_every_resource() {
        let output = monstack(&["preview", "--stack", "test"]);

        assert!(output.status.success(), "Expected success for preview");
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("organization/prometheus/test"));
        assert!(stdout.contains("ingress-controller"));
        assert!(stdout.contains("pulumi-secret-prometheus"));
        assert!(stdout.contains("servicemon"));
        assert!(stdout.contains("statsd"));
        assert!(stdout.contains("6 resources to create"));
    }

    #[test]
    fn test_preview_uses_stack_config() {
        let output = monstack(&["preview", "--stack", "test"]);

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("prometheus-community/kube-prometheus-stack 39.4.0"));
        assert!(stdout.contains("timeout: 900s"));
        assert!(stdout.contains("create timeout: 10m00s"));
    }

    #[test]
    fn test_preview_masks_admin_password_and_kubeconfig() {
        let output = monstack(&["preview", "--stack", "test", "--show-values"]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        let password_line = stdout
            .lines()
            .find(|l| l.contains("adminPassword:"))
            .expect("values should include the admin password");
        assert!(password_line.contains("[secret]"));
        assert!(stdout.contains("kubeconfig: <computed>"));
        assert!(!stdout.contains("fixture-token"));
    }

    #[test]
    fn test_preview_does_not_need_referenced_state() {
        // No kubeconfig or secrets state exists for this stack
        let output = monstack(&["preview", "--stack", "fresh"]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("prom_hostname: <computed>"));
    }

    #[test]
    fn test_preview_missing_project() {
        let output = Command::new(env!("CARGO_BIN_EXE_monstack"))
            .args(["--project-dir", "/nonexistent/project", "preview"])
            .output()
            .expect("Failed to execute monstack");

        assert_eq!(output.status.code(), Some(2));
    }
}

mod config_command {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let output = monstack(&["config", "--stack", "fresh"]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("kube-prometheus-stack"));
        assert!(stdout.contains("39.2.1"));
        assert!(stdout.contains("https://prometheus-community.github.io/helm-charts"));
        assert!(stdout.contains("prometheus-statsd-exporter"));
        assert!(stdout.contains("(default)"));
    }

    #[test]
    fn test_config_json_marks_file_values() {
        let output = monstack(&["config", "--stack", "test", "--json"]);

        let stdout = String::from_utf8_lossy(&output.stdout);
        let json: serde_json::Value =
            serde_json::from_str(&stdout).expect("Output should be valid JSON");
        let settings = json.as_array().unwrap();

        let version = settings
            .iter()
            .find(|s| s["key"] == "prometheus:chart_version")
            .unwrap();
        assert_eq!(version["value"], "39.4.0");
        assert_eq!(version["default"], false);

        let statsd = settings
            .iter()
            .find(|s| s["key"] == "prometheus:statsd_chart_version")
            .unwrap();
        assert_eq!(statsd["value"], "0.5.0");
        assert_eq!(statsd["default"], true);
    }

    #[test]
    fn test_config_override_on_command_line() {
        let output = monstack(&[
            "config",
            "--stack",
            "test",
            "--config",
            "statsd_chart_version=0.6.0",
            "--json",
        ]);

        let stdout = String::from_utf8_lossy(&output.stdout);
        let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
        let statsd = json
            .as_array()
            .unwrap()
            .iter()
            .find(|s| s["key"] == "prometheus:statsd_chart_version")
            .unwrap()
            .clone();
        assert_eq!(statsd["value"], "0.6.0");
        assert_eq!(statsd["default"], false);
    }

    #[test]
    fn test_config_invalid_timeout() {
        let output = monstack(&["config", "--stack", "broken"]);

        assert_eq!(output.status.code(), Some(2));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("helm_timeout"));
    }
}

mod outputs_command {
    use super::*;

    #[test]
    fn test_outputs_masks_secrets() {
        let output = monstack(&["outputs", "--stack", "test"]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("version 2"));
        assert!(stdout.contains("prometheus-prometheus-server.prometheus.svc.cluster.local"));
        assert!(stdout.contains("[secret]"));
        assert!(!stdout.contains("fixture-grafana-token"));
    }

    #[test]
    fn test_outputs_json_show_secrets() {
        let output = monstack(&["outputs", "--stack", "test", "--json", "--show-secrets"]);

        let stdout = String::from_utf8_lossy(&output.stdout);
        let json: serde_json::Value =
            serde_json::from_str(&stdout).expect("Output should be valid JSON");
        assert_eq!(json["grafana_token"], "fixture-grafana-token");
        assert_eq!(json["prom_status"]["status"], "deployed");
    }

    #[test]
    fn test_outputs_unknown_stack() {
        let output = monstack(&["outputs", "--stack", "fresh"]);

        assert_eq!(output.status.code(), Some(3));
    }
}

mod up_command {
    use super::*;

    #[test]
    fn test_up_without_kubeconfig_stack() {
        // Fails on the provider before any cluster is contacted
        let output = monstack(&["up", "--stack", "fresh"]);

        assert_eq!(output.status.code(), Some(3));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("organization/kubeconfig/fresh"));
    }
}

mod usage {
    use super::*;

    #[test]
    fn test_unknown_command() {
        let output = monstack(&["destroy"]);

        assert_eq!(output.status.code(), Some(64));
    }

    #[test]
    fn test_version() {
        let output = Command::new(env!("CARGO_BIN_EXE_monstack"))
            .arg("--version")
            .output()
            .expect("Failed to execute monstack");

        assert!(output.status.success());
        assert!(String::from_utf8_lossy(&output.stdout).contains("monstack"));
    }
}
