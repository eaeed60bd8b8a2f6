use crate::core::flatten_contract::{DisplayModel, UsageSeverity};
use crate::core::presets::PresetEntry;
use crate::core::preset_reconciler::ReconcileReport;
use crate::core::{ExclusionResolver, LoadState, NodeKind, SelectionState, TreeNodeStore};
use std::fmt::Write;

/*
 * Plain-text presentation of session state for the command line. Everything
 * here is a pure function of its input so the output can be asserted in tests.
 */

const INDENT: &str = "  ";

fn marker(state: SelectionState) -> &'static str {
    match state {
        SelectionState::Checked => "[x]",
        SelectionState::Indeterminate => "[-]",
        SelectionState::Unchecked => "[ ]",
    }
}

/*
 * One line per loaded node, indented by depth. Locked nodes show `[!]` and the
 * rule that blocks them; directories whose children were never fetched end in
 * ` ...`.
 */
pub fn render_tree(store: &TreeNodeStore) -> String {
    let resolver = ExclusionResolver::new(store);
    let mut out = String::new();
    for node in store.nodes_in_tree_order() {
        let indent = INDENT.repeat(store.depth(&node.path));
        let name = match node.kind {
            NodeKind::Directory => format!("{}/", node.name),
            NodeKind::File => node.name.clone(),
        };
        let _ = match resolver.effective_lock_reason(&node.path) {
            Some(reason) => write!(out, "{indent}[!] {name} ({reason})"),
            None => write!(out, "{indent}{} {name}", marker(node.state)),
        };
        if node.is_dir() && node.load_state != LoadState::Loaded {
            out.push_str(" ...");
        }
        out.push('\n');
    }
    out
}

fn severity_tag(severity: UsageSeverity) -> &'static str {
    match severity {
        UsageSeverity::Unavailable => "n/a",
        UsageSeverity::Neutral => "empty",
        UsageSeverity::Low => "low",
        UsageSeverity::Medium => "medium",
        UsageSeverity::High => "high",
        UsageSeverity::OverBudget => "over budget",
    }
}

/*
 * Token summary followed by one line per model with its severity band.
 */
pub fn render_usage(display: &DisplayModel) -> String {
    let mut out = display.summary_line();
    out.push('\n');
    for model in &display.models {
        let label = match model.percentage {
            Some(_) => format!("{}%", model.label),
            None => model.label.clone(),
        };
        let _ = writeln!(
            out,
            "{INDENT}{:<8} {:>8}  {}",
            model.name,
            label,
            severity_tag(model.severity)
        );
    }
    if !display.text_available {
        out.push_str("No text was produced.\n");
    }
    out
}

pub fn render_preset_list(entries: &[PresetEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        let _ = writeln!(out, "{:<32} {}", entry.id, entry.scope);
    }
    out
}

pub fn render_reconcile_report(id: &str, report: &ReconcileReport) -> String {
    match report.summary_message() {
        Some(message) => format!("Preset '{id}': {message}"),
        None => format!(
            "Preset '{id}': all {} item(s) selected.",
            report.applied.len()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::flatten_contract::{FlattenResponse, ModelPercentage, interpret_response};
    use crate::core::node_state_applicator::{
        NodeStateApplicator, NodeStateApplicatorOperations,
    };
    use crate::core::presets::PresetScope;
    use crate::core::tree_node::{ExclusionInfo, NodeDescriptor};
    use std::path::{Path, PathBuf};

    fn create_test_store() -> TreeNodeStore {
        let root = NodeDescriptor::directory("/proj").with_children(vec![
            NodeDescriptor::directory("/proj/b")
                .excluded(ExclusionInfo::new("Directory Name", "b"))
                .with_children(vec![NodeDescriptor::file("/proj/b/c.txt")]),
            NodeDescriptor::file("/proj/a.txt"),
            NodeDescriptor::directory("/proj/src"),
        ]);
        TreeNodeStore::from_root(root)
    }

    #[test]
    fn test_render_tree_markers_and_indentation() {
        let mut store = create_test_store();
        let applicator = NodeStateApplicator::new();
        applicator.check(&mut store, Path::new("/proj/a.txt")).unwrap();

        let rendered = render_tree(&store);

        let expected = "\
[-] proj/
  [!] b/ (Directory Name: b)
    [!] c.txt (Directory Name: b)
  [x] a.txt
  [ ] src/ ...
";
        assert_eq!(rendered, expected);
    }

    #[test]
    fn test_render_usage_lists_models() {
        let response = FlattenResponse {
            text: Some("x".to_string()),
            token_count: 1500,
            model_percentages: vec![
                ModelPercentage {
                    name: "4o".to_string(),
                    percentage: serde_json::json!(1.17),
                },
                ModelPercentage {
                    name: "GmP".to_string(),
                    percentage: serde_json::json!("n/a"),
                },
            ],
            error: None,
        };
        let display = interpret_response(&response);

        let rendered = render_usage(&display);

        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "Tokens: 1500 | 4o: 1.2% | GmP: N/A");
        assert!(lines[1].contains("4o") && lines[1].ends_with("low"));
        assert!(lines[2].contains("N/A") && lines[2].ends_with("n/a"));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_render_usage_flags_missing_text() {
        let display = interpret_response(&FlattenResponse {
            error: Some("boom".to_string()),
            ..FlattenResponse::default()
        });
        assert!(render_usage(&display).ends_with("No text was produced.\n"));
    }

    #[test]
    fn test_render_preset_list_and_report() {
        let entries = vec![PresetEntry {
            id: "user/demo".to_string(),
            name: "demo".to_string(),
            scope: PresetScope::User,
        }];
        let rendered = render_preset_list(&entries);
        assert!(rendered.starts_with("user/demo"));
        assert!(rendered.trim_end().ends_with("user"));

        let report = ReconcileReport {
            absent: vec![PathBuf::from("/proj/a.txt")],
            ..ReconcileReport::default()
        };
        assert_eq!(
            render_reconcile_report("user/demo", &report),
            "Preset 'user/demo': 1 of 1 items were not selected (0 excluded, 1 not found)."
        );
        assert_eq!(
            render_reconcile_report("user/demo", &ReconcileReport::default()),
            "Preset 'user/demo': all 0 item(s) selected."
        );
    }
}
