use colored::Colorize;
use declarative::{Action, DiffSummary, ExecuteSummary, ResourceDiff};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Plan Display
// ============================================================================

/// Longest rendered attribute value before it is elided
const MAX_VALUE_LEN: usize = 60;

/// Render planned changes, one resource per line with its field changes
pub fn format_plan(diffs: &[ResourceDiff]) -> String {
    if diffs.is_empty() {
        return format!("  {} No changes needed\n", "✓".green());
    }

    let mut out = String::new();
    for diff in diffs {
        let (symbol, label) = match diff.action {
            Action::Create => ("+".green(), "create".green()),
            Action::Delete => ("-".red(), "delete".red()),
            Action::Update => ("~".yellow(), "update".yellow()),
            Action::NoOp => ("=".dimmed(), "no change".dimmed()),
        };
        out.push_str(&format!("  {} {} ({})\n", symbol, diff.key.to_string().bold(), label));

        for change in &diff.changes {
            out.push_str(&format!(
                "      {}: {} → {}\n",
                change.field,
                truncate(&change.before.to_string(), MAX_VALUE_LEN).red(),
                truncate(&change.after.to_string(), MAX_VALUE_LEN).green()
            ));
        }
    }

    let summary = DiffSummary::from_diffs(diffs);
    out.push_str(&format!(
        "\n  Plan: {} to create, {} to update, {} to delete\n",
        summary.additions, summary.modifications, summary.removals
    ));
    out
}

pub fn display_plan(diffs: &[ResourceDiff]) {
    print!("{}", format_plan(diffs));
}

/// Print the counts of an execution pass
pub fn display_summary(summary: &ExecuteSummary) {
    println!();
    let line = format!(
        "{} created, {} updated, {} deleted, {} unchanged",
        summary.created, summary.updated, summary.deleted, summary.unchanged
    );
    if summary.is_success() {
        success(&line);
    } else {
        error(&format!(
            "{line}, {} failed, {} skipped",
            summary.failed, summary.skipped
        ));
    }
}

/// Shorten a string for display, keeping the start
pub fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let kept: String = text.chars().take(max_len - 3).collect();
        format!("{kept}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{AttrValue, FieldChange, ResourceKey};

    fn diff(action: Action, name: &str, changes: Vec<FieldChange>) -> ResourceDiff {
        ResourceDiff {
            key: ResourceKey::new("pipeline", name),
            action,
            changes,
        }
    }

    #[test]
    fn test_format_plan() {
        colored::control::set_override(false);
        let diffs = vec![
            diff(Action::Create, "new", vec![]),
            diff(
                Action::Update,
                "changed",
                vec![FieldChange {
                    field: "group".into(),
                    before: AttrValue::from("testing"),
                    after: AttrValue::from("production"),
                    immutable: false,
                }],
            ),
            diff(Action::Delete, "old", vec![]),
        ];

        let out = format_plan(&diffs);
        assert!(out.contains("+ pipeline.new (create)"));
        assert!(out.contains("~ pipeline.changed (update)"));
        assert!(out.contains("group: \"testing\" → \"production\""));
        assert!(out.contains("- pipeline.old (delete)"));
        assert!(out.contains("Plan: 1 to create, 1 to update, 1 to delete"));
    }

    #[test]
    fn test_format_empty_plan() {
        colored::control::set_override(false);
        assert!(format_plan(&[]).contains("No changes needed"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 20), "short");
        assert_eq!(truncate("exact", 5), "exact");
        assert_eq!(truncate("a long attribute value", 10), "a long ...");
        assert_eq!(truncate("test", 3), "...");
        assert_eq!(truncate("", 10), "");
    }
}
