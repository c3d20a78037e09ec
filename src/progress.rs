//! Progress display for execution passes.

use colored::Colorize;
use declarative::{
    Action, Change, ExecuteSummary, ExecutionResult, ProgressCallback, ResourceKey,
};
use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar over the steps of a pass, with a line per finished change
pub struct StepProgress {
    bar: ProgressBar,
    hidden: bool,
}

impl StepProgress {
    pub fn new(quiet: bool) -> Self {
        Self {
            bar: ProgressBar::hidden(),
            hidden: quiet,
        }
    }

    fn print(&self, line: String) {
        if self.hidden {
            return;
        }
        self.bar.suspend(|| println!("{line}"));
    }
}

impl ProgressCallback for StepProgress {
    fn on_pass_start(&mut self, count: usize) {
        if self.hidden {
            return;
        }
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        self.bar = ProgressBar::new(count as u64);
        self.bar.set_style(style);
    }

    fn on_step_start(&mut self, key: &ResourceKey, action: Action) {
        self.bar.set_message(format!("{action} {key}"));
    }

    fn on_step_complete(&mut self, key: &ResourceKey, result: &ExecutionResult) {
        match result {
            ExecutionResult::Applied { change, .. } => {
                if let Some(verb) = change_label(*change) {
                    self.print(format!("  {} {} {}", "✓".green(), key, verb));
                }
            }
            ExecutionResult::Failed { error, .. } => {
                self.print(format!("  {} {} ({})", "✗".red(), key, error));
            }
            ExecutionResult::Skipped { reason } => {
                self.print(format!("  {} {} skipped: {}", "⚠".yellow(), key, reason));
            }
        }
        self.bar.inc(1);
    }

    fn on_pass_complete(&mut self, _summary: &ExecuteSummary) {
        self.bar.finish_and_clear();
    }
}

fn change_label(change: Change) -> Option<&'static str> {
    match change {
        Change::Created => Some("created"),
        Change::Updated => Some("updated"),
        Change::Deleted => Some("deleted"),
        Change::NoChange => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{Catalog, MemoryClient, Snapshots, execute, plan_destroy};
    use declarative::{CancellationToken, ExecuteOptions, RemoteRecord};

    #[test]
    fn test_hidden_progress_runs_a_pass() {
        let client = MemoryClient::new();
        let record = client.seed(RemoteRecord {
            kind: "pipeline".into(),
            id: "p1".into(),
            version: String::new(),
            attributes: Default::default(),
        });
        let mut snapshots = Snapshots::new();
        snapshots.insert(record.key(), record);

        let mut progress = StepProgress::new(true);
        let report = execute(
            &plan_destroy(&Catalog::default(), &snapshots).unwrap(),
            &client,
            &Catalog::default(),
            &snapshots,
            &ExecuteOptions::default(),
            &CancellationToken::new(),
            &mut progress,
        );
        assert_eq!(report.summary.deleted, 1);
        assert!(progress.bar.is_finished());
    }

    #[test]
    fn test_change_labels() {
        assert_eq!(change_label(Change::Created), Some("created"));
        assert_eq!(change_label(Change::NoChange), None);
    }
}
