//! Interactive progress bars using indicatif.
//!
//! One spinner for the remote listing, one bar per dispatched batch (the
//! initial batch and each retry sweep get their own), and one bar for the
//! integrity check pass. Reconciliation and artifact events print above the
//! bars. All mutable state sits behind a single mutex.

use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use repoherd::types::{OutcomeKind, RetryTier};
use repoherd::progress::RetainReason;
use repoherd::SyncProgress;

#[derive(Default)]
struct State {
    index_bar: Option<ProgressBar>,
    batch_bar: Option<ProgressBar>,
    check_bar: Option<ProgressBar>,
}

pub struct InteractiveReporter {
    multi: MultiProgress,
    state: Mutex<State>,
}

impl InteractiveReporter {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            state: Mutex::new(State::default()),
        }
    }

    pub fn handle(&self, event: SyncProgress) {
        let mut state = self.state.lock().unwrap();

        match event {
            SyncProgress::BuildingIndex { owner } => {
                let pb = self.multi.add(ProgressBar::new_spinner());
                pb.set_style(Self::spinner_style());
                pb.set_prefix(format!("{:12}", "Listing"));
                pb.set_message(format!("Fetching repositories of {owner}..."));
                pb.enable_steady_tick(Duration::from_millis(100));
                state.index_bar = Some(pb);
            }

            SyncProgress::IndexReady { total } => {
                if let Some(ref pb) = state.index_bar {
                    pb.finish_with_message(format!("✓ {total} repositories listed"));
                }
            }

            SyncProgress::GroupPlanned {
                group,
                to_clone,
                present,
                conflicting,
                missing,
            } => {
                drop(state);
                let mut parts = vec![format!("{to_clone} to clone"), format!("{present} present")];
                if conflicting > 0 {
                    parts.push(format!("{conflicting} conflicting"));
                }
                if missing > 0 {
                    parts.push(format!("{missing} missing"));
                }
                self.multi
                    .println(format!("{group}: {}", parts.join(", ")))
                    .ok();
            }

            SyncProgress::ParallelismClamped { requested, max } => {
                drop(state);
                self.multi
                    .println(format!("⚠ parallelism {requested} clamped to {max}"))
                    .ok();
            }

            SyncProgress::BatchStarted {
                tier,
                count,
                parallelism: _,
            } => {
                if let Some(ref pb) = state.batch_bar {
                    if !pb.is_finished() {
                        pb.finish();
                    }
                }
                let pb = self.multi.add(ProgressBar::new(count as u64));
                pb.set_style(Self::bar_style());
                let label = match tier {
                    RetryTier::Initial => "Syncing".to_string(),
                    tier => format!("Retry/{tier}"),
                };
                pb.set_prefix(format!("{label:12}"));
                state.batch_bar = Some(pb);
            }

            SyncProgress::TaskFinished {
                full_name,
                tier: _,
                kind,
                error,
                duration_ms: _,
            } => {
                if let Some(ref pb) = state.batch_bar {
                    pb.inc(1);
                    match kind {
                        OutcomeKind::Failed => {
                            let error = error.unwrap_or_default();
                            pb.set_message(format!("✗ {full_name}: {error}"));
                        }
                        OutcomeKind::Skipped => pb.set_message(format!("· {full_name}")),
                        _ => pb.set_message(format!("✓ {full_name}")),
                    }
                }
            }

            SyncProgress::TaskRecovered { full_name, tier } => {
                drop(state);
                self.multi
                    .println(format!("✓ {full_name} recovered at the {tier} tier"))
                    .ok();
            }

            SyncProgress::RetrySweep { tier, count } => {
                drop(state);
                self.multi
                    .println(format!("Retrying {count} failed at the {tier} tier"))
                    .ok();
            }

            SyncProgress::CheckingRepos { count } => {
                let pb = self.multi.add(ProgressBar::new(count as u64));
                pb.set_style(Self::bar_style());
                pb.set_prefix(format!("{:12}", "Checking"));
                state.check_bar = Some(pb);
            }

            SyncProgress::CheckPassed { full_name } => {
                if let Some(ref pb) = state.check_bar {
                    pb.inc(1);
                    pb.set_message(format!("✓ {full_name}"));
                }
            }

            SyncProgress::CheckFailed { full_name, error } => {
                if let Some(ref pb) = state.check_bar {
                    pb.inc(1);
                    pb.set_message(format!("✗ {full_name}: {error}"));
                }
            }

            SyncProgress::Reconciling { folders } => {
                drop(state);
                self.multi
                    .println(format!("Reconciling {folders} group folders..."))
                    .ok();
            }

            SyncProgress::OrphanDeleted { path } => {
                drop(state);
                self.multi
                    .println(format!("✗ deleted {} (gone remotely)", path.display()))
                    .ok();
            }

            SyncProgress::OrphanRetained { path, reason } => {
                let note = match reason {
                    RetainReason::CheckFailed => "existence check failed",
                    RetainReason::DeleteFailed => "removal failed",
                    // Routine retention; not worth a line.
                    _ => return,
                };
                drop(state);
                self.multi
                    .println(format!("⚠ kept {} ({note})", path.display()))
                    .ok();
            }

            SyncProgress::ArtifactWritten { path, count } => {
                drop(state);
                self.multi
                    .println(format!("{count} failed task(s) written to {}", path.display()))
                    .ok();
            }

            _ => {}
        }
    }

    /// Finish all progress bars.
    pub fn finish(&self) {
        let state = self.state.lock().unwrap();
        for pb in [&state.index_bar, &state.batch_bar, &state.check_bar]
            .into_iter()
            .flatten()
        {
            if !pb.is_finished() {
                pb.finish();
            }
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.cyan} {spinner:.green} {msg}")
            .expect("Invalid template")
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {pos:>3}/{len:3} {msg}")
            .expect("Invalid template")
            .progress_chars("█▓░")
    }
}

impl Default for InteractiveReporter {
    fn default() -> Self {
        Self::new()
    }
}
