//! Console progress reporter

use console::style;
use kiln_tasks::{TaskEvent, TaskReporter};

/// Prints build progress to the terminal
pub struct ConsoleReporter {
    verbose: bool,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl TaskReporter for ConsoleReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Started { id, label } => {
                if self.verbose {
                    println!(
                        "  {} {} {}",
                        style("▸").dim(),
                        style(id).bold(),
                        style(format!("({})", label)).dim()
                    );
                }
            }
            TaskEvent::CommandStarted { label, command } => {
                println!("  {} {}", style("▸").dim(), style(label).bold());
                println!("    {}", style(command).dim());
            }
            TaskEvent::CacheHit { label } => {
                if self.verbose {
                    println!("  {} {} {}", style("○").dim(), label, style("[cached]").cyan());
                }
            }
            TaskEvent::CacheMiss { label } => {
                if self.verbose {
                    println!(
                        "  {} {} {}",
                        style("○").dim(),
                        label,
                        style("[cache miss!]").yellow()
                    );
                }
            }
            TaskEvent::Completed {
                id,
                label: _,
                duration,
            } => {
                if self.verbose {
                    println!(
                        "  {} {} {}",
                        style("✓").green(),
                        id,
                        style(format!("{:.1}s", duration.as_secs_f64())).dim()
                    );
                }
            }
            TaskEvent::Failed {
                id: _,
                label,
                duration: _,
                error,
            } => {
                eprintln!(
                    "  {} {} {}",
                    style("✗").red().bold(),
                    style(format!("FAILED [{}]", label)).red(),
                    error
                );
            }
            TaskEvent::Skipped {
                id: _,
                label,
                failed_dependencies,
            } => {
                let deps: Vec<&str> = failed_dependencies.iter().map(|d| d.as_str()).collect();
                eprintln!(
                    "  {} {} {}",
                    style("○").yellow(),
                    label,
                    style(format!("(failed dependencies: {})", deps.join(", "))).dim()
                );
            }
            TaskEvent::AllCompleted {
                total,
                finished,
                failed,
                never_run,
                duration,
            } => {
                if self.verbose {
                    println!();
                    println!(
                        "  {} tasks: {} finished, {} failed, {} never run {}",
                        total,
                        style(finished).green(),
                        style(failed).red(),
                        never_run,
                        style(format!("{:.1}s", duration.as_secs_f64())).dim()
                    );
                }
            }
        }
    }
}
