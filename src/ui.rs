//! Interface de terminal do sincronizador: spinner e saída colorida.
//!
//! Usa `indicatif` para o spinner da varredura e `console` para estilizar
//! a tabela de status.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use opensesame_sync::orchestrator::SweepReport;
use opensesame_sync::queue::TaskResult;
use opensesame_sync::state_machine::CourseStatus;
use opensesame_sync::status::StatusReport;

/// Indicador visual de progresso para uma varredura do catálogo.
pub struct SweepProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
}

impl SweepProgress {
    /// Inicia o spinner.
    pub fn start() -> Self {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.set_message("Listing catalog");
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
        }
    }

    /// Atualiza a mensagem após cada página.
    pub fn page(&self, page: u32, records: usize) {
        self.pb
            .set_message(format!("Page {page}: {records} courses listed"));
    }

    /// Finaliza o spinner e imprime o resumo.
    pub fn complete(&self, report: &SweepReport) {
        self.pb.finish_and_clear();
        println!(
            "  {} {} pages, {} courses ({} new, {} updated)",
            self.green.apply_to("✓"),
            report.pages,
            report.records,
            report.created,
            report.updated
        );
        println!(
            "    {} categories created, {} queued, {} deleted",
            report.categories_created, report.queued, report.deleted
        );
        let failures = report.failed + report.queue_failed + report.delete_failed;
        if failures > 0 {
            println!("    {} {failures} failures, see log", self.red.apply_to("✗"));
        }
    }

    /// Finaliza o spinner após um erro fatal.
    pub fn fail(&self, error: &str) {
        self.pb.finish_and_clear();
        println!("  {} Sync failed: {error}", self.red.apply_to("✗"));
    }
}

fn status_style(status: CourseStatus) -> Style {
    match status {
        CourseStatus::ScormImported => Style::new().green(),
        CourseStatus::Deleted => Style::new().red(),
        CourseStatus::Retrieved => Style::new().dim(),
        _ => Style::new().yellow(),
    }
}

/// Imprime a tabela de status e o indicador da fila.
pub fn print_status(report: &StatusReport) {
    let bold = Style::new().bold();
    let queue = if report.blocked {
        Style::new().red().bold().apply_to("BLOCKED")
    } else {
        Style::new().green().bold().apply_to("running")
    };
    println!(
        "{} {queue} ({}/{} failures, {} pending tasks)",
        bold.apply_to("Queue:"),
        report.failures,
        report.threshold,
        report.pending_tasks
    );
    println!();
    println!(
        "{}",
        bold.apply_to(format!(
            "{:<38} {:<14} {:>8} {:<6} Title",
            "Remote id", "State", "Course", "Active"
        ))
    );
    for row in &report.rows {
        let course = row
            .local_course_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "{:<38} {:<14} {:>8} {:<6} {}",
            row.remote_id,
            status_style(row.status).apply_to(row.status.to_string()),
            course,
            if row.active { "yes" } else { "no" },
            row.title
        );
    }
    println!();
    println!(
        "Page {}/{} ({} courses)",
        report.page,
        report.total_pages(),
        report.total
    );
}

/// Imprime o resultado de cada tarefa executada.
pub fn print_task_results(results: &[(String, TaskResult)]) {
    if results.is_empty() {
        println!("  No tasks due");
        return;
    }
    let green = Style::new().green().bold();
    let yellow = Style::new().yellow();
    let red = Style::new().red().bold();
    for (remote_id, result) in results {
        match result {
            TaskResult::Completed => println!("  {} {remote_id}", green.apply_to("✓")),
            TaskResult::Rescheduled { failures } => println!(
                "  {} {remote_id}: failed, rescheduled ({failures} consecutive failures)",
                yellow.apply_to("↻")
            ),
            TaskResult::Tripped { purged } => println!(
                "  {} {remote_id}: failed, queue blocked ({purged} tasks purged)",
                red.apply_to("✗")
            ),
            TaskResult::Skipped => println!("  - {remote_id}: skipped, queue blocked"),
            TaskResult::Errored { error, requeued } => println!(
                "  {} {remote_id}: {error}{}",
                red.apply_to("!"),
                if *requeued { ", task put back" } else { ", task lost" }
            ),
        }
    }
}
