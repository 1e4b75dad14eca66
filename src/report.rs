//! Console rendering of scan results and repair prompts.

use std::io::{self, Write};

use colored::Colorize;

use crate::models::{ForeignKey, Issue};
use crate::scan::{ScanObserver, ScanOutcome, TableStatus};

const RULE_WIDTH: usize = 60;

#[derive(Debug, Clone, Copy)]
enum Tone {
    Heading,
    Good,
    Bad,
    Warn,
}

/// Formats everything the operator sees. Holds no audit state.
pub struct ReportPresenter<W: Write> {
    out: W,
    color: bool,
}

impl<W: Write> ReportPresenter<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self { out, color }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn paint(&self, text: &str, tone: Tone) -> String {
        if !self.color {
            return text.to_string();
        }
        match tone {
            Tone::Heading => text.cyan().to_string(),
            Tone::Good => text.green().to_string(),
            Tone::Bad => text.bright_red().bold().to_string(),
            Tone::Warn => text.bright_yellow().to_string(),
        }
    }

    fn rule(&self) -> String {
        self.paint(&"-".repeat(RULE_WIDTH), Tone::Heading)
    }

    pub fn banner(&mut self) -> io::Result<()> {
        let line = self.paint("Starting referential integrity audit...", Tone::Heading);
        writeln!(self.out, "{}", line)
    }

    pub fn progress_enabled(&mut self) -> io::Result<()> {
        writeln!(self.out, "Detailed progress mode enabled.")
    }

    pub fn summary(&mut self, outcome: &ScanOutcome) -> io::Result<()> {
        let heading = self.paint("----------------- SCAN SUMMARY -----------------", Tone::Heading);
        writeln!(self.out)?;
        writeln!(self.out, "{}", heading)?;
        writeln!(
            self.out,
            "Scanned {} tables and {} foreign keys.",
            outcome.tables_scanned, outcome.foreign_keys_checked
        )?;

        let registry = &outcome.registry;
        if registry.is_empty() {
            let ok = self.paint("No data integrity problems found!", Tone::Good);
            writeln!(self.out, "{}", ok)?;
        } else {
            let noun = if registry.len() == 1 { "problem" } else { "problems" };
            let count = self.paint(
                &format!("{} data integrity {}:", registry.len(), noun),
                Tone::Bad,
            );
            writeln!(self.out, "Found {}", count)?;
            writeln!(self.out)?;
            for issue in registry {
                let tag = self.paint("[FAILED]", Tone::Bad);
                writeln!(
                    self.out,
                    " - {} in table `{}`: {}",
                    tag,
                    issue.table(),
                    issue.detail()
                )?;
            }
            let hint = self.paint("--fix", Tone::Warn);
            writeln!(self.out)?;
            writeln!(self.out, "To repair these problems, run again with {}", hint)?;
        }

        let rule = self.rule();
        writeln!(self.out, "{}", rule)
    }

    pub fn nothing_to_fix(&mut self) -> io::Result<()> {
        let msg = self.paint("No problems found to repair.", Tone::Good);
        writeln!(self.out)?;
        writeln!(self.out, "{}", msg)
    }

    pub fn repair_header(&mut self) -> io::Result<()> {
        let rule = self.rule();
        let title = self.paint(" INTERACTIVE REPAIR ASSISTANT", Tone::Heading);
        writeln!(self.out)?;
        writeln!(self.out, "{}", rule)?;
        writeln!(self.out, "{}", title)?;
        writeln!(self.out, "{}", rule)?;
        writeln!(self.out)?;
        let warning = self.paint("WARNING! This process will modify your database.", Tone::Warn);
        let backup = self.paint(
            "Make sure you have a recent backup before continuing.",
            Tone::Warn,
        );
        writeln!(self.out, "{}", warning)?;
        writeln!(self.out, "{}", backup)?;
        writeln!(self.out)
    }

    /// Writes a yes/no question and leaves the cursor on the same line.
    pub fn prompt(&mut self, question: &str) -> io::Result<()> {
        write!(self.out, "{} [y/N]: ", question)?;
        self.out.flush()
    }

    pub fn cancelled(&mut self) -> io::Result<()> {
        writeln!(self.out, "Repair cancelled by user. No changes were made.")
    }

    pub fn issue_header(&mut self, index: usize, total: usize, issue: &Issue) -> io::Result<()> {
        let heading = self.paint(
            &format!("---------------- Issue {}/{} ----------------", index, total),
            Tone::Heading,
        );
        let labels = [
            self.paint("Type:    ", Tone::Good),
            self.paint("Table:   ", Tone::Good),
            self.paint("Detail:  ", Tone::Good),
        ];
        writeln!(self.out)?;
        writeln!(self.out, "{}", heading)?;
        writeln!(self.out, "{}{}", labels[0], issue.kind())?;
        writeln!(self.out, "{}`{}`", labels[1], issue.table())?;
        writeln!(self.out, "{}{}", labels[2], issue.detail())
    }

    pub fn already_resolved(&mut self) -> io::Result<()> {
        let msg = self.paint(
            "This problem is already resolved: no orphaned rows remain.",
            Tone::Warn,
        );
        writeln!(self.out, "{}", msg)
    }

    pub fn impact(&mut self, count: u64, fk: &ForeignKey) -> io::Result<()> {
        let impact = self.paint("Impact:  ", Tone::Good);
        let action = self.paint("Action:  ", Tone::Good);
        writeln!(
            self.out,
            "{}{} orphaned rows found for deletion.",
            impact, count
        )?;
        writeln!(
            self.out,
            "{}DELETE FROM `{}` where `{}` has no match in `{}`.`{}`.",
            action, fk.child_table, fk.child_column, fk.parent_table, fk.parent_column
        )?;
        writeln!(self.out)
    }

    pub fn deleted(&mut self, rows: u64, table: &str) -> io::Result<()> {
        let msg = self.paint(
            &format!("SUCCESS: {} orphaned rows deleted from `{}`.", rows, table),
            Tone::Good,
        );
        writeln!(self.out, "{}", msg)
    }

    pub fn repair_failed(&mut self, error: &dyn std::fmt::Display) -> io::Result<()> {
        let msg = self.paint(&format!("REPAIR FAILED: {}", error), Tone::Bad);
        writeln!(self.out, "{}", msg)
    }

    pub fn skipped(&mut self) -> io::Result<()> {
        writeln!(self.out, "Action skipped by user.")
    }

    pub fn finished(&mut self) -> io::Result<()> {
        let msg = self.paint("Repair process finished.", Tone::Good);
        writeln!(self.out)?;
        writeln!(self.out, "{}", msg)?;
        writeln!(
            self.out,
            "Remember to flush caches built from this data (Magento: `bin/magento cache:flush`)."
        )
    }

    pub fn fatal(&mut self, error: &dyn std::fmt::Display) -> io::Result<()> {
        let msg = self.paint(&format!("ERROR: {}", error), Tone::Bad);
        writeln!(self.out)?;
        writeln!(self.out, "{}", msg)
    }
}

impl<W: Write> ScanObserver for ReportPresenter<W> {
    fn table_started(&mut self, index: usize, total: usize, table: &str) -> io::Result<()> {
        write!(self.out, "[{}/{}] {}", index, total, table)?;
        self.out.flush()
    }

    fn table_finished(&mut self, _table: &str, status: TableStatus) -> io::Result<()> {
        let tone = match status {
            TableStatus::Ok => Tone::Good,
            TableStatus::Failed => Tone::Bad,
        };
        let tag = self.paint(&format!("[{}]", status), tone);
        writeln!(self.out, " -> {}", tag)
    }
}
