//! Interactive, confirmed removal of orphaned rows.

use std::io::{self, BufRead, Write};

use crate::errors::AuditError;
use crate::models::IssueRegistry;
use crate::orphans::OrphanDetector;
use crate::report::ReportPresenter;

/// Answers accepted as confirmation, compared after trimming and lowercasing.
pub const AFFIRMATIVE_ANSWERS: [&str; 2] = ["y", "yes"];

pub fn is_affirmative(answer: &str) -> bool {
    let answer = answer.trim().to_lowercase();
    AFFIRMATIVE_ANSWERS.contains(&answer.as_str())
}

/// Blocking source of operator answers, one line per prompt.
pub trait AnswerSource {
    /// Next answer, or `None` once input is exhausted.
    fn read_answer(&mut self) -> io::Result<Option<String>>;
}

/// Reads answers from a buffered reader, normally stdin.
pub struct LineAnswers<R> {
    reader: R,
}

impl<R: BufRead> LineAnswers<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl LineAnswers<io::StdinLock<'static>> {
    pub fn stdin() -> Self {
        Self::new(io::stdin().lock())
    }
}

impl<R: BufRead> AnswerSource for LineAnswers<R> {
    fn read_answer(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    }
}

/// What happened to one issue during a repair session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairOutcome {
    /// The re-count found nothing left to delete.
    AlreadyResolved,
    /// Rows actually removed.
    Deleted(u64),
    /// The operator declined this issue.
    Skipped,
    /// The re-count or delete failed; the issue is left unresolved.
    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairSummary {
    /// The operator declined the session-level confirmation.
    pub cancelled: bool,
    /// One entry per issue, in registry order.
    pub outcomes: Vec<RepairOutcome>,
}

impl RepairSummary {
    pub fn rows_deleted(&self) -> u64 {
        self.outcomes
            .iter()
            .map(|o| match o {
                RepairOutcome::Deleted(rows) => *rows,
                _ => 0,
            })
            .sum()
    }
}

pub struct RepairSession<'a, D, A, W: Write> {
    detector: &'a D,
    answers: &'a mut A,
    presenter: &'a mut ReportPresenter<W>,
}

impl<'a, D, A, W> RepairSession<'a, D, A, W>
where
    D: OrphanDetector,
    A: AnswerSource,
    W: Write,
{
    pub fn new(detector: &'a D, answers: &'a mut A, presenter: &'a mut ReportPresenter<W>) -> Self {
        Self {
            detector,
            answers,
            presenter,
        }
    }

    fn confirm(&mut self, question: &str) -> Result<bool, AuditError> {
        self.presenter.prompt(question)?;
        let answer = self.answers.read_answer()?;
        Ok(answer.as_deref().is_some_and(is_affirmative))
    }

    /// Walks the registry, re-checking and confirming each issue before
    /// deleting. A failure the session cannot recover from (lost connection,
    /// terminal I/O) ends it early; others are recorded as `Failed`.
    pub async fn run(&mut self, registry: &IssueRegistry) -> Result<RepairSummary, AuditError> {
        let mut summary = RepairSummary::default();

        if registry.is_empty() {
            self.presenter.nothing_to_fix()?;
            return Ok(summary);
        }

        self.presenter.repair_header()?;
        if !self.confirm("Are you sure you want to continue?")? {
            self.presenter.cancelled()?;
            tracing::info!("Repair session cancelled by operator");
            summary.cancelled = true;
            return Ok(summary);
        }

        let total = registry.len();
        for (idx, issue) in registry.iter().enumerate() {
            self.presenter.issue_header(idx + 1, total, issue)?;
            let fk = issue.fix();

            let count = match self.detector.count(fk).await {
                Ok(count) => count,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!("Could not re-count orphans for {}: {}", fk, e);
                    self.presenter.repair_failed(&e)?;
                    summary.outcomes.push(RepairOutcome::Failed(e.to_string()));
                    continue;
                }
            };

            if count == 0 {
                self.presenter.already_resolved()?;
                summary.outcomes.push(RepairOutcome::AlreadyResolved);
                continue;
            }

            self.presenter.impact(count, fk)?;
            if !self.confirm("Proceed with deletion?")? {
                self.presenter.skipped()?;
                summary.outcomes.push(RepairOutcome::Skipped);
                continue;
            }

            match self.detector.delete_orphans(fk).await {
                Ok(rows) => {
                    self.presenter.deleted(rows, &fk.child_table)?;
                    summary.outcomes.push(RepairOutcome::Deleted(rows));
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!("Repair of {} failed: {}", fk, e);
                    self.presenter.repair_failed(&e)?;
                    summary.outcomes.push(RepairOutcome::Failed(e.to_string()));
                }
            }
        }

        self.presenter.finished()?;
        Ok(summary)
    }
}
