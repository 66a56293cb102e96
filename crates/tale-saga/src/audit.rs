use std::time::Instant;

/// Status of a step in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum StepStatus {
    /// Step executed successfully.
    Executed,
    /// Step failed during execution.
    Failed,
    /// Step was compensated successfully.
    Compensated,
    /// Step compensation failed.
    CompensationFailed,
}

/// Record of a step's execution in the saga.
#[derive(Debug)]
pub struct StepRecord {
    /// Name of the step.
    pub name: String,
    /// Current status.
    pub status: StepStatus,
    /// When the step started executing.
    pub started_at: Instant,
    /// When the step completed (execution or compensation).
    pub completed_at: Option<Instant>,
    /// Description of compensation (if applicable).
    pub compensation_description: Option<String>,
    /// How many times the step was executed, retries included.
    pub attempts: usize,
}

/// Audit log tracking all step executions in a saga run.
///
/// Records are kept in the order steps were started, which is saga order for
/// every runner, so a record's position is its step's position.
#[derive(Debug, Default)]
pub struct SagaAuditLog {
    records: Vec<StepRecord>,
}

impl SagaAuditLog {
    /// Create a new empty audit log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a step execution starting.
    pub(crate) fn record_start(&mut self, name: &str) {
        self.records.push(StepRecord {
            name: name.to_string(),
            status: StepStatus::Executed,
            started_at: Instant::now(),
            completed_at: None,
            compensation_description: None,
            attempts: 0,
        });
    }

    /// Mark a step as failed.
    pub(crate) fn record_failure(&mut self, index: usize, attempts: usize) {
        if let Some(record) = self.records.get_mut(index) {
            record.status = StepStatus::Failed;
            record.completed_at = Some(Instant::now());
            record.attempts = attempts;
        }
    }

    /// Mark a step as completed successfully.
    pub(crate) fn record_success(
        &mut self,
        index: usize,
        compensation_description: String,
        attempts: usize,
    ) {
        if let Some(record) = self.records.get_mut(index) {
            record.status = StepStatus::Executed;
            record.completed_at = Some(Instant::now());
            record.compensation_description = Some(compensation_description);
            record.attempts = attempts;
        }
    }

    /// Record that a step was compensated.
    pub(crate) fn record_compensated(&mut self, index: usize) {
        self.set_compensation_status(index, StepStatus::Compensated);
    }

    /// Record that a step's compensation failed.
    pub(crate) fn record_compensation_failed(&mut self, index: usize) {
        self.set_compensation_status(index, StepStatus::CompensationFailed);
    }

    fn set_compensation_status(&mut self, index: usize, status: StepStatus) {
        if let Some(record) = self.records.get_mut(index) {
            record.status = status;
            record.completed_at = Some(Instant::now());
        }
    }

    /// Get all records in the audit log.
    #[must_use]
    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    /// Get a summary of the saga execution for display.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        for record in &self.records {
            let status = match record.status {
                StepStatus::Executed => "✓",
                StepStatus::Failed => "✗",
                StepStatus::Compensated => "↩",
                StepStatus::CompensationFailed => "⚠",
            };
            if record.attempts > 1 {
                lines.push(format!(
                    "{status} {} ({} attempts)",
                    record.name, record.attempts
                ));
            } else {
                lines.push(format!("{status} {}", record.name));
            }
        }
        lines.join("\n")
    }
}
