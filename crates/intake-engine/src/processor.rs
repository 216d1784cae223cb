use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use intake_core::{FieldError, RawRow, SchemaValidator};
use intake_rules::{FileContext, RowContext, RulePlan, evaluate};
use rayon::prelude::*;
use tracing::debug;

use crate::batch::batch_size_for;
use crate::config::EngineConfig;
use crate::errors::{FileParseError, ReadError, Result, RowParseError};
use crate::model::{BatchSummary, RowOutcome, WarehouseRow};
use crate::reader::RowResult;

/// Cooperative cancellation flag, honoured between batches.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

type PendingRow = std::result::Result<RawRow, RowParseError>;

/// Output of one batch: its summary, per-row outcomes and the rows to load.
#[derive(Debug, Clone)]
pub struct ProcessedBatch {
    pub summary: BatchSummary,
    pub outcomes: Vec<RowOutcome>,
    pub valid_rows: Vec<WarehouseRow>,
}

/// Validates a row stream batch by batch.
///
/// Rows of a batch are spread over a bounded worker pool unless the rule plan
/// keeps per-file state, in which case they run in row order on the caller.
pub struct BatchProcessor<'a> {
    validator: &'a SchemaValidator,
    plan: &'a RulePlan,
    file: FileContext,
    pool: Option<rayon::ThreadPool>,
    batch_size: usize,
    cancel: CancelToken,
}

impl<'a> BatchProcessor<'a> {
    pub fn new(
        validator: &'a SchemaValidator,
        plan: &'a RulePlan,
        config: &EngineConfig,
        file_size: u64,
        cancel: CancelToken,
    ) -> Result<Self> {
        let pool = if plan.is_stateful() || config.workers <= 1 {
            None
        } else {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(config.workers)
                    .thread_name(|index| format!("intake-worker-{index}"))
                    .build()?,
            )
        };

        Ok(Self {
            validator,
            plan,
            file: FileContext::new(config.processing_date()),
            pool,
            batch_size: batch_size_for(file_size, config.min_batch_size, config.max_batch_size),
            cancel,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn is_parallel(&self) -> bool {
        self.pool.is_some()
    }

    /// Lazily process `rows`, yielding one [`ProcessedBatch`] at a time.
    pub fn process<I>(self, rows: I) -> Batches<'a, I>
    where
        I: Iterator<Item = RowResult>,
    {
        Batches {
            processor: self,
            rows,
            next_batch: 0,
            file_error: None,
            cancelled: false,
            exhausted: false,
        }
    }

    fn run_batch(&self, batch_index: u64, items: Vec<PendingRow>) -> ProcessedBatch {
        let results: Vec<(RowOutcome, Option<WarehouseRow>)> = match &self.pool {
            Some(pool) => pool.install(|| {
                items
                    .into_par_iter()
                    .map(|item| self.process_item(item))
                    .collect()
            }),
            None => items.into_iter().map(|item| self.process_item(item)).collect(),
        };

        let mut outcomes = Vec::with_capacity(results.len());
        let mut valid_rows = Vec::new();
        for (outcome, values) in results {
            if let Some(values) = values {
                valid_rows.push(values);
            }
            outcomes.push(outcome);
        }

        let summary = BatchSummary::from_outcomes(batch_index, &outcomes);
        debug!(
            event = "batch_processed",
            batch_index,
            rows = summary.total_rows,
            valid_rows = summary.valid_rows,
            invalid_rows = summary.invalid_rows
        );
        ProcessedBatch {
            summary,
            outcomes,
            valid_rows,
        }
    }

    fn process_item(&self, item: PendingRow) -> (RowOutcome, Option<WarehouseRow>) {
        match item {
            Ok(row) => self.process_row(row),
            Err(err) => (
                RowOutcome::new(
                    err.row_index,
                    vec![FieldError::row_parse(err.row_index, err.message)],
                    Vec::new(),
                ),
                None,
            ),
        }
    }

    fn process_row(&self, row: RawRow) -> (RowOutcome, Option<WarehouseRow>) {
        let check = self.validator.check(&row, self.file.as_of());
        let violations = if check.has_critical() {
            Vec::new()
        } else {
            let context = RowContext::new(row.index, self.plan.record_type, &check.values);
            evaluate(&context, &self.file, self.plan)
        };

        let outcome = RowOutcome::new(row.index, check.errors, violations);
        let values = outcome.is_valid.then_some(check.values);
        (outcome, values)
    }
}

/// Lazy sequence of processed batches.
///
/// Stops after a file-level parse failure or a cancellation request; the
/// cause is available once iteration ends.
pub struct Batches<'a, I> {
    processor: BatchProcessor<'a>,
    rows: I,
    next_batch: u64,
    file_error: Option<FileParseError>,
    cancelled: bool,
    exhausted: bool,
}

impl<I> Batches<'_, I> {
    pub fn file_error(&self) -> Option<&FileParseError> {
        self.file_error.as_ref()
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn batch_size(&self) -> usize {
        self.processor.batch_size
    }
}

impl<I> Iterator for Batches<'_, I>
where
    I: Iterator<Item = RowResult>,
{
    type Item = ProcessedBatch;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted || self.cancelled {
            return None;
        }
        if self.processor.cancel.is_cancelled() {
            self.cancelled = true;
            return None;
        }

        let mut items = Vec::with_capacity(self.processor.batch_size);
        while items.len() < self.processor.batch_size {
            match self.rows.next() {
                None => {
                    self.exhausted = true;
                    break;
                }
                Some(Err(ReadError::File(err))) => {
                    self.file_error = Some(err);
                    self.exhausted = true;
                    break;
                }
                Some(Ok(row)) => items.push(Ok(row)),
                Some(Err(ReadError::Row(err))) => items.push(Err(err)),
            }
        }

        if items.is_empty() {
            return None;
        }

        let batch_index = self.next_batch;
        self.next_batch += 1;
        Some(self.processor.run_batch(batch_index, items))
    }
}
