use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::super::allocation::FailureReason;
use super::super::domain::{EntityRef, Supporter, SupporterId};
use super::super::error::EngineError;
use super::super::grading::GradeOutcome;
use super::super::repository::{ActivityLedger, LedgerError, ProfileStore, StoreError};
use super::MatchingService;

/// Counts from a bulk grading pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecalcReport {
    pub processed: u32,
    pub updated: u32,
    pub unchanged: u32,
    pub deferred: u32,
    pub failed: Vec<(SupporterId, FailureReason, String)>,
}

impl RecalcReport {
    fn record(&mut self, supporter_id: SupporterId, result: Result<GradeOutcome, EngineError>) {
        self.processed += 1;
        match result {
            Ok(GradeOutcome::Updated { .. }) => self.updated += 1,
            Ok(GradeOutcome::Unchanged { .. }) => self.unchanged += 1,
            Ok(GradeOutcome::Deferred { .. }) => self.deferred += 1,
            Err(error) => {
                warn!(%supporter_id, error = %error, "grade recomputation failed");
                self.failed
                    .push((supporter_id, FailureReason::from(&error), error.to_string()));
            }
        }
    }
}

impl<S, L> MatchingService<S, L>
where
    S: ProfileStore + 'static,
    L: ActivityLedger + 'static,
{
    /// Recomputes grade and lead score from the full ledger for one supporter.
    ///
    /// A lost version race is retried once against fresh state. Ledger failures keep
    /// the stored grade and queue the supporter for [`Self::process_deferred_recalcs`].
    pub fn recompute_grade(&self, supporter_id: &SupporterId) -> Result<GradeOutcome, EngineError> {
        for attempt in 0..2 {
            let supporter = self.load_supporter(supporter_id)?;
            let entries = match self.ledger.entries_for(supporter_id) {
                Ok(entries) => entries,
                Err(error) => return self.defer_grade(supporter, error),
            };

            let evaluation = self.grading.evaluate(&entries);
            if evaluation.matches(&supporter) && !supporter.needs_recalc {
                debug!(%supporter_id, grade = %supporter.grade, "grade unchanged");
                return Ok(GradeOutcome::Unchanged {
                    grade: supporter.grade,
                    lead_score: supporter.lead_score,
                });
            }

            let previous_grade = supporter.grade;
            let previous_lead_score = supporter.lead_score;
            let mut updated = supporter;
            evaluation.apply(&mut updated);

            match self.store.save_supporter(updated) {
                Ok(saved) => {
                    if saved.grade == previous_grade && saved.lead_score == previous_lead_score {
                        return Ok(GradeOutcome::Unchanged {
                            grade: saved.grade,
                            lead_score: saved.lead_score,
                        });
                    }
                    info!(
                        %supporter_id,
                        from = %previous_grade,
                        to = %saved.grade,
                        lead_score = saved.lead_score.value(),
                        "grade recomputed"
                    );
                    return Ok(GradeOutcome::Updated {
                        grade: saved.grade,
                        lead_score: saved.lead_score,
                        previous_grade,
                        previous_lead_score,
                    });
                }
                Err(StoreError::VersionMismatch { .. }) => {
                    debug!(%supporter_id, attempt, "supporter changed during grading; retrying");
                }
                Err(error) => return Err(error.into()),
            }
        }

        Err(EngineError::ConcurrencyConflict(EntityRef::Supporter(
            supporter_id.clone(),
        )))
    }

    fn defer_grade(
        &self,
        supporter: Supporter,
        error: LedgerError,
    ) -> Result<GradeOutcome, EngineError> {
        warn!(
            supporter_id = %supporter.id,
            error = %error,
            retained = %supporter.grade,
            "ledger read failed; keeping prior grade"
        );

        let outcome = GradeOutcome::Deferred {
            retained_grade: supporter.grade,
            retained_lead_score: supporter.lead_score,
            reason: error.to_string(),
        };
        let supporter_id = supporter.id.clone();

        if !supporter.needs_recalc {
            let mut flagged = supporter;
            flagged.needs_recalc = true;
            match self.store.save_supporter(flagged) {
                Ok(_) | Err(StoreError::VersionMismatch { .. }) => {}
                Err(error) => return Err(error.into()),
            }
        }
        self.store.enqueue_recalc(&supporter_id)?;

        Ok(outcome)
    }

    /// Retries up to `limit` supporters whose grading was deferred.
    pub fn process_deferred_recalcs(&self, limit: usize) -> Result<RecalcReport, EngineError> {
        let batch = self.store.take_recalc_batch(limit)?;
        let mut report = RecalcReport::default();
        for supporter_id in batch {
            let result = self.recompute_grade(&supporter_id);
            report.record(supporter_id, result);
        }
        info!(
            processed = report.processed,
            updated = report.updated,
            deferred = report.deferred,
            "deferred grade queue drained"
        );
        Ok(report)
    }

    /// Regrades every supporter; used after bulk ledger imports.
    pub fn recompute_all_grades(&self) -> Result<RecalcReport, EngineError> {
        let mut report = RecalcReport::default();
        self.for_each_supporter(|supporter| {
            let result = self.recompute_grade(&supporter.id);
            report.record(supporter.id, result);
            Ok(())
        })?;
        info!(
            processed = report.processed,
            updated = report.updated,
            failed = report.failed.len(),
            "grading pass complete"
        );
        Ok(report)
    }
}
