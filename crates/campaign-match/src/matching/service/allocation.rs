use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::super::allocation::{
    compare_choices, eligibility, rank, select_role, AllocationRequest, AllocationSummary,
    AssignedEntry, Assignment, AssignmentId, AssignmentPerformance, AssignmentRole,
    AssignmentSource, AssignmentStatus, BatchAllocationReport, CandidateFailure, FailedEntry,
    FailureReason, JobControl, RankedEntry, SkipReason, SkippedEntry,
};
use super::super::domain::{ActivityRecord, Candidate, CandidateId, EntityRef, SupporterId};
use super::super::error::{EngineError, ValidationError};
use super::super::repository::{ActivityLedger, ProfileStore, SlotReservation, StoreError};
use super::MatchingService;

/// Result of a reservation attempt after the single permitted retry.
enum Reservation {
    Reserved { assigned: u32 },
    Full { assigned: u32 },
    Lost { assigned: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ManualAssignmentOutcome {
    Created { assignment: Assignment },
    Skipped { reason: SkipReason },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityChange {
    pub candidate_id: CandidateId,
    pub previous_cap: Option<u32>,
    pub cap: Option<u32>,
    pub assigned: u32,
    pub superseded: Vec<AssignmentId>,
}

impl<S, L> MatchingService<S, L>
where
    S: ProfileStore + 'static,
    L: ActivityLedger + 'static,
{
    /// Reallocates one candidate's automatic assignments from a fresh ranking.
    ///
    /// Manual assignments keep their slots and are never superseded. Supporters are
    /// ranked by affinity (score descending, id ascending) and assigned until the cap
    /// or `max_to_assign` is reached; everyone else is skipped with a reason.
    pub fn allocate_batch(
        &self,
        candidate_id: &CandidateId,
        request: AllocationRequest,
    ) -> Result<AllocationSummary, EngineError> {
        request.validate()?;
        let candidate = self.load_candidate(candidate_id)?;
        let mut summary = AllocationSummary::new(candidate_id.clone(), candidate.capacity.cap);

        let manual_pairs = self.clear_automatic(candidate_id, &mut summary)?;
        let mut candidate = self.load_candidate(candidate_id)?;
        let ranked = self.rank_pool(&candidate, request.min_score, &mut summary)?;

        info!(
            %candidate_id,
            ranked = ranked.len(),
            cleared = summary.cleared_automatic,
            preserved = summary.preserved_manual,
            cap = ?candidate.capacity.cap,
            "allocating batch"
        );

        for entry in ranked {
            if summary.assigned.len() as u64 >= u64::from(request.max_to_assign) {
                break;
            }
            if manual_pairs.contains(&entry.supporter_id) {
                summary.skipped.push(SkippedEntry {
                    supporter_id: entry.supporter_id,
                    score: entry.score,
                    reason: SkipReason::AlreadyAssigned,
                });
                continue;
            }
            if !candidate.capacity.has_room() {
                summary.skipped.push(SkippedEntry {
                    supporter_id: entry.supporter_id,
                    score: entry.score,
                    reason: SkipReason::AtCapacity,
                });
                continue;
            }

            match self.reserve_with_retry(candidate_id, candidate.capacity.assigned) {
                Ok(Reservation::Reserved { assigned }) => {
                    candidate.capacity.assigned = assigned;
                    let inserted = self
                        .build_assignment(&entry, candidate_id, AssignmentSource::Automatic, None)
                        .and_then(|assignment| self.store.insert_assignment(assignment));
                    match inserted {
                        Ok(stored) => summary.assigned.push(AssignedEntry {
                            supporter_id: stored.supporter_id,
                            assignment_id: stored.id,
                            score: stored.score,
                            role: stored.role,
                            assignment_type: stored.assignment_type,
                            base_priority: stored.base_priority,
                        }),
                        Err(error) => {
                            self.release_reserved(candidate_id, &mut candidate);
                            match error {
                                StoreError::Conflict => summary.skipped.push(SkippedEntry {
                                    supporter_id: entry.supporter_id,
                                    score: entry.score,
                                    reason: SkipReason::AlreadyAssigned,
                                }),
                                other => summary.failed.push(FailedEntry::from_error(
                                    entry.supporter_id,
                                    &EngineError::Store(other),
                                )),
                            }
                        }
                    }
                }
                Ok(Reservation::Full { assigned }) => {
                    candidate.capacity.assigned = assigned;
                    summary.skipped.push(SkippedEntry {
                        supporter_id: entry.supporter_id,
                        score: entry.score,
                        reason: SkipReason::AtCapacity,
                    });
                }
                Ok(Reservation::Lost { assigned }) => {
                    candidate.capacity.assigned = assigned;
                    warn!(%candidate_id, supporter_id = %entry.supporter_id, "slot race lost twice");
                    summary.failed.push(FailedEntry::from_error(
                        entry.supporter_id,
                        &EngineError::ConcurrencyConflict(EntityRef::Candidate(
                            candidate_id.clone(),
                        )),
                    ));
                }
                Err(error) => {
                    summary.failed.push(FailedEntry::from_error(
                        entry.supporter_id,
                        &EngineError::Store(error),
                    ));
                }
            }
        }

        info!(
            %candidate_id,
            assigned = summary.assigned.len(),
            at_capacity = summary.skipped_for(SkipReason::AtCapacity),
            already_assigned = summary.skipped_for(SkipReason::AlreadyAssigned),
            failed = summary.failed.len(),
            "batch allocation complete"
        );
        Ok(summary)
    }

    /// Supersedes automatic slot holders and returns the supporters holding manual slots.
    fn clear_automatic(
        &self,
        candidate_id: &CandidateId,
        summary: &mut AllocationSummary,
    ) -> Result<BTreeSet<SupporterId>, EngineError> {
        let now = self.now();
        let mut manual_pairs = BTreeSet::new();
        for mut assignment in self.store.assignments_for_candidate(candidate_id)? {
            if !assignment.holds_slot() {
                continue;
            }
            if assignment.is_manual() {
                summary.preserved_manual += 1;
                manual_pairs.insert(assignment.supporter_id);
                continue;
            }
            let expected = assignment.status;
            let assignment_id = assignment.id.clone();
            assignment.supersede(now);
            if self.store.swap_assignment(assignment, expected)? {
                summary.cleared_automatic += 1;
            } else {
                debug!(%candidate_id, %assignment_id, "assignment moved on before it was cleared");
            }
        }
        Ok(manual_pairs)
    }

    /// Builds the bounded ranking for one candidate, paging through supporters.
    fn rank_pool(
        &self,
        candidate: &Candidate,
        min_score: f32,
        summary: &mut AllocationSummary,
    ) -> Result<Vec<RankedEntry>, EngineError> {
        let mut ranked = Vec::new();
        self.for_each_supporter(|supporter| {
            if let Err(reason) = eligibility(&supporter, candidate) {
                debug!(supporter_id = %supporter.id, ?reason, "supporter ineligible");
                summary.ineligible += 1;
                return Ok(());
            }
            match self.affinity_for(&supporter, candidate) {
                Ok(score) if score.total_score >= min_score => ranked.push(RankedEntry {
                    supporter_id: supporter.id,
                    score: score.total_score,
                    grade: supporter.grade,
                    skills: supporter.skills,
                }),
                Ok(_) => summary.below_min_score += 1,
                Err(error) => {
                    warn!(supporter_id = %supporter.id, error = %error, "affinity failed");
                    summary
                        .failed
                        .push(FailedEntry::from_error(supporter.id, &error));
                }
            }
            Ok(())
        })?;
        rank(&mut ranked);
        Ok(ranked)
    }

    fn reserve_with_retry(
        &self,
        candidate_id: &CandidateId,
        expected_assigned: u32,
    ) -> Result<Reservation, StoreError> {
        let mut expected = expected_assigned;
        for attempt in 0..2 {
            match self.store.reserve_slot(candidate_id, expected)? {
                SlotReservation::Reserved { assigned } => {
                    return Ok(Reservation::Reserved { assigned })
                }
                SlotReservation::AtCapacity { assigned, .. } => {
                    return Ok(Reservation::Full { assigned })
                }
                SlotReservation::Contended { assigned } => {
                    debug!(%candidate_id, attempt, expected, assigned, "slot counter moved");
                    expected = assigned;
                }
            }
        }
        Ok(Reservation::Lost { assigned: expected })
    }

    fn release_reserved(&self, candidate_id: &CandidateId, candidate: &mut Candidate) {
        match self.store.release_slot(candidate_id) {
            Ok(()) => {
                candidate.capacity.assigned = candidate.capacity.assigned.saturating_sub(1);
            }
            Err(error) => warn!(%candidate_id, error = %error, "failed to release reserved slot"),
        }
    }

    fn build_assignment(
        &self,
        entry: &RankedEntry,
        candidate_id: &CandidateId,
        source: AssignmentSource,
        role: Option<AssignmentRole>,
    ) -> Result<Assignment, StoreError> {
        let config = self.allocation_config();
        let now = self.now();
        let assignment_type = config.bands.assignment_type(entry.score);
        let role = role.unwrap_or_else(|| {
            select_role(&config.role_rules, entry.score, entry.grade, &entry.skills)
        });
        let status = match source {
            AssignmentSource::Automatic => AssignmentStatus::Proposed,
            AssignmentSource::Manual => AssignmentStatus::Accepted,
        };

        Ok(Assignment {
            id: self.store.next_assignment_id()?,
            supporter_id: entry.supporter_id.clone(),
            candidate_id: candidate_id.clone(),
            role,
            assignment_type,
            base_priority: assignment_type.base_priority(),
            status,
            source,
            score: entry.score,
            grade: entry.grade,
            assigned_at: now,
            updated_at: now,
            performance: AssignmentPerformance::default(),
        })
    }

    /// Picks the best candidate with room for one supporter and assigns it.
    ///
    /// Candidates the supporter already holds a slot with, candidates at capacity and
    /// scores below `single_match_min_score` are excluded. A lost reservation falls
    /// through to the next best candidate. Returns `None` when nothing qualifies.
    pub fn allocate_for_supporter(
        &self,
        supporter_id: &SupporterId,
    ) -> Result<Option<Assignment>, EngineError> {
        let supporter = self.load_supporter(supporter_id)?;
        let held: BTreeSet<CandidateId> = self
            .store
            .assignments_for_supporter(supporter_id)?
            .into_iter()
            .filter(Assignment::holds_slot)
            .map(|assignment| assignment.candidate_id)
            .collect();
        let min_score = self.allocation_config().single_match_min_score;

        let mut choices: Vec<(CandidateId, f32)> = Vec::new();
        self.for_each_candidate(|candidate| {
            if held.contains(&candidate.id)
                || !candidate.capacity.has_room()
                || eligibility(&supporter, &candidate).is_err()
            {
                return Ok(true);
            }
            let score = self.affinity_for(&supporter, &candidate)?;
            if score.total_score >= min_score {
                choices.push((candidate.id, score.total_score));
            }
            Ok(true)
        })?;
        choices.sort_by(compare_choices);

        for (candidate_id, score) in choices {
            let candidate = self.load_candidate(&candidate_id)?;
            if !candidate.capacity.has_room() {
                continue;
            }
            match self.reserve_with_retry(&candidate_id, candidate.capacity.assigned)? {
                Reservation::Reserved { .. } => {}
                Reservation::Full { .. } | Reservation::Lost { .. } => {
                    debug!(%supporter_id, %candidate_id, "best match unavailable; trying next");
                    continue;
                }
            }

            let entry = RankedEntry {
                supporter_id: supporter.id.clone(),
                score,
                grade: supporter.grade,
                skills: supporter.skills.clone(),
            };
            let inserted = self
                .build_assignment(&entry, &candidate_id, AssignmentSource::Automatic, None)
                .and_then(|assignment| self.store.insert_assignment(assignment));
            match inserted {
                Ok(stored) => {
                    info!(%supporter_id, %candidate_id, score, "single best match assigned");
                    return Ok(Some(stored));
                }
                Err(StoreError::Conflict) => {
                    self.store.release_slot(&candidate_id)?;
                }
                Err(error) => {
                    self.store.release_slot(&candidate_id)?;
                    return Err(error.into());
                }
            }
        }

        info!(%supporter_id, "no eligible candidate with room");
        Ok(None)
    }

    /// Runs [`Self::allocate_batch`] for every candidate, checking `control` between
    /// candidates. Per-candidate failures are collected.
    pub fn allocate_all(
        &self,
        request: AllocationRequest,
        control: &JobControl,
    ) -> Result<BatchAllocationReport, EngineError> {
        request.validate()?;
        let mut report = BatchAllocationReport {
            summaries: Vec::new(),
            failures: Vec::new(),
            cancelled: false,
        };

        self.for_each_candidate(|candidate| {
            if control.is_cancelled() {
                info!(
                    processed = report.summaries.len() + report.failures.len(),
                    "allocation job cancelled"
                );
                report.cancelled = true;
                return Ok(false);
            }
            match self.allocate_batch(&candidate.id, request) {
                Ok(summary) => report.summaries.push(summary),
                Err(error) => {
                    warn!(candidate_id = %candidate.id, error = %error, "candidate allocation failed");
                    report.failures.push(CandidateFailure {
                        candidate_id: candidate.id,
                        reason: FailureReason::from(&error),
                        message: error.to_string(),
                    });
                }
            }
            Ok(true)
        })?;

        Ok(report)
    }

    /// Moves the pair's live assignment through its state machine. Terminal states
    /// release the capacity slot.
    pub fn update_assignment_status(
        &self,
        supporter_id: &SupporterId,
        candidate_id: &CandidateId,
        status: AssignmentStatus,
    ) -> Result<Assignment, EngineError> {
        let mut assignment = self
            .store
            .assignments_for_supporter(supporter_id)?
            .into_iter()
            .find(|assignment| &assignment.candidate_id == candidate_id && assignment.holds_slot())
            .ok_or(StoreError::NotFound)?;

        let previous = assignment.status;
        assignment.transition(status, self.now())?;
        if !self.store.swap_assignment(assignment.clone(), previous)? {
            return Err(EngineError::ConcurrencyConflict(EntityRef::Candidate(
                candidate_id.clone(),
            )));
        }

        info!(
            %supporter_id,
            %candidate_id,
            from = previous.label(),
            to = status.label(),
            "assignment status updated"
        );
        Ok(assignment)
    }

    /// Records an operator-approved assignment. It takes a slot through the same atomic
    /// reservation and is never superseded by batch runs.
    pub fn create_manual_assignment(
        &self,
        supporter_id: &SupporterId,
        candidate_id: &CandidateId,
        role: Option<AssignmentRole>,
    ) -> Result<ManualAssignmentOutcome, EngineError> {
        let supporter = self.load_supporter(supporter_id)?;
        let candidate = self.load_candidate(candidate_id)?;

        let already = self
            .store
            .assignments_for_supporter(supporter_id)?
            .into_iter()
            .any(|assignment| &assignment.candidate_id == candidate_id && assignment.holds_slot());
        if already {
            return Ok(ManualAssignmentOutcome::Skipped {
                reason: SkipReason::AlreadyAssigned,
            });
        }

        let score = self.affinity_for(&supporter, &candidate)?;
        match self.reserve_with_retry(candidate_id, candidate.capacity.assigned)? {
            Reservation::Reserved { .. } => {}
            Reservation::Full { .. } => {
                return Ok(ManualAssignmentOutcome::Skipped {
                    reason: SkipReason::AtCapacity,
                })
            }
            Reservation::Lost { .. } => {
                return Err(EngineError::ConcurrencyConflict(EntityRef::Candidate(
                    candidate_id.clone(),
                )))
            }
        }

        let entry = RankedEntry {
            supporter_id: supporter.id.clone(),
            score: score.total_score,
            grade: supporter.grade,
            skills: supporter.skills.clone(),
        };
        let inserted = self
            .build_assignment(&entry, candidate_id, AssignmentSource::Manual, role)
            .and_then(|assignment| self.store.insert_assignment(assignment));
        let stored = match inserted {
            Ok(stored) => stored,
            Err(error) => {
                self.store.release_slot(candidate_id)?;
                return Err(error.into());
            }
        };

        info!(%supporter_id, %candidate_id, role = stored.role.label(), "manual assignment recorded");
        Ok(ManualAssignmentOutcome::Created { assignment: stored })
    }

    /// Changes a candidate's cap. Lowering it below the current slot count supersedes
    /// the lowest-scoring automatic assignments; manual ones are never displaced.
    pub fn set_capacity(
        &self,
        candidate_id: &CandidateId,
        cap: Option<u32>,
    ) -> Result<CapacityChange, EngineError> {
        let mut superseded = Vec::new();

        for attempt in 0..2 {
            let holders: Vec<Assignment> = self
                .store
                .assignments_for_candidate(candidate_id)?
                .into_iter()
                .filter(Assignment::holds_slot)
                .collect();
            let manual = holders.iter().filter(|holder| holder.is_manual()).count() as u32;

            if let Some(requested) = cap {
                if manual > requested {
                    return Err(ValidationError::CapBelowManual {
                        candidate: candidate_id.clone(),
                        requested,
                        manual,
                    }
                    .into());
                }

                let excess = (holders.len() as u32).saturating_sub(requested) as usize;
                if excess > 0 {
                    let mut automatic: Vec<Assignment> = holders
                        .into_iter()
                        .filter(|holder| !holder.is_manual())
                        .collect();
                    automatic.sort_by(|left, right| {
                        left.score
                            .total_cmp(&right.score)
                            .then_with(|| right.supporter_id.cmp(&left.supporter_id))
                    });
                    let now = self.now();
                    for mut assignment in automatic.into_iter().take(excess) {
                        let expected = assignment.status;
                        let assignment_id = assignment.id.clone();
                        assignment.supersede(now);
                        if self.store.swap_assignment(assignment, expected)? {
                            superseded.push(assignment_id);
                        }
                    }
                }
            }

            let mut candidate = self.load_candidate(candidate_id)?;
            let previous_cap = candidate.capacity.cap;
            candidate.capacity.cap = cap;
            match self.store.save_candidate(candidate) {
                Ok(saved) => {
                    info!(
                        %candidate_id,
                        previous = ?previous_cap,
                        cap = ?saved.capacity.cap,
                        superseded = superseded.len(),
                        "candidate capacity changed"
                    );
                    return Ok(CapacityChange {
                        candidate_id: candidate_id.clone(),
                        previous_cap,
                        cap: saved.capacity.cap,
                        assigned: saved.capacity.assigned,
                        superseded,
                    });
                }
                Err(StoreError::VersionMismatch { .. }) => {
                    debug!(%candidate_id, attempt, "candidate changed during cap update; retrying");
                }
                Err(error) => return Err(error.into()),
            }
        }

        Err(EngineError::ConcurrencyConflict(EntityRef::Candidate(
            candidate_id.clone(),
        )))
    }

    /// Credits validated activity to the supporter's live assignment with that candidate.
    pub(crate) fn record_assignment_activity(
        &self,
        record: &ActivityRecord,
    ) -> Result<Option<AssignmentId>, EngineError> {
        let Some(candidate_id) = &record.candidate_id else {
            return Ok(None);
        };
        if !record.status.counts_toward_totals() || record.reverses.is_some() {
            return Ok(None);
        }

        let live = self
            .store
            .assignments_for_supporter(&record.supporter_id)?
            .into_iter()
            .find(|assignment| &assignment.candidate_id == candidate_id && assignment.holds_slot());
        let Some(mut assignment) = live else {
            return Ok(None);
        };

        let expected = assignment.status;
        assignment.performance.record(record.kind, record.occurred_at);
        assignment.updated_at = self.now();
        let id = assignment.id.clone();
        if !self.store.swap_assignment(assignment, expected)? {
            debug!(assignment_id = %id, "assignment moved on; activity not credited");
            return Ok(None);
        }
        debug!(assignment_id = %id, activity_id = %record.activity_id, "assignment performance updated");
        Ok(Some(id))
    }
}
