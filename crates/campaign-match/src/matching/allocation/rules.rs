use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::super::domain::{Grade, SkillTag};
use super::super::error::ValidationError;
use super::assignment::{AssignmentRole, AssignmentType, PriorityModifier};

/// One row of the role decision table. Every populated condition must hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleRule {
    pub role: AssignmentRole,
    pub min_score: f32,
    #[serde(default)]
    pub min_grade: Option<Grade>,
    #[serde(default)]
    pub required_skill: Option<SkillTag>,
}

impl RoleRule {
    fn matches(&self, score: f32, grade: Grade, skills: &BTreeSet<SkillTag>) -> bool {
        score >= self.min_score
            && self.min_grade.map_or(true, |min| grade >= min)
            && self
                .required_skill
                .map_or(true, |skill| skills.contains(&skill))
    }
}

pub const DEFAULT_ROLE: AssignmentRole = AssignmentRole::GeneralSupporter;

pub fn default_role_rules() -> Vec<RoleRule> {
    vec![
        RoleRule {
            role: AssignmentRole::MajorDonorHost,
            min_score: 70.0,
            min_grade: Some(Grade::AMinus),
            required_skill: None,
        },
        RoleRule {
            role: AssignmentRole::FieldOrganizer,
            min_score: 60.0,
            min_grade: None,
            required_skill: Some(SkillTag::Canvassing),
        },
        RoleRule {
            role: AssignmentRole::PhoneBanker,
            min_score: 50.0,
            min_grade: None,
            required_skill: Some(SkillTag::PhoneBanking),
        },
        RoleRule {
            role: AssignmentRole::EventHost,
            min_score: 50.0,
            min_grade: None,
            required_skill: Some(SkillTag::EventPlanning),
        },
        RoleRule {
            role: AssignmentRole::DigitalAmbassador,
            min_score: 40.0,
            min_grade: None,
            required_skill: Some(SkillTag::Digital),
        },
    ]
}

/// First matching rule wins; no match falls back to [`DEFAULT_ROLE`].
pub fn select_role(
    rules: &[RoleRule],
    score: f32,
    grade: Grade,
    skills: &BTreeSet<SkillTag>,
) -> AssignmentRole {
    rules
        .iter()
        .find(|rule| rule.matches(score, grade, skills))
        .map(|rule| rule.role)
        .unwrap_or(DEFAULT_ROLE)
}

/// Score bands (inclusive lower bounds) for assignment types.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssignmentBands {
    pub primary: f32,
    pub secondary: f32,
}

impl Default for AssignmentBands {
    fn default() -> Self {
        Self {
            primary: 75.0,
            secondary: 55.0,
        }
    }
}

impl AssignmentBands {
    pub fn assignment_type(&self, score: f32) -> AssignmentType {
        if score >= self.primary {
            AssignmentType::Primary
        } else if score >= self.secondary {
            AssignmentType::Secondary
        } else {
            AssignmentType::Backup
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(self.primary <= 100.0 && self.primary > self.secondary && self.secondary >= 0.0) {
            return Err(ValidationError::AllocationSettings(format!(
                "assignment bands must descend within [0, 100] (primary {}, secondary {})",
                self.primary, self.secondary
            )));
        }
        Ok(())
    }
}

/// Bounds applied when folding priority modifiers into an effective priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifierClamps {
    pub per_modifier: i8,
    pub total: i8,
    pub min_priority: u8,
    pub max_priority: u8,
}

impl Default for ModifierClamps {
    fn default() -> Self {
        Self {
            per_modifier: 3,
            total: 5,
            min_priority: 1,
            max_priority: 10,
        }
    }
}

impl ModifierClamps {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.per_modifier < 0 || self.total < 0 || self.min_priority > self.max_priority {
            return Err(ValidationError::AllocationSettings(
                "modifier clamps must be non-negative with min_priority <= max_priority"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Applies live modifiers whose tag the supporter carries. The base priority is not
/// modified; the result is only used for ordering and display.
pub fn effective_priority(
    base_priority: u8,
    modifiers: &[PriorityModifier],
    tags: &BTreeSet<String>,
    now: DateTime<Utc>,
    clamps: &ModifierClamps,
) -> u8 {
    let total: i32 = modifiers
        .iter()
        .filter(|modifier| modifier.is_live(now) && tags.contains(&modifier.tag))
        .map(|modifier| i32::from(modifier.delta.clamp(-clamps.per_modifier, clamps.per_modifier)))
        .sum();
    let total = total.clamp(-i32::from(clamps.total), i32::from(clamps.total));

    let adjusted = (i32::from(base_priority) + total).clamp(
        i32::from(clamps.min_priority),
        i32::from(clamps.max_priority),
    );
    adjusted as u8
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn modifier(tag: &str, delta: i8) -> PriorityModifier {
        PriorityModifier {
            id: format!("mod-{tag}"),
            tag: tag.to_string(),
            candidate_id: None,
            delta,
            active: true,
            expires_at: None,
        }
    }

    fn tags(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn first_matching_role_rule_wins() {
        let rules = default_role_rules();
        let skills: BTreeSet<SkillTag> =
            [SkillTag::Canvassing, SkillTag::Digital].into_iter().collect();

        assert_eq!(
            select_role(&rules, 72.0, Grade::A, &skills),
            AssignmentRole::MajorDonorHost
        );
        assert_eq!(
            select_role(&rules, 65.0, Grade::C, &skills),
            AssignmentRole::FieldOrganizer
        );
        assert_eq!(
            select_role(&rules, 45.0, Grade::C, &skills),
            AssignmentRole::DigitalAmbassador
        );
        assert_eq!(
            select_role(&rules, 30.0, Grade::APlusPlus, &BTreeSet::new()),
            DEFAULT_ROLE
        );
    }

    #[test]
    fn bands_map_scores_to_types_and_priorities() {
        let bands = AssignmentBands::default();
        assert_eq!(bands.assignment_type(75.0), AssignmentType::Primary);
        assert_eq!(bands.assignment_type(74.99), AssignmentType::Secondary);
        assert_eq!(bands.assignment_type(10.0), AssignmentType::Backup);
        assert_eq!(AssignmentType::Primary.base_priority(), 2);
        assert_eq!(AssignmentType::Backup.base_priority(), 8);
    }

    #[test]
    fn modifiers_are_clamped_individually_and_in_sum() {
        let now = Utc::now();
        let clamps = ModifierClamps::default();
        let modifiers = vec![
            modifier("lapsed", 9),
            modifier("no_show", 2),
            modifier("board_member", -1),
        ];

        let demoted = effective_priority(2, &modifiers, &tags(&["lapsed", "no_show"]), now, &clamps);
        assert_eq!(demoted, 7);

        let promoted = effective_priority(2, &modifiers, &tags(&["board_member"]), now, &clamps);
        assert_eq!(promoted, 1);

        let capped = effective_priority(8, &modifiers, &tags(&["lapsed", "no_show"]), now, &clamps);
        assert_eq!(capped, 10);
    }

    #[test]
    fn inactive_and_expired_modifiers_do_not_apply() {
        let now = Utc::now();
        let mut inactive = modifier("vip", -3);
        inactive.active = false;
        let mut expired = modifier("vip", -3);
        expired.expires_at = Some(now - Duration::minutes(1));

        let priority = effective_priority(
            5,
            &[inactive, expired],
            &tags(&["vip"]),
            now,
            &ModifierClamps::default(),
        );
        assert_eq!(priority, 5);
    }
}
