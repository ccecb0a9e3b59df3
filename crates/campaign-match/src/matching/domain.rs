use std::collections::BTreeSet;
use std::fmt;
use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::error::ValidationError;

/// Identifier wrapper for supporters (donors and volunteers).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SupporterId(pub String);

/// Identifier wrapper for candidates and campaigns.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CandidateId(pub String);

/// Identifier wrapper for ledger activity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActivityId(pub String);

impl fmt::Display for SupporterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to either side of a match, used for error reporting and profiling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EntityRef {
    Supporter(SupporterId),
    Candidate(CandidateId),
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Supporter(id) => write!(f, "supporter {id}"),
            EntityRef::Candidate(id) => write!(f, "candidate {id}"),
        }
    }
}

/// 21-tier engagement grade. Declaration order is ordinal order, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "U-")]
    UMinus,
    #[serde(rename = "U")]
    U,
    #[serde(rename = "U+")]
    UPlus,
    #[serde(rename = "F")]
    F,
    #[serde(rename = "F+")]
    FPlus,
    #[serde(rename = "E-")]
    EMinus,
    #[serde(rename = "E")]
    E,
    #[serde(rename = "E+")]
    EPlus,
    #[serde(rename = "D-")]
    DMinus,
    #[serde(rename = "D")]
    D,
    #[serde(rename = "D+")]
    DPlus,
    #[serde(rename = "C-")]
    CMinus,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "C+")]
    CPlus,
    #[serde(rename = "B-")]
    BMinus,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "B+")]
    BPlus,
    #[serde(rename = "A-")]
    AMinus,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "A+")]
    APlus,
    #[serde(rename = "A++")]
    APlusPlus,
}

impl Grade {
    pub const COUNT: usize = 21;

    /// All grades from lowest to highest.
    pub const fn ordered() -> [Self; Self::COUNT] {
        [
            Self::UMinus,
            Self::U,
            Self::UPlus,
            Self::F,
            Self::FPlus,
            Self::EMinus,
            Self::E,
            Self::EPlus,
            Self::DMinus,
            Self::D,
            Self::DPlus,
            Self::CMinus,
            Self::C,
            Self::CPlus,
            Self::BMinus,
            Self::B,
            Self::BPlus,
            Self::AMinus,
            Self::A,
            Self::APlus,
            Self::APlusPlus,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::UMinus => "U-",
            Self::U => "U",
            Self::UPlus => "U+",
            Self::F => "F",
            Self::FPlus => "F+",
            Self::EMinus => "E-",
            Self::E => "E",
            Self::EPlus => "E+",
            Self::DMinus => "D-",
            Self::D => "D",
            Self::DPlus => "D+",
            Self::CMinus => "C-",
            Self::C => "C",
            Self::CPlus => "C+",
            Self::BMinus => "B-",
            Self::B => "B",
            Self::BPlus => "B+",
            Self::AMinus => "A-",
            Self::A => "A",
            Self::APlus => "A+",
            Self::APlusPlus => "A++",
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        Self::ordered()
            .into_iter()
            .find(|grade| grade.label().eq_ignore_ascii_case(trimmed))
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Bounded numeric engagement score underlying [`Grade`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u16", into = "u16")]
pub struct LeadScore(u16);

impl LeadScore {
    pub const MAX: u16 = 1000;

    pub fn new(value: u16) -> Result<Self, ValidationError> {
        if value > Self::MAX {
            return Err(ValidationError::LeadScoreOutOfRange(u32::from(value)));
        }
        Ok(Self(value))
    }

    pub(crate) fn saturating(value: u64) -> Self {
        Self(value.min(u64::from(Self::MAX)) as u16)
    }

    pub const fn value(self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for LeadScore {
    type Error = ValidationError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LeadScore> for u16 {
    fn from(value: LeadScore) -> Self {
        value.0
    }
}

/// Closed set of dimensions a [`DimensionVector`] is indexed by.
pub trait Dimension: Copy + Ord + fmt::Debug + Send + Sync + 'static {
    const COUNT: usize;

    fn ordered() -> &'static [Self];
    fn index(self) -> usize;
    fn label(self) -> &'static str;
}

/// Ideology dimensions used for supporter/candidate alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdeologyDimension {
    EconomicPolicy,
    SocialPolicy,
    Environment,
    Healthcare,
    Education,
    Immigration,
    PublicSafety,
    FiscalDiscipline,
    LaborRights,
    CivilLiberties,
    ForeignPolicy,
    Infrastructure,
}

const IDEOLOGY_DIMENSIONS: [IdeologyDimension; 12] = [
    IdeologyDimension::EconomicPolicy,
    IdeologyDimension::SocialPolicy,
    IdeologyDimension::Environment,
    IdeologyDimension::Healthcare,
    IdeologyDimension::Education,
    IdeologyDimension::Immigration,
    IdeologyDimension::PublicSafety,
    IdeologyDimension::FiscalDiscipline,
    IdeologyDimension::LaborRights,
    IdeologyDimension::CivilLiberties,
    IdeologyDimension::ForeignPolicy,
    IdeologyDimension::Infrastructure,
];

impl Dimension for IdeologyDimension {
    const COUNT: usize = 12;

    fn ordered() -> &'static [Self] {
        &IDEOLOGY_DIMENSIONS
    }

    fn index(self) -> usize {
        self as usize
    }

    fn label(self) -> &'static str {
        match self {
            Self::EconomicPolicy => "economic_policy",
            Self::SocialPolicy => "social_policy",
            Self::Environment => "environment",
            Self::Healthcare => "healthcare",
            Self::Education => "education",
            Self::Immigration => "immigration",
            Self::PublicSafety => "public_safety",
            Self::FiscalDiscipline => "fiscal_discipline",
            Self::LaborRights => "labor_rights",
            Self::CivilLiberties => "civil_liberties",
            Self::ForeignPolicy => "foreign_policy",
            Self::Infrastructure => "infrastructure",
        }
    }
}

/// Local-issue dimensions used for county and municipal races.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalDimension {
    Housing,
    Transit,
    Schools,
    NeighborhoodSafety,
    ParksAndRecreation,
    SmallBusiness,
    LandUse,
}

const LOCAL_DIMENSIONS: [LocalDimension; 7] = [
    LocalDimension::Housing,
    LocalDimension::Transit,
    LocalDimension::Schools,
    LocalDimension::NeighborhoodSafety,
    LocalDimension::ParksAndRecreation,
    LocalDimension::SmallBusiness,
    LocalDimension::LandUse,
];

impl Dimension for LocalDimension {
    const COUNT: usize = 7;

    fn ordered() -> &'static [Self] {
        &LOCAL_DIMENSIONS
    }

    fn index(self) -> usize {
        self as usize
    }

    fn label(self) -> &'static str {
        match self {
            Self::Housing => "housing",
            Self::Transit => "transit",
            Self::Schools => "schools",
            Self::NeighborhoodSafety => "neighborhood_safety",
            Self::ParksAndRecreation => "parks_and_recreation",
            Self::SmallBusiness => "small_business",
            Self::LandUse => "land_use",
        }
    }
}

pub fn dimension_from_label<D: Dimension>(raw: &str) -> Option<D> {
    let normalized = raw.trim().to_ascii_lowercase().replace([' ', '-'], "_");
    D::ordered()
        .iter()
        .copied()
        .find(|dimension| dimension.label() == normalized)
}

/// Fixed-length vector of `[0, 100]` scores indexed by a dimension set.
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionVector<D: Dimension> {
    values: Vec<f32>,
    marker: PhantomData<D>,
}

impl<D: Dimension> DimensionVector<D> {
    pub const NEUTRAL: f32 = 50.0;

    pub fn new(values: Vec<f32>) -> Result<Self, ValidationError> {
        if values.len() != D::COUNT {
            return Err(ValidationError::DimensionLength {
                expected: D::COUNT,
                found: values.len(),
            });
        }

        for (dimension, value) in D::ordered().iter().zip(&values) {
            if !value.is_finite() || !(0.0..=100.0).contains(value) {
                return Err(ValidationError::DimensionOutOfRange {
                    dimension: dimension.label(),
                    value: *value,
                });
            }
        }

        Ok(Self {
            values,
            marker: PhantomData,
        })
    }

    pub fn neutral() -> Self {
        Self {
            values: vec![Self::NEUTRAL; D::COUNT],
            marker: PhantomData,
        }
    }

    pub fn get(&self, dimension: D) -> f32 {
        self.values[dimension.index()]
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (D, f32)> + '_ {
        D::ordered().iter().copied().zip(self.values.iter().copied())
    }

    /// Top two dimensions by value; the lower index wins ties.
    pub fn top_two(&self) -> (D, D) {
        let ordered = D::ordered();
        let mut primary = 0;
        for index in 1..self.values.len() {
            if self.values[index] > self.values[primary] {
                primary = index;
            }
        }

        let mut secondary: Option<usize> = None;
        for index in 0..self.values.len() {
            if index == primary {
                continue;
            }
            match secondary {
                Some(current) if self.values[index] <= self.values[current] => {}
                _ => secondary = Some(index),
            }
        }

        (ordered[primary], ordered[secondary.unwrap_or(primary)])
    }

    /// Mean absolute component difference, in `[0, 100]`.
    pub fn mean_absolute_difference(&self, other: &Self) -> f32 {
        if self.values.is_empty() {
            return 0.0;
        }
        let total: f32 = self
            .values
            .iter()
            .zip(&other.values)
            .map(|(left, right)| (left - right).abs())
            .sum();
        total / self.values.len() as f32
    }
}

impl<D: Dimension> Default for DimensionVector<D> {
    fn default() -> Self {
        Self::neutral()
    }
}

impl<D: Dimension> Serialize for DimensionVector<D> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.values.serialize(serializer)
    }
}

impl<'de, D: Dimension> Deserialize<'de> for DimensionVector<D> {
    fn deserialize<De: Deserializer<'de>>(deserializer: De) -> Result<Self, De::Error> {
        let values = Vec::<f32>::deserialize(deserializer)?;
        Self::new(values).map_err(serde::de::Error::custom)
    }
}

/// Five-point categorical stance captured by intake forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stance {
    StronglyOpposed,
    Opposed,
    Neutral,
    Supportive,
    StronglySupportive,
}

impl Stance {
    pub const fn score(self) -> f32 {
        match self {
            Self::StronglyOpposed => 0.0,
            Self::Opposed => 25.0,
            Self::Neutral => 50.0,
            Self::Supportive => 75.0,
            Self::StronglySupportive => 100.0,
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "strongly_opposed" => Some(Self::StronglyOpposed),
            "opposed" => Some(Self::Opposed),
            "neutral" => Some(Self::Neutral),
            "supportive" => Some(Self::Supportive),
            "strongly_supportive" => Some(Self::StronglySupportive),
            _ => None,
        }
    }
}

/// Raw attribute value before normalization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RawAttribute {
    Continuous(f32),
    Stance(Stance),
    Flag(bool),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeInput<D> {
    pub dimension: D,
    pub value: RawAttribute,
}

/// Raw attribute inputs the profiler derives vectors from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityAttributes {
    #[serde(default)]
    pub ideology: Vec<AttributeInput<IdeologyDimension>>,
    #[serde(default)]
    pub local: Vec<AttributeInput<LocalDimension>>,
}

/// Derived vectors plus the primary/secondary ideology classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionProfile {
    pub ideology: DimensionVector<IdeologyDimension>,
    pub local: DimensionVector<LocalDimension>,
    pub primary: IdeologyDimension,
    pub secondary: IdeologyDimension,
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl Default for DimensionProfile {
    fn default() -> Self {
        let ideology = DimensionVector::neutral();
        let (primary, secondary) = ideology.top_two();
        Self {
            ideology,
            local: DimensionVector::neutral(),
            primary,
            secondary,
            refreshed_at: None,
        }
    }
}

impl DimensionProfile {
    /// Compares the derived content, ignoring when it was refreshed.
    pub fn same_vectors(&self, other: &Self) -> bool {
        self.ideology == other.ideology
            && self.local == other.local
            && self.primary == other.primary
            && self.secondary == other.secondary
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillTag {
    Canvassing,
    PhoneBanking,
    EventPlanning,
    Digital,
    Fundraising,
    DataEntry,
}

impl SkillTag {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Canvassing => "canvassing",
            Self::PhoneBanking => "phone_banking",
            Self::EventPlanning => "event_planning",
            Self::Digital => "digital",
            Self::Fundraising => "fundraising",
            Self::DataEntry => "data_entry",
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        [
            Self::Canvassing,
            Self::PhoneBanking,
            Self::EventPlanning,
            Self::Digital,
            Self::Fundraising,
            Self::DataEntry,
        ]
        .into_iter()
        .find(|skill| skill.label() == normalized)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactPreferences {
    pub opted_out: bool,
    pub email: bool,
    pub phone: bool,
}

impl Default for ContactPreferences {
    fn default() -> Self {
        Self {
            opted_out: false,
            email: true,
            phone: true,
        }
    }
}

impl ContactPreferences {
    pub fn reachable(&self) -> bool {
        !self.opted_out && (self.email || self.phone)
    }
}

/// Cumulative totals over validated activity only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityTotals {
    pub count: u32,
    pub sum_cents: u64,
    pub average_cents: u64,
    pub max_cents: u64,
    pub last_activity_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Supporter {
    pub id: SupporterId,
    pub display_name: String,
    pub county: String,
    pub zip: String,
    pub grade: Grade,
    pub lead_score: LeadScore,
    /// Set when a recomputation was deferred; the stored grade is the last good one.
    #[serde(default)]
    pub needs_recalc: bool,
    #[serde(default)]
    pub totals: ActivityTotals,
    #[serde(default)]
    pub attributes: EntityAttributes,
    #[serde(default)]
    pub profile: DimensionProfile,
    #[serde(default)]
    pub skills: BTreeSet<SkillTag>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub contact: ContactPreferences,
    #[serde(default)]
    pub version: u64,
}

impl Supporter {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, county: impl Into<String>) -> Self {
        Self {
            id: SupporterId(id.into()),
            display_name: display_name.into(),
            county: county.into(),
            zip: String::new(),
            grade: Grade::UMinus,
            lead_score: LeadScore::default(),
            needs_recalc: false,
            totals: ActivityTotals::default(),
            attributes: EntityAttributes::default(),
            profile: DimensionProfile::default(),
            skills: BTreeSet::new(),
            tags: BTreeSet::new(),
            contact: ContactPreferences::default(),
            version: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfficeLevel {
    Federal,
    Statewide,
    Legislative,
    County,
    Municipal,
    SchoolBoard,
}

impl OfficeLevel {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Federal => "federal",
            Self::Statewide => "statewide",
            Self::Legislative => "legislative",
            Self::County => "county",
            Self::Municipal => "municipal",
            Self::SchoolBoard => "school_board",
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "federal" => Some(Self::Federal),
            "statewide" => Some(Self::Statewide),
            "legislative" => Some(Self::Legislative),
            "county" => Some(Self::County),
            "municipal" => Some(Self::Municipal),
            "school_board" => Some(Self::SchoolBoard),
            _ => None,
        }
    }
}

/// Capacity rules for a candidate. `assigned` counts slot-holding assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityPolicy {
    pub cap: Option<u32>,
    #[serde(default)]
    pub assigned: u32,
    #[serde(default = "default_priority_weight")]
    pub priority_weight: u8,
}

fn default_priority_weight() -> u8 {
    1
}

impl Default for CapacityPolicy {
    fn default() -> Self {
        Self {
            cap: None,
            assigned: 0,
            priority_weight: default_priority_weight(),
        }
    }
}

impl CapacityPolicy {
    pub fn remaining(&self) -> Option<u32> {
        self.cap.map(|cap| cap.saturating_sub(self.assigned))
    }

    pub fn has_room(&self) -> bool {
        self.remaining().map_or(true, |remaining| remaining > 0)
    }

    /// Share of the cap in use; uncapped candidates report zero.
    pub fn utilization(&self) -> f32 {
        match self.cap {
            None => 0.0,
            Some(0) => 1.0,
            Some(cap) => (self.assigned as f32 / cap as f32).min(1.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeographicMatch {
    ExactCounty,
    CoverageArea,
    NoMatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub name: String,
    pub office: OfficeLevel,
    pub home_county: String,
    #[serde(default)]
    pub coverage_counties: BTreeSet<String>,
    #[serde(default)]
    pub statewide: bool,
    #[serde(default)]
    pub attributes: EntityAttributes,
    #[serde(default)]
    pub profile: DimensionProfile,
    #[serde(default)]
    pub capacity: CapacityPolicy,
    #[serde(default = "default_accepting")]
    pub accepting: bool,
    #[serde(default)]
    pub version: u64,
}

fn default_accepting() -> bool {
    true
}

impl Candidate {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        office: OfficeLevel,
        home_county: impl Into<String>,
    ) -> Self {
        Self {
            id: CandidateId(id.into()),
            name: name.into(),
            office,
            home_county: home_county.into(),
            coverage_counties: BTreeSet::new(),
            statewide: false,
            attributes: EntityAttributes::default(),
            profile: DimensionProfile::default(),
            capacity: CapacityPolicy::default(),
            accepting: true,
            version: 0,
        }
    }

    pub fn geographic_match(&self, county: &str) -> GeographicMatch {
        if same_county(&self.home_county, county) {
            GeographicMatch::ExactCounty
        } else if self.statewide
            || self
                .coverage_counties
                .iter()
                .any(|covered| same_county(covered, county))
        {
            GeographicMatch::CoverageArea
        } else {
            GeographicMatch::NoMatch
        }
    }
}

pub fn same_county(left: &str, right: &str) -> bool {
    let left = left.trim();
    !left.is_empty() && left.eq_ignore_ascii_case(right.trim())
}

/// Canonical county key used for grouping.
pub fn county_key(county: &str) -> String {
    county.trim().to_ascii_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityKind {
    Donation { amount_cents: u64 },
    Volunteer { minutes: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Pending,
    Completed,
    Cleared,
    Refunded,
    Bounced,
    Cancelled,
}

impl ActivityStatus {
    pub const fn counts_toward_totals(self) -> bool {
        matches!(self, Self::Completed | Self::Cleared)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Cleared => "cleared",
            Self::Refunded => "refunded",
            Self::Bounced => "bounced",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "cleared" => Some(Self::Cleared),
            "refunded" => Some(Self::Refunded),
            "bounced" => Some(Self::Bounced),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Activity as submitted upstream, before the ledger assigns a sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewActivity {
    pub activity_id: ActivityId,
    pub supporter_id: SupporterId,
    #[serde(default)]
    pub candidate_id: Option<CandidateId>,
    pub kind: ActivityKind,
    pub status: ActivityStatus,
    pub occurred_at: DateTime<Utc>,
    /// Set on refund entries that reverse (part of) an earlier activity.
    #[serde(default)]
    pub reverses: Option<ActivityId>,
}

impl NewActivity {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.kind {
            ActivityKind::Donation { amount_cents: 0 } | ActivityKind::Volunteer { minutes: 0 } => {
                Err(ValidationError::EmptyActivity(self.activity_id.clone()))
            }
            _ => Ok(()),
        }
    }
}

/// Append-only ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub activity_id: ActivityId,
    pub supporter_id: SupporterId,
    pub candidate_id: Option<CandidateId>,
    pub kind: ActivityKind,
    pub status: ActivityStatus,
    pub occurred_at: DateTime<Utc>,
    pub reverses: Option<ActivityId>,
    pub sequence: u64,
}

impl ActivityRecord {
    pub fn from_new(activity: NewActivity, sequence: u64) -> Self {
        Self {
            activity_id: activity.activity_id,
            supporter_id: activity.supporter_id,
            candidate_id: activity.candidate_id,
            kind: activity.kind,
            status: activity.status,
            occurred_at: activity.occurred_at,
            reverses: activity.reverses,
            sequence,
        }
    }
}
