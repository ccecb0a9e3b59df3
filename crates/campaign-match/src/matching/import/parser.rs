use std::collections::BTreeSet;
use std::io::Read;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer};

use super::super::domain::{
    dimension_from_label, ActivityId, ActivityKind, ActivityStatus, AttributeInput, Candidate,
    CandidateId, CapacityPolicy, ContactPreferences, Dimension, EntityAttributes, NewActivity,
    OfficeLevel, RawAttribute, SkillTag, Stance, Supporter, SupporterId,
};
use super::ImportError;

pub(crate) fn parse_supporters<R: Read>(reader: R) -> Result<Vec<Supporter>, ImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut supporters = Vec::new();

    for (index, record) in csv_reader.deserialize::<SupporterRow>().enumerate() {
        let row = record?;
        let line = index as u64 + 2;
        let mut supporter = Supporter::new(row.id, row.name, row.county);
        supporter.zip = row.zip.unwrap_or_default();
        supporter.skills = parse_skills(line, row.skills.as_deref())?;
        supporter.tags = split_list(row.tags.as_deref())
            .map(|tag| tag.to_ascii_lowercase())
            .collect();
        supporter.contact = ContactPreferences {
            opted_out: row.opted_out.unwrap_or(false),
            email: row.email.unwrap_or(true),
            phone: row.phone.unwrap_or(true),
        };
        supporter.attributes = EntityAttributes {
            ideology: parse_attributes(line, row.ideology.as_deref())?,
            local: parse_attributes(line, row.local.as_deref())?,
        };
        supporters.push(supporter);
    }

    Ok(supporters)
}

pub(crate) fn parse_candidates<R: Read>(reader: R) -> Result<Vec<Candidate>, ImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut candidates = Vec::new();

    for (index, record) in csv_reader.deserialize::<CandidateRow>().enumerate() {
        let row = record?;
        let line = index as u64 + 2;
        let office = OfficeLevel::from_label(&row.office)
            .ok_or_else(|| ImportError::row(line, format!("unknown office level `{}`", row.office)))?;

        let mut candidate = Candidate::new(row.id, row.name, office, row.home_county);
        candidate.coverage_counties = split_list(row.coverage.as_deref())
            .map(str::to_string)
            .collect();
        candidate.statewide = row.statewide.unwrap_or(office == OfficeLevel::Statewide);
        candidate.accepting = row.accepting.unwrap_or(true);
        candidate.capacity = CapacityPolicy {
            cap: row.cap,
            assigned: 0,
            priority_weight: row.priority_weight.unwrap_or(1),
        };
        candidate.attributes = EntityAttributes {
            ideology: parse_attributes(line, row.ideology.as_deref())?,
            local: parse_attributes(line, row.local.as_deref())?,
        };
        candidates.push(candidate);
    }

    Ok(candidates)
}

pub(crate) fn parse_activity<R: Read>(reader: R) -> Result<Vec<NewActivity>, ImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut activity = Vec::new();

    for (index, record) in csv_reader.deserialize::<ActivityRow>().enumerate() {
        let row = record?;
        let line = index as u64 + 2;

        let kind = match row.kind.trim().to_ascii_lowercase().as_str() {
            "donation" => ActivityKind::Donation {
                amount_cents: parse_cents(&row.amount).ok_or_else(|| {
                    ImportError::row(line, format!("invalid dollar amount `{}`", row.amount))
                })?,
            },
            "volunteer" => ActivityKind::Volunteer {
                minutes: row.amount.parse().map_err(|_| {
                    ImportError::row(line, format!("invalid volunteer minutes `{}`", row.amount))
                })?,
            },
            other => return Err(ImportError::row(line, format!("unknown activity type `{other}`"))),
        };
        let status = ActivityStatus::from_label(&row.status)
            .ok_or_else(|| ImportError::row(line, format!("unknown status `{}`", row.status)))?;
        let occurred_at = parse_timestamp(&row.occurred_at)
            .ok_or_else(|| ImportError::row(line, format!("invalid timestamp `{}`", row.occurred_at)))?;

        activity.push(NewActivity {
            activity_id: ActivityId(row.activity_id),
            supporter_id: SupporterId(row.supporter_id),
            candidate_id: row.candidate_id.map(CandidateId),
            kind,
            status,
            occurred_at,
            reverses: row.reverses.map(ActivityId),
        });
    }

    Ok(activity)
}

#[derive(Debug, Deserialize)]
struct SupporterRow {
    id: String,
    name: String,
    county: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    zip: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    skills: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    tags: Option<String>,
    #[serde(default)]
    opted_out: Option<bool>,
    #[serde(default)]
    email: Option<bool>,
    #[serde(default)]
    phone: Option<bool>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    ideology: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    local: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateRow {
    id: String,
    name: String,
    office: String,
    home_county: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    coverage: Option<String>,
    #[serde(default)]
    statewide: Option<bool>,
    #[serde(default)]
    cap: Option<u32>,
    #[serde(default)]
    priority_weight: Option<u8>,
    #[serde(default)]
    accepting: Option<bool>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    ideology: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    local: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ActivityRow {
    activity_id: String,
    supporter_id: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    candidate_id: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    amount: String,
    status: String,
    occurred_at: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    reverses: Option<String>,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

fn split_list(raw: Option<&str>) -> impl Iterator<Item = &str> + '_ {
    raw.unwrap_or_default()
        .split(';')
        .map(str::trim)
        .filter(|item| !item.is_empty())
}

fn parse_skills(line: u64, raw: Option<&str>) -> Result<BTreeSet<SkillTag>, ImportError> {
    split_list(raw)
        .map(|label| {
            SkillTag::from_label(label)
                .ok_or_else(|| ImportError::row(line, format!("unknown skill `{label}`")))
        })
        .collect()
}

/// Parses `dimension=value` pairs separated by `;`. Values may be numbers, stance
/// labels (`supportive`) or flags (`yes`/`no`).
pub(crate) fn parse_attributes<D: Dimension>(
    line: u64,
    raw: Option<&str>,
) -> Result<Vec<AttributeInput<D>>, ImportError> {
    split_list(raw)
        .map(|pair| -> Result<AttributeInput<D>, ImportError> {
            let (name, value) = pair
                .split_once('=')
                .ok_or_else(|| ImportError::row(line, format!("attribute `{pair}` missing `=`")))?;
            let dimension = dimension_from_label::<D>(name)
                .ok_or_else(|| ImportError::row(line, format!("unknown dimension `{}`", name.trim())))?;
            let value = parse_raw_attribute(value.trim())
                .ok_or_else(|| ImportError::row(line, format!("invalid value `{}`", value.trim())))?;
            Ok(AttributeInput { dimension, value })
        })
        .collect()
}

fn parse_raw_attribute(raw: &str) -> Option<RawAttribute> {
    if let Ok(number) = raw.parse::<f32>() {
        return Some(RawAttribute::Continuous(number));
    }
    if let Some(stance) = Stance::from_label(raw) {
        return Some(RawAttribute::Stance(stance));
    }
    match raw.to_ascii_lowercase().as_str() {
        "yes" | "true" | "y" => Some(RawAttribute::Flag(true)),
        "no" | "false" | "n" => Some(RawAttribute::Flag(false)),
        _ => None,
    }
}

/// Parses a dollar string (`1,250.50`, `$40`) into cents without going through floats.
pub(crate) fn parse_cents(raw: &str) -> Option<u64> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|ch| *ch != ',')
        .collect();
    let (dollars, cents) = match cleaned.split_once('.') {
        Some((dollars, cents)) => (dollars, cents),
        None => (cleaned.as_str(), ""),
    };
    if dollars.is_empty() && cents.is_empty() {
        return None;
    }

    let dollars: u64 = if dollars.is_empty() { 0 } else { dollars.parse().ok()? };
    let cents: u64 = match cents.len() {
        0 => 0,
        1 => cents.parse::<u64>().ok()? * 10,
        2 => cents.parse().ok()?,
        _ => return None,
    };
    dollars.checked_mul(100)?.checked_add(cents)
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
