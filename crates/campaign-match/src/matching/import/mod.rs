//! CSV seeding for supporters, candidates and the activity ledger.

mod parser;

use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use super::domain::{Candidate, EntityRef, NewActivity, Supporter};
use super::error::EngineError;
use super::repository::{ActivityLedger, LedgerError, ProfileStore, StoreError};
use super::service::MatchingService;

#[derive(Debug)]
pub enum ImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    Row { line: u64, message: String },
    Store(StoreError),
    Ledger(LedgerError),
    Engine(EngineError),
}

impl ImportError {
    fn row(line: u64, message: impl Into<String>) -> Self {
        Self::Row {
            line,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportError::Io(err) => write!(f, "failed to read seed file: {}", err),
            ImportError::Csv(err) => write!(f, "invalid seed CSV data: {}", err),
            ImportError::Row { line, message } => write!(f, "line {}: {}", line, message),
            ImportError::Store(err) => write!(f, "could not store seed data: {}", err),
            ImportError::Ledger(err) => write!(f, "could not append seed activity: {}", err),
            ImportError::Engine(err) => write!(f, "could not prepare seeded profiles: {}", err),
        }
    }
}

impl std::error::Error for ImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ImportError::Io(err) => Some(err),
            ImportError::Csv(err) => Some(err),
            ImportError::Row { .. } => None,
            ImportError::Store(err) => Some(err),
            ImportError::Ledger(err) => Some(err),
            ImportError::Engine(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

impl From<StoreError> for ImportError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<LedgerError> for ImportError {
    fn from(err: LedgerError) -> Self {
        Self::Ledger(err)
    }
}

impl From<EngineError> for ImportError {
    fn from(err: EngineError) -> Self {
        Self::Engine(err)
    }
}

/// Locations of the seed exports. Activity is optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedPaths {
    pub supporters: PathBuf,
    pub candidates: PathBuf,
    pub activity: Option<PathBuf>,
}

impl SeedPaths {
    /// Conventional `supporters.csv`, `candidates.csv`, `activity.csv` layout.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let activity = dir.join("activity.csv");
        Self {
            supporters: dir.join("supporters.csv"),
            candidates: dir.join("candidates.csv"),
            activity: activity.exists().then_some(activity),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub supporters: usize,
    pub candidates: usize,
    pub activities: usize,
}

pub struct SeedImporter;

impl SeedImporter {
    pub fn supporters_from_path<P: AsRef<Path>>(path: P) -> Result<Vec<Supporter>, ImportError> {
        let file = std::fs::File::open(path)?;
        Self::supporters_from_reader(file)
    }

    pub fn supporters_from_reader<R: Read>(reader: R) -> Result<Vec<Supporter>, ImportError> {
        parser::parse_supporters(reader)
    }

    pub fn candidates_from_path<P: AsRef<Path>>(path: P) -> Result<Vec<Candidate>, ImportError> {
        let file = std::fs::File::open(path)?;
        Self::candidates_from_reader(file)
    }

    pub fn candidates_from_reader<R: Read>(reader: R) -> Result<Vec<Candidate>, ImportError> {
        parser::parse_candidates(reader)
    }

    pub fn activity_from_path<P: AsRef<Path>>(path: P) -> Result<Vec<NewActivity>, ImportError> {
        let file = std::fs::File::open(path)?;
        Self::activity_from_reader(file)
    }

    pub fn activity_from_reader<R: Read>(reader: R) -> Result<Vec<NewActivity>, ImportError> {
        parser::parse_activity(reader)
    }

    /// Loads the seed files through `service`: entities are stored, activity is
    /// appended, every profile is derived and every grade is computed.
    pub fn load_into<S, L>(
        service: &MatchingService<S, L>,
        paths: &SeedPaths,
    ) -> Result<SeedReport, ImportError>
    where
        S: ProfileStore + 'static,
        L: ActivityLedger + 'static,
    {
        let supporters = Self::supporters_from_path(&paths.supporters)?;
        let candidates = Self::candidates_from_path(&paths.candidates)?;
        let activity = match &paths.activity {
            Some(path) => Self::activity_from_path(path)?,
            None => Vec::new(),
        };
        Self::apply(service, supporters, candidates, activity)
    }

    pub fn apply<S, L>(
        service: &MatchingService<S, L>,
        supporters: Vec<Supporter>,
        candidates: Vec<Candidate>,
        activity: Vec<NewActivity>,
    ) -> Result<SeedReport, ImportError>
    where
        S: ProfileStore + 'static,
        L: ActivityLedger + 'static,
    {
        let mut report = SeedReport::default();
        let mut entities = Vec::with_capacity(supporters.len() + candidates.len());

        for supporter in supporters {
            entities.push(EntityRef::Supporter(supporter.id.clone()));
            service.store().save_supporter(supporter)?;
            report.supporters += 1;
        }
        for candidate in candidates {
            entities.push(EntityRef::Candidate(candidate.id.clone()));
            service.store().save_candidate(candidate)?;
            report.candidates += 1;
        }
        for entry in activity {
            entry.validate().map_err(EngineError::from)?;
            service.ledger().append(entry)?;
            report.activities += 1;
        }

        for entity in &entities {
            service.refresh_dimensions(entity)?;
        }
        let grades = service.recompute_all_grades()?;

        info!(
            supporters = report.supporters,
            candidates = report.candidates,
            activities = report.activities,
            graded = grades.updated + grades.unchanged,
            deferred = grades.deferred,
            "seed data loaded"
        );
        Ok(report)
    }
}
