use campaign_match::error::AppError;
use campaign_match::matching::{
    EngineConfig, EngineError, InMemoryLedger, InMemoryProfileStore, JobControl, MatchingService,
    SeedImporter, SeedPaths, SeedReport,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

pub(crate) type EngineService = MatchingService<InMemoryProfileStore, InMemoryLedger>;

const DEMO_SUPPORTERS: &str = include_str!("../data/supporters.csv");
const DEMO_CANDIDATES: &str = include_str!("../data/candidates.csv");
const DEMO_ACTIVITY: &str = include_str!("../data/activity.csv");

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) engine: Arc<EngineService>,
    pub(crate) allocation_job: Arc<Mutex<Option<JobControl>>>,
}

impl AppState {
    pub(crate) fn new(metrics: PrometheusHandle, engine: Arc<EngineService>) -> Self {
        Self {
            readiness: Arc::new(AtomicBool::new(false)),
            metrics: Arc::new(metrics),
            engine,
            allocation_job: Arc::new(Mutex::new(None)),
        }
    }

    /// Registers a new bulk run, or returns `None` while another one is in flight.
    pub(crate) fn start_allocation_job(&self) -> Option<JobControl> {
        let mut current = self
            .allocation_job
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if current.is_some() {
            return None;
        }
        let control = JobControl::new();
        *current = Some(control.clone());
        Some(control)
    }

    pub(crate) fn finish_allocation_job(&self) {
        self.allocation_job
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Flags the running bulk job for cancellation. Returns `false` when idle.
    pub(crate) fn cancel_allocation_job(&self) -> bool {
        match self
            .allocation_job
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some(control) => {
                control.cancel();
                true
            }
            None => false,
        }
    }
}

/// Where the engine's initial data came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SeedSource {
    Directory(String),
    Bundled,
}

impl SeedSource {
    pub(crate) fn describe(&self) -> &str {
        match self {
            SeedSource::Directory(dir) => dir,
            SeedSource::Bundled => "bundled demo data",
        }
    }
}

pub(crate) fn build_engine(config: EngineConfig) -> Result<Arc<EngineService>, AppError> {
    let service = MatchingService::new(
        Arc::new(InMemoryProfileStore::new()),
        Arc::new(InMemoryLedger::new()),
        config,
    )
    .map_err(EngineError::from)?;
    Ok(Arc::new(service))
}

/// Loads the CSV exports in `seed_dir`, or the bundled demo data when no directory is set.
pub(crate) fn seed_engine(
    engine: &EngineService,
    seed_dir: Option<&Path>,
) -> Result<(SeedReport, SeedSource), AppError> {
    let (report, source) = match seed_dir {
        Some(dir) => {
            let report = SeedImporter::load_into(engine, &SeedPaths::in_dir(dir))?;
            (report, SeedSource::Directory(dir.display().to_string()))
        }
        None => {
            let supporters = SeedImporter::supporters_from_reader(DEMO_SUPPORTERS.as_bytes())?;
            let candidates = SeedImporter::candidates_from_reader(DEMO_CANDIDATES.as_bytes())?;
            let activity = SeedImporter::activity_from_reader(DEMO_ACTIVITY.as_bytes())?;
            let report = SeedImporter::apply(engine, supporters, candidates, activity)?;
            (report, SeedSource::Bundled)
        }
    };
    info!(
        source = source.describe(),
        supporters = report.supporters,
        candidates = report.candidates,
        activities = report.activities,
        "engine seeded"
    );
    Ok((report, source))
}

#[cfg(test)]
pub(crate) fn seeded_state() -> AppState {
    let engine = build_engine(EngineConfig::default()).expect("default config is valid");
    seed_engine(&engine, None).expect("bundled data loads");
    let metrics = metrics_exporter_prometheus::PrometheusBuilder::new()
        .build_recorder()
        .handle();
    AppState::new(metrics, engine)
}
