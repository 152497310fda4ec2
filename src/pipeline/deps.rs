use std::sync::Arc;

use crate::config::Config;
use crate::extractor::Extractor;
use crate::notify::Hub;
use crate::store::users::PgUserStore;
use crate::store::workspaces::PgWorkspaceStore;
use crate::store::{JobStore, ReportStore};

/// Explicit dependency bag, passed down instead of reaching for ambient
/// module-level singletons; tests substitute fakes for the trait objects.
#[derive(Clone)]
pub struct Deps {
    pub jobs: Arc<dyn JobStore>,
    pub reports: Arc<dyn ReportStore>,
    pub extractor: Arc<dyn Extractor>,
    pub hub: Arc<Hub>,
    pub config: Arc<Config>,
    pub users: PgUserStore,
    pub workspaces: PgWorkspaceStore,
}
