use std::sync::Arc;

use crate::domain::StatusReport;

use super::super::Container;

/// `GET /api/status`: local configuration only, never the upstream.
pub struct StatusController {
    container: Arc<Container>,
}

impl StatusController {
    pub fn new(container: Arc<Container>) -> Self {
        Self { container }
    }

    pub fn report(&self) -> StatusReport {
        self.container.status_report()
    }
}
