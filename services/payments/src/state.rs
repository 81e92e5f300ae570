use std::sync::Arc;

use sea_orm::DatabaseConnection;

use shopflow_messaging::registry::Registry;

use crate::infra::db::DbBillRepository;

/// Shared application state passed to every handler via axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub registry: Arc<Registry>,
}

impl AppState {
    pub fn bill_repo(&self) -> DbBillRepository {
        DbBillRepository {
            db: self.db.clone(),
        }
    }
}
