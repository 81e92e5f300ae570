use std::sync::Arc;

use sea_orm::DatabaseConnection;

use shopflow_messaging::registry::Registry;

use crate::infra::db::DbOrderRepository;

/// Shared application state passed to every handler via axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub registry: Arc<Registry>,
}

impl AppState {
    pub fn order_repo(&self) -> DbOrderRepository {
        DbOrderRepository {
            db: self.db.clone(),
        }
    }
}
