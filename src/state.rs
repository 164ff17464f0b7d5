use std::sync::Arc;

use crate::{config::AppConfig, db::OrmConn, payments::PaymentRegistry};

#[derive(Clone)]
pub struct AppState {
    pub orm: OrmConn,
    pub config: Arc<AppConfig>,
    pub payments: PaymentRegistry,
}

impl AppState {
    pub fn new(orm: OrmConn, config: AppConfig, payments: PaymentRegistry) -> Self {
        Self {
            orm,
            config: Arc::new(config),
            payments,
        }
    }

    /// The sqlx pool behind the ORM connection, for raw append-only inserts.
    pub fn pool(&self) -> &sqlx::PgPool {
        self.orm.get_postgres_connection_pool()
    }
}
