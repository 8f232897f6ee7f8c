use tunnelhub_common::db::DbPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
}

impl AppState {
    #[must_use]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}
