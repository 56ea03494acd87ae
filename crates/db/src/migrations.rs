use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use super::run_pending;
    use crate::connect_writable;

    #[tokio::test]
    async fn migration_creates_sales_table_and_indexes() {
        let pool = connect_writable("sqlite::memory:", 5).await.expect("pool should connect");
        run_pending(&pool).await.expect("migrations should apply");
        run_pending(&pool).await.expect("migrations should be idempotent");

        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE name IN \
             ('SALEINVOICE', 'idx_saleinvoice_itemname', 'idx_saleinvoice_docdt') ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .expect("schema query should succeed");

        assert_eq!(names, vec!["SALEINVOICE", "idx_saleinvoice_docdt", "idx_saleinvoice_itemname"]);
        pool.close().await;
    }
}
