use crate::connection::DbPool;

/// Deterministic demo catalogue: item name, tyre size, unit price, profit share (percent).
const DEMO_ITEMS: &[(&str, &str, f64, u32)] = &[
    ("APOLLO AMAZER 4G LIFE", "155/80 R13", 3_450.0, 12),
    ("MRF ZVTV", "145/80 R12", 2_980.0, 14),
    ("CEAT MILAZE X3", "165/80 R14", 4_120.0, 11),
    ("JK TYRE ULTIMA", "185/65 R15", 5_260.0, 9),
    ("BRIDGESTONE B290", "175/65 R14", 4_890.0, 15),
    ("MRF NYLOGRIP", "3.00-17", 1_340.0, 18),
];

const DEMO_YEAR: i32 = 2024;
const SALES_PER_ITEM_PER_MONTH: u32 = 2;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub rows_inserted: u64,
    pub distinct_items: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationResult {
    pub row_count: i64,
    pub distinct_items: i64,
}

impl VerificationResult {
    pub fn matches(&self, seed: &SeedResult) -> bool {
        self.row_count == seed.rows_inserted as i64 && self.distinct_items == seed.distinct_items as i64
    }
}

/// Replaces the contents of `SALEINVOICE` with the demo dataset.
pub async fn seed_demo_dataset(pool: &DbPool) -> Result<SeedResult, sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM SALEINVOICE").execute(&mut *tx).await?;

    let mut rows_inserted = 0_u64;
    for (item_index, (item_name, size, unit_price, profit_pct)) in DEMO_ITEMS.iter().enumerate() {
        for month in 1..=12_u32 {
            for sale in 0..SALES_PER_ITEM_PER_MONTH {
                let day = 3 + sale * 11 + item_index as u32;
                let quantity = 1 + ((month + sale + item_index as u32) % 4) as i64;
                let total_value = unit_price * quantity as f64;
                let profit = (total_value * f64::from(*profit_pct) / 100.0).round();

                sqlx::query(
                    "INSERT INTO SALEINVOICE (DOCDT, ITEMNAME, ITEMSIZE, QUANTITY, TOTALITEMVALUE, MCODE) \
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(format!("{DEMO_YEAR:04}-{month:02}-{day:02}"))
                .bind(*item_name)
                .bind(*size)
                .bind(quantity)
                .bind(total_value)
                .bind(profit)
                .execute(&mut *tx)
                .await?;
                rows_inserted += 1;
            }
        }
    }

    tx.commit().await?;
    Ok(SeedResult { rows_inserted, distinct_items: DEMO_ITEMS.len() })
}

pub async fn verify_dataset(pool: &DbPool) -> Result<VerificationResult, sqlx::Error> {
    let (row_count, distinct_items): (i64, i64) =
        sqlx::query_as("SELECT COUNT(*), COUNT(DISTINCT ITEMNAME) FROM SALEINVOICE")
            .fetch_one(pool)
            .await?;
    Ok(VerificationResult { row_count, distinct_items })
}
