use bigdecimal::BigDecimal;
use diesel::{
    r2d2::{ConnectionManager, Pool},
    PgConnection,
};

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

pub fn create_conn() -> Result<DbPool, r2d2::Error> {
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://crewuser:@localhost:5432/crewserver".to_string());
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder().build(manager)
}

pub fn bd(val: f64) -> BigDecimal {
    use std::str::FromStr;
    BigDecimal::from_str(&val.to_string()).unwrap_or_else(|_| BigDecimal::from(0))
}

/// Parse a spreadsheet cell as a non-negative decimal hour count.
/// Returns `None` for empty, unparsable, zero or negative values, so the
/// caller can treat all of those as "no shift in this column".
pub fn parse_hours(cell: &str) -> Option<BigDecimal> {
    use std::str::FromStr;
    let trimmed = cell.trim().trim_start_matches('$');
    if trimmed.is_empty() {
        return None;
    }
    let value = BigDecimal::from_str(trimmed).ok()?;
    if value <= BigDecimal::from(0) {
        return None;
    }
    Some(value)
}
