//! Disposable Postgres databases carved out of an externally supplied server.

use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow};
use postgres::NoTls;
use url::Url;

/// Environment variable naming the server used by Postgres-backed suites.
pub const DATABASE_URL_ENV: &str = "FERRY_TEST_DATABASE_URL";

/// A uniquely named database dropped when the handle goes out of scope.
pub struct TestDatabase {
    connection_string: String,
    admin_url: String,
    database: String,
}

impl TestDatabase {
    /// Connection string that can be passed to `sqlx`.
    #[must_use]
    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }
}

impl Drop for TestDatabase {
    fn drop(&mut self) {
        let statement = format!("DROP DATABASE IF EXISTS \"{}\" WITH (FORCE)", self.database);
        let _ = run_admin(&self.admin_url, statement);
    }
}

/// Create a fresh database on the server named by `FERRY_TEST_DATABASE_URL`.
///
/// Suites skip themselves when this returns an error.
///
/// # Errors
///
/// Returns an error when the variable is unset or the database cannot be created.
pub fn start_postgres() -> Result<TestDatabase> {
    let base = std::env::var(DATABASE_URL_ENV)
        .with_context(|| format!("{DATABASE_URL_ENV} is not set"))?;
    let parsed = Url::parse(&base).context("invalid postgres connection url")?;
    let database = unique_database_name();

    let mut admin = parsed.clone();
    admin.set_path("/postgres");
    let admin_url = admin.to_string();
    run_admin(&admin_url, format!("CREATE DATABASE \"{database}\""))?;

    let mut target = parsed;
    target.set_path(&format!("/{database}"));
    Ok(TestDatabase {
        connection_string: target.to_string(),
        admin_url,
        database,
    })
}

// The sync client cannot run on a tokio worker thread, so statements go through a
// dedicated OS thread.
fn run_admin(admin_url: &str, statement: String) -> Result<()> {
    let admin = admin_url.to_string();
    std::thread::spawn(move || -> Result<()> {
        let config = postgres::Config::from_str(&admin)?;
        let mut client = config.connect(NoTls)?;
        client
            .simple_query(&statement)
            .map(|_| ())
            .context("failed to run admin statement")
    })
    .join()
    .unwrap_or_else(|_| Err(anyhow!("admin statement thread panicked")))
}

fn unique_database_name() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("ferry_test_{}_{nanos}", std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_names_are_lowercase_identifiers() {
        let name = unique_database_name();
        assert!(name.starts_with("ferry_test_"));
        assert!(name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
    }
}
