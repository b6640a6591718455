//! Shared PostgreSQL container for integration tests.
//!
//! One container is started per test binary; every test gets its own
//! freshly created database, dropped again when the handle goes away.

use anyhow::Context;
use sqlx::{Connection, PgConnection};
use testcontainers::{runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

struct SharedPostgresContext {
    _container: ContainerAsync<Postgres>,
    admin_connection_string: String,
    host: String,
    port: u16,
}

static POSTGRES_CONTEXT: OnceCell<SharedPostgresContext> = OnceCell::const_new();

pub struct PostgresTestDatabase {
    pub connection_string: String,
    db_name: String,
    admin_connection_string: String,
}

impl Drop for PostgresTestDatabase {
    fn drop(&mut self) {
        let db_name = self.db_name.clone();
        let admin_connection_string = self.admin_connection_string.clone();

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };

        handle.spawn(async move {
            let Ok(mut conn) = PgConnection::connect(&admin_connection_string).await else {
                return;
            };

            let _ = sqlx::query(
                "SELECT pg_terminate_backend(pid) FROM pg_stat_activity WHERE datname = $1 AND pid <> pg_backend_pid()",
            )
            .bind(&db_name)
            .execute(&mut conn)
            .await;

            let _ = sqlx::query(&format!("DROP DATABASE IF EXISTS {}", db_name))
                .execute(&mut conn)
                .await;
        });
    }
}

async fn start_shared_postgres() -> anyhow::Result<SharedPostgresContext> {
    let container = Postgres::default()
        .with_tag("16-alpine")
        .start()
        .await
        .context("Failed to start Postgres container")?;

    let host = container
        .get_host()
        .await
        .context("Failed to get host")?
        .to_string();
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .context("Failed to get port")?;

    Ok(SharedPostgresContext {
        _container: container,
        admin_connection_string: format!("postgres://postgres:postgres@{}:{}/postgres", host, port),
        host,
        port,
    })
}

/// Create an empty database in the shared container.
pub async fn get_postgres_context() -> anyhow::Result<PostgresTestDatabase> {
    let ctx = POSTGRES_CONTEXT.get_or_try_init(start_shared_postgres).await?;

    let db_name = format!("test_{}", Uuid::new_v4().simple());

    let mut conn = PgConnection::connect(&ctx.admin_connection_string)
        .await
        .context("Failed to connect to postgres admin db")?;

    sqlx::query(&format!("CREATE DATABASE {}", db_name))
        .execute(&mut conn)
        .await
        .context("Failed to create test database")?;

    Ok(PostgresTestDatabase {
        connection_string: format!(
            "postgres://postgres:postgres@{}:{}/{}",
            ctx.host, ctx.port, db_name
        ),
        db_name,
        admin_connection_string: ctx.admin_connection_string.clone(),
    })
}
