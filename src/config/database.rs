#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Create a PostgreSQL enum type, ignoring the race where another instance
/// created it first.
async fn create_enum(pool: &sqlx::PgPool, ddl: &str) -> Result<(), sqlx::Error> {
    let wrapped = format!(
        "DO $$ BEGIN {}; EXCEPTION WHEN duplicate_object THEN NULL; END $$",
        ddl
    );
    sqlx::query(&wrapped).execute(pool).await?;
    Ok(())
}

/// Initialize enum types and tables if they don't exist. The service owns
/// its schema; instances racing at startup are safe because everything is
/// `IF NOT EXISTS` / duplicate-tolerant.
pub async fn init_tables(pool: &sqlx::PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("Checking and creating database tables...");

    create_enum(
        pool,
        "CREATE TYPE tenant_tier AS ENUM ('FREE', 'BASIC', 'PREMIUM', 'ENTERPRISE')",
    )
    .await?;
    create_enum(
        pool,
        "CREATE TYPE scope AS ENUM ('GLOBAL', 'TENANT', 'API_KEY', 'IP', 'USER')",
    )
    .await?;
    create_enum(
        pool,
        "CREATE TYPE algorithm AS ENUM ('TOKEN_BUCKET', 'FIXED_WINDOW', 'SLIDING_LOG')",
    )
    .await?;
    create_enum(
        pool,
        "CREATE TYPE fail_mode AS ENUM ('FAIL_OPEN', 'FAIL_CLOSED')",
    )
    .await?;
    create_enum(
        pool,
        "CREATE TYPE identifier_type AS ENUM ('API_KEY', 'USER', 'IP', 'GLOBAL', 'TENANT')",
    )
    .await?;
    create_enum(
        pool,
        "CREATE TYPE ip_rule_type AS ENUM ('RATE_LIMIT', 'ALLOW', 'BLOCK')",
    )
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tenants (
            id UUID PRIMARY KEY,
            name VARCHAR(255) NOT NULL UNIQUE,
            tier tenant_tier NOT NULL DEFAULT 'FREE',
            enabled BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS policies (
            id UUID PRIMARY KEY,
            tenant_id UUID REFERENCES tenants(id) ON DELETE CASCADE,
            name VARCHAR(255) NOT NULL,
            scope scope NOT NULL,
            algorithm algorithm NOT NULL,
            max_requests BIGINT NOT NULL CHECK (max_requests > 0),
            window_seconds BIGINT NOT NULL CHECK (window_seconds > 0),
            burst_capacity BIGINT CHECK (burst_capacity > 0),
            refill_rate DOUBLE PRECISION CHECK (refill_rate > 0),
            fail_mode fail_mode NOT NULL DEFAULT 'FAIL_CLOSED',
            enabled BOOLEAN NOT NULL DEFAULT TRUE,
            is_default BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (tenant_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Name uniqueness for global policies (NULL tenant_id escapes the
    // composite UNIQUE constraint above).
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS uq_policies_global_name
        ON policies (name) WHERE tenant_id IS NULL
        "#,
    )
    .execute(pool)
    .await?;

    // At most one default policy per (tenant, scope), and a single global
    // default with no tenant.
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS uq_policies_tenant_default
        ON policies (tenant_id, scope) WHERE is_default AND tenant_id IS NOT NULL
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS uq_policies_global_default
        ON policies (scope) WHERE is_default AND tenant_id IS NULL
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS policy_rules (
            id UUID PRIMARY KEY,
            policy_id UUID NOT NULL REFERENCES policies(id) ON DELETE CASCADE,
            name VARCHAR(255) NOT NULL,
            resource_pattern VARCHAR(2048) NOT NULL,
            http_methods VARCHAR(255),
            priority INTEGER NOT NULL DEFAULT 0 CHECK (priority BETWEEN 0 AND 1000),
            enabled BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (policy_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS api_keys (
            id UUID PRIMARY KEY,
            tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            policy_id UUID REFERENCES policies(id) ON DELETE SET NULL,
            name VARCHAR(255) NOT NULL,
            key_hash CHAR(64) NOT NULL UNIQUE,
            key_prefix VARCHAR(12) NOT NULL UNIQUE,
            enabled BOOLEAN NOT NULL DEFAULT TRUE,
            expires_at TIMESTAMPTZ,
            last_used_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ip_rules (
            id UUID PRIMARY KEY,
            tenant_id UUID REFERENCES tenants(id) ON DELETE CASCADE,
            ip_address VARCHAR(45),
            ip_cidr VARCHAR(49),
            rule_type ip_rule_type NOT NULL DEFAULT 'RATE_LIMIT',
            policy_id UUID REFERENCES policies(id) ON DELETE CASCADE,
            description VARCHAR(1024),
            enabled BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            CHECK ((ip_address IS NULL) <> (ip_cidr IS NULL)),
            CHECK (rule_type <> 'RATE_LIMIT' OR policy_id IS NOT NULL)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_policies (
            id UUID PRIMARY KEY,
            user_id VARCHAR(255) NOT NULL,
            tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            policy_id UUID NOT NULL REFERENCES policies(id) ON DELETE CASCADE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (user_id, tenant_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS alert_rules (
            id UUID PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            policy_id UUID REFERENCES policies(id) ON DELETE CASCADE,
            threshold_percentage INTEGER NOT NULL CHECK (threshold_percentage BETWEEN 1 AND 100),
            window_seconds BIGINT NOT NULL DEFAULT 60 CHECK (window_seconds > 0),
            cooldown_seconds BIGINT NOT NULL DEFAULT 300 CHECK (cooldown_seconds >= 0),
            enabled BOOLEAN NOT NULL DEFAULT TRUE,
            last_triggered_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Decision events, list-partitioned by month. The partition key is part
    // of the primary key as PostgreSQL requires for partitioned tables.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rate_limit_events (
            id BIGINT GENERATED ALWAYS AS IDENTITY,
            policy_id UUID,
            identifier VARCHAR(255) NOT NULL,
            identifier_type identifier_type NOT NULL,
            allowed BOOLEAN NOT NULL,
            remaining BIGINT NOT NULL,
            limit_value BIGINT NOT NULL,
            ip_address VARCHAR(45),
            resource VARCHAR(2048),
            event_time TIMESTAMPTZ NOT NULL,
            partition_key VARCHAR(7) NOT NULL,
            PRIMARY KEY (id, partition_key)
        ) PARTITION BY LIST (partition_key)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_events_policy_time
        ON rate_limit_events (policy_id, event_time)
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database schema ready");
    Ok(())
}

/// Create the monthly partition for `partition_key` ("YYYY-MM") if it does
/// not exist. Called by the ingest workers when a batch crosses into a new
/// month.
pub async fn ensure_event_partition(
    pool: &sqlx::PgPool,
    partition_key: &str,
) -> Result<(), sqlx::Error> {
    // The key becomes part of an identifier, so shape-check it first.
    let valid = partition_key.len() == 7
        && partition_key
            .chars()
            .enumerate()
            .all(|(i, c)| if i == 4 { c == '-' } else { c.is_ascii_digit() });
    if !valid {
        return Err(sqlx::Error::Protocol(format!(
            "invalid partition key '{}'",
            partition_key
        )));
    }

    let table = format!("rate_limit_events_p{}", partition_key.replace('-', "_"));
    let ddl = format!(
        "CREATE TABLE IF NOT EXISTS {} PARTITION OF rate_limit_events FOR VALUES IN ('{}')",
        table, partition_key
    );
    sqlx::query(&ddl).execute(pool).await?;
    Ok(())
}
