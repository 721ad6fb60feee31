use duckdb::Connection;

/// DDL for the full relational schema. Sequences feed the integer primary
/// keys so inserts can use `RETURNING` to hand back generated ids.
pub const CREATE_TABLES: &str = r"
CREATE SEQUENCE IF NOT EXISTS seq_org_id;
CREATE SEQUENCE IF NOT EXISTS seq_user_id;
CREATE SEQUENCE IF NOT EXISTS seq_location_id;
CREATE SEQUENCE IF NOT EXISTS seq_category_id;
CREATE SEQUENCE IF NOT EXISTS seq_emission_id;
CREATE SEQUENCE IF NOT EXISTS seq_log_id;

CREATE TABLE IF NOT EXISTS Organizations (
    org_id      BIGINT PRIMARY KEY DEFAULT nextval('seq_org_id'),
    name        VARCHAR NOT NULL,
    industry    VARCHAR,
    created_at  TIMESTAMP NOT NULL DEFAULT current_timestamp
);

CREATE TABLE IF NOT EXISTS Users (
    user_id       BIGINT PRIMARY KEY DEFAULT nextval('seq_user_id'),
    name          VARCHAR NOT NULL,
    email         VARCHAR NOT NULL,
    password_hash VARCHAR NOT NULL,
    role          VARCHAR NOT NULL DEFAULT 'user',
    org_id        BIGINT,
    status        VARCHAR NOT NULL DEFAULT 'pending',
    created_at    TIMESTAMP NOT NULL DEFAULT current_timestamp
);

CREATE TABLE IF NOT EXISTS Locations (
    location_id BIGINT PRIMARY KEY DEFAULT nextval('seq_location_id'),
    org_id      BIGINT NOT NULL,
    name        VARCHAR NOT NULL,
    type        VARCHAR
);

CREATE TABLE IF NOT EXISTS EmissionCategories (
    category_id BIGINT PRIMARY KEY DEFAULT nextval('seq_category_id'),
    name        VARCHAR NOT NULL
);

CREATE TABLE IF NOT EXISTS DailyEmissions (
    emission_id     BIGINT PRIMARY KEY DEFAULT nextval('seq_emission_id'),
    org_id          BIGINT NOT NULL,
    location_id     BIGINT,
    category_id     BIGINT,
    record_date     DATE NOT NULL,
    co2_emitted     DOUBLE NOT NULL DEFAULT 0,
    energy_consumed DOUBLE NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS AuditLogs (
    log_id    BIGINT PRIMARY KEY DEFAULT nextval('seq_log_id'),
    user_id   BIGINT,
    action    VARCHAR NOT NULL,
    details   VARCHAR NOT NULL,
    timestamp TIMESTAMP NOT NULL DEFAULT current_timestamp
);
";

/// Initialize the database schema. Idempotent.
pub fn init_schema(conn: &Connection) -> Result<(), duckdb::Error> {
    conn.execute_batch(CREATE_TABLES)?;
    Ok(())
}
