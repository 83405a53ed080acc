//! SurrealDB schema migrations and initialization.
//!
//! One `init_*_table` function per table, all invoked from a single
//! idempotent `init_schema`.

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::ConnResult;

/// Initialize every ReconWatch table. Safe to call multiple times.
pub async fn init_schema(db: &Surreal<Any>) -> ConnResult<()> {
    info!("initializing ReconWatch schema");

    init_targets_table(db).await?;
    init_runs_table(db).await?;
    init_jobs_table(db).await?;
    init_scans_table(db).await?;
    init_assets_table(db).await?;
    init_services_table(db).await?;
    init_edges_table(db).await?;
    init_findings_table(db).await?;
    init_schedules_table(db).await?;
    init_run_events_table(db).await?;

    info!("ReconWatch schema initialization complete");
    Ok(())
}

async fn init_targets_table(db: &Surreal<Any>) -> ConnResult<()> {
    debug!("initializing targets table");
    let sql = r#"
        DEFINE TABLE targets SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE FIELD id ON targets TYPE string;
        DEFINE FIELD root_domain ON targets TYPE string;
        DEFINE INDEX idx_targets_id ON TABLE targets COLUMNS id UNIQUE;
    "#;
    db.query(sql).await?;
    Ok(())
}

async fn init_runs_table(db: &Surreal<Any>) -> ConnResult<()> {
    debug!("initializing runs table");
    let sql = r#"
        DEFINE TABLE runs SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE FIELD id ON runs TYPE string;
        DEFINE FIELD target_id ON runs TYPE string;
        DEFINE FIELD status ON runs TYPE string;
        DEFINE INDEX idx_runs_id ON TABLE runs COLUMNS id UNIQUE;
        DEFINE INDEX idx_runs_target ON TABLE runs COLUMNS target_id;
        DEFINE INDEX idx_runs_target_status ON TABLE runs COLUMNS target_id, status;
    "#;
    db.query(sql).await?;
    Ok(())
}

async fn init_jobs_table(db: &Surreal<Any>) -> ConnResult<()> {
    debug!("initializing jobs table");
    // `jobs(status, available_at, priority)` is the critical index: the
    // dequeue statement filters on status+available_at and orders by
    // priority, so it must be able to use a single composite index.
    let sql = r#"
        DEFINE TABLE jobs SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE FIELD id ON jobs TYPE string;
        DEFINE FIELD target_id ON jobs TYPE string;
        DEFINE FIELD status ON jobs TYPE string;
        DEFINE FIELD available_at ON jobs TYPE datetime;
        DEFINE FIELD priority ON jobs TYPE int;
        DEFINE INDEX idx_jobs_id ON TABLE jobs COLUMNS id UNIQUE;
        DEFINE INDEX idx_jobs_dispatch ON TABLE jobs COLUMNS status, available_at, priority;
        DEFINE INDEX idx_jobs_target ON TABLE jobs COLUMNS target_id, status;
        DEFINE INDEX idx_jobs_run ON TABLE jobs COLUMNS run_id;
    "#;
    db.query(sql).await?;
    Ok(())
}

async fn init_scans_table(db: &Surreal<Any>) -> ConnResult<()> {
    debug!("initializing scans table");
    let sql = r#"
        DEFINE TABLE scans SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete FULL;

        DEFINE FIELD id ON scans TYPE string;
        DEFINE FIELD run_id ON scans TYPE string;
        DEFINE INDEX idx_scans_id ON TABLE scans COLUMNS id UNIQUE;
        DEFINE INDEX idx_scans_run ON TABLE scans COLUMNS run_id;
    "#;
    db.query(sql).await?;
    Ok(())
}

async fn init_assets_table(db: &Surreal<Any>) -> ConnResult<()> {
    debug!("initializing assets table");
    // (target_id, type, normalized) uniqueness is the ingestion-layer
    // serialization point referenced throughout §5.
    let sql = r#"
        DEFINE TABLE assets SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE FIELD id ON assets TYPE string;
        DEFINE FIELD target_id ON assets TYPE string;
        DEFINE FIELD asset_type ON assets TYPE string;
        DEFINE FIELD normalized_value ON assets TYPE string;
        DEFINE INDEX idx_assets_id ON TABLE assets COLUMNS id UNIQUE;
        DEFINE INDEX idx_assets_unique_key ON TABLE assets
            COLUMNS target_id, asset_type, normalized_value UNIQUE;
        DEFINE INDEX idx_assets_target ON TABLE assets COLUMNS target_id;
    "#;
    db.query(sql).await?;
    Ok(())
}

async fn init_services_table(db: &Surreal<Any>) -> ConnResult<()> {
    debug!("initializing services table");
    let sql = r#"
        DEFINE TABLE services SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE FIELD id ON services TYPE string;
        DEFINE FIELD target_id ON services TYPE string;
        DEFINE FIELD asset_id ON services TYPE string;
        DEFINE FIELD port ON services TYPE int;
        DEFINE FIELD proto ON services TYPE string;
        DEFINE INDEX idx_services_id ON TABLE services COLUMNS id UNIQUE;
        DEFINE INDEX idx_services_unique_key ON TABLE services
            COLUMNS target_id, asset_id, port, proto UNIQUE;
    "#;
    db.query(sql).await?;
    Ok(())
}

async fn init_edges_table(db: &Surreal<Any>) -> ConnResult<()> {
    debug!("initializing edges table");
    let sql = r#"
        DEFINE TABLE edges SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE FIELD id ON edges TYPE string;
        DEFINE FIELD from_asset_id ON edges TYPE string;
        DEFINE FIELD to_asset_id ON edges TYPE string;
        DEFINE FIELD rel_type ON edges TYPE string;
        DEFINE INDEX idx_edges_id ON TABLE edges COLUMNS id UNIQUE;
        DEFINE INDEX idx_edges_unique_key ON TABLE edges
            COLUMNS from_asset_id, to_asset_id, rel_type UNIQUE;
        DEFINE INDEX idx_edges_target ON TABLE edges COLUMNS target_id;
    "#;
    db.query(sql).await?;
    Ok(())
}

async fn init_findings_table(db: &Surreal<Any>) -> ConnResult<()> {
    debug!("initializing findings table");
    let sql = r#"
        DEFINE TABLE findings SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE FIELD id ON findings TYPE string;
        DEFINE FIELD target_id ON findings TYPE string;
        DEFINE FIELD run_id ON findings TYPE string;
        DEFINE INDEX idx_findings_id ON TABLE findings COLUMNS id UNIQUE;
        DEFINE INDEX idx_findings_target ON TABLE findings COLUMNS target_id;
        DEFINE INDEX idx_findings_run ON TABLE findings COLUMNS run_id;
    "#;
    db.query(sql).await?;
    Ok(())
}

async fn init_schedules_table(db: &Surreal<Any>) -> ConnResult<()> {
    debug!("initializing schedules table");
    let sql = r#"
        DEFINE TABLE schedules SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete FULL;

        DEFINE FIELD id ON schedules TYPE string;
        DEFINE FIELD target_id ON schedules TYPE string;
        DEFINE FIELD enabled ON schedules TYPE bool;
        DEFINE FIELD next_run_at ON schedules TYPE datetime;
        DEFINE INDEX idx_schedules_id ON TABLE schedules COLUMNS id UNIQUE;
        DEFINE INDEX idx_schedules_due ON TABLE schedules COLUMNS enabled, next_run_at;
    "#;
    db.query(sql).await?;
    Ok(())
}

async fn init_run_events_table(db: &Surreal<Any>) -> ConnResult<()> {
    debug!("initializing run_events table");
    let sql = r#"
        DEFINE TABLE run_events SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE FIELD run_id ON run_events TYPE string;
        DEFINE FIELD seq ON run_events TYPE int;
        DEFINE INDEX idx_run_events_run_seq ON TABLE run_events COLUMNS run_id, seq;
    "#;
    db.query(sql).await?;
    Ok(())
}
