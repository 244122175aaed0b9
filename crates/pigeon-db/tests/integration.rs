use pigeon_db::{create_pool, ensure_schema, DbRuntimeSettings, SchemaStatus};

#[test]
fn db_initialization_works() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join("pigeon.db");
    let pool = create_pool(
        path.to_str().expect("utf-8 path"),
        DbRuntimeSettings::default(),
    )
    .expect("failed to create pool");
    let conn = pool.get().expect("failed to get connection");
    let status = ensure_schema(&conn).expect("failed to prepare schema");
    assert_eq!(status, SchemaStatus::Created);

    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .expect("failed to prepare table query");
    let tables: Vec<String> = stmt
        .query_map([], |row| row.get(0))
        .expect("failed to execute table query")
        .map(|r| r.expect("failed to read table name"))
        .collect();

    assert_eq!(tables, vec!["event_log"]);
}

#[test]
fn schema_is_visible_from_every_pooled_connection() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join("pigeon.db");
    let pool = create_pool(
        path.to_str().expect("utf-8 path"),
        DbRuntimeSettings {
            pool_max_size: 2,
            ..DbRuntimeSettings::default()
        },
    )
    .expect("failed to create pool");

    let first = pool.get().expect("failed to get first connection");
    ensure_schema(&first).expect("failed to prepare schema");

    let second = pool.get().expect("failed to get second connection");
    let status = ensure_schema(&second).expect("second call should succeed");
    assert_eq!(status, SchemaStatus::Existing, "file-backed pool shares one schema");
}

#[test]
fn reopened_database_keeps_records() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join("pigeon.db");
    let path = path.to_str().expect("utf-8 path");

    {
        let pool = create_pool(path, DbRuntimeSettings::default()).expect("failed to create pool");
        let conn = pool.get().expect("failed to get connection");
        ensure_schema(&conn).expect("failed to prepare schema");
        conn.execute(
            "INSERT INTO event_log (ms, seq, payload_json, enriched_at) VALUES (7, 0, '{}', 'x')",
            [],
        )
        .expect("insert should succeed");
    }

    let pool = create_pool(path, DbRuntimeSettings::default()).expect("failed to reopen pool");
    let conn = pool.get().expect("failed to get connection");
    assert_eq!(
        ensure_schema(&conn).expect("reopen should verify schema"),
        SchemaStatus::Existing
    );
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM event_log", [], |row| row.get(0))
        .expect("count should succeed");
    assert_eq!(count, 1);
}
