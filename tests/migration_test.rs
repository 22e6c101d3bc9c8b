mod helpers;

use mnemograph::db;
use mnemograph::db::migrations::{
    get_embedding_model, get_schema_version, run_migrations, set_embedding_model,
    CURRENT_SCHEMA_VERSION,
};
use rusqlite::params;

#[test]
fn fresh_db_migrates_to_current_version() {
    let conn = helpers::test_db();
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
}

#[test]
fn migrations_are_idempotent() {
    let mut conn = helpers::test_db();
    run_migrations(&mut conn).unwrap();
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
}

#[test]
fn embedding_model_is_unset_until_recorded() {
    let conn = helpers::test_db();
    assert!(get_embedding_model(&conn).unwrap().is_none());
    set_embedding_model(&conn, "hash").unwrap();
    assert_eq!(get_embedding_model(&conn).unwrap().as_deref(), Some("hash"));
}

#[test]
fn v1_db_with_decayed_rows_upgrades_correctly() {
    db::load_sqlite_vec();
    let mut conn = rusqlite::Connection::open_in_memory().unwrap();
    conn.pragma_update(None, "foreign_keys", "ON").unwrap();
    db::schema::init_schema(&conn).unwrap();
    assert_eq!(get_schema_version(&conn).unwrap(), 1);

    conn.execute(
        "INSERT INTO memories (id, text, tier, importance, created_at, last_accessed_at, decayed) \
         VALUES (?1, 'old note', 'episodic', 0.2, ?2, ?2, 1)",
        params!["legacy", "2024-01-01T00:00:00.000000Z"],
    )
    .unwrap();

    run_migrations(&mut conn).unwrap();

    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    let decayed_at: Option<String> = conn
        .query_row("SELECT decayed_at FROM memories WHERE id = 'legacy'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(decayed_at.as_deref(), Some("2024-01-01T00:00:00.000000Z"));
}
