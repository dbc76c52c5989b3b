mod common;

use common::{person_key, seed_people, Person};
use relstore::{
    CacheAdapter, CacheCategory, CacheKeyValue, CachedValue, InMemoryCache, OrmError, PersistenceConfig,
    PersistenceContext, Repository, SqliteProvider,
};
use relstore_sql::DialectKind;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes()).expect("Failed to write config");
    file
}

#[test]
fn test_repository_from_config_file() {
    common::init_tracing();
    let file = write_config(
        r#"
dialect = "sqlite"
max_in_keys = 100

[cache.record]
capacity = 50
"#,
    );
    let config = PersistenceConfig::from_file(file.path()).unwrap();
    assert_eq!(config.dialect, DialectKind::Sqlite);
    assert_eq!(config.cache.record.capacity, 50);
    assert_eq!(config.cache.record.ttl(), None);

    let provider = SqliteProvider::open_in_memory().unwrap();
    provider
        .execute_batch("create table person (id integer primary key autoincrement, name text not null, age integer not null, born text)")
        .unwrap();
    let repo = Repository::new(PersistenceContext::new(Arc::new(provider), config).unwrap());
    assert_eq!(repo.context().max_in_keys(), 100);
    assert_eq!(repo.context().dialect().name(), "sqlite");

    seed_people(&repo, &[("Ann", 31)]);
    assert_eq!(repo.load::<Person>(&person_key(1)).unwrap().unwrap().name, "Ann");
}

#[test]
fn test_sqlite_file_database_persists() {
    common::init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("people.db");
    let config = PersistenceConfig {
        dialect: DialectKind::Sqlite,
        ..PersistenceConfig::default()
    };

    {
        let provider = SqliteProvider::open(&path).unwrap();
        provider
            .execute_batch("create table person (id integer primary key autoincrement, name text not null, age integer not null, born text)")
            .unwrap();
        let repo = Repository::new(PersistenceContext::new(Arc::new(provider), config.clone()).unwrap());
        seed_people(&repo, &[("Ann", 31), ("Bob", 20)]);
    }

    let provider = SqliteProvider::open(&path).unwrap();
    let repo = Repository::new(PersistenceContext::new(Arc::new(provider), config).unwrap());
    let everyone: Vec<Person> = repo.find_all(vec![]).unwrap();
    assert_eq!(everyone.len(), 2);
}

#[test]
fn test_invalid_values_rejected() {
    let file = write_config("max_in_keys = 0\n");
    let err = PersistenceConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(err, OrmError::Config(_)));

    let file = write_config("[cache.short_keyset]\ncapacity = 0\n");
    let err = PersistenceConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(err, OrmError::Config(_)));
}

#[test]
fn test_malformed_file() {
    let file = write_config("dialect = \"oracle\"\n");
    let err = PersistenceConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(err, OrmError::TomlParse(_)));
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = PersistenceConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, OrmError::Io(_)));
}

#[test]
fn test_context_rejects_invalid_config() {
    let config = PersistenceConfig {
        max_in_keys: 0,
        ..PersistenceConfig::default()
    };
    let provider = Arc::new(SqliteProvider::open_in_memory().unwrap());
    assert!(matches!(
        PersistenceContext::new(provider, config),
        Err(OrmError::Config(_))
    ));
}

#[test]
fn test_custom_cache_adapter() {
    let config = PersistenceConfig {
        dialect: DialectKind::Sqlite,
        ..PersistenceConfig::default()
    };
    let cache = Arc::new(InMemoryCache::new(config.cache.clone()));
    let provider = Arc::new(SqliteProvider::open_in_memory().unwrap());
    let ctx = PersistenceContext::with_cache(provider, config, cache.clone()).unwrap();

    ctx.cache().store(
        CacheCategory::Result,
        "report",
        CacheKeyValue::Text("daily".to_string()),
        CachedValue::of(42_i64),
    );
    let cached = cache.lookup("report", &CacheKeyValue::Text("daily".to_string()));
    assert_eq!(cached.and_then(|v| v.get::<i64>()), Some(42));
    assert_eq!(cache.stats().stores, 1);
}
