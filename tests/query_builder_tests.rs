mod common;

use common::{forget_people, person_key, seed_people, setup, Person, Pet};
use relstore::{CacheStrategy, OrmError, PersistentRecord};
use relstore_sql::{Join, OrderBy, SqlError};

fn seed_pets(t: &common::TestDb) {
    for (owner_id, name) in [(1, "Rex"), (3, "Tom"), (3, "Kit")] {
        let mut pet = Pet {
            id: 0,
            owner_id,
            name: name.to_string(),
        };
        t.repo.insert(&mut pet).unwrap();
    }
}

#[test]
fn test_duplicate_clause_rejected_before_io() {
    let t = setup();
    t.db.reset();
    let name = Person::column("name").unwrap();
    let err = t
        .repo
        .query::<Person>()
        .order_by(OrderBy::ascending(name.clone()))
        .order_by(OrderBy::descending(name))
        .select()
        .unwrap_err();
    assert!(matches!(err, OrmError::Sql(SqlError::DuplicateClause("OrderBy"))));
    assert!(t.db.statements().is_empty());
}

#[test]
fn test_where_order_limit() {
    let t = setup();
    seed_people(&t.repo, &[("Ann", 31), ("Bob", 20), ("Cid", 45), ("Dee", 27), ("Eve", 38)]);
    let age = Person::column("age").unwrap();

    let page: Vec<Person> = t
        .repo
        .query::<Person>()
        .where_(age.clone().greater_than(25))
        .order_by(OrderBy::ascending(age))
        .limit(1, 2)
        .select()
        .unwrap();
    let names: Vec<&str> = page.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Ann", "Eve"]);
}

#[test]
fn test_join_runs_single_pass() {
    let t = setup();
    seed_people(&t.repo, &[("Ann", 31), ("Bob", 20), ("Cid", 45)]);
    seed_pets(&t);
    let pet = Pet::record_type().unwrap();
    t.db.reset();

    let owners: Vec<Person> = t
        .repo
        .query::<Person>()
        .join(Join::inner(
            &pet,
            Pet::column("owner_id")
                .unwrap()
                .equals(Person::column("id").unwrap()),
        ))
        .where_(Pet::column("name").unwrap().equals("Rex"))
        .select()
        .unwrap();
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].name, "Ann");

    let statements = t.db.statements();
    assert_eq!(statements.len(), 1);
    assert!(statements[0].contains("inner join \"pet\""));
}

#[test]
fn test_field_override_not_cached() {
    let t = setup();
    seed_people(&t.repo, &[("Ann", 31)]);
    forget_people(&t.repo);

    let aged: Vec<Person> = t
        .repo
        .query::<Person>()
        .override_field("age", Person::column("age").unwrap().plus(100))
        .select()
        .unwrap();
    assert_eq!(aged[0].age, 131);

    t.db.reset();
    let ann: Person = t.repo.load(&person_key(1)).unwrap().unwrap();
    assert_eq!(ann.age, 31);
    assert_eq!(t.db.selects_on("person"), 1);
}

#[test]
fn test_select_keys_in_query_order() {
    let t = setup();
    seed_people(&t.repo, &[("Ann", 31), ("Bob", 20), ("Cid", 45)]);
    let keys = t
        .repo
        .query::<Person>()
        .order_by(OrderBy::descending(Person::column("age").unwrap()))
        .select_keys()
        .unwrap();
    assert_eq!(keys, vec![person_key(3), person_key(1), person_key(2)]);

    t.db.reset();
    let again = t
        .repo
        .query::<Person>()
        .order_by(OrderBy::descending(Person::column("age").unwrap()))
        .select_keys()
        .unwrap();
    assert_eq!(again, keys);
    assert!(t.db.statements().is_empty());

    let uncached = t
        .repo
        .query::<Person>()
        .order_by(OrderBy::descending(Person::column("age").unwrap()))
        .cache(CacheStrategy::None)
        .select_keys()
        .unwrap();
    assert_eq!(uncached, keys);
    assert_eq!(t.db.statements().len(), 1);
}

#[test]
fn test_select_count() {
    let t = setup();
    seed_people(&t.repo, &[("Ann", 31), ("Bob", 20), ("Cid", 45)]);
    let count = t
        .repo
        .query::<Person>()
        .where_(Person::column("age").unwrap().less_than(40))
        .select_count()
        .unwrap();
    assert_eq!(count, 2);
    assert_eq!(t.repo.query::<Pet>().select_count().unwrap(), 0);
}

#[test]
fn test_load_first_match() {
    let t = setup();
    seed_people(&t.repo, &[("Ann", 31), ("Bob", 20), ("Cid", 45)]);
    let youngest = t
        .repo
        .query::<Person>()
        .order_by(OrderBy::ascending(Person::column("age").unwrap()))
        .load()
        .unwrap();
    assert_eq!(youngest.map(|p| p.name), Some("Bob".to_string()));

    let nobody = t
        .repo
        .query::<Person>()
        .where_(Person::column("age").unwrap().greater_than(100))
        .load()
        .unwrap();
    assert!(nobody.is_none());
}

#[test]
fn test_delete_through_builder() {
    let t = setup();
    seed_people(&t.repo, &[("Ann", 31), ("Bob", 20), ("Cid", 45)]);
    let deleted = t
        .repo
        .query::<Person>()
        .where_(Person::column("age").unwrap().less_than(40))
        .delete()
        .unwrap();
    assert_eq!(deleted, 2);
    assert_eq!(t.repo.query::<Person>().select_count().unwrap(), 1);

    let err = t.repo.query::<Person>().delete().unwrap_err();
    assert!(matches!(err, OrmError::InvalidArgument(_)));

    let err = t
        .repo
        .query::<Person>()
        .where_(Person::column("age").unwrap().less_than(40))
        .limit(0, 1)
        .delete()
        .unwrap_err();
    assert!(matches!(err, OrmError::InvalidArgument(_)));
}

#[test]
fn test_for_update_on_sqlite() {
    let t = setup();
    seed_people(&t.repo, &[("Ann", 31), ("Bob", 20)]);
    t.db.reset();
    let locked: Vec<Person> = t
        .repo
        .query::<Person>()
        .where_(Person::column("name").unwrap().equals("Bob"))
        .for_update()
        .select()
        .unwrap();
    assert_eq!(locked.len(), 1);
    assert!(t.db.statements().iter().all(|sql| !sql.contains("for update")));
}
