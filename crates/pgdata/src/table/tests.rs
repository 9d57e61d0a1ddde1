//! Tests for table handles

use std::sync::Arc;

use futures::TryStreamExt;
use pgdata_core::{PgDataError, QueryResult, Record, Value};
use pretty_assertions::assert_eq;

use super::*;
use crate::database::DatabaseOptions;
use crate::testing::{MockState, MockTable, employees, mock_db};

fn setup() -> (Arc<MockState>, Database) {
    let state = MockState::new();
    state.add_table(employees("pgdata"));
    let db = mock_db(&state, DatabaseOptions::new().with_schema("pgdata"));
    (state, db)
}

fn strict_db(state: &Arc<MockState>) -> Database {
    mock_db(state, DatabaseOptions::new().with_schema("pgdata").strict(true))
}

fn names(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.get("name").and_then(Value::as_str).map(str::to_string))
        .collect()
}

fn page_queries(state: &MockState) -> Vec<String> {
    state
        .statements()
        .into_iter()
        .filter(|s| s.starts_with("SELECT * FROM"))
        .collect()
}

fn record(pairs: &[(&str, Value)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[tokio::test]
async fn test_find_descending_with_limit() {
    let (state, db) = setup();
    let table = db.table("employees").await.expect("table");
    state.clear_statements();

    let rows = table
        .find(FindOptions::new().order_by("-id").limit(2))
        .await
        .expect("find")
        .try_collect()
        .await
        .expect("rows");

    assert_eq!(names(&rows), vec!["Jack", "Jill"]);
    assert_eq!(
        state.statements(),
        vec![
            "SELECT count(*) FROM (SELECT * FROM \"pgdata\".\"employees\" LIMIT 2 OFFSET 0) AS count_query",
            "SELECT * FROM \"pgdata\".\"employees\" ORDER BY \"id\" DESC LIMIT 2 OFFSET 0",
        ]
    );
}

#[tokio::test]
async fn test_find_fetches_pages_lazily() {
    let (state, db) = setup();
    let table = db.table("employees").await.expect("table");
    state.clear_statements();

    let mut rows = table
        .find(FindOptions::new().step(Some(1)))
        .await
        .expect("find");
    assert_eq!(rows.pages_remaining(), 3);
    assert_eq!(rows.pages_fetched(), 0);

    let first = rows.next().await.expect("next").expect("a row");
    assert_eq!(first.get("name"), Some(&Value::from("Fred")));
    assert_eq!(rows.pages_fetched(), 1);
    assert_eq!(rows.pages_remaining(), 2);

    let rest = rows.try_collect().await.expect("rest");
    assert_eq!(names(&rest), vec!["Jill", "Jack"]);

    assert_eq!(
        page_queries(&state),
        vec![
            "SELECT * FROM \"pgdata\".\"employees\" ORDER BY \"id\" ASC LIMIT 1 OFFSET 0",
            "SELECT * FROM \"pgdata\".\"employees\" ORDER BY \"id\" ASC LIMIT 1 OFFSET 1",
            "SELECT * FROM \"pgdata\".\"employees\" ORDER BY \"id\" ASC LIMIT 1 OFFSET 2",
        ]
    );
}

#[tokio::test]
async fn test_find_with_offset_pages_from_offset() {
    let (state, db) = setup();
    let table = db.table("employees").await.expect("table");
    state.clear_statements();

    let rows = table
        .find(FindOptions::new().offset(1).step(Some(5)))
        .await
        .expect("find")
        .try_collect()
        .await
        .expect("rows");

    assert_eq!(names(&rows), vec!["Jill", "Jack"]);
    assert_eq!(
        page_queries(&state),
        vec!["SELECT * FROM \"pgdata\".\"employees\" ORDER BY \"id\" ASC LIMIT 2 OFFSET 1"]
    );
}

#[tokio::test]
async fn test_limit_zero_issues_no_page_query() {
    let (state, db) = setup();
    let table = db.table("employees").await.expect("table");
    state.clear_statements();

    let mut rows = table.find(FindOptions::new().limit(0)).await.expect("find");
    assert!(rows.next().await.expect("next").is_none());
    assert!(page_queries(&state).is_empty());
}

#[tokio::test]
async fn test_empty_table() {
    let state = MockState::new();
    state.add_table(MockTable::new("pgdata", "empty", &[("id", "int4")]));
    let db = mock_db(&state, DatabaseOptions::new().with_schema("pgdata"));
    let table = db.table("empty").await.expect("table");

    assert_eq!(table.count(Filter::new()).await.expect("count"), 0);
    assert!(table.all().await.expect("all").try_collect().await.expect("rows").is_empty());
    assert!(page_queries(&state).is_empty());
}

#[tokio::test]
async fn test_count_binds_filter_values() {
    let (state, db) = setup();
    let table = db.table("employees").await.expect("table");
    state.respond(
        "SELECT count(*)",
        QueryResult::from_rows(&["count"], vec![vec![Value::Int64(1)]]),
    );

    let count = table
        .count(Filter::new().eq("name", "Fred"))
        .await
        .expect("count");
    assert_eq!(count, 1);

    let counts = state.statements_containing("SELECT count(*)");
    assert_eq!(
        counts[0].0,
        "SELECT count(*) FROM (SELECT * FROM \"pgdata\".\"employees\" WHERE \"name\" = $1 OFFSET 0) AS count_query"
    );
    assert_eq!(counts[0].1, vec![Value::from("Fred")]);
}

#[tokio::test]
async fn test_unknown_filter_column() {
    let (state, db) = setup();
    let table = db.table("employees").await.expect("table");
    state.clear_statements();

    let filter = Filter::new().eq("salary", 100i32);
    let rows = table
        .find(FindOptions::new().filter(filter.clone()))
        .await
        .expect("lenient find")
        .try_collect()
        .await
        .expect("rows");
    assert!(rows.is_empty());
    assert_eq!(table.count(filter.clone()).await.expect("count"), 0);
    assert!(state.statements().is_empty());

    let strict = strict_db(&state).table("employees").await.expect("table");
    match strict.find(FindOptions::new().filter(filter)).await {
        Err(PgDataError::UnknownColumn { table, column }) => {
            assert_eq!(table, "pgdata.employees");
            assert_eq!(column, "salary");
        }
        other => panic!("expected UnknownColumn, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_order_column() {
    let (state, db) = setup();
    let table = db.table("employees").await.expect("table");
    state.clear_statements();

    table
        .find(FindOptions::new().order_by(vec!["hired", "-name"]))
        .await
        .expect("lenient find")
        .try_collect()
        .await
        .expect("rows");
    assert_eq!(
        page_queries(&state),
        vec!["SELECT * FROM \"pgdata\".\"employees\" ORDER BY \"name\" DESC LIMIT 3 OFFSET 0"]
    );

    let strict = strict_db(&state).table("employees").await.expect("table");
    assert!(matches!(
        strict.find(FindOptions::new().order_by("hired")).await,
        Err(PgDataError::UnknownColumn { .. })
    ));
    // the implicit id ordering never fails
    assert!(strict.find(FindOptions::new()).await.is_ok());
}

#[tokio::test]
async fn test_unordered_find_uses_one_page() {
    let state = MockState::new();
    state.add_table(
        MockTable::new("pgdata", "parks", &[("park_id", "int4"), ("name", "text")]).with_rows(
            vec![
                vec![Value::Int32(10), Value::from("Beacon Hill")],
                vec![Value::Int32(11), Value::from("Stanley")],
                vec![Value::Int32(12), Value::from("Mount Doug")],
            ],
        ),
    );
    let db = mock_db(&state, DatabaseOptions::new().with_schema("pgdata"));
    let table = db.table("parks").await.expect("table");
    state.clear_statements();

    let rows = table
        .find(FindOptions::new().step(Some(1)))
        .await
        .expect("find")
        .try_collect()
        .await
        .expect("rows");

    assert_eq!(rows.len(), 3);
    assert_eq!(
        page_queries(&state),
        vec!["SELECT * FROM \"pgdata\".\"parks\" LIMIT 3 OFFSET 0"]
    );
}

#[tokio::test]
async fn test_find_one() {
    let (_state, db) = setup();
    let table = db.table("employees").await.expect("table");

    let last = table
        .find_one(FindOptions::new().order_by("-id"))
        .await
        .expect("find_one")
        .expect("a row");
    assert_eq!(last.get("id"), Some(&Value::Int32(3)));
    assert_eq!(last.get("name"), Some(&Value::from("Jack")));
}

#[tokio::test]
async fn test_into_stream() {
    let (_state, db) = setup();
    let table = db.table("employees").await.expect("table");

    let rows: Vec<Record> = table
        .all()
        .await
        .expect("all")
        .into_stream()
        .try_collect()
        .await
        .expect("stream");
    assert_eq!(names(&rows), vec!["Fred", "Jill", "Jack"]);
}

#[tokio::test]
async fn test_distinct() {
    let (state, db) = setup();
    let table = db.table("employees").await.expect("table");
    state.respond(
        "SELECT DISTINCT",
        QueryResult::from_rows(
            &["name"],
            vec![vec![Value::from("Fred")], vec![Value::from("Jack")]],
        ),
    );

    let rows = table
        .distinct(&["name"], &Filter::new().any("id", [1i32, 3]))
        .await
        .expect("distinct");
    assert_eq!(names(&rows), vec!["Fred", "Jack"]);

    let sql = state.statements_containing("SELECT DISTINCT");
    assert_eq!(
        sql[0].0,
        "SELECT DISTINCT \"name\" FROM \"pgdata\".\"employees\" WHERE \"id\" = ANY($1) ORDER BY \"name\" ASC"
    );
    assert_eq!(
        sql[0].1,
        vec![Value::Array(vec![Value::Int32(1), Value::Int32(3)])]
    );

    assert!(
        table
            .distinct(&["salary"], &Filter::new())
            .await
            .expect("lenient")
            .is_empty()
    );
}

#[tokio::test]
async fn test_drop_is_idempotent() {
    let (state, db) = setup();
    let mut table = db.table("employees").await.expect("table");

    table.drop().await.expect("drop");
    table.drop().await.expect("drop again");

    assert!(table.is_dropped());
    assert_eq!(state.statements_containing("DROP TABLE").len(), 1);
    assert!(!table.exists().await.expect("exists"));
    assert!(matches!(table.columns(), Err(PgDataError::TableDropped(_))));
    assert!(matches!(
        table.find(FindOptions::new()).await,
        Err(PgDataError::TableDropped(_))
    ));
    assert!(matches!(
        table.insert(&Record::new()).await,
        Err(PgDataError::TableDropped(_))
    ));
}

#[tokio::test]
async fn test_create_index_is_idempotent() {
    let (state, db) = setup();
    let mut table = db.table("employees").await.expect("table");

    let first = table
        .create_index(&["name"], None, IndexKind::BTree)
        .await
        .expect("create");
    let second = table
        .create_index(&["name"], None, IndexKind::BTree)
        .await
        .expect("create again");

    assert_eq!(first, second);
    assert_eq!(
        first.name,
        default_index_name("employees", &["name"], IndexKind::BTree)
    );
    assert_eq!(state.statements_containing("CREATE INDEX").len(), 1);

    // a fresh handle sees the index and still does not recreate it
    let mut reloaded = db.table("employees").await.expect("table");
    assert!(reloaded.indexes().expect("indexes").contains_key(&first.name));
    reloaded
        .create_index(&["name"], None, IndexKind::BTree)
        .await
        .expect("create on reload");
    assert_eq!(state.statements_containing("CREATE INDEX").len(), 1);
}

#[tokio::test]
async fn test_create_index_with_long_table_name_is_idempotent() {
    let state = MockState::new();
    let long_name = "survey_observations_by_watershed_group_and_year_2024";
    assert!(long_name.len() > 44);
    state.add_table(MockTable::new("pgdata", long_name, &[("id", "int4"), ("geom", "geometry")]));
    let db = mock_db(&state, DatabaseOptions::new().with_schema("pgdata"));

    let mut table = db.table(long_name).await.expect("table");
    let created = table.create_index_geom("geom").await.expect("create");
    assert!(created.name.len() <= 63);

    let mut fresh = db.table(long_name).await.expect("table");
    assert!(fresh.indexes().expect("indexes").contains_key(&created.name));
    let again = fresh.create_index_geom("geom").await.expect("create again");
    assert_eq!(again.name, created.name);
    assert_eq!(state.statements_containing("CREATE INDEX").len(), 1);

    // explicit names are cut the same way
    let explicit = "x".repeat(70);
    let first = fresh
        .create_index(&["id"], Some(&explicit), IndexKind::BTree)
        .await
        .expect("explicit");
    assert_eq!(first.name, "x".repeat(63));
    let mut reloaded = db.table(long_name).await.expect("table");
    reloaded
        .create_index(&["id"], Some(&explicit), IndexKind::BTree)
        .await
        .expect("explicit again");
    assert_eq!(state.statements_containing("CREATE INDEX").len(), 2);
}

#[tokio::test]
async fn test_create_index_rejects_unknown_column() {
    let (state, db) = setup();
    let mut table = db.table("employees").await.expect("table");

    assert!(matches!(
        table.create_index(&["salary"], None, IndexKind::BTree).await,
        Err(PgDataError::UnknownColumn { .. })
    ));
    assert!(state.statements_containing("CREATE INDEX").is_empty());
}

#[tokio::test]
async fn test_add_and_drop_column() {
    let (state, db) = setup();
    let mut table = db.table("employees").await.expect("table");

    assert!(table.add_column(" Salary ", "numeric").await.expect("add"));
    assert!(!table.add_column("SALARY", "numeric").await.expect("add again"));
    assert_eq!(table.columns().expect("columns"), vec!["id", "name", "salary"]);
    assert_eq!(
        state.statements_containing("ADD COLUMN")[0].0,
        "ALTER TABLE \"pgdata\".\"employees\" ADD COLUMN \"salary\" numeric"
    );

    assert!(table.drop_column("salary").await.expect("drop"));
    assert!(!table.drop_column("salary").await.expect("drop again"));
    assert_eq!(table.columns().expect("columns"), vec!["id", "name"]);
    assert_eq!(state.statements_containing("DROP COLUMN").len(), 1);

    assert!(matches!(
        table.add_column("dept.name", "text").await,
        Err(PgDataError::InvalidIdentifier(_))
    ));
}

#[tokio::test]
async fn test_add_primary_key() {
    let state = MockState::new();
    state.add_table(MockTable::new("pgdata", "roads", &[("road_id", "int4")]));
    let db = mock_db(&state, DatabaseOptions::new().with_schema("pgdata"));
    let mut table = db.table("roads").await.expect("table");

    assert!(table.add_primary_key("road_id").await.expect("add pk"));
    assert_eq!(table.primary_key().expect("pk"), ["road_id".to_string()]);
    assert!(!table.add_primary_key("road_id").await.expect("already keyed"));
}

#[tokio::test]
async fn test_insert_returns_primary_key() {
    let (state, db) = setup();
    let table = db.table("employees").await.expect("table");
    state.respond(
        "RETURNING",
        QueryResult::from_rows(&["id"], vec![vec![Value::Int32(4)]]),
    );

    let id = table
        .insert(&record(&[("id", Value::Int32(4)), ("name", Value::from("Jane"))]))
        .await
        .expect("insert");
    assert_eq!(id, Some(Value::Int32(4)));

    let inserts = state.statements_containing("INSERT INTO");
    assert_eq!(
        inserts[0].0,
        "INSERT INTO \"pgdata\".\"employees\" (\"id\", \"name\") VALUES ($1, $2) RETURNING \"id\""
    );
    assert_eq!(inserts[0].1, vec![Value::Int32(4), Value::from("Jane")]);
}

#[tokio::test]
async fn test_insert_without_primary_key() {
    let state = MockState::new();
    state.add_table(MockTable::new("pgdata", "log", &[("msg", "text")]));
    let db = mock_db(&state, DatabaseOptions::new().with_schema("pgdata"));
    let table = db.table("log").await.expect("table");

    let id = table
        .insert(&record(&[("msg", Value::from("hello"))]))
        .await
        .expect("insert");
    assert_eq!(id, None);
    assert_eq!(
        state.statements_containing("INSERT INTO")[0].0,
        "INSERT INTO \"pgdata\".\"log\" (\"msg\") VALUES ($1)"
    );
}

#[tokio::test]
async fn test_insert_unknown_column() {
    let (state, db) = setup();
    let table = db.table("employees").await.expect("table");

    assert!(matches!(
        table.insert(&record(&[("salary", Value::Int32(1))])).await,
        Err(PgDataError::UnknownColumn { .. })
    ));
    assert!(state.statements_containing("INSERT INTO").is_empty());
}

#[tokio::test]
async fn test_insert_many_groups_rows_by_keys() {
    let (state, db) = setup();
    let table = db.table("employees").await.expect("table");

    let rows = vec![
        record(&[("id", Value::Int32(4)), ("name", Value::from("Jane"))]),
        record(&[("id", Value::Int32(5)), ("name", Value::from("Joe"))]),
        record(&[("name", Value::from("Anon"))]),
        record(&[("id", Value::Int32(7)), ("name", Value::from("Jo"))]),
    ];
    let affected = table.insert_many(&rows, 2).await.expect("insert_many");
    assert_eq!(affected, 4);

    let inserts: Vec<String> = state
        .statements_containing("INSERT INTO")
        .into_iter()
        .map(|(sql, _)| sql)
        .collect();
    let pair = "INSERT INTO \"pgdata\".\"employees\" (\"id\", \"name\") VALUES ($1, $2)";
    let single = "INSERT INTO \"pgdata\".\"employees\" (\"name\") VALUES ($1)";
    assert_eq!(inserts, vec![pair, pair, single, pair]);
}

#[tokio::test]
async fn test_rename() {
    let (state, db) = setup();
    let mut table = db.table("employees").await.expect("table");

    table.rename("staff").await.expect("rename");
    assert_eq!(table.qualified_name(), "pgdata.staff");
    assert_eq!(table.columns().expect("columns"), vec!["id", "name"]);
    assert!(state.table("pgdata", "staff").is_some());
    assert!(db.load_table("employees").await.expect("load").is_none());
}
