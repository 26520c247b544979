use super::*;

#[tokio::test]
async fn test_create_table_and_count() {
    let db = DuckDbWarehouse::in_memory().unwrap();
    db.create_table_as("t", "SELECT 1 AS id UNION ALL SELECT 2", true)
        .await
        .unwrap();
    assert_eq!(db.query_count("SELECT * FROM t").await.unwrap(), 2);
}

#[tokio::test]
async fn test_create_view() {
    let db = DuckDbWarehouse::in_memory().unwrap();
    db.create_table_as("base", "SELECT 1 AS id", true).await.unwrap();
    db.create_view_as("v", "SELECT * FROM base", true).await.unwrap();
    assert_eq!(db.query_count("SELECT * FROM v").await.unwrap(), 1);
}

#[tokio::test]
async fn test_relation_exists() {
    let db = DuckDbWarehouse::in_memory().unwrap();
    assert!(!db.relation_exists("t").await.unwrap());
    db.create_table_as("t", "SELECT 1 AS id", true).await.unwrap();
    assert!(db.relation_exists("t").await.unwrap());
}

#[tokio::test]
async fn test_schema_qualified_relations() {
    let db = DuckDbWarehouse::in_memory().unwrap();
    db.create_schema_if_not_exists("staging").await.unwrap();
    db.create_table_as("staging.t", "SELECT 1 AS id", true)
        .await
        .unwrap();
    assert!(db.relation_exists("staging.t").await.unwrap());
    assert!(!db.relation_exists("staging.other").await.unwrap());
}

#[tokio::test]
async fn test_drop_if_exists_is_idempotent() {
    let db = DuckDbWarehouse::in_memory().unwrap();
    db.create_table_as("t", "SELECT 1 AS id", true).await.unwrap();
    db.drop_if_exists("t").await.unwrap();
    db.drop_if_exists("t").await.unwrap();
    assert!(!db.relation_exists("t").await.unwrap());
}

#[tokio::test]
async fn test_execution_error_surfaces() {
    let db = DuckDbWarehouse::in_memory().unwrap();
    let err = db.execute("SELECT definitely broken from").await.unwrap_err();
    assert!(matches!(err, DbError::ExecutionError(_)));
}

#[tokio::test]
async fn test_load_csv_with_type_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("countries.csv");
    std::fs::write(&csv_path, "code,population\nus,331\nfr,68\n").unwrap();

    let db = DuckDbWarehouse::in_memory().unwrap();
    let mut options = CsvLoadOptions::default();
    options
        .column_types
        .insert("population".to_string(), "BIGINT".to_string());
    db.load_csv("countries", csv_path.to_str().unwrap(), &options)
        .await
        .unwrap();
    assert_eq!(db.query_count("SELECT * FROM countries").await.unwrap(), 2);
}

#[tokio::test]
async fn test_query_sample_rows_limits() {
    let db = DuckDbWarehouse::in_memory().unwrap();
    db.create_table_as("t", "SELECT * FROM range(10)", true)
        .await
        .unwrap();
    let rows = db.query_sample_rows("SELECT * FROM t", 3).await.unwrap();
    assert_eq!(rows.len(), 3);
}
