#![allow(missing_docs)]

use std::fs;
use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;

const SCHEMA: &str = r#"
version = 3

[[databases]]
name = "shop"

[[databases.tables]]
name = "orders"
primary_key = "id"
row_count = 5000
columns = [{ name = "id", type = "int" }, { name = "customer_id", type = "int" }, { name = "total", type = "float" }]
indexes = [{ name = "idx_customer", columns = ["customer_id"] }]

[[databases.tables]]
name = "customers"
primary_key = "id"
columns = [{ name = "id", type = "int" }, { name = "name", type = "string" }]
"#;

const POINT_GET: &str = r#"{"select": {
    "fields": ["wildcard"],
    "from": [{"table": {"name": "orders"}}],
    "filter": {"binary": {"op": "eq", "lhs": {"column": {"name": "id"}}, "rhs": {"literal": {"int": 7}}}}
}}"#;

struct Fixture {
    dir: TempDir,
    schema: PathBuf,
    config: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let schema = dir.path().join("schema.toml");
        fs::write(&schema, SCHEMA).expect("write schema");
        let config = dir.path().join("sluice.toml");
        fs::write(&config, "[logging]\nlevel = \"warn\"\n").expect("write config");
        Self {
            dir,
            schema,
            config,
        }
    }

    fn statements(&self, name: &str, json: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, json).expect("write statements");
        path
    }
}

#[test]
fn plan_prints_explain_tree() {
    let fx = Fixture::new();
    let stmts = fx.statements("point.json", POINT_GET);
    let output = cargo_bin_cmd!("sluice")
        .env_remove("SLUICE_CONFIG")
        .arg("--config")
        .arg(&fx.config)
        .arg("plan")
        .arg("--schema")
        .arg(&fx.schema)
        .arg("--statement")
        .arg(&stmts)
        .args(["--database", "shop"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("-- [1] select"));
    assert!(lines.next().expect("plan line").starts_with("PointGet"));
    assert!(text.contains("plan_hash: 0x"));
}

#[test]
fn json_output_covers_every_statement() {
    let fx = Fixture::new();
    let batch = format!(
        r#"[
            {{"use": {{"db": "shop"}}}},
            {{"show_tables": {{}}}},
            {POINT_GET},
            {{"prepare": {{"name": "by_customer", "stmt": {{"select": {{
                "fields": [{{"expr": {{"expr": {{"column": {{"name": "total"}}}}}}}}],
                "from": [{{"table": {{"name": "orders"}}}}],
                "filter": {{"binary": {{"op": "eq", "lhs": {{"column": {{"name": "customer_id"}}}}, "rhs": {{"param": 0}}}}}}
            }}}}}}}},
            {{"execute": {{"name": "by_customer", "params": [{{"literal": {{"int": 11}}}}]}}}}
        ]"#
    );
    let stmts = fx.statements("batch.json", &batch);
    let output = cargo_bin_cmd!("sluice")
        .env_remove("SLUICE_CONFIG")
        .arg("--config")
        .arg(&fx.config)
        .args(["--format", "json", "plan"])
        .arg("--schema")
        .arg(&fx.schema)
        .arg("--statement")
        .arg(&stmts)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let reports: Value = serde_json::from_slice(&output).expect("json");
    let reports = reports.as_array().expect("array");
    assert_eq!(reports.len(), 5);
    assert_eq!(reports[0]["outcome"]["database"], "shop");
    assert_eq!(
        reports[1]["outcome"]["tables"],
        serde_json::json!(["customers", "orders"])
    );
    assert_eq!(reports[2]["outcome"]["kind"], "physical");
    assert_eq!(reports[2]["outcome"]["explain"]["root"]["op"], "PointGet");
    assert_eq!(reports[3]["outcome"]["prepared"]["param_count"], 1);
    assert_eq!(reports[4]["statement"], "execute");
    assert_eq!(reports[4]["outcome"]["kind"], "execute");
    assert_eq!(reports[4]["outcome"]["explain"]["root"]["op"], "Execute");
}

#[test]
fn cascades_flag_fails_logical_statements() {
    let fx = Fixture::new();
    let stmts = fx.statements(
        "scan.json",
        r#"{"select": {"fields": ["wildcard"], "from": [{"table": {"name": "customers"}}]}}"#,
    );
    let output = cargo_bin_cmd!("sluice")
        .env_remove("SLUICE_CONFIG")
        .arg("--config")
        .arg(&fx.config)
        .arg("plan")
        .arg("--schema")
        .arg(&fx.schema)
        .arg("--statement")
        .arg(&stmts)
        .args(["--database", "shop", "--cascades"])
        .assert()
        .failure()
        .code(1)
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8(output).expect("utf8");
    assert!(stderr.contains("error: statement 1: [CascadesNotImplemented]"));
}

#[test]
fn unparsable_statement_file_is_reported() {
    let fx = Fixture::new();
    let stmts = fx.statements("broken.json", r#"{"select": 42}"#);
    let output = cargo_bin_cmd!("sluice")
        .env_remove("SLUICE_CONFIG")
        .arg("--config")
        .arg(&fx.config)
        .arg("plan")
        .arg("--schema")
        .arg(&fx.schema)
        .arg("--statement")
        .arg(&stmts)
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8(output).expect("utf8");
    assert!(stderr.contains("failed to parse statement file"));
}

#[test]
fn schema_command_lists_tables() {
    let fx = Fixture::new();
    let output = cargo_bin_cmd!("sluice")
        .env_remove("SLUICE_CONFIG")
        .arg("--config")
        .arg(&fx.config)
        .arg("schema")
        .arg("--schema")
        .arg(&fx.schema)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(
        String::from_utf8(output).expect("utf8"),
        "version: 3\nshop\n  customers\n  orders\n"
    );
}
