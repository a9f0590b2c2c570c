//! sql command tests. Everything here fails before any network call.

use crate::common::{parse_stderr_json, stderr, stdout, TestHome};

#[test]
fn test_sql_requires_query() {
    let home = TestHome::new();
    home.add_connection("prod", "xy12345");

    let output = home.run_fails(&["sql"], 12);
    assert!(stdout(&output).is_empty());
    assert_eq!(
        parse_stderr_json(&output)["error"],
        "query is required. Use --query \"SELECT ...\""
    );

    home.run_fails(&["sql", "--query", "   "], 12);
}

#[test]
fn test_sql_without_active_connection() {
    let home = TestHome::new();
    let output = home.run_fails(&["sql", "-q", "select 1"], 12);
    assert!(
        stderr(&output).contains("no active connection configured"),
        "{}",
        stderr(&output)
    );
}

#[test]
fn test_sql_override_must_exist() {
    let home = TestHome::new();
    home.add_connection("prod", "xy12345");
    let output = home.run_fails(&["sql", "-q", "select 1", "-c", "staging"], 13);
    assert!(stderr(&output).contains("connection \\\"staging\\\" not found"));
}

#[test]
fn test_sql_requires_secret_for_auth_method() {
    let home = TestHome::new();
    home.add_connection("prod", "xy12345");
    home.run_ok(&[
        "connection", "set", "prod", "--auth-method", "pat", "--no-prompt", "--skip-test",
    ]);

    let output = home.run_fails(&["sql", "--text", "select 1"], 12);
    assert!(
        stderr(&output).contains("SNOWFLAKE_PAT is not set"),
        "{}",
        stderr(&output)
    );
}

#[test]
fn test_sql_human_errors_outside_json_mode() {
    let home = TestHome::new();
    let output = home.run_fails(&["sql", "-q", "select 1", "-o", "csv"], 12);
    let err = stderr(&output);
    assert!(err.contains("Error:"), "{}", err);
    assert!(!err.trim_start().starts_with('{'), "{}", err);
}
