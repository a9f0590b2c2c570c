//! show account tests that stop before any network call.

use crate::common::{parse_stderr_json, stderr, stdout, TestHome};

#[test]
fn test_show_account_needs_active_connection() {
    let home = TestHome::new();
    let output = home.run_fails(&["show", "account"], 12);
    assert!(stdout(&output).is_empty());
    assert!(
        stderr(&output).contains("no active connection configured"),
        "{}",
        stderr(&output)
    );
}

#[test]
fn test_show_account_needs_secret() {
    let home = TestHome::new();
    home.add_connection("prod", "xy12345");
    let output = home.run_fails(&["show", "account", "--window", "30"], 12);
    assert_eq!(
        parse_stderr_json(&output)["error"],
        "SNOWFLAKE_PASSWORD is not set; export it before using connection \"prod\""
    );
}

#[test]
fn test_show_account_rejects_bad_window() {
    let home = TestHome::new();
    let output = home.run(&["show", "account", "--window", "week"]);
    assert_eq!(output.status.code(), Some(2));
}
