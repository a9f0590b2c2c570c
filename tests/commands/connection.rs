//! Connection profile management tests.

use crate::common::{parse_json, parse_stderr_json, stderr, stdout, TestHome};
use serde_json::json;

// ============================================================================
// connection set
// ============================================================================

#[test]
fn test_set_saves_profile_offline() {
    let home = TestHome::new();
    let output = home.add_connection("prod", "xy12345.us-east-1");

    let json = parse_json(&output);
    assert_eq!(json["connection"], "prod");
    assert_eq!(json["activated"], false);
    assert!(json.get("serverTime").is_none(), "skip-test must not report a server time");
    assert_eq!(
        json["savedAt"],
        home.config_file().display().to_string(),
        "savedAt should name the config file"
    );

    let config = home.read_config();
    assert!(config.contains("currentContext = \"prod\""), "{}", config);
    assert!(config.contains("defaultContext = \"prod\""), "{}", config);
    assert!(config.contains("[contexts.prod]"), "{}", config);
    assert!(config.contains("account = \"xy12345.us-east-1\""), "{}", config);
    assert!(!config.contains("name ="), "name must not be persisted: {}", config);
}

#[test]
fn test_set_without_tty_falls_back_to_no_prompt() {
    let home = TestHome::new();
    let output = home.run(&[
        "connection", "set", "prod", "--account", "a1", "--user", "u", "--role", "r",
        "--warehouse", "w", "--database", "d", "--schema", "s", "--skip-test",
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(
        stderr(&output).contains("not a terminal"),
        "should explain the prompt fallback: {}",
        stderr(&output)
    );
    assert_eq!(parse_json(&output)["connection"], "prod");
}

#[test]
fn test_set_missing_required_values() {
    let home = TestHome::new();
    let output = home.run_fails(
        &["connection", "set", "prod", "--account", "a1", "--no-prompt", "--skip-test"],
        12,
    );
    assert!(stdout(&output).is_empty());
    let err = parse_stderr_json(&output);
    let message = err["error"].as_str().unwrap();
    assert!(message.contains("--user"), "{}", message);
    assert!(message.contains("--schema"), "{}", message);
    assert!(!home.config_file().exists(), "nothing may be written");
}

#[test]
fn test_set_reads_env_defaults() {
    let home = TestHome::new();
    let output = home.run_with_env(
        &["connection", "set", "envconn", "--no-prompt", "--skip-test"],
        &[
            ("SNOWFLAKE_ACCOUNT", "envacct"),
            ("SNOWFLAKE_USER", "ENVUSER"),
            ("SNOWFLAKE_ROLE", "ENVROLE"),
            ("SNOWFLAKE_WAREHOUSE", "ENVWH"),
            ("SNOWFLAKE_DATABASE", "ENVDB"),
            ("SNOWFLAKE_SCHEMA", "ENVSCHEMA"),
        ],
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let list = parse_json(&home.run_ok(&["connection", "list"]));
    assert_eq!(list[0]["account"], "envacct");
    assert_eq!(list[0]["schema"], "ENVSCHEMA");
}

#[test]
fn test_set_updates_existing_profile() {
    let home = TestHome::new();
    home.add_connection("prod", "old");
    home.run_ok(&[
        "connection", "set", "prod", "--account", "new", "--description", "primary",
        "--auth-method", "pat", "--no-prompt", "--skip-test",
    ]);

    let list = parse_json(&home.run_ok(&["connection", "list"]));
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["account"], "new");
    assert_eq!(list[0]["user"], "ANALYST", "unchanged fields survive");
    assert_eq!(list[0]["description"], "primary");
    assert_eq!(list[0]["authMethod"], "pat");
}

#[test]
fn test_set_rejects_path_separator_in_name() {
    let home = TestHome::new();
    let output = home.run_fails(
        &[
            "connection", "set", "team/prod", "--account", "a", "--user", "u", "--role", "r",
            "--warehouse", "w", "--database", "d", "--schema", "s", "--no-prompt", "--skip-test",
        ],
        12,
    );
    assert!(stderr(&output).contains("path separators"));
    assert!(!home.config_file().exists());
}

#[test]
fn test_set_rejects_unknown_auth_method() {
    let home = TestHome::new();
    home.run_fails(
        &[
            "connection", "set", "prod", "--account", "a", "--user", "u", "--role", "r",
            "--warehouse", "w", "--database", "d", "--schema", "s", "--auth-method", "kerberos",
            "--no-prompt", "--skip-test",
        ],
        12,
    );
}

#[test]
fn test_set_make_current() {
    let home = TestHome::new();
    home.add_connection("a", "acct-a");
    let output = home.run_ok(&[
        "connection", "set", "b", "--account", "acct-b", "--user", "u", "--role", "r",
        "--warehouse", "w", "--database", "d", "--schema", "s", "--make-current",
        "--no-prompt", "--skip-test",
    ]);
    assert_eq!(parse_json(&output)["activated"], true);

    let list = parse_json(&home.run_ok(&["connection", "list"]));
    assert_eq!(list[0]["name"], "a");
    assert_eq!(list[0]["isCurrent"], false);
    assert_eq!(list[0]["isDefault"], true);
    assert_eq!(list[1]["name"], "b");
    assert_eq!(list[1]["isCurrent"], true);
}

#[test]
fn test_store_secret_requires_a_secret() {
    let home = TestHome::new();
    let args = [
        "connection", "set", "prod", "--account", "a", "--user", "u", "--role", "r",
        "--warehouse", "w", "--database", "d", "--schema", "s", "--store-secret",
        "--no-prompt", "--skip-test",
    ];
    let output = home.run(&args);
    crate::common::assert_exit(&output, &args, 12);
    assert!(stderr(&output).contains("SNOWFLAKE_PASSWORD is not set"));

    let output = home.run_with_env(&args, &[("SNOWFLAKE_PASSWORD", "hunter2")]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(home.read_config().contains("secret = \"hunter2\""));

    // Never echoed back
    let list = home.run_ok(&["connection", "list"]);
    assert!(!stdout(&list).contains("hunter2"));
}

// ============================================================================
// list / use / set-default / remove
// ============================================================================

#[test]
fn test_list_empty() {
    let home = TestHome::new();
    let output = home.run_ok(&["connection", "list"]);
    assert_eq!(parse_json(&output), json!([]));
    assert!(!home.config_file().exists(), "list must not create the store");
}

#[test]
fn test_list_sorted_with_pointer_flags() {
    let home = TestHome::new();
    home.add_connection("zeta", "z1");
    home.add_connection("alpha", "a1");

    let list = parse_json(&home.run_ok(&["connection", "list"]));
    let names: Vec<&str> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["alpha", "zeta"]);
    assert_eq!(list[1]["isCurrent"], true, "first profile becomes current");
    assert_eq!(list[1]["isDefault"], true, "first profile becomes default");
    assert_eq!(list[0]["isCurrent"], false);
}

#[test]
fn test_use_switches_current() {
    let home = TestHome::new();
    home.add_connection("a", "acct-a");
    home.add_connection("b", "acct-b");

    let output = home.run_ok(&["connection", "use", "b"]);
    assert_eq!(
        parse_json(&output),
        json!({"connection": "b", "account": "acct-b", "role": "REPORTER"})
    );
    assert!(home.read_config().contains("currentContext = \"b\""));
    assert!(home.read_config().contains("defaultContext = \"a\""));
}

#[test]
fn test_use_missing_is_not_found() {
    let home = TestHome::new();
    home.add_connection("a", "acct-a");
    let before = home.read_config();

    let output = home.run_fails(&["connection", "use", "nope"], 13);
    assert!(stdout(&output).is_empty());
    let err = parse_stderr_json(&output);
    assert_eq!(err["error"], "connection \"nope\" not found");
    assert!(err["hint"].as_str().unwrap().contains("connection list"));
    assert_eq!(home.read_config(), before, "no mutation on not-found");
}

#[test]
fn test_set_default_reports_pointers() {
    let home = TestHome::new();
    home.add_connection("a", "acct-a");
    home.add_connection("b", "acct-b");

    // current stays "a", so only default is reported
    let output = home.run_ok(&["connection", "set-default", "b"]);
    assert_eq!(parse_json(&output), json!({"default": "b"}));

    home.run_ok(&["connection", "use", "b"]);
    let output = home.run_ok(&["connection", "set-default", "b"]);
    assert_eq!(parse_json(&output), json!({"default": "b", "current": "b"}));

    home.run_fails(&["connection", "set-default", "missing"], 13);
}

#[test]
fn test_remove_current_falls_back_to_default() {
    let home = TestHome::new();
    home.add_connection("a", "acct-a");
    home.add_connection("b", "acct-b");
    home.run_ok(&["connection", "use", "a"]);
    home.run_ok(&["connection", "set-default", "b"]);

    let output = home.run_ok(&["connection", "remove", "a"]);
    assert_eq!(
        parse_json(&output),
        json!({"connection": "a", "status": "deleted", "current": "b", "default": "b"})
    );
}

#[test]
fn test_remove_both_pointers_picks_smallest_name() {
    let home = TestHome::new();
    home.add_connection("m", "acct-m");
    home.add_connection("z", "acct-z");
    home.add_connection("c", "acct-c");

    let output = home.run_ok(&["connection", "rm", "m"]);
    let json = parse_json(&output);
    assert_eq!(json["current"], "c");
    assert_eq!(json["default"], "c");
}

#[test]
fn test_remove_last_clears_pointers() {
    let home = TestHome::new();
    home.add_connection("only", "acct");

    let output = home.run_ok(&["connection", "delete", "only"]);
    let json = parse_json(&output);
    assert_eq!(json["current"], "");
    assert_eq!(json["default"], "");
    assert_eq!(parse_json(&home.run_ok(&["connection", "list"])), json!([]));
}

#[test]
fn test_remove_missing_is_not_found() {
    let home = TestHome::new();
    home.add_connection("a", "acct-a");
    home.run_fails(&["connection", "remove", "ghost"], 13);
}

// ============================================================================
// connection test (offline failures only)
// ============================================================================

#[test]
fn test_test_without_connections() {
    let home = TestHome::new();
    let output = home.run_fails(&["connection", "test"], 12);
    assert!(stderr(&output).contains("no connections configured"));
}

#[test]
fn test_test_ambiguous_without_tty() {
    let home = TestHome::new();
    home.add_connection("a", "acct-a");
    home.add_connection("b", "acct-b");
    let output = home.run_fails(&["connection", "test"], 12);
    assert!(stderr(&output).contains("one of: a, b"), "{}", stderr(&output));
}

#[test]
fn test_test_requires_secret() {
    let home = TestHome::new();
    home.add_connection("a", "acct-a");
    let output = home.run_fails(&["connection", "test", "a"], 12);
    assert!(stderr(&output).contains("SNOWFLAKE_PASSWORD is not set"));
}

// ============================================================================
// Legacy migration
// ============================================================================

#[test]
fn test_legacy_json_config_is_migrated() {
    let home = TestHome::new();
    std::fs::create_dir_all(home.config_dir()).unwrap();
    let legacy = r#"{
  "currentContext": "old",
  "defaultContext": "old",
  "contexts": {
    "old": {"account": "legacy1", "user": "U", "authMethod": "pat"}
  }
}"#;
    let legacy_path = home.config_dir().join("config.json");
    std::fs::write(&legacy_path, legacy).unwrap();

    let list = parse_json(&home.run_ok(&["connection", "list"]));
    assert_eq!(list[0]["name"], "old");
    assert_eq!(list[0]["account"], "legacy1");
    assert_eq!(list[0]["authMethod"], "pat");
    assert_eq!(list[0]["isCurrent"], true);

    assert!(home.config_file().exists(), "converted store is persisted");
    assert_eq!(std::fs::read_to_string(&legacy_path).unwrap(), legacy);
}

#[test]
fn test_corrupt_config_is_config_error() {
    let home = TestHome::new();
    std::fs::create_dir_all(home.config_dir()).unwrap();
    std::fs::write(home.config_file(), "currentContext = [unterminated").unwrap();

    let output = home.run_fails(&["connection", "list"], 12);
    assert!(stdout(&output).is_empty());
    assert!(stderr(&output).contains("parse config"));
}
