//! Output format tests: the same command rendered as json, yaml, csv, tsv.

use crate::common::{parse_json, stderr, stdout, TestHome};

fn two_profiles() -> TestHome {
    let home = TestHome::new();
    home.add_connection("prod", "xy12345");
    home.add_connection("dev", "dev123");
    home
}

#[test]
fn test_json_is_pretty_with_trailing_newline() {
    let home = two_profiles();
    let output = home.run_ok(&["connection", "use", "dev"]);
    assert_eq!(
        stdout(&output),
        "{\n  \"connection\": \"dev\",\n  \"account\": \"dev123\",\n  \"role\": \"REPORTER\"\n}\n"
    );
}

#[test]
fn test_list_as_csv() {
    let home = two_profiles();
    let output = home.run_ok(&["connection", "list", "-o", "csv"]);
    assert_eq!(
        stdout(&output),
        "account,authMethod,database,isCurrent,isDefault,name,role,schema,user,warehouse\n\
         dev123,password,DB,false,false,dev,REPORTER,PUBLIC,ANALYST,WH\n\
         xy12345,password,DB,true,true,prod,REPORTER,PUBLIC,ANALYST,WH\n"
    );
}

#[test]
fn test_list_as_tsv() {
    let home = two_profiles();
    let output = home.run_ok(&["-o", "tsv", "connection", "list"]);
    let text = stdout(&output);
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("account\tauthMethod\tdatabase\tisCurrent\tisDefault\tname\trole\tschema\tuser\twarehouse")
    );
    assert_eq!(lines.count(), 2);
}

#[test]
fn test_list_as_yaml() {
    let home = TestHome::new();
    home.add_connection("prod", "xy12345");
    let output = home.run_ok(&["connection", "list", "--output", "yaml"]);
    assert_eq!(
        stdout(&output),
        "- name: prod\n  isCurrent: true\n  isDefault: true\n  account: xy12345\n  user: ANALYST\n  role: REPORTER\n  warehouse: WH\n  database: DB\n  schema: PUBLIC\n  authMethod: password\n"
    );
}

#[test]
fn test_single_record_as_csv_row() {
    let home = two_profiles();
    let output = home.run_ok(&["connection", "remove", "dev", "-o", "csv"]);
    assert_eq!(
        stdout(&output),
        "connection,current,default,status\ndev,prod,prod,deleted\n"
    );
}

#[test]
fn test_empty_list_as_csv_writes_nothing() {
    let home = TestHome::new();
    let output = home.run_ok(&["connection", "list", "-o", "csv"]);
    assert!(stdout(&output).is_empty());
}

#[test]
fn test_unsupported_format_fails_before_output() {
    let home = two_profiles();
    let before = home.read_config();

    let output = home.run_fails(&["connection", "use", "dev", "-o", "xml"], 12);
    assert!(stdout(&output).is_empty(), "nothing on stdout");
    let err = stderr(&output);
    assert!(err.contains("unsupported output format \"xml\""), "{}", err);
    assert!(err.contains("json, yaml, csv, tsv"), "{}", err);
    assert_eq!(home.read_config(), before, "command must not run");
}

#[test]
fn test_format_name_is_case_insensitive() {
    let home = two_profiles();
    let output = home.run_ok(&["connection", "list", "-o", "JSON"]);
    assert_eq!(parse_json(&output).as_array().unwrap().len(), 2);
}

#[test]
fn test_usage_error_exit_code() {
    let home = TestHome::new();
    let output = home.run(&["connection", "use"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stdout(&output).is_empty());
}
