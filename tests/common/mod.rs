//! Common test infrastructure for snowctl integration tests.
//!
//! Provides:
//! - TestHome: temp config directory the binary is pointed at
//! - Output assertion helpers

use std::path::PathBuf;
use std::process::{Command, Output};

/// An isolated config directory. Every command runs with a cleared
/// environment and `SNOWCTL_CONFIG_DIR` pointing here.
pub struct TestHome {
    pub dir: tempfile::TempDir,
}

impl TestHome {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("Failed to create temp dir"),
        }
    }

    /// Directory holding the config file
    pub fn config_dir(&self) -> PathBuf {
        self.dir.path().join("snowctl")
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir().join("config")
    }

    /// Run snowctl with isolated environment
    pub fn run(&self, args: &[&str]) -> Output {
        self.run_with_env(args, &[])
    }

    pub fn run_with_env(&self, args: &[&str], env: &[(&str, &str)]) -> Output {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_snowctl"));
        cmd.args(args)
            .current_dir(self.dir.path())
            .env_clear()
            .env("HOME", self.dir.path())
            .env("PATH", std::env::var("PATH").unwrap_or_default())
            .env("SNOWCTL_CONFIG_DIR", self.config_dir());
        for (key, value) in env {
            cmd.env(key, value);
        }
        cmd.output().expect("Failed to execute snowctl")
    }

    /// Run snowctl and assert success
    pub fn run_ok(&self, args: &[&str]) -> Output {
        let output = self.run(args);
        assert!(
            output.status.success(),
            "snowctl {:?} failed (exit {:?}):\nstdout: {}\nstderr: {}",
            args,
            output.status.code(),
            stdout(&output),
            stderr(&output)
        );
        output
    }

    /// Run snowctl and assert failure with specific exit code
    pub fn run_fails(&self, args: &[&str], expected_code: i32) -> Output {
        let output = self.run(args);
        assert_exit(&output, args, expected_code);
        output
    }

    /// Save a profile offline with every required field set.
    pub fn add_connection(&self, name: &str, account: &str) -> Output {
        self.run_ok(&[
            "connection",
            "set",
            name,
            "--account",
            account,
            "--user",
            "ANALYST",
            "--role",
            "REPORTER",
            "--warehouse",
            "WH",
            "--database",
            "DB",
            "--schema",
            "PUBLIC",
            "--no-prompt",
            "--skip-test",
        ])
    }

    pub fn read_config(&self) -> String {
        std::fs::read_to_string(self.config_file()).expect("Failed to read config")
    }
}

pub fn assert_exit(output: &Output, args: &[&str], expected_code: i32) {
    assert_eq!(
        output.status.code(),
        Some(expected_code),
        "snowctl {:?} expected exit {} but got {:?}:\nstdout: {}\nstderr: {}",
        args,
        expected_code,
        output.status.code(),
        stdout(output),
        stderr(output)
    );
}

/// Parse stdout as JSON
pub fn parse_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not valid JSON ({}):\n{}",
            e,
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

/// Parse stderr as JSON (error payloads in json mode)
pub fn parse_stderr_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stderr).unwrap_or_else(|e| {
        panic!(
            "stderr is not valid JSON ({}):\n{}",
            e,
            String::from_utf8_lossy(&output.stderr)
        )
    })
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}
