//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use advance_api::config::{CompileStrategy, CompilerConfig};
use advance_api::scanner::{Pipeline, Scanner};
use advance_api::script::ScriptRuntime;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

/// Write `content` to `root/relative`, creating parent directories.
pub fn write_file(root: &Path, relative: &str, content: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

/// A router script exporting one GET route per `(path, reply)` pair.
pub fn router_script(routes: &[(&str, &str)]) -> String {
    let mut script = String::new();
    let mut entries = Vec::new();
    for (i, (path, reply)) in routes.iter().enumerate() {
        script.push_str(&format!(
            "fn handler_{i}(req, res) {{ res.success(#{{ reply: \"{reply}\" }}) }}\n"
        ));
        entries.push(format!(
            "#{{ path: \"{path}\", method: \"GET\", handler: Fn(\"handler_{i}\") }}"
        ));
    }
    script.push_str(&format!("[{}]\n", entries.join(", ")));
    script
}

/// Compiler config writing artifacts inside the fixture directory.
pub fn compiler_config(fixture: &TempDir, strategy: CompileStrategy) -> CompilerConfig {
    CompilerConfig {
        strategy,
        artifact_dir: Some(fixture.path().join(".artifacts")),
        ..CompilerConfig::default()
    }
}

/// Scanner rooted at the fixture directory.
pub fn scanner(fixture: &TempDir, strategy: CompileStrategy) -> Scanner {
    let config = compiler_config(fixture, strategy);
    let runtime = ScriptRuntime::new(&config);
    Scanner::new(Pipeline::new(&runtime, &config), fixture.path())
}

/// Number of files left in the artifact directory.
pub fn artifact_count(fixture: &TempDir) -> usize {
    match fs::read_dir(fixture.path().join(".artifacts")) {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    }
}

/// Send one request through `router` and decode the JSON body.
pub async fn send(router: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = router.oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, json)
}
