//! Serving discovered routes through the full middleware stack.

use std::time::Duration;

use advance_api::config::{ApiConfig, DatabaseConfig, ModuleConfig, RouterScanConfig, ScanConfig};
use advance_api::lifecycle::{build_application, Application, Shutdown};
use axum::http::StatusCode;
use serde_json::json;
use tempfile::TempDir;
use tokio::net::TcpListener;

mod common;

const USERS: &str = r#"
fn list(req, res) {
    res.success(ctx_users())
}

fn ctx_users() { [#{ id: "1", name: "Ada" }] }

fn show(req, res) {
    if req.params.id == "0" {
        res.error("User not found", 404);
        return;
    }
    #{ id: req.params.id, q: req.query.verbose }
}

fn explode(req, res) {
    throw "kaboom";
}

[
    #{ path: "/users", method: "GET", handler: Fn("list") },
    #{ path: "/users/:id", method: "GET", handler: Fn("show") },
    #{ path: "/explode", method: "GET", handler: Fn("explode") },
]
"#;

const NOTES: &str = r#"
[
    #{
        path: "/notes",
        method: "POST",
        handler: |req, res, ctx| {
            let note = ctx.db.create("notes", req.body);
            res.status(201).json(note);
        }
    },
    #{
        path: "/notes",
        method: "GET",
        handler: |req, res, ctx| ctx.db.find_all("notes")
    },
]
"#;

fn config(fixture: &TempDir) -> ApiConfig {
    let mut config = ApiConfig::default();
    config.compiler = common::compiler_config(fixture, Default::default());
    config.router_scan = Some(RouterScanConfig {
        scan: ScanConfig::new(["routes"]),
        root: None,
    });
    config
}

async fn app(fixture: &TempDir, config: ApiConfig) -> Application {
    build_application(config, fixture.path()).await.unwrap()
}

#[tokio::test]
async fn test_discovered_routes_are_served_under_prefix() {
    let fixture = TempDir::new().unwrap();
    common::write_file(fixture.path(), "routes/users.router.rhai", USERS);
    let app = app(&fixture, config(&fixture)).await;

    let (status, body) = common::send(app.server.router(), "GET", "/api/users", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"][0]["name"], json!("Ada"));

    let (status, body) =
        common::send(app.server.router(), "GET", "/api/users/42?verbose=yes", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({ "id": "42", "q": "yes" }));

    let (status, body) = common::send(app.server.router(), "GET", "/api/users/0", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["message"], json!("User not found"));

    assert_eq!(common::artifact_count(&fixture), 0);
}

#[tokio::test]
async fn test_script_error_becomes_500_envelope() {
    let fixture = TempDir::new().unwrap();
    common::write_file(fixture.path(), "routes/users.router.rhai", USERS);
    let app = app(&fixture, config(&fixture)).await;

    let (status, body) = common::send(app.server.router(), "GET", "/api/explode", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], json!(false));
    assert!(body["message"].as_str().unwrap().contains("kaboom"));
}

#[tokio::test]
async fn test_unknown_path_is_json_404() {
    let fixture = TempDir::new().unwrap();
    let app = app(&fixture, config(&fixture)).await;

    let (status, body) = common::send(app.server.router(), "GET", "/api/nothing-here", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], json!(false));
}

#[tokio::test]
async fn test_builtin_routes_are_available() {
    let fixture = TempDir::new().unwrap();
    common::write_file(fixture.path(), "routes/users.router.rhai", USERS);
    let app = app(&fixture, config(&fixture)).await;

    let (status, body) = common::send(app.server.router(), "GET", "/api/test", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("ok"));

    let (_, body) = common::send(app.server.router(), "GET", "/api/advance-api-test", None).await;
    assert_eq!(body["success"], json!(true));
    assert!(body["data"]["serverInfo"].is_object());

    let (status, body) = common::send(app.server.router(), "GET", "/api/routes", None).await;
    assert_eq!(status, StatusCode::OK);
    let paths: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|r| r["path"].as_str())
        .collect();
    assert!(paths.contains(&"/api/test"));
    assert!(paths.contains(&"/api/users/:id"));
}

#[tokio::test]
async fn test_module_routes_mount_under_base_and_duplicates_lose() {
    let fixture = TempDir::new().unwrap();
    common::write_file(
        fixture.path(),
        "routes/ping.router.rhai",
        &common::router_script(&[("/ping", "root")]),
    );
    common::write_file(
        fixture.path(),
        "billing/ping.router.rhai",
        &common::router_script(&[("/ping", "billing"), ("/test", "billing-test")]),
    );

    let mut config = config(&fixture);
    config.modules.push(ModuleConfig {
        label: "billing".into(),
        base: "/billing".into(),
        scan: ScanConfig::new(["billing"]),
        root: None,
    });
    // Same path as the router scan: the earlier registration is kept.
    config.modules.push(ModuleConfig {
        label: "again".into(),
        base: String::new(),
        scan: ScanConfig::new(["routes"]),
        root: None,
    });
    let app = app(&fixture, config).await;

    assert_eq!(app.scans.len(), 3);
    assert_eq!(app.scans[1].label.as_deref(), Some("billing"));
    assert_eq!(app.scans[1].stats.routes_accepted, 2);

    let (_, body) = common::send(app.server.router(), "GET", "/api/ping", None).await;
    assert_eq!(body["data"]["reply"], json!("root"));

    let (_, body) = common::send(app.server.router(), "GET", "/api/billing/ping", None).await;
    assert_eq!(body["data"]["reply"], json!("billing"));

    let (_, body) = common::send(app.server.router(), "GET", "/api/billing/test", None).await;
    assert_eq!(body["data"]["reply"], json!("billing-test"));

    let modules: Vec<&str> = app.routes.routes().iter().map(|r| r.module.as_str()).collect();
    assert_eq!(modules.iter().filter(|m| **m == "again").count(), 0);
}

#[tokio::test]
async fn test_handlers_share_the_database() {
    let fixture = TempDir::new().unwrap();
    common::write_file(fixture.path(), "routes/notes.router.rhai", NOTES);

    let mut config = config(&fixture);
    config.database = Some(DatabaseConfig::default());
    let app = app(&fixture, config).await;

    let (status, created) = common::send(
        app.server.router(),
        "POST",
        "/api/notes",
        Some(json!({ "text": "buy milk" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["text"], json!("buy milk"));
    assert!(created["id"].is_string());

    let (status, body) = common::send(app.server.router(), "GET", "/api/notes", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["id"], created["id"]);
    assert_eq!(app.context.db().unwrap().count("notes"), 1);
}

#[tokio::test]
async fn test_server_serves_until_shutdown() {
    let fixture = TempDir::new().unwrap();
    common::write_file(
        fixture.path(),
        "routes/ping.router.rhai",
        &common::router_script(&[("/ping", "pong")]),
    );
    let app = app(&fixture, config(&fixture)).await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = tokio::spawn(app.server.run(listener, shutdown.subscribe()));

    let body: serde_json::Value = reqwest::get(format!("http://{}/api/ping", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["reply"], json!("pong"));

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
