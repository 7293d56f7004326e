//! Engine construction and host type registration.
//!
//! # Responsibilities
//! - Register `Request`, `Response`, `Context` and `Database` for scripts
//! - Convert between script values and JSON
//! - Route script `print` / `debug` output into tracing
//! - Install the registry-backed module resolver

use std::sync::Arc;

use rhai::{Array, Dynamic, Engine, EvalAltResult, Map};
use serde_json::Value;

use crate::config::CompilerConfig;
use crate::context::{Database, HttpReply, SharedContext};
use crate::http::{ApiRequest, ApiResponse};
use crate::script::modules::{ModuleRegistry, RegistryResolver};

type ScriptResult<T> = Result<T, Box<EvalAltResult>>;

/// JSON to script value. Values that cannot be represented become unit.
pub fn to_script(value: &Value) -> Dynamic {
    rhai::serde::to_dynamic(value).unwrap_or(Dynamic::UNIT)
}

/// Script value to JSON. Unit becomes `null`.
pub fn from_script(value: &Dynamic) -> ScriptResult<Value> {
    if value.is_unit() {
        return Ok(Value::Null);
    }
    rhai::serde::from_dynamic::<Value>(value)
}

fn string_map<'a>(entries: impl IntoIterator<Item = (&'a String, &'a String)>) -> Map {
    entries
        .into_iter()
        .map(|(k, v)| (k.as_str().into(), Dynamic::from(v.clone())))
        .collect()
}

fn status_code(code: i64) -> u16 {
    u16::try_from(code).unwrap_or(500)
}

fn record_id(id: &Dynamic) -> String {
    id.to_string()
}

fn reply_map(reply: HttpReply) -> Map {
    let mut map = Map::new();
    map.insert("status".into(), Dynamic::from(i64::from(reply.status)));
    map.insert("body".into(), to_script(&reply.body));
    map
}

fn register_request(engine: &mut Engine) {
    engine
        .register_type_with_name::<ApiRequest>("Request")
        .register_get("id", |r: &mut ApiRequest| r.id.clone())
        .register_get("method", |r: &mut ApiRequest| r.method.clone())
        .register_get("path", |r: &mut ApiRequest| r.path.clone())
        .register_get("params", |r: &mut ApiRequest| string_map(&r.params))
        .register_get("query", |r: &mut ApiRequest| string_map(&r.query))
        .register_get("headers", |r: &mut ApiRequest| string_map(&r.headers))
        .register_get("body", |r: &mut ApiRequest| to_script(&r.body));
}

fn register_response(engine: &mut Engine) {
    engine
        .register_type_with_name::<ApiResponse>("Response")
        .register_fn("success", |res: &mut ApiResponse| res.success(Value::Null))
        .register_fn(
            "success",
            |res: &mut ApiResponse, data: Dynamic| -> ScriptResult<()> {
                res.success(from_script(&data)?);
                Ok(())
            },
        )
        .register_fn(
            "success",
            |res: &mut ApiResponse, data: Dynamic, message: &str| -> ScriptResult<()> {
                res.success_with(from_script(&data)?, message);
                Ok(())
            },
        )
        .register_fn("error", |res: &mut ApiResponse, message: &str| {
            res.error(message, 500)
        })
        .register_fn("error", |res: &mut ApiResponse, message: &str, code: i64| {
            res.error(message, status_code(code))
        })
        .register_fn("denied", |res: &mut ApiResponse| res.denied("Unauthorized"))
        .register_fn("denied", |res: &mut ApiResponse, message: &str| {
            res.denied(message)
        })
        .register_fn("status", |res: &mut ApiResponse, code: i64| {
            res.status(status_code(code)).clone()
        })
        .register_fn("header", |res: &mut ApiResponse, name: &str, value: &str| {
            res.header(name, value).clone()
        })
        .register_fn(
            "json",
            |res: &mut ApiResponse, value: Dynamic| -> ScriptResult<()> {
                res.json(from_script(&value)?);
                Ok(())
            },
        )
        .register_fn("send", |res: &mut ApiResponse, text: &str| res.send(text))
        .register_fn("is_sent", |res: &mut ApiResponse| res.is_committed());
}

fn register_context(engine: &mut Engine) {
    engine
        .register_type_with_name::<SharedContext>("Context")
        .register_fn("uuid", |ctx: &mut SharedContext| ctx.uuid())
        .register_get("db", |ctx: &mut SharedContext| {
            ctx.db().cloned().map(Dynamic::from).unwrap_or(Dynamic::UNIT)
        })
        .register_fn("routes", |ctx: &mut SharedContext| -> Array {
            ctx.routes()
                .iter()
                .map(|route| serde_json::to_value(route).map(|v| to_script(&v)).unwrap_or(Dynamic::UNIT))
                .collect()
        })
        .register_fn(
            "http_get",
            |ctx: &mut SharedContext, url: &str| -> ScriptResult<Map> {
                let reply = ctx.fetch("GET", url, None).map_err(|e| e.to_string())?;
                Ok(reply_map(reply))
            },
        )
        .register_fn(
            "http_post",
            |ctx: &mut SharedContext, url: &str, body: Dynamic| -> ScriptResult<Map> {
                let body = from_script(&body)?;
                let reply = ctx.fetch("POST", url, Some(body)).map_err(|e| e.to_string())?;
                Ok(reply_map(reply))
            },
        );
}

fn register_database(engine: &mut Engine) {
    engine
        .register_type_with_name::<Database>("Database")
        .register_fn(
            "find_by_id",
            |db: &mut Database, collection: &str, id: Dynamic| {
                db.find_by_id(collection, &record_id(&id))
                    .map(|v| to_script(&v))
                    .unwrap_or(Dynamic::UNIT)
            },
        )
        .register_fn("find_all", |db: &mut Database, collection: &str| -> Array {
            db.find_all(collection, None).iter().map(to_script).collect()
        })
        .register_fn(
            "find_all",
            |db: &mut Database, collection: &str, filter: Map| -> ScriptResult<Array> {
                let filter = from_script(&Dynamic::from_map(filter))?;
                Ok(db
                    .find_all(collection, filter.as_object())
                    .iter()
                    .map(to_script)
                    .collect())
            },
        )
        .register_fn(
            "create",
            |db: &mut Database, collection: &str, record: Dynamic| -> ScriptResult<Dynamic> {
                let created = db
                    .create(collection, from_script(&record)?)
                    .map_err(|e| e.to_string())?;
                Ok(to_script(&created))
            },
        )
        .register_fn(
            "update",
            |db: &mut Database, collection: &str, id: Dynamic, patch: Dynamic| -> ScriptResult<Dynamic> {
                let updated = db
                    .update(collection, &record_id(&id), from_script(&patch)?)
                    .map_err(|e| e.to_string())?;
                Ok(updated.map(|v| to_script(&v)).unwrap_or(Dynamic::UNIT))
            },
        )
        .register_fn("remove", |db: &mut Database, collection: &str, id: Dynamic| {
            db.remove(collection, &record_id(&id))
                .map(|v| to_script(&v))
                .unwrap_or(Dynamic::UNIT)
        })
        .register_fn("count", |db: &mut Database, collection: &str| {
            i64::try_from(db.count(collection)).unwrap_or(i64::MAX)
        });
}

/// Build the process-wide engine.
pub fn build_engine(config: &CompilerConfig, modules: Arc<ModuleRegistry>) -> Engine {
    let mut engine = Engine::new();

    if config.max_operations > 0 {
        engine.set_max_operations(config.max_operations);
    }

    engine.on_print(|text| tracing::info!(target: "script", "{}", text));
    engine.on_debug(|text, source, pos| {
        tracing::debug!(target: "script", source = source.unwrap_or("-"), %pos, "{}", text)
    });

    engine.set_module_resolver(RegistryResolver(modules));

    register_request(&mut engine);
    register_response(&mut engine);
    register_context(&mut engine);
    register_database(&mut engine);

    engine
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhai::Scope;
    use serde_json::json;

    fn engine() -> Engine {
        build_engine(
            &CompilerConfig::default(),
            Arc::new(ModuleRegistry::with_host_modules()),
        )
    }

    #[test]
    fn test_json_round_trip_through_script_values() {
        let value = json!({ "name": "ada", "tags": ["a", "b"], "age": 36 });
        assert_eq!(from_script(&to_script(&value)).unwrap(), value);
        assert_eq!(from_script(&Dynamic::UNIT).unwrap(), Value::Null);
    }

    #[test]
    fn test_request_getters() {
        let engine = engine();
        let mut request = ApiRequest::default();
        request.params.insert("id".into(), "42".into());
        request.body = json!({ "name": "ada" });

        let mut scope = Scope::new();
        scope.push("req", request);
        let result: String = engine
            .eval_with_scope(&mut scope, r#"req.params.id + ":" + req.body.name"#)
            .unwrap();
        assert_eq!(result, "42:ada");
    }

    #[test]
    fn test_response_helpers_write_envelope() {
        let engine = engine();
        let response = ApiResponse::new();

        let mut scope = Scope::new();
        scope.push("res", response.clone());
        engine
            .run_with_scope(&mut scope, r#"res.success(#{ ok: true }, "done")"#)
            .unwrap();

        assert!(response.is_committed());
        assert_eq!(response.current_status(), 200);
    }

    #[test]
    fn test_status_is_chainable() {
        let engine = engine();
        let response = ApiResponse::new();

        let mut scope = Scope::new();
        scope.push("res", response.clone());
        engine
            .run_with_scope(&mut scope, r#"res.status(201).json(#{ id: 1 })"#)
            .unwrap();

        assert_eq!(response.current_status(), 201);
    }

    #[test]
    fn test_database_through_context() {
        let engine = engine();
        let ctx = SharedContext::new(Some(Database::memory()));

        let mut scope = Scope::new();
        scope.push("ctx", ctx.clone());
        let count: i64 = engine
            .eval_with_scope(
                &mut scope,
                r#"
                let db = ctx.db;
                let user = db.create("users", #{ name: "ada" });
                db.find_by_id("users", user.id).name == "ada";
                db.count("users")
                "#,
            )
            .unwrap();

        assert_eq!(count, 1);
    }

    #[test]
    fn test_missing_database_is_unit() {
        let engine = engine();
        let mut scope = Scope::new();
        scope.push("ctx", SharedContext::new(None));
        let missing: bool = engine.eval_with_scope(&mut scope, "ctx.db == ()").unwrap();
        assert!(missing);
    }

    #[test]
    fn test_host_modules_are_importable() {
        let engine = engine();
        let id: String = engine
            .eval(r#"import "uuid" as uuid; uuid::v4()"#)
            .unwrap();
        assert_eq!(id.len(), 36);

        let err = engine.eval::<Dynamic>(r#"import "fs" as fs; 1"#).unwrap_err();
        assert!(err.to_string().contains("fs"));
    }
}
