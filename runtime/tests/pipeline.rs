//! End-to-end pipeline behavior: composition precedence, short-circuit
//! laws, validation order, mount deduplication and error dispatch.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code

use http::{Method, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use weave_core::prelude::*;
use weave_core::schema::SchemaCompiler;
use weave_runtime::{compose, sign_value, CompileMode, Engine};
use weave_testing::hooks::{
    counting_handler, counting_intercept, counting_lifetime, counting_notify, short_circuit,
    Counter,
};
use weave_testing::{CapturingSink, StubCompiler, TestRequest};

fn compiler() -> Arc<dyn SchemaCompiler> {
    Arc::new(StubCompiler::new())
}

fn engine(app: App) -> Engine {
    Engine::new(app, compiler())
}

fn json_body(response: &Response) -> &Value {
    match &response.body {
        ResponseBody::Json(value) => value,
        other => panic!("expected a JSON body, got {other:?}"),
    }
}

fn text_body(response: &Response) -> &str {
    match &response.body {
        ResponseBody::Text(text) => text,
        other => panic!("expected a text body, got {other:?}"),
    }
}

#[test]
fn composing_a_route_twice_is_deterministic() {
    let app = App::new()
        .on_request(intercept_sync(|_| Ok(None)))
        .on_transform(transform_sync(|_| Ok(())))
        .route(
            Method::GET,
            "/users/:id",
            handler_sync(|_| Ok(Value::Null)),
            RouteOptions::new()
                .before_handle(intercept_sync(|_| Ok(None)))
                .body(Schema::inline(json!({"type": "object"}))),
        )
        .unwrap();

    let compiler = compiler();
    let first = compose(&app, &app.routes()[0], &compiler).unwrap();
    let second = compose(&app, &app.routes()[0], &compiler).unwrap();

    assert_eq!(first.stage_counts(), second.stage_counts());
    assert_eq!(
        first.validators.body.is_noop(),
        second.validators.body.is_noop()
    );
    assert!(!first.validators.params.is_noop());
    assert!(first.validators.query.is_noop());
}

#[tokio::test]
async fn before_handle_short_circuit_skips_the_handler() {
    let invoked = Counter::new();
    let app = App::new()
        .route(
            Method::GET,
            "/guarded",
            counting_handler(&invoked, json!("handled")),
            RouteOptions::new().before_handle(short_circuit(json!("blocked"))),
        )
        .unwrap();

    let response = engine(app).handle(TestRequest::get("/guarded").build()).await;
    assert_eq!(invoked.count(), 0);
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(text_body(&response), "blocked");
}

#[tokio::test]
async fn request_short_circuit_skips_every_later_stage() {
    let handler_calls = Counter::new();
    let before_calls = Counter::new();
    let app = App::new()
        .on_request(short_circuit(json!("intercepted")))
        .on_before_handle(counting_intercept(&before_calls))
        .get("/anything", counting_handler(&handler_calls, json!("nope")))
        .unwrap();

    let response = engine(app)
        .handle(TestRequest::get("/anything").build())
        .await;
    assert_eq!(handler_calls.count(), 0);
    assert_eq!(before_calls.count(), 0);
    assert_eq!(text_body(&response), "intercepted");
}

#[tokio::test]
async fn validation_order_reports_the_first_failing_slot() {
    let app = App::new()
        .route(
            Method::POST,
            "/orders",
            handler_sync(|_| Ok(Value::Null)),
            RouteOptions::new()
                .headers(Schema::inline(json!({
                    "type": "object",
                    "properties": {"x-token": {"type": "string"}},
                    "required": ["x-token"],
                })))
                .body(Schema::inline(json!({"type": "object"}))),
        )
        .unwrap();

    // Both the headers and the body are invalid; headers must win.
    let response = engine(app)
        .handle(TestRequest::post("/orders").json(&json!("not an object")).build())
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(&response);
    assert_eq!(body["code"], "VALIDATION");
    assert_eq!(body["faults"][0]["path"], "headers.x-token");
}

#[tokio::test]
async fn empty_after_handle_chain_keeps_the_handler_value() {
    let app = App::new()
        .get("/value", handler_sync(|_| Ok(json!({"n": 7}))))
        .unwrap();

    let response = engine(app).handle(TestRequest::get("/value").build()).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(json_body(&response), &json!({"n": 7}));
}

#[tokio::test]
async fn after_handle_chains_see_the_latest_value() {
    let app = App::new()
        .on_after_handle(intercept_sync(|ctx| {
            let current = ctx.result().and_then(Value::as_str).unwrap_or_default();
            Ok(Some(Value::String(format!("{current}+first"))))
        }))
        .on_after_handle(intercept_sync(|ctx| {
            let current = ctx.result().and_then(Value::as_str).unwrap_or_default();
            Ok(Some(Value::String(format!("{current}+second"))))
        }))
        .get("/chain", handler_sync(|_| Ok(json!("base"))))
        .unwrap();

    let response = engine(app).handle(TestRequest::get("/chain").build()).await;
    assert_eq!(text_body(&response), "base+first+second");
}

#[tokio::test]
async fn numeric_params_scenario() {
    let app = App::new()
        .route(
            Method::GET,
            "/users/:id",
            handler_sync(|ctx| Ok(json!({"id": ctx.param("id")}))),
            RouteOptions::new().params(Schema::inline(json!({
                "type": "object",
                "properties": {"id": {"type": "string", "format": "numeric"}},
            }))),
        )
        .unwrap();
    let engine = engine(app);

    let ok = engine.handle(TestRequest::get("/users/42").build()).await;
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(json_body(&ok), &json!({"id": "42"}));

    let bad = engine.handle(TestRequest::get("/users/abc").build()).await;
    assert_eq!(bad.status, StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(&bad);
    assert_eq!(body["code"], "VALIDATION");
    assert_eq!(body["faults"][0]["path"], "params.id");
}

#[tokio::test]
async fn double_mount_dedups_hooks_and_start_fires_once() {
    let started = Counter::new();
    let plugin = || {
        App::new()
            .name("metrics")
            .on_start(counting_lifetime(&started))
            .get("/stats", handler_sync(|_| Ok(json!("stats"))))
            .unwrap()
    };

    let app = App::new()
        .mount("/a", plugin())
        .unwrap()
        .mount("/a", plugin())
        .unwrap();
    assert_eq!(app.routes().len(), 1);

    let engine = engine(app);
    engine.start().await.unwrap();
    assert_eq!(started.count(), 1);

    let response = engine.handle(TestRequest::get("/a/stats").build()).await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn mounting_under_two_prefixes_serves_both_paths() {
    let plugin = || {
        App::new()
            .name("metrics")
            .get("/stats", handler_sync(|_| Ok(json!("stats"))))
            .unwrap()
    };
    let app = App::new()
        .mount("/a", plugin())
        .unwrap()
        .mount("/b", plugin())
        .unwrap();
    let engine = engine(app);

    for path in ["/a/stats", "/b/stats"] {
        let response = engine.handle(TestRequest::get(path).build()).await;
        assert_eq!(response.status, StatusCode::OK, "path {path}");
    }
}

#[tokio::test]
async fn custom_error_code_dispatches_only_matching_hooks() {
    let validation_hook = Counter::new();
    let rate_limit_hook = Counter::new();
    let catch_all_hook = Counter::new();

    let vh = validation_hook.clone();
    let rh = rate_limit_hook.clone();
    let ch = catch_all_hook.clone();

    let app = App::new()
        .register_error("RateLimited", StatusCode::TOO_MANY_REQUESTS)
        .on_error_for(
            vec![ErrorCode::Validation],
            error_sync(move |_, _| {
                vh.bump();
                Ok(None)
            }),
        )
        .on_error_for(
            vec![ErrorCode::Custom("RateLimited".into())],
            error_sync(move |_, _| {
                rh.bump();
                Ok(None)
            }),
        )
        .on_error(error_sync(move |_, _| {
            ch.bump();
            Ok(None)
        }))
        .get(
            "/limited",
            handler_sync(|_| Err(Failure::custom("RateLimited", "slow down"))),
        )
        .unwrap();

    let response = engine(app).handle(TestRequest::get("/limited").build()).await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json_body(&response)["code"], "RateLimited");
    assert_eq!(validation_hook.count(), 0);
    assert_eq!(rate_limit_hook.count(), 1);
    assert_eq!(catch_all_hook.count(), 1);
}

#[tokio::test]
async fn error_hook_recovery_produces_the_response() {
    let app = App::new()
        .register_error("RateLimited", StatusCode::TOO_MANY_REQUESTS)
        .on_error(error_sync(|_, failure| {
            Ok(Some(json!({"recovered": failure.code.as_str()})))
        }))
        .get(
            "/limited",
            handler_sync(|_| Err(Failure::custom("RateLimited", "slow down"))),
        )
        .unwrap();

    let response = engine(app).handle(TestRequest::get("/limited").build()).await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json_body(&response), &json!({"recovered": "RateLimited"}));
}

#[tokio::test]
async fn scope_visibility_across_two_mount_levels() {
    let plugin = App::new()
        .name("observability")
        .register_hook(
            Hook::Transform(transform_sync(|ctx| {
                ctx.set_derived("g", json!(true));
                Ok(())
            })),
            HookOptions::scoped_as(HookScope::Global),
        )
        .register_hook(
            Hook::Transform(transform_sync(|ctx| {
                ctx.set_derived("s", json!(true));
                Ok(())
            })),
            HookOptions::scoped_as(HookScope::Scoped),
        )
        .register_hook(
            Hook::Transform(transform_sync(|ctx| {
                ctx.set_derived("l", json!(true));
                Ok(())
            })),
            HookOptions::scoped_as(HookScope::Local),
        )
        .get("/plugin", handler_sync(|ctx| Ok(seen(ctx))))
        .unwrap();

    let mid = App::new()
        .name("mid")
        .get("/mid", handler_sync(|ctx| Ok(seen(ctx))))
        .unwrap()
        .use_plugin(plugin)
        .unwrap();

    let root = App::new()
        .get("/root", handler_sync(|ctx| Ok(seen(ctx))))
        .unwrap()
        .use_plugin(mid)
        .unwrap();

    let engine = engine(root);

    // The plugin's own route sees everything.
    let response = engine.handle(TestRequest::get("/plugin").build()).await;
    assert_eq!(json_body(&response), &json!({"g": true, "s": true, "l": true}));

    // The immediate parent's routes see global and scoped, not local.
    let response = engine.handle(TestRequest::get("/mid").build()).await;
    assert_eq!(json_body(&response), &json!({"g": true, "s": true, "l": false}));

    // The grandparent's routes see only global.
    let response = engine.handle(TestRequest::get("/root").build()).await;
    assert_eq!(json_body(&response), &json!({"g": true, "s": false, "l": false}));
}

fn seen(ctx: &Context) -> Value {
    json!({
        "g": ctx.derived("g").is_some(),
        "s": ctx.derived("s").is_some(),
        "l": ctx.derived("l").is_some(),
    })
}

#[tokio::test]
async fn signed_cookies_verify_or_fail() {
    let app = App::new()
        .cookie_secret("secret")
        .get(
            "/me",
            handler_sync(|ctx| {
                Ok(Value::String(ctx.cookie("session").unwrap_or("").to_string()))
            }),
        )
        .unwrap();
    let engine = engine(app);

    let good = engine
        .handle(
            TestRequest::get("/me")
                .cookie("session", &sign_value("secret", "user-1"))
                .build(),
        )
        .await;
    assert_eq!(good.status, StatusCode::OK);
    assert_eq!(text_body(&good), "user-1");

    let tampered = sign_value("secret", "user-1").replace("user-1", "user-2");
    let bad = engine
        .handle(TestRequest::get("/me").cookie("session", &tampered).build())
        .await;
    assert_eq!(bad.status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&bad)["code"], "INVALID_COOKIE_SIGNATURE");
}

#[tokio::test]
async fn body_parsing_selects_by_content_type() {
    let app = App::new()
        .post(
            "/echo",
            handler_sync(|ctx| Ok(ctx.body().cloned().unwrap_or(Value::Null))),
        )
        .unwrap();
    let engine = engine(app);

    let json_response = engine
        .handle(TestRequest::post("/echo").json(&json!({"a": 1})).build())
        .await;
    assert_eq!(json_body(&json_response), &json!({"a": 1}));

    let form_response = engine
        .handle(TestRequest::post("/echo").form(&[("a", "1")]).build())
        .await;
    assert_eq!(json_body(&form_response), &json!({"a": "1"}));

    let unknown = engine
        .handle(
            TestRequest::post("/echo")
                .bytes(bytes::Bytes::from_static(b"<xml/>"), "application/xml")
                .build(),
        )
        .await;
    assert_eq!(unknown.status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&unknown)["code"], "PARSE");
}

#[tokio::test]
async fn explicit_parse_hook_wins_over_builtins() {
    let app = App::new()
        .on_parse(intercept_sync(|_| Ok(Some(json!("from-hook")))))
        .post(
            "/echo",
            handler_sync(|ctx| Ok(ctx.body().cloned().unwrap_or(Value::Null))),
        )
        .unwrap();

    let response = engine(app)
        .handle(TestRequest::post("/echo").json(&json!({"a": 1})).build())
        .await;
    assert_eq!(text_body(&response), "from-hook");
}

#[tokio::test]
async fn unmatched_routes_get_the_not_found_default() {
    let app = App::new()
        .get("/known", handler_sync(|_| Ok(Value::Null)))
        .unwrap();
    let response = engine(app).handle(TestRequest::get("/unknown").build()).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(json_body(&response)["code"], "NOT_FOUND");
}

#[tokio::test]
async fn response_schema_validates_per_status() {
    let app = App::new()
        .route(
            Method::GET,
            "/typed",
            handler_sync(|_| Ok(json!(42))),
            RouteOptions::new().response_for(200, Schema::inline(json!({"type": "string"}))),
        )
        .unwrap();

    let response = engine(app).handle(TestRequest::get("/typed").build()).await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json_body(&response)["faults"][0]["path"], "response");
}

#[tokio::test]
async fn derive_runs_before_validation_and_resolve_after() {
    let app = App::new()
        .derive(
            "token",
            derive_sync(|ctx| {
                Ok(Value::String(
                    ctx.request().header("x-token").unwrap_or("anon").to_string(),
                ))
            }),
        )
        .resolve(
            "who",
            derive_sync(|ctx| {
                let token = ctx.derived("token").and_then(Value::as_str).unwrap_or("?");
                Ok(Value::String(format!("user:{token}")))
            }),
        )
        .get(
            "/whoami",
            handler_sync(|ctx| Ok(ctx.derived("who").cloned().unwrap_or(Value::Null))),
        )
        .unwrap();

    let response = engine(app)
        .handle(TestRequest::get("/whoami").header("x-token", "t1").build())
        .await;
    assert_eq!(text_body(&response), "user:t1");
}

#[tokio::test]
async fn map_response_hooks_replace_the_transport_response() {
    let app = App::new()
        .on_map_response(map_response_sync(|ctx| {
            let value = ctx.result().cloned().unwrap_or(Value::Null);
            Ok(Some(
                Response::text(format!("mapped:{value}")).with_header("x-mapped", "1"),
            ))
        }))
        .get("/mapped", handler_sync(|_| Ok(json!("inner"))))
        .unwrap();

    let response = engine(app).handle(TestRequest::get("/mapped").build()).await;
    assert_eq!(text_body(&response), "mapped:\"inner\"");
    assert_eq!(
        response.headers.get("x-mapped").and_then(|v| v.to_str().ok()),
        Some("1")
    );
}

#[tokio::test]
async fn on_response_runs_for_successes_and_failures() {
    let notified = Counter::new();
    let app = App::new()
        .on_response(counting_notify(&notified))
        .get("/ok", handler_sync(|_| Ok(json!("fine"))))
        .unwrap()
        .get("/boom", handler_sync(|_| Err(Failure::internal("boom"))))
        .unwrap();
    let engine = engine(app);

    let ok = engine.handle(TestRequest::get("/ok").build()).await;
    assert_eq!(ok.status, StatusCode::OK);
    let boom = engine.handle(TestRequest::get("/boom").build()).await;
    assert_eq!(boom.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(notified.count(), 2);
}

#[tokio::test]
async fn trace_sinks_and_hooks_observe_the_span_tree() {
    let sink = Arc::new(CapturingSink::new());
    let app = App::new()
        .on_trace(trace_fn(|process| {
            assert!(process.child("handle").is_some());
            assert!(process.end.is_some());
        }))
        .get("/traced", handler_sync(|_| Ok(json!("t"))))
        .unwrap();

    let engine = Engine::new(app, compiler()).with_trace_sink(sink.clone());
    let response = engine.handle(TestRequest::get("/traced").build()).await;
    assert_eq!(response.status, StatusCode::OK);

    let begun = sink.begun_spans();
    assert_eq!(begun[0], "/traced");
    assert!(begun.iter().any(|name| name == "handle"));
    assert!(begun.iter().any(|name| name == "mapResponse"));
}

#[tokio::test]
async fn ahead_of_time_start_rejects_unknown_type_references() {
    let app = App::new()
        .route(
            Method::GET,
            "/typed",
            handler_sync(|_| Ok(Value::Null)),
            RouteOptions::new().body(Schema::reference("missing")),
        )
        .unwrap();

    let engine = Engine::new(app, compiler()).with_mode(CompileMode::AheadOfTime);
    assert!(engine.start().await.is_err());
}

#[tokio::test]
async fn just_in_time_start_also_rejects_unknown_type_references() {
    let app = App::new()
        .route(
            Method::GET,
            "/typed",
            handler_sync(|_| Ok(Value::Null)),
            RouteOptions::new().body(Schema::reference("missing")),
        )
        .unwrap();

    let engine = Engine::new(app, compiler()).with_mode(CompileMode::JustInTime);
    assert!(engine.start().await.is_err());
}

#[tokio::test]
async fn macro_bundles_expand_into_route_hooks() {
    let denied = Counter::new();
    let app = App::new()
        .define_macro(
            "auth",
            weave_core::macros::macro_fn(|manager, params| {
                let role = params
                    .get("role")
                    .and_then(Value::as_str)
                    .unwrap_or("user")
                    .to_string();
                manager.on_before_handle(intercept_sync(move |ctx| {
                    if ctx.request().header("x-role") == Some(role.as_str()) {
                        Ok(None)
                    } else {
                        Err(Failure::custom("Forbidden", "role mismatch")
                            .with_status(http::StatusCode::FORBIDDEN))
                    }
                }));
            }),
        )
        .route(
            Method::GET,
            "/admin",
            counting_handler(&denied, json!("secret")),
            RouteOptions::new().with("auth", json!({"role": "admin"})),
        )
        .unwrap();
    let engine = engine(app);

    let allowed = engine
        .handle(TestRequest::get("/admin").header("x-role", "admin").build())
        .await;
    assert_eq!(allowed.status, StatusCode::OK);

    let forbidden = engine.handle(TestRequest::get("/admin").build()).await;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);
    assert_eq!(denied.count(), 1);
}

fn count_hit(
    ctx: &mut Context,
) -> futures::future::BoxFuture<'_, weave_core::hook::HookResult<Value>> {
    Box::pin(async move {
        let store = ctx.store();
        let mut guard = store.write().await;
        let hits = guard.get("hits").and_then(Value::as_i64).unwrap_or(0) + 1;
        guard.insert("hits".to_string(), json!(hits));
        Ok(json!(hits))
    })
}

#[tokio::test]
async fn store_state_is_shared_across_requests() {
    let app = App::new()
        .state("hits", json!(0))
        .get("/hit", handler(count_hit))
        .unwrap();
    let engine = engine(app);

    let first = engine.handle(TestRequest::get("/hit").build()).await;
    let second = engine.handle(TestRequest::get("/hit").build()).await;
    assert_eq!(json_body(&first), &json!(1));
    assert_eq!(json_body(&second), &json!(2));
}

#[tokio::test]
async fn decorators_reach_the_handler() {
    let app = App::new()
        .decorate("version", "1.2.3".to_string())
        .get(
            "/version",
            handler_sync(|ctx| {
                Ok(Value::String(
                    ctx.decorator::<String>("version").cloned().unwrap_or_default(),
                ))
            }),
        )
        .unwrap();

    let response = engine(app).handle(TestRequest::get("/version").build()).await;
    assert_eq!(text_body(&response), "1.2.3");
}
