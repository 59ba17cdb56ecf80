//! The request pipeline state machine.
//!
//! Fixed stage order: request → parse → derive → validate (headers →
//! params → query → cookie → body) → resolve → transform → beforeHandle →
//! handle → validate-response → afterHandle → mapResponse → onResponse.
//! A non-void return from a `request` or `beforeHandle` hook short-circuits
//! forward to response mapping; the handler is never invoked. Every stage
//! failure is caught here and routed to the error stage — nothing escapes
//! a pipeline uncaught, and every request gets a response.

use crate::compose::ExecutionPlan;
use crate::parse::{builtin_parse, Builtin};
use crate::trace::Tracer;
use crate::{cookie, metrics, respond};
use http::StatusCode;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use weave_core::context::{Context, Response};
use weave_core::error::Failure;
use weave_core::hook::InterceptFn;
use weave_core::trace::TraceSink;

/// Run one request through a composed plan.
pub(crate) async fn execute(
    plan: &ExecutionPlan,
    mut ctx: Context,
    sinks: &[Arc<dyn TraceSink>],
) -> Response {
    let started = Instant::now();
    metrics::record_request(&plan.method);
    let enabled = !plan.trace.is_empty() || !sinks.is_empty();
    let mut tracer = Tracer::new(ctx.request_id(), &plan.path, enabled, sinks);

    let response = match run_stages(plan, &mut ctx, &mut tracer).await {
        Ok(response) => response,
        Err(failure) => {
            metrics::record_failure(&failure.code);
            tracing::warn!(
                code = %failure.code,
                method = %plan.method,
                path = %plan.path,
                request_id = ctx.request_id(),
                "pipeline failure: {}",
                failure.message
            );
            error_stage(plan, &mut ctx, &failure, &mut tracer).await
        }
    };

    // onResponse: side effects only, return values ignored.
    ctx.set_mapped(response.clone());
    tracer.begin("onResponse");
    for hook in &plan.on_response {
        tracer.begin("unit");
        hook(&ctx).await;
        tracer.end();
    }
    tracer.end();

    if let Some(process) = tracer.finish() {
        for hook in &plan.trace {
            hook(&process);
        }
    }
    metrics::record_duration(started.elapsed().as_secs_f64());
    tracing::debug!(
        method = %plan.method,
        path = %plan.path,
        status = response.status.as_u16(),
        request_id = ctx.request_id(),
        "request completed"
    );
    response
}

async fn run_stages(
    plan: &ExecutionPlan,
    ctx: &mut Context,
    tracer: &mut Tracer<'_>,
) -> Result<Response, Failure> {
    let mut early = run_intercepts(&plan.request, "request", ctx, tracer).await?;

    if early.is_none() {
        parse_stage(plan, ctx, tracer).await?;
        bindings_stage(ctx, tracer, BindingKind::Derive).await?;
        validate_stage(plan, ctx, tracer)?;
        bindings_stage(ctx, tracer, BindingKind::Resolve).await?;

        tracer.begin("transform");
        for hook in &plan.transform {
            tracer.begin("unit");
            let out = hook(ctx).await;
            tracer.end();
            out?;
        }
        tracer.end();

        early = run_intercepts(&plan.before_handle, "beforeHandle", ctx, tracer).await?;
        if early.is_none() {
            tracer.begin("handle");
            let result = (plan.handler)(ctx).await;
            tracer.end();
            ctx.set_result(result?);

            validate_response(plan, ctx)?;

            tracer.begin("afterHandle");
            for hook in &plan.after_handle {
                tracer.begin("unit");
                let out = hook(ctx).await;
                tracer.end();
                if let Some(value) = out? {
                    // Chaining: the next afterHandle sees the latest value.
                    ctx.set_result(value);
                }
            }
            tracer.end();
        }
    }

    if let Some(value) = early {
        ctx.set_result(value);
    }

    tracer.begin("mapResponse");
    for hook in &plan.map_response {
        tracer.begin("unit");
        let out = hook(ctx).await;
        tracer.end();
        if let Some(response) = out? {
            ctx.set_mapped(response);
        }
    }
    tracer.end();

    Ok(respond::finalize(ctx))
}

async fn run_intercepts(
    hooks: &[InterceptFn],
    stage: &str,
    ctx: &mut Context,
    tracer: &mut Tracer<'_>,
) -> Result<Option<Value>, Failure> {
    if hooks.is_empty() {
        return Ok(None);
    }
    tracer.begin(stage);
    let mut early = None;
    for hook in hooks {
        tracer.begin("unit");
        let out = hook(ctx).await;
        tracer.end();
        if let Some(value) = out? {
            early = Some(value);
            break;
        }
    }
    tracer.end();
    Ok(early)
}

async fn parse_stage(
    plan: &ExecutionPlan,
    ctx: &mut Context,
    tracer: &mut Tracer<'_>,
) -> Result<(), Failure> {
    if ctx.request().body.is_empty() {
        return Ok(());
    }
    tracer.begin("parse");
    let out = parse_inner(plan, ctx, tracer).await;
    tracer.end();
    out
}

async fn parse_inner(
    plan: &ExecutionPlan,
    ctx: &mut Context,
    tracer: &mut Tracer<'_>,
) -> Result<(), Failure> {
    // Explicit parse hooks first; the first non-void result wins.
    for hook in &plan.parse {
        tracer.begin("unit");
        let out = hook(ctx).await;
        tracer.end();
        if let Some(value) = out? {
            ctx.set_body(value);
            return Ok(());
        }
    }
    let Some(content_type) = ctx.request().content_type().map(str::to_string) else {
        return Err(Failure::parse("missing content type for non-empty body"));
    };
    let body = ctx.request().body.clone();
    match builtin_parse(&content_type, &body)? {
        Builtin::Parsed(value) => {
            ctx.set_body(value);
            Ok(())
        }
        // Recognized but undecoded; the raw bytes stay on the request.
        Builtin::Raw => Ok(()),
        Builtin::Unknown => Err(Failure::parse(format!(
            "unsupported content type: {content_type}"
        ))),
    }
}

#[derive(Clone, Copy)]
enum BindingKind {
    Derive,
    Resolve,
}

async fn bindings_stage(
    ctx: &mut Context,
    tracer: &mut Tracer<'_>,
    kind: BindingKind,
) -> Result<(), Failure> {
    let (stage, bindings) = match kind {
        BindingKind::Derive => ("derive", Arc::clone(&ctx.bindings().derives)),
        BindingKind::Resolve => ("resolve", Arc::clone(&ctx.bindings().resolves)),
    };
    if bindings.is_empty() {
        return Ok(());
    }
    tracer.begin(stage);
    for (name, f) in bindings.iter() {
        tracer.begin("unit");
        let out = f(&*ctx).await;
        tracer.end();
        ctx.set_derived(name.clone(), out?);
    }
    tracer.end();
    Ok(())
}

fn validate_stage(
    plan: &ExecutionPlan,
    ctx: &mut Context,
    tracer: &mut Tracer<'_>,
) -> Result<(), Failure> {
    tracer.begin("validate");
    let out = validate_inner(plan, ctx);
    tracer.end();
    out
}

/// Validation order law: headers → params → query → cookie → body. The
/// first failing slot is reported; later validators do not run.
fn validate_inner(plan: &ExecutionPlan, ctx: &mut Context) -> Result<(), Failure> {
    if !plan.validators.headers.is_noop() {
        let value = headers_value(ctx);
        plan.validators.headers.validate("headers", &value)?;
    }
    if !plan.validators.params.is_noop() {
        let value = map_value(ctx.params());
        plan.validators.params.validate("params", &value)?;
    }
    if !plan.validators.query.is_noop() {
        let value = map_value(ctx.query());
        plan.validators.query.validate("query", &value)?;
    }
    if let Some(secret) = &plan.cookie_secret {
        let verified = cookie::verify_cookies(ctx.cookies(), secret)?;
        ctx.set_cookies(verified);
    }
    if !plan.validators.cookie.is_noop() {
        let value = map_value(ctx.cookies());
        plan.validators.cookie.validate("cookie", &value)?;
    }
    if !plan.validators.body.is_noop() {
        let value = ctx.body().cloned().unwrap_or(Value::Null);
        plan.validators.body.validate("body", &value)?;
    }
    Ok(())
}

fn validate_response(plan: &ExecutionPlan, ctx: &Context) -> Result<(), Failure> {
    let status = ctx
        .status_override()
        .unwrap_or(StatusCode::OK)
        .as_u16();
    if let Some(checker) = plan.validators.response.checker_for(status) {
        let value = ctx.result().cloned().unwrap_or(Value::Null);
        if !checker.check(&value) {
            return Err(Failure::validation("response", checker.errors(&value)));
        }
    }
    Ok(())
}

/// The error stage: dispatch to hooks whose code filter matches, first
/// non-void return recovers, otherwise the default mapping answers.
async fn error_stage(
    plan: &ExecutionPlan,
    ctx: &mut Context,
    failure: &Failure,
    tracer: &mut Tracer<'_>,
) -> Response {
    tracer.begin("error");
    for hook in &plan.error {
        if !hook.handles(&failure.code) {
            continue;
        }
        tracer.begin("unit");
        let out = (hook.run)(ctx, failure).await;
        tracer.end();
        match out {
            Ok(Some(value)) => {
                let status = ctx
                    .status_override()
                    .unwrap_or_else(|| respond::status_for(failure, &plan.custom_status));
                let mut response = respond::value_to_response(value, Some(status));
                for (name, header) in ctx.staged_headers() {
                    response.headers.append(name.clone(), header.clone());
                }
                tracer.end();
                return response;
            }
            Ok(None) => {}
            Err(inner) => {
                tracing::error!(
                    code = %inner.code,
                    "error hook failed: {}",
                    inner.message
                );
            }
        }
    }
    tracer.end();
    respond::failure_response(failure, &plan.custom_status)
}

fn headers_value(ctx: &Context) -> Value {
    let mut object = Map::new();
    for (name, value) in ctx.request().headers.iter() {
        if let Ok(text) = value.to_str() {
            object.insert(name.as_str().to_string(), Value::String(text.to_string()));
        }
    }
    Value::Object(object)
}

fn map_value(map: &HashMap<String, String>) -> Value {
    let object: Map<String, Value> = map
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    Value::Object(object)
}
