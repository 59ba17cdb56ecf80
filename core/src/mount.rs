//! The merge/mount engine.
//!
//! Mounting folds a child application into a parent: namespaces union,
//! routes are re-keyed under the mount prefix, and hooks fold according to
//! their scope. The whole operation is idempotent per checksum+seed — a
//! plugin imported transitively by several parents is applied once.

use crate::app::{App, MountRecord};
use crate::error::RegistrationError;
use crate::route::{join_paths, normalize_path, parse_segments};

/// Fold `child` into `parent` under `prefix`.
///
/// Steps, per the composition contract:
/// 1. compute the child's checksum; a parent dependency record with the
///    same checksum and seed makes the mount idempotent — namespaces and
///    hooks are not re-applied;
/// 2. union decorator/store/derive/resolve namespaces (routes keep the
///    snapshots they were declared with);
/// 3. re-key child routes by the prefix; a path collision with a route of
///    a different origin is an error, while a collision with the same
///    origin is skipped silently (the same plugin mounted twice);
/// 4. fold `global` hooks into the parent store as global, demote `scoped`
///    hooks to local, drop `local` hooks (they stay baked on the child's
///    own routes).
pub(crate) fn mount_into(
    parent: &mut App,
    prefix: &str,
    child: App,
) -> Result<(), RegistrationError> {
    let checksum = child.checksum();
    let deduplicated = parent
        .dependencies
        .iter()
        .any(|record| record.checksum == checksum && record.seed == child.seed);

    let App {
        name,
        seed,
        lifecycle,
        singletons,
        routes,
        types,
        error_codes,
        macros,
        dependencies,
        guard,
        ..
    } = child;

    for mut route in routes {
        if route.origin.is_none() {
            // First mount of the declaring application: bake its scoped and
            // local hooks onto the route and stamp the origin.
            lifecycle.bake_into(&mut route.inherited, checksum);
            route.origin = Some(checksum);
            // Fill absent schema slots from the child's guard.
            if route.schema.body.is_none() {
                route.schema.body = guard.body.clone();
            }
            if route.schema.headers.is_none() {
                route.schema.headers = guard.headers.clone();
            }
            if route.schema.query.is_none() {
                route.schema.query = guard.query.clone();
            }
            if route.schema.params.is_none() {
                route.schema.params = guard.params.clone();
            }
            if route.schema.cookie.is_none() {
                route.schema.cookie = guard.cookie.clone();
            }
            if route.schema.response.is_none() {
                route.schema.response = guard.response.clone();
            }
        }

        let joined = join_paths(prefix, &route.path);
        route.path = if parent.strict_path {
            joined
        } else {
            normalize_path(&joined)
        };
        route.segments = parse_segments(&route.path)?;

        if let Some(existing) = parent
            .routes
            .iter()
            .find(|r| r.method == route.method && r.path == route.path)
        {
            if existing.origin == route.origin {
                tracing::debug!(
                    method = %route.method,
                    path = %route.path,
                    checksum = %checksum,
                    "skipping already-mounted route"
                );
                continue;
            }
            return Err(RegistrationError::DuplicateRoute {
                method: route.method.clone(),
                path: route.path.clone(),
            });
        }
        parent.routes.push(route);
    }

    if deduplicated {
        tracing::debug!(
            name = name.as_deref().unwrap_or("<unnamed>"),
            checksum = %checksum,
            "deduplicated mount: hooks and namespaces not re-applied"
        );
    } else {
        parent.singletons.union_from(&singletons);
        parent.lifecycle.fold_mounted(&lifecycle, checksum);
        for (type_name, schema) in types {
            if let Some(entry) = parent.types.iter_mut().find(|(n, _)| *n == type_name) {
                entry.1 = schema;
            } else {
                parent.types.push((type_name, schema));
            }
        }
        for (code, status) in error_codes {
            if let Some(entry) = parent.error_codes.iter_mut().find(|(c, _)| *c == code) {
                entry.1 = status;
            } else {
                parent.error_codes.push((code, status));
            }
        }
        for (macro_name, body) in macros {
            if let Some(entry) = parent.macros.iter_mut().find(|(n, _)| *n == macro_name) {
                entry.1 = body;
            } else {
                parent.macros.push((macro_name, body));
            }
        }
    }

    // The child's own dependency record travels upward so a transitive
    // plugin import dedups at every level.
    for record in dependencies {
        if !parent
            .dependencies
            .iter()
            .any(|existing| existing.checksum == record.checksum && existing.seed == record.seed)
        {
            parent.dependencies.push(record);
        }
    }
    tracing::info!(
        name = name.as_deref().unwrap_or("<unnamed>"),
        prefix,
        checksum = %checksum,
        "mounted application"
    );
    parent.dependencies.push(MountRecord {
        name,
        seed,
        checksum,
        prefix: prefix.to_string(),
    });

    Ok(())
}
