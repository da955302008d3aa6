//! Department routes.
//!
//! | Method | Path                          | Roles          | Extra filters                       |
//! |--------|-------------------------------|----------------|-------------------------------------|
//! | GET    | `/departments`                | any member     | header decorator                    |
//! | GET    | `/departments/{deptId}`       | any member     | payload, version, location, cache   |
//! | POST   | `/departments`                | Admin          | payload, body validation            |
//! | DELETE | `/departments/{deptId}`       | Admin          | location gate                       |
//! | GET    | `/departments/{deptId}/admin` | Admin          | path suffix, location gate          |

use std::sync::Arc;

use collegium_config::CollegiumConfig;
use collegium_core::{
    normalize_location, roles, Department, Notifier, PipelineError, Repository,
};
use collegium_middleware::filters::action::{
    DepartmentLookupFilter, TimingActionFilter, ValidateDepartmentFilter,
};
use collegium_middleware::filters::authorization::{
    DepartmentLocationFilter, PathSuffixFilter, RoleAuthorizationFilter, DEFAULT_DEPARTMENT_KEY,
};
use collegium_middleware::filters::resource::{ApiVersionFilter, PayloadGuardFilter};
use collegium_middleware::filters::result::{CacheControlDecorator, HeaderDecorator};
use collegium_middleware::types::escape_html;
use collegium_middleware::{
    handler_fn, BindingOptions, FilterChain, RequestContext, Response, ResponseChannel,
    ResponseExt,
};
use collegium_server::Route;
use http::{Method, StatusCode};
use serde_json::json;

use crate::app::AppState;

/// Argument the create route binds its body to.
pub const DEPARTMENT_ARGUMENT: &str = "department";

const ANY_MEMBER: [&str; 3] = [roles::ADMIN, roles::INSTRUCTOR, roles::STUDENT];

/// Every department route.
pub fn routes(config: &CollegiumConfig, state: &AppState) -> Vec<Route> {
    vec![
        Route::new(Method::GET, "/departments", "listDepartments", list(state))
            .channel(ResponseChannel::Json),
        Route::new(
            Method::GET,
            "/departments/{deptId}",
            "getDepartment",
            details(config, state),
        )
        .channel(ResponseChannel::Json),
        Route::new(Method::POST, "/departments", "createDepartment", create(config, state))
            .channel(ResponseChannel::Json),
        Route::new(
            Method::DELETE,
            "/departments/{deptId}",
            "deleteDepartment",
            delete(state),
        )
        .channel(ResponseChannel::Json),
        Route::new(
            Method::GET,
            "/departments/{deptId}/admin",
            "departmentAdmin",
            admin_view(state),
        )
        .channel(ResponseChannel::Html),
    ]
}

fn department_id(ctx: &RequestContext) -> Result<i64, PipelineError> {
    ctx.route_param(DEFAULT_DEPARTMENT_KEY)
        .and_then(|raw| raw.trim().parse().ok())
        .ok_or_else(|| PipelineError::bad_input("Department ID must be a number"))
}

fn not_found(id: i64) -> PipelineError {
    PipelineError::not_found_resource("Department", id.to_string())
}

fn list(state: &AppState) -> FilterChain {
    let departments = Arc::clone(&state.departments);

    FilterChain::builder()
        .authorization(RoleAuthorizationFilter::new(ANY_MEMBER))
        .result(HeaderDecorator::default())
        .handler(handler_fn(move |_ctx, _request| {
            let departments = Arc::clone(&departments);
            async move {
                let all = departments.query(&|_: &Department| true).await?;
                Ok(Response::json(StatusCode::OK, &all))
            }
        }))
}

fn details(config: &CollegiumConfig, state: &AppState) -> FilterChain {
    let departments = Arc::clone(&state.departments);

    FilterChain::builder()
        .resource(PayloadGuardFilter::new(config.payload.max_bytes))
        .resource(ApiVersionFilter::new(config.payload.api_version.clone()))
        .authorization(RoleAuthorizationFilter::new(ANY_MEMBER))
        .authorization(DepartmentLocationFilter::new(
            state.store(),
            Arc::clone(&state.policy),
        ))
        .action(TimingActionFilter)
        .action(DepartmentLookupFilter::new(
            state.store(),
            Arc::clone(&state.policy),
        ))
        .result(HeaderDecorator::default())
        .result(CacheControlDecorator::new(config.cache.max_age_secs))
        .handler(handler_fn(move |ctx, _request| {
            let departments = Arc::clone(&departments);
            let id = department_id(ctx);
            async move {
                let id = id?;
                let department = departments.find_by_id(id).await?.ok_or_else(|| not_found(id))?;
                Ok(Response::json(StatusCode::OK, &department))
            }
        }))
}

fn create(config: &CollegiumConfig, state: &AppState) -> FilterChain {
    let departments = Arc::clone(&state.departments);
    let notifier = Arc::clone(&state.notifier);
    let target = state.notify_target.clone();

    FilterChain::builder()
        .resource(PayloadGuardFilter::new(config.payload.max_bytes))
        .binding(BindingOptions::body_as(DEPARTMENT_ARGUMENT))
        .authorization(RoleAuthorizationFilter::new([roles::ADMIN]))
        .action(TimingActionFilter)
        .action(ValidateDepartmentFilter::new(Arc::clone(&state.policy)))
        .handler(handler_fn(move |ctx, _request| {
            let departments = Arc::clone(&departments);
            let notifier = Arc::clone(&notifier);
            let target = target.clone();
            let body = ctx.argument(DEPARTMENT_ARGUMENT).cloned();
            async move {
                let body = body.ok_or_else(|| {
                    PipelineError::bad_input("Request body must be a department object")
                })?;
                let mut department: Department = serde_json::from_value(body)
                    .map_err(|e| PipelineError::bad_input(format!("Invalid department: {e}")))?;
                department.id = 0;
                department.location = department.location.as_deref().map(normalize_location);

                let saved = departments.save(department).await?;
                let message = format!(
                    "Department '{}' has been added successfully!",
                    saved.name.as_deref().unwrap_or_default()
                );
                if let Err(error) = notifier.send(&target, &message).await {
                    tracing::warn!(department_id = saved.id, error = %error, "department notification failed");
                }

                Ok(Response::json(StatusCode::CREATED, &saved))
            }
        }))
}

fn delete(state: &AppState) -> FilterChain {
    let departments = Arc::clone(&state.departments);
    let notifier = Arc::clone(&state.notifier);
    let target = state.notify_target.clone();

    FilterChain::builder()
        .authorization(RoleAuthorizationFilter::new([roles::ADMIN]))
        .authorization(DepartmentLocationFilter::new(
            state.store(),
            Arc::clone(&state.policy),
        ))
        .action(TimingActionFilter)
        .handler(handler_fn(move |ctx, _request| {
            let departments = Arc::clone(&departments);
            let notifier = Arc::clone(&notifier);
            let target = target.clone();
            let id = department_id(ctx);
            async move {
                let id = id?;
                let existing = departments.find_by_id(id).await?.ok_or_else(|| not_found(id))?;
                if !departments.delete(id).await? {
                    return Err(not_found(id));
                }

                let message = format!(
                    "Department '{}' has been deleted successfully!",
                    existing.name.as_deref().unwrap_or_default()
                );
                if let Err(error) = notifier.send(&target, &message).await {
                    tracing::warn!(department_id = id, error = %error, "department notification failed");
                }

                Ok(Response::json(StatusCode::OK, &json!({ "deleted": id })))
            }
        }))
}

fn admin_view(state: &AppState) -> FilterChain {
    let departments = Arc::clone(&state.departments);

    FilterChain::builder()
        .authorization(PathSuffixFilter::admin())
        .authorization(RoleAuthorizationFilter::new([roles::ADMIN]))
        .authorization(DepartmentLocationFilter::new(
            state.store(),
            Arc::clone(&state.policy),
        ))
        .result(HeaderDecorator::default())
        .handler(handler_fn(move |ctx, _request| {
            let departments = Arc::clone(&departments);
            let id = department_id(ctx);
            async move {
                let id = id?;
                let department = departments.find_by_id(id).await?.ok_or_else(|| not_found(id))?;
                Ok(Response::html(StatusCode::OK, admin_page(&department)))
            }
        }))
}

fn admin_page(department: &Department) -> String {
    let field = |value: Option<&str>| escape_html(value.unwrap_or("-"));
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Department administration</title></head>\
         <body><h1>{name}</h1><dl>\
         <dt>Manager</dt><dd>{manager}</dd>\
         <dt>Location</dt><dd>{location}</dd>\
         <dt>PCs</dt><dd>{pcs}</dd>\
         </dl></body></html>",
        name = field(department.name.as_deref()),
        manager = field(department.manager_name.as_deref()),
        location = field(department.location.as_deref()),
        pcs = department.pc_numbers.map_or_else(|| "-".to_string(), |n| n.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_department_id_parsing() {
        let mut ctx = RequestContext::new();
        assert!(department_id(&ctx).is_err());

        ctx.set_route_param("deptId", "abc");
        assert!(department_id(&ctx).is_err());

        ctx.set_route_param("deptId", "7");
        assert_eq!(department_id(&ctx).unwrap(), 7);
    }

    #[test]
    fn test_admin_page_escapes() {
        let department = Department::new("<R&D>", "smart").with_id(1);
        let page = admin_page(&department);
        assert!(page.contains("&lt;R&amp;D&gt;"));
        assert!(page.contains("<dd>-</dd>"));
    }
}
