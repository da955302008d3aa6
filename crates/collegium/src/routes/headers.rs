//! Result-decorator showcase under `/testheader`.
//!
//! Each route carries a different decorator stack so the added response
//! headers can be inspected with any HTTP client.

use collegium_middleware::filters::result::{CacheControlDecorator, HeaderDecorator};
use collegium_middleware::types::escape_html;
use collegium_middleware::{
    handler_fn, FilterChain, Handler, Response, ResponseChannel, ResponseExt,
};
use collegium_server::Route;
use http::{Method, StatusCode};
use serde_json::json;

fn page(message: &'static str) -> impl Handler {
    handler_fn(move |_ctx, _request| {
        let markup = format!(
            "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Header test</title></head>\
             <body><h1>Header test</h1><p>{}</p></body></html>",
            escape_html(message)
        );
        std::future::ready(Ok(Response::html(StatusCode::OK, markup)))
    })
}

fn route(path: &str, name: &str, chain: FilterChain) -> Route {
    Route::new(Method::GET, format!("/testheader/{path}"), name, chain)
        .channel(ResponseChannel::Html)
}

/// Every showcase route.
pub fn routes() -> Vec<Route> {
    vec![
        route(
            "with-default-header",
            "withDefaultHeader",
            FilterChain::builder()
                .result(HeaderDecorator::default())
                .handler(page("Check response headers for: X-Action-Result-Key")),
        ),
        route(
            "with-custom-header",
            "withCustomHeader",
            FilterChain::builder()
                .result(HeaderDecorator::new([("X-My-Custom-Key", "MyCustomValue")]))
                .handler(page("Check response headers for: X-My-Custom-Key = MyCustomValue")),
        ),
        route(
            "with-multiple-headers",
            "withMultipleHeaders",
            FilterChain::builder()
                .result(HeaderDecorator::new([("X-Header-1", "Value1")]))
                .result(HeaderDecorator::new([("X-Header-2", "Value2")]))
                .result(HeaderDecorator::new([("X-Header-3", "Value3")]))
                .handler(page("Check response headers for multiple X-Header-* entries")),
        ),
        route(
            "with-caching",
            "withCaching",
            FilterChain::builder()
                .result(CacheControlDecorator::new(120))
                .result(HeaderDecorator::new([("X-Cached", "Yes")]))
                .handler(page("This response is cacheable for 120 seconds")),
        ),
        route(
            "without-header",
            "withoutHeader",
            FilterChain::builder()
                .handler(page("No custom headers should be added (except standard ones)")),
        ),
        Route::new(
            Method::GET,
            "/testheader/api-with-header",
            "apiWithHeader",
            FilterChain::builder()
                .result(HeaderDecorator::new([("X-API-Key", "ApiResponse")]))
                .handler(handler_fn(|_ctx, _request| async {
                    Ok(Response::json(
                        StatusCode::OK,
                        &json!({
                            "success": true,
                            "message": "Check response headers for custom headers",
                            "headers": {
                                "customHeader": "X-API-Key: ApiResponse",
                                "responseTime": "X-Response-Time: (automatically added)",
                            },
                        }),
                    ))
                })),
        )
        .channel(ResponseChannel::Json),
    ]
}
