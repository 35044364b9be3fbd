//! OpenAPI documentation
//!
//! Served by the documentation stage in development only.

use crate::api::handlers::{posts, system};
use crate::api::models::{CreatePostRequest, PostCreatedResponse, PostSummary};
use crate::core::error::ErrorResponse;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::OpenApi;
use utoipa_swagger_ui::Config as SwaggerConfig;

/// Path of the interactive documentation UI
pub const SWAGGER_UI_PATH: &str = "/swagger";

/// Path of the generated OpenAPI document
pub const OPENAPI_JSON_PATH: &str = "/swagger/v1/swagger.json";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "API Bootstrap",
        version = "v1",
        description = "Bootstrap web API with bearer authentication, rate limiting and post endpoints"
    ),
    paths(
        system::root,
        system::health_check,
        system::secure,
        system::admin,
        posts::list_posts,
        posts::create_post,
    ),
    components(schemas(CreatePostRequest, PostSummary, PostCreatedResponse, ErrorResponse)),
    tags(
        (name = "System", description = "Greeting, health and access checks"),
        (name = "Posts", description = "Post listing and creation"),
    ),
    modifiers(&SecurityAddon),
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("JWT Authorization header using the Bearer scheme"))
                        .build(),
                ),
            )
        }
    }
}

/// Routes serving the Swagger UI and the OpenAPI document
///
/// UI assets all live one segment below the UI path, so the document can sit
/// under the same prefix without a catch-all route.
pub fn docs_router() -> Router {
    let ui_config = Arc::new(SwaggerConfig::from(OPENAPI_JSON_PATH));
    let document = Arc::new(ApiDoc::openapi());

    let ui = Router::new()
        .route(
            SWAGGER_UI_PATH,
            get(|| async { Redirect::temporary(&format!("{}/", SWAGGER_UI_PATH)) }),
        )
        .route(
            &format!("{}/", SWAGGER_UI_PATH),
            get(|State(config): State<Arc<SwaggerConfig<'static>>>| async move {
                swagger_asset("", config)
            }),
        )
        .route(
            &format!("{}/:file", SWAGGER_UI_PATH),
            get(
                |State(config): State<Arc<SwaggerConfig<'static>>>, Path(file): Path<String>| async move {
                    swagger_asset(&file, config)
                },
            ),
        )
        .with_state(ui_config);

    let openapi = Router::new()
        .route(
            OPENAPI_JSON_PATH,
            get(|State(document): State<Arc<utoipa::openapi::OpenApi>>| async move {
                Json(document.as_ref().clone())
            }),
        )
        .with_state(document);

    ui.merge(openapi)
}

fn swagger_asset(file: &str, config: Arc<SwaggerConfig<'static>>) -> Response {
    match utoipa_swagger_ui::serve(file, config) {
        Ok(Some(asset)) => {
            ([(header::CONTENT_TYPE, asset.content_type)], asset.bytes.to_vec()).into_response()
        }
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            tracing::error!(file = %file, error = %e, "Failed to serve Swagger UI asset");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
