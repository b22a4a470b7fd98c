use axum::{
    body::Bytes,
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, error, info, warn};

use crate::{
    config::Config,
    dispatcher::Dispatcher,
    metrics::{self, RequestTimer},
    models::{AnnotationRequest, QueryRequest, SearchRequest},
    validation::decode_body,
    Result, SimpleJsonError,
};

/// The protocol endpoints, relative to whatever path they end up mounted on.
pub fn simplejson_router(dispatcher: Dispatcher) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/query", post(query))
        .route("/annotations", post(annotations))
        .route("/search", post(search))
        .route("/tag-keys", post(tag_keys))
        .route("/tag-values", post(tag_values))
        .with_state(dispatcher)
}

/// Full application: protocol endpoints under `config.mount_path`, `/metrics` at the
/// root, request tracing and optionally CORS.
pub fn app(dispatcher: Dispatcher, config: &Config) -> Router {
    let api = simplejson_router(dispatcher);
    let app = Router::new().route("/metrics", get(render_metrics));

    let app = if config.mount_path == "/" {
        app.merge(api)
    } else {
        app.nest(&config.mount_path, api)
    };

    let app = app.layer(TraceLayer::new_for_http());
    if config.enable_cors {
        app.layer(cors())
    } else {
        app
    }
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
}

fn respond<T: IntoResponse>(mut timer: RequestTimer, result: Result<T>) -> Response {
    let response = match result {
        Ok(body) => body.into_response(),
        Err(err) => {
            match &err {
                SimpleJsonError::Validation(errors) => {
                    warn!(?errors, "Model state is not valid, returning a bad request")
                }
                e if e.status().is_server_error()
                    && e.status() != StatusCode::SERVICE_UNAVAILABLE =>
                {
                    error!(error = %e, code = e.code(), "Request failed")
                }
                e => debug!(error = %e, "Request rejected"),
            }
            err.into_response()
        }
    };

    timer.set_status(response.status().as_u16());
    debug!(status = response.status().as_u16(), "Action completed");
    response
}

async fn index(State(dispatcher): State<Dispatcher>) -> Response {
    let timer = RequestTimer::new("index");
    respond(timer, dispatcher.check().await.map(|_| StatusCode::OK))
}

async fn query(State(dispatcher): State<Dispatcher>, body: Bytes) -> Response {
    let timer = RequestTimer::new("query");
    info!("Executing query");
    let result = async {
        let request = decode_body::<QueryRequest>(&body)?;
        dispatcher.query(request).await.map(Json)
    }
    .await;
    respond(timer, result)
}

async fn annotations(State(dispatcher): State<Dispatcher>, body: Bytes) -> Response {
    let timer = RequestTimer::new("annotations");
    info!("Executing annotations");
    let result = async {
        let request = decode_body::<AnnotationRequest>(&body)?.ok_or_else(|| {
            SimpleJsonError::MissingBody("An annotation request must be supplied.".to_string())
        })?;
        dispatcher.annotations(request).await
    }
    .await;
    respond(timer, result)
}

async fn search(State(dispatcher): State<Dispatcher>, body: Bytes) -> Response {
    let timer = RequestTimer::new("search");
    info!("Executing search");
    let result = async {
        let request = decode_body::<SearchRequest>(&body)?;
        dispatcher.search(request).await.map(Json)
    }
    .await;
    respond(timer, result)
}

async fn tag_keys(State(dispatcher): State<Dispatcher>) -> Response {
    let timer = RequestTimer::new("tag_keys");
    respond(timer, dispatcher.tag_keys().await)
}

async fn tag_values(State(dispatcher): State<Dispatcher>, body: Bytes) -> Response {
    let timer = RequestTimer::new("tag_values");
    respond(timer, dispatcher.tag_values(|| decode_body(&body)).await)
}

async fn render_metrics() -> Response {
    match metrics::render() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}
