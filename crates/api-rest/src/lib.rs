//! # API REST
//!
//! REST API implementation for the CQM workbench.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, status code mapping)
//!
//! All business logic lives in `cqm-core`; handlers call the synchronous core services directly.

#![warn(rust_2018_idioms)]

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use cqm_core::constants::{CALCULATION_FAILED_MESSAGE, CQL_ERRORS_MESSAGE};
use cqm_core::{
    flatten_results, CalculationOutput, CalculationService, CoreConfig, CqmError, ExecutionResult,
    ExecutionRun, ExecutionService, FlattenedResults, Group, Measure, MeasureService,
    PassingStats, RecordedCalculator, TestCase, TestCaseService,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

/// Header carrying the acting user for measure edits.
pub const USER_HEADER: &str = "x-user-id";

/// Application state for the REST API server
///
/// Contains shared state that needs to be accessible to all request handlers.
#[derive(Clone)]
pub struct AppState {
    measures: MeasureService,
    test_cases: TestCaseService,
    execution: ExecutionService,
}

impl AppState {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self {
            measures: MeasureService::new(cfg.clone()),
            test_cases: TestCaseService::new(cfg),
            execution: ExecutionService::new(CalculationService::new(Arc::new(
                RecordedCalculator::default(),
            ))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ListMeasuresRes {
    #[schema(value_type = Vec<Object>)]
    pub measures: Vec<Measure>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MeasureReq {
    #[schema(value_type = Object)]
    pub measure: Measure,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MeasureRes {
    #[schema(value_type = Object)]
    pub measure: Measure,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GroupReq {
    #[schema(value_type = Object)]
    pub group: Group,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GroupRes {
    #[schema(value_type = Object)]
    pub group: Group,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseReq {
    #[schema(value_type = Object)]
    pub test_case: TestCase,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseRes {
    #[schema(value_type = Object)]
    pub test_case: TestCase,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListTestCasesRes {
    #[schema(value_type = Vec<Object>)]
    pub test_cases: Vec<TestCase>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ListSeriesRes {
    pub series: Vec<String>,
}

/// Engine output, in the engine's own `{ "results": [...] }` shape.
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct CalculationOutputReq {
    #[serde(default)]
    #[schema(value_type = Option<Vec<Object>>)]
    pub results: Option<Vec<ExecutionResult>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FlattenRes {
    #[schema(value_type = Object)]
    pub flattened: FlattenedResults,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRes {
    #[schema(value_type = Vec<Object>)]
    pub test_cases: Vec<TestCase>,
    #[schema(value_type = Object)]
    pub flattened: FlattenedResults,
    #[schema(value_type = Object)]
    pub stats: PassingStats,
}

impl From<ExecutionRun> for ExecuteRes {
    fn from(run: ExecutionRun) -> Self {
        Self {
            test_cases: run.test_cases,
            flattened: run.flattened,
            stats: run.stats,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMeasuresQuery {
    pub created_by: Option<String>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        list_measures,
        create_measure,
        fetch_measure,
        update_measure,
        create_group,
        update_group,
        execute_measure,
        list_test_cases,
        create_test_case,
        get_test_case,
        update_test_case,
        list_test_case_series,
        flatten,
    ),
    components(schemas(
        HealthRes,
        ListMeasuresRes,
        MeasureReq,
        MeasureRes,
        GroupReq,
        GroupRes,
        TestCaseReq,
        TestCaseRes,
        ListTestCasesRes,
        ListSeriesRes,
        CalculationOutputReq,
        FlattenRes,
        ExecuteRes,
    ))
)]
pub struct ApiDoc;

/// Builds the REST router with OpenAPI docs and permissive CORS.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/measures", get(list_measures).post(create_measure))
        .route("/measures/:id", get(fetch_measure).put(update_measure))
        .route("/measures/:id/groups", post(create_group).put(update_group))
        .route("/measures/:id/execute", post(execute_measure))
        .route("/test-cases/:measure_id", get(list_test_cases))
        .route("/test-case/:measure_id", post(create_test_case))
        .route(
            "/test-cases/:measure_id/:id",
            get(get_test_case).put(update_test_case),
        )
        .route("/test-case-series/:measure_id", get(list_test_case_series))
        .route("/calculation/flatten", post(flatten))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

type ApiError = (StatusCode, &'static str);

/// Maps core errors onto HTTP statuses, logging anything unexpected.
fn error_response(context: &str, err: CqmError) -> ApiError {
    match err {
        CqmError::NotFound { .. } => (StatusCode::NOT_FOUND, "Not found"),
        CqmError::InvalidInput(_) | CqmError::Text(_) | CqmError::Fhir(_) => {
            tracing::debug!("{}: {}", context, err);
            (StatusCode::BAD_REQUEST, "Invalid input")
        }
        CqmError::CqlErrors => (StatusCode::BAD_REQUEST, CQL_ERRORS_MESSAGE),
        CqmError::Forbidden { .. } => (StatusCode::FORBIDDEN, "Forbidden"),
        CqmError::ExecutionInProgress => {
            (StatusCode::CONFLICT, "Test case execution already in progress")
        }
        CqmError::Calculation(_) => {
            tracing::error!("{}: {:?}", context, err);
            (StatusCode::INTERNAL_SERVER_ERROR, CALCULATION_FAILED_MESSAGE)
        }
        _ => {
            tracing::error!("{}: {:?}", context, err);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

fn acting_user(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// Used for monitoring and load balancer health checks.
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "CQM REST API is alive".into(),
    })
}

#[utoipa::path(
    get,
    path = "/measures",
    params(
        ("createdBy" = Option<String>, Query, description = "Only measures created by this user")
    ),
    responses(
        (status = 200, description = "List of measures", body = ListMeasuresRes),
        (status = 500, description = "Internal server error")
    )
)]
/// List stored measures
#[axum::debug_handler]
async fn list_measures(
    State(state): State<AppState>,
    Query(query): Query<ListMeasuresQuery>,
) -> Result<Json<ListMeasuresRes>, ApiError> {
    state
        .measures
        .fetch_measures(query.created_by.as_deref())
        .map(|measures| Json(ListMeasuresRes { measures }))
        .map_err(|e| error_response("List measures error", e))
}

#[utoipa::path(
    post,
    path = "/measures",
    request_body = MeasureReq,
    responses(
        (status = 201, description = "Measure created", body = MeasureRes),
        (status = 400, description = "Bad request"),
        (status = 500, description = "Internal server error")
    )
)]
/// Create a measure
///
/// The acting user, when given, becomes the measure's creator.
#[axum::debug_handler]
async fn create_measure(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<MeasureReq>,
) -> Result<(StatusCode, Json<MeasureRes>), ApiError> {
    let mut measure = req.measure;
    if let Some(user) = acting_user(&headers) {
        measure.created_by = Some(user.to_owned());
    }

    state
        .measures
        .create_measure(measure)
        .map(|measure| (StatusCode::CREATED, Json(MeasureRes { measure })))
        .map_err(|e| error_response("Create measure error", e))
}

#[utoipa::path(
    get,
    path = "/measures/{id}",
    params(("id" = String, Path, description = "Measure id")),
    responses(
        (status = 200, description = "Measure", body = MeasureRes),
        (status = 404, description = "Measure not found")
    )
)]
/// Fetch one measure
#[axum::debug_handler]
async fn fetch_measure(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MeasureRes>, ApiError> {
    state
        .measures
        .fetch_measure(&id)
        .map(|measure| Json(MeasureRes { measure }))
        .map_err(|e| error_response("Fetch measure error", e))
}

#[utoipa::path(
    put,
    path = "/measures/{id}",
    request_body = MeasureReq,
    params(
        ("id" = String, Path, description = "Measure id"),
        ("x-user-id" = Option<String>, Header, description = "Acting user")
    ),
    responses(
        (status = 200, description = "Measure updated", body = MeasureRes),
        (status = 400, description = "Bad request"),
        (status = 403, description = "User may not edit the measure"),
        (status = 404, description = "Measure not found")
    )
)]
/// Replace a measure
#[axum::debug_handler]
async fn update_measure(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<MeasureReq>,
) -> Result<Json<MeasureRes>, ApiError> {
    state
        .measures
        .update_measure(&id, req.measure, acting_user(&headers))
        .map(|measure| Json(MeasureRes { measure }))
        .map_err(|e| error_response("Update measure error", e))
}

#[utoipa::path(
    post,
    path = "/measures/{id}/groups",
    request_body = GroupReq,
    params(
        ("id" = String, Path, description = "Measure id"),
        ("x-user-id" = Option<String>, Header, description = "Acting user")
    ),
    responses(
        (status = 201, description = "Group created", body = GroupRes),
        (status = 403, description = "User may not edit the measure"),
        (status = 404, description = "Measure not found")
    )
)]
/// Add a group to a measure
#[axum::debug_handler]
async fn create_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<GroupReq>,
) -> Result<(StatusCode, Json<GroupRes>), ApiError> {
    state
        .measures
        .create_group(&id, req.group, acting_user(&headers))
        .map(|group| (StatusCode::CREATED, Json(GroupRes { group })))
        .map_err(|e| error_response("Create group error", e))
}

#[utoipa::path(
    put,
    path = "/measures/{id}/groups",
    request_body = GroupReq,
    params(
        ("id" = String, Path, description = "Measure id"),
        ("x-user-id" = Option<String>, Header, description = "Acting user")
    ),
    responses(
        (status = 200, description = "Group updated", body = GroupRes),
        (status = 400, description = "Group id missing"),
        (status = 403, description = "User may not edit the measure"),
        (status = 404, description = "Measure or group not found")
    )
)]
/// Replace a measure group
#[axum::debug_handler]
async fn update_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<GroupReq>,
) -> Result<Json<GroupRes>, ApiError> {
    state
        .measures
        .update_group(&id, req.group, acting_user(&headers))
        .map(|group| Json(GroupRes { group }))
        .map_err(|e| error_response("Update group error", e))
}

#[utoipa::path(
    post,
    path = "/measures/{id}/execute",
    request_body = CalculationOutputReq,
    params(("id" = String, Path, description = "Measure id")),
    responses(
        (status = 200, description = "Execution results", body = ExecuteRes),
        (status = 400, description = "Measure CQL has errors"),
        (status = 404, description = "Measure not found"),
        (status = 409, description = "Execution already in progress"),
        (status = 500, description = "Calculation failed")
    )
)]
/// Execute a measure's stored test cases
///
/// The request carries the calculation engine's output for the measure's test cases. Each test
/// case's expectations are compared with its results and pass statistics are returned. Statuses
/// are not persisted.
#[axum::debug_handler]
async fn execute_measure(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CalculationOutputReq>,
) -> Result<Json<ExecuteRes>, ApiError> {
    let measure = state
        .measures
        .fetch_measure(&id)
        .map_err(|e| error_response("Execute measure error", e))?;
    let test_cases = state
        .test_cases
        .get_test_cases_by_measure_id(&id)
        .map_err(|e| error_response("Execute measure error", e))?;

    let calculator = RecordedCalculator::new(CalculationOutput {
        results: req.results,
    });
    let execution = state
        .execution
        .with_calculation(CalculationService::new(Arc::new(calculator)));

    execution
        .execute_all(&measure, &test_cases)
        .map(|run| Json(ExecuteRes::from(run)))
        .map_err(|e| error_response("Execute measure error", e))
}

#[utoipa::path(
    get,
    path = "/test-cases/{measure_id}",
    params(("measure_id" = String, Path, description = "Measure id")),
    responses(
        (status = 200, description = "Test cases of the measure", body = ListTestCasesRes),
        (status = 500, description = "Internal server error")
    )
)]
/// List a measure's test cases
#[axum::debug_handler]
async fn list_test_cases(
    State(state): State<AppState>,
    Path(measure_id): Path<String>,
) -> Result<Json<ListTestCasesRes>, ApiError> {
    state
        .test_cases
        .get_test_cases_by_measure_id(&measure_id)
        .map(|test_cases| Json(ListTestCasesRes { test_cases }))
        .map_err(|e| error_response("List test cases error", e))
}

#[utoipa::path(
    post,
    path = "/test-case/{measure_id}",
    request_body = TestCaseReq,
    params(("measure_id" = String, Path, description = "Measure id")),
    responses(
        (status = 201, description = "Test case created", body = TestCaseRes),
        (status = 400, description = "Bad request"),
        (status = 404, description = "Measure not found")
    )
)]
/// Create a test case
#[axum::debug_handler]
async fn create_test_case(
    State(state): State<AppState>,
    Path(measure_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<TestCaseReq>,
) -> Result<(StatusCode, Json<TestCaseRes>), ApiError> {
    let mut test_case = req.test_case;
    test_case.created_by = acting_user(&headers).map(str::to_owned);

    state
        .test_cases
        .create_test_case(&measure_id, test_case)
        .map(|test_case| (StatusCode::CREATED, Json(TestCaseRes { test_case })))
        .map_err(|e| error_response("Create test case error", e))
}

#[utoipa::path(
    get,
    path = "/test-cases/{measure_id}/{id}",
    params(
        ("measure_id" = String, Path, description = "Measure id"),
        ("id" = String, Path, description = "Test case id")
    ),
    responses(
        (status = 200, description = "Test case", body = TestCaseRes),
        (status = 404, description = "Test case not found")
    )
)]
/// Fetch one test case
#[axum::debug_handler]
async fn get_test_case(
    State(state): State<AppState>,
    Path((measure_id, id)): Path<(String, String)>,
) -> Result<Json<TestCaseRes>, ApiError> {
    state
        .test_cases
        .get_test_case(&measure_id, &id)
        .map(|test_case| Json(TestCaseRes { test_case }))
        .map_err(|e| error_response("Get test case error", e))
}

#[utoipa::path(
    put,
    path = "/test-cases/{measure_id}/{id}",
    request_body = TestCaseReq,
    params(
        ("measure_id" = String, Path, description = "Measure id"),
        ("id" = String, Path, description = "Test case id")
    ),
    responses(
        (status = 200, description = "Test case updated", body = TestCaseRes),
        (status = 400, description = "Bad request"),
        (status = 404, description = "Measure or test case not found")
    )
)]
/// Replace a test case
#[axum::debug_handler]
async fn update_test_case(
    State(state): State<AppState>,
    Path((measure_id, id)): Path<(String, String)>,
    Json(req): Json<TestCaseReq>,
) -> Result<Json<TestCaseRes>, ApiError> {
    state
        .test_cases
        .update_test_case(&measure_id, &id, req.test_case)
        .map(|test_case| Json(TestCaseRes { test_case }))
        .map_err(|e| error_response("Update test case error", e))
}

#[utoipa::path(
    get,
    path = "/test-case-series/{measure_id}",
    params(("measure_id" = String, Path, description = "Measure id")),
    responses(
        (status = 200, description = "Series names used by the measure's test cases", body = ListSeriesRes),
        (status = 500, description = "Internal server error")
    )
)]
/// List the series names used by a measure's test cases
#[axum::debug_handler]
async fn list_test_case_series(
    State(state): State<AppState>,
    Path(measure_id): Path<String>,
) -> Result<Json<ListSeriesRes>, ApiError> {
    state
        .test_cases
        .get_test_case_series_for_measure(&measure_id)
        .map(|series| Json(ListSeriesRes { series }))
        .map_err(|e| error_response("List test case series error", e))
}

#[utoipa::path(
    post,
    path = "/calculation/flatten",
    request_body = CalculationOutputReq,
    responses(
        (status = 200, description = "Statement counts per patient and group", body = FlattenRes)
    )
)]
/// Flatten engine output into `patientId -> groupId -> statementName -> count`
#[axum::debug_handler]
async fn flatten(
    State(_state): State<AppState>,
    Json(req): Json<CalculationOutputReq>,
) -> Json<FlattenRes> {
    Json(FlattenRes {
        flattened: flatten_results(req.results.as_deref()),
    })
}
