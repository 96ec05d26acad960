use std::sync::Arc;

use api_types::CreateInstanceRequest;
use api_types::CreateInstanceResponse;
use api_types::DeleteInstanceResponse;
use api_types::HealthResponse;
use api_types::InstanceDetail;
use api_types::JobInfo;
use api_types::ListInstancesQuery;
use api_types::ListInstancesResponse;
use api_types::LoginRequest;
use api_types::LoginResponse;
use api_types::MetricsQuery;
use api_types::MetricsResponse;
use api_types::SubmitJobRequest;
use api_types::SubmitJobResponse;
use api_types::VerifyQuery;
use api_types::VerifyResponse;
use poem::handler;
use poem::http::StatusCode;
use poem::web::Data;
use poem::web::Json;
use poem::web::Path;
use poem::web::Query;
use poem::IntoResponse;
use poem::Response;

use crate::domain::types::Caller;
use crate::domain::PlatformEngine;

#[handler]
pub async fn login(
    Data(engine): Data<&Arc<PlatformEngine>>,
    Json(request): Json<LoginRequest>,
) -> poem::Result<Json<LoginResponse>> {
    Ok(Json(engine.login(&request.username, &request.password)?))
}

#[handler]
pub async fn verify(
    Data(engine): Data<&Arc<PlatformEngine>>,
    Query(query): Query<VerifyQuery>,
) -> poem::Result<Json<VerifyResponse>> {
    Ok(Json(engine.verify(&query.token)?))
}

/// Starts provisioning; answers 202 while the instance is still coming up
#[handler]
pub async fn create_instance(
    Data(engine): Data<&Arc<PlatformEngine>>,
    Data(caller): Data<&Caller>,
    Json(request): Json<CreateInstanceRequest>,
) -> poem::Result<Response> {
    let created: CreateInstanceResponse = engine.create_instance(caller, request).await?;
    Ok(Json(created).with_status(StatusCode::ACCEPTED).into_response())
}

#[handler]
pub async fn list_instances(
    Data(engine): Data<&Arc<PlatformEngine>>,
    Data(caller): Data<&Caller>,
    Query(query): Query<ListInstancesQuery>,
) -> Json<ListInstancesResponse> {
    Json(engine.list_instances(caller, &query))
}

#[handler]
pub async fn get_instance(
    Data(engine): Data<&Arc<PlatformEngine>>,
    Data(caller): Data<&Caller>,
    Path(instance_id): Path<String>,
) -> poem::Result<Json<InstanceDetail>> {
    Ok(Json(engine.get_instance(caller, &instance_id)?))
}

#[handler]
pub async fn delete_instance(
    Data(engine): Data<&Arc<PlatformEngine>>,
    Data(caller): Data<&Caller>,
    Path(instance_id): Path<String>,
) -> poem::Result<Json<DeleteInstanceResponse>> {
    Ok(Json(engine.delete_instance(caller, &instance_id).await?))
}

#[handler]
pub async fn submit_job(
    Data(engine): Data<&Arc<PlatformEngine>>,
    Data(caller): Data<&Caller>,
    Json(request): Json<SubmitJobRequest>,
) -> poem::Result<Response> {
    let submitted: SubmitJobResponse = engine.submit_job(caller, request).await?;
    Ok(Json(submitted).with_status(StatusCode::CREATED).into_response())
}

#[handler]
pub async fn get_job(
    Data(engine): Data<&Arc<PlatformEngine>>,
    Data(caller): Data<&Caller>,
    Path(job_id): Path<String>,
) -> poem::Result<Json<JobInfo>> {
    Ok(Json(engine.get_job(caller, &job_id)?))
}

#[handler]
pub async fn query_metrics(
    Data(engine): Data<&Arc<PlatformEngine>>,
    Data(caller): Data<&Caller>,
    Query(query): Query<MetricsQuery>,
) -> Json<MetricsResponse> {
    Json(engine.query_metrics(caller, &query))
}

#[handler]
pub async fn health(Data(engine): Data<&Arc<PlatformEngine>>) -> Json<HealthResponse> {
    Json(engine.health())
}
