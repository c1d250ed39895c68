//! HTTP dispatch for the network service socket.

use std::sync::Arc;

use axum::extract::State;
use axum::response::Response;
use axum::routing::post;
use axum::{Json, Router};
use plugin_proto::{
    ACTIVATE_PATH, ActivateResponse, CreateEndpointRequest, CreateNetworkRequest,
    DeleteEndpointRequest, DeleteNetworkRequest, InfoRequest, JoinRequest, LeaveRequest,
    NET_CREATE_ENDPOINT_PATH, NET_CREATE_NETWORK_PATH, NET_DELETE_ENDPOINT_PATH,
    NET_DELETE_NETWORK_PATH, NET_ENDPOINT_OPER_INFO_PATH, NET_GET_CAPABILITIES_PATH,
    NET_JOIN_PATH, NET_LEAVE_PATH, NETWORK_DRIVER,
};
use routed::NetDriver;

use crate::wire::{PluginError, respond, respond_empty};

pub fn router(driver: Arc<NetDriver>) -> Router {
    Router::new()
        .route(ACTIVATE_PATH, post(activate))
        .route(NET_GET_CAPABILITIES_PATH, post(capabilities))
        .route(NET_CREATE_NETWORK_PATH, post(create_network))
        .route(NET_DELETE_NETWORK_PATH, post(delete_network))
        .route(NET_CREATE_ENDPOINT_PATH, post(create_endpoint))
        .route(NET_DELETE_ENDPOINT_PATH, post(delete_endpoint))
        .route(NET_ENDPOINT_OPER_INFO_PATH, post(endpoint_info))
        .route(NET_JOIN_PATH, post(join))
        .route(NET_LEAVE_PATH, post(leave))
        .with_state(driver)
}

async fn activate() -> Response {
    respond(&ActivateResponse {
        implements: vec![NETWORK_DRIVER.to_string()],
    })
}

async fn capabilities(State(driver): State<Arc<NetDriver>>) -> Response {
    respond(&driver.capabilities())
}

async fn create_network(
    State(driver): State<Arc<NetDriver>>,
    Json(req): Json<CreateNetworkRequest>,
) -> Response {
    driver.create_network(&req).await;
    respond_empty()
}

async fn delete_network(
    State(driver): State<Arc<NetDriver>>,
    Json(req): Json<DeleteNetworkRequest>,
) -> Response {
    driver.delete_network(&req).await;
    respond_empty()
}

async fn create_endpoint(
    State(driver): State<Arc<NetDriver>>,
    Json(req): Json<CreateEndpointRequest>,
) -> Result<Response, PluginError> {
    let response = driver.create_endpoint(&req).await?;
    Ok(respond(&response))
}

async fn delete_endpoint(
    State(driver): State<Arc<NetDriver>>,
    Json(req): Json<DeleteEndpointRequest>,
) -> Response {
    driver.delete_endpoint(&req).await;
    respond_empty()
}

async fn endpoint_info(
    State(driver): State<Arc<NetDriver>>,
    Json(req): Json<InfoRequest>,
) -> Response {
    respond(&driver.endpoint_info(&req).await)
}

async fn join(
    State(driver): State<Arc<NetDriver>>,
    Json(req): Json<JoinRequest>,
) -> Result<Response, PluginError> {
    let response = driver.join(&req).await?;
    Ok(respond(&response))
}

async fn leave(State(driver): State<Arc<NetDriver>>, Json(req): Json<LeaveRequest>) -> Response {
    driver.leave(&req).await;
    respond_empty()
}
