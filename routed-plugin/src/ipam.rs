//! HTTP dispatch for the IPAM service socket.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::response::Response;
use axum::routing::post;
use axum::{Json, Router};
use plugin_proto::{
    ACTIVATE_PATH, ActivateResponse, AddressSpaces, GATEWAY_OPTION, IPAM_DRIVER,
    IPAM_GET_CAPABILITIES_PATH, IPAM_GET_DEFAULT_ADDRESS_SPACES_PATH, IPAM_RELEASE_ADDRESS_PATH,
    IPAM_RELEASE_POOL_PATH, IPAM_REQUEST_ADDRESS_PATH, IPAM_REQUEST_POOL_PATH, IpamCapabilities,
    ReleaseAddressRequest, ReleasePoolRequest, RequestAddressRequest, RequestAddressResponse,
    RequestPoolRequest, RequestPoolResponse,
};
use routed::IpamDriver;

use crate::wire::{PluginError, respond, respond_empty};

pub fn router(driver: Arc<IpamDriver>) -> Router {
    Router::new()
        .route(ACTIVATE_PATH, post(activate))
        .route(IPAM_GET_CAPABILITIES_PATH, post(capabilities))
        .route(IPAM_GET_DEFAULT_ADDRESS_SPACES_PATH, post(address_spaces))
        .route(IPAM_REQUEST_POOL_PATH, post(request_pool))
        .route(IPAM_RELEASE_POOL_PATH, post(release_pool))
        .route(IPAM_REQUEST_ADDRESS_PATH, post(request_address))
        .route(IPAM_RELEASE_ADDRESS_PATH, post(release_address))
        .with_state(driver)
}

async fn activate() -> Response {
    respond(&ActivateResponse {
        implements: vec![IPAM_DRIVER.to_string()],
    })
}

async fn capabilities(State(driver): State<Arc<IpamDriver>>) -> Response {
    respond(&IpamCapabilities {
        requires_mac_address: driver.requires_mac_address(),
    })
}

async fn address_spaces() -> Response {
    respond(&AddressSpaces {
        local_default_address_space: "Testlocal".to_string(),
        global_default_address_space: "TestRemote".to_string(),
    })
}

async fn request_pool(
    State(driver): State<Arc<IpamDriver>>,
    Json(req): Json<RequestPoolRequest>,
) -> Response {
    let grant = driver.request_pool(&req.pool).await;
    respond(&RequestPoolResponse {
        pool_id: grant.pool_id,
        pool: grant.subnet,
        data: HashMap::from([(GATEWAY_OPTION.to_string(), grant.gateway)]),
    })
}

async fn release_pool(
    State(driver): State<Arc<IpamDriver>>,
    Json(req): Json<ReleasePoolRequest>,
) -> Response {
    driver.release_pool(&req.pool_id).await;
    respond_empty()
}

async fn request_address(
    State(driver): State<Arc<IpamDriver>>,
    Json(req): Json<RequestAddressRequest>,
) -> Result<Response, PluginError> {
    let address = driver.request_address(&req.address, &req.options).await?;
    Ok(respond(&RequestAddressResponse {
        address,
        data: HashMap::new(),
    }))
}

async fn release_address(
    State(driver): State<Arc<IpamDriver>>,
    Json(req): Json<ReleaseAddressRequest>,
) -> Response {
    driver.release_address(&req.address).await;
    respond_empty()
}
