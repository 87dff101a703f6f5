//! The single callback endpoint. Verifies caller credentials, maps
//! the method name to a state-machine handler, and normalizes every
//! outcome into the `{id, result}` / `{id, error}` envelope. The
//! provider inspects the body, not the status code, so responses are
//! always HTTP 200.

use axum::{extract::State, http::HeaderMap, Json};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::{MerchantError, ServiceError};
use crate::middleware::auth;
use crate::protocol::{
    RpcRequest, METHOD_CANCEL, METHOD_CHECK, METHOD_CHECK_PERFORM, METHOD_CREATE,
    METHOD_PERFORM, METHOD_STATEMENT,
};
use crate::services::MerchantService;
use crate::AppState;

pub async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    // The failure envelope echoes the request id even when the rest
    // of the payload is unusable.
    let request_id = body.get("id").and_then(Value::as_i64).unwrap_or(0);

    if let Err(err) = auth::verify(&headers, &state.credentials) {
        return failure(request_id, err);
    }

    let request: RpcRequest = match serde_json::from_value(body) {
        Ok(request) => request,
        Err(err) => {
            tracing::warn!(error = %err, "malformed request envelope");
            return failure(request_id, MerchantError::SystemError);
        }
    };

    match dispatch(&state.merchant, &request.method, request.params).await {
        Ok(result) => Json(json!({ "id": request.id, "result": result })),
        Err(ServiceError::Merchant(err)) => failure(request.id, err),
        Err(err) => {
            // Internal detail stays in the server log; the wire only
            // ever sees the generic system error.
            tracing::error!(method = %request.method, error = %err, "callback failed");
            failure(request.id, MerchantError::SystemError)
        }
    }
}

async fn dispatch(
    service: &MerchantService,
    method: &str,
    params: Value,
) -> Result<Value, ServiceError> {
    match method {
        METHOD_CHECK_PERFORM => {
            to_value(service.check_perform_transaction(parse(params)?).await?)
        }
        METHOD_CREATE => to_value(service.create_transaction(parse(params)?).await?),
        METHOD_PERFORM => to_value(service.perform_transaction(parse(params)?).await?),
        METHOD_CANCEL => to_value(service.cancel_transaction(parse(params)?).await?),
        METHOD_CHECK => to_value(service.check_transaction(parse(params)?).await?),
        METHOD_STATEMENT => to_value(service.get_statement(parse(params)?).await?),
        unknown => Err(ServiceError::Internal(format!("unknown method {unknown}"))),
    }
}

fn parse<T: DeserializeOwned>(params: Value) -> Result<T, ServiceError> {
    serde_json::from_value(params)
        .map_err(|err| ServiceError::Internal(format!("malformed params: {err}")))
}

fn to_value<T: serde::Serialize>(result: T) -> Result<Value, ServiceError> {
    serde_json::to_value(result)
        .map_err(|err| ServiceError::Internal(format!("response serialization: {err}")))
}

fn failure(id: i64, err: MerchantError) -> Json<Value> {
    Json(json!({ "id": id, "error": err.to_wire() }))
}
