use axum::{
    Router,
    extract::{Json, Path, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::{Parser, Subcommand};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use tokio::net::TcpListener;

use crate::core::{
    CalculationRequest, CalculationResult, Calculator, CurrencyTable, Dimension, EngineError,
    Normalizer, UnitError, calculate, calculate_named,
};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "fincalc",
    about = "Loan, savings, debt payoff and retirement projections"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        help = "Log filter when RUST_LOG is unset (error, warn, info, debug, trace)"
    )]
    pub log_level: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve the calculators over HTTP.
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        bind: IpAddr,
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Run one calculation from a JSON request and print the result.
    Calc {
        calculator: String,
        #[arg(long, default_value = "-", help = "Request JSON file, or - for stdin")]
        input: String,
    },
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ConvertDirection {
    #[default]
    #[serde(alias = "toBase", alias = "to_base")]
    ToBase,
    #[serde(alias = "fromBase", alias = "from_base")]
    FromBase,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConvertPayload {
    value: f64,
    unit: String,
    dimension: Dimension,
    #[serde(default)]
    direction: ConvertDirection,
    #[serde(default)]
    currency: CurrencyTable,
}

#[derive(Debug, Serialize)]
struct ConvertResponse {
    value: f64,
}

#[derive(Debug, Serialize)]
struct CalculatorsResponse {
    calculators: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn router() -> Router {
    Router::new()
        .route("/api/calculators", get(calculators_handler))
        .route("/api/calculate/:calculator", post(calculate_handler))
        .route("/api/convert", post(convert_handler))
        .fallback(not_found_handler)
}

pub async fn run_http_server(bind: IpAddr, port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::new(bind, port);
    let listener = TcpListener::bind(addr).await?;
    info!("fincalc HTTP API listening on http://{addr}");
    info!("Local access: http://127.0.0.1:{port}/api/calculators");

    axum::serve(listener, router()).await
}

/// Parses a request body and runs the named calculator, as the `calc` command does.
pub fn calculate_from_json(calculator: &str, json: &str) -> Result<CalculationResult, String> {
    let request = serde_json::from_str::<CalculationRequest>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    calculate_named(calculator, &request).map_err(|e| e.to_string())
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn calculators_handler() -> Response {
    let calculators = Calculator::ALL.iter().map(|c| c.name()).collect();
    json_response(StatusCode::OK, CalculatorsResponse { calculators })
}

async fn calculate_handler(
    Path(name): Path<String>,
    payload: Result<Json<CalculationRequest>, JsonRejection>,
) -> Response {
    let Some(calculator) = Calculator::parse(&name) else {
        let err = EngineError::UnknownCalculator(name);
        return error_response(engine_error_status(&err), &err.to_string());
    };
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("Invalid API JSON payload: {}", rejection.body_text()),
            );
        }
    };

    match calculate(calculator, &request) {
        Ok(result) => json_response(StatusCode::OK, result),
        Err(err) => {
            debug!("{} request failed: {err}", calculator.name());
            error_response(engine_error_status(&err), &err.to_string())
        }
    }
}

async fn convert_handler(payload: Result<Json<ConvertPayload>, JsonRejection>) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("Invalid API JSON payload: {}", rejection.body_text()),
            );
        }
    };
    match convert(&payload) {
        Ok(value) => json_response(StatusCode::OK, ConvertResponse { value }),
        Err(err) => error_response(StatusCode::UNPROCESSABLE_ENTITY, &err.to_string()),
    }
}

fn convert(payload: &ConvertPayload) -> Result<f64, UnitError> {
    let normalizer = Normalizer::new(payload.currency.clone());
    match payload.direction {
        ConvertDirection::ToBase => {
            normalizer.to_base(payload.value, &payload.unit, payload.dimension)
        }
        ConvertDirection::FromBase => {
            normalizer.from_base(payload.value, &payload.unit, payload.dimension)
        }
    }
}

fn engine_error_status(err: &EngineError) -> StatusCode {
    match err {
        EngineError::Unit(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::UnknownCalculator(_) => StatusCode::NOT_FOUND,
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        "no-store".parse().expect("valid header"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}
