use rocket::data::{self, Data, FromData};
use rocket::http::Status;
use rocket::outcome::Outcome;
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use rocket::{catch, post, Request, State};
use thiserror::Error;
use tracing::{error, warn};

use crate::app_state::AppState;
use crate::engine::LlmError;
use crate::types::{ErrorResponse, GenerateRequest, GenerateResponse};

pub const INVALID_REQUEST_BODY: &str = "Invalid request body";
pub const SOMETHING_WENT_WRONG: &str = "Something went wrong";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error(transparent)]
    Generation(#[from] LlmError),
}

impl ApiError {
    /// 对外只暴露固定文案，底层错误只写服务端日志
    pub fn public_message(&self) -> &'static str {
        match self {
            ApiError::InvalidBody(_) => INVALID_REQUEST_BODY,
            ApiError::Generation(_) => SOMETHING_WENT_WRONG,
        }
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        let body = Json(ErrorResponse {
            error: self.public_message().to_string(),
        });
        (Status::BadRequest, body).respond_to(req)
    }
}

#[derive(Debug)]
pub struct BodyError(pub String);

/// 请求日志中间件：解析一次 body，写入 prompt 记录，再交给 handler
#[derive(Debug)]
pub struct LoggedPrompt {
    pub endpoint: String,
    pub request: GenerateRequest,
}

#[rocket::async_trait]
impl<'r> FromData<'r> for LoggedPrompt {
    type Error = BodyError;

    async fn from_data(req: &'r Request<'_>, data: Data<'r>) -> data::Outcome<'r, Self> {
        let endpoint = req.uri().path().as_str().to_string();

        let request = match <Json<GenerateRequest> as FromData>::from_data(req, data).await {
            Outcome::Success(Json(request)) => request,
            Outcome::Error((status, e)) => {
                warn!(endpoint = %endpoint, error = %e, "failed to parse request body");
                return Outcome::Error((status, BodyError(e.to_string())));
            }
            Outcome::Forward(forward) => return Outcome::Forward(forward),
        };

        match req.rocket().state::<AppState>() {
            Some(state) => state.records.log_prompt(&endpoint, &request.prompt).await,
            None => error!("AppState is not managed, prompt not logged"),
        }

        Outcome::Success(LoggedPrompt { endpoint, request })
    }
}

#[post("/generate", data = "<body>")]
pub async fn generate(
    state: &State<AppState>,
    body: Result<LoggedPrompt, BodyError>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let LoggedPrompt { endpoint, request } = body.map_err(|e| ApiError::InvalidBody(e.0))?;

    let response = match state.engine.generate(&request.prompt).await {
        Ok(response) => response,
        Err(e) => {
            error!(endpoint = %endpoint, error = %e, "LLM generation failed");
            return Err(ApiError::Generation(e));
        }
    };

    state.records.log_response(&endpoint, &response).await;

    Ok(Json(GenerateResponse { response }))
}

#[catch(default)]
pub fn default_catcher(status: Status, _req: &Request<'_>) -> (Status, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: status.reason_lossy().to_string(),
        }),
    )
}
