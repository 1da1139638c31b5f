use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, warn};

use crate::{
    controller::{Controller, SessionView, DOWNLOAD_FILE_NAME},
    encoder::SourceImage,
    gemini::DigitizationClient,
    prompt::{clothing_part_options, ClothingPart, ClothingPartOption, DEFAULT_BACKGROUND_COLOR},
    DigitizerError,
};

const INDEX_HTML: &str = include_str!("../static/index.html");
const IMAGE_FIELD: &str = "image";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OptionsResponse {
    clothing_parts: Vec<ClothingPartOption>,
    default_background_color: &'static str,
    download_file_name: &'static str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub background_color: Option<String>,
    pub clothing_part: Option<ClothingPart>,
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

fn status_for(err: &DigitizerError) -> StatusCode {
    match err {
        DigitizerError::Validation(_) => StatusCode::BAD_REQUEST,
        DigitizerError::Busy | DigitizerError::Superseded => StatusCode::CONFLICT,
        DigitizerError::UploadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        DigitizerError::RemoteCall { .. } | DigitizerError::NoImageReturned => {
            StatusCode::BAD_GATEWAY
        }
        DigitizerError::Read(_) | DigitizerError::Configuration(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(err: DigitizerError) -> Response {
    let status = status_for(&err);
    (
        status,
        Json(ErrorBody {
            message: err.user_message(),
        }),
    )
        .into_response()
}

fn upload_error(err: MultipartError) -> DigitizerError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        warn!(error = %err, "upload exceeds the body limit");
        return DigitizerError::UploadTooLarge;
    }
    error!(error = %err, "failed to read uploaded image");
    DigitizerError::Read(std::io::Error::new(
        std::io::ErrorKind::Other,
        err.body_text(),
    ))
}

pub fn router<C>(controller: Arc<Controller<C>>, max_upload_bytes: usize) -> Router
where
    C: DigitizationClient + 'static,
{
    Router::new()
        .route("/", get(index))
        .route("/api/options", get(options))
        .route("/api/state", get(state::<C>))
        .route("/api/source", post(upload_source::<C>))
        .route("/api/settings", put(update_settings::<C>))
        .route("/api/digitize", post(digitize::<C>))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .with_state(controller)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn options() -> Json<OptionsResponse> {
    Json(OptionsResponse {
        clothing_parts: clothing_part_options(),
        default_background_color: DEFAULT_BACKGROUND_COLOR,
        download_file_name: DOWNLOAD_FILE_NAME,
    })
}

async fn state<C>(State(controller): State<Arc<Controller<C>>>) -> Json<SessionView>
where
    C: DigitizationClient + 'static,
{
    Json(controller.view().await)
}

async fn upload_source<C>(
    State(controller): State<Arc<Controller<C>>>,
    mut multipart: Multipart,
) -> Response
where
    C: DigitizationClient + 'static,
{
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) if err.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                return error_response(upload_error(err));
            }
            Err(err) => {
                warn!(error = %err, "malformed multipart upload");
                return error_response(DigitizerError::Validation(format!(
                    "Malformed upload: {err}"
                )));
            }
        };
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let name = field.file_name().unwrap_or("upload").to_string();
        let declared = field.content_type().map(str::to_string);
        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(err) => return error_response(upload_error(err)),
        };

        let source = SourceImage::new(bytes.to_vec(), declared.as_deref(), name);
        return Json(controller.select_file(source).await).into_response();
    }

    error_response(DigitizerError::Validation(format!(
        "Upload must contain an '{IMAGE_FIELD}' file field."
    )))
}

async fn update_settings<C>(
    State(controller): State<Arc<Controller<C>>>,
    Json(update): Json<SettingsUpdate>,
) -> Json<SessionView>
where
    C: DigitizationClient + 'static,
{
    Json(
        controller
            .update_settings(update.background_color, update.clothing_part)
            .await,
    )
}

async fn digitize<C>(State(controller): State<Arc<Controller<C>>>) -> Response
where
    C: DigitizationClient + 'static,
{
    let (view, outcome) = controller.digitize().await;
    let status = match &outcome {
        Ok(()) => StatusCode::OK,
        Err(err) => status_for(err),
    };
    (status, Json(view)).into_response()
}
