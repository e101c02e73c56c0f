//! Multi-step report wizard for signed-in officers.

use axum::{
    extract::{Extension, Multipart, Path},
    http::{header::LOCATION, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::Serialize;
use std::{collections::BTreeMap, sync::Arc};
use tracing::{debug, info};
use utoipa::ToSchema;

use super::read_submission;
use crate::{
    api::{
        error::PortalError,
        session::{with_cookie, BrowserSession},
        state::PortalState,
    },
    report::DeviceReport,
    wizard::{
        fields::{FieldKind, FieldSpec, FieldValue},
        RouteError, StepView, SubmitOutcome,
    },
};

const WIZARD_PATH: &str = "/v1/reports/create";
const DASHBOARD_PATH: &str = "/v1/dashboard";

#[derive(Serialize, ToSchema)]
pub struct ChoiceView {
    pub value: String,
    pub label: String,
}

#[derive(Serialize, ToSchema)]
pub struct FieldView {
    pub name: String,
    pub label: String,
    /// `text`, `long_text`, `email`, `date`, `time`, `choice`, `flag`, `file` or `reference`.
    pub kind: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<ChoiceView>,
}

impl From<&FieldSpec> for FieldView {
    fn from(spec: &FieldSpec) -> Self {
        let (kind, choices) = match spec.kind {
            FieldKind::Text { .. } => ("text", &[][..]),
            FieldKind::LongText => ("long_text", &[][..]),
            FieldKind::Email => ("email", &[][..]),
            FieldKind::Date => ("date", &[][..]),
            FieldKind::Time => ("time", &[][..]),
            FieldKind::Choice(choices) => ("choice", choices),
            FieldKind::Flag => ("flag", &[][..]),
            FieldKind::Attachment => ("file", &[][..]),
            FieldKind::Reference => ("reference", &[][..]),
        };
        Self {
            name: spec.name.to_string(),
            label: spec.label.to_string(),
            kind: kind.to_string(),
            required: spec.required,
            choices: choices
                .iter()
                .map(|(value, label)| ChoiceView {
                    value: (*value).to_string(),
                    label: (*label).to_string(),
                })
                .collect(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct StepResponse {
    pub step: usize,
    pub total_steps: usize,
    pub title: String,
    pub fields: Vec<FieldView>,
    /// Values accepted earlier for this step, for re-display.
    #[schema(value_type = Object)]
    pub values: BTreeMap<String, FieldValue>,
}

impl From<StepView> for StepResponse {
    fn from(view: StepView) -> Self {
        Self {
            step: view.step.number,
            total_steps: view.total_steps,
            title: view.step.title.to_string(),
            fields: view.step.fields.iter().map(FieldView::from).collect(),
            values: view.values,
        }
    }
}

fn step_path(step: usize) -> String {
    format!("{WIZARD_PATH}/{step}")
}

/// Steps out of range go back to the dashboard; skipped steps go to the
/// first incomplete one.
fn route_redirect(err: &RouteError) -> Redirect {
    match err {
        RouteError::OutOfRange(_) => Redirect::to(DASHBOARD_PATH),
        RouteError::StepUnavailable { expected, .. } => Redirect::to(&step_path(*expected)),
    }
}

#[utoipa::path(
    get,
    path = "/v1/reports/create/{step}",
    params(("step" = usize, Path, description = "1-based wizard step")),
    responses(
        (status = 200, description = "Step definition and accepted values.", body = StepResponse),
        (status = 303, description = "Step not reachable yet; redirected."),
        (status = 401, description = "Authentication required"),
    ),
    tag = "reports"
)]
/// Enters a wizard step. Entering step 1 starts a new report.
pub async fn enter_step(
    Path(step): Path<usize>,
    headers: HeaderMap,
    state: Extension<Arc<PortalState>>,
) -> Result<Response, PortalError> {
    let mut session = BrowserSession::load(&state, &headers).await?;
    session.require_officer(&state).await?;

    let entered = state.wizard().enter(&mut session.data.wizard, step);
    let cookie = session.persist(&state).await?;

    let response = match entered {
        Ok(view) => Json(StepResponse::from(view)).into_response(),
        Err(err) => {
            debug!("wizard navigation refused: {err}");
            route_redirect(&err).into_response()
        }
    };
    Ok(with_cookie(cookie, response))
}

#[utoipa::path(
    post,
    path = "/v1/reports/create/{step}",
    params(("step" = usize, Path, description = "1-based wizard step")),
    request_body(content = String, content_type = "multipart/form-data", description = "Fields of the step; files as file parts."),
    responses(
        (status = 201, description = "Final step accepted; the report was created.", body = DeviceReport),
        (status = 303, description = "Step accepted; continue with the next one."),
        (status = 401, description = "Authentication required"),
        (status = 403, description = "Officer is not attached to a station."),
        (status = 409, description = "This IMEI has already been reported."),
        (status = 422, description = "Field errors for the step."),
    ),
    tag = "reports"
)]
/// Submits a wizard step. Nothing is stored until the last step commits.
pub async fn submit_step(
    Path(step): Path<usize>,
    headers: HeaderMap,
    state: Extension<Arc<PortalState>>,
    multipart: Multipart,
) -> Result<Response, PortalError> {
    let mut session = BrowserSession::load(&state, &headers).await?;
    let principal = session.require_officer(&state).await?;
    let submission = read_submission(multipart).await?;

    let outcome = state
        .wizard()
        .submit(&mut session.data.wizard, step, &submission, &principal)
        .await;
    let cookie = session.persist(&state).await?;

    let response = match outcome {
        Err(err) => {
            debug!("wizard submission refused: {err}");
            route_redirect(&err).into_response()
        }
        Ok(SubmitOutcome::Invalid { errors, .. }) => {
            PortalError::Validation(errors).into_response()
        }
        Ok(SubmitOutcome::Advanced { next }) => Redirect::to(&step_path(next)).into_response(),
        Ok(SubmitOutcome::Committed(report)) => {
            info!(report_id = %report.id, officer = %principal.username, "report created");
            let mut response = (StatusCode::CREATED, Json(&report)).into_response();
            if let Ok(location) = HeaderValue::from_str(&format!("/v1/reports/{}", report.id)) {
                response.headers_mut().insert(LOCATION, location);
            }
            response
        }
        Ok(SubmitOutcome::CommitFailed { error, .. }) => PortalError::from(error).into_response(),
    };
    Ok(with_cookie(cookie, response))
}
