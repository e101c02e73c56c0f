//! Multi-step report wizard.
//!
//! Flow Overview:
//! 1) `enter(k)` shows step `k`. Entering step 1 always starts a fresh report.
//! 2) `submit(k)` validates step `k`. Valid input is merged into the session
//!    accumulator and the wizard moves on; invalid input changes nothing.
//! 3) A valid final step hands the accumulator plus the final step's fields to
//!    the `Materializer`. Success clears the wizard; failure keeps the
//!    accumulator so only the final step must be resubmitted.
//!
//! State lives in the caller's `SessionData`. Two tabs on one session race and
//! the last write wins.

pub mod fields;
pub mod forms;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::{
    auth::Principal,
    report::{
        materializer::{MaterializeError, Materializer},
        DeviceReport,
    },
};
use fields::{validate_fields, FieldErrors, FieldSpec, FieldValue, Submission};

/// One page of the wizard.
#[derive(Debug)]
pub struct StepDefinition {
    pub number: usize,
    pub title: &'static str,
    pub fields: &'static [FieldSpec],
}

/// Ordered, fixed sequence of steps.
#[derive(Clone, Copy, Debug)]
pub struct WizardDefinition {
    steps: &'static [StepDefinition],
}

impl WizardDefinition {
    #[must_use]
    pub const fn new(steps: &'static [StepDefinition]) -> Self {
        Self { steps }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step by 1-based number.
    #[must_use]
    pub fn step(&self, number: usize) -> Option<&'static StepDefinition> {
        number.checked_sub(1).and_then(|index| self.steps.get(index))
    }
}

/// Wizard progress kept in the session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WizardState {
    /// Highest step the user may submit next; steps below it are complete.
    step: usize,
    accumulator: BTreeMap<String, FieldValue>,
}

impl WizardState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            step: 1,
            accumulator: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn step(&self) -> usize {
        self.step
    }

    #[must_use]
    pub fn completed_steps(&self) -> usize {
        self.step.saturating_sub(1)
    }

    #[must_use]
    pub fn accumulator(&self) -> &BTreeMap<String, FieldValue> {
        &self.accumulator
    }
}

impl Default for WizardState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("wizard step {0} does not exist")]
    OutOfRange(usize),
    #[error("wizard step {requested} is not available; continue at step {expected}")]
    StepUnavailable { requested: usize, expected: usize },
}

/// What a step page needs to render.
#[derive(Debug)]
pub struct StepView {
    pub step: &'static StepDefinition,
    pub total_steps: usize,
    /// Previously accepted values for this step's fields.
    pub values: BTreeMap<String, FieldValue>,
}

#[derive(Debug)]
pub enum SubmitOutcome {
    /// Validation failed; nothing changed.
    Invalid { step: usize, errors: FieldErrors },
    /// Step accepted; continue at `next`.
    Advanced { next: usize },
    /// Final step accepted and the report was created.
    Committed(DeviceReport),
    /// Final step was valid but the report could not be created.
    CommitFailed {
        step: usize,
        error: MaterializeError,
    },
}

pub struct WizardController {
    definition: WizardDefinition,
    materializer: Materializer,
}

impl WizardController {
    #[must_use]
    pub fn new(definition: WizardDefinition, materializer: Materializer) -> Self {
        Self {
            definition,
            materializer,
        }
    }

    #[must_use]
    pub fn definition(&self) -> &WizardDefinition {
        &self.definition
    }

    fn route(&self, requested: usize) -> Result<&'static StepDefinition, RouteError> {
        self.definition
            .step(requested)
            .ok_or(RouteError::OutOfRange(requested))
    }

    /// Navigate to step `requested`.
    ///
    /// # Errors
    /// `OutOfRange` for unknown steps, `StepUnavailable` when earlier steps
    /// are still incomplete. Neither mutates `wizard`.
    pub fn enter(
        &self,
        wizard: &mut Option<WizardState>,
        requested: usize,
    ) -> Result<StepView, RouteError> {
        let step = self.route(requested)?;

        if requested == 1 {
            *wizard = Some(WizardState::new());
        }
        let state = wizard.as_ref().ok_or(RouteError::StepUnavailable {
            requested,
            expected: 1,
        })?;
        if requested > state.step {
            return Err(RouteError::StepUnavailable {
                requested,
                expected: state.step,
            });
        }

        let values = step
            .fields
            .iter()
            .filter_map(|spec| {
                state
                    .accumulator
                    .get(spec.name)
                    .map(|value| (spec.name.to_string(), value.clone()))
            })
            .collect();

        Ok(StepView {
            step,
            total_steps: self.definition.len(),
            values,
        })
    }

    /// Validate and apply a submission for step `requested`.
    ///
    /// # Errors
    /// Routing errors as for [`Self::enter`]. Validation and commit failures
    /// are outcomes, not errors.
    pub async fn submit(
        &self,
        wizard: &mut Option<WizardState>,
        requested: usize,
        submission: &Submission,
        principal: &Principal,
    ) -> Result<SubmitOutcome, RouteError> {
        let step = self.route(requested)?;

        let expected = wizard.as_ref().map_or(1, WizardState::step);
        if requested > expected {
            return Err(RouteError::StepUnavailable {
                requested,
                expected,
            });
        }

        let validated = match validate_fields(step.fields, submission) {
            Ok(validated) => validated,
            Err(errors) => {
                return Ok(SubmitOutcome::Invalid {
                    step: requested,
                    errors,
                })
            }
        };

        let state = wizard.get_or_insert_with(WizardState::new);

        if requested < self.definition.len() {
            state.accumulator.extend(validated.fields);
            state.step = state.step.max(requested + 1);
            return Ok(SubmitOutcome::Advanced {
                next: requested + 1,
            });
        }

        let mut combined = state.accumulator.clone();
        combined.extend(validated.fields);

        match self
            .materializer
            .materialize(&combined, validated.attachments, principal)
            .await
        {
            Ok(report) => {
                *wizard = None;
                Ok(SubmitOutcome::Committed(report))
            }
            Err(error) => Ok(SubmitOutcome::CommitFailed {
                step: requested,
                error,
            }),
        }
    }
}
