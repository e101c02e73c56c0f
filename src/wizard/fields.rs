//! Declarative field tables and the generic validation routine.
//!
//! A form is a static slice of `FieldSpec`. `validate_fields` checks every
//! field independently and reports all errors at once; it never touches the
//! session or storage.

use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use uuid::Uuid;

pub const MAX_ATTACHMENT_BYTES: usize = 5 * 1024 * 1024;
pub const ALLOWED_ATTACHMENT_TYPES: &[&str] = &["image/jpeg", "image/png", "application/pdf"];
pub const DEVICE_IDENTIFIER_LEN: usize = 15;

const DEFAULT_REQUIRED_MESSAGE: &str = "This field is required.";
const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMATS: &[&str] = &["%H:%M", "%H:%M:%S"];
const FLAG_TRUE_VALUES: &[&str] = &["on", "true", "1", "yes"];

/// Semantic type of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Text { max_len: usize },
    LongText,
    Email,
    Date,
    Time,
    /// `(value, label)` pairs.
    Choice(&'static [(&'static str, &'static str)]),
    Flag,
    Attachment,
    /// Identifier of another record (UUID).
    Reference,
}

/// Extra checks applied after the kind-level parse.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Validator {
    /// Exactly 15 ASCII digits.
    DeviceIdentifier,
    /// At most `MAX_ATTACHMENT_BYTES`.
    AttachmentSize,
    /// One of `ALLOWED_ATTACHMENT_TYPES`.
    AttachmentType,
}

const ATTACHMENT_VALIDATORS: &[Validator] = &[Validator::AttachmentSize, Validator::AttachmentType];

#[derive(Clone, Copy, Debug)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub validators: &'static [Validator],
    pub required_message: Option<&'static str>,
}

impl FieldSpec {
    const fn new(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            label,
            kind,
            required: false,
            validators: &[],
            required_message: None,
        }
    }

    #[must_use]
    pub const fn text(name: &'static str, label: &'static str, max_len: usize) -> Self {
        Self::new(name, label, FieldKind::Text { max_len })
    }

    #[must_use]
    pub const fn long_text(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldKind::LongText)
    }

    #[must_use]
    pub const fn email(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldKind::Email)
    }

    #[must_use]
    pub const fn date(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldKind::Date)
    }

    #[must_use]
    pub const fn time(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldKind::Time)
    }

    #[must_use]
    pub const fn choice(
        name: &'static str,
        label: &'static str,
        choices: &'static [(&'static str, &'static str)],
    ) -> Self {
        Self::new(name, label, FieldKind::Choice(choices))
    }

    #[must_use]
    pub const fn flag(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldKind::Flag)
    }

    /// File upload with the size and type validators attached.
    #[must_use]
    pub const fn attachment(name: &'static str, label: &'static str) -> Self {
        Self {
            validators: ATTACHMENT_VALIDATORS,
            ..Self::new(name, label, FieldKind::Attachment)
        }
    }

    #[must_use]
    pub const fn reference(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldKind::Reference)
    }

    #[must_use]
    pub const fn required(self, message: &'static str) -> Self {
        Self {
            required: true,
            required_message: Some(message),
            ..self
        }
    }

    #[must_use]
    pub const fn validated_by(self, validators: &'static [Validator]) -> Self {
        Self { validators, ..self }
    }

    #[must_use]
    pub fn is_attachment(&self) -> bool {
        matches!(self.kind, FieldKind::Attachment)
    }

    fn required_message(&self) -> &'static str {
        self.required_message.unwrap_or(DEFAULT_REQUIRED_MESSAGE)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FieldError {
    #[error("{0}")]
    Required(&'static str),
    #[error("Ensure this value has at most {max} characters (it has {actual}).")]
    TooLong { max: usize, actual: usize },
    #[error("{0}")]
    InvalidFormat(&'static str),
    #[error("Select a valid choice. {0} is not one of the available choices.")]
    InvalidChoice(String),
    #[error("File size must be under 5MB.")]
    TooLarge,
    #[error("Unsupported file type. Use JPEG, PNG, or PDF.")]
    UnsupportedType,
}

/// Errors for a whole form, keyed by field name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<String, Vec<FieldError>>);

impl FieldErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn single(field: &str, error: FieldError) -> Self {
        let mut errors = Self::new();
        errors.push(field, error);
        errors
    }

    pub fn push(&mut self, field: &str, error: FieldError) {
        self.0.entry(field.to_string()).or_default().push(error);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&[FieldError]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Render as `{field: [message, ..]}` for responses.
    #[must_use]
    pub fn to_messages(&self) -> BTreeMap<String, Vec<String>> {
        self.0
            .iter()
            .map(|(field, errors)| {
                (
                    field.clone(),
                    errors.iter().map(ToString::to_string).collect(),
                )
            })
            .collect()
    }
}

/// Validated, session-storable value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Flag(bool),
    Reference(Uuid),
    /// Optional field left empty.
    Blank,
}

impl FieldValue {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }
}

/// An uploaded file as received from a multipart body.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub field: String,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for UploadedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadedFile")
            .field("field", &self.field)
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Raw form input for one request.
#[derive(Clone, Debug, Default)]
pub struct Submission {
    fields: HashMap<String, String>,
    files: HashMap<String, UploadedFile>,
}

impl Submission {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_field(mut self, name: &str, value: &str) -> Self {
        self.insert_field(name, value.to_string());
        self
    }

    #[must_use]
    pub fn with_file(mut self, file: UploadedFile) -> Self {
        self.insert_file(file);
        self
    }

    pub fn insert_field(&mut self, name: &str, value: String) {
        self.fields.insert(name.to_string(), value);
    }

    /// Empty parts (no file chosen in the browser) are ignored.
    pub fn insert_file(&mut self, file: UploadedFile) {
        if file.bytes.is_empty() && file.file_name.is_empty() {
            return;
        }
        self.files.insert(file.field.clone(), file);
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Output of a successful validation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidatedStep {
    pub fields: BTreeMap<String, FieldValue>,
    pub attachments: Vec<UploadedFile>,
}

fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

#[must_use]
pub fn is_device_identifier(value: &str) -> bool {
    value.len() == DEVICE_IDENTIFIER_LEN && value.bytes().all(|b| b.is_ascii_digit())
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    TIME_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(value, format).ok())
}

fn parse_value(spec: &FieldSpec, raw: &str) -> Result<FieldValue, FieldError> {
    match spec.kind {
        FieldKind::Text { max_len } => {
            let actual = raw.chars().count();
            if actual > max_len {
                Err(FieldError::TooLong {
                    max: max_len,
                    actual,
                })
            } else {
                Ok(FieldValue::Text(raw.to_string()))
            }
        }
        FieldKind::LongText => Ok(FieldValue::Text(raw.to_string())),
        FieldKind::Email => {
            if valid_email(raw) {
                Ok(FieldValue::Text(raw.to_string()))
            } else {
                Err(FieldError::InvalidFormat("Enter a valid email address."))
            }
        }
        FieldKind::Date => NaiveDate::parse_from_str(raw, DATE_FORMAT)
            .map(FieldValue::Date)
            .map_err(|_| FieldError::InvalidFormat("Enter a valid date.")),
        FieldKind::Time => parse_time(raw)
            .map(FieldValue::Time)
            .ok_or(FieldError::InvalidFormat("Enter a valid time.")),
        FieldKind::Choice(choices) => {
            if choices.iter().any(|(value, _)| *value == raw) {
                Ok(FieldValue::Text(raw.to_string()))
            } else {
                Err(FieldError::InvalidChoice(raw.to_string()))
            }
        }
        FieldKind::Flag => Ok(FieldValue::Flag(
            FLAG_TRUE_VALUES.contains(&raw.to_ascii_lowercase().as_str()),
        )),
        FieldKind::Reference => Uuid::parse_str(raw)
            .map(FieldValue::Reference)
            .map_err(|_| FieldError::InvalidFormat("Select a valid choice.")),
        // Attachments never come through the text path.
        FieldKind::Attachment => Ok(FieldValue::Blank),
    }
}

fn run_text_validators(spec: &FieldSpec, value: &FieldValue, errors: &mut Vec<FieldError>) {
    for validator in spec.validators {
        if *validator == Validator::DeviceIdentifier {
            let valid = value.as_text().is_some_and(is_device_identifier);
            if !valid {
                errors.push(FieldError::InvalidFormat("IMEI must be a 15-digit number."));
            }
        }
    }
}

fn run_file_validators(spec: &FieldSpec, file: &UploadedFile, errors: &mut Vec<FieldError>) {
    for validator in spec.validators {
        match validator {
            Validator::AttachmentSize if file.bytes.len() > MAX_ATTACHMENT_BYTES => {
                errors.push(FieldError::TooLarge);
            }
            Validator::AttachmentType
                if !ALLOWED_ATTACHMENT_TYPES.contains(&file.content_type.as_str()) =>
            {
                errors.push(FieldError::UnsupportedType);
            }
            _ => {}
        }
    }
}

/// Validate `submission` against `specs`.
///
/// Every field is checked; the result carries either all parsed values or
/// every error found.
///
/// # Errors
/// Returns the per-field error map when any field fails.
pub fn validate_fields(
    specs: &[FieldSpec],
    submission: &Submission,
) -> Result<ValidatedStep, FieldErrors> {
    let mut validated = ValidatedStep::default();
    let mut errors = FieldErrors::new();

    for spec in specs {
        let mut field_errors = Vec::new();

        if spec.is_attachment() {
            match submission.files.get(spec.name) {
                Some(file) => {
                    run_file_validators(spec, file, &mut field_errors);
                    if field_errors.is_empty() {
                        validated.attachments.push(file.clone());
                    }
                }
                None if spec.required => {
                    field_errors.push(FieldError::Required(spec.required_message()));
                }
                None => {}
            }
        } else {
            let raw = submission.field(spec.name).map_or("", str::trim);
            let blank = raw.is_empty() || (spec.kind == FieldKind::Flag && !is_truthy(raw));
            if blank {
                if spec.required {
                    field_errors.push(FieldError::Required(spec.required_message()));
                } else {
                    let value = if spec.kind == FieldKind::Flag {
                        FieldValue::Flag(false)
                    } else {
                        FieldValue::Blank
                    };
                    validated.fields.insert(spec.name.to_string(), value);
                }
            } else {
                match parse_value(spec, raw) {
                    Ok(value) => {
                        run_text_validators(spec, &value, &mut field_errors);
                        if field_errors.is_empty() {
                            validated.fields.insert(spec.name.to_string(), value);
                        }
                    }
                    Err(err @ FieldError::TooLong { .. }) => {
                        // Validators still judge overlong text.
                        let value = FieldValue::Text(raw.to_string());
                        run_text_validators(spec, &value, &mut field_errors);
                        field_errors.push(err);
                    }
                    Err(err) => field_errors.push(err),
                }
            }
        }

        for error in field_errors {
            errors.push(spec.name, error);
        }
    }

    if errors.is_empty() {
        Ok(validated)
    } else {
        Err(errors)
    }
}

fn is_truthy(raw: &str) -> bool {
    FLAG_TRUE_VALUES.contains(&raw.to_ascii_lowercase().as_str())
}
