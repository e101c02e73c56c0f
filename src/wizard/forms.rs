//! Field tables for the officer report wizard and the public report form.

use super::{
    fields::{FieldSpec, Validator},
    StepDefinition, WizardDefinition,
};

pub const INCIDENT_TYPES: &[(&str, &str)] = &[
    ("Snatching", "Snatching (in transit)"),
    ("Robbery", "Armed Robbery"),
    ("Burglary", "Burglary (house/office)"),
    ("Lost", "Misplaced / Lost"),
    ("Pickpocketing", "Pickpocketing"),
    ("Other", "Other"),
];

/// Fields accepted by the wizard but never persisted.
pub const WIZARD_ONLY_FIELDS: &[&str] = &["terms"];

const DEVICE_IDENTIFIER: &[Validator] = &[Validator::DeviceIdentifier];

pub const OWNER_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("owner_full_name", "Full Name", 255).required("Please enter your full name."),
    FieldSpec::text("owner_phone_number", "Phone Number", 20)
        .required("Please enter your phone number."),
    FieldSpec::email("owner_email", "Email Address (Optional)"),
    FieldSpec::long_text("owner_address", "Address"),
];

pub const DEVICE_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("brand", "Device Brand", 100).required("Please enter the device brand."),
    FieldSpec::text("model", "Device Model Number", 100).required("Please enter the device model."),
    FieldSpec::text("color", "Device Color", 50),
    FieldSpec::text("device_phone_number", "Device Phone Number (Last Used)", 20),
];

pub const INCIDENT_FIELDS: &[FieldSpec] = &[
    FieldSpec::date("incident_date", "Date of Incident").required("Please select the incident date."),
    FieldSpec::time("incident_time", "Time of Incident").required("Please select the incident time."),
    FieldSpec::choice("incident_type", "Type of Incident", INCIDENT_TYPES)
        .required("Please select an incident type."),
    FieldSpec::long_text("incident_location", "Last Seen Location / Address"),
];

pub const VERIFICATION_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("imei", "IMEI Number", 15)
        .required("IMEI number is required.")
        .validated_by(DEVICE_IDENTIFIER),
    FieldSpec::attachment("police_report_image", "Police Report")
        .required("Police report is required."),
    FieldSpec::attachment("device_carton_photo", "Device Carton / Box Photo")
        .required("Carton photo is required."),
    FieldSpec::attachment("device_receipt", "Device Receipt (Optional)"),
    FieldSpec::text("transaction_ref", "Transaction Reference", 100)
        .required("Transaction reference is required."),
    FieldSpec::flag(
        "terms",
        "I confirm the details are accurate and agree to the Terms & Conditions.",
    )
    .required("You must agree to continue."),
];

const REPORT_STEPS: &[StepDefinition] = &[
    StepDefinition {
        number: 1,
        title: "Owner Information",
        fields: OWNER_FIELDS,
    },
    StepDefinition {
        number: 2,
        title: "Device Information",
        fields: DEVICE_FIELDS,
    },
    StepDefinition {
        number: 3,
        title: "Incident Information",
        fields: INCIDENT_FIELDS,
    },
    StepDefinition {
        number: 4,
        title: "Proofs & Verification",
        fields: VERIFICATION_FIELDS,
    },
];

/// The four-step officer report wizard.
#[must_use]
pub fn report_wizard() -> WizardDefinition {
    WizardDefinition::new(REPORT_STEPS)
}

/// Self-service report form submitted by device owners.
///
/// `incident_state` is the station (state command) that should handle the
/// report.
pub const PUBLIC_REPORT_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("owner_full_name", "Full Name", 255).required("Please enter your full name."),
    FieldSpec::text("owner_phone_number", "Phone Number", 20)
        .required("Please enter your phone number."),
    FieldSpec::email("owner_email", "Email Address").required("Please enter your email address."),
    FieldSpec::long_text("owner_address", "Residential Address"),
    FieldSpec::text("imei", "IMEI Number", 15)
        .required("IMEI number is required.")
        .validated_by(DEVICE_IDENTIFIER),
    FieldSpec::text("brand", "Device Brand", 100).required("Please enter the device brand."),
    FieldSpec::text("model", "Device Model Number", 100).required("Please enter the device model."),
    FieldSpec::date("incident_date", "Date of Incident").required("Please select the incident date."),
    FieldSpec::long_text("incident_description", "What happened?"),
    FieldSpec::reference("incident_state", "State of Incident").required("Please select a state."),
    FieldSpec::attachment("owner_id_proof", "Owner's Passport / ID").required("ID proof is required."),
    FieldSpec::attachment("device_receipt", "Device Receipt (Optional)"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wizard::fields::{validate_fields, FieldError, Submission};

    fn declares_device_identifier(fields: &[FieldSpec]) -> bool {
        fields
            .iter()
            .any(|spec| spec.validators.contains(&Validator::DeviceIdentifier))
    }

    #[test]
    fn wizard_has_four_ordered_steps() {
        let wizard = report_wizard();
        assert_eq!(wizard.len(), 4);
        for (index, step) in REPORT_STEPS.iter().enumerate() {
            assert_eq!(step.number, index + 1);
        }
    }

    #[test]
    fn field_names_are_unique_across_steps() {
        let mut names: Vec<&str> = REPORT_STEPS
            .iter()
            .flat_map(|step| step.fields.iter().map(|spec| spec.name))
            .collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn every_form_with_an_imei_rejects_malformed_values() {
        let forms: Vec<&[FieldSpec]> = REPORT_STEPS
            .iter()
            .map(|step| step.fields)
            .chain(std::iter::once(PUBLIC_REPORT_FIELDS))
            .filter(|fields| declares_device_identifier(fields))
            .collect();
        assert_eq!(forms.len(), 2);

        for fields in forms {
            for bad in ["12345678901234", "1234567890123456", "12345678901234x", "abcdefghijklmno"] {
                let submission = Submission::new().with_field("imei", bad);
                let errors = validate_fields(fields, &submission).err();
                assert_eq!(
                    errors.as_ref().and_then(|e| e.get("imei")).and_then(|e| e.first()),
                    Some(&FieldError::InvalidFormat("IMEI must be a 15-digit number.")),
                    "{bad} must be rejected"
                );
            }
        }
    }

    #[test]
    fn incident_type_rejects_unknown_choice() {
        let submission = Submission::new()
            .with_field("incident_date", "2024-05-05")
            .with_field("incident_time", "08:15")
            .with_field("incident_type", "Alien Abduction");
        let errors = validate_fields(INCIDENT_FIELDS, &submission).err();
        assert!(matches!(
            errors.as_ref().and_then(|e| e.get("incident_type")).and_then(|e| e.first()),
            Some(FieldError::InvalidChoice(value)) if value == "Alien Abduction"
        ));
    }
}
