use super::handlers::{
    admin, auth, health, lookup, payments, public_report, reports, wizard,
};
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Router that both serves the documented endpoints and produces the `OpenAPI`
/// document. Routes added in `api::app` (like `OPTIONS /health`) are not documented.
pub(crate) fn api_router() -> OpenApiRouter {
    OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(lookup::lookup))
        .routes(routes!(lookup::alert))
        .routes(routes!(lookup::stations))
        .routes(routes!(auth::login))
        .routes(routes!(auth::verify))
        .routes(routes!(auth::logout))
        .routes(routes!(auth::session))
        .routes(routes!(reports::dashboard))
        .routes(routes!(reports::list_reports))
        .routes(routes!(reports::report_detail))
        .routes(routes!(reports::review_report))
        .routes(routes!(wizard::enter_step, wizard::submit_step))
        .routes(routes!(public_report::submit_public_report))
        .routes(routes!(payments::verify_payment))
        .routes(routes!(admin::seed))
}

fn tags() -> Vec<Tag> {
    let mut public_tag = Tag::new("public");
    public_tag.description = Some("Device lookup, sighting alerts and self-service reports".to_string());

    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Officer sign-in with a one-time code".to_string());

    let mut reports_tag = Tag::new("reports");
    reports_tag.description = Some("Station dashboard, review and the report wizard".to_string());

    let mut admin_tag = Tag::new("admin");
    admin_tag.description = Some("Superuser maintenance".to_string());

    vec![public_tag, auth_tag, reports_tag, admin_tag]
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();

    OpenApiBuilder::new().info(info).tags(Some(tags())).build()
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn non_empty(value: &str) -> Option<&str> {
    (!value.is_empty()).then_some(value)
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    match author.find('<') {
        Some(start) => {
            let name = author[..start].trim();
            let email = author[start + 1..].trim_end_matches('>').trim();
            (non_empty(name), non_empty(email))
        }
        None => (non_empty(author.trim()), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let spec = openapi();
        assert_eq!(spec.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(spec.info.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(
            spec.info.description.as_deref(),
            Some(env!("CARGO_PKG_DESCRIPTION"))
        );

        let contact = spec.info.contact;
        assert!(contact.is_some());
        if let Some(contact) = contact {
            assert_eq!(contact.name.as_deref(), Some("Team SafeIMEI"));
            assert_eq!(contact.email.as_deref(), Some("team@safeimei.ng"));
        }

        let license = spec.info.license;
        assert!(license.is_some());
        if let Some(license) = license {
            assert_eq!(license.name, "BSD-3-Clause");
            assert_eq!(license.identifier.as_deref(), Some("BSD-3-Clause"));
        }
    }

    #[test]
    fn every_portal_route_is_documented() {
        let spec = openapi();
        let tags = spec.tags.clone().unwrap_or_default();
        for tag in ["public", "auth", "reports", "admin"] {
            assert!(tags.iter().any(|t| t.name == tag), "missing tag {tag}");
        }
        for path in [
            "/health",
            "/v1/lookup",
            "/v1/alerts",
            "/v1/stations",
            "/v1/auth/login",
            "/v1/auth/verify",
            "/v1/auth/logout",
            "/v1/auth/session",
            "/v1/dashboard",
            "/v1/reports",
            "/v1/reports/{id}",
            "/v1/reports/{id}/review",
            "/v1/reports/create/{step}",
            "/v1/public/reports",
            "/v1/payments/verify",
            "/v1/admin/seed",
        ] {
            assert!(spec.paths.paths.contains_key(path), "missing path {path}");
        }
    }

    #[test]
    fn parse_author_splits_name_and_email() {
        assert_eq!(
            parse_author("Team SafeIMEI <team@safeimei.ng>"),
            (Some("Team SafeIMEI"), Some("team@safeimei.ng"))
        );
        assert_eq!(parse_author("Solo"), (Some("Solo"), None));
        assert_eq!(parse_author("<>"), (None, None));
    }
}
