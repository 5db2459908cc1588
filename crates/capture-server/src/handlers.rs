//! HTTP Handlers

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Form, Json,
};
use capture_billing::{Access, CheckoutRequest, Outcome};
use capture_core::{
    create_signup_venue, ContactInfo, CoreError, Lead, LeadId, LeadSource, Venue, VenueLookup,
};
use capture_notify::email;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::pages::{self, LeadStats};
use crate::session::{self, with_cookie, CurrentVenue};
use crate::state::{AppState, Billing};

/// Leads shown on the dashboard and returned by the API
pub const RECENT_LEADS_LIMIT: usize = 100;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &str, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.into(),
        }),
    )
}

fn payments_disabled() -> ApiError {
    api_error(StatusCode::SERVICE_UNAVAILABLE, "PAYMENTS_DISABLED", "Payments not configured")
}

fn storage_error(e: &CoreError) -> ApiError {
    tracing::error!("Store error: {}", e);
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", e.user_message())
}

fn storage_error_page(e: &CoreError) -> Response {
    tracing::error!("Store error: {}", e);
    pages::error_page(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Something went wrong",
        &e.user_message(),
    )
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub outcome: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub success: bool,
    pub message: String,
}

/// Lead as exposed by the JSON API
#[derive(Debug, Serialize)]
pub struct LeadResponse {
    pub id: LeadId,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub source: LeadSource,
    pub created_at: DateTime<Utc>,
}

impl From<Lead> for LeadResponse {
    fn from(lead: Lead) -> Self {
        Self {
            id: lead.id,
            name: lead.name,
            email: lead.email,
            phone: lead.phone,
            source: lead.source,
            created_at: lead.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: &'static str,
    pub venues: u64,
    pub leads: u64,
    pub stripe_enabled: bool,
    pub mail: &'static str,
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct SignupForm {
    #[serde(default)]
    pub venue_name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
}

/// Missing fields keep their current value
#[derive(Debug, Default, Deserialize)]
pub struct SettingsForm {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub welcome_message: Option<String>,
    pub thank_you_message: Option<String>,
    pub primary_color: Option<String>,
}

// ============================================================================
// Marketing Pages
// ============================================================================

pub async fn home() -> Html<String> {
    pages::home()
}

pub async fn pricing(State(state): State<AppState>) -> Html<String> {
    let trial_days = state
        .billing
        .as_ref()
        .and_then(|b| u32::try_from(b.trial.num_days()).ok());
    pages::pricing(trial_days)
}

pub async fn about() -> Html<String> {
    pages::about()
}

pub async fn privacy() -> Html<String> {
    pages::privacy()
}

pub async fn terms() -> Html<String> {
    pages::terms()
}

// ============================================================================
// Signup
// ============================================================================

pub async fn signup_form(State(state): State<AppState>) -> Html<String> {
    pages::signup_form(None, state.billing.is_some())
}

fn signup_error(status: StatusCode, message: &str) -> Response {
    (status, pages::signup_form(Some(message), true)).into_response()
}

/// Create (or resume) a trialing venue and send the owner to hosted checkout
pub async fn signup(State(state): State<AppState>, Form(form): Form<SignupForm>) -> Response {
    let Some(billing) = state.billing.as_ref() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            pages::signup_form(Some("Card payments are not available right now."), false),
        )
            .into_response();
    };

    let venue_name = form.venue_name.trim();
    let email = form.email.trim();
    if venue_name.is_empty() || email.is_empty() {
        return signup_error(StatusCode::BAD_REQUEST, "Venue name and email required");
    }

    let venue = match state.store.find_venue(VenueLookup::Email(email)).await {
        Ok(Some(existing)) if existing.customer_reference.is_none() => {
            tracing::info!(venue_id = %existing.id, "Resuming unfinished signup");
            existing
        }
        Ok(Some(_)) => {
            return signup_error(
                StatusCode::CONFLICT,
                "An account with that email already exists. Please log in.",
            );
        }
        Ok(None) => match create_venue(&state, billing, venue_name, email).await {
            Ok(venue) => venue,
            Err(CoreError::Validation(msg)) => return signup_error(StatusCode::BAD_REQUEST, &msg),
            Err(CoreError::Duplicate(_)) => {
                return signup_error(
                    StatusCode::CONFLICT,
                    "An account with that email already exists. Please log in.",
                );
            }
            Err(e) => return storage_error_page(&e),
        },
        Err(e) => return storage_error_page(&e),
    };

    match start_checkout(&state, billing, &venue, "/signup/success", "/signup").await {
        Ok(url) => with_cookie(
            Redirect::to(&url).into_response(),
            &state.sessions.login_cookie(venue.id, state.config.is_https()),
        ),
        Err(message) => signup_error(StatusCode::BAD_GATEWAY, &message),
    }
}

async fn create_venue(
    state: &AppState,
    billing: &Billing,
    venue_name: &str,
    email: &str,
) -> capture_core::Result<Venue> {
    let venue = Venue::signup(venue_name, email, billing.trial, Utc::now())?;
    let venue = create_signup_venue(state.store.as_ref(), venue).await?;

    tracing::info!(
        venue_id = %venue.id,
        slug = %venue.slug,
        trial_ends = %venue.current_period_end,
        "Created venue"
    );
    Ok(venue)
}

/// Create a checkout session for `venue`; returns the hosted URL
async fn start_checkout(
    state: &AppState,
    billing: &Billing,
    venue: &Venue,
    success_path: &str,
    cancel_path: &str,
) -> Result<String, String> {
    let request = CheckoutRequest {
        correlation_token: venue.correlation_token.clone(),
        venue_id: venue.id,
        venue_name: venue.name.clone(),
        customer_email: venue.email.clone(),
        success_url: state.config.url(success_path),
        cancel_url: state.config.url(cancel_path),
    };

    billing
        .checkout
        .create_checkout_session(request)
        .await
        .map(|session| session.checkout_url)
        .map_err(|e| {
            tracing::error!(venue_id = %venue.id, "Checkout error: {}", e);
            e.user_message().to_string()
        })
}

pub async fn signup_success(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match session::current_venue(&state, &headers).await {
        Ok(venue) => pages::signup_success(venue.as_ref(), &state.config.base_url).into_response(),
        Err(e) => storage_error_page(&e),
    }
}

// ============================================================================
// Capture
// ============================================================================

/// What customers see after scanning the QR code
pub async fn capture_page(State(state): State<AppState>, Path(slug): Path<String>) -> Response {
    let venue = match state.store.find_venue(VenueLookup::Slug(&slug)).await {
        Ok(Some(venue)) => venue,
        Ok(None) => return pages::not_found(),
        Err(e) => return storage_error_page(&e),
    };

    if !capture_billing::features_enabled(&venue, Utc::now()) {
        return pages::capture_inactive();
    }

    pages::capture_form(&venue).into_response()
}

/// Store a lead and notify the venue owner
pub async fn capture_submit(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Form(contact): Form<ContactInfo>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let venue = state
        .store
        .find_venue(VenueLookup::Slug(&slug))
        .await
        .map_err(|e| storage_error(&e))?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "NOT_FOUND", "Venue not found"))?;

    if !capture_billing::features_enabled(&venue, Utc::now()) {
        return Err(api_error(
            StatusCode::PAYMENT_REQUIRED,
            "SUBSCRIPTION_INACTIVE",
            "Venue subscription inactive",
        ));
    }

    let lead = Lead::capture(venue.id, contact, LeadSource::Qr, Utc::now()).map_err(|e| match e {
        CoreError::Validation(msg) => api_error(StatusCode::BAD_REQUEST, "INVALID_LEAD", msg),
        other => storage_error(&other),
    })?;

    state.store.create_lead(&lead).await.map_err(|e| storage_error(&e))?;

    tracing::info!(venue_id = %venue.id, lead_id = %lead.id, "Captured lead");

    let notification = email::lead_notification(&venue, &lead, &state.config.base_url);
    if let Err(e) = state.notifier.send(&notification).await {
        tracing::error!(venue_id = %venue.id, "Failed to send lead notification: {}", e);
    }

    Ok(Json(SubmitResponse {
        success: true,
        message: venue.thank_you_message,
    }))
}

// ============================================================================
// Login
// ============================================================================

pub async fn login_form() -> Html<String> {
    pages::login_form(None)
}

pub async fn login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Response {
    let email = form.email.trim();
    if email.is_empty() {
        return (StatusCode::BAD_REQUEST, pages::login_form(Some("Please enter your email"))).into_response();
    }

    match state.store.find_venue(VenueLookup::Email(email)).await {
        Ok(Some(venue)) => {
            tracing::info!(venue_id = %venue.id, "Venue logged in");
            with_cookie(
                Redirect::to("/dashboard").into_response(),
                &state.sessions.login_cookie(venue.id, state.config.is_https()),
            )
        }
        Ok(None) => (
            StatusCode::UNAUTHORIZED,
            pages::login_form(Some("No account found with that email. Please sign up first.")),
        )
            .into_response(),
        Err(e) => storage_error_page(&e),
    }
}

pub async fn logout() -> Response {
    with_cookie(Redirect::to("/").into_response(), &session::logout_cookie())
}

// ============================================================================
// Dashboard
// ============================================================================

fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .with_day(1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map_or(now, |naive| naive.and_utc())
}

pub async fn dashboard(State(state): State<AppState>, CurrentVenue(venue): CurrentVenue) -> Response {
    let now = Utc::now();
    let access = Access::evaluate(&venue, now);
    if !access.is_enabled() {
        return pages::dashboard_inactive(&venue, access);
    }

    let stats = async {
        let leads = state.store.recent_leads(venue.id, Some(RECENT_LEADS_LIMIT)).await?;
        let total = state.store.count_leads(Some(venue.id), None).await?;
        let this_month = state
            .store
            .count_leads(Some(venue.id), Some(start_of_month(now)))
            .await?;
        Ok::<_, CoreError>((leads, LeadStats { total, this_month }))
    }
    .await;

    match stats {
        Ok((leads, stats)) => {
            pages::dashboard(&venue, &leads, &stats, access, &state.config.base_url).into_response()
        }
        Err(e) => storage_error_page(&e),
    }
}

pub async fn settings_form(CurrentVenue(venue): CurrentVenue) -> Html<String> {
    pages::settings(&venue, None, None)
}

/// Update the customer-facing profile; billing fields are out of reach here
pub async fn update_settings(
    State(state): State<AppState>,
    CurrentVenue(venue): CurrentVenue,
    Form(form): Form<SettingsForm>,
) -> Response {
    let mut profile = venue.profile();
    if let Some(name) = form.name {
        profile.name = name;
    }
    if let Some(phone) = form.phone {
        profile.phone = Some(phone).filter(|p| !p.trim().is_empty());
    }
    if let Some(welcome) = form.welcome_message {
        profile.welcome_message = welcome;
    }
    if let Some(thanks) = form.thank_you_message {
        profile.thank_you_message = thanks;
    }
    if let Some(color) = form.primary_color {
        profile.primary_color = color;
    }

    let profile = match profile.validated() {
        Ok(profile) => profile,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                pages::settings(&venue, None, Some(e.user_message().as_str())),
            )
                .into_response();
        }
    };

    match state.store.update_venue_profile(venue.id, &profile).await {
        Ok(updated) => {
            tracing::info!(venue_id = %updated.id, "Updated venue settings");
            pages::settings(&updated, Some("Settings saved!"), None).into_response()
        }
        Err(e) => storage_error_page(&e),
    }
}

/// Stripe billing portal, or a fresh checkout if the venue never finished one
pub async fn billing_portal(State(state): State<AppState>, CurrentVenue(venue): CurrentVenue) -> Response {
    let Some(billing) = state.billing.as_ref() else {
        return pages::error_page(
            StatusCode::SERVICE_UNAVAILABLE,
            "Billing unavailable",
            "Payments are not configured.",
        );
    };

    let Some(customer) = venue.customer_reference.as_deref() else {
        return match start_checkout(&state, billing, &venue, "/signup/success", "/dashboard").await {
            Ok(url) => Redirect::to(&url).into_response(),
            Err(message) => pages::error_page(StatusCode::BAD_GATEWAY, "Billing unavailable", &message),
        };
    };

    match billing
        .checkout
        .create_portal_session(customer, &state.config.url("/dashboard"))
        .await
    {
        Ok(url) => Redirect::to(&url).into_response(),
        Err(e) => {
            tracing::error!(venue_id = %venue.id, "Stripe portal error: {}", e);
            pages::error_page(
                StatusCode::BAD_GATEWAY,
                "Billing unavailable",
                "Could not open billing portal",
            )
        }
    }
}

/// Quote a CSV field when it contains a delimiter, quote or newline.
///
/// Values a spreadsheet would evaluate as a formula get a leading `'`.
fn csv_field(value: &str) -> String {
    let value = if value.starts_with(['=', '+', '-', '@', '\t', '\r']) {
        format!("'{value}")
    } else {
        value.to_string()
    };
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value
    }
}

/// `Name,Email,Phone,Date` rows, newest first
pub fn leads_csv(leads: &[Lead]) -> String {
    let mut out = String::from("Name,Email,Phone,Date\r\n");
    for lead in leads {
        let date = lead.created_at.format("%Y-%m-%d %H:%M").to_string();
        let fields = [
            lead.name.as_deref().unwrap_or(""),
            lead.email.as_deref().unwrap_or(""),
            lead.phone.as_deref().unwrap_or(""),
            date.as_str(),
        ];
        let line: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
        out.push_str(&line.join(","));
        out.push_str("\r\n");
    }
    out
}

pub async fn export_leads(State(state): State<AppState>, CurrentVenue(venue): CurrentVenue) -> Response {
    let leads = match state.store.recent_leads(venue.id, None).await {
        Ok(leads) => leads,
        Err(e) => return storage_error_page(&e),
    };

    let disposition = format!("attachment; filename={}_leads.csv", venue.slug);
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        leads_csv(&leads),
    )
        .into_response()
}

// ============================================================================
// API
// ============================================================================

pub async fn api_leads(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<LeadResponse>>, ApiError> {
    let venue = session::current_venue(&state, &headers)
        .await
        .map_err(|e| storage_error(&e))?
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Not logged in"))?;

    let leads = state
        .store
        .recent_leads(venue.id, Some(RECENT_LEADS_LIMIT))
        .await
        .map_err(|e| storage_error(&e))?;
    Ok(Json(leads.into_iter().map(LeadResponse::from).collect()))
}

pub async fn health_check(State(state): State<AppState>) -> Response {
    let counts = async {
        let venues = state.store.count_venues().await?;
        let leads = state.store.count_leads(None, None).await?;
        Ok::<_, CoreError>((venues, leads))
    }
    .await;

    match counts {
        Ok((venues, leads)) => Json(HealthResponse {
            status: "healthy",
            version: env!("CARGO_PKG_VERSION"),
            database: "connected",
            venues,
            leads,
            stripe_enabled: state.billing.is_some(),
            mail: state.notifier.name(),
        })
        .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "status": "unhealthy", "error": e.to_string() })),
        )
            .into_response(),
    }
}

// ============================================================================
// Webhooks
// ============================================================================

/// Stripe webhook handler
///
/// The body is taken as raw bytes; the signature covers them exactly.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let billing = state.billing.as_ref().ok_or_else(payments_disabled)?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let outcome = billing.machine.process(&body, signature).await.map_err(|e| {
        tracing::error!("Webhook processing error: {}", e);
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "WEBHOOK_ERROR",
            "Webhook processing failed",
        )
    })?;

    if !outcome.is_acknowledged() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "INVALID_SIGNATURE",
            "Invalid signature",
        ));
    }

    if let Outcome::Applied(transition) = &outcome {
        if transition.first_checkout {
            let welcome = email::welcome(&transition.venue, &state.config.base_url);
            if let Err(e) = state.notifier.send(&welcome).await {
                tracing::error!(venue_id = %transition.venue.id, "Failed to send welcome email: {}", e);
            }
        }
    }

    Ok(Json(WebhookAck {
        received: true,
        outcome: outcome.label(),
    }))
}
