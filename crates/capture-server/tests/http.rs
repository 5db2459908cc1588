// HTTP-level tests for capture-server
//
// Drives the full axum router with tower::ServiceExt::oneshot, using the
// in-memory store, a log-only notifier and a fake checkout provider.

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE};
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use tower::ServiceExt;

use capture_billing::{
    signature_header, BillingConfig, CheckoutProvider, CheckoutRequest, CheckoutSession,
};
use capture_core::{
    LeadStore, MemoryStore, Store, SubscriptionStatus, Venue, VenueLookup, VenueStore,
};
use capture_notify::{LogNotifier, Notifier};
use capture_server::{router, AppConfig, AppState};

const WEBHOOK_SECRET: &str = "whsec_http_test";

// ─── Fake Checkout ────────────────────────────────────────────────

#[derive(Default)]
struct FakeCheckout {
    requests: Mutex<Vec<CheckoutRequest>>,
}

#[async_trait::async_trait]
impl CheckoutProvider for FakeCheckout {
    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> capture_billing::Result<CheckoutSession> {
        let session = CheckoutSession {
            id: "cs_test_1".into(),
            checkout_url: format!("https://checkout.stripe.test/{}", request.correlation_token),
            correlation_token: request.correlation_token.clone(),
        };
        self.requests.lock().unwrap().push(request);
        Ok(session)
    }

    async fn create_portal_session(
        &self,
        customer_reference: &str,
        _return_url: &str,
    ) -> capture_billing::Result<String> {
        Ok(format!("https://billing.stripe.test/{customer_reference}"))
    }
}

// ─── Harness ──────────────────────────────────────────────────────

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    notifier: Arc<LogNotifier>,
    checkout: Arc<FakeCheckout>,
}

impl TestApp {
    fn new(with_billing: bool) -> Self {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(LogNotifier::new());
        let checkout = Arc::new(FakeCheckout::default());

        let dyn_store: Arc<dyn Store> = store.clone();
        let dyn_notifier: Arc<dyn Notifier> = notifier.clone();
        let mut state = AppState::new(dyn_store, dyn_notifier, AppConfig::default());
        if with_billing {
            let billing = BillingConfig::new("sk_test_x", WEBHOOK_SECRET, "price_1");
            let dyn_checkout: Arc<dyn CheckoutProvider> = checkout.clone();
            state = state.with_billing(&billing, dyn_checkout);
        }

        Self {
            router: router(state),
            store,
            notifier,
            checkout,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    async fn post_form(&self, uri: &str, form: &str, cookie: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        self.send(builder.body(Body::from(form.to_string())).unwrap()).await
    }

    async fn post_webhook(&self, body: &serde_json::Value) -> Response<Body> {
        let payload = serde_json::to_vec(body).unwrap();
        let header = signature_header(WEBHOOK_SECRET, Utc::now().timestamp(), &payload);
        let request = Request::builder()
            .method("POST")
            .uri("/webhook/stripe")
            .header(CONTENT_TYPE, "application/json")
            .header("stripe-signature", header)
            .body(Body::from(payload))
            .unwrap();
        self.send(request).await
    }

    async fn venue(&self, slug: &str) -> Venue {
        self.store
            .find_venue(VenueLookup::Slug(slug))
            .await
            .unwrap()
            .unwrap()
    }

    async fn signed_up_venue(&self) -> (Venue, String) {
        let response = self
            .post_form("/signup", "venue_name=Blue+Door&email=owner%40example.com", None)
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let cookie = session_cookie(&response);
        let venue = self
            .store
            .find_venue(VenueLookup::Email("owner@example.com"))
            .await
            .unwrap()
            .unwrap();
        (venue, cookie)
    }
}

fn session_cookie(response: &Response<Body>) -> String {
    response
        .headers()
        .get(SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .unwrap()
        .to_string()
}

async fn body_string(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}

fn event(event_type: &str, object: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "id": format!("evt_{}", event_type.replace('.', "_")),
        "object": "event",
        "type": event_type,
        "created": Utc::now().timestamp(),
        "data": { "object": object }
    })
}

fn checkout_completed(token: &str) -> serde_json::Value {
    event(
        "checkout.session.completed",
        serde_json::json!({
            "id": "cs_test_1",
            "client_reference_id": token,
            "customer": "cus_1",
            "subscription": "sub_1",
            "customer_email": "owner@example.com"
        }),
    )
}

// ─── Tests ────────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_counts_and_billing() {
    let app = TestApp::new(true);
    let response = app.get("/api/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["venues"], 0);
    assert_eq!(body["stripe_enabled"], true);
    assert_eq!(body["mail"], "log");
}

#[tokio::test]
async fn signup_creates_trialing_venue_and_redirects_to_checkout() {
    let app = TestApp::new(true);
    let response = app
        .post_form("/signup", "venue_name=Blue+Door&email=Owner%40Example.com", None)
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response.headers().get(LOCATION).unwrap().to_str().unwrap().to_string();
    assert!(session_cookie(&response).starts_with("venue_session="));

    let venue = app
        .store
        .find_venue(VenueLookup::Email("owner@example.com"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(venue.subscription_status, SubscriptionStatus::Trialing);
    assert!(venue.current_period_end > Utc::now() + Duration::days(6));
    assert_eq!(location, format!("https://checkout.stripe.test/{}", venue.correlation_token));

    let requests = app.checkout.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].correlation_token, venue.correlation_token);
    assert_eq!(requests[0].success_url, "http://localhost:3000/signup/success");
}

#[tokio::test]
async fn signup_resumes_unfinished_venue() {
    let app = TestApp::new(true);
    let (venue, _) = app.signed_up_venue().await;
    let (again, _) = app.signed_up_venue().await;

    assert_eq!(venue.id, again.id);
    assert_eq!(app.store.count_venues().await.unwrap(), 1);
}

#[tokio::test]
async fn signup_validation_and_disabled_billing() {
    let app = TestApp::new(true);
    let response = app.post_form("/signup", "venue_name=&email=", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_string(response).await.contains("Venue name and email required"));

    let disabled = TestApp::new(false);
    let response = disabled
        .post_form("/signup", "venue_name=Blue+Door&email=owner%40example.com", None)
        .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn capture_flow_stores_lead_and_notifies_owner() {
    let app = TestApp::new(true);
    let (venue, _) = app.signed_up_venue().await;

    let response = app.get(&format!("/c/{}", venue.slug), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains(&venue.welcome_message));

    let response = app
        .post_form(
            &format!("/c/{}/submit", venue.slug),
            "name=Ana&email=ana%40example.com&phone=",
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], venue.thank_you_message.as_str());

    let leads = app.store.recent_leads(venue.id, None).await.unwrap();
    assert_eq!(leads.len(), 1);
    assert_eq!(leads[0].email.as_deref(), Some("ana@example.com"));
    assert_eq!(leads[0].phone, None);

    let sent = app.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "owner@example.com");
}

#[tokio::test]
async fn capture_rejects_unknown_slug_and_empty_contact() {
    let app = TestApp::new(true);
    let (venue, _) = app.signed_up_venue().await;

    assert_eq!(app.get("/c/nosuchvn", None).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        app.post_form("/c/nosuchvn/submit", "email=a%40b.co", None).await.status(),
        StatusCode::NOT_FOUND
    );

    let response = app
        .post_form(&format!("/c/{}/submit", venue.slug), "name=Ana", None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Phone or email required");

    let form = format!("name={}&phone=555-0100", "a".repeat(201));
    let response = app.post_form(&format!("/c/{}/submit", venue.slug), &form, None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Name must be at most 200 characters");
    assert!(app.store.recent_leads(venue.id, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn webhook_lifecycle_drives_access() {
    let app = TestApp::new(true);
    let (venue, cookie) = app.signed_up_venue().await;
    let capture = format!("/c/{}", venue.slug);

    // Checkout completes; a retried delivery changes nothing and sends no second welcome
    for _ in 0..2 {
        let response = app.post_webhook(&checkout_completed(&venue.correlation_token)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["received"], true);
        assert_eq!(body["outcome"], "applied");
    }
    let active = app.venue(&venue.slug).await;
    assert_eq!(active.subscription_status, SubscriptionStatus::Active);
    assert_eq!(active.customer_reference.as_deref(), Some("cus_1"));
    assert_eq!(active.subscription_reference.as_deref(), Some("sub_1"));
    let welcomes = app
        .notifier
        .sent()
        .into_iter()
        .filter(|e| e.subject.starts_with("Welcome"))
        .count();
    assert_eq!(welcomes, 1);

    // Payment fails: grace period keeps the page live
    let failed = event(
        "invoice.payment_failed",
        serde_json::json!({ "id": "in_1", "customer": "cus_1", "subscription": "sub_1" }),
    );
    assert_eq!(app.post_webhook(&failed).await.status(), StatusCode::OK);
    assert_eq!(app.venue(&venue.slug).await.subscription_status, SubscriptionStatus::PastDue);
    assert_eq!(app.get(&capture, None).await.status(), StatusCode::OK);

    // Subscription deleted: everything gated
    let deleted = event(
        "customer.subscription.deleted",
        serde_json::json!({ "id": "sub_1", "status": "canceled" }),
    );
    assert_eq!(app.post_webhook(&deleted).await.status(), StatusCode::OK);
    assert_eq!(app.venue(&venue.slug).await.subscription_status, SubscriptionStatus::Canceled);

    assert_eq!(app.get(&capture, None).await.status(), StatusCode::PAYMENT_REQUIRED);
    let response = app
        .post_form(&format!("{capture}/submit"), "email=ana%40example.com", None)
        .await;
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    assert_eq!(
        app.get("/dashboard", Some(&cookie)).await.status(),
        StatusCode::PAYMENT_REQUIRED
    );
}

#[tokio::test]
async fn webhook_rejections_and_ignored_events() {
    let app = TestApp::new(true);
    let (venue, _) = app.signed_up_venue().await;

    // Tampered body
    let payload = serde_json::to_vec(&checkout_completed(&venue.correlation_token)).unwrap();
    let header = signature_header(WEBHOOK_SECRET, Utc::now().timestamp(), &payload);
    let mut tampered = payload.clone();
    tampered[5] ^= 0x01;
    let request = Request::builder()
        .method("POST")
        .uri("/webhook/stripe")
        .header("stripe-signature", header)
        .body(Body::from(tampered))
        .unwrap();
    assert_eq!(app.send(request).await.status(), StatusCode::BAD_REQUEST);

    // Missing signature
    let request = Request::builder()
        .method("POST")
        .uri("/webhook/stripe")
        .body(Body::from(payload.clone()))
        .unwrap();
    assert_eq!(app.send(request).await.status(), StatusCode::BAD_REQUEST);

    // Timestamps at the edges of the integer range
    for t in [i64::MIN, i64::MAX] {
        let request = Request::builder()
            .method("POST")
            .uri("/webhook/stripe")
            .header("stripe-signature", format!("t={t},v1={}", "00".repeat(32)))
            .body(Body::from(payload.clone()))
            .unwrap();
        assert_eq!(app.send(request).await.status(), StatusCode::BAD_REQUEST);
    }
    assert_eq!(
        app.venue(&venue.slug).await.subscription_status,
        SubscriptionStatus::Trialing
    );

    // Unknown correlation token is acknowledged and creates nothing
    let response = app.post_webhook(&checkout_completed("vt_unknown")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["outcome"], "ignored");
    assert_eq!(app.store.count_venues().await.unwrap(), 1);

    // Unhandled event type
    let response = app
        .post_webhook(&event("invoice.paid", serde_json::json!({ "id": "in_1" })))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["outcome"], "ignored");

    // Billing not configured
    let disabled = TestApp::new(false);
    assert_eq!(
        disabled.post_webhook(&checkout_completed("vt_x")).await.status(),
        StatusCode::SERVICE_UNAVAILABLE
    );
}

#[tokio::test]
async fn login_dashboard_and_export() {
    let app = TestApp::new(true);
    let (venue, _) = app.signed_up_venue().await;
    app.post_form(
        &format!("/c/{}/submit", venue.slug),
        "name=Smith%2C+Jo&phone=555-0100",
        None,
    )
    .await;
    app.post_form(
        &format!("/c/{}/submit", venue.slug),
        "name=%3DHYPERLINK(%22x%22)&email=f%40example.com",
        None,
    )
    .await;

    // Anonymous visitors are sent to login
    let response = app.get("/dashboard", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers().get(LOCATION).unwrap(), "/login");
    assert_eq!(app.get("/api/leads", None).await.status(), StatusCode::UNAUTHORIZED);

    let response = app.post_form("/login", "email=nobody%40example.com", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.post_form("/login", "email=OWNER%40example.com", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let cookie = session_cookie(&response);

    let response = app.get("/dashboard", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_string(response).await;
    assert!(page.contains("555-0100"));
    assert!(page.contains(&format!("/c/{}", venue.slug)));

    let response = app.get("/dashboard/leads/export", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-disposition").unwrap(),
        &format!("attachment; filename={}_leads.csv", venue.slug)
    );
    let csv = body_string(response).await;
    assert!(csv.starts_with("Name,Email,Phone,Date\r\n"));
    assert!(csv.contains("\r\n\"Smith, Jo\",,555-0100,"));
    assert!(csv.contains("\r\n\"'=HYPERLINK(\"\"x\"\")\",f@example.com,,"));

    let response = app.get("/api/leads", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let leads = body_json(response).await;
    let leads = leads.as_array().unwrap();
    assert_eq!(leads.len(), 2);
    let mut keys: Vec<&str> = leads[0].as_object().unwrap().keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(keys, ["created_at", "email", "id", "name", "phone", "source"]);

    // Forged cookie
    let forged = format!("venue_session={}.{}", venue.id, "00".repeat(32));
    assert_eq!(app.get("/dashboard", Some(&forged)).await.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn settings_update_profile_only() {
    let app = TestApp::new(true);
    let (venue, cookie) = app.signed_up_venue().await;

    let response = app
        .post_form(
            "/dashboard/settings",
            "welcome_message=Scan+for+a+free+drink&primary_color=%23112233",
            Some(&cookie),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let updated = app.venue(&venue.slug).await;
    assert_eq!(updated.welcome_message, "Scan for a free drink");
    assert_eq!(updated.primary_color, "#112233");
    assert_eq!(updated.name, venue.name);
    assert_eq!(updated.subscription_status, venue.subscription_status);

    let response = app
        .post_form("/dashboard/settings", "primary_color=red", Some(&cookie))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.venue(&venue.slug).await.primary_color, "#112233");
}

#[tokio::test]
async fn billing_portal_or_resumed_checkout() {
    let app = TestApp::new(true);
    let (venue, cookie) = app.signed_up_venue().await;

    // No customer yet: back to checkout
    let response = app.get("/dashboard/billing", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers().get(LOCATION).unwrap().to_str().unwrap(),
        format!("https://checkout.stripe.test/{}", venue.correlation_token)
    );

    app.post_webhook(&checkout_completed(&venue.correlation_token)).await;
    let response = app.get("/dashboard/billing", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers().get(LOCATION).unwrap(),
        "https://billing.stripe.test/cus_1"
    );
}

#[tokio::test]
async fn marketing_pages_render() {
    let app = TestApp::new(true);
    assert_eq!(app.get("/", None).await.status(), StatusCode::OK);
    let response = app.get("/pricing", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("7-day free trial"));
    for (path, heading) in [
        ("/about", "About"),
        ("/privacy", "Privacy Policy"),
        ("/terms", "Terms of Service"),
    ] {
        let response = app.get(path, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let page = body_string(response).await;
        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains(heading));
    }

    let response = app.get("/logout", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(session_cookie(&response).starts_with("venue_session="));
}
