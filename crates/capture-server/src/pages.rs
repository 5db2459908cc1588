//! HTML Pages
//!
//! Server-rendered Leptos views. Text and attribute values are escaped by the
//! renderer.

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use capture_billing::Access;
use capture_core::{Lead, Venue};
use leptos::prelude::*;
use leptos::reactive::owner::Owner;

const STYLE: &str = r"
body{font-family:system-ui,sans-serif;margin:0;background:#f9fafb;color:#111827}
main{max-width:720px;margin:0 auto;padding:32px 16px}
h1{margin-top:0}
a{color:#4f46e5}
form{display:flex;flex-direction:column;gap:12px;max-width:420px}
input,textarea{padding:10px;border:1px solid #d1d5db;border-radius:6px;font:inherit}
button{padding:10px 16px;border:0;border-radius:6px;background:#4f46e5;color:#fff;font:inherit;cursor:pointer}
table{border-collapse:collapse;width:100%}
td,th{text-align:left;padding:6px 8px;border-bottom:1px solid #e5e7eb}
.error{color:#b91c1c}
.muted{color:#6b7280}
.stats{display:flex;gap:24px}
";

/// Submits the capture form in place and shows the venue's reply
const CAPTURE_SCRIPT: &str = r"
document.getElementById('capture').addEventListener('submit', async (e) => {
  e.preventDefault();
  const res = await fetch(e.target.action, { method: 'POST', body: new URLSearchParams(new FormData(e.target)) });
  const body = await res.json();
  document.getElementById('result').textContent = body.message || body.error;
  if (res.ok) e.target.remove();
});
";

/// Render `body` inside the site chrome
fn render<V: IntoView>(title: &str, body: impl FnOnce() -> V) -> Html<String> {
    let title = format!("{title} · QR Lead Capture");
    let owner = Owner::new();
    let html = owner.with(|| {
        view! {
            <html lang="en">
                <head>
                    <meta charset="utf-8"/>
                    <meta name="viewport" content="width=device-width,initial-scale=1"/>
                    <title>{title}</title>
                    <style inner_html={STYLE}></style>
                </head>
                <body>
                    <main>{body()}</main>
                </body>
            </html>
        }
        .to_html()
    });
    Html(format!("<!DOCTYPE html>{html}"))
}

fn with_status(status: StatusCode, page: Html<String>) -> Response {
    (status, page).into_response()
}

#[component]
fn ErrorLine(error: Option<String>) -> impl IntoView {
    error.map(|e| view! { <p class="error">{e}</p> })
}

#[component]
fn ErrorPage(title: String, message: String) -> impl IntoView {
    view! {
        <h1>{title}</h1>
        <p>{message}</p>
        <p><a href="/">"Home"</a></p>
    }
}

pub fn error_page(status: StatusCode, title: &str, message: &str) -> Response {
    let (heading, message) = (title.to_string(), message.to_string());
    with_status(
        status,
        render(title, || view! { <ErrorPage title={heading} message={message}/> }),
    )
}

pub fn not_found() -> Response {
    error_page(StatusCode::NOT_FOUND, "Not found", "That page does not exist.")
}

// ============================================================================
// Marketing
// ============================================================================

#[component]
fn HomePage() -> impl IntoView {
    view! {
        <h1>"Turn foot traffic into leads"</h1>
        <p>
            "Put a QR code on your tables, counter or window. Customers scan it, leave their \
             name, email or phone, and you get an email for every new lead."
        </p>
        <p>
            <a href="/signup">"Start your free trial"</a>" · "
            <a href="/pricing">"Pricing"</a>" · "
            <a href="/login">"Log in"</a>
        </p>
    }
}

pub fn home() -> Html<String> {
    render("Home", || view! { <HomePage/> })
}

#[component]
fn PricingPage(trial_days: Option<u32>) -> impl IntoView {
    view! {
        <h1>"Pricing"</h1>
        <p>"One plan: unlimited leads, email notifications, CSV export and a custom capture page."</p>
        {trial_days.map(|d| view! { <p>{format!("Every plan starts with a {d}-day free trial.")}</p> })}
        <p><a href="/signup">"Get started"</a></p>
    }
}

pub fn pricing(trial_days: Option<u32>) -> Html<String> {
    render("Pricing", || view! { <PricingPage trial_days={trial_days}/> })
}

#[component]
fn AboutPage() -> impl IntoView {
    view! {
        <h1>"About"</h1>
        <p>
            "QR Lead Capture helps cafés, bars, salons and shops collect customer contact \
             details without clipboards or app installs. One QR code, one short form, and \
             every lead lands in your inbox and dashboard."
        </p>
        <p><a href="/signup">"Start your free trial"</a></p>
    }
}

pub fn about() -> Html<String> {
    render("About", || view! { <AboutPage/> })
}

#[component]
fn PrivacyPage() -> impl IntoView {
    view! {
        <h1>"Privacy Policy"</h1>
        <h2>"What we collect"</h2>
        <p>
            "Venues give us a name and an email address. Customers who use a capture page \
             give the venue their name, email and/or phone number."
        </p>
        <h2>"How it is used"</h2>
        <p>
            "Customer details are stored for the venue that collected them and emailed to \
             that venue. We do not sell or share them with anyone else."
        </p>
        <h2>"Payments"</h2>
        <p>"Card payments are handled by Stripe. We never see or store card numbers."</p>
        <h2>"Deletion"</h2>
        <p>"Venues can export their leads at any time. Email us to have your data removed."</p>
    }
}

pub fn privacy() -> Html<String> {
    render("Privacy", || view! { <PrivacyPage/> })
}

#[component]
fn TermsPage() -> impl IntoView {
    view! {
        <h1>"Terms of Service"</h1>
        <p>
            "The service is billed monthly after the free trial. You can cancel at any time \
             from the billing page; your capture page stops accepting leads when the \
             subscription ends."
        </p>
        <p>
            "You are responsible for telling your customers how you will use the details \
             they leave, and for complying with the marketing rules where you operate."
        </p>
        <p>"The service is provided as is, without warranty of any kind."</p>
    }
}

pub fn terms() -> Html<String> {
    render("Terms", || view! { <TermsPage/> })
}

// ============================================================================
// Signup & Login
// ============================================================================

#[component]
fn SignupPage(error: Option<String>, billing_enabled: bool) -> impl IntoView {
    view! {
        <h1>"Start your free trial"</h1>
        {(!billing_enabled).then(|| view! { <p class="error">"Card payments are not available right now."</p> })}
        <ErrorLine error={error}/>
        <form method="post" action="/signup">
            <input name="venue_name" placeholder="Venue name" required={true}/>
            <input name="email" type="email" placeholder="Email for lead notifications" required={true}/>
            <button type="submit">"Continue to payment"</button>
        </form>
    }
}

pub fn signup_form(error: Option<&str>, billing_enabled: bool) -> Html<String> {
    let error = error.map(str::to_string);
    render("Sign up", || view! { <SignupPage error={error} billing_enabled={billing_enabled}/> })
}

#[component]
fn SignupSuccessPage(venue: Option<Venue>, base_url: String) -> impl IntoView {
    let details = match venue {
        Some(venue) => {
            let url = venue.capture_url(&base_url);
            view! {
                <p>"Your capture page for "<strong>{venue.name}</strong>" is "<a href={url.clone()}>{url.clone()}</a></p>
                <p><a href="/dashboard">"Go to your dashboard"</a></p>
            }
            .into_any()
        }
        None => view! {
            <p>"Your account is being set up. "<a href="/login">"Log in"</a>" to see your dashboard."</p>
        }
        .into_any(),
    };

    view! {
        <h1>"You're all set!"</h1>
        {details}
    }
}

pub fn signup_success(venue: Option<&Venue>, base_url: &str) -> Html<String> {
    let (venue, base_url) = (venue.cloned(), base_url.to_string());
    render("Welcome", || view! { <SignupSuccessPage venue={venue} base_url={base_url}/> })
}

#[component]
fn LoginPage(error: Option<String>) -> impl IntoView {
    view! {
        <h1>"Log in"</h1>
        <ErrorLine error={error}/>
        <form method="post" action="/login">
            <input name="email" type="email" placeholder="Your email" required={true}/>
            <button type="submit">"Log in"</button>
        </form>
        <p class="muted">"New here? "<a href="/signup">"Sign up"</a></p>
    }
}

pub fn login_form(error: Option<&str>) -> Html<String> {
    let error = error.map(str::to_string);
    render("Log in", || view! { <LoginPage error={error}/> })
}

// ============================================================================
// Capture
// ============================================================================

#[component]
fn CapturePage(venue: Venue) -> impl IntoView {
    let action = format!("{}/submit", venue.capture_path());
    let heading_style = format!("color:{}", venue.primary_color);
    let button_style = format!("background:{}", venue.primary_color);

    view! {
        <h1 style={heading_style}>{venue.name}</h1>
        <p>{venue.welcome_message}</p>
        <form id="capture" method="post" action={action}>
            <input name="name" placeholder="Name"/>
            <input name="email" type="email" placeholder="Email"/>
            <input name="phone" type="tel" placeholder="Phone"/>
            <button type="submit" style={button_style}>"Submit"</button>
        </form>
        <p id="result"></p>
        <script inner_html={CAPTURE_SCRIPT}></script>
    }
}

pub fn capture_form(venue: &Venue) -> Html<String> {
    let title = venue.name.clone();
    let venue = venue.clone();
    render(&title, || view! { <CapturePage venue={venue}/> })
}

pub fn capture_inactive() -> Response {
    error_page(
        StatusCode::PAYMENT_REQUIRED,
        "Not available",
        "This venue's lead capture page is not active right now.",
    )
}

// ============================================================================
// Dashboard
// ============================================================================

/// Lead counts shown above the table
#[derive(Clone, Copy, Debug)]
pub struct LeadStats {
    pub total: u64,
    pub this_month: u64,
}

/// Percent-encode a URL for use as a query value
fn encode_query_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len() * 3);
    for b in value.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(char::from(b));
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

#[component]
fn LeadTable(leads: Vec<Lead>) -> impl IntoView {
    if leads.is_empty() {
        return view! {
            <p class="muted">"No leads yet. Print your QR code and put it where customers can see it."</p>
        }
        .into_any();
    }

    let rows = leads
        .into_iter()
        .map(|lead| {
            view! {
                <tr>
                    <td>{lead.name.unwrap_or_default()}</td>
                    <td>{lead.email.unwrap_or_default()}</td>
                    <td>{lead.phone.unwrap_or_default()}</td>
                    <td>{lead.created_at.format("%Y-%m-%d %H:%M").to_string()}</td>
                </tr>
            }
        })
        .collect_view();

    view! {
        <table>
            <tr><th>"Name"</th><th>"Email"</th><th>"Phone"</th><th>"Date"</th></tr>
            {rows}
        </table>
    }
    .into_any()
}

#[component]
fn DashboardPage(venue: Venue, leads: Vec<Lead>, stats: LeadStats, access: Access, base_url: String) -> impl IntoView {
    let capture_url = venue.capture_url(&base_url);
    let qr_src = format!(
        "https://api.qrserver.com/v1/create-qr-code/?size=240x240&data={}",
        encode_query_value(&capture_url)
    );

    view! {
        <h1>{venue.name}</h1>
        <p class="muted">
            {access.message()}" · "
            <a href="/dashboard/settings">"Settings"</a>" · "
            <a href="/dashboard/billing">"Billing"</a>" · "
            <a href="/logout">"Log out"</a>
        </p>
        <div class="stats">
            <div><strong>{stats.total}</strong>" total leads"</div>
            <div><strong>{stats.this_month}</strong>" this month"</div>
        </div>
        <h2>"Your QR code"</h2>
        <p><img src={qr_src} alt="QR code" width="240" height="240"/></p>
        <p><a href={capture_url.clone()}>{capture_url.clone()}</a></p>
        <h2>"Recent leads"</h2>
        <p><a href="/dashboard/leads/export">"Export CSV"</a></p>
        <LeadTable leads={leads}/>
    }
}

pub fn dashboard(venue: &Venue, leads: &[Lead], stats: &LeadStats, access: Access, base_url: &str) -> Html<String> {
    let (venue, leads, stats, base_url) = (venue.clone(), leads.to_vec(), *stats, base_url.to_string());
    render("Dashboard", || {
        view! { <DashboardPage venue={venue} leads={leads} stats={stats} access={access} base_url={base_url}/> }
    })
}

#[component]
fn InactiveDashboardPage(venue: Venue, access: Access) -> impl IntoView {
    view! {
        <h1>{venue.name}</h1>
        <p class="error">{access.message()}</p>
        <p>"Your capture page and dashboard are paused until billing is sorted out."</p>
        <p><a href="/dashboard/billing">"Manage billing"</a>" · "<a href="/logout">"Log out"</a></p>
    }
}

pub fn dashboard_inactive(venue: &Venue, access: Access) -> Response {
    let venue = venue.clone();
    with_status(
        StatusCode::PAYMENT_REQUIRED,
        render("Subscription inactive", || view! { <InactiveDashboardPage venue={venue} access={access}/> }),
    )
}

#[component]
fn SettingsPage(venue: Venue, notice: Option<String>, error: Option<String>) -> impl IntoView {
    view! {
        <h1>"Settings"</h1>
        {notice.map(|n| view! { <p class="muted">{n}</p> })}
        <ErrorLine error={error}/>
        <form method="post" action="/dashboard/settings">
            <label>"Venue name "<input name="name" value={venue.name} required={true}/></label>
            <label>"Phone "<input name="phone" value={venue.phone.unwrap_or_default()}/></label>
            <label>"Welcome message "<textarea name="welcome_message">{venue.welcome_message}</textarea></label>
            <label>"Thank-you message "<textarea name="thank_you_message">{venue.thank_you_message}</textarea></label>
            <label>"Colour "<input name="primary_color" value={venue.primary_color} pattern="#[0-9a-fA-F]{6}"/></label>
            <button type="submit">"Save"</button>
        </form>
        <p><a href="/dashboard">"Back to dashboard"</a></p>
    }
}

pub fn settings(venue: &Venue, notice: Option<&str>, error: Option<&str>) -> Html<String> {
    let venue = venue.clone();
    let (notice, error) = (notice.map(str::to_string), error.map(str::to_string));
    render("Settings", || view! { <SettingsPage venue={venue} notice={notice} error={error}/> })
}
