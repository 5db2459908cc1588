//! Email Composition
//!
//! Builds the lead-notification and welcome messages sent to venue owners.

use capture_core::{Lead, Venue};
use leptos::prelude::*;
use leptos::reactive::owner::Owner;
use serde::{Deserialize, Serialize};

/// A single outbound HTML email
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Render a view to an HTML string
fn render<V: IntoView>(body: impl FnOnce() -> V) -> String {
    Owner::new().with(|| body().to_html())
}

#[component]
fn Row(label: &'static str, value: Option<String>) -> impl IntoView {
    value.map(|v| {
        view! {
            <tr><td style="padding:4px 12px 4px 0;color:#6b7280">{label}</td><td>{v}</td></tr>
        }
    })
}

#[component]
fn LeadNotification(venue: Venue, lead: Lead, dashboard: String) -> impl IntoView {
    let heading_style = format!("color:{}", venue.primary_color);
    let captured = lead.created_at.format("%Y-%m-%d %H:%M UTC").to_string();

    view! {
        <div style="font-family:sans-serif;max-width:520px">
            <h2 style={heading_style}>{format!("New lead at {}", venue.name)}</h2>
            <table>
                <Row label="Name" value={lead.name}/>
                <Row label="Email" value={lead.email}/>
                <Row label="Phone" value={lead.phone}/>
                <Row label="Captured" value={Some(captured)}/>
            </table>
            <p><a href={dashboard}>"View all leads"</a></p>
        </div>
    }
}

/// Sent to the venue owner when a customer submits the capture form
pub fn lead_notification(venue: &Venue, lead: &Lead, base_url: &str) -> Email {
    let dashboard = format!("{}/dashboard", base_url.trim_end_matches('/'));
    let subject = format!("New lead captured at {}: {}", venue.name, lead.label());
    let to = venue.email.clone();
    let (venue, lead) = (venue.clone(), lead.clone());

    Email {
        to,
        subject,
        html: render(|| view! { <LeadNotification venue={venue} lead={lead} dashboard={dashboard}/> }),
    }
}

#[component]
fn Welcome(venue_name: String, capture_url: String, dashboard: String) -> impl IntoView {
    view! {
        <div style="font-family:sans-serif;max-width:520px">
            <h2>{format!("Welcome to QR Lead Capture, {venue_name}!")}</h2>
            <p>"Your capture page is live at:"</p>
            <p><a href={capture_url.clone()}>{capture_url.clone()}</a></p>
            <p>
                "Print the QR code from your "<a href={dashboard}>"dashboard"</a>
                " and place it where customers can scan it. Every submission lands in your dashboard and in this inbox."
            </p>
        </div>
    }
}

/// Sent once, when a venue's first checkout completes
pub fn welcome(venue: &Venue, base_url: &str) -> Email {
    let base = base_url.trim_end_matches('/');
    let capture_url = venue.capture_url(base);
    let dashboard = format!("{base}/dashboard");
    let venue_name = venue.name.clone();

    Email {
        to: venue.email.clone(),
        subject: format!("Welcome to QR Lead Capture, {}!", venue.name),
        html: render(|| {
            view! { <Welcome venue_name={venue_name} capture_url={capture_url} dashboard={dashboard}/> }
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capture_core::{ContactInfo, LeadSource};
    use chrono::{Duration, Utc};

    fn venue() -> Venue {
        Venue::signup("Joe's <Bar>", "owner@example.com", Duration::days(7), Utc::now()).unwrap()
    }

    #[test]
    fn test_lead_notification() {
        let venue = venue();
        let lead = Lead::capture(
            venue.id,
            ContactInfo {
                name: Some("Ana".into()),
                phone: Some("555-0100".into()),
                email: None,
            },
            LeadSource::Qr,
            Utc::now(),
        )
        .unwrap();

        let email = lead_notification(&venue, &lead, "https://qr.example.com/");
        assert_eq!(email.to, "owner@example.com");
        assert!(email.subject.contains("Ana"));
        assert!(email.html.contains("&lt;Bar&gt;"));
        assert!(!email.html.contains("<Bar>"));
        assert!(email.html.contains("555-0100"));
        assert!(!email.html.contains(">Email<"));
        assert!(email.html.contains("https://qr.example.com/dashboard"));
    }

    #[test]
    fn test_welcome_links_capture_page() {
        let venue = venue();
        let email = welcome(&venue, "https://qr.example.com");
        assert!(email.html.contains(&format!("https://qr.example.com/c/{}", venue.slug)));
        assert!(email.html.contains("href=\"https://qr.example.com/dashboard\""));
        assert!(email.subject.starts_with("Welcome"));
    }
}
