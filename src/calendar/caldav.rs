// CalDAV calendar store
// Calendars are collections under the account's home; events are .ics resources
// named after their UID.

use super::{ics, CalendarStore, PhysicalEvent, StoredEvent};
use crate::http_config::HttpConfig;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use std::collections::HashSet;
use tokio::sync::Mutex;
use url::Url;

const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";
const ICS_CONTENT_TYPE: &str = "text/calendar; charset=utf-8";

const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop><d:resourcetype/></d:prop>
</d:propfind>"#;

const EVENT_QUERY_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<c:calendar-query xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:prop><c:calendar-data/></d:prop>
  <c:filter>
    <c:comp-filter name="VCALENDAR"><c:comp-filter name="VEVENT"/></c:comp-filter>
  </c:filter>
</c:calendar-query>"#;

/// Validates a CalDAV home URL for security and format correctness
pub fn validate_caldav_url_format(caldav_url: &str) -> Result<()> {
    if caldav_url.trim().is_empty() {
        return Err(anyhow!(
            "CalDAV URL cannot be empty. Please provide the calendar home URL of your account."
        ));
    }

    let parsed_url = Url::parse(caldav_url).map_err(|e| {
        anyhow!(
            "Invalid CalDAV URL format: {}. Please ensure the URL is properly formatted (e.g., https://caldav.example.com/calendars/user/)",
            e
        )
    })?;

    // Credentials travel with every request
    if parsed_url.scheme() != "https" {
        return Err(anyhow!(
            "CalDAV URL must use HTTPS protocol. Your URL starts with '{}://'.",
            parsed_url.scheme()
        ));
    }

    match parsed_url.host_str() {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(anyhow!(
            "CalDAV URL must have a valid domain name. The provided URL '{}' does not contain a valid host.",
            caldav_url
        )),
    }
}

/// Path segment for a calendar display name.
pub fn calendar_slug(name: &str) -> String {
    let mut slug = String::new();
    for ch in name.trim().chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() {
            slug.push(ch);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "duesync".to_string()
    } else {
        slug.to_string()
    }
}

pub struct CalDavStore {
    client: Client,
    home: Url,
    username: String,
    password: String,
    ensured: Mutex<HashSet<String>>,
}

impl CalDavStore {
    pub fn new(home_url: &str, username: &str, password: &str, http: &HttpConfig) -> Result<Self> {
        validate_caldav_url_format(home_url)?;
        let mut home = Url::parse(home_url)?;
        if !home.path().ends_with('/') {
            let path = format!("{}/", home.path());
            home.set_path(&path);
        }

        Ok(Self {
            client: http.build_client()?,
            home,
            username: username.to_string(),
            password: password.to_string(),
            ensured: Mutex::new(HashSet::new()),
        })
    }

    pub fn collection_url(&self, calendar: &str) -> Result<Url> {
        self.home
            .join(&format!("{}/", calendar_slug(calendar)))
            .map_err(|e| anyhow!("Invalid collection path for calendar '{}': {}", calendar, e))
    }

    pub fn event_url(&self, calendar: &str, uid: &str) -> Result<Url> {
        self.collection_url(calendar)?
            .join(&format!("{}.ics", uid))
            .map_err(|e| anyhow!("Invalid event path for {}: {}", uid, e))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
    }

    /// Makes sure the collection for `calendar` exists, creating it with
    /// MKCALENDAR on first use. Checked once per calendar per process.
    async fn ensure_calendar(&self, calendar: &str) -> Result<()> {
        let mut ensured = self.ensured.lock().await;
        if ensured.contains(calendar) {
            return Ok(());
        }

        let url = self.collection_url(calendar)?;
        let response = self
            .request(dav_method("PROPFIND")?, url.clone())
            .header("Depth", "0")
            .header(CONTENT_TYPE, XML_CONTENT_TYPE)
            .body(PROPFIND_BODY)
            .send()
            .await
            .with_context(|| format!("PROPFIND for calendar '{}' failed", calendar))?;

        match response.status() {
            StatusCode::MULTI_STATUS | StatusCode::OK => {}
            StatusCode::NOT_FOUND => {
                log::info!("Creating calendar '{}'", calendar);
                let created = self
                    .request(dav_method("MKCALENDAR")?, url)
                    .header(CONTENT_TYPE, XML_CONTENT_TYPE)
                    .body(mkcalendar_body(calendar))
                    .send()
                    .await
                    .with_context(|| format!("MKCALENDAR for calendar '{}' failed", calendar))?;
                if !created.status().is_success() {
                    return Err(anyhow!(
                        "MKCALENDAR for calendar '{}' returned HTTP {}",
                        calendar,
                        created.status()
                    ));
                }
            }
            status => {
                return Err(anyhow!(
                    "PROPFIND for calendar '{}' returned HTTP {}",
                    calendar,
                    status
                ));
            }
        }

        ensured.insert(calendar.to_string());
        Ok(())
    }
}

#[async_trait]
impl CalendarStore for CalDavStore {
    async fn put_event(&self, calendar: &str, event: &PhysicalEvent) -> Result<()> {
        self.ensure_calendar(calendar).await?;

        let response = self
            .request(Method::PUT, self.event_url(calendar, &event.uid)?)
            .header(CONTENT_TYPE, ICS_CONTENT_TYPE)
            .body(ics::to_ics(event))
            .send()
            .await
            .with_context(|| format!("PUT of event {} failed", event.uid))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(anyhow!("PUT of event {} returned HTTP {}: {}", event.uid, status, text));
        }
        Ok(())
    }

    async fn delete_event(&self, calendar: &str, uid: &str) -> Result<()> {
        let response = self
            .request(Method::DELETE, self.event_url(calendar, uid)?)
            .send()
            .await
            .with_context(|| format!("DELETE of event {} failed", uid))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND | StatusCode::GONE => Ok(()),
            status => Err(anyhow!("DELETE of event {} returned HTTP {}", uid, status)),
        }
    }

    async fn find_by_content(&self, calendar: &str, needle: &str) -> Result<Vec<StoredEvent>> {
        let response = self
            .request(dav_method("REPORT")?, self.collection_url(calendar)?)
            .header("Depth", "1")
            .header(CONTENT_TYPE, XML_CONTENT_TYPE)
            .body(EVENT_QUERY_BODY)
            .send()
            .await
            .with_context(|| format!("REPORT on calendar '{}' failed", calendar))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(anyhow!(
                "REPORT on calendar '{}' returned HTTP {}",
                calendar,
                response.status()
            ));
        }

        let body = response.text().await?;
        let mut matches = Vec::new();
        for data in extract_calendar_data(&body)? {
            match ics::parse_events(&data) {
                Ok(events) => matches.extend(events.into_iter().filter(|event| {
                    event
                        .description
                        .as_deref()
                        .is_some_and(|description| description.contains(needle))
                })),
                Err(e) => log::warn!("Skipping unparsable resource in '{}': {}", calendar, e),
            }
        }

        log::debug!(
            "Found {} event(s) matching content in '{}'",
            matches.len(),
            calendar
        );
        Ok(matches)
    }
}

fn dav_method(name: &str) -> Result<Method> {
    Method::from_bytes(name.as_bytes()).map_err(|e| anyhow!("Invalid method {}: {}", name, e))
}

fn mkcalendar_body(display_name: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<c:mkcalendar xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:set>
    <d:prop>
      <d:displayname>{}</d:displayname>
      <c:supported-calendar-component-set><c:comp name="VEVENT"/></c:supported-calendar-component-set>
    </d:prop>
  </d:set>
</c:mkcalendar>"#,
        xml_escape(display_name)
    )
}

/// Pulls every `calendar-data` payload out of a multistatus response,
/// whatever namespace prefix the server chose.
fn extract_calendar_data(multistatus: &str) -> Result<Vec<String>> {
    let pattern = Regex::new(
        r"(?s)<(?:[A-Za-z][\w.-]*:)?calendar-data\b[^>]*>(.*?)</(?:[A-Za-z][\w.-]*:)?calendar-data>",
    )?;

    Ok(pattern
        .captures_iter(multistatus)
        .filter_map(|captures| captures.get(1))
        .map(|payload| {
            let payload = payload.as_str().trim();
            payload
                .strip_prefix("<![CDATA[")
                .and_then(|rest| rest.strip_suffix("]]>"))
                .map(str::to_string)
                .unwrap_or_else(|| xml_unescape(payload))
        })
        .filter(|payload| !payload.is_empty())
        .collect())
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn xml_unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#13;", "\r")
        .replace("&#xD;", "\r")
        .replace("&#10;", "\n")
        .replace("&amp;", "&")
}
