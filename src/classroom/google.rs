// Google Classroom REST client
// OAuth refresh-token grant, paginated listing, submission lookup

use super::{CourseworkSource, RemoteCourse, RemoteCoursework, RemoteTopic};
use crate::http_config::HttpConfig;
use crate::models::SubmissionStatus;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::Mutex;

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const API_BASE: &str = "https://classroom.googleapis.com/v1";

/// Tokens are refreshed this long before Google says they expire.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone)]
pub struct ClassroomCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

pub struct ClassroomClient {
    client: Client,
    credentials: ClassroomCredentials,
    timezone: Tz,
    token: Mutex<Option<CachedToken>>,
    api_base: String,
    token_url: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoursesPage {
    #[serde(default)]
    courses: Vec<ApiCourse>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiCourse {
    id: String,
    name: Option<String>,
    section: Option<String>,
    description_heading: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TopicsPage {
    #[serde(default)]
    topic: Vec<ApiTopic>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiTopic {
    topic_id: String,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CourseWorkPage {
    #[serde(default)]
    course_work: Vec<ApiCourseWork>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiCourseWork {
    id: String,
    title: Option<String>,
    description: Option<String>,
    topic_id: Option<String>,
    due_date: Option<ApiDate>,
    due_time: Option<ApiTimeOfDay>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct ApiDate {
    year: Option<i32>,
    month: Option<u32>,
    day: Option<u32>,
}

/// Protobuf JSON omits zero fields, so `{"hours": 9}` means 09:00.
#[derive(Debug, Clone, Copy, Deserialize)]
struct ApiTimeOfDay {
    hours: Option<u32>,
    minutes: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmissionsPage {
    #[serde(default)]
    student_submissions: Vec<ApiSubmission>,
}

#[derive(Debug, Deserialize)]
struct ApiSubmission {
    state: Option<String>,
}

impl ClassroomClient {
    pub fn new(credentials: ClassroomCredentials, timezone: Tz, http: &HttpConfig) -> Result<Self> {
        Ok(Self {
            client: http.build_client()?,
            credentials,
            timezone,
            token: Mutex::new(None),
            api_base: API_BASE.to_string(),
            token_url: TOKEN_URL.to_string(),
        })
    }

    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Utc::now() + Duration::seconds(TOKEN_EXPIRY_MARGIN_SECS) {
                return Ok(token.access_token.clone());
            }
        }

        log::debug!("Refreshing Classroom access token");
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("refresh_token", self.credentials.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| anyhow!("Token refresh request failed: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(anyhow!("Token refresh failed: HTTP {}: {}", status, text));
        }

        let token: TokenResponse = response
            .json()
            .await
            .context("Malformed token response")?;
        let expires_at = Utc::now() + Duration::seconds(token.expires_in.unwrap_or(3600));
        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at,
        });
        Ok(token.access_token)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let token = self.access_token().await?;
        let url = format!("{}{}", self.api_base, path);

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(|e| anyhow!("Request to {} failed: {}", path, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(anyhow!("HTTP {} from {}: {}", status, path, text));
        }

        response
            .json()
            .await
            .with_context(|| format!("Malformed response from {}", path))
    }

    fn to_coursework(&self, course_id: &str, item: ApiCourseWork) -> RemoteCoursework {
        let due_at = item
            .due_date
            .and_then(|date| due_from_components(date, item.due_time, self.timezone));

        RemoteCoursework {
            id: item.id,
            course_id: course_id.to_string(),
            title: item.title.unwrap_or_else(|| "Untitled Assignment".to_string()),
            description: item.description,
            category_id: item.topic_id,
            due_at,
        }
    }
}

#[async_trait]
impl CourseworkSource for ClassroomClient {
    async fn list_courses(&self) -> Result<Vec<RemoteCourse>> {
        let mut courses = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![("courseStates", "ACTIVE")];
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }
            let page: CoursesPage = self.get_json("/courses", &query).await?;

            courses.extend(page.courses.into_iter().map(|course| RemoteCourse {
                id: course.id,
                name: course.name.unwrap_or_else(|| "Untitled Course".to_string()),
                section: course.section,
                description: course.description_heading,
            }));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        log::debug!("Fetched {} active courses", courses.len());
        Ok(courses)
    }

    async fn list_topics(&self, course_id: &str) -> Result<Vec<RemoteTopic>> {
        let path = format!("/courses/{}/topics", course_id);
        let mut topics = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let query: Vec<(&str, &str)> = page_token
                .as_deref()
                .map(|token| vec![("pageToken", token)])
                .unwrap_or_default();
            let page: TopicsPage = self.get_json(&path, &query).await?;

            topics.extend(page.topic.into_iter().map(|topic| RemoteTopic {
                id: topic.topic_id,
                course_id: course_id.to_string(),
                name: topic.name.unwrap_or_else(|| "Untitled Topic".to_string()),
            }));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(topics)
    }

    async fn list_coursework(&self, course_id: &str) -> Result<Vec<RemoteCoursework>> {
        let path = format!("/courses/{}/courseWork", course_id);
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let query: Vec<(&str, &str)> = page_token
                .as_deref()
                .map(|token| vec![("pageToken", token)])
                .unwrap_or_default();
            let page: CourseWorkPage = self.get_json(&path, &query).await?;

            items.extend(
                page.course_work
                    .into_iter()
                    .map(|item| self.to_coursework(course_id, item)),
            );

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(items)
    }

    async fn submission_status(
        &self,
        course_id: &str,
        coursework_id: &str,
    ) -> Result<SubmissionStatus> {
        let path = format!(
            "/courses/{}/courseWork/{}/studentSubmissions",
            course_id, coursework_id
        );
        let page: SubmissionsPage = self.get_json(&path, &[("userId", "me")]).await?;

        // One submission per student; none at all means nothing was handed in.
        let state = page
            .student_submissions
            .first()
            .and_then(|submission| submission.state.as_deref())
            .unwrap_or("NEW");
        Ok(SubmissionStatus::from_remote_state(state))
    }
}

/// Builds the due instant from Classroom's split date/time fields.
///
/// The components are read as UTC. A missing time means 23:59. A raw 12:59 is
/// Classroom's end-of-day marker and maps to 23:59 on the local day in `tz`.
fn due_from_components(date: ApiDate, time: Option<ApiTimeOfDay>, tz: Tz) -> Option<DateTime<Utc>> {
    let (hours, minutes) = match time {
        Some(t) => (t.hours.unwrap_or(0), t.minutes.unwrap_or(0)),
        None => (23, 59),
    };

    let naive = NaiveDate::from_ymd_opt(date.year?, date.month?, date.day?)?
        .and_hms_opt(hours, minutes, 0)?;
    let due = Utc.from_utc_datetime(&naive);

    if hours == 12 && minutes == 59 {
        let end_of_day = due.with_timezone(&tz).date_naive().and_hms_opt(23, 59, 0)?;
        return tz
            .from_local_datetime(&end_of_day)
            .earliest()
            .map(|local| local.with_timezone(&Utc));
    }

    Some(due)
}
