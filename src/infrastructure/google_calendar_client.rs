use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::GoogleCalendarEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::sync::Mutex;
use url::Url;

const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3/";

#[async_trait]
pub trait GoogleCalendarClient: Send + Sync {
    /// Events in `[time_min, time_max)`, all pages, cancelled ones removed.
    async fn list_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<GoogleCalendarEvent>, InfraError>;

    /// Inserts the event and returns the id Google assigned.
    async fn create_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event: &GoogleCalendarEvent,
    ) -> Result<String, InfraError>;
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestGoogleCalendarClient {
    client: Client,
}

impl ReqwestGoogleCalendarClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
        if value.trim().is_empty() {
            return Err(InfraError::OAuth(format!("{field} must not be empty")));
        }
        Ok(())
    }

    /// A 401 from the Calendar API means the stored token is no longer
    /// accepted.
    fn http_error(status: StatusCode, body: &str) -> InfraError {
        if status == StatusCode::UNAUTHORIZED {
            return InfraError::ReauthenticationRequired;
        }
        if body.trim().is_empty() {
            InfraError::OAuth(format!("google calendar api error: http {}", status.as_u16()))
        } else {
            InfraError::OAuth(format!(
                "google calendar api error: http {}; body={body}",
                status.as_u16()
            ))
        }
    }

    fn events_endpoint(calendar_id: &str) -> Result<Url, InfraError> {
        let mut url = Url::parse(CALENDAR_API_BASE)
            .map_err(|error| InfraError::OAuth(format!("invalid calendar api base url: {error}")))?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                InfraError::OAuth("calendar api base URL cannot be a base".to_string())
            })?;
            segments.pop_if_empty();
            segments.push("calendars");
            segments.push(calendar_id);
            segments.push("events");
        }
        Ok(url)
    }
}

#[derive(Debug, serde::Deserialize)]
struct EventsPage {
    items: Option<Vec<GoogleCalendarEvent>>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[async_trait]
impl GoogleCalendarClient for ReqwestGoogleCalendarClient {
    async fn list_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<GoogleCalendarEvent>, InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(calendar_id, "calendar id")?;

        let endpoint = Self::events_endpoint(calendar_id)?;
        let mut page_token: Option<String> = None;
        let mut events = Vec::new();

        loop {
            let mut request = self
                .client
                .get(endpoint.clone())
                .bearer_auth(access_token)
                .query(&[
                    ("singleEvents", "true".to_string()),
                    ("orderBy", "startTime".to_string()),
                    ("maxResults", "2500".to_string()),
                    ("timeMin", time_min.to_rfc3339()),
                    ("timeMax", time_max.to_rfc3339()),
                ]);
            if let Some(page_token) = page_token.as_deref() {
                request = request.query(&[("pageToken", page_token)]);
            }

            let response = request.send().await.map_err(|error| {
                InfraError::OAuth(format!("network error while listing calendar events: {error}"))
            })?;
            let status = response.status();
            let body = response.text().await.map_err(|error| {
                InfraError::OAuth(format!("failed reading events list response: {error}"))
            })?;
            if !status.is_success() {
                return Err(Self::http_error(status, &body));
            }

            let page: EventsPage = serde_json::from_str(&body).map_err(|error| {
                InfraError::OAuth(format!("invalid events list payload: {error}"))
            })?;
            events.extend(
                page.items
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|event| !event.is_cancelled()),
            );

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(events)
    }

    async fn create_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event: &GoogleCalendarEvent,
    ) -> Result<String, InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(calendar_id, "calendar id")?;

        let endpoint = Self::events_endpoint(calendar_id)?;
        let response = self
            .client
            .post(endpoint)
            .bearer_auth(access_token)
            .json(event)
            .send()
            .await
            .map_err(|error| InfraError::OAuth(format!("network error while creating event: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::OAuth(format!("failed reading event create response: {error}")))?;
        if !status.is_success() {
            return Err(Self::http_error(status, &body));
        }

        let created: GoogleCalendarEvent = serde_json::from_str(&body)
            .map_err(|error| InfraError::OAuth(format!("invalid event create payload: {error}")))?;
        created
            .id
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| InfraError::OAuth("event create response did not include id".to_string()))
    }
}

/// Calendar client backed by a map, keyed by calendar id.
#[derive(Debug, Default)]
pub struct InMemoryGoogleCalendarClient {
    calendars: Mutex<HashMap<String, Vec<GoogleCalendarEvent>>>,
    rejected_summaries: Mutex<Vec<String>>,
    listing_failure: Mutex<Option<String>>,
}

impl InMemoryGoogleCalendarClient {
    pub fn with_events(calendar_id: &str, events: Vec<GoogleCalendarEvent>) -> Self {
        let client = Self::default();
        if let Ok(mut calendars) = client.calendars.lock() {
            calendars.insert(calendar_id.to_string(), events);
        }
        client
    }

    /// Makes `create_event` fail for events with this summary.
    pub fn reject_summary(&self, summary: &str) -> Result<(), InfraError> {
        self.rejected_summaries
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("in-memory calendar: {error}")))?
            .push(summary.to_string());
        Ok(())
    }

    /// Makes every `list_events` call fail with this message.
    pub fn fail_listing(&self, message: &str) -> Result<(), InfraError> {
        *self
            .listing_failure
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("in-memory calendar: {error}")))? =
            Some(message.to_string());
        Ok(())
    }

    pub fn events(&self, calendar_id: &str) -> Result<Vec<GoogleCalendarEvent>, InfraError> {
        Ok(self
            .calendars
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("in-memory calendar: {error}")))?
            .get(calendar_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl GoogleCalendarClient for InMemoryGoogleCalendarClient {
    async fn list_events(
        &self,
        _access_token: &str,
        calendar_id: &str,
        _time_min: DateTime<Utc>,
        _time_max: DateTime<Utc>,
    ) -> Result<Vec<GoogleCalendarEvent>, InfraError> {
        let failure = self
            .listing_failure
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("in-memory calendar: {error}")))?
            .clone();
        if let Some(message) = failure {
            return Err(InfraError::OAuth(message));
        }
        Ok(self
            .events(calendar_id)?
            .into_iter()
            .filter(|event| !event.is_cancelled())
            .collect())
    }

    async fn create_event(
        &self,
        _access_token: &str,
        calendar_id: &str,
        event: &GoogleCalendarEvent,
    ) -> Result<String, InfraError> {
        let rejected = self
            .rejected_summaries
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("in-memory calendar: {error}")))?
            .iter()
            .any(|summary| event.summary.as_deref() == Some(summary.as_str()));
        if rejected {
            return Err(InfraError::OAuth("google calendar api error: http 400".to_string()));
        }

        let mut calendars = self
            .calendars
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("in-memory calendar: {error}")))?;
        let events = calendars.entry(calendar_id.to_string()).or_default();
        let id = format!("mem-{}", events.len() + 1);
        let mut stored = event.clone();
        stored.id = Some(id.clone());
        events.push(stored);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_endpoint_escapes_calendar_id() {
        let url = ReqwestGoogleCalendarClient::events_endpoint("team@group.calendar.google.com")
            .expect("endpoint");
        assert_eq!(
            url.as_str(),
            "https://www.googleapis.com/calendar/v3/calendars/team@group.calendar.google.com/events"
        );

        let url = ReqwestGoogleCalendarClient::events_endpoint("a/b").expect("endpoint");
        assert!(url.as_str().ends_with("/calendars/a%2Fb/events"));
    }

    #[test]
    fn unauthorized_maps_to_reauthentication() {
        assert!(matches!(
            ReqwestGoogleCalendarClient::http_error(StatusCode::UNAUTHORIZED, ""),
            InfraError::ReauthenticationRequired
        ));
        assert!(matches!(
            ReqwestGoogleCalendarClient::http_error(StatusCode::BAD_REQUEST, "bad"),
            InfraError::OAuth(_)
        ));
    }

    #[test]
    fn in_memory_client_assigns_ids_and_drops_cancelled() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        runtime.block_on(async {
            let cancelled: GoogleCalendarEvent =
                serde_json::from_str(r#"{"id": "gone", "status": "cancelled"}"#).expect("parse");
            let client = InMemoryGoogleCalendarClient::with_events("primary", vec![cancelled]);
            let created: GoogleCalendarEvent =
                serde_json::from_str(r#"{"summary": "Focus"}"#).expect("parse");

            let id = client
                .create_event("token", "primary", &created)
                .await
                .expect("create");
            assert_eq!(id, "mem-2");

            let listed = client
                .list_events("token", "primary", Utc::now(), Utc::now())
                .await
                .expect("list");
            assert_eq!(listed.len(), 1);
            assert_eq!(listed[0].id.as_deref(), Some("mem-2"));
        });
    }
}
