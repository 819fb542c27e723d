//! Appointment scheduling state machine.
//!
//! One scheduling attempt moves through
//! `Collecting → Validating → Dispatching → {Succeeded | Degraded}`.
//! Both terminal phases produce a [`SchedulingOutcome`] with a message that
//! can be shown to the customer as-is; no error escapes this module.

use chrono::{DateTime, Datelike, Days, Local, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use concierge_core::calendar::{CalendarDirectory, CalendarSelector};
use concierge_core::contact::{validate_email, validate_phone, ContactExtractor};
use concierge_core::models::{
    ContactRecord, ConversationTurn, Role, SchedulingOutcome, SchedulingRequest,
    SchedulingStatus, TimeWindow,
};
use serde::Deserialize;

use crate::config::{Config, MAX_DURATION_MINUTES};
use crate::gateway::{GatewayError, SchedulingGateway};

const INVALID_CONTACT_MESSAGE: &str = "I'd be happy to set that up! Could you share an email \
address or phone number so our team can confirm your appointment?";

const UNAVAILABLE_MESSAGE: &str = "I wasn't able to reach our scheduling system just now. \
Please try again in a few minutes or give us a call, and a team member will get you booked.";

const REMOTE_ERROR_MESSAGE: &str = "Our scheduling system couldn't complete the booking. \
A team member will follow up with you directly to find a time that works.";

const WINDOW_MESSAGE: &str = "I couldn't book that time. A team member will follow up with you \
directly to find a time that works.";

const PARTIAL_MESSAGE: &str = "We saved your contact details but couldn't confirm the \
appointment time. A team member will follow up with you to finish booking.";

/// Phases of one scheduling attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Collecting,
    Validating,
    Dispatching,
    Succeeded,
    Degraded,
}

impl Phase {
    fn can_advance_to(self, next: Phase) -> bool {
        matches!(
            (self, next),
            (Phase::Collecting, Phase::Validating)
                | (Phase::Validating, Phase::Dispatching)
                | (Phase::Validating, Phase::Degraded)
                | (Phase::Dispatching, Phase::Succeeded)
                | (Phase::Dispatching, Phase::Degraded)
        )
    }
}

/// Tracks the phase of a single attempt and logs each transition.
struct Attempt {
    phase: Phase,
}

impl Attempt {
    fn start() -> Self {
        tracing::debug!(phase = ?Phase::Collecting, "scheduling attempt started");
        Self {
            phase: Phase::Collecting,
        }
    }

    fn advance(&mut self, next: Phase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal transition {:?} -> {:?}",
            self.phase,
            next
        );
        tracing::debug!(from = ?self.phase, to = ?next, "scheduling phase");
        self.phase = next;
    }
}

/// Contact fields supplied explicitly by the caller.
///
/// Values fill or replace extracted fields. Email and phone are validated
/// with the same grammar as extraction; invalid values are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactOverride {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl ContactOverride {
    pub fn apply(&self, mut contact: ContactRecord) -> ContactRecord {
        if let Some(name) = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            contact.name = Some(name.to_string());
        }
        if let Some(raw) = self.email.as_deref() {
            match validate_email(raw) {
                Some(email) => contact.email = Some(email),
                None => tracing::warn!("ignoring invalid email override"),
            }
        }
        if let Some(raw) = self.phone.as_deref() {
            match validate_phone(raw) {
                Some(phone) => contact.phone = Some(phone),
                None => tracing::warn!("ignoring invalid phone override"),
            }
        }
        contact
    }
}

/// Caller-supplied adjustments to a scheduling attempt.
#[derive(Debug, Clone, Default)]
pub struct ScheduleOptions {
    pub contact: ContactOverride,
    /// Explicit start time; defaults to the next business day.
    pub start: Option<NaiveDateTime>,
}

/// Parse an explicit start time: RFC 3339 (offset dropped, wall-clock
/// time kept) or a bare `YYYY-MM-DDTHH:MM[:SS]`.
pub fn parse_start_time(raw: &str) -> anyhow::Result<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.naive_local());
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(dt);
        }
    }
    anyhow::bail!("Invalid start time '{}': expected RFC 3339, e.g. 2025-03-04T14:00:00-06:00", raw)
}

/// The first Monday–Friday date strictly after `today`.
pub fn next_business_day(today: NaiveDate) -> NaiveDate {
    let mut day = today + Days::new(1);
    while matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
        day = day + Days::new(1);
    }
    day
}

/// Drives contact extraction, calendar selection and the gateway call.
pub struct AppointmentOrchestrator<G> {
    gateway: G,
    extractor: ContactExtractor,
    selector: CalendarSelector,
    calendars: CalendarDirectory,
    default_time: NaiveTime,
    duration: chrono::Duration,
}

impl<G: SchedulingGateway> AppointmentOrchestrator<G> {
    pub fn new(gateway: G, config: &Config) -> anyhow::Result<Self> {
        let scheduling = &config.scheduling;
        Ok(Self {
            gateway,
            extractor: ContactExtractor::new(scheduling.summary_turns, scheduling.summary_chars),
            selector: CalendarSelector::new()?,
            calendars: config.calendars.clone(),
            default_time: NaiveTime::from_hms_opt(scheduling.default_hour.min(23), 0, 0)
                .unwrap_or(NaiveTime::MIN),
            duration: chrono::Duration::minutes(
                scheduling.duration_minutes.clamp(1, MAX_DURATION_MINUTES),
            ),
        })
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn extractor(&self) -> &ContactExtractor {
        &self.extractor
    }

    /// The window used when the customer expressed no time.
    pub fn default_window(&self, now: NaiveDateTime) -> Option<TimeWindow> {
        self.window_at(next_business_day(now.date()).and_time(self.default_time))
    }

    /// `None` when the end of the window is not representable.
    fn window_at(&self, start: NaiveDateTime) -> Option<TimeWindow> {
        let end = start.checked_add_signed(self.duration)?;
        Some(TimeWindow { start, end })
    }

    /// Schedule from a conversation history.
    ///
    /// The calendar is chosen from everything the customer said, not only
    /// the bounded summary.
    pub async fn schedule_from_conversation(
        &self,
        turns: &[ConversationTurn],
        options: &ScheduleOptions,
    ) -> SchedulingOutcome {
        let mut attempt = Attempt::start();

        let extracted = self.extractor.extract(turns);
        let contact = options.contact.apply(extracted);
        let user_text = turns
            .iter()
            .filter(|t| t.role == Role::User)
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        self.run(&mut attempt, contact, &user_text, options.start)
            .await
    }

    /// Schedule an already-collected contact. The calendar is chosen from
    /// the contact's summary.
    pub async fn schedule_contact(
        &self,
        contact: ContactRecord,
        start: Option<NaiveDateTime>,
    ) -> SchedulingOutcome {
        let mut attempt = Attempt::start();
        let calendar_text = contact.summary.clone();
        self.run(&mut attempt, contact, &calendar_text, start).await
    }

    async fn run(
        &self,
        attempt: &mut Attempt,
        contact: ContactRecord,
        calendar_text: &str,
        start: Option<NaiveDateTime>,
    ) -> SchedulingOutcome {
        attempt.advance(Phase::Validating);
        tracing::info!(
            has_name = contact.name.is_some(),
            has_email = contact.email.is_some(),
            has_phone = contact.phone.is_some(),
            "validating contact"
        );
        if !contact.has_channel() {
            attempt.advance(Phase::Degraded);
            tracing::info!(status = SchedulingStatus::InvalidContact.as_str(), "no contact channel");
            return SchedulingOutcome::Degraded {
                status: SchedulingStatus::InvalidContact,
                contact_id: None,
                message: INVALID_CONTACT_MESSAGE.to_string(),
            };
        }

        attempt.advance(Phase::Dispatching);
        let calendar = self.selector.select(calendar_text);
        let window = match start {
            Some(start) => self.window_at(start),
            None => self.default_window(Local::now().naive_local()),
        };
        let Some(window) = window else {
            attempt.advance(Phase::Degraded);
            tracing::warn!(?start, "appointment window out of range");
            return SchedulingOutcome::Degraded {
                status: SchedulingStatus::RemoteError,
                contact_id: None,
                message: WINDOW_MESSAGE.to_string(),
            };
        };
        let request = SchedulingRequest {
            calendar_id: self.calendars.id_for(calendar),
            contact,
            calendar,
            window,
        };
        tracing::info!(calendar = %calendar, start = %window.start, "dispatching scheduling request");

        match self.gateway.create_contact_and_schedule(&request).await {
            Ok(confirmation) => {
                attempt.advance(Phase::Succeeded);
                tracing::info!(
                    contact_id = %confirmation.contact_id,
                    appointment_id = %confirmation.appointment_id,
                    "appointment scheduled"
                );
                SchedulingOutcome::Succeeded {
                    message: confirmation_message(&request),
                    contact_id: confirmation.contact_id,
                    appointment_id: confirmation.appointment_id,
                    calendar,
                    start: window.start,
                }
            }
            Err(err) => {
                attempt.advance(Phase::Degraded);
                let status = err.status();
                tracing::warn!(status = status.as_str(), error = %err, "scheduling degraded");
                degraded(err)
            }
        }
    }
}

fn degraded(err: GatewayError) -> SchedulingOutcome {
    let status = err.status();
    match err {
        GatewayError::Incomplete { contact_id } => SchedulingOutcome::Degraded {
            status,
            contact_id,
            message: PARTIAL_MESSAGE.to_string(),
        },
        _ => SchedulingOutcome::Degraded {
            status,
            contact_id: None,
            message: match status {
                SchedulingStatus::GatewayUnavailable => UNAVAILABLE_MESSAGE,
                _ => REMOTE_ERROR_MESSAGE,
            }
            .to_string(),
        },
    }
}

fn confirmation_message(request: &SchedulingRequest) -> String {
    let when = request.window.start.format("%A, %B %-d at %-I:%M %p");
    let reach = match (&request.contact.email, &request.contact.phone) {
        (Some(email), _) => format!(" We'll send a confirmation to {}.", email),
        (None, Some(phone)) => format!(" We'll call {} to confirm.", phone),
        (None, None) => String::new(),
    };
    let greeting = request
        .contact
        .name
        .as_deref()
        .map(|n| format!("Thanks, {}! ", n))
        .unwrap_or_default();
    format!(
        "{}Your {} is booked for {}.{}",
        greeting,
        request.calendar.label(),
        when,
        reach
    )
}
