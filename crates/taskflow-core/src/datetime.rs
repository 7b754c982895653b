use std::sync::OnceLock;

use chrono::{
  DateTime,
  Local,
  NaiveDate,
  Utc
};
use chrono_tz::Tz;

use crate::error::TaskflowError;

const TIMEZONE_ENV_VAR: &str =
  "TASKFLOW_TIMEZONE";
const INPUT_DATE_FORMAT: &str =
  "%Y-%m-%d";
const DISPLAY_DATE_FORMAT: &str =
  "%b %-d, %Y";

static PROJECT_TZ: OnceLock<
  ProjectTimezone
> = OnceLock::new();

/// Zone that decides which calendar day
/// "today" is.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum ProjectTimezone {
  Named(Tz),
  /// The host's local zone, what a
  /// browser `Date` would use.
  SystemLocal
}

impl ProjectTimezone {
  #[must_use]
  pub fn today_at(
    self,
    now: DateTime<Utc>
  ) -> NaiveDate {
    match self {
      | ProjectTimezone::Named(tz) => {
        now.with_timezone(&tz).date_naive()
      }
      | ProjectTimezone::SystemLocal => {
        now
          .with_timezone(&Local)
          .date_naive()
      }
    }
  }
}

/// Resolves the timezone used for every
/// "today" computation: the env var, then
/// the configured value, then the system
/// zone. Only the first call decides.
pub fn init_project_timezone(
  configured: Option<&str>
) -> ProjectTimezone {
  *PROJECT_TZ.get_or_init(|| {
    choose_timezone(
      std::env::var(TIMEZONE_ENV_VAR)
        .ok()
        .as_deref(),
      configured
    )
  })
}

pub fn project_timezone()
-> ProjectTimezone {
  init_project_timezone(None)
}

#[must_use]
pub fn today() -> NaiveDate {
  project_timezone().today_at(Utc::now())
}

fn choose_timezone(
  from_env: Option<&str>,
  configured: Option<&str>
) -> ProjectTimezone {
  if let Some(raw) = from_env
    && let Some(tz) =
      parse_timezone(raw, TIMEZONE_ENV_VAR)
  {
    return ProjectTimezone::Named(tz);
  }

  if let Some(raw) = configured
    && let Some(tz) =
      parse_timezone(raw, "config")
  {
    return ProjectTimezone::Named(tz);
  }

  tracing::debug!(
    "no timezone configured; using the \
     system zone"
  );
  ProjectTimezone::SystemLocal
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "resolved project timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "invalid timezone"
      );
      None
    }
  }
}

/// Calendar-day comparison: a deadline
/// of today is not overdue.
#[must_use]
pub fn is_overdue(
  deadline: NaiveDate,
  today: NaiveDate
) -> bool {
  deadline < today
}

#[must_use]
pub fn days_until_deadline(
  deadline: NaiveDate,
  today: NaiveDate
) -> i64 {
  deadline
    .signed_duration_since(today)
    .num_days()
}

#[must_use]
pub fn format_date(
  deadline: NaiveDate
) -> String {
  deadline
    .format(DISPLAY_DATE_FORMAT)
    .to_string()
}

#[must_use]
pub fn date_for_input(
  deadline: Option<NaiveDate>
) -> String {
  deadline
    .map(|date| {
      date
        .format(INPUT_DATE_FORMAT)
        .to_string()
    })
    .unwrap_or_default()
}

/// Accepts the date-input shape or a
/// full RFC 3339 timestamp, whose UTC
/// date is kept. Blank input means no
/// deadline.
pub fn parse_deadline(
  raw: &str
) -> Result<Option<NaiveDate>, TaskflowError>
{
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return Ok(None);
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      trimmed,
      INPUT_DATE_FORMAT
    )
  {
    return Ok(Some(date));
  }

  DateTime::parse_from_rfc3339(trimmed)
    .map(|dt| {
      Some(
        dt.with_timezone(&Utc)
          .date_naive()
      )
    })
    .map_err(|_| {
      TaskflowError::InvalidDate(
        trimmed.to_string()
      )
    })
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    TimeZone,
    Utc
  };

  use super::{
    ProjectTimezone,
    choose_timezone,
    date_for_input,
    days_until_deadline,
    format_date,
    is_overdue,
    parse_deadline
  };

  fn ymd(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  #[test]
  fn env_beats_config_and_system_is_last()
  {
    assert_eq!(
      choose_timezone(
        Some("Asia/Tokyo"),
        Some("Europe/Berlin")
      ),
      ProjectTimezone::Named(
        chrono_tz::Asia::Tokyo
      )
    );
    assert_eq!(
      choose_timezone(
        Some("Not/AZone"),
        Some("Europe/Berlin")
      ),
      ProjectTimezone::Named(
        chrono_tz::Europe::Berlin
      )
    );
    assert_eq!(
      choose_timezone(None, Some(" ")),
      ProjectTimezone::SystemLocal
    );
  }

  #[test]
  fn today_follows_the_zone_calendar() {
    // 01:00 UTC on Jan 2 is still Jan 1
    // evening on the US west coast.
    let now = Utc
      .with_ymd_and_hms(2025, 1, 2, 1, 0, 0)
      .single()
      .expect("valid instant");
    let pacific = ProjectTimezone::Named(
      chrono_tz::America::Los_Angeles
    );
    assert_eq!(
      pacific.today_at(now),
      ymd(2025, 1, 1)
    );
    assert_eq!(
      ProjectTimezone::Named(chrono_tz::UTC)
        .today_at(now),
      ymd(2025, 1, 2)
    );
  }

  #[test]
  fn past_deadline_is_overdue() {
    assert!(is_overdue(
      ymd(2020, 1, 1),
      ymd(2025, 1, 1)
    ));
    assert!(!is_overdue(
      ymd(2025, 1, 1),
      ymd(2025, 1, 1)
    ));
    assert!(!is_overdue(
      ymd(2025, 1, 2),
      ymd(2025, 1, 1)
    ));
  }

  #[test]
  fn days_until_is_signed() {
    let today = ymd(2026, 2, 17);
    assert_eq!(
      days_until_deadline(
        ymd(2026, 2, 20),
        today
      ),
      3
    );
    assert_eq!(
      days_until_deadline(today, today),
      0
    );
    assert_eq!(
      days_until_deadline(
        ymd(2026, 2, 10),
        today
      ),
      -7
    );
  }

  #[test]
  fn formats_for_display_and_input() {
    assert_eq!(
      format_date(ymd(2025, 1, 5)),
      "Jan 5, 2025"
    );
    assert_eq!(
      date_for_input(Some(ymd(
        2025, 1, 5
      ))),
      "2025-01-05"
    );
    assert_eq!(date_for_input(None), "");
  }

  #[test]
  fn parses_input_and_timestamp_shapes()
  {
    assert_eq!(
      parse_deadline("2099-01-01")
        .expect("plain date"),
      Some(ymd(2099, 1, 1))
    );
    assert_eq!(
      parse_deadline(
        "2024-03-09T00:00:00.000Z"
      )
      .expect("timestamp"),
      Some(ymd(2024, 3, 9))
    );
    assert_eq!(
      parse_deadline("   ")
        .expect("blank"),
      None
    );
    assert!(
      parse_deadline("next tuesday")
        .is_err()
    );
  }

  #[test]
  fn timestamp_serde_matches_iso_string()
  {
    #[derive(
      serde::Serialize,
      serde::Deserialize,
    )]
    struct Wrapper {
      #[serde(
        with = "super::iso_timestamp_serde"
      )]
      at: chrono::DateTime<Utc>
    }

    let at = Utc
      .with_ymd_and_hms(
        2025, 6, 1, 8, 30, 0
      )
      .single()
      .expect("valid instant");
    let json = serde_json::to_string(
      &Wrapper {
        at
      }
    )
    .expect("serialize");
    assert_eq!(
      json,
      r#"{"at":"2025-06-01T08:30:00.000Z"}"#
    );

    let back: Wrapper =
      serde_json::from_str(
        r#"{"at":"2025-06-01T08:30:00Z"}"#
      )
      .expect("deserialize");
    assert_eq!(back.at, at);
  }
}

pub mod iso_timestamp_serde {
  use chrono::{
    DateTime,
    SecondsFormat,
    Utc
  };
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    dt: &DateTime<Utc>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &dt.to_rfc3339_opts(
        SecondsFormat::Millis,
        true
      )
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<DateTime<Utc>, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    DateTime::parse_from_rfc3339(&raw)
      .map(|dt| dt.with_timezone(&Utc))
      .map_err(serde::de::Error::custom)
  }
}

pub mod deadline_serde {
  use chrono::NaiveDate;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    deadline: &Option<NaiveDate>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    match deadline {
      | Some(date) => {
        serializer.serialize_str(
          &super::date_for_input(Some(
            *date
          ))
        )
      }
      | None => {
        serializer.serialize_none()
      }
    }
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<Option<NaiveDate>, D::Error>
  where
    D: Deserializer<'de>
  {
    let opt =
      Option::<String>::deserialize(
        deserializer
      )?;
    match opt {
      | Some(raw) => {
        super::parse_deadline(&raw)
          .map_err(
            serde::de::Error::custom
          )
      }
      | None => Ok(None)
    }
  }
}
