use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::sync::OnceLock;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Duration,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  TimeZone,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str =
  "taskdeck-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "TASKDECK_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "TASKDECK_TIME_CONFIG";
const DEFAULT_PROJECT_TIMEZONE: &str =
  "UTC";

pub const DUE_DATE_FORMAT: &str =
  "%Y-%m-%d";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

pub fn project_timezone() -> &'static Tz
{
  static PROJECT_TZ: OnceLock<Tz> =
    OnceLock::new();
  PROJECT_TZ.get_or_init(
    resolve_project_timezone
  )
}

/// Calendar date of `now` in `tz`.
#[must_use]
pub fn today_in(
  now: DateTime<Utc>,
  tz: &Tz
) -> NaiveDate {
  now.with_timezone(tz).date_naive()
}

#[must_use]
pub fn format_due_date(
  date: NaiveDate
) -> String {
  date.format(DUE_DATE_FORMAT).to_string()
}

/// Time left until the next local
/// midnight in `tz`. Never zero, so a
/// caller sleeping on it always makes
/// progress past the rollover.
#[must_use]
pub fn until_next_midnight(
  now: DateTime<Utc>,
  tz: &Tz
) -> std::time::Duration {
  let tomorrow = today_in(now, tz)
    .succ_opt()
    .unwrap_or(NaiveDate::MAX);
  let next = local_start_of_day(
    tomorrow, tz
  )
  .unwrap_or_else(|| {
    now + Duration::days(1)
  });

  (next - now)
    .to_std()
    .ok()
    .filter(|left| !left.is_zero())
    .unwrap_or(
      std::time::Duration::from_millis(
        1
      )
    )
}

fn local_start_of_day(
  date: NaiveDate,
  tz: &Tz
) -> Option<DateTime<Utc>> {
  // Some zones skip midnight on DST
  // changes; the first valid hour wins.
  for hour in 0..3 {
    let naive =
      date.and_hms_opt(hour, 0, 0)?;
    match tz.from_local_datetime(&naive)
    {
      | LocalResult::Single(dt) => {
        return Some(
          dt.with_timezone(&Utc)
        );
      }
      | LocalResult::Ambiguous(
        first,
        _
      ) => {
        return Some(
          first.with_timezone(&Utc)
        );
      }
      | LocalResult::None => continue
    }
  }
  None
}

/// Where the zone used for "today" came
/// from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimezoneSource {
  Env,
  File(PathBuf),
  Fallback
}

fn resolve_project_timezone() -> Tz {
  let env = std::env::var(TIMEZONE_ENV_VAR).ok();
  let file = std::env::var(TIMEZONE_CONFIG_ENV_VAR)
    .ok()
    .map(|raw| raw.trim().to_string())
    .filter(|raw| !raw.is_empty())
    .map(PathBuf::from)
    .or_else(|| {
      std::env::current_dir()
        .ok()
        .map(|dir| dir.join(TIMEZONE_CONFIG_FILE))
    });

  let (tz, source) =
    choose_timezone(env.as_deref(), file.as_deref());
  tracing::info!(timezone = %tz, ?source, "project timezone");
  tz
}

/// `TASKDECK_TIMEZONE` beats the toml
/// file, which beats UTC. A source that is
/// set but unusable is logged and skipped.
pub fn choose_timezone(
  env: Option<&str>,
  file: Option<&Path>
) -> (Tz, TimezoneSource) {
  if let Some(tz) = env.and_then(|raw| {
    parse_timezone(raw, TIMEZONE_ENV_VAR)
  }) {
    return (tz, TimezoneSource::Env);
  }

  if let Some(path) = file {
    let label =
      format!("file:{}", path.display());
    match zone_in_file(path) {
      | Ok(Some(raw)) => {
        if let Some(tz) =
          parse_timezone(&raw, &label)
        {
          return (
            tz,
            TimezoneSource::File(
              path.to_path_buf()
            )
          );
        }
      }
      | Ok(None) => {
        tracing::debug!(
          file = %path.display(),
          "no timezone in config file"
        );
      }
      | Err(err) => {
        tracing::warn!(
          error = %format!("{err:#}"),
          "ignoring timezone config file"
        );
      }
    }
  }

  (
    parse_timezone(
      DEFAULT_PROJECT_TIMEZONE,
      "default"
    )
    .unwrap_or(chrono_tz::UTC),
    TimezoneSource::Fallback
  )
}

// `timezone = ".."` at the top level or
// under `[time]`; a missing file is `None`.
fn zone_in_file(
  path: &Path
) -> anyhow::Result<Option<String>> {
  if !path.exists() {
    return Ok(None);
  }
  let raw = fs::read_to_string(path)
    .with_context(|| {
      format!(
        "failed to read {}",
        path.display()
      )
    })?;
  let parsed: TimezoneConfig =
    toml::from_str(&raw).with_context(
      || {
        format!(
          "failed to parse {}",
          path.display()
        )
      }
    )?;
  Ok(parsed.timezone.or_else(|| {
    parsed
      .time
      .and_then(|section| section.timezone)
  }))
}

pub fn parse_timezone(
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
      tracing::debug!(
        source,
        timezone = %trimmed,
        "resolved timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::warn!(
        source,
        timezone = %trimmed,
        error = %err,
        "invalid timezone"
      );
      None
    }
  }
}

/// Parses a due date typed into a form
/// or on the command line. Blank input
/// means "no due date".
#[tracing::instrument(skip(today), fields(input = input))]
pub fn parse_due_date(
  input: &str,
  today: NaiveDate
) -> anyhow::Result<Option<NaiveDate>> {
  let token = input.trim();
  if token.is_empty() {
    return Ok(None);
  }
  let lower =
    token.to_ascii_lowercase();

  match lower.as_str() {
    | "today" => return Ok(Some(today)),
    | "tomorrow" => {
      return today
        .succ_opt()
        .map(Some)
        .ok_or_else(|| {
          anyhow!(
            "date out of range: \
             tomorrow"
          )
        });
    }
    | "yesterday" => {
      return today
        .pred_opt()
        .map(Some)
        .ok_or_else(|| {
          anyhow!(
            "date out of range: \
             yesterday"
          )
        });
    }
    | _ => {}
  }

  if let Some(target_weekday) =
    parse_weekday_name(&lower)
  {
    return Ok(Some(next_weekday_date(
      today,
      target_weekday
    )));
  }

  let rel_re = Regex::new(r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dw])$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;

  if let Some(caps) =
    rel_re.captures(&lower)
  {
    let sign = caps
      .name("sign")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative sign")
      })?;
    let num: i64 = caps
      .name("num")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!(
          "missing relative amount"
        )
      })?
      .parse()
      .context(
        "invalid relative number"
      )?;
    let unit = caps
      .name("unit")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative unit")
      })?;

    let days = match unit {
      | "d" => num,
      | "w" => num.saturating_mul(7),
      | _ => {
        return Err(anyhow!(
          "unknown relative unit: \
           {unit}"
        ))
      }
    };
    let delta = Duration::try_days(
      if sign == "-" { -days } else { days }
    )
    .ok_or_else(|| {
      anyhow!(
        "relative offset too large: \
         {input}"
      )
    })?;

    return today
      .checked_add_signed(delta)
      .map(Some)
      .ok_or_else(|| {
        anyhow!(
          "date out of range: {input}"
        )
      });
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token,
      DUE_DATE_FORMAT
    )
  {
    return Ok(Some(date));
  }

  // Values pasted from a datetime
  // picker keep only their date part.
  for fmt in
    ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
  {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return Ok(Some(ndt.date()));
    }
  }

  Err(anyhow!(
    "unrecognized due date: {input}"
  ))
  .with_context(|| {
    "supported formats: \
     today/tomorrow/yesterday, weekday \
     names (e.g. monday), +Nd/-Nd/+Nw, \
     YYYY-MM-DD"
  })
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token.trim() {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

fn next_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let from_idx = from
    .weekday()
    .num_days_from_monday()
    as i64;
  let target_idx = target
    .num_days_from_monday()
    as i64;
  let mut delta =
    (7 + target_idx - from_idx) % 7;
  if delta == 0 {
    delta = 7;
  }
  from
    .checked_add_signed(Duration::days(
      delta
    ))
    .unwrap_or(from)
}

/// `dueDate` on the wire: `YYYY-MM-DD`,
/// with an empty string or a missing
/// field meaning no due date.
pub mod due_date_serde {
  use chrono::NaiveDate;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  use super::DUE_DATE_FORMAT;

  pub fn serialize<S>(
    date: &Option<NaiveDate>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    match date {
      | Some(value) => {
        serializer.serialize_str(
          &value
            .format(DUE_DATE_FORMAT)
            .to_string()
        )
      }
      | None => {
        serializer.serialize_str("")
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
    match opt.as_deref().map(str::trim)
    {
      | None | Some("") => Ok(None),
      | Some(raw) => {
        NaiveDate::parse_from_str(
          raw,
          DUE_DATE_FORMAT
        )
        .map(Some)
        .map_err(
          serde::de::Error::custom
        )
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    TimeZone,
    Utc
  };

  use super::{
    TimezoneSource,
    choose_timezone,
    parse_due_date,
    today_in,
    until_next_midnight
  };

  fn date(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  #[test]
  fn blank_due_date_is_none() {
    let today = date(2025, 1, 13);
    assert_eq!(
      parse_due_date("  ", today)
        .expect("parse blank"),
      None
    );
  }

  #[test]
  fn parses_named_days() {
    let today = date(2025, 1, 13);
    assert_eq!(
      parse_due_date("Tomorrow", today)
        .expect("parse tomorrow"),
      Some(date(2025, 1, 14))
    );
    assert_eq!(
      parse_due_date("yesterday", today)
        .expect("parse yesterday"),
      Some(date(2025, 1, 12))
    );
  }

  #[test]
  fn parses_weekday_name_strictly_after_today()
   {
    // 2025-01-13 is a Monday.
    let today = date(2025, 1, 13);
    assert_eq!(
      parse_due_date("wednesday", today)
        .expect("parse weekday"),
      Some(date(2025, 1, 15))
    );
    assert_eq!(
      parse_due_date("mon", today)
        .expect("parse weekday"),
      Some(date(2025, 1, 20))
    );
  }

  #[test]
  fn parses_relative_offsets() {
    let today = date(2025, 1, 13);
    assert_eq!(
      parse_due_date("+3d", today)
        .expect("parse +3d"),
      Some(date(2025, 1, 16))
    );
    assert_eq!(
      parse_due_date("-1w", today)
        .expect("parse -1w"),
      Some(date(2025, 1, 6))
    );
  }

  #[test]
  fn parses_iso_dates_and_rejects_noise()
  {
    let today = date(2025, 1, 13);
    assert_eq!(
      parse_due_date(
        "2025-02-01",
        today
      )
      .expect("parse iso"),
      Some(date(2025, 2, 1))
    );
    assert_eq!(
      parse_due_date(
        "2025-02-01T09:30",
        today
      )
      .expect("parse datetime"),
      Some(date(2025, 2, 1))
    );
    assert!(
      parse_due_date("soonish", today)
        .is_err()
    );
  }

  #[test]
  fn today_follows_timezone() {
    let now = Utc
      .with_ymd_and_hms(
        2025, 1, 13, 20, 0, 0
      )
      .single()
      .expect("valid now");
    assert_eq!(
      today_in(now, &chrono_tz::UTC),
      date(2025, 1, 13)
    );
    assert_eq!(
      today_in(
        now,
        &chrono_tz::Asia::Jakarta
      ),
      date(2025, 1, 14)
    );
  }

  #[test]
  fn midnight_is_measured_in_local_time()
  {
    let now = Utc
      .with_ymd_and_hms(
        2025, 1, 13, 23, 59, 30
      )
      .single()
      .expect("valid now");
    assert_eq!(
      until_next_midnight(
        now,
        &chrono_tz::UTC
      ),
      std::time::Duration::from_secs(30)
    );

    // 16:00 UTC is 23:00 in Jakarta.
    let now = Utc
      .with_ymd_and_hms(
        2025, 1, 13, 16, 0, 0
      )
      .single()
      .expect("valid now");
    assert_eq!(
      until_next_midnight(
        now,
        &chrono_tz::Asia::Jakarta
      ),
      std::time::Duration::from_secs(
        3600
      )
    );
  }

  #[test]
  fn midnight_exactly_waits_a_full_day()
  {
    let now = Utc
      .with_ymd_and_hms(
        2025, 1, 13, 0, 0, 0
      )
      .single()
      .expect("valid now");
    assert_eq!(
      until_next_midnight(
        now,
        &chrono_tz::UTC
      ),
      std::time::Duration::from_secs(
        86_400
      )
    );
  }

  #[test]
  fn timezone_sources_in_priority_order()
  {
    let temp =
      tempfile::tempdir().expect("tempdir");
    let file =
      temp.path().join("taskdeck-time.toml");
    std::fs::write(
      &file,
      "[time]\ntimezone = \"Asia/Jakarta\"\n"
    )
    .expect("write toml");

    assert_eq!(
      choose_timezone(
        Some("Europe/Berlin"),
        Some(file.as_path())
      ),
      (
        chrono_tz::Europe::Berlin,
        TimezoneSource::Env
      )
    );
    // A bad env value falls through to
    // the file.
    assert_eq!(
      choose_timezone(
        Some("Mars/Olympus"),
        Some(file.as_path())
      ),
      (
        chrono_tz::Asia::Jakarta,
        TimezoneSource::File(file.clone())
      )
    );

    let missing = temp.path().join("none.toml");
    assert_eq!(
      choose_timezone(None, Some(missing.as_path())),
      (chrono_tz::UTC, TimezoneSource::Fallback)
    );

    std::fs::write(&file, "timezone = [")
      .expect("write broken toml");
    assert_eq!(
      choose_timezone(None, Some(file.as_path())),
      (chrono_tz::UTC, TimezoneSource::Fallback)
    );
  }
}
