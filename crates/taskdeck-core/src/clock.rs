use std::str::FromStr;
use std::sync::{
  Arc,
  Mutex
};

use anyhow::anyhow;
use chrono::{
  DateTime,
  Datelike,
  NaiveDateTime,
  Timelike,
  Utc
};

/// Source of "now". Everything date
/// dependent takes its time from here.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

/// Settable clock for tests and replays.
#[derive(Debug, Clone)]
pub struct FixedClock {
  now: Arc<Mutex<DateTime<Utc>>>
}

impl FixedClock {
  pub fn new(
    now: DateTime<Utc>
  ) -> Self {
    Self {
      now: Arc::new(Mutex::new(now))
    }
  }

  pub fn set(
    &self,
    now: DateTime<Utc>
  ) {
    if let Ok(mut guard) =
      self.now.lock()
    {
      *guard = now;
    }
  }

  pub fn advance(
    &self,
    by: chrono::Duration
  ) {
    if let Ok(mut guard) =
      self.now.lock()
    {
      *guard += by;
    }
  }
}

impl Clock for FixedClock {
  fn now(&self) -> DateTime<Utc> {
    match self.now.lock() {
      | Ok(guard) => *guard,
      | Err(poisoned) => {
        *poisoned.into_inner()
      }
    }
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
  Default,
)]
pub enum ClockLocale {
  #[default]
  En,
  Id
}

impl FromStr for ClockLocale {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "en" | "en-us" | "en-gb" => {
        Ok(ClockLocale::En)
      }
      | "id" | "id-id" => {
        Ok(ClockLocale::Id)
      }
      | other => {
        Err(anyhow!(
          "unsupported clock locale: \
           {other}"
        ))
      }
    }
  }
}

const EN_DAYS: [&str; 7] = [
  "Sunday",
  "Monday",
  "Tuesday",
  "Wednesday",
  "Thursday",
  "Friday",
  "Saturday"
];
const ID_DAYS: [&str; 7] = [
  "Minggu", "Senin", "Selasa", "Rabu",
  "Kamis", "Jumat", "Sabtu"
];
const EN_MONTHS: [&str; 12] = [
  "January",
  "February",
  "March",
  "April",
  "May",
  "June",
  "July",
  "August",
  "September",
  "October",
  "November",
  "December"
];
const ID_MONTHS: [&str; 12] = [
  "Januari",
  "Februari",
  "Maret",
  "April",
  "Mei",
  "Juni",
  "Juli",
  "Agustus",
  "September",
  "Oktober",
  "November",
  "Desember"
];

#[derive(
  Debug, Clone, PartialEq, Eq,
)]
pub struct ClockDisplay {
  pub time: String,
  pub date: String
}

/// Renders a local wall-clock time as
/// `09:05:03 PM` (or `21:05:03`) and
/// `Monday, 13 January 2025`.
#[must_use]
pub fn format_clock(
  local: NaiveDateTime,
  locale: ClockLocale,
  hour12: bool
) -> ClockDisplay {
  let (hour, suffix) = if hour12 {
    let h = local.hour() % 12;
    let h = if h == 0 { 12 } else { h };
    let ampm = if local.hour() >= 12 {
      " PM"
    } else {
      " AM"
    };
    (h, ampm)
  } else {
    (local.hour(), "")
  };

  let time = format!(
    "{hour:02}:{:02}:{:02}{suffix}",
    local.minute(),
    local.second()
  );

  let (days, months) = match locale {
    | ClockLocale::En => {
      (&EN_DAYS, &EN_MONTHS)
    }
    | ClockLocale::Id => {
      (&ID_DAYS, &ID_MONTHS)
    }
  };
  let weekday = days[local
    .weekday()
    .num_days_from_sunday()
    as usize];
  let month =
    months[local.month0() as usize];
  let date = format!(
    "{weekday}, {} {month} {}",
    local.day(),
    local.year()
  );

  ClockDisplay {
    time,
    date
  }
}
