use anyhow::{
  Context,
  anyhow
};
use chrono::{
  Datelike,
  Duration,
  Local,
  NaiveDate,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use serde::{
  Deserialize,
  Serialize
};
use thiserror::Error;

pub const DATE_FORMAT: &str =
  "%Y-%m-%d";
const TIMEZONE_ENV_VAR: &str =
  "DAYLIST_TIMEZONE";

/// Resolves the zone used to decide
/// which calendar day "today" is. The
/// environment wins over the configured
/// value; `None` means the system zone.
pub fn resolve_timezone(
  configured: Option<&str>
) -> Option<Tz> {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) = parse_timezone(
      &raw,
      TIMEZONE_ENV_VAR
    )
  {
    return Some(tz);
  }

  configured.and_then(|raw| {
    parse_timezone(raw, "config")
  })
}

#[must_use]
pub fn today(
  tz: Option<Tz>
) -> NaiveDate {
  match tz {
    | Some(tz) => {
      Utc::now()
        .with_timezone(&tz)
        .date_naive()
    }
    | None => Local::now().date_naive()
  }
}

/// 0 = Sunday ... 6 = Saturday.
#[must_use]
pub fn weekday_index(
  date: NaiveDate
) -> u8 {
  date.weekday().num_days_from_sunday()
    as u8
}

#[must_use]
pub fn format_date(
  date: NaiveDate
) -> String {
  date.format(DATE_FORMAT).to_string()
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
      tracing::debug!(
        source,
        timezone = %trimmed,
        "configured timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
  Error,
)]
#[error(
  "weekday index out of range \
   (0=Sunday..6=Saturday): {0}"
)]
pub struct InvalidWeekday(pub u8);

/// Set of weekday indices, stored as a
/// bitmask. Serialized as the sorted
/// array of indices.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
)]
#[serde(
  try_from = "Vec<u8>",
  into = "Vec<u8>"
)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
  pub const EMPTY: Self = Self(0);

  pub fn from_indices<I>(
    indices: I
  ) -> Result<Self, InvalidWeekday>
  where
    I: IntoIterator<Item = u8>
  {
    let mut set = Self::EMPTY;
    for idx in indices {
      set.insert(idx)?;
    }
    Ok(set)
  }

  pub fn insert(
    &mut self,
    idx: u8
  ) -> Result<(), InvalidWeekday> {
    if idx > 6 {
      return Err(InvalidWeekday(idx));
    }
    self.0 |= 1 << idx;
    Ok(())
  }

  #[must_use]
  pub fn contains(
    &self,
    idx: u8
  ) -> bool {
    idx <= 6 && self.0 & (1 << idx) != 0
  }

  #[must_use]
  pub fn contains_date(
    &self,
    date: NaiveDate
  ) -> bool {
    self.contains(weekday_index(date))
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.0 == 0
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self.0.count_ones() as usize
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = u8> + '_
  {
    (0..=6).filter(|idx| {
      self.contains(*idx)
    })
  }
}

impl TryFrom<Vec<u8>> for WeekdaySet {
  type Error = InvalidWeekday;

  fn try_from(
    value: Vec<u8>
  ) -> Result<Self, Self::Error> {
    Self::from_indices(value)
  }
}

impl From<WeekdaySet> for Vec<u8> {
  fn from(value: WeekdaySet) -> Self {
    value.iter().collect()
  }
}

/// Parses `mon,wed`, `1,3`, `weekdays`,
/// `weekends`, `daily` or `none`.
#[tracing::instrument]
pub fn parse_weekday_set(
  raw: &str
) -> anyhow::Result<WeekdaySet> {
  let mut set = WeekdaySet::EMPTY;

  for part in raw.split(',') {
    let token =
      part.trim().to_ascii_lowercase();
    match token.as_str() {
      | "" | "none" => {}
      | "daily" | "everyday" => {
        set = WeekdaySet::from_indices(
          0..=6
        )?;
      }
      | "weekdays" => {
        for idx in 1..=5 {
          set.insert(idx)?;
        }
      }
      | "weekends" => {
        set.insert(0)?;
        set.insert(6)?;
      }
      | other => {
        let idx = if let Ok(idx) =
          other.parse::<u8>()
        {
          idx
        } else {
          parse_weekday_name(other)
            .map(|day| {
              day.num_days_from_sunday()
                as u8
            })
            .ok_or_else(|| {
              anyhow!(
                "unknown weekday: \
                 {other}"
              )
            })?
        };
        set.insert(idx)?;
      }
    }
  }

  Ok(set)
}

/// Resolves a user supplied calendar
/// date relative to `today`.
#[tracing::instrument(skip(today), fields(input = input))]
pub fn parse_date_expr(
  input: &str,
  today: NaiveDate
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  match lower.as_str() {
    | "today" => return Ok(today),
    | "tomorrow" => {
      return shift_days(today, 1);
    }
    | "yesterday" => {
      return shift_days(today, -1);
    }
    | _ => {}
  }

  if let Some(target_weekday) =
    parse_weekday_name(&lower)
  {
    return Ok(next_weekday_date(
      today,
      target_weekday
    ));
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
    let days = match caps
      .name("unit")
      .map(|m| m.as_str())
    {
      | Some("d") => num,
      | Some("w") => {
        num.checked_mul(7).ok_or_else(
          || {
            anyhow!(
              "relative offset too \
               large: {token}"
            )
          }
        )?
      }
      | other => {
        return Err(anyhow!(
          "unknown relative unit: \
           {other:?}"
        ));
      }
    };

    return shift_days(
      today,
      if sign == "-" {
        -days
      } else {
        days
      }
    );
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token,
      DATE_FORMAT
    )
  {
    return Ok(date);
  }

  Err(anyhow!(
    "unrecognized date expression: \
     {input}"
  ))
  .with_context(|| {
    "supported formats: \
     today/tomorrow/yesterday, \
     weekday names (e.g. monday), \
     +Nd/-Nd/+Nw/-Nw, YYYY-MM-DD"
  })
}

fn shift_days(
  from: NaiveDate,
  days: i64
) -> anyhow::Result<NaiveDate> {
  Duration::try_days(days)
    .and_then(|delta| {
      from.checked_add_signed(delta)
    })
    .ok_or_else(|| {
      anyhow!(
        "date out of range: {from} \
         shifted by {days} days"
      )
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

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::{
    WeekdaySet,
    parse_date_expr,
    parse_weekday_set,
    weekday_index
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
  fn weekday_index_starts_on_sunday() {
    assert_eq!(
      weekday_index(date(2024, 1, 7)),
      0
    );
    assert_eq!(
      weekday_index(date(2024, 1, 1)),
      1
    );
    assert_eq!(
      weekday_index(date(2024, 1, 6)),
      6
    );
  }

  #[test]
  fn parses_keywords_and_offsets() {
    let today = date(2026, 2, 17);
    assert_eq!(
      parse_date_expr("today", today)
        .expect("today"),
      today
    );
    assert_eq!(
      parse_date_expr(
        "Tomorrow", today
      )
      .expect("tomorrow"),
      date(2026, 2, 18)
    );
    assert_eq!(
      parse_date_expr("+2w", today)
        .expect("two weeks"),
      date(2026, 3, 3)
    );
    assert_eq!(
      parse_date_expr("-3d", today)
        .expect("three days back"),
      date(2026, 2, 14)
    );
  }

  #[test]
  fn parses_weekday_name() {
    let today = date(2026, 2, 17);
    assert_eq!(
      parse_date_expr(
        "wednesday",
        today
      )
      .expect("parse weekday"),
      date(2026, 2, 18)
    );
    assert_eq!(
      parse_date_expr("tue", today)
        .expect("same weekday"),
      date(2026, 2, 24)
    );
  }

  #[test]
  fn parses_iso_date_and_rejects_garbage()
  {
    let today = date(2026, 2, 17);
    assert_eq!(
      parse_date_expr(
        "2024-03-01",
        today
      )
      .expect("iso date"),
      date(2024, 3, 1)
    );
    assert!(
      parse_date_expr(
        "someday", today
      )
      .is_err()
    );
  }

  #[test]
  fn weekday_sets_from_names_and_indices()
  {
    let set =
      parse_weekday_set("mon, 3")
        .expect("parse set");
    assert_eq!(
      set.iter().collect::<Vec<_>>(),
      vec![1, 3]
    );
    assert_eq!(
      parse_weekday_set("weekends")
        .expect("weekends")
        .iter()
        .collect::<Vec<_>>(),
      vec![0, 6]
    );
    assert!(
      parse_weekday_set("")
        .expect("empty")
        .is_empty()
    );
    assert!(
      parse_weekday_set("7").is_err()
    );
    assert!(
      parse_weekday_set("funday")
        .is_err()
    );
  }

  #[test]
  fn weekday_set_serializes_as_index_array()
  {
    let set =
      WeekdaySet::from_indices([3, 1])
        .expect("valid");
    assert_eq!(
      serde_json::to_string(&set)
        .expect("serialize"),
      "[1,3]"
    );
    let back: WeekdaySet =
      serde_json::from_str("[6,0]")
        .expect("deserialize");
    assert!(back.contains(0));
    assert!(back.contains(6));
    assert_eq!(back.len(), 2);
    assert!(
      serde_json::from_str::<
        WeekdaySet
      >("[9]")
      .is_err()
    );
  }
}
