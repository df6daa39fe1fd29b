use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{Local, NaiveDate};
use chrono_tz::Tz;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::format_date;
use crate::filter::{StatusFilter, ViewContext};
use crate::task::Task;

const WEEKDAY_LABELS: [&str; 7] = ["S", "M", "T", "W", "T", "F", "S"];

/// Single-letter label for a weekday index, Sunday first.
pub fn weekday_label(idx: u8) -> &'static str {
    WEEKDAY_LABELS.get(usize::from(idx)).copied().unwrap_or("?")
}

pub fn empty_message(filter: StatusFilter) -> &'static str {
    match filter {
        StatusFilter::All => "No tasks for the selected day.",
        StatusFilter::Active => "All pending tasks are done!",
        StatusFilter::Completed => "No completed tasks for this day yet.",
    }
}

pub fn view_title(viewed_date: NaiveDate, today: NaiveDate) -> String {
    if viewed_date == today {
        "Today".to_string()
    } else {
        viewed_date.format("%A, %B %-d, %Y").to_string()
    }
}

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    tz: Option<Tz>,
}

impl Renderer {
    /// `tz` is the zone "today" is computed in; `None` means the system zone.
    pub fn new(cfg: &Config, tz: Option<Tz>) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color, tz })
    }

    pub fn plain() -> Self {
        Self {
            color: false,
            tz: None,
        }
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn print_view(
        &mut self,
        tasks: &[&Task],
        view: &ViewContext,
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let color = self.color && io::stdout().is_terminal();
        let mut out = io::stdout().lock();
        write_view(&mut out, tasks, view, today, self.tz, color)
    }

    #[tracing::instrument(skip(self, task))]
    pub fn print_task_info(&mut self, task: &Task, viewed_date: NaiveDate) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        write_task_info(&mut out, task, viewed_date)
    }
}

pub fn write_view<W: Write>(
    mut writer: W,
    tasks: &[&Task],
    view: &ViewContext,
    today: NaiveDate,
    tz: Option<Tz>,
    color: bool,
) -> anyhow::Result<()> {
    let title = view_title(view.viewed_date, today);
    if view.status_filter == StatusFilter::All {
        writeln!(writer, "{title}")?;
    } else {
        writeln!(writer, "{title} ({})", view.status_filter)?;
    }
    writeln!(writer)?;

    if tasks.is_empty() {
        writeln!(writer, "{}", empty_message(view.status_filter))?;
        return Ok(());
    }

    let headers = vec![
        "ID".to_string(),
        "Done".to_string(),
        "Description".to_string(),
        "Repeat".to_string(),
        "Info".to_string(),
    ];

    let mut rows = Vec::with_capacity(tasks.len());
    for task in tasks {
        let completed = task.is_completed_on(view.viewed_date);
        let mark = if completed { "[x]" } else { "[ ]" };
        let repeat = task
            .repeat_days()
            .iter()
            .map(weekday_label)
            .collect::<Vec<_>>()
            .join(",");

        let mut info = format!("added {}", format_created(task, tz));
        if task.is_recurring() {
            info.push_str(&format!(" | starts {}", task.due_date.format("%b %-d")));
        }

        let row = vec![
            paint(&task.id.to_string(), "33", color),
            paint(mark, "32", color && completed),
            task.text.clone(),
            repeat,
            info,
        ];
        if completed {
            rows.push(row.into_iter().map(|cell| paint(&cell, "2", color)).collect());
        } else {
            rows.push(row);
        }
    }

    write_table(&mut writer, headers, rows)?;
    Ok(())
}

pub fn write_task_info<W: Write>(
    mut out: W,
    task: &Task,
    viewed_date: NaiveDate,
) -> anyhow::Result<()> {
    writeln!(out, "id        {}", task.id)?;
    writeln!(out, "text      {}", task.text)?;
    if task.is_recurring() {
        let labels = task
            .repeat_days()
            .iter()
            .map(weekday_label)
            .collect::<Vec<_>>()
            .join(",");
        writeln!(out, "kind      recurring")?;
        writeln!(out, "repeat    {labels}")?;
        writeln!(out, "starts    {}", format_date(task.due_date))?;
        writeln!(
            out,
            "done      {} ({})",
            yes_no(task.is_completed_on(viewed_date)),
            format_date(viewed_date)
        )?;
    } else {
        writeln!(out, "kind      one-shot")?;
        writeln!(out, "due       {}", format_date(task.due_date))?;
        writeln!(out, "done      {}", yes_no(task.is_completed_on(viewed_date)))?;
    }
    writeln!(out, "created   {}", task.created_at.to_rfc3339())?;
    Ok(())
}

fn format_created(task: &Task, tz: Option<Tz>) -> String {
    const CREATED_FORMAT: &str = "%b %-d, %Y %H:%M";
    match tz {
        Some(tz) => task.created_at.with_timezone(&tz).format(CREATED_FORMAT).to_string(),
        None => task.created_at.with_timezone(&Local).format(CREATED_FORMAT).to_string(),
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn paint(text: &str, code: &str, color: bool) -> String {
    if !color {
        return text.to_string();
    }
    format!("\x1b[{code}m{text}\x1b[0m")
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
