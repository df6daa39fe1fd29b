use anyhow::{Context, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, instrument, warn};

use crate::cli::{Invocation, ViewTerms};
use crate::config::Config;
use crate::datetime::{WeekdaySet, format_date, parse_date_expr, parse_weekday_set, today};
use crate::filter::ViewContext;
use crate::render::Renderer;
use crate::store::TaskStore;
use crate::task::TaskId;

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "add",
        "list",
        "toggle",
        "done",
        "remove",
        "delete",
        "info",
        "export",
        "_commands",
        "_show",
        "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(store, cfg, renderer, inv))]
pub fn dispatch(
    store: &mut TaskStore,
    cfg: &Config,
    renderer: &mut Renderer,
    tz: Option<Tz>,
    inv: Invocation,
) -> anyhow::Result<()> {
    dispatch_at(store, cfg, renderer, inv, today(tz), Utc::now()).map(|_| ())
}

/// Same as [`dispatch`] with the clock supplied by the caller. Returns the
/// view the command ran against, after any jump made by `add`.
#[instrument(skip(store, cfg, renderer, inv, now))]
pub fn dispatch_at(
    store: &mut TaskStore,
    cfg: &Config,
    renderer: &mut Renderer,
    inv: Invocation,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> anyhow::Result<ViewContext> {
    let command = inv.command.as_str();
    let view = resolve_view(cfg, &inv.view, today)?;

    debug!(
        command,
        viewed_date = %view.viewed_date,
        status = %view.status_filter,
        args = ?inv.command_args,
        "dispatching command"
    );

    match command {
        "add" => return cmd_add(store, renderer, view, &inv.command_args, today, now),
        "list" => cmd_list(store, renderer, &view, today)?,
        "toggle" | "done" => cmd_toggle(store, renderer, &view, &inv.command_args, today)?,
        "remove" | "delete" => cmd_remove(store, renderer, &view, &inv.command_args, today)?,
        "info" => cmd_info(store, renderer, &view, &inv.command_args)?,
        "export" => cmd_export(store)?,
        "_commands" => cmd_commands()?,
        "_show" => cmd_show(cfg)?,
        "help" => cmd_help()?,
        "version" => println!("{}", env!("CARGO_PKG_VERSION")),
        other => return Err(anyhow!("unknown command: {other}")),
    }
    Ok(view)
}

pub fn resolve_view(
    cfg: &Config,
    terms: &ViewTerms,
    today: NaiveDate,
) -> anyhow::Result<ViewContext> {
    let viewed_date = match terms.date.as_deref() {
        Some(raw) => parse_date_expr(raw, today)
            .with_context(|| format!("invalid view date: {raw}"))?,
        None => today,
    };
    let status_filter = match terms.status {
        Some(status) => status,
        None => cfg.status_filter()?,
    };
    Ok(ViewContext::new(viewed_date, status_filter))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub text: String,
    pub due: Option<NaiveDate>,
    pub repeat_days: WeekdaySet,
}

/// Splits `add` arguments into the task text and its `due:` / `repeat:`
/// modifiers. Everything after `--` is text.
#[instrument(skip(args, today))]
pub fn parse_add_args(args: &[String], today: NaiveDate) -> anyhow::Result<NewTask> {
    let mut words = Vec::new();
    let mut due = None;
    let mut repeat_days = WeekdaySet::EMPTY;

    let mut literal = false;
    for arg in args {
        if arg == "--" && !literal {
            literal = true;
            continue;
        }

        if !literal && let Some((key, value)) = arg.split_once(':') {
            match key.to_ascii_lowercase().as_str() {
                "due" => {
                    due = Some(parse_date_expr(value, today)?);
                    continue;
                }
                "repeat" | "every" => {
                    repeat_days = parse_weekday_set(value)?;
                    continue;
                }
                _ => {}
            }
        }

        words.push(arg.as_str());
    }

    Ok(NewTask {
        text: words.join(" "),
        due,
        repeat_days,
    })
}

#[instrument(skip(store, renderer, args, now))]
fn cmd_add(
    store: &mut TaskStore,
    renderer: &mut Renderer,
    mut view: ViewContext,
    args: &[String],
    today: NaiveDate,
    now: DateTime<Utc>,
) -> anyhow::Result<ViewContext> {
    info!("command add");

    let new_task = parse_add_args(args, today)?;
    let due = new_task.due.unwrap_or(today);
    let task = store.add_task(&new_task.text, due, new_task.repeat_days, today, now)?;

    println!("Created task {}.", task.id);

    // a new one-shot task is only visible on its own date, so jump there
    if !task.is_recurring() && task.due_date != view.viewed_date {
        debug!(from = %view.viewed_date, to = %task.due_date, "switching view to due date");
        view.viewed_date = task.due_date;
    }

    cmd_list(store, renderer, &view, today)?;
    Ok(view)
}

#[instrument(skip(store, renderer))]
fn cmd_list(
    store: &TaskStore,
    renderer: &mut Renderer,
    view: &ViewContext,
    today: NaiveDate,
) -> anyhow::Result<()> {
    let visible = store.visible_in(view);
    info!(visible = visible.len(), total = store.len(), "rendering view");
    renderer.print_view(&visible, view, today)
}

#[instrument(skip(store, renderer, args))]
fn cmd_toggle(
    store: &mut TaskStore,
    renderer: &mut Renderer,
    view: &ViewContext,
    args: &[String],
    today: NaiveDate,
) -> anyhow::Result<()> {
    let ids = parse_ids(args)?;
    for id in ids {
        match store.toggle_completion(id, view.viewed_date) {
            Ok(completed) => {
                let state = if completed { "done" } else { "not done" };
                let recurring = store.get(id).map(|t| t.is_recurring()).unwrap_or(false);
                if recurring {
                    println!("Task {id} marked {state} for {}.", format_date(view.viewed_date));
                } else {
                    println!("Task {id} marked {state}.");
                }
            }
            Err(err) if err.is_not_found() => {
                warn!(id = %id, "toggle of unknown task ignored");
            }
            Err(err) => return Err(err.into()),
        }
    }

    cmd_list(store, renderer, view, today)
}

#[instrument(skip(store, renderer, args))]
fn cmd_remove(
    store: &mut TaskStore,
    renderer: &mut Renderer,
    view: &ViewContext,
    args: &[String],
    today: NaiveDate,
) -> anyhow::Result<()> {
    let ids = parse_ids(args)?;
    for id in ids {
        if let Some(task) = store.remove_task(id) {
            println!("Removed task {id} '{}'.", task.text);
        }
    }

    cmd_list(store, renderer, view, today)
}

#[instrument(skip(store, renderer, args))]
fn cmd_info(
    store: &TaskStore,
    renderer: &mut Renderer,
    view: &ViewContext,
    args: &[String],
) -> anyhow::Result<()> {
    let ids = parse_ids(args)?;
    for id in ids {
        let task = store.get(id).ok_or_else(|| anyhow!("task not found: {id}"))?;
        renderer.print_task_info(task, view.viewed_date)?;
    }
    Ok(())
}

fn cmd_export(store: &TaskStore) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(store.tasks()).context("failed serializing tasks")?;
    println!("{json}");
    Ok(())
}

fn cmd_commands() -> anyhow::Result<()> {
    for command in known_command_names() {
        println!("{command}");
    }
    Ok(())
}

fn cmd_show(cfg: &Config) -> anyhow::Result<()> {
    let mut entries: Vec<_> = cfg.iter().collect();
    entries.sort();
    for (k, v) in entries {
        println!("{k}={v}");
    }
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!("usage: daylist [date:<when>] [status:all|active|completed] <command> [args]");
    println!();
    println!("  add <text> [due:<when>] [repeat:<days>]  add a task");
    println!("  list                                     show the viewed date (default)");
    println!("  toggle <id>...                           flip completion for the viewed date");
    println!("  remove <id>...                           delete tasks");
    println!("  info <id>...                             show task details");
    println!("  export                                   print all tasks as JSON");
    println!();
    println!("  <days>: mon,wed | 1,3 | weekdays | weekends | daily");
    println!();
    println!("  <when>: today, tomorrow, yesterday, monday..sunday, +3d, -1w, YYYY-MM-DD");
    Ok(())
}

fn parse_ids(args: &[String]) -> anyhow::Result<Vec<TaskId>> {
    if args.is_empty() {
        return Err(anyhow!("at least one task id is required"));
    }
    args.iter().map(|arg| arg.parse::<TaskId>()).collect()
}
