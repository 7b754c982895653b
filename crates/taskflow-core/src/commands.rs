use std::io::Write;

use anyhow::{Context, anyhow};
use chrono::NaiveDate;
use tracing::{debug, info, instrument};

use crate::cli::{AddArgs, Command, EditArgs, ListArgs};
use crate::config::Config;
use crate::draft::TaskDraft;
use crate::render::Renderer;
use crate::state::AppState;
use crate::storage::KeyValueStore;
use crate::task::Category;
use crate::view::{SortMode, StatusFilter, ViewQuery};

#[instrument(skip(state, cfg, renderer, out, command, today))]
pub fn dispatch<S, W>(
    state: &mut AppState<S>,
    cfg: &Config,
    renderer: &Renderer,
    out: &mut W,
    command: Command,
    today: NaiveDate,
) -> anyhow::Result<()>
where
    S: KeyValueStore,
    W: Write,
{
    debug!(?command, %today, "dispatching command");

    match command {
        Command::Add(args) => cmd_add(state, out, args),
        Command::Edit(args) => cmd_edit(state, out, args),
        Command::Toggle { id } => cmd_toggle(state, out, &id),
        Command::Delete { id } => cmd_delete(state, out, &id),
        Command::Show { id } => cmd_show(state, renderer, out, &id, today),
        Command::List(args) => cmd_list(state, cfg, renderer, out, &args, today),
        Command::Stats => renderer.print_stats(out, &state.stats(today)),
        Command::Categories => renderer.print_categories(out, state.categories(), state.tasks()),
        Command::Config => cmd_config(cfg, out),
    }
}

#[instrument(skip(state, out, args))]
fn cmd_add<S: KeyValueStore, W: Write>(
    state: &mut AppState<S>,
    out: &mut W,
    args: AddArgs,
) -> anyhow::Result<()> {
    info!("command add");

    let mut draft = TaskDraft::new(state.categories());
    draft.title = args.title.join(" ");
    if let Some(description) = args.description {
        draft.description = description;
    }
    if let Some(category) = args.category {
        draft.category = resolve_category(state.categories(), &category)?;
    }
    if let Some(deadline) = args.deadline {
        draft.deadline = deadline;
    }
    if let Some(priority) = args.priority {
        draft.priority = priority;
    }

    let task = state.create_task(&draft).context("failed to add task")?;
    writeln!(out, "Created task {}.", task.id)?;
    Ok(())
}

#[instrument(skip(state, out, args), fields(id = %args.id))]
fn cmd_edit<S: KeyValueStore, W: Write>(
    state: &mut AppState<S>,
    out: &mut W,
    args: EditArgs,
) -> anyhow::Result<()> {
    info!("command edit");

    let id = state.resolve_id(&args.id)?;
    let current = state
        .task(&id)
        .ok_or_else(|| anyhow!("task not found: {id}"))?;

    let mut draft = TaskDraft::from_task(current);
    if let Some(title) = args.title {
        draft.title = title;
    }
    if let Some(description) = args.description {
        draft.description = description;
    }
    if let Some(category) = args.category {
        draft.category = resolve_category(state.categories(), &category)?;
    }
    if let Some(deadline) = args.deadline {
        draft.deadline = deadline;
    }
    if let Some(priority) = args.priority {
        draft.priority = priority;
    }
    if let Some(completed) = args.completed {
        draft.completed = completed;
    }

    let task = state
        .update_task(&id, &draft)
        .with_context(|| format!("failed to update task {id}"))?;
    writeln!(out, "Updated task {}.", task.id)?;
    Ok(())
}

#[instrument(skip(state, out))]
fn cmd_toggle<S: KeyValueStore, W: Write>(
    state: &mut AppState<S>,
    out: &mut W,
    id: &str,
) -> anyhow::Result<()> {
    info!("command toggle");

    let id = state.resolve_id(id)?;
    let completed = state.toggle_complete(&id)?;
    let verb = if completed { "Completed" } else { "Reopened" };
    writeln!(out, "{verb} task {id}.")?;
    Ok(())
}

#[instrument(skip(state, out))]
fn cmd_delete<S: KeyValueStore, W: Write>(
    state: &mut AppState<S>,
    out: &mut W,
    id: &str,
) -> anyhow::Result<()> {
    info!("command delete");

    let id = state.resolve_id(id)?;
    let removed = state.delete_task(&id)?;
    writeln!(out, "Deleted task {} '{}'.", removed.id, removed.title)?;
    Ok(())
}

#[instrument(skip(state, renderer, out, today))]
fn cmd_show<S: KeyValueStore, W: Write>(
    state: &AppState<S>,
    renderer: &Renderer,
    out: &mut W,
    id: &str,
    today: NaiveDate,
) -> anyhow::Result<()> {
    let id = state.resolve_id(id)?;
    let task = state
        .task(&id)
        .ok_or_else(|| anyhow!("task not found: {id}"))?;
    renderer.print_task_info(out, task, state.categories(), today)
}

#[instrument(skip(state, cfg, renderer, out, args, today))]
fn cmd_list<S: KeyValueStore, W: Write>(
    state: &mut AppState<S>,
    cfg: &Config,
    renderer: &Renderer,
    out: &mut W,
    args: &ListArgs,
    today: NaiveDate,
) -> anyhow::Result<()> {
    let query = build_query(cfg, args, state.categories());
    debug!(?query, "list query");

    let categories = state.categories().to_vec();
    let visible = state.visible(&query, today);
    if visible.is_empty() {
        return renderer.print_empty(out, query.is_unfiltered());
    }
    renderer.print_task_table(out, visible, &categories, today)
}

fn cmd_config<W: Write>(cfg: &Config, out: &mut W) -> anyhow::Result<()> {
    for (key, value) in cfg.entries() {
        writeln!(out, "{key} = {value}")?;
    }
    for file in cfg.loaded_files() {
        writeln!(out, "# loaded {}", file.display())?;
    }
    Ok(())
}

/// Explicit flags win over `default.filter` / `default.sort`.
pub fn build_query(cfg: &Config, args: &ListArgs, categories: &[Category]) -> ViewQuery {
    let status = args
        .filter
        .as_deref()
        .map(StatusFilter::parse_lenient)
        .unwrap_or_else(|| cfg.default_filter());
    let sort = match args.sort.as_deref() {
        Some(raw) => SortMode::parse_lenient(raw),
        None => cfg.default_sort(),
    };
    let category = args
        .category
        .as_deref()
        .map(|raw| resolve_category(categories, raw).unwrap_or_else(|_| raw.trim().to_string()))
        .unwrap_or_default();

    ViewQuery {
        search: args.search.clone().unwrap_or_default(),
        status,
        category,
        sort,
    }
}

/// Accepts a category id or a case-insensitive name.
fn resolve_category(categories: &[Category], raw: &str) -> anyhow::Result<String> {
    let raw = raw.trim();
    categories
        .iter()
        .find(|category| category.id == raw)
        .or_else(|| {
            categories
                .iter()
                .find(|category| category.name.eq_ignore_ascii_case(raw))
        })
        .map(|category| category.id.clone())
        .ok_or_else(|| anyhow!("unknown category: {raw}"))
}
