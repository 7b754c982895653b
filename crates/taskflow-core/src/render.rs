use std::io::{self, IsTerminal, Write};

use chrono::NaiveDate;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::{days_until_deadline, format_date};
use crate::task::{Category, Priority, Task};
use crate::view::{TaskStats, Urgency, urgency};

const SHORT_ID_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color = cfg.color()?;
        Ok(Self {
            color: color && io::stdout().is_terminal(),
        })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip(self, out, tasks, categories, today))]
    pub fn print_task_table<W: Write>(
        &self,
        out: &mut W,
        tasks: &[Task],
        categories: &[Category],
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let headers = vec![
            "ID".to_string(),
            "Done".to_string(),
            "Pri".to_string(),
            "Deadline".to_string(),
            "Category".to_string(),
            "Title".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            let id = self.paint(short_id(&task.id), "33");
            let done = if task.completed { "[x]" } else { "[ ]" }.to_string();
            let priority = self.paint(task.priority.as_str(), priority_code(task.priority));

            let deadline = task.deadline.map(format_date).unwrap_or_default();
            let deadline = match urgency(task, today) {
                Some(Urgency::Overdue) => self.paint(&format!("{deadline} (overdue)"), "31"),
                Some(Urgency::DueSoon) => self.paint(&format!("{deadline} (due soon)"), "33"),
                None => deadline,
            };

            let category = self.category_label(categories, &task.category);
            let title = if task.completed {
                self.paint(&task.title, "2;9")
            } else {
                task.title.clone()
            };

            rows.push(vec![id, done, priority, deadline, category, title]);
        }

        write_table(out, headers, rows)?;
        Ok(())
    }

    pub fn print_empty<W: Write>(&self, out: &mut W, unfiltered: bool) -> anyhow::Result<()> {
        if unfiltered {
            writeln!(out, "No tasks yet")?;
            writeln!(out, "Get started by adding your first task: taskflow add <title>")?;
        } else {
            writeln!(out, "No tasks found")?;
            writeln!(out, "Try adjusting your filters or search query")?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, out, task, categories, today))]
    pub fn print_task_info<W: Write>(
        &self,
        out: &mut W,
        task: &Task,
        categories: &[Category],
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        writeln!(out, "id          {}", task.id)?;
        writeln!(out, "title       {}", task.title)?;
        writeln!(
            out,
            "description {}",
            task.description.clone().unwrap_or_default()
        )?;
        writeln!(
            out,
            "category    {}",
            self.category_label(categories, &task.category)
        )?;
        writeln!(
            out,
            "priority    {}",
            self.paint(task.priority.as_str(), priority_code(task.priority))
        )?;
        writeln!(out, "completed   {}", if task.completed { "yes" } else { "no" })?;
        writeln!(out, "created     {}", task.created_at.format("%Y-%m-%d %H:%M:%S UTC"))?;

        if let Some(deadline) = task.deadline {
            let days = days_until_deadline(deadline, today);
            let relative = match days {
                0 => "today".to_string(),
                1 => "tomorrow".to_string(),
                -1 => "yesterday".to_string(),
                d if d > 1 => format!("in {d} days"),
                d => format!("{} days ago", -d),
            };
            let line = format!("{} ({relative})", format_date(deadline));
            let line = match urgency(task, today) {
                Some(Urgency::Overdue) => self.paint(&line, "31"),
                Some(Urgency::DueSoon) => self.paint(&line, "33"),
                None => line,
            };
            writeln!(out, "deadline    {line}")?;
        }

        Ok(())
    }

    pub fn print_stats<W: Write>(&self, out: &mut W, stats: &TaskStats) -> anyhow::Result<()> {
        writeln!(out, "Total      {}", stats.total)?;
        writeln!(out, "Completed  {}", self.paint(&stats.completed.to_string(), "32"))?;
        writeln!(out, "Active     {}", self.paint(&stats.active.to_string(), "33"))?;
        writeln!(out, "Overdue    {}", self.paint(&stats.overdue.to_string(), "31"))?;
        writeln!(
            out,
            "Progress   {} {}%",
            progress_bar(stats.completion_rate, 20),
            stats.completion_rate
        )?;
        Ok(())
    }

    pub fn print_categories<W: Write>(
        &self,
        out: &mut W,
        categories: &[Category],
        tasks: &[Task],
    ) -> anyhow::Result<()> {
        let headers = vec!["ID".to_string(), "Name".to_string(), "Tasks".to_string()];
        let rows = categories
            .iter()
            .map(|category| {
                let count = tasks.iter().filter(|task| task.category == category.id).count();
                vec![
                    category.id.clone(),
                    self.paint(&category.name, color_token_code(&category.color)),
                    count.to_string(),
                ]
            })
            .collect();
        write_table(out, headers, rows)
    }

    fn category_label(&self, categories: &[Category], id: &str) -> String {
        match categories.iter().find(|category| category.id == id) {
            Some(category) => self.paint(&category.name, color_token_code(&category.color)),
            None if id.is_empty() => "-".to_string(),
            // Dangling reference: the raw id keeps it visible.
            None => id.to_string(),
        }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn short_id(id: &str) -> &str {
    id.get(..SHORT_ID_LEN).unwrap_or(id)
}

fn priority_code(priority: Priority) -> &'static str {
    match priority {
        Priority::High => "31",
        Priority::Medium => "33",
        Priority::Low => "32",
    }
}

/// Maps a stored style token such as `bg-blue-500` to an ANSI color.
fn color_token_code(token: &str) -> &'static str {
    let hue = token
        .trim()
        .strip_prefix("bg-")
        .and_then(|rest| rest.split('-').next())
        .unwrap_or_default();
    match hue {
        "red" | "rose" => "31",
        "green" | "emerald" | "lime" => "32",
        "amber" | "yellow" | "orange" => "33",
        "blue" | "indigo" | "sky" => "34",
        "purple" | "violet" | "fuchsia" | "pink" => "35",
        "cyan" | "teal" => "36",
        _ => "39",
    }
}

fn progress_bar(rate: u8, width: usize) -> String {
    let filled = (usize::from(rate.min(100)) * width + 50) / 100;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
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

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
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
