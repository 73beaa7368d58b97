//! Plain-text table rendering for command output

use crate::models::HubModel;
use crate::store::ModelRecord;
use crate::supervisor::ServerProcess;

/// Widest model id shown in remote listings
const REMOTE_ID_WIDTH: usize = 60;

/// Left-aligned text table padded to the widest cell of each column
#[derive(Debug, Default)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn row<I, S>(&mut self, cells: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(cells.into_iter().map(Into::into).collect());
        self
    }

    pub fn render(&self) -> String {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                if i < widths.len() {
                    widths[i] = widths[i].max(cell.chars().count());
                }
            }
        }

        let mut out = String::new();
        for line in std::iter::once(&self.headers).chain(self.rows.iter()) {
            let cells: Vec<String> = line
                .iter()
                .enumerate()
                .map(|(i, cell)| format!("{:<width$}", cell, width = widths.get(i).copied().unwrap_or(0)))
                .collect();
            out.push_str(cells.join("  ").trim_end());
            out.push('\n');
        }
        out
    }
}

/// `ls` output
pub fn model_table(records: &[ModelRecord]) -> String {
    let mut table = Table::new(["SLUG", "MODEL ID", "SIZE", "LAST USED"]);
    for r in records {
        let last_used = r
            .last_used
            .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "Never".to_string());
        table.row([r.slug.clone(), r.source_id.clone(), r.file_size.clone(), last_used]);
    }
    table.render()
}

/// `ps` output
pub fn process_table(processes: &[ServerProcess]) -> String {
    let mut table = Table::new(["PID", "SLUG", "MODEL"]);
    for p in processes {
        table.row([p.pid.to_string(), p.slug.clone(), p.model.clone()]);
    }
    table.render()
}

/// `recent` / `trending` output
pub fn remote_table(models: &[HubModel], date_header: &str, footer: &str) -> String {
    let rule = "─".repeat(100);
    let mut out = String::new();
    out.push_str(&rule);
    out.push('\n');
    out.push_str(&format!(
        "{:<id$} {:<12} {:>7} {:>12}\n",
        "MODEL ID",
        date_header,
        "LIKES",
        "DOWNLOADS",
        id = REMOTE_ID_WIDTH
    ));
    out.push_str(&rule);
    out.push('\n');

    for m in models {
        out.push_str(&format!(
            "{:<id$} {:<12} {:>7} {:>12}\n",
            truncate_id(&m.model_id, REMOTE_ID_WIDTH),
            short_date(m.last_modified.as_deref()),
            m.likes,
            m.downloads,
            id = REMOTE_ID_WIDTH
        ));
    }

    out.push_str(&rule);
    out.push('\n');
    out.push_str(&format!("Showing {} {}\n", models.len(), footer));
    out
}

fn truncate_id(id: &str, width: usize) -> String {
    if id.chars().count() <= width {
        id.to_string()
    } else {
        let kept: String = id.chars().take(width - 3).collect();
        format!("{}...", kept)
    }
}

/// `YYYY-MM-DD` prefix of an ISO timestamp
fn short_date(ts: Option<&str>) -> String {
    match ts {
        Some(s) if !s.is_empty() => s.chars().take(10).collect(),
        _ => "N/A".to_string(),
    }
}
