//! Index file format (spec §4.3): a pipe-delimited markdown table plus a
//! recomputed `## Statistics` block. Counters are never cached — every
//! regeneration recounts status occurrences from the rows themselves.

use anyhow::Result;
use bridge_types::{VisionEntry, VisionId, VisionStatus};

pub const STATISTICS_HEADER: &str = "## Statistics";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRow {
    pub id: String,
    pub title: String,
    pub source: String,
    pub status: String,
    pub tags: String,
    pub refs: Option<u64>,
}

impl IndexRow {
    pub fn from_entry(entry: &VisionEntry, include_refs: bool) -> Self {
        Self {
            id: entry.id.as_str().to_string(),
            title: entry.title.clone(),
            source: entry.source.clone(),
            status: entry.status.as_str().to_string(),
            tags: entry.tags.iter().cloned().collect::<Vec<_>>().join(", "),
            refs: include_refs.then_some(entry.refs),
        }
    }

    fn render(&self, with_refs: bool) -> String {
        if with_refs {
            format!(
                "| {} | {} | {} | {} | {} | {} |",
                self.id,
                self.title,
                self.source,
                self.status,
                self.tags,
                self.refs.unwrap_or(0)
            )
        } else {
            format!(
                "| {} | {} | {} | {} | {} |",
                self.id, self.title, self.source, self.status, self.tags
            )
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexTable {
    pub has_refs_column: bool,
    pub rows: Vec<IndexRow>,
}

const BASE_HEADER: &str = "| ID | Title | Source | Status | Tags |";
const BASE_SEPARATOR: &str = "| --- | --- | --- | --- | --- |";
const REFS_HEADER: &str = "| ID | Title | Source | Status | Tags | Refs |";
const REFS_SEPARATOR: &str = "| --- | --- | --- | --- | --- | --- |";

impl IndexTable {
    pub fn contains(&self, id: &VisionId) -> bool {
        self.rows.iter().any(|r| r.id == id.as_str())
    }

    pub fn upsert(&mut self, row: IndexRow) {
        if let Some(existing) = self.rows.iter_mut().find(|r| r.id == row.id) {
            *existing = row;
        } else {
            self.rows.push(row);
        }
    }

    pub fn set_status(&mut self, id: &VisionId, status: VisionStatus) -> bool {
        if let Some(row) = self.rows.iter_mut().find(|r| r.id == id.as_str()) {
            row.status = status.as_str().to_string();
            true
        } else {
            false
        }
    }

    pub fn bump_refs(&mut self, id: &VisionId) -> Option<u64> {
        self.has_refs_column = true;
        let row = self.rows.iter_mut().find(|r| r.id == id.as_str())?;
        let next = row.refs.unwrap_or(0) + 1;
        row.refs = Some(next);
        Some(next)
    }

    pub fn statistics(&self) -> Vec<(VisionStatus, usize)> {
        VisionStatus::ALL
            .into_iter()
            .map(|status| {
                let count = self
                    .rows
                    .iter()
                    .filter(|r| r.status == status.as_str())
                    .count();
                (status, count)
            })
            .collect()
    }

    pub fn render(&self) -> String {
        let (header, separator) = if self.has_refs_column {
            (REFS_HEADER, REFS_SEPARATOR)
        } else {
            (BASE_HEADER, BASE_SEPARATOR)
        };
        let mut out = String::new();
        out.push_str(header);
        out.push('\n');
        out.push_str(separator);
        out.push('\n');
        for row in &self.rows {
            out.push_str(&row.render(self.has_refs_column));
            out.push('\n');
        }
        out
    }

    pub fn render_statistics(&self) -> String {
        let mut out = String::new();
        out.push_str(STATISTICS_HEADER);
        out.push_str("\n\n");
        for (status, count) in self.statistics() {
            out.push_str(&format!("- {}: {count}\n", status.as_str()));
        }
        out
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut has_refs_column = false;
        let mut rows = Vec::new();
        let mut in_table = false;
        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed == BASE_HEADER || trimmed == REFS_HEADER {
                has_refs_column = trimmed == REFS_HEADER;
                in_table = true;
                continue;
            }
            if !in_table {
                continue;
            }
            if trimmed.starts_with("| ---") {
                continue;
            }
            if !trimmed.starts_with('|') {
                break;
            }
            let cells: Vec<&str> = trimmed
                .trim_matches('|')
                .split('|')
                .map(|c| c.trim())
                .collect();
            if cells.is_empty() || cells[0] == "ID" {
                continue;
            }
            if has_refs_column && cells.len() >= 6 {
                rows.push(IndexRow {
                    id: cells[0].to_string(),
                    title: cells[1].to_string(),
                    source: cells[2].to_string(),
                    status: cells[3].to_string(),
                    tags: cells[4].to_string(),
                    refs: cells[5].parse().ok(),
                });
            } else if !has_refs_column && cells.len() >= 5 {
                rows.push(IndexRow {
                    id: cells[0].to_string(),
                    title: cells[1].to_string(),
                    source: cells[2].to_string(),
                    status: cells[3].to_string(),
                    tags: cells[4].to_string(),
                    refs: None,
                });
            }
        }
        Ok(Self { has_refs_column, rows })
    }

    /// Render a complete index document: preamble header, table, then a
    /// freshly recomputed statistics block.
    pub fn render_document(&self) -> String {
        format!(
            "# Vision Index\n\n{}\n{}",
            self.render(),
            self.render_statistics()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_types::VisionId;
    use chrono::Utc;

    fn entry(seq: u32, status: VisionStatus) -> VisionEntry {
        let mut e = VisionEntry::new(
            VisionId::from_sequence(seq).unwrap(),
            format!("Title {seq}"),
            "source",
            Utc::now(),
            "insight",
            "potential",
        );
        e.status = status;
        e
    }

    #[test]
    fn render_then_parse_round_trips_without_refs() {
        let mut table = IndexTable::default();
        table.upsert(IndexRow::from_entry(&entry(1, VisionStatus::Captured), false));
        table.upsert(IndexRow::from_entry(&entry(2, VisionStatus::Exploring), false));
        let text = table.render();
        let parsed = IndexTable::parse(&text).unwrap();
        assert_eq!(parsed.rows.len(), 2);
        assert!(!parsed.has_refs_column);
    }

    #[test]
    fn bump_refs_lazily_adds_refs_column() {
        let mut table = IndexTable::default();
        table.upsert(IndexRow::from_entry(&entry(1, VisionStatus::Captured), false));
        assert!(!table.render().contains("Refs"));
        table.bump_refs(&VisionId::from_sequence(1).unwrap());
        assert!(table.render().contains("Refs"));
        assert_eq!(table.rows[0].refs, Some(1));
    }

    #[test]
    fn statistics_recount_from_rows_not_cached_counters() {
        let mut table = IndexTable::default();
        table.upsert(IndexRow::from_entry(&entry(1, VisionStatus::Captured), false));
        table.upsert(IndexRow::from_entry(&entry(2, VisionStatus::Captured), false));
        table.upsert(IndexRow::from_entry(&entry(3, VisionStatus::Deferred), false));
        let stats = table.statistics();
        assert_eq!(stats[0], (VisionStatus::Captured, 2));
        assert_eq!(stats[4], (VisionStatus::Deferred, 1));
    }

    #[test]
    fn upsert_does_not_double_add_existing_id() {
        let mut table = IndexTable::default();
        table.upsert(IndexRow::from_entry(&entry(1, VisionStatus::Captured), false));
        table.upsert(IndexRow::from_entry(&entry(1, VisionStatus::Exploring), false));
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].status, "Exploring");
    }
}
