//! Rating matrix: `(item, rater) -> ordinal score`, with optional grouping.
//!
//! Items are keyed by `(group, id)` so the same response id can appear under
//! several categories without colliding. Raters and items keep first-seen
//! order; every cell is optional because not every rater scores every item.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Ordinal score as recorded on the rating scale.
pub type Score = i32;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey {
    pub group: Option<String>,
    pub id: String,
}

impl ItemKey {
    pub fn new(id: impl Into<String>, group: Option<String>) -> Self {
        Self {
            group,
            id: id.into(),
        }
    }
}

impl std::fmt::Display for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.group {
            Some(group) => write!(f, "{group}/{}", self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

/// One item and its scores, indexed like [`RatingMatrix::raters`].
#[derive(Debug, Clone, Serialize)]
pub struct ItemRow {
    pub key: ItemKey,
    pub scores: Vec<Option<Score>>,
}

impl ItemRow {
    /// Scores that are present, in rater order.
    pub fn present(&self) -> impl Iterator<Item = Score> + '_ {
        self.scores.iter().filter_map(|s| *s)
    }

    pub fn rating_count(&self) -> usize {
        self.scores.iter().filter(|s| s.is_some()).count()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RatingsError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing column '{0}'")]
    MissingColumn(String),
    #[error("line {line}: invalid score '{value}'")]
    InvalidScore { line: u64, value: String },
    #[error("line {line}: empty item id")]
    EmptyItem { line: u64 },
    #[error("line {line}: empty rater id")]
    EmptyRater { line: u64 },
    #[error("conflicting scores for item {item}, rater {rater}: {existing} vs {new}")]
    ConflictingScore {
        item: String,
        rater: String,
        existing: Score,
        new: Score,
    },
    #[error("unknown rater: {0}")]
    UnknownRater(String),
    #[error("no ratings found in {0}")]
    Empty(String),
    #[error("unsupported ratings file extension: {0}")]
    UnsupportedFormat(String),
    #[error("delimiter {0:?} is not a single ASCII character")]
    InvalidDelimiter(char),
}

#[derive(Debug, Clone, Default)]
pub struct RatingMatrix {
    raters: Vec<String>,
    rater_lookup: HashMap<String, usize>,
    rows: Vec<ItemRow>,
    row_lookup: HashMap<ItemKey, usize>,
}

impl RatingMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one score. Re-inserting the same score is a no-op; a different
    /// score for an existing `(item, rater)` cell is an error.
    pub fn insert(
        &mut self,
        item: &str,
        group: Option<&str>,
        rater: &str,
        score: Score,
    ) -> Result<(), RatingsError> {
        let col = self.ensure_rater(rater);
        let key = ItemKey::new(item, group.map(str::to_string));
        let row = self.ensure_row(key);
        match self.rows[row].scores[col] {
            Some(existing) if existing != score => Err(RatingsError::ConflictingScore {
                item: self.rows[row].key.to_string(),
                rater: rater.to_string(),
                existing,
                new: score,
            }),
            _ => {
                self.rows[row].scores[col] = Some(score);
                Ok(())
            }
        }
    }

    /// Register a rater without scores (keeps column order stable for wide files).
    pub fn add_rater(&mut self, rater: &str) {
        self.ensure_rater(rater);
    }

    fn ensure_rater(&mut self, rater: &str) -> usize {
        if let Some(&idx) = self.rater_lookup.get(rater) {
            return idx;
        }
        let idx = self.raters.len();
        self.raters.push(rater.to_string());
        self.rater_lookup.insert(rater.to_string(), idx);
        for row in &mut self.rows {
            row.scores.push(None);
        }
        idx
    }

    fn ensure_row(&mut self, key: ItemKey) -> usize {
        if let Some(&idx) = self.row_lookup.get(&key) {
            return idx;
        }
        let idx = self.rows.len();
        self.row_lookup.insert(key.clone(), idx);
        self.rows.push(ItemRow {
            key,
            scores: vec![None; self.raters.len()],
        });
        idx
    }

    pub fn raters(&self) -> &[String] {
        &self.raters
    }

    pub fn rows(&self) -> &[ItemRow] {
        &self.rows
    }

    /// Item keys in first-seen order.
    pub fn items(&self) -> impl Iterator<Item = &ItemKey> + '_ {
        self.rows.iter().map(|row| &row.key)
    }

    pub fn n_items(&self) -> usize {
        self.rows.len()
    }

    pub fn n_raters(&self) -> usize {
        self.raters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rating_count(&self) -> usize {
        self.rows.iter().map(ItemRow::rating_count).sum()
    }

    pub fn rater_index(&self, rater: &str) -> Option<usize> {
        self.rater_lookup.get(rater).copied()
    }

    pub fn column(&self, rater: &str) -> Result<Vec<Option<Score>>, RatingsError> {
        let idx = self.require_rater(rater)?;
        Ok(self.rows.iter().map(|row| row.scores[idx]).collect())
    }

    /// Score pairs for the items both raters scored, in item order.
    pub fn pairs(&self, rater_a: &str, rater_b: &str) -> Result<Vec<(Score, Score)>, RatingsError> {
        let a = self.require_rater(rater_a)?;
        let b = self.require_rater(rater_b)?;
        Ok(self
            .rows
            .iter()
            .filter_map(|row| match (row.scores[a], row.scores[b]) {
                (Some(x), Some(y)) => Some((x, y)),
                _ => None,
            })
            .collect())
    }

    fn require_rater(&self, rater: &str) -> Result<usize, RatingsError> {
        self.rater_index(rater)
            .ok_or_else(|| RatingsError::UnknownRater(rater.to_string()))
    }

    /// Distinct group labels, sorted.
    pub fn groups(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| row.key.group.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Distinct scores present anywhere in the matrix, sorted.
    pub fn observed_scores(&self) -> Vec<Score> {
        self.rows
            .iter()
            .flat_map(|row| row.present())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Rows belonging to `group`, all raters kept.
    pub fn filter_group(&self, group: &str) -> RatingMatrix {
        let rows = self
            .rows
            .iter()
            .filter(|row| row.key.group.as_deref() == Some(group))
            .cloned()
            .collect();
        Self::from_parts(self.raters.clone(), rows)
    }

    /// Restrict to `names` (in that order). Rows left without any score are dropped.
    pub fn select_raters(&self, names: &[String]) -> Result<RatingMatrix, RatingsError> {
        let indices = names
            .iter()
            .map(|name| self.require_rater(name))
            .collect::<Result<Vec<_>, _>>()?;
        let rows = self
            .rows
            .iter()
            .map(|row| ItemRow {
                key: row.key.clone(),
                scores: indices.iter().map(|&i| row.scores[i]).collect(),
            })
            .filter(|row| row.rating_count() > 0)
            .collect();
        Ok(Self::from_parts(names.to_vec(), rows))
    }

    /// Apply `f` to every present score.
    pub fn map_scores<E, F>(&self, mut f: F) -> Result<RatingMatrix, E>
    where
        F: FnMut(Score) -> Result<Score, E>,
    {
        let mut rows = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let scores = row
                .scores
                .iter()
                .map(|cell| cell.map(&mut f).transpose())
                .collect::<Result<Vec<_>, E>>()?;
            rows.push(ItemRow {
                key: row.key.clone(),
                scores,
            });
        }
        Ok(Self::from_parts(self.raters.clone(), rows))
    }

    fn from_parts(raters: Vec<String>, rows: Vec<ItemRow>) -> Self {
        let rater_lookup = raters
            .iter()
            .enumerate()
            .map(|(i, r)| (r.clone(), i))
            .collect();
        let row_lookup = rows
            .iter()
            .enumerate()
            .map(|(i, row)| (row.key.clone(), i))
            .collect();
        Self {
            raters,
            rater_lookup,
            rows,
            row_lookup,
        }
    }

    /// Write the matrix as a long CSV (`item,group,rater,score`), skipping missing cells.
    pub fn write_long_csv(&self, path: impl AsRef<Path>) -> Result<(), RatingsError> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(["item", "group", "rater", "score"])?;
        for row in &self.rows {
            for (rater, score) in self.raters.iter().zip(&row.scores) {
                if let Some(score) = score {
                    writer.write_record([
                        row.key.id.as_str(),
                        row.key.group.as_deref().unwrap_or(""),
                        rater.as_str(),
                        &score.to_string(),
                    ])?;
                }
            }
        }
        writer.flush()?;
        Ok(())
    }
}

// =============================================================================
// Loading
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// One row per `(item, rater, score)`.
    #[default]
    Long,
    /// One row per item, one column per rater.
    Wide,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    pub layout: Layout,
    pub item_column: String,
    pub rater_column: String,
    pub score_column: String,
    /// Used when present in the header; absent means ungrouped.
    pub group_column: Option<String>,
    /// Overrides the delimiter implied by the file extension.
    pub delimiter: Option<char>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            layout: Layout::Long,
            item_column: "item".to_string(),
            rater_column: "rater".to_string(),
            score_column: "score".to_string(),
            group_column: Some("group".to_string()),
            delimiter: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RatingRecord {
    item: String,
    rater: String,
    score: Option<Score>,
    #[serde(default)]
    group: Option<String>,
}

/// Load a rating matrix from `.json`, `.csv` or `.tsv`.
pub fn load_ratings(path: impl AsRef<Path>, opts: &LoadOptions) -> Result<RatingMatrix, RatingsError> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let matrix = match ext.as_str() {
        "json" => load_json(path)?,
        "csv" | "tsv" | "txt" => {
            let default_delim = if ext == "tsv" { b'\t' } else { b',' };
            let delimiter = match opts.delimiter {
                Some(c) if c.is_ascii() => c as u8,
                Some(c) => return Err(RatingsError::InvalidDelimiter(c)),
                None => default_delim,
            };
            let mut reader = csv::ReaderBuilder::new()
                .delimiter(delimiter)
                .has_headers(true)
                .trim(csv::Trim::All)
                .from_path(path)?;
            match opts.layout {
                Layout::Long => read_long(&mut reader, opts)?,
                Layout::Wide => read_wide(&mut reader, opts)?,
            }
        }
        other => return Err(RatingsError::UnsupportedFormat(other.to_string())),
    };

    if matrix.rating_count() == 0 {
        return Err(RatingsError::Empty(path.display().to_string()));
    }
    tracing::debug!(
        items = matrix.n_items(),
        raters = matrix.n_raters(),
        ratings = matrix.rating_count(),
        "loaded ratings from {}",
        path.display()
    );
    Ok(matrix)
}

fn load_json(path: &Path) -> Result<RatingMatrix, RatingsError> {
    let raw = std::fs::read_to_string(path)?;
    let records: Vec<RatingRecord> = serde_json::from_str(&raw)?;
    let mut matrix = RatingMatrix::new();
    for (idx, rec) in records.iter().enumerate() {
        let line = idx as u64 + 1;
        if rec.item.trim().is_empty() {
            return Err(RatingsError::EmptyItem { line });
        }
        if rec.rater.trim().is_empty() {
            return Err(RatingsError::EmptyRater { line });
        }
        let group = rec.group.as_deref().map(str::trim).filter(|g| !g.is_empty());
        match rec.score {
            Some(score) => matrix.insert(rec.item.trim(), group, rec.rater.trim(), score)?,
            None => matrix.add_rater(rec.rater.trim()),
        }
    }
    Ok(matrix)
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h == name)
}

fn record_line(record: &csv::StringRecord) -> u64 {
    record.position().map(|p| p.line()).unwrap_or(0)
}

fn read_long<R: std::io::Read>(
    reader: &mut csv::Reader<R>,
    opts: &LoadOptions,
) -> Result<RatingMatrix, RatingsError> {
    let headers = reader.headers()?.clone();
    let require = |name: &str| {
        column_index(&headers, name).ok_or_else(|| RatingsError::MissingColumn(name.to_string()))
    };
    let item_col = require(&opts.item_column)?;
    let rater_col = require(&opts.rater_column)?;
    let score_col = require(&opts.score_column)?;
    let group_col = opts
        .group_column
        .as_deref()
        .and_then(|name| column_index(&headers, name));

    let mut matrix = RatingMatrix::new();
    for record in reader.records() {
        let record = record?;
        let line = record_line(&record);
        let item = record.get(item_col).unwrap_or("");
        let rater = record.get(rater_col).unwrap_or("");
        if item.is_empty() {
            return Err(RatingsError::EmptyItem { line });
        }
        if rater.is_empty() {
            return Err(RatingsError::EmptyRater { line });
        }
        let group = group_col
            .and_then(|c| record.get(c))
            .filter(|g| !g.is_empty());
        match parse_score(record.get(score_col).unwrap_or(""), line)? {
            Some(score) => matrix.insert(item, group, rater, score)?,
            None => matrix.add_rater(rater),
        }
    }
    Ok(matrix)
}

fn read_wide<R: std::io::Read>(
    reader: &mut csv::Reader<R>,
    opts: &LoadOptions,
) -> Result<RatingMatrix, RatingsError> {
    let headers = reader.headers()?.clone();
    let item_col = column_index(&headers, &opts.item_column)
        .ok_or_else(|| RatingsError::MissingColumn(opts.item_column.clone()))?;
    let group_col = opts
        .group_column
        .as_deref()
        .and_then(|name| column_index(&headers, name));
    let rater_cols: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(i, name)| *i != item_col && Some(*i) != group_col && !name.is_empty())
        .map(|(i, name)| (i, name.to_string()))
        .collect();

    let mut matrix = RatingMatrix::new();
    for (_, rater) in &rater_cols {
        matrix.add_rater(rater);
    }
    for record in reader.records() {
        let record = record?;
        let line = record_line(&record);
        let item = record.get(item_col).unwrap_or("");
        if item.is_empty() {
            return Err(RatingsError::EmptyItem { line });
        }
        let group = group_col
            .and_then(|c| record.get(c))
            .filter(|g| !g.is_empty());
        for (col, rater) in &rater_cols {
            if let Some(score) = parse_score(record.get(*col).unwrap_or(""), line)? {
                matrix.insert(item, group, rater, score)?;
            }
        }
    }
    Ok(matrix)
}

/// Blank and `NA` cells are missing. Spreadsheet exports like `4.0` are accepted
/// when the value is integral.
fn parse_score(raw: &str, line: u64) -> Result<Option<Score>, RatingsError> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("na") || raw.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    if let Ok(score) = raw.parse::<Score>() {
        return Ok(Some(score));
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v.fract() == 0.0 && v.abs() <= Score::MAX as f64 => {
            Ok(Some(v as Score))
        }
        _ => Err(RatingsError::InvalidScore {
            line,
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_grows_columns_for_new_raters() {
        let mut m = RatingMatrix::new();
        m.insert("i1", None, "h1", 4).unwrap();
        m.insert("i2", None, "h1", 2).unwrap();
        m.insert("i1", None, "gpt", 5).unwrap();

        assert_eq!(m.raters(), &["h1".to_string(), "gpt".to_string()]);
        assert_eq!(m.column("gpt").unwrap(), vec![Some(5), None]);
        assert_eq!(m.pairs("h1", "gpt").unwrap(), vec![(4, 5)]);
    }

    #[test]
    fn conflicting_reinsert_is_rejected_but_same_score_is_not() {
        let mut m = RatingMatrix::new();
        m.insert("i1", Some("tone"), "h1", 3).unwrap();
        m.insert("i1", Some("tone"), "h1", 3).unwrap();
        let err = m.insert("i1", Some("tone"), "h1", 4).unwrap_err();
        assert!(matches!(err, RatingsError::ConflictingScore { existing: 3, new: 4, .. }));
    }

    #[test]
    fn same_item_id_in_two_groups_stays_distinct() {
        let mut m = RatingMatrix::new();
        m.insert("r1", Some("clarity"), "h1", 3).unwrap();
        m.insert("r1", Some("bias"), "h1", 5).unwrap();
        assert_eq!(m.n_items(), 2);
        assert_eq!(m.groups(), vec!["bias".to_string(), "clarity".to_string()]);
        assert_eq!(m.filter_group("bias").n_items(), 1);
    }

    #[test]
    fn select_raters_drops_rows_without_scores() {
        let mut m = RatingMatrix::new();
        m.insert("i1", None, "h1", 1).unwrap();
        m.insert("i2", None, "h2", 2).unwrap();
        let only_h1 = m.select_raters(&["h1".to_string()]).unwrap();
        assert_eq!(only_h1.n_items(), 1);
        assert!(m.select_raters(&["nobody".to_string()]).is_err());
    }

    #[test]
    fn parse_score_accepts_integral_floats_and_missing_markers() {
        assert_eq!(parse_score("4", 1).unwrap(), Some(4));
        assert_eq!(parse_score("4.0", 1).unwrap(), Some(4));
        assert_eq!(parse_score("", 1).unwrap(), None);
        assert_eq!(parse_score("NA", 1).unwrap(), None);
        assert!(parse_score("4.5", 7).is_err());
        assert!(parse_score("good", 7).is_err());
    }
}
