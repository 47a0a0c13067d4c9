//! Silver cleaning template.
//!
//! [`clean`] is a pure function of the input table and a [`CleaningConfig`]: an
//! optional deduplication followed by seven ordered passes.
//!
//! 1. column names
//! 2. missing values
//! 3. type coercion
//! 4. outliers
//! 5. text
//! 6. sparse columns
//! 7. categories
//!
//! Every pass can be switched off on its own. Given the same input and
//! configuration the output is identical, cell for cell.

use crate::error::{PipelineError, Result};
use crate::schema::{ColumnType, as_f64, coerce_value, infer_column_type};
use crate::table::{DataTable, row_key};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Passes in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleaningPass {
    Deduplicate,
    ColumnNames,
    MissingValues,
    TypeCoercion,
    Outliers,
    Text,
    SparseColumns,
    Categories,
}

impl CleaningPass {
    pub const ORDER: [CleaningPass; 8] = [
        CleaningPass::Deduplicate,
        CleaningPass::ColumnNames,
        CleaningPass::MissingValues,
        CleaningPass::TypeCoercion,
        CleaningPass::Outliers,
        CleaningPass::Text,
        CleaningPass::SparseColumns,
        CleaningPass::Categories,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deduplicate => "deduplicate",
            Self::ColumnNames => "column_names",
            Self::MissingValues => "missing_values",
            Self::TypeCoercion => "type_coercion",
            Self::Outliers => "outliers",
            Self::Text => "text",
            Self::SparseColumns => "sparse_columns",
            Self::Categories => "categories",
        }
    }
}

impl std::fmt::Display for CleaningPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Per-pass settings. Column names in any section refer to the names after
/// the column-name pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    pub deduplicate: Toggle,
    pub column_names: Toggle,
    pub missing_values: MissingValuesConfig,
    pub type_coercion: TypeCoercionConfig,
    pub outliers: OutlierConfig,
    pub text: TextConfig,
    pub sparse_columns: SparseColumnsConfig,
    pub categories: CategoryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Toggle {
    pub enabled: bool,
}

impl Default for Toggle {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericFill {
    Median,
    Mean,
    Zero,
    Leave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextFill {
    /// Most frequent value; ties go to the lexicographically smallest. A column
    /// with no values gets `fill_value`.
    Mode,
    /// `fill_value`.
    Constant,
    Leave,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MissingValuesConfig {
    pub enabled: bool,
    pub numeric: NumericFill,
    pub text: TextFill,
    pub fill_value: String,
}

impl Default for MissingValuesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            numeric: NumericFill::Median,
            text: TextFill::Mode,
            fill_value: "Unknown".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypeCoercionConfig {
    pub enabled: bool,
    /// Declared column types. Cells that cannot be converted become null.
    pub schema: BTreeMap<String, ColumnType>,
    /// Promote undeclared text columns to numbers or datetimes when every
    /// value parses.
    pub infer: bool,
}

impl Default for TypeCoercionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            schema: BTreeMap::new(),
            infer: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierMethod {
    /// Tukey fences: `[q1 - k * iqr, q3 + k * iqr]`.
    Iqr,
    /// Fixed `bounds` per column.
    Bounds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierStrategy {
    /// Clip values to the nearest bound.
    Cap,
    /// Remove rows holding an outlier.
    Drop,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlierConfig {
    pub enabled: bool,
    pub method: OutlierMethod,
    pub iqr_multiplier: f64,
    pub strategy: OutlierStrategy,
    /// Columns checked by the IQR method; empty means every numeric column.
    pub columns: Vec<String>,
    pub bounds: BTreeMap<String, Bounds>,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            method: OutlierMethod::Iqr,
            iqr_multiplier: 1.5,
            strategy: OutlierStrategy::Cap,
            columns: Vec::new(),
            bounds: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextCase {
    Lower,
    Upper,
    Keep,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    pub enabled: bool,
    pub trim: bool,
    pub case: TextCase,
    /// Characters matching this pattern are removed; `None` keeps them.
    pub remove_pattern: Option<String>,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trim: true,
            case: TextCase::Lower,
            remove_pattern: Some(r"[^\w\s]".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SparseColumnsConfig {
    pub enabled: bool,
    /// Columns whose null fraction is above this are dropped.
    pub threshold: f64,
}

impl Default for SparseColumnsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryConfig {
    pub enabled: bool,
    /// `column -> (label -> canonical label)`, matched against cleaned text.
    pub mappings: BTreeMap<String, BTreeMap<String, String>>,
    /// Labels rarer than this fraction of rows are replaced by `rare_label`.
    pub rare_threshold: f64,
    pub rare_label: String,
    /// Rare-label folding only runs on tables at least this long.
    pub min_rows_for_rare: usize,
    /// Columns considered for rare labels; empty means every text column.
    pub columns: Vec<String>,
}

impl Default for CategoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mappings: BTreeMap::new(),
            rare_threshold: 0.01,
            rare_label: "other".to_string(),
            min_rows_for_rare: 100,
            columns: Vec::new(),
        }
    }
}

impl CleaningConfig {
    /// A configuration running a single pass with its defaults.
    pub fn only(pass: CleaningPass) -> Self {
        let mut config = Self::default();
        for other in CleaningPass::ORDER {
            config.set_enabled(other, other == pass);
        }
        config
    }

    /// Load from a `.toml` or `.json` file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::config(format!(
                "cannot read cleaning config {}: {e}",
                path.display()
            ))
        })?;
        let parsed = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&raw).map_err(|e| e.to_string()),
            _ => toml::from_str(&raw).map_err(|e| e.to_string()),
        };
        let config: Self = parsed.map_err(|e| {
            PipelineError::config(format!("invalid cleaning config {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn is_enabled(&self, pass: CleaningPass) -> bool {
        match pass {
            CleaningPass::Deduplicate => self.deduplicate.enabled,
            CleaningPass::ColumnNames => self.column_names.enabled,
            CleaningPass::MissingValues => self.missing_values.enabled,
            CleaningPass::TypeCoercion => self.type_coercion.enabled,
            CleaningPass::Outliers => self.outliers.enabled,
            CleaningPass::Text => self.text.enabled,
            CleaningPass::SparseColumns => self.sparse_columns.enabled,
            CleaningPass::Categories => self.categories.enabled,
        }
    }

    pub fn set_enabled(&mut self, pass: CleaningPass, enabled: bool) {
        let flag = match pass {
            CleaningPass::Deduplicate => &mut self.deduplicate.enabled,
            CleaningPass::ColumnNames => &mut self.column_names.enabled,
            CleaningPass::MissingValues => &mut self.missing_values.enabled,
            CleaningPass::TypeCoercion => &mut self.type_coercion.enabled,
            CleaningPass::Outliers => &mut self.outliers.enabled,
            CleaningPass::Text => &mut self.text.enabled,
            CleaningPass::SparseColumns => &mut self.sparse_columns.enabled,
            CleaningPass::Categories => &mut self.categories.enabled,
        };
        *flag = enabled;
    }

    /// Reject parameters no pass can work with. All problems are reported.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        let o = &self.outliers;
        if !o.iqr_multiplier.is_finite() || o.iqr_multiplier < 0.0 {
            problems.push(format!(
                "outliers.iqr_multiplier must be a non-negative number, got {}",
                o.iqr_multiplier
            ));
        }
        for (column, b) in &o.bounds {
            if let (Some(min), Some(max)) = (b.min, b.max) {
                if min > max {
                    problems.push(format!("outliers.bounds.{column}: min {min} > max {max}"));
                }
            }
        }
        if !(0.0..=1.0).contains(&self.sparse_columns.threshold) {
            problems.push(format!(
                "sparse_columns.threshold must be within 0..=1, got {}",
                self.sparse_columns.threshold
            ));
        }
        if !(0.0..=1.0).contains(&self.categories.rare_threshold) {
            problems.push(format!(
                "categories.rare_threshold must be within 0..=1, got {}",
                self.categories.rare_threshold
            ));
        }
        if let Err(e) = self.text.pattern() {
            problems.push(e.to_string());
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::config(problems.join("; ")))
        }
    }
}

impl TextConfig {
    fn pattern(&self) -> Result<Option<Regex>> {
        self.remove_pattern
            .as_deref()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    PipelineError::config(format!("text.remove_pattern '{p}' is invalid: {e}"))
                })
            })
            .transpose()
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// What one pass did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassReport {
    pub pass: CleaningPass,
    pub applied: bool,
    pub rows_before: usize,
    pub rows_after: usize,
    pub columns_before: usize,
    pub columns_after: usize,
    /// Cells rewritten, or rows/columns/names changed, depending on the pass.
    pub changes: usize,
}

/// Shape of the cleaned table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub total_rows: usize,
    pub missing_values: BTreeMap<String, usize>,
    pub data_types: BTreeMap<String, ColumnType>,
    pub unique_values: BTreeMap<String, usize>,
}

impl ValidationSummary {
    pub fn of(table: &DataTable) -> Self {
        let mut missing_values = BTreeMap::new();
        let mut data_types = BTreeMap::new();
        let mut unique_values = BTreeMap::new();
        for (i, name) in table.columns.iter().enumerate() {
            let values = table.column_values(i);
            missing_values.insert(name.clone(), table.null_count(i));
            data_types.insert(name.clone(), infer_column_type(&values));
            let distinct: HashSet<String> = values
                .iter()
                .filter(|v| !v.is_null())
                .map(|v| row_key(std::slice::from_ref(v)))
                .collect();
            unique_values.insert(name.clone(), distinct.len());
        }
        Self {
            total_rows: table.row_count(),
            missing_values,
            data_types,
            unique_values,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningReport {
    pub passes: Vec<PassReport>,
    pub summary: ValidationSummary,
}

impl CleaningReport {
    pub fn pass(&self, pass: CleaningPass) -> Option<&PassReport> {
        self.passes.iter().find(|p| p.pass == pass)
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Run every enabled pass over a copy of `input`.
pub fn clean(input: &DataTable, config: &CleaningConfig) -> Result<(DataTable, CleaningReport)> {
    config.validate()?;
    let text_pattern = config.text.pattern()?;

    let mut table = input.clone();
    let mut passes = Vec::with_capacity(CleaningPass::ORDER.len());
    for pass in CleaningPass::ORDER {
        let rows_before = table.row_count();
        let columns_before = table.column_count();
        let applied = config.is_enabled(pass);
        let changes = if applied {
            match pass {
                CleaningPass::Deduplicate => deduplicate(&mut table),
                CleaningPass::ColumnNames => normalize_column_names(&mut table),
                CleaningPass::MissingValues => fill_missing(&mut table, &config.missing_values),
                CleaningPass::TypeCoercion => coerce_types(&mut table, &config.type_coercion),
                CleaningPass::Outliers => handle_outliers(&mut table, &config.outliers),
                CleaningPass::Text => normalize_text(&mut table, &config.text, text_pattern.as_ref()),
                CleaningPass::SparseColumns => {
                    drop_sparse_columns(&mut table, config.sparse_columns.threshold)
                }
                CleaningPass::Categories => normalize_categories(&mut table, &config.categories),
            }
        } else {
            0
        };
        passes.push(PassReport {
            pass,
            applied,
            rows_before,
            rows_after: table.row_count(),
            columns_before,
            columns_after: table.column_count(),
            changes,
        });
    }

    let summary = ValidationSummary::of(&table);
    Ok((table, CleaningReport { passes, summary }))
}

// ---------------------------------------------------------------------------
// Passes
// ---------------------------------------------------------------------------

fn deduplicate(table: &mut DataTable) -> usize {
    let before = table.rows.len();
    let mut seen = HashSet::new();
    table.rows.retain(|row| seen.insert(row_key(row)));
    before - table.rows.len()
}

fn normalize_column_names(table: &mut DataTable) -> usize {
    let mut taken = HashSet::new();
    let mut changed = 0;
    for (i, column) in table.columns.iter_mut().enumerate() {
        let mut base = normalize_name(column);
        if base.is_empty() {
            base = format!("column_{}", i + 1);
        }
        let mut name = base.clone();
        let mut suffix = 2;
        while !taken.insert(name.clone()) {
            name = format!("{base}_{suffix}");
            suffix += 1;
        }
        if *column != name {
            *column = name;
            changed += 1;
        }
    }
    changed
}

/// Lowercase, with every run of non-alphanumerics collapsed into one `_`.
pub fn normalize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_separator = false;
    for c in raw.chars() {
        if c.is_alphanumeric() {
            if pending_separator && !out.is_empty() {
                out.push('_');
            }
            pending_separator = false;
            out.extend(c.to_lowercase());
        } else {
            pending_separator = true;
        }
    }
    out
}

fn fill_missing(table: &mut DataTable, config: &MissingValuesConfig) -> usize {
    let mut filled = 0;
    for i in 0..table.column_count() {
        let values = table.column_values(i);
        let dtype = infer_column_type(&values);
        let fill = match dtype {
            ColumnType::Integer | ColumnType::Float => {
                let numbers: Vec<f64> = values.iter().filter_map(as_f64).collect();
                let stat = match config.numeric {
                    NumericFill::Median => median(&numbers),
                    NumericFill::Mean => mean(&numbers),
                    NumericFill::Zero => Some(0.0),
                    NumericFill::Leave => None,
                };
                stat.and_then(|f| number_value(f, dtype == ColumnType::Integer))
            }
            ColumnType::String | ColumnType::DateTime | ColumnType::Boolean => match config.text {
                TextFill::Mode => mode(&values).or_else(|| Some(constant(config))),
                TextFill::Constant => Some(constant(config)),
                TextFill::Leave => None,
            },
            // Nothing to learn a mode from.
            ColumnType::Null => match config.text {
                TextFill::Mode | TextFill::Constant => Some(constant(config)),
                TextFill::Leave => None,
            },
            ColumnType::Json | ColumnType::Unknown => None,
        };
        let Some(fill) = fill else { continue };
        for row in &mut table.rows {
            if row[i].is_null() {
                row[i] = fill.clone();
                filled += 1;
            }
        }
    }
    filled
}

fn constant(config: &MissingValuesConfig) -> Value {
    Value::String(config.fill_value.clone())
}

fn coerce_types(table: &mut DataTable, config: &TypeCoercionConfig) -> usize {
    let mut changed = 0;
    for i in 0..table.column_count() {
        let target = match config.schema.get(&table.columns[i]) {
            Some(dtype) => Some(*dtype),
            None if config.infer => promotion_target(&table.column_values(i)),
            None => None,
        };
        let Some(target) = target else { continue };
        for row in &mut table.rows {
            let coerced = coerce_value(&row[i], target).unwrap_or(Value::Null);
            if coerced != row[i] {
                row[i] = coerced;
                changed += 1;
            }
        }
    }
    changed
}

/// Type an undeclared column should be converted to, if any.
fn promotion_target(values: &[Value]) -> Option<ColumnType> {
    match infer_column_type(values) {
        ColumnType::DateTime => Some(ColumnType::DateTime),
        ColumnType::String => {
            let non_null: Vec<&Value> = values.iter().filter(|v| !v.is_null()).collect();
            if !non_null.iter().all(|v| as_f64(v).is_some()) {
                return None;
            }
            let all_integers = non_null.iter().all(|v| match v {
                Value::Number(n) => n.is_i64() || n.is_u64(),
                Value::String(s) => s.trim().parse::<i64>().is_ok(),
                _ => false,
            });
            Some(if all_integers {
                ColumnType::Integer
            } else {
                ColumnType::Float
            })
        }
        _ => None,
    }
}

fn handle_outliers(table: &mut DataTable, config: &OutlierConfig) -> usize {
    let mut fences: Vec<(usize, Option<f64>, Option<f64>, bool)> = Vec::new();
    for (i, name) in table.columns.iter().enumerate() {
        let values = table.column_values(i);
        let dtype = infer_column_type(&values);
        let is_integer = dtype == ColumnType::Integer;
        match config.method {
            OutlierMethod::Iqr => {
                let selected = if config.columns.is_empty() {
                    dtype.is_numeric()
                } else {
                    config.columns.contains(name)
                };
                if !selected {
                    continue;
                }
                let mut numbers: Vec<f64> = values.iter().filter_map(as_f64).collect();
                if numbers.is_empty() {
                    continue;
                }
                numbers.sort_by(f64::total_cmp);
                let q1 = quantile(&numbers, 0.25);
                let q3 = quantile(&numbers, 0.75);
                let spread = (q3 - q1) * config.iqr_multiplier;
                fences.push((i, Some(q1 - spread), Some(q3 + spread), is_integer));
            }
            OutlierMethod::Bounds => {
                if let Some(b) = config.bounds.get(name) {
                    fences.push((i, b.min, b.max, is_integer));
                }
            }
        }
    }

    let outside = |x: f64, lower: Option<f64>, upper: Option<f64>| {
        lower.is_some_and(|l| x < l) || upper.is_some_and(|u| x > u)
    };

    match config.strategy {
        OutlierStrategy::Drop => {
            let before = table.rows.len();
            table.rows.retain(|row| {
                !fences.iter().any(|&(i, lower, upper, _)| {
                    as_f64(&row[i]).is_some_and(|x| outside(x, lower, upper))
                })
            });
            before - table.rows.len()
        }
        OutlierStrategy::Cap => {
            let mut capped = 0;
            for &(i, lower, upper, is_integer) in &fences {
                for row in &mut table.rows {
                    let Some(x) = as_f64(&row[i]) else { continue };
                    let bound = match (lower, upper) {
                        (Some(l), _) if x < l => l,
                        (_, Some(u)) if x > u => u,
                        _ => continue,
                    };
                    if let Some(value) = number_value(bound, is_integer) {
                        row[i] = value;
                        capped += 1;
                    }
                }
            }
            capped
        }
    }
}

fn normalize_text(table: &mut DataTable, config: &TextConfig, pattern: Option<&Regex>) -> usize {
    let mut changed = 0;
    for i in 0..table.column_count() {
        if infer_column_type(&table.column_values(i)) != ColumnType::String {
            continue;
        }
        for row in &mut table.rows {
            let Value::String(s) = &row[i] else { continue };
            let mut text = if config.trim {
                s.trim().to_string()
            } else {
                s.clone()
            };
            text = match config.case {
                TextCase::Lower => text.to_lowercase(),
                TextCase::Upper => text.to_uppercase(),
                TextCase::Keep => text,
            };
            if let Some(re) = pattern {
                text = re.replace_all(&text, "").into_owned();
                if config.trim {
                    text = text.trim().to_string();
                }
            }
            if text != *s {
                row[i] = Value::String(text);
                changed += 1;
            }
        }
    }
    changed
}

fn drop_sparse_columns(table: &mut DataTable, threshold: f64) -> usize {
    let rows = table.row_count();
    if rows == 0 {
        return 0;
    }
    let sparse: Vec<usize> = (0..table.column_count())
        .filter(|&i| table.null_count(i) as f64 / rows as f64 > threshold)
        .collect();
    for &i in sparse.iter().rev() {
        table.drop_column(i);
    }
    sparse.len()
}

fn normalize_categories(table: &mut DataTable, config: &CategoryConfig) -> usize {
    let mut changed = 0;

    for (column, mapping) in &config.mappings {
        let Some(i) = table.column_index(column) else { continue };
        for row in &mut table.rows {
            let Value::String(s) = &row[i] else { continue };
            if let Some(canonical) = mapping.get(s) {
                if canonical != s {
                    row[i] = Value::String(canonical.clone());
                    changed += 1;
                }
            }
        }
    }

    let rows = table.row_count();
    if rows == 0 || rows < config.min_rows_for_rare || config.rare_threshold <= 0.0 {
        return changed;
    }
    for i in 0..table.column_count() {
        let selected = if config.columns.is_empty() {
            infer_column_type(&table.column_values(i)) == ColumnType::String
        } else {
            config.columns.contains(&table.columns[i])
        };
        if !selected {
            continue;
        }
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for row in &table.rows {
            if let Value::String(s) = &row[i] {
                *counts.entry(s.as_str()).or_default() += 1;
            }
        }
        let rare: HashSet<String> = counts
            .into_iter()
            .filter(|&(_, n)| (n as f64 / rows as f64) < config.rare_threshold)
            .map(|(label, _)| label.to_string())
            .collect();
        if rare.is_empty() {
            continue;
        }
        for row in &mut table.rows {
            if let Value::String(s) = &row[i] {
                if rare.contains(s) && *s != config.rare_label {
                    row[i] = Value::String(config.rare_label.clone());
                    changed += 1;
                }
            }
        }
    }
    changed
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    Some(quantile(&sorted, 0.5))
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Linear-interpolated quantile of sorted, non-empty values.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Most frequent non-null value; ties go to the smallest rendering.
fn mode(values: &[Value]) -> Option<Value> {
    let mut counts: BTreeMap<String, (usize, &Value)> = BTreeMap::new();
    for v in values.iter().filter(|v| !v.is_null()) {
        counts
            .entry(row_key(std::slice::from_ref(v)))
            .or_insert((0, v))
            .0 += 1;
    }
    let mut best: Option<(usize, &Value)> = None;
    for (count, value) in counts.into_values() {
        if best.is_none_or(|(n, _)| count > n) {
            best = Some((count, value));
        }
    }
    best.map(|(_, v)| v.clone())
}

/// Integer cell when the column is integral and the value has no fraction.
fn number_value(f: f64, integral: bool) -> Option<Value> {
    if integral && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        return Some(Value::from(f as i64));
    }
    Number::from_f64(f).map(Value::Number)
}
