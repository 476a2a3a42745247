//! Collaborators that receive fit output, and the instrumentation hook.
//!
//! The engine renders nothing itself. A host plugs in a [`LogSink`] for text
//! reports, a [`CurveSink`] for generated curves and a [`TableSink`] for
//! parameter tables. [`Recorder`] implements all three in memory.

use ndarray::Array2;
use std::sync::Mutex;

use crate::fit::result::{FitCurve, FitResult, FitStatus};
use crate::optimizer::Algorithm;

/// Receives formatted fit reports.
pub trait LogSink: Send + Sync {
    fn append(&self, report: &str);
}

/// Receives generated fit curves.
pub trait CurveSink: Send + Sync {
    /// Overlay `curve`, fitted to `dataset`, on the dataset's plot.
    fn render_curve(&self, dataset: &str, label: &str, curve: &FitCurve);

    /// Show a short parameter summary next to the curve.
    fn paste_parameters(&self, _dataset: &str, _text: &str) {}
}

/// Receives parameter and covariance tables.
pub trait TableSink: Send + Sync {
    fn write_parameters(&self, table: &ParameterTable);

    fn write_covariance(&self, _title: &str, _names: &[String], _matrix: &Array2<f64>) {}
}

/// Notified as a fit progresses.
pub trait FitObserver: Send + Sync {
    /// Called once the inputs are validated, right before the optimizer runs.
    fn optimization_started(&self, _model: &str, _algorithm: Algorithm, _varying: usize) {}

    fn iteration(&self, _iteration: usize, _cost: f64) {}

    fn optimization_finished(&self, _status: FitStatus, _iterations: usize) {}
}

/// One fit's row in a parameter table.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterRow {
    pub dataset: String,
    pub model: String,
    /// `(name, value, standard error)` per parameter
    pub values: Vec<(String, f64, f64)>,
    pub r_squared: f64,
    pub reduced_chi_square: f64,
    pub status: FitStatus,
}

impl ParameterRow {
    pub fn from_result(result: &FitResult) -> Self {
        Self {
            dataset: result.dataset.clone(),
            model: result.model_name(),
            values: result
                .parameters
                .iter()
                .map(|p| (p.name.clone(), p.value, p.std_error))
                .collect(),
            r_squared: result.r_squared,
            reduced_chi_square: result.reduced_chi_square,
            status: result.status,
        }
    }
}

/// Parameter table; columns are the union of the rows' parameter names.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterTable {
    pub title: String,
    pub columns: Vec<String>,
    pub rows: Vec<ParameterRow>,
}

impl ParameterTable {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Self::default()
        }
    }

    pub fn push(&mut self, row: ParameterRow) {
        for (name, _, _) in &row.values {
            if !self.columns.contains(name) {
                self.columns.push(name.clone());
            }
        }
        self.rows.push(row);
    }

    /// Value and error of `column` in row `row`.
    pub fn cell(&self, row: usize, column: &str) -> Option<(f64, f64)> {
        self.rows
            .get(row)?
            .values
            .iter()
            .find(|(name, _, _)| name == column)
            .map(|&(_, value, error)| (value, error))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// In-memory sink recording everything it receives.
#[derive(Debug, Default)]
pub struct Recorder {
    reports: Mutex<Vec<String>>,
    curves: Mutex<Vec<(String, String, FitCurve)>>,
    pasted: Mutex<Vec<(String, String)>>,
    tables: Mutex<Vec<ParameterTable>>,
    covariances: Mutex<Vec<(String, Vec<String>, Array2<f64>)>>,
}

fn snapshot<T: Clone>(items: &Mutex<Vec<T>>) -> Vec<T> {
    items
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

fn record<T>(items: &Mutex<Vec<T>>, item: T) {
    items
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .push(item);
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<String> {
        snapshot(&self.reports)
    }

    /// `(dataset, label, curve)` per rendered curve.
    pub fn curves(&self) -> Vec<(String, String, FitCurve)> {
        snapshot(&self.curves)
    }

    pub fn pasted(&self) -> Vec<(String, String)> {
        snapshot(&self.pasted)
    }

    pub fn tables(&self) -> Vec<ParameterTable> {
        snapshot(&self.tables)
    }

    pub fn covariances(&self) -> Vec<(String, Vec<String>, Array2<f64>)> {
        snapshot(&self.covariances)
    }
}

impl LogSink for Recorder {
    fn append(&self, report: &str) {
        record(&self.reports, report.to_string());
    }
}

impl CurveSink for Recorder {
    fn render_curve(&self, dataset: &str, label: &str, curve: &FitCurve) {
        record(
            &self.curves,
            (dataset.to_string(), label.to_string(), curve.clone()),
        );
    }

    fn paste_parameters(&self, dataset: &str, text: &str) {
        record(&self.pasted, (dataset.to_string(), text.to_string()));
    }
}

impl TableSink for Recorder {
    fn write_parameters(&self, table: &ParameterTable) {
        record(&self.tables, table.clone());
    }

    fn write_covariance(&self, title: &str, names: &[String], matrix: &Array2<f64>) {
        record(
            &self.covariances,
            (title.to_string(), names.to_vec(), matrix.clone()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(dataset: &str, names: &[&str]) -> ParameterRow {
        ParameterRow {
            dataset: dataset.to_string(),
            model: "m".to_string(),
            values: names.iter().map(|n| (n.to_string(), 1.0, 0.1)).collect(),
            r_squared: 1.0,
            reduced_chi_square: 0.0,
            status: FitStatus::Converged,
        }
    }

    #[test]
    fn test_table_columns_are_a_union() {
        let mut table = ParameterTable::new("Fits");
        table.push(row("a", &["slope", "intercept"]));
        table.push(row("b", &["A", "xc", "slope"]));

        assert_eq!(table.columns, vec!["slope", "intercept", "A", "xc"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(1, "xc"), Some((1.0, 0.1)));
        assert_eq!(table.cell(0, "xc"), None);
    }

    #[test]
    fn test_recorder() {
        let recorder = Recorder::new();
        recorder.append("report");
        recorder.render_curve("d", "fit", &FitCurve::default());
        assert_eq!(recorder.reports(), vec!["report"]);
        assert_eq!(recorder.curves().len(), 1);
        assert!(recorder.tables().is_empty());
    }
}
