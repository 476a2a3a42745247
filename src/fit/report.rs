//! Plain-text fit reports.

use std::fmt::Write;

use crate::fit::result::FitResult;
use crate::model::ModelFunction;

/// Format `value` with `digits` significant digits, like C's `%g`.
///
/// Fixed notation is used for exponents from -4 up to `digits - 1`, scientific
/// otherwise; trailing zeros are dropped.
pub fn format_general(value: f64, digits: usize) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }

    let digits = digits.max(1);
    // Round first so 9.9999999 with 3 digits is classified by its rounded exponent.
    let scientific = format!("{:.*e}", digits - 1, value);
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some(parts) => parts,
        None => return scientific,
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if exponent < -4 || exponent >= digits as i32 {
        format!("{}e{}", trim_zeros(mantissa), exponent)
    } else {
        let decimals = (digits as i32 - 1 - exponent).max(0) as usize;
        trim_zeros(&format!("{:.*}", decimals, value)).to_string()
    }
}

fn trim_zeros(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

/// The full report sent to the log.
pub fn fit_report(result: &FitResult, digits: usize, with_covariance: bool) -> String {
    let g = |v: f64| format_general(v, digits);
    let mut out = String::new();

    let _ = writeln!(
        out,
        "Nonlinear fit of dataset: {}, using function: {}",
        result.dataset,
        result.model_name()
    );
    let _ = writeln!(out, "{}", result.model().formula());
    let _ = writeln!(out, "Weighting method: {}", result.weighting);
    let _ = writeln!(
        out,
        "{} algorithm with tolerance = {}",
        result.algorithm,
        g(result.tolerance)
    );
    match result.range {
        Some((from, to)) => {
            let _ = writeln!(out, "From x = {} to x = {} ({} points)", g(from), g(to), result.points);
        }
        None => {
            let _ = writeln!(out, "Full range ({} points)", result.points);
        }
    }

    let width = result
        .parameters
        .iter()
        .map(|p| p.name.len())
        .max()
        .unwrap_or(0)
        .max("Parameter".len());
    let _ = writeln!(out, "{:<width$}  {:>16}  {:>16}", "Parameter", "Value", "Error", width = width);
    for p in &result.parameters {
        let error = if p.fixed {
            "(fixed)".to_string()
        } else {
            g(p.std_error)
        };
        let _ = writeln!(out, "{:<width$}  {:>16}  {:>16}", p.name, g(p.value), error, width = width);
    }
    let _ = writeln!(out, "{}", "-".repeat(width + 36));

    let _ = writeln!(out, "Chi^2/doF = {}", g(result.reduced_chi_square));
    let _ = writeln!(out, "R^2 = {}", g(result.r_squared));
    let _ = writeln!(out, "Adjusted R^2 = {}", g(result.adjusted_r_squared));
    let _ = writeln!(out, "RMSE = {}", g(result.rmse));
    let _ = writeln!(out, "Degrees of freedom = {}", result.dof);
    let _ = writeln!(
        out,
        "Status: {} after {} iterations ({})",
        result.status, result.iterations, result.message
    );

    if let Some(peaks) = &result.peaks {
        let _ = writeln!(out, "Peak  {:>16}  {:>16}  {:>16}  {:>16}", "Center", "Width", "Height", "Area");
        for peak in peaks {
            let _ = writeln!(
                out,
                "{:<4}  {:>16}  {:>16}  {:>16}  {:>16}",
                peak.index,
                g(peak.center),
                g(peak.width),
                g(peak.height),
                g(peak.area)
            );
        }
    }

    if with_covariance {
        let _ = writeln!(out, "Covariance matrix:");
        for row in result.covariance.outer_iter() {
            let cells: Vec<String> = row.iter().map(|&v| format!("{:>16}", g(v))).collect();
            let _ = writeln!(out, "{}", cells.join("  "));
        }
    }

    out
}

/// Short `name = value ± error` lines for display next to the curve.
pub fn plot_summary(result: &FitResult, digits: usize) -> String {
    let mut lines: Vec<String> = result
        .parameters
        .iter()
        .map(|p| format!("{} = {} ± {}", p.name, format_general(p.value, digits), format_general(p.std_error, digits)))
        .collect();
    lines.push(format!("R^2 = {}", format_general(result.r_squared, digits)));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_general() {
        assert_eq!(format_general(0.0, 6), "0");
        assert_eq!(format_general(2.0, 6), "2");
        assert_eq!(format_general(1.0 / 3.0, 6), "0.333333");
        assert_eq!(format_general(123456.7, 6), "123457");
        assert_eq!(format_general(1234567.0, 6), "1.23457e6");
        assert_eq!(format_general(0.000012345, 3), "1.23e-5");
        assert_eq!(format_general(-0.5, 2), "-0.5");
        assert_eq!(format_general(9.9999999, 3), "10");
        assert_eq!(format_general(f64::NAN, 6), "NaN");
    }
}
