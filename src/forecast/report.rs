use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};

use super::engine::ForecastReport;

/// Plain-text table for the terminal.
pub fn render_table(report: &ForecastReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} forecast ({}, model {}) after {}",
        report.target, report.model_type, report.model_id, report.last_observed
    );
    let _ = writeln!(out, "{:<12} {:>14}  peak", "date", "MW");
    for p in &report.points {
        let _ = writeln!(
            out,
            "{:<12} {:>14.1}  {}",
            p.date.format("%Y-%m-%d"),
            p.value,
            if p.above_threshold { "!" } else { "" }
        );
    }
    let _ = writeln!(
        out,
        "{} day(s) above {:.0} MW",
        report.peak_count(),
        report.peak_threshold_mw
    );
    out
}

/// Write the points as CSV (`.csv`) or the full report as JSON (anything else).
pub fn write_report(report: &ForecastReport, path: &Path) -> Result<()> {
    write_report_to(report, path).with_context(|| format!("writing forecast to {}", path.display()))
}

fn write_report_to(report: &ForecastReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some("csv") => {
            let mut writer = csv::Writer::from_path(path)?;
            writer.write_record(["date", report.target.as_str(), "above_threshold"])?;
            for p in &report.points {
                writer.write_record([
                    p.date.format("%Y-%m-%d").to_string(),
                    p.value.to_string(),
                    p.above_threshold.to_string(),
                ])?;
            }
            writer.flush()?;
        }
        _ => {
            let json = serde_json::to_string_pretty(report)?;
            std::fs::write(path, json)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::ForecastPoint;
    use crate::ml::ModelType;
    use chrono::NaiveDate;

    fn report() -> ForecastReport {
        let d = |day| NaiveDate::from_ymd_opt(2024, 2, day).unwrap();
        ForecastReport {
            model_id: "linear_regression_test".to_string(),
            model_type: ModelType::LinearRegression,
            target: "conso_totale_MW".to_string(),
            generated_at: chrono::Utc::now(),
            last_observed: d(1),
            assumed_weather: vec![("T_Moyenne".to_string(), 4.5)],
            peak_threshold_mw: 60_000.0,
            points: vec![
                ForecastPoint { date: d(2), value: 58_000.0, above_threshold: false },
                ForecastPoint { date: d(3), value: 61_250.5, above_threshold: true },
            ],
        }
    }

    #[test]
    fn test_render_table_flags_peaks() {
        let text = render_table(&report());
        assert!(text.contains("2024-02-03"));
        assert!(text.contains("61250.5  !"));
        assert!(text.ends_with("1 day(s) above 60000 MW\n"));
    }

    #[test]
    fn test_write_csv_and_json() {
        let dir = std::env::temp_dir().join(format!("smart-energy-report-{}", uuid::Uuid::new_v4()));
        let csv_path = dir.join("forecast.csv");
        let json_path = dir.join("forecast.json");
        write_report(&report(), &csv_path).unwrap();
        write_report(&report(), &json_path).unwrap();

        let csv_text = std::fs::read_to_string(&csv_path).unwrap();
        assert!(csv_text.starts_with("date,conso_totale_MW,above_threshold\n2024-02-02,58000,false\n"));
        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(json["model_type"], "LinearRegression");
        assert_eq!(json["points"][1]["above_threshold"], true);
        std::fs::remove_dir_all(dir).ok();
    }
}
