#![allow(dead_code)]
//! Synthetic Paris-region inputs shared by the integration tests.

use std::path::PathBuf;

use chrono::{Datelike, Duration, NaiveDate, Weekday};

pub const START: (i32, u32, u32) = (2024, 1, 1);

pub fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(START.0, START.1, START.2).unwrap()
}

pub fn temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("smart-energy-{tag}-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn mean_temperature(i: usize) -> f64 {
    8.0 + 6.0 * (i as f64 * 0.09).sin() + ((i * 7) % 5) as f64 * 0.3
}

/// Expected daily total: colder days and weekdays consume more.
pub fn daily_total(i: usize) -> f64 {
    let day = start() + Duration::days(i as i64);
    let weekend = matches!(day.weekday(), Weekday::Sat | Weekday::Sun);
    50_000.0 - 800.0 * mean_temperature(i) - if weekend { 3_000.0 } else { 0.0 } + ((i * 13) % 7) as f64 * 50.0
}

/// `;`-separated consumption export: two UTC records per day whose mean is
/// the daily value.
pub fn consumption_csv(days: usize) -> String {
    let mut out = String::from(
        "Date - Heure;Consommation brute gaz (MW PCS 0°C) - NaTran;\
         Consommation brute gaz (MW PCS 0°C) - Teréga;\
         Consommation brute gaz totale (MW PCS 0°C);\
         Consommation brute électricité (MW) - RTE;\
         Consommation brute totale (MW)\n",
    );
    for i in 0..days {
        let day = start() + Duration::days(i as i64);
        let total = daily_total(i);
        for (hour, delta) in [(10, -5.0), (14, 5.0)] {
            let t = total + delta;
            let elec = 0.6 * t;
            let gas = t - elec;
            out.push_str(&format!(
                "{}T{hour:02}:00:00+00:00;{};{};{};{};{}\n",
                day.format("%Y-%m-%d"),
                0.9 * gas,
                0.1 * gas,
                gas,
                elec,
                t
            ));
        }
    }
    out
}

/// Station export with Météo-France codes, one row per day and one
/// sentinel row on day 3.
pub fn weather_csv(days: usize) -> String {
    let mut out = String::from("AAAAMMJJ,RR,TN,TX,TM,FFM,FXY\n");
    for i in 0..days {
        let day = start() + Duration::days(i as i64);
        let tm = mean_temperature(i);
        let wind = 3.0 + ((i * 13) % 17) as f64 * 0.2;
        out.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            day.format("%Y%m%d"),
            ((i * 7) % 11) as f64 * 0.5,
            tm - 3.0 - ((i * 3) % 4) as f64 * 0.2,
            tm + 4.0 + ((i * 5) % 3) as f64 * 0.3,
            tm,
            wind,
            wind + 2.0 + ((i * 11) % 7) as f64 * 0.4
        ));
        if i == 3 {
            out.push_str(&format!("{},-9999,-9999,9999,-9999,-9999,-9999\n", day.format("%Y%m%d")));
        }
    }
    out
}
