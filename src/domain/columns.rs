//! Canonical column names and the header aliases accepted for each field.
//!
//! Raw headers are normalized once (`normalize_header`) and then each logical
//! field is looked up through its ordered alias list. The first alias present
//! wins, so lookups are deterministic even when a file carries several
//! candidate columns.

use std::collections::HashMap;

use crate::error::{PipelineError, PipelineResult};

pub const GAS_NATRAN: &str = "gaz_NaTran_MW";
pub const GAS_TEREGA: &str = "gaz_Terega_MW";
pub const GAS_TOTAL: &str = "gaz_total_MW";
pub const ELECTRICITY: &str = "elec_MW";
pub const TOTAL_CONSUMPTION: &str = "conso_totale_MW";

pub const RAIN: &str = "Pluie_mm";
pub const TEMP_MIN: &str = "Tn_Min";
pub const TEMP_MAX: &str = "Tx_Max";
pub const TEMP_MEAN: &str = "T_Moyenne";
pub const WIND_MEAN: &str = "Vent_Moyen";
pub const WIND_MAX: &str = "Vent_Max";

pub const TOTAL_LAG_1: &str = "conso_totale_MW_t-1";
pub const TOTAL_LAG_7: &str = "conso_totale_MW_t-7";
pub const TOTAL_ROLL_7: &str = "conso_totale_MW_roll7";
pub const ELECTRICITY_LAG_1: &str = "elec_MW_t-1";
pub const GAS_TOTAL_LAG_1: &str = "gaz_total_MW_t-1";

/// Name of the date column in persisted tables.
pub const DATE: &str = "date";

/// A logical field and the raw headers that may carry it, in priority order.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub canonical: &'static str,
    pub aliases: &'static [&'static str],
}

pub const CONSUMPTION_TIMESTAMP: FieldSpec = FieldSpec {
    canonical: "timestamp",
    aliases: &["Date - Heure", "date_heure", "datetime", "date_time", "date_et_heure"],
};

pub const CONSUMPTION_FIELDS: [FieldSpec; 5] = [
    FieldSpec {
        canonical: GAS_NATRAN,
        aliases: &[
            "Consommation brute gaz (MW PCS 0°C) - NaTran",
            "Consommation brute gaz (MW PCS 0°C) - GRTgaz",
            GAS_NATRAN,
        ],
    },
    FieldSpec {
        canonical: GAS_TEREGA,
        aliases: &[
            "Consommation brute gaz (MW PCS 0°C) - Teréga",
            "Consommation brute gaz (MW PCS 0°C) - Terega",
            GAS_TEREGA,
        ],
    },
    FieldSpec {
        canonical: GAS_TOTAL,
        aliases: &["Consommation brute gaz totale (MW PCS 0°C)", GAS_TOTAL],
    },
    FieldSpec {
        canonical: ELECTRICITY,
        aliases: &["Consommation brute électricité (MW) - RTE", ELECTRICITY],
    },
    FieldSpec {
        canonical: TOTAL_CONSUMPTION,
        aliases: &["Consommation brute totale (MW)", TOTAL_CONSUMPTION],
    },
];

pub const WEATHER_DATE: FieldSpec = FieldSpec {
    canonical: DATE,
    aliases: &["Date", "AAAAMMJJ"],
};

/// Daily station codes first, then the labels of the SYNOP export, whose
/// 3-hourly observations reduce to the same daily fields.
pub const WEATHER_FIELDS: [FieldSpec; 6] = [
    FieldSpec {
        canonical: RAIN,
        aliases: &[RAIN, "RR", "Précipitations dans les 3 dernières heures"],
    },
    FieldSpec {
        canonical: TEMP_MIN,
        aliases: &[TEMP_MIN, "TN", "Température minimale sur 12 heures (°C)"],
    },
    FieldSpec {
        canonical: TEMP_MAX,
        aliases: &[TEMP_MAX, "TX", "Température maximale sur 12 heures (°C)"],
    },
    FieldSpec {
        canonical: TEMP_MEAN,
        aliases: &[TEMP_MEAN, "TM", "Température (°C)"],
    },
    FieldSpec {
        canonical: WIND_MEAN,
        aliases: &[WIND_MEAN, "FFM", "Vitesse du vent moyen 10 mn"],
    },
    FieldSpec {
        canonical: WIND_MAX,
        aliases: &[WIND_MAX, "FXY", "Rafales sur une période"],
    },
];

/// Consumption column names in output order.
pub fn consumption_columns() -> [&'static str; 5] {
    CONSUMPTION_FIELDS.map(|f| f.canonical)
}

/// Weather column names in output order.
pub fn weather_columns() -> [&'static str; 6] {
    WEATHER_FIELDS.map(|f| f.canonical)
}

/// Normalize a raw header for lookup.
///
/// Strips a UTF-8 BOM, lowercases, and collapses every run of characters that
/// are not letters or digits into a single `_` (trimmed at both ends). So
/// `"Date - Heure"`, `"date_heure"` and `" DATE-HEURE "` all become
/// `date_heure`.
pub fn normalize_header(name: &str) -> String {
    let name = name.trim().trim_start_matches('\u{feff}');
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for ch in name.chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch);
        } else {
            pending_sep = true;
        }
    }
    out
}

/// Normalized header name -> column position.
#[derive(Debug, Clone)]
pub struct HeaderIndex {
    positions: HashMap<String, usize>,
}

impl HeaderIndex {
    pub fn new<S: AsRef<str>>(headers: &[S]) -> Self {
        let mut positions = HashMap::with_capacity(headers.len());
        for (idx, name) in headers.iter().enumerate() {
            // First occurrence wins on collisions after normalization.
            positions.entry(normalize_header(name.as_ref())).or_insert(idx);
        }
        Self { positions }
    }

    /// Position of the first alias present, if any.
    pub fn find(&self, field: &FieldSpec) -> Option<usize> {
        field
            .aliases
            .iter()
            .find_map(|alias| self.positions.get(&normalize_header(alias)).copied())
    }

    pub fn require(&self, field: &FieldSpec) -> PipelineResult<usize> {
        self.find(field)
            .ok_or_else(|| PipelineError::missing_column(field.canonical, field.aliases))
    }

    /// Resolve every field, failing on the first one that is absent.
    pub fn require_all(&self, fields: &[FieldSpec]) -> PipelineResult<Vec<usize>> {
        fields.iter().map(|f| self.require(f)).collect()
    }
}
