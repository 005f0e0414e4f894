//! Named computations behind each report type.

use crate::db::{ParamKind, ParamSpec, Procedure, ProcedureCatalog, ResultSpec};

use super::ReportType;

pub static HAULING_MODEL: Procedure = Procedure {
    name: "hauling_model",
    params: &[
        ParamSpec::required(":from_date", ParamKind::Date),
        ParamSpec::required(":to_date", ParamKind::Date),
        ParamSpec::optional(":shift", ParamKind::Text),
        ParamSpec::optional(":material", ParamKind::Text),
    ],
    results: &[ResultSpec {
        name: "routes",
        sql: "SELECT source_location,
                     dump_location,
                     material,
                     COUNT(*) AS trips,
                     ROUND(SUM(payload_tonnes), 2) AS total_tonnes,
                     ROUND(AVG(payload_tonnes), 2) AS avg_payload_tonnes,
                     ROUND(AVG(cycle_minutes), 2) AS avg_cycle_minutes,
                     ROUND(AVG(distance_km), 3) AS avg_distance_km,
                     ROUND(SUM(payload_tonnes * distance_km), 2) AS tonne_km
              FROM haul_cycles
              WHERE cycle_date BETWEEN :from_date AND :to_date
                AND (:shift IS NULL OR shift = :shift)
                AND (:material IS NULL OR material = :material)
              GROUP BY source_location, dump_location, material
              ORDER BY total_tonnes DESC, source_location, dump_location, material",
    }],
};

pub static MATERIAL_REHANDLING: Procedure = Procedure {
    name: "material_rehandling",
    params: &[
        ParamSpec::required(":from_date", ParamKind::Date),
        ParamSpec::required(":to_date", ParamKind::Date),
        ParamSpec::optional(":material", ParamKind::Text),
    ],
    results: &[ResultSpec {
        name: "rehandling",
        sql: "SELECT movement_date,
                     material,
                     from_stockpile,
                     to_stockpile,
                     COUNT(*) AS movements,
                     ROUND(SUM(tonnes), 2) AS total_tonnes
              FROM material_movements
              WHERE is_rehandle = 1
                AND movement_date BETWEEN :from_date AND :to_date
                AND (:material IS NULL OR material = :material)
              GROUP BY movement_date, material, from_stockpile, to_stockpile
              ORDER BY movement_date, material, from_stockpile, to_stockpile",
    }],
};

pub static OPERATOR_PERFORMANCE: Procedure = Procedure {
    name: "operator_performance",
    params: &[
        ParamSpec::required(":from_date", ParamKind::Date),
        ParamSpec::required(":to_date", ParamKind::Date),
        ParamSpec::optional(":shift", ParamKind::Text),
        ParamSpec::optional(":operator_id", ParamKind::Integer),
    ],
    results: &[
        ResultSpec {
            name: "summary",
            sql: "SELECT h.operator_id,
                         COALESCE(o.name, 'unassigned') AS operator_name,
                         COUNT(*) AS trips,
                         ROUND(SUM(h.payload_tonnes), 2) AS total_tonnes,
                         ROUND(AVG(h.cycle_minutes), 2) AS avg_cycle_minutes,
                         ROUND(SUM(h.payload_tonnes) / (SUM(h.cycle_minutes) / 60.0), 2)
                             AS tonnes_per_hour
                  FROM haul_cycles h
                  LEFT JOIN operators o ON o.id = h.operator_id
                  WHERE h.cycle_date BETWEEN :from_date AND :to_date
                    AND (:shift IS NULL OR h.shift = :shift)
                    AND (:operator_id IS NULL OR h.operator_id = :operator_id)
                  GROUP BY h.operator_id
                  ORDER BY total_tonnes DESC, h.operator_id",
        },
        ResultSpec {
            name: "by_shift",
            sql: "SELECT h.operator_id,
                         h.cycle_date,
                         h.shift,
                         COUNT(*) AS trips,
                         ROUND(SUM(h.payload_tonnes), 2) AS total_tonnes
                  FROM haul_cycles h
                  WHERE h.cycle_date BETWEEN :from_date AND :to_date
                    AND (:shift IS NULL OR h.shift = :shift)
                    AND (:operator_id IS NULL OR h.operator_id = :operator_id)
                  GROUP BY h.operator_id, h.cycle_date, h.shift
                  ORDER BY h.operator_id, h.cycle_date, h.shift",
        },
    ],
};

/// The named computation a report type runs.
pub fn procedure_for(report_type: ReportType) -> &'static Procedure {
    match report_type {
        ReportType::HaulingModel => &HAULING_MODEL,
        ReportType::MaterialRehandling => &MATERIAL_REHANDLING,
        ReportType::OperatorPerformance => &OPERATOR_PERFORMANCE,
    }
}

/// A catalog holding every report computation.
pub fn catalog() -> ProcedureCatalog {
    let mut catalog = ProcedureCatalog::new();
    for report_type in ReportType::ALL {
        catalog.register(procedure_for(report_type));
    }
    catalog
}
