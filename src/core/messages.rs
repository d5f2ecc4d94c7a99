//! Localized user-facing strings (English and Spanish).

#![allow(missing_docs)]

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::errors::{KstError, PipelineStage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Es,
}

impl Language {
    pub const fn code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Es => "es",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Self::En),
            "es" | "spanish" | "español" => Ok(Self::Es),
            other => Err(format!("unsupported language {other:?} (expected en or es)")),
        }
    }
}

/// Fixed message catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Msg {
    Title,
    NoSnapshots,
    SnapshotHeader,
    PlayersHeader,
    TrendHeader,
    DeltaHeader,
    NoDataForEntity,
    MissingMetric,
    IngestSummary,
    IngestFailures,
}

/// Look up the template for `msg` in `lang`. Templates use `{name}` placeholders.
pub const fn template(msg: Msg, lang: Language) -> &'static str {
    match (msg, lang) {
        (Msg::Title, Language::En) => "Kingdom Stats Tracker",
        (Msg::Title, Language::Es) => "Rastreador de estadísticas del reino",
        (Msg::NoSnapshots, Language::En) => "No snapshots found in the store.",
        (Msg::NoSnapshots, Language::Es) => "No se encontraron instantáneas en la base de datos.",
        (Msg::SnapshotHeader, Language::En) => "Snapshot {name}",
        (Msg::SnapshotHeader, Language::Es) => "Instantánea {name}",
        (Msg::PlayersHeader, Language::En) => "Players in {name}",
        (Msg::PlayersHeader, Language::Es) => "Jugadores en {name}",
        (Msg::TrendHeader, Language::En) => "Trend of {metric} over time for {entity}",
        (Msg::TrendHeader, Language::Es) => {
            "Tendencia de {metric} a lo largo del tiempo para {entity}"
        }
        (Msg::DeltaHeader, Language::En) => "Change in {metric} between snapshots",
        (Msg::DeltaHeader, Language::Es) => "Cambio de {metric} entre instantáneas",
        (Msg::NoDataForEntity, Language::En) => "No data available for {entity}.",
        (Msg::NoDataForEntity, Language::Es) => "No hay datos disponibles para {entity}.",
        (Msg::MissingMetric, Language::En) => "Column {column} is missing or non-numeric.",
        (Msg::MissingMetric, Language::Es) => "La columna {column} falta o no es numérica.",
        (Msg::IngestSummary, Language::En) => {
            "Ingested {loaded} snapshot(s), {failed} failed, {ignored} ignored."
        }
        (Msg::IngestSummary, Language::Es) => {
            "Se cargaron {loaded} instantánea(s), {failed} con error, {ignored} ignorada(s)."
        }
        (Msg::IngestFailures, Language::En) => "Some snapshot files could not be ingested.",
        (Msg::IngestFailures, Language::Es) => {
            "Algunos archivos de instantáneas no se pudieron cargar."
        }
    }
}

/// Render `msg` in `lang`, substituting `{key}` placeholders from `args`.
pub fn render(msg: Msg, lang: Language, args: &[(&str, &str)]) -> String {
    let mut out = template(msg, lang).to_string();
    for (key, value) in args {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

/// Localized name of a pipeline stage.
pub const fn stage_label(stage: PipelineStage, lang: Language) -> &'static str {
    match (stage, lang) {
        (PipelineStage::Config, Language::En) => "configuration",
        (PipelineStage::Config, Language::Es) => "configuración",
        (PipelineStage::Ingest, Language::En) => "ingestion",
        (PipelineStage::Ingest, Language::Es) => "carga",
        (PipelineStage::List, Language::En) => "snapshot listing",
        (PipelineStage::List, Language::Es) => "listado de instantáneas",
        (PipelineStage::Read, Language::En) => "snapshot read",
        (PipelineStage::Read, Language::Es) => "lectura de instantánea",
        (PipelineStage::Aggregate, Language::En) => "aggregation",
        (PipelineStage::Aggregate, Language::Es) => "agregación",
        (PipelineStage::Metrics, Language::En) => "metrics",
        (PipelineStage::Metrics, Language::Es) => "métricas",
    }
}

/// One-line localized failure report naming the failing stage.
pub fn failure_line(err: &KstError, lang: Language) -> String {
    let root = err.root();
    match (err.stage(), lang) {
        (Some(stage), Language::En) => format!(
            "An error occurred during {}: {root}",
            stage_label(stage, lang)
        ),
        (Some(stage), Language::Es) => format!(
            "Ocurrió un error durante {}: {root}",
            stage_label(stage, lang)
        ),
        (None, Language::En) => format!("An error occurred: {root}"),
        (None, Language::Es) => format!("Ocurrió un error: {root}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_MSGS: [Msg; 10] = [
        Msg::Title,
        Msg::NoSnapshots,
        Msg::SnapshotHeader,
        Msg::PlayersHeader,
        Msg::TrendHeader,
        Msg::DeltaHeader,
        Msg::NoDataForEntity,
        Msg::MissingMetric,
        Msg::IngestSummary,
        Msg::IngestFailures,
    ];

    #[test]
    fn every_message_has_distinct_translations() {
        for msg in ALL_MSGS {
            let en = template(msg, Language::En);
            let es = template(msg, Language::Es);
            assert!(!en.is_empty());
            assert_ne!(en, es, "{msg:?} is untranslated");
        }
    }

    #[test]
    fn placeholders_survive_translation() {
        for msg in ALL_MSGS {
            let en = template(msg, Language::En);
            let es = template(msg, Language::Es);
            for key in ["{name}", "{metric}", "{entity}", "{column}", "{loaded}"] {
                assert_eq!(en.contains(key), es.contains(key), "{msg:?} {key}");
            }
        }
    }

    #[test]
    fn render_substitutes_placeholders() {
        let line = render(
            Msg::TrendHeader,
            Language::En,
            &[("metric", "power"), ("entity", "42 (Alice)")],
        );
        assert_eq!(line, "Trend of power over time for 42 (Alice)");
    }

    #[test]
    fn language_parses_case_insensitively() {
        assert_eq!("EN".parse::<Language>(), Ok(Language::En));
        assert_eq!(" es ".parse::<Language>(), Ok(Language::Es));
        assert!("de".parse::<Language>().is_err());
    }

    #[test]
    fn failure_line_names_stage_in_both_languages() {
        let err = KstError::SnapshotNotFound {
            name: "01012024".to_string(),
        }
        .at_stage(PipelineStage::Aggregate);

        let en = failure_line(&err, Language::En);
        assert!(en.contains("aggregation"), "{en}");
        assert!(en.contains("KST-2101"), "{en}");

        let es = failure_line(&err, Language::Es);
        assert!(es.contains("agregación"), "{es}");
        assert!(es.starts_with("Ocurrió un error"), "{es}");
    }

    #[test]
    fn failure_line_without_stage() {
        let err = KstError::Runtime {
            details: "boom".to_string(),
        };
        assert!(failure_line(&err, Language::En).starts_with("An error occurred: "));
    }
}
