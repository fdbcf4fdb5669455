//! Survey CSV parser
//!
//! Turns a field-survey spreadsheet export into `ParcelAggregate`s. The
//! layout is loose: the delimiter varies between exports and the pest
//! columns are whatever sits between the restriction column and the first
//! herbicide column. Row problems are collected, never fatal on their own.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

use crate::error::CsvError;
use crate::services::ids::IdentifierSource;
use crate::types::{InfestationLevel, ParcelAggregate, SurveyFields};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Header prefix of the first herbicide column; ends the pest range
const HERBICIDE_PREFIX: &str = "Herb ";

/// Columns that must exist for a file to be accepted
const ANCHOR_COLUMNS: [&str; 4] = ["Id", "Setor", "Cod.Fazenda", "Desc.Fazenda"];

/// A row that could not be turned into a parcel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseError {
    /// 1-based; the header is line 1
    pub line: usize,
    pub message: String,
}

/// Output of one parse
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub parcels: Vec<ParcelAggregate>,
    pub total_rows: usize,
    pub errors: Vec<ParseError>,
}

/// Pick the delimiter from the first line: tab, then semicolon, else comma
pub fn detect_delimiter(content: &[u8]) -> u8 {
    let first_line = content.split(|b| *b == b'\n').next().unwrap_or_default();

    let tabs = first_line.iter().filter(|b| **b == b'\t').count();
    let semicolons = first_line.iter().filter(|b| **b == b';').count();

    if tabs > 5 {
        b'\t'
    } else if semicolons > 5 {
        b';'
    } else {
        b','
    }
}

/// Lower-case, strip accents and trim; NFC and NFD spellings fold alike
pub fn fold_header(name: &str) -> String {
    name.trim()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Exact name, then folded equality, then folded containment
fn find_anchor(headers: &[String], folded: &[String], name: &str) -> Option<usize> {
    let wanted = fold_header(name);
    headers
        .iter()
        .position(|h| h == name)
        .or_else(|| folded.iter().position(|h| *h == wanted))
        .or_else(|| folded.iter().position(|h| h.contains(&wanted)))
}

/// Exact name, then folded equality
fn find_column(headers: &[String], folded: &[String], name: &str) -> Option<usize> {
    let wanted = fold_header(name);
    headers
        .iter()
        .position(|h| h == name)
        .or_else(|| folded.iter().position(|h| *h == wanted))
}

fn is_placeholder(folded: &str) -> bool {
    folded.starts_with("coluna") || folded.starts_with("column")
}

/// Resolved positions of every column the parser reads
#[derive(Debug)]
struct ColumnLayout {
    id: usize,
    sector: usize,
    farm_code: usize,
    farm_description: usize,
    sector2: Option<usize>,
    block: Option<usize>,
    cut: Option<usize>,
    total_area: Option<usize>,
    soil_texture: Option<usize>,
    current_cut: Option<usize>,
    renewal: Option<usize>,
    harvest_month: Option<usize>,
    restriction: Option<usize>,
    pests: Vec<(String, usize)>,
}

impl ColumnLayout {
    fn from_headers(headers: &[String]) -> Result<Self, CsvError> {
        let folded: Vec<String> = headers.iter().map(|h| fold_header(h)).collect();

        let mut anchors = [0usize; 4];
        for (slot, name) in anchors.iter_mut().zip(ANCHOR_COLUMNS) {
            *slot = find_anchor(headers, &folded, name).ok_or_else(|| {
                CsvError::InvalidFormat(format!("required column not found: {}", name))
            })?;
        }

        // last match wins when an export repeats the column
        let restriction = folded.iter().rposition(|h| h.contains("restri"));
        let pests = match restriction {
            Some(start) => {
                let end = headers
                    .iter()
                    .enumerate()
                    .skip(start + 1)
                    .find(|(_, h)| h.starts_with(HERBICIDE_PREFIX))
                    .map(|(i, _)| i)
                    .unwrap_or(headers.len());

                (start + 1..end)
                    .filter(|&i| !headers[i].is_empty() && !is_placeholder(&folded[i]))
                    .map(|i| (headers[i].clone(), i))
                    .collect()
            }
            None => Vec::new(),
        };

        let column = |name: &str| find_column(headers, &folded, name);

        Ok(Self {
            id: anchors[0],
            sector: anchors[1],
            farm_code: anchors[2],
            farm_description: anchors[3],
            sector2: column("Setor2"),
            block: column("Quadra"),
            cut: column("Corte"),
            total_area: column("Área Total"),
            soil_texture: column("Desc. Textura Solo"),
            current_cut: column("Corte Atual"),
            renewal: column("Reforma"),
            harvest_month: column("Mês Colheita"),
            restriction,
            pests,
        })
    }
}

fn cell(record: &csv::StringRecord, index: Option<usize>) -> &str {
    index.and_then(|i| record.get(i)).unwrap_or("").trim()
}

fn parse_int(value: &str) -> i32 {
    value.parse().unwrap_or(0)
}

/// Comma-decimal locale: `1.234,56` and `1234,56` both read as 1234.56
fn parse_float(value: &str) -> f64 {
    if value.contains(',') {
        value.replace('.', "").replace(',', ".").parse().unwrap_or(0.0)
    } else {
        value.parse().unwrap_or(0.0)
    }
}

/// Survey CSV parser
pub struct CsvParser {
    ids: Arc<dyn IdentifierSource>,
}

impl CsvParser {
    pub fn new(ids: Arc<dyn IdentifierSource>) -> Self {
        Self { ids }
    }

    /// Parse a whole file. Parcels are tagged with `survey_id`.
    pub fn parse(&self, raw: &[u8], survey_id: Uuid) -> Result<ParseResult, CsvError> {
        let content = raw.strip_prefix(UTF8_BOM).unwrap_or(raw);
        let delimiter = detect_delimiter(content);

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(false)
            .trim(csv::Trim::All)
            .from_reader(content);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| CsvError::InvalidCsv(format!("failed to read header: {}", e)))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        if headers.iter().all(|h| h.is_empty()) {
            return Err(CsvError::InvalidCsv("empty header".to_string()));
        }

        let layout = ColumnLayout::from_headers(&headers)?;
        debug!(
            "Delimiter {:?}, restriction column {:?}, pest columns: {:?}",
            delimiter as char,
            layout.restriction,
            layout.pests.iter().map(|(name, _)| name).collect::<Vec<_>>()
        );

        let mut parcels = Vec::new();
        let mut errors = Vec::new();
        let mut line = 1;

        for record in reader.records() {
            line += 1;
            match record {
                Ok(record) => parcels.push(self.parse_record(&record, &layout, survey_id)),
                Err(e) => errors.push(ParseError {
                    line,
                    message: format!("failed to read row: {}", e),
                }),
            }
        }

        if parcels.is_empty() && !errors.is_empty() {
            return Err(CsvError::InvalidCsv(format!(
                "no valid rows ({} rows rejected)",
                errors.len()
            )));
        }

        Ok(ParseResult {
            total_rows: parcels.len(),
            parcels,
            errors,
        })
    }

    fn parse_record(
        &self,
        record: &csv::StringRecord,
        layout: &ColumnLayout,
        survey_id: Uuid,
    ) -> ParcelAggregate {
        let fields = SurveyFields {
            external_id: cell(record, Some(layout.id)).to_string(),
            sector: cell(record, Some(layout.sector)).to_string(),
            sector2: cell(record, layout.sector2).to_string(),
            farm_code: cell(record, Some(layout.farm_code)).to_string(),
            farm_description: cell(record, Some(layout.farm_description)).to_string(),
            block: cell(record, layout.block).to_string(),
            cut: parse_int(cell(record, layout.cut)),
            total_area: parse_float(cell(record, layout.total_area)),
            soil_texture: cell(record, layout.soil_texture).to_string(),
            current_cut: parse_int(cell(record, layout.current_cut)),
            renewal: cell(record, layout.renewal).to_string(),
            harvest_month: cell(record, layout.harvest_month).to_string(),
            restriction: cell(record, layout.restriction).to_string(),
        };

        let mut parcel = ParcelAggregate::new(self.ids.next_id(), survey_id, fields);

        for (name, index) in &layout.pests {
            let value = cell(record, Some(*index)).to_uppercase();
            match value.as_str() {
                "S" | "SIM" | "1" | "X" => parcel.pests.add_pest(name),
                code => {
                    if let Some(level) = InfestationLevel::from_code(code) {
                        parcel.pests.add_pest_with_level(name, level);
                    }
                }
            }
        }

        parcel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ids::SequentialIds;

    const HEADER: &str = "Id;Setor;Setor2;Cod.Fazenda;Desc.Fazenda;Quadra;Corte;Área Total;Desc. Textura Solo;Corte Atual;Reforma;Mês Colheita;Restrição";

    fn parser() -> CsvParser {
        CsvParser::new(Arc::new(SequentialIds::default()))
    }

    fn survey() -> Uuid {
        Uuid::from_u128(0xabc)
    }

    #[test]
    fn test_parse_basic() {
        let csv = format!(
            "{HEADER};Camalote;Vassoura;Tiririca\n\
             1;Norte;Sub1;FAZ001;Fazenda São João;Q1;3;150,5;Argiloso;2;2020;Agosto;Nenhuma;S;N;S\n\
             2;Sul;Sub2;FAZ002;Fazenda Boa Vista;Q2;4;200,75;Arenoso;3;2019;Setembro;APP;N;S;N"
        );

        let result = parser().parse(csv.as_bytes(), survey()).unwrap();

        assert_eq!(result.total_rows, 2);
        assert!(result.errors.is_empty());

        let first = &result.parcels[0];
        assert_eq!(first.fields.sector, "Norte");
        assert_eq!(first.fields.farm_code, "FAZ001");
        assert_eq!(first.fields.farm_description, "Fazenda São João");
        assert_eq!(first.fields.total_area, 150.5);
        assert_eq!(first.fields.cut, 3);
        assert_eq!(first.fields.current_cut, 2);
        assert_eq!(first.fields.harvest_month, "Agosto");
        assert_eq!(first.fields.restriction, "Nenhuma");
        assert!(first.pests.has_pest("Camalote"));
        assert!(!first.pests.has_pest("Vassoura"));
        assert!(first.pests.has_pest("Tiririca"));

        let second = &result.parcels[1];
        assert_eq!(second.fields.farm_code, "FAZ002");
        assert!(second.pests.has_pest("Vassoura"));
        assert!(!second.pests.has_pest("Camalote"));
    }

    #[test]
    fn test_presence_tokens() {
        let csv = format!(
            "{HEADER};Praga1;Praga2;Praga3;Praga4\n\
             1;N;S;F1;Fazenda;Q;1;100;Arg;1;2020;Jan;N;S;sim;1;X\n\
             2;N;S;F1;Fazenda;Q;1;100;Arg;1;2020;Jan;N;N;NAO;0;"
        );

        let result = parser().parse(csv.as_bytes(), survey()).unwrap();

        assert_eq!(result.parcels[0].pests.present_pests().len(), 4);
        assert!(result.parcels[1].pests.present_pests().is_empty());
    }

    #[test]
    fn test_level_codes_mark_pest_present() {
        let csv = format!(
            "{HEADER};Camalote;Mamona;Mucuna\n\
             1;N;S;F1;Fazenda;Q;1;100;Arg;1;2020;Jan;N;A;m;B"
        );

        let result = parser().parse(csv.as_bytes(), survey()).unwrap();
        let pests = &result.parcels[0].pests;

        assert_eq!(pests.get("Camalote").unwrap().level, Some(InfestationLevel::High));
        assert_eq!(pests.get("Mamona").unwrap().level, Some(InfestationLevel::Medium));
        assert_eq!(pests.get("Mucuna").unwrap().level, Some(InfestationLevel::Low));
    }

    #[test]
    fn test_many_pests() {
        let csv = format!(
            "{HEADER};Camalote;Grama seda;Coloniao;Vassoura;Braquiária;Mamona;Mucuna;Corda Viola;Tiririca\n\
             1;Norte;Sub1;FAZ001;Fazenda A;Q1;3;150,5;Argiloso;2;2020;Agosto;Nenhuma;S;S;N;S;N;N;S;N;S"
        );

        let result = parser().parse(csv.as_bytes(), survey()).unwrap();
        let pests = &result.parcels[0].pests;

        assert_eq!(
            pests.present_pests(),
            vec!["Camalote", "Grama seda", "Mucuna", "Tiririca", "Vassoura"]
        );
        for absent in ["Coloniao", "Braquiária", "Mamona", "Corda Viola"] {
            assert!(!pests.has_pest(absent), "{} should be absent", absent);
        }
    }

    #[test]
    fn test_empty_file_is_invalid() {
        let err = parser().parse(b"", survey()).unwrap_err();
        assert!(matches!(err, CsvError::InvalidCsv(_)));
    }

    #[test]
    fn test_header_only_is_valid_and_empty() {
        let csv = format!("{HEADER};Praga1");
        let result = parser().parse(csv.as_bytes(), survey()).unwrap();
        assert_eq!(result.total_rows, 0);
        assert!(result.parcels.is_empty());
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_brazilian_float_format() {
        let csv = format!(
            "{HEADER}\n\
             1;N;S;F1;Fazenda;Q;1;1234,56;Arg;1;2020;Jan;N\n\
             2;N;S;F1;Fazenda;Q;1;1.234,56;Arg;1;2020;Jan;N\n\
             3;N;S;F1;Fazenda;Q;1;12.5;Arg;1;2020;Jan;N\n\
             4;N;S;F1;Fazenda;Q;x;abc;Arg;;2020;Jan;N"
        );

        let result = parser().parse(csv.as_bytes(), survey()).unwrap();
        let areas: Vec<f64> = result.parcels.iter().map(|p| p.fields.total_area).collect();

        assert_eq!(areas, vec![1234.56, 1234.56, 12.5, 0.0]);
        assert_eq!(result.parcels[3].fields.cut, 0);
        assert_eq!(result.parcels[3].fields.current_cut, 0);
    }

    #[test]
    fn test_parcels_carry_survey_id_and_generated_ids() {
        let csv = format!(
            "{HEADER}\n\
             1;N;S;F1;Fazenda;Q;1;100;Arg;1;2020;Jan;N\n\
             2;N;S;F2;Fazenda;Q;1;100;Arg;1;2020;Jan;N"
        );

        let result = parser().parse(csv.as_bytes(), survey()).unwrap();

        assert_eq!(result.parcels[0].survey_id, survey());
        assert_eq!(result.parcels[0].id, Uuid::from_u128(1));
        assert_eq!(result.parcels[1].id, Uuid::from_u128(2));
        assert_eq!(result.parcels[1].fields.external_id, "2");
    }

    #[test]
    fn test_bad_row_is_skipped_with_line_number() {
        let csv = format!(
            "{HEADER}\n\
             1;N;S;F1;Fazenda;Q;1;100;Arg;1;2020;Jan;N\n\
             2;N;S;F2\n\
             3;N;S;F3;Fazenda;Q;1;100;Arg;1;2020;Jan;N"
        );

        let result = parser().parse(csv.as_bytes(), survey()).unwrap();

        assert_eq!(result.total_rows, 2);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].line, 3);
        assert_eq!(result.parcels[1].fields.farm_code, "F3");
    }

    #[test]
    fn test_all_rows_malformed_is_invalid() {
        let csv = format!("{HEADER}\n1;N;S\n2;N\n");
        let err = parser().parse(csv.as_bytes(), survey()).unwrap_err();
        assert!(matches!(err, CsvError::InvalidCsv(_)));
    }

    #[test]
    fn test_missing_anchor_is_invalid_format() {
        let csv = "Id;Setor;Setor2;Quadra;Corte;Desc.Fazenda;Restrição\n1;N;S;Q;1;F;N";
        let err = parser().parse(csv.as_bytes(), survey()).unwrap_err();
        match err {
            CsvError::InvalidFormat(msg) => assert!(msg.contains("Cod.Fazenda")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_anchor_matching_is_accent_and_case_insensitive() {
        let csv = "ID;SETOR;COD.FAZENDA;Desc.Fazenda (nome);Área total;Restricao;Camalote\n\
                   7;Leste;F9;Fazenda Nova;10,5;N;X";

        let result = parser().parse(csv.as_bytes(), survey()).unwrap();
        let parcel = &result.parcels[0];

        assert_eq!(parcel.fields.external_id, "7");
        assert_eq!(parcel.fields.farm_code, "F9");
        assert_eq!(parcel.fields.farm_description, "Fazenda Nova");
        assert_eq!(parcel.fields.total_area, 10.5);
        assert!(parcel.pests.has_pest("Camalote"));
    }

    #[test]
    fn test_pest_columns_stop_at_herbicide_and_skip_placeholders() {
        let csv = format!(
            "{HEADER};Camalote;Coluna1;;Column2;Tiririca;Herb 1;Dose 1;Outra\n\
             1;N;S;F1;Fazenda;Q;1;100;Arg;1;2020;Jan;N;S;S;S;S;S;S;S;S"
        );

        let result = parser().parse(csv.as_bytes(), survey()).unwrap();

        assert_eq!(result.parcels[0].pests.present_pests(), vec!["Camalote", "Tiririca"]);
    }

    #[test]
    fn test_pest_columns_for_every_delimiter() {
        let columns = ["Id", "Setor", "Cod.Fazenda", "Desc.Fazenda", "Restrição", "P1", "P2", "Herb 1"];
        let row = ["1", "N", "F1", "Fazenda", "N", "S", "X", "Glifosato"];

        for delimiter in ["\t", ";", ","] {
            let csv = format!("{}\n{}", columns.join(delimiter), row.join(delimiter));
            let result = parser().parse(csv.as_bytes(), survey()).unwrap();
            assert_eq!(
                result.parcels[0].pests.present_pests(),
                vec!["P1", "P2"],
                "delimiter {:?}",
                delimiter
            );
        }
    }

    #[test]
    fn test_no_restriction_column_means_no_pests() {
        let csv = "Id;Setor;Setor2;Cod.Fazenda;Desc.Fazenda;Quadra;Camalote\n1;N;S;F1;Fazenda;Q;S";
        let result = parser().parse(csv.as_bytes(), survey()).unwrap();
        assert_eq!(result.total_rows, 1);
        assert!(result.parcels[0].pests.present_pests().is_empty());
    }

    #[test]
    fn test_bom_is_stripped() {
        let mut raw = UTF8_BOM.to_vec();
        raw.extend_from_slice(format!("{HEADER}\n1;N;S;F1;Fazenda;Q;1;100;Arg;1;2020;Jan;N").as_bytes());

        let result = parser().parse(&raw, survey()).unwrap();
        assert_eq!(result.parcels[0].fields.external_id, "1");
    }

    #[test]
    fn test_detect_delimiter_uses_first_line_only() {
        assert_eq!(detect_delimiter(b"a\tb\tc\td\te\tf\tg"), b'\t');
        assert_eq!(detect_delimiter(b"a;b;c;d;e;f;g"), b';');
        assert_eq!(detect_delimiter(b"a;b;c\nd;e;f;g;h;i;j"), b',');
        assert_eq!(detect_delimiter(b""), b',');
    }

    #[test]
    fn test_fold_header() {
        assert_eq!(fold_header("  Área Total "), "area total");
        assert_eq!(fold_header("Restrição"), "restricao");
        assert_eq!(fold_header("MÊS Colheita"), "mes colheita");
    }

    #[test]
    fn test_fold_header_decomposed_matches_precomposed() {
        assert_eq!(fold_header("A\u{301}rea Total"), fold_header("Área Total"));
        assert_eq!(fold_header("Restric\u{327}a\u{303}o"), "restricao");
    }

    #[test]
    fn test_decomposed_headers_resolve_optional_columns() {
        let csv = "Id;Setor;Cod.Fazenda;Desc.Fazenda;A\u{301}rea Total;Me\u{302}s Colheita;Desc. Textura Solo;Restric\u{327}a\u{303}o;Camalote\n\
                   1;N;F1;Fazenda;150,5;Agosto;Argiloso;N;S";

        let result = parser().parse(csv.as_bytes(), survey()).unwrap();
        let parcel = &result.parcels[0];

        assert_eq!(parcel.fields.total_area, 150.5);
        assert_eq!(parcel.fields.harvest_month, "Agosto");
        assert_eq!(parcel.fields.soil_texture, "Argiloso");
        assert_eq!(parcel.fields.restriction, "N");
        assert!(parcel.pests.has_pest("Camalote"));
    }

    #[test]
    fn test_pest_starting_with_herb_is_not_a_herbicide_column() {
        let csv = format!(
            "{HEADER};Capim;Herbácea;Herva Doce;Herb 1\n\
             1;N;S;F1;Fazenda;Q;1;100;Arg;1;2020;Jan;N;S;S;S;Glifosato"
        );

        let result = parser().parse(csv.as_bytes(), survey()).unwrap();

        assert_eq!(
            result.parcels[0].pests.present_pests(),
            vec!["Capim", "Herbácea", "Herva Doce"]
        );
    }

    #[test]
    fn test_repeated_restriction_column_uses_last() {
        let csv = "Id;Setor;Cod.Fazenda;Desc.Fazenda;Restrição;Camalote;Restrição Ambiental;Tiririca;Herb 1\n\
                   1;N;F1;Fazenda;N;S;APP;S;Glifosato";

        let result = parser().parse(csv.as_bytes(), survey()).unwrap();
        let parcel = &result.parcels[0];

        assert_eq!(parcel.fields.restriction, "APP");
        assert_eq!(parcel.pests.present_pests(), vec!["Tiririca"]);
    }
}
