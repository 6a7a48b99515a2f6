//! Integration tests: reference tables loaded from CSV, batches evaluated end to end

use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use tempfile::TempDir;

use oru_risk::{
    BatchEvaluator, ObservationFields, ObservationScope, ReferenceTable, ServiceConfig,
    TableError, TableSources,
};

const METRICS_CSV: &str = "\
name,oru_sonic_codes,oru_sonic_units,min_age,max_age,gender,everlab_lower,everlab_higher,standard_lower,standard_higher
glucose,GLU;GLUC,mg/dL,,,Any,70,99,65,110
hdl_child,HDL,mmol/L,0,17,Any,1.0,2.0,,
hdl_male,HDL,mmol/L,18,120,Male,1.2,3.0,1.0,
hdl_female,HDL,mmol/L,18,120,Female,1.4,3.0,1.0,
ferritin_female,FER,ug/L,,,Female,30,200,,
ferritin_any,FER,ug/L,,,Any,40,300,,
vitamin_d,VITD,nmol/L,,,Any,50,,,
";

const CONDITIONS_CSV: &str = "\
name,diagnostic_metrics
Diabetes,glucose
Cardiovascular risk,hdl_male
Cardiovascular risk,hdl_female
Iron deficiency,ferritin_any
";

struct Fixture {
    _dir: TempDir,
    sources: TableSources,
}

fn write_tables(metrics: &str, conditions: &str) -> Fixture {
    let dir = TempDir::new().unwrap();
    let metrics_path = dir.path().join("diagnostic_metrics.csv");
    let conditions_path = dir.path().join("conditions.csv");
    fs::write(&metrics_path, metrics).unwrap();
    fs::write(&conditions_path, conditions).unwrap();

    Fixture {
        sources: TableSources::new(&metrics_path, &conditions_path),
        _dir: dir,
    }
}

fn evaluator() -> BatchEvaluator {
    let fixture = write_tables(METRICS_CSV, CONDITIONS_CSV);
    let table = ReferenceTable::load(&fixture.sources).unwrap();
    BatchEvaluator::new(Arc::new(table))
}

fn reference() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn oru(dob: &str, gender: &str, code: &str, value: &str, unit: &str) -> String {
    format!(
        "MSH|^~\\&|SONIC|LAB|EVERLAB|EVERLAB|20240101083000||ORU^R01|MSG0001|P|2.3\r\
PID|1||123456^^^SONIC||CITIZEN^PAT||{dob}|{gender}\r\
OBR|1||LAB123|PANEL^Panel\r\
OBX|1|NM|{code} test^{code}||{value}|{unit}|||||F\r\n",
        dob = dob,
        gender = gender,
        code = code,
        value = value,
        unit = unit
    )
}

#[test]
fn test_glucose_example() {
    let results = evaluator().evaluate_batch_at(
        oru("19900615", "F", "GLU", "150", "mg/dL").as_bytes(),
        reference(),
    );

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.condition, "Diabetes");
    assert_eq!(result.test_name, "GLU test");
    assert_eq!(result.observed_value, "150");
    assert_eq!(result.units, "mg/dL");
    assert_eq!(result.everlab_range, "70 - 99");
    assert_eq!(result.standard_range, "65 - 110");
}

#[test]
fn test_alternate_sonic_code() {
    let results = evaluator().evaluate_batch_at(
        oru("19900615", "F", "GLUC", "40", "mg/dL").as_bytes(),
        reference(),
    );
    assert_eq!(results.len(), 1);
}

#[test]
fn test_within_range_and_unknown_code_not_flagged() {
    let mut upload = oru("19900615", "F", "GLU", "85", "mg/dL");
    upload.push_str(&oru("19900615", "F", "ZZZ", "150", "mg/dL"));
    upload.push_str(&oru("19900615", "F", "GLU", "150", "mmol/L"));

    let outcome = evaluator().run(upload.as_bytes(), reference());

    assert!(outcome.results.is_empty());
    assert_eq!(outcome.report.within_range, 1);
    assert_eq!(outcome.report.unmatched, 2);
}

#[test]
fn test_boundaries() {
    let evaluator = evaluator();
    let flagged = |value: &str| {
        !evaluator
            .evaluate_batch_at(oru("19900615", "F", "GLU", value, "mg/dL").as_bytes(), reference())
            .is_empty()
    };

    assert!(!flagged("70"));
    assert!(!flagged("99"));
    assert!(flagged("69"));
    assert!(flagged("100"));
}

#[test]
fn test_age_stratified_row_selected() {
    // 10-year-old: the child row (1.0 - 2.0) admits them, 1.1 is in range
    let child = evaluator().evaluate_batch_at(
        oru("20130601", "M", "HDL", "1.1", "mmol/L").as_bytes(),
        reference(),
    );
    assert!(child.is_empty());

    // Adult male: 1.1 is below the male row's 1.2
    let adult = evaluator().evaluate_batch_at(
        oru("19800101", "M", "HDL", "1.1", "mmol/L").as_bytes(),
        reference(),
    );
    assert_eq!(adult.len(), 1);
    assert_eq!(adult[0].everlab_range, "1.2 - 3.0");
    assert_eq!(adult[0].condition, "Cardiovascular risk");
}

#[test]
fn test_gender_stratified_row_selected() {
    let results = evaluator().evaluate_batch_at(
        oru("19800101", "F", "HDL", "1.3", "mmol/L").as_bytes(),
        reference(),
    );

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].everlab_range, "1.4 - 3.0");
}

#[test]
fn test_unknown_gender_matches_only_any_rows() {
    // "U" maps to Any: the Female ferritin row is skipped for the Any row
    let results = evaluator().evaluate_batch_at(
        oru("19800101", "U", "FER", "35", "ug/L").as_bytes(),
        reference(),
    );

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].everlab_range, "40 - 300");
    assert_eq!(results[0].condition, "Iron deficiency");
}

#[test]
fn test_fallback_to_first_candidate() {
    // Unknown-gender adult fits none of the HDL rows; the first-listed one applies
    let results = evaluator().evaluate_batch_at(
        oru("19800101", "", "HDL", "0.5", "mmol/L").as_bytes(),
        reference(),
    );

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].everlab_range, "1.0 - 2.0");
    assert_eq!(results[0].condition, "");
}

#[test]
fn test_open_ended_range_never_flags() {
    let outcome = evaluator().run(
        oru("19800101", "F", "VITD", "10", "nmol/L").as_bytes(),
        reference(),
    );

    assert!(outcome.results.is_empty());
    assert_eq!(outcome.report.no_range_policy, 1);
}

#[test]
fn test_malformed_messages_are_skipped() {
    let mut upload = String::from("garbage before the first header\r\n");
    upload.push_str(&oru("not-a-date", "F", "GLU", "150", "mg/dL"));
    upload.push_str(&oru("19900615", "F", "GLU", "positive", "mg/dL"));
    upload.push_str("MSH|^~\\&|SONIC|LAB\rPID|1||1||X^Y||19900615|F\r\n");
    upload.push_str(&oru("19900615", "F", "GLU", "150", "mg/dL"));

    let outcome = evaluator().run(upload.as_bytes(), reference());

    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.report.messages, 4);
    assert_eq!(outcome.report.skipped(), 3);
}

#[test]
fn test_output_order_follows_input() {
    let mut upload = oru("19900615", "F", "GLU", "150", "mg/dL");
    upload.push_str(&oru("19800101", "M", "HDL", "0.9", "mmol/L"));
    upload.push_str(&oru("19900615", "F", "GLU", "20", "mg/dL"));

    let results = evaluator().evaluate_batch_at(upload.as_bytes(), reference());
    let values: Vec<&str> = results.iter().map(|r| r.observed_value.as_str()).collect();

    assert_eq!(values, vec!["150", "0.9", "20"]);
}

#[test]
fn test_all_observations_scope() {
    let upload = "MSH|^~\\&|SONIC|LAB\r\
PID|1||1||X^Y||19900615|F\r\
OBX|1|NM|Glucose^GLU||150|mg/dL\r\
OBX|2|NM|Glucose^GLU||40|mg/dL\r\n";

    assert_eq!(evaluator().evaluate_batch_at(upload.as_bytes(), reference()).len(), 1);
    assert_eq!(
        evaluator()
            .with_scope(ObservationScope::All)
            .evaluate_batch_at(upload.as_bytes(), reference())
            .len(),
        2
    );
}

#[test]
fn test_concurrent_evaluation_is_deterministic() {
    let evaluator = evaluator();
    let mut upload = String::new();
    for value in ["150", "85", "40", "99", "100"] {
        upload.push_str(&oru("19900615", "F", "GLU", value, "mg/dL"));
    }
    let expected = evaluator.evaluate_batch_at(upload.as_bytes(), reference());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let evaluator = evaluator.clone();
            let upload = upload.clone();
            std::thread::spawn(move || evaluator.evaluate_batch_at(upload.as_bytes(), reference()))
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
}

#[test]
fn test_missing_column_rejected_at_load() {
    let fixture = write_tables(
        "name,oru_sonic_codes,oru_sonic_units\nglucose,GLU,mg/dL\n",
        CONDITIONS_CSV,
    );

    let err = ReferenceTable::load(&fixture.sources).unwrap_err();
    assert!(matches!(err, TableError::MissingColumn { .. }), "{}", err);
}

#[test]
fn test_invalid_gender_rejected_at_load() {
    let metrics = METRICS_CSV.replace("Any,70,99", "Unknown,70,99");
    let fixture = write_tables(&metrics, CONDITIONS_CSV);

    assert!(matches!(
        ReferenceTable::load(&fixture.sources),
        Err(TableError::InvalidCell { .. })
    ));
}

#[test]
fn test_missing_table_file() {
    let sources = TableSources::new(Path::new("/nonexistent/metrics.csv"), "conditions.csv");
    assert!(matches!(
        ReferenceTable::load(&sources),
        Err(TableError::Io { .. })
    ));
}

#[test]
fn test_config_drives_evaluator() {
    let fixture = write_tables(METRICS_CSV, CONDITIONS_CSV);
    let config = ServiceConfig {
        metrics_csv: fixture.sources.metrics.clone(),
        conditions_csv: fixture.sources.conditions.clone(),
        observation_scope: ObservationScope::All,
        ..ServiceConfig::default()
    };

    let table = ReferenceTable::load(&config.table_sources()).unwrap();
    assert_eq!(table.metrics().len(), 7);
    assert_eq!(table.conditions().len(), 4);

    let evaluator = config.configure(BatchEvaluator::new(Arc::new(table)));
    assert_eq!(evaluator.scope(), ObservationScope::All);
}

#[test]
fn test_shipped_config_and_tables_load() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR"));
    let config = ServiceConfig::load_from_file(root.join("config/oru-risk.yaml")).unwrap();
    assert_eq!(config.fields, ObservationFields::default());
    assert_eq!(config.port, 3001);

    let sources = TableSources::new(
        root.join(&config.metrics_csv),
        root.join(&config.conditions_csv),
    );
    let table = ReferenceTable::load(&sources).unwrap();

    assert_eq!(table.metrics().len(), 7);
    assert_eq!(
        table.condition_for("hba1c").map(|c| c.name.as_str()),
        Some("Diabetes")
    );
}
