use std::io::Write;

use super::*;

#[test]
fn parses_three_column_csv_with_header_and_comments() {
    let text = "# exported by instrument\nq,I,dI\n0.01,100,1\n0.02, 80, 0.8\n\n0.03;60;0.5\n";
    let data = Dataset::parse(text).expect("valid dataset");
    assert_eq!(data.len(), 3);
    assert_eq!(data.q(), &[0.01, 0.02, 0.03]);
    assert_eq!(data.intensity(), &[100.0, 80.0, 60.0]);
    assert_eq!(data.uncertainty(), Some(&[1.0, 0.8, 0.5][..]));
    assert_eq!(data.q_range(), (0.01, 0.03));
}

#[test]
fn missing_uncertainty_falls_back_to_poisson_sigma() {
    let data = Dataset::parse("0.01 100\n0.02\t25\n").expect("valid dataset");
    assert!(data.uncertainty().is_none());
    assert_eq!(data.sigma(), vec![10.0, 5.0]);
}

#[test]
fn partial_uncertainty_column_is_dropped() {
    let data = Dataset::parse("0.01 100 2\n0.02 25\n").expect("valid dataset");
    assert!(data.uncertainty().is_none());
}

#[test]
fn rejects_malformed_input() {
    assert!(matches!(Dataset::parse(""), Err(EngineError::Data(_))));
    assert!(matches!(Dataset::parse("0.01\n"), Err(EngineError::Data(_))));
    assert!(matches!(Dataset::parse("0.01 abc\n"), Err(EngineError::Data(_))));
    assert!(matches!(Dataset::parse("-0.01 5\n"), Err(EngineError::Data(_))));
}

#[test]
fn new_checks_column_lengths() {
    let err = Dataset::new(vec![0.1, 0.2], vec![1.0], None).expect_err("length mismatch");
    assert!(err.to_string().contains("column length mismatch"));
}

#[test]
fn loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "Q I dI").expect("write header");
    writeln!(file, "0.005 12.5 0.3").expect("write row");
    writeln!(file, "0.010 9.0 0.2").expect("write row");

    let data = Dataset::load(file.path()).expect("load dataset");
    assert_eq!(data.len(), 2);
    assert_eq!(data.sigma(), vec![0.3, 0.2]);
}

#[test]
fn missing_file_is_a_data_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let err = Dataset::load(&dir.path().join("absent.csv")).expect_err("missing file");
    assert!(matches!(err, EngineError::Data(message) if message.contains("failed to read")));
}
