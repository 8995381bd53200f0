//! End-to-end tests for the bulk-load transform chain: chunked bytes through
//! parse, validate, and format, the same path the orchestrator drives.

use inflow_server::pipeline::format::format_row;
use inflow_server::pipeline::parse::CsvParser;
use inflow_server::pipeline::validate::{RowStats, RowValidator};

/// Run the full transform chain over `input` delivered in `chunk_size` byte
/// chunks, returning the COPY lines and the validation stats.
fn run_chain(input: &str, chunk_size: usize) -> (Vec<String>, RowStats) {
    let mut parser = CsvParser::new();
    let mut rows = Vec::new();
    for chunk in input.as_bytes().chunks(chunk_size) {
        rows.extend(parser.push_chunk(chunk).expect("chunk parses"));
    }
    if let Some(row) = parser.finish().expect("final row parses") {
        rows.push(row);
    }

    let mut iter = rows.into_iter();
    let header = iter.next().expect("header row");
    let mut validator = RowValidator::from_header(&header).expect("valid header");

    let mut lines = Vec::new();
    for row in iter {
        if let Some(valid) = validator.validate(&row) {
            lines.push(format_row(&valid));
        }
    }
    (lines, validator.stats())
}

const SIMPLE: &str = "provider,eventId,timestamp,data\n\
stripe,evt_1,2026-01-01T00:00:00Z,{}\n\
github,evt_2,2026-01-02T00:00:00Z,{}\n";

#[test]
fn simple_file_produces_one_copy_line_per_row() {
    let (lines, stats) = run_chain(SIMPLE, 1024);

    assert_eq!(stats, RowStats { total: 2, invalid: 0 });
    assert_eq!(
        lines,
        vec![
            "stripe,evt_1,2026-01-01T00:00:00Z,{}\n",
            "github,evt_2,2026-01-02T00:00:00Z,{}\n",
        ]
    );
}

#[test]
fn output_is_identical_for_any_chunking() {
    let (reference, _) = run_chain(SIMPLE, SIMPLE.len());
    for chunk_size in [1, 2, 3, 7, 16] {
        let (lines, stats) = run_chain(SIMPLE, chunk_size);
        assert_eq!(lines, reference, "chunk size {}", chunk_size);
        assert_eq!(stats.total, 2);
    }
}

#[test]
fn invalid_rows_are_dropped_and_counted() {
    let input = "provider,eventId,timestamp,data\n\
stripe,evt_1,2026-01-01T00:00:00Z,{}\n\
stripe,,2026-01-01T00:00:00Z,{}\n";

    let (lines, stats) = run_chain(input, 8);

    assert_eq!(stats, RowStats { total: 2, invalid: 1 });
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("stripe,evt_1"));
}

#[test]
fn quoted_json_data_survives_byte_by_byte_delivery() {
    let input = "provider,eventId,timestamp,data\n\
stripe,evt_1,2026-01-01T00:00:00Z,\"{\"\"amount\"\":100,\"\"note\"\":\"\"a,b\nnewline\"\"}\"\n";

    let (lines, stats) = run_chain(input, 1);

    assert_eq!(stats, RowStats { total: 1, invalid: 0 });
    assert_eq!(lines.len(), 1);

    // The emitted COPY line parses back to the original JSON payload.
    let mut parser = CsvParser::new();
    let mut rows = parser.push_chunk(lines[0].as_bytes()).expect("reparses");
    if let Some(last) = parser.finish().expect("clean end") {
        rows.push(last);
    }
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][3], "{\"amount\":100,\"note\":\"a,b\nnewline\"}");
}

#[test]
fn header_order_does_not_matter() {
    let input = "timestamp,data,provider,eventId\n\
2026-01-01T00:00:00Z,{},stripe,evt_1\n";

    let (lines, stats) = run_chain(input, 5);

    assert_eq!(stats, RowStats { total: 1, invalid: 0 });
    assert_eq!(lines, vec!["stripe,evt_1,2026-01-01T00:00:00Z,{}\n"]);
}

#[test]
fn header_only_file_yields_nothing() {
    let (lines, stats) = run_chain("provider,eventId,timestamp,data\n", 4);

    assert_eq!(stats, RowStats::default());
    assert!(lines.is_empty());
}

#[test]
fn crlf_file_round_trips() {
    let input = "provider,eventId,timestamp,data\r\n\
stripe,evt_1,2026-01-01T00:00:00Z,{}\r\n";

    let (lines, stats) = run_chain(input, 3);

    assert_eq!(stats, RowStats { total: 1, invalid: 0 });
    assert_eq!(lines, vec!["stripe,evt_1,2026-01-01T00:00:00Z,{}\n"]);
}
