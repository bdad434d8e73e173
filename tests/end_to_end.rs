//! End-to-end scenarios and boundary behaviors exercised through the public
//! `SeekApp` surface rather than any individual module.

use seek::config::{Config, MonitorConfig};
use seek::error::{QueryError, SeekError};
use seek::{default_progress_callback, SeekApp};
use std::time::Duration;

fn open_app(store_dir: &std::path::Path) -> SeekApp {
    SeekApp::open(&store_dir.join("file_index.db"), Config::default()).unwrap()
}

fn index(app: &SeekApp, root: &std::path::Path) {
    app.perform_full_indexing(vec![root.to_path_buf()], default_progress_callback())
        .unwrap();
}

#[test]
fn simple_prefix_query_matches_files_starting_with_term() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("report.txt"), "x").unwrap();
    std::fs::write(root.path().join("notes.txt"), "x").unwrap();
    let store = tempfile::tempdir().unwrap();
    let app = open_app(store.path());
    index(&app, root.path());

    let result = app.search("rep", None).unwrap();
    assert_eq!(result.entries.len(), 1);
    assert_eq!(result.entries[0].name, "report.txt");
}

#[test]
fn multi_term_substring_query_is_conjunctive() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("annual-report-2024.txt"), "x").unwrap();
    std::fs::write(root.path().join("report-draft.txt"), "x").unwrap();
    let store = tempfile::tempdir().unwrap();
    let app = open_app(store.path());
    index(&app, root.path());

    let result = app.search("annual report", None).unwrap();
    assert_eq!(result.entries.len(), 1);
    assert_eq!(result.entries[0].name, "annual-report-2024.txt");
}

#[test]
fn boolean_query_unions_two_terms() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("invoice.pdf"), "x").unwrap();
    std::fs::write(root.path().join("receipt.pdf"), "x").unwrap();
    std::fs::write(root.path().join("other.pdf"), "x").unwrap();
    let store = tempfile::tempdir().unwrap();
    let app = open_app(store.path());
    index(&app, root.path());

    let result = app.search("invoice | receipt", None).unwrap();
    let mut names: Vec<_> = result.entries.iter().map(|e| e.name.clone()).collect();
    names.sort();
    assert_eq!(names, vec!["invoice.pdf", "receipt.pdf"]);
}

#[test]
fn wildcard_query_matches_glob_pattern() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("photo1.jpg"), "x").unwrap();
    std::fs::write(root.path().join("photo2.jpg"), "x").unwrap();
    std::fs::write(root.path().join("document.pdf"), "x").unwrap();
    let store = tempfile::tempdir().unwrap();
    let app = open_app(store.path());
    index(&app, root.path());

    let result = app.search("photo?.jpg", None).unwrap();
    assert_eq!(result.entries.len(), 2);
}

#[test]
fn key_value_size_query_filters_real_rows() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("small.bin"), vec![0u8; 10]).unwrap();
    std::fs::write(root.path().join("large.bin"), vec![0u8; 200 * 1024 * 1024]).unwrap();
    let store = tempfile::tempdir().unwrap();
    let app = open_app(store.path());
    index(&app, root.path());

    let result = app.search("size:>100MB", None).unwrap();
    assert_eq!(result.entries.len(), 1);
    assert_eq!(result.entries[0].name, "large.bin");

    let exact = app.search("size:10", None).unwrap();
    assert_eq!(exact.entries.len(), 1);
    assert_eq!(exact.entries[0].name, "small.bin");
}

#[test]
fn modified_today_matches_freshly_written_files() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("fresh.txt"), "x").unwrap();
    let store = tempfile::tempdir().unwrap();
    let app = open_app(store.path());
    index(&app, root.path());

    let result = app.search("modified:today", None).unwrap();
    assert!(result.entries.iter().any(|e| e.name == "fresh.txt"));
}

#[test]
fn live_update_via_monitor_is_searchable_after_flush() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("original.txt"), "x").unwrap();
    let store = tempfile::tempdir().unwrap();

    let config = Config {
        monitor: MonitorConfig {
            batch_size_threshold: 1,
            flush_delay_seconds: 0.1,
        },
        ..Config::default()
    };
    let app = SeekApp::open(&store.path().join("file_index.db"), config).unwrap();
    index(&app, root.path());
    app.start_monitoring_with_recovery(vec![root.path().to_path_buf()])
        .unwrap();

    std::fs::write(root.path().join("added-live.txt"), "y").unwrap();
    std::thread::sleep(Duration::from_millis(500));

    let result = app.search("added-live", None).unwrap();
    assert!(result.entries.iter().any(|e| e.name == "added-live.txt"));
    app.stop_monitoring();
}

#[test]
fn query_over_max_length_is_syntax_error() {
    let store = tempfile::tempdir().unwrap();
    let app = open_app(store.path());
    let query = "a".repeat(1001);
    match app.search(&query, None) {
        Err(SeekError::Query(QueryError::Syntax(_))) => {}
        other => panic!("expected Syntax error, got {:?}", other),
    }
}

#[test]
fn nesting_depth_eleven_is_expression_too_complex() {
    let store = tempfile::tempdir().unwrap();
    let app = open_app(store.path());
    let query = format!("{}a{}", "(".repeat(11), ")".repeat(11));
    assert_eq!(
        app.search(&query, None).unwrap_err(),
        SeekError::Query(QueryError::ExpressionTooComplex)
    );
}

#[test]
fn trailing_not_is_missing_operand() {
    let store = tempfile::tempdir().unwrap();
    let app = open_app(store.path());
    assert_eq!(
        app.search("a!", None).unwrap_err(),
        SeekError::Query(QueryError::MissingOperand)
    );
}

#[test]
fn unbalanced_open_paren_is_rejected() {
    let store = tempfile::tempdir().unwrap();
    let app = open_app(store.path());
    assert_eq!(
        app.search("(a", None).unwrap_err(),
        SeekError::Query(QueryError::UnbalancedParentheses)
    );
}

#[test]
fn unclosed_quote_is_syntax_error() {
    let store = tempfile::tempdir().unwrap();
    let app = open_app(store.path());
    match app.search("\"unclosed", None) {
        Err(SeekError::Query(QueryError::Syntax(_))) => {}
        other => panic!("expected Syntax error, got {:?}", other),
    }
}

#[test]
fn full_indexing_is_idempotent_on_a_static_tree() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("a.txt"), "x").unwrap();
    std::fs::create_dir(root.path().join("sub")).unwrap();
    std::fs::write(root.path().join("sub/b.txt"), "y").unwrap();
    let store = tempfile::tempdir().unwrap();
    let app = open_app(store.path());

    index(&app, root.path());
    let first_count = app.file_count().unwrap();
    index(&app, root.path());
    let second_count = app.file_count().unwrap();

    assert_eq!(first_count, second_count);
}

#[test]
fn delete_then_search_returns_empty() {
    let root = tempfile::tempdir().unwrap();
    let victim = root.path().join("doomed.txt");
    std::fs::write(&victim, "x").unwrap();
    let store = tempfile::tempdir().unwrap();
    let app = open_app(store.path());
    index(&app, root.path());
    assert!(app.search("\"doomed.txt\"", None).unwrap().entries.len() == 1);

    std::fs::remove_file(&victim).unwrap();
    index(&app, root.path());
    assert!(app.search("\"doomed.txt\"", None).unwrap().entries.is_empty());
}
