//! Query planner (C12): translates an `Expression` into a parameterized
//! relational `WHERE` clause over `file_entries`.

use super::parser::Expression;
use chrono::{Datelike, Duration, Local, NaiveDate, TimeZone};

#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Text(String),
    Int(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub where_clause: String,
    pub bindings: Vec<Binding>,
}

const CANONICAL_KEYS: &[(&str, &[&str])] = &[
    ("size", &["filesize"]),
    ("type", &["filetype"]),
    ("ext", &["extension"]),
    ("modified", &["mod", "datemodified"]),
    ("created", &["dateadded"]),
    ("name", &["filename"]),
    ("path", &["fullpath"]),
];

pub fn canonicalize_key(key: &str) -> Option<&'static str> {
    let lower = key.to_ascii_lowercase();
    for (canon, aliases) in CANONICAL_KEYS {
        if *canon == lower || aliases.contains(&lower.as_str()) {
            return Some(canon);
        }
    }
    None
}

pub fn is_recognized_key(key: &str) -> bool {
    canonicalize_key(key).is_some()
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tiff", "webp", "heic", "svg"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm", "flv", "wmv", "m4v"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "aac", "ogg", "m4a", "wma"];
const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "txt", "rtf", "odt", "pages", "md"];
const CODE_EXTENSIONS: &[&str] = &[
    "rs", "py", "js", "ts", "go", "c", "cpp", "h", "hpp", "java", "rb", "swift", "kt", "sh",
];
const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "tar", "gz", "bz2", "7z", "rar", "xz"];

pub fn plan(expr: &Expression, now: f64) -> Plan {
    let mut bindings = Vec::new();
    let where_clause = plan_expr(expr, now, &mut bindings);
    Plan {
        where_clause,
        bindings,
    }
}

fn plan_expr(expr: &Expression, now: f64, bindings: &mut Vec<Binding>) -> String {
    match expr {
        Expression::Term(t) => term_to_sql(t, "name", bindings),
        Expression::KeyValue(key, value) => keyvalue_to_sql(key, value, now, bindings),
        Expression::And(parts) => combine(parts, "AND", now, bindings),
        Expression::Or(parts) => combine(parts, "OR", now, bindings),
        Expression::Not(inner) => format!("NOT ({})", plan_expr(inner, now, bindings)),
    }
}

fn combine(parts: &[Expression], op: &str, now: f64, bindings: &mut Vec<Binding>) -> String {
    let clauses: Vec<String> = parts.iter().map(|p| plan_expr(p, now, bindings)).collect();
    if clauses.len() == 1 {
        clauses.into_iter().next().unwrap()
    } else {
        format!("({})", clauses.join(&format!(" {} ", op)))
    }
}

/// Shared term logic for bare terms and the `name`/`path` key-value keys.
fn term_to_sql(term: &str, column: &str, bindings: &mut Vec<Binding>) -> String {
    if term.is_empty() {
        return "1=1".to_string();
    }
    if term.starts_with('"') && term.ends_with('"') && term.len() >= 2 {
        bindings.push(Binding::Text(term[1..term.len() - 1].to_string()));
        return format!("{} = ?", column);
    }
    if term.contains('*') || term.contains('?') {
        bindings.push(Binding::Text(glob_to_like(term)));
        return format!("{} LIKE ? ESCAPE '\\'", column);
    }
    bindings.push(Binding::Text(format!("%{}%", escape_like(term))));
    format!("{} LIKE ? ESCAPE '\\'", column)
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '%' => out.push_str("\\%"),
            '_' => out.push_str("\\_"),
            other => out.push(other),
        }
    }
    out
}

fn glob_to_like(raw: &str) -> String {
    let escaped = escape_like(raw);
    let mut out = String::with_capacity(escaped.len());
    out.push_str(&escaped.replace('*', "%").replace('?', "_"));
    out
}

fn keyvalue_to_sql(key: &str, value: &str, now: f64, bindings: &mut Vec<Binding>) -> String {
    match canonicalize_key(key) {
        Some("name") => term_to_sql(value, "name", bindings),
        Some("path") => term_to_sql(value, "full_path", bindings),
        Some("ext") => {
            let stripped = value.strip_prefix('.').unwrap_or(value);
            bindings.push(Binding::Text(stripped.to_ascii_lowercase()));
            "file_extension = ?".to_string()
        }
        Some("size") => size_predicate(value, bindings),
        Some("type") => type_predicate(value, bindings),
        Some("modified") => date_predicate(value, "date_modified", now, bindings),
        Some("created") => date_predicate(value, "date_added", now, bindings),
        _ => term_to_sql(value, "name", bindings),
    }
}

fn size_predicate(value: &str, bindings: &mut Vec<Binding>) -> String {
    let trimmed = value.trim();
    let (op, rest) = match trimmed.strip_prefix('>') {
        Some(rest) => (">", rest),
        None => match trimmed.strip_prefix('<') {
            Some(rest) => ("<", rest),
            None => ("=", trimmed),
        },
    };

    let rest_lower = rest.to_ascii_lowercase();
    let (num_part, unit) = if let Some(n) = rest_lower.strip_suffix("tb") {
        (n, 1024i64.pow(4))
    } else if let Some(n) = rest_lower.strip_suffix("gb") {
        (n, 1024i64.pow(3))
    } else if let Some(n) = rest_lower.strip_suffix("mb") {
        (n, 1024i64.pow(2))
    } else if let Some(n) = rest_lower.strip_suffix("kb") {
        (n, 1024)
    } else if let Some(n) = rest_lower.strip_suffix('b') {
        (n, 1)
    } else {
        (rest_lower.as_str(), 1)
    };

    match num_part.trim().parse::<f64>() {
        Ok(n) => {
            let bytes = (n * unit as f64).round() as i64;
            bindings.push(Binding::Int(bytes));
            format!("size {} ?", op)
        }
        Err(_) => {
            bindings.push(Binding::Text(format!("%{}%", escape_like(value))));
            "name LIKE ? ESCAPE '\\'".to_string()
        }
    }
}

fn type_predicate(value: &str, bindings: &mut Vec<Binding>) -> String {
    let lower = value.to_ascii_lowercase();
    let extensions: &[&str] = match lower.as_str() {
        "image" => IMAGE_EXTENSIONS,
        "video" => VIDEO_EXTENSIONS,
        "audio" => AUDIO_EXTENSIONS,
        "document" => DOCUMENT_EXTENSIONS,
        "code" => CODE_EXTENSIONS,
        "archive" => ARCHIVE_EXTENSIONS,
        "folder" | "directory" => return "is_directory = 1".to_string(),
        _ => {
            bindings.push(Binding::Text(lower));
            return "file_extension = ?".to_string();
        }
    };
    let placeholders: Vec<&str> = extensions.iter().map(|_| "?").collect();
    for ext in extensions {
        bindings.push(Binding::Text((*ext).to_string()));
    }
    format!("file_extension IN ({})", placeholders.join(", "))
}

fn date_predicate(value: &str, column: &str, now: f64, bindings: &mut Vec<Binding>) -> String {
    let lower = value.to_ascii_lowercase();
    if let Some(bound) = relative_bound(&lower, now) {
        bindings.push(Binding::Int(bound));
        return format!("{} >= ?", column);
    }

    if let Some(rest) = value.strip_prefix('>') {
        return match parse_day_start(rest) {
            Some(epoch) => {
                bindings.push(Binding::Int(epoch));
                format!("{} > ?", column)
            }
            None => "1=0".to_string(),
        };
    }
    if let Some(rest) = value.strip_prefix('<') {
        return match parse_day_start(rest) {
            Some(epoch) => {
                bindings.push(Binding::Int(epoch));
                format!("{} < ?", column)
            }
            None => "1=0".to_string(),
        };
    }

    match parse_day_start(value) {
        Some(start) => {
            bindings.push(Binding::Int(start));
            bindings.push(Binding::Int(start + 86_400));
            format!("({col} >= ? AND {col} < ?)", col = column)
        }
        None => "1=0".to_string(),
    }
}

fn parse_day_start(value: &str) -> Option<i64> {
    let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()?;
    let naive = date.and_hms_opt(0, 0, 0)?;
    Local.from_local_datetime(&naive).single().map(|dt| dt.timestamp())
}

fn relative_bound(keyword: &str, now: f64) -> Option<i64> {
    let today = Local
        .timestamp_opt(now as i64, 0)
        .single()?
        .date_naive();
    let start_of = |date: NaiveDate| -> Option<i64> {
        Local
            .from_local_datetime(&date.and_hms_opt(0, 0, 0)?)
            .single()
            .map(|dt| dt.timestamp())
    };
    match keyword {
        "today" => start_of(today),
        "yesterday" => start_of(today - Duration::days(1)),
        "thisweek" => start_of(today - Duration::days(today.weekday().num_days_from_monday() as i64)),
        "lastweek" => {
            start_of(today - Duration::days(today.weekday().num_days_from_monday() as i64 + 7))
        }
        "thismonth" => NaiveDate::from_ymd_opt(today.year(), today.month(), 1).and_then(start_of),
        "lastmonth" => {
            let (y, m) = if today.month() == 1 {
                (today.year() - 1, 12)
            } else {
                (today.year(), today.month() - 1)
            };
            NaiveDate::from_ymd_opt(y, m, 1).and_then(start_of)
        }
        "thisyear" => NaiveDate::from_ymd_opt(today.year(), 1, 1).and_then(start_of),
        "lastyear" => NaiveDate::from_ymd_opt(today.year() - 1, 1, 1).and_then(start_of),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_term_matches_everything() {
        let mut b = Vec::new();
        assert_eq!(term_to_sql("", "name", &mut b), "1=1");
        assert!(b.is_empty());
    }

    #[test]
    fn quoted_term_is_exact_equality() {
        let mut b = Vec::new();
        let sql = term_to_sql("\"readme.md\"", "name", &mut b);
        assert_eq!(sql, "name = ?");
        assert_eq!(b, vec![Binding::Text("readme.md".to_string())]);
    }

    #[test]
    fn wildcard_term_converts_to_like() {
        let mut b = Vec::new();
        let sql = term_to_sql("rep*.txt", "name", &mut b);
        assert_eq!(sql, "name LIKE ? ESCAPE '\\'");
        assert_eq!(b, vec![Binding::Text("rep%.txt".to_string())]);
    }

    #[test]
    fn plain_term_is_substring() {
        let mut b = Vec::new();
        term_to_sql("report", "name", &mut b);
        assert_eq!(b, vec![Binding::Text("%report%".to_string())]);
    }

    #[test]
    fn size_greater_than_mb_converts_to_bytes() {
        let mut b = Vec::new();
        let sql = size_predicate(">100MB", &mut b);
        assert_eq!(sql, "size > ?");
        assert_eq!(b, vec![Binding::Int(100 * 1024 * 1024)]);
    }

    #[test]
    fn size_plain_number_defaults_to_equality() {
        let mut b = Vec::new();
        let sql = size_predicate("10", &mut b);
        assert_eq!(sql, "size = ?");
        assert_eq!(b, vec![Binding::Int(10)]);
    }

    #[test]
    fn malformed_size_falls_back_to_substring() {
        let mut b = Vec::new();
        let sql = size_predicate("bogus", &mut b);
        assert_eq!(sql, "name LIKE ? ESCAPE '\\'");
    }

    #[test]
    fn type_folder_maps_to_is_directory() {
        let mut b = Vec::new();
        assert_eq!(type_predicate("folder", &mut b), "is_directory = 1");
        assert!(b.is_empty());
    }

    #[test]
    fn type_image_expands_to_in_list() {
        let mut b = Vec::new();
        let sql = type_predicate("image", &mut b);
        assert!(sql.starts_with("file_extension IN ("));
        assert_eq!(b.len(), IMAGE_EXTENSIONS.len());
    }

    #[test]
    fn unknown_type_matches_literal_extension() {
        let mut b = Vec::new();
        let sql = type_predicate("mp9", &mut b);
        assert_eq!(sql, "file_extension = ?");
        assert_eq!(b, vec![Binding::Text("mp9".to_string())]);
    }

    #[test]
    fn canonicalize_resolves_aliases() {
        assert_eq!(canonicalize_key("filesize"), Some("size"));
        assert_eq!(canonicalize_key("dateadded"), Some("created"));
        assert_eq!(canonicalize_key("bogus"), None);
    }

    #[test]
    fn modified_today_matches_start_of_day_bound() {
        let now = Local::now().timestamp() as f64;
        let mut b = Vec::new();
        let sql = date_predicate("today", "date_modified", now, &mut b);
        assert_eq!(sql, "date_modified >= ?");
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn exact_date_produces_half_open_range() {
        let mut b = Vec::new();
        let sql = date_predicate("2024-01-15", "date_modified", 0.0, &mut b);
        assert_eq!(sql, "(date_modified >= ? AND date_modified < ?)");
        match (&b[0], &b[1]) {
            (Binding::Int(start), Binding::Int(end)) => assert_eq!(*end - *start, 86_400),
            other => panic!("expected two Int bindings, got {:?}", other),
        }
    }

    #[test]
    fn malformed_date_yields_no_results() {
        let mut b = Vec::new();
        let sql = date_predicate("not-a-date", "date_modified", 0.0, &mut b);
        assert_eq!(sql, "1=0");
        assert!(b.is_empty());
    }
}
