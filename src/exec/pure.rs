use chrono::NaiveDateTime;

/// First index, counting from 1, that `taken` rejects.
pub fn next_free_index(taken: impl Fn(u32) -> bool) -> u32 {
    (1..).find(|&i| !taken(i)).unwrap_or(u32::MAX)
}

pub fn export_zip_name(title_id: &str, index: u32) -> String {
    format!("{}-{:08}.zip", title_id, index)
}

/// `<dir>_<YYYY-MM-DD_HHMMSS>.mcs`, with anything unsafe in a file name
/// replaced by `_`.
pub fn vmc_export_name(dir_name: &str, when: NaiveDateTime) -> String {
    let safe: String = dir_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("{}_{}.mcs", safe, when.format("%Y-%m-%d_%H%M%S"))
}

/// Nine upper-case letters or digits, e.g. `ULUS10041`.
pub fn is_title_id(s: &str) -> bool {
    s.len() == 9 && s.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

/// Directory name with its 9-character title prefix replaced.
pub fn retitle_dir(dir_name: &str, title_id: &str) -> String {
    match dir_name.get(9..) {
        Some(rest) => format!("{}{}", title_id, rest),
        None => title_id.to_string(),
    }
}

/// `text` with `record` appended as a line, or `None` if a line already
/// starts with `key=`.
pub fn with_record(text: &str, key: &str, record: &str) -> Option<String> {
    let prefix = format!("{}=", key);
    if text.lines().any(|l| l.starts_with(&prefix)) {
        return None;
    }
    let mut out = text.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(record);
    out.push('\n');
    Some(out)
}
