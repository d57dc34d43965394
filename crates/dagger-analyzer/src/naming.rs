use convert_case::{Case, Casing};

/// Drops a single trailing underscore used to dodge reserved words (`from_`).
pub fn normalize_name(name: &str) -> &str {
    match name.strip_suffix('_') {
        Some(stripped) if !stripped.is_empty() && !stripped.ends_with('_') => stripped,
        _ => name,
    }
}

pub fn to_camel_case(name: &str) -> String {
    normalize_name(name)
        .from_case(Case::Snake)
        .to_case(Case::Camel)
}

pub fn format_name(name: &str) -> String {
    name.to_case(Case::Pascal)
}

/// External name for a declaration: an explicit alias wins, otherwise the
/// camelCase form of the normalized native name.
pub fn api_name(original: &str, alt_name: Option<&str>) -> String {
    match alt_name {
        Some(alt) => alt.to_string(),
        None => to_camel_case(original),
    }
}

pub fn is_dunder(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}

pub fn is_private(name: &str) -> bool {
    name.starts_with('_')
}
