use anyhow::Result;
use camino::Utf8PathBuf;
use regex::Regex;
use std::collections::HashMap;

use crate::metadata::MediaContext;

pub const DEFAULT_TEMPLATE: &str = "{date.label}/{place.name}/{source.original}";

lazy_static::lazy_static! {
    static ref TEMPLATE_VAR: Regex = Regex::new(r"\{([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)*)\}").unwrap();
}

/// Renders a relative destination path. Empty segments are dropped, so a
/// photo without a place lands directly in its date folder.
pub fn apply_template(template: &str, context: &MediaContext) -> Result<Utf8PathBuf> {
    let variables = build_variable_map(context);

    let result = TEMPLATE_VAR.replace_all(template, |caps: &regex::Captures| {
        let var_name = &caps[1];
        variables
            .get(var_name)
            .map(|v| sanitize_segment(v))
            .unwrap_or_else(|| format!("{{unknown:{var_name}}}"))
    });

    let path: Utf8PathBuf = result
        .split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .collect();

    if path.as_str().is_empty() {
        anyhow::bail!("Template '{template}' rendered an empty path");
    }

    Ok(path)
}

/// Values become single path segments.
fn sanitize_segment(value: &str) -> String {
    value.replace(['/', '\\'], "-")
}

fn build_variable_map(context: &MediaContext) -> HashMap<&'static str, String> {
    let mut vars = HashMap::new();

    // Date variables
    vars.insert("date.label", context.date.label.clone());
    vars.insert("date.yyyy", context.date.yyyy.clone());
    vars.insert("date.mm", context.date.mm.clone());
    vars.insert("date.dd", context.date.dd.clone());
    vars.insert("date.month_name", context.date.month_name.clone());

    // Place variables
    vars.insert("place.name", context.place.name.clone());
    vars.insert("place.country_code", context.place.country_code.clone());
    vars.insert("place.lat", format_degrees(context.place.lat));
    vars.insert("place.lon", format_degrees(context.place.lon));

    // Source variables
    vars.insert("source.name", context.source.name.clone());
    vars.insert("source.extension", context.source.extension.clone());
    vars.insert("source.original", context.source.original.clone());

    vars
}

fn format_degrees(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.6}")).unwrap_or_default()
}
