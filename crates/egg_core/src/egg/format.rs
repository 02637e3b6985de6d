//! Token formatting for the egg grammar.
//!
//! Pure helpers turning numbers, names, paths, and matrices into
//! grammar-legal text. Everything downstream funnels through these so
//! the whole document shares one formatting policy.

use egg_math::{Mat4, Mat4Ext, Vec3};

/// Fixed 6-decimal float formatting, the precision used everywhere in
/// the document except knot vectors.
pub fn fnum(x: f32) -> String {
    format!("{:.6}", x)
}

/// 2-decimal formatting for NURBS knot vectors.
pub fn fknot(x: f32) -> String {
    format!("{:.2}", x)
}

/// Three space-separated 6-decimal floats.
pub fn fvec3(v: Vec3) -> String {
    format!("{:.6} {:.6} {:.6}", v.x, v.y, v.z)
}

/// Escape a name for use after a `<Tag>`.
///
/// Double quotes are not representable and fold to underscores. Names
/// containing characters outside the bare-word rules are wrapped in
/// quotes. The empty string stays empty: an unnamed `<UV>` channel is
/// how the default layer is signalled.
pub fn safe_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c == '"' { '_' } else { c })
        .collect();
    if cleaned.chars().any(|c| c.is_whitespace() || c == '{' || c == '}' || c == '<' || c == '>') {
        format!("\"{}\"", cleaned)
    } else {
        cleaned
    }
}

/// Convert a host filesystem path to the forward-slash form the engine
/// resolves: backslashes folded, a drive letter like `C:` becoming `/c`.
pub fn panda_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        format!("/{}{}", bytes[0].to_ascii_lowercase() as char, &path[2..])
    } else {
        path
    }
}

/// `<Transform> { <Matrix4> { ... } }` block.
///
/// Rows are the matrix columns (column-major emission), four scalars
/// per line at 6-decimal precision.
pub fn transform_block(matrix: &Mat4) -> String {
    let mut out = String::from("<Transform> {\n  <Matrix4> {\n");
    for column in matrix.columns() {
        out.push_str("    ");
        for value in column {
            out.push_str(&fnum(value));
            out.push(' ');
        }
        out.push('\n');
    }
    out.push_str("  }\n}\n");
    out
}

/// Re-indent a block of lines by `level` two-space steps.
pub fn indented(text: &str, level: usize) -> String {
    let pad = "  ".repeat(level);
    let mut out = String::new();
    for line in text.lines() {
        out.push_str(&pad);
        out.push_str(line);
        out.push('\n');
    }
    out
}
