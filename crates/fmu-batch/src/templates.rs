//! Fixed text templates compiled into the binary.
//!
//! Placeholders are written `@name@`. Braces are avoided because Modelica
//! uses `{{...}}` for nested array literals.

/// Package header: `package <pkg>` / `extends <base>;`.
pub fn package_header() -> &'static str {
    include_str!("templates/package_header.mo.in")
}

/// Package footer with the package annotation and `end <pkg>;`.
pub fn package_footer() -> &'static str {
    include_str!("templates/package_footer.mo.in")
}

/// One robot model block.
pub fn robot_model() -> &'static str {
    include_str!("templates/robot_model.mo.in")
}

/// Compiler script translating one model into an FMU.
pub fn compile_script() -> &'static str {
    include_str!("templates/compile_script.mos.in")
}

/// Helper shell script: change into `$1`, evaluate `$2`.
pub fn helper_script() -> &'static str {
    include_str!("templates/cd1_eval2.sh.in")
}

/// Replace every `@key@` in `template` with its value.
///
/// Keys not listed are left untouched.
pub fn substitute(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in values {
        out = out.replace(&format!("@{key}@"), value);
    }
    out
}
