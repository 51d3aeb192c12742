/// Separador de sección en comentario C, rellenado con guiones.
macro_rules! banner {
    ($output:expr, $title:expr) => {{
        let title: &str = $title;
        let dashes = crate::codegen::c::BANNER_WIDTH.saturating_sub(title.chars().count() + 6);
        writeln!($output, "/* {} {:-<dashes$}*/", title, "", dashes = dashes)
    }};
}

/// Línea indentada un nivel.
macro_rules! emit {
    ($output:expr, $($format:tt)*) => {{
        write!($output, "    ")?;
        writeln!($output, $($format)*)
    }};
}
