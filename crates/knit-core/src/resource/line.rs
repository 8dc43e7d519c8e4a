//! Resource line grammar.

/// One meaningful line of a resource file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLine {
    /// 1-based line number in the file
    pub line_no: usize,
    /// The line with comments stripped and whitespace trimmed
    pub raw: String,
    /// Declared names, empty for a bare type name
    pub names: Vec<String>,
    /// Qualified implementation type name
    pub class_name: String,
}

/// Parse one line; `None` for blank, comment-only or nameless lines.
pub fn parse_line(line_no: usize, line: &str) -> Option<ResourceLine> {
    let line = match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    };
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (names, class_name) = match line.split_once('=') {
        Some((names, class_name)) => (split_names(names), class_name.trim()),
        None => (Vec::new(), line),
    };
    if class_name.is_empty() {
        return None;
    }

    Some(ResourceLine {
        line_no,
        raw: line.to_string(),
        names,
        class_name: class_name.to_string(),
    })
}

/// Parse a whole resource file.
pub fn parse_resource(content: &str) -> Vec<ResourceLine> {
    content
        .lines()
        .enumerate()
        .filter_map(|(i, line)| parse_line(i + 1, line))
        .collect()
}

fn split_names(names: &str) -> Vec<String> {
    names
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect()
}
