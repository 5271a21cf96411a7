//! Pluggable output formats for directory trees.

use std::fmt::Write as _;

use crate::tree::TreeNode;

/// Receives tree nodes in pre-order and accumulates output.
pub trait TreeRenderer {
    /// Called once per node, parent before children. The root has depth 0.
    fn render_node(&mut self, node: &TreeNode, depth: usize);

    /// Called once after the last node, unless files were skipped.
    fn render_totals(&mut self, file_count: usize, total_size: u64);

    /// Output accumulated so far.
    fn to_text(&self) -> String;
}

/// Human-readable byte size with one decimal above 1 KB.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

fn count_label(file_count: usize) -> String {
    if file_count == 1 {
        "1 file".to_string()
    } else {
        format!("{} files", file_count)
    }
}

fn summary(file_count: usize, total_size: u64) -> String {
    format!("{}, {}", count_label(file_count), format_size(total_size))
}

fn directory_name(node: &TreeNode) -> String {
    if node.name.ends_with('/') {
        node.name.clone()
    } else {
        format!("{}/", node.name)
    }
}

/// Plain text with box-drawing connectors.
///
/// ```text
/// data/ (2 files, 150 B)
/// ├── sub/ (1 file, 50 B)
/// │   └── b.txt (50 B)
/// └── a.txt (100 B)
/// 2 files, 150 B
/// ```
#[derive(Debug, Default)]
pub struct TextTreeRenderer {
    output: String,
    /// `is_last` of each ancestor between the root and the current node.
    last_flags: Vec<bool>,
}

impl TextTreeRenderer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TreeRenderer for TextTreeRenderer {
    fn render_node(&mut self, node: &TreeNode, depth: usize) {
        if depth > 0 {
            self.last_flags.truncate(depth - 1);
            for &ancestor_last in &self.last_flags {
                self.output
                    .push_str(if ancestor_last { "    " } else { "│   " });
            }
            self.output
                .push_str(if node.is_last { "└── " } else { "├── " });
            self.last_flags.push(node.is_last);
        }

        let label = if node.is_directory {
            format!("{} ({})", directory_name(node), summary(node.file_count, node.size))
        } else {
            format!("{} ({})", node.name, format_size(node.size))
        };
        self.output.push_str(&label);
        self.output.push('\n');
    }

    fn render_totals(&mut self, file_count: usize, total_size: u64) {
        let _ = writeln!(self.output, "{}", summary(file_count, total_size));
    }

    fn to_text(&self) -> String {
        self.output.clone()
    }
}

/// Nested `<ul>` markup, one `<li>` per node.
#[derive(Debug, Default)]
pub struct HtmlTreeRenderer {
    body: String,
    footer: String,
    /// Depth of the most recently opened `<li>`.
    open_depth: Option<usize>,
}

impl HtmlTreeRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn closing(&self) -> String {
        match self.open_depth {
            Some(depth) => format!("</li>{}</ul>", "</ul></li>".repeat(depth)),
            None => String::new(),
        }
    }
}

/// Escape text for use in HTML element content.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

impl TreeRenderer for HtmlTreeRenderer {
    fn render_node(&mut self, node: &TreeNode, depth: usize) {
        match self.open_depth {
            Some(previous) if depth > previous => self.body.push_str("<ul><li>"),
            Some(previous) => {
                self.body.push_str("</li>");
                for _ in depth..previous {
                    self.body.push_str("</ul></li>");
                }
                self.body.push_str("<li>");
            }
            None => self.body.push_str("<ul><li>"),
        }
        self.open_depth = Some(depth);

        if node.is_directory {
            let _ = write!(
                self.body,
                "<strong>{}</strong> ({})",
                escape_html(&directory_name(node)),
                summary(node.file_count, node.size)
            );
        } else {
            let _ = write!(
                self.body,
                "{} ({})",
                escape_html(&node.name),
                format_size(node.size)
            );
        }
    }

    fn render_totals(&mut self, file_count: usize, total_size: u64) {
        self.footer = format!(
            "<p class=\"totals\">{}</p>",
            summary(file_count, total_size)
        );
    }

    fn to_text(&self) -> String {
        format!("{}{}{}", self.body, self.closing(), self.footer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, size: u64, is_last: bool) -> TreeNode {
        TreeNode {
            name: name.to_string(),
            is_directory: false,
            size,
            file_count: 1,
            is_last,
            children: Vec::new(),
        }
    }

    fn sample() -> TreeNode {
        let sub = TreeNode {
            name: "sub".to_string(),
            is_directory: true,
            size: 50,
            file_count: 1,
            is_last: false,
            children: vec![file("b.txt", 50, true)],
        };
        TreeNode {
            name: "data".to_string(),
            is_directory: true,
            size: 150,
            file_count: 2,
            is_last: true,
            children: vec![sub, file("a.txt", 100, true)],
        }
    }

    fn render_all<R: TreeRenderer>(renderer: &mut R, node: &TreeNode, depth: usize) {
        renderer.render_node(node, depth);
        for child in &node.children {
            render_all(renderer, child, depth + 1);
        }
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024 * 1024 * 1024), "3072.0 TB");
    }

    #[test]
    fn test_text_renderer() {
        let mut renderer = TextTreeRenderer::new();
        render_all(&mut renderer, &sample(), 0);
        renderer.render_totals(2, 150);

        let expected = "\
data/ (2 files, 150 B)
├── sub/ (1 file, 50 B)
│   └── b.txt (50 B)
└── a.txt (100 B)
2 files, 150 B
";
        assert_eq!(renderer.to_text(), expected);
    }

    #[test]
    fn test_text_renderer_continues_ancestor_bars() {
        let inner = TreeNode {
            name: "inner".to_string(),
            is_directory: true,
            size: 1,
            file_count: 1,
            is_last: true,
            children: vec![file("deep.txt", 1, true)],
        };
        let outer = TreeNode {
            name: "outer".to_string(),
            is_directory: true,
            size: 1,
            file_count: 1,
            is_last: false,
            children: vec![inner],
        };
        let root = TreeNode {
            name: "/".to_string(),
            is_directory: true,
            size: 1,
            file_count: 1,
            is_last: true,
            children: vec![outer, file("z.txt", 0, true)],
        };

        let mut renderer = TextTreeRenderer::new();
        render_all(&mut renderer, &root, 0);

        let lines: Vec<String> = renderer.to_text().lines().map(String::from).collect();
        assert_eq!(lines[0], "/ (1 file, 1 B)");
        assert_eq!(lines[2], "│   └── inner/ (1 file, 1 B)");
        assert_eq!(lines[3], "│       └── deep.txt (1 B)");
        assert_eq!(lines[4], "└── z.txt (0 B)");
    }

    #[test]
    fn test_html_renderer() {
        let mut renderer = HtmlTreeRenderer::new();
        render_all(&mut renderer, &sample(), 0);
        renderer.render_totals(2, 150);

        assert_eq!(
            renderer.to_text(),
            "<ul><li><strong>data/</strong> (2 files, 150 B)\
             <ul><li><strong>sub/</strong> (1 file, 50 B)\
             <ul><li>b.txt (50 B)</li></ul></li>\
             <li>a.txt (100 B)</li></ul></li></ul>\
             <p class=\"totals\">2 files, 150 B</p>"
        );
    }

    #[test]
    fn test_html_renderer_escapes_and_handles_empty() {
        assert_eq!(HtmlTreeRenderer::new().to_text(), "");

        let mut renderer = HtmlTreeRenderer::new();
        renderer.render_node(&file("<a&b>.txt", 3, true), 0);
        assert_eq!(renderer.to_text(), "<ul><li>&lt;a&amp;b&gt;.txt (3 B)</li></ul>");
    }
}
