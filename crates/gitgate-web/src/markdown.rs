//! README rendering.

use pulldown_cmark::{html, Options, Parser};

/// Render Markdown to HTML. Raw HTML in the source is passed through.
pub fn render_markdown(input: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut html_output = String::with_capacity(input.len() * 3 / 2);
    html::push_html(&mut html_output, Parser::new_ext(input, options));
    html_output
}

/// Names rendered below a directory listing, in order of preference.
pub const README_NAMES: &[&str] = &["README.md", "readme.md", "README.markdown"];

/// Highlighting class for a file extension, as used by the file view.
pub fn language_for_extension(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "rs" => "rust",
        "go" => "go",
        "py" => "python",
        "js" | "mjs" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" => "cpp",
        "cs" => "csharp",
        "java" => "java",
        "rb" => "ruby",
        "sh" | "bash" => "bash",
        "toml" => "toml",
        "yml" | "yaml" => "yaml",
        "json" => "json",
        "xml" | "csproj" => "xml",
        "html" | "htm" => "html",
        "css" => "css",
        "md" | "markdown" => "markdown",
        _ => "plaintext",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_markdown() {
        let html = render_markdown("# Hello\n\nThis is **bold** and ~~gone~~.\n\n| a |\n|---|\n| b |\n");
        assert!(html.contains("<h1>Hello</h1>"));
        assert!(html.contains("<strong>bold</strong>"));
        assert!(html.contains("<del>gone</del>"));
        assert!(html.contains("<table>"));
    }

    #[test]
    fn test_language_for_extension() {
        assert_eq!(language_for_extension("rs"), "rust");
        assert_eq!(language_for_extension("GO"), "go");
        assert_eq!(language_for_extension(""), "plaintext");
    }
}
