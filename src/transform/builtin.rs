// src/transform/builtin.rs

//! Built-in transforms.
//!
//! The minifiers only remove comments and whitespace in places where that
//! cannot change meaning for ordinary stylesheets, scripts and markup.
//! String, template and regex literals are never touched (see [`lexer`]).

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::{Arc, LazyLock};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use regex::{Captures, Regex};
use serde_json::json;

use crate::config::{TransformName, TransformStep};
use crate::errors::TransformError;
use crate::transform::lexer::{self, Comments, Syntax};
use crate::transform::{Asset, Transform};

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static CSS_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*([{};,>])\s*").expect("valid regex"));
static CSS_COLON: LazyLock<Regex> = LazyLock::new(|| Regex::new(r":\s+").expect("valid regex"));
static HTML_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));
static BETWEEN_TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r">\s+<").expect("valid regex"));
static HTML_RAW_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)<pre\b.*?</pre>|<textarea\b.*?</textarea>|<script\b.*?</script>|<style\b.*?</style>",
    )
    .expect("valid regex")
});
static SVG_METADATA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<metadata\b.*?</metadata>").expect("valid regex"));

/// Instantiate the transform named by a config step.
pub fn from_step(step: &TransformStep) -> Arc<dyn Transform> {
    match step.name {
        TransformName::MinifyCss => Arc::new(MinifyCss),
        TransformName::MinifyJs => Arc::new(MinifyJs {
            preserve_comments: step.preserve_comments.unwrap_or(true),
        }),
        TransformName::MinifyHtml => Arc::new(MinifyHtml),
        TransformName::OptimizeImage => Arc::new(OptimizeImage),
        TransformName::Sourcemap => Arc::new(Sourcemap),
        TransformName::Rename => Arc::new(Rename::new(step.ext.clone().unwrap_or_default())),
        TransformName::Command => Arc::new(ShellCommand {
            cmd: step.cmd.clone().unwrap_or_default(),
            ext: step.ext.clone(),
        }),
    }
}

/// Strip comments (keeping `/*! ... */`) and collapse whitespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinifyCss;

impl MinifyCss {
    pub fn minify(text: &str) -> String {
        let Some(masked) = lexer::mask(text, Syntax::Css, Comments::KeepImportant) else {
            return text.to_string();
        };
        let collapsed = WHITESPACE.replace_all(&masked.code, " ");
        let tight = CSS_PUNCTUATION.replace_all(&collapsed, "$1");
        let tight = CSS_COLON.replace_all(&tight, ":");
        let tight = Self::tighten_declaration_colons(&tight).replace(";}", "}");
        masked.restore(tight.trim())
    }

    /// Drop the space before `:` in declarations only. In a selector
    /// (`nav :hover`) that space is a descendant combinator.
    fn tighten_declaration_colons(css: &str) -> String {
        let mut out = String::with_capacity(css.len());
        let mut rest = css;
        while let Some(pos) = rest.find(" :") {
            let after = &rest[pos + 1..];
            let in_declaration = after
                .find(['{', ';', '}'])
                .is_some_and(|end| after.as_bytes()[end] != b'{');
            out.push_str(&rest[..pos]);
            if !in_declaration {
                out.push(' ');
            }
            out.push(':');
            rest = &after[1..];
        }
        out.push_str(rest);
        out
    }
}

impl Transform for MinifyCss {
    fn id(&self) -> String {
        "minify-css".to_string()
    }

    fn cacheable(&self) -> bool {
        true
    }

    fn apply(&self, asset: Asset) -> Result<Asset, TransformError> {
        let out = Self::minify(asset.text("minify-css")?);
        Ok(Asset::new(asset.path, out))
    }
}

/// Strip comments, trim lines and drop blank lines.
#[derive(Debug, Clone, Copy)]
pub struct MinifyJs {
    /// Keep `/*! ... */` license comments.
    pub preserve_comments: bool,
}

impl Default for MinifyJs {
    fn default() -> Self {
        Self {
            preserve_comments: true,
        }
    }
}

impl MinifyJs {
    pub fn minify(&self, text: &str) -> String {
        let comments = if self.preserve_comments {
            Comments::KeepImportant
        } else {
            Comments::Drop
        };
        let Some(masked) = lexer::mask(text, Syntax::Js, comments) else {
            return text.to_string();
        };
        let mut out = String::with_capacity(masked.code.len());
        for line in masked.code.lines().map(str::trim).filter(|l| !l.is_empty()) {
            out.push_str(line);
            out.push('\n');
        }
        masked.restore(&out)
    }
}

impl Transform for MinifyJs {
    fn id(&self) -> String {
        if self.preserve_comments {
            "minify-js".to_string()
        } else {
            "minify-js:strip-all".to_string()
        }
    }

    fn cacheable(&self) -> bool {
        true
    }

    fn apply(&self, asset: Asset) -> Result<Asset, TransformError> {
        let out = self.minify(asset.text("minify-js")?);
        Ok(Asset::new(asset.path, out))
    }
}

/// Strip comments and inter-tag whitespace outside raw-text elements.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinifyHtml;

impl MinifyHtml {
    pub fn minify(text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for raw in HTML_RAW_BLOCK.find_iter(text) {
            out.push_str(&Self::minify_markup(&text[last..raw.start()]));
            out.push_str(raw.as_str());
            last = raw.end();
        }
        out.push_str(&Self::minify_markup(&text[last..]));
        out.trim().to_string()
    }

    fn minify_markup(markup: &str) -> String {
        let stripped = HTML_COMMENT.replace_all(markup, |caps: &Captures| {
            // Conditional comments carry behaviour.
            if caps[0].starts_with("<!--[if") {
                caps[0].to_string()
            } else {
                String::new()
            }
        });
        let tight = BETWEEN_TAGS.replace_all(&stripped, "><");
        WHITESPACE.replace_all(&tight, " ").into_owned()
    }
}

impl Transform for MinifyHtml {
    fn id(&self) -> String {
        "minify-html".to_string()
    }

    fn cacheable(&self) -> bool {
        true
    }

    fn apply(&self, asset: Asset) -> Result<Asset, TransformError> {
        let out = Self::minify(asset.text("minify-html")?);
        Ok(Asset::new(asset.path, out))
    }
}

/// SVG: drop comments, `<metadata>` and inter-tag whitespace. Raster
/// images pass through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptimizeImage;

impl OptimizeImage {
    fn is_svg(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("svg"))
    }
}

impl Transform for OptimizeImage {
    fn id(&self) -> String {
        "optimize-image".to_string()
    }

    fn cacheable(&self) -> bool {
        true
    }

    fn apply(&self, asset: Asset) -> Result<Asset, TransformError> {
        if !Self::is_svg(&asset.path) {
            return Ok(asset);
        }
        let text = asset.text("optimize-image")?;
        let no_comments = HTML_COMMENT.replace_all(text, "");
        let no_metadata = SVG_METADATA.replace_all(&no_comments, "");
        let tight = BETWEEN_TAGS.replace_all(&no_metadata, "><");
        let out = tight.trim().to_string();
        Ok(Asset::new(asset.path, out))
    }
}

/// Append an inline identity source map.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sourcemap;

/// Marker every inline source map reference contains.
pub const SOURCEMAP_MARKER: &str = "sourceMappingURL=data:application/json";

impl Transform for Sourcemap {
    fn id(&self) -> String {
        "sourcemap".to_string()
    }

    fn writes_sourcemap(&self) -> bool {
        true
    }

    fn apply(&self, asset: Asset) -> Result<Asset, TransformError> {
        let text = asset.text("sourcemap")?;
        let file = asset
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let map = json!({
            "version": 3,
            "file": file,
            "sources": [asset.path.to_string_lossy()],
            "sourcesContent": [text],
            "names": [],
            "mappings": "",
        });
        let encoded = STANDARD.encode(map.to_string());
        let reference = format!("{SOURCEMAP_MARKER};charset=utf-8;base64,{encoded}");

        let is_css = asset.path.extension().is_some_and(|e| e == "css");
        let mut out = text.trim_end().to_string();
        if is_css {
            out.push_str(&format!("\n/*# {reference} */\n"));
        } else {
            out.push_str(&format!("\n//# {reference}\n"));
        }
        Ok(Asset::new(asset.path, out))
    }
}

/// Change the file extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rename {
    ext: String,
}

impl Rename {
    pub fn new(ext: impl Into<String>) -> Self {
        Self {
            ext: ext.into().trim_start_matches('.').to_string(),
        }
    }
}

impl Transform for Rename {
    fn id(&self) -> String {
        format!("rename:{}", self.ext)
    }

    fn apply(&self, asset: Asset) -> Result<Asset, TransformError> {
        Ok(Asset::new(asset.path.with_extension(&self.ext), asset.contents))
    }
}

/// Pipe the content through a shell command (stdin to stdout).
#[derive(Debug, Clone)]
pub struct ShellCommand {
    pub cmd: String,
    /// New extension for the output, if the command changes the format.
    pub ext: Option<String>,
}

impl Transform for ShellCommand {
    fn id(&self) -> String {
        format!("command:{}", self.cmd)
    }

    fn apply(&self, asset: Asset) -> Result<Asset, TransformError> {
        let fail = |message: String| TransformError::new("command", &asset.path, message);

        let mut child = shell(&self.cmd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| fail(format!("spawning `{}`: {e}", self.cmd)))?;

        // Feed stdin from another thread so a chatty command cannot deadlock
        // on a full stdout pipe.
        let writer = child.stdin.take().map(|mut stdin| {
            let input = asset.contents.clone();
            std::thread::spawn(move || stdin.write_all(&input))
        });

        let output = child
            .wait_with_output()
            .map_err(|e| fail(format!("waiting for `{}`: {e}", self.cmd)))?;

        if let Some(handle) = writer {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Ok(Err(e)) => return Err(fail(format!("writing stdin: {e}"))),
                Err(_) => return Err(fail("stdin writer panicked".to_string())),
            }
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(fail(format!(
                "`{}` exited with {}: {}",
                self.cmd,
                output.status,
                stderr.trim()
            )));
        }

        let path = match &self.ext {
            Some(ext) => asset.path.with_extension(ext),
            None => asset.path,
        };
        Ok(Asset::new(path, output.stdout))
    }
}

/// Platform shell invocation for `cmd`.
pub fn shell(cmd: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(t: &dyn Transform, path: &str, input: &str) -> String {
        let out = t.apply(Asset::new(path, input)).unwrap();
        String::from_utf8(out.contents).unwrap()
    }

    #[test]
    fn css_minifier_strips_comments_but_keeps_important_ones() {
        let css = "/*! license */\n/* note */\nbody {\n  color : red;\n  margin: 0 auto;\n}\n";
        assert_eq!(
            run(&MinifyCss, "main.css", css),
            "/*! license */ body{color:red;margin:0 auto}"
        );
    }

    #[test]
    fn js_minifier_drops_blank_and_comment_lines() {
        let js = "// header\nvar a = 1;\n\n  /* block */ var b = 'http://x';\n";
        assert_eq!(
            run(&MinifyJs::default(), "main.js", js),
            "var a = 1;\nvar b = 'http://x';\n"
        );
    }

    #[test]
    fn css_minifier_keeps_descendant_pseudo_selectors_and_strings() {
        assert_eq!(MinifyCss::minify("nav :hover { color: red }"), "nav :hover{color:red}");
        assert_eq!(
            MinifyCss::minify("@media (min-width: 40em) {\n  a :focus { outline : none; }\n}"),
            "@media (min-width:40em){a :focus{outline:none}}"
        );
        assert_eq!(
            MinifyCss::minify("q::before { content: \"a ,  /* b */\"; }"),
            "q::before{content:\"a ,  /* b */\"}"
        );
    }

    #[test]
    fn js_minifier_leaves_literals_alone() {
        let js = "var glob = \"app/scripts/**/*.js\";\n";
        assert_eq!(MinifyJs::default().minify(js), js);

        let js = "var re = /[/*]/; // trailing\nvar t = `a\n    /* kept */ b`;\n";
        assert_eq!(
            MinifyJs::default().minify(js),
            "var re = /[/*]/;\nvar t = `a\n    /* kept */ b`;\n"
        );
    }

    #[test]
    fn js_minifier_license_comments_follow_preserve_flag() {
        let js = "/*! MIT */\nrun();\n";
        assert_eq!(MinifyJs::default().minify(js), js);
        let strip = MinifyJs {
            preserve_comments: false,
        };
        assert_eq!(strip.minify(js), "run();\n");
    }

    #[test]
    fn html_minifier_preserves_pre_blocks() {
        let html = "<html>\n  <!-- c -->\n  <body>\n    <pre>  keep\n  me </pre>\n  </body>\n</html>\n";
        assert_eq!(
            run(&MinifyHtml, "index.html", html),
            "<html><body> <pre>  keep\n  me </pre> </body></html>"
        );
    }

    #[test]
    fn image_optimizer_only_touches_svg() {
        let svg = "<svg>\n  <!-- c -->\n  <metadata>x</metadata>\n  <rect/>\n</svg>\n";
        assert_eq!(run(&OptimizeImage, "a.svg", svg), "<svg><rect/></svg>");

        let png = Asset::new("a.png", vec![0x89, b'P', b'N', b'G', 0xff]);
        assert_eq!(OptimizeImage.apply(png.clone()).unwrap(), png);
    }

    #[test]
    fn sourcemap_comment_style_follows_extension() {
        let css = run(&Sourcemap, "main.css", "a{}\n");
        assert!(css.starts_with("a{}\n/*# sourceMappingURL=data:application/json"));
        assert!(css.trim_end().ends_with("*/"));

        let js = run(&Sourcemap, "main.js", "x();");
        assert!(js.contains("\n//# sourceMappingURL=data:application/json;charset=utf-8;base64,"));
    }

    #[test]
    fn non_utf8_input_is_a_transform_error() {
        let err = MinifyCss
            .apply(Asset::new("bad.css", vec![0xff, 0xfe]))
            .unwrap_err();
        assert_eq!(err.transform, "minify-css");
        assert_eq!(err.path, Path::new("bad.css"));
    }

    #[cfg(unix)]
    #[test]
    fn shell_command_pipes_content() {
        let t = ShellCommand {
            cmd: "tr a-z A-Z".to_string(),
            ext: Some("txt".to_string()),
        };
        let out = t.apply(Asset::new("a.in", "hello")).unwrap();
        assert_eq!(out.path, Path::new("a.txt"));
        assert_eq!(out.contents, b"HELLO");

        let failing = ShellCommand {
            cmd: "exit 3".to_string(),
            ext: None,
        };
        assert!(failing.apply(Asset::new("a.in", "x")).is_err());
    }
}
