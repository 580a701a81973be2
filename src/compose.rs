//! EPUB packaging of converted prose files.
//!
//! Gathers the prose `.md` files produced by `convert`, clips the common
//! filename prefix to get chapter titles, renders markdown to XHTML, and
//! writes a minimal EPUB 3 container. Purely formatting; the prose files
//! are consumed as opaque text.

use anyhow::{bail, Context, Result};
use pulldown_cmark::{html, Parser};
use quick_xml::escape::escape;
use std::io::Write;
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::ComposeConfig;

/// A single chapter: title plus rendered XHTML body.
struct Chapter {
    title: String,
    file_name: String,
    body_html: String,
}

/// Build `output` (an `.epub`) from every `.md` file under `md_dir`.
pub fn run_compose(
    config: &ComposeConfig,
    md_dir: &Path,
    output: &Path,
    title: &str,
) -> Result<()> {
    if !md_dir.is_dir() {
        bail!("Prose directory does not exist: {}", md_dir.display());
    }

    let mut md_files: Vec<_> = std::fs::read_dir(md_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "md"))
        .collect();
    md_files.sort();

    if md_files.is_empty() {
        bail!("No .md files found in {}", md_dir.display());
    }

    let names: Vec<String> = md_files
        .iter()
        .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().to_string()))
        .collect();
    let prefix = common_prefix(&names);

    let mut chapters = Vec::new();
    for (path, name) in md_files.iter().zip(&names) {
        let markdown = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let clipped = name.strip_prefix(&prefix).unwrap_or(name);
        let chapter_title = if clipped.is_empty() { name.clone() } else { clipped.to_string() };

        chapters.push(Chapter {
            file_name: format!("chapter{:03}.xhtml", chapters.len() + 1),
            title: chapter_title,
            body_html: markdown_to_html(&markdown),
        });
    }

    write_epub(config, output, title, &chapters)?;

    println!("compose {}", md_dir.display());
    println!("  chapters: {}", chapters.len());
    if !prefix.is_empty() {
        println!("  clipped prefix: {}", prefix);
    }
    println!("  wrote: {}", output.display());
    println!("ok");

    Ok(())
}

/// Longest prefix shared by every name. Chapter titles read better with
/// the repeated series name removed.
fn common_prefix(names: &[String]) -> String {
    let first = match names.first() {
        Some(first) => first,
        None => return String::new(),
    };

    let mut end = first.len();
    for name in &names[1..] {
        let shared = first
            .char_indices()
            .zip(name.chars())
            .take_while(|((_, a), b)| a == b)
            .last()
            .map(|((i, a), _)| i + a.len_utf8())
            .unwrap_or(0);
        end = end.min(shared);
    }
    first[..end].to_string()
}

fn markdown_to_html(markdown: &str) -> String {
    // Bare prose without blank lines would render as one huge paragraph;
    // the convert pipeline separates batches with model-inserted breaks,
    // so plain markdown rendering is enough.
    let mut out = String::with_capacity(markdown.len() * 2);
    html::push_html(&mut out, Parser::new(markdown));
    out
}

fn write_epub(
    config: &ComposeConfig,
    output: &Path,
    title: &str,
    chapters: &[Chapter],
) -> Result<()> {
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let mut zip = ZipWriter::new(file);

    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    // EPUB requires the mimetype entry first and uncompressed.
    zip.start_file("mimetype", stored)?;
    zip.write_all(b"application/epub+zip")?;

    zip.start_file("META-INF/container.xml", deflated)?;
    zip.write_all(CONTAINER_XML.as_bytes())?;

    zip.start_file("OEBPS/content.opf", deflated)?;
    zip.write_all(content_opf(config, title, chapters).as_bytes())?;

    zip.start_file("OEBPS/nav.xhtml", deflated)?;
    zip.write_all(nav_xhtml(config, title, chapters).as_bytes())?;

    for chapter in chapters {
        zip.start_file(format!("OEBPS/{}", chapter.file_name), deflated)?;
        zip.write_all(chapter_xhtml(config, chapter).as_bytes())?;
    }

    zip.finish()?;
    Ok(())
}

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;

fn content_opf(config: &ComposeConfig, title: &str, chapters: &[Chapter]) -> String {
    let identifier = config.identifier.as_deref().unwrap_or("urn:caption-press:book");

    let mut manifest = String::new();
    let mut spine = String::new();
    for (i, chapter) in chapters.iter().enumerate() {
        manifest.push_str(&format!(
            "    <item id=\"ch{0:03}\" href=\"{1}\" media-type=\"application/xhtml+xml\"/>\n",
            i + 1,
            chapter.file_name
        ));
        spine.push_str(&format!("    <itemref idref=\"ch{:03}\"/>\n", i + 1));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="bookid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="bookid">{identifier}</dc:identifier>
    <dc:title>{title}</dc:title>
    <dc:language>{language}</dc:language>
  </metadata>
  <manifest>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
{manifest}  </manifest>
  <spine>
{spine}  </spine>
</package>
"#,
        identifier = escape(identifier),
        title = escape(title),
        language = escape(&config.language),
        manifest = manifest,
        spine = spine,
    )
}

fn nav_xhtml(config: &ComposeConfig, title: &str, chapters: &[Chapter]) -> String {
    let mut items = String::new();
    for chapter in chapters {
        items.push_str(&format!(
            "        <li><a href=\"{}\">{}</a></li>\n",
            chapter.file_name,
            escape(&chapter.title)
        ));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" xml:lang="{language}">
  <head><title>{title}</title></head>
  <body>
    <nav epub:type="toc">
      <ol>
{items}      </ol>
    </nav>
  </body>
</html>
"#,
        language = escape(&config.language),
        title = escape(title),
        items = items,
    )
}

fn chapter_xhtml(config: &ComposeConfig, chapter: &Chapter) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xml:lang="{language}">
  <head><title>{title}</title></head>
  <body>
{body}  </body>
</html>
"#,
        language = escape(&config.language),
        title = escape(&chapter.title),
        body = chapter.body_html,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn common_prefix_of_series_names() {
        let names = strings(&["lecture-01", "lecture-02", "lecture-03"]);
        assert_eq!(common_prefix(&names), "lecture-0");
    }

    #[test]
    fn common_prefix_empty_when_divergent() {
        let names = strings(&["alpha", "beta"]);
        assert_eq!(common_prefix(&names), "");
    }

    #[test]
    fn common_prefix_single_name() {
        let names = strings(&["only"]);
        assert_eq!(common_prefix(&names), "only");
    }

    #[test]
    fn common_prefix_multibyte_safe() {
        let names = strings(&["第一章", "第二章"]);
        assert_eq!(common_prefix(&names), "第");
    }

    #[test]
    fn markdown_paragraphs_become_html() {
        let html = markdown_to_html("第一段。\n\n第二段。");
        assert!(html.contains("<p>第一段。</p>"));
        assert!(html.contains("<p>第二段。</p>"));
    }

    #[test]
    fn compose_produces_valid_container() {
        let tmp = TempDir::new().unwrap();
        let md_dir = tmp.path().join("prose");
        std::fs::create_dir_all(&md_dir).unwrap();
        std::fs::write(md_dir.join("show-01.md"), "第一章内容。").unwrap();
        std::fs::write(md_dir.join("show-02.md"), "第二章内容。").unwrap();

        let output = tmp.path().join("book.epub");
        run_compose(&ComposeConfig::default(), &md_dir, &output, "My Book").unwrap();

        let mut archive = ZipArchive::new(std::fs::File::open(&output).unwrap()).unwrap();

        // mimetype must be the first entry and stored uncompressed.
        {
            let mut mimetype = archive.by_index(0).unwrap();
            assert_eq!(mimetype.name(), "mimetype");
            assert_eq!(mimetype.compression(), CompressionMethod::Stored);
            let mut content = String::new();
            mimetype.read_to_string(&mut content).unwrap();
            assert_eq!(content, "application/epub+zip");
        }

        for expected in [
            "META-INF/container.xml",
            "OEBPS/content.opf",
            "OEBPS/nav.xhtml",
            "OEBPS/chapter001.xhtml",
            "OEBPS/chapter002.xhtml",
        ] {
            assert!(archive.by_name(expected).is_ok(), "missing {}", expected);
        }

        let mut opf = String::new();
        archive
            .by_name("OEBPS/content.opf")
            .unwrap()
            .read_to_string(&mut opf)
            .unwrap();
        assert!(opf.contains("<dc:title>My Book</dc:title>"));
        assert!(opf.contains("chapter002.xhtml"));

        // Chapter titles have the shared "show-0" prefix clipped.
        let mut nav = String::new();
        archive
            .by_name("OEBPS/nav.xhtml")
            .unwrap()
            .read_to_string(&mut nav)
            .unwrap();
        assert!(nav.contains(">1<") && nav.contains(">2<"));
    }

    #[test]
    fn compose_empty_dir_fails() {
        let tmp = TempDir::new().unwrap();
        let result = run_compose(
            &ComposeConfig::default(),
            tmp.path(),
            &tmp.path().join("book.epub"),
            "Empty",
        );
        assert!(result.is_err());
    }

    #[test]
    fn titles_are_escaped() {
        let config = ComposeConfig::default();
        let chapters = [Chapter {
            title: "a & b".to_string(),
            file_name: "chapter001.xhtml".to_string(),
            body_html: "<p>x</p>".to_string(),
        }];
        let opf = content_opf(&config, "Tom & Jerry", &chapters);
        assert!(opf.contains("Tom &amp; Jerry"));
        let nav = nav_xhtml(&config, "Tom & Jerry", &chapters);
        assert!(nav.contains("a &amp; b"));
    }
}
