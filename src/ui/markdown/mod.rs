//! Markdown to terminal lines, built on pulldown-cmark.
//!
//! Answers are rendered once, after they settle, so the renderer works on
//! whole documents and produces plain `String` lines. ANSI styling is added
//! only when `color` is set; tests render without it.

mod code;
mod table;

pub use code::CodeBlock;

use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};

use code::{code_block_lines, language_hint_from_codeblock_kind};
use table::TableRenderer;

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const ITALIC: &str = "\x1b[3m";
const UNDERLINE: &str = "\x1b[4m";
const STRIKE: &str = "\x1b[9m";
const DIM: &str = "\x1b[2m";
const CODE: &str = "\x1b[36m";
const RULE_WIDTH: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub color: bool,
    pub syntax: bool,
}

impl RenderOptions {
    pub fn plain() -> Self {
        Self {
            color: false,
            syntax: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedMarkdown {
    pub lines: Vec<String>,
    pub code_blocks: Vec<CodeBlock>,
}

#[derive(Clone, Debug)]
enum ListKind {
    Unordered,
    Ordered(u64),
}

struct PendingLink {
    dest: String,
    text: String,
    image: bool,
}

struct MarkdownRenderer {
    options: RenderOptions,
    out: RenderedMarkdown,
    current: String,
    styles: Vec<&'static str>,
    lists: Vec<ListKind>,
    item_marker: Option<String>,
    quote_depth: usize,
    links: Vec<PendingLink>,
    code: Option<CodeBlock>,
    table: Option<TableRenderer>,
}

impl MarkdownRenderer {
    fn new(options: RenderOptions) -> Self {
        Self {
            options,
            out: RenderedMarkdown::default(),
            current: String::new(),
            styles: Vec::new(),
            lists: Vec::new(),
            item_marker: None,
            quote_depth: 0,
            links: Vec::new(),
            code: None,
            table: None,
        }
    }

    fn push_text(&mut self, text: &str) {
        if let Some(code) = self.code.as_mut() {
            code.code.push_str(text);
            return;
        }
        if let Some(link) = self.links.last_mut() {
            link.text.push_str(text);
        }
        match self.table.as_mut() {
            Some(table) => table.push_text(text),
            None => self.current.push_str(text),
        }
    }

    fn push_style(&mut self, sgr: &'static str) {
        self.styles.push(sgr);
        if self.options.color && self.table.is_none() {
            self.current.push_str(sgr);
        }
    }

    fn pop_style(&mut self) {
        self.styles.pop();
        if self.options.color && self.table.is_none() {
            self.current.push_str(RESET);
            self.reapply_styles();
        }
    }

    fn reapply_styles(&mut self) {
        for sgr in &self.styles {
            self.current.push_str(sgr);
        }
    }

    fn continuation_indent(&self) -> String {
        " ".repeat(self.lists.len() * 2)
    }

    fn flush_line(&mut self) {
        if self.current.is_empty() && self.item_marker.is_none() {
            return;
        }
        let mut line = "> ".repeat(self.quote_depth);
        match self.item_marker.take() {
            Some(marker) => line.push_str(&marker),
            None => line.push_str(&self.continuation_indent()),
        }
        line.push_str(&std::mem::take(&mut self.current));
        if self.options.color && !self.styles.is_empty() {
            line.push_str(RESET);
            self.reapply_styles();
        }
        self.out.lines.push(line);
    }

    fn blank_line(&mut self) {
        if self.out.lines.last().is_some_and(|line| !line.is_empty()) {
            self.out.lines.push(String::new());
        }
    }

    fn end_block(&mut self) {
        self.flush_line();
        if self.lists.is_empty() {
            self.blank_line();
        }
    }

    fn start_item(&mut self) {
        self.flush_line();
        let depth = self.lists.len().saturating_sub(1);
        let marker = match self.lists.last_mut() {
            Some(ListKind::Ordered(next)) => {
                let marker = format!("{next}. ");
                *next += 1;
                marker
            }
            Some(ListKind::Unordered) | None => "• ".to_string(),
        };
        self.item_marker = Some(format!("{}{}", "  ".repeat(depth), marker));
    }

    fn end_code_block(&mut self) {
        let Some(block) = self.code.take() else {
            return;
        };
        self.flush_line();
        let index = self.out.code_blocks.len() + 1;
        let badge = block.badge(index);
        let badge = if self.options.color {
            format!("{DIM}{badge}{RESET}")
        } else {
            badge
        };
        self.out.lines.push(badge);
        let highlight = self.options.color && self.options.syntax;
        self.out.lines.extend(code_block_lines(&block, highlight));
        self.out.code_blocks.push(block);
        self.blank_line();
    }

    fn end_link(&mut self) {
        let Some(link) = self.links.pop() else {
            return;
        };
        if !link.image {
            self.pop_style();
        }
        if link.image {
            self.push_text("]");
        }
        if !link.dest.is_empty() && link.text.trim() != link.dest {
            self.push_text(&format!(" ({})", link.dest));
        }
    }

    fn handle(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start_tag(tag),
            Event::End(tag) => self.end_tag(tag),
            Event::Text(text) => self.push_text(&text),
            Event::Code(text) => {
                if self.options.color && self.table.is_none() {
                    self.current.push_str(CODE);
                    self.current.push_str(&text);
                    self.current.push_str(RESET);
                    self.reapply_styles();
                    if let Some(link) = self.links.last_mut() {
                        link.text.push_str(&text);
                    }
                } else {
                    self.push_text(&format!("`{text}`"));
                }
            }
            Event::Html(html) | Event::InlineHtml(html) => {
                if self.code.is_none() {
                    self.push_text(html.trim_end_matches('\n'));
                }
            }
            Event::SoftBreak => self.push_text(" "),
            Event::HardBreak => self.flush_line(),
            Event::Rule => {
                self.flush_line();
                self.out.lines.push("─".repeat(RULE_WIDTH));
                self.blank_line();
            }
            Event::TaskListMarker(checked) => {
                self.push_text(if checked { "[x] " } else { "[ ] " })
            }
            _ => {}
        }
    }

    fn start_tag(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => {}
            Tag::Heading { level, .. } => {
                self.flush_line();
                self.push_style(BOLD);
                if level == HeadingLevel::H1 {
                    self.push_style(UNDERLINE);
                }
            }
            Tag::BlockQuote(_) => {
                self.flush_line();
                self.quote_depth += 1;
            }
            Tag::CodeBlock(kind) => {
                self.flush_line();
                self.code = Some(CodeBlock {
                    language: language_hint_from_codeblock_kind(&kind),
                    code: String::new(),
                });
            }
            Tag::List(start) => {
                self.flush_line();
                self.lists.push(match start {
                    Some(n) => ListKind::Ordered(n),
                    None => ListKind::Unordered,
                });
            }
            Tag::Item => self.start_item(),
            Tag::Emphasis => self.push_style(ITALIC),
            Tag::Strong => self.push_style(BOLD),
            Tag::Strikethrough => self.push_style(STRIKE),
            Tag::Link { dest_url, .. } => {
                self.links.push(PendingLink {
                    dest: dest_url.to_string(),
                    text: String::new(),
                    image: false,
                });
                self.push_style(UNDERLINE);
            }
            Tag::Image { dest_url, .. } => {
                self.push_text("[image: ");
                self.links.push(PendingLink {
                    dest: dest_url.to_string(),
                    text: String::new(),
                    image: true,
                });
            }
            Tag::Table(alignments) => {
                self.flush_line();
                self.table = Some(TableRenderer::new(alignments));
            }
            Tag::TableHead => {
                if let Some(table) = self.table.as_mut() {
                    table.start_header();
                }
            }
            Tag::TableCell => {
                if let Some(table) = self.table.as_mut() {
                    table.start_cell();
                }
            }
            _ => {}
        }
    }

    fn end_tag(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => self.end_block(),
            TagEnd::Heading(level) => {
                if level == HeadingLevel::H1 {
                    self.pop_style();
                }
                self.pop_style();
                self.end_block();
            }
            TagEnd::BlockQuote(_) => {
                self.flush_line();
                self.quote_depth = self.quote_depth.saturating_sub(1);
                if self.quote_depth == 0 {
                    self.blank_line();
                }
            }
            TagEnd::CodeBlock => self.end_code_block(),
            TagEnd::List(_) => {
                self.flush_line();
                self.lists.pop();
                if self.lists.is_empty() {
                    self.blank_line();
                }
            }
            TagEnd::Item => self.flush_line(),
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough => self.pop_style(),
            TagEnd::Link | TagEnd::Image => self.end_link(),
            TagEnd::TableHead => {
                if let Some(table) = self.table.as_mut() {
                    table.end_header();
                }
            }
            TagEnd::TableRow => {
                if let Some(table) = self.table.as_mut() {
                    table.end_row();
                }
            }
            TagEnd::TableCell => {
                if let Some(table) = self.table.as_mut() {
                    table.end_cell();
                }
            }
            TagEnd::Table => {
                if let Some(table) = self.table.take() {
                    self.out.lines.extend(table.render());
                }
                self.blank_line();
            }
            _ => {}
        }
    }

    fn finish(mut self) -> RenderedMarkdown {
        self.flush_line();
        while self.out.lines.last().is_some_and(|line| line.is_empty()) {
            self.out.lines.pop();
        }
        self.out
    }
}

/// Render markdown into terminal lines, collecting code blocks for copying.
pub fn render_markdown(text: &str, options: RenderOptions) -> RenderedMarkdown {
    let mut parser_options = Options::empty();
    parser_options.insert(Options::ENABLE_TABLES);
    parser_options.insert(Options::ENABLE_STRIKETHROUGH);
    parser_options.insert(Options::ENABLE_TASKLISTS);

    let mut renderer = MarkdownRenderer::new(options);
    for event in Parser::new_ext(text, parser_options) {
        renderer.handle(event);
    }
    renderer.finish()
}
