use pulldown_cmark::CodeBlockKind;

const CODE_INDENT: &str = "    ";

/// A fenced or indented code block from a rendered answer, kept so it can be
/// copied with `/copy <n>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub language: Option<String>,
    pub code: String,
}

impl CodeBlock {
    pub fn badge(&self, index: usize) -> String {
        let language = self.language.as_deref().unwrap_or("text");
        format!("[{index}] {language}  (/copy {index})")
    }
}

pub(super) fn language_hint_from_codeblock_kind(kind: &CodeBlockKind<'_>) -> Option<String> {
    match kind {
        CodeBlockKind::Indented => None,
        CodeBlockKind::Fenced(info) => info
            .split_ascii_whitespace()
            .next()
            .map(str::to_string),
    }
}

fn detab(line: &str) -> String {
    line.replace('\t', "    ")
}

/// Lines of a code block: syntax highlighted when enabled and possible,
/// plain otherwise, always indented.
pub(super) fn code_block_lines(block: &CodeBlock, highlight: bool) -> Vec<String> {
    let code = block.code.trim_end_matches('\n');
    let produced = if highlight {
        crate::utils::syntax::highlight_code_block(block.language.as_deref().unwrap_or(""), code)
    } else {
        None
    };
    produced
        .unwrap_or_else(|| code.lines().map(detab).collect())
        .into_iter()
        .map(|line| format!("{CODE_INDENT}{line}"))
        .collect()
}
