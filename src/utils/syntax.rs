use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, OnceLock};

use syntect::easy::HighlightLines;
use syntect::highlighting::ThemeSet;
use syntect::parsing::SyntaxSet;
use syntect::util::{as_24_bit_terminal_escaped, LinesWithEndings};

const RESET: &str = "\x1b[0m";
const CACHE_CAPACITY: usize = 64;
const THEME_NAME: &str = "base16-ocean.dark";
const FALLBACK_THEMES: [&str; 2] = ["base16-eighties.dark", "Solarized (dark)"];

// Simple FIFO cache (bounded) for highlighted blocks
// key = (lang_norm, hash)

fn hash_code(lang: &str, code: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    lang.hash(&mut hasher);
    code.hash(&mut hasher);
    hasher.finish()
}

struct SimpleCache {
    map: HashMap<(String, u64), Vec<String>>,
    order: VecDeque<(String, u64)>,
    cap: usize,
}

impl SimpleCache {
    fn new(cap: usize) -> Self {
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
            cap,
        }
    }
    fn get(&self, k: &(String, u64)) -> Option<Vec<String>> {
        self.map.get(k).cloned()
    }
    fn put(&mut self, k: (String, u64), v: Vec<String>) {
        if !self.map.contains_key(&k) {
            self.order.push_back(k.clone());
        }
        self.map.insert(k, v);
        while self.map.len() > self.cap {
            if let Some(old) = self.order.pop_front() {
                self.map.remove(&old);
            } else {
                break;
            }
        }
    }
}

static SYNTAX_CACHE: Mutex<Option<SimpleCache>> = Mutex::new(None);

fn cached(key: &(String, u64)) -> Option<Vec<String>> {
    let guard = SYNTAX_CACHE.lock().ok()?;
    guard.as_ref().and_then(|cache| cache.get(key))
}

fn remember(key: (String, u64), lines: Vec<String>) {
    if let Ok(mut guard) = SYNTAX_CACHE.lock() {
        guard
            .get_or_insert_with(|| SimpleCache::new(CACHE_CAPACITY))
            .put(key, lines);
    }
}

pub(crate) fn normalize_lang_hint(s: &str) -> String {
    let t = s.trim().to_ascii_lowercase();
    match t.as_str() {
        "py" | "python" => "python".into(),
        "bash" | "sh" | "zsh" | "shell" | "console" => "bash".into(),
        "js" | "javascript" | "jsx" => "javascript".into(),
        "ts" | "tsx" | "typescript" => "typescript".into(),
        "json" => "json".into(),
        "toml" => "toml".into(),
        "yaml" | "yml" => "yaml".into(),
        "rust" | "rs" => "rust".into(),
        "go" => "go".into(),
        "c" | "h" => "c".into(),
        "cpp" | "cc" | "cxx" | "hpp" | "hxx" => "cpp".into(),
        "java" => "java".into(),
        "html" => "html".into(),
        "css" => "css".into(),
        "sql" => "sql".into(),
        other => other.into(),
    }
}

fn syntax_set() -> &'static SyntaxSet {
    static SYNTAX_SET: OnceLock<SyntaxSet> = OnceLock::new();
    SYNTAX_SET.get_or_init(SyntaxSet::load_defaults_newlines)
}

fn theme_set() -> &'static ThemeSet {
    static THEME_SET: OnceLock<ThemeSet> = OnceLock::new();
    THEME_SET.get_or_init(ThemeSet::load_defaults)
}

/// Highlight a fenced code block into terminal lines with 24-bit colour
/// escapes. `None` when no usable theme is available or highlighting fails.
pub fn highlight_code_block(lang_hint: &str, code: &str) -> Option<Vec<String>> {
    let lang_norm = normalize_lang_hint(lang_hint);
    let key = (lang_norm.clone(), hash_code(&lang_norm, code));
    if let Some(lines) = cached(&key) {
        return Some(lines);
    }

    let ps = syntax_set();
    let ts = theme_set();
    let theme = std::iter::once(THEME_NAME)
        .chain(FALLBACK_THEMES)
        .find_map(|name| ts.themes.get(name))?;

    let syntax = ps
        .find_syntax_by_token(&lang_norm)
        .unwrap_or_else(|| ps.find_syntax_plain_text());
    let mut highlighter = HighlightLines::new(syntax, theme);

    let mut out = Vec::new();
    for line in LinesWithEndings::from(code) {
        let ranges = highlighter.highlight_line(line, ps).ok()?;
        let escaped = as_24_bit_terminal_escaped(&ranges[..], false);
        let trimmed = escaped.trim_end_matches(['\n', '\r']);
        out.push(format!("{trimmed}{RESET}"));
    }

    remember(key, out.clone());
    Some(out)
}
