//! Narration script cleanup and sentence splitting.

use std::sync::OnceLock;

use regex::Regex;

use crate::config::Language;

const LATIN_TERMINATORS: &[char] = &['.', '!', '?'];
const CJK_TERMINATORS: &[char] = &['。', '！', '？'];
const CLOSERS: &[char] = &['"', '\'', ')', '”', '’', '」', '』'];
const QUOTE_BRACKETS: &[char] = &['「', '」', '『', '』', '《', '》', '〈', '〉', '“', '”'];

struct Patterns {
    header: Regex,
    tag: Regex,
    bold: Regex,
    italic: Regex,
    spaces: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        header: Regex::new(r"(?m)^[ \t]*#{1,6}[^\n]*$").expect("Invalid regex"),
        tag: Regex::new(r"\[[A-Za-z0-9_ \-]+\]").expect("Invalid regex"),
        bold: Regex::new(r"(^|[^\w*])(\*\*|__)([^*_\s](?:.*?[^*_\s])?)(?:\*\*|__)")
            .expect("Invalid regex"),
        italic: Regex::new(r"(^|[^\w*])([*_])([^*_\s](?:[^*_]*?[^*_\s])?)[*_]")
            .expect("Invalid regex"),
        spaces: Regex::new(r"\s+").expect("Invalid regex"),
    })
}

/// Strip markup the narrator never speaks: header lines, `[TAG]` markers,
/// emphasis markers and quote brackets.
pub fn clean_script(text: &str) -> String {
    let p = patterns();
    let text = p.header.replace_all(text, "");
    let text = p.tag.replace_all(&text, " ");
    let text = strip_emphasis(&text, &p.bold);
    let text = strip_emphasis(&text, &p.italic);
    let text: String = text.chars().filter(|c| !QUOTE_BRACKETS.contains(c)).collect();
    p.spaces.replace_all(&text, " ").trim().to_string()
}

/// Drop emphasis markers that open and close a word. Markers inside a word
/// (`file_name`, `5*3*2`) are part of what gets spoken and stay.
///
/// `re` captures the character before the opening marker (1), the marker
/// (2) and the emphasized text (3); the character after the closing marker
/// is checked here since the regex engine has no look-ahead.
fn strip_emphasis(text: &str, re: &Regex) -> String {
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    let mut pos = 0;

    while let Some(caps) = re.captures_at(text, pos) {
        let (Some(whole), Some(marker), Some(inner)) = (caps.get(0), caps.get(2), caps.get(3)) else {
            break;
        };
        let closes_word = text[whole.end()..]
            .chars()
            .next()
            .map_or(true, |c| !(c.is_alphanumeric() || c == '_' || c == '*'));

        if closes_word {
            out.push_str(&text[copied..marker.start()]);
            out.push_str(inner.as_str());
            copied = whole.end();
            pos = whole.end();
        } else {
            pos = marker.end();
        }
    }

    out.push_str(&text[copied..]);
    out
}

fn is_terminator(c: char, language: Language) -> bool {
    LATIN_TERMINATORS.contains(&c) || (language.uses_cjk_punctuation() && CJK_TERMINATORS.contains(&c))
}

/// Split cleaned text into sentences, keeping the closing punctuation.
///
/// Latin terminators only end a sentence when followed by whitespace or the
/// end of text, so decimals like `3.5` stay intact. CJK terminators always split.
pub fn split_sentences(text: &str, language: Language) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        current.push(c);
        i += 1;

        if !is_terminator(c, language) {
            continue;
        }

        // Swallow runs like "?!" or "..." and trailing closing quotes.
        while i < chars.len() && (is_terminator(chars[i], language) || CLOSERS.contains(&chars[i])) {
            current.push(chars[i]);
            i += 1;
        }

        let at_boundary = i >= chars.len()
            || chars[i].is_whitespace()
            || CJK_TERMINATORS.contains(&c);
        if at_boundary {
            let sentence = current.trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            current.clear();
        }
    }

    let tail = current.trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

/// Lowercase and keep only letters and digits.
pub fn normalize_word(word: &str) -> String {
    word.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

pub fn normalize_words(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(normalize_word)
        .filter(|w| !w.is_empty())
        .collect()
}

/// Normalized words joined by single spaces, for whole-phrase comparison.
pub fn normalize_text(text: &str) -> String {
    normalize_words(text).join(" ")
}
