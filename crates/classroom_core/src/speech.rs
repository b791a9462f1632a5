//! Text preparation for the speech bridge.

use std::sync::LazyLock;

use regex::Regex;

static EMOJI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\p{Extended_Pictographic}\u{FE0F}\u{20E3}\u{1F1E6}-\u{1F1FF}\u{2190}-\u{21FF}]")
        .expect("emoji pattern is valid")
});
static BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("bold pattern is valid"));
static ITALIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*(.*?)\*").expect("italic pattern is valid"));
static HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"###\s?").expect("header pattern is valid"));
static LIST_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*[*-][ \t]+").expect("list pattern is valid"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Strips emoji and markdown so the synthesizer reads only words.
pub fn clean_text_for_speech(text: &str) -> String {
    let text = EMOJI.replace_all(text, "");
    let text = BOLD.replace_all(&text, "$1");
    let text = ITALIC.replace_all(&text, "$1");
    let text = HEADER.replace_all(&text, "");
    let text = LIST_ITEM.replace_all(&text, "");
    let text = text.replace("---", " ");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}
