//! Random-choice resolution and markup flattening for material text.
//!
//! Material authors write alternatives as an ordered list; one `<li>` per
//! `<ol>` block is kept, so repeated syntheses from the same materials vary.

use std::sync::OnceLock;

use rand::Rng;
use regex::Regex;

fn ol_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<ol\b[^>]*>(.*?)</ol\s*>").expect("valid regex"))
}

fn li_open_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<li\b[^>]*>").expect("valid regex"))
}

fn li_close_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)</li\s*>").expect("valid regex"))
}

/// Items of an `<ol>` body. An item runs to its `</li>` or, when left
/// unclosed, to the next `<li>`.
fn list_items(body: &str) -> Vec<&str> {
    li_open_re()
        .split(body)
        .skip(1)
        .map(|item| li_close_re().split(item).next().unwrap_or(item))
        .collect()
}

fn line_break_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)<br\s*/?>|</p\s*>|</div\s*>|</li\s*>|</h[1-6]\s*>|<hr\s*/?>")
            .expect("valid regex")
    })
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"))
}

/// Resolve every `<ol>` block to one of its items, then flatten markup.
///
/// Each block draws independently from `rng`; a block without items
/// disappears. Deterministic for a given rng state.
pub fn process_random_prompt<R: Rng>(text: &str, rng: &mut R) -> String {
    let resolved = ol_re().replace_all(text, |caps: &regex::Captures<'_>| {
        let items = list_items(&caps[1]);
        if items.is_empty() {
            return String::new();
        }
        let pick = rng.gen_range(0..items.len());
        format!(" {} ", items[pick].trim())
    });
    strip_markup(&resolved)
}

/// Drop presentational tags, decode common entities, and collapse
/// whitespace while keeping line structure.
pub fn strip_markup(text: &str) -> String {
    let with_breaks = line_break_re().replace_all(text, "\n");
    let untagged = tag_re().replace_all(&with_breaks, "");
    let decoded = decode_entities(&untagged);

    let mut lines: Vec<String> = Vec::new();
    let mut blank_run = 0;
    for line in decoded.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            blank_run += 1;
            if blank_run == 1 && !lines.is_empty() {
                lines.push(String::new());
            }
        } else {
            blank_run = 0;
            lines.push(collapsed);
        }
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const CHOICES: &str =
        "<p>Your blade <ol><li>burns</li><li>freezes</li><li>shocks</li></ol> on a hit.</p>";

    #[test]
    fn same_seed_same_output() {
        let a = process_random_prompt(CHOICES, &mut StdRng::seed_from_u64(42));
        let b = process_random_prompt(CHOICES, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn picks_exactly_one_alternative() {
        for seed in 0..20 {
            let out = process_random_prompt(CHOICES, &mut StdRng::seed_from_u64(seed));
            let hits = ["burns", "freezes", "shocks"]
                .iter()
                .filter(|w| out.contains(*w))
                .count();
            assert_eq!(hits, 1, "seed {seed}: {out}");
            assert!(out.starts_with("Your blade "));
            assert!(out.ends_with(" on a hit."));
            assert!(!out.contains('<'));
        }
    }

    #[test]
    fn unclosed_items_are_separate_alternatives() {
        assert_eq!(list_items("<li>fire<li>cold<li>acid"), vec!["fire", "cold", "acid"]);
        for seed in 0..20 {
            let out = process_random_prompt("<ol><li>fire<li>cold<li>acid</ol>", &mut StdRng::seed_from_u64(seed));
            assert!(["fire", "cold", "acid"].contains(&out.as_str()), "seed {seed}: {out}");
        }
        assert_eq!(
            list_items("<li class=\"x\">a</li> <LI>b</li>"),
            vec!["a", "b"]
        );
    }

    #[test]
    fn all_alternatives_reachable() {
        let mut seen = std::collections::BTreeSet::new();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            seen.insert(process_random_prompt("<ol><li>a</li><li>b</li></ol>", &mut rng));
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn empty_block_vanishes() {
        let out = process_random_prompt("before <ol> </ol> after", &mut StdRng::seed_from_u64(1));
        assert_eq!(out, "before after");
    }

    #[test]
    fn strip_markup_keeps_lines_and_decodes_entities() {
        let out = strip_markup("<p>Fire &amp; ice</p><p>  Cold&nbsp;snap  </p><br><br><br>");
        assert_eq!(out, "Fire & ice\nCold snap");
        assert_eq!(strip_markup("<strong>Trigger</strong> An ally falls"), "Trigger An ally falls");
    }

    #[test]
    fn plain_text_passes_through() {
        let out = process_random_prompt("Line one\n\n\nLine two", &mut StdRng::seed_from_u64(0));
        assert_eq!(out, "Line one\n\nLine two");
    }
}
