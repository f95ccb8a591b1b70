// src/agents/prompts.rs
//! System prompts for the model-backed capabilities. Every prompt asks for a
//! single JSON object so the response can be parsed without scraping prose.

use std::fmt::Write as _;

use crate::agents::{CurationResult, Draft, VerificationReport, MAX_CURATED};
use crate::ingest::types::NewsItem;

pub const CURATOR_SYSTEM: &str = "You are a news curator for a developer-focused professional account. \
From the numbered articles, pick the 3-5 most newsworthy for developers, best first. \
Prefer new product launches, first-time announcements, tools developers can use, and concrete technical changes. \
Avoid opinion pieces, funding or hiring news, vague trend pieces, and repeated coverage of one story. \
If nothing qualifies, select nothing. \
Reply with JSON only: {\"selected\":[{\"index\":<article number>,\"justification\":\"<why it matters>\"}]}";

pub const WRITER_SYSTEM: &str = "Write a short professional social post in a personal, conversational voice \
about the provided articles. Share what stood out and connect the stories where it is natural. \
End with a genuine question or next step. Avoid hype words and numbered lists. \
Every fact must come from the articles; opinions need no source. \
Put the links at the bottom and add at most three hashtags. \
Only link urls from the articles, exactly as given. \
Reply with JSON only: {\"body\":\"<post text>\",\"citations\":[\"<url>\", ...]}";

pub const VERIFIER_SYSTEM: &str = "You verify a draft post against its source articles. \
List every factual claim in the draft and mark it verified only if a source supports it. \
Numbers, release status, quotes, urls and company attributions must match the sources exactly. \
A claim supported by a source summary or its article text counts as verified. Personal opinions are not claims. \
Reply with JSON only: {\"claims\":[{\"claim\":\"<text>\",\"source\":\"<url or empty>\",\"verified\":true|false,\"note\":\"<why>\"}]}";

pub const REVISER_SYSTEM: &str = "You revise a draft post so that it contains only verified material. \
Remove or rewrite every flagged claim; keep the voice and the verified content. \
Only link urls from the articles, exactly as given. \
Reply with JSON only: {\"body\":\"<post text>\",\"citations\":[\"<url>\", ...]}";

/// Articles numbered from 1, as the curator refers to them.
pub fn curator_input(items: &[NewsItem]) -> String {
    let mut out = format!("Select at most {MAX_CURATED} articles.\n\n");
    for (i, it) in items.iter().enumerate() {
        let _ = writeln!(
            out,
            "[{}] {}\nSource: {} | Published: {}\nURL: {}\n{}\n",
            i + 1,
            it.title,
            it.source_name,
            it.published_at.format("%Y-%m-%d %H:%M UTC"),
            it.url,
            it.summary
        );
    }
    out
}

pub fn sources_block(curation: &CurationResult) -> String {
    let mut out = String::new();
    for c in &curation.items {
        let _ = writeln!(
            out,
            "- {} ({})\n  URL: {}\n  Summary: {}\n  Why: {}",
            c.item.title, c.item.source_name, c.item.url, c.item.summary, c.justification
        );
        if let Some(text) = &c.full_text {
            let _ = writeln!(out, "  Article: {text}");
        }
    }
    out
}

pub fn verifier_input(draft: &Draft, sources: &CurationResult) -> String {
    format!(
        "## Draft\n{}\n\n## Cited urls\n{}\n\n## Sources\n{}",
        draft.body,
        draft.citations.iter().cloned().collect::<Vec<_>>().join("\n"),
        sources_block(sources)
    )
}

pub fn reviser_input(draft: &Draft, report: &VerificationReport, sources: &CurationResult) -> String {
    format!(
        "## Draft\n{}\n\n## Flagged\n{}\n\n## Sources\n{}",
        draft.body,
        report.issues.join("\n"),
        sources_block(sources)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::CuratedItem;
    use chrono::Utc;

    #[test]
    fn curator_input_numbers_from_one() {
        let items = vec![
            NewsItem::new("A", "sa", "https://a.example/1", Utc::now(), "S"),
            NewsItem::new("B", "sb", "https://b.example/2", Utc::now(), "S"),
        ];
        let s = curator_input(&items);
        assert!(s.contains("[1] A"));
        assert!(s.contains("[2] B"));
        assert!(s.contains("URL: https://b.example/2"));
    }

    #[test]
    fn article_text_reaches_writer_and_verifier() {
        let mut with_text = CuratedItem::new(
            NewsItem::new("A", "short", "https://a.example/1", Utc::now(), "S"),
            "new api",
        );
        with_text.full_text = Some("The API ships with a 1M token context window.".into());
        let without = CuratedItem::new(
            NewsItem::new("B", "only a summary", "https://b.example/2", Utc::now(), "S"),
            "tooling",
        );
        let curation = CurationResult {
            items: vec![with_text, without],
        };

        let block = sources_block(&curation);
        assert!(block.contains("Article: The API ships with a 1M token context window."));
        assert_eq!(block.matches("Article:").count(), 1);

        let draft = Draft::new("It has a 1M token context.", ["https://a.example/1"]);
        assert!(verifier_input(&draft, &curation).contains("1M token context window"));
    }
}
