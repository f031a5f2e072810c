//! Corpus statistics overview.
//!
//! Renders a quick per-tenant summary of what's indexed: document, chunk,
//! page, and character totals plus failed uploads. Used by `cqa stats` to
//! give confidence that ingestion is working as expected.

use crate::engine::CorpusStats;

/// Render the stats summary for printing.
pub fn render_stats(tenant_id: &str, stats: &CorpusStats) -> String {
    let mut out = String::new();
    out.push_str("Corpus QA — Corpus Stats\n");
    out.push_str("========================\n\n");
    out.push_str(&format!("  Tenant:      {}\n\n", tenant_id));
    out.push_str(&format!("  Documents:   {}\n", stats.documents));
    out.push_str(&format!("  Chunks:      {}\n", stats.chunks));
    out.push_str(&format!("  Pages:       {}\n", stats.total_pages));
    out.push_str(&format!(
        "  Characters:  {}\n",
        format_count(stats.total_chars)
    ));
    if stats.failed_documents > 0 {
        out.push_str(&format!(
            "  Failed:      {} (re-upload to retry)\n",
            stats.failed_documents
        ));
    }
    out
}

/// Format a large count with thousands separators.
fn format_count(n: i64) -> String {
    let digits: Vec<char> = n.to_string().chars().rev().collect();
    let mut out = String::new();
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && i % 3 == 0 && c.is_ascii_digit() {
            out.push(',');
        }
        out.push(*c);
    }
    out.chars().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_count_groups_thousands() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1000), "1,000");
        assert_eq!(format_count(1234567), "1,234,567");
    }

    #[test]
    fn render_mentions_failures_only_when_present() {
        let clean = CorpusStats {
            documents: 2,
            failed_documents: 0,
            chunks: 10,
            total_pages: 6,
            total_chars: 5000,
        };
        let rendered = render_stats("acme", &clean);
        assert!(rendered.contains("acme"));
        assert!(!rendered.contains("Failed"));

        let with_failures = CorpusStats {
            failed_documents: 1,
            ..clean
        };
        assert!(render_stats("acme", &with_failures).contains("Failed"));
    }
}
