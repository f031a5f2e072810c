//! Meta-query resolution.
//!
//! Structural questions about the corpus itself — document counts, page
//! totals, tabular listings — are answered straight from the document
//! store, bypassing retrieval and the language model entirely. The numbers
//! in a meta-answer are always computed, never generated, so they cannot be
//! transcribed wrong.
//!
//! Classification is a pure function over normalized query text into a
//! small closed set of kinds, which keeps the fallthrough-to-retrieval path
//! statically exhaustive.

use anyhow::Result;

use crate::models::{Answer, Document, DocumentStatus};
use crate::store::Store;

/// The closed set of recognized meta-query kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaQuery {
    /// "How many documents do I have?"
    Count,
    /// "How many pages are in the corpus?"
    TotalPages,
    /// "How many characters / how big is the corpus?"
    TotalChars,
    /// "List / show a table of my documents."
    TableSummary,
    /// Not a meta-query; fall through to retrieval.
    None,
}

/// Classify a query as structural or not. Pure; no store access.
pub fn classify(query: &str) -> MetaQuery {
    let q = query.to_lowercase();

    let count_phrases = [
        "how many documents",
        "how many files",
        "how many pdfs",
        "number of documents",
        "document count",
    ];
    if count_phrases.iter().any(|p| q.contains(p)) {
        return MetaQuery::Count;
    }

    let page_phrases = ["how many pages", "total pages", "number of pages", "page count"];
    if page_phrases.iter().any(|p| q.contains(p)) {
        return MetaQuery::TotalPages;
    }

    let char_phrases = [
        "how many characters",
        "total characters",
        "character count",
        "corpus size",
        "total size",
    ];
    if char_phrases.iter().any(|p| q.contains(p)) {
        return MetaQuery::TotalChars;
    }

    let action_words = ["list", "table", "show", "summary", "summarize", "overview"];
    let corpus_words = ["documents", "files", "pdfs", "uploads", "corpus"];
    if action_words.iter().any(|w| q.contains(w)) && corpus_words.iter().any(|w| q.contains(w)) {
        return MetaQuery::TableSummary;
    }

    MetaQuery::None
}

/// Classify and, when the query is structural, compute the answer from the
/// store. `Ok(None)` means "not a meta-query" and the caller falls through
/// to the retrieval path.
pub async fn try_resolve(
    store: &dyn Store,
    tenant_id: &str,
    query: &str,
) -> Result<Option<Answer>> {
    let kind = classify(query);
    if kind == MetaQuery::None {
        return Ok(None);
    }

    let docs: Vec<Document> = store
        .list_documents(tenant_id)
        .await?
        .into_iter()
        .filter(|d| d.status == DocumentStatus::Indexed)
        .collect();

    let text = match kind {
        MetaQuery::Count => format_count(docs.len()),
        MetaQuery::TotalPages => {
            let pages: i64 = docs.iter().map(|d| d.page_count).sum();
            format!(
                "The corpus has {} page{} across {} document{}.",
                pages,
                plural(pages as usize),
                docs.len(),
                plural(docs.len())
            )
        }
        MetaQuery::TotalChars => {
            let chars: i64 = docs.iter().map(|d| d.char_count).sum();
            format!(
                "The corpus holds {} characters of extracted text across {} document{}.",
                chars,
                docs.len(),
                plural(docs.len())
            )
        }
        MetaQuery::TableSummary => render_table(&docs),
        MetaQuery::None => unreachable!(),
    };

    Ok(Some(Answer::system(text)))
}

fn format_count(n: usize) -> String {
    match n {
        0 => "You have no indexed documents.".to_string(),
        1 => "You have 1 indexed document.".to_string(),
        n => format!("You have {} indexed documents.", n),
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

/// Render a plain-text document table: filename, pages, upload date.
fn render_table(docs: &[Document]) -> String {
    if docs.is_empty() {
        return "You have no indexed documents.".to_string();
    }

    let mut out = String::new();
    out.push_str(&format!(
        "{:<44} {:>6}   {}\n",
        "FILENAME", "PAGES", "UPLOADED"
    ));
    out.push_str(&format!("{}\n", "-".repeat(64)));

    for d in docs {
        let name = if d.filename.chars().count() > 44 {
            let cut: String = d.filename.chars().take(41).collect();
            format!("{}...", cut)
        } else {
            d.filename.clone()
        };
        out.push_str(&format!(
            "{:<44} {:>6}   {}\n",
            name,
            d.page_count,
            format_date(d.uploaded_at)
        ));
    }

    let total_pages: i64 = docs.iter().map(|d| d.page_count).sum();
    out.push_str(&format!(
        "\nTotal: {} document{}, {} page{}.",
        docs.len(),
        plural(docs.len()),
        total_pages,
        plural(total_pages as usize)
    ));
    out
}

fn format_date(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    #[test]
    fn classify_count_queries() {
        assert_eq!(classify("How many documents do I have?"), MetaQuery::Count);
        assert_eq!(classify("what is my document count"), MetaQuery::Count);
        assert_eq!(classify("how many PDFs are loaded?"), MetaQuery::Count);
    }

    #[test]
    fn classify_page_and_char_queries() {
        assert_eq!(classify("How many pages in total?"), MetaQuery::TotalPages);
        assert_eq!(classify("total characters stored"), MetaQuery::TotalChars);
        assert_eq!(classify("what's the corpus size?"), MetaQuery::TotalChars);
    }

    #[test]
    fn classify_table_requests() {
        assert_eq!(
            classify("Show me a table of my documents"),
            MetaQuery::TableSummary
        );
        assert_eq!(classify("list the uploaded files"), MetaQuery::TableSummary);
    }

    #[test]
    fn content_questions_fall_through() {
        assert_eq!(
            classify("How many vacation days do employees get?"),
            MetaQuery::None
        );
        assert_eq!(classify("What does the policy say?"), MetaQuery::None);
        assert_eq!(classify(""), MetaQuery::None);
    }

    fn indexed_doc(id: &str, tenant: &str, pages: i64, chars: i64) -> Document {
        Document {
            id: id.to_string(),
            tenant_id: tenant.to_string(),
            filename: format!("{}.pdf", id),
            raw_text: String::new(),
            page_count: pages,
            char_count: chars,
            content_hash: "h".to_string(),
            uploaded_at: 1_700_000_000,
            status: DocumentStatus::Indexed,
            failure_reason: None,
        }
    }

    #[tokio::test]
    async fn count_matches_indexed_documents_exactly() {
        let store = InMemoryStore::new();
        store
            .put_document(&indexed_doc("a", "t", 3, 100))
            .await
            .unwrap();
        store
            .put_document(&indexed_doc("b", "t", 2, 50))
            .await
            .unwrap();
        // a failed document does not count
        let mut failed = indexed_doc("c", "t", 1, 10);
        failed.status = DocumentStatus::Failed;
        store.put_document(&failed).await.unwrap();
        // neither does another tenant's
        store
            .put_document(&indexed_doc("d", "other", 9, 900))
            .await
            .unwrap();

        let answer = try_resolve(&store, "t", "How many documents do I have?")
            .await
            .unwrap()
            .unwrap();
        assert!(answer.text.contains("2"));
        assert!(answer.grounded);
        assert!(answer.cited_document_ids.is_empty());
    }

    #[tokio::test]
    async fn totals_are_summed_from_the_store() {
        let store = InMemoryStore::new();
        store
            .put_document(&indexed_doc("a", "t", 3, 100))
            .await
            .unwrap();
        store
            .put_document(&indexed_doc("b", "t", 4, 250))
            .await
            .unwrap();

        let pages = try_resolve(&store, "t", "how many pages are there?")
            .await
            .unwrap()
            .unwrap();
        assert!(pages.text.contains("7"));

        let chars = try_resolve(&store, "t", "total characters?")
            .await
            .unwrap()
            .unwrap();
        assert!(chars.text.contains("350"));
    }

    #[tokio::test]
    async fn table_lists_every_document() {
        let store = InMemoryStore::new();
        store
            .put_document(&indexed_doc("policy", "t", 3, 100))
            .await
            .unwrap();
        store
            .put_document(&indexed_doc("handbook", "t", 12, 999))
            .await
            .unwrap();

        let answer = try_resolve(&store, "t", "show a table of my documents")
            .await
            .unwrap()
            .unwrap();
        assert!(answer.text.contains("policy.pdf"));
        assert!(answer.text.contains("handbook.pdf"));
        assert!(answer.text.contains("Total: 2 documents"));
    }

    #[tokio::test]
    async fn non_meta_query_returns_none() {
        let store = InMemoryStore::new();
        let resolved = try_resolve(&store, "t", "what is the refund policy?")
            .await
            .unwrap();
        assert!(resolved.is_none());
    }
}
