/// Extractive summary: the first three `.`-separated pieces that are not blank
pub fn extractive_summary(transcript: &str) -> String {
    let sentences: Vec<&str> = transcript
        .split('.')
        .take(3)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if sentences.is_empty() {
        return String::new();
    }
    format!("{}.", sentences.join(". "))
}

/// Companion document for writing a blog post from the transcript
pub fn render_transcript_document(title: &str, transcript: &str) -> String {
    let mut doc = format!("# {}\n\n", title);

    let summary = extractive_summary(transcript);
    if !summary.is_empty() {
        doc.push_str(&format!("**Summary**: {}\n\n", summary));
    }

    doc.push_str(transcript);
    doc.push_str("\n\n## Recommended products\n\n");
    doc.push_str("<!-- Add product details and links here -->\n");
    doc
}
