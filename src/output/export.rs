use std::path::{Path, PathBuf};

use super::{persistence, StoredResult};
use crate::utils::format_timestamp;
use crate::{PipelineError, Result};

const DEFAULT_EXPORT_NAME: &str = "analysis_results";

/// A written export plus the follow-up prompt built from the same content
#[derive(Debug, Clone)]
pub struct ExportedResult {
    pub path: PathBuf,
    pub prompt: String,
}

/// Every non-empty section of a stored result as one plain-text document
pub fn render_export(result: &StoredResult) -> String {
    let analysis = &result.analysis;
    let mut sections: Vec<(&str, String)> = vec![
        ("Tags", analysis.tags.join(", ")),
        ("Content ideas", analysis.content_ideas.join("\n")),
        ("Transcript", result.transcript_text().trim().to_string()),
        (
            "Key points & timestamps",
            analysis
                .timestamped_summaries
                .iter()
                .map(|s| {
                    format!(
                        "[{} - {}] {}",
                        format_timestamp(s.start),
                        format_timestamp(s.end),
                        s.text
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"),
        ),
    ];
    if let Some(draft) = &result.blog_draft {
        sections.push(("Blog draft", draft.trim().to_string()));
    }

    sections
        .into_iter()
        .filter(|(_, body)| !body.is_empty())
        .map(|(heading, body)| format!("{}:\n{}\n\n", heading, body))
        .collect()
}

/// Prompt asking a chat model to turn an export into a search-friendly blog post
pub fn follow_up_prompt(export: &str) -> String {
    format!(
        "Below is the analysis of a video. Use it to write a search-optimized blog post.\n\n\
         --- Video analysis ---\n{}---\n\n\
         The post should include:\n\
         1. An engaging title with search keywords\n\
         2. An introduction summarizing the video and its topic\n\
         3. A body that expands on the key points and timestamps\n\
         4. Extra value drawn from the content ideas\n\
         5. A conclusion\n\
         6. The tags worked naturally into the text\n\n\
         Keep the tone professional but friendly.\n",
        export
    )
}

/// File name for an export: the draft's first line, else the video title
pub fn export_file_name(result: &StoredResult) -> String {
    let from_draft = result
        .blog_draft
        .as_deref()
        .and_then(|d| d.lines().next())
        .map(|line| line.trim_start_matches('#').trim())
        .filter(|line| !line.is_empty());
    let base = from_draft.unwrap_or(result.entry.title.as_str());

    let cleaned: String = base
        .chars()
        .filter(|c| !matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.');
    let name = if cleaned.is_empty() { DEFAULT_EXPORT_NAME } else { cleaned };
    format!("{}.txt", name)
}

/// Write the export of `result` into `out_dir`
pub fn write_export(out_dir: &Path, result: &StoredResult) -> Result<ExportedResult> {
    let content = render_export(result);
    if content.is_empty() {
        return Err(PipelineError::Persistence(format!(
            "nothing to export for {}",
            result.entry.video_id
        )));
    }

    fs_err::create_dir_all(out_dir).map_err(persistence)?;
    let path = out_dir.join(export_file_name(result));
    fs_err::write(&path, &content).map_err(persistence)?;
    tracing::info!("Exported {} to {}", result.entry.video_id, path.display());

    Ok(ExportedResult {
        path,
        prompt: follow_up_prompt(&content),
    })
}
