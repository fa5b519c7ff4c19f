use url::Url;

use crate::config::Config;

pub mod process;

/// Format seconds as `mm:ss`, the way timestamped summaries are displayed
pub fn format_timestamp(seconds: f64) -> String {
    let total_seconds = seconds.max(0.0) as u64;
    format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
}

/// Format duration in human-readable format
pub fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Make `name` usable as a single path component below the store root.
///
/// Separators and NUL become `_`, as do `..` runs and a leading dot, so the
/// result can never name a parent or hidden directory.
pub fn path_component(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();
    let collapsed = replaced.trim().replace("..", "_");
    match collapsed.strip_prefix('.') {
        Some(rest) => format!("_{}", rest),
        None => collapsed,
    }
}

/// Turn an uploader handle into a directory name: `@` removed, then made path-safe
pub fn uploader_dir_name(uploader: &str) -> String {
    path_component(&uploader.replace('@', ""))
}

/// Profile name from a profile URL: last path segment, query dropped, `@` removed
///
/// `https://www.tiktok.com/@some.creator?lang=en` -> `some.creator`
pub fn profile_name_from_url(profile_url: &str) -> Option<String> {
    let last_segment = match Url::parse(profile_url) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .map(|s| s.to_string()),
        Err(_) => profile_url
            .split('?')
            .next()
            .and_then(|path| path.trim_end_matches('/').rsplit('/').next())
            .map(|s| s.to_string()),
    }?;

    let decoded = urlencoding::decode(&last_segment)
        .map(|s| s.into_owned())
        .unwrap_or(last_segment);
    let name = uploader_dir_name(&decoded);

    (!name.is_empty()).then_some(name)
}

/// First `max_chars` characters of `text`, never splitting a code point
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// Check that the configured external tools can be started
pub async fn check_dependencies(config: &Config) -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available(&config.tools.fetcher).await {
        missing.push(format!(
            "{} - required for metadata and downloads",
            config.tools.fetcher.display_name()
        ));
    }

    if !check_command_available(&config.tools.transcoder).await {
        missing.push(format!(
            "{} - required for audio extraction",
            config.tools.transcoder.display_name()
        ));
    }

    missing
}

/// Check if a command is available in PATH
async fn check_command_available(tool: &crate::config::ExternalTool) -> bool {
    let flag = if tool.program.contains("ffmpeg") { "-version" } else { "--version" };

    tool.command()
        .arg(flag)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}
