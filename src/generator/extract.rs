//! Pulling a JSON document out of free-form model output.
//!
//! Candidates are produced in order of confidence: the whole trimmed response,
//! every fenced code block, the first balanced `{...}` span, and finally the
//! span from the first `{` to the last `}`. Callers try each candidate until
//! one validates.

/// All candidate JSON texts found in `response`, most likely first, deduplicated.
pub fn json_candidates(response: &str) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();
    let mut push = |candidate: String| {
        if !candidate.is_empty() && !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    };

    let trimmed = response.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        push(trimmed.to_string());
    }

    for block in fenced_blocks(response) {
        push(block);
    }

    if let Some(span) = balanced_object(response) {
        push(span);
    }

    if let (Some(start), Some(end)) = (response.find('{'), response.rfind('}'))
        && start < end
    {
        push(response[start..=end].to_string());
    }

    candidates
}

/// Contents of every ``` fenced block. A language tag on the opening fence is
/// dropped. An unterminated final fence (a truncated response) yields
/// everything after it.
pub fn fenced_blocks(response: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut rest = response;
    while let Some(open) = rest.find("```") {
        let after_fence = &rest[open + 3..];
        let body_start = after_fence.find('\n').map(|n| n + 1).unwrap_or(0);
        let body = &after_fence[body_start..];
        match body.find("```") {
            Some(close) => {
                blocks.push(body[..close].trim().to_string());
                rest = &body[close + 3..];
            }
            None => {
                blocks.push(body.trim().to_string());
                break;
            }
        }
    }
    blocks
}

/// First `{` up to its matching `}`, skipping braces inside JSON strings.
fn balanced_object(response: &str) -> Option<String> {
    let start = response.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in response[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(response[start..start + i + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}
