//! Pulling JSON objects out of model replies.

/// Extract the JSON object embedded in an LLM reply.
///
/// Models often wrap the object in prose or a fenced code block; this takes
/// the outermost `{ ... }` span.
pub fn extract_json_payload(raw: &str) -> Option<String> {
    let text = raw.trim();
    if text.starts_with('{') && text.ends_with('}') {
        return Some(text.to_string());
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| text[start..=end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_object() {
        assert_eq!(
            extract_json_payload("  {\"a\": 1}\n").as_deref(),
            Some("{\"a\": 1}")
        );
    }

    #[test]
    fn fenced_object() {
        let raw = "Here you go:\n```json\n{\"score\": 72, \"nested\": {\"x\": 1}}\n```";
        assert_eq!(
            extract_json_payload(raw).as_deref(),
            Some("{\"score\": 72, \"nested\": {\"x\": 1}}")
        );
    }

    #[test]
    fn no_object() {
        assert_eq!(extract_json_payload("no json here"), None);
        assert_eq!(extract_json_payload("} backwards {"), None);
    }
}
