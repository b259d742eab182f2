//! Composite prompt assembly shared by every adapter.

use super::types::GenerationRequest;

/// Page text is capped so a large article cannot blow up token spend.
const PAGE_TEXT_LIMIT: usize = 2000;

/// Assemble the text actually sent upstream: optional tone directive, the
/// user's prompt, then the captured selection and page context.
pub fn build_prompt(req: &GenerationRequest) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(tone) = req.options.as_ref().and_then(|o| o.tone.as_deref()) {
        parts.push(format!("Tone: {tone}\n"));
    }

    parts.push(req.prompt.clone());

    if let Some(ctx) = &req.context {
        let mut ctx_bits: Vec<String> = Vec::new();
        if let Some(selected) = ctx.selected_text.as_deref() {
            if !selected.is_empty() {
                ctx_bits.push(format!("Selected:\n{selected}"));
            }
        }
        if let Some(page) = ctx.page_text.as_deref() {
            if !page.is_empty() {
                let truncated: String = page.chars().take(PAGE_TEXT_LIMIT).collect();
                ctx_bits.push(format!("Context:\n{truncated}"));
            }
        }
        if !ctx_bits.is_empty() {
            parts.push(format!("\n\n{}", ctx_bits.join("\n")));
        }
    }

    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::types::{GenerationOptions, Provider, RequestContext};

    fn request(prompt: &str) -> GenerationRequest {
        GenerationRequest {
            model: "gpt-4o-mini".into(),
            provider: Provider::OpenAi,
            prompt: prompt.into(),
            context: None,
            options: None,
            use_user_key: true,
            stream: false,
        }
    }

    #[test]
    fn test_bare_prompt_passes_through() {
        assert_eq!(build_prompt(&request("reply to this email")), "reply to this email");
    }

    #[test]
    fn test_tone_line_comes_first() {
        let mut req = request("say thanks");
        req.options = Some(GenerationOptions {
            tone: Some("friendly".into()),
            ..Default::default()
        });
        assert_eq!(build_prompt(&req), "Tone: friendly\n\nsay thanks");
    }

    #[test]
    fn test_context_blocks_appended() {
        let mut req = request("summarize");
        req.context = Some(RequestContext {
            selected_text: Some("quoted passage".into()),
            page_text: Some("full article".into()),
            url: None,
            title: None,
        });
        assert_eq!(
            build_prompt(&req),
            "summarize\n\n\nSelected:\nquoted passage\nContext:\nfull article"
        );
    }

    #[test]
    fn test_page_text_truncated() {
        let mut req = request("summarize");
        req.context = Some(RequestContext {
            page_text: Some("x".repeat(5000)),
            ..Default::default()
        });
        let prompt = build_prompt(&req);
        let context_part = prompt.split("Context:\n").nth(1).unwrap();
        assert_eq!(context_part.chars().count(), PAGE_TEXT_LIMIT);
    }

    #[test]
    fn test_empty_context_adds_nothing() {
        let mut req = request("hello");
        req.context = Some(RequestContext::default());
        assert_eq!(build_prompt(&req), "hello");
    }

    #[test]
    fn test_deterministic() {
        let mut req = request("hello");
        req.context = Some(RequestContext {
            selected_text: Some("sel".into()),
            ..Default::default()
        });
        assert_eq!(build_prompt(&req), build_prompt(&req));
    }
}
