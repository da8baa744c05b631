//! Pulls the component source out of a model reply.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static FENCED_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)```(?:javascript|jsx)\n(.+?)\n```").unwrap_or_else(|e| {
        panic!("fenced code pattern failed to compile: {e}");
    })
});

/// Component source plus the prose that surrounded it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedCode {
    pub app: String,
    pub context: String,
}

/// Split a reply into the first `javascript`/`jsx` fenced block and the rest.
///
/// Without a fenced block the whole text is treated as code.
pub fn extract_guarded_code(text: &str) -> ExtractedCode {
    let Some(captures) = FENCED_CODE.captures(text) else {
        return ExtractedCode {
            app: text.to_string(),
            context: String::new(),
        };
    };

    let (Some(whole), Some(body)) = (captures.get(0), captures.get(1)) else {
        return ExtractedCode {
            app: text.to_string(),
            context: String::new(),
        };
    };

    let mut context = String::with_capacity(text.len() - whole.len());
    context.push_str(&text[..whole.start()]);
    context.push_str(&text[whole.end()..]);

    ExtractedCode {
        app: body.as_str().to_string(),
        context,
    }
}
