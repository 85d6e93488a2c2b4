// Sloganforge Engine — First-exchange prompt template
//
// The very first submit on an empty conversation does not send the raw
// product keywords: it wraps them in a fixed copywriting brief asking for
// five short promotional slogans. The same constant pair is used to strip
// the wrapper again for display, so the user sees their literal keywords
// rather than the internal scaffolding.

/// Text placed before the product keywords.
pub const TEMPLATE_PREFIX: &str = "你是一个广告投放优化师，基于商品“";

/// Text placed after the product keywords.
pub const TEMPLATE_SUFFIX: &str =
    "”，撰写5个新广告文案，每个文案控制在中文长度10个字以内，不要有标点符号，文案内容要有创意，能吸引人点击";

/// Wrap raw product keywords in the promotional brief.
pub fn wrap_first_prompt(keywords: &str) -> String {
    format!("{TEMPLATE_PREFIX}{keywords}{TEMPLATE_SUFFIX}")
}

/// Remove the template wrapper if present, returning the inner keywords.
/// Text that does not carry the wrapper is returned unchanged.
pub fn strip_template(content: &str) -> &str {
    content
        .strip_prefix(TEMPLATE_PREFIX)
        .and_then(|rest| rest.strip_suffix(TEMPLATE_SUFFIX))
        .unwrap_or(content)
}
