use crate::models::FrameworkOption;

// ── Framework options ────────────────────────────────────────────────────────

pub const FRAMEWORK_OPTIONS: &[FrameworkOption] = &[
    FrameworkOption { value: "html-css", label: "HTML + CSS" },
    FrameworkOption { value: "html-tailwind", label: "HTML + Tailwind CSS" },
    FrameworkOption { value: "html-bootstrap", label: "HTML + Bootstrap" },
    FrameworkOption { value: "html-css-js", label: "HTML + CSS + JS" },
    FrameworkOption { value: "html-tailwind-js", label: "HTML + Tailwind + JS" },
    FrameworkOption { value: "html-bootstrap-js", label: "HTML + Bootstrap + JS" },
];

/// Resolve a framework tag, falling back to the first option.
pub fn resolve_framework(tag: Option<&str>) -> &'static FrameworkOption {
    let tag = tag.map(str::trim).unwrap_or("");
    FRAMEWORK_OPTIONS
        .iter()
        .find(|opt| opt.value.eq_ignore_ascii_case(tag))
        .unwrap_or(&FRAMEWORK_OPTIONS[0])
}

// ── User-facing messages ─────────────────────────────────────────────────────

pub mod messages {
    pub const NO_PROMPT: &str = "Please describe your component first";
    pub const NO_CODE_FOR_REVIEW: &str = "Code is required for review";
    pub const NO_CODE_FOR_FIX: &str = "Code is required for fixing";
    pub const NO_CODE_FOR_IMAGES: &str = "No code to fix images for";
    pub const NO_CODE_DOWNLOAD: &str = "No code to download";
    pub const GENERATION_FAILED: &str = "Failed to generate code. Please try again.";
    pub const REVIEW_FAILED: &str = "Failed to review code. Please try again.";
    pub const FIX_FAILED: &str = "Failed to fix code. Please try again.";
    pub const API_KEY_MISSING: &str = "Gemini API key is missing. Set GEMINI_API_KEY.";
    pub const NO_IMAGES_FOUND: &str = "No broken images found";
    pub const FIX_SUPERSEDED: &str = "A newer image fix replaced this one";
    pub const UNKNOWN_SESSION: &str = "Unknown preview session";

    pub fn images_fixed(count: usize) -> String {
        format!(
            "Fixed {} broken image{}",
            count,
            if count == 1 { "" } else { "s" }
        )
    }
}

// ── Instruction templates ────────────────────────────────────────────────────

/// Instruction for generating a component; asks for a single fenced block.
pub fn system_prompt(prompt: &str, framework: &str) -> String {
    format!(
        r#"
You are an experienced programmer with expertise in web development and UI/UX design. You create modern, animated, and fully responsive UI components. You are highly skilled in HTML, CSS, Tailwind CSS, Bootstrap, JavaScript, React, Next.js, Vue.js, Angular, and more.

Now, generate a UI component for: {prompt}
Framework to use: {framework}

Requirements:
- The code must be clean, well-structured, and easy to understand.
- Optimize for SEO where applicable.
- Focus on creating a modern, animated, and responsive UI design.
- Include high-quality hover effects, shadows, animations, colors, and typography.
- Return ONLY the code, formatted properly in a single **Markdown fenced code block**.
- Do NOT include explanations, text, comments, or anything else besides the code.
- Give the whole code in a single HTML file.
- Use modern CSS features like flexbox, grid, and custom properties.
- Ensure accessibility with proper ARIA labels and semantic HTML.
- Make it mobile-first and responsive for all screen sizes.

**IMPORTANT IMAGE AND LINK GUIDELINES:**
- When using images, prefer reliable sources like:
  * Picsum: https://picsum.photos/[width]/[height] (most reliable)
  * Placeholder services: https://via.placeholder.com/[width]x[height]
  * Unsplash: https://images.unsplash.com/photo-[ID]?w=[width]&h=[height]&fit=crop
- Always include proper alt attributes for accessibility
- Use appropriate width and height attributes
- Avoid using random URLs that might be broken or return 404 errors
- For user avatars or profile images, use: https://ui-avatars.com/api/?name=[name]&size=[size]
- NEVER wrap images in clickable anchor tags (<a href="..."><img></a>)
- If you need clickable images, use buttons instead
- For galleries or lightboxes, use div containers with click handlers, not anchor links
"#
    )
}

pub fn review_prompt(instructions: &str, code: &str) -> String {
    format!(
        r#"
You are an expert code reviewer with deep knowledge of web development best practices, performance optimization, accessibility, and modern coding standards.

Review the following code for: {instructions}

Code to review:
```
{code}
```

Please provide a detailed review covering:
- Code quality and readability
- Performance considerations
- Security issues (if any)
- Accessibility compliance
- Best practices adherence
- Potential improvements
- Browser compatibility concerns

Format your response as structured feedback with specific suggestions for improvement.
"#
    )
}

pub fn fix_prompt(issue: &str, code: &str) -> String {
    format!(
        r#"
You are an expert developer specialized in debugging and fixing code issues. You excel at identifying problems and providing clean, efficient solutions.

Fix the following issue in the code: {issue}

Current code:
```
{code}
```

Requirements for the fix:
- Maintain the original functionality while fixing the issue
- Follow modern coding best practices
- Ensure the code remains readable and maintainable
- Return ONLY the corrected code in a single markdown code block
- Do not include explanations unless specifically requested
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_or_missing_framework_falls_back_to_first() {
        assert_eq!(resolve_framework(None).value, "html-css");
        assert_eq!(resolve_framework(Some("react-native")).value, "html-css");
        assert_eq!(
            resolve_framework(Some(" HTML-Tailwind-JS ")).value,
            "html-tailwind-js"
        );
    }

    #[test]
    fn system_prompt_carries_request_and_framework() {
        let prompt = system_prompt("a pricing table", "html-bootstrap");
        assert!(prompt.contains("generate a UI component for: a pricing table"));
        assert!(prompt.contains("Framework to use: html-bootstrap"));
        assert!(prompt.contains("NEVER wrap images in clickable anchor tags"));
    }

    #[test]
    fn fix_prompt_fences_the_code() {
        let prompt = fix_prompt("button is misaligned", "<button>x</button>");
        assert!(prompt.contains("```\n<button>x</button>\n```"));
    }

    #[test]
    fn image_fix_message_pluralizes() {
        assert_eq!(messages::images_fixed(1), "Fixed 1 broken image");
        assert_eq!(messages::images_fixed(3), "Fixed 3 broken images");
    }
}
