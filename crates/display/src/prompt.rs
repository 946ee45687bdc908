use dispatch::Prompt;

const INDENT: &str = "    ";
const MIN_BOX_WIDTH: usize = 33;

/// Lines drawn in the control window while a menu waits for confirmation.
pub fn render_prompt(prompt: &Prompt) -> Vec<String> {
    let width = MIN_BOX_WIDTH.max(prompt.title.chars().count() + 4);
    let border = format!("{INDENT}+{}+", "-".repeat(width));

    let mut lines = vec![
        border.clone(),
        format!("{INDENT}|{:^width$}|", prompt.title),
        border,
        String::new(),
    ];
    for option in &prompt.options {
        lines.push(format!("{INDENT}Button {}: {}", option.button.0, option.label));
        if !option.description.is_empty() {
            lines.push(format!("{INDENT}- {}", option.description));
        }
        lines.push(String::new());
    }
    lines.push(format!(
        "{INDENT}Waiting {}s for selection",
        prompt.timeout.as_secs()
    ));
    lines.push(format!("{INDENT}Any other button cancels"));
    lines
}

#[cfg(test)]
#[path = "tests/prompt_tests.rs"]
mod tests;
