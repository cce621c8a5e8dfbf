use anyhow::{Context, Result};
use std::io::{BufRead, Write};

/// How a yes/no question is answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    /// Native message box with Yes/No buttons
    Dialog,
    /// `[y/N]` question on the terminal
    Terminal,
    AssumeYes,
    AssumeNo,
}

pub fn confirm(message: &str, mode: PromptMode) -> Result<bool> {
    match mode {
        PromptMode::AssumeYes => Ok(true),
        PromptMode::AssumeNo => Ok(false),
        PromptMode::Dialog => confirm_dialog(message),
        PromptMode::Terminal => {
            let stdin = std::io::stdin();
            confirm_from(message, &mut stdin.lock(), &mut std::io::stdout())
        }
    }
}

#[cfg(feature = "viewer")]
fn confirm_dialog(message: &str) -> Result<bool> {
    let result = rfd::MessageDialog::new()
        .set_level(rfd::MessageLevel::Info)
        .set_title("sentinel-rgb")
        .set_description(message)
        .set_buttons(rfd::MessageButtons::YesNo)
        .show();
    Ok(matches!(result, rfd::MessageDialogResult::Yes))
}

#[cfg(not(feature = "viewer"))]
fn confirm_dialog(message: &str) -> Result<bool> {
    log::warn!("Built without dialogs, asking on the terminal instead");
    let stdin = std::io::stdin();
    confirm_from(message, &mut stdin.lock(), &mut std::io::stdout())
}

/// Ask on `output`, read one line from `input`; anything but y/yes is no
pub fn confirm_from<R: BufRead, W: Write>(message: &str, input: &mut R, output: &mut W) -> Result<bool> {
    write!(output, "{} [y/N] ", message).context("Failed to write prompt")?;
    output.flush().context("Failed to flush prompt")?;

    let mut answer = String::new();
    input
        .read_line(&mut answer)
        .context("Failed to read answer")?;

    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn ask(answer: &str) -> bool {
        let mut input = Cursor::new(answer.as_bytes().to_vec());
        let mut output = Vec::new();
        let result = confirm_from("Display the image?", &mut input, &mut output).unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "Display the image? [y/N] ");
        result
    }

    #[test]
    fn test_terminal_answers() {
        assert!(ask("y\n"));
        assert!(ask("YES\n"));
        assert!(!ask("n\n"));
        assert!(!ask("\n"));
        assert!(!ask(""));
    }

    #[test]
    fn test_assumed_answers() {
        assert!(confirm("ignored", PromptMode::AssumeYes).unwrap());
        assert!(!confirm("ignored", PromptMode::AssumeNo).unwrap());
    }
}
